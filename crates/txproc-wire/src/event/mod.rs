//! The in-memory event record and its four wire sections.
//!
//! An [`Event`] is made of a type code plus four independently serialised
//! groups: [`Routing`] (wire `part1`), [`Metadata`] (`part2`),
//! [`SystemParams`] (`sysParams`) and [`ExecParams`] (`execParams`). Known
//! fields are typed; keys this crate does not know about are kept in each
//! group's `extra` map and written back unchanged.

mod lenient;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use serde_json::{Map, Value};
use strum::{EnumIter, FromRepr, IntoStaticStr};

use crate::error::ExecModeError;

pub(crate) use self::lenient::{int_from_value, string_from_value};

/// Event classes understood by txProc.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoStaticStr, FromRepr, EnumIter,
)]
#[repr(u8)]
pub enum EventType {
    /// Type not known or not yet assigned.
    #[default]
    #[strum(serialize = "EV_UNKNOWN")]
    Unknown = 0,
    /// Internal event re-dispatched inside the worker.
    #[strum(serialize = "EV_BASE")]
    Base = 1,
    /// Script execution request.
    #[strum(serialize = "EV_SCRIPT")]
    Script = 2,
    /// Perl handler request.
    #[strum(serialize = "EV_PERL")]
    Perl = 3,
    /// Binary execution request.
    #[strum(serialize = "EV_BIN")]
    Bin = 4,
    /// URL fetch request.
    #[strum(serialize = "EV_URL")]
    Url = 5,
    /// Result of a previously submitted event.
    #[strum(serialize = "EV_RESULT")]
    Result = 6,
    /// Worker completion notice.
    #[strum(serialize = "EV_WORKER_DONE")]
    WorkerDone = 7,
    /// Control command; see [`CommandType`].
    #[strum(serialize = "EV_COMMAND")]
    Command = 8,
    /// Reply to a request.
    #[strum(serialize = "EV_REPLY")]
    Reply = 9,
    /// Error report.
    #[strum(serialize = "EV_ERROR")]
    Error = 10,
}

impl EventType {
    /// Returns the integer code carried on the wire.
    #[must_use]
    pub const fn code(self) -> i64 {
        self as i64
    }

    /// Looks up the event type for a wire code.
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        u8::try_from(code).ok().and_then(Self::from_repr)
    }

    /// Returns the symbolic name, for example `EV_RESULT`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command codes carried by [`EventType::Command`] events.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoStaticStr, FromRepr, EnumIter,
)]
#[repr(u8)]
pub enum CommandType {
    /// No command.
    #[default]
    #[strum(serialize = "CMD_NONE")]
    None = 0,
    /// Report statistics.
    #[strum(serialize = "CMD_STATS")]
    Stats = 1,
    /// Reset statistics counters.
    #[strum(serialize = "CMD_RESET_STATS")]
    ResetStats = 2,
    /// Close and reopen the log target.
    #[strum(serialize = "CMD_REOPEN_LOG")]
    ReopenLog = 3,
    /// Re-read configuration.
    #[strum(serialize = "CMD_REREAD_CONF")]
    RereadConf = 4,
    /// Finish outstanding work, then exit.
    #[strum(serialize = "CMD_EXIT_WHEN_DONE")]
    ExitWhenDone = 5,
    /// Send a UDP packet.
    #[strum(serialize = "CMD_SEND_UDP_PACKET")]
    SendUdpPacket = 6,
    /// Timer tick.
    #[strum(serialize = "CMD_TIMER_SIGNAL")]
    TimerSignal = 7,
    /// Child process signal.
    #[strum(serialize = "CMD_CHILD_SIGNAL")]
    ChildSignal = 8,
    /// Application-defined command.
    #[strum(serialize = "CMD_APP")]
    App = 9,
    /// Immediate shutdown.
    #[strum(serialize = "CMD_SHUTDOWN")]
    Shutdown = 10,
    /// Supervisor core configuration.
    #[strum(serialize = "CMD_NUCLEUS_CONF")]
    NucleusConf = 11,
    /// Dump internal state.
    #[strum(serialize = "CMD_DUMP_STATE")]
    DumpState = 12,
    /// Network interface configuration.
    #[strum(serialize = "CMD_NETWORKIF_CONF")]
    NetworkIfConf = 13,
    /// Queue drained marker.
    #[strum(serialize = "CMD_END_OF_QUEUE")]
    EndOfQueue = 14,
    /// Main configuration.
    #[strum(serialize = "CMD_MAIN_CONF")]
    MainConf = 15,
    /// Persistent application control; see the `cmd` named argument.
    #[strum(serialize = "CMD_PERSISTENT_APP")]
    PersistentApp = 16,
    /// Generic event command.
    #[strum(serialize = "CMD_EVENT")]
    Event = 17,
    /// Worker configuration.
    #[strum(serialize = "CMD_WORKER_CONF")]
    WorkerConf = 18,
}

impl CommandType {
    /// Returns the integer code carried on the wire.
    #[must_use]
    pub const fn code(self) -> i64 {
        self as i64
    }

    /// Looks up the command for a wire code.
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        u8::try_from(code).ok().and_then(Self::from_repr)
    }

    /// Returns the symbolic name, for example `CMD_STATS`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CommandType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> Deserialize<'de> for CommandType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let code = int_from_value(&raw)
            .ok_or_else(|| D::Error::custom(format!("expected a command code, found {raw}")))?;
        Self::from_code(code).ok_or_else(|| D::Error::custom(format!("unknown command code {code}")))
    }
}

/// Routing section (`part1`): correlation and destination.
///
/// The event type code is not stored here; the codec injects it on encode and
/// lifts it out on decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routing {
    /// Opaque correlation id echoed back by replies.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub reference: Option<String>,
    /// Transport-specific return address.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub return_fd: Option<String>,
    /// Destination queue name.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub dest_queue: Option<String>,
    /// Keys not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Metadata section (`part2`): tracing and lifetime hints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Free-form trace text.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub trace: Option<String>,
    /// Timestamp associated with the trace.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub trace_timestamp: Option<String>,
    /// Absolute expiry time in epoch seconds.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_int"
    )]
    pub expiry_time: Option<i64>,
    /// Lifetime in seconds.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_int"
    )]
    pub lifetime: Option<i64>,
    /// Delivery attempts so far.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_int"
    )]
    pub retries: Option<i64>,
    /// Worker process id.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_int"
    )]
    pub wpid: Option<i64>,
    /// Keys not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// System parameter section (`sysParams`).
///
/// Flags travel as integers 0/1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemParams {
    /// Request parsing of old style text responses.
    #[serde(
        rename = "bStandardResponse",
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "lenient::flag",
        deserialize_with = "lenient::opt_flag"
    )]
    pub standard_response: Option<bool>,
    /// Command code for [`EventType::Command`] events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandType>,
    /// Target URL.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub url: Option<String>,
    /// Script to execute.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub script_name: Option<String>,
    /// Result text.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub result: Option<String>,
    /// Success flag.
    #[serde(
        rename = "bSuccess",
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "lenient::flag",
        deserialize_with = "lenient::opt_flag"
    )]
    pub success: Option<bool>,
    /// Set by a stream peer that intends to send a further response.
    #[serde(
        rename = "bExpectReply",
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "lenient::flag",
        deserialize_with = "lenient::opt_flag"
    )]
    pub expect_reply: Option<bool>,
    /// Diagnostic text for failures.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub error_string: Option<String>,
    /// Failure classification.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub failure_cause: Option<String>,
    /// Free-form system parameter.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub system_param: Option<String>,
    /// Execution time in seconds.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_int"
    )]
    pub elapsed_time: Option<i64>,
    /// Marks events synthesised by recovery.
    #[serde(
        rename = "bGeneratedRecoveryEvent",
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "lenient::flag",
        deserialize_with = "lenient::opt_flag"
    )]
    pub generated_recovery_event: Option<bool>,
    /// Keys not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Which representation an [`ExecParams`] container currently uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ExecMode {
    /// Keyed arguments.
    Named,
    /// Ordered arguments.
    Positional,
}

/// Execution parameter section (`execParams`).
///
/// The section is either a JSON object of named arguments or a JSON array of
/// positional arguments, never both. Switching modes is always an explicit
/// call to [`ExecParams::make_named`] or [`ExecParams::make_positional`] and
/// discards the previous contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecParams {
    /// Keyed arguments.
    Named(Map<String, Value>),
    /// Ordered arguments.
    Positional(Vec<Value>),
}

impl Default for ExecParams {
    fn default() -> Self {
        Self::Named(Map::new())
    }
}

impl ExecParams {
    /// Returns the active representation.
    #[must_use]
    pub const fn mode(&self) -> ExecMode {
        match self {
            Self::Named(_) => ExecMode::Named,
            Self::Positional(_) => ExecMode::Positional,
        }
    }

    /// Returns the number of arguments in either mode.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Named(map) => map.len(),
            Self::Positional(items) => items.len(),
        }
    }

    /// Returns `true` when no arguments are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the named arguments when in named mode.
    #[must_use]
    pub const fn named(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Named(map) => Some(map),
            Self::Positional(_) => None,
        }
    }

    /// Returns the positional arguments when in positional mode.
    #[must_use]
    pub fn positional(&self) -> Option<&[Value]> {
        match self {
            Self::Named(_) => None,
            Self::Positional(items) => Some(items),
        }
    }

    /// Switches to named mode, dropping positional arguments if present.
    pub fn make_named(&mut self) -> &mut Map<String, Value> {
        if let Self::Positional(_) = self {
            *self = Self::Named(Map::new());
        }
        match self {
            Self::Named(map) => map,
            Self::Positional(_) => unreachable_mode(),
        }
    }

    /// Switches to positional mode, dropping named arguments if present.
    pub fn make_positional(&mut self) -> &mut Vec<Value> {
        if let Self::Named(_) = self {
            *self = Self::Positional(Vec::new());
        }
        match self {
            Self::Positional(items) => items,
            Self::Named(_) => unreachable_mode(),
        }
    }

    /// Inserts a named argument without changing mode.
    ///
    /// # Errors
    ///
    /// Returns [`ExecModeError`] when the container is positional.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, ExecModeError> {
        match self {
            Self::Named(map) => Ok(map.insert(key.into(), value.into())),
            Self::Positional(_) => Err(ExecModeError {
                required: ExecMode::Named,
                actual: ExecMode::Positional,
            }),
        }
    }

    /// Appends a positional argument without changing mode.
    ///
    /// # Errors
    ///
    /// Returns [`ExecModeError`] when the container is named.
    pub fn push(&mut self, value: impl Into<Value>) -> Result<(), ExecModeError> {
        match self {
            Self::Positional(items) => {
                items.push(value.into());
                Ok(())
            }
            Self::Named(_) => Err(ExecModeError {
                required: ExecMode::Positional,
                actual: ExecMode::Named,
            }),
        }
    }

    /// Looks up a named argument; `None` in positional mode.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.named().and_then(|map| map.get(key))
    }
}

#[expect(
    clippy::unreachable,
    reason = "variant is assigned on the preceding line"
)]
fn unreachable_mode() -> ! {
    unreachable!("execution parameter mode was just assigned")
}

/// One txProc event.
///
/// The four groups are public so callers can set any field directly; the
/// accessor methods cover the fields the worker runtime reads and writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    event_type: EventType,
    /// Routing section.
    pub routing: Routing,
    /// Metadata section.
    pub metadata: Metadata,
    /// System parameter section.
    pub system: SystemParams,
    /// Execution parameter section.
    pub exec: ExecParams,
}

impl Event {
    /// Creates an empty event of the given type.
    #[must_use]
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            ..Self::default()
        }
    }

    /// Returns the event type.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Replaces the event type.
    pub const fn set_event_type(&mut self, event_type: EventType) {
        self.event_type = event_type;
    }

    /// Returns the correlation reference.
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        self.routing.reference.as_deref()
    }

    /// Sets the correlation reference.
    pub fn set_reference(&mut self, reference: impl Into<String>) {
        self.routing.reference = Some(reference.into());
    }

    /// Returns the destination queue.
    #[must_use]
    pub fn dest_queue(&self) -> Option<&str> {
        self.routing.dest_queue.as_deref()
    }

    /// Sets the destination queue.
    pub fn set_dest_queue(&mut self, queue: impl Into<String>) {
        self.routing.dest_queue = Some(queue.into());
    }

    /// Returns the transport return address.
    #[must_use]
    pub fn return_fd(&self) -> Option<&str> {
        self.routing.return_fd.as_deref()
    }

    /// Sets the transport return address.
    pub fn set_return_fd(&mut self, return_fd: impl Into<String>) {
        self.routing.return_fd = Some(return_fd.into());
    }

    /// Returns the command code, if any.
    #[must_use]
    pub const fn command(&self) -> Option<CommandType> {
        self.system.command
    }

    /// Sets the command code.
    pub const fn set_command(&mut self, command: CommandType) {
        self.system.command = Some(command);
    }

    /// Returns `true` when `bSuccess` is set.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.system.success, Some(true))
    }

    /// Sets `bSuccess`.
    pub const fn set_success(&mut self, success: bool) {
        self.system.success = Some(success);
    }

    /// Returns `true` when `bExpectReply` is set.
    #[must_use]
    pub const fn expect_reply(&self) -> bool {
        matches!(self.system.expect_reply, Some(true))
    }

    /// Sets `bExpectReply`.
    pub const fn set_expect_reply(&mut self, expect_reply: bool) {
        self.system.expect_reply = Some(expect_reply);
    }

    /// Returns the result text.
    #[must_use]
    pub fn result(&self) -> Option<&str> {
        self.system.result.as_deref()
    }

    /// Sets the result text.
    pub fn set_result(&mut self, result: impl Into<String>) {
        self.system.result = Some(result.into());
    }

    /// Returns the error string.
    #[must_use]
    pub fn error_string(&self) -> Option<&str> {
        self.system.error_string.as_deref()
    }

    /// Sets the error string.
    pub fn set_error_string(&mut self, error: impl Into<String>) {
        self.system.error_string = Some(error.into());
    }

    /// Sets the failure cause.
    pub fn set_failure_cause(&mut self, cause: impl Into<String>) {
        self.system.failure_cause = Some(cause.into());
    }

    // ---- named arguments -------------------------------------------------

    /// Sets a named argument, switching to named mode if needed.
    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.exec.make_named().insert(key.into(), value.into());
    }

    /// Returns the raw named argument.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.exec.get(key)
    }

    /// Returns `true` when the named argument exists.
    #[must_use]
    pub fn has_param(&self, key: &str) -> bool {
        self.param(key).is_some()
    }

    /// Removes a named argument.
    pub fn remove_param(&mut self, key: &str) -> Option<Value> {
        match &mut self.exec {
            ExecParams::Named(map) => map.remove(key),
            ExecParams::Positional(_) => None,
        }
    }

    /// Returns a named argument rendered as text.
    #[must_use]
    pub fn param_str(&self, key: &str) -> Option<String> {
        self.param(key).and_then(string_from_value)
    }

    /// Returns a named argument coerced to a signed integer.
    #[must_use]
    pub fn param_i64(&self, key: &str) -> Option<i64> {
        self.param(key).and_then(int_from_value)
    }

    /// Returns a named argument coerced to an unsigned integer.
    #[must_use]
    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.param_i64(key).and_then(|n| u64::try_from(n).ok())
    }

    /// Returns a named argument coerced to a float.
    #[must_use]
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        match self.param(key)? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    // ---- positional arguments --------------------------------------------

    /// Appends a positional argument, switching to positional mode if needed.
    pub fn push_positional(&mut self, value: impl Into<Value>) {
        self.exec.make_positional().push(value.into());
    }

    /// Inserts a positional argument at the front, switching mode if needed.
    pub fn prepend_positional(&mut self, value: impl Into<Value>) {
        self.exec.make_positional().insert(0, value.into());
    }

    /// Returns the positional argument at `index`.
    #[must_use]
    pub fn positional(&self, index: usize) -> Option<&Value> {
        self.exec.positional().and_then(|items| items.get(index))
    }

    /// Replaces the positional argument at `index`.
    ///
    /// Returns `false` when the index is out of range or the container is
    /// named.
    pub fn set_positional(&mut self, index: usize, value: impl Into<Value>) -> bool {
        match &mut self.exec {
            ExecParams::Positional(items) => items.get_mut(index).is_some_and(|slot| {
                *slot = value.into();
                true
            }),
            ExecParams::Named(_) => false,
        }
    }

    /// Removes and returns the positional argument at `index`.
    pub fn remove_positional(&mut self, index: usize) -> Option<Value> {
        match &mut self.exec {
            ExecParams::Positional(items) if index < items.len() => Some(items.remove(index)),
            _ => None,
        }
    }

    /// Removes and returns the first positional argument.
    pub fn shift_positional(&mut self) -> Option<Value> {
        self.remove_positional(0)
    }

    /// Returns the number of positional arguments; zero in named mode.
    #[must_use]
    pub fn positional_len(&self) -> usize {
        self.exec.positional().map_or(0, <[Value]>::len)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.event_type)?;
        if let Some(queue) = self.dest_queue() {
            write!(f, " q:'{queue}'")?;
        }
        if let Some(reference) = self.reference() {
            write!(f, " ref:'{reference}'")?;
        }
        if let Some(fd) = self.return_fd().filter(|fd| *fd != "-1") {
            write!(f, " rFd:{fd}")?;
        }
        let system = &self.system;
        if let Some(command) = system.command.filter(|c| *c != CommandType::None) {
            write!(f, " {command}")?;
        }
        if let Some(url) = &system.url {
            write!(f, " url:{url}")?;
        }
        if let Some(script) = &system.script_name {
            write!(f, " scriptName:'{script}'")?;
        }
        if let Some(result) = &system.result {
            write!(f, " result:'{result}'")?;
        }
        if let Some(success) = system.success {
            write!(f, " bSuccess:{}", u8::from(success))?;
        }
        if let Some(error) = &system.error_string {
            write!(f, " errorString:{error}")?;
        }
        if let Some(cause) = &system.failure_cause {
            write!(f, " failureCause:{cause}")?;
        }
        if let Some(param) = &system.system_param {
            write!(f, " systemParam:{param}")?;
        }
        if let Some(trace) = &self.metadata.trace {
            write!(f, " traceB||{trace}||traceE")?;
        }
        if let Some(stamp) = &self.metadata.trace_timestamp {
            write!(f, " traceTS:{stamp}")?;
        }
        Ok(())
    }
}
