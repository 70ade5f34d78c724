//! State shared between the event loop and hooks.

use std::os::fd::RawFd;

use tracing::{info, warn};

use txproc_wire::Event;

use crate::clock::{LogContext, Rollovers};
use crate::telemetry::TelemetryHandle;

use super::reply;
use super::router::DISPATCH_TARGET;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollRequest {
    Register(RawFd),
    Deregister(RawFd),
}

/// Worker state visible to hooks.
///
/// A worker starts frozen: the regular-tasks hook does not run until a
/// `cmd=start` persistent command arrives.
#[derive(Debug)]
pub struct WorkerContext {
    app_name: String,
    build: Option<String>,
    verbose: bool,
    frozen: bool,
    terminate: bool,
    processed: u64,
    rollovers: Rollovers,
    reply: Option<Event>,
    own_queue: Option<String>,
    worker_pid: Option<i64>,
    log: LogContext,
    telemetry: Option<TelemetryHandle>,
    poll_requests: Vec<PollRequest>,
}

impl WorkerContext {
    /// Creates a frozen context for `app_name`.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            build: None,
            verbose: false,
            frozen: true,
            terminate: false,
            processed: 0,
            rollovers: Rollovers::default(),
            reply: None,
            own_queue: None,
            worker_pid: None,
            log: LogContext::new(),
            telemetry: None,
            poll_requests: Vec::new(),
        }
    }

    /// Sets the build identifier logged at startup and on log reopen.
    #[must_use]
    pub fn with_build(mut self, build: impl Into<String>) -> Self {
        self.build = Some(build.into());
        self
    }

    /// Enables logging of every dispatched event and reply.
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Attaches the telemetry handle reopened by `CMD_REOPEN_LOG`.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: TelemetryHandle) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Application identifier.
    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Build identifier, if one was supplied.
    #[must_use]
    pub fn build(&self) -> Option<&str> {
        self.build.as_deref()
    }

    /// Whether verbose logging is on.
    #[must_use]
    pub const fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Whether regular tasks are suspended.
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Suspends regular tasks.
    pub const fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Resumes regular tasks.
    pub const fn unfreeze(&mut self) {
        self.frozen = false;
    }

    /// Whether the loop stops at the top of the next iteration.
    #[must_use]
    pub const fn should_terminate(&self) -> bool {
        self.terminate
    }

    /// Asks the loop to stop once the current iteration completes.
    pub const fn request_termination(&mut self) {
        self.terminate = true;
    }

    /// Number of input events decoded so far.
    #[must_use]
    pub const fn processed(&self) -> u64 {
        self.processed
    }

    pub(crate) const fn count_processed(&mut self) {
        self.processed += 1;
    }

    /// Calendar boundaries crossed since the flags were last taken.
    #[must_use]
    pub const fn rollovers(&self) -> Rollovers {
        self.rollovers
    }

    /// Returns the rollover flags and clears them.
    pub fn take_rollovers(&mut self) -> Rollovers {
        std::mem::take(&mut self.rollovers)
    }

    pub(crate) const fn record_rollovers(&mut self, rolled: Rollovers) {
        self.rollovers.merge(rolled);
    }

    /// Reply pending for the current input event.
    #[must_use]
    pub const fn reply(&self) -> Option<&Event> {
        self.reply.as_ref()
    }

    /// Mutable access to the pending reply.
    pub const fn reply_mut(&mut self) -> Option<&mut Event> {
        self.reply.as_mut()
    }

    /// Replaces the pending reply.
    pub fn set_reply(&mut self, reply: Event) {
        self.reply = Some(reply);
    }

    /// Removes the pending reply; a bare success is sent in its place.
    pub fn take_reply(&mut self) -> Option<Event> {
        self.reply.take()
    }

    /// Queue name reported by the peer in `cmd=startupinfo`.
    #[must_use]
    pub fn own_queue(&self) -> Option<&str> {
        self.own_queue.as_deref()
    }

    /// Worker pid reported by the peer in `cmd=startupinfo`.
    #[must_use]
    pub const fn worker_pid(&self) -> Option<i64> {
        self.worker_pid
    }

    pub(crate) fn record_startup_info(&mut self, own_queue: Option<String>, worker_pid: Option<i64>) {
        self.own_queue = own_queue;
        self.worker_pid = worker_pid;
    }

    /// Wall-clock snapshot for the current iteration.
    #[must_use]
    pub const fn log(&self) -> &LogContext {
        &self.log
    }

    pub(crate) const fn log_mut(&mut self) -> &mut LogContext {
        &mut self.log
    }

    /// Adds an auxiliary descriptor to the readiness set.
    ///
    /// The change takes effect before the next poll wait. Readiness on the
    /// descriptor is reported to the polled-handle hook.
    ///
    /// The poll set borrows `fd` on every wait without owning it. The caller
    /// must keep the descriptor open until it has called
    /// [`deregister_handle`](Self::deregister_handle) and the loop has reached
    /// its next wait; closing it earlier lets the wait poll a stale or reused
    /// descriptor.
    pub fn register_handle(&mut self, fd: RawFd) {
        self.poll_requests.push(PollRequest::Register(fd));
    }

    /// Removes an auxiliary descriptor from the readiness set.
    ///
    /// Requests are applied in the order they were made, so a descriptor
    /// deregistered here may be closed once the current iteration ends.
    pub fn deregister_handle(&mut self, fd: RawFd) {
        self.poll_requests.push(PollRequest::Deregister(fd));
    }

    pub(crate) fn take_poll_requests(&mut self) -> Vec<PollRequest> {
        std::mem::take(&mut self.poll_requests)
    }

    /// Builds a result event for `event` addressed to its `resultQueue`.
    ///
    /// `status` becomes the `result` field; `err_type` and `error` are added
    /// as the `type` and `error` named arguments when given.
    #[must_use]
    pub fn return_event(
        &self,
        event: &Event,
        err_type: Option<&str>,
        status: &str,
        error: Option<&str>,
    ) -> Event {
        reply::return_event(event, &self.app_name, err_type, status, error)
    }

    pub(crate) fn reopen_log(&self) {
        if let Some(telemetry) = &self.telemetry
            && let Err(error) = telemetry.reopen()
        {
            warn!(target: DISPATCH_TARGET, %error, "failed to reopen log");
        }
        info!(
            target: DISPATCH_TARGET,
            stamp = self.log.stamp(),
            frozen = self.frozen,
            build = self.build(),
            "log reopened"
        );
    }
}
