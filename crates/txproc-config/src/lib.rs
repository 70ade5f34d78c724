//! Layered configuration shared by txProc worker binaries.
//!
//! Values are merged by `ortho_config` in increasing precedence: built-in
//! defaults, a TOML file named by `--config-path` or `TXPROC_CONFIG_PATH`,
//! `TXPROC_*` environment variables and finally command-line flags. Every
//! field is optional in the merged document; the accessor methods apply the
//! defaults from [`defaults`].

mod defaults;
mod logging;
mod socket;

use std::ffi::OsString;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_APP_NAME, DEFAULT_LOG_FILTER, default_app_name, default_log_dir, default_log_filter,
    default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{LocalSocket, SocketPreparationError};

/// Directory used for the log file when the configured one is unusable.
pub const EMERGENCY_LOG_DIR: &str = "/tmp";

/// Sentinel destination meaning "write follow-up events to my own stdout".
pub const PIPE_DESTINATION: &str = "-";

/// Worker configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TXPROC")]
pub struct Config {
    /// Application identifier; names the log and socket files and tags
    /// replies with `generatedby`.
    pub app_name: Option<String>,
    /// Directory for the log file and the local datagram socket.
    pub log_dir: Option<Utf8PathBuf>,
    /// `tracing` filter expression.
    pub log_filter: Option<String>,
    /// Log output format.
    pub log_format: Option<LogFormat>,
    /// Write logs to stderr instead of the log file.
    pub log_to_stderr: Option<bool>,
    /// Datagram socket of the txProc peer.
    pub peer_socket: Option<Utf8PathBuf>,
    /// Host used for stream delivery of oversized events.
    pub fallback_host: Option<String>,
    /// Port number, or TCP service name from `/etc/services`, used for
    /// stream delivery of oversized events.
    pub fallback_service: Option<String>,
    /// Server name for follow-up events; `-` routes them to stdout.
    pub destination_server: Option<String>,
    /// Track minute, hour, day and month rollovers each loop iteration.
    pub check_date_changes: Option<bool>,
    /// Do not report a rollover when the new value is zero.
    pub date_run_skip_zero: Option<bool>,
    /// Log every dispatched event and reply at info level.
    pub verbose: Option<bool>,
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load()
    }

    /// Loads configuration from an explicit argument list.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Application identifier.
    pub fn app_name(&self) -> &str {
        self.app_name.as_deref().unwrap_or(DEFAULT_APP_NAME)
    }

    /// Directory for the log file and local socket.
    pub fn log_dir(&self) -> Utf8PathBuf {
        self.log_dir.clone().unwrap_or_else(default_log_dir)
    }

    /// Filter expression for the log subscriber.
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Log output format.
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_default()
    }

    /// Whether logs go to stderr.
    pub fn log_to_stderr(&self) -> bool {
        self.log_to_stderr.unwrap_or(false)
    }

    /// Log file path: `<log_dir>/<app_name>.log`.
    pub fn log_path(&self) -> Utf8PathBuf {
        self.log_dir().join(format!("{}.log", self.app_name()))
    }

    /// Log file used when [`Config::log_path`] cannot be opened.
    pub fn emergency_log_path(&self) -> Utf8PathBuf {
        Utf8Path::new(EMERGENCY_LOG_DIR).join(format!("{}.log", self.app_name()))
    }

    /// The worker's own datagram socket: `<log_dir>/<app_name>.sock`.
    pub fn local_socket(&self) -> LocalSocket {
        LocalSocket::new(self.log_dir().join(format!("{}.sock", self.app_name())))
    }

    /// Datagram socket of the txProc peer, when configured.
    pub fn peer_socket(&self) -> Option<&Utf8Path> {
        self.peer_socket.as_deref()
    }

    /// Stream fallback `(host, service)`; present only when both are set.
    pub fn fallback(&self) -> Option<(&str, &str)> {
        self.fallback_host
            .as_deref()
            .zip(self.fallback_service.as_deref())
            .filter(|(host, service)| !host.is_empty() && !service.is_empty())
    }

    /// Destination server name for follow-up events.
    pub fn destination_server(&self) -> Option<&str> {
        self.destination_server.as_deref()
    }

    /// Whether follow-up events are written to this process's stdout.
    pub fn routes_to_pipe(&self) -> bool {
        self.destination_server() == Some(PIPE_DESTINATION)
    }

    /// Whether rollover flags are computed.
    pub fn check_date_changes(&self) -> bool {
        self.check_date_changes.unwrap_or(false)
    }

    /// Whether a rollover to zero is suppressed.
    pub fn date_run_skip_zero(&self) -> bool {
        self.date_run_skip_zero.unwrap_or(false)
    }

    /// Whether dispatched events are logged at info level.
    pub fn verbose(&self) -> bool {
        self.verbose.unwrap_or(false)
    }
}
