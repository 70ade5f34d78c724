//! Structured telemetry initialisation for the worker.
//!
//! Logs go to `<log_dir>/<app_name>.log` unless the configuration asks for
//! stderr. The file sink sits behind a shared handle so `CMD_REOPEN_LOG` can
//! swap the descriptor after an external rotation without reinstalling the
//! subscriber.

use std::fs::{self, File, OpenOptions};
use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, MakeWriter};

use txproc_config::{Config, LogFormat};

pub(crate) const TELEMETRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::telemetry");

static TELEMETRY: OnceCell<TelemetryHandle> = OnceCell::new();

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
    /// Neither the configured nor the emergency log file could be opened.
    #[error("failed to open log file {path}: {source}")]
    Open {
        /// File that could not be opened.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

#[derive(Debug)]
enum SinkTarget {
    Stderr,
    File { path: Utf8PathBuf, file: File },
}

/// Reopenable destination for formatted log lines.
#[derive(Debug, Clone)]
pub struct LogSink {
    target: Arc<Mutex<SinkTarget>>,
}

impl LogSink {
    /// Sink writing to the process's stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::from_target(SinkTarget::Stderr)
    }

    /// Opens `path` for appending, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns the I/O error when the directory or file cannot be created.
    pub fn open(path: &Utf8Path) -> io::Result<Self> {
        let file = open_append(path)?;
        Ok(Self::from_target(SinkTarget::File {
            path: path.to_path_buf(),
            file,
        }))
    }

    fn from_target(target: SinkTarget) -> Self {
        Self {
            target: Arc::new(Mutex::new(target)),
        }
    }

    /// File currently written to, if any.
    #[must_use]
    pub fn path(&self) -> Option<Utf8PathBuf> {
        match &*self.lock() {
            SinkTarget::Stderr => None,
            SinkTarget::File { path, .. } => Some(path.clone()),
        }
    }

    /// Closes and reopens the log file at the same path.
    ///
    /// A stderr sink is left untouched. On failure the previous descriptor is
    /// kept so logging continues to the rotated file.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while opening the file again.
    pub fn reopen(&self) -> io::Result<()> {
        let mut target = self.lock();
        if let SinkTarget::File { path, file } = &mut *target {
            let _ = file.flush();
            *file = open_append(path)?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, SinkTarget> {
        self.target.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_stderr(&self) -> bool {
        matches!(&*self.lock(), SinkTarget::Stderr)
    }
}

fn open_append(path: &Utf8Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Writer handed to the formatter for one log record.
#[derive(Debug)]
pub struct LogWriter {
    target: Arc<Mutex<SinkTarget>>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut *self.target.lock().unwrap_or_else(PoisonError::into_inner) {
            SinkTarget::Stderr => io::stderr().write(buf),
            SinkTarget::File { file, .. } => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut *self.target.lock().unwrap_or_else(PoisonError::into_inner) {
            SinkTarget::Stderr => io::stderr().flush(),
            SinkTarget::File { file, .. } => file.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            target: Arc::clone(&self.target),
        }
    }
}

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Clone)]
pub struct TelemetryHandle {
    sink: LogSink,
}

impl TelemetryHandle {
    /// Wraps a sink that is not registered as the global subscriber.
    #[must_use]
    pub const fn new(sink: LogSink) -> Self {
        Self { sink }
    }

    /// Sink receiving the formatted output.
    #[must_use]
    pub const fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// Reopens the log file after rotation.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Open`] when the file cannot be reopened.
    pub fn reopen(&self) -> Result<(), TelemetryError> {
        self.sink.reopen().map_err(|source| TelemetryError::Open {
            path: self.sink.path().unwrap_or_default(),
            source,
        })
    }
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// Repeated calls are idempotent: the first invocation installs the global
/// subscriber and later invocations return a handle to the same sink.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY
        .get_or_try_init(|| install_subscriber(config))
        .cloned()
}

struct OpenFailure {
    path: Utf8PathBuf,
    error: io::Error,
}

fn open_sink(config: &Config) -> Result<(LogSink, Option<OpenFailure>), TelemetryError> {
    if config.log_to_stderr() {
        return Ok((LogSink::stderr(), None));
    }
    let path = config.log_path();
    match LogSink::open(&path) {
        Ok(sink) => Ok((sink, None)),
        Err(error) => {
            let emergency = config.emergency_log_path();
            let sink = LogSink::open(&emergency).map_err(|source| TelemetryError::Open {
                path: emergency,
                source,
            })?;
            Ok((sink, Some(OpenFailure { path, error })))
        }
    }
}

fn install_subscriber(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;
    let (sink, failure) = open_sink(config)?;
    let ansi = sink.is_stderr() && io::stderr().is_terminal();

    let builder = |filter: EnvFilter, writer: LogSink| {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(writer)
            .with_ansi(ansi)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => {
            let json_builder = builder(filter, sink.clone()).json();
            Box::new(json_builder.flatten_event(true).finish())
        }
        LogFormat::Compact => Box::new(builder(filter, sink.clone()).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;

    if let Some(OpenFailure { path, error }) = failure {
        warn!(
            target: TELEMETRY_TARGET,
            path = %path,
            emergency = ?sink.path(),
            %error,
            "failed to open the main log, writing to the emergency log"
        );
    }
    Ok(TelemetryHandle::new(sink))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::Utf8PathBuf;
    use rstest::rstest;
    use tempfile::TempDir;

    use super::LogSink;

    fn utf8(dir: &TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(name)).expect("temporary path is UTF-8")
    }

    #[rstest]
    fn open_creates_missing_parent_directories() {
        let dir = TempDir::new().expect("temp dir");
        let path = utf8(&dir, "nested/worker.log");
        let sink = LogSink::open(&path).expect("sink should open");
        assert_eq!(sink.path(), Some(path.clone()));
        assert!(path.exists());
    }

    #[rstest]
    fn reopen_follows_rotation() {
        use std::io::Write;
        use tracing_subscriber::fmt::MakeWriter;

        let dir = TempDir::new().expect("temp dir");
        let path = utf8(&dir, "worker.log");
        let rotated = utf8(&dir, "worker.log.1");
        let sink = LogSink::open(&path).expect("sink should open");

        sink.make_writer().write_all(b"before\n").expect("write");
        fs::rename(&path, &rotated).expect("rotate");
        sink.reopen().expect("reopen");
        sink.make_writer().write_all(b"after\n").expect("write");

        assert_eq!(fs::read_to_string(&rotated).expect("read"), "before\n");
        assert_eq!(fs::read_to_string(&path).expect("read"), "after\n");
    }

    #[rstest]
    fn reopen_on_stderr_is_a_no_op() {
        let sink = LogSink::stderr();
        sink.reopen().expect("stderr reopen succeeds");
        assert_eq!(sink.path(), None);
    }
}
