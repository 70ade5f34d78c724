//! Worker bootstrap orchestration.

use std::fmt;
use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use txproc_config::Config;

use crate::clock::RolloverTracker;
use crate::dispatch::{EventLoop, LoopError, PrimaryStreams, WorkerContext, WorkerHooks};
use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{EventSender, FdPoller, SocketSetupError};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the worker configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The datagram socket could not be created.
    #[error("failed to set up worker socket: {source}")]
    Socket {
        /// Socket setup error.
        #[source]
        source: SocketSetupError,
    },
}

/// Bootstrap step a [`BootstrapError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapStage {
    /// Loading configuration.
    Configuration,
    /// Installing the log subscriber.
    Telemetry,
    /// Binding and connecting the datagram socket.
    Socket,
}

impl BootstrapStage {
    /// Stable lowercase name used in structured logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Telemetry => "telemetry",
            Self::Socket => "socket",
        }
    }
}

impl BootstrapError {
    /// Step that failed.
    #[must_use]
    pub const fn stage(&self) -> BootstrapStage {
        match self {
            Self::Configuration { .. } => BootstrapStage::Configuration,
            Self::Telemetry { .. } => BootstrapStage::Telemetry,
            Self::Socket { .. } => BootstrapStage::Socket,
        }
    }
}

/// Result of a successful bootstrap invocation.
pub struct Worker {
    config: Config,
    sender: EventSender,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
    build: Option<String>,
}

impl Worker {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle.
    #[must_use]
    pub const fn telemetry(&self) -> &TelemetryHandle {
        &self.telemetry
    }

    /// Sets the build identifier logged at startup and on log reopen.
    #[must_use]
    pub fn with_build(mut self, build: impl Into<String>) -> Self {
        self.build = Some(build.into());
        self
    }

    /// Builds the hook-visible context from the configuration.
    #[must_use]
    pub fn context(&self) -> WorkerContext {
        let context = WorkerContext::new(self.config.app_name())
            .with_verbose(self.config.verbose())
            .with_telemetry(self.telemetry.clone());
        match &self.build {
            Some(build) => context.with_build(build.clone()),
            None => context,
        }
    }

    /// Assembles the event loop over `streams` without running it.
    pub fn into_event_loop<H: WorkerHooks>(
        self,
        hooks: H,
        streams: PrimaryStreams,
    ) -> EventLoop<H, EventSender, FdPoller> {
        let context = self.context();
        let event_loop = EventLoop::new(hooks, self.sender, FdPoller::new(), streams, context);
        if self.config.check_date_changes() {
            event_loop.with_rollover_tracking(RolloverTracker::new(self.config.date_run_skip_zero()))
        } else {
            event_loop
        }
    }

    /// Runs the event loop over stdin and stdout until termination.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError`] when the standard streams cannot be opened, the
    /// poll fails or a reply cannot be written.
    pub fn run<H: WorkerHooks>(self, hooks: H) -> Result<u64, LoopError> {
        match PrimaryStreams::stdio() {
            Ok(streams) => self.run_with(hooks, streams),
            Err(source) => {
                let error = LoopError::Stdio { source };
                self.reporter.worker_failed(&error);
                Err(error)
            }
        }
    }

    /// Runs the event loop over `streams` and reports how it ended.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError`] when the poll fails or a reply cannot be written.
    pub fn run_with<H: WorkerHooks>(
        self,
        hooks: H,
        streams: PrimaryStreams,
    ) -> Result<u64, LoopError> {
        let reporter = Arc::clone(&self.reporter);
        let outcome = self.into_event_loop(hooks, streams).run();
        match &outcome {
            Ok(processed) => reporter.worker_stopped(*processed),
            Err(error) => reporter.worker_failed(error),
        }
        outcome
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("config", &self.config)
            .field("sender", &self.sender)
            .field("telemetry", &self.telemetry)
            .field("build", &self.build)
            .finish_non_exhaustive()
    }
}

/// Bootstraps the worker using the supplied collaborators.
///
/// Loads configuration, installs telemetry and creates the datagram socket.
/// Each failure is reported to `reporter` before it is returned; a socket
/// failure is fatal for the worker.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Worker, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let sender = match EventSender::from_config(&config) {
        Ok(sender) => sender,
        Err(source) => {
            let error = BootstrapError::Socket { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    reporter.bootstrap_succeeded(&config);
    Ok(Worker {
        config,
        sender,
        telemetry,
        reporter,
        build: None,
    })
}
