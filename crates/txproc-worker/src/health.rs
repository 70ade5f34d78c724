//! Lifecycle notifications for worker startup and shutdown.
//!
//! Bootstrap emits `bootstrap_starting` followed by exactly one of
//! `bootstrap_succeeded` or `bootstrap_failed`. A worker whose loop was
//! started then emits exactly one of `worker_stopped` or `worker_failed`.

use txproc_config::Config;

use crate::bootstrap::BootstrapError;
use crate::dispatch::LoopError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Receives worker lifecycle notifications.
pub trait HealthReporter: Send + Sync {
    /// Configuration is about to be loaded.
    fn bootstrap_starting(&self);

    /// Telemetry and sockets are ready; the loop can start.
    fn bootstrap_succeeded(&self, config: &Config);

    /// A bootstrap step failed. The worker does not start.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// The loop reached a clean termination after decoding `processed` events.
    fn worker_stopped(&self, processed: u64);

    /// The loop could not continue.
    fn worker_failed(&self, error: &LoopError);
}

/// Reporter writing each notification as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(target: HEALTH_TARGET, event = "bootstrap_starting", "worker starting");
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            app = config.app_name(),
            local_socket = %config.local_socket(),
            peer_socket = ?config.peer_socket(),
            fallback = ?config.fallback(),
            pipe = config.routes_to_pipe(),
            "worker ready"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            stage = error.stage().as_str(),
            %error,
            "worker could not start"
        );
    }

    fn worker_stopped(&self, processed: u64) {
        tracing::info!(target: HEALTH_TARGET, event = "worker_stopped", processed, "worker exiting");
    }

    fn worker_failed(&self, error: &LoopError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "worker_failed",
            %error,
            "event loop aborted"
        );
    }
}
