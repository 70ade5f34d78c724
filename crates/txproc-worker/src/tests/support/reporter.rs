//! Health reporter that keeps every notification for later inspection.

use std::sync::{Mutex, PoisonError};

use txproc_config::Config;

use crate::bootstrap::{BootstrapError, BootstrapStage};
use crate::dispatch::LoopError;
use crate::health::HealthReporter;

/// One lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    Starting,
    Ready { app: String },
    Failed { stage: BootstrapStage, message: String },
    Stopped { processed: u64 },
    LoopFailed { message: String },
}

/// Collects notifications in arrival order.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter(Mutex<Vec<HealthEvent>>);

impl RecordingHealthReporter {
    pub fn events(&self) -> Vec<HealthEvent> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, event: HealthEvent) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.push(HealthEvent::Starting);
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        self.push(HealthEvent::Ready {
            app: config.app_name().to_owned(),
        });
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.push(HealthEvent::Failed {
            stage: error.stage(),
            message: error.to_string(),
        });
    }

    fn worker_stopped(&self, processed: u64) {
        self.push(HealthEvent::Stopped { processed });
    }

    fn worker_failed(&self, error: &LoopError) {
        self.push(HealthEvent::LoopFailed {
            message: error.to_string(),
        });
    }
}
