//! Test harness utilities for the worker behaviour suites.

mod config_loader;
mod doubles;
mod reporter;

pub use config_loader::{FailingConfigLoader, MissingPeerConfigLoader, TestConfigLoader};
pub use doubles::{MockSink, PollLog, RecordingHooks, ScriptedPoll, SharedBuffer, frames};
pub use reporter::{HealthEvent, RecordingHealthReporter};
