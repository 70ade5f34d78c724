//! Runtime for persistent txProc workers.
//!
//! A worker is a long-lived process started by txProc. It reads framed
//! events from stdin, hands each to an application-supplied set of
//! [`WorkerHooks`], writes exactly one reply per event to stdout, and sends
//! any follow-up events back to txProc over a Unix datagram socket (or a TCP
//! stream when a frame is too large for one datagram).
//!
//! Startup follows [`bootstrap_with`]: configuration is loaded through
//! [`txproc_config`], structured telemetry is installed, and the datagram
//! socket is bound and connected. Health reporting hooks emit structured
//! events at each stage. Socket failures abort startup; once the loop runs,
//! decode, handler and delivery failures are contained to the event that
//! caused them.
//!
//! The worker starts *frozen*: regular tasks do not run until txProc sends
//! the persistent-app command `cmd=start`.

mod bootstrap;
pub mod clock;
pub mod dispatch;
mod health;
mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, BootstrapStage, ConfigLoader, SystemConfigLoader, Worker, bootstrap_with,
};
pub use dispatch::{
    DefaultHooks, EventLoop, HookError, HookResult, LoopError, PrimaryStreams, WorkerContext,
    WorkerHooks,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use telemetry::{LogSink, TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
