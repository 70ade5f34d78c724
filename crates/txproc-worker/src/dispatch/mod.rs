//! Persistent event dispatch for txProc workers.
//!
//! The [`EventLoop`] reads framed events from the primary input, routes them
//! by event type and command to [`WorkerHooks`], writes exactly one reply per
//! input and delivers follow-up events through an
//! [`EventSink`](crate::transport::EventSink).
//!
//! ## Routing
//!
//! | event | hook |
//! |---|---|
//! | `EV_COMMAND` / `CMD_REOPEN_LOG` | log reopened, then [`WorkerHooks::log_reopened`] |
//! | `EV_COMMAND` / `CMD_STATS` | [`WorkerHooks::generate_stats`] |
//! | `EV_COMMAND` / `CMD_EXIT_WHEN_DONE` | terminate, then [`WorkerHooks::prepare_to_exit`] |
//! | `EV_COMMAND` / `CMD_PERSISTENT_APP` | `cmd` argument, see below |
//! | `EV_COMMAND` / other | [`WorkerHooks::unhandled_command`] |
//! | `EV_PERL`, `EV_URL`, `EV_RESULT`, `EV_BASE`, `EV_ERROR` | the matching `on_*` hook |
//! | anything else | [`WorkerHooks::on_other`] |
//!
//! Persistent-app commands: `stop` freezes, `start` unfreezes, `exit`
//! terminates and runs the pre-exit hook, `startupinfo` records `ownqueue` and
//! `workerpid`. A missing or unknown `cmd` goes to
//! [`WorkerHooks::user_persistent_command`].

mod context;
mod errors;
mod event_loop;
mod hooks;
mod reply;
mod router;

pub use self::context::WorkerContext;
pub use self::errors::{HookError, LoopError};
pub use self::event_loop::{EventLoop, PrimaryStreams};
pub use self::hooks::{DefaultHooks, HookResult, WorkerHooks};
pub use self::reply::{GENERATED_BY, RESULT_QUEUE};
