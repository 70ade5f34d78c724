//! Extension points a concrete worker implements.

use std::os::fd::RawFd;

use tracing::{info, warn};

use txproc_wire::Event;

use super::context::WorkerContext;
use super::errors::HookError;
use super::router::DISPATCH_TARGET;

/// Result returned by every hook.
pub type HookResult = Result<(), HookError>;

/// Callbacks invoked by the event loop.
///
/// Every method has a default. Event handlers receive the event being
/// handled and the follow-up list for the current iteration; pushing onto
/// the list queues an event for delivery, or for re-dispatch when its type
/// is `EV_BASE`. The reply to an input event lives in the context and may be
/// edited or replaced there.
///
/// Request, script and unknown events default to queuing a `failed` result
/// event with the error `no handler`. Result, base and error events default
/// to logging only, since replying to them would loop.
pub trait WorkerHooks {
    /// Runs at the top of every iteration, frozen or not.
    fn start_of_loop(&mut self, context: &mut WorkerContext) -> HookResult {
        let _ = context;
        Ok(())
    }

    /// Runs after the ready sources are handled, only while unfrozen.
    fn regular_tasks(
        &mut self,
        context: &mut WorkerContext,
        follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        let _ = (context, follow_ups);
        Ok(())
    }

    /// Handles readiness on an auxiliary descriptor.
    ///
    /// The default removes the descriptor from the readiness set.
    fn polled_handle(
        &mut self,
        context: &mut WorkerContext,
        fd: RawFd,
        follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        let _ = follow_ups;
        context.deregister_handle(fd);
        warn!(
            target: DISPATCH_TARGET,
            fd,
            "unrecognised handle removed from the poll set"
        );
        Ok(())
    }

    /// Handles `EV_PERL` events.
    fn on_perl(
        &mut self,
        context: &mut WorkerContext,
        event: &Event,
        follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        no_handler(context, "perl", event, follow_ups)
    }

    /// Handles `EV_URL` events.
    fn on_url(
        &mut self,
        context: &mut WorkerContext,
        event: &Event,
        follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        no_handler(context, "url", event, follow_ups)
    }

    /// Handles `EV_RESULT` events.
    fn on_result(
        &mut self,
        context: &mut WorkerContext,
        event: &Event,
        follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        let _ = (context, follow_ups);
        log_unhandled("result", event);
        Ok(())
    }

    /// Handles `EV_BASE` events, both received and re-dispatched follow-ups.
    fn on_base(
        &mut self,
        context: &mut WorkerContext,
        event: &Event,
        follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        let _ = (context, follow_ups);
        log_unhandled("base", event);
        Ok(())
    }

    /// Handles `EV_ERROR` events.
    fn on_error(
        &mut self,
        context: &mut WorkerContext,
        event: &Event,
        follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        let _ = (context, follow_ups);
        log_unhandled("error", event);
        Ok(())
    }

    /// Handles every other event type.
    fn on_other(
        &mut self,
        context: &mut WorkerContext,
        event: &Event,
        follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        no_handler(context, "other", event, follow_ups)
    }

    /// Handles commands without a built-in meaning.
    fn unhandled_command(
        &mut self,
        context: &mut WorkerContext,
        event: &Event,
        follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        let _ = (context, follow_ups);
        info!(
            target: DISPATCH_TARGET,
            command = ?event.command(),
            "unable to handle command"
        );
        Ok(())
    }

    /// Handles `CMD_PERSISTENT_APP` events with no `cmd` or an unknown one.
    fn user_persistent_command(
        &mut self,
        context: &mut WorkerContext,
        event: &Event,
        follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        no_handler(context, "persistent command", event, follow_ups)
    }

    /// Runs after the log target has been reopened.
    fn log_reopened(
        &mut self,
        context: &mut WorkerContext,
        event: &Event,
        follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        let _ = (context, event, follow_ups);
        Ok(())
    }

    /// Handles `CMD_STATS`.
    fn generate_stats(
        &mut self,
        context: &mut WorkerContext,
        event: &Event,
        follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        let _ = (context, event, follow_ups);
        Ok(())
    }

    /// Runs once termination has been requested by `CMD_EXIT_WHEN_DONE` or
    /// `cmd=exit`.
    fn prepare_to_exit(
        &mut self,
        context: &mut WorkerContext,
        event: &Event,
        follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        let _ = (context, event, follow_ups);
        Ok(())
    }
}

/// Hooks with every default in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl WorkerHooks for DefaultHooks {}

fn log_unhandled(kind: &str, event: &Event) {
    info!(target: DISPATCH_TARGET, kind, event = %event, "cannot handle event");
}

fn no_handler(
    context: &WorkerContext,
    kind: &str,
    event: &Event,
    follow_ups: &mut Vec<Event>,
) -> HookResult {
    log_unhandled(kind, event);
    follow_ups.push(context.return_event(event, None, "failed", Some("no handler")));
    Ok(())
}
