//! Event type and command routing onto hooks.

use tracing::info;

use txproc_wire::{CommandType, Event, EventType};

use super::context::WorkerContext;
use super::hooks::{HookResult, WorkerHooks};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Named argument selecting a persistent-app control action.
const PERSISTENT_CMD: &str = "cmd";

/// Persistent-app control actions carried in the `cmd` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PersistentAction {
    Stop,
    Start,
    Exit,
    StartupInfo,
}

impl PersistentAction {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "stop" => Some(Self::Stop),
            "start" => Some(Self::Start),
            "exit" => Some(Self::Exit),
            "startupinfo" => Some(Self::StartupInfo),
            _ => None,
        }
    }
}

/// Routes one event to the hook for its type.
pub(crate) fn route<H>(
    hooks: &mut H,
    context: &mut WorkerContext,
    event: &Event,
    follow_ups: &mut Vec<Event>,
) -> HookResult
where
    H: WorkerHooks + ?Sized,
{
    if context.is_verbose() {
        info!(target: DISPATCH_TARGET, event = %event, "handling event");
    }
    match event.event_type() {
        EventType::Command => route_command(hooks, context, event, follow_ups),
        EventType::Perl => hooks.on_perl(context, event, follow_ups),
        EventType::Url => hooks.on_url(context, event, follow_ups),
        EventType::Result => hooks.on_result(context, event, follow_ups),
        EventType::Base => hooks.on_base(context, event, follow_ups),
        EventType::Error => hooks.on_error(context, event, follow_ups),
        _ => hooks.on_other(context, event, follow_ups),
    }
}

fn route_command<H>(
    hooks: &mut H,
    context: &mut WorkerContext,
    event: &Event,
    follow_ups: &mut Vec<Event>,
) -> HookResult
where
    H: WorkerHooks + ?Sized,
{
    match event.command() {
        Some(CommandType::ReopenLog) => {
            context.reopen_log();
            hooks.log_reopened(context, event, follow_ups)
        }
        Some(CommandType::Stats) => hooks.generate_stats(context, event, follow_ups),
        Some(CommandType::ExitWhenDone) => {
            context.request_termination();
            hooks.prepare_to_exit(context, event, follow_ups)
        }
        Some(CommandType::PersistentApp) => route_persistent(hooks, context, event, follow_ups),
        _ => hooks.unhandled_command(context, event, follow_ups),
    }
}

fn route_persistent<H>(
    hooks: &mut H,
    context: &mut WorkerContext,
    event: &Event,
    follow_ups: &mut Vec<Event>,
) -> HookResult
where
    H: WorkerHooks + ?Sized,
{
    let action = event
        .param_str(PERSISTENT_CMD)
        .as_deref()
        .and_then(PersistentAction::parse);
    match action {
        None => hooks.user_persistent_command(context, event, follow_ups),
        Some(PersistentAction::Stop) => {
            context.freeze();
            info!(target: DISPATCH_TARGET, "freezing execution");
            Ok(())
        }
        Some(PersistentAction::Start) => {
            context.unfreeze();
            info!(target: DISPATCH_TARGET, "unfreezing execution");
            Ok(())
        }
        Some(PersistentAction::Exit) => {
            context.request_termination();
            hooks.prepare_to_exit(context, event, follow_ups)?;
            info!(target: DISPATCH_TARGET, "exiting");
            Ok(())
        }
        Some(PersistentAction::StartupInfo) => {
            context.record_startup_info(event.param_str("ownqueue"), event.param_i64("workerpid"));
            info!(
                target: DISPATCH_TARGET,
                own_queue = context.own_queue(),
                worker_pid = context.worker_pid(),
                "startup info recorded"
            );
            Ok(())
        }
    }
}
