use std::process::ExitCode;
use std::sync::Arc;

use txproc_worker::{
    HookResult, StructuredHealthReporter, SystemConfigLoader, WorkerContext, WorkerHooks,
    bootstrap_with,
};
use txproc_wire::Event;

/// Default hooks plus statistics on the number of events handled.
#[derive(Debug, Default)]
struct StatsWorker;

impl WorkerHooks for StatsWorker {
    fn generate_stats(
        &mut self,
        context: &mut WorkerContext,
        _event: &Event,
        _follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        let processed = context.processed();
        let frozen = context.is_frozen();
        if let Some(reply) = context.reply_mut() {
            reply.set_param("processed", processed);
            reply.set_param("frozen", frozen);
        }
        Ok(())
    }
}

fn main() -> ExitCode {
    // Failures are already reported through the health reporter.
    let Ok(worker) = bootstrap_with(&SystemConfigLoader, Arc::new(StructuredHealthReporter)) else {
        return ExitCode::FAILURE;
    };
    match worker.with_build(env!("CARGO_PKG_VERSION")).run(StatsWorker) {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
