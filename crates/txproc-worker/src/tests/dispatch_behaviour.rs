//! Behaviour of the event loop against scripted input, poll and hooks.

use std::fs;
use std::io::Cursor;
use std::os::fd::RawFd;

use camino::Utf8PathBuf;
use mockall::Sequence;
use rstest::rstest;
use tempfile::TempDir;
use txproc_wire::{CommandType, Event, EventType};

use crate::clock::RolloverTracker;
use crate::dispatch::{EventLoop, PrimaryStreams, WorkerContext};
use crate::telemetry::{LogSink, TelemetryHandle};
use crate::transport::{Delivery, SendError};

use super::support::{MockSink, PollLog, RecordingHooks, ScriptedPoll, SharedBuffer, frames};

const APP: &str = "test-worker";
const PRIMARY_FD: RawFd = 100;
const AUX_FD: RawFd = 200;

struct Harness {
    event_loop: EventLoop<RecordingHooks, MockSink, ScriptedPoll>,
    output: SharedBuffer,
    poll: PollLog,
}

fn harness_with(
    hooks: RecordingHooks,
    sink: MockSink,
    poll: ScriptedPoll,
    input: Vec<u8>,
    context: WorkerContext,
) -> Harness {
    let output = SharedBuffer::default();
    let log = poll.log();
    let streams = PrimaryStreams::new(Cursor::new(input), output.clone(), PRIMARY_FD);
    Harness {
        event_loop: EventLoop::new(hooks, sink, poll, streams, context),
        output,
        poll: log,
    }
}

fn harness(hooks: RecordingHooks, sink: MockSink, input: &[Event]) -> Harness {
    harness_with(
        hooks,
        sink,
        ScriptedPoll::new(),
        frames(input),
        WorkerContext::new(APP),
    )
}

fn quiet_sink() -> MockSink {
    let mut sink = MockSink::new();
    sink.expect_send().never();
    sink
}

fn command(command: CommandType, reference: &str) -> Event {
    let mut event = Event::new(EventType::Command);
    event.set_reference(reference);
    event.set_command(command);
    event
}

fn persistent(cmd: &str) -> Event {
    let mut event = command(CommandType::PersistentApp, cmd);
    event.set_param("cmd", cmd);
    event
}

fn typed(event_type: EventType, reference: &str) -> Event {
    let mut event = Event::new(event_type);
    event.set_reference(reference);
    event
}

#[rstest]
fn stats_command_is_answered_with_the_default_result() {
    let mut h = harness(
        RecordingHooks::default(),
        quiet_sink(),
        &[command(CommandType::Stats, "r1")],
    );

    let processed = h.event_loop.run().expect("loop runs to end of input");

    let mut expected = Event::new(EventType::Result);
    expected.set_reference("r1");
    expected.set_success(true);
    expected.set_param("generatedby", APP);
    assert_eq!(processed, 1);
    assert_eq!(h.output.replies(), vec![expected]);
}

#[rstest]
#[case::short_header(b"#frameNew".to_vec())]
#[case::foreign_version(b"#frameNewframe#v2.0:000000\n".to_vec())]
#[case::truncated_body(
    b"#frameNewframe#v3.0:000100\n04,1,000010,1,000002,1,000002,1,000002\n{}".to_vec()
)]
fn undecodable_input_gets_one_uncorrelated_failure_reply(#[case] input: Vec<u8>) {
    let mut h = harness_with(
        RecordingHooks::default(),
        quiet_sink(),
        ScriptedPoll::new(),
        input,
        WorkerContext::new(APP),
    );

    let processed = h.event_loop.run().expect("loop survives bad input");

    let replies = h.output.replies();
    assert_eq!(processed, 0);
    assert_eq!(replies.len(), 1);
    let reply = &replies[0];
    assert_eq!(reply.event_type(), EventType::Result);
    assert!(!reply.success());
    assert_eq!(reply.reference(), None);
    let message = reply.error_string().expect("error string");
    assert!(message.contains("failed to decode event"), "{message}");
}

#[rstest]
fn foreign_version_frame_is_answered_once_and_the_next_frame_survives() {
    let mut input = frames(&[command(CommandType::Stats, "r1")]);
    let version = input
        .get_mut(16..19)
        .expect("version digits in the frame header");
    assert_eq!(version, b"3.0");
    version.copy_from_slice(b"2.0");
    input.extend(frames(&[command(CommandType::Stats, "r2")]));
    let mut h = harness_with(
        RecordingHooks::default(),
        quiet_sink(),
        ScriptedPoll::new(),
        input,
        WorkerContext::new(APP),
    );

    let processed = h.event_loop.run().expect("loop runs");

    let replies = h.output.replies();
    assert_eq!(processed, 1);
    assert_eq!(replies.len(), 2);
    assert!(!replies[0].success());
    assert_eq!(replies[0].reference(), None);
    assert!(replies[1].success());
    assert_eq!(replies[1].reference(), Some("r2"));
}

#[rstest]
fn handler_failures_and_panics_still_produce_one_reply_each() {
    let hooks = RecordingHooks {
        fail_perl: true,
        panic_on_url: true,
        ..RecordingHooks::default()
    };
    let mut h = harness(
        hooks,
        quiet_sink(),
        &[
            typed(EventType::Perl, "p1"),
            typed(EventType::Url, "u1"),
            command(CommandType::Stats, "s1"),
        ],
    );

    h.event_loop.run().expect("loop survives handler faults");

    let replies = h.output.replies();
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0].reference(), Some("p1"));
    assert!(!replies[0].success());
    assert!(
        replies[0]
            .error_string()
            .is_some_and(|e| e.contains("perl interpreter unavailable"))
    );
    assert_eq!(replies[1].reference(), Some("u1"));
    assert!(!replies[1].success());
    assert!(replies[1].error_string().is_some_and(|e| e.contains("panicked")));
    assert_eq!(replies[2].reference(), Some("s1"));
    assert!(replies[2].success());
}

#[rstest]
fn regular_tasks_only_run_while_unfrozen() {
    let mut h = harness(
        RecordingHooks::default(),
        quiet_sink(),
        &[
            persistent("start"),
            command(CommandType::Stats, "a"),
            persistent("stop"),
            command(CommandType::Stats, "b"),
        ],
    );

    h.event_loop.run().expect("loop runs");

    let hooks = h.event_loop.hooks();
    assert_eq!(hooks.start_calls, 5, "start hook runs every iteration");
    assert_eq!(hooks.regular_calls, 2, "only the two unfrozen iterations");
    assert!(h.event_loop.context().is_frozen());
    assert_eq!(h.output.replies().len(), 4);
}

#[rstest]
#[case::exit_when_done(command(CommandType::ExitWhenDone, "bye"))]
#[case::persistent_exit(persistent("exit"))]
fn exit_requests_stop_reading_after_the_current_iteration(#[case] exit: Event) {
    let mut h = harness(
        RecordingHooks::default(),
        quiet_sink(),
        &[exit, command(CommandType::Stats, "never")],
    );

    let processed = h.event_loop.run().expect("loop runs");

    assert_eq!(processed, 1);
    assert_eq!(h.poll.waits(), 1);
    assert_eq!(h.event_loop.hooks().exits, 1);
    let replies = h.output.replies();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].success());
}

#[rstest]
fn startup_info_is_recorded_on_the_context() {
    let mut info = persistent("startupinfo");
    info.set_param("ownqueue", "billing-q");
    info.set_param("workerpid", "4242");
    let mut h = harness(RecordingHooks::default(), quiet_sink(), &[info]);

    h.event_loop.run().expect("loop runs");

    let context = h.event_loop.context();
    assert_eq!(context.own_queue(), Some("billing-q"));
    assert_eq!(context.worker_pid(), Some(4242));
}

#[rstest]
fn unknown_persistent_command_queues_a_no_handler_result() {
    let mut sink = MockSink::new();
    sink.expect_send()
        .withf(|event| {
            event.event_type() == EventType::Result
                && event.reference() == Some("reload")
                && event.result() == Some("failed")
                && event.param_str("error").as_deref() == Some("no handler")
        })
        .times(1)
        .returning(|_| Ok(Delivery::Delivered));
    let mut h = harness(RecordingHooks::default(), sink, &[persistent("reload")]);

    h.event_loop.run().expect("loop runs");

    let replies = h.output.replies();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].success(), "the reply itself stays successful");
}

#[rstest]
fn base_follow_ups_are_redispatched_before_delivery_continues() {
    let hooks = RecordingHooks {
        stats_follow_ups: vec![
            typed(EventType::Base, "b1"),
            typed(EventType::Result, "out1"),
        ],
        base_follow_ups: vec![typed(EventType::Result, "out2")],
        ..RecordingHooks::default()
    };
    let mut sink = MockSink::new();
    let mut order = Sequence::new();
    for reference in ["out1", "out2"] {
        sink.expect_send()
            .withf(move |event| event.reference() == Some(reference))
            .times(1)
            .in_sequence(&mut order)
            .returning(|_| Ok(Delivery::Delivered));
    }
    let mut h = harness(hooks, sink, &[command(CommandType::Stats, "s1")]);

    h.event_loop.run().expect("loop runs");

    assert_eq!(h.event_loop.hooks().base_seen, vec![Some("b1".to_owned())]);
}

#[rstest]
fn delivery_failures_do_not_stop_other_follow_ups() {
    let hooks = RecordingHooks {
        stats_follow_ups: vec![
            typed(EventType::Result, "lost"),
            typed(EventType::Result, "kept"),
        ],
        ..RecordingHooks::default()
    };
    let mut sink = MockSink::new();
    sink.expect_send()
        .withf(|event| event.reference() == Some("lost"))
        .times(1)
        .returning(|_| Err(SendError::NoRoute));
    sink.expect_send()
        .withf(|event| event.reference() == Some("kept"))
        .times(1)
        .returning(|_| Ok(Delivery::DeliveredExpectReply));
    let mut h = harness(
        hooks,
        sink,
        &[command(CommandType::Stats, "s1"), command(CommandType::Stats, "s2")],
    );

    let processed = h.event_loop.run().expect("loop runs");

    assert_eq!(processed, 2);
    assert_eq!(h.output.replies().len(), 2);
}

#[rstest]
fn regular_task_follow_ups_are_delivered() {
    let hooks = RecordingHooks {
        regular_follow_ups: vec![typed(EventType::Result, "tick")],
        ..RecordingHooks::default()
    };
    let mut sink = MockSink::new();
    sink.expect_send()
        .withf(|event| event.reference() == Some("tick"))
        .times(1)
        .returning(|_| Ok(Delivery::Delivered));
    let mut h = harness(hooks, sink, &[persistent("start")]);

    h.event_loop.run().expect("loop runs");

    assert_eq!(h.event_loop.hooks().regular_calls, 2);
}

#[rstest]
fn perl_follow_up_is_addressed_to_the_result_queue() {
    let mut perl = typed(EventType::Perl, "p1");
    perl.set_param("resultQueue", "results");
    let mut sink = MockSink::new();
    sink.expect_send()
        .withf(|event| {
            event.dest_queue() == Some("results")
                && event.result() == Some("done")
                && event.param_str("generatedby").as_deref() == Some(APP)
        })
        .times(1)
        .returning(|_| Ok(Delivery::Delivered));
    let mut h = harness(RecordingHooks::default(), sink, &[perl]);

    h.event_loop.run().expect("loop runs");

    let replies = h.output.replies();
    assert_eq!(replies[0].dest_queue(), Some("results"));
}

#[rstest]
fn handlers_may_replace_the_pending_reply() {
    let hooks = RecordingHooks {
        replace_stats_reply: true,
        ..RecordingHooks::default()
    };
    let mut h = harness(hooks, quiet_sink(), &[command(CommandType::Stats, "s1")]);

    h.event_loop.run().expect("loop runs");

    let replies = h.output.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].event_type(), EventType::Reply);
    assert_eq!(replies[0].reference(), Some("custom"));
}

#[rstest]
fn unrecognised_handles_are_removed_from_the_poll_set() {
    let hooks = RecordingHooks {
        register_on_first_start: Some(AUX_FD),
        ..RecordingHooks::default()
    };
    let poll = ScriptedPoll::new().then_ready(&[AUX_FD]);
    let mut h = harness_with(hooks, quiet_sink(), poll, Vec::new(), WorkerContext::new(APP));

    h.event_loop.run().expect("loop runs");

    assert_eq!(h.poll.registered(), vec![PRIMARY_FD, AUX_FD]);
    assert_eq!(h.poll.deregistered(), vec![AUX_FD]);
    assert_eq!(h.event_loop.hooks().start_calls, 2);
    assert!(h.output.replies().is_empty());
}

#[rstest]
fn first_iteration_reports_calendar_rollovers() {
    let h = harness(RecordingHooks::default(), quiet_sink(), &[]);
    let mut event_loop = h
        .event_loop
        .with_rollover_tracking(RolloverTracker::new(false));

    event_loop.run().expect("loop runs");

    assert_eq!(event_loop.hooks().rollovers_seen.first(), Some(&true));
}

#[rstest]
fn reopen_log_reopens_the_sink_and_calls_the_hook() {
    let dir = TempDir::new().expect("temp dir");
    let path = Utf8PathBuf::from_path_buf(dir.path().join("worker.log")).expect("utf8 path");
    let sink = LogSink::open(&path).expect("open log");
    fs::rename(&path, dir.path().join("worker.log.1")).expect("rotate log");
    let context = WorkerContext::new(APP).with_telemetry(TelemetryHandle::new(sink));
    let mut h = harness_with(
        RecordingHooks::default(),
        quiet_sink(),
        ScriptedPoll::new(),
        frames(&[command(CommandType::ReopenLog, "rot")]),
        context,
    );

    h.event_loop.run().expect("loop runs");

    assert!(path.exists(), "reopen recreates the log file");
    assert_eq!(h.event_loop.hooks().reopened, 1);
    assert!(h.output.replies()[0].success());
}
