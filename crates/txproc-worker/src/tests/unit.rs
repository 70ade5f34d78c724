//! Bootstrap outcomes and an end-to-end run over real descriptors.

use std::io::Write;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;
use txproc_wire::{Event, EventType, MAX_DATAGRAM_LEN, codec};

use crate::bootstrap::{BootstrapError, BootstrapStage, bootstrap_with};
use crate::dispatch::{DefaultHooks, PrimaryStreams};

use super::support::{
    FailingConfigLoader, HealthEvent, MissingPeerConfigLoader, RecordingHealthReporter,
    SharedBuffer, TestConfigLoader, frames,
};

#[rstest]
fn bootstrap_succeeds_with_a_listening_peer() {
    let loader = TestConfigLoader::new();
    let reporter = Arc::new(RecordingHealthReporter::default());

    let worker = bootstrap_with(&loader, reporter.clone()).expect("bootstrap succeeds");

    assert_eq!(worker.config().app_name(), "test-worker");
    assert_eq!(
        reporter.events(),
        vec![
            HealthEvent::Starting,
            HealthEvent::Ready {
                app: "test-worker".to_owned()
            }
        ]
    );
}

#[rstest]
fn bootstrap_reports_configuration_failures() {
    let reporter = Arc::new(RecordingHealthReporter::default());

    let error = bootstrap_with(&FailingConfigLoader, reporter.clone())
        .expect_err("unknown flag must fail");

    assert!(matches!(error, BootstrapError::Configuration { .. }));
    let events = reporter.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events.first(), Some(&HealthEvent::Starting));
    assert!(matches!(
        events.last(),
        Some(HealthEvent::Failed { stage: BootstrapStage::Configuration, message })
            if message.contains("configuration")
    ));
}

#[rstest]
fn bootstrap_fails_when_the_peer_socket_is_absent() {
    let loader = MissingPeerConfigLoader::new();
    let reporter = Arc::new(RecordingHealthReporter::default());

    let error = bootstrap_with(&loader, reporter.clone()).expect_err("peer is missing");

    assert!(matches!(error, BootstrapError::Socket { .. }));
    assert_eq!(error.stage(), BootstrapStage::Socket);
    assert!(matches!(
        reporter.events().last(),
        Some(HealthEvent::Failed { stage: BootstrapStage::Socket, .. })
    ));
}

#[rstest]
fn worker_context_starts_frozen_with_identity() {
    let loader = TestConfigLoader::new();
    let worker = bootstrap_with(&loader, Arc::new(RecordingHealthReporter::default()))
        .expect("bootstrap succeeds")
        .with_build("1.2.3");

    let context = worker.context();

    assert!(context.is_frozen());
    assert!(!context.should_terminate());
    assert_eq!(context.app_name(), "test-worker");
    assert_eq!(context.build(), Some("1.2.3"));
}

#[rstest]
fn default_hooks_answer_input_and_notify_the_peer() {
    let loader = TestConfigLoader::new();
    loader
        .peer()
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set peer timeout");
    let reporter = Arc::new(RecordingHealthReporter::default());
    let worker = bootstrap_with(&loader, reporter.clone()).expect("bootstrap succeeds");

    let mut perl = Event::new(EventType::Perl);
    perl.set_reference("job-9");
    perl.set_param("resultQueue", "results");
    let (input, mut feeder) = UnixStream::pair().expect("socket pair");
    feeder.write_all(&frames(&[perl])).expect("feed input");
    drop(feeder);
    let output = SharedBuffer::default();
    let fd = input.as_raw_fd();
    let streams = PrimaryStreams::new(input, output.clone(), fd);

    let processed = worker
        .run_with(DefaultHooks, streams)
        .expect("loop runs to end of input");

    assert_eq!(processed, 1);
    assert_eq!(
        reporter.events().last(),
        Some(&HealthEvent::Stopped { processed: 1 })
    );
    let replies = output.replies();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].success());
    assert_eq!(replies[0].reference(), Some("job-9"));

    let mut packet = vec![0_u8; MAX_DATAGRAM_LEN];
    let len = loader.peer().recv(&mut packet).expect("follow-up datagram");
    let follow_up = codec::decode_slice(&packet[..len]).expect("follow-up decodes");
    assert_eq!(follow_up.dest_queue(), Some("results"));
    assert_eq!(follow_up.result(), Some("failed"));
    assert_eq!(follow_up.param_str("error").as_deref(), Some("no handler"));
}
