//! The persistent event loop.
//!
//! Each iteration refreshes the clock, updates rollover flags, runs the
//! start-of-loop hook, waits for readiness, handles the ready sources, runs
//! regular tasks when unfrozen and finally drains follow-up events. Every
//! frame read from the primary input is answered with exactly one reply
//! frame before the next wait, whatever the handlers do.

use std::any::Any;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, info, warn};

use txproc_wire::{DecodeError, Event, EventType, codec};

use crate::clock::RolloverTracker;
use crate::transport::{EventSink, ReadinessPoll};

use super::context::{PollRequest, WorkerContext};
use super::errors::{HookError, LoopError};
use super::hooks::{HookResult, WorkerHooks};
use super::reply;
use super::router::{self, DISPATCH_TARGET};

/// Primary input and output carrying framed events to and from the peer.
pub struct PrimaryStreams {
    input: Box<dyn Read>,
    output: Box<dyn Write>,
    fd: RawFd,
}

impl PrimaryStreams {
    /// Wraps explicit streams; `fd` is the descriptor polled for `input`.
    pub fn new(input: impl Read + 'static, output: impl Write + 'static, fd: RawFd) -> Self {
        Self {
            input: Box::new(input),
            output: Box::new(output),
            fd,
        }
    }

    /// Unbuffered duplicates of the process's stdin and stdout.
    ///
    /// Reads bypass the standard library's stdin buffer, so a frame that has
    /// not been decoded yet is always still visible to the poll.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while duplicating either descriptor.
    pub fn stdio() -> io::Result<Self> {
        let input = File::from(io::stdin().as_fd().try_clone_to_owned()?);
        let output = File::from(io::stdout().as_fd().try_clone_to_owned()?);
        let fd = input.as_raw_fd();
        Ok(Self::new(input, output, fd))
    }

    /// Descriptor polled for input.
    #[must_use]
    pub const fn fd(&self) -> RawFd {
        self.fd
    }
}

/// Single-threaded dispatcher over a readiness set.
pub struct EventLoop<H, S, P> {
    hooks: H,
    sink: S,
    poll: P,
    streams: PrimaryStreams,
    context: WorkerContext,
    rollover: Option<RolloverTracker>,
}

impl<H, S, P> EventLoop<H, S, P>
where
    H: WorkerHooks,
    S: EventSink,
    P: ReadinessPoll,
{
    /// Builds a loop and registers the primary input with `poll`.
    pub fn new(
        hooks: H,
        sink: S,
        mut poll: P,
        streams: PrimaryStreams,
        context: WorkerContext,
    ) -> Self {
        poll.register(streams.fd);
        Self {
            hooks,
            sink,
            poll,
            streams,
            context,
            rollover: None,
        }
    }

    /// Enables rollover tracking at the top of every iteration.
    #[must_use]
    pub fn with_rollover_tracking(mut self, tracker: RolloverTracker) -> Self {
        self.rollover = Some(tracker);
        self
    }

    /// Worker state.
    pub const fn context(&self) -> &WorkerContext {
        &self.context
    }

    /// Installed hooks.
    pub const fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Follow-up sink.
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Runs until termination is requested, returning the number of input
    /// events decoded.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError`] when the poll fails or a reply cannot be written.
    pub fn run(&mut self) -> Result<u64, LoopError> {
        info!(
            target: DISPATCH_TARGET,
            app = self.context.app_name(),
            frozen = self.context.is_frozen(),
            build = self.context.build(),
            "application started"
        );
        while !self.context.should_terminate() {
            self.iterate()?;
        }
        info!(
            target: DISPATCH_TARGET,
            processed = self.context.processed(),
            "event loop stopped"
        );
        Ok(self.context.processed())
    }

    /// Runs one loop iteration.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError`] when the poll fails or a reply cannot be written.
    pub fn iterate(&mut self) -> Result<(), LoopError> {
        self.context.log_mut().refresh();
        if let Some(tracker) = &mut self.rollover {
            let rolled = tracker.observe(self.context.log().now());
            if rolled.any() {
                debug!(
                    target: DISPATCH_TARGET,
                    minute = rolled.minute,
                    hour = rolled.hour,
                    day = rolled.day,
                    month = rolled.month,
                    "calendar rollover"
                );
                self.context.record_rollovers(rolled);
            }
        }

        let outcome = guarded(|| self.hooks.start_of_loop(&mut self.context));
        log_hook_failure("start_of_loop", outcome);
        if self.context.is_verbose() {
            info!(
                target: DISPATCH_TARGET,
                stamp = self.context.log().stamp(),
                frozen = self.context.is_frozen(),
                "waiting for the next event"
            );
        }

        self.apply_poll_requests();
        let ready = self.poll.wait()?;
        let mut follow_ups = Vec::new();
        for fd in ready {
            if fd == self.streams.fd {
                self.handle_primary(&mut follow_ups)?;
            } else {
                let outcome =
                    guarded(|| self.hooks.polled_handle(&mut self.context, fd, &mut follow_ups));
                log_hook_failure("polled_handle", outcome);
            }
        }

        if !self.context.is_frozen() {
            let outcome = guarded(|| self.hooks.regular_tasks(&mut self.context, &mut follow_ups));
            log_hook_failure("regular_tasks", outcome);
        }

        self.drain(follow_ups);
        Ok(())
    }

    fn apply_poll_requests(&mut self) {
        for request in self.context.take_poll_requests() {
            match request {
                PollRequest::Register(fd) => self.poll.register(fd),
                PollRequest::Deregister(fd) if fd == self.streams.fd => {
                    warn!(target: DISPATCH_TARGET, fd, "refusing to deregister the primary input");
                }
                PollRequest::Deregister(fd) => {
                    self.poll.deregister(fd);
                }
            }
        }
    }

    fn handle_primary(&mut self, follow_ups: &mut Vec<Event>) -> Result<(), LoopError> {
        let reply = match codec::decode(&mut self.streams.input) {
            Ok(event) => {
                self.context.count_processed();
                self.dispatch_input(&event, follow_ups)
            }
            Err(DecodeError::EndOfStream) => {
                info!(target: DISPATCH_TARGET, "primary input closed");
                self.context.request_termination();
                return Ok(());
            }
            Err(error @ DecodeError::Io { .. }) => {
                error!(target: DISPATCH_TARGET, %error, "primary input unreadable");
                self.context.request_termination();
                return Ok(());
            }
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "failed to decode input event");
                reply::failure_reply(format!(
                    "{} failed to decode event: {error}",
                    self.context.app_name()
                ))
            }
        };
        self.write_reply(&reply)
    }

    fn dispatch_input(&mut self, event: &Event, follow_ups: &mut Vec<Event>) -> Event {
        let pending = reply::default_reply(event, self.context.app_name());
        self.context.set_reply(pending);
        let outcome =
            guarded(|| router::route(&mut self.hooks, &mut self.context, event, follow_ups));
        let pending = self.context.take_reply();
        match outcome {
            Ok(()) => pending.unwrap_or_else(reply::bare_success),
            Err(error) => {
                error!(
                    target: DISPATCH_TARGET,
                    %error,
                    event = %event,
                    "handler failed"
                );
                reply::failure_reply_for(
                    event,
                    format!("{} handler failed: {error}", self.context.app_name()),
                )
            }
        }
    }

    fn write_reply(&mut self, outgoing: &Event) -> Result<(), LoopError> {
        if self.context.is_verbose() {
            info!(target: DISPATCH_TARGET, reply = %outgoing, "sending reply");
        }
        let frame = match codec::encode(outgoing) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "failed to encode reply");
                let notice = reply::failure_reply(format!(
                    "{} failed to encode reply: {error}",
                    self.context.app_name()
                ));
                codec::encode(&notice).map_err(|source| LoopError::Encode { source })?
            }
        };
        let output = &mut self.streams.output;
        output
            .write_all(&frame)
            .and_then(|()| output.flush())
            .map_err(|source| LoopError::Reply { source })
    }

    fn drain(&mut self, follow_ups: Vec<Event>) {
        let mut pending = VecDeque::from(follow_ups);
        while let Some(event) = pending.pop_front() {
            if event.event_type() == EventType::Base {
                let mut nested = Vec::new();
                let outcome = guarded(|| {
                    router::route(&mut self.hooks, &mut self.context, &event, &mut nested)
                });
                log_hook_failure("base re-dispatch", outcome);
                pending.extend(nested);
                continue;
            }
            match self.sink.send(&event) {
                Ok(delivery) => {
                    debug!(target: DISPATCH_TARGET, ?delivery, event = %event, "follow-up delivered");
                }
                Err(error) => {
                    warn!(
                        target: DISPATCH_TARGET,
                        %error,
                        event = %event,
                        "failed to deliver follow-up event"
                    );
                }
            }
        }
        if self.context.take_reply().is_some() {
            debug!(target: DISPATCH_TARGET, "discarded reply set outside input handling");
        }
    }
}

fn guarded(hook: impl FnOnce() -> HookResult) -> HookResult {
    panic::catch_unwind(AssertUnwindSafe(hook)).unwrap_or_else(|payload| {
        Err(HookError::Panicked {
            message: panic_message(payload.as_ref()),
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

fn log_hook_failure(hook: &str, outcome: HookResult) {
    if let Err(error) = outcome {
        warn!(target: DISPATCH_TARGET, hook, %error, "hook failed");
    }
}
