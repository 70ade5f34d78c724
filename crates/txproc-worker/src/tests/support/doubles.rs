//! Scripted collaborators for driving the event loop without real descriptors.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::os::fd::RawFd;
use std::rc::Rc;

use mockall::mock;
use txproc_wire::{Event, EventType, codec};

use crate::dispatch::{HookError, HookResult, WorkerContext, WorkerHooks};
use crate::transport::{Delivery, EventSink, PollError, ReadinessPoll, SendError};

mock! {
    pub Sink {}
    impl EventSink for Sink {
        fn send(&mut self, event: &Event) -> Result<Delivery, SendError>;
    }
}

/// Concatenates the frames for `events`.
pub fn frames(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .flat_map(|event| codec::encode(event).expect("test event encodes"))
        .collect()
}

/// Write sink whose contents stay readable after the loop takes ownership.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    /// Decodes every frame written so far.
    pub fn replies(&self) -> Vec<Event> {
        let bytes = self.0.borrow().clone();
        let mut remaining = bytes.as_slice();
        let mut replies = Vec::new();
        while !remaining.is_empty() {
            replies.push(codec::decode(&mut remaining).expect("reply frame decodes"));
        }
        replies
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Registration calls observed by [`ScriptedPoll`].
#[derive(Debug, Clone, Default)]
pub struct PollLog(Rc<RefCell<PollLogInner>>);

#[derive(Debug, Default)]
struct PollLogInner {
    registered: Vec<RawFd>,
    deregistered: Vec<RawFd>,
    waits: usize,
}

impl PollLog {
    pub fn registered(&self) -> Vec<RawFd> {
        self.0.borrow().registered.clone()
    }

    pub fn deregistered(&self) -> Vec<RawFd> {
        self.0.borrow().deregistered.clone()
    }

    pub fn waits(&self) -> usize {
        self.0.borrow().waits
    }
}

/// Readiness set that replays scripted ready lists.
///
/// Once the script runs out every registered descriptor is reported ready.
#[derive(Debug, Default)]
pub struct ScriptedPoll {
    script: VecDeque<Vec<RawFd>>,
    active: Vec<RawFd>,
    log: PollLog,
}

impl ScriptedPoll {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_ready(mut self, fds: &[RawFd]) -> Self {
        self.script.push_back(fds.to_vec());
        self
    }

    pub fn log(&self) -> PollLog {
        self.log.clone()
    }
}

impl ReadinessPoll for ScriptedPoll {
    fn register(&mut self, fd: RawFd) {
        if !self.active.contains(&fd) {
            self.active.push(fd);
        }
        self.log.0.borrow_mut().registered.push(fd);
    }

    fn deregister(&mut self, fd: RawFd) -> bool {
        self.log.0.borrow_mut().deregistered.push(fd);
        let before = self.active.len();
        self.active.retain(|active| *active != fd);
        before != self.active.len()
    }

    fn wait(&mut self) -> Result<Vec<RawFd>, PollError> {
        self.log.0.borrow_mut().waits += 1;
        Ok(self
            .script
            .pop_front()
            .unwrap_or_else(|| self.active.clone()))
    }
}

/// Behaviour switches and call counters for [`WorkerHooks`].
#[derive(Debug, Default)]
pub struct RecordingHooks {
    pub start_calls: usize,
    pub regular_calls: usize,
    pub reopened: usize,
    pub exits: usize,
    pub base_seen: Vec<Option<String>>,
    pub register_on_first_start: Option<RawFd>,
    pub fail_perl: bool,
    pub panic_on_url: bool,
    pub replace_stats_reply: bool,
    pub stats_follow_ups: Vec<Event>,
    pub base_follow_ups: Vec<Event>,
    pub regular_follow_ups: Vec<Event>,
    pub rollovers_seen: Vec<bool>,
}

impl WorkerHooks for RecordingHooks {
    fn start_of_loop(&mut self, context: &mut WorkerContext) -> HookResult {
        self.start_calls += 1;
        self.rollovers_seen.push(context.take_rollovers().any());
        if self.start_calls == 1
            && let Some(fd) = self.register_on_first_start
        {
            context.register_handle(fd);
        }
        Ok(())
    }

    fn regular_tasks(
        &mut self,
        _context: &mut WorkerContext,
        follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        self.regular_calls += 1;
        follow_ups.append(&mut self.regular_follow_ups);
        Ok(())
    }

    fn on_perl(
        &mut self,
        context: &mut WorkerContext,
        event: &Event,
        follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        if self.fail_perl {
            return Err(HookError::failed("perl interpreter unavailable"));
        }
        follow_ups.push(context.return_event(event, None, "done", None));
        Ok(())
    }

    fn on_url(
        &mut self,
        _context: &mut WorkerContext,
        _event: &Event,
        _follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        assert!(!self.panic_on_url, "url handler exploded");
        Ok(())
    }

    fn on_base(
        &mut self,
        _context: &mut WorkerContext,
        event: &Event,
        follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        self.base_seen.push(event.reference().map(str::to_owned));
        follow_ups.append(&mut self.base_follow_ups);
        Ok(())
    }

    fn generate_stats(
        &mut self,
        context: &mut WorkerContext,
        _event: &Event,
        follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        follow_ups.append(&mut self.stats_follow_ups);
        if self.replace_stats_reply {
            let mut reply = Event::new(EventType::Reply);
            reply.set_reference("custom");
            context.set_reply(reply);
        }
        Ok(())
    }

    fn log_reopened(
        &mut self,
        _context: &mut WorkerContext,
        _event: &Event,
        _follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        self.reopened += 1;
        Ok(())
    }

    fn prepare_to_exit(
        &mut self,
        _context: &mut WorkerContext,
        _event: &Event,
        _follow_ups: &mut Vec<Event>,
    ) -> HookResult {
        self.exits += 1;
        Ok(())
    }
}
