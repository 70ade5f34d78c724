//! Readiness polling over raw descriptors.

use std::os::fd::{BorrowedFd, RawFd};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use super::errors::PollError;

/// Set of descriptors the event loop waits on.
pub trait ReadinessPoll {
    /// Adds `fd` to the set. Registering twice has no further effect.
    ///
    /// The set does not own `fd`; it must stay open until
    /// [`deregister`](Self::deregister) has been called for it.
    fn register(&mut self, fd: RawFd);

    /// Removes `fd`, returning whether it was registered.
    fn deregister(&mut self, fd: RawFd) -> bool;

    /// Blocks until at least one registered descriptor is readable.
    ///
    /// Hang-up and error conditions count as readable so the owner observes
    /// them on its next read.
    fn wait(&mut self) -> Result<Vec<RawFd>, PollError>;
}

/// [`ReadinessPoll`] backed by `poll(2)`.
#[derive(Debug, Default)]
pub struct FdPoller {
    fds: Vec<RawFd>,
}

impl FdPoller {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered descriptors in registration order.
    #[must_use]
    pub fn registered(&self) -> &[RawFd] {
        &self.fds
    }
}

impl ReadinessPoll for FdPoller {
    fn register(&mut self, fd: RawFd) {
        if !self.fds.contains(&fd) {
            self.fds.push(fd);
        }
    }

    fn deregister(&mut self, fd: RawFd) -> bool {
        let before = self.fds.len();
        self.fds.retain(|registered| *registered != fd);
        self.fds.len() != before
    }

    fn wait(&mut self) -> Result<Vec<RawFd>, PollError> {
        let readable =
            PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL;
        loop {
            // SAFETY: `register` requires callers to keep each descriptor open
            // until it is deregistered, which happens before any wait.
            let mut pollfds: Vec<PollFd<'_>> = self
                .fds
                .iter()
                .map(|fd| PollFd::new(unsafe { BorrowedFd::borrow_raw(*fd) }, PollFlags::POLLIN))
                .collect();
            match poll(&mut pollfds, PollTimeout::NONE) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(source) => return Err(PollError { source }),
            }
            return Ok(self
                .fds
                .iter()
                .zip(&pollfds)
                .filter(|(_, pollfd)| pollfd.revents().is_some_and(|flags| flags.intersects(readable)))
                .map(|(fd, _)| *fd)
                .collect());
        }
    }
}
