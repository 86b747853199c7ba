// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Readable notification for the consumer.
//!
//! An `eventfd` the tx queue rings after every successful outbound push.
//! The condition it stands for is "outbound occupancy > 0", so a waiter must
//! drain the eventfd, check the ring, and only then block:
//!
//! ```ignore
//! doorbell.drain();
//! if ring.occupancy() == 0 {
//!     doorbell.wait(timeout)?;
//! }
//! ```

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::eventfd::{EfdFlags, EventFd};

/// Non-blocking, close-on-exec eventfd.
#[derive(Debug)]
pub struct Doorbell {
    fd: EventFd,
}

impl Doorbell {
    pub fn new() -> io::Result<Self> {
        let fd = EventFd::from_flags(EfdFlags::EFD_NONBLOCK | EfdFlags::EFD_CLOEXEC)?;
        Ok(Self { fd })
    }

    /// Ring the doorbell.
    ///
    /// A saturated counter (EAGAIN) means the waiter has not drained yet, so
    /// it is already signaled.
    pub fn signal(&self) {
        match self.fd.write(1) {
            Ok(_) | Err(Errno::EAGAIN) => {}
            Err(e) => tracing::warn!(error = %e, "doorbell signal failed"),
        }
    }

    /// Reset the counter. Returns true if the doorbell had been rung.
    pub fn drain(&self) -> bool {
        match self.fd.read() {
            Ok(count) => count > 0,
            Err(Errno::EAGAIN) => false,
            Err(e) => {
                tracing::warn!(error = %e, "doorbell drain failed");
                false
            }
        }
    }

    /// Block until the doorbell is rung or `timeout` passes (`None` waits
    /// forever). Returns true if it was rung. Does not drain.
    pub fn wait(&self, timeout: Option<Duration>) -> io::Result<bool> {
        let timeout = match timeout {
            None => PollTimeout::NONE,
            Some(t) => {
                // poll counts whole milliseconds; round up so short waits block
                let ms = i32::try_from(t.as_nanos().div_ceil(1_000_000)).unwrap_or(i32::MAX);
                PollTimeout::try_from(ms).unwrap_or(PollTimeout::MAX)
            }
        };

        let mut fds = [PollFd::new(self.fd.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, timeout) {
            Ok(ready) => Ok(ready > 0),
            Err(Errno::EINTR) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl AsRawFd for Doorbell {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl AsFd for Doorbell {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_then_drain() {
        let bell = Doorbell::new().unwrap();
        assert!(!bell.drain());

        bell.signal();
        bell.signal();
        assert!(bell.drain());
        assert!(!bell.drain());
    }

    #[test]
    fn test_wait_times_out() {
        let bell = Doorbell::new().unwrap();
        assert!(!bell.wait(Some(Duration::from_millis(5))).unwrap());
    }

    #[test]
    fn test_sub_millisecond_wait_blocks() {
        let bell = Doorbell::new().unwrap();
        let timeout = Duration::from_micros(900);
        let start = std::time::Instant::now();
        assert!(!bell.wait(Some(timeout)).unwrap());
        assert!(start.elapsed() >= timeout);
    }

    #[test]
    fn test_wait_sees_pending_signal() {
        let bell = Doorbell::new().unwrap();
        bell.signal();
        assert!(bell.wait(Some(Duration::from_millis(100))).unwrap());
        // still pending until drained
        assert!(bell.wait(Some(Duration::ZERO)).unwrap());
        bell.drain();
        assert!(!bell.wait(Some(Duration::ZERO)).unwrap());
    }

    #[test]
    fn test_wait_across_threads() {
        let bell = std::sync::Arc::new(Doorbell::new().unwrap());
        let ringer = bell.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            ringer.signal();
        });
        assert!(bell.wait(Some(Duration::from_secs(5))).unwrap());
        handle.join().unwrap();
    }
}
