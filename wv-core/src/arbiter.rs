//! Serial port arbitration
//!
//! Every exchange with the device happens inside a [`PortSession`], which can
//! only be obtained while holding an exclusive `flock` on a well-known lock
//! file. The lock is visible to every process on the host, and because each
//! acquisition opens its own file description it also excludes other threads
//! of this process. The kernel drops the lock when its holder exits, so a
//! crashed holder never blocks the next acquisition.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};
use wv_error::{Result, WireViewError};

use crate::constants::arbiter::{ACQUIRE_RETRY, ACQUIRE_TIMEOUT};
use crate::serial::link::{DeviceLink, LinkOpener};

#[derive(Debug, Clone)]
pub struct PortArbiter {
    lock_path: PathBuf,
    timeout: Duration,
}

impl PortArbiter {
    pub fn new(lock_path: impl Into<PathBuf>) -> Self {
        Self {
            lock_path: lock_path.into(),
            timeout: ACQUIRE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Take the lock, waiting up to the configured timeout
    pub fn acquire(&self) -> Result<PortLock> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| WireViewError::FileWrite {
                path: self.lock_path.clone(),
                source: e,
            })?;

        let deadline = Instant::now() + self.timeout;
        loop {
            // SAFETY: the descriptor belongs to `file`, which is alive for this call.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if rc == 0 {
                trace!(lock = %self.lock_path.display(), "port lock acquired");
                return Ok(PortLock { file });
            }

            let err = std::io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EWOULDBLOCK) | Some(libc::EINTR) => {}
                _ => return Err(err.into()),
            }

            if Instant::now() >= deadline {
                debug!(lock = %self.lock_path.display(), "port lock busy");
                return Err(WireViewError::PortBusy);
            }
            thread::sleep(ACQUIRE_RETRY);
        }
    }

    /// Lock, then open `port`. The port is never touched if the lock is busy.
    pub fn open_session(
        &self,
        opener: &dyn LinkOpener,
        port: &str,
        baud: u32,
    ) -> Result<PortSession> {
        let lock = self.acquire()?;
        let link = opener.open(port, baud)?;
        Ok(PortSession {
            link,
            _lock: lock,
            port: port.to_string(),
        })
    }
}

/// Exclusive hold on the port lock; released on drop
#[derive(Debug)]
pub struct PortLock {
    file: File,
}

impl Drop for PortLock {
    fn drop(&mut self) {
        // SAFETY: same descriptor as in `acquire`; closing would release it anyway.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

/// An open port plus the lock that guards it
///
/// Dropping the session flushes, closes the port, then releases the lock.
pub struct PortSession {
    // Field order matters: the link must close before the lock is released.
    link: Box<dyn DeviceLink>,
    _lock: PortLock,
    port: String,
}

impl PortSession {
    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn clear_input(&mut self) -> Result<()> {
        self.link.clear_input()
    }

    pub fn set_ready_line(&mut self, asserted: bool) -> Result<()> {
        self.link.set_ready_line(asserted)
    }

    pub fn write(&mut self, frame: &[u8]) -> Result<()> {
        trace!(port = %self.port, bytes = frame.len(), "tx");
        self.link.write_all(frame)
    }

    pub fn read_exact(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.link.read_exact(&mut buf, timeout)?;
        trace!(port = %self.port, bytes = len, "rx");
        Ok(buf)
    }

    /// Explicit close; equivalent to dropping the session
    pub fn close(self) {}
}

impl Drop for PortSession {
    fn drop(&mut self) {
        if let Err(e) = self.link.flush() {
            trace!(port = %self.port, error = %e, "flush on close failed");
        }
    }
}
