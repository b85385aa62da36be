//! eventfd-backed signal.
//!
//! The descriptor is non-blocking and becomes readable once [`Signal::notify`]
//! has been called, until [`Signal::try_take`] drains it.

use crate::error::{Error, Result};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

macro_rules! retry_eintr {
    ($libc_call:expr) => {
        loop {
            match $libc_call {
                -1 => {
                    let e = io::Error::last_os_error();
                    match e.raw_os_error() {
                        Some(libc::EINTR) => continue,
                        _ => break Err(e),
                    }
                }
                result => {
                    break Ok(result);
                }
            }
        }
    };
}

pub struct Signal {
    fd: OwnedFd,
}

impl Signal {
    pub fn new() -> Result<Self> {
        // SAFETY: Passing valid arguments.
        let fd: RawFd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if fd == -1 {
            return Err(Error::OpenFailed(format!(
                "failed to create eventfd: {}",
                io::Error::last_os_error()
            )));
        }
        // SAFETY: `fd` is a valid eventfd owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd })
    }

    /// Make the descriptor readable.
    pub fn notify(&self) -> Result<()> {
        retry_eintr!(
            // SAFETY: `self.fd` is a valid eventfd.
            unsafe { libc::eventfd_write(self.fd.as_raw_fd(), 1) }
        )
        .map(|_| ())
        .map_err(|e| Error::Other(format!("failed to write eventfd: {}", e)))
    }

    /// Drain a pending notification. Returns whether one was pending.
    pub fn try_take(&self) -> bool {
        let mut value: libc::eventfd_t = 0;
        let res = retry_eintr!(
            // SAFETY: `self.fd` is a valid eventfd and `value` is a valid out pointer.
            unsafe { libc::eventfd_read(self.fd.as_raw_fd(), &mut value) }
        );
        match res {
            Ok(_) => value > 0,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
            Err(e) => {
                log::error!("failed to read eventfd: {}", e);
                false
            }
        }
    }
}

impl AsRawFd for Signal {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl AsFd for Signal {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}
