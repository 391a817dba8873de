use std::io;
use std::time::Duration;

pub mod logger;
pub mod sigpipe;
pub mod time;

#[cfg(target_family = "unix")]
mod sys {
	pub use std::os::fd::{AsRawFd, RawFd};

	pub use libc::{poll, pollfd as Poll, POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT};

	pub fn as_raw<T: AsRawFd>(t: &T) -> RawFd {
		t.as_raw_fd()
	}
}

#[cfg(target_family = "windows")]
mod sys {
	pub use std::os::windows::io::AsRawSocket as AsRawFd;

	pub use windows_sys::Win32::Networking::WinSock::{
		WSAPoll as poll, POLLERR, POLLHUP, POLLNVAL, POLLRDNORM as POLLIN, POLLWRNORM as POLLOUT, SOCKET as RawFd, WSAPOLLFD as Poll,
	};

	pub fn as_raw<T: AsRawFd>(t: &T) -> RawFd {
		t.as_raw_socket() as _
	}
}

pub use sys::{as_raw, AsRawFd, RawFd};
use sys::*;

/// The readiness a caller may ask the engine to watch a socket for, and the
/// readiness the engine reports back after a `poll()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Interest {
	pub readable: bool,
	pub writable: bool,
	pub exceptional: bool,
}

impl Interest {
	pub const READABLE: Self = Self { readable: true, writable: false, exceptional: false };
	pub const WRITABLE: Self = Self { readable: false, writable: true, exceptional: false };

	pub fn is_empty(self) -> bool {
		self == Self::default()
	}
}

fn as_timeout(t: Option<Duration>) -> i32 {
	t.and_then(|d| d.as_millis().try_into().ok()).unwrap_or(-1)
}

/// Polls a set of raw file descriptors for readiness.
///
/// This is a thin, allocation-light wrapper over `poll(2)` / `WSAPoll`, used
/// by the blocking `wait()` convenience entry point. Callers that embed the
/// engine in their own event loop never need this: they drive readiness
/// themselves and hand it to the engine via `process_readable`/`process_writable`.
pub fn poll_fds(fds: &[(RawFd, Interest)], timeout: Option<Duration>) -> io::Result<Vec<(RawFd, Interest)>> {
	let mut raw: Vec<Poll> = fds
		.iter()
		.map(|&(fd, interest)| {
			let mut events = 0;

			if interest.readable {
				events |= POLLIN;
			}

			if interest.writable {
				events |= POLLOUT;
			}

			Poll { fd, events, revents: 0 }
		})
		.collect();

	let ret = unsafe { poll(raw.as_mut_ptr(), raw.len().try_into().expect("fewer than u32::MAX fds"), as_timeout(timeout)) };

	if ret < 0 {
		return Err(io::Error::last_os_error());
	}

	Ok(raw
		.into_iter()
		.filter(|p| p.revents != 0)
		.map(|p| {
			(
				p.fd,
				Interest {
					readable: p.revents & (POLLIN | POLLHUP | POLLERR | POLLNVAL) != 0,
					writable: p.revents & POLLOUT != 0,
					exceptional: p.revents & (POLLERR | POLLNVAL) != 0,
				},
			)
		})
		.collect())
}
