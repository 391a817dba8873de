//! A scoped guard around the process-wide `SIGPIPE` disposition.
//!
//! Writing to a TCP socket whose peer has reset the connection raises
//! `SIGPIPE` on Unix, which by default kills the process. The engine issues
//! its TCP writes under this guard instead, so a broken pipe surfaces as an
//! `EPIPE` return value the transport layer can react to.

#[cfg(target_family = "unix")]
mod imp {
	use std::sync::Mutex;

	use libc::{sigaction, SIG_IGN};

	static LOCK: Mutex<()> = Mutex::new(());

	pub struct Guard {
		prev: libc::sigaction,
	}

	impl Guard {
		pub fn install() -> Self {
			let _lock = LOCK.lock().unwrap_or_else(|e| e.into_inner());

			let ignore = libc::sigaction {
				sa_sigaction: SIG_IGN,
				sa_mask: unsafe { std::mem::zeroed() },
				sa_flags: 0,
				#[cfg(target_os = "linux")]
				sa_restorer: None,
			};

			let mut prev: libc::sigaction = unsafe { std::mem::zeroed() };

			unsafe { sigaction(libc::SIGPIPE, &ignore, &mut prev) };

			Self { prev }
		}
	}

	impl Drop for Guard {
		fn drop(&mut self) {
			let _lock = LOCK.lock().unwrap_or_else(|e| e.into_inner());

			unsafe { sigaction(libc::SIGPIPE, &self.prev, std::ptr::null_mut()) };
		}
	}
}

#[cfg(not(target_family = "unix"))]
mod imp {
	pub struct Guard;

	impl Guard {
		pub fn install() -> Self {
			Self
		}
	}
}

pub use imp::Guard;

/// Runs `f` with `SIGPIPE` ignored for the duration of the call, restoring
/// the previous disposition afterwards.
pub fn protect<T>(f: impl FnOnce() -> T) -> T {
	let _guard = Guard::install();
	f()
}
