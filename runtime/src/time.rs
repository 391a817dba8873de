use std::time::{Duration, Instant, SystemTime};

/// A point in monotonic time, as announced to the engine by the caller.
///
/// The engine never calls `Instant::now()` itself outside of the optional
/// blocking `wait()` helper; every other entry point receives `Instant` from
/// the caller so that the whole engine stays driven, not self-driving.
pub type Clock = Instant;

/// Returns the wall-clock `SystemTime` corresponding to `now`, given a
/// `(monotonic, wall)` pair recorded at some earlier point (typically at
/// resolver init).
pub fn system_at(anchor: (Instant, SystemTime), now: Instant) -> SystemTime {
	let (mono, wall) = anchor;

	if now >= mono {
		wall + (now - mono)
	} else {
		wall - (mono - now)
	}
}

/// Clamp a caller-supplied timeout to be no later than `deadline`, as measured from `now`.
///
/// Matches the "never lengthen, only shorten" contract of `before_select`: a
/// `None` input is treated as infinite, and a deadline already in the past
/// collapses to zero (poll-immediately) rather than going negative.
pub fn clamp_timeout(existing: Option<Duration>, now: Clock, deadline: Option<Clock>) -> Option<Duration> {
	let Some(deadline) = deadline else { return existing };

	let ours = deadline.checked_duration_since(now).unwrap_or(Duration::ZERO);

	match existing {
		Some(theirs) if theirs <= ours => Some(theirs),
		_ => Some(ours),
	}
}

/// Returns the earlier of two optional deadlines.
pub fn earliest(a: Option<Clock>, b: Option<Clock>) -> Option<Clock> {
	match (a, b) {
		(Some(a), Some(b)) => Some(a.min(b)),
		(Some(a), None) => Some(a),
		(None, b) => b,
	}
}
