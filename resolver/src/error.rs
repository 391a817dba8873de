use derive_more::{Display, From};

/// The outcome delivered to the caller on pickup of a completed query.
///
/// This is data, not a failure of the call that returned it — `check`/`wait`
/// succeed even when the query they hand back carries a non-`Ok` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
	Ok,
	/// all servers exhausted within the retry budget
	Timeout,
	/// every configured server failed this query (including a server-failure
	/// rcode, which is retried against another server rather than failing
	/// the query outright — see `scheduler::dispatch_answer`)
	AllServersFailed,
	/// the TCP connection broke and retries against it were exhausted
	TcpBroken,
	/// the answer could not be decoded
	Malformed,
	Refused,
	NxDomain,
	NotImplemented,
	/// a CNAME was returned for a query type that doesn't allow rewriting
	ProhibitedCname,
	/// the CNAME hop counter was exceeded
	CnameLoop,
	/// PTR forward-verification produced a different address than queried
	Inconsistent,
}

/// Local failures that prevent an operation from being attempted at all.
#[derive(Debug, Display, From)]
pub enum EngineError {
	#[display(fmt = "allocation failed")]
	OutOfMemory,
	#[display(fmt = "system call failed: {_0}")]
	Io(std::io::Error),
	#[display(fmt = "invalid argument: {_0}")]
	InvalidArgument(&'static str),
	/// Covers config-parse failure, invalid nameserver address, and
	/// too-many-servers alike (§7 treats these as one "kind", not distinct
	/// types) — the descriptive text comes from the parser diagnostic that
	/// triggered it.
	#[display(fmt = "configuration error: {_0}")]
	Config(String),
}

impl std::error::Error for EngineError {}

pub type Result<T> = std::result::Result<T, EngineError>;
