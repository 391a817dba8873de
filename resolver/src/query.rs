//! The per-query state machine and its accumulated answer.
//!
//! Queries are addressed by `QueryId` and live in a `slab::Slab`; moving a
//! query between `udpw`/`tcpw`/`childw`/`output` is moving its id between
//! `VecDeque`s, never the record itself. Every buffer a query needs (its
//! encoded question, its decoded answer records) is owned directly by a
//! `Query` field, so dropping the record — on pickup or cancel — releases
//! everything it accrued in one motion; there is no separate allocations
//! list to track by hand the way the original C implementation needs one.

use std::net::Ipv4Addr;
use std::time::Instant;

use wire::question::Question;
use wire::record::{QType, RecordData};

use crate::error::Status;
use crate::slab::QueryId;

/// Default cap on UDP retries per query, matching `UDPMAXRETRIES`.
pub const UDP_MAX_RETRIES: u32 = 3;
/// Bound on the configured server list (`MAXSERVERS`).
pub const MAX_SERVERS: usize = 5;
/// Bound on a CNAME resubmission chain. The original has none; this closes
/// the unbounded-chain amplification/hang risk (see REDESIGN FLAGS).
pub const MAX_CNAME_HOPS: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
	/// queued, not yet sent over UDP
	ToSend,
	/// waiting for a TCP connection/send opportunity
	TcpWaiting,
	/// sent over TCP, awaiting a framed reply
	TcpSent,
	/// suspended on one or more child queries
	Child,
	/// complete, awaiting caller pickup
	Done,
}

/// Per-query submission options (`adns_queryflags` in the original).
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryFlags {
	/// append search-list suffixes to short names
	pub search: bool,
	/// rewrite and resubmit on a CNAME answer instead of failing
	pub cname_allowed: bool,
	/// reject RR data containing control characters
	pub quoted_checks: bool,
	/// for an MX query, additionally resolve an address for each exchange
	pub mx_addresses: bool,
}

/// A composite query's pending sub-lookup, spawned as a child and awaited in
/// `childw` (§4.5's "composite (parent/child) queries").
#[derive(Debug, Clone)]
pub enum Composite {
	/// PTR forward-verification: the candidate name resolved from a PTR
	/// answer must itself resolve back to the address originally queried.
	PtrVerify { queried: Ipv4Addr, candidate_name: String, ttl: u32 },
	/// MX-with-addresses: one pending child per exchange still being resolved.
	MxAddresses { exchanges: Vec<(u16, String)>, resolved: Vec<(u16, String, Vec<Ipv4Addr>)>, pending: usize, ttl: u32 },
}

/// The accumulated result of a completed query, released to the caller at
/// pickup.
#[derive(Debug, Clone)]
pub struct Answer {
	pub status: Status,
	pub owner_name: String,
	pub cname: Option<String>,
	pub rr_type: QType,
	pub ttl: u32,
	pub records: Vec<RecordData>,
}

pub struct Query<Ctx = ()> {
	/// 16-bit id, unique among live queries; matched against incoming replies
	pub id: u16,
	/// caller-supplied context, returned alongside the answer at pickup.
	/// `None` only for an internally spawned child query, which never reaches
	/// `output` itself — its answer is merged into its parent's instead.
	pub context: Option<Ctx>,
	/// the name as originally submitted, before search-list/CNAME rewriting
	pub owner_name: String,
	/// the name currently being queried (after search suffix / CNAME rewrite)
	pub name: String,
	pub qtype: QType,
	pub flags: QueryFlags,
	pub state: State,

	/// bitmask of server indices already sent to in the current UDP retry round
	pub udpsent: u32,
	/// bitmask of server indices that have failed this query over TCP
	pub tcpfailed: u32,
	/// index into the server list currently preferred for this query
	pub udp_server: usize,
	pub udp_retries: u32,
	/// retries accounted against `nservers` while waiting on a broken TCP
	/// connection — see the Open Question in the design notes: this and
	/// `udp_retries` are the "same field, two phases" counter, kept distinct.
	pub tcp_wait_retries: u32,
	/// next per-query timeout, compared against the caller-announced clock
	pub deadline: Option<Instant>,

	pub search_pos: usize,
	pub search_dots: bool,

	pub cname_hops: u8,

	pub parent: Option<QueryId>,
	pub children: Vec<QueryId>,

	/// set on a parent query while it awaits a spawned child's verification
	/// or address-resolution sub-lookup.
	pub composite: Option<Composite>,

	pub answer: Option<Answer>,
}

impl<Ctx> Query<Ctx> {
	pub fn new(id: u16, context: Ctx, name: String, qtype: QType, flags: QueryFlags, udp_server: usize) -> Self {
		Self {
			id,
			context: Some(context),
			owner_name: name.clone(),
			name,
			qtype,
			flags,
			state: State::ToSend,
			udpsent: 0,
			tcpfailed: 0,
			udp_server,
			udp_retries: 0,
			tcp_wait_retries: 0,
			deadline: None,
			search_pos: 0,
			search_dots: false,
			cname_hops: 0,
			parent: None,
			children: Vec::new(),
			composite: None,
			answer: None,
		}
	}

	/// Builds a child query spawned on behalf of `parent` (§4.5's composite
	/// queries): no caller context, parent pointer set, otherwise identical
	/// plumbing to a top-level query.
	pub fn new_child(id: u16, name: String, qtype: QType, flags: QueryFlags, udp_server: usize, parent: QueryId) -> Self {
		Self {
			id,
			context: None,
			owner_name: name.clone(),
			name,
			qtype,
			flags,
			state: State::ToSend,
			udpsent: 0,
			tcpfailed: 0,
			udp_server,
			udp_retries: 0,
			tcp_wait_retries: 0,
			deadline: None,
			search_pos: 0,
			search_dots: false,
			cname_hops: 0,
			parent: Some(parent),
			children: Vec::new(),
			composite: None,
			answer: None,
		}
	}

	/// Encodes the current question (post any rewrite) for transmission.
	pub fn encode(&self) -> Vec<u8> {
		wire::message::encode_query(self.id, &Question::new(self.name.clone(), self.qtype))
	}

	pub fn is_done(&self) -> bool {
		self.state == State::Done
	}

	pub fn mark_udp_sent(&mut self, server: usize) {
		self.udpsent |= 1 << server;
	}

	pub fn udp_was_sent_to(&self, server: usize) -> bool {
		self.udpsent & (1 << server) != 0
	}

	pub fn mark_tcp_failed(&mut self, server: usize) {
		self.tcpfailed |= 1 << server;
	}

	pub fn tcp_has_failed(&self, server: usize) -> bool {
		self.tcpfailed & (1 << server) != 0
	}

	/// Resets retry bookkeeping and rewrites `name`/`qtype`, as happens on a
	/// CNAME rewrite or a search-list resubmission. Returns `false` if the
	/// CNAME hop budget has been exhausted.
	pub fn rewrite(&mut self, name: String, qtype: QType, is_cname_hop: bool) -> bool {
		if is_cname_hop {
			self.cname_hops += 1;

			if self.cname_hops > MAX_CNAME_HOPS {
				return false;
			}
		}

		self.name = name;
		self.qtype = qtype;
		self.udpsent = 0;
		self.tcpfailed = 0;
		self.udp_retries = 0;
		self.tcp_wait_retries = 0;
		self.deadline = None;
		self.state = State::ToSend;

		true
	}

	pub fn fail(&mut self, status: Status) {
		self.answer = Some(Answer {
			status,
			owner_name: self.owner_name.clone(),
			cname: None,
			rr_type: self.qtype,
			ttl: 0,
			records: Vec::new(),
		});
		self.state = State::Done;
	}

	pub fn succeed(&mut self, cname: Option<String>, ttl: u32, records: Vec<RecordData>) {
		self.answer = Some(Answer { status: Status::Ok, owner_name: self.owner_name.clone(), cname, rr_type: self.qtype, ttl, records });
		self.state = State::Done;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn udp_bitmask_tracks_attempted_servers() {
		let mut q = Query::new(1, (), "example.test".into(), QType::A, QueryFlags::default(), 0);
		assert!(!q.udp_was_sent_to(2));
		q.mark_udp_sent(2);
		assert!(q.udp_was_sent_to(2));
		assert!(!q.udp_was_sent_to(0));
	}

	#[test]
	fn rewrite_resets_retry_state_and_caps_cname_hops() {
		let mut q = Query::new(1, (), "a.example.".into(), QType::A, QueryFlags { cname_allowed: true, ..Default::default() }, 0);
		q.mark_udp_sent(0);
		q.udp_retries = 2;

		assert!(q.rewrite("b.example.".into(), QType::A, true));
		assert_eq!(q.udpsent, 0);
		assert_eq!(q.udp_retries, 0);
		assert_eq!(q.cname_hops, 1);

		q.cname_hops = MAX_CNAME_HOPS;
		assert!(!q.rewrite("c.example.".into(), QType::A, true));
	}
}
