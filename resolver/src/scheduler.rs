//! The scheduler/event core: send-path advancement, readiness dispatch,
//! timeout accounting, and answer processing (`spec.md` §4.4, §4.5).
//!
//! Grounded on `dspeyrer-net/net/src/dns/mod.rs`'s retry-timer-and-dispatch
//! shape, generalized from its single in-flight `HashMap` to the full
//! `udpw`/`tcpw`/`childw`/`output` queue set `original_source/src/event.c`
//! and `original_source/src/query.c` implement.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use runtime::{Interest, RawFd};
use wire::header::Rcode;
use wire::message::{self, Message};
use wire::record::{QType, RecordData};

use crate::api::{Completed, Resolver};
use crate::error::Status;
use crate::query::{Composite, Query, QueryFlags, State};
use crate::slab::QueryId;
use crate::transport::tcp::{SocksConfig, TcpState, TCP_IDLE_TIMEOUT};
use crate::transport::udp::{self, SendOutcome};

impl<Ctx> Resolver<Ctx> {
	/// Attempts one UDP send opportunity for `id`, if it is still in the
	/// `tosend` phase. Exhaustion fails the query with `timeout`.
	pub(crate) fn try_send_udp(&mut self, id: QueryId, now: Instant) {
		let Some(query) = self.queries.get(id) else { return };

		if query.state != State::ToSend {
			return;
		}

		let query = self.queries.get_mut(id).unwrap();

		match self.udp.advance_send(query, &self.servers, now) {
			Ok(SendOutcome::Sent | SendOutcome::WouldBlock) => {}
			Ok(SendOutcome::RetriesExhausted) => self.fail_query(id, Status::Timeout, now),
			Err(e) => {
				log::warn!("udp send failed: {e}");
				self.fail_query(id, Status::AllServersFailed, now);
			}
		}
	}

	/// Convenience: performs a zero-timeout poll over the engine's own fds
	/// and dispatches whatever is ready, then walks the timeout queues. Lets
	/// a caller that never wires up its own event loop still make progress.
	pub fn process_any(&mut self, now: Instant) {
		self.consistency_gate("process_any:entry");

		self.process_timeouts(now);

		let fds = self.pollfds();

		if !fds.is_empty() {
			match runtime::poll_fds(&fds, Some(Duration::ZERO)) {
				Ok(ready) => {
					for (fd, interest) in ready {
						if interest.readable {
							self.process_readable(fd, now);
						}

						if interest.writable {
							self.process_writable(fd, now);
						}

						if interest.exceptional {
							self.process_exceptional(fd, now);
						}

						self.consistency_step("process_any:dispatch");
					}
				}
				Err(e) => log::warn!("poll failed in process_any: {e}"),
			}
		}

		self.consistency_gate("process_any:exit");
	}

	/// The fds and interest masks the caller's own event loop should watch.
	pub fn pollfds(&self) -> Vec<(RawFd, Interest)> {
		let mut fds = vec![(self.udp.as_raw_fd(), Interest::READABLE)];

		if let Some(fd) = self.tcp.as_raw_fd() {
			fds.push((fd, self.tcp.interest()));
		}

		fds
	}

	/// The earliest deadline the engine is waiting on, across UDP retry
	/// timers and the TCP connection/idle timer.
	pub fn first_timeout(&self) -> Option<Instant> {
		let udp_deadline = self.udpw.iter().filter_map(|&id| self.queries.get(id)).filter_map(|q| q.deadline).min();

		runtime::time::earliest(udp_deadline, self.tcp.deadline)
	}

	/// Clamps `existing` (a caller-supplied `select` timeout, `None` meaning
	/// infinite) to the engine's own deadline, never lengthening it.
	pub fn before_select(&self, existing: Option<Duration>, now: Instant) -> Option<Duration> {
		runtime::time::clamp_timeout(existing, now, self.first_timeout())
	}

	pub fn process_readable(&mut self, fd: RawFd, now: Instant) {
		self.consistency_gate("process_readable:entry");

		if fd == self.udp.as_raw_fd() {
			self.drain_udp(now);
		} else if self.tcp.as_raw_fd() == Some(fd) {
			match self.tcp.state {
				TcpState::Handshaking => self.drive_tor_handshake(now),
				_ => self.drain_tcp_readable(now),
			}
		}

		self.consistency_gate("process_readable:exit");
	}

	pub fn process_writable(&mut self, fd: RawFd, now: Instant) {
		self.consistency_gate("process_writable:entry");

		if self.tcp.as_raw_fd() == Some(fd) {
			match self.tcp.state {
				TcpState::Connecting => match self.tcp.process_writable_while_connecting(now) {
					Ok(()) => {
						if self.tcp.state == TcpState::Ok {
							self.send_pending_tcp_queries(now);
						}
					}
					Err(e) => {
						log::warn!("tcp connect failed: {e}");
						self.tcp.break_connection(self.servers.len());
					}
				},
				TcpState::Handshaking => self.drive_tor_handshake(now),
				TcpState::Ok => {
					if let Err(e) = self.tcp.flush() {
						log::warn!("tcp write failed: {e}");
						self.tcp.break_connection(self.servers.len());
					}
				}
				TcpState::Disconnected | TcpState::Broken => {}
			}
		}

		self.consistency_gate("process_writable:exit");
	}

	/// Drives the Tor SOCKS5 negotiation forward in response to either a
	/// readable or writable event, since the handshake both writes requests
	/// and reads replies (§4.3). Promotes to `ok` and flushes any DNS
	/// queries already queued on `tcpw` once the tunnel is ready.
	fn drive_tor_handshake(&mut self, now: Instant) {
		match self.tcp.process_handshake_io() {
			Ok(()) => {
				if self.tcp.state == TcpState::Ok {
					self.send_pending_tcp_queries(now);
				}
			}
			Err(e) => {
				log::warn!("tor handshake failed: {e}");
				self.tcp.break_connection(self.servers.len());
			}
		}
	}

	pub fn process_exceptional(&mut self, fd: RawFd, _now: Instant) {
		self.consistency_gate("process_exceptional:entry");

		if self.tcp.as_raw_fd() == Some(fd) {
			log::warn!("exceptional condition on tcp socket");
			self.tcp.break_connection(self.servers.len());
		}

		self.consistency_gate("process_exceptional:exit");
	}

	/// Walks `udpw` expiring per-query retry deadlines, and advances the TCP
	/// state machine against its own connect/idle deadline.
	pub fn process_timeouts(&mut self, now: Instant) {
		self.consistency_gate("process_timeouts:entry");

		let expired: Vec<QueryId> = self.udpw.iter().copied().filter(|&id| self.queries.get(id).and_then(|q| q.deadline).is_some_and(|d| now >= d)).collect();

		for id in expired {
			self.try_send_udp(id, now);
			self.consistency_step("process_timeouts:udp_expiry");
		}

		self.process_tcp_timeouts(now);
		self.arm_tcp_idle_if_quiescent(now);

		self.consistency_gate("process_timeouts:exit");
	}

	fn process_tcp_timeouts(&mut self, now: Instant) {
		if self.tcp.deadline.is_some_and(|d| now >= d) {
			match self.tcp.state {
				TcpState::Connecting | TcpState::Handshaking => self.tcp.break_connection(self.servers.len()),
				TcpState::Ok if self.tcpw.is_empty() => self.tcp.disconnect_idle(),
				_ => {}
			}
		}

		if self.tcp.state != TcpState::Broken {
			return;
		}

		self.tcp.settle_broken();

		let nservers = self.servers.len().max(1);
		let waiting: Vec<QueryId> = self.tcpw.iter().copied().collect();

		for id in waiting {
			let Some(query) = self.queries.get_mut(id) else { continue };
			query.tcp_wait_retries += 1;

			if query.tcp_wait_retries as usize > nservers {
				self.fail_query(id, Status::TcpBroken, now);
			}
		}
	}

	fn arm_tcp_idle_if_quiescent(&mut self, now: Instant) {
		if self.tcp.state == TcpState::Ok && self.tcpw.is_empty() && !self.tcp.has_pending_output() && self.tcp.deadline.is_none() {
			self.tcp.deadline = Some(now + TCP_IDLE_TIMEOUT);
		}
	}

	fn drain_udp(&mut self, now: Instant) {
		loop {
			match self.udp.recv() {
				Ok(Some((buf, addr))) => self.handle_udp_datagram(&buf, addr, now),
				Ok(None) => break,
				Err(e) => {
					log::warn!("udp recv failed: {e}");
					break;
				}
			}
		}
	}

	fn handle_udp_datagram(&mut self, buf: &[u8], addr: SocketAddr, now: Instant) {
		if !udp::is_known_server(&addr, &self.servers) {
			log::debug!("dropping datagram from unknown source {addr}");
			return;
		}

		let message = match message::decode_message(buf) {
			Ok(m) => m,
			Err(e) => {
				log::debug!("dropping malformed datagram: {e:?}");
				return;
			}
		};

		let Some(id) = self.udpw.iter().copied().find(|&id| self.queries.get(id).is_some_and(|q| q.id == message.id)) else {
			log::debug!("dropping reply for unknown query id {}", message.id);
			return;
		};

		self.udpw.retain(|&q| q != id);
		self.dispatch_answer(id, message, false, now);
	}

	fn drain_tcp_readable(&mut self, now: Instant) {
		match self.tcp.read_frames() {
			Ok(frames) => {
				for frame in frames {
					match message::decode_message(&frame) {
						Ok(message) => {
							let found = self.tcpw.iter().copied().find(|&id| self.queries.get(id).is_some_and(|q| q.id == message.id));

							match found {
								Some(id) => {
									self.tcpw.retain(|&q| q != id);
									self.dispatch_answer(id, message, true, now);
								}
								None => log::debug!("dropping tcp reply for unknown query id {}", message.id),
							}
						}
						Err(e) => log::debug!("dropping malformed tcp frame: {e:?}"),
					}
				}

				if self.tcp.state == TcpState::Broken {
					self.tcp.break_connection(self.servers.len());
				}
			}
			Err(e) => {
				log::warn!("tcp read failed: {e}");
				self.tcp.break_connection(self.servers.len());
			}
		}
	}

	fn socks_config(&self) -> Option<SocksConfig> {
		self.flags.tor.then(|| SocksConfig { credentials: self.socks.clone() })
	}

	/// Moves `id` onto `tcpw` (truncated UDP answer, §4.5), connecting if
	/// necessary.
	fn move_to_tcp(&mut self, id: QueryId, now: Instant) {
		if let Some(query) = self.queries.get_mut(id) {
			query.state = State::TcpWaiting;
		}

		self.tcpw.push_back(id);

		match self.tcp.state {
			TcpState::Ok => self.send_pending_tcp_queries(now),
			TcpState::Disconnected => {
				if let Err(e) = self.tcp.connect(&self.servers, self.socks_config().as_ref(), now) {
					log::warn!("tcp connect failed: {e}");
					self.tcp.break_connection(self.servers.len());
				}
			}
			TcpState::Connecting | TcpState::Handshaking | TcpState::Broken => {}
		}
	}

	/// Frames every `tcpwaiting` query on `tcpw` and drains the send buffer.
	/// Called once the connection reaches `ok`, and whenever a fresh query
	/// joins an already-`ok` connection.
	fn send_pending_tcp_queries(&mut self, now: Instant) {
		let _ = now;
		let pending: Vec<QueryId> = self.tcpw.iter().copied().filter(|&id| self.queries.get(id).is_some_and(|q| q.state == State::TcpWaiting)).collect();

		for id in pending {
			let Some(query) = self.queries.get_mut(id) else { continue };
			let frame = query.encode();
			query.state = State::TcpSent;
			self.tcp.queue(&frame);
		}

		if let Err(e) = self.tcp.flush() {
			log::warn!("tcp write failed: {e}");
			self.tcp.break_connection(self.servers.len());
		}
	}

	/// Dispatches a decoded answer for `id`: truncation, rcode handling,
	/// CNAME chasing, search-list advance, and composite-query spawning
	/// (§4.5).
	fn dispatch_answer(&mut self, id: QueryId, message: Message, via_tcp: bool, now: Instant) {
		if message.tc && !via_tcp {
			self.move_to_tcp(id, now);
			return;
		}

		match message.rcode {
			Rcode::ServerFailure => return self.retry_other_server(id, via_tcp, now),
			Rcode::Refused => return self.fail_query(id, Status::Refused, now),
			Rcode::NotImplemented => return self.fail_query(id, Status::NotImplemented, now),
			Rcode::FormatErr => return self.fail_query(id, Status::Malformed, now),
			Rcode::NameErr => return self.advance_search_or_fail(id, now),
			Rcode::Ok | Rcode::Reserved => {}
		}

		if message.answers.is_empty() {
			self.advance_search_or_fail(id, now);
			return;
		}

		let Some(query) = self.queries.get(id) else { return };
		let qtype = query.qtype;
		let cname_allowed = query.flags.cname_allowed;

		let direct: Vec<RecordData> = message.answers.iter().filter(|rr| record_matches(&rr.data, qtype)).map(|rr| rr.data.clone()).collect();

		if !direct.is_empty() {
			let ttl = message.answers.iter().filter(|rr| record_matches(&rr.data, qtype)).map(|rr| rr.ttl).min().unwrap_or(0);
			let cname = message.answers.iter().find_map(|rr| match &rr.data {
				RecordData::Cname(target) => Some(target.clone()),
				_ => None,
			});

			self.complete_success(id, cname, ttl, direct, now);
			return;
		}

		if let Some(target) = message.answers.iter().find_map(|rr| match &rr.data {
			RecordData::Cname(target) => Some(target.clone()),
			_ => None,
		}) {
			if !cname_allowed {
				self.fail_query(id, Status::ProhibitedCname, now);
				return;
			}

			let looped = {
				let query = self.queries.get_mut(id).unwrap();
				!query.rewrite(target, qtype, true)
			};

			if looped {
				self.fail_query(id, Status::CnameLoop, now);
				return;
			}

			self.udpw.push_back(id);
			self.try_send_udp(id, now);
			return;
		}

		self.advance_search_or_fail(id, now);
	}

	fn retry_other_server(&mut self, id: QueryId, via_tcp: bool, now: Instant) {
		if via_tcp {
			if let Some(query) = self.queries.get_mut(id) {
				query.state = State::TcpWaiting;
			}

			self.tcpw.push_back(id);
			self.send_pending_tcp_queries(now);
		} else {
			self.udpw.push_back(id);
			self.try_send_udp(id, now);
		}
	}

	fn advance_search_or_fail(&mut self, id: QueryId, now: Instant) {
		let Some(query) = self.queries.get(id) else { return };

		if !query.flags.search || self.search.is_empty() {
			self.fail_query(id, Status::NxDomain, now);
			return;
		}

		let next_pos = query.search_pos + 1;
		let owner = query.owner_name.clone();
		let dots_first = query.search_dots;
		let qtype = query.qtype;

		match search_candidate(&owner, &self.search, next_pos, dots_first) {
			Some(candidate) => {
				let query = self.queries.get_mut(id).unwrap();
				query.search_pos = next_pos;
				query.rewrite(candidate, qtype, false);
				self.udpw.push_back(id);
				self.try_send_udp(id, now);
			}
			None => self.fail_query(id, Status::NxDomain, now),
		}
	}

	/// Decides whether `records` completes the query directly or must first
	/// spawn a composite sub-lookup (PTR forward-verification, MX-with-
	/// addresses).
	fn complete_success(&mut self, id: QueryId, cname: Option<String>, ttl: u32, records: Vec<RecordData>, now: Instant) {
		let Some(query) = self.queries.get(id) else { return };

		if query.qtype == QType::PTR {
			if let Some(RecordData::Ptr(candidate)) = records.first().cloned() {
				if let Some(queried) = parse_ptr_owner(&query.owner_name) {
					self.start_ptr_verify(id, queried, candidate, ttl, now);
					return;
				}
			}
		}

		if query.qtype == QType::MX && query.flags.mx_addresses {
			let exchanges: Vec<(u16, String)> = records
				.iter()
				.filter_map(|r| match r {
					RecordData::Mx { preference, exchange } => Some((*preference, exchange.clone())),
					_ => None,
				})
				.collect();

			if !exchanges.is_empty() {
				self.start_mx_addresses(id, exchanges, ttl, now);
				return;
			}
		}

		self.finish_success(id, cname, ttl, records, now);
	}

	fn spawn_child(&mut self, parent_id: QueryId, name: String, qtype: QType, flags: QueryFlags, now: Instant) -> QueryId {
		let id = self.next_id;
		self.next_id = self.next_id.wrapping_add(1);
		let server = self.next_udp_server();

		let child = Query::new_child(id, name, qtype, flags, server, parent_id);
		let child_id = self.queries.insert(child);

		if let Some(parent) = self.queries.get_mut(parent_id) {
			parent.children.push(child_id);
		}

		self.udpw.push_back(child_id);
		self.try_send_udp(child_id, now);

		child_id
	}

	fn start_ptr_verify(&mut self, parent_id: QueryId, queried: Ipv4Addr, candidate_name: String, ttl: u32, now: Instant) {
		if let Some(parent) = self.queries.get_mut(parent_id) {
			parent.composite = Some(Composite::PtrVerify { queried, candidate_name: candidate_name.clone(), ttl });
			parent.state = State::Child;
		}

		self.childw.push_back(parent_id);
		self.spawn_child(parent_id, candidate_name, QType::A, QueryFlags::default(), now);
	}

	fn start_mx_addresses(&mut self, parent_id: QueryId, exchanges: Vec<(u16, String)>, ttl: u32, now: Instant) {
		let pending = exchanges.len();

		if let Some(parent) = self.queries.get_mut(parent_id) {
			parent.composite = Some(Composite::MxAddresses { exchanges: exchanges.clone(), resolved: Vec::new(), pending, ttl });
			parent.state = State::Child;
		}

		self.childw.push_back(parent_id);

		for (_, exchange) in exchanges {
			self.spawn_child(parent_id, exchange, QType::A, QueryFlags::default(), now);
		}
	}

	/// Re-examines `parent_id` once one of its children reaches `done`,
	/// merging the child's result into the parent's composite state and
	/// either completing the parent or waiting on the rest (§4.5).
	fn on_child_done(&mut self, parent_id: QueryId, child_id: QueryId, now: Instant) {
		let Some(answer) = self.queries.get(child_id).and_then(|q| q.answer.clone()) else {
			self.queries.remove(child_id);
			return;
		};

		let child_name = self.queries.get(child_id).map(|q| q.name.clone()).unwrap_or_default();
		self.queries.remove(child_id);

		let Some(parent) = self.queries.get_mut(parent_id) else { return };
		parent.children.retain(|&c| c != child_id);
		let composite = parent.composite.take();

		match composite {
			Some(Composite::PtrVerify { queried, candidate_name, ttl }) => {
				let verified = answer.status == Status::Ok && answer.records.iter().any(|r| matches!(r, RecordData::A(a) if *a == queried));

				if verified {
					self.finish_success(parent_id, None, ttl, vec![RecordData::Ptr(candidate_name)], now);
				} else {
					self.fail_query(parent_id, Status::Inconsistent, now);
				}
			}
			Some(Composite::MxAddresses { exchanges, mut resolved, pending, ttl }) => {
				let addrs: Vec<Ipv4Addr> = answer.records.iter().filter_map(|r| match r { RecordData::A(a) => Some(*a), _ => None }).collect();
				let preference = exchanges.iter().find(|(_, name)| *name == child_name).map(|(pref, _)| *pref).unwrap_or(0);
				resolved.push((preference, child_name, addrs));
				let pending = pending.saturating_sub(1);

				if pending == 0 {
					let mut records: Vec<RecordData> =
						exchanges.iter().map(|(preference, exchange)| RecordData::Mx { preference: *preference, exchange: exchange.clone() }).collect();

					for (_, _, addrs) in &resolved {
						records.extend(addrs.iter().map(|a| RecordData::A(*a)));
					}

					self.finish_success(parent_id, None, ttl, records, now);
				} else {
					let parent = self.queries.get_mut(parent_id).unwrap();
					parent.composite = Some(Composite::MxAddresses { exchanges, resolved, pending, ttl });
				}
			}
			None => {}
		}
	}

	fn finish_success(&mut self, id: QueryId, cname: Option<String>, ttl: u32, mut records: Vec<RecordData>, now: Instant) {
		self.apply_sortlist(&mut records);

		if let Some(query) = self.queries.get_mut(id) {
			query.succeed(cname, ttl, records);
		}

		self.settle(id, now);
	}

	pub(crate) fn fail_query(&mut self, id: QueryId, status: Status, now: Instant) {
		if let Some(query) = self.queries.get_mut(id) {
			query.fail(status);
		}

		self.settle(id, now);
	}

	/// Removes `id` from every in-flight queue and either delivers it to
	/// `output` or, if it is a child, re-examines its parent.
	fn settle(&mut self, id: QueryId, now: Instant) {
		self.udpw.retain(|&q| q != id);
		self.tcpw.retain(|&q| q != id);
		self.childw.retain(|&q| q != id);

		match self.queries.get(id).and_then(|q| q.parent) {
			Some(parent_id) => self.on_child_done(parent_id, id, now),
			None => self.output.push_back(id),
		}
	}

	/// Reorders A records per the configured sortlist (S5): entries matching
	/// an earlier sortlist rule sort before later ones; unmatched addresses
	/// and non-address records keep their relative order at the back.
	fn apply_sortlist(&self, records: &mut [RecordData]) {
		if self.sortlist.is_empty() {
			return;
		}

		records.sort_by_key(|r| match r {
			RecordData::A(addr) => self.sortlist.iter().position(|e| u32::from(*addr) & u32::from(e.mask) == u32::from(e.base)).unwrap_or(usize::MAX),
			_ => usize::MAX,
		});
	}

	/// Blocks until at least one query completes, or returns `None`
	/// immediately if none are outstanding. The only entry point allowed to
	/// read the system clock and call `poll` itself (§4.4).
	pub fn wait(&mut self) -> Option<Completed<Ctx>> {
		self.consistency_gate("wait:entry");

		loop {
			let now = Instant::now();

			if !self.flags.no_autosys {
				self.process_any(now);
			}

			if let Some(completed) = self.pickup() {
				self.consistency_gate("wait:exit");
				return Some(completed);
			}

			if !self.has_live_queries() {
				self.consistency_gate("wait:exit");
				return None;
			}

			let fds = self.pollfds();
			let timeout = self.first_timeout().map(|deadline| deadline.saturating_duration_since(now));

			match runtime::poll_fds(&fds, timeout) {
				Ok(ready) => {
					for (fd, interest) in ready {
						if interest.readable {
							self.process_readable(fd, now);
						}

						if interest.writable {
							self.process_writable(fd, now);
						}

						if interest.exceptional {
							self.process_exceptional(fd, now);
						}
					}
				}
				Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
					if self.flags.eintr_report {
						log::debug!("wait() interrupted by signal");
					}
				}
				Err(e) => {
					log::error!("poll failed in wait(): {e}");
					self.notify_global_system_failure();
				}
			}

			self.consistency_step("wait:loop");
		}
	}
}

fn record_matches(data: &RecordData, qtype: QType) -> bool {
	matches!(
		(qtype, data),
		(QType::A, RecordData::A(_))
			| (QType::AAAA, RecordData::Aaaa(_))
			| (QType::NS, RecordData::Ns(_))
			| (QType::CNAME, RecordData::Cname(_))
			| (QType::PTR, RecordData::Ptr(_))
			| (QType::MX, RecordData::Mx { .. })
			| (QType::TXT, RecordData::Txt(_))
			| (QType::SOA, RecordData::Soa { .. })
	)
}

/// Reverses `a.b.c.d.in-addr.arpa.` back into the `Ipv4Addr` it names.
fn parse_ptr_owner(owner: &str) -> Option<Ipv4Addr> {
	let owner = owner.trim_end_matches('.');
	let prefix = owner.strip_suffix(".in-addr.arpa")?;
	let mut octets: Vec<u8> = prefix.split('.').map(|s| s.parse().ok()).collect::<Option<_>>()?;

	if octets.len() != 4 {
		return None;
	}

	octets.reverse();
	Some(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]))
}

/// The next search-list candidate for `owner` at cursor `pos`, honoring the
/// `ndots`-derived try-bare-name-first-or-last ordering. `None` once the
/// cursor runs past the search list (search exhausted).
pub(crate) fn search_candidate(owner: &str, search: &[String], pos: usize, dots_first: bool) -> Option<String> {
	if dots_first {
		if pos == 0 {
			return Some(owner.to_owned());
		}

		search.get(pos - 1).map(|suffix| format!("{owner}.{suffix}"))
	} else if pos < search.len() {
		Some(format!("{owner}.{}", search[pos]))
	} else if pos == search.len() {
		Some(owner.to_owned())
	} else {
		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn search_candidate_tries_bare_name_first_when_dotted_enough() {
		let search = vec!["example.test".to_owned()];
		assert_eq!(search_candidate("host", &search, 0, true), Some("host".to_owned()));
		assert_eq!(search_candidate("host", &search, 1, true), Some("host.example.test".to_owned()));
		assert_eq!(search_candidate("host", &search, 2, true), None);
	}

	#[test]
	fn search_candidate_tries_suffixes_first_when_short() {
		let search = vec!["example.test".to_owned(), "example.net".to_owned()];
		assert_eq!(search_candidate("host", &search, 0, false), Some("host.example.test".to_owned()));
		assert_eq!(search_candidate("host", &search, 1, false), Some("host.example.net".to_owned()));
		assert_eq!(search_candidate("host", &search, 2, false), Some("host".to_owned()));
		assert_eq!(search_candidate("host", &search, 3, false), None);
	}

	#[test]
	fn parse_ptr_owner_reverses_octets() {
		assert_eq!(parse_ptr_owner("5.2.0.192.in-addr.arpa."), Some(Ipv4Addr::new(192, 0, 2, 5)));
		assert_eq!(parse_ptr_owner("not-a-ptr-name."), None);
	}
}
