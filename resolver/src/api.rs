//! The public surface: initialization, submission, cancellation, and the
//! check/wait pickup pair (`spec.md` §4.1, §6).

use std::collections::VecDeque;
use std::net::SocketAddrV4;
use std::time::Instant;

use rand::Rng;
use wire::record::QType;

use crate::config::{ResolverConfig, SortEntry};
use crate::consistency;
use crate::error::{EngineError, Status};
use crate::query::{Query, QueryFlags};
use crate::slab::{QueryId, Slab};
use crate::transport::socks::Credentials;
use crate::transport::tcp::TcpTransport;
use crate::transport::udp::UdpTransport;

/// Initialization flags (`adns_initflags` in the original), bit-or-able in
/// spirit even though Rust models them as a plain struct of `bool`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitFlags {
	pub no_env: bool,
	pub no_autosys: bool,
	pub debug: bool,
	pub no_error_print: bool,
	pub eintr_report: bool,
	pub consistency: ConsistencyLevel,
	/// tunnel the TCP fallback connection through Tor
	pub tor: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsistencyLevel {
	#[default]
	Off,
	/// checked on entry/exit of every public call
	EntryExit,
	/// checked at every internal step
	Every,
}

pub struct Completed<Ctx> {
	pub id: QueryId,
	pub context: Ctx,
	pub answer: crate::query::Answer,
}

/// The outcome of a non-blocking pickup attempt (`check`).
pub enum CheckResult<Ctx> {
	/// a completed query was drained from `output`
	Ready(Completed<Ctx>),
	/// no live queries at all — "no such work"
	Idle,
	/// queries are live but none has completed yet — "would block"
	Pending,
}

pub struct Resolver<Ctx = ()> {
	pub(crate) queries: Slab<Query<Ctx>>,
	pub(crate) udpw: VecDeque<QueryId>,
	pub(crate) tcpw: VecDeque<QueryId>,
	pub(crate) childw: VecDeque<QueryId>,
	pub(crate) output: VecDeque<QueryId>,

	pub(crate) servers: Vec<SocketAddrV4>,
	pub(crate) sortlist: Vec<SortEntry>,
	pub(crate) search: Vec<String>,
	pub(crate) ndots: u32,

	pub(crate) udp: UdpTransport,
	pub(crate) tcp: TcpTransport,
	pub(crate) socks: Option<Credentials>,

	pub(crate) next_id: u16,
	pub(crate) flags: InitFlags,

	pub diagnostics: Vec<String>,
	pub configerrno: Option<String>,
}

impl<Ctx> Resolver<Ctx> {
	fn from_config(cfg: ResolverConfig, flags: InitFlags, socks: Option<Credentials>) -> Result<Self, EngineError> {
		if let Some(errno) = &cfg.configerrno {
			// A saved config errno precludes operation entirely (§7); plain
			// EINVAL-shaped diagnostics never reach `configerrno` and are
			// downgraded to warnings in `diagnostics` instead.
			return Err(EngineError::Config(errno.clone()));
		}

		let udp = UdpTransport::bind().map_err(EngineError::Io)?;
		let nservers = cfg.servers.len();

		Ok(Self {
			queries: Slab::new(),
			udpw: VecDeque::new(),
			tcpw: VecDeque::new(),
			childw: VecDeque::new(),
			output: VecDeque::new(),
			servers: cfg.servers,
			sortlist: cfg.sortlist,
			search: cfg.search,
			ndots: cfg.ndots,
			udp,
			tcp: TcpTransport::new(nservers),
			socks,
			next_id: rand::thread_rng().gen(),
			flags,
			diagnostics: cfg.diagnostics,
			configerrno: cfg.configerrno,
		})
	}

	/// Runs the structural invariant checker and records every violation
	/// found, both through `log::warn!` and in `diagnostics` (§4.6).
	fn run_consistency_check(&mut self, site: &str) {
		if let Err(problems) = consistency::check(self) {
			for problem in problems {
				let line = format!("adns: consistency check failed at {site}: {problem}");
				log::warn!("{line}");
				self.diagnostics.push(line);
			}
		}
	}

	/// Gate for `EntryExit`/`Every`: runs on entry/exit of every public
	/// operation.
	pub(crate) fn consistency_gate(&mut self, site: &str) {
		if self.flags.consistency != ConsistencyLevel::Off {
			self.run_consistency_check(site);
		}
	}

	/// Gate for `Every` only: runs at internal steps finer than a whole
	/// public call, e.g. once per dispatched readiness event.
	pub(crate) fn consistency_step(&mut self, site: &str) {
		if self.flags.consistency == ConsistencyLevel::Every {
			self.run_consistency_check(site);
		}
	}

	/// Reads configuration from the environment and `/etc/resolv.conf` (or
	/// their overrides), honoring `flags.no_env`.
	pub fn init(flags: InitFlags) -> Result<Self, EngineError> {
		let cfg = ResolverConfig::from_environment(flags.no_env);
		let socks = if flags.tor { Some(Credentials { username: String::new(), password: String::new() }) } else { None };
		Self::from_config(cfg, flags, socks)
	}

	/// Reads configuration purely from `text`, bypassing the environment and
	/// filesystem.
	pub fn init_from_string(text: &str, flags: InitFlags) -> Result<Self, EngineError> {
		let cfg = ResolverConfig::from_str_no_env(text);
		let socks = if flags.tor { Some(Credentials { username: String::new(), password: String::new() }) } else { None };
		Self::from_config(cfg, flags, socks)
	}

	/// Cancels every outstanding query and consumes the resolver, closing
	/// its sockets.
	pub fn finish(mut self) {
		let ids: Vec<QueryId> = self.queries.iter().map(|(id, _)| id).collect();

		for id in ids {
			self.cancel(id);
		}
	}

	fn next_udp_server(&mut self) -> usize {
		let id = self.next_id;
		self.next_id = self.next_id.wrapping_add(1);

		if self.servers.is_empty() {
			0
		} else {
			id as usize % self.servers.len()
		}
	}

	/// Creates a query record, encodes its question, places it on `udpw`
	/// with state `tosend`, and opportunistically attempts an immediate
	/// send. See §4.1.
	pub fn submit(&mut self, name: impl Into<String>, qtype: QType, flags: QueryFlags, context: Ctx, now: Instant) -> Result<QueryId, EngineError> {
		self.consistency_gate("submit:entry");
		let result = self.submit_inner(name, qtype, flags, context, now);
		self.consistency_gate("submit:exit");
		result
	}

	fn submit_inner(&mut self, name: impl Into<String>, qtype: QType, flags: QueryFlags, context: Ctx, now: Instant) -> Result<QueryId, EngineError> {
		if self.servers.is_empty() {
			return Err(EngineError::Config("no nameservers configured".into()));
		}

		let name = name.into();

		if name.len() > 255 {
			return Err(EngineError::InvalidArgument("name too long"));
		}

		let id = self.next_id;
		self.next_id = self.next_id.wrapping_add(1);
		let server = self.next_udp_server();

		let mut query = Query::new(id, context, name, qtype, flags, server);

		if flags.search && !self.search.is_empty() {
			let dots = query.owner_name.matches('.').count() as u32;
			query.search_dots = dots >= self.ndots;

			if let Some(candidate) = crate::scheduler::search_candidate(&query.owner_name, &self.search, 0, query.search_dots) {
				query.name = candidate;
			}
		}

		let query_id = self.queries.try_insert(query).map_err(|_| EngineError::OutOfMemory)?;
		self.udpw.push_back(query_id);

		self.try_send_udp(query_id, now);

		if !self.flags.no_autosys {
			self.process_any(now);
		}

		Ok(query_id)
	}

	/// Removes `id` from whichever queue it sits on, recursively cancels its
	/// children, detaches from any parent, and releases the record.
	pub fn cancel(&mut self, id: QueryId) {
		self.consistency_gate("cancel:entry");
		self.cancel_inner(id);
		self.consistency_gate("cancel:exit");
	}

	fn cancel_inner(&mut self, id: QueryId) {
		let Some(query) = self.queries.get(id) else { return };
		let children = query.children.clone();
		let parent = query.parent;

		for child in children {
			self.cancel_inner(child);
		}

		self.udpw.retain(|&q| q != id);
		self.tcpw.retain(|&q| q != id);
		self.childw.retain(|&q| q != id);
		self.output.retain(|&q| q != id);

		self.queries.remove(id);

		if let Some(parent) = parent {
			if let Some(p) = self.queries.get_mut(parent) {
				p.children.retain(|&c| c != id);
			}
		}
	}

	/// Non-blocking pickup: drains one completed query if one is ready.
	pub fn check(&mut self, now: Instant) -> CheckResult<Ctx> {
		self.consistency_gate("check:entry");

		if !self.flags.no_autosys {
			self.process_any(now);
		}

		let result = match self.pickup() {
			Some(completed) => CheckResult::Ready(completed),
			None if self.queries.is_empty() => CheckResult::Idle,
			None => CheckResult::Pending,
		};

		self.consistency_gate("check:exit");
		result
	}

	pub(crate) fn pickup(&mut self) -> Option<Completed<Ctx>> {
		let id = self.output.pop_front()?;
		let query = self.queries.remove(id);
		let answer = query.answer.expect("a query on `output` always carries its answer");
		let context = query.context.expect("only a top-level query ever reaches `output`");
		Some(Completed { id, context, answer })
	}

	pub fn has_live_queries(&self) -> bool {
		!self.queries.is_empty()
	}

	/// Iterates the ids of every query currently tracked by the resolver,
	/// live or completed-but-unpicked.
	pub fn for_all_queries(&self) -> impl Iterator<Item = QueryId> + '_ {
		self.queries.iter().map(|(id, _)| id)
	}

	/// Fails every outstanding query with a system-failure status and tears
	/// down the TCP connection, without invalidating the resolver state
	/// itself (§7: "the resolver state remains usable").
	pub fn notify_global_system_failure(&mut self) {
		log::error!("global system failure notified; failing all outstanding queries");

		let ids: Vec<QueryId> = self.queries.iter().filter(|(_, q)| !q.is_done()).map(|(id, _)| id).collect();

		for id in ids {
			self.udpw.retain(|&q| q != id);
			self.tcpw.retain(|&q| q != id);
			self.childw.retain(|&q| q != id);

			if let Some(query) = self.queries.get_mut(id) {
				query.fail(Status::AllServersFailed);
				self.output.push_back(id);
			}
		}

		self.tcp = TcpTransport::new(self.servers.len());
	}
}
