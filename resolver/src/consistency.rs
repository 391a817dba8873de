//! Structural invariant checker (`spec.md` §4.6, §8 properties 1-8).
//!
//! A pure reader: never mutates `Resolver`. Collects every violated
//! invariant rather than asserting-and-aborting on the first one, which is
//! the stricter, more debuggable contract `SPEC_FULL.md` calls for.

use crate::api::Resolver;
use crate::query::{State, MAX_CNAME_HOPS, UDP_MAX_RETRIES};
use crate::slab::QueryId;
use crate::transport::tcp::TcpState;

/// Checks every invariant in §3 across all queues and the TCP state,
/// returning every violation found rather than stopping at the first.
pub fn check<Ctx>(resolver: &Resolver<Ctx>) -> Result<(), Vec<String>> {
	let mut problems = Vec::new();
	let nservers = resolver.servers.len();

	check_queue_partitioning(resolver, &mut problems);
	check_state_queue_coherence(resolver, &mut problems);
	check_bitmask_bounds(resolver, nservers, &mut problems);
	check_sortlist(resolver, &mut problems);
	check_tcp_buffers(resolver, &mut problems);
	check_tcp_server_range(resolver, nservers, &mut problems);
	check_parent_child_symmetry(resolver, &mut problems);

	if problems.is_empty() {
		Ok(())
	} else {
		Err(problems)
	}
}

/// Invariant 1: every live query is on exactly one of `udpw`/`tcpw`/`childw`/`output`.
fn check_queue_partitioning<Ctx>(resolver: &Resolver<Ctx>, problems: &mut Vec<String>) {
	let mut membership: std::collections::HashMap<QueryId, u32> = std::collections::HashMap::new();

	for &id in resolver.udpw.iter().chain(resolver.tcpw.iter()).chain(resolver.childw.iter()).chain(resolver.output.iter()) {
		*membership.entry(id).or_insert(0) += 1;
	}

	for (id, _) in resolver.queries.iter() {
		match membership.get(&id) {
			Some(1) => {}
			Some(n) => problems.push(format!("query {id:?} appears on {n} queues at once")),
			None => problems.push(format!("query {id:?} is on no queue")),
		}
	}

	for id in membership.keys() {
		if resolver.queries.get(*id).is_none() {
			problems.push(format!("queue references freed query {id:?}"));
		}
	}
}

/// Invariant 2: `state` and queue membership agree.
fn check_state_queue_coherence<Ctx>(resolver: &Resolver<Ctx>, problems: &mut Vec<String>) {
	for &id in &resolver.udpw {
		let Some(query) = resolver.queries.get(id) else { continue };

		if query.state != State::ToSend {
			problems.push(format!("query {id:?} on udpw has state {:?}, expected ToSend", query.state));
		}
	}

	for &id in &resolver.tcpw {
		let Some(query) = resolver.queries.get(id) else { continue };

		if !matches!(query.state, State::TcpWaiting | State::TcpSent) {
			problems.push(format!("query {id:?} on tcpw has state {:?}, expected TcpWaiting/TcpSent", query.state));
		}
	}

	for &id in &resolver.childw {
		let Some(query) = resolver.queries.get(id) else { continue };

		if query.state != State::Child {
			problems.push(format!("query {id:?} on childw has state {:?}, expected Child", query.state));
		}

		if query.children.is_empty() {
			problems.push(format!("query {id:?} on childw has no children"));
		}
	}

	for &id in &resolver.output {
		let Some(query) = resolver.queries.get(id) else { continue };

		if query.state != State::Done {
			problems.push(format!("query {id:?} on output has state {:?}, expected Done", query.state));
		}

		if !query.children.is_empty() {
			problems.push(format!("query {id:?} on output still has children"));
		}

		if query.parent.is_some() {
			problems.push(format!("query {id:?} on output still has a parent"));
		}

		if query.answer.is_none() {
			problems.push(format!("query {id:?} on output has no answer"));
		}
	}
}

/// Invariant 3 / Property 3: `udpsent`/`tcpfailed` bits and `udpretries`/
/// `search_pos` stay within bounds.
fn check_bitmask_bounds<Ctx>(resolver: &Resolver<Ctx>, nservers: usize, problems: &mut Vec<String>) {
	let mask = if nservers >= 32 { u32::MAX } else { (1u32 << nservers) - 1 };

	for (id, query) in resolver.queries.iter() {
		if query.udpsent & !mask != 0 {
			problems.push(format!("query {id:?} udpsent {:#x} has bits beyond {nservers} servers", query.udpsent));
		}

		if query.tcpfailed & !mask != 0 {
			problems.push(format!("query {id:?} tcpfailed {:#x} has bits beyond {nservers} servers", query.tcpfailed));
		}

		if query.udp_retries > UDP_MAX_RETRIES + 1 {
			problems.push(format!("query {id:?} udp_retries {} exceeds UDP_MAX_RETRIES+1", query.udp_retries));
		}

		if query.search_pos > resolver.search.len() + 1 {
			problems.push(format!("query {id:?} search_pos {} runs past the search list", query.search_pos));
		}

		if query.cname_hops > MAX_CNAME_HOPS {
			problems.push(format!("query {id:?} cname_hops {} exceeds the cap", query.cname_hops));
		}
	}
}

/// Invariant 6 / Property 5: every sortlist entry is well-formed.
fn check_sortlist<Ctx>(resolver: &Resolver<Ctx>, problems: &mut Vec<String>) {
	for (i, entry) in resolver.sortlist.iter().enumerate() {
		if !entry.is_well_formed() {
			problems.push(format!("sortlist entry {i} ({:?}/{:?}) has bits outside its mask", entry.base, entry.mask));
		}
	}
}

/// Invariant 5 / Property 4: in `disconnected`/`broken`, no socket or buffered data.
fn check_tcp_buffers<Ctx>(resolver: &Resolver<Ctx>, problems: &mut Vec<String>) {
	let idle = matches!(resolver.tcp.state, TcpState::Disconnected | TcpState::Broken);

	if idle {
		if resolver.tcp.as_raw_fd().is_some() {
			problems.push("tcp socket held while disconnected/broken".to_owned());
		}

		if resolver.tcp.has_pending_output() {
			problems.push("tcp send buffer non-empty while disconnected/broken".to_owned());
		}
	} else if resolver.tcp.as_raw_fd().is_none() {
		problems.push(format!("tcp state {:?} has no socket", resolver.tcp.state));
	}
}

/// Invariant 7: the TCP server index stays within the configured range.
fn check_tcp_server_range<Ctx>(resolver: &Resolver<Ctx>, nservers: usize, problems: &mut Vec<String>) {
	if nservers > 0 && resolver.tcp.server >= nservers {
		problems.push(format!("tcp server index {} out of range for {nservers} servers", resolver.tcp.server));
	}
}

/// Invariant 4 / Property 8: parent/child back-references agree, and a
/// linked child is never `done`.
fn check_parent_child_symmetry<Ctx>(resolver: &Resolver<Ctx>, problems: &mut Vec<String>) {
	for (id, query) in resolver.queries.iter() {
		for &child_id in &query.children {
			match resolver.queries.get(child_id) {
				Some(child) if child.parent == Some(id) => {
					if child.state == State::Done {
						problems.push(format!("child {child_id:?} of {id:?} is done but still linked"));
					}
				}
				Some(_) => problems.push(format!("child {child_id:?} of {id:?} does not point back to its parent")),
				None => problems.push(format!("query {id:?} lists freed child {child_id:?}")),
			}
		}

		if let Some(parent_id) = query.parent {
			match resolver.queries.get(parent_id) {
				Some(parent) => {
					let count = parent.children.iter().filter(|&&c| c == id).count();

					if count != 1 {
						problems.push(format!("query {id:?} appears {count} times in parent {parent_id:?}'s children list"));
					}
				}
				None => problems.push(format!("query {id:?} has freed parent {parent_id:?}")),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Instant;

	use wire::record::QType;

	use crate::api::{InitFlags, Resolver};
	use crate::query::QueryFlags;

	use super::check;

	#[test]
	fn fresh_resolver_is_consistent() {
		let resolver: Resolver<()> = Resolver::init_from_string("nameserver 127.0.0.1\n", InitFlags::default()).unwrap();
		assert!(check(&resolver).is_ok());
	}

	#[test]
	fn freshly_submitted_query_is_consistent() {
		let mut resolver: Resolver<()> = Resolver::init_from_string("nameserver 127.0.0.1\n", InitFlags { no_autosys: true, ..Default::default() }).unwrap();
		resolver.submit("example.test", QType::A, QueryFlags::default(), (), Instant::now()).unwrap();
		assert!(check(&resolver).is_ok());
	}
}
