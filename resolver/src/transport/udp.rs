//! UDP send/receive and server selection (`spec.md` §4.2).
//!
//! Grounded on `dspeyrer-net/net/src/dns/mod.rs`'s retry-timer-per-request
//! pattern, generalized to the original's exact server-rotation and retry
//! accounting in `original_source/src/event.c`.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant};

use runtime::RawFd;

use crate::query::{Query, UDP_MAX_RETRIES};

/// DNS-over-UDP's classic size ceiling; large enough for unsigned answers
/// with a handful of records without needing EDNS0.
pub const DNS_MAXUDP: usize = 1500;
/// Per-attempt retry timeout (`UDPRETRYMS`).
pub const UDP_RETRY: Duration = Duration::from_millis(2_000);

pub struct UdpTransport {
	socket: UdpSocket,
}

/// The outcome of attempting to advance a query's UDP send state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
	/// datagram emitted, per-query deadline armed
	Sent,
	/// the OS socket isn't writable right now; try again later, same server
	WouldBlock,
	/// every server has been tried across the retry budget
	RetriesExhausted,
}

impl UdpTransport {
	pub fn bind() -> io::Result<Self> {
		let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
		socket.set_nonblocking(true)?;
		Ok(Self { socket })
	}

	pub fn as_raw_fd(&self) -> RawFd {
		runtime::as_raw(&self.socket)
	}

	/// Advances `query`'s UDP send state by one step: picks the next
	/// not-yet-tried server, sends the encoded question to it, and arms the
	/// per-query retry deadline. See §4.2's send path.
	pub fn advance_send<Ctx>(&self, query: &mut Query<Ctx>, servers: &[SocketAddrV4], now: Instant) -> io::Result<SendOutcome> {
		let nservers = servers.len();

		loop {
			let Some(server) = (0..nservers).find(|&i| !query.udp_was_sent_to(i)) else {
				query.udpsent = 0;
				query.udp_retries += 1;

				if query.udp_retries > UDP_MAX_RETRIES {
					return Ok(SendOutcome::RetriesExhausted);
				}

				continue;
			};

			query.udp_server = server;
			let addr = SocketAddr::V4(servers[server]);
			let buf = query.encode();

			match self.socket.send_to(&buf, addr) {
				Ok(_) => {
					query.mark_udp_sent(server);
					query.deadline = Some(now + UDP_RETRY);
					return Ok(SendOutcome::Sent);
				}
				Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(SendOutcome::WouldBlock),
				Err(_) => {
					// hard error: mark this server tried and move to the next
					query.mark_udp_sent(server);
				}
			}
		}
	}

	/// Reads one pending datagram, if any. Returns `None` on `EWOULDBLOCK`;
	/// callers should loop until that happens (§4.4's "loop until EAGAIN").
	pub fn recv(&self) -> io::Result<Option<(Vec<u8>, SocketAddr)>> {
		let mut buf = vec![0u8; DNS_MAXUDP];

		match self.socket.recv_from(&mut buf) {
			Ok((len, addr)) => {
				buf.truncate(len);
				Ok(Some((buf, addr)))
			}
			Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
			Err(e) => Err(e),
		}
	}
}

/// Returns `true` if `addr` names one of the configured servers (address and
/// port both) — the validation the receive path applies before matching a
/// reply to a query (§4.2: "validate it came from a known server").
pub fn is_known_server(addr: &SocketAddr, servers: &[SocketAddrV4]) -> bool {
	match addr {
		SocketAddr::V4(v4) => servers.contains(v4),
		SocketAddr::V6(_) => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::query::QueryFlags;
	use wire::record::QType;

	#[test]
	fn advance_send_exhausts_after_udpmaxretries_plus_one_rounds() {
		let transport = UdpTransport::bind().unwrap();
		let servers = vec![SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 1), 53), SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 2), 53)];
		let mut query = Query::new(1, (), "example.test".into(), QType::A, QueryFlags::default(), 0);
		let now = Instant::now();

		let mut sent = 0;

		loop {
			match transport.advance_send(&mut query, &servers, now).unwrap() {
				SendOutcome::Sent => sent += 1,
				SendOutcome::RetriesExhausted => break,
				SendOutcome::WouldBlock => panic!("unexpected would-block on a fresh loopback socket"),
			}
		}

		assert_eq!(sent, (UDP_MAX_RETRIES as usize + 1) * servers.len());
	}

	#[test]
	fn is_known_server_checks_address_and_port() {
		let servers = vec![SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 1), 53)];
		let good = SocketAddr::V4(servers[0]);
		let bad_port = SocketAddr::V4(SocketAddrV4::new(*servers[0].ip(), 5353));
		let bad_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 9), 53));

		assert!(is_known_server(&good, &servers));
		assert!(!is_known_server(&bad_port, &servers));
		assert!(!is_known_server(&bad_addr, &servers));
	}
}
