//! End-to-end scenarios (S1-S6) driving the engine against real loopback
//! UDP/TCP sockets standing in for nameservers — no mocking framework, the
//! same sockets a production nameserver would answer on.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, TcpStream, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

use resolver::api::{InitFlags, Resolver};
use resolver::error::Status;
use resolver::query::QueryFlags;
use wire::header::Rcode;
use wire::message::decode_message;
use wire::record::{QType, RecordData};

/// Builds the wire form of a name with no compression, matching what a real
/// nameserver would emit for a freshly-constructed answer.
fn encode_name(name: &str) -> Vec<u8> {
	let mut buf = Vec::new();
	wire::name::encode(&mut buf, name).unwrap();
	buf
}

fn qtype_code(data: &RecordData) -> u16 {
	match data {
		RecordData::A(_) => QType::A.code(),
		RecordData::Aaaa(_) => QType::AAAA.code(),
		RecordData::Cname(_) => QType::CNAME.code(),
		RecordData::Ns(_) => QType::NS.code(),
		RecordData::Ptr(_) => QType::PTR.code(),
		RecordData::Mx { .. } => QType::MX.code(),
		RecordData::Txt(_) => QType::TXT.code(),
		RecordData::Soa { .. } => QType::SOA.code(),
		RecordData::Unknown { qtype, .. } => *qtype,
	}
}

fn encode_rdata(data: &RecordData) -> Vec<u8> {
	match data {
		RecordData::A(addr) => addr.octets().to_vec(),
		RecordData::Cname(n) | RecordData::Ns(n) | RecordData::Ptr(n) => encode_name(n),
		RecordData::Mx { preference, exchange } => {
			let mut v = preference.to_be_bytes().to_vec();
			v.extend(encode_name(exchange));
			v
		}
		RecordData::Txt(bytes) => bytes.clone(),
		_ => Vec::new(),
	}
}

fn rcode_nibble(rcode: Rcode) -> u8 {
	match rcode {
		Rcode::Ok => 0,
		Rcode::FormatErr => 1,
		Rcode::ServerFailure => 2,
		Rcode::NameErr => 3,
		Rcode::NotImplemented => 4,
		Rcode::Refused => 5,
		Rcode::Reserved => 6,
	}
}

/// A bare-bones response encoder: no name compression, a single echoed
/// question, and a flat answer section. Good enough to stand in for a
/// nameserver in these scenarios.
fn build_response(id: u16, question_name: &str, question_qtype: u16, rcode: Rcode, tc: bool, answers: &[(String, u32, RecordData)]) -> Vec<u8> {
	let mut out = Vec::new();
	out.extend_from_slice(&id.to_be_bytes());

	let mut flags_hi = 0x80u8 | 0x01; // QR=1, RD=1
	if tc {
		flags_hi |= 0x02;
	}
	out.push(flags_hi);
	out.push(rcode_nibble(rcode)); // RA=0, Z=0, RCODE in the low nibble

	out.extend_from_slice(&1u16.to_be_bytes()); // qdcount
	out.extend_from_slice(&(answers.len() as u16).to_be_bytes()); // ancount
	out.extend_from_slice(&0u16.to_be_bytes()); // nscount
	out.extend_from_slice(&0u16.to_be_bytes()); // arcount

	out.extend(encode_name(question_name));
	out.extend_from_slice(&question_qtype.to_be_bytes());
	out.extend_from_slice(&1u16.to_be_bytes()); // qclass IN

	for (name, ttl, data) in answers {
		out.extend(encode_name(name));
		out.extend_from_slice(&qtype_code(data).to_be_bytes());
		out.extend_from_slice(&1u16.to_be_bytes());
		out.extend_from_slice(&ttl.to_be_bytes());
		let rdata = encode_rdata(data);
		out.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
		out.extend(rdata);
	}

	out
}

/// A loopback UDP nameserver stand-in: every received datagram is handed to
/// `respond`, whose return value (if any) is sent back to the sender.
fn spawn_udp_server(bind_addr: Ipv4Addr, respond: impl Fn(u16, &str, u16) -> Option<Vec<u8>> + Send + 'static) -> SocketAddrV4 {
	let socket = UdpSocket::bind((bind_addr, 0)).unwrap();
	let addr = match socket.local_addr().unwrap() {
		std::net::SocketAddr::V4(v4) => v4,
		_ => unreachable!(),
	};

	thread::spawn(move || {
		let mut buf = [0u8; 1500];

		loop {
			let Ok((len, from)) = socket.recv_from(&mut buf) else { return };
			let Ok(message) = decode_message(&buf[..len]) else { continue };
			let Some(question) = message.question else { continue };

			if let Some(reply) = respond(message.id, &question.name, question.qtype) {
				let _ = socket.send_to(&reply, from);
			}
		}
	});

	addr
}

/// A loopback TCP nameserver stand-in sharing the UDP server's port,
/// answering framed requests on the first connection it accepts.
fn spawn_tcp_server(addr: SocketAddrV4, respond: impl Fn(u16, &str, u16) -> Option<Vec<u8>> + Send + 'static) {
	let listener = TcpListener::bind(addr).unwrap();

	thread::spawn(move || {
		let Ok((mut stream, _)) = listener.accept() else { return };

		loop {
			let mut len_buf = [0u8; 2];

			if stream.read_exact(&mut len_buf).is_err() {
				return;
			}

			let len = u16::from_be_bytes(len_buf) as usize;
			let mut frame = vec![0u8; len];

			if stream.read_exact(&mut frame).is_err() {
				return;
			}

			let Ok(message) = decode_message(&frame) else { continue };
			let Some(question) = message.question else { continue };

			if let Some(reply) = respond(message.id, &question.name, question.qtype) {
				let _ = stream.write_all(&(reply.len() as u16).to_be_bytes());
				let _ = stream.write_all(&reply);
			}
		}
	});
}

fn nameserver_config(servers: &[SocketAddrV4]) -> String {
	servers.iter().map(|s| format!("nameserver {s}\n")).collect()
}

/// S1: single nameserver returns one A record; expect status=ok, the
/// address, and the TTL.
#[test]
fn s1_single_server_direct_answer() {
	let addr = spawn_udp_server(Ipv4Addr::LOCALHOST, |id, name, qtype| {
		Some(build_response(id, name, qtype, Rcode::Ok, false, &[(name.to_owned(), 60, RecordData::A(Ipv4Addr::new(192, 0, 2, 1)))]))
	});

	let mut resolver: Resolver<()> = Resolver::init_from_string(&nameserver_config(&[addr]), InitFlags::default()).unwrap();
	resolver.submit("example.test.", QType::A, QueryFlags::default(), (), Instant::now()).unwrap();

	let completed = resolver.wait().expect("a completed query");
	assert_eq!(completed.answer.status, Status::Ok);
	assert_eq!(completed.answer.ttl, 60);
	assert_eq!(completed.answer.records, vec![RecordData::A(Ipv4Addr::new(192, 0, 2, 1))]);
}

/// S2: the first nameserver drops every packet; the engine must exhaust its
/// retry budget against it before succeeding against the second.
#[test]
fn s2_falls_back_to_second_server_after_first_drops_packets() {
	let dead = spawn_udp_server(Ipv4Addr::LOCALHOST, |_id, _name, _qtype| None);
	let alive = spawn_udp_server(Ipv4Addr::LOCALHOST, |id, name, qtype| {
		Some(build_response(id, name, qtype, Rcode::Ok, false, &[(name.to_owned(), 30, RecordData::A(Ipv4Addr::new(192, 0, 2, 9)))]))
	});

	let mut resolver: Resolver<()> = Resolver::init_from_string(&nameserver_config(&[dead, alive]), InitFlags::default()).unwrap();
	resolver.submit("example.test.", QType::A, QueryFlags::default(), (), Instant::now()).unwrap();

	let completed = resolver.wait().expect("a completed query");
	assert_eq!(completed.answer.status, Status::Ok);
	assert_eq!(completed.answer.records, vec![RecordData::A(Ipv4Addr::new(192, 0, 2, 9))]);
}

/// S3: the server sets TC on the UDP reply; the engine must fall back to
/// TCP and deliver both A records from the framed TCP answer.
#[test]
fn s3_truncated_udp_reply_falls_back_to_tcp() {
	let addr = spawn_udp_server(Ipv4Addr::LOCALHOST, |id, name, qtype| Some(build_response(id, name, qtype, Rcode::Ok, true, &[])));

	spawn_tcp_server(addr, |id, name, qtype| {
		Some(build_response(
			id,
			name,
			qtype,
			Rcode::Ok,
			false,
			&[(name.to_owned(), 45, RecordData::A(Ipv4Addr::new(192, 0, 2, 10))), (name.to_owned(), 45, RecordData::A(Ipv4Addr::new(192, 0, 2, 11)))],
		))
	});

	let mut resolver: Resolver<()> = Resolver::init_from_string(&nameserver_config(&[addr]), InitFlags::default()).unwrap();
	resolver.submit("example.test.", QType::A, QueryFlags::default(), (), Instant::now()).unwrap();

	let completed = resolver.wait().expect("a completed query");
	assert_eq!(completed.answer.status, Status::Ok);
	assert_eq!(completed.answer.records, vec![RecordData::A(Ipv4Addr::new(192, 0, 2, 10)), RecordData::A(Ipv4Addr::new(192, 0, 2, 11))]);
}

/// S4: a PTR answer whose forward check returns a *different* address than
/// was queried must fail as inconsistent.
#[test]
fn s4_ptr_forward_verification_mismatch_is_inconsistent() {
	let addr = spawn_udp_server(Ipv4Addr::LOCALHOST, |id, name, qtype| match QType::from_u16(qtype) {
		Some(QType::PTR) => Some(build_response(id, name, qtype, Rcode::Ok, false, &[(name.to_owned(), 60, RecordData::Ptr("host.example.".to_owned()))])),
		Some(QType::A) => Some(build_response(id, name, qtype, Rcode::Ok, false, &[(name.to_owned(), 60, RecordData::A(Ipv4Addr::new(192, 0, 2, 6)))])),
		_ => None,
	});

	let mut resolver: Resolver<()> = Resolver::init_from_string(&nameserver_config(&[addr]), InitFlags::default()).unwrap();
	resolver.submit("5.2.0.192.in-addr.arpa.", QType::PTR, QueryFlags::default(), (), Instant::now()).unwrap();

	let completed = resolver.wait().expect("a completed query");
	assert_eq!(completed.answer.status, Status::Inconsistent);
}

/// S5: a configured sortlist reorders the answer so an address matching an
/// earlier entry comes first, regardless of the order the server sent them.
#[test]
fn s5_sortlist_reorders_addresses() {
	let addr = spawn_udp_server(Ipv4Addr::LOCALHOST, |id, name, qtype| {
		Some(build_response(
			id,
			name,
			qtype,
			Rcode::Ok,
			false,
			&[(name.to_owned(), 60, RecordData::A(Ipv4Addr::new(10, 1, 2, 3))), (name.to_owned(), 60, RecordData::A(Ipv4Addr::new(192, 0, 2, 40)))],
		))
	});

	let config = format!("{}sortlist 192.0.2.0/26 10.0.0.0/255.0.0.0\n", nameserver_config(&[addr]));
	let mut resolver: Resolver<()> = Resolver::init_from_string(&config, InitFlags::default()).unwrap();
	resolver.submit("example.test.", QType::A, QueryFlags::default(), (), Instant::now()).unwrap();

	let completed = resolver.wait().expect("a completed query");
	assert_eq!(completed.answer.records, vec![RecordData::A(Ipv4Addr::new(192, 0, 2, 40)), RecordData::A(Ipv4Addr::new(10, 1, 2, 3))]);
}

/// S6: with Tor mode on, a non-loopback TCP target must tunnel through the
/// SOCKS5 proxy at 127.0.0.1:9050 before the DNS exchange proceeds as if
/// direct. Drives `TcpTransport` directly (rather than the full `Resolver`,
/// whose other end of this connection is always a configured-as-loopback
/// nameserver in these scenarios) since only a genuinely non-loopback target
/// takes the tunnel path at all.
#[test]
fn s6_tcp_fallback_tunnels_through_socks5() {
	use resolver::transport::tcp::{SocksConfig, TcpState, TcpTransport};

	// the real nameserver, reachable in this test only through the proxy —
	// the proxy below ignores the CONNECT's requested address and always
	// dials this listener, standing in for the Tor circuit's far end.
	let real_listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
	let real_addr = match real_listener.local_addr().unwrap() {
		std::net::SocketAddr::V4(v4) => v4,
		_ => unreachable!(),
	};

	thread::spawn(move || {
		let Ok((mut stream, _)) = real_listener.accept() else { return };
		let mut len_buf = [0u8; 2];

		if stream.read_exact(&mut len_buf).is_err() {
			return;
		}

		let len = u16::from_be_bytes(len_buf) as usize;
		let mut frame = vec![0u8; len];

		if stream.read_exact(&mut frame).is_err() {
			return;
		}

		let Ok(message) = decode_message(&frame) else { return };
		let Some(question) = message.question else { return };
		let reply = build_response(message.id, &question.name, question.qtype, Rcode::Ok, false, &[(question.name.clone(), 60, RecordData::A(Ipv4Addr::new(192, 0, 2, 20)))]);
		let _ = stream.write_all(&(reply.len() as u16).to_be_bytes());
		let _ = stream.write_all(&reply);
	});

	spawn_socks5_proxy(real_addr);

	// TEST-NET-2 (RFC 5737): documentation-only, guaranteed non-routable and
	// non-loopback, so `connect` takes the tunnel branch.
	let target = SocketAddrV4::new(Ipv4Addr::new(198, 51, 100, 7), 53);
	let mut tcp = TcpTransport::new(1);
	let socks_cfg = SocksConfig { credentials: None };

	tcp.connect(&[target], Some(&socks_cfg), Instant::now()).expect("socks handshake should complete synchronously");
	assert_eq!(tcp.state, TcpState::Connecting);

	wait_writable(&tcp);
	tcp.process_writable_while_connecting().expect("connect should have succeeded through the tunnel");
	assert_eq!(tcp.state, TcpState::Ok);

	let query = wire::message::encode_query(0x42, &wire::question::Question::new("example.test.", QType::A));
	tcp.queue(&query);
	tcp.flush().unwrap();

	let frames = wait_for_frame(&mut tcp);
	let message = decode_message(&frames[0]).unwrap();
	assert_eq!(message.answers.len(), 1);
}

fn wait_writable(tcp: &resolver::transport::tcp::TcpTransport) {
	let Some(fd) = tcp.as_raw_fd() else { return };
	let _ = runtime::poll_fds(&[(fd, runtime::Interest::WRITABLE)], Some(Duration::from_secs(5)));
}

fn wait_for_frame(tcp: &mut resolver::transport::tcp::TcpTransport) -> Vec<Vec<u8>> {
	let deadline = Instant::now() + Duration::from_secs(5);

	loop {
		if let Some(fd) = tcp.as_raw_fd() {
			let _ = runtime::poll_fds(&[(fd, runtime::Interest::READABLE)], Some(Duration::from_millis(200)));
		}

		let frames = tcp.read_frames().unwrap();

		if !frames.is_empty() || Instant::now() >= deadline {
			return frames;
		}
	}
}

/// A minimal RFC 1928 SOCKS5 proxy fixed at 127.0.0.1:9050, speaking just
/// enough of the protocol (no-auth method negotiation, CONNECT) to hand the
/// TCP fallback connection through to `target`.
fn spawn_socks5_proxy(target: SocketAddrV4) {
	let Ok(listener) = TcpListener::bind((Ipv4Addr::LOCALHOST, 9050)) else {
		// another test run (or a real Tor daemon) already owns the port;
		// the scenario can't exercise the tunnel in that case.
		return;
	};

	thread::spawn(move || {
		let Ok((mut client, _)) = listener.accept() else { return };

		let mut greeting = [0u8; 2];

		if client.read_exact(&mut greeting).is_err() {
			return;
		}

		let nmethods = greeting[1] as usize;
		let mut methods = vec![0u8; nmethods];

		if client.read_exact(&mut methods).is_err() {
			return;
		}

		// version 5, method 0 (no authentication)
		if client.write_all(&[0x05, 0x00]).is_err() {
			return;
		}

		let mut request = [0u8; 4];

		if client.read_exact(&mut request).is_err() {
			return;
		}

		// ATYP IPv4: 4 address bytes + 2 port bytes
		let mut addr_buf = [0u8; 6];

		if client.read_exact(&mut addr_buf).is_err() {
			return;
		}

		let Ok(mut upstream) = TcpStream::connect(target) else {
			let _ = client.write_all(&[0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
			return;
		};

		let reply = [0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0, 0];

		if client.write_all(&reply).is_err() {
			return;
		}

		let mut client_reader = client.try_clone().unwrap();
		let mut upstream_writer = upstream.try_clone().unwrap();

		let to_upstream = thread::spawn(move || {
			let _ = std::io::copy(&mut client_reader, &mut upstream_writer);
		});

		let _ = std::io::copy(&mut upstream, &mut client);
		let _ = to_upstream.join();
	});

	thread::sleep(Duration::from_millis(50));
}
