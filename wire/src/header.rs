use bilge::prelude::*;
use utils::bytes::Cast;
use utils::endian::{u16be, BigEndian};

/// A four-bit DNS opcode (RFC 1035 §4.1.1).
#[bitsize(4)]
#[derive(FromBits, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
	/// a standard query
	Query = 0,
	/// an inverse query
	IQuery = 1,
	/// a server status request
	Status = 2,
	/// reserved
	#[fallback]
	Reserved,
}

/// A four-bit DNS response code (RFC 1035 §4.1.1).
#[bitsize(4)]
#[derive(FromBits, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rcode {
	/// No error condition
	Ok = 0,
	/// Format error - the name server was unable to interpret the query.
	FormatErr = 1,
	/// Server failure - the name server was unable to process this query due to a problem with the name server.
	ServerFailure = 2,
	/// Name Error - signifies that the domain name referenced in the query does not exist (NXDOMAIN).
	NameErr = 3,
	/// Not Implemented - the name server does not support the requested kind of query.
	NotImplemented = 4,
	/// Refused - the name server refuses to perform the specified operation for policy reasons.
	Refused = 5,
	/// Reserved for future use.
	#[fallback]
	Reserved,
}

/// The second 16-bit word of a DNS header.
#[bitsize(16)]
#[derive(FromBits, Clone, Copy)]
pub struct Flags {
	/// Response code - set as part of responses.
	pub rcode: Rcode,
	/// Reserved for future use. Must be zero.
	pub z: u3,
	/// Recursion Available - set in a response.
	pub ra: bool,
	/// Recursion Desired - may be set in a query and is copied into the response.
	pub rd: bool,
	/// TrunCation - the message was truncated due to length greater than permitted on the transmission channel.
	pub tc: bool,
	/// Authoritative Answer.
	pub aa: bool,
	/// Kind of query.
	pub opcode: Opcode,
	/// Whether this message is a query (0) or a response (1).
	pub qr: bool,
}

/// The fixed 12-byte DNS message header.
#[derive(Cast, Clone, Copy)]
#[repr(C)]
pub struct Header {
	/// A 16-bit identifier assigned by the program that generates the query.
	pub id: u16be,
	pub flags: BigEndian<Flags>,
	pub qdcount: u16be,
	pub ancount: u16be,
	pub nscount: u16be,
	pub arcount: u16be,
}

impl Header {
	pub const SIZE: usize = std::mem::size_of::<Header>();
}
