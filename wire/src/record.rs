use std::net::{Ipv4Addr, Ipv6Addr};

use utils::bytes::Cast;
use utils::endian::{u16be, u32be};

use crate::name;

/// The RR types this codec knows how to decode the RDATA of. Unknown types are
/// still framed correctly (via `rdlength`) and surfaced as `RecordData::Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum QType {
	A = 1,
	NS = 2,
	CNAME = 5,
	SOA = 6,
	PTR = 12,
	MX = 15,
	TXT = 16,
	AAAA = 28,
}

impl QType {
	pub fn from_u16(v: u16) -> Option<Self> {
		Some(match v {
			1 => Self::A,
			2 => Self::NS,
			5 => Self::CNAME,
			6 => Self::SOA,
			12 => Self::PTR,
			15 => Self::MX,
			16 => Self::TXT,
			28 => Self::AAAA,
			_ => return None,
		})
	}

	pub fn code(self) -> u16 {
		self as u16
	}
}

pub const CLASS_IN: u16 = 1;

#[derive(Cast, Clone, Copy)]
#[repr(C)]
pub(crate) struct RrHeader {
	pub ty: u16be,
	pub class: u16be,
	pub ttl: u32be,
	pub rdlength: u16be,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
	A(Ipv4Addr),
	Aaaa(Ipv6Addr),
	Cname(String),
	Ns(String),
	Ptr(String),
	Mx { preference: u16, exchange: String },
	Txt(Vec<u8>),
	Soa { mname: String, rname: String, serial: u32 },
	Unknown { qtype: u16, raw: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
	pub name: String,
	pub ttl: u32,
	pub data: RecordData,
}

#[derive(Debug)]
pub enum RecordDecodeError {
	Truncated,
	Name(name::DecodeError),
}

impl From<name::DecodeError> for RecordDecodeError {
	fn from(e: name::DecodeError) -> Self {
		Self::Name(e)
	}
}

/// Decodes one resource record starting at `pos` in the whole message `buf`,
/// returning it along with the offset of the byte following it.
pub fn decode(buf: &[u8], pos: usize) -> Result<(ResourceRecord, usize), RecordDecodeError> {
	let (name, pos) = name::decode(buf, pos)?;

	let header_bytes = buf.get(pos..pos + std::mem::size_of::<RrHeader>()).ok_or(RecordDecodeError::Truncated)?;
	let header: &RrHeader = utils::bytes::cast(header_bytes);

	let ty = header.ty.get();
	let ttl = header.ttl.get();
	let rdlength = header.rdlength.get() as usize;

	let rdata_pos = pos + std::mem::size_of::<RrHeader>();
	let rdata = buf.get(rdata_pos..rdata_pos + rdlength).ok_or(RecordDecodeError::Truncated)?;

	let data = match QType::from_u16(ty) {
		Some(QType::A) if rdata.len() == 4 => RecordData::A(Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3])),
		Some(QType::AAAA) if rdata.len() == 16 => {
			let mut octets = [0u8; 16];
			octets.copy_from_slice(rdata);
			RecordData::Aaaa(Ipv6Addr::from(octets))
		}
		Some(QType::CNAME) => RecordData::Cname(name::decode(buf, rdata_pos)?.0),
		Some(QType::NS) => RecordData::Ns(name::decode(buf, rdata_pos)?.0),
		Some(QType::PTR) => RecordData::Ptr(name::decode(buf, rdata_pos)?.0),
		Some(QType::MX) if rdata.len() >= 2 => {
			let preference = u16::from_be_bytes([rdata[0], rdata[1]]);
			let (exchange, _) = name::decode(buf, rdata_pos + 2)?;
			RecordData::Mx { preference, exchange }
		}
		Some(QType::TXT) => RecordData::Txt(rdata.to_vec()),
		Some(QType::SOA) => {
			let (mname, next) = name::decode(buf, rdata_pos)?;
			let (rname, next) = name::decode(buf, next)?;
			let serial = buf
				.get(next..next + 4)
				.map(|s| u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
				.unwrap_or(0);
			RecordData::Soa { mname, rname, serial }
		}
		_ => RecordData::Unknown { qtype: ty, raw: rdata.to_vec() },
	};

	Ok((ResourceRecord { name, ttl, data }, rdata_pos + rdlength))
}
