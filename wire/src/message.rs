use bilge::prelude::*;

use crate::header::{Flags, Header, Opcode, Rcode};
use crate::name;
use crate::question::{Question, QuestionTail};
use crate::record::ResourceRecord;

#[derive(Debug)]
pub enum DecodeError {
	Truncated,
	Name(name::DecodeError),
	Record(crate::record::RecordDecodeError),
}

impl From<name::DecodeError> for DecodeError {
	fn from(e: name::DecodeError) -> Self {
		Self::Name(e)
	}
}

impl From<crate::record::RecordDecodeError> for DecodeError {
	fn from(e: crate::record::RecordDecodeError) -> Self {
		Self::Record(e)
	}
}

#[derive(Debug, Clone)]
pub struct Message {
	pub id: u16,
	pub qr: bool,
	pub opcode: Opcode,
	pub aa: bool,
	pub tc: bool,
	pub rd: bool,
	pub ra: bool,
	pub rcode: Rcode,
	pub question: Option<Question>,
	pub answers: Vec<ResourceRecord>,
	pub authorities: Vec<ResourceRecord>,
	pub additionals: Vec<ResourceRecord>,
}

/// Serializes a single-question query for `question`, with the recursion-desired
/// bit set (the only mode an always-recursive stub resolver needs).
pub fn encode_query(id: u16, question: &Question) -> Vec<u8> {
	let mut out = vec![0u8; Header::SIZE];

	let header: &mut Header = utils::bytes::cast_mut(&mut out);
	header.id = id.into();
	header.flags = Flags::new(Rcode::Ok, u3::new(0), false, true, false, false, Opcode::Query, false).into();
	header.qdcount = 1u16.into();
	header.ancount = 0u16.into();
	header.nscount = 0u16.into();
	header.arcount = 0u16.into();

	name::encode(&mut out, &question.name).expect("question name already validated by the caller");

	let tail_start = out.len();
	out.resize(tail_start + std::mem::size_of::<QuestionTail>(), 0);
	let tail: &mut QuestionTail = utils::bytes::cast_mut(&mut out[tail_start..]);
	tail.qtype = question.qtype.into();
	tail.qclass = question.qclass.into();

	out
}

fn decode_records(buf: &[u8], mut pos: usize, count: usize) -> Result<(Vec<ResourceRecord>, usize), DecodeError> {
	let mut records = Vec::with_capacity(count);

	for _ in 0..count {
		let (record, next) = crate::record::decode(buf, pos)?;
		records.push(record);
		pos = next;
	}

	Ok((records, pos))
}

/// Parses a complete DNS message (query or response) out of `buf`.
pub fn decode_message(buf: &[u8]) -> Result<Message, DecodeError> {
	let header_bytes = buf.get(..Header::SIZE).ok_or(DecodeError::Truncated)?;
	let header: &Header = utils::bytes::cast(header_bytes);

	let flags = header.flags.get();
	let qdcount = header.qdcount.get();
	let ancount = header.ancount.get();
	let nscount = header.nscount.get();
	let arcount = header.arcount.get();

	let mut pos = Header::SIZE;

	let question = if qdcount > 0 {
		let (name, next) = name::decode(buf, pos)?;
		let tail_bytes = buf.get(next..next + std::mem::size_of::<QuestionTail>()).ok_or(DecodeError::Truncated)?;
		let tail: &QuestionTail = utils::bytes::cast(tail_bytes);
		pos = next + std::mem::size_of::<QuestionTail>();

		for _ in 1..qdcount {
			let (_, next) = name::decode(buf, pos)?;
			pos = next + std::mem::size_of::<QuestionTail>();
		}

		Some(Question { name, qtype: tail.qtype.get(), qclass: tail.qclass.get() })
	} else {
		None
	};

	let (answers, pos) = decode_records(buf, pos, ancount as usize)?;
	let (authorities, pos) = decode_records(buf, pos, nscount as usize)?;
	let (additionals, _pos) = decode_records(buf, pos, arcount as usize)?;

	Ok(Message {
		id: header.id.get(),
		qr: flags.qr(),
		opcode: flags.opcode(),
		aa: flags.aa(),
		tc: flags.tc(),
		rd: flags.rd(),
		ra: flags.ra(),
		rcode: flags.rcode(),
		question,
		answers,
		authorities,
		additionals,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::record::QType;

	#[test]
	fn round_trips_a_query() {
		let question = Question::new("example.test", QType::A);
		let buf = encode_query(0x1234, &question);

		let message = decode_message(&buf).unwrap();
		assert_eq!(message.id, 0x1234);
		assert!(!message.qr);
		assert!(message.rd);
		assert_eq!(message.question.unwrap().name, "example.test");
		assert!(message.answers.is_empty());
	}
}
