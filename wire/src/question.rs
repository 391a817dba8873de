use utils::bytes::Cast;
use utils::endian::u16be;

use crate::record::{QType, CLASS_IN};

#[derive(Cast, Clone, Copy)]
#[repr(C)]
pub(crate) struct QuestionTail {
	pub qtype: u16be,
	pub qclass: u16be,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
	pub name: String,
	pub qtype: u16,
	pub qclass: u16,
}

impl Question {
	pub fn new(name: impl Into<String>, qtype: QType) -> Self {
		Self { name: name.into(), qtype: qtype.code(), qclass: CLASS_IN }
	}
}
