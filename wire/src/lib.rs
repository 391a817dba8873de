pub mod header;
pub mod message;
pub mod name;
pub mod question;
pub mod record;

pub use header::{Flags, Header, Opcode, Rcode};
pub use message::{decode_message, encode_query, DecodeError, Message};
pub use question::Question;
pub use record::{QType, RecordData, ResourceRecord, CLASS_IN};
