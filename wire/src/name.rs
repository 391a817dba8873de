//! Domain name encoding/decoding, including RFC 1035 §4.1.4 pointer compression.

const MAX_LABEL: usize = 63;
const MAX_NAME: usize = 255;
const MAX_POINTER_HOPS: usize = 32;

#[derive(Debug)]
pub struct NameTooLong;

/// Appends the wire form of `name` (a sequence of dot-separated labels
/// terminated by a zero-length root label) to `out`. `name` may have a
/// trailing dot; empty labels (besides the trailing root) are rejected.
pub fn encode(out: &mut Vec<u8>, name: &str) -> Result<(), NameTooLong> {
	let start = out.len();
	let trimmed = name.strip_suffix('.').unwrap_or(name);

	if !trimmed.is_empty() {
		for label in trimmed.split('.') {
			let bytes = label.as_bytes();

			if bytes.is_empty() || bytes.len() > MAX_LABEL {
				return Err(NameTooLong);
			}

			out.push(bytes.len() as u8);
			out.extend_from_slice(bytes);
		}
	}

	out.push(0);

	if out.len() - start > MAX_NAME {
		out.truncate(start);
		return Err(NameTooLong);
	}

	Ok(())
}

#[derive(Debug)]
pub enum DecodeError {
	Truncated,
	LabelTooLong,
	TooManyPointerHops,
	NameTooLong,
}

/// Reads a (possibly compressed) name starting at `pos` within the whole
/// message `buf`. Returns the decoded textual name and the offset just past
/// the name *as it appears in the stream being read* (i.e. past the first
/// pointer, not the pointer's target).
pub fn decode(buf: &[u8], mut pos: usize) -> Result<(String, usize), DecodeError> {
	let mut out = String::new();
	let mut hops = 0;
	let mut end = None;

	loop {
		let len = *buf.get(pos).ok_or(DecodeError::Truncated)?;

		match len >> 6 {
			0b00 => {
				if len == 0 {
					pos += 1;

					if end.is_none() {
						end = Some(pos);
					}

					break;
				}

				let len = len as usize;
				let start = pos + 1;
				let label = buf.get(start..start + len).ok_or(DecodeError::Truncated)?;

				if !out.is_empty() {
					out.push('.');
				}

				out.push_str(&String::from_utf8_lossy(label));

				if out.len() > MAX_NAME {
					return Err(DecodeError::NameTooLong);
				}

				pos = start + len;
			}
			0b11 => {
				let hi = (len & 0x3f) as usize;
				let lo = *buf.get(pos + 1).ok_or(DecodeError::Truncated)? as usize;

				if end.is_none() {
					end = Some(pos + 2);
				}

				hops += 1;

				if hops > MAX_POINTER_HOPS {
					return Err(DecodeError::TooManyPointerHops);
				}

				pos = (hi << 8) | lo;
			}
			_ => return Err(DecodeError::LabelTooLong),
		}
	}

	Ok((out, end.unwrap_or(pos)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn encodes_simple_name() {
		let mut buf = Vec::new();
		encode(&mut buf, "example.test.").unwrap();
		assert_eq!(buf, b"\x07example\x04test\x00");
	}

	#[test]
	fn round_trips_uncompressed() {
		let mut buf = Vec::new();
		encode(&mut buf, "a.bc.").unwrap();
		let (name, end) = decode(&buf, 0).unwrap();
		assert_eq!(name, "a.bc");
		assert_eq!(end, buf.len());
	}

	#[test]
	fn follows_a_pointer() {
		let mut buf = vec![0u8; 12];
		let base = buf.len();
		encode(&mut buf, "example.test.").unwrap();

		// A second occurrence, compressed as a pointer back to `base`.
		let pointer_pos = buf.len();
		buf.push(0xc0 | ((base >> 8) as u8));
		buf.push((base & 0xff) as u8);

		let (name, end) = decode(&buf, pointer_pos).unwrap();
		assert_eq!(name, "example.test");
		assert_eq!(end, pointer_pos + 2);
	}

	#[test]
	fn rejects_unbounded_pointer_loops() {
		let mut buf = vec![0xc0, 0x00];
		buf[0] = 0xc0;
		buf[1] = 0x00;
		assert!(matches!(decode(&buf, 0), Err(DecodeError::TooManyPointerHops)));
	}
}
