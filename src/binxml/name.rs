use byteorder::ReadBytesExt;
use std::fmt::{self, Formatter};
use std::io::{Cursor, Seek};

use crate::err::DeserializationResult;
use crate::utils::utf16_decode_error;
use crate::ChunkOffset;

/// An interned UTF-16 name.
///
/// The stored form is `prev_offset` (offset of the previous string in the
/// same hash bucket), a 16-bit name hash, a code-unit count, and
/// `count + 1` UTF-16 code units (the terminating NUL is stored).
#[derive(Debug, PartialEq, Eq, PartialOrd, Clone, Hash)]
pub struct BinXmlName {
    prev_offset: ChunkOffset,
    hash: u16,
    value: String,
}

impl BinXmlName {
    pub fn from_stream(cursor: &mut Cursor<&[u8]>) -> DeserializationResult<BinXmlName> {
        let prev_offset = try_read!(cursor, u32)?;
        let hash = try_read!(cursor, u16)?;
        let number_of_characters = try_read!(cursor, u16)?;

        let mut units = Vec::with_capacity(usize::from(number_of_characters));
        for _ in 0..u32::from(number_of_characters) + 1 {
            units.push(try_read!(cursor, u16)?);
        }

        while units.last() == Some(&0) {
            units.pop();
        }

        let value = String::from_utf16(&units).map_err(|_| {
            utf16_decode_error(
                std::io::Error::from(std::io::ErrorKind::InvalidData),
                cursor,
            )
        })?;

        Ok(BinXmlName {
            prev_offset,
            hash,
            value,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn hash(&self) -> u16 {
        self.hash
    }

    pub fn prev_offset(&self) -> ChunkOffset {
        self.prev_offset
    }

    #[cfg(test)]
    pub(crate) fn from_str(s: &str) -> Self {
        BinXmlName {
            prev_offset: 0,
            hash: 0,
            value: s.to_string(),
        }
    }

    /// Re-encodes the name in its stored form, terminating NUL included.
    pub fn encoded_bytes(&self) -> Vec<u8> {
        let units: Vec<u16> = self.value.encode_utf16().collect();

        let mut bytes = Vec::with_capacity(8 + (units.len() + 1) * 2);
        bytes.extend_from_slice(&self.prev_offset.to_le_bytes());
        bytes.extend_from_slice(&self.hash.to_le_bytes());
        bytes.extend_from_slice(&(units.len() as u16).to_le_bytes());
        for unit in units {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes.extend_from_slice(&[0, 0]);

        bytes
    }
}

impl fmt::Display for BinXmlName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn encode(prev_offset: u32, hash: u16, s: &str) -> Vec<u8> {
        let units: Vec<u16> = s.encode_utf16().collect();

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&prev_offset.to_le_bytes());
        bytes.extend_from_slice(&hash.to_le_bytes());
        bytes.extend_from_slice(&(units.len() as u16).to_le_bytes());
        for unit in units {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes.extend_from_slice(&[0, 0]);
        bytes
    }

    #[test]
    fn test_reads_a_name() {
        let bytes = encode(0, 0x1337, "Provider");

        let mut cursor = Cursor::new(bytes.as_slice());
        let name = BinXmlName::from_stream(&mut cursor).unwrap();

        assert_eq!(name.as_str(), "Provider");
        assert_eq!(name.hash(), 0x1337);
        assert_eq!(cursor.position(), bytes.len() as u64);
    }

    #[test]
    fn test_name_round_trips_through_its_stored_form() {
        let bytes = encode(42, 0xbeef, "EventID");

        let mut cursor = Cursor::new(bytes.as_slice());
        let name = BinXmlName::from_stream(&mut cursor).unwrap();

        assert_eq!(name.encoded_bytes(), bytes);
    }
}
