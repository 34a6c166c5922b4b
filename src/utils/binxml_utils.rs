use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Error, ErrorKind, Seek};

use crate::err::{DeserializationError, DeserializationResult};

/// Reads `size` bytes as little-endian UTF-16 code units.
/// Trailing NUL code units are trimmed for presentation.
pub fn read_utf16_by_size(cursor: &mut Cursor<&[u8]>, size: u64) -> io::Result<Option<String>> {
    if size == 0 {
        return Ok(None);
    }

    let mut units = Vec::with_capacity((size / 2) as usize);
    for _ in 0..size / 2 {
        units.push(cursor.read_u16::<LittleEndian>()?);
    }

    while units.last() == Some(&0) {
        units.pop();
    }

    String::from_utf16(&units)
        .map(Some)
        .map_err(|_| Error::from(ErrorKind::InvalidData))
}

/// Reads a string prefixed with a u16 count of UTF-16 code units.
/// The terminating NUL is not included in the count and is consumed when requested.
pub fn read_len_prefixed_utf16_string(
    cursor: &mut Cursor<&[u8]>,
    is_null_terminated: bool,
) -> io::Result<Option<String>> {
    let expected_number_of_characters = cursor.read_u16::<LittleEndian>()?;
    let needed_bytes = u64::from(expected_number_of_characters) * 2;

    let s = read_utf16_by_size(cursor, needed_bytes)?;

    if is_null_terminated {
        cursor.read_u16::<LittleEndian>()?;
    }

    Ok(s)
}

/// Splits a `size`-byte window into its NUL-terminated UTF-16 sub-strings.
pub fn read_utf16_string_array(
    cursor: &mut Cursor<&[u8]>,
    size: u64,
) -> io::Result<Vec<String>> {
    let mut units = Vec::with_capacity((size / 2) as usize);
    for _ in 0..size / 2 {
        units.push(cursor.read_u16::<LittleEndian>()?);
    }

    let mut strings = Vec::new();
    for chunk in units.split(|&unit| unit == 0) {
        if chunk.is_empty() {
            continue;
        }
        strings.push(String::from_utf16(chunk).map_err(|_| Error::from(ErrorKind::InvalidData))?);
    }

    Ok(strings)
}

/// Runs `f` with the cursor moved to `offset`, restoring the previous
/// position afterwards. Nested offset references only compose safely when
/// every indirected read goes through this guard.
pub(crate) fn with_seek_to<T, F>(
    cursor: &mut Cursor<&[u8]>,
    offset: u64,
    f: F,
) -> DeserializationResult<T>
where
    F: FnOnce(&mut Cursor<&[u8]>) -> DeserializationResult<T>,
{
    let saved = cursor.position();
    cursor.set_position(offset);
    let outcome = f(cursor);
    cursor.set_position(saved);
    outcome
}

pub(crate) fn utf16_decode_error(e: io::Error, cursor: &mut Cursor<&[u8]>) -> DeserializationError {
    DeserializationError::FailedToDecodeUTF16String {
        source: e,
        offset: cursor.stream_position().unwrap_or_default(),
    }
}
