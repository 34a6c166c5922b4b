use byteorder::ReadBytesExt;
use chrono::{DateTime, Utc};
use std::io::{Cursor, Read, Seek};

use crate::err::{DeserializationError, DeserializationResult};
use crate::evtx_map::EvtxMap;
use crate::evtx_parser::EVTX_CHUNK_SIZE;
use crate::utils::datetime_from_filetime;

pub type RecordId = u64;

pub const EVTX_RECORD_HEADER_SIZE: usize = 24;
pub const EVTX_RECORD_HEADER_MAGIC: &[u8; 4] = b"\x2a\x2a\x00\x00";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvtxRecordHeader {
    /// Size of the whole record, header and trailing size copy included.
    pub data_size: u32,
    pub event_record_id: RecordId,
    pub timestamp: DateTime<Utc>,
}

impl EvtxRecordHeader {
    pub fn from_reader(input: &mut Cursor<&[u8]>) -> DeserializationResult<EvtxRecordHeader> {
        let mut magic = [0_u8; 4];
        input
            .read_exact(&mut magic)
            .map_err(|e| DeserializationError::FailedToRead {
                offset: input.position(),
                t: "record_header_magic",
                source: e,
            })?;

        if &magic != EVTX_RECORD_HEADER_MAGIC {
            return Err(DeserializationError::InvalidEvtxRecordHeaderMagic { magic });
        }

        let data_size = try_read!(input, u32)?;
        let event_record_id = try_read!(input, u64)?;
        let filetime = try_read!(input, u64)?;

        Ok(EvtxRecordHeader {
            data_size,
            event_record_id,
            timestamp: datetime_from_filetime(filetime),
        })
    }

    pub fn validate_size(&self) -> DeserializationResult<()> {
        let min = EVTX_RECORD_HEADER_SIZE as u32;
        let max = EVTX_CHUNK_SIZE as u32;

        if self.data_size < min || self.data_size >= max {
            return Err(DeserializationError::InvalidEventRecordSize {
                size: self.data_size,
                min,
                max,
            });
        }

        Ok(())
    }
}

/// A decoded event: its record id, its timestamp, and the fully expanded
/// event map.
#[derive(Debug, Clone, PartialEq)]
pub struct EvtxMapRecord {
    pub event_record_id: RecordId,
    pub timestamp: DateTime<Utc>,
    pub data: EvtxMap,
}
