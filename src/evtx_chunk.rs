use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, trace};
use std::io::{Cursor, Read, Seek};
use std::sync::Arc;

use crate::binxml::assemble::expand_template;
use crate::binxml::deserializer::read_element;
use crate::binxml::model::Element;
use crate::err::{ChunkError, ChunkResult, DeserializationError, EvtxError, Result};
use crate::evtx_record::{EvtxMapRecord, EvtxRecordHeader, EVTX_RECORD_HEADER_SIZE};
use crate::string_table::StringTable;
use crate::template_table::TemplateTable;
use crate::{checksum_ieee, ChunkOffset, ParserSettings};

pub const EVTX_CHUNK_HEADER_SIZE: usize = 128;

pub const EVTX_CHUNK_HEADER_MAGIC: &[u8; 8] = b"ElfChnk\x00";

const STRING_TABLE_BUCKETS: usize = 64;
const TEMPLATE_TABLE_BUCKETS: usize = 32;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EvtxChunkHeader {
    pub first_record_number: i64,
    pub last_record_number: i64,
    pub first_event_record_id: i64,
    pub last_event_record_id: i64,
    pub header_size: u32,
    pub last_record_offset: u32,
    pub free_space_offset: u32,
    pub checksum: u32,
}

impl EvtxChunkHeader {
    pub fn from_reader(input: &mut Cursor<&[u8]>) -> ChunkResult<EvtxChunkHeader> {
        let mut magic = [0_u8; 8];
        input
            .read_exact(&mut magic)
            .map_err(DeserializationError::from)?;

        if &magic != EVTX_CHUNK_HEADER_MAGIC {
            return Err(ChunkError::from(
                DeserializationError::InvalidEvtxChunkMagic { magic },
            ));
        }

        let first_record_number = try_read!(input, i64)?;
        let last_record_number = try_read!(input, i64)?;
        let first_event_record_id = try_read!(input, i64)?;
        let last_event_record_id = try_read!(input, i64)?;

        let header_size = try_read!(input, u32)?;
        let last_record_offset = try_read!(input, u32)?;
        let free_space_offset = try_read!(input, u32)?;
        let checksum = try_read!(input, u32)?;

        let header = EvtxChunkHeader {
            first_record_number,
            last_record_number,
            first_event_record_id,
            last_event_record_id,
            header_size,
            last_record_offset,
            free_space_offset,
            checksum,
        };

        header.validate_bounds()?;

        Ok(header)
    }

    fn validate_bounds(&self) -> ChunkResult<()> {
        let chunk_size = crate::evtx_parser::EVTX_CHUNK_SIZE as u32;

        if self.header_size > self.last_record_offset || self.last_record_offset > chunk_size {
            return Err(ChunkError::InvalidChunkBounds {
                header_size: self.header_size,
                offset_last_rec: self.last_record_offset,
            });
        }

        Ok(())
    }
}

/// A chunk as fetched from the file: the owned 64 KiB body plus its parsed
/// header. Indices are materialized by `parse`.
pub struct EvtxChunkData {
    pub header: EvtxChunkHeader,
    pub data: Vec<u8>,
}

impl EvtxChunkData {
    /// The header magic is checked even when `validate_checksum` is false.
    pub fn new(data: Vec<u8>, validate_checksum: bool) -> ChunkResult<Self> {
        let mut cursor = Cursor::new(data.as_slice());
        let header = EvtxChunkHeader::from_reader(&mut cursor)?;

        let chunk = EvtxChunkData { header, data };
        if validate_checksum {
            let expected = chunk.header.checksum;
            let found = chunk.compute_header_checksum();
            if expected != found {
                return Err(ChunkError::InvalidChunkChecksum { expected, found });
            }
        }

        Ok(chunk)
    }

    fn compute_header_checksum(&self) -> u32 {
        let header_bytes_1 = &self.data[..120];
        let header_bytes_2 = &self.data[128..512];

        let bytes_for_checksum: Vec<u8> = header_bytes_1
            .iter()
            .chain(header_bytes_2)
            .copied()
            .collect();

        checksum_ieee(&bytes_for_checksum)
    }

    /// Materializes the string table, the template table and the event
    /// offsets, producing a chunk that is ready to stream events.
    pub fn parse(self, settings: Arc<ParserSettings>) -> Result<EvtxChunk> {
        EvtxChunk::new(self.header, self.data, settings)
    }
}

/// A fully populated chunk. Every index is resolved before any event is
/// decoded from it.
pub struct EvtxChunk {
    pub header: EvtxChunkHeader,
    pub data: Vec<u8>,
    pub string_table: StringTable,
    pub template_table: TemplateTable,
    pub event_offsets: Vec<ChunkOffset>,
    settings: Arc<ParserSettings>,
}

impl EvtxChunk {
    pub fn new(
        header: EvtxChunkHeader,
        data: Vec<u8>,
        settings: Arc<ParserSettings>,
    ) -> Result<EvtxChunk> {
        let mut cursor = Cursor::new(data.as_slice());
        cursor.set_position(u64::from(header.header_size));

        debug!("Initializing string table");
        let mut string_offsets = [0_u32; STRING_TABLE_BUCKETS];
        cursor
            .read_u32_into::<LittleEndian>(&mut string_offsets)
            .map_err(DeserializationError::from)?;
        let string_table = StringTable::populate(&data, &string_offsets)?;

        debug!("Initializing template table");
        let mut template_offsets = [0_u32; TEMPLATE_TABLE_BUCKETS];
        cursor
            .read_u32_into::<LittleEndian>(&mut template_offsets)
            .map_err(DeserializationError::from)?;
        let template_table =
            TemplateTable::populate(&data, &template_offsets, settings.get_ansi_codec())?;

        debug!("Reading event offsets");
        let event_offsets = Self::read_event_offsets(&data, &header, cursor.position())?;

        Ok(EvtxChunk {
            header,
            data,
            string_table,
            template_table,
            event_offsets,
            settings,
        })
    }

    /// Walks validated record headers, recording each record's offset and
    /// advancing by its declared size. Terminates once the next candidate
    /// offset passes the last record.
    fn read_event_offsets(
        data: &[u8],
        header: &EvtxChunkHeader,
        first_record_offset: u64,
    ) -> Result<Vec<ChunkOffset>> {
        let mut cursor = Cursor::new(data);
        let mut event_offsets = Vec::new();
        let mut offset = first_record_offset as ChunkOffset;

        while offset <= header.last_record_offset {
            cursor.set_position(u64::from(offset));
            let record_header =
                EvtxRecordHeader::from_reader(&mut cursor).map_err(EvtxError::from)?;
            record_header.validate_size().map_err(EvtxError::from)?;

            trace!(
                "Record {} at {offset:#x}",
                record_header.event_record_id
            );

            event_offsets.push(offset);
            offset += record_header.data_size;
        }

        Ok(event_offsets)
    }

    /// Decodes the record at `offset` into an expanded event map.
    pub fn parse_event_at(&self, offset: ChunkOffset) -> Result<EvtxMapRecord> {
        let mut cursor = Cursor::new(self.data.as_slice());
        cursor.set_position(u64::from(offset));

        let record_header = EvtxRecordHeader::from_reader(&mut cursor).map_err(EvtxError::from)?;
        let record_id = record_header.event_record_id;

        let wrap = |e: EvtxError| EvtxError::FailedToParseRecord {
            record_id,
            source: Box::new(e),
        };

        debug_assert_eq!(
            cursor.position(),
            u64::from(offset) + EVTX_RECORD_HEADER_SIZE as u64
        );

        let element = read_element(&mut cursor, Some(self), false, self.settings.get_ansi_codec())
            .map_err(|e| wrap(EvtxError::from(e)))?;

        let instance = match element {
            Element::Fragment(fragment) => match *fragment.element {
                Element::TemplateInstance(instance) => instance,
                _ => {
                    return Err(wrap(EvtxError::FailedToCreateRecordModel {
                        message: "record fragment does not hold a template instance",
                    }))
                }
            },
            _ => {
                return Err(wrap(EvtxError::FailedToCreateRecordModel {
                    message: "record does not start with a fragment",
                }))
            }
        };

        let mut map = expand_template(&instance).map_err(wrap)?;
        map.prune_xmlns();

        Ok(EvtxMapRecord {
            event_record_id: record_id,
            timestamp: record_header.timestamp,
            data: map,
        })
    }

    /// Streams the chunk's events in record order, one map per event.
    pub fn iter_events(&self) -> IterChunkEvents<'_> {
        IterChunkEvents {
            chunk: self,
            next: 0,
        }
    }
}

pub struct IterChunkEvents<'a> {
    chunk: &'a EvtxChunk,
    next: usize,
}

impl<'a> Iterator for IterChunkEvents<'a> {
    type Item = Result<EvtxMapRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = *self.chunk.event_offsets.get(self.next)?;
        self.next += 1;

        Some(self.chunk.parse_event_at(offset))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.chunk.event_offsets.len() - self.next;
        (remaining, Some(remaining))
    }
}
