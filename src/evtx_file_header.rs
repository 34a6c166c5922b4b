use byteorder::ReadBytesExt;
use std::io::{Read, Seek, SeekFrom};

use crate::err::{DeserializationError, DeserializationResult};

pub const EVTX_FILE_HEADER_MAGIC: &[u8; 8] = b"ElfFile\x00";

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EvtxFileHeader {
    pub first_chunk_number: u64,
    pub last_chunk_number: u64,
    pub next_record_id: u64,
    pub header_size: u32,
    pub minor_version: u16,
    pub major_version: u16,
    /// Offset of the first chunk, 0x1000 in practice.
    pub header_block_size: u16,
    pub chunk_count: u16,
    pub flags: HeaderFlags,
    // Checksum is of the first 120 bytes of the header.
    pub checksum: u32,
}

bitflags! {
    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    pub struct HeaderFlags: u32 {
        const EMPTY = 0x0;
        const DIRTY = 0x1;
        const FULL = 0x2;
    }
}

impl EvtxFileHeader {
    pub fn from_stream<T: Read + Seek>(stream: &mut T) -> DeserializationResult<EvtxFileHeader> {
        let mut magic = [0_u8; 8];
        stream
            .read_exact(&mut magic)
            .map_err(|e| DeserializationError::FailedToRead {
                offset: 0,
                t: "file_header_magic",
                source: e,
            })?;

        if &magic != EVTX_FILE_HEADER_MAGIC {
            return Err(DeserializationError::InvalidEvtxFileHeaderMagic { magic });
        }

        let first_chunk_number = try_read!(stream, u64)?;
        let last_chunk_number = try_read!(stream, u64)?;
        let next_record_id = try_read!(stream, u64)?;
        let header_size = try_read!(stream, u32)?;
        let minor_version = try_read!(stream, u16)?;
        let major_version = try_read!(stream, u16)?;
        let header_block_size = try_read!(stream, u16)?;
        let chunk_count = try_read!(stream, u16)?;

        // Reserved
        stream.seek(SeekFrom::Current(76))?;

        let raw_flags = try_read!(stream, u32)?;
        let flags = HeaderFlags::from_bits_truncate(raw_flags);
        let checksum = try_read!(stream, u32)?;

        // The header block is padded to 4096 bytes.
        stream.seek(SeekFrom::Current(4096 - 128))?;

        Ok(EvtxFileHeader {
            first_chunk_number,
            last_chunk_number,
            next_record_id,
            header_size,
            minor_version,
            major_version,
            header_block_size,
            chunk_count,
            flags,
            checksum,
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(HeaderFlags::DIRTY)
    }
}
