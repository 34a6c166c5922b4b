use std::collections::HashMap;
use std::io::Cursor;

use crate::binxml::name::BinXmlName;
use crate::err::{ChunkError, ChunkResult};
use crate::evtx_parser::EVTX_CHUNK_SIZE;
use crate::utils::with_seek_to;
use crate::ChunkOffset;

/// Names interned per chunk, keyed by the offset they live at in the chunk
/// body. Populated from the fixed array of 64 bucket slots; a zero slot is
/// empty.
#[derive(Debug, Default)]
pub struct StringTable(HashMap<ChunkOffset, BinXmlName>);

impl StringTable {
    pub fn populate(data: &[u8], offsets: &[ChunkOffset]) -> ChunkResult<Self> {
        let mut table = HashMap::with_capacity(offsets.len());
        let mut cursor = Cursor::new(data);

        for &offset in offsets.iter().filter(|&&offset| offset > 0) {
            if offset >= EVTX_CHUNK_SIZE as ChunkOffset {
                return Err(ChunkError::TableOffsetOutOfRange { offset });
            }

            let name = with_seek_to(&mut cursor, u64::from(offset), BinXmlName::from_stream)?;
            table.insert(offset, name);
        }

        Ok(StringTable(table))
    }

    pub fn get(&self, offset: ChunkOffset) -> Option<&BinXmlName> {
        self.0.get(&offset)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
