use encoding::EncodingRef;
use log::trace;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;
use std::rc::Rc;

use crate::binxml::deserializer::read_template_definition;
use crate::binxml::model::TemplateDefinition;
use crate::err::{ChunkError, ChunkResult};
use crate::evtx_parser::EVTX_CHUNK_SIZE;
use crate::utils::with_seek_to;
use crate::ChunkOffset;

/// Template definitions interned per chunk, keyed by their data offset.
///
/// The table is seeded from the fixed array of 32 bucket slots and grows
/// while records are decoded: a record carrying an inline definition interns
/// it so later instances can reference it by offset. Definitions are shared
/// by every instance within the chunk.
#[derive(Debug, Default)]
pub struct TemplateTable(RefCell<HashMap<ChunkOffset, Rc<TemplateDefinition>>>);

impl TemplateTable {
    pub fn populate(
        data: &[u8],
        offsets: &[ChunkOffset],
        ansi_codec: EncodingRef,
    ) -> ChunkResult<Self> {
        let mut table = HashMap::with_capacity(offsets.len());
        let mut cursor = Cursor::new(data);

        for &offset in offsets.iter().filter(|&&offset| offset > 0) {
            if offset >= EVTX_CHUNK_SIZE as ChunkOffset {
                return Err(ChunkError::TableOffsetOutOfRange { offset });
            }

            trace!("Reading template definition at {offset:#x}");
            let definition = with_seek_to(&mut cursor, u64::from(offset), |c| {
                read_template_definition(c, ansi_codec)
            })?;

            table.insert(offset, Rc::new(definition));
        }

        Ok(TemplateTable(RefCell::new(table)))
    }

    pub fn get(&self, offset: ChunkOffset) -> Option<Rc<TemplateDefinition>> {
        self.0.borrow().get(&offset).map(Rc::clone)
    }

    pub fn insert(&self, offset: ChunkOffset, definition: Rc<TemplateDefinition>) {
        self.0.borrow_mut().insert(offset, definition);
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}
