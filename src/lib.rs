#![deny(unused_must_use)]
#![forbid(unsafe_code)]
#![allow(clippy::upper_case_acronyms)]
// Don't allow dbg! prints in release.
#![cfg_attr(not(debug_assertions), deny(clippy::dbg_macro))]
#[macro_use]
extern crate bitflags;

#[macro_use]
mod macros;

pub use evtx_chunk::{EvtxChunk, EvtxChunkData, EvtxChunkHeader, IterChunkEvents};
pub use evtx_file_header::{EvtxFileHeader, HeaderFlags};
pub use evtx_map::EvtxMap;
pub use evtx_parser::{
    EvtxParser, IterChunks, IterEventRecords, ParserSettings, ReadSeek, EVTX_CHUNK_SIZE,
    EVTX_FILE_HEADER_SIZE,
};
pub use evtx_record::{EvtxMapRecord, EvtxRecordHeader, RecordId};
pub use guid::Guid;
pub use ntsid::Sid;
pub use string_table::StringTable;
pub use template_table::TemplateTable;
pub use utils::{datetime_from_filetime, filetime_from_datetime};

pub mod binxml;
pub mod err;

mod evtx_chunk;
mod evtx_file_header;
mod evtx_map;
mod evtx_parser;
mod evtx_record;
mod guid;
mod ntsid;
mod string_table;
mod template_table;
mod utils;

pub type ChunkOffset = u32;
pub type FileOffset = u64;

use crc32fast::Hasher;

#[inline]
pub fn checksum_ieee(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

// For tests, we only initialize logging once.
#[cfg(test)]
use std::sync::Once;

#[cfg(test)]
static LOGGER_INIT: Once = Once::new();

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
#[cfg(test)]
pub fn ensure_env_logger_initialized() {
    use std::io::Write;

    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .init();
    });
}
