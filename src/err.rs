use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvtxError>;
pub type DeserializationResult<T> = std::result::Result<T, DeserializationError>;
pub type ChunkResult<T> = std::result::Result<T, ChunkError>;

/// Errors raised while reading tokens and values out of a byte stream.
#[derive(Debug, Error)]
pub enum DeserializationError {
    #[error("Offset {offset}: An I/O error has occurred while trying to read {t}")]
    FailedToRead {
        offset: u64,
        t: &'static str,
        source: std::io::Error,
    },

    #[error("An I/O error has occurred")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Invalid EVTX file header magic, expected `ElfFile\\0`, found `{magic:02X?}`")]
    InvalidEvtxFileHeaderMagic { magic: [u8; 8] },

    #[error("Invalid EVTX chunk header magic, expected `ElfChnk\\0`, found `{magic:02X?}`")]
    InvalidEvtxChunkMagic { magic: [u8; 8] },

    #[error("Invalid EVTX record header magic, expected `2a2a0000`, found `{magic:02X?}`")]
    InvalidEvtxRecordHeaderMagic { magic: [u8; 4] },

    #[error("Invalid event record size {size}, expected at least {min} and less than {max}")]
    InvalidEventRecordSize { size: u32, min: u32, max: u32 },

    #[error("Offset {offset}: Tried to read an invalid byte `{value:#04x}` as a binxml token")]
    InvalidToken { value: u8, offset: u64 },

    #[error("Offset {offset}: Tried to read an invalid byte `{value:#04x}` as a binxml value type")]
    InvalidValueVariant { value: u8, offset: u64 },

    #[error(
        "Offset {offset}: Element opened with `{open:#04x}` is closed by `{close:#04x}`, \
         expected `0x02` or `0x03`"
    )]
    InvalidElementCloseToken { open: u8, close: u8, offset: u64 },

    #[error("Offset {offset}: Tried to read an invalid byte `{value:#04x}` as an attribute token")]
    InvalidAttributeToken { value: u8, offset: u64 },

    #[error("Offset {offset}: Tried to read an invalid byte `{value:#04x}` as a fragment header token")]
    InvalidFragmentToken { value: u8, offset: u64 },

    #[error("Offset {offset}: Declared size {size} exceeds the maximum slice size {max}")]
    SliceTooLarge { size: u32, max: u32, offset: u64 },

    #[error("Offset {offset}: Failed to decode UTF-16 string")]
    FailedToDecodeUTF16String {
        source: std::io::Error,
        offset: u64,
    },

    #[error(
        "Offset {offset}: Failed to decode ansi string (used encoding scheme {encoding}), \
         failed with: {message}"
    )]
    FailedToDecodeANSIString {
        encoding: &'static str,
        message: String,
        offset: u64,
    },

    #[error("Offset {offset}: Systemtime fields do not form a valid date")]
    InvalidSystemDateTime { offset: u64 },
}

/// Errors raised while materializing a chunk (header, interned tables, event offsets).
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("Failed to parse chunk data")]
    FailedToParseChunk {
        #[from]
        source: DeserializationError,
    },

    #[error(
        "Chunk bounds are inconsistent: header size {header_size} must not exceed the last \
         record offset {offset_last_rec}, which must not exceed the chunk size"
    )]
    InvalidChunkBounds {
        header_size: u32,
        offset_last_rec: u32,
    },

    #[error("Interned table slot {offset:#x} points outside of the chunk")]
    TableOffsetOutOfRange { offset: u32 },

    #[error("Chunk checksum mismatch, expected {expected}, found {found}")]
    InvalidChunkChecksum { expected: u32, found: u32 },
}

#[derive(Debug, Error)]
pub enum EvtxError {
    #[error(transparent)]
    DeserializationError(#[from] DeserializationError),

    #[error(transparent)]
    ChunkError(#[from] ChunkError),

    #[error("An I/O error has occurred")]
    IO {
        #[from]
        source: std::io::Error,
    },

    #[error("Failed to open file {}", path.display())]
    FailedToOpenFile {
        source: std::io::Error,
        path: std::path::PathBuf,
    },

    #[error("The file is flagged as dirty, open it with `from_path_dirty` to attempt a repair")]
    DirtyFile,

    #[error(
        "Failed to repair the file header: counted {counted} chunks, but the header claims {stored}"
    )]
    RepairFailed { stored: u16, counted: u16 },

    #[error("Reached EOF while trying to allocate chunk {chunk_number}")]
    IncompleteChunk { chunk_number: u16 },

    #[error("Failed to parse record {record_id}")]
    FailedToParseRecord {
        record_id: u64,
        source: Box<EvtxError>,
    },

    #[error("Substitution index {index} is out of range, the instance carries {num_values} values")]
    OutOfRangeSubstitution { index: i16, num_values: usize },

    #[error("Unknown entity reference `&{name};`")]
    UnknownEntityReference { name: String },

    #[error("Merging a nested map would overwrite the key `{key}`")]
    ConflictingMergeKey { key: String },

    #[error("Failed to create record model, reason: {message}")]
    FailedToCreateRecordModel { message: &'static str },
}
