use encoding::all::WINDOWS_1252;
use encoding::EncodingRef;
use log::warn;
#[cfg(feature = "multithreading")]
use rayon::prelude::*;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::err::{EvtxError, Result};
use crate::evtx_chunk::{EvtxChunkData, EvtxChunkHeader, EVTX_CHUNK_HEADER_SIZE};
use crate::evtx_file_header::{EvtxFileHeader, HeaderFlags, EVTX_FILE_HEADER_MAGIC};
use crate::evtx_record::EvtxMapRecord;

pub const EVTX_CHUNK_SIZE: usize = 65536;
pub const EVTX_FILE_HEADER_SIZE: usize = 4096;

pub trait ReadSeek: Read + Seek {
    fn tell(&mut self) -> io::Result<u64> {
        self.stream_position()
    }
}

impl<T: Read + Seek> ReadSeek for T {}

pub struct ParserSettings {
    num_threads: usize,
    validate_checksums: bool,
    /// Restore log order by sorting chunks on their first record number.
    sort_chunks: bool,
    ansi_codec: EncodingRef,
}

impl std::fmt::Debug for ParserSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserSettings")
            .field("num_threads", &self.num_threads)
            .field("validate_checksums", &self.validate_checksums)
            .field("sort_chunks", &self.sort_chunks)
            .field("ansi_codec", &self.ansi_codec.name())
            .finish()
    }
}

impl Default for ParserSettings {
    fn default() -> Self {
        ParserSettings {
            num_threads: ParserSettings::default_num_threads(),
            validate_checksums: false,
            sort_chunks: false,
            ansi_codec: WINDOWS_1252,
        }
    }
}

impl ParserSettings {
    pub fn new() -> Self {
        Default::default()
    }

    /// Half the available hardware parallelism, at least one.
    fn default_num_threads() -> usize {
        if cfg!(feature = "multithreading") {
            std::thread::available_parallelism()
                .map(|parallelism| parallelism.get() / 2)
                .unwrap_or(1)
                .max(1)
        } else {
            1
        }
    }

    /// Sets the maximum number of chunks decoded concurrently.
    /// Zero means "let the library decide".
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = if num_threads == 0 {
            ParserSettings::default_num_threads()
        } else {
            num_threads
        };
        self
    }

    pub fn validate_checksums(mut self, validate_checksums: bool) -> Self {
        self.validate_checksums = validate_checksums;
        self
    }

    pub fn sort_chunks(mut self, sort_chunks: bool) -> Self {
        self.sort_chunks = sort_chunks;
        self
    }

    pub fn ansi_codec(mut self, ansi_codec: EncodingRef) -> Self {
        self.ansi_codec = ansi_codec;
        self
    }

    pub fn get_ansi_codec(&self) -> EncodingRef {
        self.ansi_codec
    }

    pub fn get_num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn should_validate_checksums(&self) -> bool {
        self.validate_checksums
    }

    pub fn should_sort_chunks(&self) -> bool {
        self.sort_chunks
    }
}

/// An EVTX file ready to stream chunks and expanded event maps.
///
/// The underlying reader is shared behind a mutex; chunk buffers are fetched
/// in file order and handed off by ownership to the decoders.
pub struct EvtxParser<T: ReadSeek> {
    data: Mutex<T>,
    header: EvtxFileHeader,
    config: Arc<ParserSettings>,
}

impl EvtxParser<File> {
    /// Opens the file at `path`, failing with `EvtxError::DirtyFile` when the
    /// dirty flag is set.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let f = Self::open_file(path.as_ref())?;
        Self::from_read_seek(f)
    }

    /// Opens the file at `path`, repairing the header when the dirty flag is
    /// set.
    pub fn from_path_dirty(path: impl AsRef<Path>) -> Result<Self> {
        let f = Self::open_file(path.as_ref())?;
        Self::from_read_seek_dirty(f)
    }

    fn open_file(path: &Path) -> Result<File> {
        File::open(path).map_err(|e| EvtxError::FailedToOpenFile {
            source: e,
            path: path.to_path_buf(),
        })
    }
}

impl<T: ReadSeek> EvtxParser<T> {
    pub fn from_read_seek(mut stream: T) -> Result<Self> {
        let header = EvtxFileHeader::from_stream(&mut stream)?;

        if header.is_dirty() {
            return Err(EvtxError::DirtyFile);
        }

        Ok(EvtxParser {
            data: Mutex::new(stream),
            header,
            config: Arc::new(ParserSettings::default()),
        })
    }

    pub fn from_read_seek_dirty(mut stream: T) -> Result<Self> {
        let mut header = EvtxFileHeader::from_stream(&mut stream)?;

        if header.is_dirty() {
            Self::repair_header(&mut stream, &mut header)?;
        }

        Ok(EvtxParser {
            data: Mutex::new(stream),
            header,
            config: Arc::new(ParserSettings::default()),
        })
    }

    /// Counts `ElfChnk\0` markers at chunk-aligned offsets and reconciles the
    /// stored chunk count against them. Markers at unaligned positions are
    /// not counted. Fails when fewer markers than the stored count are found,
    /// since truncation cannot be safely inferred.
    fn repair_header(stream: &mut T, header: &mut EvtxFileHeader) -> Result<()> {
        let mut counted: u16 = 0;
        let mut magic = [0_u8; 8];

        for chunk_number in 0..u16::MAX {
            let offset = u64::from(header.header_block_size)
                + u64::from(chunk_number) * EVTX_CHUNK_SIZE as u64;

            stream.seek(SeekFrom::Start(offset))?;
            if stream.read_exact(&mut magic).is_err() {
                break;
            }

            if &magic == crate::evtx_chunk::EVTX_CHUNK_HEADER_MAGIC {
                counted += 1;
            }
        }

        if counted < header.chunk_count {
            return Err(EvtxError::RepairFailed {
                stored: header.chunk_count,
                counted,
            });
        }

        header.chunk_count = counted;
        header.last_chunk_number = u64::from(counted.saturating_sub(1));
        header.flags = HeaderFlags::EMPTY;

        Ok(())
    }

    pub fn with_configuration(mut self, configuration: ParserSettings) -> Self {
        self.config = Arc::new(configuration);
        self
    }

    pub fn header(&self) -> &EvtxFileHeader {
        &self.header
    }

    pub fn settings(&self) -> &ParserSettings {
        &self.config
    }

    fn lock_stream(&self) -> MutexGuard<'_, T> {
        match self.data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn chunk_offset(&self, chunk_number: u16) -> u64 {
        u64::from(self.header.header_block_size) + u64::from(chunk_number) * EVTX_CHUNK_SIZE as u64
    }

    /// Fetches the 64 KiB body of chunk `chunk_number` into memory.
    fn allocate_chunk(&self, chunk_number: u16) -> Result<EvtxChunkData> {
        let mut stream = self.lock_stream();

        stream.seek(SeekFrom::Start(self.chunk_offset(chunk_number)))?;

        let mut data = vec![0_u8; EVTX_CHUNK_SIZE];
        stream
            .read_exact(&mut data)
            .map_err(|_| EvtxError::IncompleteChunk { chunk_number })?;

        Ok(EvtxChunkData::new(
            data,
            self.config.should_validate_checksums(),
        )?)
    }

    /// Reads only the header of chunk `chunk_number`, used for sorting.
    fn allocate_chunk_header(&self, chunk_number: u16) -> Result<EvtxChunkHeader> {
        let mut stream = self.lock_stream();

        stream.seek(SeekFrom::Start(self.chunk_offset(chunk_number)))?;

        let mut data = vec![0_u8; EVTX_CHUNK_HEADER_SIZE];
        stream
            .read_exact(&mut data)
            .map_err(|_| EvtxError::IncompleteChunk { chunk_number })?;

        let mut cursor = Cursor::new(data.as_slice());
        Ok(EvtxChunkHeader::from_reader(&mut cursor)?)
    }

    /// Chunk numbers in decode order: file order, or sorted by the chunk's
    /// first record number when requested.
    fn chunk_order(&self) -> Vec<u16> {
        let mut order: Vec<u16> = (0..self.header.chunk_count).collect();

        if self.config.should_sort_chunks() {
            let mut keyed: Vec<(i64, u16)> = order
                .iter()
                .map(|&chunk_number| {
                    let key = match self.allocate_chunk_header(chunk_number) {
                        Ok(header) => header.first_record_number,
                        Err(e) => {
                            warn!("Failed to read header of chunk {chunk_number} for sorting: {e}");
                            i64::MAX
                        }
                    };
                    (key, chunk_number)
                })
                .collect();

            keyed.sort_by_key(|&(key, _)| key);
            order = keyed.into_iter().map(|(_, chunk_number)| chunk_number).collect();
        }

        order
    }

    /// Iterates chunk buffers lazily, in file order.
    pub fn chunks(&self) -> IterChunks<'_, T> {
        IterChunks {
            parser: self,
            current: 0,
        }
    }

    /// The primary output: a stream of expanded event maps, decoded with
    /// bounded fan-out. Chunks are dispatched in order; events across chunks
    /// are not re-sorted.
    pub fn events(&self) -> IterEventRecords<'_, T> {
        #[cfg(feature = "multithreading")]
        let pool = if self.config.get_num_threads() > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.get_num_threads())
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!("Failed to build a thread pool, falling back to single threaded decoding: {e}");
                    None
                }
            }
        } else {
            None
        };

        IterEventRecords {
            parser: self,
            chunk_order: self.chunk_order().into(),
            buffered: VecDeque::new(),
            #[cfg(feature = "multithreading")]
            pool,
        }
    }

    /// Consumes the parser, returning the underlying reader.
    pub fn into_inner(self) -> T {
        self.data.into_inner().unwrap_or_else(|p| p.into_inner())
    }
}

pub struct IterChunks<'a, T: ReadSeek> {
    parser: &'a EvtxParser<T>,
    current: u16,
}

impl<'a, T: ReadSeek> Iterator for IterChunks<'a, T> {
    type Item = Result<EvtxChunkData>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.parser.header.chunk_count {
            return None;
        }

        let chunk = self.parser.allocate_chunk(self.current);
        self.current += 1;

        Some(chunk)
    }
}

/// Decodes batches of `num_threads` chunks at a time. Within a batch the
/// chunks are decoded concurrently; their events are drained in dispatch
/// order, so the output never interleaves.
pub struct IterEventRecords<'a, T: ReadSeek> {
    parser: &'a EvtxParser<T>,
    chunk_order: VecDeque<u16>,
    buffered: VecDeque<Result<EvtxMapRecord>>,
    #[cfg(feature = "multithreading")]
    pool: Option<rayon::ThreadPool>,
}

fn decode_chunk(
    chunk: Result<EvtxChunkData>,
    settings: Arc<ParserSettings>,
) -> Vec<Result<EvtxMapRecord>> {
    let chunk_data = match chunk {
        Ok(chunk_data) => chunk_data,
        Err(e) => return vec![Err(e)],
    };

    match chunk_data.parse(settings) {
        Ok(chunk) => chunk.iter_events().collect(),
        Err(e) => vec![Err(e)],
    }
}

impl<'a, T: ReadSeek> IterEventRecords<'a, T> {
    fn refill(&mut self) {
        let batch_size = self.parser.config.get_num_threads().max(1);

        // The fetcher stage: serialized reads from the shared stream.
        let mut batch = Vec::with_capacity(batch_size);
        while batch.len() < batch_size {
            match self.chunk_order.pop_front() {
                Some(chunk_number) => batch.push(self.parser.allocate_chunk(chunk_number)),
                None => break,
            }
        }

        if batch.is_empty() {
            return;
        }

        let settings = Arc::clone(&self.parser.config);

        // The decoder stage: one decoder per chunk, no sharing.
        #[cfg(feature = "multithreading")]
        let decoded: Vec<Vec<Result<EvtxMapRecord>>> = match &self.pool {
            Some(pool) => pool.install(|| {
                batch
                    .into_par_iter()
                    .map(|chunk| decode_chunk(chunk, Arc::clone(&settings)))
                    .collect()
            }),
            None => batch
                .into_iter()
                .map(|chunk| decode_chunk(chunk, Arc::clone(&settings)))
                .collect(),
        };

        #[cfg(not(feature = "multithreading"))]
        let decoded: Vec<Vec<Result<EvtxMapRecord>>> = batch
            .into_iter()
            .map(|chunk| decode_chunk(chunk, Arc::clone(&settings)))
            .collect();

        // The multiplexer stage: batch results flow out in dispatch order.
        for records in decoded {
            self.buffered.extend(records);
        }
    }
}

impl<'a, T: ReadSeek> Iterator for IterEventRecords<'a, T> {
    type Item = Result<EvtxMapRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.buffered.is_empty() {
            if self.chunk_order.is_empty() {
                return None;
            }
            self.refill();
        }

        self.buffered.pop_front()
    }
}

/// Sanity helper used by tests and tooling: whether `bytes` starts with the
/// EVTX file magic.
pub fn is_evtx_file(bytes: &[u8]) -> bool {
    bytes.len() >= EVTX_FILE_HEADER_MAGIC.len() && bytes[..8] == EVTX_FILE_HEADER_MAGIC[..]
}
