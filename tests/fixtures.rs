//! Builders for synthetic EVTX buffers used by the integration tests.
#![allow(dead_code)]

pub const CHUNK_SIZE: usize = 65536;
pub const FILE_HEADER_SIZE: usize = 4096;
pub const RECORD_HEADER_SIZE: usize = 24;
pub const FIRST_RECORD_OFFSET: u32 = 512;

/// A binxml byte writer that tracks its absolute offset within the chunk
/// body, so inline name and template offsets can be computed on the fly.
pub struct BinXmlWriter {
    pub buf: Vec<u8>,
    base: u32,
}

impl BinXmlWriter {
    pub fn new(base: u32) -> Self {
        BinXmlWriter {
            buf: Vec::new(),
            base,
        }
    }

    pub fn pos(&self) -> u32 {
        self.base + self.buf.len() as u32
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i16(&mut self, v: i16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(v);
        self
    }

    fn utf16(&mut self, s: &str) -> &mut Self {
        for unit in s.encode_utf16() {
            self.u16(unit);
        }
        self
    }

    /// `{prev_offset, hash, char_count, utf16..., NUL}`
    fn name(&mut self, s: &str) -> &mut Self {
        self.u32(0);
        self.u16(0);
        self.u16(s.encode_utf16().count() as u16);
        self.utf16(s);
        self.u16(0)
    }

    pub fn fragment_header(&mut self) -> &mut Self {
        self.bytes(&[0x0f, 0x01, 0x01, 0x00])
    }

    /// Opens `<name>`; the caller writes children and calls `end_element`.
    pub fn open_element(&mut self, name: &str, in_template: bool) -> &mut Self {
        self.u8(0x01);
        if in_template {
            self.i16(0);
        }
        self.u32(0); // data size, informational
        let name_offset = self.pos() + 4;
        self.u32(name_offset);
        self.name(name);
        self.u8(0x02) // close start tag
    }

    /// Opens `<name attr="text">`.
    pub fn open_element_with_text_attribute(
        &mut self,
        name: &str,
        attribute_name: &str,
        attribute_value: &str,
        in_template: bool,
    ) -> &mut Self {
        self.u8(0x41);
        if in_template {
            self.i16(0);
        }
        self.u32(0);
        let name_offset = self.pos() + 4;
        self.u32(name_offset);
        self.name(name);

        // Attribute list: declared size bounds the region, the run itself is
        // terminated by the 0x06 token.
        self.u32(0);
        self.u8(0x06);
        let attribute_name_offset = self.pos() + 4;
        self.u32(attribute_name_offset);
        self.name(attribute_name);
        self.value_text(attribute_value);

        self.u8(0x02)
    }

    /// Opens `<name attr=[substitution]>` closed as an empty element.
    pub fn empty_element_with_substitution_attribute(
        &mut self,
        name: &str,
        attribute_name: &str,
        substitution_token: u8,
        substitution_index: i16,
        value_type: u8,
        in_template: bool,
    ) -> &mut Self {
        self.u8(0x41);
        if in_template {
            self.i16(0);
        }
        self.u32(0);
        let name_offset = self.pos() + 4;
        self.u32(name_offset);
        self.name(name);

        self.u32(0);
        self.u8(0x06);
        let attribute_name_offset = self.pos() + 4;
        self.u32(attribute_name_offset);
        self.name(attribute_name);
        self.u8(substitution_token);
        self.i16(substitution_index);
        self.u8(value_type);

        self.u8(0x03) // close empty tag
    }

    pub fn end_element(&mut self) -> &mut Self {
        self.u8(0x04)
    }

    pub fn value_text(&mut self, s: &str) -> &mut Self {
        self.u8(0x05);
        self.u8(0x01);
        self.u16(s.encode_utf16().count() as u16);
        self.utf16(s)
    }

    pub fn entity_ref(&mut self, name: &str) -> &mut Self {
        self.u8(0x09);
        let name_offset = self.pos() + 4;
        self.u32(name_offset);
        self.name(name)
    }

    pub fn normal_substitution(&mut self, index: i16, value_type: u8) -> &mut Self {
        self.u8(0x0d);
        self.i16(index);
        self.u8(value_type)
    }

    pub fn optional_substitution(&mut self, index: i16, value_type: u8) -> &mut Self {
        self.u8(0x0e);
        self.i16(index);
        self.u8(value_type)
    }

    /// Writes an inline template instance: the definition body sits right
    /// after the instance header and is followed by the value descriptors
    /// and the substitution values.
    pub fn template_instance_inline(
        &mut self,
        body: impl FnOnce(&mut BinXmlWriter),
        values: &[(u8, Vec<u8>)],
    ) -> u32 {
        self.u8(0x0c);
        self.u8(0); // unknown
        self.u32(0); // template id
        let data_offset = self.pos() + 4;
        self.u32(data_offset);

        // Definition data: next template offset, guid, size, body.
        self.u32(0);
        self.bytes(&[0_u8; 16]);
        let size_field_at = self.buf.len();
        self.u32(0);

        let body_start = self.buf.len();
        self.fragment_header();
        body(self);
        self.u8(0x00); // EOF
        let body_size = (self.buf.len() - body_start) as u32;
        self.buf[size_field_at..size_field_at + 4].copy_from_slice(&body_size.to_le_bytes());

        self.instance_values(values);

        data_offset
    }

    /// Writes a template instance referencing an already interned
    /// definition by its data offset.
    pub fn template_instance_by_ref(&mut self, data_offset: u32, values: &[(u8, Vec<u8>)]) {
        self.u8(0x0c);
        self.u8(0);
        self.u32(0);
        self.u32(data_offset);

        self.instance_values(values);
    }

    fn instance_values(&mut self, values: &[(u8, Vec<u8>)]) {
        self.u32(values.len() as u32);
        for (value_type, data) in values {
            self.u16(data.len() as u16);
            self.u8(*value_type);
            self.u8(0);
        }
        for (_, data) in values {
            self.bytes(data);
        }
    }
}

/// Wraps binxml bytes into a full record: header, body, trailing size copy.
pub fn record_bytes(record_id: u64, filetime: u64, binxml: &[u8]) -> Vec<u8> {
    let size = (RECORD_HEADER_SIZE + binxml.len() + 4) as u32;

    let mut record = Vec::with_capacity(size as usize);
    record.extend_from_slice(b"\x2a\x2a\x00\x00");
    record.extend_from_slice(&size.to_le_bytes());
    record.extend_from_slice(&record_id.to_le_bytes());
    record.extend_from_slice(&filetime.to_le_bytes());
    record.extend_from_slice(binxml);
    record.extend_from_slice(&size.to_le_bytes());
    record
}

/// Assembles a 64 KiB chunk from complete record blobs laid out back to
/// back from offset 512. The records must have been built against matching
/// absolute offsets.
pub fn build_chunk(records: &[Vec<u8>], first_record_number: i64) -> Vec<u8> {
    let mut chunk = vec![0_u8; FIRST_RECORD_OFFSET as usize];
    chunk[..8].copy_from_slice(b"ElfChnk\x00");

    let record_count = records.len() as i64;
    let last_record_number = first_record_number + record_count.saturating_sub(1);
    chunk[8..16].copy_from_slice(&first_record_number.to_le_bytes());
    chunk[16..24].copy_from_slice(&last_record_number.to_le_bytes());
    chunk[24..32].copy_from_slice(&first_record_number.to_le_bytes());
    chunk[32..40].copy_from_slice(&last_record_number.to_le_bytes());

    let mut offset = FIRST_RECORD_OFFSET;
    let mut last_record_offset = 128_u32;
    for record in records {
        last_record_offset = offset;
        offset += record.len() as u32;
    }

    chunk[40..44].copy_from_slice(&128_u32.to_le_bytes()); // header size
    chunk[44..48].copy_from_slice(&last_record_offset.to_le_bytes());
    chunk[48..52].copy_from_slice(&offset.to_le_bytes()); // free space offset

    for record in records {
        chunk.extend_from_slice(record);
    }
    chunk.resize(CHUNK_SIZE, 0);

    chunk
}

/// Assembles a file: a 4096 byte header followed by the chunk bodies.
/// `stored_chunk_count` and `flags` land in the header as-is, so dirty
/// headers can disagree with the actual chunk count.
pub fn build_file(chunks: &[Vec<u8>], stored_chunk_count: u16, flags: u32) -> Vec<u8> {
    let mut file = Vec::with_capacity(FILE_HEADER_SIZE + chunks.len() * CHUNK_SIZE);

    file.extend_from_slice(b"ElfFile\x00");
    file.extend_from_slice(&0_u64.to_le_bytes()); // first chunk number
    file.extend_from_slice(&(chunks.len() as u64).saturating_sub(1).to_le_bytes());
    file.extend_from_slice(&1_u64.to_le_bytes()); // next record id
    file.extend_from_slice(&128_u32.to_le_bytes()); // header size
    file.extend_from_slice(&1_u16.to_le_bytes()); // minor version
    file.extend_from_slice(&3_u16.to_le_bytes()); // major version
    file.extend_from_slice(&(FILE_HEADER_SIZE as u16).to_le_bytes());
    file.extend_from_slice(&stored_chunk_count.to_le_bytes());
    file.extend_from_slice(&[0_u8; 76]);
    file.extend_from_slice(&flags.to_le_bytes());
    file.extend_from_slice(&0_u32.to_le_bytes()); // checksum, not validated here
    file.resize(FILE_HEADER_SIZE, 0);

    for chunk in chunks {
        file.extend_from_slice(chunk);
    }

    file
}

/// A record carrying an inline template instance with the given body and
/// substitution values. Returns the record bytes and the absolute offset of
/// the interned template definition.
pub fn template_event_record(
    record_id: u64,
    record_offset: u32,
    body: impl FnOnce(&mut BinXmlWriter),
    values: &[(u8, Vec<u8>)],
) -> (Vec<u8>, u32) {
    let mut writer = BinXmlWriter::new(record_offset + RECORD_HEADER_SIZE as u32);

    writer.fragment_header();
    let data_offset = writer.template_instance_inline(body, values);

    (record_bytes(record_id, TEST_FILETIME, &writer.buf), data_offset)
}

/// A record referencing an already interned template definition.
pub fn template_ref_event_record(
    record_id: u64,
    record_offset: u32,
    data_offset: u32,
    values: &[(u8, Vec<u8>)],
) -> Vec<u8> {
    let mut writer = BinXmlWriter::new(record_offset + RECORD_HEADER_SIZE as u32);

    writer.fragment_header();
    writer.template_instance_by_ref(data_offset, values);

    record_bytes(record_id, TEST_FILETIME, &writer.buf)
}

/// A record whose binxml opens with an unmapped token byte.
pub fn broken_token_record(record_id: u64, record_offset: u32) -> Vec<u8> {
    let mut writer = BinXmlWriter::new(record_offset + RECORD_HEADER_SIZE as u32);

    writer.fragment_header();
    writer.u8(0x07); // not a binxml token
    writer.bytes(&[0_u8; 16]);

    record_bytes(record_id, TEST_FILETIME, &writer.buf)
}

/// A record holding `<Event><System><EventID>{event_id}</EventID></System></Event>`
/// with the event id as inline text, built for placement at `record_offset`.
pub fn simple_event_record(record_id: u64, record_offset: u32, event_id: &str) -> Vec<u8> {
    let mut writer = BinXmlWriter::new(record_offset + RECORD_HEADER_SIZE as u32);

    writer.fragment_header();
    writer.template_instance_inline(
        |w| {
            w.open_element("Event", true);
            w.open_element("System", true);
            w.open_element("EventID", true);
            w.value_text(event_id);
            w.end_element();
            w.end_element();
            w.end_element();
        },
        &[],
    );

    record_bytes(record_id, TEST_FILETIME, &writer.buf)
}

/// A single-event chunk wrapping `simple_event_record`.
pub fn single_event_chunk(event_id: &str) -> Vec<u8> {
    let record = simple_event_record(1, FIRST_RECORD_OFFSET, event_id);
    build_chunk(&[record], 1)
}

/// 2016-07-08T18:12:51.681640700Z
pub const TEST_FILETIME: u64 = 131_124_751_716_816_407;
