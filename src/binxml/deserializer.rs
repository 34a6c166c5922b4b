use byteorder::ReadBytesExt;
use encoding::EncodingRef;
use log::{trace, warn};
use std::io::{Cursor, Seek, SeekFrom};
use std::rc::Rc;

use crate::binxml::model::*;
use crate::binxml::name::BinXmlName;
use crate::binxml::value_variant::BinXmlValue;
use crate::err::{DeserializationError, DeserializationResult};
use crate::evtx_chunk::EvtxChunk;
use crate::evtx_parser::EVTX_CHUNK_SIZE;
use crate::guid::Guid;
use crate::utils::{read_len_prefixed_utf16_string, utf16_decode_error, with_seek_to};

/// Slices inside a chunk can never be larger than the chunk itself.
pub const MAX_SLICE_SIZE: u32 = EVTX_CHUNK_SIZE as u32;

const TEMPLATE_DEFINITION_HEADER_SIZE: i64 = 24;

/// Reads one element off the stream, dispatching on the leading token byte.
///
/// `chunk` supplies the string and template tables when the stream belongs to
/// a chunk; embedded binxml values pass `None`. `inside_template` tracks
/// whether element starts carry a dependency identifier.
pub fn read_element(
    cursor: &mut Cursor<&[u8]>,
    chunk: Option<&EvtxChunk>,
    inside_template: bool,
    ansi_codec: EncodingRef,
) -> DeserializationResult<Element> {
    let token_offset = cursor.position();
    let token = try_read!(cursor, u8)?;

    trace!("Offset {token_offset:#x}: token {token:#04x}");

    match token {
        TOKEN_EOF => Ok(Element::Eof),
        TOKEN_OPEN_START_ELEMENT | TOKEN_OPEN_START_ELEMENT_WITH_ATTRIBUTES => {
            Ok(Element::ElementStart(read_open_start_element(
                cursor,
                chunk,
                token,
                inside_template,
                ansi_codec,
            )?))
        }
        TOKEN_CLOSE_START_ELEMENT => Ok(Element::CloseStart),
        TOKEN_CLOSE_EMPTY_ELEMENT => Ok(Element::CloseEmpty),
        TOKEN_END_ELEMENT => Ok(Element::EndElement),
        TOKEN_VALUE | TOKEN_VALUE_WITH_MORE_DATA => read_value_text(cursor),
        TOKEN_CHAR_REF => Ok(Element::CharRef(try_read!(cursor, u16)?)),
        TOKEN_ENTITY_REF | TOKEN_ENTITY_REF_ALT => {
            Ok(Element::EntityRef(read_entity_ref(cursor, chunk)?))
        }
        TOKEN_TEMPLATE_INSTANCE => Ok(Element::TemplateInstance(read_template_instance(
            cursor, chunk, ansi_codec,
        )?)),
        TOKEN_NORMAL_SUBSTITUTION => Ok(Element::NormalSubstitution(read_substitution(cursor)?)),
        TOKEN_OPTIONAL_SUBSTITUTION => {
            Ok(Element::OptionalSubstitution(read_substitution(cursor)?))
        }
        TOKEN_FRAGMENT_HEADER => read_fragment(cursor, chunk, inside_template, ansi_codec),
        _ => Err(DeserializationError::InvalidToken {
            value: token,
            offset: token_offset,
        }),
    }
}

/// A fragment header framing its first child. A fragment whose child is a
/// raw element run (rather than a template instance) is wrapped into a
/// synthesized template instance with no substitution values.
fn read_fragment(
    cursor: &mut Cursor<&[u8]>,
    chunk: Option<&EvtxChunk>,
    inside_template: bool,
    ansi_codec: EncodingRef,
) -> DeserializationResult<Element> {
    let header = FragmentHeader {
        major_version: try_read!(cursor, u8)?,
        minor_version: try_read!(cursor, u8)?,
        flags: try_read!(cursor, u8)?,
    };

    let element = read_element(cursor, chunk, inside_template, ansi_codec)?;

    let element = if let Element::ElementStart(start) = element {
        let mut elements = vec![Element::ElementStart(start)];
        loop {
            match read_element(cursor, chunk, inside_template, ansi_codec)? {
                Element::Eof => break,
                element => elements.push(element),
            }
        }

        let definition = TemplateDefinition {
            next_template_offset: 0,
            guid: Guid::nil(),
            data_size: 0,
            elements,
        };

        Element::TemplateInstance(TemplateInstance {
            definition: Rc::new(definition),
            value_descriptors: Vec::new(),
            values: Vec::new(),
        })
    } else {
        element
    };

    Ok(Element::Fragment(Fragment {
        header,
        element: Box::new(element),
    }))
}

fn read_open_start_element(
    cursor: &mut Cursor<&[u8]>,
    chunk: Option<&EvtxChunk>,
    open_token: u8,
    inside_template: bool,
    ansi_codec: EncodingRef,
) -> DeserializationResult<ElementStart> {
    // The dependency identifier is only present inside template bodies.
    let dependency_id = if inside_template {
        Some(try_read!(cursor, i16)?)
    } else {
        None
    };

    let data_size = try_read!(cursor, u32)?;
    let name_offset = try_read!(cursor, u32)?;
    let name = read_name_at(cursor, chunk, name_offset)?;

    let attributes = if open_token == TOKEN_OPEN_START_ELEMENT_WITH_ATTRIBUTES {
        read_attribute_list(cursor, chunk, ansi_codec)?
    } else {
        Vec::new()
    };

    let close_token = try_read!(cursor, u8)?;
    if close_token != TOKEN_CLOSE_START_ELEMENT && close_token != TOKEN_CLOSE_EMPTY_ELEMENT {
        return Err(DeserializationError::InvalidElementCloseToken {
            open: open_token,
            close: close_token,
            offset: cursor.position().saturating_sub(1),
        });
    }

    // Peek the close byte back so the enclosing frame re-reads it as a token.
    cursor.seek(SeekFrom::Current(-1))?;

    Ok(ElementStart {
        dependency_id,
        data_size,
        name,
        attributes,
    })
}

/// The attribute run is self-terminating: token 0x46 means more attributes
/// follow, 0x06 marks the last one. The declared size only bounds the region.
fn read_attribute_list(
    cursor: &mut Cursor<&[u8]>,
    chunk: Option<&EvtxChunk>,
    ansi_codec: EncodingRef,
) -> DeserializationResult<Vec<Attribute>> {
    let _data_size = try_read!(cursor, u32)?;

    let mut attributes = Vec::new();
    loop {
        let token_offset = cursor.position();
        let token = try_read!(cursor, u8)?;
        if token != TOKEN_ATTRIBUTE_LAST && token != TOKEN_ATTRIBUTE {
            return Err(DeserializationError::InvalidAttributeToken {
                value: token,
                offset: token_offset,
            });
        }

        let name_offset = try_read!(cursor, u32)?;
        let name = read_name_at(cursor, chunk, name_offset)?;
        let data = read_element(cursor, chunk, false, ansi_codec)?;

        attributes.push(Attribute { name, data });

        if token == TOKEN_ATTRIBUTE_LAST {
            break;
        }
    }

    Ok(attributes)
}

fn read_value_text(cursor: &mut Cursor<&[u8]>) -> DeserializationResult<Element> {
    let value_type = try_read!(cursor, u8)?;
    if value_type != 0x01 {
        return Err(DeserializationError::InvalidValueVariant {
            value: value_type,
            offset: cursor.position().saturating_sub(1),
        });
    }

    let text = read_len_prefixed_utf16_string(cursor, false)
        .map_err(|e| utf16_decode_error(e, cursor))?
        .unwrap_or_default();

    Ok(Element::ValueText(text))
}

fn read_entity_ref(
    cursor: &mut Cursor<&[u8]>,
    chunk: Option<&EvtxChunk>,
) -> DeserializationResult<BinXmlName> {
    let name_offset = try_read!(cursor, u32)?;
    read_name_at(cursor, chunk, name_offset)
}

fn read_substitution(cursor: &mut Cursor<&[u8]>) -> DeserializationResult<Substitution> {
    let substitution_index = try_read!(cursor, i16)?;
    let value_type = try_read!(cursor, u8)?;

    Ok(Substitution {
        substitution_index,
        value_type,
    })
}

/// A name offset may point at the current cursor (inline) or elsewhere
/// (shared). Shared names are looked up in the chunk's intern table first;
/// a cache miss falls back to a guarded seek.
fn read_name_at(
    cursor: &mut Cursor<&[u8]>,
    chunk: Option<&EvtxChunk>,
    name_offset: u32,
) -> DeserializationResult<BinXmlName> {
    if u64::from(name_offset) == cursor.position() {
        return BinXmlName::from_stream(cursor);
    }

    if let Some(chunk) = chunk {
        if let Some(name) = chunk.string_table.get(name_offset) {
            return Ok(name.clone());
        }
    }

    with_seek_to(cursor, u64::from(name_offset), BinXmlName::from_stream)
}

/// Template instances come in two modes. The data offset is pre-read at +6
/// from the token so an already interned definition can be reused without
/// reparsing its body; otherwise the definition is parsed (following the
/// data offset when it does not point at the cursor) and interned.
fn read_template_instance(
    cursor: &mut Cursor<&[u8]>,
    chunk: Option<&EvtxChunk>,
    ansi_codec: EncodingRef,
) -> DeserializationResult<TemplateInstance> {
    let data_offset = with_seek_to(cursor, cursor.position() + 5, |c| try_read!(c, u32))?;

    if let Some(chunk) = chunk {
        if let Some(definition) = chunk.template_table.get(data_offset) {
            let _unknown = try_read!(cursor, u8)?;
            let _template_id = try_read!(cursor, u32)?;
            let declared_offset = try_read!(cursor, u32)?;

            // The definition body sits right here; hop over it to reach the
            // instance data.
            if u64::from(declared_offset) == cursor.position() {
                trace!(
                    "Skipping {} bytes of an already interned template",
                    definition.data_size
                );
                cursor.seek(SeekFrom::Current(
                    i64::from(definition.data_size) + TEMPLATE_DEFINITION_HEADER_SIZE,
                ))?;
            }

            let (value_descriptors, values) =
                read_template_instance_data(cursor, ansi_codec)?;

            return Ok(TemplateInstance {
                definition,
                value_descriptors,
                values,
            });
        }
    }

    let _unknown = try_read!(cursor, u8)?;
    let _template_id = try_read!(cursor, u32)?;
    let declared_offset = try_read!(cursor, u32)?;

    let definition = if u64::from(declared_offset) == cursor.position() {
        read_template_definition(cursor, ansi_codec)?
    } else {
        with_seek_to(cursor, u64::from(declared_offset), |c| {
            read_template_definition(c, ansi_codec)
        })?
    };

    let definition = Rc::new(definition);
    if let Some(chunk) = chunk {
        chunk
            .template_table
            .insert(declared_offset, Rc::clone(&definition));
    }

    let (value_descriptors, values) = read_template_instance_data(cursor, ansi_codec)?;

    Ok(TemplateInstance {
        definition,
        value_descriptors,
        values,
    })
}

/// `{next_template_offset, guid, data_size}` followed by a fragment header
/// and the element run, terminated by an EOF token.
pub fn read_template_definition(
    cursor: &mut Cursor<&[u8]>,
    ansi_codec: EncodingRef,
) -> DeserializationResult<TemplateDefinition> {
    let next_template_offset = try_read!(cursor, u32)?;
    let guid = Guid::from_stream(cursor).map_err(|e| DeserializationError::FailedToRead {
        offset: cursor.position(),
        t: "guid",
        source: e,
    })?;
    let data_size = try_read!(cursor, u32)?;

    if data_size > MAX_SLICE_SIZE {
        return Err(DeserializationError::SliceTooLarge {
            size: data_size,
            max: MAX_SLICE_SIZE,
            offset: cursor.position(),
        });
    }

    let fragment_token_offset = cursor.position();
    let fragment_token = try_read!(cursor, u8)?;
    if fragment_token != TOKEN_FRAGMENT_HEADER {
        return Err(DeserializationError::InvalidFragmentToken {
            value: fragment_token,
            offset: fragment_token_offset,
        });
    }

    let _major_version = try_read!(cursor, u8)?;
    let _minor_version = try_read!(cursor, u8)?;
    let _flags = try_read!(cursor, u8)?;

    let mut elements = Vec::new();
    loop {
        match read_element(cursor, None, true, ansi_codec)? {
            Element::Eof => break,
            element => elements.push(element),
        }
    }

    Ok(TemplateDefinition {
        next_template_offset,
        guid,
        data_size,
        elements,
    })
}

fn read_template_instance_data(
    cursor: &mut Cursor<&[u8]>,
    ansi_codec: EncodingRef,
) -> DeserializationResult<(Vec<ValueDescriptor>, Vec<BinXmlValue>)> {
    let num_values = try_read!(cursor, u32)?;
    if num_values > MAX_SLICE_SIZE {
        return Err(DeserializationError::SliceTooLarge {
            size: num_values,
            max: MAX_SLICE_SIZE,
            offset: cursor.position(),
        });
    }

    if num_values == 0 {
        return Ok((Vec::new(), Vec::new()));
    }

    let mut value_descriptors = Vec::with_capacity(num_values as usize);
    for _ in 0..num_values {
        let size = try_read!(cursor, u16)?;
        let value_type = try_read!(cursor, u8)?;
        let _reserved = try_read!(cursor, u8)?;

        value_descriptors.push(ValueDescriptor { size, value_type });
    }

    let mut values = Vec::with_capacity(num_values as usize);
    for descriptor in &value_descriptors {
        let start_position = cursor.position();
        trace!(
            "Substitution slot {:?} at {}",
            descriptor,
            start_position
        );

        let value = BinXmlValue::deserialize_sized(
            descriptor.value_type,
            descriptor.size,
            cursor,
            ansi_codec,
        )?;

        // A null slot contributes no bytes beyond its declared size.
        if value.is_null() {
            cursor.seek(SeekFrom::Current(i64::from(descriptor.size)))?;
        }

        let expected_position = start_position + u64::from(descriptor.size);
        if cursor.position() != expected_position {
            // Occurs with dirty samples; the rest of the record is usually
            // still recoverable.
            warn!(
                "Read incorrect amount of data: cursor is at {}, expected {}, descriptor was {:?}",
                cursor.position(),
                expected_position,
                descriptor
            );
            cursor.set_position(expected_position);
        }

        values.push(value);
    }

    Ok((value_descriptors, values))
}
