use byteorder::ReadBytesExt;
use chrono::{DateTime, Utc};
use encoding::{DecoderTrap, EncodingRef};
use log::warn;
use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::binxml::model::Element;
use crate::err::{DeserializationError, DeserializationResult};
use crate::guid::Guid;
use crate::ntsid::Sid;
use crate::utils::{
    datetime_from_filetime, read_systemtime, read_utf16_by_size, read_utf16_string_array,
    utf16_decode_error,
};

pub const VALUE_ARRAY_FLAG: u8 = 0x80;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinXmlValueType {
    NullType,
    StringType,
    AnsiStringType,
    Int8Type,
    UInt8Type,
    Int16Type,
    UInt16Type,
    Int32Type,
    UInt32Type,
    Int64Type,
    UInt64Type,
    Real64Type,
    BoolType,
    BinaryType,
    GuidType,
    FileTimeType,
    SysTimeType,
    SidType,
    HexInt32Type,
    HexInt64Type,
    BinXmlType,
    StringArrayType,
    UInt16ArrayType,
    UInt64ArrayType,
}

impl BinXmlValueType {
    pub fn from_u8(byte: u8) -> Option<BinXmlValueType> {
        match byte {
            0x00 => Some(BinXmlValueType::NullType),
            0x01 => Some(BinXmlValueType::StringType),
            0x02 => Some(BinXmlValueType::AnsiStringType),
            0x03 => Some(BinXmlValueType::Int8Type),
            0x04 => Some(BinXmlValueType::UInt8Type),
            0x05 => Some(BinXmlValueType::Int16Type),
            0x06 => Some(BinXmlValueType::UInt16Type),
            0x07 => Some(BinXmlValueType::Int32Type),
            0x08 => Some(BinXmlValueType::UInt32Type),
            0x09 => Some(BinXmlValueType::Int64Type),
            0x0a => Some(BinXmlValueType::UInt64Type),
            0x0c => Some(BinXmlValueType::Real64Type),
            0x0d => Some(BinXmlValueType::BoolType),
            0x0e => Some(BinXmlValueType::BinaryType),
            0x0f => Some(BinXmlValueType::GuidType),
            0x11 => Some(BinXmlValueType::FileTimeType),
            0x12 => Some(BinXmlValueType::SysTimeType),
            0x13 => Some(BinXmlValueType::SidType),
            0x14 => Some(BinXmlValueType::HexInt32Type),
            0x15 => Some(BinXmlValueType::HexInt64Type),
            0x21 => Some(BinXmlValueType::BinXmlType),
            0x81 => Some(BinXmlValueType::StringArrayType),
            0x86 => Some(BinXmlValueType::UInt16ArrayType),
            0x8a => Some(BinXmlValueType::UInt64ArrayType),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum BinXmlValue {
    Null,
    String(String),
    AnsiString(String),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Real64(f64),
    Bool(bool),
    Binary(Vec<u8>),
    Guid(Guid),
    FileTime(DateTime<Utc>),
    SysTime(DateTime<Utc>),
    Sid(Sid),
    HexInt32(String),
    HexInt64(String),
    /// An embedded binxml fragment, decoded with no enclosing chunk context.
    BinXml(Box<Element>),
    StringArray(Vec<String>),
    UInt16Array(Vec<u16>),
    UInt64Array(Vec<u64>),
    /// A recoverable value whose type tag is not mapped; its declared size
    /// was skipped so the surrounding parse can continue.
    Unknown { value_type: u8, size: u16 },
}

impl BinXmlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, BinXmlValue::Null)
    }

    /// Decodes a substitution slot described by `{size, value_type}`.
    pub fn deserialize_sized(
        value_type_token: u8,
        size: u16,
        cursor: &mut Cursor<&[u8]>,
        ansi_codec: EncodingRef,
    ) -> DeserializationResult<BinXmlValue> {
        let value_type = match BinXmlValueType::from_u8(value_type_token) {
            Some(value_type) => value_type,
            None => {
                warn!(
                    "Offset {}: unknown value type {:#04x}, skipping {} bytes",
                    cursor.position(),
                    value_type_token,
                    size
                );
                cursor.seek(SeekFrom::Current(i64::from(size)))?;
                return Ok(BinXmlValue::Unknown {
                    value_type: value_type_token,
                    size,
                });
            }
        };

        let value = match value_type {
            BinXmlValueType::NullType => BinXmlValue::Null,
            BinXmlValueType::StringType => BinXmlValue::String(
                read_utf16_by_size(cursor, u64::from(size))
                    .map_err(|e| utf16_decode_error(e, cursor))?
                    .unwrap_or_default(),
            ),
            BinXmlValueType::AnsiStringType => {
                let mut bytes = vec![0; usize::from(size)];
                cursor.read_exact(&mut bytes)?;

                while bytes.last() == Some(&0) {
                    bytes.pop();
                }

                let s = ansi_codec.decode(&bytes, DecoderTrap::Strict).map_err(|message| {
                    DeserializationError::FailedToDecodeANSIString {
                        encoding: ansi_codec.name(),
                        message: message.into_owned(),
                        offset: cursor.position(),
                    }
                })?;

                BinXmlValue::AnsiString(s)
            }
            BinXmlValueType::Int8Type => BinXmlValue::Int8(try_read!(cursor, i8)?),
            BinXmlValueType::UInt8Type => BinXmlValue::UInt8(try_read!(cursor, u8)?),
            BinXmlValueType::Int16Type => BinXmlValue::Int16(try_read!(cursor, i16)?),
            BinXmlValueType::UInt16Type => BinXmlValue::UInt16(try_read!(cursor, u16)?),
            BinXmlValueType::Int32Type => BinXmlValue::Int32(try_read!(cursor, i32)?),
            BinXmlValueType::UInt32Type => BinXmlValue::UInt32(try_read!(cursor, u32)?),
            BinXmlValueType::Int64Type => BinXmlValue::Int64(try_read!(cursor, i64)?),
            BinXmlValueType::UInt64Type => BinXmlValue::UInt64(try_read!(cursor, u64)?),
            BinXmlValueType::Real64Type => BinXmlValue::Real64(try_read!(cursor, f64)?),
            BinXmlValueType::BoolType => BinXmlValue::Bool(try_read!(cursor, bool)?),
            BinXmlValueType::BinaryType => {
                let mut bytes = vec![0; usize::from(size)];
                cursor.read_exact(&mut bytes)?;
                BinXmlValue::Binary(bytes)
            }
            BinXmlValueType::GuidType => {
                BinXmlValue::Guid(Guid::from_stream(cursor).map_err(|e| {
                    DeserializationError::FailedToRead {
                        offset: cursor.position(),
                        t: "guid",
                        source: e,
                    }
                })?)
            }
            BinXmlValueType::FileTimeType => {
                BinXmlValue::FileTime(datetime_from_filetime(try_read!(cursor, u64)?))
            }
            BinXmlValueType::SysTimeType => BinXmlValue::SysTime(read_systemtime(cursor)?),
            BinXmlValueType::SidType => {
                BinXmlValue::Sid(Sid::from_stream(cursor).map_err(|e| {
                    DeserializationError::FailedToRead {
                        offset: cursor.position(),
                        t: "ntsid",
                        source: e,
                    }
                })?)
            }
            BinXmlValueType::HexInt32Type => {
                BinXmlValue::HexInt32(format!("0x{:x}", try_read!(cursor, i32)?))
            }
            BinXmlValueType::HexInt64Type => {
                BinXmlValue::HexInt64(format!("0x{:x}", try_read!(cursor, i64)?))
            }
            BinXmlValueType::BinXmlType => {
                let element =
                    crate::binxml::deserializer::read_element(cursor, None, true, ansi_codec)?;
                BinXmlValue::BinXml(Box::new(element))
            }
            BinXmlValueType::StringArrayType => BinXmlValue::StringArray(
                read_utf16_string_array(cursor, u64::from(size))
                    .map_err(|e| utf16_decode_error(e, cursor))?,
            ),
            BinXmlValueType::UInt16ArrayType => {
                let mut values = Vec::with_capacity(usize::from(size / 2));
                for _ in 0..size / 2 {
                    values.push(try_read!(cursor, u16)?);
                }
                BinXmlValue::UInt16Array(values)
            }
            BinXmlValueType::UInt64ArrayType => {
                let mut values = Vec::with_capacity(usize::from(size / 8));
                for _ in 0..size / 8 {
                    values.push(try_read!(cursor, u64)?);
                }
                BinXmlValue::UInt64Array(values)
            }
        };

        Ok(value)
    }
}
