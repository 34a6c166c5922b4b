/// Tries to read a fixed-width little-endian value from the cursor,
/// capturing the stream offset when the read fails.
macro_rules! try_read {
    ($cursor: ident, u8) => {
        $cursor
            .read_u8()
            .map_err(|e| $crate::err::DeserializationError::FailedToRead {
                offset: $cursor.stream_position().unwrap_or_default(),
                t: "u8",
                source: e,
            })
    };

    ($cursor: ident, i8) => {
        $cursor
            .read_i8()
            .map_err(|e| $crate::err::DeserializationError::FailedToRead {
                offset: $cursor.stream_position().unwrap_or_default(),
                t: "i8",
                source: e,
            })
    };

    ($cursor: ident, u16) => {
        $cursor
            .read_u16::<byteorder::LittleEndian>()
            .map_err(|e| $crate::err::DeserializationError::FailedToRead {
                offset: $cursor.stream_position().unwrap_or_default(),
                t: "u16",
                source: e,
            })
    };

    ($cursor: ident, i16) => {
        $cursor
            .read_i16::<byteorder::LittleEndian>()
            .map_err(|e| $crate::err::DeserializationError::FailedToRead {
                offset: $cursor.stream_position().unwrap_or_default(),
                t: "i16",
                source: e,
            })
    };

    ($cursor: ident, u32) => {
        $cursor
            .read_u32::<byteorder::LittleEndian>()
            .map_err(|e| $crate::err::DeserializationError::FailedToRead {
                offset: $cursor.stream_position().unwrap_or_default(),
                t: "u32",
                source: e,
            })
    };

    ($cursor: ident, i32) => {
        $cursor
            .read_i32::<byteorder::LittleEndian>()
            .map_err(|e| $crate::err::DeserializationError::FailedToRead {
                offset: $cursor.stream_position().unwrap_or_default(),
                t: "i32",
                source: e,
            })
    };

    ($cursor: ident, u64) => {
        $cursor
            .read_u64::<byteorder::LittleEndian>()
            .map_err(|e| $crate::err::DeserializationError::FailedToRead {
                offset: $cursor.stream_position().unwrap_or_default(),
                t: "u64",
                source: e,
            })
    };

    ($cursor: ident, i64) => {
        $cursor
            .read_i64::<byteorder::LittleEndian>()
            .map_err(|e| $crate::err::DeserializationError::FailedToRead {
                offset: $cursor.stream_position().unwrap_or_default(),
                t: "i64",
                source: e,
            })
    };

    ($cursor: ident, f64) => {
        $cursor
            .read_f64::<byteorder::LittleEndian>()
            .map_err(|e| $crate::err::DeserializationError::FailedToRead {
                offset: $cursor.stream_position().unwrap_or_default(),
                t: "f64",
                source: e,
            })
    };

    // Four byte bool, true iff non-zero.
    ($cursor: ident, bool) => {
        try_read!($cursor, i32).map(|bool_value| match bool_value {
            0 => false,
            1 => true,
            _ => {
                log::warn!(
                    "{:?} is an unknown value for bool, coercing to `true`",
                    bool_value
                );
                true
            }
        })
    };
}
