mod binxml_utils;
mod time;

pub use self::binxml_utils::{
    read_len_prefixed_utf16_string, read_utf16_by_size, read_utf16_string_array,
};
pub(crate) use self::binxml_utils::{utf16_decode_error, with_seek_to};
pub use self::time::{datetime_from_filetime, filetime_from_datetime, read_systemtime};
