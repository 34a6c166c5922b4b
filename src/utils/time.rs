use byteorder::ReadBytesExt;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::io::{Cursor, Seek};

use crate::err::{DeserializationError, DeserializationResult};

/// Seconds between 1601-01-01 and the unix epoch.
const EPOCH_DELTA_SECONDS: i64 = 11_644_473_600;

/// Ticks are 100ns intervals since 1601-01-01T00:00:00Z.
pub fn datetime_from_filetime(ticks: u64) -> DateTime<Utc> {
    let seconds = (ticks / 10_000_000) as i64 - EPOCH_DELTA_SECONDS;
    let nanoseconds = (ticks % 10_000_000) * 100;

    Utc.timestamp_opt(seconds, nanoseconds as u32)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().expect("unix epoch is valid"))
}

pub fn filetime_from_datetime(datetime: DateTime<Utc>) -> u64 {
    let seconds = datetime.timestamp() + EPOCH_DELTA_SECONDS;
    let subsec_ticks = u64::from(datetime.timestamp_subsec_nanos()) / 100;

    (seconds as u64) * 10_000_000 + subsec_ticks
}

/// SYSTEMTIME: eight consecutive little-endian u16 fields.
pub fn read_systemtime(cursor: &mut Cursor<&[u8]>) -> DeserializationResult<DateTime<Utc>> {
    let year = try_read!(cursor, u16)?;
    let month = try_read!(cursor, u16)?;
    let _day_of_week = try_read!(cursor, u16)?;
    let day = try_read!(cursor, u16)?;
    let hour = try_read!(cursor, u16)?;
    let minute = try_read!(cursor, u16)?;
    let second = try_read!(cursor, u16)?;
    let milliseconds = try_read!(cursor, u16)?;

    NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
        .and_then(|date| {
            date.and_hms_nano_opt(
                u32::from(hour),
                u32::from(minute),
                u32::from(second),
                u32::from(milliseconds) * 1_000_000,
            )
        })
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or(DeserializationError::InvalidSystemDateTime {
            offset: cursor.position(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_filetime_conversion_keeps_100ns_resolution() {
        // 2016-07-08T18:12:51.681640700Z
        let ticks = 131_124_751_716_816_407_u64;
        let datetime = datetime_from_filetime(ticks);

        assert_eq!(datetime.to_rfc3339(), "2016-07-08T18:12:51.681640700+00:00");
        assert_eq!(datetime.nanosecond(), 681_640_700);
    }

    #[test]
    fn test_filetime_round_trip() {
        for ticks in [0_u64, 1, 116_444_736_000_000_000, 131_124_751_716_816_407] {
            assert_eq!(filetime_from_datetime(datetime_from_filetime(ticks)), ticks);
        }
    }

    #[test]
    fn test_reads_systemtime() {
        let fields: [u16; 8] = [2019, 3, 5, 1, 22, 30, 5, 123];
        let data: Vec<u8> = fields.iter().flat_map(|f| f.to_le_bytes()).collect();

        let mut cursor = Cursor::new(data.as_slice());
        let datetime = read_systemtime(&mut cursor).unwrap();

        assert_eq!(datetime.to_rfc3339(), "2019-03-01T22:30:05.123+00:00");
    }

    #[test]
    fn test_systemtime_with_invalid_date_errors() {
        let fields: [u16; 8] = [2019, 13, 0, 40, 0, 0, 0, 0];
        let data: Vec<u8> = fields.iter().flat_map(|f| f.to_le_bytes()).collect();

        let mut cursor = Cursor::new(data.as_slice());
        assert!(read_systemtime(&mut cursor).is_err());
    }
}
