// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::error::{Result, StoreError};
use crate::schema::{ColumnType, Value};
use chrono::{FixedOffset, NaiveDateTime};

// Token marking a null record in variable-width (newline-delimited) columns.
pub const NULL_TOKEN: &str = "M";

// Timestamp format accepted by ingestion.
pub const DT_FORMAT: &str = "%Y-%m-%d %H:%M";

// All calendar resolution is done at a fixed UTC+8 offset.
pub const UTC_OFFSET_SECS: i32 = 8 * 3600;

// Null sentinel for the specialized 8-byte timestamp encoding.
pub const NULL_TIMESTAMP: i64 = 0;

// Station byte codes for the specialized 1-byte station encoding.
pub const NULL_STATION: u8 = b'M';
pub const CHANGI_STATION: u8 = b'C';
pub const PAYA_LEBAR_STATION: u8 = b'P';

pub fn local_offset() -> FixedOffset {
    FixedOffset::east_opt(UTC_OFFSET_SECS).unwrap()
}

// Parses an ingested text value according to the declared column type.
// Empty text and the M token always parse to null; malformed numeric or
// timestamp text is a MalformedValue condition, which ingestion logs and
// stores as the null sentinel instead of aborting.
pub fn parse_value(text: &str, col_type: ColumnType) -> Result<Option<Value>> {
    if text.is_empty() || text == NULL_TOKEN {
        return Ok(None);
    }
    let value = match col_type {
        ColumnType::Str => Value::Str(text.to_string()),
        ColumnType::Int => Value::Int(text.parse().map_err(|_| StoreError::MalformedValue {
            text: text.to_string(),
            expected: "integer",
        })?),
        ColumnType::Float => Value::Float(text.parse().map_err(|_| StoreError::MalformedValue {
            text: text.to_string(),
            expected: "float",
        })?),
        ColumnType::Time => {
            let dt = NaiveDateTime::parse_from_str(text, DT_FORMAT).map_err(|_| {
                StoreError::MalformedValue {
                    text: text.to_string(),
                    expected: "timestamp",
                }
            })?;
            let ts = dt
                .and_local_timezone(local_offset())
                .single()
                .ok_or_else(|| StoreError::MalformedValue {
                    text: text.to_string(),
                    expected: "timestamp",
                })?
                .timestamp();
            Value::Time(ts)
        }
    };
    Ok(Some(value))
}

// ---- fixed-width byte codecs --------------------------------------------
//
// The on-disk contract fixes specific bit patterns as null: i32::MIN for
// integers, NaN for floats, 0 for 8-byte timestamps, a reserved code byte
// for stations. Encoding is explicit little-endian; the sentinel never
// escapes decode, which hands back `None` instead. A genuine data value
// equal to a sentinel is indistinguishable from null. Inherited limitation.

pub fn encode_i32(value: Option<i32>) -> [u8; 4] {
    value.unwrap_or(i32::MIN).to_le_bytes()
}

pub fn decode_i32(buf: [u8; 4]) -> Option<i32> {
    let value = i32::from_le_bytes(buf);
    if value == i32::MIN {
        None
    } else {
        Some(value)
    }
}

pub fn encode_f32(value: Option<f32>) -> [u8; 4] {
    value.unwrap_or(f32::NAN).to_le_bytes()
}

pub fn decode_f32(buf: [u8; 4]) -> Option<f32> {
    let value = f32::from_le_bytes(buf);
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

pub fn encode_time(value: Option<i64>) -> [u8; 8] {
    value.unwrap_or(NULL_TIMESTAMP).to_le_bytes()
}

pub fn decode_time(buf: [u8; 8]) -> Option<i64> {
    let value = i64::from_le_bytes(buf);
    if value == NULL_TIMESTAMP {
        None
    } else {
        Some(value)
    }
}

pub fn encode_station(name: Option<&str>) -> u8 {
    match name {
        Some("Changi") => CHANGI_STATION,
        Some("Paya Lebar") => PAYA_LEBAR_STATION,
        _ => NULL_STATION,
    }
}

pub fn decode_station(code: u8) -> Option<&'static str> {
    match code {
        CHANGI_STATION => Some("Changi"),
        PAYA_LEBAR_STATION => Some("Paya Lebar"),
        _ => None,
    }
}

// ---- variable-width line codecs -----------------------------------------

// Renders one record for a newline-delimited column. The caller appends
// the terminating newline.
pub fn encode_line(value: Option<&Value>) -> String {
    match value {
        None => NULL_TOKEN.to_string(),
        Some(Value::Str(s)) => s.clone(),
        Some(Value::Time(ts)) => ts.to_string(),
        Some(Value::Int(v)) => v.to_string(),
        Some(Value::Float(v)) => v.to_string(),
    }
}

pub fn decode_line(line: &str, col_type: ColumnType) -> Result<Option<Value>> {
    if line == NULL_TOKEN {
        return Ok(None);
    }
    match col_type {
        ColumnType::Str => Ok(Some(Value::Str(line.to_string()))),
        ColumnType::Time => {
            let ts: i64 = line.parse().map_err(|_| StoreError::MalformedValue {
                text: line.to_string(),
                expected: "epoch seconds",
            })?;
            Ok(Some(Value::Time(ts)))
        }
        ColumnType::Int | ColumnType::Float => Err(StoreError::MalformedValue {
            text: line.to_string(),
            expected: "line-decoded column",
        }),
    }
}
