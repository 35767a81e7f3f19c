// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::codec;
use crate::error::Result;
use chrono::TimeZone;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    MaxHumidity,
    MinHumidity,
    MaxTemp,
    MinTemp,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MaxHumidity => "Max Humidity",
            Self::MinHumidity => "Min Humidity",
            Self::MaxTemp => "Max Temperature",
            Self::MinTemp => "Min Temperature",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// One result row of a shared scan. Produced only as a scan result, never
// persisted inside the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    // Epoch seconds of the sample the extremum was taken from.
    pub date: i64,
    pub station: String,
    pub category: Category,
    pub value: f32,
}

impl Output {
    pub fn new(date: i64, station: &str, category: Category, value: f32) -> Self {
        Self {
            date,
            station: station.to_string(),
            category,
            value,
        }
    }

    // Calendar date rendered at UTC+8, e.g. 2010-01-13.
    pub fn date_string(&self) -> String {
        match codec::local_offset().timestamp_opt(self.date, 0) {
            chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d").to_string(),
            _ => String::from("invalid"),
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.date_string(),
            self.station,
            self.category,
            self.value
        )
    }
}

// Appends result rows as CSV, writing the header line only when the file
// is first created.
pub fn write_output(path: impl AsRef<Path>, records: &[Output]) -> Result<()> {
    let path = path.as_ref();
    let new_file = !path.exists();
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    if new_file {
        writeln!(writer, "Date,Station,Category,Value")?;
    }
    for record in records {
        writeln!(writer, "{record}")?;
    }
    writer.flush()?;
    Ok(())
}
