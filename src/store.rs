// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::codec;
use crate::colfile::ColumnFile;
use crate::error::{Result, StoreError};
use crate::scan;
use crate::schema::{ColumnType, Schema, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

// Operation set every store variant implements. Each storage strategy is
// an independent implementation picked at construction.
pub trait ColumnStore {
    fn name(&self) -> &str;

    fn schema(&self) -> &Schema;

    // Empty text and the "M" token store the null sentinel; malformed text
    // is logged and stored as null.
    fn store(&mut self, column: &str, value: &str) -> Result<()>;

    // Rejects the whole buffer before any write if the column name set or
    // the per-column lengths disagree with the schema.
    fn store_all(&mut self, buffer: &HashMap<String, Vec<String>>) -> Result<()>;

    fn filter(&self, column: &str, pred: &dyn Fn(&Value) -> bool) -> Result<Vec<usize>>;

    // Variable-width columns require the candidate list to be ascending.
    fn filter_at(
        &self,
        column: &str,
        pred: &dyn Fn(&Value) -> bool,
        candidates: &[usize],
    ) -> Result<Vec<usize>>;

    fn get_max(&self, column: &str, candidates: &[usize]) -> Result<Vec<usize>>;

    fn get_min(&self, column: &str, candidates: &[usize]) -> Result<Vec<usize>>;

    // None is a stored null.
    fn get_value(&self, column: &str, index: usize) -> Result<Option<Value>>;
}

// Validates an ingest buffer against the schema before anything is written.
pub(crate) fn check_ingest_shape(
    schema: &Schema,
    buffer: &HashMap<String, Vec<String>>,
) -> Result<()> {
    if buffer.len() != schema.len() || !buffer.keys().all(|c| schema.contains(c)) {
        return Err(StoreError::MalformedInput(
            "column set differs from registered schema".to_string(),
        ));
    }
    let mut lengths = buffer.values().map(Vec::len);
    if let Some(first) = lengths.next() {
        if lengths.any(|len| len != first) {
            return Err(StoreError::MalformedInput(
                "columns have unequal value counts".to_string(),
            ));
        }
    }
    Ok(())
}

// Malformed text is downgraded to a logged null.
pub(crate) fn parse_or_null(column: &str, col_type: ColumnType, value: &str) -> Option<Value> {
    match codec::parse_value(value, col_type) {
        Ok(v) => v,
        Err(err) => {
            warn!(column, %err, "storing null for malformed value");
            None
        }
    }
}

// Generic disk-backed store: one <Column>.store file per column under
// <root>/<name>/. Integers and floats are fixed 4-byte records; strings
// and timestamps are newline-delimited text.
#[derive(Debug)]
pub struct DiskStore {
    name: String,
    dir: PathBuf,
    schema: Schema,
}

impl DiskStore {
    pub const DEFAULT_NAME: &'static str = "disk";

    pub fn create(root: impl AsRef<Path>, schema: Schema) -> Result<Self> {
        Self::create_named(root, Self::DEFAULT_NAME, schema)
    }

    pub fn create_named(root: impl AsRef<Path>, name: &str, schema: Schema) -> Result<Self> {
        let dir = root.as_ref().join(name);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            name: name.to_string(),
            dir,
            schema,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn column_file(&self, column: &str) -> ColumnFile {
        ColumnFile::new(self.dir.join(format!("{column}.store")))
    }

    fn append_value(
        appender: &mut crate::colfile::ColumnAppender,
        col_type: ColumnType,
        value: Option<&Value>,
    ) -> Result<()> {
        match col_type {
            ColumnType::Int => {
                let v = match value {
                    Some(Value::Int(v)) => Some(*v),
                    _ => None,
                };
                appender.append_bytes(&codec::encode_i32(v))
            }
            ColumnType::Float => {
                let v = match value {
                    Some(Value::Float(v)) => Some(*v),
                    _ => None,
                };
                appender.append_bytes(&codec::encode_f32(v))
            }
            ColumnType::Str | ColumnType::Time => appender.append_line(&codec::encode_line(value)),
        }
    }
}

impl ColumnStore for DiskStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn store(&mut self, column: &str, value: &str) -> Result<()> {
        let col_type = self.schema.column_type(column)?;
        let parsed = parse_or_null(column, col_type, value);
        let mut appender = self.column_file(column).appender()?;
        Self::append_value(&mut appender, col_type, parsed.as_ref())?;
        appender.flush()
    }

    fn store_all(&mut self, buffer: &HashMap<String, Vec<String>>) -> Result<()> {
        check_ingest_shape(&self.schema, buffer)?;
        for (column, values) in buffer {
            let col_type = self.schema.column_type(column)?;
            let mut appender = self.column_file(column).appender()?;
            for value in values {
                let parsed = parse_or_null(column, col_type, value);
                Self::append_value(&mut appender, col_type, parsed.as_ref())?;
            }
            appender.flush()?;
        }
        Ok(())
    }

    fn filter(&self, column: &str, pred: &dyn Fn(&Value) -> bool) -> Result<Vec<usize>> {
        let col_type = self.schema.column_type(column)?;
        scan::filter_all(&self.column_file(column), col_type, pred)
    }

    fn filter_at(
        &self,
        column: &str,
        pred: &dyn Fn(&Value) -> bool,
        candidates: &[usize],
    ) -> Result<Vec<usize>> {
        let col_type = self.schema.column_type(column)?;
        scan::filter_at(&self.column_file(column), col_type, pred, candidates)
    }

    fn get_max(&self, column: &str, candidates: &[usize]) -> Result<Vec<usize>> {
        let col_type = self.schema.check_numeric(column)?;
        Ok(scan::min_max(&self.column_file(column), col_type, candidates)?.max)
    }

    fn get_min(&self, column: &str, candidates: &[usize]) -> Result<Vec<usize>> {
        let col_type = self.schema.check_numeric(column)?;
        Ok(scan::min_max(&self.column_file(column), col_type, candidates)?.min)
    }

    fn get_value(&self, column: &str, index: usize) -> Result<Option<Value>> {
        let col_type = self.schema.column_type(column)?;
        let col = self.column_file(column);
        match col_type.fixed_width() {
            Some(width) => {
                let mut reader = col.fixed_reader(width)?;
                let mut buf = [0u8; 4];
                reader.read_at(index, &mut buf)?;
                Ok(match col_type {
                    ColumnType::Int => codec::decode_i32(buf).map(Value::Int),
                    ColumnType::Float => codec::decode_f32(buf).map(Value::Float),
                    _ => unreachable!("fixed width implies numeric in the generic layout"),
                })
            }
            None => {
                let mut cursor = col.line_cursor()?;
                let line = cursor.advance_to(index)?;
                codec::decode_line(&line, col_type)
            }
        }
    }
}
