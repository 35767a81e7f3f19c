// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::error::{Result, StoreError};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Str,
    Int,
    Float,
    Time,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    // Fixed record width in the generic disk layout; None means a
    // newline-delimited variable-width column.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Int | Self::Float => Some(4),
            Self::Str | Self::Time => None,
        }
    }
}

// Column name to declared type mapping, fixed at store creation.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    columns: HashMap<String, ColumnType>,
}

impl Schema {
    pub fn new(columns: HashMap<String, ColumnType>) -> Self {
        Self { columns }
    }

    pub fn from_pairs(pairs: &[(&str, ColumnType)]) -> Self {
        Self {
            columns: pairs
                .iter()
                .map(|(name, t)| ((*name).to_string(), *t))
                .collect(),
        }
    }

    pub fn column_type(&self, column: &str) -> Result<ColumnType> {
        self.columns
            .get(column)
            .copied()
            .ok_or_else(|| StoreError::InvalidColumn(column.to_string()))
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    // Rejects min/max requests before any file is opened.
    pub fn check_numeric(&self, column: &str) -> Result<ColumnType> {
        let col_type = self.column_type(column)?;
        if !col_type.is_numeric() {
            return Err(StoreError::InvalidOperation(column.to_string()));
        }
        Ok(col_type)
    }
}

// A decoded record value. Nulls are Option::None at the API boundary;
// sentinel bit patterns never escape the codec.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i32),
    Float(f32),
    // Epoch seconds, interpreted at UTC+8.
    Time(i64),
}

impl Value {
    // Numeric view used by the extremum scanners; integers widen to f32
    // on purpose.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Int(v) => Some(*v as f32),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}
