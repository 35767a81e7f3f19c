// SPDX-License-Identifier: AGPL-3.0-or-later

use std::io;
use thiserror::Error;

// Validation errors (InvalidColumn, InvalidOperation, MalformedInput) are
// raised before any file is touched. Scan-time conditions (ShortRead,
// OutOfBounds) abort only the scan that hit them; callers keep whatever
// partial result was already accumulated.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("column `{0}` is not registered with this column store")]
    InvalidColumn(String),

    #[error("cannot perform min/max on non-number column `{0}`")]
    InvalidOperation(String),

    #[error("read {got} of {want} bytes at record {index}")]
    ShortRead { index: usize, want: usize, got: usize },

    #[error("candidate index {0} is out of bounds for this column file")]
    OutOfBounds(usize),

    #[error("cannot parse `{text}` as {expected}")]
    MalformedValue { text: String, expected: &'static str },

    #[error("ingest payload does not match the registered schema: {0}")]
    MalformedInput(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
