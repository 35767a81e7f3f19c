// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::codec;
use crate::colfile::ColumnFile;
use crate::error::{Result, StoreError};
use crate::schema::{ColumnType, Value};
use tracing::warn;

// Both tie lists produced by one shared extremum pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MinMax {
    pub max: Vec<usize>,
    pub min: Vec<usize>,
}

// Single-pass min/max tracker with tie retention. Comparison happens in
// f32 even for integer columns: integers are widened before comparing, so
// integer ties stay exact while float ties are bitwise-float equality.
// The widening is carried over from the source design and is part of the
// observable behavior.
#[derive(Debug)]
pub struct ExtremeTracker {
    max: f32,
    min: f32,
    out: MinMax,
}

impl ExtremeTracker {
    pub fn new() -> Self {
        Self {
            max: f32::MIN,
            min: f32::MAX,
            out: MinMax::default(),
        }
    }

    pub fn observe(&mut self, index: usize, value: f32) {
        if value == self.max {
            self.out.max.push(index);
        } else if value > self.max {
            self.out.max.clear();
            self.out.max.push(index);
            self.max = value;
        }

        if value == self.min {
            self.out.min.push(index);
        } else if value < self.min {
            self.out.min.clear();
            self.out.min.push(index);
            self.min = value;
        }
    }

    pub fn finish(self) -> MinMax {
        self.out
    }
}

impl Default for ExtremeTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_fixed4(col_type: ColumnType, buf: [u8; 4]) -> Option<Value> {
    match col_type {
        ColumnType::Int => codec::decode_i32(buf).map(Value::Int),
        ColumnType::Float => codec::decode_f32(buf).map(Value::Float),
        _ => None,
    }
}

fn decode_stored_line(col: &ColumnFile, col_type: ColumnType, index: usize, line: &str) -> Option<Value> {
    match codec::decode_line(line, col_type) {
        Ok(v) => v,
        Err(err) => {
            warn!(
                path = %col.path().display(),
                index,
                %err,
                "skipping undecodable record"
            );
            None
        }
    }
}

// Full scan: evaluates the predicate over every non-null record, in index
// order. Nulls never reach the predicate.
pub fn filter_all<P>(col: &ColumnFile, col_type: ColumnType, pred: P) -> Result<Vec<usize>>
where
    P: Fn(&Value) -> bool,
{
    let mut matches = Vec::new();
    match col_type.fixed_width() {
        Some(width) => {
            let mut reader = col.fixed_reader(width)?;
            reader.for_each_record(|index, rec| {
                let buf: [u8; 4] = rec.try_into().expect("fixed4 record");
                if let Some(value) = decode_fixed4(col_type, buf) {
                    if pred(&value) {
                        matches.push(index);
                    }
                }
                Ok(())
            })?;
        }
        None => {
            let mut cursor = col.line_cursor()?;
            cursor.for_each_line(|index, line| {
                if let Some(value) = decode_stored_line(col, col_type, index, line) {
                    if pred(&value) {
                        matches.push(index);
                    }
                }
                Ok(())
            })?;
        }
    }
    Ok(matches)
}

// Restricted scan over a candidate index list. Fixed-width columns accept
// candidates in any order (direct seek); variable-width columns require
// ascending candidates, rejected before any I/O otherwise. Running past
// the end of the file aborts the scan and keeps what already matched.
pub fn filter_at<P>(
    col: &ColumnFile,
    col_type: ColumnType,
    pred: P,
    candidates: &[usize],
) -> Result<Vec<usize>>
where
    P: Fn(&Value) -> bool,
{
    let mut matches = Vec::new();
    match col_type.fixed_width() {
        Some(width) => {
            let mut reader = col.fixed_reader(width)?;
            let mut buf = [0u8; 4];
            for &index in candidates {
                match reader.read_at(index, &mut buf) {
                    Ok(()) => {}
                    Err(err @ StoreError::ShortRead { .. }) => {
                        warn!(path = %col.path().display(), %err, "restricted scan aborted");
                        return Ok(matches);
                    }
                    Err(err) => return Err(err),
                }
                if let Some(value) = decode_fixed4(col_type, buf) {
                    if pred(&value) {
                        matches.push(index);
                    }
                }
            }
        }
        None => {
            check_ascending(candidates)?;
            let mut cursor = col.line_cursor()?;
            for &index in candidates {
                let line = match cursor.advance_to(index) {
                    Ok(line) => line,
                    Err(err @ StoreError::OutOfBounds(_)) => {
                        warn!(path = %col.path().display(), %err, "restricted scan aborted");
                        return Ok(matches);
                    }
                    Err(err) => return Err(err),
                };
                if line == codec::NULL_TOKEN {
                    continue;
                }
                if let Some(value) = decode_stored_line(col, col_type, index, &line) {
                    if pred(&value) {
                        matches.push(index);
                    }
                }
            }
        }
    }
    Ok(matches)
}

// Shared extremum scan: one pass over the candidate list yields both the
// max-tied and min-tied index sets. Nulls are never compared. A short read
// aborts the pass, keeping the ties gathered so far.
pub fn min_max(col: &ColumnFile, col_type: ColumnType, candidates: &[usize]) -> Result<MinMax> {
    let mut reader = col.fixed_reader(4)?;
    let mut tracker = ExtremeTracker::new();
    let mut buf = [0u8; 4];
    for &index in candidates {
        match reader.read_at(index, &mut buf) {
            Ok(()) => {}
            Err(err @ StoreError::ShortRead { .. }) => {
                warn!(path = %col.path().display(), %err, "extremum scan aborted");
                return Ok(tracker.finish());
            }
            Err(err) => return Err(err),
        }
        let Some(value) = decode_fixed4(col_type, buf) else {
            continue;
        };
        // Always present for Int/Float.
        if let Some(v) = value.as_f32() {
            tracker.observe(index, v);
        }
    }
    Ok(tracker.finish())
}

// The forward cursor cannot rewind, so variable-width restricted scans
// require an ascending candidate list.
pub fn check_ascending(candidates: &[usize]) -> Result<()> {
    for pair in candidates.windows(2) {
        if pair[1] <= pair[0] {
            return Err(StoreError::OutOfBounds(pair[1]));
        }
    }
    Ok(())
}
