// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::error::Result;
use crate::scan::ExtremeTracker;
use crate::schema::{Schema, Value};
use crate::store::{check_ingest_shape, parse_or_null, ColumnStore};
use std::collections::HashMap;

// In-memory store variant: one vector per column, same operation set as
// the disk stores, no persistence.
#[derive(Debug)]
pub struct MemStore {
    schema: Schema,
    data: HashMap<String, Vec<Option<Value>>>,
}

impl MemStore {
    pub const NAME: &'static str = "main_memory";

    pub fn new(schema: Schema) -> Self {
        let data = schema
            .column_names()
            .map(|name| (name.to_string(), Vec::new()))
            .collect();
        Self { schema, data }
    }

    fn column(&self, column: &str) -> Result<&Vec<Option<Value>>> {
        // Schema lookup doubles as the InvalidColumn check.
        self.schema.column_type(column)?;
        Ok(&self.data[column])
    }
}

impl ColumnStore for MemStore {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn store(&mut self, column: &str, value: &str) -> Result<()> {
        let col_type = self.schema.column_type(column)?;
        let parsed = parse_or_null(column, col_type, value);
        self.data.get_mut(column).unwrap().push(parsed);
        Ok(())
    }

    fn store_all(&mut self, buffer: &HashMap<String, Vec<String>>) -> Result<()> {
        check_ingest_shape(&self.schema, buffer)?;
        for (column, values) in buffer {
            for value in values {
                self.store(column, value)?;
            }
        }
        Ok(())
    }

    fn filter(&self, column: &str, pred: &dyn Fn(&Value) -> bool) -> Result<Vec<usize>> {
        let values = self.column(column)?;
        Ok(values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| match v {
                Some(value) if pred(value) => Some(i),
                _ => None,
            })
            .collect())
    }

    fn filter_at(
        &self,
        column: &str,
        pred: &dyn Fn(&Value) -> bool,
        candidates: &[usize],
    ) -> Result<Vec<usize>> {
        let values = self.column(column)?;
        Ok(candidates
            .iter()
            .copied()
            .filter(|&i| matches!(values.get(i), Some(Some(v)) if pred(v)))
            .collect())
    }

    fn get_max(&self, column: &str, candidates: &[usize]) -> Result<Vec<usize>> {
        self.schema.check_numeric(column)?;
        let values = self.column(column)?;
        let mut tracker = ExtremeTracker::new();
        for &i in candidates {
            if let Some(Some(v)) = values.get(i) {
                if let Some(v) = v.as_f32() {
                    tracker.observe(i, v);
                }
            }
        }
        Ok(tracker.finish().max)
    }

    fn get_min(&self, column: &str, candidates: &[usize]) -> Result<Vec<usize>> {
        self.schema.check_numeric(column)?;
        let values = self.column(column)?;
        let mut tracker = ExtremeTracker::new();
        for &i in candidates {
            if let Some(Some(v)) = values.get(i) {
                if let Some(v) = v.as_f32() {
                    tracker.observe(i, v);
                }
            }
        }
        Ok(tracker.finish().min)
    }

    fn get_value(&self, column: &str, index: usize) -> Result<Option<Value>> {
        let values = self.column(column)?;
        Ok(values.get(index).cloned().flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    fn store_with_temps(values: &[&str]) -> MemStore {
        let mut store = MemStore::new(Schema::from_pairs(&[("Temperature", ColumnType::Float)]));
        for v in values {
            store.store("Temperature", v).unwrap();
        }
        store
    }

    #[test]
    fn test_mem_min_max_matches_disk_semantics() {
        let store = store_with_temps(&["20.1", "M", "20.1", "19.0"]);
        assert_eq!(store.get_max("Temperature", &[0, 1, 2, 3]).unwrap(), vec![0, 2]);
        assert_eq!(store.get_min("Temperature", &[0, 1, 2, 3]).unwrap(), vec![3]);
    }

    #[test]
    fn test_mem_filter_skips_nulls() {
        let store = store_with_temps(&["1.0", "", "3.0"]);
        let hits = store.filter("Temperature", &|_| true).unwrap();
        assert_eq!(hits, vec![0, 2]);
    }

    #[test]
    fn test_mem_get_value() {
        let store = store_with_temps(&["1.5", "M"]);
        assert_eq!(
            store.get_value("Temperature", 0).unwrap(),
            Some(Value::Float(1.5))
        );
        assert_eq!(store.get_value("Temperature", 1).unwrap(), None);
        assert_eq!(store.get_value("Temperature", 9).unwrap(), None);
    }
}
