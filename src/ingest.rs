// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::codec::NULL_TOKEN;
use crate::error::{Result, StoreError};
use crate::store::ColumnStore;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

// Reads a CSV file into an ingest buffer and hands it to store_all. The
// header set must exactly match the registered schema. Rows with fewer
// fields than the header are padded with the null token for the missing
// trailing columns; extra fields are dropped.
pub fn add_csv_data<S: ColumnStore>(store: &mut S, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut lines = BufReader::new(File::open(path)?).lines();

    let header_line = lines
        .next()
        .transpose()?
        .ok_or_else(|| StoreError::MalformedInput("csv file has no column headers".to_string()))?;
    let headers: Vec<String> = header_line.split(',').map(str::to_string).collect();
    if headers.len() != store.schema().len() || !headers.iter().all(|h| store.schema().contains(h))
    {
        return Err(StoreError::MalformedInput(format!(
            "csv header {headers:?} differs from the registered schema"
        )));
    }

    let mut buffer: HashMap<String, Vec<String>> = headers
        .iter()
        .map(|h| (h.clone(), Vec::new()))
        .collect();
    let mut rows = 0usize;
    for line in lines {
        let line = line?;
        let mut fields = line.split(',');
        for header in &headers {
            let value = fields.next().unwrap_or(NULL_TOKEN);
            buffer.get_mut(header).unwrap().push(value.to_string());
        }
        rows += 1;
    }
    debug!(path = %path.display(), rows, "csv parsed");

    store.store_all(&buffer)
}
