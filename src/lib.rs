// SPDX-License-Identifier: AGPL-3.0-or-later
//
// colstore
// A minimal columnar disk storage engine: one append-only file per column,
// sentinel-encoded nulls, predicate and extremum scans over candidate index
// lists, and a multi-threaded shared scan for per-month extreme readings.

pub mod codec;
pub mod colfile;
pub mod error;
pub mod ingest;
pub mod memstore;
pub mod output;
pub mod scan;
pub mod schema;
pub mod store;
pub mod weather;

pub use crate::error::{Result, StoreError};
pub use crate::memstore::MemStore;
pub use crate::output::{write_output, Category, Output};
pub use crate::schema::{ColumnType, Schema, Value};
pub use crate::store::{ColumnStore, DiskStore};
pub use crate::weather::WeatherStore;
