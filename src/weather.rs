// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::codec;
use crate::colfile::ColumnFile;
use crate::error::{Result, StoreError};
use crate::output::{Category, Output};
use crate::scan::{self, MinMax};
use crate::schema::{ColumnType, Schema, Value};
use crate::store::{check_ingest_shape, parse_or_null, ColumnStore};
use chrono::{DateTime, Datelike, FixedOffset, TimeZone};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const ID_COL: &str = "id";
pub const TIMESTAMP_COL: &str = "Timestamp";
pub const STATION_COL: &str = "Station";
pub const TEMPERATURE_COL: &str = "Temperature";
pub const HUMIDITY_COL: &str = "Humidity";

// Specialized disk store for the weather dataset. Every column is fixed
// width: Station is compressed to a 1-byte code and Timestamp to 8-byte
// epoch seconds, so all scans can seek directly. That layout is what makes
// the multi-threaded shared scan in get_extreme_values possible.
#[derive(Debug)]
pub struct WeatherStore {
    name: String,
    dir: PathBuf,
    schema: Schema,
}

// Per-month scan outcome, merged by the coordinator after the join.
struct MonthResult {
    month: u32,
    outputs: Result<Vec<Output>>,
}

impl WeatherStore {
    pub const DEFAULT_NAME: &'static str = "enhanced_disk";

    pub fn weather_schema() -> Schema {
        Schema::from_pairs(&[
            (ID_COL, ColumnType::Int),
            (TIMESTAMP_COL, ColumnType::Time),
            (STATION_COL, ColumnType::Str),
            (TEMPERATURE_COL, ColumnType::Float),
            (HUMIDITY_COL, ColumnType::Float),
        ])
    }

    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        Self::create_named(root, Self::DEFAULT_NAME)
    }

    pub fn create_named(root: impl AsRef<Path>, name: &str) -> Result<Self> {
        let dir = root.as_ref().join(name);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            name: name.to_string(),
            dir,
            schema: Self::weather_schema(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn column_file(&self, column: &str) -> ColumnFile {
        ColumnFile::new(self.dir.join(format!("{column}.store")))
    }

    fn record_width(column: &str) -> usize {
        match column {
            STATION_COL => 1,
            TIMESTAMP_COL => 8,
            _ => 4,
        }
    }

    fn decode_record(&self, column: &str, rec: &[u8]) -> Option<Value> {
        match column {
            STATION_COL => codec::decode_station(rec[0]).map(|s| Value::Str(s.to_string())),
            TIMESTAMP_COL => codec::decode_time(rec.try_into().ok()?).map(Value::Time),
            ID_COL => codec::decode_i32(rec.try_into().ok()?).map(Value::Int),
            _ => codec::decode_f32(rec.try_into().ok()?).map(Value::Float),
        }
    }

    fn append_value(
        appender: &mut crate::colfile::ColumnAppender,
        column: &str,
        value: Option<&Value>,
    ) -> Result<()> {
        match column {
            STATION_COL => {
                let name = match value {
                    Some(Value::Str(s)) => Some(s.as_str()),
                    _ => None,
                };
                appender.append_bytes(&[codec::encode_station(name)])
            }
            TIMESTAMP_COL => {
                let ts = match value {
                    Some(Value::Time(ts)) => Some(*ts),
                    _ => None,
                };
                appender.append_bytes(&codec::encode_time(ts))
            }
            ID_COL => {
                let v = match value {
                    Some(Value::Int(v)) => Some(*v),
                    _ => None,
                };
                appender.append_bytes(&codec::encode_i32(v))
            }
            _ => {
                let v = match value {
                    Some(Value::Float(v)) => Some(*v),
                    _ => None,
                };
                appender.append_bytes(&codec::encode_f32(v))
            }
        }
    }

    // Year filter over the timestamp column, station filter over the 1-byte
    // station column, then one rayon task per calendar month. Each task
    // accumulates its own result list and the lists are concatenated in
    // month order after the join, so the parallel phase shares no mutable
    // state. A failed month is reported and skipped without aborting its
    // siblings.
    pub fn get_extreme_values(&self, year: i32, station: &str) -> Result<Vec<Output>> {
        let qualified = self.get_year(year)?;
        let qualified = self.get_station(station, &qualified)?;
        debug!(year, station, rows = qualified.len(), "shared scan started");

        let months: Vec<MonthResult> = (1u32..=12)
            .into_par_iter()
            .map(|month| MonthResult {
                month,
                outputs: self.scan_month(month, &qualified, station),
            })
            .collect();

        let mut results = Vec::new();
        for MonthResult { month, outputs } in months {
            match outputs {
                Ok(outputs) => results.extend(outputs),
                Err(err) => warn!(month, %err, "month scan failed"),
            }
        }
        Ok(results)
    }

    // Indexes whose timestamp falls inside the calendar year at UTC+8,
    // scanned over a read-only map of the whole column.
    fn get_year(&self, year: i32) -> Result<Vec<usize>> {
        let (start, end) = year_range(year)?;
        let mmap = self.column_file(TIMESTAMP_COL).mmap()?;
        let mut results = Vec::new();
        for (index, rec) in mmap.chunks_exact(8).enumerate() {
            let Some(ts) = codec::decode_time(rec.try_into().expect("8-byte chunk")) else {
                continue;
            };
            if ts >= start && ts <= end {
                results.push(index);
            }
        }
        Ok(results)
    }

    // One byte per record, so each candidate is a direct seek.
    fn get_station(&self, station: &str, candidates: &[usize]) -> Result<Vec<usize>> {
        let wanted = codec::encode_station(Some(station));
        if wanted == codec::NULL_STATION {
            warn!(station, "unknown station, shared scan will be empty");
            return Ok(Vec::new());
        }
        let mut reader = self.column_file(STATION_COL).fixed_reader(1)?;
        let mut results = Vec::new();
        let mut buf = [0u8; 1];
        for &index in candidates {
            match reader.read_at(index, &mut buf) {
                Ok(()) => {}
                Err(err @ StoreError::ShortRead { .. }) => {
                    warn!(%err, "station filter aborted");
                    return Ok(results);
                }
                Err(err) => return Err(err),
            }
            if buf[0] == wanted {
                results.push(index);
            }
        }
        Ok(results)
    }

    fn get_month(&self, month: u32, candidates: &[usize]) -> Result<Vec<usize>> {
        let mut reader = self.column_file(TIMESTAMP_COL).fixed_reader(8)?;
        let mut results = Vec::new();
        let mut buf = [0u8; 8];
        for &index in candidates {
            match reader.read_at(index, &mut buf) {
                Ok(()) => {}
                Err(err @ StoreError::ShortRead { .. }) => {
                    warn!(%err, "month filter aborted");
                    return Ok(results);
                }
                Err(err) => return Err(err),
            }
            let Some(ts) = codec::decode_time(buf) else {
                continue;
            };
            if let Some(dt) = local_datetime(ts) {
                if dt.month() == month {
                    results.push(index);
                }
            }
        }
        Ok(results)
    }

    // Narrow by month, run one shared min/max pass per metric column, then
    // de-duplicate days per category.
    fn scan_month(&self, month: u32, qualified: &[usize], station: &str) -> Result<Vec<Output>> {
        let month_indexes = self.get_month(month, qualified)?;
        let temperature = scan::min_max(
            &self.column_file(TEMPERATURE_COL),
            ColumnType::Float,
            &month_indexes,
        )?;
        let humidity = scan::min_max(
            &self.column_file(HUMIDITY_COL),
            ColumnType::Float,
            &month_indexes,
        )?;

        let mut outputs = Vec::new();
        self.add_results(&mut outputs, &humidity.max, HUMIDITY_COL, station, Category::MaxHumidity)?;
        self.add_results(&mut outputs, &humidity.min, HUMIDITY_COL, station, Category::MinHumidity)?;
        self.add_results(&mut outputs, &temperature.max, TEMPERATURE_COL, station, Category::MaxTemp)?;
        self.add_results(&mut outputs, &temperature.min, TEMPERATURE_COL, station, Category::MinTemp)?;
        Ok(outputs)
    }

    // With 48 samples a day several indexes can hold the same extreme on
    // the same day; the first (earliest) index wins.
    fn add_results(
        &self,
        outputs: &mut Vec<Output>,
        indexes: &[usize],
        column: &str,
        station: &str,
        category: Category,
    ) -> Result<()> {
        let mut value_reader = self.column_file(column).fixed_reader(4)?;
        let mut time_reader = self.column_file(TIMESTAMP_COL).fixed_reader(8)?;
        let mut days_added: HashSet<u32> = HashSet::new();

        let mut value_buf = [0u8; 4];
        let mut time_buf = [0u8; 8];
        for &index in indexes {
            match value_reader
                .read_at(index, &mut value_buf)
                .and_then(|()| time_reader.read_at(index, &mut time_buf))
            {
                Ok(()) => {}
                Err(err @ StoreError::ShortRead { .. }) => {
                    warn!(column, %err, "result resolution aborted");
                    break;
                }
                Err(err) => return Err(err),
            }
            let Some(value) = codec::decode_f32(value_buf) else {
                continue;
            };
            let Some(ts) = codec::decode_time(time_buf) else {
                continue;
            };
            let Some(dt) = local_datetime(ts) else {
                continue;
            };
            if days_added.insert(dt.day()) {
                outputs.push(Output::new(ts, station, category, value));
            }
        }
        Ok(())
    }

    pub fn shared_min_max(&self, column: &str, candidates: &[usize]) -> Result<MinMax> {
        let col_type = self.schema.check_numeric(column)?;
        scan::min_max(&self.column_file(column), col_type, candidates)
    }
}

impl ColumnStore for WeatherStore {
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
        Self::append_value(&mut appender, column, parsed.as_ref())?;
        appender.flush()
    }

    fn store_all(&mut self, buffer: &HashMap<String, Vec<String>>) -> Result<()> {
        check_ingest_shape(&self.schema, buffer)?;
        for (column, values) in buffer {
            let col_type = self.schema.column_type(column)?;
            let mut appender = self.column_file(column).appender()?;
            for value in values {
                let parsed = parse_or_null(column, col_type, value);
                Self::append_value(&mut appender, column, parsed.as_ref())?;
            }
            appender.flush()?;
        }
        Ok(())
    }

    fn filter(&self, column: &str, pred: &dyn Fn(&Value) -> bool) -> Result<Vec<usize>> {
        self.schema.column_type(column)?;
        let width = Self::record_width(column);
        let mut reader = self.column_file(column).fixed_reader(width)?;
        let mut matches = Vec::new();
        reader.for_each_record(|index, rec| {
            if let Some(value) = self.decode_record(column, rec) {
                if pred(&value) {
                    matches.push(index);
                }
            }
            Ok(())
        })?;
        Ok(matches)
    }

    fn filter_at(
        &self,
        column: &str,
        pred: &dyn Fn(&Value) -> bool,
        candidates: &[usize],
    ) -> Result<Vec<usize>> {
        self.schema.column_type(column)?;
        let width = Self::record_width(column);
        let mut reader = self.column_file(column).fixed_reader(width)?;
        let mut matches = Vec::new();
        let mut buf = vec![0u8; width];
        for &index in candidates {
            match reader.read_at(index, &mut buf) {
                Ok(()) => {}
                Err(err @ StoreError::ShortRead { .. }) => {
                    warn!(column, %err, "restricted scan aborted");
                    return Ok(matches);
                }
                Err(err) => return Err(err),
            }
            if let Some(value) = self.decode_record(column, &buf) {
                if pred(&value) {
                    matches.push(index);
                }
            }
        }
        Ok(matches)
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
        self.schema.column_type(column)?;
        let width = Self::record_width(column);
        let mut reader = self.column_file(column).fixed_reader(width)?;
        let mut buf = vec![0u8; width];
        reader.read_at(index, &mut buf)?;
        Ok(self.decode_record(column, &buf))
    }
}

fn local_datetime(ts: i64) -> Option<DateTime<FixedOffset>> {
    codec::local_offset().timestamp_opt(ts, 0).single()
}

// Inclusive epoch-second range of a calendar year at UTC+8.
fn year_range(year: i32) -> Result<(i64, i64)> {
    let start = codec::local_offset()
        .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| StoreError::MalformedValue {
            text: year.to_string(),
            expected: "year",
        })?
        .timestamp();
    let end = codec::local_offset()
        .with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| StoreError::MalformedValue {
            text: (year + 1).to_string(),
            expected: "year",
        })?
        .timestamp()
        - 1;
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ingest(store: &mut WeatherStore, rows: &[(&str, &str, &str, &str, &str)]) {
        let mut buf: HashMap<String, Vec<String>> = HashMap::new();
        for (id, ts, st, temp, hum) in rows {
            buf.entry(ID_COL.into()).or_default().push((*id).into());
            buf.entry(TIMESTAMP_COL.into()).or_default().push((*ts).into());
            buf.entry(STATION_COL.into()).or_default().push((*st).into());
            buf.entry(TEMPERATURE_COL.into()).or_default().push((*temp).into());
            buf.entry(HUMIDITY_COL.into()).or_default().push((*hum).into());
        }
        store.store_all(&buf).unwrap();
    }

    fn by_category(results: &[Output], cat: Category) -> Vec<&Output> {
        results.iter().filter(|o| o.category == cat).collect()
    }

    #[test]
    fn test_year_range_utc8() {
        let (start, end) = year_range(2010).unwrap();
        assert_eq!(start, 1262275200);
        assert_eq!(end, 1293811199);
    }

    #[test]
    fn test_station_byte_layout() {
        let dir = tempdir().unwrap();
        let mut store = WeatherStore::create(dir.path()).unwrap();
        ingest(
            &mut store,
            &[
                ("1", "2010-01-01 00:00", "Changi", "20.0", "80.0"),
                ("2", "2010-01-01 00:30", "Paya Lebar", "21.0", "81.0"),
                ("3", "2010-01-01 01:00", "M", "22.0", "82.0"),
            ],
        );

        let bytes = fs::read(store.dir().join("Station.store")).unwrap();
        assert_eq!(bytes, b"CPM");
        assert_eq!(
            store.get_value(STATION_COL, 1).unwrap(),
            Some(Value::Str("Paya Lebar".to_string()))
        );
        assert_eq!(store.get_value(STATION_COL, 2).unwrap(), None);
    }

    #[test]
    fn test_timestamp_fixed_eight_bytes() {
        let dir = tempdir().unwrap();
        let mut store = WeatherStore::create(dir.path()).unwrap();
        ingest(
            &mut store,
            &[
                ("1", "2010-01-01 00:00", "Changi", "20.0", "80.0"),
                ("2", "M", "Changi", "21.0", "81.0"),
            ],
        );

        let bytes = fs::read(store.dir().join("Timestamp.store")).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(
            store.get_value(TIMESTAMP_COL, 0).unwrap(),
            Some(Value::Time(1262275200))
        );
        assert_eq!(store.get_value(TIMESTAMP_COL, 1).unwrap(), None);
    }

    #[test]
    fn test_extreme_values_dedupes_same_day_ties() {
        let dir = tempdir().unwrap();
        let mut store = WeatherStore::create(dir.path()).unwrap();
        // Two same-day samples tied at the month's max temperature; the
        // earlier index must be the one reported.
        ingest(
            &mut store,
            &[
                ("1", "2010-01-13 10:00", "Changi", "31.5", "70.0"),
                ("2", "2010-01-13 15:30", "Changi", "31.5", "72.0"),
                ("3", "2010-01-20 12:00", "Changi", "28.0", "90.0"),
                ("4", "2010-01-20 18:00", "Paya Lebar", "35.0", "99.0"),
            ],
        );

        let results = store.get_extreme_values(2010, "Changi").unwrap();
        let max_temp = by_category(&results, Category::MaxTemp);
        assert_eq!(max_temp.len(), 1);
        assert_eq!(max_temp[0].date_string(), "2010-01-13");
        // Earliest intraday sample among the tied indexes.
        assert_eq!(max_temp[0].date, 1263348000);
        assert_eq!(max_temp[0].value, 31.5);

        let min_temp = by_category(&results, Category::MinTemp);
        assert_eq!(min_temp.len(), 1);
        assert_eq!(min_temp[0].date_string(), "2010-01-20");
    }

    #[test]
    fn test_extreme_values_filters_year_and_station() {
        let dir = tempdir().unwrap();
        let mut store = WeatherStore::create(dir.path()).unwrap();
        ingest(
            &mut store,
            &[
                ("1", "2010-03-01 12:00", "Changi", "30.0", "70.0"),
                ("2", "2011-03-01 12:00", "Changi", "40.0", "60.0"),
                ("3", "2010-03-02 12:00", "Paya Lebar", "41.0", "59.0"),
                ("4", "2010-07-04 12:00", "Changi", "29.0", "75.0"),
            ],
        );

        let results = store.get_extreme_values(2010, "Changi").unwrap();
        // Only rows 0 and 3 qualify; each lives in its own month, so every
        // category appears once per occupied month.
        assert_eq!(results.len(), 8);
        for o in &results {
            assert_eq!(o.station, "Changi");
        }
        // Month order: all of March before all of July.
        let march_rows = 4;
        assert!(results[..march_rows]
            .iter()
            .all(|o| o.date_string().starts_with("2010-03")));
        assert!(results[march_rows..]
            .iter()
            .all(|o| o.date_string().starts_with("2010-07")));
        // Category order within a month.
        assert_eq!(
            results[..march_rows]
                .iter()
                .map(|o| o.category)
                .collect::<Vec<_>>(),
            vec![
                Category::MaxHumidity,
                Category::MinHumidity,
                Category::MaxTemp,
                Category::MinTemp
            ]
        );
    }

    #[test]
    fn test_extreme_values_unknown_station_is_empty() {
        let dir = tempdir().unwrap();
        let mut store = WeatherStore::create(dir.path()).unwrap();
        ingest(
            &mut store,
            &[("1", "2010-01-01 00:00", "Changi", "30.0", "70.0")],
        );
        let results = store.get_extreme_values(2010, "Nowhere").unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_shared_min_max_single_pass() {
        let dir = tempdir().unwrap();
        let mut store = WeatherStore::create(dir.path()).unwrap();
        ingest(
            &mut store,
            &[
                ("1", "2010-01-01 00:00", "Changi", "30.0", "70.0"),
                ("2", "2010-01-01 00:30", "Changi", "28.0", "80.0"),
                ("3", "2010-01-01 01:00", "Changi", "30.0", "65.0"),
            ],
        );
        let out = store.shared_min_max(TEMPERATURE_COL, &[0, 1, 2]).unwrap();
        assert_eq!(out.max, vec![0, 2]);
        assert_eq!(out.min, vec![1]);
        assert!(matches!(
            store.shared_min_max(STATION_COL, &[0]),
            Err(StoreError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_shared_min_max_negative_integers() {
        let dir = tempdir().unwrap();
        let mut store = WeatherStore::create(dir.path()).unwrap();
        ingest(
            &mut store,
            &[
                ("-1", "2010-01-01 00:00", "Changi", "30.0", "70.0"),
                ("-2", "2010-01-01 00:30", "Changi", "28.0", "80.0"),
                ("3", "2010-01-01 01:00", "Changi", "30.0", "65.0"),
            ],
        );
        // Negative i32 bit patterns must decode as integers, not as f32
        // NaN-nulls, so the shared pass agrees with get_min/get_max.
        let out = store.shared_min_max(ID_COL, &[0, 1, 2]).unwrap();
        assert_eq!(out.min, vec![1]);
        assert_eq!(out.max, vec![2]);
        assert_eq!(out.min, store.get_min(ID_COL, &[0, 1, 2]).unwrap());
        assert_eq!(out.max, store.get_max(ID_COL, &[0, 1, 2]).unwrap());
    }

    #[test]
    fn test_truncated_metric_column_keeps_other_categories() {
        let dir = tempdir().unwrap();
        let mut store = WeatherStore::create(dir.path()).unwrap();
        ingest(
            &mut store,
            &[
                ("1", "2010-01-13 10:00", "Changi", "31.5", "70.0"),
                ("2", "2010-01-20 12:00", "Changi", "28.0", "90.0"),
            ],
        );
        // An empty humidity column makes its extremum pass come up empty,
        // but the temperature categories of the same month still arrive.
        fs::write(store.dir().join("Humidity.store"), b"").unwrap();

        let results = store.get_extreme_values(2010, "Changi").unwrap();
        assert_eq!(
            results.iter().map(|o| o.category).collect::<Vec<_>>(),
            vec![Category::MaxTemp, Category::MinTemp]
        );
    }

    #[test]
    fn test_missing_metric_column_does_not_error() {
        let dir = tempdir().unwrap();
        let mut store = WeatherStore::create(dir.path()).unwrap();
        ingest(
            &mut store,
            &[("1", "2010-01-13 10:00", "Changi", "31.5", "70.0")],
        );
        fs::remove_file(store.dir().join("Humidity.store")).unwrap();

        // Every month task fails to open the column; each failure is
        // reported and skipped, the query itself still succeeds.
        let results = store.get_extreme_values(2010, "Changi").unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_add_results_keeps_partial_on_short_read() {
        let dir = tempdir().unwrap();
        let mut store = WeatherStore::create(dir.path()).unwrap();
        ingest(
            &mut store,
            &[("1", "2010-01-13 10:00", "Changi", "31.5", "70.0")],
        );

        let mut outputs = Vec::new();
        store
            .add_results(
                &mut outputs,
                &[0, 7],
                TEMPERATURE_COL,
                "Changi",
                Category::MaxTemp,
            )
            .unwrap();
        // Index 7 is past the end of the column: resolution stops there
        // but the output already built for index 0 survives.
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].value, 31.5);
    }

    #[test]
    fn test_null_metrics_never_win() {
        let dir = tempdir().unwrap();
        let mut store = WeatherStore::create(dir.path()).unwrap();
        ingest(
            &mut store,
            &[
                ("1", "2010-05-01 08:00", "Changi", "M", "M"),
                ("2", "2010-05-01 09:00", "Changi", "26.0", "88.0"),
            ],
        );

        let results = store.get_extreme_values(2010, "Changi").unwrap();
        assert_eq!(results.len(), 4);
        for o in &results {
            // Index 0 holds nulls in both metric columns, so every category
            // resolves to the 09:00 sample.
            assert_eq!(o.date, 1272675600);
        }
    }
}
