// SPDX-License-Identifier: AGPL-3.0-or-later

use colstore::ingest::add_csv_data;
use colstore::{write_output, ColumnStore, WeatherStore};
use std::env;
use std::time::Instant;

fn main() {
    let args: Vec<String> = env::args().collect();
    let csv_path = args
        .get(1)
        .map(String::as_str)
        .unwrap_or("SingaporeWeather.csv");
    let root = args.get(2).map(String::as_str).unwrap_or(".");

    let mut store = WeatherStore::create(root).unwrap_or_else(|e| {
        eprintln!("could not create store: {e}");
        std::process::exit(2);
    });

    if let Err(e) = add_csv_data(&mut store, csv_path) {
        eprintln!("could not ingest {csv_path}: {e}");
        std::process::exit(2);
    }

    println!("------Time Taken------");
    let start = Instant::now();
    let results_2010 = store.get_extreme_values(2010, "Changi").unwrap_or_else(|e| {
        eprintln!("scan failed: {e}");
        std::process::exit(2);
    });
    let results_2019 = store.get_extreme_values(2019, "Changi").unwrap_or_else(|e| {
        eprintln!("scan failed: {e}");
        std::process::exit(2);
    });
    println!("{}: {}ms", store.name(), start.elapsed().as_millis());

    let result_path = store.dir().join("ScanResult.csv");
    for results in [&results_2010, &results_2019] {
        if let Err(e) = write_output(&result_path, results) {
            eprintln!("could not write {}: {e}", result_path.display());
            std::process::exit(2);
        }
    }
    println!(
        "{} rows written to {}",
        results_2010.len() + results_2019.len(),
        result_path.display()
    );
}
