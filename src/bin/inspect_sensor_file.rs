use anyhow::Result;
use sensor_coverage::data_loading::{read_sensor_file, SensorKind};
use sensor_coverage::sample_rate::estimate_sample_rate;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct FileSummary<'a> {
    file: &'a str,
    sensor: Option<&'static str>,
    columns: Vec<&'static str>,
    rows: usize,
    rows_with_clock: usize,
    first_clock: Option<i64>,
    last_clock: Option<i64>,
    sample_rate_hz: Option<f64>,
    first_phone_datetime: Option<&'a str>,
    last_phone_datetime: Option<&'a str>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        println!("Usage: {} <sensor_file>", args[0]);
        std::process::exit(1);
    }

    let path = Path::new(&args[1]);
    let table = read_sensor_file(path)?;
    let clocks = table.sensor_clocks();
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or(&args[1]);

    let summary = FileSummary {
        file: file_name,
        sensor: SensorKind::classify(file_name).map(SensorKind::key),
        columns: table.columns().iter().map(|c| c.name()).collect(),
        rows: table.len(),
        rows_with_clock: clocks.len(),
        first_clock: clocks.iter().min().copied(),
        last_clock: clocks.iter().max().copied(),
        sample_rate_hz: estimate_sample_rate(&clocks),
        first_phone_datetime: table.rows().iter().find_map(|r| r.phone_datetime.as_deref()),
        last_phone_datetime: table.rows().iter().rev().find_map(|r| r.phone_datetime.as_deref()),
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
