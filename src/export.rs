// CSV export of a run's records, in arrival order.

use chrono::{DateTime, SecondsFormat};

use crate::models::RunAggregate;

pub const CSV_HEADER: [&str; 10] = [
    "Timestamp",
    "PID",
    "CPU Usage (%)",
    "CPU Energy (W)",
    "GPU Usage (%)",
    "GPU Energy (W)",
    "MEM Usage (%)",
    "MEM Energy (W)",
    "iGPU Usage (%)",
    "iGPU Energy (W)",
];

/// Writes header + one row per record to `out`.
pub fn write_csv<W: std::io::Write>(aggregate: &RunAggregate, out: W) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(CSV_HEADER)?;
    for r in aggregate.records() {
        writer.write_record([
            format_timestamp(r.timestamp),
            r.process_id.to_string(),
            r.cpu_usage.to_string(),
            r.cpu_energy.to_string(),
            r.gpu_usage.to_string(),
            r.gpu_energy.to_string(),
            r.mem_usage.to_string(),
            r.mem_energy.to_string(),
            r.igpu_usage.to_string(),
            r.igpu_energy.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn to_csv_string(aggregate: &RunAggregate) -> anyhow::Result<String> {
    let mut buf = Vec::new();
    write_csv(aggregate, &mut buf)?;
    Ok(String::from_utf8(buf)?)
}

/// RFC 3339 in UTC with milliseconds; out-of-range values fall back to the raw millis.
fn format_timestamp(ms: i64) -> String {
    match DateTime::from_timestamp_millis(ms) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => ms.to_string(),
    }
}
