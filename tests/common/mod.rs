// Shared test helpers
#![allow(dead_code)]

use ecowatch::models::MetricRecord;

/// Record with every usage/energy field set to zero.
pub fn minimal_record(id: &str, run_id: &str, timestamp: i64) -> MetricRecord {
    MetricRecord {
        id: id.into(),
        run_id: run_id.into(),
        process_id: 4242,
        timestamp,
        cpu_usage: 0.0,
        cpu_energy: 0.0,
        gpu_usage: 0.0,
        gpu_energy: 0.0,
        mem_usage: 0.0,
        mem_energy: 0.0,
        igpu_usage: 0.0,
        igpu_energy: 0.0,
    }
}

/// Record with the given usages (cpu, gpu, mem) and energies (cpu, gpu, mem, igpu).
pub fn record(
    id: &str,
    run_id: &str,
    usage: (f64, f64, f64),
    energy: (f64, f64, f64, f64),
) -> MetricRecord {
    MetricRecord {
        cpu_usage: usage.0,
        gpu_usage: usage.1,
        mem_usage: usage.2,
        cpu_energy: energy.0,
        gpu_energy: energy.1,
        mem_energy: energy.2,
        igpu_energy: energy.3,
        ..minimal_record(id, run_id, 1_700_000_000_000)
    }
}

/// Live-channel payload as the monitor's notifier sends it (numeric ids, text timestamp).
pub fn wire_json(id: i64, run_id: i64, cpu_usage: f64, cpu_energy: f64) -> String {
    serde_json::json!({
        "id": id,
        "run_id": run_id,
        "pid": 1234,
        "timestamp": "2025-03-01 12:00:00",
        "cpu_usage": cpu_usage,
        "cpu_energy": cpu_energy,
        "gpu_usage": 0.0,
        "gpu_energy": 0.0,
        "mem_usage": 10.0,
        "mem_energy": 1.0,
        "igpu_usage": 0.0,
        "igpu_energy": 0.0,
    })
    .to_string()
}

/// Relative comparison with an absolute floor for values near zero.
pub fn approx_eq(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= 1e-6 * scale
}
