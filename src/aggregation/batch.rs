// Batch aggregation: full recompute over a run's record set. Used when a run view is loaded,
// never per live event.

use std::collections::HashSet;

use super::{AggregationError, derived};
use crate::models::{EnergyBreakdown, MetricRecord, RunAggregate};

/// Aggregates every record of `run_id`. Order of `records` is kept as arrival order.
/// A record id seen twice is kept once (first occurrence).
pub fn aggregate(run_id: &str, records: &[MetricRecord]) -> Result<RunAggregate, AggregationError> {
    if let Some(foreign) = records.iter().find(|r| r.run_id != run_id) {
        return Err(AggregationError::Validation {
            expected: run_id.to_string(),
            found: foreign.run_id.clone(),
            record_id: foreign.id.clone(),
        });
    }

    let mut seen_ids: HashSet<String> = HashSet::with_capacity(records.len());
    let kept: Vec<MetricRecord> = records
        .iter()
        .filter(|r| seen_ids.insert(r.id.clone()))
        .cloned()
        .collect();

    let mut energy_breakdown = EnergyBreakdown::default();
    for r in &kept {
        energy_breakdown.add_record(r);
    }
    let total_energy = kept.iter().map(MetricRecord::total_energy).sum::<f64>();

    let avg_cpu_usage = mean_f64(&kept.iter().map(|r| r.cpu_usage).collect::<Vec<_>>());
    let avg_gpu_usage = mean_f64(&kept.iter().map(|r| r.gpu_usage).collect::<Vec<_>>());
    let avg_mem_usage = mean_f64(&kept.iter().map(|r| r.mem_usage).collect::<Vec<_>>());

    Ok(RunAggregate {
        run_id: run_id.to_string(),
        record_count: kept.len() as u64,
        total_energy,
        avg_cpu_usage,
        avg_gpu_usage,
        avg_mem_usage,
        carbon_footprint: derived::carbon_footprint(total_energy),
        water_consumption: derived::water_consumption(total_energy),
        energy_breakdown,
        records: kept,
        seen_ids,
    })
}

fn mean_f64(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    v.iter().sum::<f64>() / (v.len() as f64)
}
