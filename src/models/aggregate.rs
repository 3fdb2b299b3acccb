// Run aggregate: running totals, averages and derived impact figures for one run.
// Built by aggregation::batch, advanced one record at a time by aggregation::incremental.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::MetricRecord;

/// Energy totals per hardware component (Wh).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyBreakdown {
    pub cpu: f64,
    pub gpu: f64,
    pub mem: f64,
    pub igpu: f64,
}

impl EnergyBreakdown {
    pub fn total(&self) -> f64 {
        self.cpu + self.gpu + self.mem + self.igpu
    }

    pub(crate) fn add_record(&mut self, r: &MetricRecord) {
        self.cpu += r.cpu_energy;
        self.gpu += r.gpu_energy;
        self.mem += r.mem_energy;
        self.igpu += r.igpu_energy;
    }
}

/// Scalar part of a RunAggregate (everything but the records), used on the wire after each update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub record_count: u64,
    pub total_energy: f64,
    pub avg_cpu_usage: f64,
    pub avg_gpu_usage: f64,
    pub avg_mem_usage: f64,
    pub carbon_footprint: f64,
    pub water_consumption: f64,
    pub energy_breakdown: EnergyBreakdown,
}

/// Derived summary of a run. `records` keeps arrival order.
///
/// Fields are read-only from outside the crate; the only mutation path is
/// `RunAggregate::fold` (see `aggregation::incremental`), which keeps count,
/// sums and derived figures consistent with each other. Serialize-only: the
/// id index is rebuilt by `aggregation::batch`, never read off the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAggregate {
    pub(crate) run_id: String,
    pub(crate) record_count: u64,
    pub(crate) total_energy: f64,
    pub(crate) avg_cpu_usage: f64,
    pub(crate) avg_gpu_usage: f64,
    pub(crate) avg_mem_usage: f64,
    pub(crate) carbon_footprint: f64,
    pub(crate) water_consumption: f64,
    pub(crate) energy_breakdown: EnergyBreakdown,
    pub(crate) records: Vec<MetricRecord>,
    #[serde(skip)]
    pub(crate) seen_ids: HashSet<String>,
}

impl RunAggregate {
    /// Empty aggregate for a run: zero records, every figure 0.
    pub fn empty(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            record_count: 0,
            total_energy: 0.0,
            avg_cpu_usage: 0.0,
            avg_gpu_usage: 0.0,
            avg_mem_usage: 0.0,
            carbon_footprint: 0.0,
            water_consumption: 0.0,
            energy_breakdown: EnergyBreakdown::default(),
            records: Vec::new(),
            seen_ids: HashSet::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Total energy in Wh (all four components, all records).
    pub fn total_energy(&self) -> f64 {
        self.total_energy
    }

    pub fn avg_cpu_usage(&self) -> f64 {
        self.avg_cpu_usage
    }

    pub fn avg_gpu_usage(&self) -> f64 {
        self.avg_gpu_usage
    }

    pub fn avg_mem_usage(&self) -> f64 {
        self.avg_mem_usage
    }

    /// Grams of CO2.
    pub fn carbon_footprint(&self) -> f64 {
        self.carbon_footprint
    }

    /// Millilitres of water.
    pub fn water_consumption(&self) -> f64 {
        self.water_consumption
    }

    pub fn energy_breakdown(&self) -> EnergyBreakdown {
        self.energy_breakdown
    }

    /// Records in arrival order (not re-sorted by timestamp).
    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }

    pub fn contains(&self, record_id: &str) -> bool {
        self.seen_ids.contains(record_id)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            record_count: self.record_count,
            total_energy: self.total_energy,
            avg_cpu_usage: self.avg_cpu_usage,
            avg_gpu_usage: self.avg_gpu_usage,
            avg_mem_usage: self.avg_mem_usage,
            carbon_footprint: self.carbon_footprint,
            water_consumption: self.water_consumption,
            energy_breakdown: self.energy_breakdown,
        }
    }
}
