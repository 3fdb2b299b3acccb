// One telemetry sample from one monitored process

use serde::{Deserialize, Serialize};

/// A single sample: usage in percent (0-100), energy as power draw in watts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub id: String,
    pub run_id: String,
    pub process_id: i64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub cpu_usage: f64,
    pub cpu_energy: f64,
    pub gpu_usage: f64,
    pub gpu_energy: f64,
    pub mem_usage: f64,
    pub mem_energy: f64,
    pub igpu_usage: f64,
    pub igpu_energy: f64,
}

impl MetricRecord {
    /// Sum of the four energy components.
    pub fn total_energy(&self) -> f64 {
        self.cpu_energy + self.gpu_energy + self.mem_energy + self.igpu_energy
    }
}
