// Incremental aggregation: fold one live record into an existing RunAggregate in O(1).
// Matches batch::aggregate over the same records up to floating-point rounding.

use super::{AggregationError, derived};
use crate::models::{MetricRecord, RunAggregate};

/// Result of folding one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    Applied,
    /// Record id already folded; aggregate unchanged.
    Duplicate,
}

impl RunAggregate {
    /// Folds `record` into the aggregate.
    ///
    /// Duplicates (by id) are a no-op. A record for another run is rejected with
    /// [`AggregationError::Routing`] and leaves the aggregate untouched. All new
    /// values are computed before any field is written.
    pub fn fold(&mut self, record: MetricRecord) -> Result<FoldOutcome, AggregationError> {
        if self.seen_ids.contains(&record.id) {
            return Ok(FoldOutcome::Duplicate);
        }
        if record.run_id != self.run_id {
            return Err(AggregationError::Routing {
                expected: self.run_id.clone(),
                found: record.run_id,
                record_id: record.id,
            });
        }

        let count = self.record_count as f64;
        let new_count = self.record_count + 1;
        let n = new_count as f64;

        let total_energy = self.total_energy + record.total_energy();
        let avg_cpu_usage = (self.avg_cpu_usage * count + record.cpu_usage) / n;
        let avg_gpu_usage = (self.avg_gpu_usage * count + record.gpu_usage) / n;
        let avg_mem_usage = (self.avg_mem_usage * count + record.mem_usage) / n;
        let mut energy_breakdown = self.energy_breakdown;
        energy_breakdown.add_record(&record);

        self.record_count = new_count;
        self.total_energy = total_energy;
        self.avg_cpu_usage = avg_cpu_usage;
        self.avg_gpu_usage = avg_gpu_usage;
        self.avg_mem_usage = avg_mem_usage;
        // Always from the new total; never advanced incrementally.
        self.carbon_footprint = derived::carbon_footprint(total_energy);
        self.water_consumption = derived::water_consumption(total_energy);
        self.energy_breakdown = energy_breakdown;
        self.seen_ids.insert(record.id.clone());
        self.records.push(record);

        Ok(FoldOutcome::Applied)
    }
}
