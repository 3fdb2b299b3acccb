// Domain models: telemetry records and per-run aggregates

mod aggregate;
mod record;

pub use aggregate::{EnergyBreakdown, RunAggregate, RunSummary};
pub use record::MetricRecord;
