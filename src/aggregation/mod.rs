// Run aggregation: batch (load time, full recompute) and incremental (per live record, O(1)).

pub mod batch;
pub mod derived;
pub mod incremental;

pub use batch::aggregate;
pub use incremental::FoldOutcome;

/// Contract violations raised by the aggregators. Surfaced to the caller, never swallowed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregationError {
    /// A bulk record set spans more than one run.
    #[error("record {record_id} belongs to run {found}, expected run {expected}")]
    Validation {
        expected: String,
        found: String,
        record_id: String,
    },
    /// A live record was routed to the aggregate of another run.
    #[error("record {record_id} for run {found} routed to aggregate of run {expected}")]
    Routing {
        expected: String,
        found: String,
        record_id: String,
    },
}
