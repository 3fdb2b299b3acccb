// Record watcher: feeds the live channel.
// Polls PRAGMA user_version (cheap); when it moves, reads every record newer than the last
// published row id and broadcasts each one as a JSON message.

use crate::dispatcher::decode::encode_record;
use crate::record_repo::RecordRepo;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant, interval};
use tracing::Instrument;

/// Rate limit for the "no receivers" message (no run view open).
const NO_RECEIVERS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Rows read per query while catching up.
const FETCH_BATCH: u32 = 500;

pub struct WatcherDeps {
    pub record_repo: Arc<RecordRepo>,
    pub tx: broadcast::Sender<String>,
    /// Records handed to at least one open run view.
    pub records_published_total: Arc<AtomicU64>,
    pub shutdown_rx: tokio::sync::oneshot::Receiver<()>,
}

pub struct WatcherConfig {
    pub poll_interval_ms: u64,
}

pub fn spawn(deps: WatcherDeps, config: WatcherConfig) -> tokio::task::JoinHandle<()> {
    let WatcherDeps {
        record_repo,
        tx,
        records_published_total,
        mut shutdown_rx,
    } = deps;

    let watcher_span = tracing::span!(
        tracing::Level::DEBUG,
        "watcher",
        poll_interval_ms = config.poll_interval_ms
    );

    tokio::spawn(
        async move {
            let mut tick = interval(Duration::from_millis(config.poll_interval_ms));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            // Only rows written after startup are live; older ones are served by bulk fetch.
            let mut last_version = record_repo.user_version().await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, operation = "user_version", "initial version read failed");
                0
            });
            let mut last_id = record_repo.max_record_id().await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, operation = "max_record_id", "initial row id read failed");
                0
            });
            let mut last_no_receivers_log: Option<Instant> = None;

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let version = match record_repo.user_version().await {
                            Ok(v) => v,
                            Err(e) => {
                                tracing::warn!(error = %e, operation = "user_version", "version poll failed");
                                continue;
                            }
                        };
                        if version == last_version {
                            continue;
                        }
                        match publish_new_records(&record_repo, &tx, last_id, &records_published_total, &mut last_no_receivers_log).await {
                            Ok(id) => {
                                last_id = id;
                                last_version = version;
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, operation = "get_records_after", "publishing new records failed");
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Watcher shutting down");
                        break;
                    }
                }
            }
        }
        .instrument(watcher_span),
    )
}

/// Broadcasts every record with row id > `after_id`. Returns the new high-water row id.
async fn publish_new_records(
    record_repo: &RecordRepo,
    tx: &broadcast::Sender<String>,
    after_id: i64,
    records_published_total: &AtomicU64,
    last_no_receivers_log: &mut Option<Instant>,
) -> anyhow::Result<i64> {
    let mut last_id = after_id;
    loop {
        let (next_id, records) = record_repo.get_records_after(last_id, FETCH_BATCH).await?;
        if records.is_empty() {
            return Ok(last_id);
        }
        for record in &records {
            let msg = encode_record(record)?;
            if tx.send(msg).is_ok() {
                records_published_total.fetch_add(1, Ordering::Relaxed);
            } else {
                let should_log = last_no_receivers_log
                    .is_none_or(|t| t.elapsed() >= NO_RECEIVERS_LOG_INTERVAL);
                if should_log {
                    tracing::debug!(
                        operation = "broadcast_record",
                        "No open run views; live channel has no receivers"
                    );
                    *last_no_receivers_log = Some(Instant::now());
                }
            }
        }
        tracing::debug!(
            operation = "publish_new_records",
            records_count = records.len(),
            last_id = next_id,
            "Records published"
        );
        last_id = next_id;
    }
}
