// Stream dispatcher: reads raw live-channel messages, decodes them, keeps only the observed
// run's records, and folds them into the consumer's RunAggregate.
// Reconnection is a state machine published on a watch channel; the aggregate never sees it.

pub mod channel;
pub mod decode;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregation::{AggregationError, FoldOutcome};
use crate::models::{MetricRecord, RunAggregate};

pub use channel::{BroadcastChannel, ConnectionState, LiveChannel, TransportError};
pub use decode::{DecodeError, decode_message};

/// Backoff between reconnection attempts. Delay doubles from `initial` up to `max`.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// Consecutive failed connection attempts before giving up; None retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Counters for the observability side: what was received, dropped, or filtered.
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub received: AtomicU64,
    pub decode_errors: AtomicU64,
    pub foreign_run: AtomicU64,
    pub duplicates: AtomicU64,
    pub applied: AtomicU64,
    pub reconnects: AtomicU64,
}

/// What `apply` did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied,
    Duplicate,
}

pub struct Dispatcher<C> {
    channel: C,
    run_id: String,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
    stats: Arc<DispatchStats>,
    ever_connected: bool,
    failed_attempts: u32,
    retry_at: Option<Instant>,
    gave_up: bool,
}

impl<C: LiveChannel> Dispatcher<C> {
    /// Dispatcher for one observed run. Starts disconnected; `connect` or the first
    /// `next_record` establishes the channel.
    pub fn new(channel: C, run_id: impl Into<String>, policy: ReconnectPolicy) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            channel,
            run_id: run_id.into(),
            policy,
            state_tx,
            stats: Arc::new(DispatchStats::default()),
            ever_connected: false,
            failed_attempts: 0,
            retry_at: None,
            gave_up: false,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Receiver for connection state changes (for a connectivity indicator).
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }

    /// Connects, retrying per the policy. Returns false once the policy has given up.
    pub async fn connect(&mut self) -> bool {
        loop {
            match self.connect_once().await {
                Ok(()) => return true,
                Err(_) if self.gave_up => return false,
                Err(_) => {}
            }
        }
    }

    /// One connection attempt, after waiting out any pending backoff. A failure schedules
    /// the next attempt or, past `max_attempts`, abandons the channel for good.
    ///
    /// Retry state lives on the dispatcher, so dropping this future mid-backoff (e.g. from
    /// a `select!`) neither resets the backoff nor forgets failed attempts.
    pub async fn connect_once(&mut self) -> Result<(), TransportError> {
        if self.gave_up {
            return Err(TransportError::Closed);
        }
        if let Some(at) = self.retry_at {
            tokio::time::sleep_until(at).await;
            self.retry_at = None;
        }
        if self.failed_attempts > 0 || self.ever_connected {
            self.set_state(ConnectionState::Reconnecting);
        }
        match self.channel.connect().await {
            Ok(()) => {
                if self.ever_connected {
                    self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
                }
                self.ever_connected = true;
                self.failed_attempts = 0;
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.failed_attempts += 1;
                if self
                    .policy
                    .max_attempts
                    .is_some_and(|max| self.failed_attempts >= max)
                {
                    warn!(run_id = %self.run_id, error = %e, attempts = self.failed_attempts, "live channel: giving up");
                    self.gave_up = true;
                    self.set_state(ConnectionState::Disconnected);
                    return Err(e);
                }
                let delay = self.policy.delay(self.failed_attempts - 1);
                debug!(run_id = %self.run_id, error = %e, delay_ms = delay.as_millis() as u64, "live channel: connect failed, retrying");
                self.retry_at = Some(Instant::now() + delay);
                Err(e)
            }
        }
    }

    /// Next record for the observed run. Malformed messages and other runs' records are
    /// dropped; transport failures trigger reconnection. None once reconnection is abandoned.
    pub async fn next_record(&mut self) -> Option<MetricRecord> {
        loop {
            if self.state() != ConnectionState::Connected && !self.connect().await {
                return None;
            }
            let payload = match self.channel.recv().await {
                Ok(p) => p,
                Err(e) => {
                    info!(run_id = %self.run_id, error = %e, "live channel disconnected");
                    self.set_state(ConnectionState::Disconnected);
                    continue;
                }
            };
            self.stats.received.fetch_add(1, Ordering::Relaxed);
            match decode_message(&payload) {
                Ok(record) if record.run_id == self.run_id => return Some(record),
                Ok(_) => {
                    self.stats.foreign_run.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        run_id = %self.run_id,
                        error = %e,
                        operation = "decode_message",
                        "dropping malformed live message"
                    );
                }
            }
        }
    }

    /// Folds `record` into `aggregate`. Routing errors are contract violations and are returned.
    pub fn apply(
        &self,
        aggregate: &mut RunAggregate,
        record: MetricRecord,
    ) -> Result<DispatchOutcome, AggregationError> {
        match aggregate.fold(record)? {
            FoldOutcome::Applied => {
                self.stats.applied.fetch_add(1, Ordering::Relaxed);
                Ok(DispatchOutcome::Applied)
            }
            FoldOutcome::Duplicate => {
                self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
                Ok(DispatchOutcome::Duplicate)
            }
        }
    }

    /// Pulls the next routed record and folds it. None when the stream has ended.
    /// On `Applied` the record is `aggregate.records().last()`.
    pub async fn dispatch_next(
        &mut self,
        aggregate: &mut RunAggregate,
    ) -> Option<Result<DispatchOutcome, AggregationError>> {
        let record = self.next_record().await?;
        Some(self.apply(aggregate, record))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }
}
