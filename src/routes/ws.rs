// WebSocket live run view: one task per socket owns the run's aggregate.
// Connect: subscribe to the live channel, then batch-load history (live records that also landed
// in the batch are dropped as duplicates), send a snapshot, then one update per accepted record.

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::time::{Duration, timeout};

use super::AppState;
use crate::dispatcher::{
    BroadcastChannel, ConnectionState, DispatchOutcome, Dispatcher, LiveChannel,
};
use crate::models::{MetricRecord, RunAggregate, RunSummary};

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Messages sent to a live run view.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RunStreamMessage<'a> {
    /// Full aggregate, sent once after the batch load.
    Snapshot { aggregate: &'a RunAggregate },
    /// One accepted live record and the aggregate's new scalar figures.
    Update {
        record: &'a MetricRecord,
        summary: RunSummary,
    },
    /// Live channel connectivity; the last aggregate stays valid while degraded.
    Connection { state: ConnectionState },
    Error { message: String },
}

/// Decrements the run-view connection count on drop (connect = +1, drop = -1).
struct WsRunGuard(Arc<AtomicUsize>);

impl Drop for WsRunGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
    }
}

pub(super) async fn ws_run(
    ws: WebSocketUpgrade,
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let conn_count = state.ws_run_connections.clone();
    let dispatcher = Dispatcher::new(
        BroadcastChannel::from_weak(state.live_tx.clone()),
        &run_id,
        state.config.channel.reconnect_policy(),
    );
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = stream_run(socket, state, dispatcher, conn_count).await {
            tracing::error!(run_id = %run_id, error = %e, "Run stream error");
        }
    })
}

async fn stream_run<C: LiveChannel>(
    mut socket: WebSocket,
    state: AppState,
    mut dispatcher: Dispatcher<C>,
    conn_count: Arc<AtomicUsize>,
) -> anyhow::Result<()> {
    conn_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let _guard = WsRunGuard(conn_count);
    let run_id = dispatcher.run_id().to_string();
    tracing::info!(run_id = %run_id, "Client connected to run stream");

    // Single attempt: a dead channel must not hold back the snapshot. Retries run in the loop.
    if let Err(e) = dispatcher.connect_once().await {
        tracing::warn!(run_id = %run_id, error = %e, "live channel unavailable at connect");
    }

    let mut aggregate = match super::http::load_aggregate(&state, &run_id).await {
        Ok(agg) => agg,
        Err(e) => {
            let msg = RunStreamMessage::Error {
                message: e.to_string(),
            };
            send_json(&mut socket, &msg).await?;
            return Err(e);
        }
    };
    if !send_json(&mut socket, &RunStreamMessage::Snapshot { aggregate: &aggregate }).await? {
        return Ok(());
    }

    let mut state_rx = dispatcher.subscribe_state();
    state_rx.mark_unchanged();
    // First ping one interval after the snapshot.
    let mut ping_interval =
        tokio::time::interval_at(tokio::time::Instant::now() + WS_PING_INTERVAL, WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            outcome = dispatcher.dispatch_next(&mut aggregate) => {
                match outcome {
                    Some(Ok(DispatchOutcome::Applied)) => {
                        let Some(record) = aggregate.records().last() else {
                            continue;
                        };
                        let msg = RunStreamMessage::Update {
                            record,
                            summary: aggregate.summary(),
                        };
                        if !send_json(&mut socket, &msg).await? {
                            break;
                        }
                    }
                    Some(Ok(DispatchOutcome::Duplicate)) => {}
                    Some(Err(e)) => {
                        let msg = RunStreamMessage::Error { message: e.to_string() };
                        let _ = send_json(&mut socket, &msg).await;
                        return Err(e.into());
                    }
                    None => {
                        let msg = RunStreamMessage::Connection { state: ConnectionState::Disconnected };
                        let _ = send_json(&mut socket, &msg).await;
                        break;
                    }
                }
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state_rx.borrow_and_update();
                if !send_json(&mut socket, &RunStreamMessage::Connection { state: current }).await? {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
            _ = ping_interval.tick() => {
                let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Ping(Bytes::new()))).await;
                if r.is_err() || r.unwrap_or(Ok(())).is_err() {
                    break;
                }
            }
        }
    }

    let stats = dispatcher.stats();
    tracing::info!(
        run_id = %run_id,
        applied = stats.applied.load(std::sync::atomic::Ordering::Relaxed),
        duplicates = stats.duplicates.load(std::sync::atomic::Ordering::Relaxed),
        decode_errors = stats.decode_errors.load(std::sync::atomic::Ordering::Relaxed),
        "Client disconnected from run stream"
    );
    Ok(())
}

/// Sends one JSON text frame. Ok(false) when the client is gone or too slow.
async fn send_json<T: Serialize>(socket: &mut WebSocket, msg: &T) -> anyhow::Result<bool> {
    let json = serde_json::to_string(msg)?;
    let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Text(json.into()))).await;
    Ok(!(r.is_err() || r.unwrap_or(Ok(())).is_err()))
}
