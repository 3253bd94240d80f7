//! Timer-driven room work: the deferred ready -> started transition, the
//! question auto-close, and the idle-room reaper.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use quizhub_core::time::now_millis;

use crate::config::RoomsConfig;
use crate::dispatch;
use crate::hub::{Hub, SharedRoom};

/// After `delay`, move the room to `Started` if `epoch` is still current.
///
/// A later `host_set_state` bumps the epoch, so a superseded timer does
/// nothing. A timer for a room that has since been reaped does nothing
/// either.
pub fn schedule_start(
    hub: Arc<Hub>,
    room: SharedRoom,
    code: String,
    epoch: u64,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if !hub.is_live(&code, &room).await {
            tracing::debug!(room = %code, "Ready timer fired for a removed room");
            return;
        }
        let mut guard = room.write().await;
        if !guard.complete_ready(epoch) {
            tracing::debug!(room = %code, epoch, "Superseded ready timer skipped");
            return;
        }
        tracing::info!(room = %code, "Room started");
        dispatch::broadcast_state(&hub, &guard).await;
    })
}

/// After `after`, close the question window opened at `epoch`.
pub fn schedule_question_close(
    hub: Arc<Hub>,
    room: SharedRoom,
    code: String,
    epoch: u64,
    after: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        if !hub.is_live(&code, &room).await {
            return;
        }
        let mut guard = room.write().await;
        if !guard.expire_question(epoch) {
            tracing::debug!(room = %code, epoch, "Stale question timer skipped");
            return;
        }
        tracing::info!(room = %code, "Question closed by timer");
        dispatch::broadcast_question_closed(&hub, &guard).await;
    })
}

/// Periodically remove rooms with no activity for `idle_timeout_secs`.
pub fn spawn_reaper(hub: Arc<Hub>, cfg: RoomsConfig, cancel: CancellationToken) -> JoinHandle<()> {
    let period = Duration::from_secs(cfg.idle_check_interval_secs);
    let max_idle_ms = i64::try_from(cfg.idle_timeout_secs.saturating_mul(1000)).unwrap_or(i64::MAX);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = hub.reap_idle_rooms(now_millis(), max_idle_ms).await;
                    tracing::debug!(removed = removed.len(), "Idle room sweep finished");
                },
            }
        }
        tracing::info!("Room reaper stopped");
    })
}
