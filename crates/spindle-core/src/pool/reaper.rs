//! Reaper - 投入されたスレッドを投入順に join する
//!
//! # フロー
//! 1. キューが空で shutdown 未要求なら待機（submit / shutdown で起床）
//! 2. 先頭の handle をロック外で join し、その後 pop
//! 3. キューが空かつ shutdown 要求済みになったら終了

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::record::ReapRecord;
use super::thread_pool::Shared;
use crate::error::panic_message;

pub(crate) fn run(shared: Arc<Shared>) {
    debug!("reaper started");
    let mut state = shared.lock();
    loop {
        while state.pending.is_empty() && !state.shutdown_requested {
            state = shared.wait_for_work(state);
        }
        if state.pending.is_empty() {
            // Shutdown requested and nothing left to join.
            break;
        }

        let Some(front) = state.pending.front_mut() else {
            continue;
        };
        let id = front.id;
        let handle = front.handle.take();
        drop(state);

        // Never join while holding the lock: submit() must stay non-blocking.
        let panic = match handle.map(|h| h.join()) {
            Some(Err(payload)) => Some(panic_message(&*payload)),
            _ => None,
        };

        state = shared.lock();
        let entry = match state.pending.pop_front() {
            Some(entry) if entry.id == id => entry,
            other => {
                let found = other.map(|e| e.id);
                error!(expected = %id, ?found, "pending queue front changed under the reaper");
                panic!("reaper invariant violated: expected {id} at queue front, found {found:?}");
            }
        };

        if let Some(message) = &panic {
            warn!(id = %entry.id, thread = %entry.name, panic = %message, "submitted thread panicked");
            state.panicked += 1;
        }
        state.joined += 1;
        state.record(ReapRecord {
            id: entry.id,
            name: entry.name,
            submitted_at: entry.submitted_at,
            joined_at: Utc::now(),
            panicked: panic.is_some(),
        });
        debug!(id = %entry.id, remaining = state.pending.len(), "joined submitted thread");
        shared.notify_progress();
    }

    state.reaper_finished = true;
    drop(state);
    shared.notify_progress();
    info!("reaper finished: all submitted threads joined");
}
