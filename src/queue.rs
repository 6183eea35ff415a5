// Ranked matchmaking queue: players waiting for an opponent.
//
// Opponents are picked strictly first-come-first-served among eligible
// candidates, not by closest rating. `claim_opponent` does the scan, removes
// both entries and reserves both players in the lobby under one lock, so a
// waiting player can never be handed to two seekers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::db::PlayerId;
use crate::lobby::Lobby;
use crate::metrics;
use crate::notify::NotifyHandle;
use crate::tier::Tier;

/// A player waiting in the ranked queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub player_id: PlayerId,
    pub rating: i32,
    pub tier: Tier,
    pub joined_at: Instant,
    pub notify: NotifyHandle,
}

/// Why an entry left the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueExit {
    Matched,
    Canceled,
    TimedOut,
    Stale,
}

impl QueueExit {
    pub fn label(self) -> &'static str {
        match self {
            QueueExit::Matched => "matched",
            QueueExit::Canceled => "canceled",
            QueueExit::TimedOut => "timed_out",
            QueueExit::Stale => "stale",
        }
    }
}

/// Status of the ranked queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub depth: usize,
    pub oldest_wait_seconds: u64,
}

#[derive(Debug)]
struct Slot {
    entry: QueueEntry,
    /// The player's search loop, aborted on explicit cancel.
    search: Option<JoinHandle<()>>,
}

/// Thread-safe ranked queue.
#[derive(Debug, Clone)]
pub struct MatchQueue {
    inner: Arc<Mutex<HashMap<PlayerId, Slot>>>,
    lobby: Arc<Lobby>,
    rating_window: i32,
}

impl MatchQueue {
    pub fn new(lobby: Arc<Lobby>, rating_window: i32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            lobby,
            rating_window,
        }
    }

    pub fn lobby(&self) -> &Arc<Lobby> {
        &self.lobby
    }

    pub fn rating_window(&self) -> i32 {
        self.rating_window
    }

    /// Add a player now. False (and no change) if already queued or playing.
    pub fn enqueue(&self, player_id: PlayerId, rating: i32, tier: Tier, notify: NotifyHandle) -> bool {
        self.enqueue_at(player_id, rating, tier, notify, Instant::now())
    }

    pub fn enqueue_at(
        &self,
        player_id: PlayerId,
        rating: i32,
        tier: Tier,
        notify: NotifyHandle,
        joined_at: Instant,
    ) -> bool {
        let mut slots = self.inner.lock();
        if slots.contains_key(&player_id) || self.lobby.is_in_match(player_id) {
            return false;
        }
        slots.insert(
            player_id,
            Slot {
                entry: QueueEntry {
                    player_id,
                    rating,
                    tier,
                    joined_at,
                    notify,
                },
                search: None,
            },
        );
        metrics::RANKED_QUEUE_DEPTH.set(slots.len() as i64);
        true
    }

    /// Remember the player's search loop so a cancel can stop it. If the
    /// entry is already gone the handle is simply detached.
    pub fn attach_search(&self, player_id: PlayerId, handle: JoinHandle<()>) {
        let mut slots = self.inner.lock();
        if let Some(slot) = slots.get_mut(&player_id) {
            slot.search = Some(handle);
        }
    }

    pub fn is_queued(&self, player_id: PlayerId) -> bool {
        self.inner.lock().contains_key(&player_id)
    }

    pub fn entry(&self, player_id: PlayerId) -> Option<QueueEntry> {
        self.inner.lock().get(&player_id).map(|s| s.entry.clone())
    }

    pub fn depth(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn status(&self) -> QueueStatus {
        let slots = self.inner.lock();
        let now = Instant::now();
        let oldest_wait_seconds = slots
            .values()
            .map(|s| now.saturating_duration_since(s.entry.joined_at).as_secs())
            .max()
            .unwrap_or(0);
        QueueStatus {
            depth: slots.len(),
            oldest_wait_seconds,
        }
    }

    /// First eligible opponent in join order, without claiming it.
    pub fn find_opponent(&self, player_id: PlayerId, rating: i32) -> Option<QueueEntry> {
        let slots = self.inner.lock();
        self.first_eligible(&slots, player_id, rating, |_| true)
            .cloned()
    }

    /// Find, remove and reserve an opponent for a queued seeker in one step.
    /// Returns (seeker, opponent). The seeker's own search handle is detached
    /// (the caller is normally that search loop); the opponent's is aborted.
    pub fn claim_opponent(
        &self,
        player_id: PlayerId,
        rating: i32,
        match_id: &str,
    ) -> Option<(QueueEntry, QueueEntry)> {
        let mut slots = self.inner.lock();
        if !slots.contains_key(&player_id) {
            return None;
        }

        let lobby = &self.lobby;
        let opponent_id = self
            .first_eligible(&slots, player_id, rating, |candidate| {
                lobby.try_begin_match(player_id, candidate.player_id, match_id)
            })?
            .player_id;

        let seeker = slots.remove(&player_id)?;
        let opponent = slots.remove(&opponent_id)?;
        if let Some(handle) = opponent.search {
            handle.abort();
        }
        metrics::RANKED_QUEUE_DEPTH.set(slots.len() as i64);
        metrics::QUEUE_EXITS_TOTAL
            .with_label_values(&[QueueExit::Matched.label()])
            .inc_by(2);
        Some((seeker.entry, opponent.entry))
    }

    /// FIFO scan. `accept` is the last check and may have side effects; it is
    /// only called for candidates that passed every other rule.
    fn first_eligible<'a>(
        &self,
        slots: &'a HashMap<PlayerId, Slot>,
        player_id: PlayerId,
        rating: i32,
        mut accept: impl FnMut(&QueueEntry) -> bool,
    ) -> Option<&'a QueueEntry> {
        let mut waiting: Vec<&QueueEntry> = slots.values().map(|s| &s.entry).collect();
        waiting.sort_by_key(|e| (e.joined_at, e.player_id));

        let low = rating.saturating_sub(self.rating_window);
        let high = rating.saturating_add(self.rating_window);

        waiting.into_iter().find(|candidate| {
            candidate.player_id != player_id
                && !self.lobby.is_in_match(candidate.player_id)
                && !self.lobby.in_cooldown(player_id, candidate.player_id)
                && (low..=high).contains(&candidate.rating)
                && accept(*candidate)
        })
    }

    /// Explicit cancel. Idempotent; stops the player's search loop.
    pub fn dequeue(&self, player_id: PlayerId) -> Option<QueueEntry> {
        let slot = self.remove_slot(player_id, QueueExit::Canceled)?;
        if let Some(handle) = slot.search {
            handle.abort();
        }
        Some(slot.entry)
    }

    /// Removal from inside the player's own search loop (timeout). The loop
    /// handle is detached rather than aborted.
    pub fn take(&self, player_id: PlayerId, reason: QueueExit) -> Option<QueueEntry> {
        self.remove_slot(player_id, reason).map(|slot| slot.entry)
    }

    fn remove_slot(&self, player_id: PlayerId, reason: QueueExit) -> Option<Slot> {
        let mut slots = self.inner.lock();
        let slot = slots.remove(&player_id)?;
        metrics::RANKED_QUEUE_DEPTH.set(slots.len() as i64);
        metrics::QUEUE_EXITS_TOTAL
            .with_label_values(&[reason.label()])
            .inc();
        Some(slot)
    }

    /// Evict every entry that has waited at least `max_age` as of `now`,
    /// aborting their search loops. Used by the stale sweep.
    pub fn evict_expired(&self, now: Instant, max_age: Duration, reason: QueueExit) -> Vec<QueueEntry> {
        let mut slots = self.inner.lock();
        let expired: Vec<PlayerId> = slots
            .values()
            .filter(|s| now.saturating_duration_since(s.entry.joined_at) >= max_age)
            .map(|s| s.entry.player_id)
            .collect();

        let mut evicted = Vec::with_capacity(expired.len());
        for player_id in expired {
            if let Some(slot) = slots.remove(&player_id) {
                if let Some(handle) = slot.search {
                    handle.abort();
                }
                evicted.push(slot.entry);
            }
        }
        evicted.sort_by_key(|e| e.joined_at);

        metrics::RANKED_QUEUE_DEPTH.set(slots.len() as i64);
        if !evicted.is_empty() {
            metrics::QUEUE_EXITS_TOTAL
                .with_label_values(&[reason.label()])
                .inc_by(evicted.len() as u64);
        }
        evicted
    }
}
