// Who is currently playing, and which pairs are cooling down after a challenge.
//
// Lock order across the crate is queue -> lobby; nothing here ever calls back
// into the queue.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::db::PlayerId;
use crate::metrics;

#[derive(Debug, Default)]
struct LobbyState {
    /// player -> match id
    in_match: HashMap<PlayerId, String>,
    /// (from, to) -> cooldown deadline
    cooldowns: HashMap<(PlayerId, PlayerId), Instant>,
}

#[derive(Debug, Default)]
pub struct Lobby {
    inner: Mutex<LobbyState>,
}

impl Lobby {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_match(&self, player: PlayerId) -> bool {
        self.inner.lock().in_match.contains_key(&player)
    }

    pub fn match_of(&self, player: PlayerId) -> Option<String> {
        self.inner.lock().in_match.get(&player).cloned()
    }

    /// Reserve both players for a match. Fails without side effects if
    /// either one is already playing.
    pub fn try_begin_match(&self, a: PlayerId, b: PlayerId, match_id: &str) -> bool {
        if a == b {
            return false;
        }
        let mut state = self.inner.lock();
        if state.in_match.contains_key(&a) || state.in_match.contains_key(&b) {
            return false;
        }
        state.in_match.insert(a, match_id.to_string());
        state.in_match.insert(b, match_id.to_string());
        metrics::ACTIVE_MATCHES.set((state.in_match.len() / 2) as i64);
        true
    }

    /// Release both players of a finished (or abandoned) match.
    pub fn end_match(&self, a: PlayerId, b: PlayerId) {
        let mut state = self.inner.lock();
        state.in_match.remove(&a);
        state.in_match.remove(&b);
        metrics::ACTIVE_MATCHES.set((state.in_match.len() / 2) as i64);
    }

    pub fn active_matches(&self) -> usize {
        self.inner.lock().in_match.len() / 2
    }

    pub fn set_cooldown(&self, from: PlayerId, to: PlayerId, duration: Duration) {
        let mut state = self.inner.lock();
        state.cooldowns.insert((from, to), Instant::now() + duration);
    }

    /// Whether a cooldown row exists in either direction.
    pub fn in_cooldown(&self, a: PlayerId, b: PlayerId) -> bool {
        self.in_cooldown_at(a, b, Instant::now())
    }

    pub fn in_cooldown_at(&self, a: PlayerId, b: PlayerId, now: Instant) -> bool {
        let mut state = self.inner.lock();
        state.cooldowns.retain(|_, deadline| *deadline > now);
        state.cooldowns.contains_key(&(a, b)) || state.cooldowns.contains_key(&(b, a))
    }
}
