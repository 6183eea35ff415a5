// Ranked match orchestration: queue searches, the match lifecycle and
// post-match rating settlement.
//
// Lock order is queue -> lobby. Settlement serialises per player with async
// locks taken in id order, so two matches sharing a player never interleave
// their career writes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::admin::Admin;
use crate::config::RankedPolicy;
use crate::db::{
    Career, Database, NewMatchResult, PatternUpdate, PlayerId, QueueRow, SettlementWrite,
    StreakType,
};
use crate::eligibility::{AccountAgeVerifier, EntryGate};
use crate::engine::{EngineError, GameEngine, Scorecard};
use crate::error::RankedError;
use crate::lobby::Lobby;
use crate::metrics;
use crate::notify::{MessageRef, Notice, Notifier, NotifyHandle, Outbox};
use crate::patterns::{PatternDetector, PatternReason, PatternVerdict, TradingVerdict};
use crate::queue::{MatchQueue, QueueEntry, QueueExit};
use crate::rating::{apply_multiplier, k_factor, rating_delta, rescale_delta, streak_bonus, Outcome};
use crate::retry::with_backoff;
use crate::tier::tier_for_rating;
use crate::trust::{pattern_multiplier, rating_multiplier_for_experience, trust_multiplier, trust_score};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Queue,
    Challenge,
}

impl MatchSource {
    pub fn label(self) -> &'static str {
        match self {
            MatchSource::Queue => "queue",
            MatchSource::Challenge => "challenge",
        }
    }
}

/// One side of a match about to be played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seat {
    pub player_id: PlayerId,
    pub notify: NotifyHandle,
}

impl From<&QueueEntry> for Seat {
    fn from(entry: &QueueEntry) -> Self {
        Seat {
            player_id: entry.player_id,
            notify: entry.notify,
        }
    }
}

/// Anti-cheat inputs for one side of a settlement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signals {
    pub trust_score: i32,
    pub suspicious: bool,
    pub win_trading: bool,
}

/// Everything that went into one player's rating change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingChange {
    pub player_id: PlayerId,
    pub before: i32,
    pub after: i32,
    /// Applied change, `after - before`.
    pub delta: i32,
    /// ELO delta rescaled to the player's own K, before bonus and multipliers.
    pub base_delta: i32,
    pub streak_bonus: i32,
    pub k_factor: i32,
    pub experience_multiplier: f64,
    /// Trust x pattern multiplier. Only applied when `enforced`.
    pub policy_multiplier: f64,
    pub enforced: bool,
    pub suspended: bool,
    pub won: bool,
    pub lost: bool,
    pub streak: i32,
    pub streak_type: StreakType,
    pub tier_before: String,
    pub tier_after: String,
}

/// Compute both players' rating changes for an outcome of (A, B).
pub fn compute_changes(
    careers: [&Career; 2],
    outcome: Outcome,
    signals: [Signals; 2],
    enforcement: bool,
) -> [RatingChange; 2] {
    let [a, b] = careers;
    let k_a = k_factor(&a.rank_tier, a.total_matches);
    let k_b = k_factor(&b.rank_tier, b.total_matches);
    let shared_k = (k_a + k_b) / 2;

    let (delta_a, delta_b) = rating_delta(a.rating, b.rating, outcome, shared_k);
    [
        side_change(
            a,
            outcome,
            rescale_delta(delta_a, k_a, shared_k),
            k_a,
            signals[0],
            enforcement,
        ),
        side_change(
            b,
            outcome.flipped(),
            rescale_delta(delta_b, k_b, shared_k),
            k_b,
            signals[1],
            enforcement,
        ),
    ]
}

/// `result` is from this player's perspective (AWins = this player won).
fn side_change(
    career: &Career,
    result: Outcome,
    base_delta: i32,
    k: i32,
    signals: Signals,
    enforcement: bool,
) -> RatingChange {
    let won = result == Outcome::AWins;
    let lost = result == Outcome::BWins;
    let (streak, streak_type) = next_streak(career, won, lost);
    let bonus = streak_bonus(streak, &career.rank_tier, won, career.total_matches);

    let experience_multiplier = rating_multiplier_for_experience(career.total_matches);
    let policy_multiplier = trust_multiplier(signals.trust_score)
        * pattern_multiplier(signals.suspicious, signals.win_trading);

    let mut delta = apply_multiplier(base_delta + bonus, experience_multiplier);
    if enforcement {
        delta = apply_multiplier(delta, policy_multiplier);
    }
    if career.rating_suspended {
        delta = 0;
    }
    let after = career.rating.saturating_add(delta);

    RatingChange {
        player_id: career.player_id,
        before: career.rating,
        after,
        delta,
        base_delta,
        streak_bonus: bonus,
        k_factor: k,
        experience_multiplier,
        policy_multiplier,
        enforced: enforcement,
        suspended: career.rating_suspended,
        won,
        lost,
        streak,
        streak_type,
        tier_before: career.rank_tier.clone(),
        tier_after: tier_for_rating(after).to_string(),
    }
}

/// Streak after this match; a draw resets it.
fn next_streak(career: &Career, won: bool, lost: bool) -> (i32, StreakType) {
    let continues = |kind: StreakType| {
        if career.streak() == kind {
            career.current_streak + 1
        } else {
            1
        }
    };
    if won {
        (continues(StreakType::Win), StreakType::Win)
    } else if lost {
        (continues(StreakType::Loss), StreakType::Loss)
    } else {
        (0, StreakType::None)
    }
}

fn settled_career(career: &Career, change: &RatingChange, trust: i32) -> Career {
    let mut next = career.clone();
    next.rating = change.after;
    next.rank_tier = change.tier_after.clone();
    next.total_matches += 1;
    if change.won {
        next.wins += 1;
    }
    if change.lost {
        next.losses += 1;
    }
    next.current_streak = change.streak;
    next.streak_type = change.streak_type.as_str().to_string();
    next.trust_score = trust;
    next.highest_rating = next.highest_rating.max(change.after);
    next
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementReport {
    pub match_id: String,
    pub result_id: i64,
    pub outcome: Outcome,
    pub winner: Option<PlayerId>,
    pub changes: [RatingChange; 2],
    pub patterns: [PatternVerdict; 2],
    pub trading: TradingVerdict,
}

impl SettlementReport {
    pub fn change_for(&self, player_id: PlayerId) -> Option<&RatingChange> {
        self.changes.iter().find(|c| c.player_id == player_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("match {0} is already settled")]
    AlreadySettled(String),
    #[error("failed to persist match {match_id}: {source}")]
    Storage {
        match_id: String,
        #[source]
        source: sqlx::Error,
    },
}

/// A played match whose rating effect has not reached storage yet.
#[derive(Debug, Clone)]
pub struct UnsettledMatch {
    pub match_id: String,
    pub source: MatchSource,
    pub scorecard: Scorecard,
    pub played_at: i64,
    pub error: String,
}

#[derive(Debug)]
pub enum MatchOutcome {
    Settled(SettlementReport),
    Abandoned(EngineError),
    Unsettled(SettlementError),
}

type LockMap = Mutex<HashMap<PlayerId, Arc<AsyncMutex<()>>>>;

/// Per-player async locks for every career write. Clones share the same
/// locks; an entry lives only while someone holds or waits for it.
#[derive(Clone, Default)]
pub struct PlayerLocks {
    locks: Arc<LockMap>,
}

impl PlayerLocks {
    fn handle(&self, player_id: PlayerId) -> Arc<AsyncMutex<()>> {
        self.locks.lock().entry(player_id).or_default().clone()
    }

    /// Lock one player's career.
    pub async fn lock_one(&self, player_id: PlayerId) -> PlayerGuard {
        let guard = self.handle(player_id).lock_owned().await;
        PlayerGuard {
            held: vec![(player_id, guard)],
            locks: self.locks.clone(),
        }
    }

    /// Lock both players, lower id first.
    pub async fn lock_pair(&self, a: PlayerId, b: PlayerId) -> PlayerGuard {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let mut held = vec![(low, self.handle(low).lock_owned().await)];
        if high != low {
            held.push((high, self.handle(high).lock_owned().await));
        }
        PlayerGuard {
            held,
            locks: self.locks.clone(),
        }
    }

    /// Players with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Held player locks. Dropping releases them and forgets entries nobody
/// else is waiting on.
pub struct PlayerGuard {
    held: Vec<(PlayerId, OwnedMutexGuard<()>)>,
    locks: Arc<LockMap>,
}

impl PlayerGuard {
    pub fn players(&self) -> Vec<PlayerId> {
        self.held.iter().map(|(id, _)| *id).collect()
    }
}

impl Drop for PlayerGuard {
    fn drop(&mut self) {
        let mut map = self.locks.lock();
        for (player_id, guard) in self.held.drain(..) {
            drop(guard);
            if map
                .get(&player_id)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                map.remove(&player_id);
            }
        }
    }
}

pub struct RankedMatchCoordinator {
    db: Arc<Database>,
    queue: MatchQueue,
    detector: PatternDetector,
    gate: EntryGate,
    engine: Arc<dyn GameEngine>,
    outbox: Outbox,
    policy: RankedPolicy,
    locks: PlayerLocks,
    unsettled: Mutex<Vec<UnsettledMatch>>,
}

impl RankedMatchCoordinator {
    pub fn new(
        db: Arc<Database>,
        engine: Arc<dyn GameEngine>,
        notifier: Arc<dyn Notifier>,
        policy: RankedPolicy,
        age_verifier: Option<Arc<dyn AccountAgeVerifier>>,
    ) -> Arc<Self> {
        let lobby = Arc::new(Lobby::new());
        Arc::new(Self {
            queue: MatchQueue::new(lobby, policy.rating_window),
            detector: PatternDetector::new(db.clone()),
            gate: EntryGate::new(&policy, age_verifier),
            outbox: Outbox::new(notifier, policy.notify_retry),
            db,
            engine,
            policy,
            locks: PlayerLocks::default(),
            unsettled: Mutex::new(Vec::new()),
        })
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn queue(&self) -> &MatchQueue {
        &self.queue
    }

    pub fn lobby(&self) -> &Arc<Lobby> {
        self.queue.lobby()
    }

    pub fn detector(&self) -> &PatternDetector {
        &self.detector
    }

    pub fn gate(&self) -> &EntryGate {
        &self.gate
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn policy(&self) -> &RankedPolicy {
        &self.policy
    }

    pub fn locks(&self) -> &PlayerLocks {
        &self.locks
    }

    /// Operator actions, serialised with settlement on the same player locks.
    pub fn admin(&self) -> Admin {
        Admin::new(self.db.clone(), self.locks.clone())
    }

    // ── Queue ─────────────────────────────────────────────────────────

    /// Put a player in the ranked queue and start their search loop.
    pub async fn join_queue(
        self: &Arc<Self>,
        player_id: PlayerId,
        notify: NotifyHandle,
    ) -> Result<QueueEntry, RankedError> {
        let now = chrono::Utc::now().timestamp();
        let career = self.db.get_or_create_career(player_id, now).await?;
        self.gate.check(&career).await?;
        if self.lobby().is_in_match(player_id) {
            return Err(RankedError::InMatch(player_id));
        }

        let tier = tier_for_rating(career.rating);
        let joined_at = Instant::now();
        if !self
            .queue
            .enqueue_at(player_id, career.rating, tier, notify, joined_at)
        {
            return Err(RankedError::AlreadyQueued(player_id));
        }
        let entry = QueueEntry {
            player_id,
            rating: career.rating,
            tier,
            joined_at,
            notify,
        };

        let row = QueueRow {
            player_id,
            rating: career.rating,
            rank_tier: tier.to_string(),
            chat_id: notify.chat_id,
            joined_at: now,
        };
        if let Err(e) = self.db.upsert_queue_entry(&row).await {
            tracing::warn!(player_id, "failed to mirror queue entry: {e}");
        }
        // Another search may have claimed us while the row was being written,
        // and its cleanup may already have run.
        if !self.queue.is_queued(player_id) {
            self.forget_queue_row(player_id).await;
        }

        tracing::info!(player_id, rating = career.rating, tier = %tier, "joined ranked queue");
        let handle = tokio::spawn(self.clone().search(entry.clone()));
        self.queue.attach_search(player_id, handle);
        Ok(entry)
    }

    /// Explicit cancel. False if the player was not queued.
    pub async fn leave_queue(&self, player_id: PlayerId) -> bool {
        let Some(entry) = self.queue.dequeue(player_id) else {
            return false;
        };
        self.forget_queue_row(player_id).await;
        tracing::info!(player_id, "left ranked queue");
        self.outbox.send(&entry.notify, &Notice::QueueCanceled).await;
        true
    }

    /// A player's search loop: try to claim an opponent, refresh the status
    /// message, and give up at the queue timeout.
    async fn search(self: Arc<Self>, entry: QueueEntry) {
        let player_id = entry.player_id;
        let timeout = self.policy.queue_timeout;
        let mut status: Option<MessageRef> = None;

        loop {
            let match_id = Uuid::new_v4().to_string();
            if let Some((me, opponent)) =
                self.queue
                    .claim_opponent(player_id, entry.rating, &match_id)
            {
                tracing::info!(
                    match_id,
                    player_id,
                    opponent = opponent.player_id,
                    "ranked opponent found"
                );
                let seats = [Seat::from(&me), Seat::from(&opponent)];
                self.run_match(match_id, MatchSource::Queue, seats).await;
                return;
            }
            if !self.queue.is_queued(player_id) {
                return;
            }

            let waited = entry.joined_at.elapsed();
            if waited >= timeout {
                if self.queue.take(player_id, QueueExit::TimedOut).is_some() {
                    self.forget_queue_row(player_id).await;
                    tracing::info!(player_id, "ranked search timed out");
                    self.outbox.send(&entry.notify, &Notice::QueueTimedOut).await;
                }
                return;
            }

            let searching = Notice::Searching {
                waited_secs: waited.as_secs(),
                timeout_secs: timeout.as_secs(),
                rating: entry.rating,
                window: self.policy.rating_window,
            };
            status = self.outbox.update(&entry.notify, status, &searching).await;
            tokio::time::sleep(self.policy.search_interval.min(timeout - waited)).await;
        }
    }

    /// Remove entries that outlived the stale age. Returns how many went.
    pub async fn sweep_stale(&self, now: Instant) -> usize {
        let evicted = self
            .queue
            .evict_expired(now, self.policy.stale_entry_age, QueueExit::Stale);
        for entry in &evicted {
            tracing::warn!(player_id = entry.player_id, "removed stale queue entry");
            self.forget_queue_row(entry.player_id).await;
            self.outbox.send(&entry.notify, &Notice::QueueTimedOut).await;
        }
        evicted.len()
    }

    pub fn spawn_stale_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.policy.stale_sweep_interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = this.sweep_stale(Instant::now()).await;
                if removed > 0 {
                    tracing::info!(removed, "stale queue sweep");
                }
            }
        })
    }

    /// Clear queue rows left behind by a previous process and tell those
    /// players their search ended.
    pub async fn recover_queue(&self) -> Result<usize, sqlx::Error> {
        let rows = self.db.drain_queue_entries().await?;
        for row in &rows {
            tracing::info!(player_id = row.player_id, "dropping queue entry from previous run");
            let notify = NotifyHandle {
                chat_id: row.chat_id,
            };
            self.outbox.send(&notify, &Notice::QueueCanceled).await;
        }
        Ok(rows.len())
    }

    async fn forget_queue_row(&self, player_id: PlayerId) {
        if let Err(e) = self.db.delete_queue_entry(player_id).await {
            tracing::warn!(player_id, "failed to delete mirrored queue entry: {e}");
        }
    }

    // ── Match lifecycle ───────────────────────────────────────────────

    /// Play a match whose seats are already reserved in the lobby, settle
    /// it, and release both players.
    pub async fn run_match(
        &self,
        match_id: String,
        source: MatchSource,
        seats: [Seat; 2],
    ) -> MatchOutcome {
        let [home, away] = seats;
        metrics::MATCHES_CREATED_TOTAL
            .with_label_values(&[source.label()])
            .inc();
        if source == MatchSource::Queue {
            self.forget_queue_row(home.player_id).await;
            self.forget_queue_row(away.player_id).await;
        }
        for (seat, other) in [(&home, &away), (&away, &home)] {
            let found = Notice::MatchFound {
                match_id: match_id.clone(),
                opponent: other.player_id,
            };
            self.outbox.send(&seat.notify, &found).await;
        }
        tracing::info!(
            match_id,
            source = source.label(),
            home = home.player_id,
            away = away.player_id,
            "match started"
        );

        let played = self
            .engine
            .play(self.policy.match_format, home.player_id, away.player_id)
            .await
            .and_then(|card| {
                let (first, second) = card.players();
                let expected = [home.player_id, away.player_id];
                if expected.contains(&first) && expected.contains(&second) && first != second {
                    Ok(card)
                } else {
                    Err(EngineError::Abandoned(format!(
                        "scorecard names players {first} and {second}"
                    )))
                }
            });

        let outcome = match played {
            Ok(card) => {
                let played_at = chrono::Utc::now().timestamp();
                match self.settle(&match_id, source, &card, played_at).await {
                    Ok(report) => MatchOutcome::Settled(report),
                    Err(e) => MatchOutcome::Unsettled(e),
                }
            }
            Err(e) => {
                tracing::warn!(match_id, "match abandoned: {e}");
                metrics::SETTLEMENTS_TOTAL
                    .with_label_values(&["abandoned"])
                    .inc();
                MatchOutcome::Abandoned(e)
            }
        };

        self.lobby().end_match(home.player_id, away.player_id);
        if source == MatchSource::Challenge {
            self.lobby()
                .set_cooldown(home.player_id, away.player_id, self.policy.challenge_cooldown);
        }

        for seat in [&home, &away] {
            let notice = match &outcome {
                MatchOutcome::Settled(report) => match report.change_for(seat.player_id) {
                    Some(change) => Notice::RatingUpdate {
                        match_id: match_id.clone(),
                        before: change.before,
                        after: change.after,
                        delta: change.delta,
                        tier: change.tier_after.clone(),
                        suspended: change.suspended,
                    },
                    None => continue,
                },
                MatchOutcome::Abandoned(_) => Notice::MatchAbandoned {
                    match_id: match_id.clone(),
                },
                MatchOutcome::Unsettled(_) => Notice::SettlementDelayed {
                    match_id: match_id.clone(),
                },
            };
            self.outbox.send(&seat.notify, &notice).await;
        }
        outcome
    }

    // ── Settlement ────────────────────────────────────────────────────

    /// Apply a finished match to both careers. Storage failures keep the
    /// match in the unsettled list for a later retry.
    pub async fn settle(
        &self,
        match_id: &str,
        source: MatchSource,
        card: &Scorecard,
        played_at: i64,
    ) -> Result<SettlementReport, SettlementError> {
        match self.try_settle(match_id, source, card, played_at).await {
            Ok(report) => {
                metrics::SETTLEMENTS_TOTAL
                    .with_label_values(&["settled"])
                    .inc();
                for change in &report.changes {
                    metrics::RATING_DELTA.observe(change.delta as f64);
                }
                Ok(report)
            }
            Err(e @ SettlementError::AlreadySettled(_)) => Err(e),
            Err(e) => {
                tracing::error!(match_id, "settlement failed, keeping match for retry: {e}");
                metrics::SETTLEMENTS_TOTAL
                    .with_label_values(&["failed"])
                    .inc();
                self.unsettled.lock().push(UnsettledMatch {
                    match_id: match_id.to_string(),
                    source,
                    scorecard: *card,
                    played_at,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn try_settle(
        &self,
        match_id: &str,
        source: MatchSource,
        card: &Scorecard,
        played_at: i64,
    ) -> Result<SettlementReport, SettlementError> {
        let (a, b) = card.players();
        let _guards = self.locks.lock_pair(a, b).await;
        let storage = |source: sqlx::Error| SettlementError::Storage {
            match_id: match_id.to_string(),
            source,
        };

        if self
            .db
            .get_match_result(match_id)
            .await
            .map_err(storage)?
            .is_some()
        {
            return Err(SettlementError::AlreadySettled(match_id.to_string()));
        }

        let career_a = self
            .db
            .get_or_create_career(a, played_at)
            .await
            .map_err(storage)?;
        let career_b = self
            .db
            .get_or_create_career(b, played_at)
            .await
            .map_err(storage)?;
        let outcome = card.outcome();

        // Anti-cheat is advisory: lookups degrade to a clean verdict.
        let patterns = [
            self.pattern_verdict(a, b, played_at).await,
            self.pattern_verdict(b, a, played_at).await,
        ];
        let trading = self.trading_verdict(a, b).await;
        self.raise_flags(match_id, a, b, &patterns, &trading, played_at).await;
        let trust = [
            self.current_trust(&career_a).await,
            self.current_trust(&career_b).await,
        ];

        let signals = [
            Signals {
                trust_score: trust[0],
                suspicious: patterns[0].suspicious,
                win_trading: trading.trading,
            },
            Signals {
                trust_score: trust[1],
                suspicious: patterns[1].suspicious,
                win_trading: trading.trading,
            },
        ];
        let changes = compute_changes(
            [&career_a, &career_b],
            outcome,
            signals,
            self.policy.enforcement_enabled,
        );
        for (change, signal) in changes.iter().zip(&signals) {
            tracing::info!(
                match_id,
                player_id = change.player_id,
                trust_score = signal.trust_score,
                suspicious = signal.suspicious,
                win_trading = signal.win_trading,
                experience_multiplier = change.experience_multiplier,
                policy_multiplier = change.policy_multiplier,
                enforced = change.enforced,
                suspended = change.suspended,
                base_delta = change.base_delta,
                streak_bonus = change.streak_bonus,
                delta = change.delta,
                "rating change"
            );
        }

        let write = SettlementWrite {
            result: NewMatchResult {
                match_id: match_id.to_string(),
                source: source.label().to_string(),
                player_a: a,
                player_b: b,
                winner: card.winner(),
                a_rating_before: changes[0].before,
                a_rating_after: changes[0].after,
                b_rating_before: changes[1].before,
                b_rating_after: changes[1].after,
                a_runs: card.first.runs,
                a_wickets: card.first.wickets,
                a_balls: card.first.balls,
                b_runs: card.second.runs,
                b_wickets: card.second.wickets,
                b_balls: card.second.balls,
                played_at,
            },
            careers: [
                settled_career(&career_a, &changes[0], trust[0]),
                settled_career(&career_b, &changes[1], trust[1]),
            ],
            patterns: [
                PatternUpdate {
                    player_id: a,
                    opponent_id: b,
                    won: changes[0].won,
                    lost: changes[0].lost,
                    flagged: patterns[0].suspicious || trading.trading,
                    played_at,
                },
                PatternUpdate {
                    player_id: b,
                    opponent_id: a,
                    won: changes[1].won,
                    lost: changes[1].lost,
                    flagged: patterns[1].suspicious || trading.trading,
                    played_at,
                },
            ],
        };

        let result_id = with_backoff(&self.policy.settle_retry, "settle match", || {
            self.db.settle_match(&write)
        })
        .await
        .map_err(storage)?;

        tracing::info!(
            match_id,
            result_id,
            winner = ?card.winner(),
            "match settled"
        );
        Ok(SettlementReport {
            match_id: match_id.to_string(),
            result_id,
            outcome,
            winner: card.winner(),
            changes,
            patterns,
            trading,
        })
    }

    async fn pattern_verdict(&self, player: PlayerId, opponent: PlayerId, now: i64) -> PatternVerdict {
        match self
            .detector
            .check_match_patterns(player, opponent, now)
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(player, opponent, "pattern check failed: {e}");
                PatternVerdict::default()
            }
        }
    }

    async fn trading_verdict(&self, a: PlayerId, b: PlayerId) -> TradingVerdict {
        match self.detector.detect_win_trading(a, b).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(a, b, "win-trading check failed: {e}");
                TradingVerdict::default()
            }
        }
    }

    /// Record this match's flags. A retried settlement finds them already
    /// stored and adds nothing.
    async fn raise_flags(
        &self,
        match_id: &str,
        a: PlayerId,
        b: PlayerId,
        patterns: &[PatternVerdict; 2],
        trading: &TradingVerdict,
        now: i64,
    ) {
        let mut flags = Vec::new();
        for (player, opponent, verdict) in [(a, b, &patterns[0]), (b, a, &patterns[1])] {
            if let Some(reason) = verdict.reason {
                flags.push(reason.flag(match_id, player, opponent, verdict.evidence.clone()));
            }
            if trading.trading {
                flags.push(PatternReason::WinTrading.flag(
                    match_id,
                    player,
                    opponent,
                    trading.detail.clone(),
                ));
            }
        }

        for flag in &flags {
            match self.db.insert_flag(flag, now).await {
                Ok(Some(flag_id)) => {
                    metrics::ANTICHEAT_FLAGS_TOTAL
                        .with_label_values(&[flag.activity_type.as_str()])
                        .inc();
                    tracing::warn!(
                        flag_id,
                        match_id,
                        user_id = flag.user_id,
                        opponent_id = ?flag.opponent_id,
                        kind = %flag.activity_type,
                        "suspicious activity: {}",
                        flag.details
                    );
                }
                Ok(None) => tracing::debug!(
                    match_id,
                    user_id = flag.user_id,
                    kind = %flag.activity_type,
                    "flag already recorded for this match"
                ),
                Err(e) => tracing::warn!(
                    user_id = flag.user_id,
                    "failed to record suspicious activity: {e}"
                ),
            }
        }
    }

    async fn current_trust(&self, career: &Career) -> i32 {
        match self.db.trust_stats(career.player_id).await {
            Ok(stats) => trust_score(&stats),
            Err(e) => {
                tracing::warn!(player_id = career.player_id, "trust lookup failed: {e}");
                career.trust_score
            }
        }
    }

    /// Matches played but not yet persisted.
    pub fn unsettled(&self) -> Vec<UnsettledMatch> {
        self.unsettled.lock().clone()
    }

    /// Retry every unsettled match. Returns how many are now settled.
    pub async fn retry_unsettled(&self) -> usize {
        let pending = std::mem::take(&mut *self.unsettled.lock());
        let mut settled = 0;
        for m in pending {
            match self
                .settle(&m.match_id, m.source, &m.scorecard, m.played_at)
                .await
            {
                Ok(_) | Err(SettlementError::AlreadySettled(_)) => settled += 1,
                Err(_) => {}
            }
        }
        settled
    }
}
