// Direct challenges between two players, outside the queue.
//
// A challenge leaves `pending` exactly once. Every transition is a
// compare-and-swap on the in-memory book, mirrored by a conditional update
// of the stored row. Once mirrored, a finished challenge is dropped from
// memory and later lookups read its status from storage.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::coordinator::{MatchOutcome, MatchSource, RankedMatchCoordinator, Seat};
use crate::db::{ChallengeRow, PlayerId};
use crate::eligibility::EntryDenied;
use crate::metrics;
use crate::notify::{Notice, NotifyHandle};
use crate::tier::tier_distance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
    Canceled,
}

impl ChallengeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChallengeStatus::Pending => "pending",
            ChallengeStatus::Accepted => "accepted",
            ChallengeStatus::Declined => "declined",
            ChallengeStatus::Expired => "expired",
            ChallengeStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<ChallengeStatus> {
        match s {
            "pending" => Some(ChallengeStatus::Pending),
            "accepted" => Some(ChallengeStatus::Accepted),
            "declined" => Some(ChallengeStatus::Declined),
            "expired" => Some(ChallengeStatus::Expired),
            "canceled" => Some(ChallengeStatus::Canceled),
            _ => None,
        }
    }
}

/// A player taking part in a challenge, as seen by the chat front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant {
    pub player_id: PlayerId,
    /// Bots and other non-human accounts cannot be challenged.
    pub is_service: bool,
    pub notify: NotifyHandle,
}

impl Participant {
    pub fn human(player_id: PlayerId, notify: NotifyHandle) -> Self {
        Self {
            player_id,
            is_service: false,
            notify,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingChallenge {
    pub challenge_id: String,
    pub challenger_id: PlayerId,
    pub target_id: PlayerId,
    pub challenger_rating: i32,
    pub challenger_tier: String,
    pub target_rating: i32,
    pub target_tier: String,
    pub status: ChallengeStatus,
    pub created_at: i64,
    pub expires_at: i64,
    pub challenger_notify: NotifyHandle,
    pub target_notify: NotifyHandle,
}

impl PendingChallenge {
    fn row(&self) -> ChallengeRow {
        ChallengeRow {
            challenge_id: self.challenge_id.clone(),
            challenger_id: self.challenger_id,
            target_id: self.target_id,
            challenger_rating: self.challenger_rating,
            challenger_tier: self.challenger_tier.clone(),
            target_rating: self.target_rating,
            target_tier: self.target_tier.clone(),
            status: self.status.as_str().to_string(),
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }

    fn seats(&self) -> [Seat; 2] {
        [
            Seat {
                player_id: self.challenger_id,
                notify: self.challenger_notify,
            },
            Seat {
                player_id: self.target_id,
                notify: self.target_notify,
            },
        ]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    #[error("you cannot challenge yourself")]
    SelfChallenge,
    #[error("service accounts cannot be challenged")]
    ServiceAccount,
    #[error("player {0} has no ranked career")]
    NoCareer(PlayerId),
    #[error(transparent)]
    Denied(#[from] EntryDenied),
    #[error("rank tiers are {distance} apart (max {max})")]
    TierTooFar { distance: usize, max: usize },
    #[error("player {0} is busy")]
    Busy(PlayerId),
    #[error("this pair is on cooldown")]
    Cooldown,
    #[error("{matches} matches between this pair in the last 24h")]
    TooFrequent { matches: i64 },
    #[error("challenge {0} not found")]
    NotFound(String),
    #[error("challenge is already {}", .0.as_str())]
    NotPending(ChallengeStatus),
    #[error("player {0} cannot act on this challenge")]
    NotParticipant(PlayerId),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// In-memory record of live challenges.
#[derive(Debug, Default)]
pub struct ChallengeBook {
    inner: Mutex<HashMap<String, PendingChallenge>>,
}

impl ChallengeBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, challenge: PendingChallenge) {
        self.inner
            .lock()
            .insert(challenge.challenge_id.clone(), challenge);
    }

    pub fn get(&self, challenge_id: &str) -> Option<PendingChallenge> {
        self.inner.lock().get(challenge_id).cloned()
    }

    pub fn remove(&self, challenge_id: &str) -> Option<PendingChallenge> {
        self.inner.lock().remove(challenge_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Move a pending challenge to `to`. Fails with the current status if it
    /// already left `pending`.
    pub fn transition(
        &self,
        challenge_id: &str,
        to: ChallengeStatus,
    ) -> Result<PendingChallenge, ChallengeError> {
        let mut book = self.inner.lock();
        let challenge = book
            .get_mut(challenge_id)
            .ok_or_else(|| ChallengeError::NotFound(challenge_id.to_string()))?;
        if challenge.status != ChallengeStatus::Pending {
            return Err(ChallengeError::NotPending(challenge.status));
        }
        challenge.status = to;
        Ok(challenge.clone())
    }

    pub fn pending_for(&self, player_id: PlayerId) -> Vec<PendingChallenge> {
        self.inner
            .lock()
            .values()
            .filter(|c| c.status == ChallengeStatus::Pending)
            .filter(|c| c.challenger_id == player_id || c.target_id == player_id)
            .cloned()
            .collect()
    }
}

pub struct ChallengeCoordinator {
    ranked: Arc<RankedMatchCoordinator>,
    book: ChallengeBook,
}

impl ChallengeCoordinator {
    pub fn new(ranked: Arc<RankedMatchCoordinator>) -> Arc<Self> {
        Arc::new(Self {
            ranked,
            book: ChallengeBook::new(),
        })
    }

    pub fn book(&self) -> &ChallengeBook {
        &self.book
    }

    /// Expire stored challenges left pending by a previous process. The
    /// in-memory book starts empty, so none of them can be answered.
    pub async fn recover(&self) -> Result<u64, sqlx::Error> {
        let ttl = self.ranked.policy().challenge_ttl.as_secs() as i64;
        let horizon = chrono::Utc::now().timestamp() + ttl;
        let expired = self.ranked.db().expire_stale_challenges(horizon).await?;
        if expired > 0 {
            tracing::info!(expired, "expired challenges from previous run");
        }
        Ok(expired)
    }

    /// Validate and create a challenge, then schedule its expiry.
    pub async fn issue(
        self: &Arc<Self>,
        challenger: Participant,
        target: Participant,
    ) -> Result<PendingChallenge, ChallengeError> {
        if challenger.player_id == target.player_id {
            return Err(ChallengeError::SelfChallenge);
        }
        if target.is_service {
            return Err(ChallengeError::ServiceAccount);
        }

        let policy = self.ranked.policy();
        let db = self.ranked.db();
        let now = chrono::Utc::now().timestamp();

        let challenger_career = db.get_or_create_career(challenger.player_id, now).await?;
        let target_career = db
            .get_career(target.player_id)
            .await?
            .ok_or(ChallengeError::NoCareer(target.player_id))?;

        self.ranked.gate().check(&challenger_career).await?;

        let distance = tier_distance(&challenger_career.rank_tier, &target_career.rank_tier);
        if distance > policy.max_tier_distance {
            return Err(ChallengeError::TierTooFar {
                distance,
                max: policy.max_tier_distance,
            });
        }

        for player_id in [challenger.player_id, target.player_id] {
            if self.is_busy(player_id) {
                return Err(ChallengeError::Busy(player_id));
            }
        }
        if self
            .ranked
            .lobby()
            .in_cooldown(challenger.player_id, target.player_id)
        {
            return Err(ChallengeError::Cooldown);
        }

        let matches = self
            .ranked
            .detector()
            .recent_pair_matches(challenger.player_id, target.player_id, now)
            .await?;
        if matches >= policy.max_pair_matches_per_day {
            return Err(ChallengeError::TooFrequent { matches });
        }

        let ttl = policy.challenge_ttl;
        let challenge = PendingChallenge {
            challenge_id: Uuid::new_v4().to_string(),
            challenger_id: challenger.player_id,
            target_id: target.player_id,
            challenger_rating: challenger_career.rating,
            challenger_tier: challenger_career.rank_tier.clone(),
            target_rating: target_career.rating,
            target_tier: target_career.rank_tier.clone(),
            status: ChallengeStatus::Pending,
            created_at: now,
            expires_at: now + ttl.as_secs() as i64,
            challenger_notify: challenger.notify,
            target_notify: target.notify,
        };
        self.book.insert(challenge.clone());
        if let Err(e) = db.insert_challenge(&challenge.row()).await {
            tracing::warn!(challenge_id = %challenge.challenge_id, "failed to mirror challenge: {e}");
        }
        metrics::CHALLENGES_TOTAL.with_label_values(&["issued"]).inc();
        tracing::info!(
            challenge_id = %challenge.challenge_id,
            challenger = challenge.challenger_id,
            target = challenge.target_id,
            "challenge issued"
        );

        let received = Notice::ChallengeReceived {
            challenge_id: challenge.challenge_id.clone(),
            challenger: challenge.challenger_id,
            expires_in_secs: ttl.as_secs(),
        };
        self.ranked.outbox().send(&target.notify, &received).await;

        let this = self.clone();
        let challenge_id = challenge.challenge_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            this.expire(&challenge_id).await;
        });

        Ok(challenge)
    }

    fn is_busy(&self, player_id: PlayerId) -> bool {
        self.ranked.lobby().is_in_match(player_id) || self.ranked.queue().is_queued(player_id)
    }

    /// Target accepts: reserve both players, then start the match.
    pub async fn accept(
        &self,
        challenge_id: &str,
        by: PlayerId,
    ) -> Result<JoinHandle<MatchOutcome>, ChallengeError> {
        let challenge = self.lookup(challenge_id).await?;
        if by != challenge.target_id {
            return Err(ChallengeError::NotParticipant(by));
        }
        if challenge.status != ChallengeStatus::Pending {
            return Err(ChallengeError::NotPending(challenge.status));
        }

        let (a, b) = (challenge.challenger_id, challenge.target_id);
        let lobby = self.ranked.lobby();
        let match_id = Uuid::new_v4().to_string();
        if !lobby.try_begin_match(a, b, &match_id) {
            let busy = if lobby.is_in_match(a) { a } else { b };
            return Err(ChallengeError::Busy(busy));
        }
        // Once reserved neither side can join the queue, so this check is final
        for player_id in [a, b] {
            if self.ranked.queue().is_queued(player_id) {
                lobby.end_match(a, b);
                return Err(ChallengeError::Busy(player_id));
            }
        }

        let challenge = match self.book.transition(challenge_id, ChallengeStatus::Accepted) {
            Ok(c) => c,
            Err(e) => {
                lobby.end_match(a, b);
                return Err(self.settled_error(challenge_id, e).await);
            }
        };
        self.finish(&challenge).await;

        let accepted = Notice::ChallengeAccepted {
            challenge_id: challenge.challenge_id.clone(),
        };
        self.ranked
            .outbox()
            .send(&challenge.challenger_notify, &accepted)
            .await;

        let ranked = self.ranked.clone();
        let seats = challenge.seats();
        Ok(tokio::spawn(async move {
            ranked.run_match(match_id, MatchSource::Challenge, seats).await
        }))
    }

    /// Target declines. The pair goes on cooldown.
    pub async fn decline(
        &self,
        challenge_id: &str,
        by: PlayerId,
    ) -> Result<PendingChallenge, ChallengeError> {
        self.require_participant(challenge_id, by, |c| c.target_id)
            .await?;
        let challenge = match self.book.transition(challenge_id, ChallengeStatus::Declined) {
            Ok(c) => c,
            Err(e) => return Err(self.settled_error(challenge_id, e).await),
        };
        self.finish(&challenge).await;
        self.ranked.lobby().set_cooldown(
            challenge.challenger_id,
            challenge.target_id,
            self.ranked.policy().challenge_cooldown,
        );

        let declined = Notice::ChallengeDeclined {
            challenge_id: challenge.challenge_id.clone(),
        };
        self.ranked
            .outbox()
            .send(&challenge.challenger_notify, &declined)
            .await;
        Ok(challenge)
    }

    /// Challenger withdraws.
    pub async fn cancel(
        &self,
        challenge_id: &str,
        by: PlayerId,
    ) -> Result<PendingChallenge, ChallengeError> {
        self.require_participant(challenge_id, by, |c| c.challenger_id)
            .await?;
        let challenge = match self.book.transition(challenge_id, ChallengeStatus::Canceled) {
            Ok(c) => c,
            Err(e) => return Err(self.settled_error(challenge_id, e).await),
        };
        self.finish(&challenge).await;

        let canceled = Notice::ChallengeCanceled {
            challenge_id: challenge.challenge_id.clone(),
        };
        self.ranked
            .outbox()
            .send(&challenge.target_notify, &canceled)
            .await;
        Ok(challenge)
    }

    /// Expire a challenge if it is still pending. False if it already
    /// reached another state.
    pub async fn expire(&self, challenge_id: &str) -> bool {
        let Ok(challenge) = self.book.transition(challenge_id, ChallengeStatus::Expired) else {
            return false;
        };
        self.finish(&challenge).await;

        let expired = Notice::ChallengeExpired {
            challenge_id: challenge.challenge_id.clone(),
        };
        for notify in [challenge.challenger_notify, challenge.target_notify] {
            self.ranked.outbox().send(&notify, &expired).await;
        }
        true
    }

    async fn require_participant(
        &self,
        challenge_id: &str,
        by: PlayerId,
        role: impl Fn(&PendingChallenge) -> PlayerId,
    ) -> Result<(), ChallengeError> {
        let challenge = self.lookup(challenge_id).await?;
        if role(&challenge) != by {
            return Err(ChallengeError::NotParticipant(by));
        }
        Ok(())
    }

    /// A live challenge from the book. Finished ones report their stored status.
    async fn lookup(&self, challenge_id: &str) -> Result<PendingChallenge, ChallengeError> {
        match self.book.get(challenge_id) {
            Some(challenge) => Ok(challenge),
            None => Err(self
                .settled_error(challenge_id, ChallengeError::NotFound(challenge_id.to_string()))
                .await),
        }
    }

    /// Turn a miss in the book into `NotPending` when storage knows the
    /// challenge finished.
    async fn settled_error(&self, challenge_id: &str, err: ChallengeError) -> ChallengeError {
        if !matches!(err, ChallengeError::NotFound(_)) {
            return err;
        }
        match self.ranked.db().get_challenge(challenge_id).await {
            Ok(Some(row)) => match ChallengeStatus::parse(&row.status) {
                Some(status) if status != ChallengeStatus::Pending => {
                    ChallengeError::NotPending(status)
                }
                _ => err,
            },
            Ok(None) => err,
            Err(e) => ChallengeError::Storage(e),
        }
    }

    /// Mirror a terminal transition, drop it from the book and count it.
    async fn finish(&self, challenge: &PendingChallenge) {
        let status = challenge.status.as_str();
        match self
            .ranked
            .db()
            .transition_challenge(&challenge.challenge_id, status)
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                challenge_id = %challenge.challenge_id,
                "stored challenge was not pending"
            ),
            Err(e) => tracing::warn!(
                challenge_id = %challenge.challenge_id,
                "failed to mirror challenge transition: {e}"
            ),
        }
        self.book.remove(&challenge.challenge_id);
        metrics::CHALLENGES_TOTAL.with_label_values(&[status]).inc();
        tracing::info!(challenge_id = %challenge.challenge_id, status, "challenge finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RankedPolicy;
    use crate::db::Database;
    use crate::engine::Unattached;
    use crate::notify::testing::RecordingNotifier;
    use crate::retry::RetryPolicy;
    use std::time::Duration;

    struct Fixture {
        challenges: Arc<ChallengeCoordinator>,
        notifier: Arc<RecordingNotifier>,
        db: Arc<Database>,
    }

    async fn fixture(policy: RankedPolicy) -> Fixture {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let policy = RankedPolicy {
            notify_retry: RetryPolicy::none(),
            settle_retry: RetryPolicy::none(),
            ..policy
        };
        let ranked = RankedMatchCoordinator::new(
            db.clone(),
            Arc::new(Unattached),
            notifier.clone(),
            policy,
            None,
        );
        Fixture {
            challenges: ChallengeCoordinator::new(ranked),
            notifier,
            db,
        }
    }

    fn human(id: PlayerId) -> Participant {
        Participant::human(id, NotifyHandle { chat_id: id })
    }

    async fn with_rating(db: &Database, id: PlayerId, rating: i32) {
        db.get_or_create_career(id, 0).await.unwrap();
        db.override_rating(id, rating).await.unwrap();
    }

    #[test]
    fn test_book_transition_is_write_once() {
        let book = ChallengeBook::new();
        book.insert(PendingChallenge {
            challenge_id: "c1".into(),
            challenger_id: 1,
            target_id: 2,
            challenger_rating: 1000,
            challenger_tier: "Gold I".into(),
            target_rating: 1000,
            target_tier: "Gold I".into(),
            status: ChallengeStatus::Pending,
            created_at: 0,
            expires_at: 60,
            challenger_notify: NotifyHandle { chat_id: 1 },
            target_notify: NotifyHandle { chat_id: 2 },
        });

        assert!(book.transition("c1", ChallengeStatus::Accepted).is_ok());
        assert!(matches!(
            book.transition("c1", ChallengeStatus::Expired),
            Err(ChallengeError::NotPending(ChallengeStatus::Accepted))
        ));
        assert!(matches!(
            book.transition("nope", ChallengeStatus::Expired),
            Err(ChallengeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_book_only_holds_live_challenges() {
        let f = fixture(RankedPolicy::default()).await;
        for id in 2..=4 {
            with_rating(&f.db, id, 1000).await;
        }
        let first = f.challenges.issue(human(1), human(2)).await.unwrap();
        let second = f.challenges.issue(human(3), human(4)).await.unwrap();
        assert_eq!(f.challenges.book().len(), 2);

        f.challenges.decline(&first.challenge_id, 2).await.unwrap();
        assert_eq!(f.challenges.book().len(), 1);
        assert!(f.challenges.expire(&second.challenge_id).await);
        assert!(f.challenges.book().is_empty());

        assert!(matches!(
            f.challenges.decline(&first.challenge_id, 2).await,
            Err(ChallengeError::NotPending(ChallengeStatus::Declined))
        ));
        assert!(matches!(
            f.challenges.cancel("missing", 1).await,
            Err(ChallengeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_basic_validation() {
        let f = fixture(RankedPolicy::default()).await;
        let c = &f.challenges;

        assert!(matches!(
            c.issue(human(1), human(1)).await,
            Err(ChallengeError::SelfChallenge)
        ));

        let bot = Participant {
            is_service: true,
            ..human(2)
        };
        assert!(matches!(
            c.issue(human(1), bot).await,
            Err(ChallengeError::ServiceAccount)
        ));

        // Target has never played ranked
        assert!(matches!(
            c.issue(human(1), human(3)).await,
            Err(ChallengeError::NoCareer(3))
        ));
    }

    #[tokio::test]
    async fn test_tier_distance_boundary() {
        let f = fixture(RankedPolicy::default()).await;
        // Challenger at Gold I (1000)
        with_rating(&f.db, 1, 1000).await;
        // Gold III is 2 tiers up, Platinum I is 3
        with_rating(&f.db, 2, 1300).await;
        with_rating(&f.db, 3, 1500).await;

        assert!(f.challenges.issue(human(1), human(2)).await.is_ok());
        assert!(matches!(
            f.challenges.issue(human(1), human(3)).await,
            Err(ChallengeError::TierTooFar { distance: 3, max: 2 })
        ));
    }

    #[tokio::test]
    async fn test_low_trust_challenger_denied() {
        let f = fixture(RankedPolicy::default()).await;
        with_rating(&f.db, 2, 1000).await;
        f.db.get_or_create_career(1, 0).await.unwrap();
        f.db.set_rating_suspended(1, true).await.unwrap();

        assert!(matches!(
            f.challenges.issue(human(1), human(2)).await,
            Err(ChallengeError::Denied(EntryDenied::Suspended))
        ));
    }

    #[tokio::test]
    async fn test_busy_players_rejected() {
        let f = fixture(RankedPolicy::default()).await;
        with_rating(&f.db, 2, 1000).await;
        f.challenges.ranked.lobby().try_begin_match(2, 9, "m");

        assert!(matches!(
            f.challenges.issue(human(1), human(2)).await,
            Err(ChallengeError::Busy(2))
        ));
    }

    #[tokio::test]
    async fn test_decline_sets_cooldown() {
        let f = fixture(RankedPolicy::default()).await;
        with_rating(&f.db, 2, 1000).await;

        let c = f.challenges.issue(human(1), human(2)).await.unwrap();
        assert_eq!(f.notifier.kinds_for(2), vec!["challenge_received"]);

        // Only the target may decline
        assert!(matches!(
            f.challenges.decline(&c.challenge_id, 1).await,
            Err(ChallengeError::NotParticipant(1))
        ));
        let declined = f.challenges.decline(&c.challenge_id, 2).await.unwrap();
        assert_eq!(declined.status, ChallengeStatus::Declined);
        assert_eq!(f.notifier.kinds_for(1), vec!["challenge_declined"]);

        let row = f.db.get_challenge(&c.challenge_id).await.unwrap().unwrap();
        assert_eq!(row.status, "declined");
        assert!(f.challenges.book().is_empty());

        // Terminal: a late expiry is a no-op
        assert!(!f.challenges.expire(&c.challenge_id).await);

        assert!(matches!(
            f.challenges.issue(human(2), human(1)).await,
            Err(ChallengeError::Cooldown)
        ));
    }

    #[tokio::test]
    async fn test_cancel_by_challenger() {
        let f = fixture(RankedPolicy::default()).await;
        with_rating(&f.db, 2, 1000).await;
        let c = f.challenges.issue(human(1), human(2)).await.unwrap();

        let canceled = f.challenges.cancel(&c.challenge_id, 1).await.unwrap();
        assert_eq!(canceled.status, ChallengeStatus::Canceled);
        assert!(matches!(
            f.challenges.accept(&c.challenge_id, 2).await,
            Err(ChallengeError::NotPending(ChallengeStatus::Canceled))
        ));
    }

    #[tokio::test]
    async fn test_expiry_task() {
        let policy = RankedPolicy {
            challenge_ttl: Duration::from_millis(50),
            ..RankedPolicy::default()
        };
        let f = fixture(policy).await;
        with_rating(&f.db, 2, 1000).await;
        let c = f.challenges.issue(human(1), human(2)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(f.challenges.book().get(&c.challenge_id).is_none());
        assert!(f.challenges.book().is_empty());
        let row = f.db.get_challenge(&c.challenge_id).await.unwrap().unwrap();
        assert_eq!(row.status, "expired");
        assert_eq!(f.notifier.kinds_for(1), vec!["challenge_expired"]);

        // Answering after expiry reports the stored status
        assert!(matches!(
            f.challenges.accept(&c.challenge_id, 2).await,
            Err(ChallengeError::NotPending(ChallengeStatus::Expired))
        ));
    }

    #[tokio::test]
    async fn test_accept_runs_match_and_releases_players() {
        let f = fixture(RankedPolicy::default()).await;
        with_rating(&f.db, 2, 1000).await;
        let c = f.challenges.issue(human(1), human(2)).await.unwrap();

        let handle = f.challenges.accept(&c.challenge_id, 2).await.unwrap();
        // Second accept loses the race
        assert!(matches!(
            f.challenges.accept(&c.challenge_id, 2).await,
            Err(ChallengeError::NotPending(ChallengeStatus::Accepted))
        ));

        // No engine is attached, so the match is abandoned without rating effect
        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, MatchOutcome::Abandoned(_)));

        let lobby = f.challenges.ranked.lobby();
        assert!(!lobby.is_in_match(1));
        assert!(!lobby.is_in_match(2));
        assert!(lobby.in_cooldown(1, 2));
        assert_eq!(f.db.get_career(1).await.unwrap().unwrap().rating, 1000);
        assert!(f.notifier.kinds_for(2).contains(&"match_abandoned"));
    }
}
