// Operator actions on careers and suspicious-activity flags.
//
// Career writes take the same per-player locks as settlement, so an
// override never lands between a settlement's read and its write.

use std::sync::Arc;

use crate::coordinator::PlayerLocks;
use crate::db::{Career, Database, PlayerId, SuspiciousActivity};
use crate::error::RankedError;

pub struct Admin {
    db: Arc<Database>,
    locks: PlayerLocks,
}

impl Admin {
    pub fn new(db: Arc<Database>, locks: PlayerLocks) -> Self {
        Self { db, locks }
    }

    /// Freeze (or unfreeze) a player's rating. Matches still count.
    pub async fn set_suspended(&self, player_id: PlayerId, suspended: bool) -> Result<(), RankedError> {
        let _guard = self.locks.lock_one(player_id).await;
        if !self.db.set_rating_suspended(player_id, suspended).await? {
            return Err(RankedError::UnknownPlayer(player_id));
        }
        tracing::warn!(player_id, suspended, "admin: rating suspension changed");
        Ok(())
    }

    /// Set a rating directly; the tier follows.
    pub async fn override_rating(&self, player_id: PlayerId, rating: i32) -> Result<Career, RankedError> {
        let _guard = self.locks.lock_one(player_id).await;
        let career = self
            .db
            .override_rating(player_id, rating)
            .await?
            .ok_or(RankedError::UnknownPlayer(player_id))?;
        tracing::warn!(player_id, rating, tier = %career.rank_tier, "admin: rating overridden");
        Ok(career)
    }

    /// Review a flag once. Clearing it removes its trust impact.
    pub async fn review_flag(&self, flag_id: i64, clear: bool) -> Result<(), RankedError> {
        if !self.db.review_flag(flag_id, clear).await? {
            return Err(RankedError::FlagNotReviewable(flag_id));
        }
        tracing::info!(flag_id, clear, "admin: flag reviewed");
        Ok(())
    }

    pub async fn open_flags(&self, player_id: PlayerId) -> Result<Vec<SuspiciousActivity>, RankedError> {
        Ok(self.db.list_flags(player_id, false).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewFlag;

    async fn admin() -> (Admin, Arc<Database>) {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        (Admin::new(db.clone(), PlayerLocks::default()), db)
    }

    #[tokio::test]
    async fn test_override_waits_for_settlement_lock() {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        db.get_or_create_career(1, 0).await.unwrap();
        let locks = PlayerLocks::default();
        let admin = Arc::new(Admin::new(db.clone(), locks.clone()));

        // A settlement on (1, 2) is in flight
        let settling = locks.lock_pair(1, 2).await;
        let pending = {
            let admin = admin.clone();
            tokio::spawn(async move { admin.override_rating(1, 1500).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!pending.is_finished());
        assert_eq!(db.get_career(1).await.unwrap().unwrap().rating, 1000);

        drop(settling);
        let career = pending.await.unwrap().unwrap();
        assert_eq!(career.rating, 1500);
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_unknown_player() {
        let (admin, _) = admin().await;
        assert!(matches!(
            admin.set_suspended(5, true).await,
            Err(RankedError::UnknownPlayer(5))
        ));
        assert!(matches!(
            admin.override_rating(5, 1500).await,
            Err(RankedError::UnknownPlayer(5))
        ));
    }

    #[tokio::test]
    async fn test_override_keeps_tier_derived() {
        let (admin, db) = admin().await;
        db.get_or_create_career(1, 0).await.unwrap();
        let career = admin.override_rating(1, 1750).await.unwrap();
        assert_eq!(career.rank_tier, "Platinum II");
        assert_eq!(career.highest_rating, 1750);

        let career = admin.override_rating(1, 800).await.unwrap();
        assert_eq!(career.rank_tier, "Silver III");
        assert_eq!(career.highest_rating, 1750);
    }

    #[tokio::test]
    async fn test_review_flag_once() {
        let (admin, db) = admin().await;
        let flag = NewFlag {
            match_id: None,
            user_id: 1,
            activity_type: "win_trading".into(),
            opponent_id: Some(2),
            trust_score_impact: -25,
            details: "3 consecutive alternating results".into(),
        };
        let id = db.insert_flag(&flag, 10).await.unwrap().unwrap();
        assert_eq!(admin.open_flags(1).await.unwrap().len(), 1);

        admin.review_flag(id, true).await.unwrap();
        assert!(admin.open_flags(1).await.unwrap().is_empty());
        assert!(matches!(
            admin.review_flag(id, false).await,
            Err(RankedError::FlagNotReviewable(_))
        ));
    }
}
