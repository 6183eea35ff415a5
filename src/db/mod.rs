// Database access layer (SQLite via sqlx).
//
// Timestamps are unix seconds. The in-memory queue and challenge book are the
// source of truth for liveness; their tables here are crash-recovery mirrors.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::rating::STARTING_RATING;
use crate::tier::tier_for_rating;
use crate::trust::{TrustStats, DEFAULT_TRUST};

pub type PlayerId = i64;

const DAY_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreakType {
    Win,
    Loss,
    None,
}

impl StreakType {
    pub fn as_str(self) -> &'static str {
        match self {
            StreakType::Win => "win",
            StreakType::Loss => "loss",
            StreakType::None => "none",
        }
    }

    pub fn parse(s: &str) -> StreakType {
        match s {
            "win" => StreakType::Win,
            "loss" => StreakType::Loss,
            _ => StreakType::None,
        }
    }
}

/// Ranked career of one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Career {
    pub player_id: PlayerId,
    pub rating: i32,
    pub rank_tier: String,
    pub total_matches: i32,
    pub wins: i32,
    pub losses: i32,
    pub current_streak: i32,
    pub streak_type: String,
    pub trust_score: i32,
    pub rating_suspended: bool,
    pub highest_rating: i32,
    pub created_at: i64,
}

impl Career {
    /// Defaults for a player's first ranked interaction.
    pub fn new(player_id: PlayerId, created_at: i64) -> Self {
        Career {
            player_id,
            rating: STARTING_RATING,
            rank_tier: tier_for_rating(STARTING_RATING).to_string(),
            total_matches: 0,
            wins: 0,
            losses: 0,
            current_streak: 0,
            streak_type: StreakType::None.as_str().to_string(),
            trust_score: DEFAULT_TRUST,
            rating_suspended: false,
            highest_rating: STARTING_RATING,
            created_at,
        }
    }

    pub fn streak(&self) -> StreakType {
        StreakType::parse(&self.streak_type)
    }
}

/// Aggregated head-to-head record for an ordered (player, opponent) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MatchPattern {
    pub player_id: PlayerId,
    pub opponent_id: PlayerId,
    pub total_matches: i32,
    pub wins: i32,
    pub losses: i32,
    pub last_match_time: i64,
    pub flagged: bool,
    /// Counted from the match log at read time.
    pub matches_last_24h: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SuspiciousActivity {
    pub id: i64,
    /// Match that raised the flag, if any.
    pub match_id: Option<String>,
    pub user_id: PlayerId,
    pub activity_type: String,
    pub opponent_id: Option<PlayerId>,
    pub trust_score_impact: i32,
    pub details: String,
    pub cleared: bool,
    pub reviewed: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFlag {
    pub match_id: Option<String>,
    pub user_id: PlayerId,
    pub activity_type: String,
    pub opponent_id: Option<PlayerId>,
    pub trust_score_impact: i32,
    pub details: String,
}

/// Immutable log row for a settled match. Player A batted first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MatchResult {
    pub id: i64,
    pub match_id: String,
    pub source: String,
    pub player_a: PlayerId,
    pub player_b: PlayerId,
    pub winner: Option<PlayerId>,
    pub a_rating_before: i32,
    pub a_rating_after: i32,
    pub b_rating_before: i32,
    pub b_rating_after: i32,
    pub a_runs: i32,
    pub a_wickets: i32,
    pub a_balls: i32,
    pub b_runs: i32,
    pub b_wickets: i32,
    pub b_balls: i32,
    pub played_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMatchResult {
    pub match_id: String,
    pub source: String,
    pub player_a: PlayerId,
    pub player_b: PlayerId,
    pub winner: Option<PlayerId>,
    pub a_rating_before: i32,
    pub a_rating_after: i32,
    pub b_rating_before: i32,
    pub b_rating_after: i32,
    pub a_runs: i32,
    pub a_wickets: i32,
    pub a_balls: i32,
    pub b_runs: i32,
    pub b_wickets: i32,
    pub b_balls: i32,
    pub played_at: i64,
}

/// One direction of a pattern row refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternUpdate {
    pub player_id: PlayerId,
    pub opponent_id: PlayerId,
    pub won: bool,
    pub lost: bool,
    pub flagged: bool,
    pub played_at: i64,
}

/// Everything a settlement writes, applied as one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementWrite {
    pub result: NewMatchResult,
    pub careers: [Career; 2],
    pub patterns: [PatternUpdate; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChallengeRow {
    pub challenge_id: String,
    pub challenger_id: PlayerId,
    pub target_id: PlayerId,
    pub challenger_rating: i32,
    pub challenger_tier: String,
    pub target_rating: i32,
    pub target_tier: String,
    pub status: String,
    pub created_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueueRow {
    pub player_id: PlayerId,
    pub rating: i32,
    pub rank_tier: String,
    pub chat_id: i64,
    pub joined_at: i64,
}

const CAREER_COLUMNS: &str = "player_id, rating, rank_tier, total_matches, wins, losses, current_streak, streak_type, trust_score, rating_suspended, highest_rating, created_at";

const RESULT_COLUMNS: &str = "id, match_id, source, player_a, player_b, winner, a_rating_before, a_rating_after, b_rating_before, b_rating_after, a_runs, a_wickets, a_balls, b_runs, b_wickets, b_balls, played_at";

const FLAG_COLUMNS: &str =
    "id, match_id, user_id, activity_type, opponent_id, trust_score_impact, details, cleared, reviewed, created_at";

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        // Every connection to `:memory:` is its own database, so keep exactly one.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS careers (
                player_id INTEGER PRIMARY KEY,
                rating INTEGER NOT NULL,
                rank_tier TEXT NOT NULL,
                total_matches INTEGER NOT NULL DEFAULT 0,
                wins INTEGER NOT NULL DEFAULT 0,
                losses INTEGER NOT NULL DEFAULT 0,
                current_streak INTEGER NOT NULL DEFAULT 0,
                streak_type TEXT NOT NULL DEFAULT 'none',
                trust_score INTEGER NOT NULL DEFAULT 50,
                rating_suspended INTEGER NOT NULL DEFAULT 0,
                highest_rating INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS match_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                match_id TEXT NOT NULL UNIQUE,
                source TEXT NOT NULL,
                player_a INTEGER NOT NULL,
                player_b INTEGER NOT NULL,
                winner INTEGER,
                a_rating_before INTEGER NOT NULL,
                a_rating_after INTEGER NOT NULL,
                b_rating_before INTEGER NOT NULL,
                b_rating_after INTEGER NOT NULL,
                a_runs INTEGER NOT NULL,
                a_wickets INTEGER NOT NULL,
                a_balls INTEGER NOT NULL,
                b_runs INTEGER NOT NULL,
                b_wickets INTEGER NOT NULL,
                b_balls INTEGER NOT NULL,
                played_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_match_results_pair ON match_results (player_a, player_b, played_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS match_patterns (
                player_id INTEGER NOT NULL,
                opponent_id INTEGER NOT NULL,
                total_matches INTEGER NOT NULL DEFAULT 0,
                wins INTEGER NOT NULL DEFAULT 0,
                losses INTEGER NOT NULL DEFAULT 0,
                last_match_time INTEGER NOT NULL,
                flagged INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (player_id, opponent_id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS suspicious_activity (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                match_id TEXT,
                user_id INTEGER NOT NULL,
                activity_type TEXT NOT NULL,
                opponent_id INTEGER,
                trust_score_impact INTEGER NOT NULL,
                details TEXT NOT NULL DEFAULT '',
                cleared INTEGER NOT NULL DEFAULT 0,
                reviewed INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        // One flag of a kind per player per match, so a retried settlement
        // cannot count a penalty twice. Flags without a match are not limited.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_suspicious_activity_match ON suspicious_activity (match_id, user_id, activity_type)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue_entries (
                player_id INTEGER PRIMARY KEY,
                rating INTEGER NOT NULL,
                rank_tier TEXT NOT NULL,
                chat_id INTEGER NOT NULL,
                joined_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_challenges (
                challenge_id TEXT PRIMARY KEY,
                challenger_id INTEGER NOT NULL,
                target_id INTEGER NOT NULL,
                challenger_rating INTEGER NOT NULL,
                challenger_tier TEXT NOT NULL,
                target_rating INTEGER NOT NULL,
                target_tier TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Round-trip check used by the health endpoint.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ── Careers ───────────────────────────────────────────────────────

    pub async fn get_career(&self, player_id: PlayerId) -> Result<Option<Career>, sqlx::Error> {
        let row = sqlx::query_as::<_, Career>(&format!(
            "SELECT {CAREER_COLUMNS} FROM careers WHERE player_id = ?"
        ))
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Fetch a career, creating it with defaults on first ranked interaction.
    pub async fn get_or_create_career(
        &self,
        player_id: PlayerId,
        now: i64,
    ) -> Result<Career, sqlx::Error> {
        let fresh = Career::new(player_id, now);
        sqlx::query(
            "INSERT INTO careers (player_id, rating, rank_tier, trust_score, highest_rating, created_at) VALUES (?, ?, ?, ?, ?, ?) ON CONFLICT(player_id) DO NOTHING",
        )
        .bind(fresh.player_id)
        .bind(fresh.rating)
        .bind(&fresh.rank_tier)
        .bind(fresh.trust_score)
        .bind(fresh.highest_rating)
        .bind(fresh.created_at)
        .execute(&self.pool)
        .await?;

        self.get_career(player_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Insert or replace a whole career, e.g. when carrying players over
    /// from an existing ladder.
    pub async fn import_career(&self, career: &Career) -> Result<(), sqlx::Error> {
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO careers ({CAREER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(career.player_id)
        .bind(career.rating)
        .bind(tier_for_rating(career.rating).to_string())
        .bind(career.total_matches)
        .bind(career.wins)
        .bind(career.losses)
        .bind(career.current_streak)
        .bind(&career.streak_type)
        .bind(career.trust_score)
        .bind(career.rating_suspended)
        .bind(career.highest_rating.max(career.rating))
        .bind(career.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_rating_suspended(
        &self,
        player_id: PlayerId,
        suspended: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE careers SET rating_suspended = ? WHERE player_id = ?")
            .bind(suspended)
            .bind(player_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Operator rating override. Keeps the tier derived and the high-water mark monotone.
    pub async fn override_rating(
        &self,
        player_id: PlayerId,
        rating: i32,
    ) -> Result<Option<Career>, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE careers SET rating = ?, rank_tier = ?, highest_rating = MAX(highest_rating, ?) WHERE player_id = ?",
        )
        .bind(rating)
        .bind(tier_for_rating(rating).to_string())
        .bind(rating)
        .bind(player_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_career(player_id).await
    }

    // ── Patterns & history ────────────────────────────────────────────

    /// Pair record for (player, opponent) with `matches_last_24h` counted as of `now`.
    pub async fn get_pattern(
        &self,
        player_id: PlayerId,
        opponent_id: PlayerId,
        now: i64,
    ) -> Result<Option<MatchPattern>, sqlx::Error> {
        let row = sqlx::query_as::<_, MatchPattern>(
            r#"
            SELECT p.player_id, p.opponent_id, p.total_matches, p.wins, p.losses,
                   p.last_match_time, p.flagged,
                   (SELECT COUNT(*) FROM match_results r
                     WHERE ((r.player_a = p.player_id AND r.player_b = p.opponent_id)
                         OR (r.player_a = p.opponent_id AND r.player_b = p.player_id))
                       AND r.played_at > ?) AS matches_last_24h
            FROM match_patterns p
            WHERE p.player_id = ? AND p.opponent_id = ?
        "#,
        )
        .bind(now - DAY_SECS)
        .bind(player_id)
        .bind(opponent_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Last `limit` matches between two players, newest first.
    pub async fn recent_head_to_head(
        &self,
        a: PlayerId,
        b: PlayerId,
        limit: i64,
    ) -> Result<Vec<MatchResult>, sqlx::Error> {
        let rows = sqlx::query_as::<_, MatchResult>(&format!(
            "SELECT {RESULT_COLUMNS} FROM match_results WHERE (player_a = ? AND player_b = ?) OR (player_a = ? AND player_b = ?) ORDER BY played_at DESC, id DESC LIMIT ?"
        ))
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_match_result(
        &self,
        match_id: &str,
    ) -> Result<Option<MatchResult>, sqlx::Error> {
        let row = sqlx::query_as::<_, MatchResult>(&format!(
            "SELECT {RESULT_COLUMNS} FROM match_results WHERE match_id = ?"
        ))
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Aggregate the behavioural signals the trust model scores.
    pub async fn trust_stats(&self, player_id: PlayerId) -> Result<TrustStats, sqlx::Error> {
        let unique_opponents: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM match_patterns WHERE player_id = ?")
                .bind(player_id)
                .fetch_one(&self.pool)
                .await?;

        let flagged_pattern_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM match_patterns WHERE player_id = ? AND flagged = 1",
        )
        .bind(player_id)
        .fetch_one(&self.pool)
        .await?;

        let unresolved_flag_impacts: Vec<i32> = sqlx::query_scalar(
            "SELECT trust_score_impact FROM suspicious_activity WHERE user_id = ? AND cleared = 0 ORDER BY id",
        )
        .bind(player_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(TrustStats {
            unique_opponents,
            unresolved_flag_impacts,
            flagged_pattern_count,
        })
    }

    // ── Settlement ────────────────────────────────────────────────────

    /// Apply a settlement atomically: both careers, the match log row and both
    /// pattern directions commit together or not at all.
    pub async fn settle_match(&self, write: &SettlementWrite) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for career in &write.careers {
            let result = sqlx::query(
                "UPDATE careers SET rating = ?, rank_tier = ?, total_matches = ?, wins = ?, losses = ?, current_streak = ?, streak_type = ?, trust_score = ?, highest_rating = ? WHERE player_id = ?",
            )
            .bind(career.rating)
            .bind(&career.rank_tier)
            .bind(career.total_matches)
            .bind(career.wins)
            .bind(career.losses)
            .bind(career.current_streak)
            .bind(&career.streak_type)
            .bind(career.trust_score)
            .bind(career.highest_rating)
            .bind(career.player_id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() != 1 {
                return Err(sqlx::Error::RowNotFound);
            }
        }

        let r = &write.result;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO match_results (match_id, source, player_a, player_b, winner, a_rating_before, a_rating_after, b_rating_before, b_rating_after, a_runs, a_wickets, a_balls, b_runs, b_wickets, b_balls, played_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&r.match_id)
        .bind(&r.source)
        .bind(r.player_a)
        .bind(r.player_b)
        .bind(r.winner)
        .bind(r.a_rating_before)
        .bind(r.a_rating_after)
        .bind(r.b_rating_before)
        .bind(r.b_rating_after)
        .bind(r.a_runs)
        .bind(r.a_wickets)
        .bind(r.a_balls)
        .bind(r.b_runs)
        .bind(r.b_wickets)
        .bind(r.b_balls)
        .bind(r.played_at)
        .fetch_one(&mut *tx)
        .await?;

        for p in &write.patterns {
            sqlx::query(
                r#"
                INSERT INTO match_patterns (player_id, opponent_id, total_matches, wins, losses, last_match_time, flagged)
                VALUES (?, ?, 1, ?, ?, ?, ?)
                ON CONFLICT(player_id, opponent_id) DO UPDATE SET
                    total_matches = total_matches + 1,
                    wins = wins + excluded.wins,
                    losses = losses + excluded.losses,
                    last_match_time = excluded.last_match_time,
                    flagged = MAX(flagged, excluded.flagged)
            "#,
            )
            .bind(p.player_id)
            .bind(p.opponent_id)
            .bind(p.won as i32)
            .bind(p.lost as i32)
            .bind(p.played_at)
            .bind(p.flagged)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    // ── Suspicious activity ───────────────────────────────────────────

    /// Record a flag. `None` if this match already raised the same flag for
    /// the same player.
    pub async fn insert_flag(&self, flag: &NewFlag, now: i64) -> Result<Option<i64>, sqlx::Error> {
        let id: Option<i64> = sqlx::query_scalar(
            "INSERT INTO suspicious_activity (match_id, user_id, activity_type, opponent_id, trust_score_impact, details, created_at) VALUES (?, ?, ?, ?, ?, ?, ?) ON CONFLICT DO NOTHING RETURNING id",
        )
        .bind(&flag.match_id)
        .bind(flag.user_id)
        .bind(&flag.activity_type)
        .bind(flag.opponent_id)
        .bind(flag.trust_score_impact)
        .bind(&flag.details)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn list_flags(
        &self,
        user_id: PlayerId,
        include_cleared: bool,
    ) -> Result<Vec<SuspiciousActivity>, sqlx::Error> {
        let rows = sqlx::query_as::<_, SuspiciousActivity>(&format!(
            "SELECT {FLAG_COLUMNS} FROM suspicious_activity WHERE user_id = ? AND (cleared = 0 OR ?) ORDER BY id"
        ))
        .bind(user_id)
        .bind(include_cleared)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Record an operator review. A flag can be reviewed once.
    pub async fn review_flag(&self, flag_id: i64, clear: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE suspicious_activity SET reviewed = 1, cleared = ? WHERE id = ? AND reviewed = 0",
        )
        .bind(clear)
        .bind(flag_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Queue mirror ──────────────────────────────────────────────────

    pub async fn upsert_queue_entry(&self, row: &QueueRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO queue_entries (player_id, rating, rank_tier, chat_id, joined_at) VALUES (?, ?, ?, ?, ?) ON CONFLICT(player_id) DO UPDATE SET rating = excluded.rating, rank_tier = excluded.rank_tier, chat_id = excluded.chat_id, joined_at = excluded.joined_at",
        )
        .bind(row.player_id)
        .bind(row.rating)
        .bind(&row.rank_tier)
        .bind(row.chat_id)
        .bind(row.joined_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_queue_entry(&self, player_id: PlayerId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM queue_entries WHERE player_id = ?")
            .bind(player_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_queue_entries(&self) -> Result<Vec<QueueRow>, sqlx::Error> {
        let rows = sqlx::query_as::<_, QueueRow>(
            "SELECT player_id, rating, rank_tier, chat_id, joined_at FROM queue_entries ORDER BY joined_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Drop every mirrored queue row; returns the rows that were left over.
    pub async fn drain_queue_entries(&self) -> Result<Vec<QueueRow>, sqlx::Error> {
        let rows = self.list_queue_entries().await?;
        sqlx::query("DELETE FROM queue_entries")
            .execute(&self.pool)
            .await?;
        Ok(rows)
    }

    // ── Challenge mirror ──────────────────────────────────────────────

    pub async fn insert_challenge(&self, row: &ChallengeRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO pending_challenges (challenge_id, challenger_id, target_id, challenger_rating, challenger_tier, target_rating, target_tier, status, created_at, expires_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.challenge_id)
        .bind(row.challenger_id)
        .bind(row.target_id)
        .bind(row.challenger_rating)
        .bind(&row.challenger_tier)
        .bind(row.target_rating)
        .bind(&row.target_tier)
        .bind(&row.status)
        .bind(row.created_at)
        .bind(row.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_challenge(&self, challenge_id: &str) -> Result<Option<ChallengeRow>, sqlx::Error> {
        let row = sqlx::query_as::<_, ChallengeRow>(
            "SELECT challenge_id, challenger_id, target_id, challenger_rating, challenger_tier, target_rating, target_tier, status, created_at, expires_at FROM pending_challenges WHERE challenge_id = ?",
        )
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Conditional transition out of `pending`. Returns false if the row was
    /// already terminal (or missing).
    pub async fn transition_challenge(
        &self,
        challenge_id: &str,
        status: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE pending_challenges SET status = ? WHERE challenge_id = ? AND status = 'pending'",
        )
        .bind(status)
        .bind(challenge_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Expire every pending challenge whose deadline has passed. Used on startup.
    pub async fn expire_stale_challenges(&self, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE pending_challenges SET status = 'expired' WHERE status = 'pending' AND expires_at <= ?",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
