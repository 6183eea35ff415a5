// Opponent-pattern and win-trading detection over the match history.
//
// Rules are checked in a fixed order and the first hit wins:
// frequency, then dominance, then 50-50 balance.

use std::sync::Arc;

use serde::Serialize;

use crate::db::{Database, MatchPattern, NewFlag, PlayerId};

/// Pair matches in the last 24h that make a pairing suspicious.
pub const MAX_PAIR_MATCHES_PER_DAY: i64 = 5;
/// Career matches before the dominance rule applies.
const DOMINANCE_MIN_PLAYER_MATCHES: i32 = 10;
/// Share of a career spent against one opponent.
const DOMINANCE_SHARE: f64 = 0.30;
/// Pair matches before the balance rule applies.
const BALANCE_MIN_PAIR_MATCHES: i32 = 10;
const BALANCE_LOW: f64 = 0.45;
const BALANCE_HIGH: f64 = 0.55;

/// Head-to-head results inspected for win trading.
pub const TRADING_LOOKBACK: i64 = 10;
const TRADING_MIN_RESULTS: usize = 3;
const TRADING_MIN_RUN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternReason {
    OpponentFrequency,
    OpponentPercentage,
    FiftyFiftyBalance,
    WinTrading,
}

impl PatternReason {
    /// Value stored in `suspicious_activity.activity_type`.
    pub fn activity_type(self) -> &'static str {
        match self {
            PatternReason::OpponentFrequency => "opponent_frequency",
            PatternReason::OpponentPercentage => "opponent_percentage",
            PatternReason::FiftyFiftyBalance => "fifty_fifty_balance",
            PatternReason::WinTrading => "win_trading",
        }
    }

    /// Trust impact of an unresolved flag of this kind.
    pub fn trust_impact(self) -> i32 {
        match self {
            PatternReason::OpponentFrequency => -10,
            PatternReason::OpponentPercentage => -10,
            PatternReason::FiftyFiftyBalance => -15,
            PatternReason::WinTrading => -25,
        }
    }

    pub fn flag(
        self,
        match_id: &str,
        user_id: PlayerId,
        opponent_id: PlayerId,
        details: String,
    ) -> NewFlag {
        NewFlag {
            match_id: Some(match_id.to_string()),
            user_id,
            activity_type: self.activity_type().to_string(),
            opponent_id: Some(opponent_id),
            trust_score_impact: self.trust_impact(),
            details,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatternVerdict {
    pub suspicious: bool,
    pub reason: Option<PatternReason>,
    pub evidence: String,
}

impl PatternVerdict {
    fn hit(reason: PatternReason, evidence: String) -> Self {
        Self {
            suspicious: true,
            reason: Some(reason),
            evidence,
        }
    }
}

/// Classify a pairing from its pattern row and the player's career total.
/// No row means the pair has never played.
pub fn classify(pattern: Option<&MatchPattern>, player_total: i32) -> PatternVerdict {
    let Some(p) = pattern else {
        return PatternVerdict::default();
    };

    if p.matches_last_24h >= MAX_PAIR_MATCHES_PER_DAY {
        return PatternVerdict::hit(
            PatternReason::OpponentFrequency,
            format!("{} matches in 24h", p.matches_last_24h),
        );
    }

    if player_total >= DOMINANCE_MIN_PLAYER_MATCHES {
        let share = p.total_matches as f64 / player_total as f64;
        if share >= DOMINANCE_SHARE {
            return PatternVerdict::hit(
                PatternReason::OpponentPercentage,
                format!(
                    "{:.0}% of matches against one opponent ({}/{})",
                    share * 100.0,
                    p.total_matches,
                    player_total
                ),
            );
        }
    }

    if p.total_matches >= BALANCE_MIN_PAIR_MATCHES {
        let win_rate = p.wins as f64 / p.total_matches as f64;
        if (BALANCE_LOW..=BALANCE_HIGH).contains(&win_rate) {
            return PatternVerdict::hit(
                PatternReason::FiftyFiftyBalance,
                format!(
                    "{:.0}% win rate over {} matches",
                    win_rate * 100.0,
                    p.total_matches
                ),
            );
        }
    }

    PatternVerdict::default()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradingVerdict {
    /// False when there was too little history to judge.
    pub evaluated: bool,
    pub trading: bool,
    pub longest_run: usize,
    pub detail: String,
}

/// Look for a run of results where the winner flips every match.
/// `winners` is newest first; `None` is a draw and breaks any run.
pub fn classify_trading(winners: &[Option<PlayerId>]) -> TradingVerdict {
    if winners.len() < TRADING_MIN_RESULTS {
        return TradingVerdict {
            evaluated: false,
            trading: false,
            longest_run: 0,
            detail: format!("insufficient history ({} matches)", winners.len()),
        };
    }

    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<PlayerId> = None;
    for winner in winners {
        match (winner, previous) {
            (None, _) => run = 0,
            (Some(w), Some(p)) if *w != p => run += 1,
            (Some(_), _) => run = 1,
        }
        previous = *winner;
        longest = longest.max(run);
    }

    let trading = longest >= TRADING_MIN_RUN;
    let detail = if trading {
        format!("{longest} consecutive alternating results")
    } else {
        format!("longest alternating run {longest}")
    };
    TradingVerdict {
        evaluated: true,
        trading,
        longest_run: longest,
        detail,
    }
}

/// Storage-backed front for the pattern rules.
#[derive(Clone)]
pub struct PatternDetector {
    db: Arc<Database>,
}

impl PatternDetector {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Check the (player, opponent) direction as of `now` (unix seconds).
    pub async fn check_match_patterns(
        &self,
        player_id: PlayerId,
        opponent_id: PlayerId,
        now: i64,
    ) -> Result<PatternVerdict, sqlx::Error> {
        let player_total = self
            .db
            .get_career(player_id)
            .await?
            .map(|c| c.total_matches)
            .unwrap_or(0);
        let pattern = self.db.get_pattern(player_id, opponent_id, now).await?;
        Ok(classify(pattern.as_ref(), player_total))
    }

    /// Matches between the pair in the 24h before `now`.
    pub async fn recent_pair_matches(
        &self,
        a: PlayerId,
        b: PlayerId,
        now: i64,
    ) -> Result<i64, sqlx::Error> {
        Ok(self
            .db
            .get_pattern(a, b, now)
            .await?
            .map(|p| p.matches_last_24h)
            .unwrap_or(0))
    }

    pub async fn detect_win_trading(
        &self,
        a: PlayerId,
        b: PlayerId,
    ) -> Result<TradingVerdict, sqlx::Error> {
        let history = self.db.recent_head_to_head(a, b, TRADING_LOOKBACK).await?;
        let winners: Vec<Option<PlayerId>> = history.iter().map(|r| r.winner).collect();
        Ok(classify_trading(&winners))
    }
}
