// Boundary to the ball-by-ball cricket engine.
//
// The engine runs a match to completion and hands back a scorecard; ranked
// settlement only ever looks at final runs, wickets and balls per innings.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::PlayerId;
use crate::rating::Outcome;

/// Overs and wickets per innings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFormat {
    pub overs: u32,
    pub wickets: u32,
}

impl Default for MatchFormat {
    fn default() -> Self {
        Self {
            overs: 2,
            wickets: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Innings {
    pub batting: PlayerId,
    pub runs: i32,
    pub wickets: i32,
    pub balls: i32,
}

/// Final scores of a completed match. `first` is the side that set the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scorecard {
    pub first: Innings,
    pub second: Innings,
}

impl Scorecard {
    /// Outcome with A = the side batting first. Level scores are a draw.
    pub fn outcome(&self) -> Outcome {
        use std::cmp::Ordering;
        match self.second.runs.cmp(&self.first.runs) {
            Ordering::Greater => Outcome::BWins,
            Ordering::Equal => Outcome::Draw,
            Ordering::Less => Outcome::AWins,
        }
    }

    pub fn winner(&self) -> Option<PlayerId> {
        match self.outcome() {
            Outcome::AWins => Some(self.first.batting),
            Outcome::BWins => Some(self.second.batting),
            Outcome::Draw => None,
        }
    }

    pub fn players(&self) -> (PlayerId, PlayerId) {
        (self.first.batting, self.second.batting)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("no gameplay engine is attached")]
    Unavailable,
    #[error("match abandoned: {0}")]
    Abandoned(String),
}

#[async_trait]
pub trait GameEngine: Send + Sync {
    /// Play a full match between two players and return the final scorecard.
    async fn play(
        &self,
        format: MatchFormat,
        home: PlayerId,
        away: PlayerId,
    ) -> Result<Scorecard, EngineError>;
}

/// Engine used when the host process has not attached a real one. Every
/// match is abandoned, which exercises the no-rating-effect path.
pub struct Unattached;

#[async_trait]
impl GameEngine for Unattached {
    async fn play(
        &self,
        _format: MatchFormat,
        _home: PlayerId,
        _away: PlayerId,
    ) -> Result<Scorecard, EngineError> {
        Err(EngineError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(first_runs: i32, second_runs: i32) -> Scorecard {
        Scorecard {
            first: Innings {
                batting: 1,
                runs: first_runs,
                wickets: 1,
                balls: 12,
            },
            second: Innings {
                batting: 2,
                runs: second_runs,
                wickets: 2,
                balls: 9,
            },
        }
    }

    #[test]
    fn test_chase_succeeds() {
        let c = card(30, 31);
        assert_eq!(c.outcome(), Outcome::BWins);
        assert_eq!(c.winner(), Some(2));
    }

    #[test]
    fn test_defended_total() {
        let c = card(30, 12);
        assert_eq!(c.outcome(), Outcome::AWins);
        assert_eq!(c.winner(), Some(1));
    }

    #[test]
    fn test_level_scores_draw() {
        let c = card(25, 25);
        assert_eq!(c.outcome(), Outcome::Draw);
        assert_eq!(c.winner(), None);
        assert_eq!(c.players(), (1, 2));
    }

    #[tokio::test]
    async fn test_unattached_engine() {
        let err = Unattached.play(MatchFormat::default(), 1, 2).await;
        assert_eq!(err, Err(EngineError::Unavailable));
    }
}
