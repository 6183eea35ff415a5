// Trust scoring and reward multipliers.
//
// Everything here is a pure function of aggregated stats; gathering the
// stats from storage is the caller's job (see `Database::trust_stats`).
// Bands are coarse on purpose so the policy stays auditable.

use serde::{Deserialize, Serialize};

pub const DEFAULT_TRUST: i32 = 50;

const UNIQUE_OPPONENT_POINTS: i64 = 2;
const UNIQUE_OPPONENT_CAP: i64 = 30;
const CLEAN_RECORD_BONUS: i64 = 20;
const FLAGGED_PATTERN_PENALTY: i64 = 25;

/// Behavioural signals for one player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrustStats {
    /// Distinct ranked opponents ever faced.
    pub unique_opponents: i64,
    /// `trust_score_impact` of every unresolved suspicious-activity flag.
    pub unresolved_flag_impacts: Vec<i32>,
    /// Opponent pairings that tripped a pattern rule.
    pub flagged_pattern_count: i64,
}

/// Trust score in `[0, 100]`.
pub fn trust_score(stats: &TrustStats) -> i32 {
    let mut score = DEFAULT_TRUST as i64;
    score += (stats.unique_opponents.max(0) * UNIQUE_OPPONENT_POINTS).min(UNIQUE_OPPONENT_CAP);
    if stats.unresolved_flag_impacts.is_empty() {
        score += CLEAN_RECORD_BONUS;
    } else {
        score += stats
            .unresolved_flag_impacts
            .iter()
            .map(|i| *i as i64)
            .sum::<i64>();
    }
    score -= FLAGGED_PATTERN_PENALTY * stats.flagged_pattern_count.max(0);
    score.clamp(0, 100) as i32
}

/// Reward multiplier for account experience (total ranked matches).
pub fn rating_multiplier_for_experience(total_matches: i32) -> f64 {
    match total_matches {
        i32::MIN..=5 => 0.30,
        6..=10 => 0.50,
        11..=20 => 0.75,
        _ => 1.00,
    }
}

/// Reward multiplier derived from a trust score. Only applied under enforcement.
pub fn trust_multiplier(score: i32) -> f64 {
    match score {
        70.. => 1.0,
        50..=69 => 0.85,
        30..=49 => 0.6,
        _ => 0.3,
    }
}

/// Reward multiplier for suspicious pairings. Only applied under enforcement.
pub fn pattern_multiplier(suspicious: bool, win_trading: bool) -> f64 {
    if win_trading {
        0.0
    } else if suspicious {
        0.5
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_account() {
        assert_eq!(trust_score(&TrustStats::default()), 70);
    }

    #[test]
    fn test_unique_opponents_capped() {
        let stats = TrustStats {
            unique_opponents: 9,
            ..Default::default()
        };
        assert_eq!(trust_score(&stats), 88);

        let stats = TrustStats {
            unique_opponents: 40,
            ..Default::default()
        };
        assert_eq!(trust_score(&stats), 100);
    }

    #[test]
    fn test_unresolved_flags_replace_bonus() {
        let stats = TrustStats {
            unique_opponents: 5,
            unresolved_flag_impacts: vec![-10, -15],
            flagged_pattern_count: 0,
        };
        // 50 + 10 - 25
        assert_eq!(trust_score(&stats), 35);
    }

    #[test]
    fn test_flagged_patterns_and_clamp() {
        let stats = TrustStats {
            unique_opponents: 1,
            unresolved_flag_impacts: vec![-20],
            flagged_pattern_count: 2,
        };
        // 50 + 2 - 20 - 50 = -18
        assert_eq!(trust_score(&stats), 0);
    }

    #[test]
    fn test_experience_bands() {
        assert_eq!(rating_multiplier_for_experience(0), 0.30);
        assert_eq!(rating_multiplier_for_experience(5), 0.30);
        assert_eq!(rating_multiplier_for_experience(6), 0.50);
        assert_eq!(rating_multiplier_for_experience(10), 0.50);
        assert_eq!(rating_multiplier_for_experience(11), 0.75);
        assert_eq!(rating_multiplier_for_experience(20), 0.75);
        assert_eq!(rating_multiplier_for_experience(21), 1.00);
        assert_eq!(rating_multiplier_for_experience(10_000), 1.00);
    }

    #[test]
    fn test_experience_monotonic() {
        let mut prev = 0.0;
        for total in 0..100 {
            let m = rating_multiplier_for_experience(total);
            assert!(m >= prev);
            prev = m;
        }
        assert_eq!(prev, 1.0);
    }

    #[test]
    fn test_trust_multiplier_bands() {
        assert_eq!(trust_multiplier(100), 1.0);
        assert_eq!(trust_multiplier(70), 1.0);
        assert_eq!(trust_multiplier(69), 0.85);
        assert_eq!(trust_multiplier(30), 0.6);
        assert_eq!(trust_multiplier(0), 0.3);
    }

    #[test]
    fn test_pattern_multiplier() {
        assert_eq!(pattern_multiplier(false, false), 1.0);
        assert_eq!(pattern_multiplier(true, false), 0.5);
        assert_eq!(pattern_multiplier(true, true), 0.0);
    }
}
