// Rating calculation: ELO expectation, K-factor bands, streak bonuses.
//
// Deltas are truncated toward zero, never rounded. Both sides of a match are
// slightly under-paid on fractional results and that is kept as-is.

use serde::{Deserialize, Serialize};

use crate::tier::Band;

pub const STARTING_RATING: i32 = 1000;

/// Matches below this count are placement matches.
pub const PLACEMENT_MATCHES: i32 = 5;

const K_PLACEMENT: i32 = 48;
const K_DEFAULT: i32 = 32;

/// Match outcome from the perspective of the (A, B) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    AWins,
    BWins,
    Draw,
}

impl Outcome {
    /// Actual scores for (A, B).
    pub fn scores(self) -> (f64, f64) {
        match self {
            Outcome::AWins => (1.0, 0.0),
            Outcome::BWins => (0.0, 1.0),
            Outcome::Draw => (0.5, 0.5),
        }
    }

    pub fn flipped(self) -> Outcome {
        match self {
            Outcome::AWins => Outcome::BWins,
            Outcome::BWins => Outcome::AWins,
            Outcome::Draw => Outcome::Draw,
        }
    }
}

/// Calculate expected score for player A against player B.
pub fn expected_score(rating_a: i32, rating_b: i32) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf((rating_b as f64 - rating_a as f64) / 400.0))
}

/// K-factor for a player given their stored tier name and ranked match count.
///
/// Placement matches always use the placement K. "Ruby" is accepted as the
/// legacy name of the band between Diamond and Immortal.
pub fn k_factor(rank_tier: &str, total_ranked_matches: i32) -> i32 {
    if total_ranked_matches < PLACEMENT_MATCHES {
        return K_PLACEMENT;
    }
    if rank_tier.split_whitespace().next() == Some("Ruby") {
        return 24;
    }
    match Band::from_tier_name(rank_tier) {
        Some(Band::Bronze | Band::Silver) => 40,
        Some(Band::Gold | Band::Platinum) => 32,
        Some(Band::Diamond | Band::Master | Band::Grandmaster) => 24,
        Some(Band::Immortal) => 16,
        None => K_DEFAULT,
    }
}

/// Base rating deltas for (A, B) with a shared K.
pub fn rating_delta(rating_a: i32, rating_b: i32, outcome: Outcome, k: i32) -> (i32, i32) {
    let (actual_a, actual_b) = outcome.scores();
    let expected_a = expected_score(rating_a, rating_b);
    let expected_b = expected_score(rating_b, rating_a);
    let delta_a = (k as f64 * (actual_a - expected_a)) as i32;
    let delta_b = (k as f64 * (actual_b - expected_b)) as i32;
    (delta_a, delta_b)
}

/// Rescale a delta computed with `shared_k` to a player's own K.
pub fn rescale_delta(delta: i32, own_k: i32, shared_k: i32) -> i32 {
    if shared_k == 0 {
        return delta;
    }
    (delta as f64 * own_k as f64 / shared_k as f64) as i32
}

/// Winner-only bonus for win streaks below Platinum, outside placement.
pub fn streak_bonus(
    current_streak: i32,
    rank_tier: &str,
    is_winner: bool,
    total_ranked_matches: i32,
) -> i32 {
    if !is_winner || total_ranked_matches < PLACEMENT_MATCHES {
        return 0;
    }
    match Band::from_tier_name(rank_tier) {
        Some(band) if band < Band::Platinum => {}
        _ => return 0,
    }
    match current_streak {
        s if s >= 5 => 4,
        3 | 4 => 2,
        _ => 0,
    }
}

/// Scale a rating gain by a reward multiplier. Losses are never scaled.
pub fn apply_multiplier(delta: i32, multiplier: f64) -> i32 {
    if delta > 0 {
        (delta as f64 * multiplier) as i32
    } else {
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_score_equal_ratings() {
        let e = expected_score(1500, 1500);
        assert!((e - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_expected_score_higher_rated() {
        let e = expected_score(1800, 1500);
        assert!(e > 0.8);
        assert!(e < 1.0);
    }

    #[test]
    fn test_expected_score_symmetric() {
        for (a, b) in [(1000, 1000), (1200, 1180), (-300, 2500), (4000, 10)] {
            let sum = expected_score(a, b) + expected_score(b, a);
            assert!((sum - 1.0).abs() < 1e-9, "{a} vs {b}: {sum}");
        }
    }

    #[test]
    fn test_expected_score_example_pair() {
        let e = expected_score(1200, 1180);
        assert!((e - 0.529).abs() < 0.001);
    }

    #[test]
    fn test_k_factor_placement_overrides_tier() {
        assert_eq!(k_factor("Immortal", 0), 48);
        assert_eq!(k_factor("Bronze I", 4), 48);
    }

    #[test]
    fn test_k_factor_bands() {
        assert_eq!(k_factor("Bronze III", 5), 40);
        assert_eq!(k_factor("Silver I", 50), 40);
        assert_eq!(k_factor("Gold II", 15), 32);
        assert_eq!(k_factor("Platinum I", 15), 32);
        assert_eq!(k_factor("Diamond III", 15), 24);
        assert_eq!(k_factor("Master II", 15), 24);
        assert_eq!(k_factor("Ruby I", 15), 24);
        assert_eq!(k_factor("Immortal", 200), 16);
        assert_eq!(k_factor("Wood", 200), 32);
    }

    #[test]
    fn test_delta_equal_ratings_is_zero_sum() {
        let (a, b) = rating_delta(1000, 1000, Outcome::AWins, 32);
        assert_eq!(a, 16);
        assert_eq!(b, -16);
        let (a, b) = rating_delta(1000, 1000, Outcome::Draw, 32);
        assert_eq!((a, b), (0, 0));
    }

    #[test]
    fn test_delta_truncates_toward_zero() {
        // 32 * (1 - 0.52875) = 15.08 and 32 * (0 - 0.47125) = -15.08
        let (a, b) = rating_delta(1200, 1180, Outcome::AWins, 32);
        assert_eq!(a, 15);
        assert_eq!(b, -15);
        // 41 * 0.5 = 20.5: the half point is dropped on both sides
        let (a, b) = rating_delta(1000, 1000, Outcome::BWins, 41);
        assert_eq!(a, -20);
        assert_eq!(b, 20);
    }

    #[test]
    fn test_delta_at_extreme_ratings() {
        let (a, b) = rating_delta(i32::MIN, 100, Outcome::BWins, 40);
        assert_eq!((a, b), (0, 0));
        let (a, b) = rating_delta(i32::MIN, 100, Outcome::AWins, 40);
        assert_eq!((a, b), (40, -40));
        let (a, b) = rating_delta(i32::MAX, i32::MIN, Outcome::Draw, 16);
        assert_eq!((a, b), (-8, 8));
    }

    #[test]
    fn test_rescale_delta() {
        assert_eq!(rescale_delta(20, 48, 40), 24);
        assert_eq!(rescale_delta(-20, 32, 40), -16);
        assert_eq!(rescale_delta(15, 32, 32), 15);
        assert_eq!(rescale_delta(7, 40, 0), 7);
    }

    #[test]
    fn test_streak_bonus() {
        assert_eq!(streak_bonus(5, "Gold I", true, 20), 4);
        assert_eq!(streak_bonus(9, "Silver II", true, 20), 4);
        assert_eq!(streak_bonus(3, "Bronze I", true, 20), 2);
        assert_eq!(streak_bonus(4, "Gold III", true, 20), 2);
        assert_eq!(streak_bonus(2, "Gold III", true, 20), 0);
    }

    #[test]
    fn test_streak_bonus_exclusions() {
        // loser, placement, Platinum and above, unknown tier
        assert_eq!(streak_bonus(6, "Gold I", false, 20), 0);
        assert_eq!(streak_bonus(6, "Gold I", true, 4), 0);
        assert_eq!(streak_bonus(6, "Platinum I", true, 20), 0);
        assert_eq!(streak_bonus(6, "Immortal", true, 20), 0);
        assert_eq!(streak_bonus(6, "Ruby I", true, 20), 0);
    }

    #[test]
    fn test_apply_multiplier_scales_gains_only() {
        assert_eq!(apply_multiplier(24, 0.30), 7);
        assert_eq!(apply_multiplier(15, 0.75), 11);
        assert_eq!(apply_multiplier(-24, 0.30), -24);
        assert_eq!(apply_multiplier(0, 0.5), 0);
    }

    #[test]
    fn test_outcome_flipped() {
        assert_eq!(Outcome::AWins.flipped(), Outcome::BWins);
        assert_eq!(Outcome::Draw.flipped(), Outcome::Draw);
    }
}
