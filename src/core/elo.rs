//! Elo-style desirability rating.
//!
//! Every like or dislike is treated as a game between the viewer and the
//! target; each side's K-factor shrinks as its rating or match count grows.

use crate::models::RatingConfig;

const K_ELITE: i32 = 16;
const K_ESTABLISHED: i32 = 24;
const K_PROVISIONAL: i32 = 32;

const ELITE_RATING: i32 = 2400;
const ELITE_MATCH_COUNT: i32 = 100;
const ESTABLISHED_RATING: i32 = 2000;
const ESTABLISHED_MATCH_COUNT: i32 = 50;

/// Expected score of A against B
///
/// `expected_outcome(a, b) + expected_outcome(b, a) == 1`.
#[inline]
pub fn expected_outcome(rating_a: i32, rating_b: i32) -> f64 {
    let diff = f64::from(rating_b) - f64::from(rating_a);
    1.0 / (1.0 + 10.0_f64.powf(diff / 400.0))
}

/// K-factor for one side, from its own rating and match count only
#[inline]
pub fn dynamic_k_factor(rating: i32, match_count: i32) -> i32 {
    if rating > ELITE_RATING || match_count > ELITE_MATCH_COUNT {
        K_ELITE
    } else if rating > ESTABLISHED_RATING || match_count > ESTABLISHED_MATCH_COUNT {
        K_ESTABLISHED
    } else {
        K_PROVISIONAL
    }
}

/// Apply one Elo step and clamp the result into the rating bounds
///
/// `None` selects [`RatingConfig::DEFAULT`]. A supplied config with a
/// non-positive K-factor keeps its own bounds but steps with the default
/// K-factor; inverted bounds fall back to the default bounds.
pub fn update_rating(current: i32, expected: f64, actual: f64, config: Option<&RatingConfig>) -> i32 {
    let config = effective_config(config);

    // f64::round rounds half away from zero
    let delta = (f64::from(config.k_factor) * (actual - expected)).round() as i64;
    let next = i64::from(current).saturating_add(delta);

    next.clamp(i64::from(config.min_rating), i64::from(config.max_rating)) as i32
}

fn effective_config(config: Option<&RatingConfig>) -> RatingConfig {
    let default = RatingConfig::DEFAULT;
    let Some(config) = config else {
        return default;
    };

    let mut effective = *config;
    if effective.k_factor <= 0 {
        effective.k_factor = default.k_factor;
    }
    if effective.min_rating > effective.max_rating {
        effective.min_rating = default.min_rating;
        effective.max_rating = default.max_rating;
    }
    effective
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_outcome_equal_ratings() {
        assert!((expected_outcome(1500, 1500) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_expected_outcome_is_symmetric() {
        for (a, b) in [(1000, 3000), (1400, 1600), (2999, 1001), (1500, 1500)] {
            let sum = expected_outcome(a, b) + expected_outcome(b, a);
            assert!((sum - 1.0).abs() < 1e-9, "{} vs {} summed to {}", a, b, sum);
        }
    }

    #[test]
    fn test_underdog_expectation() {
        let expected = expected_outcome(1400, 1600);
        assert!((expected - 0.2403).abs() < 1e-3);
    }

    #[test]
    fn test_dynamic_k_factor() {
        assert_eq!(dynamic_k_factor(2500, 10), 16);
        assert_eq!(dynamic_k_factor(1500, 101), 16);
        assert_eq!(dynamic_k_factor(2200, 60), 24);
        assert_eq!(dynamic_k_factor(1500, 51), 24);
        assert_eq!(dynamic_k_factor(1800, 20), 32);
        // Thresholds are strict
        assert_eq!(dynamic_k_factor(2400, 100), 24);
        assert_eq!(dynamic_k_factor(2000, 50), 32);
    }

    #[test]
    fn test_update_rating_draw_is_unchanged() {
        assert_eq!(update_rating(1500, 0.5, 0.5, None), 1500);
    }

    #[test]
    fn test_update_rating_underdog_win() {
        let config = RatingConfig { k_factor: 32, ..RatingConfig::DEFAULT };
        // 32 * 0.76 = 24.32 rounds to 24
        assert_eq!(update_rating(1400, 0.24, 1.0, Some(&config)), 1424);
    }

    #[test]
    fn test_update_rating_rounds_half_away_from_zero() {
        let config = RatingConfig { k_factor: 1, ..RatingConfig::DEFAULT };
        assert_eq!(update_rating(1500, 0.5, 1.0, Some(&config)), 1501);
        assert_eq!(update_rating(1500, 0.5, 0.0, Some(&config)), 1499);
    }

    #[test]
    fn test_update_rating_clamps() {
        assert_eq!(update_rating(2995, 0.0, 1.0, None), 3000);
        assert_eq!(update_rating(1005, 1.0, 0.0, None), 1000);
        // Out-of-bounds input is pulled back into range
        assert_eq!(update_rating(5000, 0.5, 0.5, None), 3000);
    }

    #[test]
    fn test_zero_k_factor_keeps_caller_bounds() {
        let config = RatingConfig {
            k_factor: 0,
            min_rating: 1200,
            max_rating: 1510,
            ..RatingConfig::DEFAULT
        };
        // Default K of 32 applies, but the caller's ceiling still holds
        assert_eq!(update_rating(1500, 0.0, 1.0, Some(&config)), 1510);
    }

    #[test]
    fn test_inverted_bounds_fall_back_to_default() {
        let config = RatingConfig {
            min_rating: 2000,
            max_rating: 1000,
            ..RatingConfig::DEFAULT
        };
        assert_eq!(update_rating(1500, 0.5, 0.5, Some(&config)), 1500);
    }
}
