use crate::core::elo::{dynamic_k_factor, expected_outcome, update_rating};
use crate::models::{MatchAction, RatingConfig};

/// Turns a viewer's action into a pair of Elo updates
///
/// Both sides are rated as players of the same game: a like is a win for
/// the viewer, a dislike a win for the target, a pass is not scored.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchActionProcessor {
    config: RatingConfig,
}

impl MatchActionProcessor {
    pub fn new(config: RatingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RatingConfig {
        &self.config
    }

    /// Returns `(new_user_rating, new_target_rating)`
    pub fn process(
        &self,
        user_rating: i32,
        target_rating: i32,
        user_match_count: i32,
        target_match_count: i32,
        action: MatchAction,
    ) -> (i32, i32) {
        process_match_action(
            user_rating,
            target_rating,
            user_match_count,
            target_match_count,
            action,
            &self.config,
        )
    }
}

/// Compute both sides' new ratings after `action`
///
/// Each side steps with its own dynamic K-factor; the bounds come from
/// `base`. Passes return the inputs unchanged.
pub fn process_match_action(
    user_rating: i32,
    target_rating: i32,
    user_match_count: i32,
    target_match_count: i32,
    action: MatchAction,
    base: &RatingConfig,
) -> (i32, i32) {
    let Some((user_actual, target_actual)) = action.outcomes() else {
        return (user_rating, target_rating);
    };

    let user_expected = expected_outcome(user_rating, target_rating);
    let target_expected = expected_outcome(target_rating, user_rating);

    let user_config = RatingConfig {
        k_factor: dynamic_k_factor(user_rating, user_match_count),
        ..*base
    };
    let target_config = RatingConfig {
        k_factor: dynamic_k_factor(target_rating, target_match_count),
        ..*base
    };

    (
        update_rating(user_rating, user_expected, user_actual, Some(&user_config)),
        update_rating(target_rating, target_expected, target_actual, Some(&target_config)),
    )
}
