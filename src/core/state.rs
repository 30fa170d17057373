//! Like / dislike / pass state machine for a (viewer, target) pair.
//!
//! Planning is pure: the engine reads a [`PairRecord`], plans a
//! [`PairTransition`] here and hands it to the repository, which applies it
//! atomically or reports a conflict if the pair moved in the meantime.

use crate::core::actions::process_match_action;
use crate::models::{MatchAction, ProfileId, Rating, RatingConfig};
use serde::{Deserialize, Serialize};

/// Pair state as stored, before defaults are filled in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairRecord {
    pub viewer_rating: Option<Rating>,
    pub target_rating: Option<Rating>,
    /// viewer -> target
    pub forward: Option<MatchAction>,
    /// target -> viewer
    pub reverse: Option<MatchAction>,
    /// `None` when the pair never matched
    pub mutual_active: Option<bool>,
}

/// Pair state with ratings resolved and clamped
#[derive(Debug, Clone, PartialEq)]
pub struct PairState {
    pub viewer: Rating,
    pub target: Rating,
    pub forward: Option<MatchAction>,
    pub reverse: Option<MatchAction>,
    pub mutual_active: Option<bool>,
}

impl PairState {
    /// Profiles without a rating row start at the initial rating
    pub fn from_record(
        viewer_id: &str,
        target_id: &str,
        record: PairRecord,
        config: &RatingConfig,
    ) -> Self {
        let viewer = record
            .viewer_rating
            .unwrap_or_else(|| Rating::initial(viewer_id, config))
            .clamped(config);
        let target = record
            .target_rating
            .unwrap_or_else(|| Rating::initial(target_id, config))
            .clamped(config);

        Self {
            viewer,
            target,
            forward: record.forward,
            reverse: record.reverse,
            mutual_active: record.mutual_active,
        }
    }

    fn expectation(&self) -> PairExpectation {
        PairExpectation {
            forward: self.forward,
            reverse: self.reverse,
            mutual_active: self.mutual_active,
        }
    }
}

/// Requested change to the viewer's directed action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionChange {
    Record(MatchAction),
    Withdraw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutualChange {
    Unchanged,
    /// Create the mutual match, or reactivate an inactive one
    Activate,
    Deactivate,
}

/// Compare-and-swap write of one profile's rating
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingWrite {
    pub profile_id: ProfileId,
    pub rating: i32,
    pub match_count: i32,
    /// Version read when planning; 0 means the row must not exist yet
    pub expected_version: i64,
}

/// Pair state the transition was planned against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairExpectation {
    pub forward: Option<MatchAction>,
    pub reverse: Option<MatchAction>,
    pub mutual_active: Option<bool>,
}

/// Everything one action changes, applied as a single unit
#[derive(Debug, Clone, PartialEq)]
pub struct PairTransition {
    pub viewer_id: ProfileId,
    pub target_id: ProfileId,
    pub change: ActionChange,
    pub expected: PairExpectation,
    pub action_changed: bool,
    /// `(viewer, target)` rating writes; `None` for unscored changes
    pub ratings: Option<(RatingWrite, RatingWrite)>,
    pub mutual: MutualChange,
    pub mutual_active_after: bool,
}

impl PairTransition {
    /// Nothing to persist: a repeated action or a withdraw with nothing recorded
    pub fn is_noop(&self) -> bool {
        !self.action_changed && self.ratings.is_none() && self.mutual == MutualChange::Unchanged
    }
}

/// Plan the effects of `change` on a pair
///
/// Repeating the current action is a no-op, so a duplicate like neither
/// re-applies the rating delta nor creates a second mutual match. A changed
/// decision is rated as the new action; earlier deltas are not reversed.
pub fn plan_transition(state: &PairState, change: ActionChange, config: &RatingConfig) -> PairTransition {
    let forward_after = match change {
        ActionChange::Record(action) => Some(action),
        ActionChange::Withdraw => None,
    };
    let action_changed = forward_after != state.forward;

    let ratings = match change {
        ActionChange::Record(action) if action_changed && action.outcomes().is_some() => {
            let (viewer_rating, target_rating) = process_match_action(
                state.viewer.rating,
                state.target.rating,
                state.viewer.match_count,
                state.target.match_count,
                action,
                config,
            );
            Some((
                RatingWrite {
                    profile_id: state.viewer.profile_id.clone(),
                    rating: viewer_rating,
                    match_count: state.viewer.match_count.saturating_add(1),
                    expected_version: state.viewer.version,
                },
                RatingWrite {
                    profile_id: state.target.profile_id.clone(),
                    rating: target_rating,
                    match_count: state.target.match_count.saturating_add(1),
                    expected_version: state.target.version,
                },
            ))
        }
        _ => None,
    };

    let mutual_wanted =
        forward_after == Some(MatchAction::Liked) && state.reverse == Some(MatchAction::Liked);
    let mutual_active = state.mutual_active == Some(true);
    let mutual = match (mutual_wanted, mutual_active) {
        (true, false) => MutualChange::Activate,
        (false, true) => MutualChange::Deactivate,
        _ => MutualChange::Unchanged,
    };

    PairTransition {
        viewer_id: state.viewer.profile_id.clone(),
        target_id: state.target.profile_id.clone(),
        change,
        expected: state.expectation(),
        action_changed,
        ratings,
        mutual,
        mutual_active_after: mutual_wanted,
    }
}

/// What recording an action did, as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub viewer_id: ProfileId,
    pub target_id: ProfileId,
    pub action: Option<MatchAction>,
    pub viewer_rating: i32,
    pub target_rating: i32,
    pub mutual_change: MutualChange,
    pub is_mutual_match: bool,
    /// True when the action was already recorded and nothing changed
    pub duplicate: bool,
}

impl ActionOutcome {
    pub fn new(state: &PairState, transition: &PairTransition) -> Self {
        let (viewer_rating, target_rating) = match &transition.ratings {
            Some((viewer, target)) => (viewer.rating, target.rating),
            None => (state.viewer.rating, state.target.rating),
        };
        let action = match transition.change {
            ActionChange::Record(action) => Some(action),
            ActionChange::Withdraw => None,
        };

        Self {
            viewer_id: transition.viewer_id.clone(),
            target_id: transition.target_id.clone(),
            action,
            viewer_rating,
            target_rating,
            mutual_change: transition.mutual,
            is_mutual_match: transition.mutual_active_after,
            duplicate: transition.is_noop(),
        }
    }
}
