// Core algorithm exports
pub mod actions;
pub mod elo;
pub mod engine;
pub mod filters;
pub mod matcher;
pub mod scoring;
pub mod state;

pub use actions::{process_match_action, MatchActionProcessor};
pub use elo::{dynamic_k_factor, expected_outcome, update_rating};
pub use engine::{EngineOptions, MatchEngine};
pub use filters::{matches_query_constraints, passes_hard_filters};
pub use matcher::{MatchResult, Matcher};
pub use scoring::score;
pub use state::{plan_transition, ActionChange, ActionOutcome, MutualChange, PairState, PairTransition};
