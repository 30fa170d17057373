//! Matchmaker - compatibility scoring and Elo-rated matching service
//!
//! Scores profiles against a viewer's preferences, ranks hard-filtered
//! candidate pools, and records like / dislike / pass decisions that move
//! both profiles' Elo ratings and drive the mutual-match state.

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{score, ActionOutcome, EngineOptions, MatchEngine, Matcher};
pub use error::MatchError;
pub use models::{MatchAction, MatchScore, PreferenceData, ProfileData, RatingConfig};
pub use services::{InMemoryRepository, MatchRepository, PostgresRepository, RepositoryError};
