use crate::core::state::{PairRecord, PairTransition};
use crate::models::{
    Candidate, CandidateQuery, MatchAction, MatchHistoryItem, MutualMatch, Page, ProfileId, Rating,
};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur in a match repository
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    /// The pair or a rating changed after it was read; re-read and retry
    #[error("Concurrent update: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Persistence contract the matching engine depends on
///
/// Implementations own all storage mechanics; the engine only plans
/// transitions and hands them to [`MatchRepository::commit_transition`].
#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Profiles the viewer already acted on, excluded from candidate pools
    async fn get_matched_profile_ids(&self, viewer_id: &str) -> Result<Vec<ProfileId>, RepositoryError>;

    /// One page of active profiles passing the query's enabled hard filters
    async fn get_potential_profiles(&self, query: &CandidateQuery) -> Result<Vec<Candidate>, RepositoryError>;

    /// Upsert the directed action without touching ratings or mutual matches
    async fn record_match_action(
        &self,
        viewer_id: &str,
        target_id: &str,
        action: MatchAction,
    ) -> Result<(), RepositoryError>;

    /// True when both directed actions between the pair are `liked`
    async fn check_for_mutual_match(&self, a: &str, b: &str) -> Result<bool, RepositoryError>;

    /// Create (or reactivate) the mutual match; repeating it is harmless
    async fn create_mutual_match(&self, a: &str, b: &str) -> Result<(), RepositoryError>;

    /// Deactivate an active mutual match; repeating it is harmless
    async fn deactivate_mutual_match(&self, a: &str, b: &str) -> Result<(), RepositoryError>;

    /// Most recent actions first
    async fn get_match_history(
        &self,
        viewer_id: &str,
        status: Option<MatchAction>,
        limit: u32,
        offset: u32,
    ) -> Result<Page<MatchHistoryItem>, RepositoryError>;

    /// Active mutual matches involving the viewer, most recent first
    async fn get_mutual_matches(
        &self,
        viewer_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Page<MutualMatch>, RepositoryError>;

    async fn get_rating(&self, profile_id: &str) -> Result<Option<Rating>, RepositoryError>;

    /// Snapshot of both directions of a pair plus both ratings
    async fn load_pair(&self, viewer_id: &str, target_id: &str) -> Result<PairRecord, RepositoryError>;

    /// Apply a planned transition as one atomic unit
    ///
    /// Must fail with [`RepositoryError::Conflict`], applying nothing, when
    /// the pair no longer matches `transition.expected` or a rating version
    /// moved since it was read.
    async fn commit_transition(&self, transition: &PairTransition) -> Result<(), RepositoryError>;

    async fn health_check(&self) -> Result<bool, RepositoryError> {
        Ok(true)
    }
}
