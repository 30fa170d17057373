use crate::core::actions::MatchActionProcessor;
use crate::core::filters::matches_query_constraints;
use crate::core::matcher::{MatchResult, Matcher};
use crate::core::scoring::score;
use crate::core::state::{plan_transition, ActionChange, ActionOutcome, PairState};
use crate::error::MatchError;
use crate::models::{
    CandidateQuery, HardFiltersConfig, MatchAction, MatchHistoryItem, MatchScore, MutualMatch, Page,
    PreferenceData, ProfileData, ProfileId, Rating, RatingConfig,
};
use crate::services::repository::{MatchRepository, RepositoryError};
use std::sync::Arc;
use std::time::Duration;

/// Limits and retry budget of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Page size used when a caller passes 0
    pub default_limit: u32,
    pub max_limit: u32,
    /// Re-reads allowed after a conflicting pair commit
    pub max_commit_retries: u32,
    /// Applied to candidate lookups that carry no deadline of their own
    pub candidate_deadline: Option<Duration>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            max_commit_retries: 3,
            candidate_deadline: None,
        }
    }
}

impl EngineOptions {
    pub fn effective_limit(&self, requested: u32) -> u32 {
        let max_limit = self.max_limit.max(1);
        match requested {
            0 => self.default_limit.clamp(1, max_limit),
            n => n.min(max_limit),
        }
    }
}

/// Orchestrates scoring, candidate generation and action recording
///
/// The repository is injected at construction; the engine itself holds no
/// mutable state and is shared across request handlers behind an `Arc`.
pub struct MatchEngine<R: MatchRepository + ?Sized> {
    repo: Arc<R>,
    matcher: Matcher,
    filters: HardFiltersConfig,
    processor: MatchActionProcessor,
    options: EngineOptions,
}

impl<R: MatchRepository + ?Sized> MatchEngine<R> {
    pub fn new(
        repo: Arc<R>,
        matcher: Matcher,
        filters: HardFiltersConfig,
        rating: RatingConfig,
        options: EngineOptions,
    ) -> Result<Self, MatchError> {
        rating.validate()?;

        Ok(Self {
            repo,
            matcher,
            filters,
            processor: MatchActionProcessor::new(rating),
            options,
        })
    }

    /// Engine with default matcher, filters, rating config and options
    pub fn with_defaults(repo: Arc<R>) -> Self {
        Self {
            repo,
            matcher: Matcher::default(),
            filters: HardFiltersConfig::default(),
            processor: MatchActionProcessor::default(),
            options: EngineOptions::default(),
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn rating_config(&self) -> &RatingConfig {
        self.processor.config()
    }

    /// Score one profile against a preference set
    pub fn score(&self, profile: &ProfileData, preferences: &PreferenceData) -> MatchScore {
        score(&profile.clone().normalized(), &preferences.clone().normalized())
    }

    /// Start a candidate query carrying the configured hard filters
    pub fn candidate_query(&self, viewer_id: impl Into<ProfileId>, preferences: PreferenceData) -> CandidateQuery {
        CandidateQuery {
            viewer_id: viewer_id.into(),
            seeking_bride: None,
            exclude_ids: Vec::new(),
            preferences,
            filters: self.filters,
            limit: self.options.default_limit,
            offset: 0,
        }
    }

    /// Rank one page of candidates for the viewer
    ///
    /// Profiles the viewer already acted on are excluded together with the
    /// caller's own exclusions. The repository page is re-filtered
    /// in-process before ranking.
    pub async fn find_candidates(
        &self,
        query: CandidateQuery,
        deadline: Option<Duration>,
    ) -> Result<MatchResult, MatchError> {
        if query.viewer_id.trim().is_empty() {
            return Err(MatchError::InvalidInput("viewer id is required".to_string()));
        }

        let viewer_id = query.viewer_id.clone();
        let lookup = self.lookup_candidates(query);

        match deadline.or(self.options.candidate_deadline) {
            Some(limit) => tokio::time::timeout(limit, lookup).await.map_err(|_| {
                tracing::warn!("Candidate lookup for {} exceeded {:?}", viewer_id, limit);
                MatchError::DeadlineExceeded { viewer: viewer_id }
            })?,
            None => lookup.await,
        }
    }

    async fn lookup_candidates(&self, mut query: CandidateQuery) -> Result<MatchResult, MatchError> {
        query.limit = self.options.effective_limit(query.limit);
        query.preferences = query.preferences.normalized();

        let acted_on = self
            .repo
            .get_matched_profile_ids(&query.viewer_id)
            .await
            .map_err(|e| MatchError::repository(format!("acted-on profiles of {}", query.viewer_id), e))?;

        query.exclude_ids.extend(acted_on);
        query.exclude_ids.sort();
        query.exclude_ids.dedup();

        tracing::debug!(
            "Excluding {} profiles for viewer {}",
            query.exclude_ids.len(),
            query.viewer_id
        );

        let pool = self
            .repo
            .get_potential_profiles(&query)
            .await
            .map_err(|e| MatchError::repository(format!("candidate pool of {}", query.viewer_id), e))?;

        let fetched = pool.len();
        let config = self.rating_config();
        let eligible: Vec<_> = pool
            .into_iter()
            .filter(|candidate| matches_query_constraints(candidate, &query))
            .map(|mut candidate| {
                candidate.rating = config.clamp(candidate.rating);
                candidate
            })
            .collect();

        if eligible.len() < fetched {
            tracing::debug!(
                "Dropped {} ineligible candidates for {}",
                fetched - eligible.len(),
                query.viewer_id
            );
        }

        let result = self
            .matcher
            .rank(&query.preferences, eligible, query.limit as usize);

        tracing::info!(
            "Ranked {} of {} candidates for {}",
            result.matches.len(),
            result.total_candidates,
            query.viewer_id
        );

        Ok(result)
    }

    /// Record (or change) the viewer's decision about the target
    pub async fn record_action(
        &self,
        viewer_id: &str,
        target_id: &str,
        action: MatchAction,
    ) -> Result<ActionOutcome, MatchError> {
        self.apply(viewer_id, target_id, ActionChange::Record(action))
            .await
    }

    /// Remove the viewer's decision; an active mutual match is deactivated
    pub async fn withdraw_action(&self, viewer_id: &str, target_id: &str) -> Result<ActionOutcome, MatchError> {
        self.apply(viewer_id, target_id, ActionChange::Withdraw).await
    }

    async fn apply(
        &self,
        viewer_id: &str,
        target_id: &str,
        change: ActionChange,
    ) -> Result<ActionOutcome, MatchError> {
        validate_pair(viewer_id, target_id)?;

        let config = self.processor.config();
        let attempts = self.options.max_commit_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let record = self
                .repo
                .load_pair(viewer_id, target_id)
                .await
                .map_err(|e| MatchError::repository(format!("load {} -> {}", viewer_id, target_id), e))?;

            let state = PairState::from_record(viewer_id, target_id, record, config);
            let transition = plan_transition(&state, change, config);
            let outcome = ActionOutcome::new(&state, &transition);

            if transition.is_noop() {
                tracing::debug!("{:?} by {} on {} changes nothing", change, viewer_id, target_id);
                return Ok(outcome);
            }

            match self.repo.commit_transition(&transition).await {
                Ok(()) => {
                    tracing::info!(
                        "{:?} by {} on {} (ratings {} / {}, mutual: {:?})",
                        change,
                        viewer_id,
                        target_id,
                        outcome.viewer_rating,
                        outcome.target_rating,
                        outcome.mutual_change
                    );
                    return Ok(outcome);
                }
                Err(RepositoryError::Conflict(reason)) => {
                    tracing::warn!(
                        "Conflict committing {} -> {} (attempt {}/{}): {}",
                        viewer_id,
                        target_id,
                        attempt,
                        attempts,
                        reason
                    );
                }
                Err(e) => {
                    return Err(MatchError::repository(
                        format!("commit {} -> {}", viewer_id, target_id),
                        e,
                    ))
                }
            }
        }

        tracing::error!(
            "Giving up on {} -> {} after {} conflicting commits",
            viewer_id,
            target_id,
            attempts
        );

        Err(MatchError::Conflict {
            viewer: viewer_id.to_string(),
            target: target_id.to_string(),
            attempts,
        })
    }

    pub async fn match_history(
        &self,
        viewer_id: &str,
        status: Option<MatchAction>,
        limit: u32,
        offset: u32,
    ) -> Result<Page<MatchHistoryItem>, MatchError> {
        require_id(viewer_id, "viewer")?;
        self.repo
            .get_match_history(viewer_id, status, self.options.effective_limit(limit), offset)
            .await
            .map_err(|e| MatchError::repository(format!("history of {}", viewer_id), e))
    }

    pub async fn mutual_matches(
        &self,
        viewer_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Page<MutualMatch>, MatchError> {
        require_id(viewer_id, "viewer")?;
        self.repo
            .get_mutual_matches(viewer_id, self.options.effective_limit(limit), offset)
            .await
            .map_err(|e| MatchError::repository(format!("mutual matches of {}", viewer_id), e))
    }

    pub async fn is_mutual_match(&self, a: &str, b: &str) -> Result<bool, MatchError> {
        validate_pair(a, b)?;
        self.repo
            .check_for_mutual_match(a, b)
            .await
            .map_err(|e| MatchError::repository(format!("mutual check {} / {}", a, b), e))
    }

    /// Current rating, or the initial rating for profiles never rated
    pub async fn rating(&self, profile_id: &str) -> Result<Rating, MatchError> {
        require_id(profile_id, "profile")?;
        let config = self.processor.config();
        let stored = self
            .repo
            .get_rating(profile_id)
            .await
            .map_err(|e| MatchError::repository(format!("rating of {}", profile_id), e))?;

        Ok(stored
            .unwrap_or_else(|| Rating::initial(profile_id, config))
            .clamped(config))
    }

    pub async fn health_check(&self) -> bool {
        match self.repo.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                tracing::error!("Repository health check failed: {}", e);
                false
            }
        }
    }
}

fn require_id(id: &str, what: &str) -> Result<(), MatchError> {
    if id.trim().is_empty() {
        return Err(MatchError::InvalidInput(format!("{} id is required", what)));
    }
    Ok(())
}

/// Rejects empty ids and self-actions before any I/O
fn validate_pair(viewer_id: &str, target_id: &str) -> Result<(), MatchError> {
    require_id(viewer_id, "viewer")?;
    require_id(target_id, "target")?;
    if viewer_id == target_id {
        return Err(MatchError::SelfMatch(viewer_id.to_string()));
    }
    Ok(())
}
