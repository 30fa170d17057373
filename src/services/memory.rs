use crate::core::filters::matches_query_constraints;
use crate::core::state::{ActionChange, MutualChange, PairExpectation, PairRecord, PairTransition};
use crate::models::{
    canonical_pair, Candidate, CandidateQuery, MatchAction, MatchHistoryItem, MutualMatch, Page,
    ProfileData, ProfileId, Rating, RatingConfig, StoredProfile,
};
use crate::services::repository::{MatchRepository, RepositoryError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct ActionRecord {
    action: MatchAction,
    acted_at: DateTime<Utc>,
    /// Insertion order, breaks timestamp ties
    seq: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    profiles: BTreeMap<ProfileId, StoredProfile>,
    actions: HashMap<(ProfileId, ProfileId), ActionRecord>,
    ratings: HashMap<ProfileId, Rating>,
    mutual: HashMap<(ProfileId, ProfileId), MutualMatch>,
    next_seq: u64,
}

impl MemoryState {
    fn action(&self, viewer_id: &str, target_id: &str) -> Option<MatchAction> {
        self.actions
            .get(&(viewer_id.to_string(), target_id.to_string()))
            .map(|record| record.action)
    }

    fn mutual_active(&self, a: &str, b: &str) -> Option<bool> {
        self.mutual.get(&canonical_pair(a, b)).map(|m| m.is_active)
    }

    fn upsert_action(&mut self, viewer_id: &str, target_id: &str, action: MatchAction) {
        self.next_seq += 1;
        self.actions.insert(
            (viewer_id.to_string(), target_id.to_string()),
            ActionRecord {
                action,
                acted_at: Utc::now(),
                seq: self.next_seq,
            },
        );
    }

    fn activate_mutual(&mut self, a: &str, b: &str) {
        let (profile_a, profile_b) = canonical_pair(a, b);
        let entry = self
            .mutual
            .entry((profile_a.clone(), profile_b.clone()))
            .or_insert_with(|| MutualMatch {
                profile_a,
                profile_b,
                is_active: false,
                matched_at: Utc::now(),
                deactivated_at: None,
            });

        if !entry.is_active {
            entry.is_active = true;
            entry.matched_at = Utc::now();
            entry.deactivated_at = None;
        }
    }

    fn deactivate_mutual(&mut self, a: &str, b: &str) {
        if let Some(entry) = self.mutual.get_mut(&canonical_pair(a, b)) {
            if entry.is_active {
                entry.is_active = false;
                entry.deactivated_at = Some(Utc::now());
            }
        }
    }
}

/// Process-local repository with the same semantics as the Postgres one
///
/// A single lock serializes writers, which makes every committed
/// transition atomic. Used by tests and local development.
pub struct InMemoryRepository {
    state: RwLock<MemoryState>,
    initial_rating: i32,
}

impl InMemoryRepository {
    pub fn new(config: &RatingConfig) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            initial_rating: config.initial_rating,
        }
    }

    /// Add or replace a profile in the candidate pool
    pub async fn insert_profile(&self, profile: StoredProfile) {
        let mut state = self.state.write().await;
        state.profiles.insert(profile.id.clone(), profile);
    }

    /// Overwrite a stored rating as-is, without bounds checks
    pub async fn set_rating(&self, rating: Rating) {
        let mut state = self.state.write().await;
        state.ratings.insert(rating.profile_id.clone(), rating);
    }

    /// Every mutual match row for the pair, active or not
    pub async fn mutual_match_rows(&self, a: &str, b: &str) -> Vec<MutualMatch> {
        let state = self.state.read().await;
        state
            .mutual
            .get(&canonical_pair(a, b))
            .cloned()
            .into_iter()
            .collect()
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new(&RatingConfig::default())
    }
}

fn reject_self(viewer_id: &str, target_id: &str) -> Result<(), RepositoryError> {
    if viewer_id == target_id {
        return Err(RepositoryError::InvalidInput(format!(
            "profile {} cannot act on itself",
            viewer_id
        )));
    }
    Ok(())
}

fn page<T>(items: Vec<T>, limit: u32, offset: u32) -> Page<T> {
    let total = items.len() as u64;
    let items = items
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect();
    Page { items, total }
}

#[async_trait]
impl MatchRepository for InMemoryRepository {
    async fn get_matched_profile_ids(&self, viewer_id: &str) -> Result<Vec<ProfileId>, RepositoryError> {
        let state = self.state.read().await;
        let mut ids: Vec<ProfileId> = state
            .actions
            .keys()
            .filter(|(viewer, _)| viewer == viewer_id)
            .map(|(_, target)| target.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn get_potential_profiles(&self, query: &CandidateQuery) -> Result<Vec<Candidate>, RepositoryError> {
        let state = self.state.read().await;
        let today = Utc::now().date_naive();

        let candidates = state
            .profiles
            .values()
            .filter(|stored| stored.is_active)
            .map(|stored| Candidate {
                id: stored.id.clone(),
                profile: ProfileData::from_stored(stored, today),
                rating: state
                    .ratings
                    .get(&stored.id)
                    .map(|r| r.rating)
                    .unwrap_or(self.initial_rating),
            })
            .filter(|candidate| matches_query_constraints(candidate, query))
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect();

        Ok(candidates)
    }

    async fn record_match_action(
        &self,
        viewer_id: &str,
        target_id: &str,
        action: MatchAction,
    ) -> Result<(), RepositoryError> {
        reject_self(viewer_id, target_id)?;
        let mut state = self.state.write().await;
        state.upsert_action(viewer_id, target_id, action);
        Ok(())
    }

    async fn check_for_mutual_match(&self, a: &str, b: &str) -> Result<bool, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.action(a, b) == Some(MatchAction::Liked) && state.action(b, a) == Some(MatchAction::Liked))
    }

    async fn create_mutual_match(&self, a: &str, b: &str) -> Result<(), RepositoryError> {
        reject_self(a, b)?;
        let mut state = self.state.write().await;
        state.activate_mutual(a, b);
        Ok(())
    }

    async fn deactivate_mutual_match(&self, a: &str, b: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.deactivate_mutual(a, b);
        Ok(())
    }

    async fn get_match_history(
        &self,
        viewer_id: &str,
        status: Option<MatchAction>,
        limit: u32,
        offset: u32,
    ) -> Result<Page<MatchHistoryItem>, RepositoryError> {
        let state = self.state.read().await;
        let mut records: Vec<(&ProfileId, &ActionRecord)> = state
            .actions
            .iter()
            .filter(|((viewer, _), record)| {
                viewer == viewer_id && status.map_or(true, |s| record.action == s)
            })
            .map(|((_, target), record)| (target, record))
            .collect();

        records.sort_by(|(_, a), (_, b)| {
            b.acted_at.cmp(&a.acted_at).then_with(|| b.seq.cmp(&a.seq))
        });

        let items = records
            .into_iter()
            .map(|(target, record)| MatchHistoryItem {
                target_profile_id: target.clone(),
                action: record.action,
                timestamp: record.acted_at,
            })
            .collect();

        Ok(page(items, limit, offset))
    }

    async fn get_mutual_matches(
        &self,
        viewer_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Page<MutualMatch>, RepositoryError> {
        let state = self.state.read().await;
        let mut matches: Vec<MutualMatch> = state
            .mutual
            .values()
            .filter(|m| m.is_active && (m.profile_a == viewer_id || m.profile_b == viewer_id))
            .cloned()
            .collect();

        matches.sort_by(|a, b| {
            b.matched_at
                .cmp(&a.matched_at)
                .then_with(|| a.profile_a.cmp(&b.profile_a))
                .then_with(|| a.profile_b.cmp(&b.profile_b))
        });

        Ok(page(matches, limit, offset))
    }

    async fn get_rating(&self, profile_id: &str) -> Result<Option<Rating>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.ratings.get(profile_id).cloned())
    }

    async fn load_pair(&self, viewer_id: &str, target_id: &str) -> Result<PairRecord, RepositoryError> {
        let state = self.state.read().await;
        Ok(PairRecord {
            viewer_rating: state.ratings.get(viewer_id).cloned(),
            target_rating: state.ratings.get(target_id).cloned(),
            forward: state.action(viewer_id, target_id),
            reverse: state.action(target_id, viewer_id),
            mutual_active: state.mutual_active(viewer_id, target_id),
        })
    }

    async fn commit_transition(&self, transition: &PairTransition) -> Result<(), RepositoryError> {
        let viewer_id = transition.viewer_id.as_str();
        let target_id = transition.target_id.as_str();
        reject_self(viewer_id, target_id)?;

        let mut state = self.state.write().await;

        let current = PairExpectation {
            forward: state.action(viewer_id, target_id),
            reverse: state.action(target_id, viewer_id),
            mutual_active: state.mutual_active(viewer_id, target_id),
        };
        if current != transition.expected {
            return Err(RepositoryError::Conflict(format!(
                "pair {} / {} changed since it was read",
                viewer_id, target_id
            )));
        }

        if let Some((viewer, target)) = &transition.ratings {
            for write in [viewer, target] {
                let version = state
                    .ratings
                    .get(&write.profile_id)
                    .map(|r| r.version)
                    .unwrap_or(0);
                if version != write.expected_version {
                    return Err(RepositoryError::Conflict(format!(
                        "rating of {} is at version {}, expected {}",
                        write.profile_id, version, write.expected_version
                    )));
                }
            }
        }

        match transition.change {
            ActionChange::Record(action) => state.upsert_action(viewer_id, target_id, action),
            ActionChange::Withdraw => {
                state
                    .actions
                    .remove(&(viewer_id.to_string(), target_id.to_string()));
            }
        }

        if let Some((viewer, target)) = &transition.ratings {
            for write in [viewer, target] {
                state.ratings.insert(
                    write.profile_id.clone(),
                    Rating {
                        profile_id: write.profile_id.clone(),
                        rating: write.rating,
                        match_count: write.match_count,
                        version: write.expected_version + 1,
                    },
                );
            }
        }

        match transition.mutual {
            MutualChange::Activate => state.activate_mutual(viewer_id, target_id),
            MutualChange::Deactivate => state.deactivate_mutual(viewer_id, target_id),
            MutualChange::Unchanged => {}
        }

        Ok(())
    }
}
