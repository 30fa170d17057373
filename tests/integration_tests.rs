// Integration tests for the match engine against the in-memory repository

use async_trait::async_trait;
use chrono::{Months, NaiveDate, Utc};
use matchmaker::core::state::{PairRecord, PairTransition};
use matchmaker::core::{EngineOptions, MatchEngine, Matcher, MutualChange};
use matchmaker::error::MatchError;
use matchmaker::models::{
    Candidate, CandidateQuery, HardFiltersConfig, MatchAction, MatchHistoryItem, MutualMatch, Page,
    PreferenceData, ProfileId, Rating, RatingConfig, StoredProfile,
};
use matchmaker::services::{InMemoryRepository, MatchRepository, RepositoryError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

fn born_years_ago(years: u32) -> NaiveDate {
    Utc::now()
        .date_naive()
        .checked_sub_months(Months::new(years * 12))
        .expect("valid date")
}

fn create_profile(id: &str, is_bride: bool, age: u32, community: &str) -> StoredProfile {
    StoredProfile {
        id: id.to_string(),
        is_bride,
        date_of_birth: born_years_ago(age),
        height_cm: Some(162.4),
        physically_challenged: false,
        community: Some(community.to_string()),
        marital_status: Some("Never Married".to_string()),
        profession: Some("Engineer".to_string()),
        profession_type: Some("Private".to_string()),
        education_level: Some("Masters".to_string()),
        home_district: Some("Ernakulam".to_string()),
        is_active: true,
    }
}

fn create_preferences() -> PreferenceData {
    PreferenceData {
        min_age: Some(24),
        max_age: Some(30),
        communities: ["Syrian Catholic".to_string()].into(),
        ..Default::default()
    }
}

fn engine_with(repo: Arc<dyn MatchRepository>, max_commit_retries: u32) -> MatchEngine<dyn MatchRepository> {
    MatchEngine::new(
        repo,
        Matcher::default(),
        HardFiltersConfig::default(),
        RatingConfig::default(),
        EngineOptions {
            max_commit_retries,
            ..EngineOptions::default()
        },
    )
    .expect("valid config")
}

/// Repository wrapper that injects conflicts, races and latency
#[derive(Default)]
struct ScriptedRepository {
    inner: InMemoryRepository,
    /// Commits to reject with a conflict before delegating
    conflicts: AtomicU32,
    /// Directed like recorded behind the engine's back on the next commit
    race_like: Mutex<Option<(String, String)>>,
    pool_delay: Option<Duration>,
}

#[async_trait]
impl MatchRepository for ScriptedRepository {
    async fn get_matched_profile_ids(&self, viewer_id: &str) -> Result<Vec<ProfileId>, RepositoryError> {
        self.inner.get_matched_profile_ids(viewer_id).await
    }

    async fn get_potential_profiles(&self, query: &CandidateQuery) -> Result<Vec<Candidate>, RepositoryError> {
        if let Some(delay) = self.pool_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.get_potential_profiles(query).await
    }

    async fn record_match_action(
        &self,
        viewer_id: &str,
        target_id: &str,
        action: MatchAction,
    ) -> Result<(), RepositoryError> {
        self.inner.record_match_action(viewer_id, target_id, action).await
    }

    async fn check_for_mutual_match(&self, a: &str, b: &str) -> Result<bool, RepositoryError> {
        self.inner.check_for_mutual_match(a, b).await
    }

    async fn create_mutual_match(&self, a: &str, b: &str) -> Result<(), RepositoryError> {
        self.inner.create_mutual_match(a, b).await
    }

    async fn deactivate_mutual_match(&self, a: &str, b: &str) -> Result<(), RepositoryError> {
        self.inner.deactivate_mutual_match(a, b).await
    }

    async fn get_match_history(
        &self,
        viewer_id: &str,
        status: Option<MatchAction>,
        limit: u32,
        offset: u32,
    ) -> Result<Page<MatchHistoryItem>, RepositoryError> {
        self.inner.get_match_history(viewer_id, status, limit, offset).await
    }

    async fn get_mutual_matches(
        &self,
        viewer_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Page<MutualMatch>, RepositoryError> {
        self.inner.get_mutual_matches(viewer_id, limit, offset).await
    }

    async fn get_rating(&self, profile_id: &str) -> Result<Option<Rating>, RepositoryError> {
        self.inner.get_rating(profile_id).await
    }

    async fn load_pair(&self, viewer_id: &str, target_id: &str) -> Result<PairRecord, RepositoryError> {
        self.inner.load_pair(viewer_id, target_id).await
    }

    async fn commit_transition(&self, transition: &PairTransition) -> Result<(), RepositoryError> {
        let pending = self.conflicts.load(Ordering::SeqCst);
        if pending > 0 {
            self.conflicts.store(pending - 1, Ordering::SeqCst);
            return Err(RepositoryError::Conflict("scripted".to_string()));
        }

        if let Some((viewer, target)) = self.race_like.lock().await.take() {
            self.inner
                .record_match_action(&viewer, &target, MatchAction::Liked)
                .await?;
        }

        self.inner.commit_transition(transition).await
    }
}

#[tokio::test]
async fn test_reciprocal_likes_create_one_mutual_match() {
    let repo = Arc::new(InMemoryRepository::default());
    let engine = MatchEngine::with_defaults(repo.clone());

    let first = engine.record_action("alice", "bob", MatchAction::Liked).await.unwrap();
    assert!(!first.is_mutual_match);
    assert_eq!(first.mutual_change, MutualChange::Unchanged);

    let second = engine.record_action("bob", "alice", MatchAction::Liked).await.unwrap();
    assert!(second.is_mutual_match);
    assert_eq!(second.mutual_change, MutualChange::Activate);

    // Duplicate likes from either side change nothing
    let alice_before = engine.rating("alice").await.unwrap();
    for (viewer, target) in [("alice", "bob"), ("bob", "alice")] {
        let again = engine.record_action(viewer, target, MatchAction::Liked).await.unwrap();
        assert!(again.duplicate);
        assert!(again.is_mutual_match);
    }
    assert_eq!(engine.rating("alice").await.unwrap(), alice_before);

    assert_eq!(repo.mutual_match_rows("alice", "bob").await.len(), 1);
    assert!(engine.is_mutual_match("bob", "alice").await.unwrap());

    let mutual = engine.mutual_matches("alice", 0, 0).await.unwrap();
    assert_eq!(mutual.total, 1);
    assert_eq!(mutual.items[0].other("alice"), "bob");
}

#[tokio::test]
async fn test_dislike_deactivates_mutual_match_once() {
    let repo = Arc::new(InMemoryRepository::default());
    let engine = MatchEngine::with_defaults(repo.clone());

    engine.record_action("alice", "bob", MatchAction::Liked).await.unwrap();
    engine.record_action("bob", "alice", MatchAction::Liked).await.unwrap();

    let dislike = engine.record_action("alice", "bob", MatchAction::Disliked).await.unwrap();
    assert_eq!(dislike.mutual_change, MutualChange::Deactivate);
    assert!(!dislike.is_mutual_match);

    let again = engine.record_action("alice", "bob", MatchAction::Disliked).await.unwrap();
    assert!(again.duplicate);
    assert_eq!(again.mutual_change, MutualChange::Unchanged);

    let rows = repo.mutual_match_rows("alice", "bob").await;
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].is_active);
    assert!(rows[0].deactivated_at.is_some());
    assert_eq!(engine.mutual_matches("bob", 10, 0).await.unwrap().total, 0);
}

#[tokio::test]
async fn test_relike_reactivates_same_row() {
    let repo = Arc::new(InMemoryRepository::default());
    let engine = MatchEngine::with_defaults(repo.clone());

    engine.record_action("alice", "bob", MatchAction::Liked).await.unwrap();
    engine.record_action("bob", "alice", MatchAction::Liked).await.unwrap();
    engine.record_action("alice", "bob", MatchAction::Disliked).await.unwrap();

    let relike = engine.record_action("alice", "bob", MatchAction::Liked).await.unwrap();
    assert_eq!(relike.mutual_change, MutualChange::Activate);

    let rows = repo.mutual_match_rows("alice", "bob").await;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_active);
}

#[tokio::test]
async fn test_dislike_rewards_target() {
    let engine = MatchEngine::with_defaults(Arc::new(InMemoryRepository::default()));

    let outcome = engine.record_action("alice", "bob", MatchAction::Disliked).await.unwrap();

    assert_eq!((outcome.viewer_rating, outcome.target_rating), (1484, 1516));
    assert_eq!(engine.rating("bob").await.unwrap().match_count, 1);
}

#[tokio::test]
async fn test_pass_records_history_without_rating_change() {
    let engine = MatchEngine::with_defaults(Arc::new(InMemoryRepository::default()));

    let outcome = engine.record_action("alice", "bob", MatchAction::Passed).await.unwrap();
    assert_eq!((outcome.viewer_rating, outcome.target_rating), (1500, 1500));
    assert!(!outcome.duplicate);

    let alice = engine.rating("alice").await.unwrap();
    assert_eq!((alice.rating, alice.match_count), (1500, 0));

    let history = engine.match_history("alice", None, 10, 0).await.unwrap();
    assert_eq!(history.total, 1);
    assert_eq!(history.items[0].action, MatchAction::Passed);
}

#[tokio::test]
async fn test_withdraw_removes_action_and_mutual_match() {
    let engine = MatchEngine::with_defaults(Arc::new(InMemoryRepository::default()));

    engine.record_action("alice", "bob", MatchAction::Liked).await.unwrap();
    engine.record_action("bob", "alice", MatchAction::Liked).await.unwrap();

    let withdrawn = engine.withdraw_action("alice", "bob").await.unwrap();
    assert_eq!(withdrawn.action, None);
    assert_eq!(withdrawn.mutual_change, MutualChange::Deactivate);

    assert_eq!(engine.match_history("alice", None, 10, 0).await.unwrap().total, 0);
    assert!(!engine.is_mutual_match("alice", "bob").await.unwrap());

    let nothing_left = engine.withdraw_action("alice", "bob").await.unwrap();
    assert!(nothing_left.duplicate);
}

#[tokio::test]
async fn test_self_match_is_an_error_not_a_pass() {
    let engine = MatchEngine::with_defaults(Arc::new(InMemoryRepository::default()));

    let err = engine.record_action("alice", "alice", MatchAction::Liked).await.unwrap_err();
    assert!(matches!(err, MatchError::SelfMatch(_)));
    assert!(err.is_invalid_input());

    assert_eq!(engine.match_history("alice", None, 10, 0).await.unwrap().total, 0);
}

#[tokio::test]
async fn test_conflicts_are_retried_and_applied_once() {
    let repo = Arc::new(ScriptedRepository {
        conflicts: AtomicU32::new(2),
        ..Default::default()
    });
    let engine = engine_with(repo.clone(), 3);

    let outcome = engine.record_action("alice", "bob", MatchAction::Liked).await.unwrap();
    assert_eq!(outcome.viewer_rating, 1516);

    let alice = engine.rating("alice").await.unwrap();
    assert_eq!((alice.rating, alice.match_count), (1516, 1));
}

#[tokio::test]
async fn test_conflicts_exhaust_retry_budget() {
    let repo = Arc::new(ScriptedRepository {
        conflicts: AtomicU32::new(10),
        ..Default::default()
    });
    let engine = engine_with(repo, 2);

    let err = engine.record_action("alice", "bob", MatchAction::Liked).await.unwrap_err();
    assert!(matches!(err, MatchError::Conflict { attempts: 3, .. }));
    assert_eq!(engine.rating("alice").await.unwrap().rating, 1500);
}

#[tokio::test]
async fn test_racing_reverse_like_still_creates_mutual_match() {
    let repo = Arc::new(ScriptedRepository {
        race_like: Mutex::new(Some(("bob".to_string(), "alice".to_string()))),
        ..Default::default()
    });
    let engine = engine_with(repo.clone(), 3);

    // The reverse like lands between read and commit; the re-read sees it
    let outcome = engine.record_action("alice", "bob", MatchAction::Liked).await.unwrap();

    assert!(outcome.is_mutual_match);
    assert_eq!(outcome.mutual_change, MutualChange::Activate);
    assert!(repo.inner.check_for_mutual_match("alice", "bob").await.unwrap());
    assert_eq!(repo.inner.get_mutual_matches("bob", 10, 0).await.unwrap().total, 1);
}

#[tokio::test]
async fn test_concurrent_likes_on_one_target_all_counted() {
    let repo: Arc<dyn MatchRepository> = Arc::new(InMemoryRepository::default());
    let engine = Arc::new(engine_with(repo, 10));

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .record_action(&format!("viewer-{}", i), "target", MatchAction::Liked)
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let target = engine.rating("target").await.unwrap();
    assert_eq!(target.match_count, 5);
    assert!(target.rating < 1500);
}

#[tokio::test]
async fn test_concurrent_reciprocal_likes() {
    let repo = Arc::new(InMemoryRepository::default());
    let engine = Arc::new(engine_with(repo.clone(), 5));

    let a = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.record_action("alice", "bob", MatchAction::Liked).await })
    };
    let b = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.record_action("bob", "alice", MatchAction::Liked).await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let rows = repo.mutual_match_rows("alice", "bob").await;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_active);
    assert_eq!(engine.rating("alice").await.unwrap().match_count, 2);
    assert_eq!(engine.rating("bob").await.unwrap().match_count, 2);
}

async fn seeded_repo() -> Arc<InMemoryRepository> {
    let repo = Arc::new(InMemoryRepository::default());
    repo.insert_profile(create_profile("viewer", false, 29, "Syrian Catholic")).await;
    repo.insert_profile(create_profile("b1", true, 27, "Syrian Catholic")).await;
    repo.insert_profile(create_profile("b2", true, 26, "Latin Catholic")).await;
    repo.insert_profile(create_profile("b3", true, 29, "Syrian Catholic")).await;
    repo.insert_profile(create_profile("b4", true, 40, "Syrian Catholic")).await;
    repo.insert_profile(create_profile("g1", false, 27, "Syrian Catholic")).await;

    let mut inactive = create_profile("b5", true, 27, "Syrian Catholic");
    inactive.is_active = false;
    repo.insert_profile(inactive).await;

    repo
}

#[tokio::test]
async fn test_find_candidates_filters_and_ranks() {
    let repo = seeded_repo().await;
    repo.set_rating(Rating {
        profile_id: "b3".to_string(),
        rating: 1700,
        match_count: 3,
        version: 1,
    })
    .await;
    let engine = MatchEngine::with_defaults(repo);

    let mut query = engine.candidate_query("viewer", create_preferences());
    query.seeking_bride = Some(true);

    let result = engine.find_candidates(query, None).await.unwrap();

    // b4 fails the age filter, b5 is inactive, g1 is not a bride
    let ids: Vec<&str> = result.matches.iter().map(|m| m.profile_id.as_str()).collect();
    assert_eq!(ids, vec!["b3", "b1", "b2"]);
    assert_eq!(result.matches[0].match_score, 35.0);
    assert_eq!(result.matches[2].match_score, 15.0);
}

#[tokio::test]
async fn test_find_candidates_skips_acted_on_and_excluded() {
    let engine = MatchEngine::with_defaults(seeded_repo().await);
    engine.record_action("viewer", "b1", MatchAction::Passed).await.unwrap();

    let mut query = engine.candidate_query("viewer", create_preferences());
    query.seeking_bride = Some(true);
    query.exclude_ids = vec!["b2".to_string()];

    let result = engine.find_candidates(query, None).await.unwrap();

    let ids: Vec<&str> = result.matches.iter().map(|m| m.profile_id.as_str()).collect();
    assert_eq!(ids, vec!["b3"]);
}

#[tokio::test]
async fn test_find_candidates_pagination() {
    let engine = MatchEngine::with_defaults(seeded_repo().await);

    let mut first = engine.candidate_query("viewer", PreferenceData::default());
    first.seeking_bride = Some(true);
    first.limit = 2;
    let mut second = first.clone();
    second.offset = 2;

    let page_one = engine.find_candidates(first, None).await.unwrap();
    let page_two = engine.find_candidates(second, None).await.unwrap();

    assert_eq!(page_one.matches.len(), 2);
    assert_eq!(page_two.matches.len(), 2);
    let mut seen: Vec<String> = page_one
        .matches
        .iter()
        .chain(page_two.matches.iter())
        .map(|m| m.profile_id.clone())
        .collect();
    seen.sort();
    assert_eq!(seen, vec!["b1", "b2", "b3", "b4"]);
}

#[tokio::test]
async fn test_find_candidates_deadline() {
    let repo = Arc::new(ScriptedRepository {
        pool_delay: Some(Duration::from_millis(500)),
        ..Default::default()
    });
    let engine = engine_with(repo, 3);

    let query = engine.candidate_query("viewer", PreferenceData::default());
    let err = engine
        .find_candidates(query, Some(Duration::from_millis(10)))
        .await
        .unwrap_err();

    assert!(matches!(err, MatchError::DeadlineExceeded { viewer } if viewer == "viewer"));
}

#[tokio::test]
async fn test_history_status_filter() {
    let engine = MatchEngine::with_defaults(Arc::new(InMemoryRepository::default()));
    engine.record_action("alice", "bob", MatchAction::Liked).await.unwrap();
    engine.record_action("alice", "carol", MatchAction::Disliked).await.unwrap();
    engine.record_action("alice", "dave", MatchAction::Liked).await.unwrap();

    let liked = engine
        .match_history("alice", Some(MatchAction::Liked), 10, 0)
        .await
        .unwrap();
    assert_eq!(liked.total, 2);
    assert_eq!(liked.items[0].target_profile_id, "dave");

    let page = engine.match_history("alice", None, 1, 1).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].target_profile_id, "carol");
}

#[tokio::test]
async fn test_out_of_bounds_rating_clamped_on_read() {
    let repo = Arc::new(InMemoryRepository::default());
    repo.set_rating(Rating {
        profile_id: "alice".to_string(),
        rating: 5000,
        match_count: 7,
        version: 3,
    })
    .await;
    let engine = MatchEngine::with_defaults(repo);

    assert_eq!(engine.rating("alice").await.unwrap().rating, 3000);

    let outcome = engine.record_action("alice", "bob", MatchAction::Liked).await.unwrap();
    assert!(outcome.viewer_rating <= 3000);
}

#[tokio::test]
async fn test_candidate_ratings_clamped_before_ranking() {
    let repo = seeded_repo().await;
    repo.set_rating(Rating {
        profile_id: "b1".to_string(),
        rating: 4200,
        match_count: 2,
        version: 1,
    })
    .await;
    let engine = MatchEngine::with_defaults(repo);

    let mut query = engine.candidate_query("viewer", PreferenceData::default());
    query.seeking_bride = Some(true);

    let result = engine.find_candidates(query, None).await.unwrap();

    let b1 = result
        .matches
        .iter()
        .find(|m| m.profile_id == "b1")
        .expect("b1 is a candidate");
    assert_eq!(b1.rating, 3000);
    assert!(result.matches.iter().all(|m| (1000..=3000).contains(&m.rating)));
}
