use crate::core::state::{ActionChange, MutualChange, PairExpectation, PairRecord, PairTransition, RatingWrite};
use crate::models::{
    canonical_pair, Candidate, CandidateQuery, MatchAction, MatchHistoryItem, MutualMatch, Page,
    ProfileData, ProfileId, Rating, StoredProfile,
};
use crate::services::repository::{MatchRepository, RepositoryError};
use async_trait::async_trait;
use chrono::{Months, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};
use std::time::Duration;

/// Database representation of [`MatchAction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "match_action", rename_all = "lowercase")]
pub enum ActionType {
    Liked,
    Disliked,
    Passed,
}

impl From<MatchAction> for ActionType {
    fn from(value: MatchAction) -> Self {
        match value {
            MatchAction::Liked => ActionType::Liked,
            MatchAction::Disliked => ActionType::Disliked,
            MatchAction::Passed => ActionType::Passed,
        }
    }
}

impl From<ActionType> for MatchAction {
    fn from(value: ActionType) -> Self {
        match value {
            ActionType::Liked => MatchAction::Liked,
            ActionType::Disliked => MatchAction::Disliked,
            ActionType::Passed => MatchAction::Passed,
        }
    }
}

/// PostgreSQL-backed match repository
///
/// Profiles are read from the `profiles` table maintained by the profile
/// service; actions, ratings and mutual matches are owned here. Pair
/// commits are serialized with a transaction-scoped advisory lock on the
/// unordered pair, and rating writes are compare-and-swap on `version`.
pub struct PostgresRepository {
    pool: PgPool,
    initial_rating: i32,
}

impl PostgresRepository {
    /// Connect, run migrations and build the repository
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
        initial_rating: i32,
    ) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool, initial_rating })
    }

    /// Create a repository from optional settings, falling back to pool defaults
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
        initial_rating: i32,
    ) -> Result<Self, RepositoryError> {
        tracing::info!(
            "Connecting to PostgreSQL (max: {} connections)",
            max_connections.unwrap_or(10)
        );

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
            initial_rating,
        )
        .await
    }
}

/// Height rounded half away from zero, the same way `normalize_height` rounds
const ROUNDED_HEIGHT: &str = "FLOOR(p.height_cm + 0.5)";

/// `today` shifted back by whole years, used to turn age bounds into birth date bounds
fn years_before(today: NaiveDate, years: i32) -> Option<NaiveDate> {
    let months = u32::try_from(years).ok()?.checked_mul(12)?;
    today.checked_sub_months(Months::new(months))
}

fn row_to_candidate(row: &PgRow, today: NaiveDate) -> Result<Candidate, sqlx::Error> {
    let stored = StoredProfile {
        id: row.try_get("id")?,
        is_bride: row.try_get("is_bride")?,
        date_of_birth: row.try_get("date_of_birth")?,
        height_cm: row.try_get("height_cm")?,
        physically_challenged: row.try_get("physically_challenged")?,
        community: row.try_get("community")?,
        marital_status: row.try_get("marital_status")?,
        profession: row.try_get("profession")?,
        profession_type: row.try_get("profession_type")?,
        education_level: row.try_get("education_level")?,
        home_district: row.try_get("home_district")?,
        is_active: row.try_get("is_active")?,
    };

    Ok(Candidate {
        profile: ProfileData::from_stored(&stored, today),
        id: stored.id,
        rating: row.try_get("rating")?,
    })
}

fn row_to_rating(row: &PgRow) -> Result<Rating, sqlx::Error> {
    Ok(Rating {
        profile_id: row.try_get("profile_id")?,
        rating: row.try_get("rating")?,
        match_count: row.try_get("match_count")?,
        version: row.try_get("version")?,
    })
}

fn row_to_mutual(row: &PgRow) -> Result<MutualMatch, sqlx::Error> {
    Ok(MutualMatch {
        profile_a: row.try_get("profile_a")?,
        profile_b: row.try_get("profile_b")?,
        is_active: row.try_get("is_active")?,
        matched_at: row.try_get("matched_at")?,
        deactivated_at: row.try_get("deactivated_at")?,
    })
}

async fn fetch_action(
    conn: &mut PgConnection,
    viewer_id: &str,
    target_id: &str,
) -> Result<Option<MatchAction>, RepositoryError> {
    let row = sqlx::query("SELECT action FROM match_actions WHERE viewer_id = $1 AND target_id = $2")
        .bind(viewer_id)
        .bind(target_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(|r| r.try_get::<ActionType, _>("action").map(MatchAction::from))
        .transpose()
        .map_err(Into::into)
}

async fn fetch_mutual_active(conn: &mut PgConnection, a: &str, b: &str) -> Result<Option<bool>, RepositoryError> {
    let (profile_a, profile_b) = canonical_pair(a, b);
    let active = sqlx::query_scalar::<_, bool>(
        "SELECT is_active FROM mutual_matches WHERE profile_a = $1 AND profile_b = $2",
    )
    .bind(profile_a)
    .bind(profile_b)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(active)
}

async fn fetch_rating(conn: &mut PgConnection, profile_id: &str) -> Result<Option<Rating>, RepositoryError> {
    let row = sqlx::query(
        "SELECT profile_id, rating, match_count, version FROM profile_ratings WHERE profile_id = $1",
    )
    .bind(profile_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(row_to_rating).transpose().map_err(Into::into)
}

/// Uses INSERT ... ON CONFLICT so re-recording replaces the prior decision
async fn upsert_action(
    conn: &mut PgConnection,
    viewer_id: &str,
    target_id: &str,
    action: MatchAction,
) -> Result<(), RepositoryError> {
    let query = r#"
        INSERT INTO match_actions (viewer_id, target_id, action, acted_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (viewer_id, target_id)
        DO UPDATE SET
            action = EXCLUDED.action,
            acted_at = EXCLUDED.acted_at
    "#;

    sqlx::query(query)
        .bind(viewer_id)
        .bind(target_id)
        .bind(ActionType::from(action))
        .execute(&mut *conn)
        .await?;

    Ok(())
}

async fn delete_action(conn: &mut PgConnection, viewer_id: &str, target_id: &str) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM match_actions WHERE viewer_id = $1 AND target_id = $2")
        .bind(viewer_id)
        .bind(target_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Compare-and-swap on `version`; version 0 means the row must not exist yet
async fn write_rating(conn: &mut PgConnection, write: &RatingWrite) -> Result<(), RepositoryError> {
    let query = r#"
        INSERT INTO profile_ratings (profile_id, rating, match_count, version, updated_at)
        VALUES ($1, $2, $3, 1, NOW())
        ON CONFLICT (profile_id)
        DO UPDATE SET
            rating = EXCLUDED.rating,
            match_count = EXCLUDED.match_count,
            version = profile_ratings.version + 1,
            updated_at = NOW()
        WHERE profile_ratings.version = $4
    "#;

    let result = sqlx::query(query)
        .bind(&write.profile_id)
        .bind(write.rating)
        .bind(write.match_count)
        .bind(write.expected_version)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(format!(
            "rating of {} moved past version {}",
            write.profile_id, write.expected_version
        )));
    }

    Ok(())
}

async fn activate_mutual(conn: &mut PgConnection, a: &str, b: &str) -> Result<(), RepositoryError> {
    let (profile_a, profile_b) = canonical_pair(a, b);
    let query = r#"
        INSERT INTO mutual_matches (profile_a, profile_b, is_active, matched_at)
        VALUES ($1, $2, TRUE, NOW())
        ON CONFLICT (profile_a, profile_b)
        DO UPDATE SET
            is_active = TRUE,
            matched_at = NOW(),
            deactivated_at = NULL
        WHERE mutual_matches.is_active = FALSE
    "#;

    sqlx::query(query)
        .bind(profile_a)
        .bind(profile_b)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

async fn deactivate_mutual(conn: &mut PgConnection, a: &str, b: &str) -> Result<(), RepositoryError> {
    let (profile_a, profile_b) = canonical_pair(a, b);
    let query = r#"
        UPDATE mutual_matches
        SET is_active = FALSE, deactivated_at = NOW()
        WHERE profile_a = $1 AND profile_b = $2 AND is_active
    "#;

    sqlx::query(query)
        .bind(profile_a)
        .bind(profile_b)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

#[async_trait]
impl MatchRepository for PostgresRepository {
    async fn get_matched_profile_ids(&self, viewer_id: &str) -> Result<Vec<ProfileId>, RepositoryError> {
        let ids: Vec<ProfileId> = sqlx::query_scalar(
            "SELECT target_id FROM match_actions WHERE viewer_id = $1 ORDER BY target_id",
        )
        .bind(viewer_id)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!("Profile {} has acted on {} profiles", viewer_id, ids.len());

        Ok(ids)
    }

    async fn get_potential_profiles(&self, query: &CandidateQuery) -> Result<Vec<Candidate>, RepositoryError> {
        let today = Utc::now().date_naive();
        let prefs = &query.preferences;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT p.id, p.is_bride, p.date_of_birth, p.height_cm, p.physically_challenged, \
             p.community, p.marital_status, p.profession, p.profession_type, p.education_level, \
             p.home_district, p.is_active, COALESCE(r.rating, ",
        );
        qb.push_bind(self.initial_rating);
        qb.push(
            ") AS rating FROM profiles p \
             LEFT JOIN profile_ratings r ON r.profile_id = p.id \
             WHERE p.is_active AND p.id <> ",
        );
        qb.push_bind(query.viewer_id.clone());

        if !query.exclude_ids.is_empty() {
            qb.push(" AND NOT (p.id = ANY(");
            qb.push_bind(query.exclude_ids.clone());
            qb.push("))");
        }

        if let Some(seeking_bride) = query.seeking_bride {
            qb.push(" AND p.is_bride = ");
            qb.push_bind(seeking_bride);
        }

        if query.filters.age {
            if let Some(bounds) = prefs.age_bounds() {
                if let Some(latest) = bounds.min.and_then(|min| years_before(today, min)) {
                    qb.push(" AND p.date_of_birth <= ");
                    qb.push_bind(latest);
                }
                if let Some(earliest) = bounds
                    .max
                    .and_then(|max| years_before(today, max.saturating_add(1)))
                {
                    qb.push(" AND p.date_of_birth > ");
                    qb.push_bind(earliest);
                }
            }
        }

        if query.filters.height {
            if let Some(bounds) = prefs.height_bounds() {
                if let Some(min) = bounds.min {
                    qb.push(" AND ");
                    qb.push(ROUNDED_HEIGHT);
                    qb.push(" >= ");
                    qb.push_bind(min);
                }
                if let Some(max) = bounds.max {
                    qb.push(" AND ");
                    qb.push(ROUNDED_HEIGHT);
                    qb.push(" <= ");
                    qb.push_bind(max);
                }
            }
        }

        if query.filters.marital_status && !prefs.marital_statuses.is_empty() {
            qb.push(" AND LOWER(TRIM(p.marital_status)) = ANY(");
            qb.push_bind(prefs.marital_statuses.iter().cloned().collect::<Vec<String>>());
            qb.push(")");
        }

        if query.filters.physically_challenged && !prefs.accept_physically_challenged {
            qb.push(" AND NOT p.physically_challenged");
        }

        if query.filters.education && !prefs.education_levels.is_empty() {
            qb.push(" AND LOWER(TRIM(p.education_level)) = ANY(");
            qb.push_bind(prefs.education_levels.iter().cloned().collect::<Vec<String>>());
            qb.push(")");
        }

        qb.push(" ORDER BY p.id LIMIT ");
        qb.push_bind(i64::from(query.limit));
        qb.push(" OFFSET ");
        qb.push_bind(i64::from(query.offset));

        let rows = qb.build().fetch_all(&self.pool).await?;

        let candidates = rows
            .iter()
            .map(|row| row_to_candidate(row, today))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            "Candidate pool for {}: {} profiles (offset {})",
            query.viewer_id,
            candidates.len(),
            query.offset
        );

        Ok(candidates)
    }

    async fn record_match_action(
        &self,
        viewer_id: &str,
        target_id: &str,
        action: MatchAction,
    ) -> Result<(), RepositoryError> {
        if viewer_id == target_id {
            return Err(RepositoryError::InvalidInput(format!(
                "profile {} cannot act on itself",
                viewer_id
            )));
        }
        let mut conn = self.pool.acquire().await?;
        upsert_action(&mut conn, viewer_id, target_id, action).await
    }

    async fn check_for_mutual_match(&self, a: &str, b: &str) -> Result<bool, RepositoryError> {
        let query = r#"
            SELECT COUNT(*)
            FROM match_actions
            WHERE action = 'liked'
              AND ((viewer_id = $1 AND target_id = $2) OR (viewer_id = $2 AND target_id = $1))
        "#;

        let liked: i64 = sqlx::query_scalar(query)
            .bind(a)
            .bind(b)
            .fetch_one(&self.pool)
            .await?;

        Ok(liked == 2)
    }

    async fn create_mutual_match(&self, a: &str, b: &str) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        activate_mutual(&mut conn, a, b).await
    }

    async fn deactivate_mutual_match(&self, a: &str, b: &str) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        deactivate_mutual(&mut conn, a, b).await
    }

    async fn get_match_history(
        &self,
        viewer_id: &str,
        status: Option<MatchAction>,
        limit: u32,
        offset: u32,
    ) -> Result<Page<MatchHistoryItem>, RepositoryError> {
        let status = status.map(ActionType::from);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM match_actions \
             WHERE viewer_id = $1 AND ($2::match_action IS NULL OR action = $2)",
        )
        .bind(viewer_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let query = r#"
            SELECT target_id, action, acted_at
            FROM match_actions
            WHERE viewer_id = $1 AND ($2::match_action IS NULL OR action = $2)
            ORDER BY acted_at DESC, target_id
            LIMIT $3 OFFSET $4
        "#;

        let rows = sqlx::query(query)
            .bind(viewer_id)
            .bind(status)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .iter()
            .map(|row| {
                Ok(MatchHistoryItem {
                    target_profile_id: row.try_get("target_id")?,
                    action: row.try_get::<ActionType, _>("action")?.into(),
                    timestamp: row.try_get("acted_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(Page {
            items,
            total: total.max(0) as u64,
        })
    }

    async fn get_mutual_matches(
        &self,
        viewer_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Page<MutualMatch>, RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM mutual_matches \
             WHERE is_active AND (profile_a = $1 OR profile_b = $1)",
        )
        .bind(viewer_id)
        .fetch_one(&self.pool)
        .await?;

        let query = r#"
            SELECT profile_a, profile_b, is_active, matched_at, deactivated_at
            FROM mutual_matches
            WHERE is_active AND (profile_a = $1 OR profile_b = $1)
            ORDER BY matched_at DESC, profile_a, profile_b
            LIMIT $2 OFFSET $3
        "#;

        let rows = sqlx::query(query)
            .bind(viewer_id)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .iter()
            .map(row_to_mutual)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total: total.max(0) as u64,
        })
    }

    async fn get_rating(&self, profile_id: &str) -> Result<Option<Rating>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_rating(&mut conn, profile_id).await
    }

    async fn load_pair(&self, viewer_id: &str, target_id: &str) -> Result<PairRecord, RepositoryError> {
        let mut conn = self.pool.acquire().await?;

        Ok(PairRecord {
            viewer_rating: fetch_rating(&mut conn, viewer_id).await?,
            target_rating: fetch_rating(&mut conn, target_id).await?,
            forward: fetch_action(&mut conn, viewer_id, target_id).await?,
            reverse: fetch_action(&mut conn, target_id, viewer_id).await?,
            mutual_active: fetch_mutual_active(&mut conn, viewer_id, target_id).await?,
        })
    }

    async fn commit_transition(&self, transition: &PairTransition) -> Result<(), RepositoryError> {
        let viewer_id = transition.viewer_id.as_str();
        let target_id = transition.target_id.as_str();
        let (profile_a, profile_b) = canonical_pair(viewer_id, target_id);

        let mut tx = self.pool.begin().await?;

        // Serializes every writer of this unordered pair until commit/rollback
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("{}:{}", profile_a, profile_b))
            .execute(&mut *tx)
            .await?;

        let current = PairExpectation {
            forward: fetch_action(&mut tx, viewer_id, target_id).await?,
            reverse: fetch_action(&mut tx, target_id, viewer_id).await?,
            mutual_active: fetch_mutual_active(&mut tx, viewer_id, target_id).await?,
        };
        if current != transition.expected {
            // Dropping the transaction rolls it back
            return Err(RepositoryError::Conflict(format!(
                "pair {} / {} changed since it was read",
                viewer_id, target_id
            )));
        }

        match transition.change {
            ActionChange::Record(action) => upsert_action(&mut tx, viewer_id, target_id, action).await?,
            ActionChange::Withdraw => delete_action(&mut tx, viewer_id, target_id).await?,
        }

        if let Some((viewer, target)) = &transition.ratings {
            write_rating(&mut tx, viewer).await?;
            write_rating(&mut tx, target).await?;
        }

        match transition.mutual {
            MutualChange::Activate => activate_mutual(&mut tx, viewer_id, target_id).await?,
            MutualChange::Deactivate => deactivate_mutual(&mut tx, viewer_id, target_id).await?,
            MutualChange::Unchanged => {}
        }

        tx.commit().await?;

        tracing::debug!(
            "Committed {:?} for {} -> {} (mutual: {:?})",
            transition.change,
            viewer_id,
            target_id,
            transition.mutual
        );

        Ok(())
    }

    async fn health_check(&self) -> Result<bool, RepositoryError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}
