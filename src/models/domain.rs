use crate::error::MatchError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Identifier of a profile as assigned by the profile service
pub type ProfileId = String;

/// Profile record as persisted by the profile service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProfile {
    pub id: ProfileId,
    #[serde(rename = "isBride")]
    pub is_bride: bool,
    #[serde(rename = "dateOfBirth")]
    pub date_of_birth: NaiveDate,
    #[serde(rename = "heightCm", default)]
    pub height_cm: Option<f32>,
    #[serde(rename = "physicallyChallenged", default)]
    pub physically_challenged: bool,
    #[serde(default)]
    pub community: Option<String>,
    #[serde(rename = "maritalStatus", default)]
    pub marital_status: Option<String>,
    #[serde(default)]
    pub profession: Option<String>,
    #[serde(rename = "professionType", default)]
    pub profession_type: Option<String>,
    #[serde(rename = "educationLevel", default)]
    pub education_level: Option<String>,
    #[serde(rename = "homeDistrict", default)]
    pub home_district: Option<String>,
    #[serde(rename = "isActive", default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool { true }

/// Normalized view of a profile consumed by scoring and filtering
///
/// Built fresh per request; the age depends on the evaluation date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileData {
    pub is_bride: bool,
    pub age: i32,
    pub height_cm: i32,
    pub physically_challenged: bool,
    pub community: String,
    pub marital_status: String,
    pub profession: String,
    pub profession_type: String,
    pub highest_education_level: String,
    pub home_district: String,
}

impl ProfileData {
    /// Build the scoring view of a stored profile as of `today`
    pub fn from_stored(stored: &StoredProfile, today: NaiveDate) -> Self {
        Self {
            is_bride: stored.is_bride,
            age: age_on(stored.date_of_birth, today),
            height_cm: normalize_height(stored.height_cm),
            physically_challenged: stored.physically_challenged,
            community: normalize_value(stored.community.as_deref()),
            marital_status: normalize_value(stored.marital_status.as_deref()),
            profession: normalize_value(stored.profession.as_deref()),
            profession_type: normalize_value(stored.profession_type.as_deref()),
            highest_education_level: normalize_value(stored.education_level.as_deref()),
            home_district: normalize_value(stored.home_district.as_deref()),
        }
    }

    /// Normalize enum-like attributes supplied directly by a caller
    pub fn normalized(self) -> Self {
        Self {
            community: normalize_value(Some(&self.community)),
            marital_status: normalize_value(Some(&self.marital_status)),
            profession: normalize_value(Some(&self.profession)),
            profession_type: normalize_value(Some(&self.profession_type)),
            highest_education_level: normalize_value(Some(&self.highest_education_level)),
            home_district: normalize_value(Some(&self.home_district)),
            ..self
        }
    }
}

/// Completed years between `date_of_birth` and `today`
///
/// A birth date in the future yields 0.
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> i32 {
    today
        .years_since(date_of_birth)
        .and_then(|years| i32::try_from(years).ok())
        .unwrap_or(0)
}

/// Round a stored height to whole centimetres; unknown heights become 0
pub fn normalize_height(height_cm: Option<f32>) -> i32 {
    height_cm
        .filter(|h| h.is_finite() && *h > 0.0)
        .map(|h| h.round() as i32)
        .unwrap_or(0)
}

/// Canonical form of an enum-like attribute value
pub fn normalize_value(value: Option<&str>) -> String {
    value.map(|v| v.trim().to_lowercase()).unwrap_or_default()
}

/// Inclusive range built from optional preference bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: Option<i32>,
    pub max: Option<i32>,
}

impl Bounds {
    /// Returns `None` when the bounds place no constraint: both absent, or inverted
    pub fn new(min: Option<i32>, max: Option<i32>) -> Option<Self> {
        match (min, max) {
            (None, None) => None,
            (Some(lo), Some(hi)) if lo > hi => None,
            _ => Some(Self { min, max }),
        }
    }

    pub fn contains(&self, value: i32) -> bool {
        self.distance(value) == 0
    }

    /// How far `value` lies outside the range (0 when inside)
    pub fn distance(&self, value: i32) -> i32 {
        if let Some(min) = self.min {
            if value < min {
                return min.saturating_sub(value);
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return value.saturating_sub(max);
            }
        }
        0
    }
}

/// A viewer's stated partner preferences
///
/// An empty set means the axis is unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreferenceData {
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
    pub min_height_cm: Option<i32>,
    pub max_height_cm: Option<i32>,
    pub accept_physically_challenged: bool,
    pub communities: BTreeSet<String>,
    pub marital_statuses: BTreeSet<String>,
    pub professions: BTreeSet<String>,
    pub profession_types: BTreeSet<String>,
    pub education_levels: BTreeSet<String>,
    pub home_districts: BTreeSet<String>,
}

impl PreferenceData {
    /// Normalize set members the same way profile attributes are normalized
    pub fn normalized(self) -> Self {
        Self {
            communities: normalize_set(self.communities),
            marital_statuses: normalize_set(self.marital_statuses),
            professions: normalize_set(self.professions),
            profession_types: normalize_set(self.profession_types),
            education_levels: normalize_set(self.education_levels),
            home_districts: normalize_set(self.home_districts),
            ..self
        }
    }

    pub fn age_bounds(&self) -> Option<Bounds> {
        Bounds::new(self.min_age, self.max_age)
    }

    pub fn height_bounds(&self) -> Option<Bounds> {
        Bounds::new(self.min_height_cm, self.max_height_cm)
    }
}

fn normalize_set(values: BTreeSet<String>) -> BTreeSet<String> {
    values
        .iter()
        .map(|v| normalize_value(Some(v)))
        .filter(|v| !v.is_empty())
        .collect()
}

/// Compatibility score (0-100) with the reasons that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    pub score: f64,
    pub reasons: Vec<String>,
}

/// Unilateral decision of a viewer about a target profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchAction {
    Liked,
    Disliked,
    Passed,
}

impl MatchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchAction::Liked => "liked",
            MatchAction::Disliked => "disliked",
            MatchAction::Passed => "passed",
        }
    }

    /// Elo outcomes `(viewer, target)`; passes are not scored
    pub fn outcomes(&self) -> Option<(f64, f64)> {
        match self {
            MatchAction::Liked => Some((1.0, 0.0)),
            MatchAction::Disliked => Some((0.0, 1.0)),
            MatchAction::Passed => None,
        }
    }
}

impl fmt::Display for MatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchAction {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "liked" => Ok(MatchAction::Liked),
            "disliked" => Ok(MatchAction::Disliked),
            "passed" => Ok(MatchAction::Passed),
            other => Err(MatchError::UnknownAction(other.to_string())),
        }
    }
}

/// Elo rating bounds and step size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    pub initial_rating: i32,
    pub k_factor: i32,
    pub min_rating: i32,
    pub max_rating: i32,
}

impl RatingConfig {
    pub const DEFAULT: RatingConfig = RatingConfig {
        initial_rating: 1500,
        k_factor: 32,
        min_rating: 1000,
        max_rating: 3000,
    };

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.k_factor < 0 {
            return Err(MatchError::InvalidConfig(format!(
                "k_factor must not be negative, got {}",
                self.k_factor
            )));
        }
        if self.min_rating < 0 || self.min_rating > self.max_rating {
            return Err(MatchError::InvalidConfig(format!(
                "rating bounds [{}, {}] are negative or inverted",
                self.min_rating, self.max_rating
            )));
        }
        if self.initial_rating < self.min_rating || self.initial_rating > self.max_rating {
            return Err(MatchError::InvalidConfig(format!(
                "initial_rating {} lies outside [{}, {}]",
                self.initial_rating, self.min_rating, self.max_rating
            )));
        }
        Ok(())
    }

    pub fn clamp(&self, rating: i32) -> i32 {
        rating.clamp(self.min_rating, self.max_rating.max(self.min_rating))
    }
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Persisted Elo rating of a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub profile_id: ProfileId,
    pub rating: i32,
    pub match_count: i32,
    /// Bumped on every write; 0 means the row does not exist yet
    pub version: i64,
}

impl Rating {
    pub fn initial(profile_id: &str, config: &RatingConfig) -> Self {
        Self {
            profile_id: profile_id.to_string(),
            rating: config.initial_rating,
            match_count: 0,
            version: 0,
        }
    }

    /// Clamp a stored rating into the configured bounds
    pub fn clamped(mut self, config: &RatingConfig) -> Self {
        self.rating = config.clamp(self.rating);
        self.match_count = self.match_count.max(0);
        self
    }
}

/// Symmetric like-like relationship between two profiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutualMatch {
    pub profile_a: ProfileId,
    pub profile_b: ProfileId,
    pub is_active: bool,
    pub matched_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl MutualMatch {
    /// The profile on the other side of the match from `viewer_id`
    pub fn other(&self, viewer_id: &str) -> &str {
        if self.profile_a == viewer_id {
            &self.profile_b
        } else {
            &self.profile_a
        }
    }
}

/// Storage key of an unordered profile pair
pub fn canonical_pair(a: &str, b: &str) -> (ProfileId, ProfileId) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// One recorded action in a viewer's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchHistoryItem {
    pub target_profile_id: ProfileId,
    pub action: MatchAction,
    pub timestamp: DateTime<Utc>,
}

/// A page of results plus the total number of rows available
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// Eligible profile returned by the candidate pool query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: ProfileId,
    pub profile: ProfileData,
    pub rating: i32,
}

/// Ranked candidate with its compatibility annotation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    #[serde(rename = "profileId")]
    pub profile_id: ProfileId,
    pub profile: ProfileData,
    pub rating: i32,
    #[serde(rename = "matchScore")]
    pub match_score: f64,
    pub reasons: Vec<String>,
}

/// Per-filter switches for candidate generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardFiltersConfig {
    pub age: bool,
    pub height: bool,
    pub marital_status: bool,
    pub physically_challenged: bool,
    pub education: bool,
}

impl Default for HardFiltersConfig {
    fn default() -> Self {
        Self {
            age: true,
            height: true,
            marital_status: true,
            physically_challenged: true,
            education: true,
        }
    }
}

/// Candidate pool query parameters
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub viewer_id: ProfileId,
    /// Restrict the pool to brides (`Some(true)`) or grooms (`Some(false)`)
    pub seeking_bride: Option<bool>,
    pub exclude_ids: Vec<ProfileId>,
    pub preferences: PreferenceData,
    pub filters: HardFiltersConfig,
    pub limit: u32,
    pub offset: u32,
}

/// Per-axis weights reserved for weighted scoring
///
/// The compatibility scorer currently uses a fixed point table; these
/// weights are carried through configuration so they can be tuned later.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchWeights {
    pub age: f64,
    pub height: f64,
    pub community: f64,
    pub marital_status: f64,
    pub education: f64,
    pub profession: f64,
    pub profession_type: f64,
    pub home_district: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            age: 0.15,
            height: 0.10,
            community: 0.20,
            marital_status: 0.15,
            education: 0.10,
            profession: 0.10,
            profession_type: 0.05,
            home_district: 0.10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn stored_profile() -> StoredProfile {
        StoredProfile {
            id: "p1".to_string(),
            is_bride: true,
            date_of_birth: date(1994, 6, 15),
            height_cm: Some(162.6),
            physically_challenged: false,
            community: Some("  Nair ".to_string()),
            marital_status: Some("Never Married".to_string()),
            profession: None,
            profession_type: Some("Private".to_string()),
            education_level: Some("Masters".to_string()),
            home_district: Some("Thrissur".to_string()),
            is_active: true,
        }
    }

    #[test]
    fn test_age_before_and_after_birthday() {
        let dob = date(1994, 6, 15);
        assert_eq!(age_on(dob, date(2024, 6, 14)), 29);
        assert_eq!(age_on(dob, date(2024, 6, 15)), 30);
        assert_eq!(age_on(dob, date(1990, 1, 1)), 0);
    }

    #[test]
    fn test_profile_data_normalization() {
        let data = ProfileData::from_stored(&stored_profile(), date(2024, 7, 1));

        assert_eq!(data.age, 30);
        assert_eq!(data.height_cm, 163);
        assert_eq!(data.community, "nair");
        assert_eq!(data.marital_status, "never married");
        assert_eq!(data.profession, "");
        assert_eq!(data.highest_education_level, "masters");
    }

    #[test]
    fn test_missing_height_is_zero() {
        assert_eq!(normalize_height(None), 0);
        assert_eq!(normalize_height(Some(f32::NAN)), 0);
        assert_eq!(normalize_height(Some(-4.0)), 0);
    }

    #[test]
    fn test_bounds() {
        assert!(Bounds::new(None, None).is_none());
        assert!(Bounds::new(Some(35), Some(28)).is_none());

        let bounds = Bounds::new(Some(28), Some(35)).unwrap();
        assert!(bounds.contains(30));
        assert_eq!(bounds.distance(26), 2);
        assert_eq!(bounds.distance(38), 3);

        let open_ended = Bounds::new(Some(160), None).unwrap();
        assert!(open_ended.contains(210));
        assert!(!open_ended.contains(150));
    }

    #[test]
    fn test_preferences_normalized() {
        let prefs = PreferenceData {
            communities: ["Nair ".to_string(), "".to_string(), "EZHAVA".to_string()].into(),
            ..Default::default()
        }
        .normalized();

        let expected: BTreeSet<String> = ["ezhava".to_string(), "nair".to_string()].into();
        assert_eq!(prefs.communities, expected);
    }

    #[test]
    fn test_match_action_parsing() {
        assert_eq!("Liked".parse::<MatchAction>().unwrap(), MatchAction::Liked);
        assert_eq!(" passed ".parse::<MatchAction>().unwrap(), MatchAction::Passed);
        assert!(matches!(
            "superliked".parse::<MatchAction>(),
            Err(MatchError::UnknownAction(_))
        ));
    }

    #[test]
    fn test_rating_config_validation() {
        assert!(RatingConfig::default().validate().is_ok());

        let inverted = RatingConfig { min_rating: 3000, max_rating: 1000, ..Default::default() };
        assert!(inverted.validate().is_err());

        let negative_k = RatingConfig { k_factor: -1, ..Default::default() };
        assert!(negative_k.validate().is_err());
    }

    #[test]
    fn test_rating_clamped_on_read() {
        let stored = Rating {
            profile_id: "p1".to_string(),
            rating: 4200,
            match_count: 3,
            version: 7,
        };
        let rating = stored.clamped(&RatingConfig::default());
        assert_eq!(rating.rating, 3000);
        assert_eq!(rating.version, 7);
    }

    #[test]
    fn test_canonical_pair() {
        assert_eq!(canonical_pair("b", "a"), ("a".to_string(), "b".to_string()));
        assert_eq!(canonical_pair("a", "b"), canonical_pair("b", "a"));
    }
}
