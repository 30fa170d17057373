use crate::models::domain::{PreferenceData, ProfileData};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request to rank candidates for a viewer
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FindCandidatesRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "viewer_id", rename = "viewerId")]
    pub viewer_id: String,
    #[serde(default, rename = "seekingBride")]
    pub seeking_bride: Option<bool>,
    #[serde(default)]
    pub preferences: PreferenceData,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default, alias = "exclude_ids", rename = "excludeIds")]
    pub exclude_ids: Vec<String>,
    /// Optional caller deadline for the candidate lookup
    #[serde(default, rename = "deadlineMs")]
    pub deadline_ms: Option<u64>,
}

fn default_limit() -> u32 {
    20
}

/// Request to score a single profile against a preference set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub profile: ProfileData,
    #[serde(default)]
    pub preferences: PreferenceData,
}

/// Request to record a like, dislike or pass
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordActionRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "viewer_id", rename = "viewerId")]
    pub viewer_id: String,
    #[validate(length(min = 1))]
    #[serde(alias = "target_id", rename = "targetId")]
    pub target_id: String,
    /// Parsed by the handler so unknown actions get a distinct error
    pub action: String,
}

/// Request to withdraw a previously recorded action
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WithdrawActionRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "viewer_id", rename = "viewerId")]
    pub viewer_id: String,
    #[validate(length(min = 1))]
    #[serde(alias = "target_id", rename = "targetId")]
    pub target_id: String,
}

/// Query string of the history endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HistoryQuery {
    #[validate(length(min = 1))]
    #[serde(rename = "viewerId")]
    pub viewer_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

/// Query string of the mutual matches endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MutualMatchesQuery {
    #[validate(length(min = 1))]
    #[serde(rename = "viewerId")]
    pub viewer_id: String,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}
