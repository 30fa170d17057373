use crate::core::ActionOutcome;
use crate::models::domain::ScoredCandidate;
use serde::{Deserialize, Serialize};

/// Response of the candidates endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindCandidatesResponse {
    pub candidates: Vec<ScoredCandidate>,
    pub total_candidates: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

/// Record action response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub request_id: String,
    pub outcome: ActionOutcome,
}

/// Paginated list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}
