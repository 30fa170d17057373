// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    age_on, canonical_pair, normalize_height, normalize_value, Bounds, Candidate, CandidateQuery,
    HardFiltersConfig, MatchAction, MatchHistoryItem, MatchScore, MatchWeights, MutualMatch, Page,
    PreferenceData, ProfileData, ProfileId, Rating, RatingConfig, ScoredCandidate, StoredProfile,
};
pub use requests::{
    FindCandidatesRequest, HistoryQuery, MutualMatchesQuery, RecordActionRequest, ScoreRequest,
    WithdrawActionRequest,
};
pub use responses::{
    ActionResponse, ErrorResponse, FindCandidatesResponse, HealthResponse, PageResponse,
};
