use crate::models::ProfileId;
use crate::services::RepositoryError;
use thiserror::Error;

/// Errors surfaced by the matching engine to its callers
///
/// Pure scoring and rating functions never produce these; only input
/// validation and the persistence-backed orchestration do.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Profile {0} cannot act on itself")]
    SelfMatch(ProfileId),

    #[error("Unknown match action: {0}")]
    UnknownAction(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid rating config: {0}")]
    InvalidConfig(String),

    #[error("Candidate lookup for {viewer} exceeded its deadline")]
    DeadlineExceeded { viewer: ProfileId },

    #[error("Gave up on {viewer} -> {target} after {attempts} conflicting writes")]
    Conflict {
        viewer: ProfileId,
        target: ProfileId,
        attempts: u32,
    },

    #[error("Repository error ({context}): {source}")]
    Repository {
        context: String,
        #[source]
        source: RepositoryError,
    },
}

impl MatchError {
    pub fn repository(context: impl Into<String>, source: RepositoryError) -> Self {
        MatchError::Repository {
            context: context.into(),
            source,
        }
    }

    /// True for errors caused by the caller's input rather than by storage
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            MatchError::SelfMatch(_) | MatchError::UnknownAction(_) | MatchError::InvalidInput(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_classification() {
        assert!(MatchError::SelfMatch("a".into()).is_invalid_input());
        assert!(MatchError::UnknownAction("maybe".into()).is_invalid_input());
        assert!(!MatchError::DeadlineExceeded { viewer: "a".into() }.is_invalid_input());
    }

    #[test]
    fn test_repository_error_keeps_context() {
        let err = MatchError::repository(
            "viewer a -> target b",
            RepositoryError::NotFound("profile b".into()),
        );
        let message = err.to_string();
        assert!(message.contains("viewer a -> target b"));
        assert!(message.contains("profile b"));
    }
}
