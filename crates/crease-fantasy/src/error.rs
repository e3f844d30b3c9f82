// Error types for roster validation, contest joins, and catalog reads.

use crease_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown player role `{0}`")]
pub struct UnknownRole(pub String);

/// Caller-supplied input that breaks a roster or contest rule. Never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("a team needs exactly {expected} players, this one has {actual}")]
    RosterSize { expected: usize, actual: usize },

    #[error("team uses {used} credits, the cap is {cap}")]
    OverBudget { used: u32, cap: u32 },

    #[error("team was not built for this contest's {max_players} players and {credit_cap}-credit cap")]
    RulesMismatch { max_players: usize, credit_cap: u32 },

    #[error("player {0} is selected more than once")]
    DuplicatePlayer(String),

    #[error("contest {0} does not exist")]
    UnknownContest(String),

    #[error("contest {0} is closed for entries")]
    ContestClosed(String),
}

#[derive(Debug, Error)]
pub enum JoinError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Transient storage failure. The roster is untouched and the join can be
    /// retried.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Non-transient storage fault, such as an undecodable document.
    #[error("storage error: {0}")]
    Store(StoreError),
}

impl JoinError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, JoinError::StorageUnavailable(_))
    }
}

impl From<StoreError> for JoinError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable { message } => JoinError::StorageUnavailable(message),
            other => JoinError::Store(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CatalogError> for JoinError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_maps_to_retryable() {
        let err: JoinError = StoreError::unavailable("connection reset").into();
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "storage unavailable: connection reset");
    }

    #[test]
    fn validation_is_not_retryable() {
        let err: JoinError = ValidationError::RosterSize {
            expected: 11,
            actual: 10,
        }
        .into();
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "a team needs exactly 11 players, this one has 10"
        );
    }
}
