use thiserror::Error;

/// Business failures surfaced to the caller. All variants except `Storage`
/// reflect domain state and are terminal; nothing here is retryable.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("you cannot claim your own post")]
    SelfClaim,

    #[error("you have already claimed this post")]
    DuplicateClaim,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("post must be completed before it can be paid forward")]
    NotCompleted,

    #[error("you have already paid this post forward")]
    AlreadyForwarded,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
