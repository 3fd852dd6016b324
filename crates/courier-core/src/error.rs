//! Error taxonomy for every core operation.

use courier_types::api::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Missing or malformed input, rejected before touching storage.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("cannot send a friend request to yourself")]
    SelfReference,

    #[error("not allowed to {0}")]
    Forbidden(&'static str),

    #[error("username is already taken")]
    UsernameTaken,

    #[error("a pending or accepted friendship already exists")]
    AlreadyExists,

    #[error("friend request has already been resolved")]
    AlreadyResolved,

    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("messages can only be sent to friends")]
    NotFriends,

    /// Storage or transport failure on the primary write path.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ChatError>;

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::SelfReference => ErrorKind::ValidationError,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::UsernameTaken | Self::AlreadyExists | Self::AlreadyResolved => {
                ErrorKind::Conflict
            }
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::NotFriends => ErrorKind::NotFriends,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to show a client. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}
