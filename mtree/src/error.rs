//! Error type shared by the heaps, the node store and the query engine.

use crate::data::ObjectId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller broke the contract of an entry point (k < 1, k > k_max, bad radius, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A heap, index or tree structure is in a state it should never reach.
    #[error("internal consistency violation: {0}")]
    InternalConsistency(String),

    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),
}

impl Error {

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn consistency<S: Into<String>>(msg: S) -> Self {
        Error::InternalConsistency(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
