use crate::backend::BackendError;
use shared::ProtocolError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyReason {
    /// A committed movement has not arrived yet.
    Travelling,
    /// An intent for this ship is already waiting in the queue.
    Queued,
}

impl fmt::Display for BusyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusyReason::Travelling => write!(f, "Ship is currently travelling."),
            BusyReason::Queued => write!(f, "Ship already has a queued movement."),
        }
    }
}

#[derive(Debug, Error)]
pub enum SeaError {
    #[error("Target is outside of the known sea sectors.")]
    InvalidTarget,

    #[error("Ship is already at that position.")]
    AlreadyThere,

    #[error("{0}")]
    Busy(BusyReason),

    #[error("malformed intent: {0}")]
    MalformedIntent(#[from] ProtocolError),

    #[error("state store unavailable: {0}")]
    StoreUnavailable(#[from] BackendError),

    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// How the boundary layer should treat a [`SeaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself was wrong.
    Client,
    /// The request conflicts with work already in flight.
    Conflict,
    /// Dropped without retry.
    Dropped,
    /// Infrastructure failure; retry later.
    Unavailable,
}

impl SeaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SeaError::InvalidTarget | SeaError::AlreadyThere => ErrorKind::Client,
            SeaError::Busy(_) => ErrorKind::Conflict,
            SeaError::MalformedIntent(_) => ErrorKind::Dropped,
            SeaError::StoreUnavailable(_) | SeaError::Encode(_) => ErrorKind::Unavailable,
        }
    }
}

pub type SeaResult<T> = Result<T, SeaError>;
