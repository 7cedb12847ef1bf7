//! Errors raised at the persistence seam.

use thiserror::Error;
use crate::event::EventId;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to fetch follow-up events: {0}")]
    Fetch(String),

    #[error("failed to persist status for {id}: {reason}")]
    Persist { id: EventId, reason: String },

    #[error("follow-up event not found: {0}")]
    NotFound(EventId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
