//! Error types for Staking Core
//!
//! The analytics themselves never fail. Errors only exist at the payload
//! boundary, where raw text has to become a typed payload and back.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Empty payload")]
    EmptyPayload,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
