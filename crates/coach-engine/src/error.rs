//! Engine error types

use coach_core::CoachError;
use thiserror::Error;

/// Failure talking to the predictor or the explainer.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(&'static str),

    #[error("Orchestrator has shut down")]
    Closed,

    #[error(transparent)]
    Coach(#[from] CoachError),
}
