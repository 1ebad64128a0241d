//! Outbound services: the move predictor and the explanation service.
//!
//! The orchestrator only sees the [`Predictor`] and [`Explainer`] traits, so
//! tests can swap in stubs without standing up HTTP.

use std::future::Future;

use coach_core::{EvaluationRequest, ExplanationRequest, PositionEvaluation};

use crate::error::ClientError;

pub mod explainer;
pub mod predictor;

pub use explainer::HttpExplainer;
pub use predictor::HttpPredictor;

pub trait Predictor: Send + Sync + 'static {
    fn evaluate(
        &self,
        request: &EvaluationRequest,
    ) -> impl Future<Output = Result<PositionEvaluation, ClientError>> + Send;
}

pub trait Explainer: Send + Sync + 'static {
    /// Stream an explanation, handing each decoded text fragment to
    /// `on_fragment` as it arrives.
    fn explain<F>(
        &self,
        request: &ExplanationRequest,
        on_fragment: F,
    ) -> impl Future<Output = Result<(), ClientError>> + Send
    where
        F: FnMut(String) + Send;
}
