//! Async shell around the coaching session: predictor and explainer
//! clients, environment configuration, and the orchestrator task.

pub mod clients;
pub mod config;
pub mod driver;
pub mod error;

pub use clients::{Explainer, HttpExplainer, HttpPredictor, Predictor};
pub use config::{CoachConfig, WinPerspective};
pub use driver::{spawn, OrchestratorHandle};
pub use error::{ClientError, EngineError};
