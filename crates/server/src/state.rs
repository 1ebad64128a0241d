use std::sync::Arc;

use coach_engine::{ClientError, CoachConfig, HttpExplainer, HttpPredictor, OrchestratorHandle};
use tokio::sync::RwLock;

use crate::error::AppError;

/// Shared state: service clients plus the single active game, if any.
#[derive(Clone)]
pub struct AppState {
    pub coach: Arc<CoachConfig>,
    pub predictor: Arc<HttpPredictor>,
    pub explainer: Arc<HttpExplainer>,
    game: Arc<RwLock<Option<OrchestratorHandle>>>,
}

impl AppState {
    pub fn new(coach: CoachConfig) -> Result<Self, ClientError> {
        Ok(Self {
            predictor: Arc::new(HttpPredictor::new(&coach)?),
            explainer: Arc::new(HttpExplainer::new(&coach)?),
            coach: Arc::new(coach),
            game: Arc::new(RwLock::new(None)),
        })
    }

    pub async fn game(&self) -> Result<OrchestratorHandle, AppError> {
        self.game
            .read()
            .await
            .clone()
            .filter(|handle| !handle.is_closed())
            .ok_or_else(|| AppError::NotFound("No active game".to_string()))
    }

    /// Install a new game, tearing down the one it replaces.
    pub async fn replace_game(&self, handle: OrchestratorHandle) {
        let previous = self.game.write().await.replace(handle);
        if let Some(previous) = previous {
            previous.shutdown().await;
        }
    }

    pub async fn end_game(&self) -> bool {
        let previous = self.game.write().await.take();
        match previous {
            Some(handle) => {
                handle.shutdown().await;
                true
            }
            None => false,
        }
    }
}
