use std::collections::BTreeMap;

use coach_core::{active_side, EvaluationRequest, MoveDistribution, PositionEvaluation, Side};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Predictor;
use crate::config::{CoachConfig, WinPerspective};
use crate::error::ClientError;

#[derive(Serialize)]
struct PredictBody<'a> {
    fen: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    elo_self: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    elo_oppo: Option<u32>,
}

/// Raw `/predict` payload. Every field is optional so that an `error`-only
/// body still parses.
#[derive(Debug, Default, Deserialize)]
struct PredictResponse {
    best_move: Option<String>,
    win_probability: Option<f64>,
    moves: Option<BTreeMap<String, f64>>,
    error: Option<String>,
}

/// Client for the move-prediction service.
#[derive(Clone)]
pub struct HttpPredictor {
    client: Client,
    base_url: String,
    perspective: WinPerspective,
}

impl HttpPredictor {
    pub fn new(config: &CoachConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .user_agent("ChessCoach/1.0")
            .timeout(config.predictor_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.predictor_url.trim_end_matches('/').to_string(),
            perspective: config.win_perspective,
        })
    }
}

impl Predictor for HttpPredictor {
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<PositionEvaluation, ClientError> {
        let body = PredictBody {
            fen: &request.fen,
            elo_self: request.strength.map(|s| s.self_elo),
            elo_oppo: request.strength.map(|s| s.opponent_elo),
        };
        debug!(fen = %request.fen, "Requesting evaluation");

        let resp = self
            .client
            .post(format!("{}/predict", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            // The predictor reports inference failures as 400 with an error field
            if let Ok(PredictResponse { error: Some(e), .. }) = serde_json::from_str(&text) {
                return Err(ClientError::Model(e));
            }
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let raw: PredictResponse = serde_json::from_str(&text)
            .map_err(|e| ClientError::InvalidResponse(format!("{e}; body={text}")))?;
        into_evaluation(raw, &request.fen, self.perspective)
    }
}

/// Validate a predictor payload and normalize its win probability to
/// white's perspective.
fn into_evaluation(
    raw: PredictResponse,
    fen: &str,
    perspective: WinPerspective,
) -> Result<PositionEvaluation, ClientError> {
    if let Some(e) = raw.error {
        return Err(ClientError::Model(e));
    }

    let win = raw
        .win_probability
        .ok_or_else(|| ClientError::InvalidResponse("missing win_probability".into()))?;
    if !win.is_finite() || !(0.0..=1.0).contains(&win) {
        return Err(ClientError::InvalidResponse(format!(
            "win_probability out of range: {win}"
        )));
    }

    let win = match perspective {
        WinPerspective::White => win,
        WinPerspective::SideToMove => {
            let side = active_side(fen).map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
            match side {
                Side::White => win,
                Side::Black => 1.0 - win,
            }
        }
    };

    let distribution: MoveDistribution = raw.moves.unwrap_or_default();
    let mut evaluation = PositionEvaluation {
        recommended_move: String::new(),
        win_probability: win,
        move_distribution: distribution,
    };
    evaluation.recommended_move = match raw.best_move.filter(|m| !m.is_empty()) {
        Some(m) => m,
        None => evaluation
            .most_likely_move()
            .map(str::to_string)
            .ok_or_else(|| ClientError::InvalidResponse("no best_move and no moves".into()))?,
    };
    Ok(evaluation)
}
