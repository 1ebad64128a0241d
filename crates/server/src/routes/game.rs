use axum::{http::StatusCode, Extension, Json};
use coach_core::{Action, ChessBoard, GameMode, Session, Side, Snapshot, Strictness};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    PassAndPlay,
    #[default]
    VsPredictor,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewGameBody {
    pub mode: ModeKind,
    pub human_color: Option<Side>,
    pub coaching: Option<bool>,
    pub human_elo: Option<u32>,
    pub opponent_elo: Option<u32>,
    pub strictness: Option<Strictness>,
    pub clock_secs: Option<u32>,
    pub seed: Option<u64>,
}

/// POST /api/game
/// Start a new game, replacing any game in progress.
pub async fn create_game(
    Extension(state): Extension<AppState>,
    Json(body): Json<NewGameBody>,
) -> Result<Json<Snapshot>, AppError> {
    let mode = match body.mode {
        ModeKind::PassAndPlay => GameMode::PassAndPlay,
        ModeKind::VsPredictor => GameMode::VsPredictor {
            human: body.human_color.unwrap_or(Side::White),
            coaching: body.coaching.unwrap_or(true),
        },
    };
    let mut settings = state.coach.session_settings(mode);
    if let Some(elo) = body.human_elo {
        settings.human_elo = elo;
    }
    if let Some(elo) = body.opponent_elo {
        settings.opponent_elo = elo;
    }
    if let Some(strictness) = body.strictness {
        settings.strictness = strictness;
    }
    if let Some(secs) = body.clock_secs {
        if secs == 0 {
            return Err(AppError::BadRequest("clockSecs must be positive".to_string()));
        }
        settings.clock_secs = secs;
    }
    settings.seed = body.seed;

    let session = Session::new(ChessBoard::new(), settings);
    let handle = coach_engine::spawn(
        session,
        state.predictor.clone(),
        state.explainer.clone(),
    );
    let snapshot = handle.dispatch(Action::Start).await?;
    state.replace_game(handle).await;

    tracing::info!(?mode, "New game created");
    Ok(Json(snapshot))
}

/// GET /api/game
pub async fn get_game(Extension(state): Extension<AppState>) -> Result<Json<Snapshot>, AppError> {
    Ok(Json(state.game().await?.snapshot()))
}

/// DELETE /api/game
pub async fn delete_game(
    Extension(state): Extension<AppState>,
) -> Result<(StatusCode, Json<JsonValue>), AppError> {
    if state.end_game().await {
        Ok((StatusCode::OK, Json(json!({ "ok": true }))))
    } else {
        Err(AppError::NotFound("No active game".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct MoveBody {
    pub from: String,
    pub to: String,
    pub promotion: Option<String>,
}

/// POST /api/game/move
pub async fn make_move(
    Extension(state): Extension<AppState>,
    Json(body): Json<MoveBody>,
) -> Result<Json<Snapshot>, AppError> {
    let promotion = match body.promotion.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(p) if p.chars().count() == 1 => p.chars().next(),
        Some(p) => return Err(AppError::BadRequest(format!("Invalid promotion piece: {p}"))),
    };
    intent(
        &state,
        Action::CommitMove {
            from: body.from,
            to: body.to,
            promotion,
        },
    )
    .await
}

/// POST /api/game/retry
pub async fn retry(Extension(state): Extension<AppState>) -> Result<Json<Snapshot>, AppError> {
    intent(&state, Action::Retry).await
}

/// POST /api/game/explain
pub async fn explain(Extension(state): Extension<AppState>) -> Result<Json<Snapshot>, AppError> {
    intent(&state, Action::Explain).await
}

/// POST /api/game/dismiss
pub async fn dismiss_explanation(
    Extension(state): Extension<AppState>,
) -> Result<Json<Snapshot>, AppError> {
    intent(&state, Action::DismissExplanation).await
}

/// POST /api/game/continue
pub async fn continue_anyway(
    Extension(state): Extension<AppState>,
) -> Result<Json<Snapshot>, AppError> {
    intent(&state, Action::Continue).await
}

#[derive(Debug, Deserialize)]
pub struct StrictnessBody {
    pub strictness: Strictness,
}

/// PUT /api/game/strictness
pub async fn set_strictness(
    Extension(state): Extension<AppState>,
    Json(body): Json<StrictnessBody>,
) -> Result<Json<Snapshot>, AppError> {
    intent(&state, Action::SetStrictness(body.strictness)).await
}

async fn intent(state: &AppState, action: Action) -> Result<Json<Snapshot>, AppError> {
    let handle = state.game().await?;
    Ok(Json(handle.dispatch(action).await?))
}
