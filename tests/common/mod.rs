#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::post,
    Extension, Json, Router,
};
use coach_core::{Board, ChessBoard, ThinkSettings};
use coach_engine::CoachConfig;
use coach_server::state::AppState;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tokio_websockets::{ClientBuilder, Message};

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
pub const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

/// Build a reqwest client for tests.
pub fn client() -> Client {
    Client::new()
}

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// ---------------------------------------------------------------------------
// Stub predictor
// ---------------------------------------------------------------------------

/// Scripted predictor: win probability by FEN, uniform distribution over the
/// legal moves of the requested position.
#[derive(Default)]
pub struct PredictorScript {
    pub wins: HashMap<String, f64>,
    /// Unlisted positions answer with a model error instead of 0.5
    pub fail_unlisted: bool,
    /// Requests at this `elo_self` answer with a model error
    pub fail_elo: Option<u64>,
    pub requests: Mutex<Vec<Value>>,
}

impl PredictorScript {
    pub fn with_wins(wins: &[(&str, f64)]) -> Self {
        Self {
            wins: wins.iter().map(|(f, w)| (f.to_string(), *w)).collect(),
            ..Default::default()
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn predict(
    Extension(script): Extension<Arc<PredictorScript>>,
    Json(body): Json<Value>,
) -> Response {
    script.requests.lock().unwrap().push(body.clone());
    let fen = body["fen"].as_str().unwrap_or_default().to_string();

    let model_error = || {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "model unavailable" })),
        )
            .into_response()
    };
    if script.fail_elo.is_some() && body["elo_self"].as_u64() == script.fail_elo {
        return model_error();
    }
    let win = match script.wins.get(&fen) {
        Some(w) => *w,
        None if script.fail_unlisted => return model_error(),
        None => 0.5,
    };

    let moves = match ChessBoard::from_fen(&fen) {
        Ok(board) => board.legal_moves(),
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
                .into_response()
        }
    };
    let p = 1.0 / moves.len().max(1) as f64;
    let distribution: HashMap<&str, f64> = moves.iter().map(|m| (m.as_str(), p)).collect();

    Json(json!({
        "best_move": moves.first(),
        "win_probability": win,
        "moves": distribution,
    }))
    .into_response()
}

pub async fn spawn_predictor(script: Arc<PredictorScript>) -> String {
    let app = Router::new()
        .route("/predict", post(predict))
        .layer(Extension(script));
    serve(app).await
}

// ---------------------------------------------------------------------------
// Stub explainer
// ---------------------------------------------------------------------------

/// Explanation text streamed in chunks that split a multi-byte character.
pub const EXPLANATION: &str = "Qh5 leaves f7 → undefended.";

async fn explain(Json(body): Json<Value>) -> Response {
    if body["fen"].as_str().is_none() || body["user_move"].as_str().is_none() {
        return (StatusCode::UNPROCESSABLE_ENTITY, "missing fields").into_response();
    }
    let bytes = EXPLANATION.as_bytes();
    let arrow = EXPLANATION.find('→').unwrap();
    let chunks: Vec<Vec<u8>> = vec![
        bytes[..arrow + 1].to_vec(),
        bytes[arrow + 1..arrow + 2].to_vec(),
        bytes[arrow + 2..].to_vec(),
    ];
    let stream = futures::stream::iter(
        chunks
            .into_iter()
            .map(|c| Ok::<_, Infallible>(Bytes::from(c))),
    );
    Body::from_stream(stream).into_response()
}

pub async fn spawn_explainer() -> String {
    let app = Router::new().route("/explain", post(explain));
    format!("{}/explain", serve(app).await)
}

// ---------------------------------------------------------------------------
// Coach server
// ---------------------------------------------------------------------------

pub fn coach_config(predictor_url: &str, explainer_url: Option<String>) -> CoachConfig {
    CoachConfig {
        predictor_url: predictor_url.to_string(),
        explainer_url,
        think: ThinkSettings {
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(30),
            acceleration: 4,
        },
        ..CoachConfig::default()
    }
}

/// Start the coach server against a scripted predictor. Returns its base URL.
pub async fn spawn_coach(script: Arc<PredictorScript>, with_explainer: bool) -> String {
    let predictor_url = spawn_predictor(script).await;
    let explainer_url = if with_explainer {
        Some(spawn_explainer().await)
    } else {
        None
    };
    let state = AppState::new(coach_config(&predictor_url, explainer_url)).unwrap();
    serve(coach_server::router(state)).await
}

/// Poll `GET /api/game` until `pred` holds.
pub async fn wait_until(base: &str, pred: impl Fn(&Value) -> bool) -> Value {
    let client = client();
    let mut last = Value::Null;
    for _ in 0..250 {
        let resp = client.get(format!("{base}/api/game")).send().await.unwrap();
        last = resp.json().await.unwrap();
        if pred(&last) {
            return last;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition never reached; last snapshot: {last:#}");
}

pub async fn post_json(base: &str, path: &str, body: Value) -> reqwest::Response {
    client()
        .post(format!("{base}{path}"))
        .json(&body)
        .send()
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

type Frames = Pin<Box<dyn Stream<Item = Result<Message, tokio_websockets::Error>> + Send>>;

/// Open the game snapshot socket of the server at `base`.
pub async fn connect_ws(base: &str) -> Frames {
    let uri: Uri = format!("{}/api/game/ws", base.replacen("http://", "ws://", 1))
        .parse()
        .unwrap();
    let (ws, _) = ClientBuilder::from_uri(uri).connect().await.unwrap();
    Box::pin(ws)
}

/// Next JSON frame, or `None` once the server closes the socket.
pub async fn next_frame(frames: &mut Frames) -> Option<Value> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), frames.next())
            .await
            .expect("no websocket frame within 5s")?
            .ok()?;
        if msg.is_close() {
            return None;
        }
        if let Some(text) = msg.as_text() {
            return Some(serde_json::from_str(text).unwrap());
        }
    }
}
