//! Predictor and explainer clients against stub HTTP services.

mod common;

use std::sync::{Arc, Mutex};

use coach_core::{EvaluationRequest, ExplanationRequest, Strength};
use coach_engine::{ClientError, Explainer, HttpExplainer, HttpPredictor, Predictor, WinPerspective};
use common::{coach_config, spawn_explainer, spawn_predictor, PredictorScript, AFTER_E4, EXPLANATION, STARTING_FEN};

fn request(fen: &str) -> EvaluationRequest {
    EvaluationRequest {
        fen: fen.to_string(),
        strength: Some(Strength {
            self_elo: 1200,
            opponent_elo: 1800,
        }),
    }
}

#[tokio::test]
async fn test_predictor_round_trip() {
    let script = Arc::new(PredictorScript::with_wins(&[(STARTING_FEN, 0.61)]));
    let url = spawn_predictor(script.clone()).await;
    let predictor = HttpPredictor::new(&coach_config(&url, None)).unwrap();

    let eval = predictor.evaluate(&request(STARTING_FEN)).await.unwrap();
    assert_eq!(eval.win_probability, 0.61);
    assert_eq!(eval.move_distribution.len(), 20);
    assert!(eval.move_distribution.contains_key(&eval.recommended_move));

    let sent = script.requests.lock().unwrap()[0].clone();
    assert_eq!(sent["fen"], STARTING_FEN);
    assert_eq!(sent["elo_self"], 1200);
    assert_eq!(sent["elo_oppo"], 1800);
}

#[tokio::test]
async fn test_predictor_model_error() {
    let script = Arc::new(PredictorScript {
        fail_unlisted: true,
        ..Default::default()
    });
    let url = spawn_predictor(script).await;
    let predictor = HttpPredictor::new(&coach_config(&url, None)).unwrap();

    let err = predictor.evaluate(&request(STARTING_FEN)).await.unwrap_err();
    assert!(matches!(err, ClientError::Model(ref msg) if msg == "model unavailable"), "{err}");
}

#[tokio::test]
async fn test_predictor_side_to_move_perspective() {
    let script = Arc::new(PredictorScript::with_wins(&[(AFTER_E4, 0.75)]));
    let url = spawn_predictor(script).await;
    let mut config = coach_config(&url, None);
    config.win_perspective = WinPerspective::SideToMove;
    let predictor = HttpPredictor::new(&config).unwrap();

    let eval = predictor.evaluate(&request(AFTER_E4)).await.unwrap();
    assert!((eval.win_probability - 0.25).abs() < 1e-9);
}

#[tokio::test]
async fn test_predictor_unreachable() {
    // Nothing listens on the discard port
    let predictor = HttpPredictor::new(&coach_config("http://127.0.0.1:9", None)).unwrap();
    let err = predictor.evaluate(&request(STARTING_FEN)).await.unwrap_err();
    assert!(matches!(err, ClientError::Http(_)), "{err}");
}

fn explanation_request() -> ExplanationRequest {
    ExplanationRequest {
        fen: STARTING_FEN.to_string(),
        user_move: "e4".to_string(),
        recommended_move: Some("d2d4".to_string()),
        move_distribution: None,
    }
}

#[tokio::test]
async fn test_explainer_streams_fragments() {
    let url = spawn_explainer().await;
    let explainer = HttpExplainer::new(&coach_config("http://unused", Some(url))).unwrap();

    let fragments = Mutex::new(Vec::new());
    explainer
        .explain(&explanation_request(), |text| fragments.lock().unwrap().push(text))
        .await
        .unwrap();

    let fragments = fragments.into_inner().unwrap();
    assert!(!fragments.is_empty());
    assert!(fragments.iter().all(|f| !f.contains('\u{fffd}')));
    assert_eq!(fragments.concat(), EXPLANATION);
}

#[tokio::test]
async fn test_explainer_not_configured() {
    let explainer = HttpExplainer::new(&coach_config("http://unused", None)).unwrap();
    let err = explainer
        .explain(&explanation_request(), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotConfigured(_)));
}
