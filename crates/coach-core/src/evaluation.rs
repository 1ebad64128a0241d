//! Predictor request/response values

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// UCI move code, e.g. `e2e4` or `e7e8q`
pub type MoveCode = String;

/// Move code -> probability
pub type MoveDistribution = BTreeMap<MoveCode, f64>;

/// Result of evaluating one position. Never mutated once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionEvaluation {
    pub recommended_move: MoveCode,
    /// Probability that white wins
    pub win_probability: f64,
    pub move_distribution: MoveDistribution,
}

impl PositionEvaluation {
    /// Highest-probability entry of the distribution.
    pub fn most_likely_move(&self) -> Option<&str> {
        self.move_distribution
            .iter()
            .filter(|(_, p)| p.is_finite())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(uci, _)| uci.as_str())
    }
}

/// Rating pair sent with an evaluation. `self_elo` belongs to the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strength {
    pub self_elo: u32,
    pub opponent_elo: u32,
}

impl Strength {
    pub fn symmetric(elo: u32) -> Self {
        Self {
            self_elo: elo,
            opponent_elo: elo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub fen: String,
    pub strength: Option<Strength>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationRequest {
    /// Position before the flagged move
    pub fen: String,
    /// The flagged move in SAN
    pub user_move: String,
    pub recommended_move: Option<MoveCode>,
    pub move_distribution: Option<MoveDistribution>,
}
