/// Blunder classification — pure functions only
/// (No Board/Clock/Client dependencies)
///
/// Win probabilities are always white-perspective values in [0, 1]. Passing
/// anything outside that range is a caller bug; nothing here clamps.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::side::Side;

/// Minimum drop for each strictness level
const THRESHOLD_STRICT: f64 = 0.05;
const THRESHOLD_STANDARD: f64 = 0.10;
const THRESHOLD_LENIENT: f64 = 0.20;

/// Message tiers (drop magnitude)
const TIER_SERIOUS: f64 = 0.20;
const TIER_MISTAKE: f64 = 0.10;

/// Absorbs binary rounding so that a drop equal to a threshold on paper
/// (0.60 - 0.50 against 0.10) compares as equal.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    Strict,
    #[default]
    Standard,
    Lenient,
}

impl Strictness {
    pub const ALL: [Strictness; 3] = [Strictness::Strict, Strictness::Standard, Strictness::Lenient];

    pub fn threshold(self) -> f64 {
        match self {
            Strictness::Strict => THRESHOLD_STRICT,
            Strictness::Standard => THRESHOLD_STANDARD,
            Strictness::Lenient => THRESHOLD_LENIENT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strictness::Strict => "strict",
            Strictness::Standard => "standard",
            Strictness::Lenient => "lenient",
        }
    }
}

impl FromStr for Strictness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Strictness::Strict),
            "standard" => Ok(Strictness::Standard),
            "lenient" => Ok(Strictness::Lenient),
            other => Err(format!("unknown strictness '{other}'")),
        }
    }
}

/// How bad a flagged move was, for the intervention banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Serious,
    Mistake,
    Inaccuracy,
}

impl Severity {
    pub fn message(self) -> &'static str {
        match self {
            Severity::Serious => "That was a serious mistake!",
            Severity::Mistake => "That move was a mistake.",
            Severity::Inaccuracy => "That move weakens your position.",
        }
    }
}

/// Drop in the mover's winning chances. Positive means the move hurt the mover.
pub fn compute_drop(before: f64, after: f64, mover: Side) -> f64 {
    match mover {
        Side::White => before - after,
        Side::Black => after - before,
    }
}

/// A move is a blunder when its drop meets the threshold (inclusive).
pub fn is_blunder(before: f64, after: f64, mover: Side, threshold: f64) -> bool {
    compute_drop(before, after, mover) >= threshold - EPSILON
}

pub fn classify_message(drop: f64) -> Severity {
    if drop >= TIER_SERIOUS - EPSILON {
        Severity::Serious
    } else if drop >= TIER_MISTAKE - EPSILON {
        Severity::Mistake
    } else {
        Severity::Inaccuracy
    }
}
