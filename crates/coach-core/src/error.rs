//! Coaching session error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoachError {
    #[error("Invalid square: {0}")]
    InvalidSquare(String),

    #[error("Invalid promotion piece: {0}")]
    InvalidPromotion(char),

    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("Invalid FEN: {0}")]
    InvalidFen(String),

    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error("Game is not in progress")]
    GameNotRunning,

    #[error("Game has already started")]
    AlreadyStarted,

    #[error("It is not the human player's turn")]
    NotHumanTurn,

    #[error("Waiting for the opponent to move")]
    OpponentThinking,

    #[error("A blunder check is still pending")]
    CheckPending,

    #[error("An intervention is active")]
    InterventionActive,

    #[error("No intervention to resolve")]
    NoIntervention,

    #[error("Intervention is not in the {expected} phase")]
    WrongPhase { expected: &'static str },

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Session has been shut down")]
    Closed,
}
