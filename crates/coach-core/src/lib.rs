//! Blunder-detection coaching core.
//!
//! Pure game logic: blunder policy, intervention state machine, dual clock,
//! opponent sampling and the [`Session`] reducer that ties them together.
//! No I/O happens here; see `coach-engine` for the async shell.

pub mod board;
pub mod clock;
pub mod error;
pub mod evaluation;
pub mod intervention;
pub mod policy;
pub mod sampling;
pub mod session;
pub mod side;
pub mod ticket;

pub use board::{active_side, Board, ChessBoard, GameOutcome, MoveRecord, STARTING_FEN};
pub use clock::{ClockPair, ClockState, ThinkingOverlay, TickOutcome};
pub use error::CoachError;
pub use evaluation::{
    EvaluationRequest, ExplanationRequest, MoveCode, MoveDistribution, PositionEvaluation,
    Strength,
};
pub use intervention::{Intervention, InterventionRecord, Phase, Resolution};
pub use policy::{classify_message, compute_drop, is_blunder, Severity, Strictness};
pub use session::{
    Action, Effect, GameMode, GameStatus, Notice, Session, SessionSettings, Snapshot,
    ThinkSettings,
};
pub use side::Side;
pub use ticket::Ticket;
