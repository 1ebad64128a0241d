//! Rules-engine seam
//!
//! The coaching session never touches chess rules directly. It talks to a
//! [`Board`], which validates moves, produces FEN/SAN, and can undo. The
//! bundled [`ChessBoard`] is backed by `shakmaty`.

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move, Position, Role, Square};

use crate::error::CoachError;
use crate::side::Side;

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// One applied move, verbose form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub side: Side,
    pub from: String,
    pub to: String,
    pub promotion: Option<char>,
    pub san: String,
    pub uci: String,
    pub fen_before: String,
    pub fen_after: String,
}

/// How a finished game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameOutcome {
    Checkmate { winner: Side },
    Draw,
    Timeout { winner: Side },
}

impl GameOutcome {
    pub fn winner(&self) -> Option<Side> {
        match self {
            GameOutcome::Checkmate { winner } | GameOutcome::Timeout { winner } => Some(*winner),
            GameOutcome::Draw => None,
        }
    }
}

pub trait Board {
    /// Apply a move given as origin/destination squares (`"e2"`, `"e4"`).
    fn apply_move(
        &mut self,
        from: &str,
        to: &str,
        promotion: Option<char>,
    ) -> Result<MoveRecord, CoachError>;

    /// Apply a move given as a UCI code.
    fn apply_uci(&mut self, uci: &str) -> Result<MoveRecord, CoachError>;

    fn current_position(&self) -> String;

    fn undo(&mut self) -> Option<MoveRecord>;

    fn is_terminal(&self) -> bool;

    fn outcome(&self) -> Option<GameOutcome>;

    fn side_to_move(&self) -> Side;

    fn history(&self) -> Vec<MoveRecord>;

    fn legal_moves(&self) -> Vec<String>;

    /// Replace the position outright. History restarts from it.
    fn load_position(&mut self, fen: &str) -> Result<(), CoachError>;

    fn san_history(&self) -> Vec<String> {
        self.history().into_iter().map(|m| m.san).collect()
    }
}

/// Side on the clock for a FEN, read straight from its side-to-move field.
pub fn active_side(fen: &str) -> Result<Side, CoachError> {
    let parsed: Fen = fen
        .parse()
        .map_err(|e| CoachError::InvalidFen(format!("{e}")))?;
    Ok(parsed.into_setup().turn.into())
}

/// `shakmaty`-backed board with an undo stack.
#[derive(Debug, Clone)]
pub struct ChessBoard {
    position: Chess,
    /// Position before each applied move, paired with the move
    stack: Vec<(Chess, MoveRecord)>,
}

impl Default for ChessBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ChessBoard {
    pub fn new() -> Self {
        Self {
            position: Chess::default(),
            stack: Vec::new(),
        }
    }

    pub fn from_fen(fen: &str) -> Result<Self, CoachError> {
        Ok(Self {
            position: parse_position(fen)?,
            stack: Vec::new(),
        })
    }

    fn play(&mut self, mv: Move) -> Result<MoveRecord, CoachError> {
        let before = self.position.clone();
        let fen_before = fen_of(&before);
        let san = San::from_move(&before, mv.clone()).to_string();
        let uci = mv.to_uci(CastlingMode::Standard).to_string();
        let next = before
            .clone()
            .play(mv)
            .map_err(|_| CoachError::IllegalMove(uci.clone()))?;

        let record = MoveRecord {
            side: before.turn().into(),
            from: uci[0..2].to_string(),
            to: uci[2..4].to_string(),
            promotion: uci.chars().nth(4),
            san,
            uci,
            fen_before,
            fen_after: fen_of(&next),
        };

        self.position = next;
        self.stack.push((before, record.clone()));
        Ok(record)
    }

    fn to_legal(&self, uci: &UciMove) -> Result<Move, CoachError> {
        uci.to_move(&self.position)
            .map_err(|_| CoachError::IllegalMove(uci.to_string()))
    }
}

impl Board for ChessBoard {
    fn apply_move(
        &mut self,
        from: &str,
        to: &str,
        promotion: Option<char>,
    ) -> Result<MoveRecord, CoachError> {
        let from_sq: Square = from
            .trim()
            .parse()
            .map_err(|_| CoachError::InvalidSquare(from.to_string()))?;
        let to_sq: Square = to
            .trim()
            .parse()
            .map_err(|_| CoachError::InvalidSquare(to.to_string()))?;
        let role = match promotion {
            Some(c) => Some(
                Role::from_char(c.to_ascii_lowercase()).ok_or(CoachError::InvalidPromotion(c))?,
            ),
            None => None,
        };

        let uci = UciMove::Normal {
            from: from_sq,
            to: to_sq,
            promotion: role,
        };
        let mv = match self.to_legal(&uci) {
            Ok(mv) => mv,
            // Pawn reaching the last rank without a piece chosen: queen it
            Err(e) if role.is_none() => self
                .to_legal(&UciMove::Normal {
                    from: from_sq,
                    to: to_sq,
                    promotion: Some(Role::Queen),
                })
                .map_err(|_| e)?,
            Err(e) => return Err(e),
        };
        self.play(mv)
    }

    fn apply_uci(&mut self, uci: &str) -> Result<MoveRecord, CoachError> {
        let parsed: UciMove = uci
            .trim()
            .parse()
            .map_err(|_| CoachError::IllegalMove(uci.to_string()))?;
        let mv = self.to_legal(&parsed)?;
        self.play(mv)
    }

    fn current_position(&self) -> String {
        fen_of(&self.position)
    }

    fn undo(&mut self) -> Option<MoveRecord> {
        let (previous, record) = self.stack.pop()?;
        self.position = previous;
        Some(record)
    }

    fn is_terminal(&self) -> bool {
        self.position.is_game_over()
    }

    fn outcome(&self) -> Option<GameOutcome> {
        if self.position.is_checkmate() {
            Some(GameOutcome::Checkmate {
                winner: Side::from(self.position.turn()).opposite(),
            })
        } else if self.position.is_game_over() {
            Some(GameOutcome::Draw)
        } else {
            None
        }
    }

    fn side_to_move(&self) -> Side {
        self.position.turn().into()
    }

    fn history(&self) -> Vec<MoveRecord> {
        self.stack.iter().map(|(_, record)| record.clone()).collect()
    }

    fn legal_moves(&self) -> Vec<String> {
        self.position
            .legal_moves()
            .iter()
            .map(|m| m.to_uci(CastlingMode::Standard).to_string())
            .collect()
    }

    fn load_position(&mut self, fen: &str) -> Result<(), CoachError> {
        self.position = parse_position(fen)?;
        self.stack.clear();
        Ok(())
    }
}

fn parse_position(fen: &str) -> Result<Chess, CoachError> {
    let parsed: Fen = fen
        .trim()
        .parse()
        .map_err(|e| CoachError::InvalidFen(format!("{e}")))?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| CoachError::InvalidPosition(format!("{e}")))
}

fn fen_of(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}
