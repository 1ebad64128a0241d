//! Coaching session reducer
//!
//! A [`Session`] owns everything mutable about one game: the board, both
//! clocks, the intervention, the evaluation cache and the set of requests in
//! flight. Nothing else writes to it. Callers feed it [`Action`]s and carry
//! out the [`Effect`]s it returns; asynchronous results come back as more
//! actions, tagged with the [`Ticket`] they were issued under.
//!
//! Staleness is decided here and nowhere else. Every position change
//! advances the ticket generation and forgets all requests in flight, so a
//! late result finds no entry and is dropped.

use std::collections::HashMap;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::board::{Board, GameOutcome, MoveRecord};
use crate::clock::{ClockPair, ClockState, ThinkingOverlay, TickOutcome};
use crate::error::CoachError;
use crate::evaluation::{EvaluationRequest, ExplanationRequest, PositionEvaluation, Strength};
use crate::intervention::{FlaggedMove, Intervention, Resolution};
use crate::policy::{classify_message, compute_drop, is_blunder, Severity, Strictness};
use crate::sampling;
use crate::side::Side;
use crate::ticket::{Ticket, TicketIssuer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameMode {
    /// Two humans share the board. Never coached.
    PassAndPlay,
    /// Human against the move predictor.
    VsPredictor { human: Side, coaching: bool },
}

impl GameMode {
    pub fn coaching(&self) -> bool {
        matches!(self, GameMode::VsPredictor { coaching: true, .. })
    }

    pub fn is_human(&self, side: Side) -> bool {
        match self {
            GameMode::PassAndPlay => true,
            GameMode::VsPredictor { human, .. } => *human == side,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkSettings {
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// How many displayed seconds pass per real second of thinking
    pub acceleration: u32,
}

impl Default for ThinkSettings {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(600),
            max_delay: Duration::from_millis(1800),
            acceleration: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub mode: GameMode,
    pub strictness: Strictness,
    pub human_elo: u32,
    pub opponent_elo: u32,
    /// Used for the best-move lookup on a flagged move
    pub max_elo: u32,
    pub clock_secs: u32,
    pub think: ThinkSettings,
    /// Fixed RNG seed; `None` draws one from the OS
    pub seed: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            mode: GameMode::VsPredictor {
                human: Side::White,
                coaching: true,
            },
            strictness: Strictness::Standard,
            human_elo: 1500,
            opponent_elo: 1500,
            max_elo: 2500,
            clock_secs: 600,
            think: ThinkSettings::default(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GameStatus {
    NotStarted,
    Running,
    Over { outcome: GameOutcome },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Start,
    CommitMove {
        from: String,
        to: String,
        promotion: Option<char>,
    },
    EvaluationResolved {
        ticket: Ticket,
        evaluation: PositionEvaluation,
    },
    EvaluationFailed {
        ticket: Ticket,
        reason: String,
    },
    Retry,
    Explain,
    DismissExplanation,
    Continue,
    ExplanationChunk {
        ticket: Ticket,
        text: String,
    },
    ExplanationFinished {
        ticket: Ticket,
    },
    ExplanationFailed {
        ticket: Ticket,
        reason: String,
    },
    OpponentMoveReady {
        ticket: Ticket,
    },
    Tick,
    SetStrictness(Strictness),
    Shutdown,
}

impl Action {
    /// Actions that come from the player rather than from a request or timer.
    fn is_intent(&self) -> bool {
        matches!(
            self,
            Action::Start
                | Action::CommitMove { .. }
                | Action::Retry
                | Action::Explain
                | Action::DismissExplanation
                | Action::Continue
                | Action::SetStrictness(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Evaluate {
        ticket: Ticket,
        request: EvaluationRequest,
    },
    Explain {
        ticket: Ticket,
        request: ExplanationRequest,
    },
    /// Deliver `OpponentMoveReady { ticket }` after `delay`.
    Think {
        ticket: Ticket,
        delay: Duration,
    },
    Notify(Notice),
}

/// Transient, user-visible events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    GameStarted,
    InterventionTriggered { severity: Severity, drop: f64 },
    InterventionResolved { resolution: Resolution },
    /// No cached evaluation for the position the move was played from
    CheckSkipped,
    EvaluationUnavailable { reason: String },
    ExplanationUnavailable { reason: String },
    OpponentMoved { uci: String, san: String },
    /// The opponent moved without a predictor distribution
    OpponentFallback { uci: String },
    GameOver { outcome: GameOutcome },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Purpose {
    /// Evaluation of the current position for the cache and indicator
    Position,
    /// Post-move evaluation that feeds the blunder policy
    Check,
    /// Max-strength evaluation of the position before a flagged move
    BestMove,
    /// Evaluation of the pre-move position, still in flight when the move
    /// was committed. Survives the position change it predates.
    Baseline,
}

/// Pending-evaluation marker: a post-move check in flight. Classification
/// runs once both sides of the comparison are known.
#[derive(Debug, Clone)]
struct PendingCheck {
    ticket: Ticket,
    fen_before: String,
    before: Option<PositionEvaluation>,
    after: Option<PositionEvaluation>,
    mv: MoveRecord,
}

#[derive(Debug, Clone)]
struct Thinking {
    ticket: Ticket,
    uci: String,
    overlay: ThinkingOverlay,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockView {
    pub white: u32,
    pub black: u32,
    pub state: ClockState,
    pub paused: bool,
    pub thinking: Option<ThinkingOverlay>,
}

/// Read model handed to the UI after every change.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub status: GameStatus,
    pub mode: GameMode,
    pub strictness: Strictness,
    pub fen: String,
    pub side_to_move: Side,
    pub history: Vec<String>,
    pub last_move: Option<MoveRecord>,
    pub clock: ClockView,
    pub intervention: Intervention,
    pub message: Option<String>,
    /// Visible evaluation indicator (white's win probability)
    pub evaluation: Option<f64>,
    pub checking: bool,
    pub notice: Option<Notice>,
}

pub struct Session<B: Board> {
    board: B,
    settings: SessionSettings,
    status: GameStatus,
    clock: ClockPair,
    intervention: Intervention,
    tickets: TicketIssuer,
    inflight: HashMap<u64, Purpose>,
    /// Evaluation of the current position, if known
    cache: Option<PositionEvaluation>,
    /// The last evaluation attempt for the current position failed
    cache_failed: bool,
    pending: Option<PendingCheck>,
    /// Evaluation of the position a retry returns to
    retry_baseline: Option<PositionEvaluation>,
    thinking: Option<Thinking>,
    indicator: Option<f64>,
    notice: Option<Notice>,
    rng: StdRng,
    closed: bool,
}

impl<B: Board> Session<B> {
    pub fn new(board: B, settings: SessionSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            board,
            clock: ClockPair::new(settings.clock_secs),
            settings,
            status: GameStatus::NotStarted,
            intervention: Intervention::new(),
            tickets: TicketIssuer::default(),
            inflight: HashMap::new(),
            cache: None,
            cache_failed: false,
            pending: None,
            retry_baseline: None,
            thinking: None,
            indicator: None,
            notice: None,
            rng,
            closed: false,
        }
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn clock(&self) -> &ClockPair {
        &self.clock
    }

    pub fn intervention(&self) -> &Intervention {
        &self.intervention
    }

    pub fn is_checking(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_thinking(&self) -> bool {
        self.thinking.is_some()
    }

    pub fn evaluation_indicator(&self) -> Option<f64> {
        self.indicator
    }

    pub fn cached_evaluation(&self) -> Option<&PositionEvaluation> {
        self.cache.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn snapshot(&self) -> Snapshot {
        let history = self.board.history();
        Snapshot {
            status: self.status,
            mode: self.settings.mode,
            strictness: self.settings.strictness,
            fen: self.board.current_position(),
            side_to_move: self.board.side_to_move(),
            last_move: history.last().cloned(),
            history: history.into_iter().map(|m| m.san).collect(),
            clock: ClockView {
                white: self.clock.remaining(Side::White),
                black: self.clock.remaining(Side::Black),
                state: self.clock.state(),
                paused: self.clock.is_paused(),
                thinking: self.thinking.as_ref().map(|t| t.overlay),
            },
            intervention: self.intervention.clone(),
            message: self
                .intervention
                .severity()
                .map(|s| s.message().to_string()),
            evaluation: self.indicator,
            checking: self.pending.is_some(),
            notice: self.notice.clone(),
        }
    }

    pub fn dispatch(&mut self, action: Action) -> Result<Vec<Effect>, CoachError> {
        if self.closed {
            return if action.is_intent() {
                Err(CoachError::Closed)
            } else {
                Ok(Vec::new())
            };
        }

        let mut fx = Vec::new();
        match action {
            Action::Start => self.start(&mut fx)?,
            Action::CommitMove {
                from,
                to,
                promotion,
            } => self.commit_move(&from, &to, promotion, &mut fx)?,
            Action::EvaluationResolved { ticket, evaluation } => {
                self.on_evaluation(ticket, Ok(evaluation), &mut fx)
            }
            Action::EvaluationFailed { ticket, reason } => {
                self.on_evaluation(ticket, Err(reason), &mut fx)
            }
            Action::Retry => self.retry(&mut fx)?,
            Action::Explain => self.explain(&mut fx)?,
            Action::DismissExplanation => self.intervention.dismiss_explanation()?,
            Action::Continue => self.continue_anyway(&mut fx)?,
            Action::ExplanationChunk { ticket, text } => {
                if !self.intervention.push_explanation(ticket, &text) {
                    debug!(ticket = ticket.id, "Dropping explanation fragment for abandoned stream");
                }
            }
            Action::ExplanationFinished { ticket } => {
                if !self.intervention.finish_explanation(ticket) {
                    debug!(ticket = ticket.id, "Ignoring completion of abandoned stream");
                }
            }
            Action::ExplanationFailed { ticket, reason } => {
                if self.intervention.fail_explanation(ticket) {
                    warn!(%reason, "Explanation failed");
                    self.notify(&mut fx, Notice::ExplanationUnavailable { reason });
                }
            }
            Action::OpponentMoveReady { ticket } => self.on_opponent_ready(ticket, &mut fx),
            Action::Tick => self.tick(&mut fx),
            Action::SetStrictness(strictness) => {
                info!(strictness = strictness.as_str(), "Strictness changed");
                self.settings.strictness = strictness;
            }
            Action::Shutdown => self.shutdown(),
        }
        Ok(fx)
    }

    // ---- Intents ----

    fn start(&mut self, fx: &mut Vec<Effect>) -> Result<(), CoachError> {
        if self.status != GameStatus::NotStarted {
            return Err(CoachError::AlreadyStarted);
        }
        self.status = GameStatus::Running;
        self.clock.start();
        info!(mode = ?self.settings.mode, fen = %self.board.current_position(), "Game started");
        self.notify(fx, Notice::GameStarted);
        self.after_position_change(fx);
        Ok(())
    }

    fn commit_move(
        &mut self,
        from: &str,
        to: &str,
        promotion: Option<char>,
        fx: &mut Vec<Effect>,
    ) -> Result<(), CoachError> {
        if self.status != GameStatus::Running {
            return Err(CoachError::GameNotRunning);
        }
        if self.intervention.is_active() {
            return Err(CoachError::InterventionActive);
        }
        if self.pending.is_some() {
            return Err(CoachError::CheckPending);
        }
        if self.thinking.is_some() {
            return Err(CoachError::OpponentThinking);
        }
        let mover = self.board.side_to_move();
        if !self.settings.mode.is_human(mover) {
            return Err(CoachError::NotHumanTurn);
        }

        // Snapshot strictly before the move lands
        let fen_before = self.board.current_position();
        let before = self.cache.clone();
        let baseline_fetch = self.position_fetch();

        let record = self.board.apply_move(from, to, promotion)?;
        debug!(san = %record.san, side = %mover, "Move committed");
        self.position_changed();

        if self.finish_if_terminal(fx) {
            return Ok(());
        }

        if !self.settings.mode.coaching() {
            self.after_position_change(fx);
            return Ok(());
        }

        if before.is_none() {
            let Some(id) = baseline_fetch else {
                warn!(san = %record.san, "No evaluation for the pre-move position; skipping blunder check");
                self.notify(fx, Notice::CheckSkipped);
                self.after_position_change(fx);
                return Ok(());
            };
            debug!(san = %record.san, "Pre-move evaluation still in flight; check waits for it");
            self.inflight.insert(id, Purpose::Baseline);
        }

        let ticket = self.tickets.issue();
        self.inflight.insert(ticket.id, Purpose::Check);
        self.pending = Some(PendingCheck {
            ticket,
            fen_before,
            before,
            after: None,
            mv: record,
        });
        fx.push(Effect::Evaluate {
            ticket,
            request: self.position_request(),
        });
        Ok(())
    }

    fn retry(&mut self, fx: &mut Vec<Effect>) -> Result<(), CoachError> {
        if !self.intervention.is_active() {
            return Err(CoachError::NoIntervention);
        }
        let target = self
            .intervention
            .record()
            .position_before_move
            .clone()
            .ok_or(CoachError::NoIntervention)?;

        // Board first: a failed restore leaves the intervention open
        let undoes_flagged = self
            .board
            .history()
            .last()
            .is_some_and(|m| m.fen_before == target);
        if undoes_flagged {
            self.board.undo();
        } else {
            self.board.load_position(&target)?;
        }
        let resolved = self.intervention.resolve(Resolution::Retry)?;
        self.position_changed();
        self.cache = self.retry_baseline.take();
        self.clock.set_frozen(false);

        info!(
            san = resolved.record.move_notation.as_deref().unwrap_or("?"),
            "Intervention resolved: retry"
        );
        self.notify(
            fx,
            Notice::InterventionResolved {
                resolution: Resolution::Retry,
            },
        );
        Ok(())
    }

    fn continue_anyway(&mut self, fx: &mut Vec<Effect>) -> Result<(), CoachError> {
        let resolved = self.intervention.resolve(Resolution::Continue)?;
        self.inflight.retain(|_, purpose| *purpose != Purpose::BestMove);
        self.retry_baseline = None;
        self.clock.set_frozen(false);

        info!(
            san = resolved.record.move_notation.as_deref().unwrap_or("?"),
            "Intervention resolved: continue"
        );
        self.notify(
            fx,
            Notice::InterventionResolved {
                resolution: Resolution::Continue,
            },
        );
        self.maybe_schedule_opponent(fx);
        Ok(())
    }

    fn explain(&mut self, fx: &mut Vec<Effect>) -> Result<(), CoachError> {
        if self.intervention.best_move_pending() {
            self.intervention.begin_explain(None)?;
            debug!("Explanation queued behind best-move lookup");
            return Ok(());
        }
        let ticket = self.tickets.issue();
        self.intervention.begin_explain(Some(ticket))?;
        if let Some(request) = self.intervention.explanation_request() {
            fx.push(Effect::Explain { ticket, request });
        }
        Ok(())
    }

    // ---- Request results ----

    fn on_evaluation(
        &mut self,
        ticket: Ticket,
        result: Result<PositionEvaluation, String>,
        fx: &mut Vec<Effect>,
    ) {
        let Some(purpose) = self.inflight.remove(&ticket.id) else {
            debug!(ticket = ticket.id, "Discarding stale evaluation");
            return;
        };
        if purpose != Purpose::Baseline && !self.tickets.is_current(ticket) {
            debug!(ticket = ticket.id, "Discarding evaluation from an earlier position");
            return;
        }

        match (purpose, result) {
            (Purpose::Position, Ok(evaluation)) => {
                if self.indicator_visible() {
                    self.indicator = Some(evaluation.win_probability);
                }
                self.cache = Some(evaluation);
                self.cache_failed = false;
                self.maybe_schedule_opponent(fx);
            }
            (Purpose::Position, Err(reason)) => {
                warn!(%reason, "Position evaluation failed");
                self.cache_failed = true;
                self.notify(fx, Notice::EvaluationUnavailable { reason });
                self.maybe_schedule_opponent(fx);
            }
            (Purpose::Baseline, Ok(evaluation)) => {
                let Some(check) = self.pending.as_mut() else {
                    return;
                };
                check.before = Some(evaluation);
                self.settle_check(fx);
            }
            (Purpose::Baseline, Err(reason)) => {
                let Some(check) = self.pending.take() else {
                    return;
                };
                warn!(%reason, san = %check.mv.san, "Pre-move evaluation failed; skipping blunder check");
                self.notify(fx, Notice::CheckSkipped);
                if check.after.is_some() {
                    self.maybe_schedule_opponent(fx);
                } else {
                    // Post-move result still fills the cache
                    self.inflight.insert(check.ticket.id, Purpose::Position);
                }
            }
            (Purpose::Check, Ok(evaluation)) => {
                let Some(check) = self.pending.as_mut().filter(|p| p.ticket == ticket) else {
                    return;
                };
                check.after = Some(evaluation.clone());
                self.cache = Some(evaluation);
                self.cache_failed = false;
                self.settle_check(fx);
            }
            (Purpose::Check, Err(reason)) => {
                if self.pending.take_if(|p| p.ticket == ticket).is_none() {
                    return;
                }
                self.inflight.retain(|_, purpose| *purpose != Purpose::Baseline);
                warn!(%reason, "Blunder check failed; letting play continue");
                self.cache_failed = true;
                self.notify(fx, Notice::EvaluationUnavailable { reason });
                self.maybe_schedule_opponent(fx);
            }
            (Purpose::BestMove, Ok(evaluation)) => {
                if self.intervention.apply_best_move(ticket, &evaluation) {
                    debug!(best = %evaluation.recommended_move, "Best move attached to intervention");
                    self.start_queued_explain(fx);
                }
            }
            (Purpose::BestMove, Err(reason)) => {
                if self.intervention.best_move_failed(ticket) {
                    warn!(%reason, "Best-move lookup failed; showing intervention without it");
                    self.notify(fx, Notice::EvaluationUnavailable { reason });
                    self.start_queued_explain(fx);
                }
            }
        }
    }

    fn settle_check(&mut self, fx: &mut Vec<Effect>) {
        if let Some(check) = self.pending.take_if(|p| p.before.is_some() && p.after.is_some()) {
            self.classify(check, fx);
        }
    }

    fn classify(&mut self, check: PendingCheck, fx: &mut Vec<Effect>) {
        let PendingCheck {
            fen_before,
            before: Some(baseline),
            after: Some(after),
            mv,
            ..
        } = check
        else {
            return;
        };
        let before = baseline.win_probability;
        let after = after.win_probability;
        let mover = mv.side;
        let threshold = self.settings.strictness.threshold();

        if !is_blunder(before, after, mover, threshold) {
            debug!(san = %mv.san, before, after, "Move passed blunder check");
            self.maybe_schedule_opponent(fx);
            return;
        }

        let drop = compute_drop(before, after, mover);
        let severity = classify_message(drop);
        let ticket = self.tickets.issue();
        let flagged = FlaggedMove {
            position_before_move: fen_before.clone(),
            mv,
            win_prob_before: before,
            win_prob_after: after,
        };
        if let Err(e) = self.intervention.trigger(flagged, severity, ticket) {
            warn!(error = %e, "Could not open intervention");
            return;
        }

        self.inflight.insert(ticket.id, Purpose::BestMove);
        fx.push(Effect::Evaluate {
            ticket,
            request: EvaluationRequest {
                fen: fen_before,
                strength: Some(Strength::symmetric(self.settings.max_elo)),
            },
        });
        self.retry_baseline = Some(baseline);
        self.clock.set_frozen(true);

        info!(drop, ?severity, "Blunder detected; intervention opened");
        self.notify(fx, Notice::InterventionTriggered { severity, drop });
    }

    fn start_queued_explain(&mut self, fx: &mut Vec<Effect>) {
        if !self.intervention.explain_queued() {
            return;
        }
        let ticket = self.tickets.issue();
        self.intervention.start_queued_explain(ticket);
        if let Some(request) = self.intervention.explanation_request() {
            fx.push(Effect::Explain { ticket, request });
        }
    }

    // ---- Opponent ----

    fn opponent_to_move(&self) -> bool {
        matches!(self.settings.mode, GameMode::VsPredictor { human, .. } if human != self.board.side_to_move())
    }

    /// Pick the opponent's reply if nothing stands in its way.
    fn maybe_schedule_opponent(&mut self, fx: &mut Vec<Effect>) {
        if self.status != GameStatus::Running
            || !self.opponent_to_move()
            || self.intervention.is_active()
            || self.pending.is_some()
            || self.thinking.is_some()
        {
            return;
        }

        let history = self.board.history();
        let choice = if let Some(opening) = sampling::opening_move(&history) {
            opening.to_string()
        } else if let Some(evaluation) = &self.cache {
            match sampling::sample_move(&evaluation.move_distribution, &mut self.rng) {
                Some(uci) => uci,
                None => evaluation.recommended_move.clone(),
            }
        } else if self.cache_failed {
            let Some(uci) = sampling::random_move(&self.board.legal_moves(), &mut self.rng) else {
                return;
            };
            warn!(%uci, "No predictor distribution; opponent plays a random legal move");
            self.notify(fx, Notice::OpponentFallback { uci: uci.clone() });
            uci
        } else {
            self.request_position_eval(fx);
            return;
        };

        let side = self.board.side_to_move();
        let delay = sampling::think_delay(
            self.settings.think.min_delay,
            self.settings.think.max_delay,
            &mut self.rng,
        );
        let overlay = ThinkingOverlay::new(
            side,
            self.clock.remaining(side),
            delay,
            self.settings.think.acceleration,
        );
        let ticket = self.tickets.issue();
        debug!(uci = %choice, delay_ms = delay.as_millis() as u64, "Opponent thinking");
        self.thinking = Some(Thinking {
            ticket,
            uci: choice,
            overlay,
        });
        fx.push(Effect::Think { ticket, delay });
    }

    fn on_opponent_ready(&mut self, ticket: Ticket, fx: &mut Vec<Effect>) {
        let Some(thinking) = self.thinking.take_if(|t| t.ticket == ticket) else {
            debug!(ticket = ticket.id, "Discarding stale opponent move");
            return;
        };
        if self.status != GameStatus::Running || self.intervention.is_active() {
            return;
        }

        if let TickOutcome::Timeout { loser } = self.clock.settle_thinking(&thinking.overlay) {
            self.finish(GameOutcome::Timeout { winner: !loser }, fx);
            return;
        }

        let record = match self.board.apply_uci(&thinking.uci) {
            Ok(record) => record,
            Err(e) => {
                warn!(uci = %thinking.uci, error = %e, "Predictor move rejected; falling back to a random legal move");
                let Some(uci) = sampling::random_move(&self.board.legal_moves(), &mut self.rng)
                else {
                    return;
                };
                match self.board.apply_uci(&uci) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(%uci, error = %e, "Fallback move rejected");
                        return;
                    }
                }
            }
        };

        self.position_changed();
        info!(san = %record.san, "Opponent moved");
        self.notify(
            fx,
            Notice::OpponentMoved {
                uci: record.uci,
                san: record.san,
            },
        );
        self.after_position_change(fx);
    }

    // ---- Clock ----

    fn tick(&mut self, fx: &mut Vec<Effect>) {
        if self.status != GameStatus::Running {
            return;
        }
        // Read the freeze flag at the moment of the tick
        self.clock.set_frozen(self.intervention.is_active());
        if let TickOutcome::Timeout { loser } = self.clock.tick(self.board.side_to_move()) {
            self.finish(GameOutcome::Timeout { winner: !loser }, fx);
        }
    }

    // ---- Helpers ----

    fn indicator_visible(&self) -> bool {
        !self.settings.mode.coaching() || self.settings.mode.is_human(self.board.side_to_move())
    }

    fn strength_for(&self, side: Side) -> Strength {
        let s = &self.settings;
        match s.mode {
            GameMode::PassAndPlay => Strength::symmetric(s.human_elo),
            GameMode::VsPredictor { human, .. } if human == side => Strength {
                self_elo: s.human_elo,
                opponent_elo: s.opponent_elo,
            },
            GameMode::VsPredictor { .. } => Strength {
                self_elo: s.opponent_elo,
                opponent_elo: s.human_elo,
            },
        }
    }

    fn position_request(&self) -> EvaluationRequest {
        EvaluationRequest {
            fen: self.board.current_position(),
            strength: Some(self.strength_for(self.board.side_to_move())),
        }
    }

    /// Id of the evaluation in flight for the current position, if any.
    fn position_fetch(&self) -> Option<u64> {
        self.inflight
            .iter()
            .find_map(|(id, purpose)| (*purpose == Purpose::Position).then_some(*id))
    }

    fn request_position_eval(&mut self, fx: &mut Vec<Effect>) {
        if self.position_fetch().is_some() {
            return;
        }
        let ticket = self.tickets.issue();
        self.inflight.insert(ticket.id, Purpose::Position);
        fx.push(Effect::Evaluate {
            ticket,
            request: self.position_request(),
        });
    }

    /// Decide what the new position needs: game over, an opening reply, or
    /// an evaluation.
    fn after_position_change(&mut self, fx: &mut Vec<Effect>) {
        if self.finish_if_terminal(fx) {
            return;
        }
        if self.opponent_to_move() && sampling::opening_move(&self.board.history()).is_some() {
            self.maybe_schedule_opponent(fx);
        } else {
            self.request_position_eval(fx);
        }
    }

    /// Everything issued against the previous position is now stale.
    fn position_changed(&mut self) {
        self.tickets.advance();
        self.inflight.clear();
        self.cache = None;
        self.cache_failed = false;
        self.pending = None;
        self.thinking = None;
    }

    fn finish_if_terminal(&mut self, fx: &mut Vec<Effect>) -> bool {
        match self.board.outcome() {
            Some(outcome) => {
                self.finish(outcome, fx);
                true
            }
            None => false,
        }
    }

    fn finish(&mut self, outcome: GameOutcome, fx: &mut Vec<Effect>) {
        self.status = GameStatus::Over { outcome };
        self.clock.stop();
        self.inflight.clear();
        self.pending = None;
        self.thinking = None;
        info!(?outcome, "Game over");
        self.notify(fx, Notice::GameOver { outcome });
    }

    fn shutdown(&mut self) {
        self.closed = true;
        self.inflight.clear();
        self.pending = None;
        self.thinking = None;
        self.clock.stop();
        debug!("Session shut down");
    }

    fn notify(&mut self, fx: &mut Vec<Effect>, notice: Notice) {
        self.notice = Some(notice.clone());
        fx.push(Effect::Notify(notice));
    }
}
