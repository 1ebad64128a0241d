//! Intervention lifecycle
//!
//! ```text
//! Inactive ──blunder──▶ Triggered ──explain──▶ Explaining{finished}
//!    ▲                     │   ▲                   │
//!    │                     │   └──dismiss/fail─────┤
//!    └──── Resolved ◀──retry/continue──────────────┘
//! ```
//!
//! `Resolved` is transient: [`Intervention::resolve`] hands back the record
//! it cleared and the machine is `Inactive` again before it returns.

use serde::Serialize;

use crate::board::MoveRecord;
use crate::error::CoachError;
use crate::evaluation::{ExplanationRequest, MoveCode, MoveDistribution, PositionEvaluation};
use crate::policy::Severity;
use crate::ticket::Ticket;

/// One pending coaching pause, in the shape the UI renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionRecord {
    pub active: bool,
    pub position_before_move: Option<String>,
    pub move_notation: Option<String>,
    pub move_origin: Option<String>,
    pub move_destination: Option<String>,
    pub win_prob_before: Option<f64>,
    pub win_prob_after: Option<f64>,
    pub recommended_move: Option<MoveCode>,
    pub move_distribution: Option<MoveDistribution>,
}

impl InterventionRecord {
    /// Canonical inactive form: nothing set.
    pub fn inactive() -> Self {
        Self {
            active: false,
            position_before_move: None,
            move_notation: None,
            move_origin: None,
            move_destination: None,
            win_prob_before: None,
            win_prob_after: None,
            recommended_move: None,
            move_distribution: None,
        }
    }

    pub fn is_canonical_inactive(&self) -> bool {
        *self == Self::inactive()
    }
}

impl Default for InterventionRecord {
    fn default() -> Self {
        Self::inactive()
    }
}

/// What the orchestrator knows about a move once the policy has flagged it.
#[derive(Debug, Clone)]
pub struct FlaggedMove {
    pub position_before_move: String,
    pub mv: MoveRecord,
    pub win_prob_before: f64,
    pub win_prob_after: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Inactive,
    Triggered,
    Explaining { finished: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Retry,
    Continue,
}

/// The record as it was the instant before it was cleared.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub resolution: Resolution,
    pub record: InterventionRecord,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Intervention {
    record: InterventionRecord,
    phase: Phase,
    severity: Option<Severity>,
    explanation: Option<String>,
    #[serde(skip)]
    best_move_ticket: Option<Ticket>,
    #[serde(skip)]
    explain_ticket: Option<Ticket>,
    #[serde(skip)]
    explain_queued: bool,
}

impl Default for Intervention {
    fn default() -> Self {
        Self::new()
    }
}

impl Intervention {
    pub fn new() -> Self {
        Self {
            record: InterventionRecord::inactive(),
            phase: Phase::Inactive,
            severity: None,
            explanation: None,
            best_move_ticket: None,
            explain_ticket: None,
            explain_queued: false,
        }
    }

    pub fn record(&self) -> &InterventionRecord {
        &self.record
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn severity(&self) -> Option<Severity> {
        self.severity
    }

    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.record.active
    }

    pub fn best_move_pending(&self) -> bool {
        self.best_move_ticket.is_some()
    }

    /// Populate every field in one step and enter `Triggered`.
    pub fn trigger(
        &mut self,
        flagged: FlaggedMove,
        severity: Severity,
        best_move_ticket: Ticket,
    ) -> Result<(), CoachError> {
        if self.phase != Phase::Inactive {
            return Err(CoachError::InterventionActive);
        }
        self.record = InterventionRecord {
            active: true,
            position_before_move: Some(flagged.position_before_move),
            move_notation: Some(flagged.mv.san),
            move_origin: Some(flagged.mv.from),
            move_destination: Some(flagged.mv.to),
            win_prob_before: Some(flagged.win_prob_before),
            win_prob_after: Some(flagged.win_prob_after),
            recommended_move: None,
            move_distribution: None,
        };
        self.phase = Phase::Triggered;
        self.severity = Some(severity);
        self.explanation = None;
        self.best_move_ticket = Some(best_move_ticket);
        self.explain_ticket = None;
        self.explain_queued = false;
        Ok(())
    }

    /// Fill in the authoritative recommendation. Returns false when the
    /// ticket no longer belongs to this intervention.
    pub fn apply_best_move(&mut self, ticket: Ticket, evaluation: &PositionEvaluation) -> bool {
        if self.best_move_ticket != Some(ticket) {
            return false;
        }
        self.best_move_ticket = None;
        self.record.recommended_move = Some(evaluation.recommended_move.clone());
        self.record.move_distribution = Some(evaluation.move_distribution.clone());
        true
    }

    /// Give up on the recommendation; the intervention stays up without it.
    pub fn best_move_failed(&mut self, ticket: Ticket) -> bool {
        if self.best_move_ticket != Some(ticket) {
            return false;
        }
        self.best_move_ticket = None;
        true
    }

    /// `Triggered → Explaining`. With no ticket the request is queued until
    /// the best-move lookup settles.
    pub fn begin_explain(&mut self, ticket: Option<Ticket>) -> Result<(), CoachError> {
        match self.phase {
            Phase::Triggered => {}
            Phase::Inactive => return Err(CoachError::NoIntervention),
            Phase::Explaining { .. } => {
                return Err(CoachError::WrongPhase {
                    expected: "triggered",
                })
            }
        }
        self.phase = Phase::Explaining { finished: false };
        self.explanation = Some(String::new());
        self.explain_ticket = ticket;
        self.explain_queued = ticket.is_none();
        Ok(())
    }

    /// Consume a queued explanation, attaching the ticket it will run under.
    pub fn start_queued_explain(&mut self, ticket: Ticket) -> bool {
        if !self.explain_queued {
            return false;
        }
        self.explain_queued = false;
        self.explain_ticket = Some(ticket);
        true
    }

    pub fn explain_queued(&self) -> bool {
        self.explain_queued
    }

    pub fn push_explanation(&mut self, ticket: Ticket, text: &str) -> bool {
        if self.explain_ticket != Some(ticket) {
            return false;
        }
        self.explanation.get_or_insert_with(String::new).push_str(text);
        true
    }

    pub fn finish_explanation(&mut self, ticket: Ticket) -> bool {
        if self.explain_ticket != Some(ticket) {
            return false;
        }
        self.explain_ticket = None;
        self.phase = Phase::Explaining { finished: true };
        true
    }

    /// Stream broke: back to `Triggered`, keeping whatever text arrived.
    pub fn fail_explanation(&mut self, ticket: Ticket) -> bool {
        if self.explain_ticket != Some(ticket) {
            return false;
        }
        self.explain_ticket = None;
        self.phase = Phase::Triggered;
        true
    }

    /// `Explaining → Triggered`. Later fragments are dropped.
    pub fn dismiss_explanation(&mut self) -> Result<(), CoachError> {
        match self.phase {
            Phase::Explaining { .. } => {
                self.phase = Phase::Triggered;
                self.explain_ticket = None;
                self.explain_queued = false;
                Ok(())
            }
            Phase::Inactive => Err(CoachError::NoIntervention),
            Phase::Triggered => Err(CoachError::WrongPhase {
                expected: "explaining",
            }),
        }
    }

    /// Leave the intervention. Outstanding lookups and streams are abandoned.
    pub fn resolve(&mut self, resolution: Resolution) -> Result<Resolved, CoachError> {
        if self.phase == Phase::Inactive {
            return Err(CoachError::NoIntervention);
        }
        let record = std::mem::take(&mut self.record);
        *self = Self::new();
        Ok(Resolved { resolution, record })
    }

    /// Inputs for the explanation service.
    pub fn explanation_request(&self) -> Option<ExplanationRequest> {
        Some(ExplanationRequest {
            fen: self.record.position_before_move.clone()?,
            user_move: self.record.move_notation.clone()?,
            recommended_move: self.record.recommended_move.clone(),
            move_distribution: self.record.move_distribution.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::side::Side;

    fn ticket(id: u64) -> Ticket {
        Ticket { id, generation: 1 }
    }

    fn flagged() -> FlaggedMove {
        FlaggedMove {
            position_before_move: "fen-before".into(),
            mv: MoveRecord {
                side: Side::White,
                from: "d1".into(),
                to: "h5".into(),
                promotion: None,
                san: "Qh5".into(),
                uci: "d1h5".into(),
                fen_before: "fen-before".into(),
                fen_after: "fen-after".into(),
            },
            win_prob_before: 0.58,
            win_prob_after: 0.34,
        }
    }

    fn best_eval() -> PositionEvaluation {
        PositionEvaluation {
            recommended_move: "g1f3".into(),
            win_probability: 0.6,
            move_distribution: BTreeMap::from([("g1f3".to_string(), 0.7), ("d1h5".to_string(), 0.3)]),
        }
    }

    #[test]
    fn test_inactive_constructor_idempotent() {
        assert_eq!(InterventionRecord::inactive(), InterventionRecord::inactive());
        assert!(InterventionRecord::inactive().is_canonical_inactive());
    }

    #[test]
    fn test_trigger_populates_record() {
        let mut iv = Intervention::new();
        iv.trigger(flagged(), Severity::Serious, ticket(1)).unwrap();
        let record = iv.record();
        assert!(record.active);
        assert_eq!(record.move_notation.as_deref(), Some("Qh5"));
        assert_eq!(record.move_origin.as_deref(), Some("d1"));
        assert_eq!(record.move_destination.as_deref(), Some("h5"));
        assert_eq!(record.win_prob_before, Some(0.58));
        assert_eq!(record.win_prob_after, Some(0.34));
        assert!(record.recommended_move.is_none());
        assert!(iv.best_move_pending());
        assert_eq!(iv.phase(), Phase::Triggered);

        assert!(matches!(
            iv.trigger(flagged(), Severity::Serious, ticket(2)),
            Err(CoachError::InterventionActive)
        ));
    }

    #[test]
    fn test_best_move_only_from_own_ticket() {
        let mut iv = Intervention::new();
        iv.trigger(flagged(), Severity::Serious, ticket(1)).unwrap();
        assert!(!iv.apply_best_move(ticket(9), &best_eval()));
        assert!(iv.record().recommended_move.is_none());
        assert!(iv.apply_best_move(ticket(1), &best_eval()));
        assert_eq!(iv.record().recommended_move.as_deref(), Some("g1f3"));
        assert_eq!(iv.record().move_distribution.as_ref().map(|d| d.len()), Some(2));
    }

    #[test]
    fn test_resolve_clears_everything() {
        for resolution in [Resolution::Retry, Resolution::Continue] {
            let mut iv = Intervention::new();
            iv.trigger(flagged(), Severity::Mistake, ticket(1)).unwrap();
            iv.apply_best_move(ticket(1), &best_eval());
            iv.begin_explain(Some(ticket(2))).unwrap();
            iv.push_explanation(ticket(2), "Your queen ");

            let resolved = iv.resolve(resolution).unwrap();
            assert_eq!(resolved.resolution, resolution);
            assert_eq!(resolved.record.position_before_move.as_deref(), Some("fen-before"));

            assert!(iv.record().is_canonical_inactive());
            assert_eq!(iv.phase(), Phase::Inactive);
            assert!(iv.explanation().is_none());
            assert!(iv.severity().is_none());
            assert!(!iv.push_explanation(ticket(2), "is hanging"));
        }
    }

    #[test]
    fn test_resolve_abandons_best_move_lookup() {
        let mut iv = Intervention::new();
        iv.trigger(flagged(), Severity::Serious, ticket(1)).unwrap();
        iv.resolve(Resolution::Continue).unwrap();
        assert!(!iv.apply_best_move(ticket(1), &best_eval()));
        assert!(iv.record().is_canonical_inactive());
    }

    #[test]
    fn test_explain_stream_lifecycle() {
        let mut iv = Intervention::new();
        iv.trigger(flagged(), Severity::Serious, ticket(1)).unwrap();
        iv.best_move_failed(ticket(1));
        iv.begin_explain(Some(ticket(2))).unwrap();
        assert!(iv.push_explanation(ticket(2), "Qh5 leaves "));
        assert!(iv.push_explanation(ticket(2), "f7 defended."));
        assert!(iv.finish_explanation(ticket(2)));
        assert_eq!(iv.phase(), Phase::Explaining { finished: true });
        assert_eq!(iv.explanation(), Some("Qh5 leaves f7 defended."));

        iv.dismiss_explanation().unwrap();
        assert_eq!(iv.phase(), Phase::Triggered);
        assert_eq!(iv.explanation(), Some("Qh5 leaves f7 defended."));
    }

    #[test]
    fn test_explain_queued_while_best_move_pending() {
        let mut iv = Intervention::new();
        iv.trigger(flagged(), Severity::Serious, ticket(1)).unwrap();
        iv.begin_explain(None).unwrap();
        assert!(iv.explain_queued());
        assert!(iv.apply_best_move(ticket(1), &best_eval()));
        assert!(iv.start_queued_explain(ticket(3)));
        let request = iv.explanation_request().unwrap();
        assert_eq!(request.recommended_move.as_deref(), Some("g1f3"));
        assert_eq!(request.user_move, "Qh5");
        assert!(iv.push_explanation(ticket(3), "text"));
    }

    #[test]
    fn test_phase_errors() {
        let mut iv = Intervention::new();
        assert!(matches!(iv.begin_explain(None), Err(CoachError::NoIntervention)));
        assert!(matches!(iv.resolve(Resolution::Retry), Err(CoachError::NoIntervention)));
        iv.trigger(flagged(), Severity::Serious, ticket(1)).unwrap();
        assert!(matches!(
            iv.dismiss_explanation(),
            Err(CoachError::WrongPhase { .. })
        ));
    }
}
