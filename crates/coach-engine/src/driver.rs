//! Orchestrator task
//!
//! One tokio task owns the [`Session`]. Player intents arrive over a command
//! channel (each with a reply slot), results from spawned requests come back
//! over an internal channel, and a one-second interval drives the clocks.
//! After every change the task publishes a fresh [`Snapshot`] on a watch
//! channel for the UI.

use std::sync::Arc;
use std::time::Duration;

use coach_core::{Action, Board, CoachError, Effect, Session, Snapshot};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clients::{Explainer, Predictor};
use crate::error::EngineError;

const TICK: Duration = Duration::from_secs(1);
const COMMAND_BUFFER: usize = 32;

struct Command {
    action: Action,
    reply: oneshot::Sender<Result<Snapshot, CoachError>>,
}

/// Cloneable handle to a running orchestrator.
#[derive(Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl OrchestratorHandle {
    /// Deliver a player intent and wait for the resulting snapshot.
    pub async fn dispatch(&self, action: Action) -> Result<Snapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command { action, reply })
            .await
            .map_err(|_| EngineError::Closed)?;
        let result = rx.await.map_err(|_| EngineError::Closed)?;
        Ok(result?)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Tear the session down. Results still in flight are dropped.
    pub async fn shutdown(&self) {
        if let Err(e) = self.dispatch(Action::Shutdown).await {
            debug!(error = %e, "Orchestrator already stopped");
        }
        self.commands.closed().await;
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Start the orchestrator for `session` on the current runtime.
pub fn spawn<B, P, E>(session: Session<B>, predictor: Arc<P>, explainer: Arc<E>) -> OrchestratorHandle
where
    B: Board + Send + 'static,
    P: Predictor,
    E: Explainer,
{
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (snapshots_tx, snapshots_rx) = watch::channel(session.snapshot());

    let driver = Driver {
        session,
        predictor,
        explainer,
        events: events_tx,
        snapshots: snapshots_tx,
        tasks: JoinSet::new(),
    };
    tokio::spawn(driver.run(commands_rx, events_rx));

    OrchestratorHandle {
        commands: commands_tx,
        snapshots: snapshots_rx,
    }
}

struct Driver<B: Board, P, E> {
    session: Session<B>,
    predictor: Arc<P>,
    explainer: Arc<E>,
    events: mpsc::UnboundedSender<Action>,
    snapshots: watch::Sender<Snapshot>,
    tasks: JoinSet<()>,
}

impl<B, P, E> Driver<B, P, E>
where
    B: Board + Send + 'static,
    P: Predictor,
    E: Explainer,
{
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<Action>,
    ) {
        let mut ticker = interval_at(Instant::now() + TICK, TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Orchestrator started");

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(Command { action, reply }) = command else {
                        // Every handle is gone
                        self.apply(Action::Shutdown);
                        break;
                    };
                    let result = self.intent(action);
                    let _ = reply.send(result);
                }
                Some(action) = events.recv() => {
                    self.apply(action);
                }
                _ = ticker.tick() => {
                    self.apply(Action::Tick);
                }
                Some(_) = self.tasks.join_next(), if !self.tasks.is_empty() => {}
            }

            if self.session.is_closed() {
                break;
            }
        }

        self.tasks.abort_all();
        info!("Orchestrator stopped");
    }

    fn intent(&mut self, action: Action) -> Result<Snapshot, CoachError> {
        let effects = self.session.dispatch(action)?;
        self.perform(effects);
        let snapshot = self.session.snapshot();
        self.snapshots.send_replace(snapshot.clone());
        Ok(snapshot)
    }

    fn apply(&mut self, action: Action) {
        match self.session.dispatch(action) {
            Ok(effects) => {
                self.perform(effects);
                self.snapshots.send_replace(self.session.snapshot());
            }
            Err(e) => warn!(error = %e, "Internal action rejected"),
        }
    }

    fn perform(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Evaluate { ticket, request } => {
                    let predictor = Arc::clone(&self.predictor);
                    let events = self.events.clone();
                    self.tasks.spawn(async move {
                        let action = match predictor.evaluate(&request).await {
                            Ok(evaluation) => Action::EvaluationResolved { ticket, evaluation },
                            Err(e) => Action::EvaluationFailed {
                                ticket,
                                reason: e.to_string(),
                            },
                        };
                        let _ = events.send(action);
                    });
                }
                Effect::Explain { ticket, request } => {
                    let explainer = Arc::clone(&self.explainer);
                    let events = self.events.clone();
                    self.tasks.spawn(async move {
                        let fragments = events.clone();
                        let result = explainer
                            .explain(&request, move |text| {
                                let _ = fragments.send(Action::ExplanationChunk { ticket, text });
                            })
                            .await;
                        let action = match result {
                            Ok(()) => Action::ExplanationFinished { ticket },
                            Err(e) => Action::ExplanationFailed {
                                ticket,
                                reason: e.to_string(),
                            },
                        };
                        let _ = events.send(action);
                    });
                }
                Effect::Think { ticket, delay } => {
                    let events = self.events.clone();
                    self.tasks.spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = events.send(Action::OpponentMoveReady { ticket });
                    });
                }
                Effect::Notify(notice) => {
                    debug!(?notice, "Notice");
                }
            }
        }
    }
}
