use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use gatekeeper_models::activity::{ActivityEntry, ActivityEvent, LifecycleEvent};
use gatekeeper_models::command::{CommandStatus, ControlInstruction};
use gatekeeper_models::config::GatekeeperConfig;
use gatekeeper_models::decision::{
    Decision, ExecutionOrder, FreshnessReport, FreshnessVerdict, RejectionReason,
};
use gatekeeper_models::opinion::TradeContext;
use gatekeeper_models::prediction::{Prediction, TradeSide};
use gatekeeper_models::state::{Mode, OperationalState};
use gatekeeper_models::threshold::{AdaptiveThreshold, ThresholdContext};
use gatekeeper_models::validation::{ValidationOutcome, ValidationScore};
use gatekeeper_opinions::{OpinionPanel, OpinionSource, RetryPolicy, ValidationAggregator};
use gatekeeper_store::{CommandMailbox, JournalWriter, PendingCommand, ReadyCommand, TradeHistory};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::control;
use crate::error::EngineError;
use crate::freshness::FreshnessGate;
use crate::sources::{ExecutionEngine, PredictionSource};
use crate::threshold::ThresholdCalculator;

/// External collaborators of the decision loop.
pub struct Collaborators {
    pub predictions: Arc<dyn PredictionSource>,
    pub opinions: Vec<Arc<dyn OpinionSource>>,
    pub history: Arc<dyn TradeHistory>,
    pub execution: Arc<dyn ExecutionEngine>,
}

/// What happened to one instrument in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Decided(Decision),
    /// Data was unavailable; no decision was made either way.
    Skipped { instrument: String, reason: String },
}

#[derive(Debug, Default)]
pub struct CycleReport {
    pub commands_processed: usize,
    pub commands_failed: usize,
    pub outcomes: Vec<CycleOutcome>,
}

impl CycleReport {
    pub fn decisions(&self) -> impl Iterator<Item = &Decision> {
        self.outcomes.iter().filter_map(|o| match o {
            CycleOutcome::Decided(d) => Some(d),
            CycleOutcome::Skipped { .. } => None,
        })
    }

    pub fn accepted(&self) -> usize {
        self.decisions().filter(|d| d.accepted).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.decisions().count()
    }
}

/// Size hint for an accepted decision: the score's margin over the threshold,
/// scaled to `max_position_fraction`.
pub fn execution_order(
    decision: &Decision,
    side: TradeSide,
    score: f64,
    threshold: f64,
    max_position_fraction: f64,
) -> ExecutionOrder {
    let margin = if threshold < 1.0 {
        ((score - threshold) / (1.0 - threshold)).clamp(0.0, 1.0)
    } else {
        1.0
    };
    ExecutionOrder {
        decision_id: decision.id,
        instrument: decision.instrument.clone(),
        side,
        size_fraction: margin * max_position_fraction.max(0.0),
        score,
        threshold,
        prediction_value: decision.prediction_value,
    }
}

/// The single authoritative decision loop.
///
/// Sole writer of the operational state and of the journal. Each cycle drains
/// the command mailbox, then evaluates every tracked instrument in order.
pub struct DecisionLoop {
    config: GatekeeperConfig,
    journal: JournalWriter,
    mailbox: CommandMailbox,
    predictions: Arc<dyn PredictionSource>,
    panel: OpinionPanel,
    aggregator: ValidationAggregator,
    thresholds: ThresholdCalculator,
    execution: Arc<dyn ExecutionEngine>,
    gate: FreshnessGate,
    retry: RetryPolicy,
    state: OperationalState,
    cancel: CancellationToken,
}

impl DecisionLoop {
    /// Restore state from the journal. An unreadable state is fatal.
    pub fn new(
        config: GatekeeperConfig,
        journal: JournalWriter,
        mailbox: CommandMailbox,
        collaborators: Collaborators,
    ) -> Result<Self, EngineError> {
        let state = journal
            .load_state()
            .map_err(|e| EngineError::journal("restoring operational state", e))?
            .unwrap_or_default();
        let retry = RetryPolicy::from_config(&config.network);

        Ok(Self {
            panel: OpinionPanel::new(collaborators.opinions, retry.clone()),
            aggregator: ValidationAggregator::from_config(&config.validation),
            thresholds: ThresholdCalculator::new(config.threshold.clone(), collaborators.history),
            gate: FreshnessGate::new(config.freshness.clone()),
            predictions: collaborators.predictions,
            execution: collaborators.execution,
            retry,
            state,
            journal,
            mailbox,
            config,
            cancel: CancellationToken::new(),
        })
    }

    pub fn state(&self) -> &OperationalState {
        &self.state
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run cycles until cancelled. Returns `Err` only for fatal errors.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        info!(
            mode = %self.state.mode,
            active = self.state.active_instruments.len(),
            "Decision loop starting"
        );
        self.append(ActivityEvent::Lifecycle {
            event: LifecycleEvent::EngineStarted,
            detail: Some(format!(
                "mode {} with {} active instruments",
                self.state.mode,
                self.state.active_instruments.len()
            )),
        })?;

        let interval = self.config.engine.cycle_interval();
        while !self.cancel.is_cancelled() {
            if let Err(e) = self.run_cycle().await {
                error!(error = %e, "Decision loop halted");
                return Err(e);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Decision loop shutting down");
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }

        self.append(ActivityEvent::Lifecycle {
            event: LifecycleEvent::EngineStopped,
            detail: None,
        })?;
        info!("Decision loop stopped");
        Ok(())
    }

    /// One full cycle: drain commands, then evaluate every instrument.
    ///
    /// Any error returned here is fatal; per-instrument problems are skips or
    /// rejections inside the report.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, EngineError> {
        let started = Instant::now();
        let mut report = CycleReport::default();
        self.drain_commands(&mut report)?;

        // Mode and active set are fixed for the rest of the cycle.
        let mode = self.state.mode;
        let active = self.state.active_instruments.clone();
        let instruments: BTreeSet<String> = self
            .config
            .engine
            .instruments
            .iter()
            .chain(active.iter())
            .cloned()
            .collect();

        for instrument in &instruments {
            let outcome = self.evaluate(instrument, mode, &active).await?;
            report.outcomes.push(outcome);
        }

        info!(
            mode = %mode,
            evaluated = instruments.len(),
            accepted = report.accepted(),
            skipped = report.skipped(),
            commands_processed = report.commands_processed,
            commands_failed = report.commands_failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cycle complete"
        );
        Ok(report)
    }

    fn drain_commands(&mut self, report: &mut CycleReport) -> Result<(), EngineError> {
        let pending = match self.mailbox.pending() {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Could not scan command mailbox");
                return Ok(());
            }
        };

        for command in pending {
            match command {
                PendingCommand::Ready(ready) => {
                    if self.apply_command(ready)? {
                        report.commands_processed += 1;
                    } else {
                        report.commands_failed += 1;
                    }
                }
                PendingCommand::Malformed(bad) => {
                    warn!(id = %bad.id, error = %bad.error, "Quarantining malformed command");
                    self.append(ActivityEvent::CommandCompleted {
                        command_id: bad.id.clone(),
                        command_kind: None,
                        status: CommandStatus::Failed,
                        error: Some(bad.error.clone()),
                    })?;
                    if let Err(e) = self.mailbox.quarantine(bad) {
                        warn!(error = %e, "Failed to quarantine command");
                    }
                    report.commands_failed += 1;
                }
            }
        }
        Ok(())
    }

    /// Apply one command, persist, then relocate it. Returns whether it succeeded.
    fn apply_command(&mut self, ready: ReadyCommand) -> Result<bool, EngineError> {
        let id = ready.record.id.clone();
        let kind = ready.record.kind;
        let result = ControlInstruction::from_record(&ready.record).and_then(|instruction| {
            let mut next = self.state.clone();
            control::apply(&mut next, &instruction, &id, Utc::now()).map(|applied| (next, applied))
        });

        match result {
            Ok((next, applied)) => {
                let mut events = applied.events;
                events.push(ActivityEvent::CommandCompleted {
                    command_id: id.clone(),
                    command_kind: Some(kind),
                    status: CommandStatus::Processed,
                    error: None,
                });
                // State must be durable before the record leaves pending.
                self.journal
                    .commit(&next, &events)
                    .map_err(|e| EngineError::journal("persisting command effect", e))?;
                self.state = next;
                info!(id = %id, kind = kind.as_str(), detail = %applied.detail, "Command processed");

                if let Err(e) = self.mailbox.complete(ready, Ok(Some(applied.detail))) {
                    warn!(id = %id, error = %e, "Failed to relocate processed command; it will replay as a no-op");
                }
                Ok(true)
            }
            Err(error) => {
                let error = error.to_string();
                warn!(id = %id, kind = kind.as_str(), error = %error, "Command failed");
                self.append(ActivityEvent::CommandCompleted {
                    command_id: id.clone(),
                    command_kind: Some(kind),
                    status: CommandStatus::Failed,
                    error: Some(error.clone()),
                })?;
                if let Err(e) = self.mailbox.complete(ready, Err(error)) {
                    warn!(id = %id, error = %e, "Failed to relocate failed command");
                }
                Ok(false)
            }
        }
    }

    async fn evaluate(
        &mut self,
        instrument: &str,
        mode: Mode,
        active: &BTreeSet<String>,
    ) -> Result<CycleOutcome, EngineError> {
        let prediction = match self.fetch_prediction(instrument).await {
            Ok(prediction) => prediction,
            Err(reason) => return self.skip(instrument, reason, false),
        };

        let now = Utc::now();
        let (freshness, counters_changed) =
            self.gate.check(&prediction, now, &mut self.state.freshness);

        if !freshness.is_usable() {
            let reason = if freshness.verdict == FreshnessVerdict::Stale {
                RejectionReason::Stale
            } else {
                RejectionReason::UnknownFreshness
            };
            warn!(instrument, verdict = ?freshness.verdict, age_ms = ?freshness.age_ms, "Prediction rejected by freshness gate");
            let decision = self.decision(&prediction, freshness, mode, None, None, Some(reason));
            return self.record_decision(decision, counters_changed);
        }

        let Some(side) = prediction.direction() else {
            let decision = self.decision(
                &prediction,
                freshness,
                mode,
                None,
                None,
                Some(RejectionReason::NoDirection),
            );
            return self.record_decision(decision, counters_changed);
        };

        let volatility = prediction
            .volatility
            .filter(|v| v.is_finite())
            .unwrap_or(self.config.engine.default_volatility);
        let regime = prediction.regime.unwrap_or_default();

        let ctx = TradeContext {
            request_id: Uuid::new_v4(),
            instrument: instrument.to_string(),
            side,
            prediction_value: prediction.value,
            volatility,
            regime,
            requested_at: now,
        };
        let panel = self.panel.collect(&ctx).await;
        let score = match self.aggregator.aggregate(&panel.opinions, volatility) {
            ValidationOutcome::Scored(score) => score,
            ValidationOutcome::NoData => {
                let reason = format!("no opinions ({} sources failed)", panel.failures.len());
                return self.skip(instrument, reason, counters_changed);
            }
        };

        let threshold = self
            .thresholds
            .calculate(&ThresholdContext {
                instrument: instrument.to_string(),
                volatility,
                regime,
            })
            .await;

        let rejection = if score.score < threshold.value {
            Some(RejectionReason::BelowThreshold)
        } else if mode != Mode::Active {
            Some(RejectionReason::Standby)
        } else if !active.contains(instrument) {
            Some(RejectionReason::InstrumentInactive)
        } else {
            None
        };

        let (score_value, threshold_value) = (score.score, threshold.value);
        let decision = self.decision(
            &prediction,
            freshness,
            mode,
            Some(score),
            Some(threshold),
            rejection,
        );
        let outcome = self.record_decision(decision.clone(), counters_changed)?;

        if decision.accepted {
            let order = execution_order(
                &decision,
                side,
                score_value,
                threshold_value,
                self.config.engine.max_position_fraction,
            );
            if order.size_fraction <= 0.0 {
                info!(instrument, decision_id = %decision.id, "Accepted with no size, skipping hand-off");
                self.append(ActivityEvent::ExecutionSkipped {
                    decision_id: decision.id,
                    instrument: instrument.to_string(),
                    reason: "size hint is zero".to_string(),
                })?;
            } else if let Err(e) = self.execution.submit(&order).await {
                warn!(instrument, decision_id = %decision.id, error = %e, "Execution hand-off failed");
                self.append(ActivityEvent::ExecutionFailed {
                    decision_id: decision.id,
                    instrument: instrument.to_string(),
                    error: e.to_string(),
                })?;
            }
        }
        Ok(outcome)
    }

    async fn fetch_prediction(&self, instrument: &str) -> Result<Prediction, String> {
        let started = Instant::now();
        let source = &self.predictions;
        let reply = self
            .retry
            .run(instrument, |_| source.fetch(instrument))
            .await
            .map_err(|e| format!("prediction unavailable: {e}"))?;

        Ok(Prediction {
            instrument: instrument.to_string(),
            value: reply.value,
            source_timestamp: reply.source_timestamp,
            fetched_at: Some(Utc::now()),
            latency_ms: Some(started.elapsed().as_millis() as u64),
            volatility: reply.volatility,
            regime: reply.regime,
        })
    }

    fn decision(
        &self,
        prediction: &Prediction,
        freshness: FreshnessReport,
        mode: Mode,
        score: Option<ValidationScore>,
        threshold: Option<AdaptiveThreshold>,
        rejection: Option<RejectionReason>,
    ) -> Decision {
        Decision {
            id: Uuid::new_v4(),
            instrument: prediction.instrument.clone(),
            accepted: rejection.is_none(),
            prediction_value: prediction.value,
            score,
            threshold,
            freshness,
            mode,
            rejection,
            decided_at: Utc::now(),
        }
    }

    fn record_decision(
        &mut self,
        decision: Decision,
        state_changed: bool,
    ) -> Result<CycleOutcome, EngineError> {
        info!(
            instrument = %decision.instrument,
            accepted = decision.accepted,
            score = ?decision.score_value(),
            threshold = ?decision.threshold_value(),
            verdict = ?decision.freshness.verdict,
            rejection = ?decision.rejection,
            "Decision recorded"
        );
        self.record(
            ActivityEvent::DecisionRecorded {
                decision: decision.clone(),
            },
            state_changed,
        )?;
        Ok(CycleOutcome::Decided(decision))
    }

    fn skip(
        &mut self,
        instrument: &str,
        reason: String,
        state_changed: bool,
    ) -> Result<CycleOutcome, EngineError> {
        warn!(instrument, reason = %reason, "Instrument skipped");
        self.record(
            ActivityEvent::InstrumentSkipped {
                instrument: instrument.to_string(),
                reason: reason.clone(),
            },
            state_changed,
        )?;
        Ok(CycleOutcome::Skipped {
            instrument: instrument.to_string(),
            reason,
        })
    }

    /// Journal an event, together with the state if it moved.
    fn record(&mut self, event: ActivityEvent, state_changed: bool) -> Result<(), EngineError> {
        if state_changed {
            self.state.touch(Utc::now());
            self.journal
                .commit(&self.state, std::slice::from_ref(&event))
                .map_err(|e| EngineError::journal("recording activity", e))?;
        } else {
            self.append(event)?;
        }
        Ok(())
    }

    fn append(&self, event: ActivityEvent) -> Result<ActivityEntry, EngineError> {
        self.journal
            .append(&event)
            .map_err(|e| EngineError::journal("appending activity", e))
    }
}
