//! The durable orchestrator contract and an in-process driver for it.
//!
//! A production orchestrator (a hosted state machine service) owns durability
//! and timing. It must:
//!
//! 1. invoke [`Handlers::schedule`] with the start input;
//! 2. wait until `current.opensAt` of the returned state;
//! 3. invoke [`Handlers::check_in`] with that state;
//! 4. on [`Signal::Continue`] go back to 1 with the returned state after its
//!    configured interval; on [`Signal::Done`] finish;
//! 5. route every [`HandlerError`] to its failure path without retrying.
//!
//! [`LocalOrchestrator`] implements exactly that loop in memory. It is meant
//! for development and tests; nothing survives a restart. Finished runs are
//! kept until [`LocalOrchestrator::forget`] drops them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::Settings;
use crate::error::{OrchestratorError, StateError};
use crate::handlers::{HandlerError, Handlers, Signal};
use crate::state::{StartRun, WorkflowState};

/// A started run as reported by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub execution_id: String,
    pub state_machine_arn: String,
    pub start_date: DateTime<Utc>,
}

#[async_trait]
pub trait Orchestrator: Send + Sync + 'static {
    /// Start a new run with `input` as its first scheduler payload.
    async fn start_execution(&self, input: &StartRun) -> Result<Execution, OrchestratorError>;
}

/// Cadence of continued runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between a continuation and the next scheduler invocation.
    pub interval: Duration,
    /// Continuations allowed before the run is abandoned.
    pub max_continuations: u32,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interval: settings.continuation_interval,
            max_continuations: settings.max_continuations,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Where a run tracked by [`LocalOrchestrator`] stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Waiting for `run_at` before its next invocation.
    Scheduled,
    /// An invocation is in flight.
    Running,
    Succeeded,
    Failed {
        error_type: &'static str,
        message: String,
    },
    /// Continued more often than the retry policy allows.
    GaveUp,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed { .. } | RunStatus::GaveUp
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Schedule,
    CheckIn,
}

#[derive(Debug, Clone)]
struct Run {
    stage: Stage,
    /// Opaque payload for the next invocation, stored exactly as returned.
    payload: Value,
    run_at: DateTime<Utc>,
    continuations: u32,
    status: RunStatus,
}

/// What one [`LocalOrchestrator::tick`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub schedules: usize,
    pub check_ins: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct LocalOrchestrator {
    handlers: Arc<Handlers>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    state_machine_arn: String,
    runs: DashMap<String, Run>,
}

impl LocalOrchestrator {
    pub fn new(handlers: Arc<Handlers>, clock: Arc<dyn Clock>, settings: &Settings) -> Self {
        Self {
            handlers,
            clock,
            policy: RetryPolicy::from_settings(settings),
            state_machine_arn: settings.state_machine_arn.clone(),
            runs: DashMap::new(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn status(&self, execution_id: &str) -> Result<RunStatus, OrchestratorError> {
        self.runs
            .get(execution_id)
            .map(|run| run.status.clone())
            .ok_or_else(|| OrchestratorError::UnknownExecution(execution_id.to_string()))
    }

    /// The payload the next invocation of this run will receive.
    pub fn payload(&self, execution_id: &str) -> Result<Value, OrchestratorError> {
        self.runs
            .get(execution_id)
            .map(|run| run.payload.clone())
            .ok_or_else(|| OrchestratorError::UnknownExecution(execution_id.to_string()))
    }

    /// Earliest time any non-terminal run wants to be invoked.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.runs
            .iter()
            .filter(|run| run.status == RunStatus::Scheduled)
            .map(|run| run.run_at)
            .min()
    }

    /// Drop a finished run and return its final status.
    ///
    /// Runs stay queryable until forgotten. Unknown and unfinished runs are
    /// left untouched and yield `None`.
    pub fn forget(&self, execution_id: &str) -> Option<RunStatus> {
        self.runs
            .remove_if(execution_id, |_, run| run.status.is_terminal())
            .map(|(_, run)| run.status)
    }

    pub fn has_active_runs(&self) -> bool {
        self.runs.iter().any(|run| !run.status.is_terminal())
    }

    /// Invoke every run that is due, once each.
    ///
    /// Runs proceed concurrently with each other; a run is marked
    /// [`RunStatus::Running`] before its invocation starts, so no run is ever
    /// invoked twice at the same time.
    pub async fn tick(&self) -> TickReport {
        let now = self.clock.now();

        let mut due = Vec::new();
        for mut run in self.runs.iter_mut() {
            if run.status == RunStatus::Scheduled && run.run_at <= now {
                run.status = RunStatus::Running;
                due.push((run.key().clone(), run.stage, run.payload.clone()));
            }
        }

        let invocations = due.into_iter().map(|(id, stage, payload)| {
            let span = tracing::info_span!("run", execution_id = %id);
            async move {
                let result = self.invoke(stage, payload).await;
                (id, stage, result)
            }
            .instrument(span)
        });

        let mut report = TickReport::default();
        for (id, stage, result) in join_all(invocations).await {
            match stage {
                Stage::Schedule => report.schedules += 1,
                Stage::CheckIn => report.check_ins += 1,
            }
            let status = self.record(&id, stage, result);
            match status {
                Some(RunStatus::Succeeded) => report.completed += 1,
                Some(RunStatus::Failed { .. }) | Some(RunStatus::GaveUp) => report.failed += 1,
                _ => {}
            }
        }
        report
    }

    async fn invoke(&self, stage: Stage, payload: Value) -> Result<Step, HandlerError> {
        match stage {
            Stage::Schedule => self.handlers.schedule(payload).await.map(Step::Scheduled),
            Stage::CheckIn => self.handlers.check_in(payload).await.map(Step::CheckedIn),
        }
    }

    fn record(
        &self,
        id: &str,
        stage: Stage,
        result: Result<Step, HandlerError>,
    ) -> Option<RunStatus> {
        let mut run = self.runs.get_mut(id)?;
        let now = self.clock.now();

        match result {
            Ok(Step::Scheduled(state)) => match wait_until(&state) {
                Ok(opens_at) => {
                    debug!(execution_id = id, %opens_at, "Waiting for check-in to open");
                    run.stage = Stage::CheckIn;
                    run.payload = state;
                    run.run_at = opens_at.max(now);
                    run.status = RunStatus::Scheduled;
                }
                Err(err) => {
                    run.status = failed(id, "StateError", err.to_string());
                }
            },
            Ok(Step::CheckedIn(Signal::Done)) => {
                info!(execution_id = id, "Run complete");
                run.status = RunStatus::Succeeded;
            }
            Ok(Step::CheckedIn(Signal::Continue { state })) => {
                run.continuations += 1;
                if run.continuations > self.policy.max_continuations {
                    warn!(
                        execution_id = id,
                        continuations = run.continuations,
                        "Giving up on run"
                    );
                    run.status = RunStatus::GaveUp;
                } else {
                    match (state.to_value(), self.next_attempt(now)) {
                        (Ok(payload), Some(run_at)) => {
                            run.stage = Stage::Schedule;
                            run.payload = payload;
                            run.run_at = run_at;
                            run.status = RunStatus::Scheduled;
                        }
                        (Err(err), _) => run.status = failed(id, "StateError", err.to_string()),
                        (_, None) => {
                            run.status = failed(
                                id,
                                "StateError",
                                format!(
                                    "continuation interval {:?} is out of range",
                                    self.policy.interval
                                ),
                            )
                        }
                    }
                }
            }
            Err(err) => {
                debug!(execution_id = id, ?stage, "Invocation failed");
                run.status = failed(id, err.error_type(), err.to_string());
            }
        }

        Some(run.status.clone())
    }

    fn next_attempt(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let delay = chrono::Duration::from_std(self.policy.interval).ok()?;
        now.checked_add_signed(delay)
    }
}

enum Step {
    Scheduled(Value),
    CheckedIn(Signal),
}

fn wait_until(payload: &Value) -> Result<DateTime<Utc>, StateError> {
    let state: WorkflowState = serde_json::from_value(payload.clone())?;
    state
        .current
        .map(|current| current.opens_at)
        .ok_or_else(|| StateError::Malformed("scheduled state has no current check-in".to_string()))
}

fn failed(id: &str, error_type: &'static str, message: String) -> RunStatus {
    error!(execution_id = id, error_type, error = %message, "Run failed");
    RunStatus::Failed {
        error_type,
        message,
    }
}

#[async_trait]
impl Orchestrator for LocalOrchestrator {
    async fn start_execution(&self, input: &StartRun) -> Result<Execution, OrchestratorError> {
        let payload =
            serde_json::to_value(input).map_err(|e| OrchestratorError::Start(e.to_string()))?;
        let execution = Execution {
            execution_id: Uuid::new_v4().to_string(),
            state_machine_arn: self.state_machine_arn.clone(),
            start_date: self.clock.now(),
        };

        self.runs.insert(
            execution.execution_id.clone(),
            Run {
                stage: Stage::Schedule,
                payload,
                run_at: execution.start_date,
                continuations: 0,
                status: RunStatus::Scheduled,
            },
        );

        info!(
            execution_id = %execution.execution_id,
            confirmation_number = input.identity.confirmation_number(),
            "Started execution"
        );
        Ok(execution)
    }
}
