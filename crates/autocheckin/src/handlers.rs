//! JSON entry points invoked by the orchestrator.
//!
//! The orchestrator only ever sees JSON: a start input or a state mapping
//! goes in, a state mapping or a [`Signal`] comes out. Failures are
//! [`HandlerError`]s whose [`error_type`](HandlerError::error_type) the
//! orchestrator routes to its failure path. Continuation is never an error.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::clock::Clock;
use crate::config::Settings;
use crate::error::{CheckInError, SchedulerError, StateError};
use crate::executor::CheckInExecutor;
use crate::gateway::ReservationGateway;
use crate::planner::Planner;
use crate::scheduler::Scheduler;
use crate::state::{Continuation, RunInput, WorkflowState};

/// Answer of the check-in handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "camelCase")]
pub enum Signal {
    /// Re-invoke the scheduler later with `state`.
    Continue { state: WorkflowState },
    /// The run is complete.
    Done,
}

impl From<Continuation> for Signal {
    fn from(continuation: Continuation) -> Self {
        match continuation {
            Continuation::Done => Signal::Done,
            Continuation::ContinueLater(state) => Signal::Continue { state },
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    CheckIn(#[from] CheckInError),
}

impl HandlerError {
    /// Failure kind the orchestrator's routing matches on.
    pub fn error_type(&self) -> &'static str {
        match self {
            HandlerError::State(_) => "StateError",
            HandlerError::Scheduler(SchedulerError::Lookup(_)) => "LookupError",
            HandlerError::Scheduler(_) => "SchedulerError",
            HandlerError::CheckIn(_) => "CheckInError",
        }
    }
}

pub struct Handlers {
    scheduler: Scheduler,
    executor: CheckInExecutor,
}

impl Handlers {
    pub fn new(
        gateway: Arc<dyn ReservationGateway>,
        clock: Arc<dyn Clock>,
        settings: &Settings,
    ) -> Self {
        // Leads beyond the representable range surface as LookupError::OutOfRange.
        let lead = Duration::try_hours(settings.check_in_lead_hours).unwrap_or(Duration::MAX);
        let planner = Planner::new(gateway.clone(), clock).with_check_in_lead(lead);
        Self::from_parts(Scheduler::new(planner), CheckInExecutor::new(gateway))
    }

    pub fn from_parts(scheduler: Scheduler, executor: CheckInExecutor) -> Self {
        Self {
            scheduler,
            executor,
        }
    }

    /// Plan if needed, then pop the next check-in.
    pub async fn schedule(&self, event: Value) -> Result<Value, HandlerError> {
        let input = RunInput::from_value(event)?;
        let state = self.scheduler.advance(input).await?;
        Ok(state.to_value()?)
    }

    /// Attempt the check-in popped by [`schedule`](Self::schedule).
    pub async fn check_in(&self, event: Value) -> Result<Signal, HandlerError> {
        let state: WorkflowState = serde_json::from_value(event).map_err(StateError::from)?;
        let outcome = self.executor.execute(state).await?;
        Ok(outcome.continuation.into())
    }
}
