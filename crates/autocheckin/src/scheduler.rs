//! The scheduling state machine.
//!
//! ```text
//!            advance(Fresh)                 advance(Continuing)
//! UNPLANNED ───────────────► PLANNED-PENDING ──────────────────┐
//!    plan + pop one               │   ▲        pop one          │
//!                                 │   └─────────────────────────┘
//!                                 │ executor consumes the last one
//!                                 ▼
//!                             EXHAUSTED
//! ```
//!
//! Each call pops at most one opportunity into `current` and never performs
//! the check-in itself; the [`CheckInExecutor`](crate::CheckInExecutor)
//! consumes `current` in a separate invocation.

use tracing::{info, warn, Instrument, Span};

use crate::error::SchedulerError;
use crate::planner::Planner;
use crate::state::{RunInput, StartRun, WorkflowState};

pub struct Scheduler {
    planner: Planner,
    span: Span,
}

impl Scheduler {
    pub fn new(planner: Planner) -> Self {
        Self {
            planner,
            span: tracing::info_span!("scheduler"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Move a run one step forward.
    ///
    /// A fresh input is planned and popped in the same call. A continuing
    /// state has exactly one opportunity popped. Lookup failures propagate
    /// unchanged.
    pub async fn advance(&self, input: RunInput) -> Result<WorkflowState, SchedulerError> {
        self.advance_inner(input)
            .instrument(self.span.clone())
            .await
    }

    async fn advance_inner(&self, input: RunInput) -> Result<WorkflowState, SchedulerError> {
        let state = match input {
            RunInput::Fresh(start) => self.plan(start).await?,
            RunInput::Continuing(state) => state,
        };
        pop_next(state)
    }

    async fn plan(&self, start: StartRun) -> Result<WorkflowState, SchedulerError> {
        let pending = self.planner.plan(&start.identity).await.inspect_err(|err| {
            tracing::error!(
                confirmation_number = start.identity.confirmation_number(),
                error = %err,
                "Reservation lookup failed"
            );
        })?;
        Ok(WorkflowState::planned(start, pending))
    }
}

/// Pop the next opportunity into `current`.
///
/// Refuses to pop from an empty queue, and refuses to overwrite an
/// opportunity that was popped but never executed.
pub fn pop_next(mut state: WorkflowState) -> Result<WorkflowState, SchedulerError> {
    if let Some(current) = &state.current {
        warn!(
            confirmation_number = state.confirmation_number(),
            opens_at = %current.opens_at,
            "Previous check-in was never attempted"
        );
        return Err(SchedulerError::Unconsumed {
            confirmation_number: state.confirmation_number().to_string(),
            opens_at: current.opens_at,
        });
    }

    let Some(next) = state.pending.pop_next() else {
        warn!(
            confirmation_number = state.confirmation_number(),
            "No check-ins remain"
        );
        return Err(SchedulerError::Exhausted {
            confirmation_number: state.confirmation_number().to_string(),
        });
    };

    info!(
        confirmation_number = state.confirmation_number(),
        opens_at = %next.opens_at,
        origin = %next.origin,
        destination = %next.destination,
        remaining = state.pending.len(),
        "Scheduled next check-in"
    );
    state.current = Some(next);
    Ok(state)
}
