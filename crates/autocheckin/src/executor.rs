//! One check-in attempt per invocation.

use std::sync::Arc;

use tracing::{debug, error, info, warn, Instrument, Span};

use crate::error::{CheckInError, NotificationError};
use crate::gateway::ReservationGateway;
use crate::reservation::{Address, CheckInResult, Identity};
use crate::state::{Continuation, WorkflowState};

/// Result of a successful attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub result: CheckInResult,
    pub continuation: Continuation,
}

pub struct CheckInExecutor {
    gateway: Arc<dyn ReservationGateway>,
    span: Span,
}

impl CheckInExecutor {
    pub fn new(gateway: Arc<dyn ReservationGateway>) -> Self {
        Self {
            gateway,
            span: tracing::info_span!("executor"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Consume `state.current` with one gateway check-in.
    ///
    /// A failed check-in is returned as an error and ends the run. A failed
    /// boarding pass delivery is logged and otherwise ignored. On success the
    /// continuation is [`Continuation::ContinueLater`] while opportunities
    /// remain in `pending`.
    pub async fn execute(&self, state: WorkflowState) -> Result<Outcome, CheckInError> {
        self.execute_inner(state)
            .instrument(self.span.clone())
            .await
    }

    async fn execute_inner(&self, mut state: WorkflowState) -> Result<Outcome, CheckInError> {
        let Some(opportunity) = state.current.take() else {
            error!(
                confirmation_number = state.confirmation_number(),
                "Check-in invoked without a scheduled opportunity"
            );
            return Err(CheckInError::NotScheduled {
                confirmation_number: state.confirmation_number().to_string(),
            });
        };

        info!(
            confirmation_number = state.confirmation_number(),
            first_name = state.identity.first_name(),
            last_name = state.identity.last_name(),
            opens_at = %opportunity.opens_at,
            "Checking in"
        );

        let result = match self.gateway.check_in(&state.identity).await {
            Ok(result) => result,
            Err(source) => {
                error!(
                    confirmation_number = state.confirmation_number(),
                    error = %source,
                    "Error checking in"
                );
                return Err(CheckInError::Rejected {
                    confirmation_number: state.confirmation_number().to_string(),
                    source,
                });
            }
        };
        info!(
            confirmation_number = state.confirmation_number(),
            boarding_passes = result.boarding_passes.len(),
            "Checked in"
        );
        debug!(?result, "Check-in response");

        if let Some(recipient) = &state.notify_recipient {
            if let Err(err) = self.notify(&state.identity, recipient).await {
                warn!(error = %err, "Error sending boarding pass");
            }
        }

        let continuation = if state.pending.is_empty() {
            info!(
                confirmation_number = state.confirmation_number(),
                "Final check-in complete"
            );
            Continuation::Done
        } else {
            info!(
                confirmation_number = state.confirmation_number(),
                remaining = state.pending.len(),
                "More check-ins remain"
            );
            Continuation::ContinueLater(state)
        };

        Ok(Outcome {
            result,
            continuation,
        })
    }

    async fn notify(
        &self,
        identity: &Identity,
        recipient: &Address,
    ) -> Result<(), NotificationError> {
        info!(recipient = %recipient, "Sending boarding pass");
        self.gateway
            .send_boarding_pass(identity, recipient)
            .await
            .map_err(|source| NotificationError {
                confirmation_number: identity.confirmation_number().to_string(),
                recipient: recipient.to_string(),
                source,
            })
    }
}
