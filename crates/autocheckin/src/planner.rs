//! Turns a reservation into the queue of check-ins still ahead of it.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, Instrument, Span};

use crate::clock::Clock;
use crate::error::{GatewayError, LookupError};
use crate::gateway::ReservationGateway;
use crate::reservation::{Identity, Reservation};
use crate::state::{CheckInOpportunity, PendingQueue};

/// Hours before departure at which check-in opens.
pub const DEFAULT_CHECK_IN_LEAD_HOURS: i64 = 24;

pub struct Planner {
    gateway: Arc<dyn ReservationGateway>,
    clock: Arc<dyn Clock>,
    check_in_lead: Duration,
    span: Span,
}

impl Planner {
    pub fn new(gateway: Arc<dyn ReservationGateway>, clock: Arc<dyn Clock>) -> Self {
        Self {
            gateway,
            clock,
            check_in_lead: Duration::hours(DEFAULT_CHECK_IN_LEAD_HOURS),
            span: tracing::info_span!("planner"),
        }
    }

    pub fn with_check_in_lead(mut self, lead: Duration) -> Self {
        self.check_in_lead = lead;
        self
    }

    /// Emit this component's events under `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Look up the reservation and order its future check-ins for popping.
    ///
    /// Bounds that already departed are dropped. The returned queue pops the
    /// soonest opportunity first.
    pub async fn plan(&self, identity: &Identity) -> Result<PendingQueue, LookupError> {
        self.plan_inner(identity)
            .instrument(self.span.clone())
            .await
    }

    async fn plan_inner(&self, identity: &Identity) -> Result<PendingQueue, LookupError> {
        info!(
            confirmation_number = identity.confirmation_number(),
            first_name = identity.first_name(),
            last_name = identity.last_name(),
            "Looking up reservation"
        );

        let reservation = self
            .gateway
            .lookup_reservation(identity)
            .await
            .map_err(|source| lookup_error(identity, source))?;
        debug!(?reservation, "Reservation");

        verify_ownership(identity, &reservation)?;

        let now = self.clock.now();
        let opportunities = reservation
            .bounds
            .iter()
            .filter(|bound| bound.departs_at > now)
            .map(|bound| -> Result<CheckInOpportunity, LookupError> {
                let opens_at = bound
                    .departs_at
                    .checked_sub_signed(self.check_in_lead)
                    .ok_or_else(|| LookupError::OutOfRange {
                        confirmation_number: identity.confirmation_number().to_string(),
                        departs_at: bound.departs_at,
                    })?;
                Ok(CheckInOpportunity {
                    opens_at,
                    departs_at: bound.departs_at,
                    origin: bound.origin.clone(),
                    destination: bound.destination.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let queue = PendingQueue::from_opportunities(opportunities);

        info!(
            confirmation_number = identity.confirmation_number(),
            check_ins = queue.len(),
            next = ?queue.peek_next().map(|o| o.opens_at),
            "Planned check-ins"
        );
        Ok(queue)
    }
}

fn lookup_error(identity: &Identity, source: GatewayError) -> LookupError {
    let confirmation_number = identity.confirmation_number().to_string();
    match source {
        GatewayError::NotFound(_) => LookupError::NotFound {
            confirmation_number,
        },
        source => LookupError::Gateway {
            confirmation_number,
            source,
        },
    }
}

fn verify_ownership(identity: &Identity, reservation: &Reservation) -> Result<(), LookupError> {
    let mismatch = |detail: String| LookupError::Mismatch {
        confirmation_number: identity.confirmation_number().to_string(),
        detail,
    };

    if !reservation
        .confirmation_number
        .trim()
        .eq_ignore_ascii_case(identity.confirmation_number())
    {
        return Err(mismatch(format!(
            "confirmation number {}",
            reservation.confirmation_number
        )));
    }

    if !reservation
        .passengers
        .iter()
        .any(|passenger| identity.matches_passenger(passenger))
    {
        return Err(mismatch(format!(
            "passenger {} {}",
            identity.first_name(),
            identity.last_name()
        )));
    }

    Ok(())
}
