//! The reservation system, as seen by this crate.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::reservation::{Address, CheckInResult, Identity, Reservation};

/// Client for the airline's reservation API.
///
/// Implementations own transport, authentication and retries of individual
/// HTTP calls. Every method targets the whole reservation named by the
/// identity; none of them knows which opportunity unlocked the call.
#[async_trait]
pub trait ReservationGateway: Send + Sync + 'static {
    /// Fetch the reservation, including every bound still on it.
    async fn lookup_reservation(&self, identity: &Identity) -> Result<Reservation, GatewayError>;

    /// Check in every passenger on the reservation for the bound now open.
    async fn check_in(&self, identity: &Identity) -> Result<CheckInResult, GatewayError>;

    /// Ask the airline to mail the boarding passes to `recipient`.
    async fn send_boarding_pass(
        &self,
        identity: &Identity,
        recipient: &Address,
    ) -> Result<(), GatewayError>;
}
