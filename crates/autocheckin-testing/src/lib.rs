//! Testing utilities for autocheckin.
//!
//! - [`FakeGateway`] - scripted reservation system that records every call
//! - [`ManualClock`] - clock that moves only when told to
//! - [`RecordingOrchestrator`] - captures started runs without running them
//! - fixtures for identities, reservations and confirmation emails

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use autocheckin::{
    Address, BoardingPass, Bound, CheckInResult, Clock, Execution, GatewayError, Identity,
    InboundMessage, Orchestrator, OrchestratorError, Passenger, Reservation,
    ReservationGateway, StartRun,
};
use chrono::{DateTime, Duration, TimeZone, Utc};

/// A fixed instant all fixtures are relative to.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 3, 1, 12, 0, 0).unwrap()
}

pub fn identity() -> Identity {
    Identity::new("Ada", "Lovelace", "ABC123").unwrap()
}

/// A reservation for [`identity`] with one bound per departure.
pub fn reservation_departing(departures: &[DateTime<Utc>]) -> Reservation {
    Reservation {
        confirmation_number: "ABC123".to_string(),
        passengers: vec![Passenger {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
        }],
        bounds: departures
            .iter()
            .enumerate()
            .map(|(i, departs_at)| Bound {
                origin: format!("O{i}"),
                destination: format!("D{i}"),
                departs_at: *departs_at,
                flights: vec![format!("WN{}", 100 + i)],
            })
            .collect(),
    }
}

pub fn confirmation_email(source: &str) -> InboundMessage {
    InboundMessage {
        message_id: "0100016b-test".to_string(),
        source: source.to_string(),
        subject: "Flight reservation (ABC123) | 25APR | AUS-SFO | Lovelace/Ada".to_string(),
        body: "Your trip is booked.".to_string(),
    }
}

/// Every call a [`FakeGateway`] received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Lookup(String),
    CheckIn(String),
    SendBoardingPass { confirmation: String, recipient: String },
}

#[derive(Default)]
struct Script {
    reservation: Option<Reservation>,
    lookup_error: Option<GatewayError>,
    fail_check_in_on: Option<usize>,
    fail_notifications: bool,
    calls: Vec<GatewayCall>,
}

/// Scripted [`ReservationGateway`].
#[derive(Clone, Default)]
pub struct FakeGateway {
    script: Arc<Mutex<Script>>,
}

impl FakeGateway {
    pub fn with_reservation(reservation: Reservation) -> Self {
        let gateway = Self::default();
        gateway.script.lock().unwrap().reservation = Some(reservation);
        gateway
    }

    /// Every lookup fails with `error`.
    pub fn failing_lookup(self, error: GatewayError) -> Self {
        self.script.lock().unwrap().lookup_error = Some(error);
        self
    }

    /// The `attempt`-th check-in (1-based) is rejected.
    pub fn failing_check_in_on(self, attempt: usize) -> Self {
        self.script.lock().unwrap().fail_check_in_on = Some(attempt);
        self
    }

    pub fn failing_notifications(self) -> Self {
        self.script.lock().unwrap().fail_notifications = true;
        self
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn check_ins(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, GatewayCall::CheckIn(_)))
            .count()
    }

    pub fn notifications(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, GatewayCall::SendBoardingPass { .. }))
            .count()
    }
}

#[async_trait]
impl ReservationGateway for FakeGateway {
    async fn lookup_reservation(&self, identity: &Identity) -> Result<Reservation, GatewayError> {
        let mut script = self.script.lock().unwrap();
        script
            .calls
            .push(GatewayCall::Lookup(identity.confirmation_number().to_string()));
        if let Some(error) = &script.lookup_error {
            return Err(error.clone());
        }
        script
            .reservation
            .clone()
            .ok_or_else(|| GatewayError::NotFound(identity.confirmation_number().to_string()))
    }

    async fn check_in(&self, identity: &Identity) -> Result<CheckInResult, GatewayError> {
        let mut script = self.script.lock().unwrap();
        script
            .calls
            .push(GatewayCall::CheckIn(identity.confirmation_number().to_string()));
        let attempt = script
            .calls
            .iter()
            .filter(|call| matches!(call, GatewayCall::CheckIn(_)))
            .count();
        if script.fail_check_in_on == Some(attempt) {
            return Err(GatewayError::Rejected("check-in window closed".to_string()));
        }
        Ok(CheckInResult {
            boarding_passes: vec![BoardingPass {
                passenger: format!("{} {}", identity.first_name(), identity.last_name()),
                flight: format!("WN{}", 100 + attempt),
                group: "A".to_string(),
                position: attempt as u16,
            }],
        })
    }

    async fn send_boarding_pass(
        &self,
        identity: &Identity,
        recipient: &Address,
    ) -> Result<(), GatewayError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(GatewayCall::SendBoardingPass {
            confirmation: identity.confirmation_number().to_string(),
            recipient: recipient.to_string(),
        });
        if script.fail_notifications {
            return Err(GatewayError::Transport("smtp relay unavailable".to_string()));
        }
        Ok(())
    }
}

/// Clock that starts at [`epoch`] and moves only when told to.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at(epoch())
    }
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// [`Orchestrator`] that records start inputs and hands out sequential ids.
#[derive(Clone, Default)]
pub struct RecordingOrchestrator {
    started: Arc<Mutex<Vec<StartRun>>>,
    fail: bool,
}

impl RecordingOrchestrator {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn started(&self) -> Vec<StartRun> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl Orchestrator for RecordingOrchestrator {
    async fn start_execution(&self, input: &StartRun) -> Result<Execution, OrchestratorError> {
        if self.fail {
            return Err(OrchestratorError::Start("throttled".to_string()));
        }
        let mut started = self.started.lock().unwrap();
        started.push(input.clone());
        Ok(Execution {
            execution_id: format!("exec-{}", started.len()),
            state_machine_arn: "arn:test:stateMachine:checkin".to_string(),
            start_date: epoch(),
        })
    }
}
