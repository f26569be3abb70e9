//! Error types for every stage of a check-in run.
//!
//! Fatal errors ([`LookupError`], [`CheckInError`], [`SchedulerError`],
//! [`StateError`]) end the run. Recovered errors ([`NotificationError`],
//! [`ExtractionError`]) are logged where they occur and never leave their
//! component. "More work remains" is not an error at all: see
//! [`Continuation`](crate::Continuation).

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure reported by a [`ReservationGateway`](crate::ReservationGateway).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The reservation system has no record matching the request.
    #[error("reservation not found: {0}")]
    NotFound(String),

    /// The reservation system refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The reservation system could not be reached or answered garbage.
    #[error("transport error: {0}")]
    Transport(String),
}

/// The reservation could not be turned into a check-in plan.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("reservation {confirmation_number} not found")]
    NotFound { confirmation_number: String },

    /// The reservation exists but does not belong to the identity that asked.
    #[error("reservation {confirmation_number} does not match {detail}")]
    Mismatch {
        confirmation_number: String,
        detail: String,
    },

    #[error("lookup of {confirmation_number} failed: {source}")]
    Gateway {
        confirmation_number: String,
        #[source]
        source: GatewayError,
    },

    /// Check-in would open outside the representable time range.
    #[error("check-in for {confirmation_number} departing {departs_at} is out of range")]
    OutOfRange {
        confirmation_number: String,
        departs_at: DateTime<Utc>,
    },
}

/// A check-in attempt failed. Always fatal for the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CheckInError {
    #[error("check-in for {confirmation_number} rejected: {source}")]
    Rejected {
        confirmation_number: String,
        #[source]
        source: GatewayError,
    },

    /// The state handed to the executor had no current opportunity.
    #[error("no check-in scheduled for {confirmation_number}")]
    NotScheduled { confirmation_number: String },
}

/// Boarding pass delivery failed. Logged and swallowed by the executor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("could not send boarding pass for {confirmation_number} to {recipient}: {source}")]
pub struct NotificationError {
    pub confirmation_number: String,
    pub recipient: String,
    #[source]
    pub source: GatewayError,
}

/// An inbound message did not yield a usable identity.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no confirmation number found")]
    MissingConfirmation,

    #[error("no passenger name found")]
    MissingName,

    #[error("extracted identity is invalid: {0}")]
    InvalidIdentity(#[from] StateError),
}

/// A value crossing a serialization boundary failed validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("{field} must not be blank")]
    Blank { field: &'static str },

    #[error("confirmation number {0:?} must be alphanumeric")]
    InvalidConfirmation(String),

    #[error("invalid email address {0:?}")]
    InvalidAddress(String),

    #[error("pending check-ins must be strictly descending by opening time")]
    Unordered,

    #[error("malformed state: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Malformed(err.to_string())
    }
}

/// The scheduler refused to advance a run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// Nothing left to pop. Calling advance here is a caller error.
    #[error("no check-ins remain for {confirmation_number}")]
    Exhausted { confirmation_number: String },

    /// The previous opportunity was popped but never executed.
    #[error("check-in for {confirmation_number} at {opens_at} was never attempted")]
    Unconsumed {
        confirmation_number: String,
        opens_at: DateTime<Utc>,
    },
}

/// Starting a run through the orchestrator failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("failed to start execution: {0}")]
    Start(String),

    #[error("unknown execution {0}")]
    UnknownExecution(String),
}

/// Invalid configuration value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}
