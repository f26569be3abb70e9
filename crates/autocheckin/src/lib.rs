//! # Autocheckin
//!
//! Turns one airline reservation into a sequence of timely check-ins, one
//! check-in per orchestrator invocation.
//!
//! ## Core Concepts
//!
//! A run is driven from outside by a durable orchestrator. This crate never
//! sleeps, never retries, and never remembers anything between calls: all of
//! that lives in the [`WorkflowState`] the orchestrator hands back each time.
//!
//! - [`Planner`] = reservation → queue of future [`CheckInOpportunity`]s
//! - [`Scheduler`] = pops the next opportunity into `current`
//! - [`CheckInExecutor`] = consumes `current`, decides [`Continuation`]
//!
//! The key principle: **one invocation = at most one check-in**.
//!
//! ## Architecture
//!
//! ```text
//! Inbound email
//!     │
//!     ▼ InboundTrigger.on_inbound_message()
//! Orchestrator.start_execution(StartRun)
//!     │
//!     ▼
//! Handlers.schedule() ──► Scheduler.advance()
//!     │                        │
//!     │                        ├─► Fresh: Planner.plan() then pop
//!     │                        └─► Continuing: pop
//!     ▼
//! wait until current.opensAt
//!     │
//!     ▼
//! Handlers.check_in() ──► CheckInExecutor.execute()
//!     │
//!     ├─► Signal::Continue(state) ── after interval ──► Handlers.schedule()
//!     ├─► Signal::Done ───────────────────────────────► run complete
//!     └─► HandlerError ───────────────────────────────► run failed
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Planned once** - `pending` is filled only for a [`RunInput::Fresh`] input
//! 2. **Soonest first** - popping yields strictly increasing opening times
//! 3. **Consumed once** - `current` is taken by the executor and never retried
//! 4. **Continuation is a value** - [`Signal::Continue`] is not an error; every
//!    [`HandlerError`] is a real failure
//! 5. **Notifications never fail a run**
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use autocheckin::{Handlers, LocalOrchestrator, Orchestrator, Settings, StartRun, SystemClock};
//!
//! let settings = Settings::from_env()?;
//! let clock = Arc::new(SystemClock);
//! let handlers = Arc::new(Handlers::new(gateway, clock.clone(), &settings));
//! let orchestrator = LocalOrchestrator::new(handlers, clock, &settings);
//!
//! orchestrator.start_execution(&StartRun::new(identity)).await?;
//! while orchestrator.has_active_runs() {
//!     orchestrator.tick().await;
//!     tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//! }
//! ```

mod clock;
mod config;
mod error;
mod executor;
mod extract;
mod gateway;
mod handlers;
mod inbound;
mod orchestrator;
mod planner;
mod reservation;
mod scheduler;
mod state;

pub mod telemetry;

pub use crate::clock::{Clock, SystemClock};

pub use crate::config::{
    LogFormat, Settings, MAX_CHECK_IN_LEAD_HOURS, MAX_CONTINUATION_INTERVAL_SECS,
};

pub use crate::error::{
    CheckInError, ConfigError, ExtractionError, GatewayError, LookupError, NotificationError,
    OrchestratorError, SchedulerError, StateError,
};

pub use crate::reservation::{
    Address, BoardingPass, Bound, CheckInResult, Identity, Passenger, Reservation,
};

pub use crate::state::{
    CheckInOpportunity, Continuation, PendingQueue, Phase, RunInput, StartRun, WorkflowState,
};

pub use gateway::ReservationGateway;
pub use planner::{Planner, DEFAULT_CHECK_IN_LEAD_HOURS};
pub use scheduler::{pop_next, Scheduler};
pub use executor::{CheckInExecutor, Outcome};
pub use handlers::{HandlerError, Handlers, Signal};

pub use inbound::{IdentityExtractor, InboundMessage, InboundTrigger, StartedRun};
pub use extract::ConfirmationEmailExtractor;

pub use orchestrator::{
    Execution, LocalOrchestrator, Orchestrator, RetryPolicy, RunStatus, TickReport,
};

// Re-export commonly used external types
pub use async_trait::async_trait;
