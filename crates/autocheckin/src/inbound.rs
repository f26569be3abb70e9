//! Starts runs from inbound confirmation emails.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Instrument, Span};

use crate::error::{ExtractionError, OrchestratorError};
use crate::orchestrator::{Execution, Orchestrator};
use crate::reservation::Address;
use crate::state::StartRun;

/// A received email, as handed over by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub message_id: String,
    /// Envelope sender.
    pub source: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

/// Pulls a reservation identity out of free text.
#[async_trait]
pub trait IdentityExtractor: Send + Sync + 'static {
    async fn extract(&self, message: &InboundMessage) -> Result<StartRun, ExtractionError>;
}

/// Handle of a run started from a message. Carries no timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedRun {
    pub execution_id: String,
    pub state_machine_arn: String,
}

impl From<Execution> for StartedRun {
    fn from(execution: Execution) -> Self {
        Self {
            execution_id: execution.execution_id,
            state_machine_arn: execution.state_machine_arn,
        }
    }
}

pub struct InboundTrigger {
    extractor: Arc<dyn IdentityExtractor>,
    orchestrator: Arc<dyn Orchestrator>,
    airline_domain: String,
    span: Span,
}

impl InboundTrigger {
    pub fn new(
        extractor: Arc<dyn IdentityExtractor>,
        orchestrator: Arc<dyn Orchestrator>,
        airline_domain: impl Into<String>,
    ) -> Self {
        Self {
            extractor,
            orchestrator,
            airline_domain: airline_domain.into(),
            span: tracing::info_span!("inbound"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Start a run for the reservation named in `message`.
    ///
    /// Messages that do not yield an identity are logged and dropped with
    /// `Ok(None)`. Only a failure to start the run is returned as an error.
    pub async fn on_inbound_message(
        &self,
        message: &InboundMessage,
    ) -> Result<Option<StartedRun>, OrchestratorError> {
        self.start_run(message)
            .instrument(self.span.clone())
            .await
    }

    async fn start_run(
        &self,
        message: &InboundMessage,
    ) -> Result<Option<StartedRun>, OrchestratorError> {
        debug!(message_id = %message.message_id, source = %message.source, "Inbound message");

        let Some(start) = self.start_input(message).await else {
            return Ok(None);
        };

        let execution = self.orchestrator.start_execution(&start).await?;
        debug!(start_date = %execution.start_date, "State machine started");
        debug!(execution_id = %execution.execution_id, "Execution");

        Ok(Some(execution.into()))
    }

    /// The start input a message would produce, without starting anything.
    pub async fn start_input(&self, message: &InboundMessage) -> Option<StartRun> {
        let start = match self.extractor.extract(message).await {
            Ok(start) => start,
            Err(err) => {
                warn!(
                    message_id = %message.message_id,
                    error = %err,
                    "Error scraping email"
                );
                return None;
            }
        };
        info!(identity = %start.identity, "Found reservation");

        Some(StartRun {
            notify_recipient: self.notify_recipient(&message.source),
            ..start
        })
    }

    /// The sender gets boarding passes unless the mail came from the airline.
    fn notify_recipient(&self, source: &str) -> Option<Address> {
        match Address::parse(source) {
            Ok(address) if address.belongs_to(&self.airline_domain) => None,
            Ok(address) => Some(address),
            Err(err) => {
                debug!(error = %err, "Sender is not a usable recipient");
                None
            }
        }
    }
}
