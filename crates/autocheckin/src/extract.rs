//! Confirmation email scraping.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::error::ExtractionError;
use crate::inbound::{IdentityExtractor, InboundMessage};
use crate::reservation::Identity;
use crate::state::StartRun;

// "Flight reservation (ABC123) | 25APR | AUS-SFO | Lovelace/Ada"
static SUBJECT_CONFIRMATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([A-Za-z0-9]{6})\)").expect("valid regex"));
static SUBJECT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\|\s*([A-Za-z][A-Za-z' -]*?)\s*/\s*([A-Za-z][A-Za-z' -]*?)\s*$")
        .expect("valid regex")
});

static BODY_CONFIRMATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)confirmation\s*(?:#|number|no\.?)\s*:?\s*([A-Z0-9]{6})\b")
        .expect("valid regex")
});
static BODY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*passenger(?:\s+name)?\s*:\s*([A-Za-z'-]+)\s+([A-Za-z'-]+)\s*$")
        .expect("valid regex")
});

/// Reads the airline's confirmation mail: subject line first, body as a
/// fallback. Never sets a notify recipient; that is the trigger's call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfirmationEmailExtractor;

impl ConfirmationEmailExtractor {
    pub fn extract_identity(&self, message: &InboundMessage) -> Result<Identity, ExtractionError> {
        let confirmation = SUBJECT_CONFIRMATION
            .captures(&message.subject)
            .or_else(|| BODY_CONFIRMATION.captures(&message.body))
            .map(|caps| caps[1].to_string())
            .ok_or(ExtractionError::MissingConfirmation)?;

        let (first, last) = if let Some(caps) = SUBJECT_NAME.captures(&message.subject) {
            (caps[2].to_string(), caps[1].to_string())
        } else if let Some(caps) = BODY_NAME.captures(&message.body) {
            (caps[1].to_string(), caps[2].to_string())
        } else {
            return Err(ExtractionError::MissingName);
        };

        Ok(Identity::new(first, last, confirmation)?)
    }
}

#[async_trait]
impl IdentityExtractor for ConfirmationEmailExtractor {
    async fn extract(&self, message: &InboundMessage) -> Result<StartRun, ExtractionError> {
        self.extract_identity(message).map(StartRun::new)
    }
}
