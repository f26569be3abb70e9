//! Workflow state threaded through every invocation of a run.
//!
//! The orchestrator stores this state between invocations as an opaque JSON
//! mapping. Everything here is validated when it is read back, so a corrupted
//! or hand-edited mapping fails loudly instead of skipping or repeating a
//! check-in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::StateError;
use crate::reservation::{Address, Identity};

/// A moment at which one check-in attempt becomes eligible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInOpportunity {
    pub opens_at: DateTime<Utc>,
    pub departs_at: DateTime<Utc>,
    pub origin: String,
    pub destination: String,
}

/// Opportunities not yet attempted.
///
/// Stored furthest-out first; [`pop_next`](Self::pop_next) takes from the end,
/// so successive pops yield strictly increasing opening times. The order is
/// fixed by [`PendingQueue::from_opportunities`] and never re-sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PendingQueue(SmallVec<[CheckInOpportunity; 4]>);

impl PendingQueue {
    /// Order opportunities for LIFO popping. Duplicate opening times collapse
    /// into a single opportunity.
    pub fn from_opportunities(opportunities: impl IntoIterator<Item = CheckInOpportunity>) -> Self {
        let mut items: SmallVec<[CheckInOpportunity; 4]> = opportunities.into_iter().collect();
        items.sort_by(|a, b| b.opens_at.cmp(&a.opens_at));
        items.dedup_by(|a, b| a.opens_at == b.opens_at);
        Self(items)
    }

    /// Remove the soonest opportunity.
    pub fn pop_next(&mut self) -> Option<CheckInOpportunity> {
        self.0.pop()
    }

    /// The opportunity the next pop would return.
    pub fn peek_next(&self) -> Option<&CheckInOpportunity> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in storage order (furthest-out first).
    pub fn iter(&self) -> impl Iterator<Item = &CheckInOpportunity> {
        self.0.iter()
    }

    fn validate(&self) -> Result<(), StateError> {
        if self.0.windows(2).all(|w| w[0].opens_at > w[1].opens_at) {
            Ok(())
        } else {
            Err(StateError::Unordered)
        }
    }
}

impl<'de> Deserialize<'de> for PendingQueue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let items = SmallVec::<[CheckInOpportunity; 4]>::deserialize(deserializer)?;
        let queue = PendingQueue(items);
        queue.validate().map_err(serde::de::Error::custom)?;
        Ok(queue)
    }
}

/// Input that starts a new run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRun {
    #[serde(flatten)]
    pub identity: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_recipient: Option<Address>,
}

impl StartRun {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            notify_recipient: None,
        }
    }

    pub fn with_notify_recipient(mut self, recipient: Address) -> Self {
        self.notify_recipient = Some(recipient);
        self
    }
}

/// The mutable record carried from one invocation to the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    #[serde(flatten)]
    pub identity: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_recipient: Option<Address>,
    pub pending: PendingQueue,
    #[serde(default)]
    pub current: Option<CheckInOpportunity>,
}

impl WorkflowState {
    /// A freshly planned state. Nothing has been popped yet.
    pub fn planned(start: StartRun, pending: PendingQueue) -> Self {
        Self {
            identity: start.identity,
            notify_recipient: start.notify_recipient,
            pending,
            current: None,
        }
    }

    pub fn confirmation_number(&self) -> &str {
        self.identity.confirmation_number()
    }

    pub fn phase(&self) -> Phase {
        if self.current.is_some() || !self.pending.is_empty() {
            Phase::PlannedPending
        } else {
            Phase::Exhausted
        }
    }

    pub fn to_value(&self) -> Result<serde_json::Value, StateError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Where a run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No plan yet. Only a fresh start input is in this phase.
    Unplanned,
    /// Planned, with an opportunity in flight or still queued.
    PlannedPending,
    /// Every opportunity has been attempted.
    Exhausted,
}

/// What an invocation of the scheduler was handed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunInput {
    Fresh(StartRun),
    Continuing(WorkflowState),
}

impl RunInput {
    /// Resolve an orchestrator payload. The presence of a `pending` key marks a
    /// continuing run; anything else must be a start input.
    pub fn from_value(value: serde_json::Value) -> Result<Self, StateError> {
        let continuing = value
            .as_object()
            .map(|map| map.contains_key("pending"))
            .ok_or_else(|| StateError::Malformed("expected a JSON object".to_string()))?;

        if continuing {
            Ok(RunInput::Continuing(serde_json::from_value(value)?))
        } else {
            Ok(RunInput::Fresh(serde_json::from_value(value)?))
        }
    }

    pub fn identity(&self) -> &Identity {
        match self {
            RunInput::Fresh(start) => &start.identity,
            RunInput::Continuing(state) => &state.identity,
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            RunInput::Fresh(_) => Phase::Unplanned,
            RunInput::Continuing(state) => state.phase(),
        }
    }
}

impl From<StartRun> for RunInput {
    fn from(start: StartRun) -> Self {
        RunInput::Fresh(start)
    }
}

impl From<WorkflowState> for RunInput {
    fn from(state: WorkflowState) -> Self {
        RunInput::Continuing(state)
    }
}

/// Whether a run needs another invocation after a check-in attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// The last opportunity was just attempted.
    Done,
    /// More opportunities remain; re-invoke the scheduler with this state.
    ContinueLater(WorkflowState),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn opportunity(day: u32) -> CheckInOpportunity {
        let opens_at = Utc.with_ymd_and_hms(2030, 4, day, 9, 0, 0).unwrap();
        CheckInOpportunity {
            opens_at,
            departs_at: opens_at + Duration::hours(24),
            origin: "AUS".to_string(),
            destination: "SFO".to_string(),
        }
    }

    fn identity() -> Identity {
        Identity::new("Ada", "Lovelace", "ABC123").unwrap()
    }

    #[test]
    fn queue_pops_soonest_first() {
        let mut queue =
            PendingQueue::from_opportunities([opportunity(12), opportunity(3), opportunity(7)]);

        assert_eq!(queue.peek_next(), Some(&opportunity(3)));
        assert_eq!(queue.pop_next(), Some(opportunity(3)));
        assert_eq!(queue.pop_next(), Some(opportunity(7)));
        assert_eq!(queue.pop_next(), Some(opportunity(12)));
        assert_eq!(queue.pop_next(), None);
    }

    #[test]
    fn queue_collapses_duplicate_opening_times() {
        let queue = PendingQueue::from_opportunities([opportunity(3), opportunity(3)]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn queue_serializes_furthest_first() {
        let queue = PendingQueue::from_opportunities([opportunity(3), opportunity(7)]);
        let value = serde_json::to_value(&queue).unwrap();
        assert_eq!(value[0]["opensAt"], "2030-04-07T09:00:00Z");
        assert_eq!(value[1]["opensAt"], "2030-04-03T09:00:00Z");
    }

    #[test]
    fn unordered_queue_is_rejected_on_read() {
        let value = json!([
            serde_json::to_value(opportunity(3)).unwrap(),
            serde_json::to_value(opportunity(7)).unwrap(),
        ]);
        assert!(serde_json::from_value::<PendingQueue>(value).is_err());
    }

    #[test]
    fn run_input_resolves_on_pending_key() {
        let fresh = RunInput::from_value(json!({
            "firstName": "Ada",
            "lastName": "Lovelace",
            "confirmationNumber": "abc123",
            "notifyRecipient": "friend@example.com"
        }))
        .unwrap();
        match &fresh {
            RunInput::Fresh(start) => {
                assert_eq!(start.identity.confirmation_number(), "ABC123");
                assert_eq!(
                    start.notify_recipient.as_ref().map(Address::as_str),
                    Some("friend@example.com")
                );
            }
            other => panic!("expected fresh input, got {other:?}"),
        }
        assert_eq!(fresh.phase(), Phase::Unplanned);

        let continuing = RunInput::from_value(json!({
            "firstName": "Ada",
            "lastName": "Lovelace",
            "confirmationNumber": "ABC123",
            "pending": []
        }))
        .unwrap();
        assert!(matches!(continuing, RunInput::Continuing(_)));
        assert_eq!(continuing.phase(), Phase::Exhausted);
    }

    #[test]
    fn run_input_rejects_non_objects() {
        assert!(RunInput::from_value(json!(["ABC123"])).is_err());
    }

    #[test]
    fn state_survives_serialization() {
        let mut state = WorkflowState::planned(
            StartRun::new(identity()),
            PendingQueue::from_opportunities([opportunity(3), opportunity(9)]),
        );
        state.current = state.pending.pop_next();

        let value = state.to_value().unwrap();
        assert_eq!(value["confirmationNumber"], "ABC123");
        assert!(value.get("notifyRecipient").is_none());

        let restored: WorkflowState = serde_json::from_value(value).unwrap();
        assert_eq!(restored, state);
        assert_eq!(restored.phase(), Phase::PlannedPending);
    }
}
