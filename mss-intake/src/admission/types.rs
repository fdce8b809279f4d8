//! Placeholder record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::{AdmissionError, AdmissionResult};
use super::key::{DedupKey, SubmissionContext};

/// Store-assigned placeholder id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceholderId(Uuid);

impl PlaceholderId {
    /// Fresh random id. Only stores call this.
    pub fn generate() -> Self {
        Self(mss_common::uuid_utils::generate())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for PlaceholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PlaceholderId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        mss_common::uuid_utils::parse(s).map(Self)
    }
}

/// Placeholder lifecycle status
///
/// `pending -> {finalized | abandoned}`; both targets are terminal for the
/// record's generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderStatus {
    Pending,
    Finalized,
    Abandoned,
}

impl PlaceholderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceholderStatus::Pending => "pending",
            PlaceholderStatus::Finalized => "finalized",
            PlaceholderStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PlaceholderStatus::Pending)
    }
}

impl fmt::Display for PlaceholderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaceholderStatus {
    type Err = AdmissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PlaceholderStatus::Pending),
            "finalized" => Ok(PlaceholderStatus::Finalized),
            "abandoned" => Ok(PlaceholderStatus::Abandoned),
            other => Err(AdmissionError::Storage(format!(
                "unknown placeholder status '{}'",
                other
            ))),
        }
    }
}

/// What a status change request amounts to for a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Record is pending; move it to the target.
    Apply,
    /// Record already has the target status.
    AlreadyDone,
}

/// Decide whether `current -> target` is allowed.
///
/// Repeating a transition is a no-op. Moving between the two terminal
/// states is rejected.
pub fn plan_transition(
    id: PlaceholderId,
    current: PlaceholderStatus,
    target: PlaceholderStatus,
) -> AdmissionResult<Transition> {
    if current == target && target.is_terminal() {
        return Ok(Transition::AlreadyDone);
    }
    if current == PlaceholderStatus::Pending && target.is_terminal() {
        return Ok(Transition::Apply);
    }
    Err(AdmissionError::InvalidTransition {
        id,
        current,
        target,
    })
}

/// A provisional record awaiting completion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceholderRecord {
    pub id: PlaceholderId,
    pub key: DedupKey,
    /// 1 for the first placeholder of a key, +1 for each later one
    pub generation: u32,
    pub status: PlaceholderStatus,
    pub context: SubmissionContext,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// When the record reached a terminal status
    pub finalized_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use PlaceholderStatus::*;

    fn id() -> PlaceholderId {
        PlaceholderId::from_uuid(Uuid::nil())
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [Pending, Finalized, Abandoned] {
            assert_eq!(status.as_str().parse::<PlaceholderStatus>().unwrap(), status);
        }
        assert!("done".parse::<PlaceholderStatus>().is_err());
    }

    #[test]
    fn test_pending_to_terminal_applies() {
        assert_eq!(plan_transition(id(), Pending, Finalized).unwrap(), Transition::Apply);
        assert_eq!(plan_transition(id(), Pending, Abandoned).unwrap(), Transition::Apply);
    }

    #[test]
    fn test_repeated_terminal_transition_is_noop() {
        assert_eq!(
            plan_transition(id(), Finalized, Finalized).unwrap(),
            Transition::AlreadyDone
        );
        assert_eq!(
            plan_transition(id(), Abandoned, Abandoned).unwrap(),
            Transition::AlreadyDone
        );
    }

    #[test]
    fn test_cross_terminal_and_back_to_pending_rejected() {
        assert!(plan_transition(id(), Abandoned, Finalized).is_err());
        assert!(plan_transition(id(), Finalized, Abandoned).is_err());
        assert!(plan_transition(id(), Finalized, Pending).is_err());
        assert!(plan_transition(id(), Pending, Pending).is_err());
    }

    #[test]
    fn test_placeholder_id_text_form() {
        let generated = PlaceholderId::generate();
        let parsed: PlaceholderId = generated.to_string().parse().unwrap();
        assert_eq!(parsed, generated);
        assert_eq!(
            serde_json::to_value(generated).unwrap(),
            serde_json::Value::String(generated.to_string())
        );
    }
}
