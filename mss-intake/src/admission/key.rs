//! Dedup key derivation
//!
//! A [`DedupKey`] identifies "the same submission attempt": tenant (school),
//! subject (student) and task (question). Absent optional fields encode as a
//! fixed sentinel that no present value can produce, so an anonymous
//! submission never matches a named one, and two anonymous submissions only
//! share a key when every other field matches too.

use serde::Serialize;
use std::fmt;

use super::error::{AdmissionError, AdmissionResult};

/// Format version prefix; bump if the encoding ever changes.
const KEY_VERSION: &str = "v1";

/// Encoding of an absent optional field.
const ABSENT: &str = "-";

/// Validated context identifying a submission attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SubmissionContext {
    tenant_id: i64,
    subject_id: Option<i64>,
    task_id: Option<i64>,
}

impl SubmissionContext {
    /// Build a context, rejecting missing or non-positive discriminators.
    ///
    /// This is the only place `InvalidContext` originates: once a context
    /// exists, deriving its key cannot fail.
    pub fn new(tenant_id: i64, subject_id: Option<i64>, task_id: Option<i64>) -> AdmissionResult<Self> {
        if tenant_id <= 0 {
            return Err(AdmissionError::InvalidContext(format!(
                "tenant_id must be positive, got {}",
                tenant_id
            )));
        }
        check_optional_id("subject_id", subject_id)?;
        check_optional_id("task_id", task_id)?;

        Ok(Self {
            tenant_id,
            subject_id,
            task_id,
        })
    }

    pub fn tenant_id(&self) -> i64 {
        self.tenant_id
    }

    pub fn subject_id(&self) -> Option<i64> {
        self.subject_id
    }

    pub fn task_id(&self) -> Option<i64> {
        self.task_id
    }
}

fn check_optional_id(field: &str, value: Option<i64>) -> AdmissionResult<()> {
    match value {
        Some(id) if id <= 0 => Err(AdmissionError::InvalidContext(format!(
            "{} must be positive when present, got {}",
            field, id
        ))),
        _ => Ok(()),
    }
}

/// Canonical, deterministic dedup key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuild a key read back from storage.
    pub(crate) fn from_stored(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the dedup key for a context. Pure and total.
pub fn derive_key(context: &SubmissionContext) -> DedupKey {
    DedupKey(format!(
        "{}|t:{}|s{}|k{}",
        KEY_VERSION,
        context.tenant_id,
        encode_optional(context.subject_id),
        encode_optional(context.task_id),
    ))
}

fn encode_optional(value: Option<i64>) -> String {
    match value {
        Some(id) => format!(":{}", id),
        None => ABSENT.to_string(),
    }
}
