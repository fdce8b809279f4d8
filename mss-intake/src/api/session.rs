//! Per-request session context
//!
//! Every `/api` request identifies its tenant with the `X-Tenant-Id` header.
//! Handlers receive the tenant as an extracted [`SessionContext`] value
//! rather than reading it from shared state.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::admission::{AdmissionResult, PlaceholderRecord, SubmissionContext};
use crate::error::ApiError;

/// Header carrying the caller's tenant (school) id
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Authenticated caller identity for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionContext {
    tenant_id: i64,
}

impl SessionContext {
    pub fn new(tenant_id: i64) -> Result<Self, ApiError> {
        if tenant_id <= 0 {
            return Err(ApiError::Unauthorized(format!(
                "tenant id must be positive, got {}",
                tenant_id
            )));
        }
        Ok(Self { tenant_id })
    }

    pub fn tenant_id(&self) -> i64 {
        self.tenant_id
    }

    /// Submission context for this tenant and the given subject/task.
    pub fn submission(
        &self,
        subject_id: Option<i64>,
        task_id: Option<i64>,
    ) -> AdmissionResult<SubmissionContext> {
        SubmissionContext::new(self.tenant_id, subject_id, task_id)
    }

    /// Whether `record` belongs to this tenant.
    pub fn owns(&self, record: &PlaceholderRecord) -> bool {
        record.context.tenant_id() == self.tenant_id
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(TENANT_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("missing X-Tenant-Id header".to_string()))?;

        let tenant_id = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .ok_or_else(|| {
                ApiError::Unauthorized("X-Tenant-Id header must be an integer".to_string())
            })?;

        SessionContext::new(tenant_id)
    }
}
