//! Error classification at the facade boundary.
//!
//! Aggregation touches several upstream lists per response. A missing or
//! forbidden sub-resource must not sink the whole page, so failures are
//! split into non-critical ones (recorded, assembly continues with
//! defaults) and critical ones (abort the request).

use kanso_fetch::FetchError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Typed errors suitable for transport to a client.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("upstream: {0}")]
    Upstream(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Critical errors abort assembly; the rest degrade to defaults.
    pub fn is_critical(&self) -> bool {
        !matches!(self, ApiError::NotFound(_) | ApiError::Forbidden(_))
    }
}

/// Map a fetch failure onto the transportable error space. HTTP 404 and
/// 403 from the cluster stay recognizable; everything else is upstream
/// noise or our own fault.
pub fn classify(err: &FetchError) -> ApiError {
    if let Some(kube_err) = err.inner().downcast_ref::<kube::Error>() {
        if let kube::Error::Api(resp) = kube_err {
            return match resp.code {
                404 => ApiError::NotFound(resp.message.clone()),
                403 => ApiError::Forbidden(resp.message.clone()),
                _ => ApiError::Upstream(err.to_string()),
            };
        }
        return ApiError::Upstream(err.to_string());
    }
    ApiError::Internal(err.to_string())
}

/// Fold one fetch error into a response under assembly. Non-critical
/// failures land in `errors` and return `Ok`; critical ones bubble.
pub fn absorb(err: Option<FetchError>, errors: &mut Vec<String>) -> ApiResult<()> {
    let Some(fetch_err) = err else {
        return Ok(());
    };
    let classified = classify(&fetch_err);
    if classified.is_critical() {
        return Err(classified);
    }
    warn!(error = %classified, "api: sub-fetch degraded, continuing with defaults");
    errors.push(classified.to_string());
    Ok(())
}

// ---- tests ----
