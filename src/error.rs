use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Coarse error classification shared by the ingestion and aggregation paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    UnknownTenant,
    QuotaExceeded,
    StorageUnavailable,
    AggregationPartial,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::UnknownTenant => "unknown_tenant",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::StorageUnavailable => "storage_unavailable",
            ErrorKind::AggregationPartial => "aggregation_partial",
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid `{field}`: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("unknown tracking id '{0}'")]
    UnknownTenant(String),

    #[error("tracking id '{0}' is over its monthly event quota")]
    QuotaExceeded(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] anyhow::Error),

    /// A multi-bucket run stopped early. Buckets before `resume_from` are final.
    #[error("aggregation stopped after {completed} bucket(s), resume from {resume_from}: {cause}")]
    AggregationPartial {
        completed: usize,
        resume_from: DateTime<Utc>,
        cause: String,
    },
}

impl PipelineError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        PipelineError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidInput { .. } => ErrorKind::InvalidInput,
            PipelineError::UnknownTenant(_) => ErrorKind::UnknownTenant,
            PipelineError::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            PipelineError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            PipelineError::AggregationPartial { .. } => ErrorKind::AggregationPartial,
        }
    }

    /// Whether retrying the same call later can succeed without caller changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::StorageUnavailable(_) | PipelineError::AggregationPartial { .. }
        )
    }

    /// The offending field for `InvalidInput`, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            PipelineError::InvalidInput { field, .. } => Some(field),
            _ => None,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Run a storage call bounded by `timeout`, mapping both failure and
/// elapsed time into `StorageUnavailable`.
pub async fn bounded<T, F>(timeout: std::time::Duration, fut: F) -> PipelineResult<T>
where
    F: std::future::Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(PipelineError::StorageUnavailable(e)),
        Err(_) => Err(PipelineError::StorageUnavailable(anyhow::anyhow!(
            "storage call timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_retryable_kinds() {
        assert!(!PipelineError::invalid("type", "bad").is_retryable());
        assert!(!PipelineError::UnknownTenant("T".into()).is_retryable());
        assert!(!PipelineError::QuotaExceeded("T".into()).is_retryable());
        assert!(PipelineError::StorageUnavailable(anyhow::anyhow!("down")).is_retryable());
    }

    #[test]
    fn test_invalid_input_reports_field() {
        let err = PipelineError::invalid("sessionId", "must not be empty");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.field(), Some("sessionId"));
        assert_eq!(err.to_string(), "invalid `sessionId`: must not be empty");
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: PipelineResult<()> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(PipelineError::StorageUnavailable(_))));
    }
}
