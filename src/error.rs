//! Error taxonomy for resource lifecycle operations.

use thiserror::Error;

use crate::client::{ApiError, DecodeError};
use crate::config::ConfigError;
use crate::export::ExportError;
use crate::identity::IdentityError;
use crate::reconcile::WaitError;
use crate::retry::RetryError;
use crate::schema::ValidationError;

/// Errors returned by `create`, `read`, `update`, `delete` and `import`.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The configuration is invalid; nothing was sent.
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),
    /// A stored identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    Identity(#[from] IdentityError),
    /// A remote call failed for good, or kept failing until the retry
    /// budget ran out.
    #[error("{action} on {resource_id} failed after {attempts} attempt(s): {source}")]
    Remote {
        /// Remote action that failed.
        action: String,
        /// Object the call targeted, or `-` before it had an id.
        resource_id: String,
        /// Attempts made.
        attempts: u32,
        /// Error from the last attempt.
        #[source]
        source: Box<ApiError>,
    },
    /// A response did not have the expected shape.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Waiting for the object to settle failed.
    #[error("waiting for {resource_id} failed: {source}")]
    Wait {
        /// Object being waited on.
        resource_id: String,
        /// Underlying wait failure.
        #[source]
        source: Box<WaitError<LifecycleError>>,
    },
    /// The object was created but a follow-up step failed. The id must be
    /// kept so the object can be managed or destroyed later.
    #[error("{id} was created but a follow-up step failed: {source}")]
    PartialCreate {
        /// Identifier of the created object.
        id: String,
        /// Failure of the follow-up step.
        #[source]
        source: Box<LifecycleError>,
    },
    /// The object disappeared during an operation that needed it.
    #[error("{id} no longer exists")]
    Vanished {
        /// Identifier of the missing object.
        id: String,
    },
    /// Import was asked for an object that does not exist.
    #[error("cannot import {id}: it does not exist")]
    ImportNotFound {
        /// Identifier given to import.
        id: String,
    },
    /// Writing a result file failed.
    #[error(transparent)]
    Export(#[from] ExportError),
    /// Provider configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl LifecycleError {
    /// Wraps a failed remote call.
    #[must_use]
    pub fn remote(resource_id: &str, err: RetryError<ApiError>) -> Self {
        let action = err.action().to_owned();
        let attempts = err.attempts();
        Self::Remote {
            action,
            resource_id: resource_id.to_owned(),
            attempts,
            source: Box::new(err.into_source()),
        }
    }

    /// Wraps a failed wait.
    #[must_use]
    pub fn wait(resource_id: &str, err: WaitError<Self>) -> Self {
        Self::Wait {
            resource_id: resource_id.to_owned(),
            source: Box::new(err),
        }
    }

    /// Marks a follow-up failure after a successful create.
    #[must_use]
    pub fn partial_create(id: impl Into<String>, err: Self) -> Self {
        Self::PartialCreate {
            id: id.into(),
            source: Box::new(err),
        }
    }

    /// The remote error behind this failure, if any.
    #[must_use]
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Remote { source, .. } => Some(source.as_ref()),
            Self::Wait { source, .. } => match source.as_ref() {
                WaitError::Describe { source, .. } => source.api_error(),
                _ => None,
            },
            Self::PartialCreate { source, .. } => source.api_error(),
            _ => None,
        }
    }

    /// Error code of the remote error behind this failure.
    #[must_use]
    pub fn api_code(&self) -> Option<&str> {
        self.api_error().and_then(ApiError::code)
    }

    /// Whether the failure means the target object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Vanished { .. } | Self::ImportNotFound { .. })
            || self.api_error().is_some_and(ApiError::is_not_found)
    }

    /// Whether the failure happened before any remote call.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Identity(_) | Self::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn remote_errors_keep_code_and_attempts() {
        let retry = RetryError::Exhausted {
            action: "DeleteInstance".to_owned(),
            attempts: 4,
            elapsed: std::time::Duration::from_secs(30),
            source: ApiError::service("IncorrectInstanceStatus", "busy"),
        };
        let err = LifecycleError::remote("i-1", retry);
        assert_eq!(err.api_code(), Some("IncorrectInstanceStatus"));
        assert!(!err.is_not_found());
        let rendered = err.to_string();
        assert!(rendered.contains("DeleteInstance on i-1"));
        assert!(rendered.contains("4 attempt"));
    }

    #[rstest]
    fn partial_create_exposes_inner_code() {
        let inner = LifecycleError::remote(
            "i-1",
            RetryError::Fatal {
                action: "TagResources".to_owned(),
                attempts: 1,
                source: ApiError::service("InvalidTagKey.Malformed", "bad key"),
            },
        );
        let err = LifecycleError::partial_create("i-1", inner);
        assert_eq!(err.api_code(), Some("InvalidTagKey.Malformed"));
    }

    #[rstest]
    fn not_found_is_detected_through_waits() {
        let err = LifecycleError::wait(
            "d-1",
            WaitError::Describe {
                id: "d-1".to_owned(),
                source: LifecycleError::remote(
                    "d-1",
                    RetryError::Fatal {
                        action: "DescribeDisks".to_owned(),
                        attempts: 1,
                        source: ApiError::service("InvalidDiskId.NotFound", "gone"),
                    },
                ),
            },
        );
        assert!(err.is_not_found());
        assert!(!err.is_configuration());
    }
}
