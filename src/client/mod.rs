//! Uniform access to RPC-style cloud APIs.
//!
//! Every call is an [`Action`] plus flat [`Params`], sent through the
//! [`CloudApi`] trait and answered with a JSON document. Resource code never
//! sees HTTP: it builds parameters, decodes the typed response it expects,
//! and classifies [`ApiError`]s for the retry loop.

mod rpc;
mod signature;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::builder::Params;
use crate::retry::Classification;

pub use rpc::{Credentials, RpcClient};

/// API version of the ECS product.
pub const ECS_API_VERSION: &str = "2014-05-26";

/// Error codes the control plane uses for throttling and overload.
pub const THROTTLING_CODES: [&str; 6] = [
    "Throttling",
    "Throttling.User",
    "Throttling.Api",
    "Throttling.Concurrency",
    "ServiceUnavailable",
    "SystemBusy",
];

/// HTTP verb used for an action.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    /// Parameters in the query string.
    Get,
    /// Parameters in a form-encoded body.
    Post,
}

impl Method {
    /// Upper-case verb.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// One remote API operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Action {
    /// Product code, used to derive the endpoint (for example `ecs`).
    pub product: &'static str,
    /// API version date.
    pub version: &'static str,
    /// Action name (for example `DescribeInstances`).
    pub name: &'static str,
    /// HTTP verb.
    pub method: Method,
}

impl Action {
    /// Describes an action of `product` at `version`, sent with POST.
    #[must_use]
    pub const fn new(product: &'static str, version: &'static str, name: &'static str) -> Self {
        Self {
            product,
            version,
            name,
            method: Method::Post,
        }
    }

    /// Describes an ECS action.
    #[must_use]
    pub const fn ecs(name: &'static str) -> Self {
        Self::new("ecs", ECS_API_VERSION, name)
    }

    /// Overrides the HTTP verb.
    #[must_use]
    pub const fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }
}

/// Future returned by [`CloudApi::call`].
pub type ApiFuture<'a> =
    Pin<Box<dyn Future<Output = Result<serde_json::Value, ApiError>> + Send + 'a>>;

/// A signed, region-bound connection to the cloud.
pub trait CloudApi: Send + Sync {
    /// Region every call is bound to.
    fn region(&self) -> &str;

    /// Sends one action and returns the decoded JSON body.
    fn call<'a>(&'a self, action: &'a Action, params: &'a Params) -> ApiFuture<'a>;
}

impl<T: CloudApi + ?Sized> CloudApi for Arc<T> {
    fn region(&self) -> &str {
        (**self).region()
    }

    fn call<'a>(&'a self, action: &'a Action, params: &'a Params) -> ApiFuture<'a> {
        (**self).call(action, params)
    }
}

/// Errors raised by a [`CloudApi`] call.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// The service rejected the call with an error code.
    #[error("{code}: {message} (request id {})", .request_id.as_deref().unwrap_or("unknown"))]
    Service {
        /// Error code, for example `InvalidInstanceId.NotFound`.
        code: String,
        /// Human readable message.
        message: String,
        /// Request id for support cases.
        request_id: Option<String>,
        /// HTTP status of the response.
        status: u16,
    },
    /// The request never produced a response.
    #[error("transport error: {message}")]
    Transport {
        /// Underlying error, rendered.
        message: String,
    },
    /// The response body was not the JSON document expected.
    #[error("malformed response: {message}")]
    Malformed {
        /// Parser error, rendered.
        message: String,
    },
    /// The request could not be signed.
    #[error("failed to sign request: {message}")]
    Signing {
        /// Underlying error, rendered.
        message: String,
    },
}

impl ApiError {
    /// Builds a service error with a 400 status.
    #[must_use]
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            code: code.into(),
            message: message.into(),
            request_id: None,
            status: 400,
        }
    }

    /// Error code of a service error.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Request id of a service error.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Service { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }

    /// Whether the service reported `code`.
    #[must_use]
    pub fn is_code(&self, code: &str) -> bool {
        self.code() == Some(code)
    }

    /// Whether the error is throttling, overload, or a lost connection.
    #[must_use]
    pub fn is_throttling(&self) -> bool {
        match self {
            Self::Service { code, status, .. } => {
                THROTTLING_CODES.contains(&code.as_str()) || matches!(status, 429 | 503)
            }
            Self::Transport { .. } => true,
            Self::Malformed { .. } | Self::Signing { .. } => false,
        }
    }

    /// Whether the error says the target object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code()
            .is_some_and(|code| code.ends_with("NotFound") || code.contains(".NotFound"))
    }
}

/// Retries throttling and transport errors; everything else is fatal.
#[must_use]
pub fn classify_throttling(err: &ApiError) -> Classification {
    if err.is_throttling() {
        Classification::Retry
    } else {
        Classification::Fatal
    }
}

/// Retries throttling errors plus the resource-specific `codes`.
#[must_use]
pub fn classify_with(codes: &'static [&'static str]) -> impl Fn(&ApiError) -> Classification + Copy {
    move |err: &ApiError| {
        if err.is_throttling() || err.code().is_some_and(|code| codes.contains(&code)) {
            Classification::Retry
        } else {
            Classification::Fatal
        }
    }
}

/// Failure to read a response into its typed form.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("failed to decode {action} response: {message}")]
pub struct DecodeError {
    /// Action whose response failed to decode.
    pub action: String,
    /// Parser error, rendered.
    pub message: String,
}

/// Decodes the JSON body of `action` into `T`.
///
/// # Errors
///
/// Returns [`DecodeError`] when the document does not have the expected
/// shape.
pub fn decode<T: DeserializeOwned>(
    action: &Action,
    body: serde_json::Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(body).map_err(|err| DecodeError {
        action: action.name.to_owned(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde::Deserialize;
    use serde_json::json;

    #[rstest]
    #[case(ApiError::service("Throttling.User", "slow down"), Classification::Retry)]
    #[case(ApiError::service("ServiceUnavailable", "busy"), Classification::Retry)]
    #[case(
        ApiError::Service {
            code: "Unknown".to_owned(),
            message: String::new(),
            request_id: None,
            status: 503,
        },
        Classification::Retry
    )]
    #[case(ApiError::Transport { message: "reset".to_owned() }, Classification::Retry)]
    #[case(ApiError::service("InvalidParameter", "bad"), Classification::Fatal)]
    #[case(ApiError::service("IncorrectInstanceStatus", "wait"), Classification::Fatal)]
    #[case(ApiError::Malformed { message: "eof".to_owned() }, Classification::Fatal)]
    fn throttling_classifier(#[case] err: ApiError, #[case] expected: Classification) {
        assert_eq!(classify_throttling(&err), expected);
    }

    #[rstest]
    fn resource_classifier_adds_conflict_codes() {
        let classify = classify_with(&["IncorrectInstanceStatus", "LastTokenProcessing"]);
        assert_eq!(
            classify(&ApiError::service("IncorrectInstanceStatus", "wait")),
            Classification::Retry
        );
        assert_eq!(
            classify(&ApiError::service("Throttling", "slow")),
            Classification::Retry
        );
        assert_eq!(
            classify(&ApiError::service("InvalidParameter", "no")),
            Classification::Fatal
        );
    }

    #[rstest]
    #[case("InvalidInstanceId.NotFound", true)]
    #[case("InvalidSecurityGroupId.NotFound", true)]
    #[case("EntityNotFound", true)]
    #[case("NotFoundButNotReally", false)]
    #[case("Forbidden", false)]
    fn not_found_codes(#[case] code: &str, #[case] expected: bool) {
        assert_eq!(ApiError::service(code, "").is_not_found(), expected);
    }

    #[rstest]
    fn decode_reports_the_action() {
        #[derive(Debug, Deserialize)]
        struct Reply {
            #[serde(rename = "InstanceId")]
            _instance_id: String,
        }
        let action = Action::ecs("RunInstances");
        let err = decode::<Reply>(&action, json!({"Other": 1})).expect_err("missing field");
        assert_eq!(err.action, "RunInstances");
    }
}
