//! Error types specific to the HTTP gateway implementation.

use reqwest::StatusCode;
use thiserror::Error;

use crate::gateway::error::GatewayError;

/// Convenient result alias returning [`HttpGatewayError`] failures.
pub type HttpResult<T> = Result<T, HttpGatewayError>;

/// Failures that can occur while talking to the exam API over HTTP.
#[derive(Debug, Error)]
pub enum HttpGatewayError {
    /// Required environment variable is missing.
    #[error("missing exam API environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the variable that was not set.
        var: &'static str,
    },
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build exam API client")]
    ClientBuilder {
        /// Builder failure reported by reqwest.
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent or timed out.
    #[error("failed to send exam API request to `{path}`")]
    RequestSend {
        /// Endpoint path the request was aimed at.
        path: String,
        /// Transport failure reported by reqwest.
        #[source]
        source: reqwest::Error,
    },
    /// The exam API returned an unexpected status code.
    #[error("unexpected exam API response status {status} for `{path}`")]
    RequestStatus {
        /// Endpoint path that answered.
        path: String,
        /// Status code that was returned.
        status: StatusCode,
    },
    /// Response payload could not be parsed.
    #[error("failed to decode exam API response for `{path}`")]
    DecodeResponse {
        /// Endpoint path that answered.
        path: String,
        /// Decoding failure reported by reqwest.
        #[source]
        source: reqwest::Error,
    },
}

impl HttpGatewayError {
    /// Map into the transport-agnostic gateway taxonomy: status refusals are
    /// rejections, everything else means the API was unreachable.
    pub(crate) fn into_gateway(self, operation: &'static str) -> GatewayError {
        match self {
            HttpGatewayError::RequestStatus { ref path, status } => GatewayError::Rejected {
                operation,
                detail: format!("status {status} for `{path}`"),
            },
            other => GatewayError::unavailable(format!("{operation} failed"), other),
        }
    }
}
