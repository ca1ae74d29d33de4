use std::time::Duration;

use super::error::{HttpGatewayError, HttpResult};

/// Default bound applied to every request issued by the HTTP gateway.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime configuration describing how to reach the exam API.
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// Base URL of the exam API, without a trailing slash.
    pub base_url: String,
    /// Bearer token attached to every request, when the API requires one.
    pub token: Option<String>,
    /// Upper bound for a single request, connection setup included.
    pub request_timeout: Duration,
}

impl HttpGatewayConfig {
    /// Construct a configuration from an explicit base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Attach a bearer token to the configuration.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Build a configuration by reading the expected environment variables.
    pub fn from_env() -> HttpResult<Self> {
        let base_url =
            std::env::var("EXAM_API_BASE_URL").map_err(|_| HttpGatewayError::MissingEnvVar {
                var: "EXAM_API_BASE_URL",
            })?;

        let mut config = Self::new(base_url);
        if let Ok(token) = std::env::var("EXAM_API_TOKEN") {
            config = config.with_token(token);
        }

        Ok(config)
    }
}
