use std::error::Error;
use thiserror::Error;

/// Result alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error raised by gateway implementations regardless of the transport.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The exam API could not be reached or did not answer in time.
    #[error("exam API unavailable: {message}")]
    Unavailable {
        /// What was being attempted when the transport failed.
        message: String,
        /// Underlying transport failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The exam API answered but refused the operation.
    #[error("exam API rejected {operation}: {detail}")]
    Rejected {
        /// Logical operation that was refused.
        operation: &'static str,
        /// Server-provided refusal detail.
        detail: String,
    },
}

impl GatewayError {
    /// Construct an unavailable error from any transport failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        GatewayError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
