use thiserror::Error;

/// Type alias for Result with MailError
pub type Result<T> = std::result::Result<T, MailError>;

/// Error types for the fetch / generate / persist workflow
#[derive(Error, Debug)]
pub enum MailError {
    /// Credentials missing, unreadable, or rejected
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Invalid message format or parsing error
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Reply could not be delivered
    #[error("Failed to send reply: {0}")]
    SendFailed(String),

    /// Summary or draft generation failed
    #[error("Generation error: {0}")]
    GenerationError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Persisted store exists but cannot be parsed
    #[error("Email store is corrupt: {0}")]
    StoreCorrupt(String),

    /// CSV encoding error
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No stored record with the given id
    #[error("Email not found: {0}")]
    EmailNotFound(String),

    /// Two records in a batch share an id
    #[error("Duplicate email id: {0}")]
    DuplicateId(String),
}

impl MailError {
    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MailError::RateLimitExceeded { .. }
                | MailError::ServerError { .. }
                | MailError::NetworkError(_)
        )
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// True for failures reading or writing the local email store
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            MailError::IoError(_)
                | MailError::SerializationError(_)
                | MailError::StoreCorrupt(_)
                | MailError::CsvError(_)
        )
    }
}

/// Parse the Retry-After header (delay-seconds form) from an HTTP response.
///
/// Falls back to 5 seconds when the header is missing or not an integer.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

impl From<google_gmail1::Error> for MailError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    401 => MailError::AuthError(message),
                    429 => {
                        let retry_after = parse_retry_after_header(response);
                        MailError::RateLimitExceeded { retry_after }
                    }
                    404 => MailError::MessageNotFound("Resource not found".to_string()),
                    400 => MailError::BadRequest(message),
                    403 => MailError::Forbidden(message),
                    500..=599 => MailError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => MailError::ApiError(message),
                }
            }
            google_gmail1::Error::BadRequest(ref err) => MailError::BadRequest(format!("{}", err)),
            google_gmail1::Error::HttpError(ref err) => {
                MailError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => MailError::NetworkError(err.to_string()),
            google_gmail1::Error::MissingToken(err) => MailError::AuthError(err.to_string()),
            _ => MailError::ApiError(error.to_string()),
        }
    }
}

/// Request URLs are dropped from the message so nothing in them reaches logs
impl From<reqwest::Error> for MailError {
    fn from(error: reqwest::Error) -> Self {
        let error = error.without_url();
        if error.is_timeout() || error.is_connect() {
            MailError::NetworkError(error.to_string())
        } else {
            MailError::GenerationError(error.to_string())
        }
    }
}
