use thiserror::Error;

/// Errors that can end a page fetch.
///
/// The session only needs the rendered message, but the variants stay
/// distinct so callers and tests can tell a transport failure from an
/// upstream-reported one.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Proxy or upstream answered with a non-2xx status
    #[error("HTTP error {status}: {message}")]
    HttpStatus { status: u16, message: String },
    /// HTTP 200 whose body still carries an `error` object
    #[error("API error: {message}")]
    Upstream { code: Option<u16>, message: String },
    /// Body was not the expected search response structure
    #[error("Invalid response: {0}")]
    Decode(String),
    /// Response body exceeded the size limit
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    /// A configured endpoint could not be turned into a request URL
    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(String),
    /// Refused to send a credential over plain HTTP to a remote host
    #[error("Insecure upstream URL: HTTPS required when sending a credential (except localhost)")]
    InsecureUpstream,
}

impl FetchError {
    /// HTTP status carried by the error, if the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { status, .. } => Some(*status),
            FetchError::Upstream { code, .. } => *code,
            FetchError::Transport(e) => e.status().map(|s| s.as_u16()),
            FetchError::Decode(_)
            | FetchError::ResponseTooLarge(_)
            | FetchError::InvalidEndpoint(_)
            | FetchError::InsecureUpstream => None,
        }
    }
}
