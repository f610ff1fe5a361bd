use thiserror::Error;

/// Top-level error type for the `wayvpn-api` crate.
///
/// Covers every way a subscription fetch can fail before the body reaches
/// the parser. `wayvpn-core` maps these into its sync error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Only `http` and `https` endpoints are fetched.
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Response ────────────────────────────────────────────────────
    /// The endpoint answered with a non-success status.
    #[error("Subscription endpoint returned HTTP {status}")]
    HttpStatus { status: u16 },

    /// The endpoint answered 2xx with nothing but whitespace.
    #[error("Subscription endpoint returned an empty body")]
    EmptyBody,
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            Self::HttpStatus { status } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns `true` if the request hit the configured deadline.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" response.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 404 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        assert!(Error::HttpStatus { status: 503 }.is_transient());
        assert!(Error::HttpStatus { status: 429 }.is_transient());
        assert!(!Error::HttpStatus { status: 404 }.is_transient());
        assert!(Error::Timeout { timeout_secs: 5 }.is_transient());
        assert!(!Error::EmptyBody.is_transient());
    }

    #[test]
    fn not_found_only_matches_404() {
        assert!(Error::HttpStatus { status: 404 }.is_not_found());
        assert!(!Error::HttpStatus { status: 410 }.is_not_found());
    }
}
