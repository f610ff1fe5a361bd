// Subscription endpoint client
//
// A subscription is a plain GET that returns a text body of descriptor
// URIs. Envelope decoding and line parsing happen in wayvpn-core; this
// module only moves bytes and classifies transport failures.

use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// HTTP client for remote subscription endpoints.
#[derive(Debug, Clone)]
pub struct SubscriptionClient {
    http: reqwest::Client,
    timeout_secs: u64,
}

impl SubscriptionClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            timeout_secs: transport.timeout.as_secs(),
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, timeout_secs: u64) -> Self {
        Self { http, timeout_secs }
    }

    /// Fetch the raw subscription body.
    ///
    /// Rejects non-HTTP schemes, maps non-2xx statuses to
    /// [`Error::HttpStatus`], and treats a whitespace-only body as
    /// [`Error::EmptyBody`].
    pub async fn fetch(&self, url: &str) -> Result<String, Error> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::UnsupportedScheme(url.scheme().to_owned()));
        }

        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    timeout_secs: self.timeout_secs,
                }
            } else {
                Error::Transport(e)
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    timeout_secs: self.timeout_secs,
                }
            } else {
                Error::Transport(e)
            }
        })?;

        if body.trim().is_empty() {
            return Err(Error::EmptyBody);
        }

        debug!(bytes = body.len(), "subscription body received");
        Ok(body)
    }
}
