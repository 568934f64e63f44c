use std::time::Duration;

use latest_commits::{Auth, Transport, TransportError};
use tracing::trace;

/// Per-request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("latest-commits/", env!("CARGO_PKG_VERSION"));

/// HTTP client for downloading artifacts from an Artifactory-style repository.
///
/// This is a pure transport utility: one GET per call, no retries. The
/// underlying `reqwest::Client` pools connections and is shared by every
/// concurrent fetch.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                TransportError::connection(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client })
    }

    fn build_request(&self, url: &str, auth: &Auth) -> reqwest::RequestBuilder {
        let req = self.client.get(url);

        match auth {
            Auth::Bearer(token) => req.bearer_auth(token),
            Auth::Basic { user, password } => req.basic_auth(user, Some(password)),
            Auth::Anonymous => req,
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, auth: &Auth) -> Result<Vec<u8>, TransportError> {
        trace!(url, auth = auth.scheme(), "GET");

        let response = self
            .build_request(url, auth)
            .send()
            .await
            .map_err(|e| TransportError::connection(describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::http(
                status.as_u16(),
                status.canonical_reason().unwrap_or("unexpected status"),
            ));
        }

        let bytes = response.bytes().await.map_err(|e| {
            TransportError::connection(format!("failed to read body: {}", describe(&e)))
        })?;

        Ok(bytes.to_vec())
    }
}

fn describe(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("request timed out: {error}")
    } else if error.is_connect() {
        format!("could not connect: {error}")
    } else {
        error.to_string()
    }
}
