use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tokio::time::Instant;

use crate::{Auth, Transport, TransportError};

pub type ScriptedResponse = Result<Vec<u8>, TransportError>;

pub fn ok(body: &str) -> ScriptedResponse {
    Ok(body.as_bytes().to_vec())
}

pub fn status(code: u16) -> ScriptedResponse {
    Err(TransportError::http(code, format!("status {code}")))
}

pub fn connection(message: &str) -> ScriptedResponse {
    Err(TransportError::connection(message))
}

/// A single request seen by `ScriptedTransport`.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub auth: Auth,
    pub at: Instant,
}

/// In-memory transport for testing.
///
/// Each URL has a queue of scripted responses consumed in order. Once a
/// URL's queue is empty the fallback response is returned.
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedResponse>>>,
    fallback: ScriptedResponse,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// Unscripted URLs answer 404.
    pub fn new() -> Self {
        Self::with_fallback(status(404))
    }

    /// Unscripted URLs answer with `body`.
    pub fn serving(body: &str) -> Self {
        Self::with_fallback(ok(body))
    }

    pub fn with_fallback(fallback: ScriptedResponse) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, url: &str, response: ScriptedResponse) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_owned())
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.url == url)
            .count()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str, auth: &Auth) -> Result<Vec<u8>, TransportError> {
        self.calls.lock().unwrap().push(RecordedCall {
            url: url.to_owned(),
            auth: auth.clone(),
            at: Instant::now(),
        });

        self.scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}
