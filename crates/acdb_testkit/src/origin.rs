//! A scripted origin.
//!
//! [`ScriptedClient`] answers GET requests from a URL table and records
//! every URL it was asked for. Unknown URLs answer 404.

use acdb_sync_engine::{HttpClient, HttpResponse};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Script {
    responses: HashMap<String, HttpResponse>,
    failing: HashSet<String>,
    log: Vec<String>,
}

/// An [`HttpClient`] serving canned responses.
///
/// Clones share the script and the request log, so a test can keep one
/// handle while the engine owns the other.
#[derive(Debug, Clone, Default)]
pub struct ScriptedClient {
    script: Arc<Mutex<Script>>,
}

impl ScriptedClient {
    /// Creates a client that knows no URL.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `body` with status 200 at `url`.
    #[must_use]
    pub fn page(self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.set_page(url, body);
        self
    }

    /// Serves `status` with an empty body at `url`.
    #[must_use]
    pub fn status(self, url: impl Into<String>, status: u16) -> Self {
        self.script.lock().responses.insert(
            url.into(),
            HttpResponse {
                status,
                body: Vec::new(),
            },
        );
        self
    }

    /// Replaces the body served at `url`.
    pub fn set_page(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.script
            .lock()
            .responses
            .insert(url.into(), HttpResponse::ok(body));
    }

    /// Makes requests to `url` fail without a response.
    pub fn fail(&self, url: impl Into<String>) {
        self.script.lock().failing.insert(url.into());
    }

    /// Lets requests to `url` succeed again.
    pub fn heal(&self, url: &str) {
        self.script.lock().failing.remove(url);
    }

    /// Every URL requested so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.script.lock().log.clone()
    }

    /// Forgets the request log.
    pub fn clear_requests(&self) {
        self.script.lock().log.clear();
    }
}

impl HttpClient for ScriptedClient {
    fn get(&self, url: &str, _headers: &[(String, String)]) -> Result<HttpResponse, String> {
        let mut script = self.script.lock();
        script.log.push(url.to_string());
        if script.failing.contains(url) {
            return Err(format!("connection reset: {url}"));
        }
        Ok(script.responses.get(url).cloned().unwrap_or(HttpResponse {
            status: 404,
            body: Vec::new(),
        }))
    }
}
