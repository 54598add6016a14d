//! Cache-or-network fetch step.
//!
//! The HTTP client is abstracted via [`HttpClient`] so the engine can run
//! against a scripted origin in tests. [`ReqwestClient`] is the production
//! implementation.

use crate::adapter::{ParseOutcome, Parser};
use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::registry::SourceSpec;
use acdb_storage::{CacheStore, RequestId};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

/// A response as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Body, already transcoded to UTF-8 when the origin declared a charset.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A 200 response.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implementations send one GET and return the status and body. They do
/// not retry and do not interpret the status.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    ///
    /// # Errors
    ///
    /// Returns a message when no response was received.
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, String>;
}

/// Blocking [`reqwest`] client.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Builds a client honouring the user agent and timeout of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the TLS backend cannot be set up.
    pub fn new(config: &EngineConfig) -> SyncResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, String> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        // decodes per the Content-Type charset, UTF-8 otherwise
        let text = response.text().map_err(|e| e.to_string())?;
        Ok(HttpResponse {
            status,
            body: text.into_bytes(),
        })
    }
}

/// Result of one fetch step.
#[derive(Debug)]
pub(crate) struct Fetched {
    pub outcome: ParseOutcome,
    /// True if the origin answered with usable rows.
    pub from_origin: bool,
}

/// Performs one fetch step.
pub(crate) struct Fetcher<'a, C: HttpClient> {
    pub client: &'a C,
    pub cache: &'a dyn CacheStore,
    pub headers: &'a [(String, String)],
    pub delay: Duration,
}

impl<C: HttpClient> Fetcher<'_, C> {
    /// Raw cache hit: parse without network or delay. Miss: GET, pause,
    /// check status, parse, and cache the payload only if it yields rows.
    ///
    /// With a `source`, parsed pages pass through [`SourceSpec::screen`]
    /// before the caching decision.
    pub fn fetch(
        &self,
        request: &RequestId,
        parser: &dyn Parser,
        source: Option<&SourceSpec>,
        use_cache: bool,
    ) -> SyncResult<Fetched> {
        let dataset = request.dataset.as_str();
        let parse = |raw: &[u8]| -> SyncResult<ParseOutcome> {
            let outcome = parser
                .parse(raw)
                .map_err(|e| SyncError::payload(dataset, request, e.message()))?;
            Ok(match (outcome, source) {
                (ParseOutcome::Rows(page), Some(source)) => source.screen(page),
                (outcome, _) => outcome,
            })
        };

        if use_cache {
            if let Some(raw) = self.cache.load_raw(request)? {
                debug!(dataset = %dataset, request = %request, "raw cache hit");
                return Ok(Fetched {
                    outcome: parse(&raw)?,
                    from_origin: false,
                });
            }
        }

        info!(dataset = %dataset, url = %request.url(), "fetching");
        let response = self.client.get(&request.url(), self.headers);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let response = response.map_err(|message| {
            error!(dataset = %dataset, request = %request, error = %message, "request failed");
            SyncError::transport(dataset, request, message)
        })?;
        if !response.is_success() {
            error!(dataset = %dataset, request = %request, status = response.status, "unexpected status");
            return Err(SyncError::transport(
                dataset,
                request,
                format!("HTTP status {}", response.status),
            ));
        }

        let outcome = parse(&response.body)?;
        let from_origin = !outcome.is_empty();
        if use_cache && from_origin {
            self.cache.save_raw(request, &response.body)?;
        }
        Ok(Fetched { outcome, from_origin })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ParseError;
    use acdb_storage::MemoryCacheStore;
    use acdb_table::{Row, Table};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedClient {
        responses: HashMap<String, HttpResponse>,
        calls: AtomicUsize,
    }

    impl FixedClient {
        fn new(entries: &[(&str, u16, &str)]) -> Self {
            Self {
                responses: entries
                    .iter()
                    .map(|(url, status, body)| {
                        (
                            (*url).to_string(),
                            HttpResponse {
                                status: *status,
                                body: body.as_bytes().to_vec(),
                            },
                        )
                    })
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl HttpClient for FixedClient {
        fn get(&self, url: &str, _headers: &[(String, String)]) -> Result<HttpResponse, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| format!("connection refused: {url}"))
        }
    }

    fn count_lines(raw: &[u8]) -> Result<ParseOutcome, ParseError> {
        let text = std::str::from_utf8(raw).map_err(|e| ParseError::new(e.to_string()))?;
        if text.starts_with('!') {
            return Err(ParseError::new("bang"));
        }
        Ok(ParseOutcome::Rows(
            text.lines().map(|l| Row::new().with("line", l)).collect::<Table>(),
        ))
    }

    fn fetcher<'a>(client: &'a FixedClient, cache: &'a MemoryCacheStore) -> Fetcher<'a, FixedClient> {
        Fetcher {
            client,
            cache,
            headers: &[],
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn miss_then_hit() {
        let client = FixedClient::new(&[("https://x/1", 200, "a\nb")]);
        let cache = MemoryCacheStore::new();
        let request = RequestId::new("d", "https://x/{}", "1");

        let first = fetcher(&client, &cache).fetch(&request, &count_lines, None, true).unwrap();
        assert!(first.from_origin);
        let second = fetcher(&client, &cache).fetch(&request, &count_lines, None, true).unwrap();
        assert!(!second.from_origin);
        assert_eq!(first.outcome, second.outcome);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_parse_is_not_cached() {
        let client = FixedClient::new(&[("https://x/1", 200, "")]);
        let cache = MemoryCacheStore::new();
        let request = RequestId::new("d", "https://x/{}", "1");

        let fetched = fetcher(&client, &cache).fetch(&request, &count_lines, None, true).unwrap();
        assert!(fetched.outcome.is_empty());
        assert_eq!(cache.raw_len(), 0);
    }

    #[test]
    fn status_and_transport_failures() {
        let client = FixedClient::new(&[("https://x/1", 503, "busy")]);
        let cache = MemoryCacheStore::new();

        let err = fetcher(&client, &cache)
            .fetch(&RequestId::new("d", "https://x/{}", "1"), &count_lines, None, true)
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport { ref message, .. } if message.contains("503")));

        let err = fetcher(&client, &cache)
            .fetch(&RequestId::new("d", "https://x/{}", "2"), &count_lines, None, true)
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport { ref message, .. } if message.contains("refused")));
    }

    #[test]
    fn malformed_payload_is_fatal() {
        let client = FixedClient::new(&[("https://x/1", 200, "!oops")]);
        let cache = MemoryCacheStore::new();
        let err = fetcher(&client, &cache)
            .fetch(&RequestId::new("d", "https://x/{}", "1"), &count_lines, None, true)
            .unwrap_err();
        assert!(matches!(err, SyncError::Payload { .. }));
        assert_eq!(cache.raw_len(), 0);
    }

    #[test]
    fn screened_page_is_not_cached() {
        let client = FixedClient::new(&[("https://x/1", 200, "a\na")]);
        let cache = MemoryCacheStore::new();
        let source = SourceSpec::TimeSeries(crate::registry::TimeSeriesConfig::new("https://x/{}", "line"));
        let fetched = fetcher(&client, &cache)
            .fetch(&RequestId::new("d", "https://x/{}", "1"), &count_lines, Some(&source), true)
            .unwrap();
        assert!(matches!(fetched.outcome, ParseOutcome::Empty { .. }));
        assert!(!fetched.from_origin);
        assert_eq!(cache.raw_len(), 0);
    }

    #[test]
    fn cache_can_be_bypassed() {
        let client = FixedClient::new(&[("https://x/1", 200, "a")]);
        let cache = MemoryCacheStore::new();
        let request = RequestId::new("d", "https://x/{}", "1");
        fetcher(&client, &cache).fetch(&request, &count_lines, None, false).unwrap();
        fetcher(&client, &cache).fetch(&request, &count_lines, None, false).unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.raw_len(), 0);
    }
}
