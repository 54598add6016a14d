//! Configuration for the sync engine.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for engine I/O.
///
/// Dataset behaviour lives in [`crate::Registry`]; this only covers where
/// things are stored and how the remote origin is contacted.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding table files and raw responses.
    pub cache_root: PathBuf,
    /// Sync state file.
    pub state_path: PathBuf,
    /// Pause after every network call.
    pub request_delay: Duration,
    /// User agent sent with requests.
    pub user_agent: String,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Request timeout.
    pub timeout: Duration,
    /// Ignore persisted sync state and start every dataset from its
    /// default markers.
    pub force_reinit: bool,
}

impl EngineConfig {
    /// Creates a configuration rooted at `cache_root`.
    ///
    /// The state file defaults to `<cache_root>/state.json`.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        let cache_root = cache_root.into();
        Self {
            state_path: cache_root.join("state.json"),
            cache_root,
            request_delay: Duration::from_secs(1),
            user_agent: format!("acdb/{}", env!("CARGO_PKG_VERSION")),
            headers: vec![("accept-language".into(), "ja-JP".into())],
            timeout: Duration::from_secs(30),
            force_reinit: false,
        }
    }

    /// Sets the state file location.
    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = path.into();
        self
    }

    /// Sets the pause after every network call.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Adds or replaces a request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Discards persisted markers when a dataset is first loaded.
    pub fn with_force_reinit(mut self, force: bool) -> Self {
        self.force_reinit = force;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_builder() {
        let config = EngineConfig::new("/tmp/acdb")
            .with_request_delay(Duration::ZERO)
            .with_header("Accept-Language", "en-US")
            .with_timeout(Duration::from_secs(5))
            .with_force_reinit(true);

        assert!(config.force_reinit);
        assert_eq!(config.state_path, PathBuf::from("/tmp/acdb/state.json"));
        assert_eq!(config.request_delay, Duration::ZERO);
        assert_eq!(config.headers, vec![("Accept-Language".to_string(), "en-US".to_string())]);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn defaults_are_polite() {
        let config = EngineConfig::default();
        assert_eq!(config.request_delay, Duration::from_secs(1));
        assert_eq!(config.headers[0].1, "ja-JP");
        assert!(!config.force_reinit);
    }
}
