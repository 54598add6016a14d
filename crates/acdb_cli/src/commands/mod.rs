//! CLI command implementations.

pub mod reset;
pub mod show;
pub mod status;
pub mod sync;

use acdb_atcoder::{default_registry, parsers, with_submissions_base};
use acdb_sync_engine::{Engine, EngineConfig, Registry, ReqwestClient};
use std::path::PathBuf;
use std::time::Duration;

/// Global options shared by every command.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Cache root directory.
    pub cache_root: PathBuf,
    /// Registry file replacing the built-in datasets.
    pub registry: Option<PathBuf>,
    /// Bulk submissions file.
    pub base_snapshot: Option<PathBuf>,
    /// Politeness delay override.
    pub delay: Option<Duration>,
    /// Ignore the persisted sync state.
    pub force_reinit: bool,
}

/// Builds the registry the options ask for.
pub fn registry(options: &EngineOptions) -> Result<Registry, Box<dyn std::error::Error>> {
    let mut registry = match &options.registry {
        Some(path) => Registry::from_json_file(path)?,
        None => default_registry(),
    };
    if let Some(base) = &options.base_snapshot {
        registry = with_submissions_base(registry, base);
    }
    Ok(registry)
}

/// Opens an engine over the network.
pub fn open_engine(options: &EngineOptions) -> Result<Engine<ReqwestClient>, Box<dyn std::error::Error>> {
    let registry = registry(options)?;
    let mut config = EngineConfig::new(&options.cache_root);
    if let Some(delay) = options.delay {
        config = config.with_request_delay(delay);
    }
    config = config.with_force_reinit(options.force_reinit);
    let client = ReqwestClient::new(&config)?;
    Ok(Engine::new(config, registry, parsers(), client)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use acdb_atcoder::SUBMISSIONS;

    #[test]
    fn base_snapshot_applies_to_any_registry() {
        let options = EngineOptions {
            cache_root: PathBuf::from("data"),
            registry: None,
            base_snapshot: Some(PathBuf::from("bulk/submissions.jsonl")),
            delay: None,
            force_reinit: false,
        };
        let registry = registry(&options).unwrap();
        let base = registry.get(SUBMISSIONS).and_then(|s| s.base_snapshot.as_ref());
        assert_eq!(base.map(|b| b.path.clone()), Some(PathBuf::from("bulk/submissions.jsonl")));
    }

    #[test]
    fn missing_registry_file_is_reported() {
        let options = EngineOptions {
            cache_root: PathBuf::from("data"),
            registry: Some(PathBuf::from("/nonexistent/registry.json")),
            base_snapshot: None,
            delay: None,
            force_reinit: false,
        };
        let err = registry(&options).unwrap_err();
        assert!(err.to_string().contains("registry.json"));
    }
}
