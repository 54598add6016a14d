//! Sync command implementation.

use acdb_sync_engine::{Engine, HttpClient, SyncOutcome};
use tracing::error;

/// Runs the sync command.
///
/// Every dataset is attempted; the command fails afterwards if any of them
/// did.
pub fn run<C: HttpClient>(engine: &mut Engine<C>, datasets: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let names: Vec<String> = if datasets.is_empty() {
        engine.registry().names().map(str::to_string).collect()
    } else {
        datasets.to_vec()
    };

    let mut failed = Vec::new();
    for name in &names {
        match engine.sync(name) {
            Ok(outcome) => println!("{}", summary(&outcome)),
            Err(e) => {
                error!(dataset = %name, error = %e, "sync failed");
                println!("{name}: failed: {e}");
                failed.push(name.as_str());
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(format!("sync failed for {}", failed.join(", ")).into())
    }
}

/// One line per synced dataset.
pub fn summary(outcome: &SyncOutcome) -> String {
    let reset = if outcome.reset { ", reset" } else { "" };
    format!(
        "{}: {}{reset}, {} requests, {} added, {} total",
        outcome.dataset, outcome.severity, outcome.requests, outcome.added, outcome.total
    )
}
