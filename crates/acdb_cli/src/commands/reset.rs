//! Reset command implementation.

use acdb_sync_engine::{Engine, HttpClient};

/// Runs the reset command.
pub fn run<C: HttpClient>(engine: &mut Engine<C>, dataset: &str) -> Result<(), Box<dyn std::error::Error>> {
    engine.reset(dataset)?;
    println!("{dataset}: reset, the next read fetches it from scratch");
    Ok(())
}
