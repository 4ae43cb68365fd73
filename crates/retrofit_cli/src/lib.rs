//! Scenario loading, CSV export and run summaries for the retrofit simulator.
//!
//! The simulation core stays I/O-free; this crate wraps it with a JSON
//! scenario loader, exporters for the six CSV result tables, and a one-screen
//! text summary for the terminal.

pub mod export;
pub mod summary;

use std::path::Path;

use retrofit_core::scenario::Scenario;

/// Load and parse a scenario JSON file. Validation happens in
/// [`retrofit_core::runner::run`].
pub fn load_scenario(path: &Path) -> Result<Scenario, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let scenario: Scenario =
        serde_json::from_str(&raw).map_err(|e| format!("cannot parse {}: {e}", path.display()))?;
    Ok(scenario)
}
