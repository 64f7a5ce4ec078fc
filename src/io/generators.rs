//! Generator configuration JSON.
//!
//! A configuration is a JSON array of generator objects:
//! `{"depth", "theta", "phi", "orientation", "orientation_phi", "magnitude"?}`.

use std::fs::File;
use std::path::Path;

use crate::domain::Generator;
use crate::error::ModelError;

/// Read a generator configuration.
pub fn read_generators_json(path: &Path) -> Result<Vec<Generator>, ModelError> {
    let file = File::open(path).map_err(|e| {
        ModelError::Io(format!("failed to open generator configuration '{}': {e}", path.display()))
    })?;
    serde_json::from_reader(file)
        .map_err(|e| ModelError::Parse(format!("invalid generator configuration JSON: {e}")))
}

/// Write a generator configuration.
pub fn write_generators_json(path: &Path, generators: &[Generator]) -> Result<(), ModelError> {
    let file = File::create(path).map_err(|e| {
        ModelError::Io(format!("failed to create generator configuration '{}': {e}", path.display()))
    })?;
    serde_json::to_writer_pretty(file, generators)
        .map_err(|e| ModelError::Io(format!("failed to write generator configuration JSON: {e}")))
}
