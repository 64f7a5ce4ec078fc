//! Lead-field regression fixtures.
//!
//! A fixture file is a JSON array of records, each pairing a generator
//! configuration with the lead field it must produce over the built-in
//! electrode montage. Lead fields are stored row-major: one row per electrode.

use std::fs::File;
use std::path::Path;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::domain::Generator;
use crate::error::ModelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadFieldFixture {
    pub description: String,
    pub generator_configuration: Vec<Generator>,
    pub lead_field: Vec<Vec<f64>>,
}

impl LeadFieldFixture {
    pub fn new(description: impl Into<String>, generators: Vec<Generator>, lead_field: &DMatrix<f64>) -> Self {
        Self {
            description: description.into(),
            generator_configuration: generators,
            lead_field: matrix_rows(lead_field),
        }
    }

    /// The stored lead field as an `n_el × n_gen` matrix.
    pub fn matrix(&self) -> Result<DMatrix<f64>, ModelError> {
        rows_to_matrix(&self.lead_field, self.generator_configuration.len())
    }
}

/// Row-major copy of a matrix.
pub fn matrix_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter().map(|r| r.iter().copied().collect()).collect()
}

/// Build a matrix from rows that must all have `n_cols` entries.
pub fn rows_to_matrix(rows: &[Vec<f64>], n_cols: usize) -> Result<DMatrix<f64>, ModelError> {
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_cols) {
        return Err(ModelError::DimensionMismatch(format!(
            "row {i} has {} columns, expected {n_cols}",
            row.len()
        )));
    }
    Ok(DMatrix::from_fn(rows.len(), n_cols, |r, c| rows[r][c]))
}

pub fn read_fixtures(path: &Path) -> Result<Vec<LeadFieldFixture>, ModelError> {
    let file = File::open(path)
        .map_err(|e| ModelError::Io(format!("failed to open fixture file '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| ModelError::Parse(format!("invalid fixture JSON: {e}")))
}

pub fn write_fixtures(path: &Path, fixtures: &[LeadFieldFixture]) -> Result<(), ModelError> {
    let file = File::create(path)
        .map_err(|e| ModelError::Io(format!("failed to create fixture file '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, fixtures)
        .map_err(|e| ModelError::Io(format!("failed to write fixture JSON: {e}")))
}
