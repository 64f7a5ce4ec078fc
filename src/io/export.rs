//! JSON export of a model snapshot.
//!
//! The snapshot is meant for plotting or downstream scripts: every matrix is
//! written row-major, and stages that were never computed are `null`.

use std::fs::File;
use std::path::Path;

use serde::Serialize;

use crate::domain::{Generator, VariabilitySelection};
use crate::error::ModelError;
use crate::io::fixture::matrix_rows;
use crate::model::{Covariance, ErpModel, FreshnessReport, Variance};

#[derive(Debug, Clone, Serialize)]
pub struct ModelExport {
    pub tool: String,
    pub n_sub: usize,
    pub n_gen: usize,
    pub electrodes: Vec<String>,
    pub variability: VariabilitySelection,
    pub generators: Vec<Generator>,
    pub sigma_e: Variance,
    pub sigma_g: Variance,
    pub sigma_c: Covariance,
    pub freshness: FreshnessReport,
    pub lead_field: Option<Vec<Vec<f64>>>,
    pub mean: Option<Vec<f64>>,
    pub cov_gen: Option<Vec<Vec<f64>>>,
    pub cov: Option<Vec<Vec<f64>>>,
    /// One row per simulated subject.
    pub data: Option<Vec<Vec<f64>>>,
}

impl ModelExport {
    pub fn from_model(model: &ErpModel) -> Self {
        Self {
            tool: "erpvar".to_string(),
            n_sub: model.n_sub(),
            n_gen: model.n_gen(),
            electrodes: model.electrodes().names(),
            variability: model.variability(),
            generators: model.generators().to_vec(),
            sigma_e: model.sigma_e().clone(),
            sigma_g: model.sigma_g().clone(),
            sigma_c: model.sigma_c().clone(),
            freshness: model.freshness(),
            lead_field: model.lead_field().map(matrix_rows),
            mean: model.mean().map(|m| m.iter().copied().collect()),
            cov_gen: model.cov_gen().map(matrix_rows),
            cov: model.cov().map(matrix_rows),
            data: model.data().map(matrix_rows),
        }
    }
}

/// Write a model snapshot as pretty JSON.
pub fn write_model_json(path: &Path, model: &ErpModel) -> Result<(), ModelError> {
    let file = File::create(path)
        .map_err(|e| ModelError::Io(format!("failed to create export JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, &ModelExport::from_model(model))
        .map_err(|e| ModelError::Io(format!("failed to write export JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::electrodes::ElectrodeSet;

    #[test]
    fn snapshot_reflects_computed_stages() {
        let mut rng = StdRng::seed_from_u64(40);
        let sel = VariabilitySelection::parse("constant", "individual", "individual").unwrap();
        let mut model = ErpModel::new(4, 2, sel, Arc::new(ElectrodeSet::standard_10_20()));
        model.set_random(&mut rng);

        let empty = ModelExport::from_model(&model);
        assert!(empty.lead_field.is_none());
        assert!(empty.data.is_none());

        model.recalculate_model(&mut rng).unwrap();
        let full = ModelExport::from_model(&model);
        assert_eq!(full.electrodes.len(), model.n_el());
        assert_eq!(full.data.as_ref().map(Vec::len), Some(4));
        assert_eq!(full.cov.as_ref().map(Vec::len), Some(model.n_el()));

        let json = serde_json::to_value(&full).unwrap();
        assert_eq!(json["variability"]["generators"], "individual");
        assert_eq!(json["freshness"]["cov"], "fresh");
    }
}
