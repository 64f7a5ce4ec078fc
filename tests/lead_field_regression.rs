use std::path::PathBuf;
use std::sync::Arc;

use nalgebra::DMatrix;

use erp_variability::domain::VariabilitySelection;
use erp_variability::electrodes::ElectrodeSet;
use erp_variability::forward::calculate_lead_field;
use erp_variability::io::{LeadFieldFixture, read_fixtures};
use erp_variability::model::ErpModel;

fn fixtures() -> Vec<LeadFieldFixture> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/lead_field_regression.json");
    read_fixtures(&path).unwrap()
}

/// Entries must be reproduced bit for bit.
fn assert_identical(actual: &DMatrix<f64>, expected: &DMatrix<f64>, what: &str) {
    assert_eq!(actual.shape(), expected.shape(), "{what}: shape");
    for (g, (a_col, e_col)) in actual.column_iter().zip(expected.column_iter()).enumerate() {
        for (i, (a, e)) in a_col.iter().zip(e_col.iter()).enumerate() {
            assert!(a == e, "{what}: entry ({i}, {g}) is {a:e}, expected {e:e}");
        }
    }
}

#[test]
fn lead_fields_match_stored_fixtures() {
    let electrodes = ElectrodeSet::standard_10_20();
    let records = fixtures();
    assert_eq!(records.len(), 4);
    for record in &records {
        let expected = record.matrix().unwrap();
        let actual = calculate_lead_field(&electrodes, &record.generator_configuration).unwrap();
        assert_identical(&actual, &expected, &record.description);
    }
}

#[test]
fn unit_magnitude_mean_equals_lead_field_column() {
    let record = &fixtures()[0];
    assert_eq!(record.generator_configuration[0].magnitude, 1.0);

    let mut model = ErpModel::new(
        1,
        1,
        VariabilitySelection::default(),
        Arc::new(ElectrodeSet::standard_10_20()),
    );
    model.set_generators(record.generator_configuration.clone()).unwrap();
    let mean = model.calculate_mean().unwrap().clone();

    let expected = record.matrix().unwrap();
    assert_identical(
        &DMatrix::from_column_slice(mean.len(), 1, mean.as_slice()),
        &expected,
        "mean",
    );
}

#[test]
fn radial_dipole_under_vertex_is_symmetric() {
    let record = &fixtures()[0];
    let lf = record.matrix().unwrap();
    let names = ElectrodeSet::standard_10_20().names();
    let value = |name: &str| {
        let i = names.iter().position(|n| n == name).unwrap();
        lf[(i, 0)]
    };
    // Same polar angle, different azimuth.
    assert!((value("C3") - value("C4")).abs() <= 1e-15);
    assert!((value("T7") - value("T8")).abs() <= 1e-15);
    assert!(value("Cz") > value("C3"));
}
