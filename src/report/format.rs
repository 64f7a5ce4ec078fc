//! Formatted terminal output for models and fits.
//!
//! We keep formatting code in one place so:
//! - the model and fitting code stays free of presentation concerns
//! - output changes are localized

use nalgebra::DMatrix;

use crate::fit::FitReport;
use crate::model::{Covariance, ErpModel, Stage, Variance};

/// Format the model parameters: variability, derived matrices and generators.
///
/// Matrices that have not been computed yet are reported as such; this never
/// triggers a computation.
pub fn format_model_summary(model: &ErpModel) -> String {
    let mut out = String::new();

    out.push_str("ERP Model Parameters\n");
    out.push_str("====================\n");
    out.push_str(&format!("Number of generators: {}\n", model.n_gen()));
    out.push_str(&format!(
        "Electrodes: {} | Subjects: {}\n\n",
        model.n_el(),
        model.n_sub()
    ));

    let v = model.variability();
    out.push_str("Variability\n");
    out.push_str("-----------\n");
    out.push_str(&format!(
        "* Electrodes ({}): {}\n",
        v.electrodes,
        fmt_variance(model.sigma_e())
    ));
    out.push_str(&format!(
        "* Generators ({}): {}\n",
        v.generators,
        fmt_variance(model.sigma_g())
    ));
    out.push_str(&format!(
        "* Connections ({}): {}\n",
        v.connections,
        fmt_covariance(model.sigma_c())
    ));

    out.push_str("\nStages\n");
    out.push_str("------\n");
    let freshness = model.freshness();
    for stage in Stage::ALL {
        out.push_str(&format!("{:<22} {:?}\n", stage.display_name(), freshness.get(stage)));
    }

    if let Some(cov_gen) = model.cov_gen() {
        out.push_str("\n* Generator covariance (cov_gen)\n");
        out.push_str(&fmt_matrix(cov_gen));
    }

    for (i, g) in model.generators().iter().enumerate() {
        out.push_str(&format!("\nGenerator {}\n", i + 1));
        out.push_str("-------------------\n");
        out.push_str(&format!("LOCATION, Depth: {}\n", g.depth));
        out.push_str(&format!("LOCATION, Theta: {}\n", g.theta));
        out.push_str(&format!("LOCATION, Phi: {}\n", g.phi));
        out.push_str(&format!("ORIENTATION: {}\n", g.orientation));
        out.push_str(&format!("ORIENTATION, Phi: {}\n", g.orientation_phi));
        out.push_str(&format!("MAGNITUDE: {}\n", g.magnitude));
    }

    out
}

/// Format the scalp mean as a `name value` table.
pub fn format_scalp_mean(model: &ErpModel) -> String {
    let Some(mean) = model.mean() else {
        return "mean: not computed\n".to_string();
    };
    let mut out = String::new();
    out.push_str(format!("{:<9} {:>14}", "electrode", "mean").trim_end());
    out.push('\n');
    for (e, m) in model.electrodes().iter().zip(mean.iter()) {
        out.push_str(&format!("{:<9} {:>14.6}\n", truncate(&e.name, 9), m));
    }
    out
}

/// Format a fit outcome.
pub fn format_fit_report(report: &FitReport) -> String {
    let mut out = String::new();
    let groups: Vec<String> = report.groups.iter().map(|g| g.to_string()).collect();

    out.push_str("=== erpvar - variability fit ===\n");
    out.push_str(&format!("Parameter groups: {}\n", groups.join(", ")));
    out.push_str(&format!("* Starting error: {}\n", report.start_error));
    out.push_str(&format!(
        "* After {} iterations ({} evaluations), the minimizer returned: {}\n",
        report.iterations, report.evaluations, report.termination
    ));
    out.push_str(&format!("* Final error: {}\n", report.end_error));
    out.push_str(&format!("- parameters: {}\n", fmt_vec(&report.parameters)));

    out
}

/// Format a matrix with one line per row.
pub fn fmt_matrix(m: &DMatrix<f64>) -> String {
    let mut out = String::new();
    for row in m.row_iter() {
        let parts: Vec<String> = row.iter().map(|x| format!("{x:>14.6}")).collect();
        out.push_str(parts.join(" ").trim_end());
        out.push('\n');
    }
    out
}

fn fmt_variance(v: &Variance) -> String {
    match v {
        Variance::None => "none".to_string(),
        Variance::Constant(c) => format!("{c:.6}"),
        Variance::Individual(values) => fmt_vec(values),
    }
}

fn fmt_covariance(c: &Covariance) -> String {
    match c {
        Covariance::None => "none".to_string(),
        Covariance::Individual(m) => {
            let n = m.nrows();
            let pairs: Vec<String> = (0..n)
                .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
                .map(|(i, j)| format!("({},{})={:.6}", i + 1, j + 1, m[(i, j)]))
                .collect();
            if pairs.is_empty() {
                "(no pairs)".to_string()
            } else {
                pairs.join(" ")
            }
        }
    }
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.6}")).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
