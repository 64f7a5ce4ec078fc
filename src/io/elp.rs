//! ELP electrode-location files.
//!
//! Tab-separated text. The first line holds the electrode count and is not a
//! data row; every following row is `type, label, theta, phi` with angles in
//! degrees (BESA convention, signed theta).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use tracing::{debug, warn};

use crate::electrodes::ElectrodeSet;
use crate::error::ModelError;

/// Read and normalize an ELP file.
pub fn read_electrode_locations(path: &Path) -> Result<ElectrodeSet, ModelError> {
    let file = File::open(path)
        .map_err(|e| ModelError::Io(format!("failed to open electrode file '{}': {e}", path.display())))?;
    let set = parse_electrode_locations(file)?;
    debug!(path = %path.display(), n_el = set.len(), "electrode locations read");
    Ok(set)
}

/// Parse ELP content from any reader.
pub fn parse_electrode_locations<R: Read>(input: R) -> Result<ElectrodeSet, ModelError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut declared: Option<usize> = None;
    let mut records = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 1;
        let record = result.map_err(|e| ModelError::Parse(format!("electrode file line {line}: {e}")))?;
        if idx == 0 {
            declared = record.get(0).and_then(|s| s.parse().ok());
            continue;
        }
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        records.push(parse_row(&record, line)?);
    }

    if let Some(n) = declared {
        if n != records.len() {
            warn!(declared = n, found = records.len(), "electrode count header disagrees with file");
        }
    }

    ElectrodeSet::from_raw_degrees(&records)
}

fn parse_row(record: &StringRecord, line: usize) -> Result<(String, f64, f64), ModelError> {
    let field = |i: usize, what: &str| {
        record
            .get(i)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ModelError::Parse(format!("electrode file line {line}: missing {what}")))
    };
    let number = |i: usize, what: &str| -> Result<f64, ModelError> {
        let raw = field(i, what)?;
        raw.parse::<f64>()
            .map_err(|_| ModelError::Parse(format!("electrode file line {line}: invalid {what} '{raw}'")))
    };
    Ok((field(1, "label")?.to_string(), number(2, "theta")?, number(3, "phi")?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "4\nEEG\tFz\t46\t90\nEEG\tCz\t0\t0\nEEG\tT8\t92\t0\nEEG\tT7\t-92\t0\n";

    #[test]
    fn parses_and_normalizes() {
        let set = parse_electrode_locations(SAMPLE.as_bytes()).unwrap();
        assert_eq!(set.names(), vec!["Fz", "Cz", "T8", "T7"]);
        let t7 = &set.as_slice()[3];
        assert!((t7.theta - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((t7.phi - std::f64::consts::PI).abs() < 1e-12);
        let fz = &set.as_slice()[0];
        assert!((fz.theta - 46.0 / 92.0 * std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn skips_count_line_even_if_wrong() {
        let text = "99\nEEG\tCz\t10\t0\n";
        let set = parse_electrode_locations(text.as_bytes()).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn rejects_non_numeric_angles() {
        let text = "1\nEEG\tCz\tabc\t0\n";
        let err = parse_electrode_locations(text.as_bytes()).unwrap_err();
        assert!(matches!(err, ModelError::Parse(_)));
    }

    #[test]
    fn rejects_missing_columns() {
        let text = "1\nEEG\tCz\t10\n";
        assert!(matches!(
            parse_electrode_locations(text.as_bytes()),
            Err(ModelError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_electrode_locations(Path::new("/nonexistent/electrodes.elp")).unwrap_err();
        assert!(matches!(err, ModelError::Io(_)));
    }
}
