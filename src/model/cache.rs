//! Freshness tracking for derived model quantities.
//!
//! Each derived quantity lives in a `Cached<T>` that is either `Fresh` (matches
//! the current inputs) or `Stale`. A stale cache keeps its last value around so
//! it can still be inspected, but the model recomputes it before using it.

use serde::Serialize;

/// Freshness of one derived quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Stale,
    Fresh,
}

/// The computation stages, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LeadField,
    Mean,
    GeneratorCovariance,
    Covariance,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::LeadField,
        Stage::Mean,
        Stage::GeneratorCovariance,
        Stage::Covariance,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Stage::LeadField => "lead field",
            Stage::Mean => "mean",
            Stage::GeneratorCovariance => "covariance generators",
            Stage::Covariance => "covariance",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cached<T> {
    value: Option<T>,
    freshness: Freshness,
}

impl<T> Cached<T> {
    pub fn empty() -> Self {
        Self {
            value: None,
            freshness: Freshness::Stale,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.freshness == Freshness::Fresh
    }

    pub fn freshness(&self) -> Freshness {
        self.freshness
    }

    /// Last computed value, fresh or not.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Value only if it is fresh.
    pub fn fresh_value(&self) -> Option<&T> {
        match self.freshness {
            Freshness::Fresh => self.value.as_ref(),
            Freshness::Stale => None,
        }
    }

    pub fn store(&mut self, value: T) -> &T {
        self.freshness = Freshness::Fresh;
        self.value.insert(value)
    }

    pub fn invalidate(&mut self) {
        self.freshness = Freshness::Stale;
    }
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Snapshot of all four freshness flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreshnessReport {
    pub lead_field: Freshness,
    pub mean: Freshness,
    pub cov_gen: Freshness,
    pub cov: Freshness,
}

impl FreshnessReport {
    pub fn get(&self, stage: Stage) -> Freshness {
        match stage {
            Stage::LeadField => self.lead_field,
            Stage::Mean => self.mean,
            Stage::GeneratorCovariance => self.cov_gen,
            Stage::Covariance => self.cov,
        }
    }

    pub fn all_fresh(&self) -> bool {
        Stage::ALL.iter().all(|s| self.get(*s) == Freshness::Fresh)
    }

    pub fn all_stale(&self) -> bool {
        Stage::ALL.iter().all(|s| self.get(*s) == Freshness::Stale)
    }

    /// Flags as booleans in stage order (lead field, mean, cov_gen, cov).
    pub fn as_flags(&self) -> [bool; 4] {
        Stage::ALL.map(|s| self.get(s) == Freshness::Fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_keeps_stale_value() {
        let mut c = Cached::empty();
        assert!(!c.is_fresh());
        assert!(c.value().is_none());
        c.store(3);
        assert!(c.is_fresh());
        assert_eq!(c.fresh_value(), Some(&3));
        c.invalidate();
        assert!(!c.is_fresh());
        assert_eq!(c.value(), Some(&3));
        assert_eq!(c.fresh_value(), None);
    }
}
