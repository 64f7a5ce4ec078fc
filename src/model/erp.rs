//! ERP variability model: generators + variability → mean and covariance.
//!
//! Derived quantities are computed in stages:
//!
//! ```text
//! generators ──► lead field ──► mean              (uses magnitudes)
//!                    │
//!                    └────────► cov_gen ──► cov   (uses sigma_g, sigma_c, sigma_e)
//! ```
//!
//! Every stage is cached and recomputed lazily; setters mark the stages that
//! depend on what they changed as stale. `recalculate_model` is the one entry
//! point that recomputes everything eagerly and draws a fresh sample.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use tracing::{debug, warn};

use crate::domain::{Generator, ModelLimits, VariabilitySelection};
use crate::electrodes::ElectrodeSet;
use crate::error::ModelError;
use crate::forward::HeadModel;
use crate::math::sample_multivariate_normal;
use crate::model::cache::{Cached, FreshnessReport, Stage};
use crate::model::placement::{random_generator_placement, uniform};
use crate::model::variability::{Covariance, Variance};

/// Generator configuration, variability parameters and the staged results
/// derived from them.
///
/// A model instance is not meant to be shared between threads while it is
/// being mutated; fitting writes into it on every objective evaluation.
#[derive(Debug, Clone)]
pub struct ErpModel {
    n_sub: usize,
    n_gen: usize,
    electrodes: Arc<ElectrodeSet>,
    head: HeadModel,
    limits: ModelLimits,
    variability: VariabilitySelection,

    generators: Vec<Generator>,
    sigma_e: Variance,
    sigma_g: Variance,
    sigma_c: Covariance,

    lead_field: Cached<DMatrix<f64>>,
    mean: Cached<DVector<f64>>,
    cov_gen: Cached<DMatrix<f64>>,
    cov: Cached<DMatrix<f64>>,
    data: Option<DMatrix<f64>>,
}

impl ErpModel {
    /// Create a model with `n_gen` generators and `n_sub` simulated subjects.
    ///
    /// Variability values start at zero (in the shape the selectors ask for);
    /// the generator configuration starts empty.
    pub fn new(
        n_sub: usize,
        n_gen: usize,
        variability: VariabilitySelection,
        electrodes: Arc<ElectrodeSet>,
    ) -> Self {
        let n_el = electrodes.len();
        Self {
            n_sub,
            n_gen,
            electrodes,
            head: HeadModel::default(),
            limits: ModelLimits::default(),
            variability,
            generators: Vec::new(),
            sigma_e: Variance::zeros(variability.electrodes, n_el),
            sigma_g: Variance::zeros(variability.generators, n_gen),
            sigma_c: Covariance::zeros(variability.connections, n_gen),
            lead_field: Cached::empty(),
            mean: Cached::empty(),
            cov_gen: Cached::empty(),
            cov: Cached::empty(),
            data: None,
        }
    }

    /// Create a model from textual variability selectors.
    ///
    /// Unknown selector names fail here, at construction.
    pub fn from_names(
        n_sub: usize,
        n_gen: usize,
        electrodes: &str,
        generators: &str,
        connections: &str,
        electrode_set: Arc<ElectrodeSet>,
    ) -> Result<Self, ModelError> {
        let selection = VariabilitySelection::parse(electrodes, generators, connections)?;
        Ok(Self::new(n_sub, n_gen, selection, electrode_set))
    }

    pub fn with_limits(mut self, limits: ModelLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_head_model(mut self, head: HeadModel) -> Self {
        self.head = head;
        self.invalidate_all();
        self
    }

    // ---------------------------------------------------------------------
    // Read-only accessors
    // ---------------------------------------------------------------------

    pub fn n_sub(&self) -> usize {
        self.n_sub
    }

    pub fn n_gen(&self) -> usize {
        self.n_gen
    }

    pub fn n_el(&self) -> usize {
        self.electrodes.len()
    }

    pub fn electrodes(&self) -> &ElectrodeSet {
        &self.electrodes
    }

    pub fn head(&self) -> &HeadModel {
        &self.head
    }

    pub fn limits(&self) -> &ModelLimits {
        &self.limits
    }

    pub fn variability(&self) -> VariabilitySelection {
        self.variability
    }

    pub fn generators(&self) -> &[Generator] {
        &self.generators
    }

    pub fn sigma_e(&self) -> &Variance {
        &self.sigma_e
    }

    pub fn sigma_g(&self) -> &Variance {
        &self.sigma_g
    }

    pub fn sigma_c(&self) -> &Covariance {
        &self.sigma_c
    }

    /// Last computed lead field (possibly stale).
    pub fn lead_field(&self) -> Option<&DMatrix<f64>> {
        self.lead_field.value()
    }

    /// Last computed mean topography (possibly stale).
    pub fn mean(&self) -> Option<&DVector<f64>> {
        self.mean.value()
    }

    /// Last computed generator covariance (possibly stale).
    pub fn cov_gen(&self) -> Option<&DMatrix<f64>> {
        self.cov_gen.value()
    }

    /// Last computed scalp covariance (possibly stale).
    pub fn cov(&self) -> Option<&DMatrix<f64>> {
        self.cov.value()
    }

    /// Last simulated data set (`n_sub × n_el`).
    pub fn data(&self) -> Option<&DMatrix<f64>> {
        self.data.as_ref()
    }

    pub fn freshness(&self) -> FreshnessReport {
        FreshnessReport {
            lead_field: self.lead_field.freshness(),
            mean: self.mean.freshness(),
            cov_gen: self.cov_gen.freshness(),
            cov: self.cov.freshness(),
        }
    }

    /// Mean topography of a single generator: `magnitude * lead_field[:, g]`.
    pub fn generator_topography(&self, g: usize) -> Option<DVector<f64>> {
        let lf = self.lead_field.value()?;
        let generator = self.generators.get(g)?;
        if g >= lf.ncols() {
            return None;
        }
        Some(lf.column(g) * generator.magnitude)
    }

    /// Scalp variance caused by generator `g` alone: `sigma_g[g] * lead_field[:, g]²`.
    pub fn generator_variance_topography(&self, g: usize) -> Option<DVector<f64>> {
        let lf = self.lead_field.value()?;
        if g >= lf.ncols() {
            return None;
        }
        let var = self.sigma_g.value_at(g);
        Some(lf.column(g).map(|v| var * v * v))
    }

    /// Scalp variance (diagonal of the covariance).
    pub fn scalp_variance(&self) -> Option<DVector<f64>> {
        self.cov.value().map(|c| c.diagonal())
    }

    // ---------------------------------------------------------------------
    // Setters
    // ---------------------------------------------------------------------

    fn invalidate(&mut self, stage: Stage) {
        match stage {
            Stage::LeadField => self.lead_field.invalidate(),
            Stage::Mean => self.mean.invalidate(),
            Stage::GeneratorCovariance => self.cov_gen.invalidate(),
            Stage::Covariance => self.cov.invalidate(),
        }
    }

    pub(crate) fn invalidate_all(&mut self) {
        for stage in Stage::ALL {
            self.invalidate(stage);
        }
    }

    /// Change the variability selectors.
    ///
    /// Variability values are reset to zero in the new shapes.
    pub fn set_variability_type(&mut self, variability: VariabilitySelection) {
        self.variability = variability;
        self.sigma_e = Variance::zeros(variability.electrodes, self.n_el());
        self.sigma_g = Variance::zeros(variability.generators, self.n_gen);
        self.sigma_c = Covariance::zeros(variability.connections, self.n_gen);
        self.invalidate(Stage::GeneratorCovariance);
        self.invalidate(Stage::Covariance);
    }

    /// Replace the generator configuration.
    ///
    /// The generator count follows the new configuration; per-generator
    /// variability is resized to match.
    pub fn set_generators(&mut self, generators: Vec<Generator>) -> Result<(), ModelError> {
        for (index, g) in generators.iter().enumerate() {
            g.validate(index, self.head.radius)?;
        }
        self.n_gen = generators.len();
        self.generators = generators;
        self.sigma_g.resize(self.n_gen);
        self.sigma_c.resize(self.n_gen);
        self.invalidate_all();
        Ok(())
    }

    /// Mutable access for the parameterization layer, which invalidates on its own.
    pub(crate) fn generators_mut(&mut self) -> &mut Vec<Generator> {
        &mut self.generators
    }

    pub(crate) fn sigma_e_mut(&mut self) -> &mut Variance {
        &mut self.sigma_e
    }

    pub(crate) fn sigma_g_mut(&mut self) -> &mut Variance {
        &mut self.sigma_g
    }

    pub(crate) fn sigma_c_mut(&mut self) -> &mut Covariance {
        &mut self.sigma_c
    }

    /// Set the electrode variance. The variant must match the electrode selector.
    pub fn set_sigma_e(&mut self, sigma_e: Variance) -> Result<(), ModelError> {
        sigma_e.check(self.variability.electrodes, self.n_el(), "electrode")?;
        self.sigma_e = sigma_e;
        self.invalidate(Stage::Covariance);
        Ok(())
    }

    /// Set the generator variance. The variant must match the generator selector.
    pub fn set_sigma_g(&mut self, sigma_g: Variance) -> Result<(), ModelError> {
        sigma_g.check(self.variability.generators, self.n_gen, "generator")?;
        self.sigma_g = sigma_g;
        self.invalidate(Stage::GeneratorCovariance);
        self.invalidate(Stage::Covariance);
        Ok(())
    }

    /// Set the inter-generator covariance. The variant must match the connection selector.
    pub fn set_sigma_c(&mut self, sigma_c: Covariance) -> Result<(), ModelError> {
        sigma_c.check(self.variability.connections, self.n_gen)?;
        self.sigma_c = sigma_c;
        self.invalidate(Stage::GeneratorCovariance);
        self.invalidate(Stage::Covariance);
        Ok(())
    }

    pub fn set_random<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.set_random_locations_orientations(rng);
        self.set_random_magnitudes(rng);
        self.set_random_variability(rng);
    }

    /// Place all generators uniformly within the limits. Keeps magnitudes.
    pub fn set_random_locations_orientations<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut placed = random_generator_placement(&self.limits, self.n_gen, rng);
        for (new, old) in placed.iter_mut().zip(self.generators.iter()) {
            new.magnitude = old.magnitude;
        }
        self.generators = placed;
        self.invalidate_all();
    }

    /// Draw every magnitude uniformly within the limits.
    ///
    /// On a model without a full configuration the missing generators are first
    /// created with `Generator::default()` (radial, depth 6 under the vertex) and
    /// every stage is invalidated. Call `set_random_locations_orientations` or
    /// `set_generators` beforehand to place them elsewhere.
    pub fn set_random_magnitudes<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.generators.len() != self.n_gen {
            self.generators.resize(self.n_gen, Generator::default());
            self.invalidate_all();
        }
        let (low, high) = self.limits.magnitude;
        for g in self.generators.iter_mut() {
            g.magnitude = uniform(rng, low, high);
        }
        self.invalidate(Stage::Mean);
    }

    pub fn set_random_variability<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.set_random_variability_electrodes(rng);
        self.set_random_variability_generators(rng);
        self.set_random_variability_connections(rng);
    }

    pub fn set_random_variability_electrodes<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.sigma_e = Variance::random(
            self.variability.electrodes,
            self.n_el(),
            self.limits.electrode_variance,
            rng,
        );
        self.invalidate(Stage::Covariance);
    }

    pub fn set_random_variability_generators<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.sigma_g = Variance::random(
            self.variability.generators,
            self.n_gen,
            self.limits.generator_variance,
            rng,
        );
        self.invalidate(Stage::GeneratorCovariance);
        self.invalidate(Stage::Covariance);
    }

    /// Draw off-diagonal covariances bounded by the current generator variances.
    pub fn set_random_variability_connections<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.sigma_c = Covariance::random(self.variability.connections, &self.sigma_g, self.n_gen, rng);
        self.invalidate(Stage::GeneratorCovariance);
        self.invalidate(Stage::Covariance);
    }

    // ---------------------------------------------------------------------
    // Staged computation
    // ---------------------------------------------------------------------

    fn require_generators(&self) -> Result<(), ModelError> {
        if self.generators.len() != self.n_gen {
            return Err(ModelError::DimensionMismatch(format!(
                "model has {} generators but the configuration holds {}",
                self.n_gen,
                self.generators.len()
            )));
        }
        Ok(())
    }

    /// Compute the lead field for the current generators.
    ///
    /// Marks the lead field fresh and every downstream stage stale.
    pub fn calculate_lead_field(&mut self) -> Result<&DMatrix<f64>, ModelError> {
        self.require_generators()?;
        let lf = self.head.lead_field(&self.electrodes, &self.generators)?;
        debug!(n_el = lf.nrows(), n_gen = lf.ncols(), "lead field computed");
        self.mean.invalidate();
        self.cov_gen.invalidate();
        self.cov.invalidate();
        Ok(self.lead_field.store(lf))
    }

    fn ensure_lead_field(&mut self) -> Result<(), ModelError> {
        if !self.lead_field.is_fresh() {
            self.calculate_lead_field()?;
        }
        Ok(())
    }

    fn fresh_lead_field(&self) -> Result<&DMatrix<f64>, ModelError> {
        self.lead_field
            .fresh_value()
            .ok_or_else(|| ModelError::InvalidArgument("lead field is not available".to_string()))
    }

    /// `mean = lead_field · magnitudes`.
    pub fn calculate_mean(&mut self) -> Result<&DVector<f64>, ModelError> {
        self.ensure_lead_field()?;
        let magnitudes = DVector::from_iterator(self.n_gen, self.generators.iter().map(|g| g.magnitude));
        let mean = self.fresh_lead_field()? * magnitudes;
        debug!("mean computed");
        Ok(self.mean.store(mean))
    }

    /// Generator covariance: `sigma_g` on the diagonal, `sigma_c` off it.
    ///
    /// Entries whose selector is `none` are zero. Marks the scalp covariance stale.
    pub fn calculate_cov_gen(&mut self) -> Result<&DMatrix<f64>, ModelError> {
        self.ensure_lead_field()?;
        let n = self.n_gen;
        let mut cov_gen = DMatrix::<f64>::zeros(n, n);
        for row in 0..n {
            cov_gen[(row, row)] = self.sigma_g.value_at(row);
            for col in (row + 1)..n {
                let c = self.sigma_c.value_at(row, col);
                cov_gen[(row, col)] = c;
                cov_gen[(col, row)] = c;
            }
        }
        warn_if_correlation_exceeds_one(&cov_gen);
        debug!(n_gen = n, "generator covariance computed");
        self.cov.invalidate();
        Ok(self.cov_gen.store(cov_gen))
    }

    /// `cov = L · cov_gen · Lᵀ + diag(sigma_e)`.
    pub fn calculate_cov(&mut self) -> Result<&DMatrix<f64>, ModelError> {
        self.ensure_lead_field()?;
        if !self.cov_gen.is_fresh() {
            self.calculate_cov_gen()?;
        }
        let lf = self.fresh_lead_field()?;
        let cov_gen = self
            .cov_gen
            .fresh_value()
            .ok_or_else(|| ModelError::InvalidArgument("generator covariance is not available".to_string()))?;

        let mut cov = lf * cov_gen * lf.transpose();
        let n_el = cov.nrows();
        // Mirror the upper triangle so the result is exactly symmetric.
        for row in 0..n_el {
            for col in (row + 1)..n_el {
                cov[(col, row)] = cov[(row, col)];
            }
        }
        let noise = self.sigma_e.diagonal(n_el);
        for i in 0..n_el {
            cov[(i, i)] += noise[i];
        }
        debug!(n_el, electrode_variability = %self.variability.electrodes, "covariance computed");
        Ok(self.cov.store(cov))
    }

    /// Draw `n_sub` subjects from `N(mean, cov)`, computing stale stages first.
    pub fn simulate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<&DMatrix<f64>, ModelError> {
        if !self.mean.is_fresh() {
            self.calculate_mean()?;
        }
        if !self.cov.is_fresh() {
            self.calculate_cov()?;
        }
        let (Some(mean), Some(cov)) = (self.mean.fresh_value(), self.cov.fresh_value()) else {
            return Err(ModelError::InvalidArgument(
                "mean and covariance are not available".to_string(),
            ));
        };
        let data = sample_multivariate_normal(mean, cov, self.n_sub, rng)?;
        debug!(n_sub = self.n_sub, "subjects simulated");
        Ok(self.data.insert(data))
    }

    /// Invalidate every stage, recompute them in dependency order and draw a new sample.
    pub fn recalculate_model<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), ModelError> {
        self.invalidate_all();
        self.calculate_lead_field()?;
        self.calculate_mean()?;
        self.calculate_cov()?;
        self.simulate(rng)?;
        Ok(())
    }
}

/// Log generator pairs whose covariance exceeds what their variances allow.
///
/// Such values are kept as they are; the resulting scalp covariance may then
/// fail to be positive semi-definite.
fn warn_if_correlation_exceeds_one(cov_gen: &DMatrix<f64>) {
    let n = cov_gen.nrows();
    for row in 0..n {
        for col in (row + 1)..n {
            let limit = (cov_gen[(row, row)] * cov_gen[(col, col)]).sqrt();
            let c = cov_gen[(row, col)];
            if c.abs() > limit {
                warn!(row, col, covariance = c, limit, "generator covariance exceeds sqrt(var_i * var_j)");
            }
        }
    }
}
