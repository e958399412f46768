//! Perturbation Monte Carlo: reweighting a photon walked through reference
//! optical properties so that it estimates what would have been detected had
//! some regions had different (perturbed) properties.
//!
//! For each perturbed region `i` the photon's history supplies the number of
//! real collisions `c_i` and the path length `L_i`. The weight factor is
//!
//! ```text
//!   Π_i (musP/musR)^c_i · exp(-(musP - musR)·L_i) · exp(-(muaP - muaR)·L_i)
//! ```
//!
//! The scattering part accounts for the changed collision and free-flight
//! statistics. The absorption part covers whichever way the reference walk
//! attenuated the weight: under discrete weighting the two parts combine to
//! `exp(-(mutP - mutR)·L_i)`; under continuous weighting it replaces the
//! `exp(-muaR·L_i)` already applied along the path.
//!
//! dMC detectors tally the derivative of this factor with respect to one
//! region's `mua` or `mus`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TallyError};
use crate::photon::Photon;
use crate::tissue::{OpticalProperties, Tissue};

/// One region whose optical properties are to be perturbed
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerturbedRegion {
    pub region: usize,
    pub ops: OpticalProperties,
}

/// The optical property with respect to which a dMC derivative is taken
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parameter { Mua, Mus }

#[derive(Clone, Copy, Debug, PartialEq)]
struct Binding {
    region: usize,
    reference: OpticalProperties,
    perturbed: OpticalProperties,
}

/// Perturbed regions bound to the reference properties of a tissue.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PerturbedRegions {
    bindings: Vec<Binding>,
}

impl PerturbedRegions {

    /// Look up the reference properties of every requested region.
    pub fn bind(detector: &str, requested: &[PerturbedRegion], tissue: &dyn Tissue) -> Result<Self> {
        let regions = tissue.regions();
        let bindings = requested.iter()
            .map(|&PerturbedRegion { region, ops }| {
                regions.get(region)
                    .map(|&reference| Binding { region, reference, perturbed: ops })
                    .ok_or(TallyError::NoSuchRegion {
                        detector: detector.into(),
                        region,
                        count: regions.len(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(detector, regions = ?requested.iter().map(|r| r.region).collect::<Vec<_>>(), "perturbed regions bound");
        Ok(Self { bindings })
    }

    pub fn len(&self) -> usize { self.bindings.len() }
    pub fn is_empty(&self) -> bool { self.bindings.is_empty() }

    /// Weight factor converting the reference walk's weight into a
    /// perturbed-medium weight. Exactly 1 when nothing is perturbed.
    pub fn factor(&self, photon: &Photon) -> f64 {
        self.bindings.iter()
            .map(|b| {
                let (c, l) = collisions_and_path(photon, b.region);
                scattering_factor(&b.reference, &b.perturbed, c, l)
                    * absorption_factor(&b.reference, &b.perturbed, l)
            })
            .product()
    }

    /// Derivative of [`factor`](Self::factor) with respect to `parameter` of
    /// the single perturbed region.
    ///
    /// Callers must have bound exactly one region: see
    /// [`require_single_region`].
    pub fn derivative(&self, photon: &Photon, parameter: Parameter) -> f64 {
        let Some(b) = self.bindings.first() else { return 0.0 };
        let (c, l) = collisions_and_path(photon, b.region);
        let factor = self.factor(photon);
        match parameter {
            Parameter::Mua => -l * factor,
            Parameter::Mus => {
                let per_collision = if c > 0 { c as f64 / b.perturbed.mus } else { 0.0 };
                (per_collision - l) * factor
            }
        }
    }
}

/// Analytic derivatives are only available for a single perturbed region.
pub fn require_single_region(detector: &str, requested: &[PerturbedRegion]) -> Result<()> {
    if requested.len() == 1 { Ok(()) }
    else {
        Err(TallyError::MultiRegionDerivative { detector: detector.into(), regions: requested.len() })
    }
}

fn collisions_and_path(photon: &Photon, region: usize) -> (u64, f64) {
    photon.subregions().get(region)
        .map_or((0, 0.0), |info| (info.collisions, info.path_length))
}

/// `(musP/musR)^c · exp(-(musP - musR)·L)`
fn scattering_factor(reference: &OpticalProperties, perturbed: &OpticalProperties, collisions: u64, path: f64) -> f64 {
    let ratio = if collisions > 0 {
        (perturbed.mus / reference.mus).powi(collisions as i32)
    } else { 1.0 };
    ratio * (-(perturbed.mus - reference.mus) * path).exp()
}

/// `exp(-(muaP - muaR)·L)`
fn absorption_factor(reference: &OpticalProperties, perturbed: &OpticalProperties, path: f64) -> f64 {
    (-(perturbed.mua - reference.mua) * path).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photon::{HistoryBuilder, PhotonState};
    use crate::weighting::AbsorptionWeighting;
    use float_eq::assert_float_eq;
    use geometry::{Direction, Position};

    struct Layers(Vec<OpticalProperties>);

    impl Tissue for Layers {
        fn regions(&self) -> &[OpticalProperties] { &self.0 }
        fn region_index(&self, _: &Position) -> usize { 1 }
        fn absorption_weighting(&self) -> AbsorptionWeighting { AbsorptionWeighting::Discrete }
    }

    fn tissue() -> Layers {
        Layers(vec![
            OpticalProperties::new(0.0 , 1e-10, 1.0, 1.0),
            OpticalProperties::new(0.01, 10.0 , 0.8, 1.4),
            OpticalProperties::new(0.0 , 1e-10, 1.0, 1.0),
        ])
    }

    /// A photon with `collisions` collisions and `path` mm travelled in region 1
    fn photon(collisions: u64, path: f64) -> Photon {
        let launch = PhotonState::new(Position::new(0.0, 0.0, 0.0), Direction::default(), 1.0, 0.0, 1);
        let mut builder = HistoryBuilder::new(launch, 3);
        for _ in 0..collisions { builder.record_segment(1, path / collisions as f64, true); }
        builder.finish()
    }

    fn perturb(mua: f64, mus: f64) -> Vec<PerturbedRegion> {
        vec![PerturbedRegion { region: 1, ops: OpticalProperties::new(mua, mus, 0.8, 1.4) }]
    }

    #[test]
    fn unperturbed_factor_is_exactly_one() {
        let regions = PerturbedRegions::bind("pMC", &perturb(0.01, 10.0), &tissue()).unwrap();
        assert_eq!(regions.factor(&photon(7, 3.2)), 1.0);
        let none = PerturbedRegions::bind("pMC", &[], &tissue()).unwrap();
        assert_eq!(none.factor(&photon(7, 3.2)), 1.0);
    }

    #[test]
    fn factor_matches_closed_form() {
        let (c, l): (u64, f64) = (4, 2.0);
        let regions = PerturbedRegions::bind("pMC", &perturb(0.02, 12.0), &tissue()).unwrap();
        let expected = (12.0_f64 / 10.0).powi(4) * (-(12.02 - 10.01) * l).exp();
        assert_float_eq!(regions.factor(&photon(c, l)), expected, rmax <= 1e-12);
    }

    #[test]
    fn derivatives() {
        let (c, l) = (5, 1.5);
        let p = photon(c, l);
        let regions = PerturbedRegions::bind("dMC", &perturb(0.03, 9.0), &tissue()).unwrap();
        let f = regions.factor(&p);
        assert_float_eq!(regions.derivative(&p, Parameter::Mua), -l * f, rmax <= 1e-12);
        assert_float_eq!(regions.derivative(&p, Parameter::Mus), (c as f64 / 9.0 - l) * f, rmax <= 1e-12);

        // Finite-difference check of the mua derivative
        let h = 1e-6;
        let up   = PerturbedRegions::bind("dMC", &perturb(0.03 + h, 9.0), &tissue()).unwrap().factor(&p);
        let down = PerturbedRegions::bind("dMC", &perturb(0.03 - h, 9.0), &tissue()).unwrap().factor(&p);
        assert_float_eq!((up - down) / (2.0 * h), regions.derivative(&p, Parameter::Mua), rmax <= 1e-6);
    }

    #[test]
    fn derivative_needs_exactly_one_region() {
        let two = vec![
            PerturbedRegion { region: 1, ops: OpticalProperties::new(0.0, 1.0, 0.0, 1.0) },
            PerturbedRegion { region: 2, ops: OpticalProperties::new(0.0, 1.0, 0.0, 1.0) },
        ];
        assert!(require_single_region("dMC", &perturb(0.1, 1.0)).is_ok());
        assert!(matches!(require_single_region("dMC", &two),
                         Err(TallyError::MultiRegionDerivative { regions: 2, .. })));
    }

    #[test]
    fn missing_region_is_rejected() {
        let bad = vec![PerturbedRegion { region: 9, ops: OpticalProperties::new(0.0, 1.0, 0.0, 1.0) }];
        assert!(matches!(PerturbedRegions::bind("pMC", &bad, &tissue()),
                         Err(TallyError::NoSuchRegion { region: 9, count: 3, .. })));
    }
}
