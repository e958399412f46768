//! Drives a set of detectors through their lifecycle, and accumulates photon
//! batches in parallel.

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use rand::RngCore;
#[cfg(not(feature = "serial"))]
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::Config;
use crate::detector::Detector;
use crate::error::{Result, TallyError};
use crate::io;
use crate::photon::Photon;
use crate::tissue::Tissue;
use crate::utils::group_digits;

/// An ordered set of detectors, handled together.
pub struct DetectorController {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorController {

    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self { Self { detectors } }

    /// Build (but do not initialize) every detector in `config`.
    pub fn from_config(config: &Config) -> Result<Self> { Ok(Self::new(config.build()?)) }

    pub fn detectors(&self) -> &[Box<dyn Detector>] { &self.detectors }

    pub fn detector(&self, name: &str) -> Option<&dyn Detector> {
        self.detectors.iter().find(|d| d.name() == name).map(|d| d.as_ref())
    }

    pub fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        for d in self.detectors.iter_mut() { d.initialize(tissue)? }
        debug!(detectors = self.detectors.len(), regions = tissue.regions().len(), "initialized");
        Ok(())
    }

    /// Offer one completed photon to every detector.
    pub fn tally(&mut self, photon: &Photon, rng: &mut dyn RngCore) -> Result<()> {
        for d in self.detectors.iter_mut() { d.tally(photon, rng)? }
        Ok(())
    }

    pub fn normalize(&mut self, photons: u64) -> Result<()> {
        for d in self.detectors.iter_mut() { d.normalize(photons)? }
        info!(photons = %group_digits(photons), detectors = self.detectors.len(), "normalized");
        Ok(())
    }

    /// Add the accumulated results of `other`, which must hold identically
    /// configured detectors in the same order.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if self.detectors.len() != other.detectors.len() {
            return Err(TallyError::Incompatible {
                this : format!("{} detectors", self.detectors.len()),
                other: format!("{} detectors", other.detectors.len()),
            })
        }
        for (mine, theirs) in self.detectors.iter_mut().zip(&other.detectors) {
            mine.merge(theirs.as_ref())?;
        }
        Ok(())
    }

    /// Write every detector's results into `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        for d in &self.detectors { io::save(d.as_ref(), dir)? }
        Ok(())
    }

    /// Load previously saved, unnormalized, results into freshly initialized
    /// detectors.
    pub fn resume(&mut self, dir: &Path) -> Result<()> {
        for d in self.detectors.iter_mut() { io::resume(d.as_mut(), dir)? }
        Ok(())
    }

    /// Accumulate `batches` of completed photons into detectors built from
    /// `config`.
    ///
    /// Each worker accumulates into its own, independently built, set of
    /// detectors; these are merged at the end. The random number generator
    /// for batch `i` is `make_rng(i)`, so results do not depend on how batches
    /// are distributed among workers. The result is not normalized.
    pub fn tally_batches<R, F>(
        config: &Config,
        tissue: &(dyn Tissue + Sync),
        batches: &[Vec<Photon>],
        make_rng: F,
    ) -> Result<Self>
    where
        R: RngCore,
        F: Fn(usize) -> R + Sync + Send,
    {
        let photons: usize = batches.iter().map(Vec::len).sum();
        info!(batches = batches.len(), photons = %group_digits(photons), "accumulating");

        let progress = ProgressBar::new(batches.len() as u64);
        if let Ok(style) = ProgressStyle::with_template("Tallying batches: [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta_precise})") {
            progress.set_style(style);
        }

        let fresh = || -> Result<Self> {
            let mut controller = Self::from_config(config)?;
            controller.initialize(tissue)?;
            Ok(controller)
        };

        let tally_one_batch = |state: Result<Self>, (i, batch): (usize, &Vec<Photon>)| -> Result<Self> {
            let mut controller = state?;
            let mut rng = make_rng(i);
            for photon in batch { controller.tally(photon, &mut rng)? }
            progress.inc(1);
            Ok(controller)
        };

        // Parallel fold takes a function which will return ID value;
        // serial fold takes the ID value itself.
        #[cfg    (feature = "serial") ] let result = batches.    iter().enumerate().fold(fresh(), tally_one_batch);
        #[cfg(not(feature = "serial"))] let result = batches.par_iter().enumerate()
            .fold(fresh, tally_one_batch)
            // Sum the detectors filled on each thread
            .reduce(fresh, |l, r| {
                let mut l = l?;
                l.merge(&r?)?;
                Ok(l)
            });

        progress.finish_and_clear();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};
    use rand::{rngs::StdRng, SeedableRng};

    use crate::config::DetectorInput;
    use crate::detectors::testing::{exiting, up, Slab};
    use crate::photon::Fate;
    use crate::tally::Phase;
    use crate::weighting::AbsorptionWeighting;

    fn config() -> Config {
        toml::from_str(r#"
            [[detector]]
            type = "RDiffuse"
            [[detector]]
            type = "ROfRho"
            second_moment = true
            rho = { start = "0 mm", stop = "4 mm", bins = 4 }
        "#).unwrap()
    }

    fn photons(n: usize) -> Vec<Photon> {
        (0..n).map(|i| exiting(Fate::ExitedTop, 0.37 * i as f64, 0.0, 0.1 + 0.01 * i as f64, 0.0, up())).collect()
    }

    #[test]
    fn batches_add_up_to_a_single_run() {
        let tissue = Slab::new(AbsorptionWeighting::Discrete);
        let all = photons(12);
        let batches: Vec<Vec<Photon>> = all.chunks(5).map(<[Photon]>::to_vec).collect();

        let mut single = DetectorController::from_config(&config()).unwrap();
        single.initialize(&tissue).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        for p in &all { single.tally(p, &mut rng).unwrap() }

        let batched = DetectorController::tally_batches(&config(), &tissue, &batches, |i| StdRng::seed_from_u64(i as u64)).unwrap();

        for (s, b) in single.detectors().iter().zip(batched.detectors()) {
            assert_eq!(s.tally_count(), b.tally_count());
            assert_eq!(b.phase(), Phase::Accumulating);
            let (s, b) = (s.metadata(), b.metadata());
            assert_eq!(s.tally_count, b.tally_count);
        }
        let r = |c: &DetectorController| match c.detector("ROfRho").unwrap().arrays()[0].data {
            crate::io::ArrayRef::Real(h) => h.data().to_vec(),
            _ => unreachable!(),
        };
        for (s, b) in r(&single).iter().zip(r(&batched)) {
            float_eq::assert_float_eq!(*s, b, rmax <= 1e-12);
        }
    }

    #[test]
    fn merge_needs_matching_detector_sets() {
        let tissue = Slab::new(AbsorptionWeighting::Discrete);
        let mut a = DetectorController::from_config(&config()).unwrap();
        let mut b = DetectorController::new(vec![DetectorInput::ATotal(Default::default()).build().unwrap()]);
        a.initialize(&tissue).unwrap();
        b.initialize(&tissue).unwrap();
        assert!(matches!(a.merge(&b), Err(TallyError::Incompatible { .. })));
    }

    #[test]
    fn lifecycle_runs_through_every_detector() {
        let tissue = Slab::new(AbsorptionWeighting::Discrete);
        let mut c = DetectorController::from_config(&config()).unwrap();
        assert!(c.tally(&photons(1)[0], &mut StdRng::seed_from_u64(0)).is_err());
        c.initialize(&tissue).unwrap();
        c.tally(&photons(2)[1], &mut StdRng::seed_from_u64(0)).unwrap();
        c.normalize(2).unwrap();
        assert!(c.detectors().iter().all(|d| d.phase() == Phase::Normalized));
        assert!(c.normalize(2).is_err());
    }
}
