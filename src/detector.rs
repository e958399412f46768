//! The contract between the simulator and every detector.

use rand::RngCore;
use tracing::debug;

use crate::config::DetectorInput;
use crate::error::{Result, TallyError};
use crate::io::{BinaryArray, BinaryArrayMut, Metadata};
use crate::photon::{Photon, PhotonState};
use crate::tally::Phase;
use crate::tissue::Tissue;

/// A statistic accumulated over many photons.
///
/// Lifecycle: built from a [`DetectorInput`]; `initialize` once; `tally`
/// once per completed photon; `normalize` once, with the total number of
/// photons launched; then the arrays are read out through `serializers`.
/// Each instance is mutated by one thread at a time; parallel runs give each
/// worker its own set and [`merge`](Detector::merge) them before
/// normalizing.
pub trait Detector: Send {

    fn name(&self) -> &str;

    /// The configuration this detector was built from
    fn input(&self) -> DetectorInput;

    /// Allocate arrays and bind whatever the detector needs from the tissue.
    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()>;

    /// Accumulate the contributions of one completed photon. Random numbers
    /// are only drawn by detectors that classify events stochastically.
    fn tally(&mut self, photon: &Photon, rng: &mut dyn RngCore) -> Result<()>;

    /// Convert accumulated sums into per-photon densities.
    fn normalize(&mut self, photons: u64) -> Result<()>;

    /// Every array, scalars included, principal array first.
    fn arrays(&self) -> Vec<BinaryArray<'_>>;

    /// The same arrays as [`arrays`](Detector::arrays), in the same order,
    /// open for writing.
    fn arrays_mut(&mut self) -> Vec<BinaryArrayMut<'_>>;

    fn phase(&self) -> Phase;

    /// Number of nonzero contributions recorded
    fn tally_count(&self) -> u64;

    /// Account for contributions summed into the arrays from elsewhere
    fn add_tally_count(&mut self, count: u64);

    /// Arrays to be written to binary sidecar files. Scalar results are
    /// reported in the metadata instead, so detectors whose only outputs are
    /// scalars have nothing to serialize.
    fn serializers(&self) -> Vec<BinaryArray<'_>> {
        self.arrays().into_iter()
            .filter(|a| !a.is_scalar())
            .collect()
    }

    fn is_within_detector_aperture(&self, _photon: &Photon) -> bool { true }

    fn contains_point(&self, _state: &PhotonState) -> bool { true }

    /// Add the arrays and tally count of `other`, an identically configured
    /// detector that accumulated a different batch of photons.
    fn merge(&mut self, other: &dyn Detector) -> Result<()> {
        let incompatible = || TallyError::Incompatible {
            this: self.name().to_string(),
            other: other.name().to_string(),
        };
        if self.input() != other.input() { return Err(incompatible()) }
        let not_accumulating = |name: &str, operation, phase| TallyError::Phase { detector: name.into(), operation, phase };
        if self.phase() != Phase::Accumulating {
            return Err(not_accumulating(self.name(), "merge", self.phase()))
        }
        if other.phase() != Phase::Accumulating {
            return Err(not_accumulating(other.name(), "be merged", other.phase()))
        }
        let error = incompatible();
        {
            let theirs = other.arrays();
            let mut mine = self.arrays_mut();
            if mine.len() != theirs.len() { return Err(error) }
            for (m, t) in mine.iter_mut().zip(&theirs) {
                if m.name != t.name { return Err(error) }
                m.merge(t)?;
            }
        }
        self.add_tally_count(other.tally_count());
        debug!(detector = self.name(), count = other.tally_count(), "merged");
        Ok(())
    }

    /// Description of the detector and its outputs, as written next to the
    /// binary arrays.
    fn metadata(&self) -> Metadata { Metadata::of(self) }
}

/// Which tissue surface a surface detector watches
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Surface {
    /// Reflectance: photons leaving through the top
    Top,
    /// Transmittance: photons leaving through the bottom
    Bottom,
}

impl Surface {
    pub fn exits(self, state: &PhotonState) -> bool {
        match self {
            Surface::Top    => state.exited_top(),
            Surface::Bottom => state.exited_bottom(),
        }
    }

    /// Index of the ambient region a photon leaving through this surface
    /// ends up in.
    pub fn exterior_region(self, tissue: &dyn Tissue) -> usize {
        match self {
            Surface::Top    => 0,
            Surface::Bottom => tissue.regions().len().saturating_sub(1),
        }
    }
}

/// Accepts photons leaving through one surface within a numerical aperture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceGate {
    surface: Surface,
    na: Option<f64>,
    /// Refractive index of the medium outside the surface
    n: f64,
}

impl SurfaceGate {
    pub fn new(surface: Surface, na: Option<f64>) -> Self { Self { surface, na, n: 1.0 } }

    pub fn surface(&self) -> Surface { self.surface }

    pub fn bind(&mut self, tissue: &dyn Tissue) {
        let exterior = self.surface.exterior_region(tissue);
        self.n = tissue.regions().get(exterior).map_or(1.0, |ops| ops.n);
    }

    /// `n sin θ <= NA`, where `θ` is the exit angle to the surface normal
    pub fn within_na(&self, state: &PhotonState) -> bool {
        let Some(na) = self.na else { return true };
        let uz = state.direction.uz;
        let sin_theta = (1.0 - uz * uz).max(0.0).sqrt();
        self.n * sin_theta <= na
    }

    /// The terminal state, if the photon left through this gate
    pub fn accept<'p>(&self, photon: &'p Photon) -> Option<&'p PhotonState> {
        let terminal = photon.terminal();
        (self.surface.exits(terminal) && self.within_na(terminal)).then_some(terminal)
    }
}

/// Implements the [`Detector`] methods which merely delegate to a `tally`
/// field and a `name` field.
macro_rules! delegate_to_tally {
    () => {
        fn name(&self) -> &str { &self.name }
        fn phase(&self) -> $crate::tally::Phase { self.tally.phase() }
        fn tally_count(&self) -> u64 { self.tally.tally_count() }
        fn add_tally_count(&mut self, count: u64) { self.tally.add_tally_count(count) }
    };
}
pub(crate) use delegate_to_tally;
