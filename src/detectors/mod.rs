//! The detector families.
//!
//! + [`surface`]: photons leaving through the top or bottom surface
//! + [`volume`]: weight deposited, and fluence, inside the tissue
//! + [`perturbation`]: perturbation Monte Carlo reflectance and its derivatives
//! + [`momentum`]: momentum transfer of detected photons, split into static
//!   and dynamic scattering
//! + [`time`]: time of flight of detected photons, split by region

pub mod momentum;
pub mod perturbation;
pub mod surface;
pub mod time;
pub mod volume;

use crate::config::DetectorInput;
use crate::detector::{Surface, SurfaceGate};
use crate::error::{Result, TallyError};

/// A gate on `surface`, after checking the configured numerical aperture.
pub(crate) fn gate(detector: &str, surface: Surface, na: Option<f64>) -> Result<SurfaceGate> {
    match na {
        Some(na) if !(na > 0.0) => Err(TallyError::Config(
            format!("{detector}: numerical aperture must be positive, not {na}"))),
        _ => Ok(SurfaceGate::new(surface, na)),
    }
}

/// The reflectance or transmittance flavour of `input`
pub(crate) fn sided<I: Clone>(
    surface: Surface,
    reflected: fn(I) -> DetectorInput,
    transmitted: fn(I) -> DetectorInput,
    input: &I,
) -> DetectorInput {
    match surface {
        Surface::Top    => reflected  (input.clone()),
        Surface::Bottom => transmitted(input.clone()),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Hand-made tissues and photons for exercising detectors.

    use geometry::{Direction, Position};
    use rand::{rngs::StdRng, SeedableRng};

    use crate::photon::{Fate, HistoryBuilder, Photon, PhotonState};
    use crate::tissue::{OpticalProperties, Tissue};
    use crate::weighting::AbsorptionWeighting;

    /// Air above and below a single slab, which occupies `0 <= z < thickness`
    pub struct Slab {
        pub regions: Vec<OpticalProperties>,
        pub thickness: f64,
        pub weighting: AbsorptionWeighting,
    }

    impl Slab {
        pub fn new(weighting: AbsorptionWeighting) -> Self {
            Self {
                regions: vec![
                    OpticalProperties::new(0.0 , 1e-10, 1.0, 1.0),
                    OpticalProperties::new(0.01, 1.0  , 0.8, 1.4),
                    OpticalProperties::new(0.0 , 1e-10, 1.0, 1.0),
                ],
                thickness: 100.0,
                weighting,
            }
        }
    }

    impl Tissue for Slab {
        fn regions(&self) -> &[OpticalProperties] { &self.regions }
        fn region_index(&self, p: &Position) -> usize {
            if p.z < 0.0 { 0 } else if p.z < self.thickness { 1 } else { 2 }
        }
        fn absorption_weighting(&self) -> AbsorptionWeighting { self.weighting }
    }

    pub fn state(x: f64, y: f64, z: f64, weight: f64) -> PhotonState {
        PhotonState::new(Position::new(x, y, z), Direction::default(), weight, 0.0, 1)
    }

    /// A photon launched at the origin which leaves through `fate`'s surface
    /// at `(x, y)` with weight `w`, at time `t`, travelling along `direction`.
    pub fn exiting(fate: Fate, x: f64, y: f64, w: f64, t: f64, direction: Direction) -> Photon {
        let z = if fate == Fate::ExitedBottom { 100.0 } else { 0.0 };
        let region = if fate == Fate::ExitedBottom { 2 } else { 0 };
        let exit = PhotonState::new(Position::new(x, y, z), direction, w, t, region).with_fate(fate);
        let mut builder = HistoryBuilder::new(state(0.0, 0.0, 0.0, 1.0), 3);
        builder.record_segment(1, 1.0, false).push(exit);
        builder.finish()
    }

    /// Straight up, out of the top surface
    pub fn up() -> Direction { Direction::new(0.0, 0.0, -1.0) }

    pub fn rng() -> StdRng { StdRng::seed_from_u64(1234) }
}
