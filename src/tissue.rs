//! The narrow view of the tissue that detectors are allowed to see.
//!
//! Geometry, region boundaries and optical properties are owned by the
//! simulation; detectors read the ordered list of regions once, at
//! initialization.

use geometry::Position;
use serde::{Deserialize, Serialize};
use units::todo::{PerLengthf64, Ratiof64};

use crate::weighting::AbsorptionWeighting;

/// Optical properties of one tissue region.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpticalProperties {
    /// Absorption coefficient, 1/mm
    pub mua: PerLengthf64,
    /// Scattering coefficient, 1/mm
    pub mus: PerLengthf64,
    /// Scattering anisotropy
    #[serde(default)]
    pub g: Ratiof64,
    /// Refractive index
    #[serde(default = "default_n")]
    pub n: Ratiof64,
}

fn default_n() -> Ratiof64 { 1.0 }

impl OpticalProperties {
    pub fn new(mua: PerLengthf64, mus: PerLengthf64, g: Ratiof64, n: Ratiof64) -> Self {
        Self { mua, mus, g, n }
    }

    /// Total attenuation coefficient
    pub fn mut_(&self) -> PerLengthf64 { self.mua + self.mus }

    /// Fraction of a collision's weight that is absorbed
    pub fn absorbed_fraction(&self) -> Ratiof64 {
        let mut_ = self.mut_();
        if mut_ > 0.0 { self.mua / mut_ } else { 0.0 }
    }
}

pub trait Tissue {
    /// All regions, including the ambient medium above and below, in region
    /// index order.
    fn regions(&self) -> &[OpticalProperties];

    /// Index of the region containing `position`
    fn region_index(&self, position: &Position) -> usize;

    /// How the random walk handled absorption in this run
    fn absorption_weighting(&self) -> AbsorptionWeighting;
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;

    #[test]
    fn absorbed_fraction() {
        let ops = OpticalProperties::new(0.01, 0.99, 0.8, 1.4);
        assert_float_eq!(ops.absorbed_fraction(), 0.01, ulps <= 1);
        let vacuum = OpticalProperties::new(0.0, 0.0, 0.0, 1.0);
        assert_eq!(vacuum.absorbed_fraction(), 0.0);
    }

    #[test]
    fn parse_with_defaults() {
        let ops: OpticalProperties = toml::from_str("mua = 0.01\nmus = 10.0").unwrap();
        assert_eq!(ops, OpticalProperties::new(0.01, 10.0, 0.0, 1.0));
    }
}
