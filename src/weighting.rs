//! How much weight an interaction deposits, under each of the three ways a
//! random walk may account for absorption.
//!
//! The mode is a property of the whole run: it is read from the tissue once
//! and bound into every volume detector at initialization.

use geometry::Position;
use serde::{Deserialize, Serialize};
use units::todo::Weightf64;

use crate::photon::{Fate, PhotonState};
use crate::tissue::OpticalProperties;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbsorptionWeighting {
    /// Weight is deposited whole, when the photon dies by absorption
    Analog,
    /// A fraction `mua/(mua+mus)` of the weight is deposited at every collision
    Discrete,
    /// Weight is attenuated continuously along every path segment
    Continuous,
}

impl AbsorptionWeighting {

    /// Weight deposited on the way from `prev` to `curr`, given the optical
    /// properties of all regions.
    ///
    /// + Analog: all of `prev`'s weight, if `curr` is an absorption.
    /// + Discrete: `prev.weight * mua/(mua+mus)` of `curr`'s region, if `curr`
    ///   is a real collision (see [`is_collision`]).
    /// + Continuous: `prev.weight * (1 - exp(-mua ds))` for the segment of
    ///   length `ds`, in `prev`'s region.
    pub fn deposited(self, prev: &PhotonState, curr: &PhotonState, regions: &[OpticalProperties]) -> Weightf64 {
        use AbsorptionWeighting::*;
        match self {
            Analog => {
                if curr.fate == Fate::Absorbed { prev.weight } else { 0.0 }
            }
            Discrete => {
                if !is_collision(prev, curr) { return 0.0 }
                regions.get(curr.region)
                    .map_or(0.0, |ops| prev.weight * ops.absorbed_fraction())
            }
            Continuous => {
                let ds = prev.position.distance_to(&curr.position);
                regions.get(prev.region)
                    .map_or(0.0, |ops| prev.weight * (1.0 - (-ops.mua * ds).exp()))
            }
        }
    }

    /// Region whose absorption coefficient determined the deposit made on
    /// the way from `prev` to `curr`.
    pub fn deposit_region(self, prev: &PhotonState, curr: &PhotonState) -> usize {
        match self {
            AbsorptionWeighting::Continuous => prev.region,
            _                               => curr.region,
        }
    }

    /// Where a deposit made on the way from `prev` to `curr` is binned: at the
    /// collision for Analog and Discrete, at the middle of the segment for
    /// Continuous.
    pub fn tally_point(self, prev: &PhotonState, curr: &PhotonState) -> Position {
        match self {
            AbsorptionWeighting::Continuous => {
                let (p, q) = (prev.position, curr.position);
                Position::new((p.x + q.x) / 2.0, (p.y + q.y) / 2.0, (p.z + q.z) / 2.0)
            }
            _ => curr.position,
        }
    }
}

/// A real collision changes the photon's weight; boundary interactions
/// (reflection, refraction, crossing into another region) leave it unchanged.
/// Terminal states are never collisions.
#[inline]
pub fn is_collision(prev: &PhotonState, curr: &PhotonState) -> bool {
    curr.fate == Fate::Alive && curr.weight != prev.weight
}
