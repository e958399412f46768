//! Momentum transfer of detected photons, for dynamic light scattering.
//!
//! At every real collision a photon changes direction by some angle θ and
//! picks up a momentum transfer `1 - cos θ`. Each collision is classified as
//! being with a moving scatterer (blood) or a static one, by a Bernoulli
//! draw against the blood volume fraction of the region in which it
//! happened. Only photons that leave through the detector's surface are
//! tallied.
//!
//! Arrays
//!
//! + `Mean[rho, mt]`: detected weight, by total momentum transfer
//! + `DynamicMTOfZ[rho, z]`, `TotalMTOfZ[rho, z]`: weighted momentum
//!   transfer picked up at each depth, from moving and from all scatterers
//! + `SubregionCollisions[region, 2]`: static and dynamic collision counts
//!
//! A photon whose exit `rho` or total momentum transfer lies off its axis
//! contributes to none of them.
//! + `FractionalMT[rho, mt, fractional_mt_bins + 2]`: detected weight, by
//!   the fraction of the momentum transfer which is dynamic. The first and
//!   last bins are reserved for fractions of exactly 0 and exactly 1.

use rand::distributions::{Bernoulli, Distribution};
use rand::RngCore;
use tracing::debug;

use crate::axis::{shape_of, which_bin, Axis};
use crate::config::{DetectorInput, MomentumTransferInput};
use crate::detector::{delegate_to_tally, Detector, Surface, SurfaceGate};
use crate::detectors::{gate, sided};
use crate::error::{Result, TallyError};
use crate::histogram::Histogram;
use crate::io::{tally_arrays, tally_arrays_mut, ArrayMut, ArrayRef, BinaryArray, BinaryArrayMut};
use crate::normalize;
use crate::photon::Photon;
use crate::tally::{Accumulation, Tally};
use crate::tissue::Tissue;
use crate::weighting::{is_collision, AbsorptionWeighting};

pub struct MTOfRhoAndSubregionHist {
    name: String,
    gate: SurfaceGate,
    input: MomentumTransferInput,
    rho: Axis,
    z: Axis,
    mt: Axis,
    fractional_bins: usize,
    /// Per region: is a collision with a moving scatterer?
    moving: Vec<Bernoulli>,
    tally: Tally<f64>,
    dynamic_mt_of_z: Histogram<f64>,
    total_mt_of_z: Histogram<f64>,
    subregion_collisions: Histogram<f64>,
    fractional_mt: Histogram<f64>,
}

impl MTOfRhoAndSubregionHist {
    pub fn new(name: String, surface: Surface, input: MomentumTransferInput) -> Result<Self> {
        let gate = gate(&name, surface, input.na)?;
        let rho = input.rho.axis("rho")?;
        let z   = input.z  .axis("z"  )?;
        let mt  = input.mt .axis("mt" )?;
        let fractional_bins = input.fractional_mt_bins;
        if fractional_bins == 0 {
            return Err(TallyError::Config(format!("{name}: fractional_mt_bins must be at least 1")))
        }
        let moving = input.blood_volume_fraction.iter()
            .map(|&p| Bernoulli::new(p).map_err(|_| TallyError::Config(
                format!("{name}: blood volume fraction {p} is not a probability"))))
            .collect::<Result<Vec<_>>>()?;
        let regions = moving.len();
        let tally = Tally::configure(&name, shape_of(&[&rho, &mt]), input.second_moment, Accumulation::Terminal);
        Ok(Self {
            name, gate, rho, z, mt, fractional_bins, moving, tally,
            dynamic_mt_of_z     : Histogram::unallocated(shape_of(&[&rho, &z])),
            total_mt_of_z       : Histogram::unallocated(shape_of(&[&rho, &z])),
            subregion_collisions: Histogram::unallocated(vec![regions, 2]),
            fractional_mt       : Histogram::unallocated(vec![rho.bin_count(), mt.bin_count(), fractional_bins + 2]),
            input,
        })
    }
}

/// Bin of the fractional-MT axis holding `dynamic / total`
fn fraction_bin(dynamic: f64, total: f64, bins: usize) -> usize {
    if dynamic <= 0.0 || total <= 0.0 { return 0 }
    if dynamic >= total               { return bins + 1 }
    let delta = 1.0 / bins as f64;
    which_bin(dynamic / total, bins, delta, 0.0).map_or(bins, |i| i + 1)
}

impl Detector for MTOfRhoAndSubregionHist {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput {
        sided(self.gate.surface(),
              DetectorInput::ReflectedMTOfRhoAndSubregionHist,
              DetectorInput::TransmittedMTOfRhoAndSubregionHist,
              &self.input)
    }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        let weighting = tissue.absorption_weighting();
        if weighting != AbsorptionWeighting::Discrete {
            return Err(TallyError::Unsupported {
                detector: self.name.clone(),
                reason: format!("momentum transfer needs discrete absorption weighting, not {weighting:?}"),
            })
        }
        let regions = tissue.regions().len();
        if self.moving.len() != regions {
            return Err(TallyError::Unsupported {
                detector: self.name.clone(),
                reason: format!("{} blood volume fractions given for {regions} tissue regions", self.moving.len()),
            })
        }
        self.gate.bind(tissue);
        self.tally.allocate()?;
        self.dynamic_mt_of_z     .allocate();
        self.total_mt_of_z       .allocate();
        self.subregion_collisions.allocate();
        self.fractional_mt       .allocate();
        debug!(detector = %self.name, regions, "momentum transfer classification bound");
        Ok(())
    }

    fn tally(&mut self, photon: &Photon, rng: &mut dyn RngCore) -> Result<()> {
        let mut acc = self.tally.accumulate()?;
        let Some(dp) = self.gate.accept(photon) else { return Ok(()) };
        let Some(ir) = self.rho.which_bin(dp.position.rho()) else { return Ok(()) };
        let weight = dp.weight;
        // Held back until the total momentum transfer is known to be on the mt axis
        let mut collisions = vec![];
        let (mut total, mut dynamic) = (0.0, 0.0);
        for (prev, curr) in photon.segments() {
            if !is_collision(prev, curr) { continue }
            let Some(moving) = self.moving.get(curr.region) else { continue };
            let mt = prev.direction.momentum_transfer(&curr.direction);
            let is_dynamic = moving.sample(&mut *rng);
            total += mt;
            if is_dynamic { dynamic += mt }
            collisions.push((curr.region, is_dynamic, self.z.which_bin(curr.position.z), mt));
        }
        let Some(imt) = self.mt.which_bin(total) else { return Ok(()) };
        acc.add(&[ir, imt], weight);
        let ifr = fraction_bin(dynamic, total, self.fractional_bins);
        self.fractional_mt.add(&[ir, imt, ifr], weight);
        for (region, is_dynamic, iz, mt) in collisions {
            self.subregion_collisions.add(&[region, is_dynamic as usize], 1.0);
            if let Some(iz) = iz {
                self.total_mt_of_z.add(&[ir, iz], weight * mt);
                if is_dynamic { self.dynamic_mt_of_z.add(&[ir, iz], weight * mt) }
            }
        }
        Ok(())
    }

    fn normalize(&mut self, photons: u64) -> Result<()> {
        let (rho, dz, dmt) = (self.rho, normalize::width(&self.z), normalize::width(&self.mt));
        self.tally.normalize(photons, |i| normalize::ring(&rho, i[0]) * dmt)?;
        let n = photons as f64;
        self.dynamic_mt_of_z     .divide_by(|i| normalize::ring(&rho, i[0]) * dz * n);
        self.total_mt_of_z       .divide_by(|i| normalize::ring(&rho, i[0]) * dz * n);
        self.subregion_collisions.divide_by(|_| n);
        self.fractional_mt       .divide_by(|i| normalize::ring(&rho, i[0]) * dmt * n);
        Ok(())
    }

    fn arrays(&self) -> Vec<BinaryArray<'_>> {
        let mut arrays = tally_arrays(&self.tally);
        arrays.extend([
            BinaryArray { name: "DynamicMTOfZ"       , file_tag: "_DynamicMTOfZ"       , data: ArrayRef::Real(&self.dynamic_mt_of_z)      },
            BinaryArray { name: "TotalMTOfZ"         , file_tag: "_TotalMTOfZ"         , data: ArrayRef::Real(&self.total_mt_of_z)        },
            BinaryArray { name: "SubregionCollisions", file_tag: "_SubregionCollisions", data: ArrayRef::Real(&self.subregion_collisions) },
            BinaryArray { name: "FractionalMT"       , file_tag: "_FractionalMT"       , data: ArrayRef::Real(&self.fractional_mt)        },
        ]);
        arrays
    }

    fn arrays_mut(&mut self) -> Vec<BinaryArrayMut<'_>> {
        let mut arrays = tally_arrays_mut(&mut self.tally);
        arrays.extend([
            BinaryArrayMut { name: "DynamicMTOfZ"       , file_tag: "_DynamicMTOfZ"       , data: ArrayMut::Real(&mut self.dynamic_mt_of_z)      },
            BinaryArrayMut { name: "TotalMTOfZ"         , file_tag: "_TotalMTOfZ"         , data: ArrayMut::Real(&mut self.total_mt_of_z)        },
            BinaryArrayMut { name: "SubregionCollisions", file_tag: "_SubregionCollisions", data: ArrayMut::Real(&mut self.subregion_collisions) },
            BinaryArrayMut { name: "FractionalMT"       , file_tag: "_FractionalMT"       , data: ArrayMut::Real(&mut self.fractional_mt)        },
        ]);
        arrays
    }

    fn is_within_detector_aperture(&self, photon: &Photon) -> bool { self.gate.accept(photon).is_some() }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};
    use geometry::{Direction, Position};
    use rstest::rstest;
    use units::mm;

    use crate::config::AxisInput;
    use crate::detectors::testing::{rng, Slab};
    use crate::photon::{Fate, HistoryBuilder, PhotonState};

    fn input(blood: f64) -> MomentumTransferInput {
        MomentumTransferInput {
            name: None, second_moment: true, na: None,
            blood_volume_fraction: vec![0.0, blood, 0.0],
            fractional_mt_bins: 4,
            rho: AxisInput::new(mm(0.0), mm(2.0), 2),
            z  : AxisInput::new(mm(0.0), mm(2.0), 2),
            mt : AxisInput::new(0.0, 4.0, 4),
        }
    }

    fn at(x: f64, z: f64, direction: Direction, weight: f64) -> PhotonState {
        PhotonState::new(Position::new(x, 0.0, z), direction, weight, 0.0, 1)
    }

    /// Two right-angle collisions at depth 1 mm, then out of the top at x = 1
    fn two_right_angles() -> Photon {
        let (down, right, up) = (Direction::new(0.0, 0.0, 1.0), Direction::new(1.0, 0.0, 0.0), Direction::new(0.0, 0.0, -1.0));
        let mut exit = at(1.0, 0.0, up, 0.81).with_fate(Fate::ExitedTop);
        exit.region = 0;
        let mut b = HistoryBuilder::new(at(0.0, 0.0, down, 1.0), 3);
        b.record_segment(1, 1.0, true ).push(at(0.0, 1.0, right, 0.9 ))
         .record_segment(1, 1.0, true ).push(at(1.0, 1.0, up   , 0.81))
         .record_segment(1, 1.0, false).push(exit);
        b.finish()
    }

    fn ready(blood: f64) -> MTOfRhoAndSubregionHist {
        let mut d = MTOfRhoAndSubregionHist::new("MT".into(), Surface::Top, input(blood)).unwrap();
        d.initialize(&Slab::new(AbsorptionWeighting::Discrete)).unwrap();
        d
    }

    fn array<'d>(d: &'d MTOfRhoAndSubregionHist, name: &str) -> &'d Histogram<f64> {
        match d.arrays().into_iter().find(|a| a.name == name).map(|a| a.data) {
            Some(ArrayRef::Real(h)) => h,
            _ => panic!("no real array called {name}"),
        }
    }

    #[rstest(/**/ dynamic, total, expected,
             case(0.0    , 2.0  , 0),
             case(0.0    , 0.0  , 0),
             case(2.0    , 2.0  , 5),
             case(0.1    , 2.0  , 1),
             case(1.0    , 2.0  , 3),
             case(1.99   , 2.0  , 4),
    )]
    fn fractions_of_exactly_zero_and_one_have_their_own_bins(dynamic: f64, total: f64, expected: usize) {
        assert_eq!(fraction_bin(dynamic, total, 4), expected);
    }

    #[test]
    fn all_static() {
        let mut d = ready(0.0);
        d.tally(&two_right_angles(), &mut rng()).unwrap();
        // Total MT of 2 lies in mt bin 2; exit rho of 1 in rho bin 1
        assert_eq!(array(&d, "Mean")[&[1, 2][..]], 0.81);
        assert_eq!(array(&d, "SubregionCollisions").data(), &[0.0, 0.0, 2.0, 0.0, 0.0, 0.0]);
        assert_eq!(array(&d, "TotalMTOfZ")[&[1, 1][..]], 0.81 * 2.0);
        assert_eq!(array(&d, "DynamicMTOfZ").data().iter().sum::<f64>(), 0.0);
        assert_eq!(array(&d, "FractionalMT")[&[1, 2, 0][..]], 0.81);
    }

    #[test]
    fn all_dynamic() {
        let mut d = ready(1.0);
        d.tally(&two_right_angles(), &mut rng()).unwrap();
        assert_eq!(array(&d, "SubregionCollisions").data(), &[0.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
        assert_eq!(array(&d, "DynamicMTOfZ")[&[1, 1][..]], 0.81 * 2.0);
        assert_eq!(array(&d, "FractionalMT")[&[1, 2, 5][..]], 0.81);
    }

    #[test]
    fn photons_beyond_the_mt_axis_leave_every_array_untouched() {
        let mut narrow = input(0.5);
        narrow.mt = AxisInput::new(0.0, 1.5, 3);
        let mut d = MTOfRhoAndSubregionHist::new("MT".into(), Surface::Top, narrow).unwrap();
        d.initialize(&Slab::new(AbsorptionWeighting::Discrete)).unwrap();
        // Total MT of 2 is off the axis
        d.tally(&two_right_angles(), &mut rng()).unwrap();
        assert_eq!(d.tally_count(), 0);
        for name in ["Mean", "DynamicMTOfZ", "TotalMTOfZ", "SubregionCollisions", "FractionalMT"] {
            assert!(array(&d, name).data().iter().all(|&v| v == 0.0), "{name}");
        }
    }

    #[test]
    fn needs_discrete_weighting() {
        let mut d = MTOfRhoAndSubregionHist::new("MT".into(), Surface::Top, input(0.5)).unwrap();
        let r = d.initialize(&Slab::new(AbsorptionWeighting::Continuous));
        assert!(matches!(r, Err(TallyError::Unsupported { .. })));
    }

    #[test]
    fn blood_fractions_must_be_probabilities_for_every_region() {
        let mut bad = input(0.5);
        bad.blood_volume_fraction[1] = 1.5;
        assert!(matches!(MTOfRhoAndSubregionHist::new("MT".into(), Surface::Top, bad), Err(TallyError::Config(_))));

        let mut short = input(0.5);
        short.blood_volume_fraction.pop();
        let mut d = MTOfRhoAndSubregionHist::new("MT".into(), Surface::Top, short).unwrap();
        assert!(d.initialize(&Slab::new(AbsorptionWeighting::Discrete)).is_err());
    }

    #[test]
    fn transmitted_photons_are_ignored_by_reflectance() {
        let mut d = ready(0.5);
        let mut b = HistoryBuilder::new(at(0.0, 0.0, Direction::default(), 1.0), 3);
        b.record_segment(1, 1.0, true).push(at(0.0, 1.0, Direction::new(1.0, 0.0, 0.0), 0.9))
         .push(at(0.5, 100.0, Direction::default(), 0.9).with_fate(Fate::ExitedBottom));
        d.tally(&b.finish(), &mut rng()).unwrap();
        assert_eq!(d.tally_count(), 0);
        assert_eq!(array(&d, "SubregionCollisions").data().iter().sum::<f64>(), 0.0);
    }

    #[test]
    fn every_array_is_listed_for_writing() {
        let d = ready(0.5);
        let names: Vec<_> = d.serializers().iter().map(|a| a.name).collect();
        assert_eq!(names, ["Mean", "SecondMoment", "DynamicMTOfZ", "TotalMTOfZ", "SubregionCollisions", "FractionalMT"]);
    }
}
