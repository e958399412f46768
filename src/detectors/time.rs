//! Time of flight of reflected photons, and how it is shared among tissue
//! regions.

use rand::RngCore;
use tracing::debug;

use units::{mm_ns_, C};

use crate::axis::{shape_of, Axis};
use crate::config::{DetectorInput, TimeSubregionInput};
use crate::detector::{delegate_to_tally, Detector, Surface, SurfaceGate};
use crate::detectors::gate;
use crate::error::Result;
use crate::histogram::Histogram;
use crate::io::{tally_arrays, tally_arrays_mut, ArrayMut, ArrayRef, BinaryArray, BinaryArrayMut};
use crate::normalize;
use crate::photon::Photon;
use crate::tally::{Accumulation, Tally};
use crate::tissue::Tissue;

/// `Mean[rho, time]` holds reflected weight by exit time.
/// `FractionalTime[rho, time, region]` holds the same weight, shared among
/// regions in proportion to the time spent in each.
pub struct TimeOfRhoAndSubregionHist {
    name: String,
    gate: SurfaceGate,
    input: TimeSubregionInput,
    rho: Axis,
    time: Axis,
    /// Refractive index of each region
    n: Vec<f64>,
    tally: Tally<f64>,
    fractional_time: Histogram<f64>,
}

impl TimeOfRhoAndSubregionHist {
    pub fn new(name: String, input: TimeSubregionInput) -> Result<Self> {
        let gate = gate(&name, Surface::Top, input.na)?;
        let rho  = input.rho .axis("rho" )?;
        let time = input.time.axis("time")?;
        let tally = Tally::configure(&name, shape_of(&[&rho, &time]), input.second_moment, Accumulation::Terminal);
        // The region count is only known once the tissue is
        let fractional_time = Histogram::unallocated(vec![rho.bin_count(), time.bin_count(), 0]);
        Ok(Self { name, gate, input, rho, time, n: vec![], tally, fractional_time })
    }
}

impl Detector for TimeOfRhoAndSubregionHist {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput { DetectorInput::ReflectedTimeOfRhoAndSubregionHist(self.input.clone()) }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        self.tally.allocate()?;
        self.gate.bind(tissue);
        self.n = tissue.regions().iter().map(|ops| ops.n).collect();
        let regions = self.n.len();
        self.fractional_time = Histogram::zeros(vec![self.rho.bin_count(), self.time.bin_count(), regions]);
        debug!(detector = %self.name, regions, "subregion time bound");
        Ok(())
    }

    fn tally(&mut self, photon: &Photon, _: &mut dyn RngCore) -> Result<()> {
        let mut acc = self.tally.accumulate()?;
        let Some(dp) = self.gate.accept(photon) else { return Ok(()) };
        let (Some(ir), Some(it)) = (self.rho.which_bin(dp.position.rho()), self.time.which_bin(dp.time)) else {
            return Ok(())
        };
        acc.add(&[ir, it], dp.weight);

        let c = mm_ns_(C);
        let times: Vec<f64> = photon.subregions().iter().zip(&self.n)
            .map(|(info, n)| info.path_length * n / c)
            .collect();
        let total: f64 = times.iter().sum();
        if total > 0.0 {
            for (region, t) in times.into_iter().enumerate() {
                self.fractional_time.add(&[ir, it, region], dp.weight * t / total);
            }
        }
        Ok(())
    }

    fn normalize(&mut self, photons: u64) -> Result<()> {
        let (rho, dt) = (self.rho, normalize::width(&self.time));
        self.tally.normalize(photons, |i| normalize::ring(&rho, i[0]) * dt)?;
        let n = photons as f64;
        self.fractional_time.divide_by(|i| normalize::ring(&rho, i[0]) * dt * n);
        Ok(())
    }

    fn arrays(&self) -> Vec<BinaryArray<'_>> {
        let mut arrays = tally_arrays(&self.tally);
        arrays.push(BinaryArray { name: "FractionalTime", file_tag: "_FractionalTime", data: ArrayRef::Real(&self.fractional_time) });
        arrays
    }

    fn arrays_mut(&mut self) -> Vec<BinaryArrayMut<'_>> {
        let mut arrays = tally_arrays_mut(&mut self.tally);
        arrays.push(BinaryArrayMut { name: "FractionalTime", file_tag: "_FractionalTime", data: ArrayMut::Real(&mut self.fractional_time) });
        arrays
    }

    fn is_within_detector_aperture(&self, photon: &Photon) -> bool { self.gate.accept(photon).is_some() }
}
