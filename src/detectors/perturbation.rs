//! Reflectance reweighted for perturbed optical properties (pMC), and its
//! derivatives with respect to one region's `mua` or `mus` (dMC).

use rand::RngCore;

use crate::axis::{shape_of, Axis};
use crate::config::{DetectorInput, PerturbedRhoAndTimeInput, PerturbedRhoInput};
use crate::detector::{delegate_to_tally, Detector, Surface, SurfaceGate};
use crate::detectors::gate;
use crate::error::Result;
use crate::io::{tally_arrays, tally_arrays_mut, BinaryArray, BinaryArrayMut};
use crate::normalize;
use crate::perturbation::{require_single_region, Parameter, PerturbedRegions};
use crate::photon::Photon;
use crate::tally::{Accumulation, Tally};
use crate::tissue::Tissue;

/// What a pMC reflectance detector estimates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RhoEstimate {
    /// Reflectance in the perturbed medium
    Perturbed,
    /// Derivative of the reflectance with respect to the perturbed region's
    /// parameter
    Derivative(Parameter),
}

/// `pMCROfRho`, `dMCdROfRhodMua` and `dMCdROfRhodMus`
pub struct PMCROfRho {
    name: String,
    estimate: RhoEstimate,
    gate: SurfaceGate,
    input: PerturbedRhoInput,
    rho: Axis,
    regions: PerturbedRegions,
    tally: Tally<f64>,
}

impl PMCROfRho {
    pub fn new(name: String, estimate: RhoEstimate, input: PerturbedRhoInput) -> Result<Self> {
        if let RhoEstimate::Derivative(_) = estimate {
            require_single_region(&name, &input.perturbed)?;
        }
        let gate = gate(&name, Surface::Top, input.na)?;
        let rho = input.rho.axis("rho")?;
        let tally = Tally::configure(&name, shape_of(&[&rho]), input.second_moment, Accumulation::Terminal);
        Ok(Self { name, estimate, gate, input, rho, regions: PerturbedRegions::default(), tally })
    }
}

impl Detector for PMCROfRho {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput {
        let input = self.input.clone();
        match self.estimate {
            RhoEstimate::Perturbed                   => DetectorInput::PMCROfRho(input),
            RhoEstimate::Derivative(Parameter::Mua)  => DetectorInput::DMCdROfRhodMua(input),
            RhoEstimate::Derivative(Parameter::Mus)  => DetectorInput::DMCdROfRhodMus(input),
        }
    }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        self.gate.bind(tissue);
        self.regions = PerturbedRegions::bind(&self.name, &self.input.perturbed, tissue)?;
        self.tally.allocate()
    }

    fn tally(&mut self, photon: &Photon, _: &mut dyn RngCore) -> Result<()> {
        let mut acc = self.tally.accumulate()?;
        let Some(dp) = self.gate.accept(photon) else { return Ok(()) };
        let Some(ir) = self.rho.which_bin(dp.position.rho()) else { return Ok(()) };
        let value = match self.estimate {
            RhoEstimate::Perturbed             => dp.weight * self.regions.factor(photon),
            RhoEstimate::Derivative(parameter) => dp.weight * self.regions.derivative(photon, parameter),
        };
        acc.add(&[ir], value);
        Ok(())
    }

    fn normalize(&mut self, photons: u64) -> Result<()> {
        let rho = self.rho;
        self.tally.normalize(photons, |i| normalize::ring(&rho, i[0]))
    }

    fn arrays    (&    self) -> Vec<BinaryArray   <'_>> { tally_arrays    (&    self.tally) }
    fn arrays_mut(&mut self) -> Vec<BinaryArrayMut<'_>> { tally_arrays_mut(&mut self.tally) }

    fn is_within_detector_aperture(&self, photon: &Photon) -> bool { self.gate.accept(photon).is_some() }
}

/// Time-resolved radial reflectance in the perturbed medium
pub struct PMCROfRhoAndTime {
    name: String,
    gate: SurfaceGate,
    input: PerturbedRhoAndTimeInput,
    rho: Axis,
    time: Axis,
    regions: PerturbedRegions,
    tally: Tally<f64>,
}

impl PMCROfRhoAndTime {
    pub fn new(name: String, input: PerturbedRhoAndTimeInput) -> Result<Self> {
        let gate = gate(&name, Surface::Top, input.na)?;
        let rho  = input.rho .axis("rho" )?;
        let time = input.time.axis("time")?;
        let tally = Tally::configure(&name, shape_of(&[&rho, &time]), input.second_moment, Accumulation::Terminal);
        Ok(Self { name, gate, input, rho, time, regions: PerturbedRegions::default(), tally })
    }
}

impl Detector for PMCROfRhoAndTime {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput { DetectorInput::PMCROfRhoAndTime(self.input.clone()) }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        self.gate.bind(tissue);
        self.regions = PerturbedRegions::bind(&self.name, &self.input.perturbed, tissue)?;
        self.tally.allocate()
    }

    fn tally(&mut self, photon: &Photon, _: &mut dyn RngCore) -> Result<()> {
        let mut acc = self.tally.accumulate()?;
        let Some(dp) = self.gate.accept(photon) else { return Ok(()) };
        if let (Some(ir), Some(it)) = (self.rho.which_bin(dp.position.rho()), self.time.which_bin(dp.time)) {
            acc.add(&[ir, it], dp.weight * self.regions.factor(photon));
        }
        Ok(())
    }

    fn normalize(&mut self, photons: u64) -> Result<()> {
        let (rho, dt) = (self.rho, normalize::width(&self.time));
        self.tally.normalize(photons, |i| normalize::ring(&rho, i[0]) * dt)
    }

    fn arrays    (&    self) -> Vec<BinaryArray   <'_>> { tally_arrays    (&    self.tally) }
    fn arrays_mut(&mut self) -> Vec<BinaryArrayMut<'_>> { tally_arrays_mut(&mut self.tally) }

    fn is_within_detector_aperture(&self, photon: &Photon) -> bool { self.gate.accept(photon).is_some() }
}
