//! Detectors of weight deposited inside the tissue, and of fluence.
//!
//! These walk the whole history of every photon, looking at each
//! `(previous, current)` pair of states. What is deposited along a pair, and
//! where it is binned, depends on how the random walk accounted for
//! absorption (see [`AbsorptionWeighting`]). Fluence is the absorbed weight
//! divided by the absorption coefficient of the region that absorbed it.

use std::f64::consts::TAU;

use geometry::Position;
use num_complex::Complex64;
use rand::RngCore;

use crate::axis::{shape_of, Axis, Points};
use crate::config::{ATotalInput, DetectorInput, FxAndZInput, RhoAndZAndAngleInput, RhoAndZAndTimeInput, RhoAndZInput, XAndYAndZInput};
use crate::detector::{delegate_to_tally, Detector};
use crate::error::Result;
use crate::io::{tally_arrays, tally_arrays_mut, BinaryArray, BinaryArrayMut};
use crate::normalize;
use crate::photon::{Photon, PhotonState};
use crate::tally::{Accumulation, Tally};
use crate::tissue::{OpticalProperties, Tissue};
use crate::weighting::AbsorptionWeighting;

/// What a volume detector accumulates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deposit {
    Absorbed,
    Fluence,
}

/// The tissue's absorption bookkeeping, bound at initialization
#[derive(Clone, Debug)]
struct Deposition {
    weighting: AbsorptionWeighting,
    regions: Vec<OpticalProperties>,
}

impl Deposition {
    fn bind(tissue: &dyn Tissue) -> Self {
        Self { weighting: tissue.absorption_weighting(), regions: tissue.regions().to_vec() }
    }

    fn amount(&self, deposit: Deposit, prev: &PhotonState, curr: &PhotonState) -> f64 {
        let absorbed = self.weighting.deposited(prev, curr, &self.regions);
        match deposit {
            Deposit::Absorbed => absorbed,
            Deposit::Fluence  => {
                if absorbed == 0.0 { return 0.0 }
                let region = self.weighting.deposit_region(prev, curr);
                match self.regions.get(region) {
                    Some(ops) if ops.mua > 0.0 => absorbed / ops.mua,
                    _ => 0.0,
                }
            }
        }
    }

    fn point(&self, prev: &PhotonState, curr: &PhotonState) -> Position {
        self.weighting.tally_point(prev, curr)
    }

    /// Time at which the deposit is considered to happen
    fn time(&self, prev: &PhotonState, curr: &PhotonState) -> f64 {
        match self.weighting {
            AbsorptionWeighting::Continuous => (prev.time + curr.time) / 2.0,
            _ => curr.time,
        }
    }
}

// ----- ATotal ---------------------------------------------------------------------

/// Total absorbed weight, per launched photon
pub struct ATotal {
    name: String,
    input: ATotalInput,
    deposition: Option<Deposition>,
    tally: Tally<f64>,
}

impl ATotal {
    pub fn new(name: String, input: ATotalInput) -> Self {
        let tally = Tally::configure(&name, vec![], input.second_moment, Accumulation::History);
        Self { name, input, deposition: None, tally }
    }
}

impl Detector for ATotal {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput { DetectorInput::ATotal(self.input.clone()) }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        self.deposition = Some(Deposition::bind(tissue));
        self.tally.allocate()
    }

    fn tally(&mut self, photon: &Photon, _: &mut dyn RngCore) -> Result<()> {
        let mut acc = self.tally.accumulate()?;
        let Some(dep) = &self.deposition else { return Ok(()) };
        let mut scope = acc.photon();
        for (prev, curr) in photon.segments() {
            scope.add(&[], dep.amount(Deposit::Absorbed, prev, curr));
        }
        Ok(())
    }

    fn normalize(&mut self, photons: u64) -> Result<()> { self.tally.normalize(photons, |_| 1.0) }

    fn arrays    (&    self) -> Vec<BinaryArray   <'_>> { tally_arrays    (&    self.tally) }
    fn arrays_mut(&mut self) -> Vec<BinaryArrayMut<'_>> { tally_arrays_mut(&mut self.tally) }
}

// ----- Cylindrical and Cartesian grids ----------------------------------------------

/// Absorbed weight (`AOfRhoAndZ`) or fluence (`FluenceOfRhoAndZ`) on a
/// cylindrical grid, per unit volume
pub struct OfRhoAndZ {
    name: String,
    deposit: Deposit,
    input: RhoAndZInput,
    rho: Axis,
    z: Axis,
    deposition: Option<Deposition>,
    tally: Tally<f64>,
}

impl OfRhoAndZ {
    pub fn new(name: String, deposit: Deposit, input: RhoAndZInput) -> Result<Self> {
        let rho = input.rho.axis("rho")?;
        let z   = input.z  .axis("z"  )?;
        let tally = Tally::configure(&name, shape_of(&[&rho, &z]), input.second_moment, Accumulation::History);
        Ok(Self { name, deposit, input, rho, z, deposition: None, tally })
    }
}

impl Detector for OfRhoAndZ {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput {
        match self.deposit {
            Deposit::Absorbed => DetectorInput::AOfRhoAndZ      (self.input.clone()),
            Deposit::Fluence  => DetectorInput::FluenceOfRhoAndZ(self.input.clone()),
        }
    }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        self.deposition = Some(Deposition::bind(tissue));
        self.tally.allocate()
    }

    fn tally(&mut self, photon: &Photon, _: &mut dyn RngCore) -> Result<()> {
        let mut acc = self.tally.accumulate()?;
        let Some(dep) = &self.deposition else { return Ok(()) };
        let mut scope = acc.photon();
        for (prev, curr) in photon.segments() {
            let value = dep.amount(self.deposit, prev, curr);
            if value == 0.0 { continue }
            let p = dep.point(prev, curr);
            if let (Some(ir), Some(iz)) = (self.rho.which_bin(p.rho()), self.z.which_bin(p.z)) {
                scope.add(&[ir, iz], value);
            }
        }
        Ok(())
    }

    fn normalize(&mut self, photons: u64) -> Result<()> {
        let (rho, dz) = (self.rho, normalize::width(&self.z));
        self.tally.normalize(photons, |i| normalize::ring(&rho, i[0]) * dz)
    }

    fn arrays    (&    self) -> Vec<BinaryArray   <'_>> { tally_arrays    (&    self.tally) }
    fn arrays_mut(&mut self) -> Vec<BinaryArrayMut<'_>> { tally_arrays_mut(&mut self.tally) }
}

/// Absorbed weight or fluence on a Cartesian grid, per unit volume
pub struct OfXAndYAndZ {
    name: String,
    deposit: Deposit,
    input: XAndYAndZInput,
    x: Axis,
    y: Axis,
    z: Axis,
    deposition: Option<Deposition>,
    tally: Tally<f64>,
}

impl OfXAndYAndZ {
    pub fn new(name: String, deposit: Deposit, input: XAndYAndZInput) -> Result<Self> {
        let x = input.x.axis("x")?;
        let y = input.y.axis("y")?;
        let z = input.z.axis("z")?;
        let tally = Tally::configure(&name, shape_of(&[&x, &y, &z]), input.second_moment, Accumulation::History);
        Ok(Self { name, deposit, input, x, y, z, deposition: None, tally })
    }
}

impl Detector for OfXAndYAndZ {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput {
        match self.deposit {
            Deposit::Absorbed => DetectorInput::AOfXAndYAndZ      (self.input.clone()),
            Deposit::Fluence  => DetectorInput::FluenceOfXAndYAndZ(self.input.clone()),
        }
    }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        self.deposition = Some(Deposition::bind(tissue));
        self.tally.allocate()
    }

    fn tally(&mut self, photon: &Photon, _: &mut dyn RngCore) -> Result<()> {
        let mut acc = self.tally.accumulate()?;
        let Some(dep) = &self.deposition else { return Ok(()) };
        let mut scope = acc.photon();
        for (prev, curr) in photon.segments() {
            let value = dep.amount(self.deposit, prev, curr);
            if value == 0.0 { continue }
            let p = dep.point(prev, curr);
            if let (Some(ix), Some(iy), Some(iz)) = (self.x.which_bin(p.x), self.y.which_bin(p.y), self.z.which_bin(p.z)) {
                scope.add(&[ix, iy, iz], value);
            }
        }
        Ok(())
    }

    fn normalize(&mut self, photons: u64) -> Result<()> {
        let voxel = normalize::width(&self.x) * normalize::width(&self.y) * normalize::width(&self.z);
        self.tally.normalize(photons, |_| voxel)
    }

    fn arrays    (&    self) -> Vec<BinaryArray   <'_>> { tally_arrays    (&    self.tally) }
    fn arrays_mut(&mut self) -> Vec<BinaryArrayMut<'_>> { tally_arrays_mut(&mut self.tally) }
}

// ----- Resolved fluence -------------------------------------------------------------

/// Time-resolved fluence on a cylindrical grid, per unit volume per ns
pub struct FluenceOfRhoAndZAndTime {
    name: String,
    input: RhoAndZAndTimeInput,
    rho: Axis,
    z: Axis,
    time: Axis,
    deposition: Option<Deposition>,
    tally: Tally<f64>,
}

impl FluenceOfRhoAndZAndTime {
    pub fn new(name: String, input: RhoAndZAndTimeInput) -> Result<Self> {
        let rho  = input.rho .axis("rho" )?;
        let z    = input.z   .axis("z"   )?;
        let time = input.time.axis("time")?;
        let tally = Tally::configure(&name, shape_of(&[&rho, &z, &time]), input.second_moment, Accumulation::History);
        Ok(Self { name, input, rho, z, time, deposition: None, tally })
    }
}

impl Detector for FluenceOfRhoAndZAndTime {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput { DetectorInput::FluenceOfRhoAndZAndTime(self.input.clone()) }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        self.deposition = Some(Deposition::bind(tissue));
        self.tally.allocate()
    }

    fn tally(&mut self, photon: &Photon, _: &mut dyn RngCore) -> Result<()> {
        let mut acc = self.tally.accumulate()?;
        let Some(dep) = &self.deposition else { return Ok(()) };
        let mut scope = acc.photon();
        for (prev, curr) in photon.segments() {
            let value = dep.amount(Deposit::Fluence, prev, curr);
            if value == 0.0 { continue }
            let p = dep.point(prev, curr);
            let ir = self.rho .which_bin(p.rho());
            let iz = self.z   .which_bin(p.z);
            let it = self.time.which_bin(dep.time(prev, curr));
            if let (Some(ir), Some(iz), Some(it)) = (ir, iz, it) {
                scope.add(&[ir, iz, it], value);
            }
        }
        Ok(())
    }

    fn normalize(&mut self, photons: u64) -> Result<()> {
        let (rho, dz, dt) = (self.rho, normalize::width(&self.z), normalize::width(&self.time));
        self.tally.normalize(photons, |i| normalize::ring(&rho, i[0]) * dz * dt)
    }

    fn arrays    (&    self) -> Vec<BinaryArray   <'_>> { tally_arrays    (&    self.tally) }
    fn arrays_mut(&mut self) -> Vec<BinaryArrayMut<'_>> { tally_arrays_mut(&mut self.tally) }
}

/// Spatial-frequency domain fluence: the transform along `x` of the fluence
/// at each depth, evaluated at each `fx`. Per unit depth.
pub struct FluenceOfFxAndZ {
    name: String,
    input: FxAndZInput,
    fx: Points,
    z: Axis,
    deposition: Option<Deposition>,
    tally: Tally<Complex64>,
}

impl FluenceOfFxAndZ {
    pub fn new(name: String, input: FxAndZInput) -> Result<Self> {
        let fx = input.fx.points("fx")?;
        let z  = input.z .axis  ("z" )?;
        let tally = Tally::configure(&name, shape_of(&[&fx, &z]), input.second_moment, Accumulation::History);
        Ok(Self { name, input, fx, z, deposition: None, tally })
    }
}

impl Detector for FluenceOfFxAndZ {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput { DetectorInput::FluenceOfFxAndZ(self.input.clone()) }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        self.deposition = Some(Deposition::bind(tissue));
        self.tally.allocate()
    }

    fn tally(&mut self, photon: &Photon, _: &mut dyn RngCore) -> Result<()> {
        let mut acc = self.tally.accumulate()?;
        let Some(dep) = &self.deposition else { return Ok(()) };
        let mut scope = acc.photon();
        for (prev, curr) in photon.segments() {
            let value = dep.amount(Deposit::Fluence, prev, curr);
            if value == 0.0 { continue }
            let p = dep.point(prev, curr);
            let Some(iz) = self.z.which_bin(p.z) else { continue };
            for (ifx, fx) in self.fx.values().enumerate() {
                scope.add(&[ifx, iz], Complex64::from_polar(value, -TAU * fx * p.x));
            }
        }
        Ok(())
    }

    fn normalize(&mut self, photons: u64) -> Result<()> {
        let dz = normalize::width(&self.z);
        self.tally.normalize(photons, |_| dz)
    }

    fn arrays    (&    self) -> Vec<BinaryArray   <'_>> { tally_arrays    (&    self.tally) }
    fn arrays_mut(&mut self) -> Vec<BinaryArrayMut<'_>> { tally_arrays_mut(&mut self.tally) }
}

/// Fluence resolved by the polar angle of the direction of travel, per unit
/// volume per unit solid angle
pub struct RadianceOfRhoAndZAndAngle {
    name: String,
    input: RhoAndZAndAngleInput,
    rho: Axis,
    z: Axis,
    angle: Axis,
    deposition: Option<Deposition>,
    tally: Tally<f64>,
}

impl RadianceOfRhoAndZAndAngle {
    pub fn new(name: String, input: RhoAndZAndAngleInput) -> Result<Self> {
        let rho   = input.rho  .axis("rho"  )?;
        let z     = input.z    .axis("z"    )?;
        let angle = input.angle.axis("angle")?;
        let tally = Tally::configure(&name, shape_of(&[&rho, &z, &angle]), input.second_moment, Accumulation::History);
        Ok(Self { name, input, rho, z, angle, deposition: None, tally })
    }
}

impl Detector for RadianceOfRhoAndZAndAngle {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput { DetectorInput::RadianceOfRhoAndZAndAngle(self.input.clone()) }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        self.deposition = Some(Deposition::bind(tissue));
        self.tally.allocate()
    }

    fn tally(&mut self, photon: &Photon, _: &mut dyn RngCore) -> Result<()> {
        let mut acc = self.tally.accumulate()?;
        let Some(dep) = &self.deposition else { return Ok(()) };
        let mut scope = acc.photon();
        for (prev, curr) in photon.segments() {
            let value = dep.amount(Deposit::Fluence, prev, curr);
            if value == 0.0 { continue }
            let p = dep.point(prev, curr);
            // Direction travelled along the segment
            let ia = self.angle.which_bin(prev.direction.polar_angle());
            if let (Some(ir), Some(iz), Some(ia)) = (self.rho.which_bin(p.rho()), self.z.which_bin(p.z), ia) {
                scope.add(&[ir, iz, ia], value);
            }
        }
        Ok(())
    }

    fn normalize(&mut self, photons: u64) -> Result<()> {
        let (rho, angle, dz) = (self.rho, self.angle, normalize::width(&self.z));
        self.tally.normalize(photons, |i| {
            normalize::ring(&rho, i[0]) * dz * normalize::solid_angle(&angle, i[2])
        })
    }

    fn arrays    (&    self) -> Vec<BinaryArray   <'_>> { tally_arrays    (&    self.tally) }
    fn arrays_mut(&mut self) -> Vec<BinaryArrayMut<'_>> { tally_arrays_mut(&mut self.tally) }
}
