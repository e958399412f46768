//! Detectors of photons leaving the tissue through its top (reflectance) or
//! bottom (transmittance) surface.
//!
//! All of them look only at the terminal state of a photon, and contribute at
//! most once per photon to each bin.

use std::f64::consts::TAU;

use num_complex::Complex64;
use rand::RngCore;

use crate::axis::{shape_of, Axis, Bins, Points};
use crate::config::{
    AngleInput, DetectorInput, DiffuseInput, FxInput, RhoAndAngleInput, RhoAndOmegaInput,
    RhoAndTimeInput, RhoInput, SurfaceFiberInput, XAndYInput,
};
use crate::detector::{delegate_to_tally, Detector, Surface, SurfaceGate};
use crate::detectors::{gate, sided};
use crate::error::{Result, TallyError};
use crate::io::{tally_arrays, tally_arrays_mut, BinaryArray, BinaryArrayMut};
use crate::normalize;
use crate::photon::{Photon, PhotonState};
use crate::tally::{Accumulation, Tally};
use crate::tissue::Tissue;
use units::mm_;

/// Total diffuse reflectance (`RDiffuse`) or transmittance (`TDiffuse`)
pub struct Diffuse {
    name: String,
    gate: SurfaceGate,
    input: DiffuseInput,
    tally: Tally<f64>,
}

impl Diffuse {
    pub fn new(name: String, surface: Surface, input: DiffuseInput) -> Result<Self> {
        let gate = gate(&name, surface, input.na)?;
        let tally = Tally::configure(&name, vec![], input.second_moment, Accumulation::Terminal);
        Ok(Self { name, gate, input, tally })
    }
}

impl Detector for Diffuse {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput {
        sided(self.gate.surface(), DetectorInput::RDiffuse, DetectorInput::TDiffuse, &self.input)
    }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        self.gate.bind(tissue);
        self.tally.allocate()
    }

    fn tally(&mut self, photon: &Photon, _: &mut dyn RngCore) -> Result<()> {
        let mut acc = self.tally.accumulate()?;
        if let Some(dp) = self.gate.accept(photon) {
            acc.add(&[], dp.weight);
        }
        Ok(())
    }

    fn normalize(&mut self, photons: u64) -> Result<()> { self.tally.normalize(photons, |_| 1.0) }

    fn arrays    (&    self) -> Vec<BinaryArray   <'_>> { tally_arrays    (&    self.tally) }
    fn arrays_mut(&mut self) -> Vec<BinaryArrayMut<'_>> { tally_arrays_mut(&mut self.tally) }

    fn is_within_detector_aperture(&self, photon: &Photon) -> bool { self.gate.accept(photon).is_some() }
}

/// Radially resolved reflectance or transmittance, per unit area. The radial
/// bins may be given by their centres, to match measured data.
pub struct OfRho {
    name: String,
    gate: SurfaceGate,
    input: RhoInput,
    rho: Bins,
    tally: Tally<f64>,
}

impl OfRho {
    pub fn new(name: String, surface: Surface, input: RhoInput) -> Result<Self> {
        let gate = gate(&name, surface, input.na)?;
        let rho = input.rho.bins("rho")?;
        let tally = Tally::configure(&name, shape_of(&[&rho]), input.second_moment, Accumulation::Terminal);
        Ok(Self { name, gate, input, rho, tally })
    }
}

impl Detector for OfRho {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput {
        sided(self.gate.surface(), DetectorInput::ROfRho, DetectorInput::TOfRho, &self.input)
    }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        self.gate.bind(tissue);
        self.tally.allocate()
    }

    fn tally(&mut self, photon: &Photon, _: &mut dyn RngCore) -> Result<()> {
        let mut acc = self.tally.accumulate()?;
        let Some(dp) = self.gate.accept(photon) else { return Ok(()) };
        if let Some(ir) = self.rho.which_bin(dp.position.rho()) {
            acc.add(&[ir], dp.weight);
        }
        Ok(())
    }

    fn normalize(&mut self, photons: u64) -> Result<()> {
        let rho = &self.rho;
        self.tally.normalize(photons, |i| normalize::annulus(rho, i[0]))
    }

    fn arrays    (&    self) -> Vec<BinaryArray   <'_>> { tally_arrays    (&    self.tally) }
    fn arrays_mut(&mut self) -> Vec<BinaryArrayMut<'_>> { tally_arrays_mut(&mut self.tally) }

    fn is_within_detector_aperture(&self, photon: &Photon) -> bool { self.gate.accept(photon).is_some() }
}

/// Reflectance or transmittance per unit solid angle, binned by the polar
/// angle of the exit direction
pub struct OfAngle {
    name: String,
    gate: SurfaceGate,
    input: AngleInput,
    angle: Axis,
    tally: Tally<f64>,
}

impl OfAngle {
    pub fn new(name: String, surface: Surface, input: AngleInput) -> Result<Self> {
        let gate = gate(&name, surface, input.na)?;
        let angle = input.angle.axis("angle")?;
        let tally = Tally::configure(&name, shape_of(&[&angle]), input.second_moment, Accumulation::Terminal);
        Ok(Self { name, gate, input, angle, tally })
    }
}

impl Detector for OfAngle {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput {
        sided(self.gate.surface(), DetectorInput::ROfAngle, DetectorInput::TOfAngle, &self.input)
    }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        self.gate.bind(tissue);
        self.tally.allocate()
    }

    fn tally(&mut self, photon: &Photon, _: &mut dyn RngCore) -> Result<()> {
        let mut acc = self.tally.accumulate()?;
        let Some(dp) = self.gate.accept(photon) else { return Ok(()) };
        if let Some(ia) = self.angle.which_bin(dp.direction.polar_angle()) {
            acc.add(&[ia], dp.weight);
        }
        Ok(())
    }

    fn normalize(&mut self, photons: u64) -> Result<()> {
        let angle = self.angle;
        self.tally.normalize(photons, |i| normalize::solid_angle(&angle, i[0]))
    }

    fn arrays    (&    self) -> Vec<BinaryArray   <'_>> { tally_arrays    (&    self.tally) }
    fn arrays_mut(&mut self) -> Vec<BinaryArrayMut<'_>> { tally_arrays_mut(&mut self.tally) }

    fn is_within_detector_aperture(&self, photon: &Photon) -> bool { self.gate.accept(photon).is_some() }
}

/// Time-resolved radial reflectance or transmittance, per unit area per ns
pub struct OfRhoAndTime {
    name: String,
    gate: SurfaceGate,
    input: RhoAndTimeInput,
    rho: Axis,
    time: Axis,
    tally: Tally<f64>,
}

impl OfRhoAndTime {
    pub fn new(name: String, surface: Surface, input: RhoAndTimeInput) -> Result<Self> {
        let gate = gate(&name, surface, input.na)?;
        let rho  = input.rho .axis("rho" )?;
        let time = input.time.axis("time")?;
        let tally = Tally::configure(&name, shape_of(&[&rho, &time]), input.second_moment, Accumulation::Terminal);
        Ok(Self { name, gate, input, rho, time, tally })
    }
}

impl Detector for OfRhoAndTime {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput {
        sided(self.gate.surface(), DetectorInput::ROfRhoAndTime, DetectorInput::TOfRhoAndTime, &self.input)
    }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        self.gate.bind(tissue);
        self.tally.allocate()
    }

    fn tally(&mut self, photon: &Photon, _: &mut dyn RngCore) -> Result<()> {
        let mut acc = self.tally.accumulate()?;
        let Some(dp) = self.gate.accept(photon) else { return Ok(()) };
        if let (Some(ir), Some(it)) = (self.rho.which_bin(dp.position.rho()), self.time.which_bin(dp.time)) {
            acc.add(&[ir, it], dp.weight);
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

/// Reflectance or transmittance per unit area per unit solid angle
pub struct OfRhoAndAngle {
    name: String,
    gate: SurfaceGate,
    input: RhoAndAngleInput,
    rho: Axis,
    angle: Axis,
    tally: Tally<f64>,
}

impl OfRhoAndAngle {
    pub fn new(name: String, surface: Surface, input: RhoAndAngleInput) -> Result<Self> {
        let gate = gate(&name, surface, input.na)?;
        let rho   = input.rho  .axis("rho"  )?;
        let angle = input.angle.axis("angle")?;
        let tally = Tally::configure(&name, shape_of(&[&rho, &angle]), input.second_moment, Accumulation::Terminal);
        Ok(Self { name, gate, input, rho, angle, tally })
    }
}

impl Detector for OfRhoAndAngle {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput {
        sided(self.gate.surface(), DetectorInput::ROfRhoAndAngle, DetectorInput::TOfRhoAndAngle, &self.input)
    }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        self.gate.bind(tissue);
        self.tally.allocate()
    }

    fn tally(&mut self, photon: &Photon, _: &mut dyn RngCore) -> Result<()> {
        let mut acc = self.tally.accumulate()?;
        let Some(dp) = self.gate.accept(photon) else { return Ok(()) };
        let ir = self.rho  .which_bin(dp.position.rho());
        let ia = self.angle.which_bin(dp.direction.polar_angle());
        if let (Some(ir), Some(ia)) = (ir, ia) {
            acc.add(&[ir, ia], dp.weight);
        }
        Ok(())
    }

    fn normalize(&mut self, photons: u64) -> Result<()> {
        let (rho, angle) = (self.rho, self.angle);
        self.tally.normalize(photons, |i| normalize::ring(&rho, i[0]) * normalize::solid_angle(&angle, i[1]))
    }

    fn arrays    (&    self) -> Vec<BinaryArray   <'_>> { tally_arrays    (&    self.tally) }
    fn arrays_mut(&mut self) -> Vec<BinaryArrayMut<'_>> { tally_arrays_mut(&mut self.tally) }

    fn is_within_detector_aperture(&self, photon: &Photon) -> bool { self.gate.accept(photon).is_some() }
}

/// Reflectance or transmittance on a Cartesian grid of the exit surface
pub struct OfXAndY {
    name: String,
    gate: SurfaceGate,
    input: XAndYInput,
    x: Axis,
    y: Axis,
    tally: Tally<f64>,
}

impl OfXAndY {
    pub fn new(name: String, surface: Surface, input: XAndYInput) -> Result<Self> {
        let gate = gate(&name, surface, input.na)?;
        let x = input.x.axis("x")?;
        let y = input.y.axis("y")?;
        let tally = Tally::configure(&name, shape_of(&[&x, &y]), input.second_moment, Accumulation::Terminal);
        Ok(Self { name, gate, input, x, y, tally })
    }
}

impl Detector for OfXAndY {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput {
        sided(self.gate.surface(), DetectorInput::ROfXAndY, DetectorInput::TOfXAndY, &self.input)
    }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        self.gate.bind(tissue);
        self.tally.allocate()
    }

    fn tally(&mut self, photon: &Photon, _: &mut dyn RngCore) -> Result<()> {
        let mut acc = self.tally.accumulate()?;
        let Some(dp) = self.gate.accept(photon) else { return Ok(()) };
        if let (Some(ix), Some(iy)) = (self.x.which_bin(dp.position.x), self.y.which_bin(dp.position.y)) {
            acc.add(&[ix, iy], dp.weight);
        }
        Ok(())
    }

    fn normalize(&mut self, photons: u64) -> Result<()> {
        let area = normalize::width(&self.x) * normalize::width(&self.y);
        self.tally.normalize(photons, |_| area)
    }

    fn arrays    (&    self) -> Vec<BinaryArray   <'_>> { tally_arrays    (&    self.tally) }
    fn arrays_mut(&mut self) -> Vec<BinaryArrayMut<'_>> { tally_arrays_mut(&mut self.tally) }

    fn is_within_detector_aperture(&self, photon: &Photon) -> bool { self.gate.accept(photon).is_some() }
}

/// Spatial-frequency domain reflectance or transmittance: the Fourier
/// transform along `x` of the exit distribution, evaluated at each `fx`.
///
/// Each detected photon contributes `w exp(-i 2π fx x)` to every frequency.
/// Only the photon count normalizes the result, as the transform already
/// integrates over the surface.
///
/// As every frequency receives a nonzero contribution, each detected photon
/// adds one to the tally count per frequency.
pub struct OfFx {
    name: String,
    gate: SurfaceGate,
    input: FxInput,
    fx: Points,
    tally: Tally<Complex64>,
}

impl OfFx {
    pub fn new(name: String, surface: Surface, input: FxInput) -> Result<Self> {
        let gate = gate(&name, surface, input.na)?;
        let fx = input.fx.points("fx")?;
        let tally = Tally::configure(&name, shape_of(&[&fx]), input.second_moment, Accumulation::Terminal);
        Ok(Self { name, gate, input, fx, tally })
    }
}

impl Detector for OfFx {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput {
        sided(self.gate.surface(), DetectorInput::ROfFx, DetectorInput::TOfFx, &self.input)
    }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        self.gate.bind(tissue);
        self.tally.allocate()
    }

    fn tally(&mut self, photon: &Photon, _: &mut dyn RngCore) -> Result<()> {
        let mut acc = self.tally.accumulate()?;
        let Some(dp) = self.gate.accept(photon) else { return Ok(()) };
        let x = dp.position.x;
        for (i, fx) in self.fx.values().enumerate() {
            acc.add(&[i], Complex64::from_polar(dp.weight, -TAU * fx * x));
        }
        Ok(())
    }

    fn normalize(&mut self, photons: u64) -> Result<()> { self.tally.normalize(photons, |_| 1.0) }

    fn arrays    (&    self) -> Vec<BinaryArray   <'_>> { tally_arrays    (&    self.tally) }
    fn arrays_mut(&mut self) -> Vec<BinaryArrayMut<'_>> { tally_arrays_mut(&mut self.tally) }

    fn is_within_detector_aperture(&self, photon: &Photon) -> bool { self.gate.accept(photon).is_some() }
}

/// Frequency-domain radial reflectance or transmittance: each detected
/// photon contributes `w exp(-i 2π ω t)` at every modulation frequency `ω`.
/// The tally count therefore grows by the number of frequencies per photon.
pub struct OfRhoAndOmega {
    name: String,
    gate: SurfaceGate,
    input: RhoAndOmegaInput,
    rho: Axis,
    omega: Points,
    tally: Tally<Complex64>,
}

impl OfRhoAndOmega {
    pub fn new(name: String, surface: Surface, input: RhoAndOmegaInput) -> Result<Self> {
        let gate = gate(&name, surface, input.na)?;
        let rho   = input.rho  .axis  ("rho"  )?;
        let omega = input.omega.points("omega")?;
        let tally = Tally::configure(&name, shape_of(&[&rho, &omega]), input.second_moment, Accumulation::Terminal);
        Ok(Self { name, gate, input, rho, omega, tally })
    }
}

impl Detector for OfRhoAndOmega {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput {
        sided(self.gate.surface(), DetectorInput::ROfRhoAndOmega, DetectorInput::TOfRhoAndOmega, &self.input)
    }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        self.gate.bind(tissue);
        self.tally.allocate()
    }

    fn tally(&mut self, photon: &Photon, _: &mut dyn RngCore) -> Result<()> {
        let mut acc = self.tally.accumulate()?;
        let Some(dp) = self.gate.accept(photon) else { return Ok(()) };
        let Some(ir) = self.rho.which_bin(dp.position.rho()) else { return Ok(()) };
        // GHz times ns: cycles
        for (iw, omega) in self.omega.values().enumerate() {
            acc.add(&[ir, iw], Complex64::from_polar(dp.weight, -TAU * omega * dp.time));
        }
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

/// Fraction of launched photon weight collected by a circular fibre lying on
/// the top surface.
pub struct SurfaceFiber {
    name: String,
    gate: SurfaceGate,
    input: SurfaceFiberInput,
    center: (f64, f64),
    radius: f64,
    tally: Tally<f64>,
}

impl SurfaceFiber {
    pub fn new(name: String, input: SurfaceFiberInput) -> Result<Self> {
        let gate = gate(&name, Surface::Top, input.na)?;
        let radius = mm_(input.radius);
        if !(radius > 0.0) {
            return Err(TallyError::Config(format!("{name}: fibre radius must be positive, not {radius} mm")))
        }
        let center = (mm_(input.center_x), mm_(input.center_y));
        let tally = Tally::configure(&name, vec![], input.second_moment, Accumulation::Terminal);
        Ok(Self { name, gate, input, center, radius, tally })
    }
}

impl Detector for SurfaceFiber {
    delegate_to_tally!();

    fn input(&self) -> DetectorInput { DetectorInput::SurfaceFiber(self.input.clone()) }

    fn initialize(&mut self, tissue: &dyn Tissue) -> Result<()> {
        self.gate.bind(tissue);
        self.tally.allocate()
    }

    fn tally(&mut self, photon: &Photon, _: &mut dyn RngCore) -> Result<()> {
        let collected = self.is_within_detector_aperture(photon);
        let mut acc = self.tally.accumulate()?;
        if collected {
            acc.add(&[], photon.terminal().weight);
        }
        Ok(())
    }

    fn normalize(&mut self, photons: u64) -> Result<()> { self.tally.normalize(photons, |_| 1.0) }

    fn arrays    (&    self) -> Vec<BinaryArray   <'_>> { tally_arrays    (&    self.tally) }
    fn arrays_mut(&mut self) -> Vec<BinaryArrayMut<'_>> { tally_arrays_mut(&mut self.tally) }

    fn is_within_detector_aperture(&self, photon: &Photon) -> bool {
        self.gate.accept(photon).map_or(false, |dp| self.contains_point(dp))
    }

    fn contains_point(&self, state: &PhotonState) -> bool {
        let (cx, cy) = self.center;
        geometry::rho(state.position.x - cx, state.position.y - cy) <= self.radius
    }
}
