//! Detector configuration, read from TOML.
//!
//! Each detector is one `[[detector]]` table whose `type` selects the
//! detector family. Dimensioned values carry their units explicitly, as
//! strings which are parsed by `uom`:
//!
//! ```toml
//! [[detector]]
//! type = "ROfRho"
//! second_moment = true
//! rho = { start = "0 mm", stop = "10 mm", bins = 100 }
//!
//! [[detector]]
//! type = "ROfFx"
//! fx = { start = 0.0, stop = 0.5, count = 51 }   # 1/mm
//! ```
//!
//! Dimensionless values (numerical aperture, momentum transfer, and spatial
//! frequency, which is always in 1/mm) are plain numbers.

use std::fmt::Debug;
use std::fs;
use std::path::Path;

use itertools::Itertools;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use tracing::info;

use units::{ghz, ghz_, mm, mm_, ns, ns_, radian, radian_, Angle, Frequency, Length, Time};

use crate::axis::{Axis, Bins, Centers, Points};
use crate::detector::{Detector, Surface};
use crate::detectors::{momentum, perturbation, surface, time, volume};
use crate::detectors::{perturbation::RhoEstimate, volume::Deposit};
use crate::error::{Result, TallyError};
use crate::perturbation::{Parameter, PerturbedRegion};

// ----- Values with units ------------------------------------------------------------

/// A configurable value, stored as a `uom` quantity or a plain number.
pub trait UnitValue: Copy + PartialEq + Debug {
    /// Unit in which the value is used internally and written out. Empty for
    /// plain numbers.
    const UNIT: &'static str;

    fn parse(text: &str) -> std::result::Result<Self, String>;
    fn internal(self) -> f64;
    fn from_internal(x: f64) -> Self;
}

macro_rules! unit_value {
    ($quantity:ident $unit:literal $to:ident $from:ident) => {
        impl UnitValue for $quantity {
            const UNIT: &'static str = $unit;
            fn parse(text: &str) -> std::result::Result<Self, String> {
                text.parse::<$quantity>().map_err(|e| format!("{text:?}: {e}"))
            }
            fn internal(self) -> f64 { $to(self) }
            fn from_internal(x: f64) -> Self { $from(x) }
        }
    };
}

unit_value!(Length    "mm"  mm_     mm    );
unit_value!(Time      "ns"  ns_     ns    );
unit_value!(Angle     "rad" radian_ radian);
unit_value!(Frequency "GHz" ghz_    ghz   );

impl UnitValue for f64 {
    const UNIT: &'static str = "";
    fn parse(text: &str) -> std::result::Result<Self, String> {
        text.trim().parse().map_err(|e| format!("{text:?}: {e}"))
    }
    fn internal(self) -> f64 { self }
    fn from_internal(x: f64) -> Self { x }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Written {
    Number(f64),
    Text(String),
}

fn from_written<Q: UnitValue>(written: Written) -> std::result::Result<Q, String> {
    match written {
        Written::Text(text) => Q::parse(&text),
        Written::Number(x) if Q::UNIT.is_empty() => Ok(Q::from_internal(x)),
        // A bare number would silently assume some unit
        Written::Number(x) => Err(format!("{x} is missing its units, write e.g. \"{x} {}\"", Q::UNIT)),
    }
}

fn deserialize_value<'d, D, Q>(deserializer: D) -> std::result::Result<Q, D::Error>
where
    D: Deserializer<'d>,
    Q: UnitValue,
{
    from_written(Written::deserialize(deserializer)?).map_err(de::Error::custom)
}

fn deserialize_values<'d, D, Q>(deserializer: D) -> std::result::Result<Vec<Q>, D::Error>
where
    D: Deserializer<'d>,
    Q: UnitValue,
{
    Vec::<Written>::deserialize(deserializer)?
        .into_iter()
        .map(|w| from_written(w).map_err(de::Error::custom))
        .collect()
}

fn serialize_value<S, Q>(value: &Q, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
    Q: UnitValue,
{
    let x = value.internal();
    if Q::UNIT.is_empty() { serializer.serialize_f64(x) }
    else                  { serializer.serialize_str(&format!("{x} {}", Q::UNIT)) }
}

fn serialize_values<S, Q>(values: &[Q], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
    Q: UnitValue,
{
    if Q::UNIT.is_empty() { serializer.collect_seq(values.iter().map(|&v| v.internal())) }
    else                  { serializer.collect_seq(values.iter().map(|&v| format!("{} {}", v.internal(), Q::UNIT))) }
}

/// Histogram axis: `bins` equal intervals covering `[start, stop)`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, bound = "")]
pub struct AxisInput<Q: UnitValue> {
    #[serde(serialize_with = "serialize_value", deserialize_with = "deserialize_value")]
    pub start: Q,
    #[serde(serialize_with = "serialize_value", deserialize_with = "deserialize_value")]
    pub stop: Q,
    pub bins: usize,
}

impl<Q: UnitValue> AxisInput<Q> {
    pub fn new(start: Q, stop: Q, bins: usize) -> Self { Self { start, stop, bins } }

    pub fn axis(&self, what: &str) -> Result<Axis> {
        let (start, stop) = (self.start.internal(), self.stop.internal());
        if self.bins == 0 {
            return Err(TallyError::Config(format!("{what} axis needs at least one bin")))
        }
        if !(start < stop) {
            return Err(TallyError::Config(format!("{what} axis must increase: {start} .. {stop} {}", Q::UNIT)))
        }
        Ok(Axis::new(start, stop, self.bins))
    }
}

/// Histogram bins given by their centres, which need not be evenly spaced
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, bound = "")]
pub struct CentersInput<Q: UnitValue> {
    #[serde(serialize_with = "serialize_values", deserialize_with = "deserialize_values")]
    pub centers: Vec<Q>,
}

impl<Q: UnitValue> CentersInput<Q> {
    pub fn centers(&self, what: &str) -> Result<Centers> {
        let centers: Vec<f64> = self.centers.iter().map(|&c| c.internal()).collect();
        if centers.len() < 2 {
            return Err(TallyError::Config(format!("{what} axis needs at least two bin centres")))
        }
        if !centers.windows(2).all(|w| w[0] < w[1]) {
            return Err(TallyError::Config(format!("{what} bin centres must increase: {centers:?} {}", Q::UNIT)))
        }
        Ok(Centers::new(centers))
    }
}

/// Either `{ start, stop, bins }` or `{ centers = [...] }`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged, bound = "")]
pub enum BinsInput<Q: UnitValue> {
    Uniform(AxisInput<Q>),
    Centers(CentersInput<Q>),
}

impl<Q: UnitValue> BinsInput<Q> {
    pub fn bins(&self, what: &str) -> Result<Bins> {
        match self {
            BinsInput::Uniform(axis)    => Ok(Bins::Uniform(axis.axis(what)?)),
            BinsInput::Centers(centers) => Ok(Bins::Centers(centers.centers(what)?)),
        }
    }
}

impl<Q: UnitValue> From<AxisInput<Q>> for BinsInput<Q> {
    fn from(axis: AxisInput<Q>) -> Self { BinsInput::Uniform(axis) }
}

/// Sample points: `count` equally spaced values from `start` to `stop`
/// inclusive
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, bound = "")]
pub struct PointsInput<Q: UnitValue> {
    #[serde(serialize_with = "serialize_value", deserialize_with = "deserialize_value")]
    pub start: Q,
    #[serde(serialize_with = "serialize_value", deserialize_with = "deserialize_value")]
    pub stop: Q,
    pub count: usize,
}

impl<Q: UnitValue> PointsInput<Q> {
    pub fn new(start: Q, stop: Q, count: usize) -> Self { Self { start, stop, count } }

    pub fn points(&self, what: &str) -> Result<Points> {
        let (start, stop) = (self.start.internal(), self.stop.internal());
        if self.count == 0 {
            return Err(TallyError::Config(format!("{what} needs at least one sample point")))
        }
        if self.count > 1 && !(start < stop) {
            return Err(TallyError::Config(format!("{what} sample points must increase: {start} .. {stop} {}", Q::UNIT)))
        }
        Ok(Points::new(start, stop, self.count))
    }
}

// ----- Per-family inputs --------------------------------------------------------------
//
// Plain values precede nested tables in every struct, so that each one can be
// written back to TOML as it was read.

/// Total diffuse reflectance or transmittance
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiffuseInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub na: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RhoInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub na: Option<f64>,
    pub rho: BinsInput<Length>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AngleInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub na: Option<f64>,
    /// Polar angle from +z: reflected photons have angles beyond π/2
    pub angle: AxisInput<Angle>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RhoAndTimeInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub na: Option<f64>,
    pub rho: AxisInput<Length>,
    pub time: AxisInput<Time>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RhoAndAngleInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub na: Option<f64>,
    pub rho: AxisInput<Length>,
    pub angle: AxisInput<Angle>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct XAndYInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub na: Option<f64>,
    pub x: AxisInput<Length>,
    pub y: AxisInput<Length>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FxInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub na: Option<f64>,
    /// Spatial frequencies, 1/mm
    pub fx: PointsInput<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RhoAndOmegaInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub na: Option<f64>,
    pub rho: AxisInput<Length>,
    /// Temporal modulation frequencies
    pub omega: PointsInput<Frequency>,
}

/// A circular fibre face on the top surface
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SurfaceFiberInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub na: Option<f64>,
    #[serde(serialize_with = "serialize_value", deserialize_with = "deserialize_value")]
    pub center_x: Length,
    #[serde(serialize_with = "serialize_value", deserialize_with = "deserialize_value")]
    pub center_y: Length,
    #[serde(serialize_with = "serialize_value", deserialize_with = "deserialize_value")]
    pub radius: Length,
}

/// Total absorbed weight
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ATotalInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RhoAndZInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
    pub rho: AxisInput<Length>,
    pub z: AxisInput<Length>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct XAndYAndZInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
    pub x: AxisInput<Length>,
    pub y: AxisInput<Length>,
    pub z: AxisInput<Length>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RhoAndZAndTimeInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
    pub rho: AxisInput<Length>,
    pub z: AxisInput<Length>,
    pub time: AxisInput<Time>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FxAndZInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
    /// Spatial frequencies, 1/mm
    pub fx: PointsInput<f64>,
    pub z: AxisInput<Length>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RhoAndZAndAngleInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
    pub rho: AxisInput<Length>,
    pub z: AxisInput<Length>,
    pub angle: AxisInput<Angle>,
}

/// Reflectance of rho, reweighted for perturbed optical properties
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerturbedRhoInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub na: Option<f64>,
    pub perturbed: Vec<PerturbedRegion>,
    pub rho: AxisInput<Length>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerturbedRhoAndTimeInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub na: Option<f64>,
    pub perturbed: Vec<PerturbedRegion>,
    pub rho: AxisInput<Length>,
    pub time: AxisInput<Time>,
}

/// Momentum transfer of detected photons, split into static and dynamic
/// (moving blood) scattering
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MomentumTransferInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub na: Option<f64>,
    /// Probability, per region, that a collision is with moving scatterers
    pub blood_volume_fraction: Vec<f64>,
    /// Bins strictly between fractions 0 and 1 of dynamic momentum transfer
    pub fractional_mt_bins: usize,
    pub rho: AxisInput<Length>,
    pub z: AxisInput<Length>,
    /// Total momentum transfer, dimensionless
    pub mt: AxisInput<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeSubregionInput {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub name: Option<String>,
    #[serde(default)] pub second_moment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub na: Option<f64>,
    pub rho: AxisInput<Length>,
    pub time: AxisInput<Time>,
}

// ----- The detector selector ------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DetectorInput {
    RDiffuse(DiffuseInput),
    TDiffuse(DiffuseInput),
    ROfRho(RhoInput),
    TOfRho(RhoInput),
    ROfAngle(AngleInput),
    TOfAngle(AngleInput),
    ROfRhoAndTime(RhoAndTimeInput),
    TOfRhoAndTime(RhoAndTimeInput),
    ROfRhoAndAngle(RhoAndAngleInput),
    TOfRhoAndAngle(RhoAndAngleInput),
    ROfXAndY(XAndYInput),
    TOfXAndY(XAndYInput),
    ROfFx(FxInput),
    TOfFx(FxInput),
    ROfRhoAndOmega(RhoAndOmegaInput),
    TOfRhoAndOmega(RhoAndOmegaInput),
    SurfaceFiber(SurfaceFiberInput),

    ATotal(ATotalInput),
    AOfRhoAndZ(RhoAndZInput),
    AOfXAndYAndZ(XAndYAndZInput),
    FluenceOfRhoAndZ(RhoAndZInput),
    FluenceOfXAndYAndZ(XAndYAndZInput),
    FluenceOfRhoAndZAndTime(RhoAndZAndTimeInput),
    FluenceOfFxAndZ(FxAndZInput),
    RadianceOfRhoAndZAndAngle(RhoAndZAndAngleInput),

    #[serde(rename = "pMCROfRho")]
    PMCROfRho(PerturbedRhoInput),
    #[serde(rename = "pMCROfRhoAndTime")]
    PMCROfRhoAndTime(PerturbedRhoAndTimeInput),
    #[serde(rename = "dMCdROfRhodMua")]
    DMCdROfRhodMua(PerturbedRhoInput),
    #[serde(rename = "dMCdROfRhodMus")]
    DMCdROfRhodMus(PerturbedRhoInput),

    ReflectedMTOfRhoAndSubregionHist(MomentumTransferInput),
    TransmittedMTOfRhoAndSubregionHist(MomentumTransferInput),
    ReflectedTimeOfRhoAndSubregionHist(TimeSubregionInput),
}

impl DetectorInput {

    /// The `type` tag
    pub fn kind(&self) -> &'static str {
        use DetectorInput::*;
        match self {
            RDiffuse(_)                           => "RDiffuse",
            TDiffuse(_)                           => "TDiffuse",
            ROfRho(_)                             => "ROfRho",
            TOfRho(_)                             => "TOfRho",
            ROfAngle(_)                           => "ROfAngle",
            TOfAngle(_)                           => "TOfAngle",
            ROfRhoAndTime(_)                      => "ROfRhoAndTime",
            TOfRhoAndTime(_)                      => "TOfRhoAndTime",
            ROfRhoAndAngle(_)                     => "ROfRhoAndAngle",
            TOfRhoAndAngle(_)                     => "TOfRhoAndAngle",
            ROfXAndY(_)                           => "ROfXAndY",
            TOfXAndY(_)                           => "TOfXAndY",
            ROfFx(_)                              => "ROfFx",
            TOfFx(_)                              => "TOfFx",
            ROfRhoAndOmega(_)                     => "ROfRhoAndOmega",
            TOfRhoAndOmega(_)                     => "TOfRhoAndOmega",
            SurfaceFiber(_)                       => "SurfaceFiber",
            ATotal(_)                             => "ATotal",
            AOfRhoAndZ(_)                         => "AOfRhoAndZ",
            AOfXAndYAndZ(_)                       => "AOfXAndYAndZ",
            FluenceOfRhoAndZ(_)                   => "FluenceOfRhoAndZ",
            FluenceOfXAndYAndZ(_)                 => "FluenceOfXAndYAndZ",
            FluenceOfRhoAndZAndTime(_)            => "FluenceOfRhoAndZAndTime",
            FluenceOfFxAndZ(_)                    => "FluenceOfFxAndZ",
            RadianceOfRhoAndZAndAngle(_)          => "RadianceOfRhoAndZAndAngle",
            PMCROfRho(_)                          => "pMCROfRho",
            PMCROfRhoAndTime(_)                   => "pMCROfRhoAndTime",
            DMCdROfRhodMua(_)                     => "dMCdROfRhodMua",
            DMCdROfRhodMus(_)                     => "dMCdROfRhodMus",
            ReflectedMTOfRhoAndSubregionHist(_)   => "ReflectedMTOfRhoAndSubregionHist",
            TransmittedMTOfRhoAndSubregionHist(_) => "TransmittedMTOfRhoAndSubregionHist",
            ReflectedTimeOfRhoAndSubregionHist(_) => "ReflectedTimeOfRhoAndSubregionHist",
        }
    }

    fn given_name(&self) -> Option<&str> {
        use DetectorInput::*;
        match self {
            RDiffuse(i) | TDiffuse(i)                               => i.name.as_deref(),
            ROfRho(i) | TOfRho(i)                                   => i.name.as_deref(),
            ROfAngle(i) | TOfAngle(i)                               => i.name.as_deref(),
            ROfRhoAndTime(i) | TOfRhoAndTime(i)                     => i.name.as_deref(),
            ROfRhoAndAngle(i) | TOfRhoAndAngle(i)                   => i.name.as_deref(),
            ROfXAndY(i) | TOfXAndY(i)                               => i.name.as_deref(),
            ROfFx(i) | TOfFx(i)                                     => i.name.as_deref(),
            ROfRhoAndOmega(i) | TOfRhoAndOmega(i)                   => i.name.as_deref(),
            SurfaceFiber(i)                                         => i.name.as_deref(),
            ATotal(i)                                               => i.name.as_deref(),
            AOfRhoAndZ(i) | FluenceOfRhoAndZ(i)                     => i.name.as_deref(),
            AOfXAndYAndZ(i) | FluenceOfXAndYAndZ(i)                 => i.name.as_deref(),
            FluenceOfRhoAndZAndTime(i)                              => i.name.as_deref(),
            FluenceOfFxAndZ(i)                                      => i.name.as_deref(),
            RadianceOfRhoAndZAndAngle(i)                            => i.name.as_deref(),
            PMCROfRho(i) | DMCdROfRhodMua(i) | DMCdROfRhodMus(i)    => i.name.as_deref(),
            PMCROfRhoAndTime(i)                                     => i.name.as_deref(),
            ReflectedMTOfRhoAndSubregionHist(i)
                | TransmittedMTOfRhoAndSubregionHist(i)             => i.name.as_deref(),
            ReflectedTimeOfRhoAndSubregionHist(i)                   => i.name.as_deref(),
        }
    }

    /// The detector's name: as configured, or else its type.
    pub fn name(&self) -> String { self.given_name().unwrap_or(self.kind()).to_string() }

    /// Construct the configured detector, in its `Configured` phase.
    pub fn build(&self) -> Result<Box<dyn Detector>> {
        use DetectorInput::*;
        use Surface::{Bottom, Top};
        let name = self.name();
        let detector: Box<dyn Detector> = match self.clone() {
            RDiffuse(i)       => Box::new(surface::Diffuse      ::new(name, Top   , i)?),
            TDiffuse(i)       => Box::new(surface::Diffuse      ::new(name, Bottom, i)?),
            ROfRho(i)         => Box::new(surface::OfRho        ::new(name, Top   , i)?),
            TOfRho(i)         => Box::new(surface::OfRho        ::new(name, Bottom, i)?),
            ROfAngle(i)       => Box::new(surface::OfAngle      ::new(name, Top   , i)?),
            TOfAngle(i)       => Box::new(surface::OfAngle      ::new(name, Bottom, i)?),
            ROfRhoAndTime(i)  => Box::new(surface::OfRhoAndTime ::new(name, Top   , i)?),
            TOfRhoAndTime(i)  => Box::new(surface::OfRhoAndTime ::new(name, Bottom, i)?),
            ROfRhoAndAngle(i) => Box::new(surface::OfRhoAndAngle::new(name, Top   , i)?),
            TOfRhoAndAngle(i) => Box::new(surface::OfRhoAndAngle::new(name, Bottom, i)?),
            ROfXAndY(i)       => Box::new(surface::OfXAndY      ::new(name, Top   , i)?),
            TOfXAndY(i)       => Box::new(surface::OfXAndY      ::new(name, Bottom, i)?),
            ROfFx(i)          => Box::new(surface::OfFx         ::new(name, Top   , i)?),
            TOfFx(i)          => Box::new(surface::OfFx         ::new(name, Bottom, i)?),
            ROfRhoAndOmega(i) => Box::new(surface::OfRhoAndOmega::new(name, Top   , i)?),
            TOfRhoAndOmega(i) => Box::new(surface::OfRhoAndOmega::new(name, Bottom, i)?),
            SurfaceFiber(i)   => Box::new(surface::SurfaceFiber ::new(name, i)?),

            ATotal(i)                    => Box::new(volume::ATotal     ::new(name, i)),
            AOfRhoAndZ(i)                => Box::new(volume::OfRhoAndZ  ::new(name, Deposit::Absorbed, i)?),
            FluenceOfRhoAndZ(i)          => Box::new(volume::OfRhoAndZ  ::new(name, Deposit::Fluence , i)?),
            AOfXAndYAndZ(i)              => Box::new(volume::OfXAndYAndZ::new(name, Deposit::Absorbed, i)?),
            FluenceOfXAndYAndZ(i)        => Box::new(volume::OfXAndYAndZ::new(name, Deposit::Fluence , i)?),
            FluenceOfRhoAndZAndTime(i)   => Box::new(volume::FluenceOfRhoAndZAndTime  ::new(name, i)?),
            FluenceOfFxAndZ(i)           => Box::new(volume::FluenceOfFxAndZ          ::new(name, i)?),
            RadianceOfRhoAndZAndAngle(i) => Box::new(volume::RadianceOfRhoAndZAndAngle::new(name, i)?),

            PMCROfRho(i)        => Box::new(perturbation::PMCROfRho::new(name, RhoEstimate::Perturbed                 , i)?),
            DMCdROfRhodMua(i)   => Box::new(perturbation::PMCROfRho::new(name, RhoEstimate::Derivative(Parameter::Mua), i)?),
            DMCdROfRhodMus(i)   => Box::new(perturbation::PMCROfRho::new(name, RhoEstimate::Derivative(Parameter::Mus), i)?),
            PMCROfRhoAndTime(i) => Box::new(perturbation::PMCROfRhoAndTime::new(name, i)?),

            ReflectedMTOfRhoAndSubregionHist(i)   => Box::new(momentum::MTOfRhoAndSubregionHist::new(name, Top   , i)?),
            TransmittedMTOfRhoAndSubregionHist(i) => Box::new(momentum::MTOfRhoAndSubregionHist::new(name, Bottom, i)?),
            ReflectedTimeOfRhoAndSubregionHist(i) => Box::new(time::TimeOfRhoAndSubregionHist::new(name, i)?),
        };
        Ok(detector)
    }
}

// ----- Whole configuration file -----------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default, rename = "detector")]
    pub detectors: Vec<DetectorInput>,
}

impl Config {
    /// Build every configured detector. Detector names must be unique, as
    /// they name the output files.
    pub fn build(&self) -> Result<Vec<Box<dyn Detector>>> {
        if let Some(name) = self.detectors.iter().map(DetectorInput::name).duplicates().next() {
            return Err(TallyError::Config(format!("more than one detector called {name}")))
        }
        self.detectors.iter().map(DetectorInput::build).collect()
    }
}

pub fn read_config_file(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&text)?;
    info!(path = %path.display(), detectors = config.detectors.len(), "read detector configuration");
    Ok(config)
}
