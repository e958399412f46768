//! Detectors for Monte Carlo simulations of photon transport in turbid media.
//!
//! The random walks themselves happen elsewhere. Every completed photon is
//! handed, as a [`Photon`] history, to a set of [`Detector`]s, which
//! accumulate it into histograms of reflectance, transmittance, absorption,
//! fluence, momentum transfer and their perturbation estimates. Once all
//! photons have been seen, the histograms are normalized into per-photon
//! densities and written out.

pub mod error;
pub mod index;
pub mod axis;
pub mod photon;
pub mod tissue;
pub mod weighting;
pub mod histogram;
pub mod tally;
pub mod perturbation;
pub mod normalize;
pub mod io;
pub mod detector;
pub mod detectors;
pub mod config;
pub mod controller;
pub mod utils;

pub use axis::{Axis, Points};
pub use config::{read_config_file, Config, DetectorInput};
pub use controller::DetectorController;
pub use detector::{Detector, Surface};
pub use error::{Result, TallyError};
pub use photon::{Fate, HistoryBuilder, Photon, PhotonState, SubRegionInfo};
pub use tally::Phase;
pub use tissue::{OpticalProperties, Tissue};
pub use weighting::AbsorptionWeighting;
