//! Errors raised by the tally subsystem

use std::io;
use thiserror::Error;

use crate::tally::Phase;

pub type Result<T> = std::result::Result<T, TallyError>;

#[derive(Error, Debug)]
pub enum TallyError {
    /// Lifecycle operation attempted in the wrong phase
    #[error("{detector}: cannot {operation} while {phase:?}")]
    Phase { detector: String, operation: &'static str, phase: Phase },

    /// Analytic derivatives are implemented for one perturbed region only
    #[error("{detector}: derivative requested with {regions} perturbed regions, only 1 is supported")]
    MultiRegionDerivative { detector: String, regions: usize },

    /// A region index outside the tissue
    #[error("{detector}: region {region} does not exist in tissue with {count} regions")]
    NoSuchRegion { detector: String, region: usize, count: usize },

    /// Arrays that must agree in shape do not
    #[error("shape mismatch in {what}: expected {expected:?}, got {actual:?}")]
    Shape { what: String, expected: Vec<usize>, actual: Vec<usize> },

    /// Two detector sets that should be reduced together are not compatible
    #[error("cannot merge {this} with {other}")]
    Incompatible { this: String, other: String },

    /// Detector configuration cannot be used with this tissue
    #[error("{detector}: {reason}")]
    Unsupported { detector: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("binary array: {0}")]
    Binary(#[from] binrw::Error),

    #[error(transparent)]
    TomlRead(#[from] toml::de::Error),

    #[error(transparent)]
    TomlWrite(#[from] toml::ser::Error),
}
