//! Per-event digitization stages
//!
//! Four stages share one capability, [`Stage`]: turn a deposited energy into
//! a reconstructed energy plus a trace of the intermediate values.
//!
//! - `scintillation`: photon generation, attenuation and light-yield jitter
//! - `sipm`: saturation, dark counts with cross-talk, gain spread
//! - `adc`: three-range ADC digitization of an ideal photoelectron count
//! - `total`: the full chain in one event
//!
//! Stages borrow a [`DetectorParameters`] for their lifetime and own their
//! random stream. The trace of the last event is kept by the stage and
//! overwritten on every call.

pub mod adc;
pub mod scintillation;
pub mod sipm;
pub mod total;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::algo::random::RandomSource;
use crate::hardware::noise_energy::EquivalentNoiseEnergy;
use crate::hardware::parameters::{names, DetectorParameters};

pub use adc::{AdcStage, AdcTrace};
pub use scintillation::{ScintillationStage, ScintillationTrace};
pub use sipm::{SipmStage, SipmTrace};
pub use total::{TotalStage, TotalTrace};

/// Which part of the readout chain a stage models.
///
/// Parsed case-insensitively from the slug, so both `sipm` and `SiPM` name
/// the SiPM stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Scintillation,
    Sipm,
    Adc,
    Total,
}

impl StageKind {
    /// Run order used when all stages are requested
    pub const ALL: [StageKind; 4] = [
        StageKind::Scintillation,
        StageKind::Sipm,
        StageKind::Adc,
        StageKind::Total,
    ];

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Scintillation => "Scintillation",
            StageKind::Sipm => "SiPM",
            StageKind::Adc => "ADC",
            StageKind::Total => "Total",
        }
    }

    /// Lowercase name used in file names and on the command line
    pub fn slug(&self) -> &'static str {
        match self {
            StageKind::Scintillation => "scintillation",
            StageKind::Sipm => "sipm",
            StageKind::Adc => "adc",
            StageKind::Total => "total",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown digitizer '{0}', expected one of scintillation, sipm, adc, total")]
pub struct StageParseError(pub String);

impl FromStr for StageKind {
    type Err = StageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageKind::ALL
            .into_iter()
            .find(|kind| kind.slug().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| StageParseError(s.to_string()))
    }
}

/// Intermediate values of one digitized event
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum EventTrace {
    Scintillation(ScintillationTrace),
    Sipm(SipmTrace),
    Adc(AdcTrace),
    Total(TotalTrace),
}

impl EventTrace {
    pub fn kind(&self) -> StageKind {
        match self {
            EventTrace::Scintillation(_) => StageKind::Scintillation,
            EventTrace::Sipm(_) => StageKind::Sipm,
            EventTrace::Adc(_) => StageKind::Adc,
            EventTrace::Total(_) => StageKind::Total,
        }
    }

    /// Named values in a fixed column order
    pub fn fields(&self) -> Vec<(&'static str, f64)> {
        match self {
            EventTrace::Scintillation(t) => t.fields(),
            EventTrace::Sipm(t) => t.fields(),
            EventTrace::Adc(t) => t.fields(),
            EventTrace::Total(t) => t.fields(),
        }
    }

    pub fn input_energy(&self) -> f64 {
        match self {
            EventTrace::Scintillation(t) => t.input_energy,
            EventTrace::Sipm(t) => t.input_energy,
            EventTrace::Adc(t) => t.input_energy,
            EventTrace::Total(t) => t.input_energy,
        }
    }

    pub fn output_energy(&self) -> f64 {
        match self {
            EventTrace::Scintillation(t) => t.output_energy,
            EventTrace::Sipm(t) => t.output_energy,
            EventTrace::Adc(t) => t.output_energy,
            EventTrace::Total(t) => t.output_energy,
        }
    }
}

/// A digitization stage: `digitize(energy) -> (energy, trace)`.
pub trait Stage {
    fn kind(&self) -> StageKind;

    /// Digitize one event. Every stochastic draw goes through the stage's
    /// own random stream, in program order.
    fn digitize(&mut self, energy: f64) -> (f64, EventTrace);

    /// Trace of the most recent event
    fn last_trace(&self) -> EventTrace;

    /// The stage's random stream, also used by the driver for uniform sampling
    fn random(&mut self) -> &mut RandomSource;

    /// Called once before the first event of a run
    fn begin_run(&mut self) {}

    /// Called once after the last event of a run
    fn end_run(&mut self) {}

    /// Run-level equivalent noise energy, for stages that compute one
    fn equivalent_noise(&self) -> Option<EquivalentNoiseEnergy> {
        None
    }
}

/// Any of the four stages, dispatched by kind
#[derive(Debug, Clone)]
pub enum AnyStage<'a> {
    Scintillation(ScintillationStage<'a>),
    Sipm(SipmStage<'a>),
    Adc(AdcStage<'a>),
    Total(TotalStage<'a>),
}

impl<'a> AnyStage<'a> {
    pub fn new(kind: StageKind, params: &'a DetectorParameters, seed: u64) -> Self {
        match kind {
            StageKind::Scintillation => {
                AnyStage::Scintillation(ScintillationStage::new(params, seed))
            }
            StageKind::Sipm => AnyStage::Sipm(SipmStage::new(params, seed)),
            StageKind::Adc => AnyStage::Adc(AdcStage::new(params, seed)),
            StageKind::Total => AnyStage::Total(TotalStage::new(params, seed)),
        }
    }

    fn inner(&self) -> &dyn Stage {
        match self {
            AnyStage::Scintillation(s) => s,
            AnyStage::Sipm(s) => s,
            AnyStage::Adc(s) => s,
            AnyStage::Total(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Stage {
        match self {
            AnyStage::Scintillation(s) => s,
            AnyStage::Sipm(s) => s,
            AnyStage::Adc(s) => s,
            AnyStage::Total(s) => s,
        }
    }
}

impl Stage for AnyStage<'_> {
    fn kind(&self) -> StageKind {
        self.inner().kind()
    }

    fn digitize(&mut self, energy: f64) -> (f64, EventTrace) {
        self.inner_mut().digitize(energy)
    }

    fn last_trace(&self) -> EventTrace {
        self.inner().last_trace()
    }

    fn random(&mut self) -> &mut RandomSource {
        self.inner_mut().random()
    }

    fn begin_run(&mut self) {
        self.inner_mut().begin_run()
    }

    fn end_run(&mut self) {
        self.inner_mut().end_run()
    }

    fn equivalent_noise(&self) -> Option<EquivalentNoiseEnergy> {
        self.inner().equivalent_noise()
    }
}

/// Light yield chain common to every stage: photons per MeV at the crystal
/// times the survival and detection probabilities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Calibration {
    pub intrinsic_ly: f64,
    pub attenuation: f64,
    pub pde: f64,
}

impl Calibration {
    pub fn from_parameters(params: &DetectorParameters) -> Self {
        Self {
            intrinsic_ly: params.get(names::CRY_INT_LY),
            attenuation: params.get(names::CRY_ATTENUATION),
            pde: params.get(names::SIPM_PDE),
        }
    }

    /// Photons reaching the SiPM per MeV
    pub fn photons_per_mev(&self) -> f64 {
        self.intrinsic_ly * self.attenuation
    }

    /// Photoelectrons per MeV
    pub fn pe_per_mev(&self) -> f64 {
        self.photons_per_mev() * self.pde
    }
}
