//! Calorimeter cell digitization simulator
//!
//! This crate models the readout chain of a calorimeter cell, from the
//! energy deposited in a scintillating crystal to the reconstructed energy
//! after SiPM detection and multi-range ADC digitization. Each stage of the
//! chain can be run on its own or as a whole, event by event, with a seeded
//! random stream so runs are reproducible.

pub mod algo;
pub mod digitizer;
pub mod hardware;
pub mod io;
pub mod shared_args;
pub mod sims;

// Re-exports for easier access
pub use algo::random::RandomSource;
pub use digitizer::{AnyStage, EventTrace, Stage, StageKind};
pub use hardware::gain_range::{select_gain_range, GainRange};
pub use hardware::noise_energy::EquivalentNoiseEnergy;
pub use hardware::parameters::{names, DetectorParameters};
pub use hardware::sipm_response::ResponseCurve;
pub use hardware::CrossTalkLaw;
pub use sims::driver::{DriverConfig, RunReport, SimulationDriver};
