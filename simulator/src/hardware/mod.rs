//! Hardware models for the calorimeter cell readout

pub mod crosstalk;
pub mod gain_range;
pub mod noise_energy;
pub mod parameters;
pub mod sipm_response;

pub use crosstalk::CrossTalkLaw;
pub use gain_range::{select_gain_range, AdcSettings, GainRange, GainSelection};
pub use noise_energy::EquivalentNoiseEnergy;
pub use parameters::DetectorParameters;
pub use sipm_response::{ResponseCurve, ResponseCurveError};
