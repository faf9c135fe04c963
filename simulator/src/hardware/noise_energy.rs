//! Equivalent noise energy of the readout per gain range
//!
//! The electronics noise floor of each gain range expressed in MeV, together
//! with the channel-energy interval over which that range is active. Range
//! boundaries are the ADC switch threshold translated into energy at each
//! range's gain.

use serde::Serialize;

use crate::hardware::gain_range::{AdcSettings, GainRange};
use crate::hardware::parameters::{names, DetectorParameters};

/// Lower edge of the high-gain interval (MeV)
pub const LOWEST_CHANNEL_ENERGY: f64 = 0.1;

/// Noise floor of one gain range
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RangeNoise {
    pub range: GainRange,
    /// Equivalent noise energy (MeV)
    pub ene: f64,
    /// Channel-energy interval `[low, high)` served by this range (MeV)
    pub energy_low: f64,
    pub energy_high: f64,
}

/// Equivalent noise energy for the three gain ranges
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquivalentNoiseEnergy {
    pub ranges: [RangeNoise; 3],
}

impl EquivalentNoiseEnergy {
    /// Derive the ENE vector from the current parameters.
    ///
    /// `ENE_i = sqrt(fee_i^2 + asic^2) / gain_i / effective_ly` and the upper
    /// edge of range `i` is `(trunc(switch) - pedestal) / gain_i / effective_ly`.
    pub fn from_parameters(params: &DetectorParameters) -> Self {
        let settings = AdcSettings::from_parameters(params);
        let effective_ly = params.get(names::CRY_EFF_LY);

        let mut lower = LOWEST_CHANNEL_ENERGY;
        let ranges = GainRange::ALL.map(|range| {
            let gain = settings.gain(range);
            let upper = (settings.switch_threshold - settings.pedestal) / gain / effective_ly;
            let noise = RangeNoise {
                range,
                ene: settings.noise_sigma(range) / gain / effective_ly,
                energy_low: lower,
                energy_high: upper,
            };
            lower = upper;
            noise
        });

        Self { ranges }
    }

    /// Noise floor of the range serving a channel energy, if any
    pub fn at_energy(&self, energy: f64) -> Option<&RangeNoise> {
        self.ranges
            .iter()
            .find(|r| energy >= r.energy_low && energy < r.energy_high)
    }

    pub fn range(&self, range: GainRange) -> &RangeNoise {
        &self.ranges[(range.number() - 1) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_ene() {
        let ene = EquivalentNoiseEnergy::from_parameters(&DetectorParameters::default());

        let high = ene.range(GainRange::High);
        assert_relative_eq!(high.ene, (25.0f64 + 16.0).sqrt() / 5.0 / 150.0);
        assert_eq!(high.energy_low, LOWEST_CHANNEL_ENERGY);
        assert_relative_eq!(high.energy_high, 7950.0 / 5.0 / 150.0);

        let mid = ene.range(GainRange::Mid);
        let fee_mid = 5.0 / 30.0;
        assert_relative_eq!(
            mid.ene,
            (fee_mid * fee_mid + 16.0f64).sqrt() / (5.0 / 30.0) / 150.0
        );
        assert_eq!(mid.energy_low, high.energy_high);
        assert_relative_eq!(mid.energy_high, 7950.0 / (5.0 / 30.0) / 150.0);

        let low = ene.range(GainRange::Low);
        assert_eq!(low.energy_low, mid.energy_high);
        assert_relative_eq!(low.energy_high, 7950.0 / (5.0 / 300.0) / 150.0);
    }

    #[test]
    fn test_fractional_switch_matches_selector() {
        let mut params = DetectorParameters::default();
        params.set(names::ADC_SWITCH, 8000.7);
        let ene = EquivalentNoiseEnergy::from_parameters(&params);
        let settings = AdcSettings::from_parameters(&params);

        let high_edge = ene.range(GainRange::High).energy_high;
        assert_relative_eq!(high_edge, 7950.0 / 5.0 / 150.0);
        assert_relative_eq!(
            high_edge * 150.0 * settings.gain(GainRange::High) + settings.pedestal,
            settings.switch_threshold
        );
    }

    #[test]
    fn test_noise_grows_with_lower_gain() {
        let ene = EquivalentNoiseEnergy::from_parameters(&DetectorParameters::default());
        assert!(ene.ranges[0].ene < ene.ranges[1].ene);
        assert!(ene.ranges[1].ene < ene.ranges[2].ene);
    }

    #[test]
    fn test_lookup_by_energy() {
        let ene = EquivalentNoiseEnergy::from_parameters(&DetectorParameters::default());
        assert_eq!(ene.at_energy(5.0).unwrap().range, GainRange::High);
        assert_eq!(ene.at_energy(100.0).unwrap().range, GainRange::Mid);
        assert_eq!(ene.at_energy(2000.0).unwrap().range, GainRange::Low);
        assert!(ene.at_energy(0.01).is_none());
        assert!(ene.at_energy(1.0e6).is_none());
    }
}
