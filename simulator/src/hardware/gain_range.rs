//! Three-range ADC gain switching
//!
//! The readout digitizes each signal at the highest gain first. If that code
//! overflows the switch threshold the channel falls back to a lower gain and
//! the code is drawn again at the reduced gain and front-end noise. Exactly
//! one range is selected per event and the final code is always the draw made
//! at that range.

use serde::Serialize;

use crate::algo::misc::round_count;
use crate::algo::random::RandomSource;
use crate::hardware::parameters::{names, DetectorParameters};

/// Active ADC gain range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GainRange {
    High,
    Mid,
    Low,
}

impl GainRange {
    pub const ALL: [GainRange; 3] = [GainRange::High, GainRange::Mid, GainRange::Low];

    /// 1-based range number as recorded in traces
    pub fn number(&self) -> u8 {
        match self {
            GainRange::High => 1,
            GainRange::Mid => 2,
            GainRange::Low => 3,
        }
    }
}

/// ADC front-end configuration read from the parameter store
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcSettings {
    /// ADC counts per photoelectron at high gain
    pub gain_mean: f64,
    pub fee_noise: f64,
    pub asic_noise: f64,
    pub pedestal: f64,
    pub switch_threshold: f64,
    pub ratio_12: f64,
    pub ratio_23: f64,
    pub bits: u32,
}

impl AdcSettings {
    pub fn from_parameters(params: &DetectorParameters) -> Self {
        Self {
            gain_mean: params.get(names::SIPM_GAIN_MEAN),
            fee_noise: params.get(names::FEE_NOISE),
            asic_noise: params.get(names::ASIC_NOISE),
            pedestal: params.get(names::PEDESTAL),
            // Integer parameters are truncated like the hardware registers
            switch_threshold: params.get(names::ADC_SWITCH).trunc(),
            ratio_12: params.get(names::GAIN_RATIO_12),
            ratio_23: params.get(names::GAIN_RATIO_23),
            bits: params.get(names::ADC_BITS).max(0.0) as u32,
        }
    }

    /// Total gain reduction relative to the high range
    pub fn reduction(&self, range: GainRange) -> f64 {
        match range {
            GainRange::High => 1.0,
            GainRange::Mid => self.ratio_12,
            GainRange::Low => self.ratio_12 * self.ratio_23,
        }
    }

    /// ADC counts per photoelectron in `range`
    pub fn gain(&self, range: GainRange) -> f64 {
        self.gain_mean / self.reduction(range)
    }

    /// Front-end noise in `range`; the ASIC noise does not scale with gain
    pub fn fee_noise(&self, range: GainRange) -> f64 {
        self.fee_noise / self.reduction(range)
    }

    /// Combined electronics noise in `range`
    pub fn noise_sigma(&self, range: GainRange) -> f64 {
        let fee = self.fee_noise(range);
        (fee * fee + self.asic_noise * self.asic_noise).sqrt()
    }

    /// Largest representable code, `2^bits - 1`
    pub fn max_code(&self) -> f64 {
        2f64.powi(self.bits as i32) - 1.0
    }
}

/// Outcome of the gain-range decision for one event
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GainSelection {
    pub range: GainRange,
    /// Gain of the selected range (ADC/pe)
    pub gain: f64,
    pub fee_noise: f64,
    pub asic_noise: f64,
    /// Mean and sigma of the kept draw
    pub adc_mean: f64,
    pub adc_sigma: f64,
    /// First draw at high gain
    pub nominal_code: f64,
    /// Kept code of the selected range
    pub code: f64,
}

/// Select the gain range for a signal of `signal_pe` photoelectrons.
///
/// 1. draw the code at high gain, round, clamp at zero
/// 2. `code <= switch` keeps that draw in the high range
/// 3. `trunc(code / ratio_12) <= switch` redraws at mid gain
/// 4. otherwise redraws at low gain and clamps at `low_ceiling`
pub fn select_gain_range(
    rng: &mut RandomSource,
    signal_pe: f64,
    settings: &AdcSettings,
    low_ceiling: f64,
) -> GainSelection {
    let high_mean = signal_pe * settings.gain_mean + settings.pedestal;
    let high_sigma = settings.noise_sigma(GainRange::High);
    let nominal_code = round_count(rng.gaus(high_mean, high_sigma));

    let switch = settings.switch_threshold;
    let range = if nominal_code <= switch {
        GainRange::High
    } else if (nominal_code / settings.ratio_12).trunc() <= switch {
        GainRange::Mid
    } else {
        GainRange::Low
    };

    let gain = settings.gain(range);
    let (adc_mean, adc_sigma, code) = match range {
        GainRange::High => (high_mean, high_sigma, nominal_code),
        GainRange::Mid | GainRange::Low => {
            let mean = signal_pe * gain + settings.pedestal;
            let sigma = settings.noise_sigma(range);
            let mut code = round_count(rng.gaus(mean, sigma));
            if range == GainRange::Low && code > low_ceiling {
                code = low_ceiling;
            }
            (mean, sigma, code)
        }
    };

    GainSelection {
        range,
        gain,
        fee_noise: settings.fee_noise(range),
        asic_noise: settings.asic_noise,
        adc_mean,
        adc_sigma,
        nominal_code,
        code,
    }
}
