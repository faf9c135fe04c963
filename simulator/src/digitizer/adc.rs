//! ADC-only digitizer
//!
//! Digitizes the ideal photoelectron count of a deposit with the three-range
//! gain selector. No scintillation or SiPM fluctuations are modeled, so the
//! output isolates the electronics noise and the range quantization.

use serde::Serialize;

use crate::algo::random::RandomSource;
use crate::digitizer::{Calibration, EventTrace, Stage, StageKind};
use crate::hardware::gain_range::{select_gain_range, AdcSettings};
use crate::hardware::parameters::DetectorParameters;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AdcTrace {
    pub input_energy: f64,
    pub pe: f64,
    /// First draw at high gain
    pub initial_code: f64,
    pub adc_mean: f64,
    pub adc_sigma: f64,
    /// Kept code of the selected range
    pub code: f64,
    /// 1 = high, 2 = mid, 3 = low
    pub gain_range: f64,
    pub output_energy: f64,
}

impl AdcTrace {
    pub fn fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("input_energy", self.input_energy),
            ("pe", self.pe),
            ("initial_code", self.initial_code),
            ("adc_mean", self.adc_mean),
            ("adc_sigma", self.adc_sigma),
            ("code", self.code),
            ("gain_range", self.gain_range),
            ("output_energy", self.output_energy),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct AdcStage<'a> {
    params: &'a DetectorParameters,
    rng: RandomSource,
    trace: AdcTrace,
}

impl<'a> AdcStage<'a> {
    pub fn new(params: &'a DetectorParameters, seed: u64) -> Self {
        Self {
            params,
            rng: RandomSource::from_seed(seed),
            trace: AdcTrace::default(),
        }
    }

    pub fn trace(&self) -> &AdcTrace {
        &self.trace
    }
}

impl Stage for AdcStage<'_> {
    fn kind(&self) -> StageKind {
        StageKind::Adc
    }

    fn digitize(&mut self, energy: f64) -> (f64, EventTrace) {
        let calibration = Calibration::from_parameters(self.params);
        let settings = AdcSettings::from_parameters(self.params);

        let pe = energy * calibration.pe_per_mev();
        let selection = select_gain_range(&mut self.rng, pe, &settings, settings.max_code());

        let output_energy =
            (selection.code - settings.pedestal) / selection.gain / calibration.pe_per_mev();

        self.trace = AdcTrace {
            input_energy: energy,
            pe,
            initial_code: selection.nominal_code,
            adc_mean: selection.adc_mean,
            adc_sigma: selection.adc_sigma,
            code: selection.code,
            gain_range: selection.range.number() as f64,
            output_energy,
        };

        (output_energy, EventTrace::Adc(self.trace))
    }

    fn last_trace(&self) -> EventTrace {
        EventTrace::Adc(self.trace)
    }

    fn random(&mut self) -> &mut RandomSource {
        &mut self.rng
    }
}
