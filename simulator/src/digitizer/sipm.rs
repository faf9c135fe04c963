//! SiPM photon-to-charge conversion
//!
//! Saturation of the photoelectron count, dark pulses with cross-talk
//! cascades, single-cell gain spread and the dark-pedestal subtraction.
//! Verbosity 0 replaces the saturation model with a Poisson draw scaled by
//! the mean cross-talk gain; verbosity 2 and above corrects the reconstructed
//! count through the inverse response curve.

use serde::Serialize;

use crate::algo::misc::clamp_non_negative;
use crate::algo::random::RandomSource;
use crate::digitizer::{Calibration, EventTrace, Stage, StageKind};
use crate::hardware::parameters::{names, DetectorParameters};

/// Below this many photoelectrons the saturation curve is not used
pub const SATURATION_MODEL_MIN_PE: f64 = 100.0;

/// Verbosity from which the inverse response correction is applied
pub const CORRECTION_VERBOSITY: f64 = 2.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SipmTrace {
    pub input_energy: f64,
    /// Ideal photoelectron count
    pub pe: f64,
    pub pe_saturated: f64,
    /// Primary dark pulses in the gate
    pub dark_pulses: f64,
    /// Fired cells from dark pulses including cross-talk
    pub dark_cells: f64,
    pub pe_total: f64,
    /// Charge expressed in photoelectrons
    pub pe_charge: f64,
    pub pe_pedestal_subtracted: f64,
    /// Pedestal-subtracted count after the optional inverse correction
    pub pe_corrected: f64,
    pub output_energy: f64,
}

impl SipmTrace {
    pub fn fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("input_energy", self.input_energy),
            ("pe", self.pe),
            ("pe_saturated", self.pe_saturated),
            ("dark_pulses", self.dark_pulses),
            ("dark_cells", self.dark_cells),
            ("pe_total", self.pe_total),
            ("pe_charge", self.pe_charge),
            ("pe_pedestal_subtracted", self.pe_pedestal_subtracted),
            ("pe_corrected", self.pe_corrected),
            ("output_energy", self.output_energy),
        ]
    }
}

/// SiPM quantities read once per event
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SipmSettings {
    pub verbosity: f64,
    pub crosstalk: f64,
    pub dark_rate: f64,
    pub gate_time: f64,
    pub gain_mean: f64,
    pub gain_sigma: f64,
}

impl SipmSettings {
    pub fn from_parameters(params: &DetectorParameters) -> Self {
        Self {
            verbosity: params.get(names::SIPM_VERBOSE),
            crosstalk: params.get(names::SIPM_CROSSTALK),
            dark_rate: params.get(names::SIPM_DCR),
            gate_time: params.get(names::GATE_TIME),
            gain_mean: params.get(names::SIPM_GAIN_MEAN),
            gain_sigma: params.get(names::SIPM_GAIN_SIGMA),
        }
    }

    /// Mean dark pulses per gate
    pub fn dark_mean(&self) -> f64 {
        self.dark_rate * self.gate_time
    }

    /// Mean fired cells from dark pulses, the pedestal shift in photoelectrons
    pub fn dark_pedestal(&self) -> f64 {
        self.dark_mean() * (1.0 + self.crosstalk)
    }

    pub fn corrects_saturation(&self) -> bool {
        self.verbosity >= CORRECTION_VERBOSITY
    }
}

/// Signal and dark counts at the SiPM output, in fired cells
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SipmResponse {
    pub saturated: f64,
    pub dark_pulses: f64,
    pub dark_cells: f64,
    pub total: f64,
    /// Charge in ADC-equivalent units, clamped at zero
    pub charge: f64,
}

impl SipmResponse {
    /// Charge converted back to photoelectrons
    pub fn charge_pe(&self, settings: &SipmSettings) -> f64 {
        self.charge / settings.gain_mean
    }

    pub fn pedestal_subtracted(&self, settings: &SipmSettings) -> f64 {
        self.charge_pe(settings) - settings.dark_pedestal()
    }
}

/// SiPM response to `pe` photoelectrons, shared with the full-chain stage
pub(crate) fn sipm_response(
    rng: &mut RandomSource,
    params: &DetectorParameters,
    settings: &SipmSettings,
    pe: f64,
) -> SipmResponse {
    let saturated = saturate(rng, params, settings, pe);

    let dark_pulses = rng.poisson(settings.dark_mean());
    let dark_cells = params.crosstalk_law().sample_total(dark_pulses as u64, rng) as f64;

    let total = saturated + dark_cells;
    let gain_spread = settings.gain_mean * settings.gain_sigma;
    let charge = clamp_non_negative(rng.gaus(
        total * settings.gain_mean,
        (total * gain_spread * gain_spread).sqrt(),
    ));

    SipmResponse {
        saturated,
        dark_pulses,
        dark_cells,
        total,
        charge,
    }
}

/// Saturated fired-cell count for `pe` photoelectrons
fn saturate(
    rng: &mut RandomSource,
    params: &DetectorParameters,
    settings: &SipmSettings,
    pe: f64,
) -> f64 {
    let fired = if settings.verbosity == 0.0 || pe < SATURATION_MODEL_MIN_PE {
        rng.poisson(pe) * (1.0 + settings.crosstalk)
    } else {
        let curve = params.response_curve();
        let mean = curve.eval(pe);
        rng.gaus(mean, curve.sigma(mean))
    };
    clamp_non_negative(fired)
}

/// SiPM-only digitizer starting from the ideal photoelectron count
#[derive(Debug, Clone)]
pub struct SipmStage<'a> {
    params: &'a DetectorParameters,
    rng: RandomSource,
    trace: SipmTrace,
}

impl<'a> SipmStage<'a> {
    pub fn new(params: &'a DetectorParameters, seed: u64) -> Self {
        Self {
            params,
            rng: RandomSource::from_seed(seed),
            trace: SipmTrace::default(),
        }
    }

    pub fn trace(&self) -> &SipmTrace {
        &self.trace
    }
}

impl Stage for SipmStage<'_> {
    fn kind(&self) -> StageKind {
        StageKind::Sipm
    }

    fn digitize(&mut self, energy: f64) -> (f64, EventTrace) {
        let calibration = Calibration::from_parameters(self.params);
        let settings = SipmSettings::from_parameters(self.params);

        let pe = energy * calibration.pe_per_mev();
        let response = sipm_response(&mut self.rng, self.params, &settings, pe);
        let pedestal_subtracted = response.pedestal_subtracted(&settings);

        let corrected = if settings.corrects_saturation() {
            self.params
                .response_curve()
                .invert_clamped(pedestal_subtracted)
        } else {
            pedestal_subtracted
        };
        let output_energy = corrected / calibration.pe_per_mev();

        self.trace = SipmTrace {
            input_energy: energy,
            pe,
            pe_saturated: response.saturated,
            dark_pulses: response.dark_pulses,
            dark_cells: response.dark_cells,
            pe_total: response.total,
            pe_charge: response.charge_pe(&settings),
            pe_pedestal_subtracted: pedestal_subtracted,
            pe_corrected: corrected,
            output_energy,
        };

        (output_energy, EventTrace::Sipm(self.trace))
    }

    fn last_trace(&self) -> EventTrace {
        EventTrace::Sipm(self.trace)
    }

    fn random(&mut self) -> &mut RandomSource {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::stats::RunningStats;
    use approx::assert_relative_eq;

    fn mean_output(params: &DetectorParameters, energy: f64, events: usize) -> f64 {
        let mut stage = SipmStage::new(params, 12);
        let mut stats = RunningStats::new();
        for _ in 0..events {
            stats.push(stage.digitize(energy).0);
        }
        stats.mean()
    }

    #[test]
    fn test_linear_mode_scales_by_crosstalk() {
        let mut params = DetectorParameters::default();
        params.set(names::SIPM_VERBOSE, 0.0);
        // 100 MeV -> 15,000 pe, Poisson times 1.12, dark pedestal removed
        assert_relative_eq!(
            mean_output(&params, 100.0, 2000),
            112.0,
            max_relative = 0.005
        );

        params.set(names::SIPM_CROSSTALK, 0.0);
        assert_relative_eq!(
            mean_output(&params, 100.0, 2000),
            100.0,
            max_relative = 0.005
        );
    }

    #[test]
    fn test_saturation_model_above_threshold() {
        let params = DetectorParameters::default();
        let mut stage = SipmStage::new(&params, 3);
        stage.digitize(100.0);

        let trace = stage.trace();
        let expected = params.response_curve().eval(15_000.0);
        let sigma = params.response_curve().sigma(expected);
        assert_eq!(trace.pe, 15_000.0);
        assert!((trace.pe_saturated - expected).abs() < 6.0 * sigma);
        assert_eq!(trace.pe_corrected, trace.pe_pedestal_subtracted);
    }

    #[test]
    fn test_inverse_correction_recovers_true_count() {
        let mut params = DetectorParameters::default();
        params.set(names::SIPM_VERBOSE, 2.0);
        assert_relative_eq!(mean_output(&params, 500.0, 500), 500.0, max_relative = 0.01);

        let mut stage = SipmStage::new(&params, 9);
        stage.digitize(500.0);
        let trace = stage.trace();
        assert_ne!(trace.pe_corrected, trace.pe_pedestal_subtracted);
    }

    #[test]
    fn test_dark_counts_without_signal() {
        let mut params = DetectorParameters::default();
        params.set(names::SIPM_DCR, 1.0e8);
        let mut stage = SipmStage::new(&params, 17);

        let mut pulses = RunningStats::new();
        let mut cells = RunningStats::new();
        for _ in 0..5000 {
            stage.digitize(0.0);
            let trace = stage.trace();
            assert!(trace.dark_cells >= trace.dark_pulses);
            assert!(trace.pe_charge >= 0.0);
            pulses.push(trace.dark_pulses);
            cells.push(trace.dark_cells);
        }
        // 1e8 Hz over 150 ns
        assert_relative_eq!(pulses.mean(), 15.0, max_relative = 0.02);
        let multiplicity = params.crosstalk_law().mean_multiplicity();
        assert_relative_eq!(cells.mean(), 15.0 * multiplicity, max_relative = 0.03);
    }

    #[test]
    fn test_pedestal_offset() {
        let settings = SipmSettings::from_parameters(&DetectorParameters::default());
        assert_relative_eq!(settings.dark_mean(), 0.375, max_relative = 1e-12);
        assert_relative_eq!(settings.dark_pedestal(), 0.42, max_relative = 1e-12);
    }
}
