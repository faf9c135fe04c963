//! Full readout chain: crystal, SiPM and three-range ADC in one event
//!
//! Differences from running the stages one after another:
//! - the SiPM sees `round(photons * PDE)` photoelectrons
//! - the pedestal-subtracted signal is clamped at zero and scaled by the
//!   fraction of the pulse inside the gate before digitization
//! - the low range clamps at the switch threshold rather than full scale
//! - the saturation correction reads the code at high gain in every range
//! - outputs below the MIP threshold are zero-suppressed
//!
//! The equivalent noise energy of the three ranges is computed once at the
//! end of each run.

use serde::Serialize;

use crate::algo::misc::{clamp_non_negative, round_count};
use crate::algo::random::RandomSource;
use crate::digitizer::scintillation::crystal_light;
use crate::digitizer::sipm::{sipm_response, SipmSettings};
use crate::digitizer::{Calibration, EventTrace, Stage, StageKind};
use crate::hardware::gain_range::{select_gain_range, AdcSettings, GainRange};
use crate::hardware::noise_energy::EquivalentNoiseEnergy;
use crate::hardware::parameters::{names, DetectorParameters};

/// Smallest in-gate signal (pe) whose ADC code gets the saturation correction
pub const CORRECTION_MIN_PE: f64 = 100.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TotalTrace {
    pub input_energy: f64,
    pub photons: f64,
    pub photons_attenuated: f64,
    pub photons_detected: f64,
    pub pe: f64,
    pub pe_saturated: f64,
    pub dark_pulses: f64,
    pub dark_cells: f64,
    /// Saturated signal plus dark cells
    pub pe_with_dark: f64,
    pub pe_charge: f64,
    /// Clamped at zero
    pub pe_pedestal_subtracted: f64,
    /// Signal fraction inside the gate
    pub pe_in_gate: f64,
    /// High-gain draw, or the redraw when a lower range is selected
    pub initial_code: f64,
    /// Code after the optional saturation correction
    pub code: f64,
    pub gain_range: f64,
    pub gain: f64,
    pub noise_fee: f64,
    pub noise_asic: f64,
    /// Pedestal including the dark-count offset at the selected gain
    pub pedestal_mean: f64,
    pub output_energy: f64,
}

impl TotalTrace {
    pub fn fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("input_energy", self.input_energy),
            ("photons", self.photons),
            ("photons_attenuated", self.photons_attenuated),
            ("photons_detected", self.photons_detected),
            ("pe", self.pe),
            ("pe_saturated", self.pe_saturated),
            ("dark_pulses", self.dark_pulses),
            ("dark_cells", self.dark_cells),
            ("pe_with_dark", self.pe_with_dark),
            ("pe_charge", self.pe_charge),
            ("pe_pedestal_subtracted", self.pe_pedestal_subtracted),
            ("pe_in_gate", self.pe_in_gate),
            ("initial_code", self.initial_code),
            ("code", self.code),
            ("gain_range", self.gain_range),
            ("gain", self.gain),
            ("noise_fee", self.noise_fee),
            ("noise_asic", self.noise_asic),
            ("pedestal_mean", self.pedestal_mean),
            ("output_energy", self.output_energy),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct TotalStage<'a> {
    params: &'a DetectorParameters,
    rng: RandomSource,
    trace: TotalTrace,
    noise_energy: Option<EquivalentNoiseEnergy>,
}

impl<'a> TotalStage<'a> {
    pub fn new(params: &'a DetectorParameters, seed: u64) -> Self {
        Self {
            params,
            rng: RandomSource::from_seed(seed),
            trace: TotalTrace::default(),
            noise_energy: None,
        }
    }

    pub fn trace(&self) -> &TotalTrace {
        &self.trace
    }

    /// Replace a code with its saturation-corrected value.
    ///
    /// The observed count is read at the high gain whatever range was
    /// selected; the corrected count is put back at the selected gain.
    fn correct_saturation(&self, code: f64, gain: f64, settings: &AdcSettings) -> f64 {
        let observed = (code - settings.pedestal) / settings.gain_mean;
        let corrected = self.params.response_curve().invert_clamped(observed);
        clamp_non_negative((corrected * gain + settings.pedestal).trunc())
    }
}

impl Stage for TotalStage<'_> {
    fn kind(&self) -> StageKind {
        StageKind::Total
    }

    fn digitize(&mut self, energy: f64) -> (f64, EventTrace) {
        let calibration = Calibration::from_parameters(self.params);
        let sipm = SipmSettings::from_parameters(self.params);
        let adc = AdcSettings::from_parameters(self.params);

        let light = crystal_light(&mut self.rng, self.params, energy);

        let pe = round_count(light.detected * calibration.pde);
        let response = sipm_response(&mut self.rng, self.params, &sipm, pe);
        let pedestal_subtracted = clamp_non_negative(response.pedestal_subtracted(&sipm));
        let in_gate = pedestal_subtracted * self.params.get(names::GATE_SIGNAL_FRACTION);

        let selection = select_gain_range(&mut self.rng, in_gate, &adc, adc.switch_threshold);
        let initial_code = match selection.range {
            GainRange::High => selection.nominal_code,
            GainRange::Mid | GainRange::Low => selection.code,
        };

        let code = if sipm.corrects_saturation() && in_gate >= CORRECTION_MIN_PE {
            self.correct_saturation(selection.code, selection.gain, &adc)
        } else {
            selection.code
        };

        let pedestal_mean = adc.pedestal + sipm.dark_pedestal() * selection.gain;
        let mut output_energy = (code - pedestal_mean) / selection.gain / calibration.pe_per_mev();
        let threshold = self.params.get(names::MIP_THRESHOLD) * self.params.get(names::MIP_ENERGY);
        if output_energy < threshold {
            output_energy = 0.0;
        }

        self.trace = TotalTrace {
            input_energy: energy,
            photons: light.generated,
            photons_attenuated: light.attenuated,
            photons_detected: light.detected,
            pe,
            pe_saturated: response.saturated,
            dark_pulses: response.dark_pulses,
            dark_cells: response.dark_cells,
            pe_with_dark: response.total,
            pe_charge: response.charge_pe(&sipm),
            pe_pedestal_subtracted: pedestal_subtracted,
            pe_in_gate: in_gate,
            initial_code,
            code,
            gain_range: selection.range.number() as f64,
            gain: selection.gain,
            noise_fee: selection.fee_noise,
            noise_asic: selection.asic_noise,
            pedestal_mean,
            output_energy,
        };

        (output_energy, EventTrace::Total(self.trace))
    }

    fn last_trace(&self) -> EventTrace {
        EventTrace::Total(self.trace)
    }

    fn random(&mut self) -> &mut RandomSource {
        &mut self.rng
    }

    fn begin_run(&mut self) {
        self.noise_energy = None;
    }

    fn end_run(&mut self) {
        let ene = EquivalentNoiseEnergy::from_parameters(self.params);
        for range in &ene.ranges {
            log::info!(
                "ENE {:?}: {:.4} MeV over [{:.3}, {:.3}] MeV",
                range.range,
                range.ene,
                range.energy_low,
                range.energy_high
            );
        }
        self.noise_energy = Some(ene);
    }

    fn equivalent_noise(&self) -> Option<EquivalentNoiseEnergy> {
        self.noise_energy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::stats::RunningStats;
    use approx::assert_relative_eq;

    fn ideal_chain() -> DetectorParameters {
        let mut params = DetectorParameters::default();
        params.set(names::SIPM_VERBOSE, 0.0);
        params.set(names::SIPM_CROSSTALK, 0.0);
        params
    }

    #[test]
    fn test_ideal_chain_reconstructs_energy() {
        let params = ideal_chain();
        let mut stage = TotalStage::new(&params, 40);
        for energy in [5.0, 100.0, 1000.0] {
            let mut stats = RunningStats::new();
            for _ in 0..1000 {
                stats.push(stage.digitize(energy).0);
            }
            assert_relative_eq!(stats.mean(), energy, max_relative = 0.01);
        }
    }

    #[test]
    fn test_initial_code_is_the_kept_draw_off_high_range() {
        let params = DetectorParameters::default();
        let mut stage = TotalStage::new(&params, 14);
        stage.digitize(100.0);
        let trace = *stage.trace();
        assert_eq!(trace.gain_range, 2.0);
        assert_eq!(trace.initial_code, trace.code);
        assert!(trace.initial_code < 8000.0);
    }

    #[test]
    fn test_low_range_clamps_at_switch() {
        let params = ideal_chain();
        let mut stage = TotalStage::new(&params, 2);
        // ~5e4 MeV -> 7.5e6 pe -> ~125,000 codes at low gain
        stage.digitize(5.0e4);
        let trace = *stage.trace();
        assert_eq!(trace.gain_range, 3.0);
        assert_eq!(trace.code, 8000.0);
    }

    #[test]
    fn test_gate_fraction_scales_signal() {
        let mut params = ideal_chain();
        params.set(names::GATE_SIGNAL_FRACTION, 0.5);
        let mut stage = TotalStage::new(&params, 8);
        let mut stats = RunningStats::new();
        for _ in 0..1000 {
            stats.push(stage.digitize(200.0).0);
            let trace = stage.trace();
            assert_eq!(trace.pe_in_gate, trace.pe_pedestal_subtracted * 0.5);
        }
        assert_relative_eq!(stats.mean(), 100.0, max_relative = 0.01);
    }

    #[test]
    fn test_mip_threshold_zero_suppresses() {
        let mut params = ideal_chain();
        params.set(names::MIP_THRESHOLD, 0.5);
        let mut stage = TotalStage::new(&params, 3);

        // Half a MIP is 4.45 MeV
        for _ in 0..200 {
            assert_eq!(stage.digitize(2.0).0, 0.0);
        }
        for _ in 0..200 {
            assert!(stage.digitize(20.0).0 > 0.0);
        }
    }

    fn mean_output(params: &DetectorParameters, energy: f64) -> f64 {
        let mut stage = TotalStage::new(params, 19);
        let mut stats = RunningStats::new();
        for _ in 0..1000 {
            stats.push(stage.digitize(energy).0);
        }
        stats.mean()
    }

    #[test]
    fn test_saturation_correction_in_high_range() {
        // 8 MeV -> 1200 pe, ~1340 fired cells with cross-talk, high range
        let mut params = DetectorParameters::default();
        assert!(mean_output(&params, 8.0) > 8.5);

        params.set(names::SIPM_VERBOSE, 2.0);
        assert_relative_eq!(mean_output(&params, 8.0), 8.0, max_relative = 0.01);
    }

    #[test]
    fn test_correction_reads_code_at_high_gain() {
        let mut params = DetectorParameters::default();
        params.set(names::SIPM_VERBOSE, 2.0);
        let mut stage = TotalStage::new(&params, 23);

        for _ in 0..50 {
            stage.digitize(300.0);
            let t = *stage.trace();
            assert_eq!(t.gain_range, 2.0);

            let observed = (t.initial_code - 50.0) / 5.0;
            let corrected = params.response_curve().invert_clamped(observed);
            let expected = (corrected * t.gain + 50.0).trunc().max(0.0);
            assert_eq!(t.code, expected);
        }
    }

    #[test]
    fn test_correction_skipped_below_minimum_signal() {
        let mut params = DetectorParameters::default();
        params.set(names::SIPM_VERBOSE, 2.0);
        let mut stage = TotalStage::new(&params, 17);

        let mut below = 0;
        let mut corrected = 0;
        // 150 pe/MeV: these energies straddle the correction threshold
        for energy in [0.2, 0.4, 0.6, 0.8, 1.0, 2.0] {
            for _ in 0..200 {
                stage.digitize(energy);
                let trace = stage.trace();
                if trace.pe_in_gate < CORRECTION_MIN_PE {
                    assert_eq!(trace.code, trace.initial_code);
                    below += 1;
                } else if trace.code != trace.initial_code {
                    corrected += 1;
                }
            }
        }
        assert!(below > 0);
        assert!(corrected > 0);
    }

    #[test]
    fn test_noise_energy_computed_per_run() {
        let params = DetectorParameters::default();
        let mut stage = TotalStage::new(&params, 1);
        assert!(stage.equivalent_noise().is_none());

        stage.begin_run();
        stage.digitize(10.0);
        stage.end_run();
        let ene = stage.equivalent_noise().unwrap();
        assert_eq!(ene, EquivalentNoiseEnergy::from_parameters(&params));

        stage.begin_run();
        assert!(stage.equivalent_noise().is_none());
    }

    #[test]
    fn test_non_negative_quantities() {
        let params = DetectorParameters::default();
        for seed in 0..20 {
            let mut stage = TotalStage::new(&params, seed);
            for energy in [0.0, 0.5, 8.9, 120.0, 3000.0] {
                stage.digitize(energy);
                let t = stage.trace();
                for value in [
                    t.photons,
                    t.photons_attenuated,
                    t.photons_detected,
                    t.pe,
                    t.pe_saturated,
                    t.dark_cells,
                    t.pe_charge,
                    t.pe_pedestal_subtracted,
                    t.initial_code,
                    t.code,
                    t.output_energy,
                ] {
                    assert!(value >= 0.0, "negative value at seed {seed}, {energy} MeV");
                }
            }
        }
    }
}
