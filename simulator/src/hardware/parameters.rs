//! Detector parameter store
//!
//! Named scalar parameters of the crystal, SiPM and readout electronics, with
//! a fixed table of derived parameters that are recomputed whenever one of
//! their inputs changes. The store also owns the two numeric functions that
//! depend on the cross-talk probability: the SiPM response curve and the
//! cross-talk cascade law.
//!
//! The store is an ordinary value. Stages borrow it for the duration of a run
//! and read parameters on every event; mutation happens between runs.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::hardware::crosstalk::CrossTalkLaw;
use crate::hardware::sipm_response::ResponseCurve;

/// Parameter names understood by the pipeline
pub mod names {
    // Crystal
    pub const MIP_ENERGY: &str = "EcalMIPEnergy";
    pub const CRY_MIP_LY: &str = "EcalCryMipLY";
    pub const CRY_EFF_LY: &str = "EcalCryEffLY";
    pub const CRY_INT_LY: &str = "EcalCryIntLY";
    pub const CRY_INT_LY_FLU: &str = "EcalCryIntLYFlu";
    pub const CRY_LO_FLU: &str = "EcalCryLOFlu";
    pub const CRY_LY_UNIFORMITY: &str = "EcalCryLYUn";
    pub const CRY_ATTENUATION: &str = "EcalCryAtt";

    // SiPM
    pub const SIPM_VERBOSE: &str = "EcalSiPMDigiVerbose";
    pub const SIPM_PDE: &str = "EcalSiPMPDE";
    pub const SIPM_PDE_FLU: &str = "EcalSiPMPDEFlu";
    pub const SIPM_DCR: &str = "EcalSiPMDCR";
    pub const SIPM_CROSSTALK: &str = "EcalSiPMCT";
    pub const SIPM_NEUTRON_FLUENCE: &str = "EcalSiPMNeuFluence";
    pub const SIPM_GAIN_MEAN: &str = "EcalSiPMGainMean";
    pub const SIPM_GAIN_SIGMA: &str = "EcalSiPMGainSigma";
    pub const SIPM_GAIN_MEAN_FLU: &str = "EcalSiPMGainMeanFlu";

    // Trigger
    pub const TRIGGER_THRESHOLD: &str = "EcalTriggerThreshold";
    pub const GATE_TIME: &str = "EcalTimeInterval";
    pub const GATE_SIGNAL_FRACTION: &str = "EcalRatioTimeInterval";

    // Electronics
    pub const FEE_NOISE: &str = "EcalFEENoiseSigma";
    pub const ASIC_NOISE: &str = "EcalASICNoiseSigma";
    pub const ADC_ERROR: &str = "EcalADCError";
    pub const MIP_THRESHOLD: &str = "EcalMIP_Thre";
    pub const ADC_BITS: &str = "ADCbit";
    pub const ADC_SWITCH: &str = "ADCSwitch";
    pub const GAIN_COUNT: &str = "NofGain";
    pub const PEDESTAL: &str = "Pedestal";
    pub const LEGACY_SIPM_VERBOSE: &str = "SiPMDigiVerbose";
    pub const TOTAL_GAIN: &str = "TotalGain";
    pub const GAIN_RATIO_12: &str = "GainRatio_12";
    pub const GAIN_RATIO_23: &str = "GainRatio_23";
}

/// Energy points (MeV) used when nothing else is configured
pub const DEFAULT_ENERGY_POINTS: [f64; 6] = [10.0, 20.0, 50.0, 100.0, 200.0, 500.0];

const DEFAULTS: &[(&str, f64)] = &[
    (names::MIP_ENERGY, 8.9),
    (names::CRY_MIP_LY, 100.0),
    (names::CRY_EFF_LY, 150.0),
    (names::CRY_INT_LY, 30000.0),
    (names::CRY_INT_LY_FLU, 0.1),
    (names::CRY_LO_FLU, 0.0),
    (names::CRY_LY_UNIFORMITY, 0.0),
    (names::SIPM_VERBOSE, 1.0),
    (names::SIPM_PDE, 0.25),
    (names::SIPM_PDE_FLU, 0.10),
    (names::SIPM_DCR, 2.5e6),
    (names::SIPM_CROSSTALK, 0.12),
    (names::SIPM_NEUTRON_FLUENCE, 1.0e6),
    (names::SIPM_GAIN_MEAN, 5.0),
    (names::SIPM_GAIN_SIGMA, 0.08),
    (names::SIPM_GAIN_MEAN_FLU, 0.15),
    (names::TRIGGER_THRESHOLD, 0.0),
    (names::GATE_TIME, 1.5e-7),
    (names::GATE_SIGNAL_FRACTION, 1.0),
    (names::FEE_NOISE, 5.0),
    (names::ASIC_NOISE, 4.0),
    (names::ADC_ERROR, 0.0),
    (names::MIP_THRESHOLD, 0.0),
    (names::ADC_BITS, 13.0),
    (names::ADC_SWITCH, 8000.0),
    (names::GAIN_COUNT, 3.0),
    (names::PEDESTAL, 50.0),
    (names::LEGACY_SIPM_VERBOSE, 1.0),
    (names::TOTAL_GAIN, 300.0),
    (names::GAIN_RATIO_12, 30.0),
];

/// Inputs whose change triggers recomputation of `EcalCryAtt`
const ATTENUATION_INPUTS: &[&str] = &[
    names::CRY_EFF_LY,
    names::CRY_INT_LY,
    names::SIPM_PDE,
    names::CRY_MIP_LY,
    names::MIP_ENERGY,
];

/// Inputs whose change triggers recomputation of `GainRatio_23`
const GAIN_RATIO_INPUTS: &[&str] = &[names::GAIN_RATIO_12, names::TOTAL_GAIN];

/// Named detector parameters plus the cross-talk dependent response functions.
#[derive(Debug, Clone)]
pub struct DetectorParameters {
    values: BTreeMap<String, f64>,
    energy_points: Vec<f64>,
    response: ResponseCurve,
    crosstalk: CrossTalkLaw,
    warned: RefCell<HashSet<String>>,
}

impl DetectorParameters {
    /// Look up a parameter by name.
    ///
    /// Unknown names return 0.0 and log a warning (once per name); the run
    /// continues with that value.
    pub fn get(&self, name: &str) -> f64 {
        match self.values.get(name) {
            Some(value) => *value,
            None => {
                if self.warned.borrow_mut().insert(name.to_string()) {
                    log::warn!("Parameter '{}' not found, using 0", name);
                }
                0.0
            }
        }
    }

    /// Look up a parameter without the missing-name fallback
    pub fn try_get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Set a parameter and apply the dependency table.
    ///
    /// Derived parameters can also be set directly; they are overwritten the
    /// next time one of their inputs changes.
    pub fn set(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_string(), value);
        self.warned.borrow_mut().remove(name);

        if ATTENUATION_INPUTS.contains(&name) {
            self.recompute_attenuation();
        }
        if GAIN_RATIO_INPUTS.contains(&name) {
            self.recompute_gain_ratio_23();
        }
        if name == names::SIPM_CROSSTALK {
            self.response.set_crosstalk(value);
            self.crosstalk = CrossTalkLaw::new(value);
        }
    }

    /// All parameter names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// All (name, value) pairs in sorted order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn energy_points(&self) -> &[f64] {
        &self.energy_points
    }

    pub fn set_energy_points(&mut self, energies: Vec<f64>) {
        self.energy_points = energies;
    }

    /// SiPM saturation response, kept in sync with `EcalSiPMCT`
    pub fn response_curve(&self) -> &ResponseCurve {
        &self.response
    }

    /// Dark-pulse cross-talk cascade law, kept in sync with `EcalSiPMCT`
    pub fn crosstalk_law(&self) -> &CrossTalkLaw {
        &self.crosstalk
    }

    /// Photon survival probability from crystal to SiPM
    fn recompute_attenuation(&mut self) {
        let eff = self.raw(names::CRY_EFF_LY);
        let intrinsic = self.raw(names::CRY_INT_LY);
        let pde = self.raw(names::SIPM_PDE);
        self.values
            .insert(names::CRY_ATTENUATION.to_string(), eff / (intrinsic * pde));
    }

    fn recompute_gain_ratio_23(&mut self) {
        let total = self.raw(names::TOTAL_GAIN);
        let ratio_12 = self.raw(names::GAIN_RATIO_12);
        self.values
            .insert(names::GAIN_RATIO_23.to_string(), total / ratio_12);
    }

    fn raw(&self, name: &str) -> f64 {
        self.values.get(name).copied().unwrap_or(0.0)
    }
}

impl Default for DetectorParameters {
    fn default() -> Self {
        let values = DEFAULTS
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect();
        let crosstalk = 0.12;
        let mut params = Self {
            values,
            energy_points: DEFAULT_ENERGY_POINTS.to_vec(),
            response: ResponseCurve::new(crosstalk),
            crosstalk: CrossTalkLaw::new(crosstalk),
            warned: RefCell::new(HashSet::new()),
        };
        params.recompute_attenuation();
        params.recompute_gain_ratio_23();
        params
    }
}

impl fmt::Display for DetectorParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Detector Parameters ===")?;
        for (name, value) in self.iter() {
            writeln!(f, "{:<25} = {}", name, value)?;
        }
        write!(f, "===========================")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let params = DetectorParameters::default();
        assert_eq!(params.get(names::CRY_INT_LY), 30000.0);
        assert_eq!(params.get(names::ADC_SWITCH), 8000.0);
        assert_relative_eq!(params.get(names::CRY_ATTENUATION), 0.02);
        assert_relative_eq!(params.get(names::GAIN_RATIO_23), 10.0);
        assert_eq!(params.energy_points(), &DEFAULT_ENERGY_POINTS);
        assert_eq!(params.response_curve().crosstalk(), 0.12);
        assert_eq!(params.crosstalk_law().probability(), 0.12);
    }

    #[test]
    fn test_missing_parameter_defaults_to_zero() {
        let params = DetectorParameters::default();
        assert_eq!(params.get("NoSuchParameter"), 0.0);
        assert_eq!(params.get("NoSuchParameter"), 0.0);
        assert_eq!(params.try_get("NoSuchParameter"), None);
        assert!(!params.contains("NoSuchParameter"));
    }

    #[test]
    fn test_attenuation_follows_inputs() {
        let mut params = DetectorParameters::default();

        params.set(names::SIPM_PDE, 0.5);
        assert_relative_eq!(params.get(names::CRY_ATTENUATION), 150.0 / (30000.0 * 0.5));

        params.set(names::CRY_EFF_LY, 300.0);
        assert_relative_eq!(params.get(names::CRY_ATTENUATION), 300.0 / (30000.0 * 0.5));

        params.set(names::CRY_INT_LY, 10000.0);
        assert_relative_eq!(params.get(names::CRY_ATTENUATION), 300.0 / (10000.0 * 0.5));
    }

    #[test]
    fn test_direct_derived_override_is_replaced_on_dependency_change() {
        let mut params = DetectorParameters::default();
        params.set(names::CRY_ATTENUATION, 0.5);
        assert_eq!(params.get(names::CRY_ATTENUATION), 0.5);

        params.set(names::MIP_ENERGY, 9.0);
        assert_relative_eq!(params.get(names::CRY_ATTENUATION), 0.02);
    }

    #[test]
    fn test_gain_ratio_follows_inputs() {
        let mut params = DetectorParameters::default();
        params.set(names::GAIN_RATIO_12, 20.0);
        assert_relative_eq!(params.get(names::GAIN_RATIO_23), 15.0);

        params.set(names::TOTAL_GAIN, 600.0);
        assert_relative_eq!(params.get(names::GAIN_RATIO_23), 30.0);
    }

    #[test]
    fn test_crosstalk_regenerates_functions() {
        let mut params = DetectorParameters::default();
        params.set(names::SIPM_CROSSTALK, 0.2);
        assert_eq!(params.response_curve().crosstalk(), 0.2);
        assert_eq!(params.crosstalk_law().probability(), 0.2);
    }

    #[test]
    fn test_unrelated_set_leaves_derived_alone() {
        let mut params = DetectorParameters::default();
        params.set(names::CRY_ATTENUATION, 0.5);
        params.set(names::PEDESTAL, 80.0);
        assert_eq!(params.get(names::CRY_ATTENUATION), 0.5);
        assert_eq!(params.get(names::PEDESTAL), 80.0);
    }

    #[test]
    fn test_display_lists_sorted_names() {
        let params = DetectorParameters::default();
        let text = params.to_string();
        assert!(text.starts_with("=== Detector Parameters ==="));
        let adc_bit = text.find("ADCbit").unwrap();
        let pedestal = text.find("Pedestal").unwrap();
        assert!(adc_bit < pedestal);
    }
}
