//! Scintillation light generation and transport to the SiPM

use serde::Serialize;

use crate::algo::misc::round_count;
use crate::algo::random::RandomSource;
use crate::digitizer::{Calibration, EventTrace, Stage, StageKind};
use crate::hardware::parameters::{names, DetectorParameters};

/// Below this many generated photons attenuation is sampled exactly
pub const BINOMIAL_LIMIT: f64 = 100.0;

/// Below this many surviving photons (on average) a Poisson draw is used
pub const POISSON_LIMIT: f64 = 20.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScintillationTrace {
    pub input_energy: f64,
    /// Photons generated in the crystal
    pub photons: f64,
    /// Photons surviving transport
    pub photons_attenuated: f64,
    /// Surviving photons after light-yield non-uniformity
    pub photons_detected: f64,
    pub output_energy: f64,
}

impl ScintillationTrace {
    pub fn fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("input_energy", self.input_energy),
            ("photons", self.photons),
            ("photons_attenuated", self.photons_attenuated),
            ("photons_detected", self.photons_detected),
            ("output_energy", self.output_energy),
        ]
    }
}

/// Photon counts of the crystal part of an event
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CrystalLight {
    pub generated: f64,
    pub attenuated: f64,
    pub detected: f64,
}

/// Crystal light model shared by the scintillation and full-chain stages.
///
/// The non-uniformity factor is drawn before the photon counts so both stages
/// consume the stream in the same order.
pub(crate) fn crystal_light(
    rng: &mut RandomSource,
    params: &DetectorParameters,
    energy: f64,
) -> CrystalLight {
    let light_yield = params.get(names::CRY_INT_LY);
    let attenuation = params.get(names::CRY_ATTENUATION);
    let uniformity_factor = rng.gaus(1.0, params.get(names::CRY_LY_UNIFORMITY));

    let generated = generate_photons(rng, energy * light_yield, params.get(names::CRY_LO_FLU));
    let attenuated = attenuate(rng, generated, attenuation);
    let detected = round_count(attenuated * uniformity_factor);

    CrystalLight {
        generated,
        attenuated,
        detected,
    }
}

/// Generated photon count for a mean of `mean` photons.
///
/// Poisson when the light-output fluctuation is exactly zero, otherwise a
/// gaussian with relative width `fluctuation`.
pub(crate) fn generate_photons(rng: &mut RandomSource, mean: f64, fluctuation: f64) -> f64 {
    if fluctuation == 0.0 {
        round_count(rng.poisson(mean))
    } else {
        round_count(rng.gaus(mean, mean * fluctuation))
    }
}

/// Photons surviving transport with probability `p`.
///
/// Exact binomial below [`BINOMIAL_LIMIT`] generated photons, Poisson while
/// the expected survivors stay below [`POISSON_LIMIT`], gaussian otherwise.
pub(crate) fn attenuate(rng: &mut RandomSource, generated: f64, p: f64) -> f64 {
    let mean = generated * p;
    if generated < BINOMIAL_LIMIT {
        round_count(rng.binomial(generated as u64, p))
    } else if mean < POISSON_LIMIT {
        round_count(rng.poisson(mean))
    } else {
        round_count(rng.gaus(mean, (mean * (1.0 - p)).sqrt()))
    }
}

/// Crystal-only digitizer: reconstructed energy from the detected photons
#[derive(Debug, Clone)]
pub struct ScintillationStage<'a> {
    params: &'a DetectorParameters,
    rng: RandomSource,
    trace: ScintillationTrace,
}

impl<'a> ScintillationStage<'a> {
    pub fn new(params: &'a DetectorParameters, seed: u64) -> Self {
        Self {
            params,
            rng: RandomSource::from_seed(seed),
            trace: ScintillationTrace::default(),
        }
    }

    pub fn trace(&self) -> &ScintillationTrace {
        &self.trace
    }
}

impl Stage for ScintillationStage<'_> {
    fn kind(&self) -> StageKind {
        StageKind::Scintillation
    }

    fn digitize(&mut self, energy: f64) -> (f64, EventTrace) {
        let light = crystal_light(&mut self.rng, self.params, energy);
        let calibration = Calibration::from_parameters(self.params);

        let output_energy = light.detected / calibration.photons_per_mev();
        self.trace = ScintillationTrace {
            input_energy: energy,
            photons: light.generated,
            photons_attenuated: light.attenuated,
            photons_detected: light.detected,
            output_energy,
        };

        (output_energy, EventTrace::Scintillation(self.trace))
    }

    fn last_trace(&self) -> EventTrace {
        EventTrace::Scintillation(self.trace)
    }

    fn random(&mut self) -> &mut RandomSource {
        &mut self.rng
    }
}
