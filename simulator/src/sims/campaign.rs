//! Run campaigns: one stage, all four stages, or a parameter scan
//!
//! Each stage of a campaign gets a fresh instance seeded with the same seed,
//! so stage outputs are individually reproducible and comparable.

use log::info;
use serde::Serialize;

use crate::digitizer::{AnyStage, StageKind};
use crate::hardware::parameters::DetectorParameters;
use crate::sims::driver::{
    DriverConfig, DriverError, EventSink, RunReport, SamplingRange, SimulationDriver,
};

/// Campaign-wide run settings
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignSettings {
    pub seed: u64,
    pub events_per_point: usize,
    /// Fixed energies; the parameter store's energy points when `None`
    pub energy_points: Option<Vec<f64>>,
    pub sampling: Option<SamplingRange>,
}

impl CampaignSettings {
    fn driver(&self, params: &DetectorParameters) -> SimulationDriver {
        let energy_points = self
            .energy_points
            .clone()
            .unwrap_or_else(|| params.energy_points().to_vec());
        SimulationDriver::new(DriverConfig {
            events_per_point: self.events_per_point,
            energy_points,
            sampling: self.sampling,
        })
    }
}

/// Run one stage kind into `sink`
pub fn run_stage<K>(
    params: &DetectorParameters,
    kind: StageKind,
    settings: &CampaignSettings,
    sink: &mut K,
) -> Result<RunReport, DriverError>
where
    K: EventSink + ?Sized,
{
    let mut stage = AnyStage::new(kind, params, settings.seed);
    settings.driver(params).run(&mut stage, sink)
}

/// Run all four stages in chain order, each into the sink `make_sink` opens
/// for it.
pub fn run_all<K, F>(
    params: &DetectorParameters,
    settings: &CampaignSettings,
    mut make_sink: F,
) -> Result<Vec<RunReport>, DriverError>
where
    K: EventSink,
    F: FnMut(StageKind) -> Result<K, DriverError>,
{
    StageKind::ALL
        .iter()
        .map(|&kind| {
            let mut sink = make_sink(kind)?;
            run_stage(params, kind, settings, &mut sink)
        })
        .collect()
}

/// All stage reports for one scanned value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanPoint {
    pub value: f64,
    pub reports: Vec<RunReport>,
}

/// Run all stages once per value of parameter `name`.
///
/// The parameter (and everything derived from it) is restored to its value
/// before the scan, also when a run fails.
pub fn scan_parameter<K, F>(
    params: &mut DetectorParameters,
    name: &str,
    values: &[f64],
    settings: &CampaignSettings,
    mut make_sink: F,
) -> Result<Vec<ScanPoint>, DriverError>
where
    K: EventSink,
    F: FnMut(f64, StageKind) -> Result<K, DriverError>,
{
    let original = params.get(name);
    info!(
        "Scanning {} over {} values (current value {})",
        name,
        values.len(),
        original
    );

    let mut scan = || -> Result<Vec<ScanPoint>, DriverError> {
        let mut points = Vec::with_capacity(values.len());
        for &value in values {
            info!("{} = {}", name, value);
            params.set(name, value);
            let reports = run_all(params, settings, |kind| make_sink(value, kind))?;
            points.push(ScanPoint { value, reports });
        }
        Ok(points)
    };
    let result = scan();

    params.set(name, original);
    result
}
