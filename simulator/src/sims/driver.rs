//! Simulation driver
//!
//! Runs a stage over the fixed energy points, `events_per_point` times each,
//! then optionally over energies drawn uniformly from a range. Every event is
//! handed to an [`EventSink`]; per-point mean and RMS are collected for the
//! run report.
//!
//! The uniform energies are drawn from the stage's own random stream after
//! the fixed points, so a seed reproduces the complete run.

use std::io;

use log::{debug, error, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::algo::stats::RunningStats;
use crate::digitizer::{EventTrace, Stage, StageKind};
use crate::hardware::noise_energy::EquivalentNoiseEnergy;

/// Events between progress messages
pub const PROGRESS_INTERVAL: usize = 10_000;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("invalid sampling range [{min}, {max}]: bounds must be positive with min < max")]
    InvalidSamplingRange { min: f64, max: f64 },
    #[error("failed to record event: {0}")]
    Sink(#[from] io::Error),
}

/// Where in a run an event was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    /// Index into the fixed energy points
    FixedPoint(usize),
    UniformSampling,
}

/// Consumer of digitized events
pub trait EventSink {
    fn record(&mut self, phase: RunPhase, trace: &EventTrace) -> io::Result<()>;

    /// Flush buffered output at the end of a run
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn record(&mut self, phase: RunPhase, trace: &EventTrace) -> io::Result<()> {
        (**self).record(phase, trace)
    }

    fn finish(&mut self) -> io::Result<()> {
        (**self).finish()
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&mut self, _phase: RunPhase, _trace: &EventTrace) -> io::Result<()> {
        Ok(())
    }
}

/// Keeps every event in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub events: Vec<(RunPhase, EventTrace)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events of one phase in production order
    pub fn phase(&self, phase: RunPhase) -> impl Iterator<Item = &EventTrace> {
        self.events
            .iter()
            .filter(move |(p, _)| *p == phase)
            .map(|(_, trace)| trace)
    }
}

impl EventSink for MemorySink {
    fn record(&mut self, phase: RunPhase, trace: &EventTrace) -> io::Result<()> {
        self.events.push((phase, *trace));
        Ok(())
    }
}

/// Energy interval for the uniform sampling sub-run (MeV)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingRange {
    pub min: f64,
    pub max: f64,
}

impl SamplingRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn validate(&self) -> Result<(), DriverError> {
        if self.min <= 0.0 || self.max <= 0.0 || self.min >= self.max {
            return Err(DriverError::InvalidSamplingRange {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// What to run
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    pub events_per_point: usize,
    pub energy_points: Vec<f64>,
    pub sampling: Option<SamplingRange>,
}

/// Response at one fixed energy point
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PointSummary {
    pub energy: f64,
    pub events: u64,
    pub mean: f64,
    pub rms: f64,
}

/// Outcome of the uniform sampling sub-run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SamplingOutcome {
    Completed {
        range: SamplingRange,
        events: u64,
        /// Mean and RMS of output / input energy
        mean_response: f64,
        rms_response: f64,
    },
    Rejected {
        range: SamplingRange,
        reason: String,
    },
}

/// Summary of one stage run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub stage: StageKind,
    pub seed: u64,
    pub events_per_point: usize,
    pub points: Vec<PointSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equivalent_noise: Option<EquivalentNoiseEnergy>,
}

#[derive(Debug, Clone)]
pub struct SimulationDriver {
    config: DriverConfig,
}

impl SimulationDriver {
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Run `stage` over the configured energies.
    ///
    /// An invalid sampling range rejects only the sampling sub-run; the fixed
    /// points are still reported. Sink failures abort the run.
    pub fn run<S, K>(&self, stage: &mut S, sink: &mut K) -> Result<RunReport, DriverError>
    where
        S: Stage + ?Sized,
        K: EventSink + ?Sized,
    {
        let events = self.config.events_per_point;
        let seed = stage.random().seed();
        info!(
            "Running {} digitization ({} events per point, seed {})",
            stage.kind(),
            events,
            seed
        );

        stage.begin_run();

        let mut points = Vec::with_capacity(self.config.energy_points.len());
        for (index, &energy) in self.config.energy_points.iter().enumerate() {
            info!("Processing energy point: {} MeV", energy);
            let mut stats = RunningStats::new();
            for event in 0..events {
                let (output, trace) = stage.digitize(energy);
                stats.push(output);
                sink.record(RunPhase::FixedPoint(index), &trace)?;
                log_progress(event, events);
            }
            points.push(PointSummary {
                energy,
                events: stats.count(),
                mean: stats.mean(),
                rms: stats.rms(),
            });
        }

        for point in &points {
            if point.events == 0 {
                warn!("No events at {} MeV", point.energy);
                continue;
            }
            info!(
                "Energy: {} MeV, Mean: {:.4}, RMS: {:.4}",
                point.energy, point.mean, point.rms
            );
        }

        let sampling = match self.config.sampling {
            Some(range) => Some(self.run_sampling(stage, sink, range)?),
            None => None,
        };

        stage.end_run();
        sink.finish()?;

        Ok(RunReport {
            stage: stage.kind(),
            seed,
            events_per_point: events,
            points,
            sampling,
            equivalent_noise: stage.equivalent_noise(),
        })
    }

    fn run_sampling<S, K>(
        &self,
        stage: &mut S,
        sink: &mut K,
        range: SamplingRange,
    ) -> Result<SamplingOutcome, DriverError>
    where
        S: Stage + ?Sized,
        K: EventSink + ?Sized,
    {
        if let Err(e) = range.validate() {
            error!("Skipping uniform sampling: {}", e);
            return Ok(SamplingOutcome::Rejected {
                range,
                reason: e.to_string(),
            });
        }

        let events = self.config.events_per_point;
        info!(
            "Uniform sampling: {} events in [{}, {}] MeV",
            events, range.min, range.max
        );

        let mut response = RunningStats::new();
        for event in 0..events {
            let energy = stage.random().uniform(range.min, range.max);
            let (output, trace) = stage.digitize(energy);
            response.push(output / energy);
            sink.record(RunPhase::UniformSampling, &trace)?;
            log_progress(event, events);
        }

        Ok(SamplingOutcome::Completed {
            range,
            events: response.count(),
            mean_response: response.mean(),
            rms_response: response.rms(),
        })
    }
}

fn log_progress(event: usize, total: usize) {
    if (event + 1) % PROGRESS_INTERVAL == 0 || event + 1 == total {
        debug!("Processed {}/{} events", event + 1, total);
    }
}
