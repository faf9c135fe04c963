//! Run orchestration

pub mod campaign;
pub mod driver;

pub use campaign::{run_all, run_stage, scan_parameter, CampaignSettings, ScanPoint};
pub use driver::{
    DriverConfig, DriverError, EventSink, MemorySink, NullSink, RunPhase, RunReport,
    SamplingOutcome, SamplingRange, SimulationDriver,
};
