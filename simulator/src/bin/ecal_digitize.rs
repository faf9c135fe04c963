//! Calorimeter cell digitization
//!
//! Runs one or all of the digitization stages (scintillation, SiPM, ADC and
//! the full chain) over a set of energy points and writes the per-event
//! traces as CSV plus a JSON run report per stage.
//!
//! Usage:
//! ```
//! cargo run --release --bin ecal_digitize -- --all -n 10000 --seed 1 -o run1
//! cargo run --release --bin ecal_digitize -- -d total --param EcalSiPMCT=0.2
//! cargo run --release --bin ecal_digitize -- --scan EcalSiPMPDE 0.2 0.3 0.4
//! ```
//!
//! Set `RUST_LOG=info` for per-point summaries.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser};
use ecal_simulator::algo::RandomSource;
use ecal_simulator::digitizer::StageKind;
use ecal_simulator::io::CsvTraceSink;
use ecal_simulator::shared_args::{ParameterArgs, SharedRunArgs, StageSelectArgs};
use ecal_simulator::sims::{
    run_all, run_stage, scan_parameter, CampaignSettings, DriverError, RunReport,
};
use log::info;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "ecal_digitize",
    about = "Simulates the digitized response of a calorimeter cell",
    long_about = None
)]
struct Args {
    #[command(flatten)]
    run: SharedRunArgs,

    #[command(flatten)]
    stages: StageSelectArgs,

    #[command(flatten)]
    params: ParameterArgs,

    /// Output file prefix
    #[arg(short = 'o', long, default_value = "digi_out")]
    output: String,

    /// Scan a parameter over values, running all digitizers for each
    #[arg(long, num_args = 2.., value_names = ["NAME", "VALUE"], allow_negative_numbers = true)]
    scan: Option<Vec<String>>,

    /// Output directory for parameter scans
    #[arg(long, default_value = "scan_results")]
    scan_dir: String,
}

/// Split "--scan NAME V1 V2 ..." into the name and parsed values
fn parse_scan(tokens: &[String]) -> Result<(String, Vec<f64>), String> {
    let (name, values) = tokens
        .split_first()
        .ok_or_else(|| "--scan needs a parameter name".to_string())?;
    let values = values
        .iter()
        .map(|v| {
            v.parse::<f64>()
                .map_err(|_| format!("Invalid scan value '{}'", v))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if values.is_empty() {
        return Err(format!("No values given for scan of {}", name));
    }
    Ok((name.clone(), values))
}

fn open_sink(path: PathBuf) -> Result<CsvTraceSink<BufWriter<File>>, DriverError> {
    info!("Writing traces to {}", path.display());
    Ok(CsvTraceSink::create(path)?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Box<dyn std::error::Error>> {
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    info!("Wrote {}", path.display());
    Ok(())
}

fn stage_path(prefix: &str, kind: StageKind, extension: &str) -> PathBuf {
    PathBuf::from(format!("{}_{}.{}", prefix, kind.name(), extension))
}

fn write_report(prefix: &str, report: &RunReport) -> Result<(), Box<dyn std::error::Error>> {
    write_json(&stage_path(prefix, report.stage, "json"), report)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let mut params = args.params.build()?;
    if args.params.print_params {
        println!("{}", params);
    }

    let settings = CampaignSettings {
        seed: RandomSource::new(args.run.seed).seed(),
        events_per_point: args.run.events,
        energy_points: None,
        sampling: args.run.sampling(),
    };
    info!("Random seed: {}", settings.seed);

    let mut did_work = false;

    if let Some(tokens) = &args.scan {
        let (name, values) = parse_scan(tokens)?;
        let scan_dir = Path::new(&args.scan_dir);
        fs::create_dir_all(scan_dir)?;

        let points = scan_parameter(&mut params, &name, &values, &settings, |value, kind| {
            let value_dir = scan_dir.join(format!("{}_{}", name, value));
            fs::create_dir_all(&value_dir)?;
            open_sink(value_dir.join(format!("digi_{}.csv", kind.name())))
        })?;
        write_json(&scan_dir.join(format!("scan_{}.json", name)), &points)?;
        did_work = true;
    }

    if args.stages.all {
        let reports = run_all(&params, &settings, |kind| {
            open_sink(stage_path(&args.output, kind, "csv"))
        })?;
        for report in &reports {
            write_report(&args.output, report)?;
        }
        did_work = true;
    } else if let Some(kind) = args.stages.digitizer {
        let mut sink = open_sink(stage_path(&args.output, kind, "csv"))?;
        let report = run_stage(&params, kind, &settings, &mut sink)?;
        write_report(&args.output, &report)?;
        did_work = true;
    }

    if !did_work && !args.params.print_params && args.params.save.is_none() {
        Args::command().print_help()?;
    }

    Ok(())
}
