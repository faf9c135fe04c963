use std::str::FromStr;

use clap::Parser;

use crate::digitizer::StageKind;
use crate::hardware::parameters::DetectorParameters;
use crate::io::config_file::{
    load_config_file, load_energy_points, load_parameter_file, save_parameter_file, ConfigError,
};
use crate::sims::driver::SamplingRange;

/// Parse a parameter assignment in format "NAME=VALUE"
pub fn parse_param_assignment(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| "Parameter must be in format 'NAME=VALUE'".to_string())?;

    let name = name.trim();
    if name.is_empty() {
        return Err("Parameter name is empty".to_string());
    }
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid value for parameter '{}'", name))?;

    Ok((name.to_string(), value))
}

/// Detector parameter sources, applied in a fixed order
#[derive(Parser, Debug, Clone, Default)]
pub struct ParameterArgs {
    /// Load parameters from a '<name> <value>' file
    #[arg(short = 'l', long)]
    pub load: Option<String>,

    /// Load parameters and energy points from a '<name> = <value>' config file
    #[arg(short = 'c', long)]
    pub config: Option<String>,

    /// Set a parameter, e.g. --param EcalSiPMPDE=0.3 (repeatable)
    #[arg(short = 'p', long = "param", value_parser = parse_param_assignment)]
    pub params: Vec<(String, f64)>,

    /// Load energy points (MeV) from a file, one per line
    #[arg(short = 'e', long)]
    pub energy_points: Option<String>,

    /// Energy points in MeV, replacing any loaded ones
    #[arg(long, num_args = 1..)]
    pub energy: Vec<f64>,

    /// Save the final parameters to a file
    #[arg(short = 'w', long)]
    pub save: Option<String>,

    /// Print all parameters before running
    #[arg(long, default_value_t = false)]
    pub print_params: bool,
}

impl ParameterArgs {
    /// Build the parameter store: defaults, parameter file, config file,
    /// individual assignments, energy-point file, explicit energies; then
    /// save if requested.
    pub fn build(&self) -> Result<DetectorParameters, ConfigError> {
        let mut params = DetectorParameters::default();

        if let Some(path) = &self.load {
            load_parameter_file(&mut params, path)?;
        }
        if let Some(path) = &self.config {
            load_config_file(&mut params, path)?;
        }
        for (name, value) in &self.params {
            params.set(name, *value);
        }
        if let Some(path) = &self.energy_points {
            params.set_energy_points(load_energy_points(path)?);
        }
        if !self.energy.is_empty() {
            params.set_energy_points(self.energy.clone());
        }
        if let Some(path) = &self.save {
            save_parameter_file(&params, path)?;
        }

        Ok(params)
    }
}

/// Common run settings
#[derive(Parser, Debug, Clone)]
pub struct SharedRunArgs {
    /// Events per energy point
    #[arg(short = 'n', long, default_value_t = 100_000)]
    pub events: usize,

    /// Random seed [default: a fresh entropy seed, logged and recorded in the run report]
    #[arg(short = 's', long)]
    pub seed: Option<u64>,

    /// Also digitize energies drawn uniformly from --sampling-range
    #[arg(long, default_value_t = false)]
    pub uniform_sampling: bool,

    /// Uniform sampling interval in MeV
    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true)]
    pub sampling_range: Option<Vec<f64>>,
}

impl SharedRunArgs {
    /// Sampling range if uniform sampling is enabled; an unset range is
    /// passed on as `[0, 0]` and rejected by the driver.
    pub fn sampling(&self) -> Option<SamplingRange> {
        if !self.uniform_sampling {
            return None;
        }
        let range = match self.sampling_range.as_deref() {
            Some([min, max]) => SamplingRange::new(*min, *max),
            _ => SamplingRange::new(0.0, 0.0),
        };
        Some(range)
    }
}

/// Which stages to run
#[derive(Parser, Debug, Clone)]
pub struct StageSelectArgs {
    /// Digitizer to run: scintillation, sipm, adc or total (any case)
    #[arg(short = 'd', long, value_parser = StageKind::from_str)]
    pub digitizer: Option<StageKind>,

    /// Run all four digitizers
    #[arg(short = 'a', long, default_value_t = false)]
    pub all: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::parameters::names;

    #[derive(Parser, Debug)]
    struct TestArgs {
        #[command(flatten)]
        run: SharedRunArgs,
        #[command(flatten)]
        params: ParameterArgs,
        #[command(flatten)]
        stages: StageSelectArgs,
    }

    #[test]
    fn test_param_assignment() {
        assert_eq!(
            parse_param_assignment("EcalSiPMCT=0.2"),
            Ok(("EcalSiPMCT".to_string(), 0.2))
        );
        assert_eq!(
            parse_param_assignment(" Pedestal = 80 "),
            Ok(("Pedestal".to_string(), 80.0))
        );
        assert!(parse_param_assignment("Pedestal").is_err());
        assert!(parse_param_assignment("=3").is_err());
        assert!(parse_param_assignment("Pedestal=lots").is_err());
    }

    #[test]
    fn test_parse_command_line() {
        let args = TestArgs::try_parse_from([
            "test",
            "-n",
            "500",
            "--seed",
            "7",
            "--digitizer",
            "sipm",
            "--param",
            "EcalSiPMPDE=0.5",
            "-p",
            "Pedestal=60",
            "--energy",
            "5",
            "50",
            "--uniform-sampling",
            "--sampling-range",
            "1",
            "100",
        ])
        .unwrap();

        assert_eq!(args.run.events, 500);
        assert_eq!(args.run.seed, Some(7));
        assert_eq!(args.stages.digitizer, Some(StageKind::Sipm));
        assert!(!args.stages.all);
        assert_eq!(args.run.sampling(), Some(SamplingRange::new(1.0, 100.0)));

        let params = args.params.build().unwrap();
        assert_eq!(params.get(names::SIPM_PDE), 0.5);
        assert_eq!(params.get(names::PEDESTAL), 60.0);
        assert_eq!(params.energy_points(), &[5.0, 50.0]);
    }

    #[test]
    fn test_defaults() {
        let args = TestArgs::try_parse_from(["test"]).unwrap();
        assert_eq!(args.run.events, 100_000);
        assert_eq!(args.run.seed, None);
        assert_eq!(args.run.sampling(), None);
        assert_eq!(args.stages.digitizer, None);

        let params = args.params.build().unwrap();
        assert_eq!(params.energy_points().len(), 6);
    }

    #[test]
    fn test_digitizer_names_any_case() {
        for (name, kind) in [
            ("SiPM", StageKind::Sipm),
            ("Scintillation", StageKind::Scintillation),
            ("ADC", StageKind::Adc),
            ("Total", StageKind::Total),
            ("adc", StageKind::Adc),
        ] {
            let args = TestArgs::try_parse_from(["test", "-d", name]).unwrap();
            assert_eq!(args.stages.digitizer, Some(kind));
        }

        let err = TestArgs::try_parse_from(["test", "-d", "photodiode"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_seed_help_documents_default() {
        use clap::CommandFactory;

        let command = TestArgs::command();
        let seed = command
            .get_arguments()
            .find(|arg| arg.get_id() == "seed")
            .unwrap();
        let help = seed.get_help().unwrap().to_string();
        assert!(help.contains("entropy seed"));
        assert!(help.contains("run report"));
    }

    #[test]
    fn test_sampling_without_range_is_rejected_later() {
        let args = TestArgs::try_parse_from(["test", "--uniform-sampling"]).unwrap();
        let range = args.run.sampling().unwrap();
        assert!(range.validate().is_err());
    }
}
