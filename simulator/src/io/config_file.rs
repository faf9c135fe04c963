//! Parameter, config and energy-point files
//!
//! Three plain-text formats, `#` starts a comment line in all of them:
//!
//! ```text
//! # parameter file: <name> <value>
//! EcalSiPMPDE               0.25
//!
//! # config file: <name> = <value>, EnergyPoints takes a list
//! EcalSiPMPDE = 0.3
//! EnergyPoints = 10, 50, 100
//!
//! # energy-point file: one energy in MeV per line
//! 10
//! 50
//! ```

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::hardware::parameters::DetectorParameters;

/// Config key holding the comma-separated energy-point list
pub const ENERGY_POINTS_KEY: &str = "EnergyPoints";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("line {line}: expected '<name> = <value>'")]
    MissingEquals { line: usize },
    #[error("line {line}: cannot parse '{value}' as a number")]
    InvalidValue { line: usize, value: String },
    #[error("no energy points found in {0}")]
    NoEnergyPoints(String),
}

/// Parsed contents of a `name = value` config file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub parameters: Vec<(String, f64)>,
    pub energy_points: Option<Vec<f64>>,
}

impl ConfigFile {
    /// Apply the parameters in file order, then the energy points if any
    pub fn apply(&self, params: &mut DetectorParameters) {
        for (name, value) in &self.parameters {
            log::info!("Setting {} = {}", name, value);
            params.set(name, *value);
        }
        if let Some(energies) = &self.energy_points {
            log::info!("Setting {} energy points", energies.len());
            params.set_energy_points(energies.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ConfigEntry {
    Parameter(String, f64),
    EnergyPoints(Vec<f64>),
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Non-empty, non-comment lines with their 1-based line numbers
fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

fn parse_number(line: usize, token: &str) -> Result<f64, ConfigError> {
    token.trim().parse().map_err(|_| ConfigError::InvalidValue {
        line,
        value: token.trim().to_string(),
    })
}

/// Parse `<name> <value>` lines; lines that do not parse are skipped.
pub fn parse_parameter_text(text: &str) -> Vec<(String, f64)> {
    let mut entries = Vec::new();
    for (line_no, line) in content_lines(text) {
        let mut tokens = line.split_whitespace();
        let (Some(name), Some(value)) = (tokens.next(), tokens.next()) else {
            log::warn!("Skipping parameter line {}: '{}'", line_no, line);
            continue;
        };
        match parse_number(line_no, value) {
            Ok(value) => entries.push((name.to_string(), value)),
            Err(e) => log::warn!("Skipping parameter line {}", e),
        }
    }
    entries
}

/// Load a parameter file into `params`, returning how many values were set
pub fn load_parameter_file(
    params: &mut DetectorParameters,
    path: impl AsRef<Path>,
) -> Result<usize, ConfigError> {
    let path = path.as_ref();
    let entries = parse_parameter_text(&read(path)?);
    for (name, value) in &entries {
        params.set(name, *value);
    }
    log::info!(
        "Loaded {} parameters from {}",
        entries.len(),
        path.display()
    );
    Ok(entries.len())
}

/// Render the store in parameter-file format
pub fn format_parameter_file(params: &DetectorParameters) -> String {
    let mut out = String::from("# Detector Parameters\n# Format: <parameter_name> <value>\n\n");
    for (name, value) in params.iter() {
        // Writing to a String cannot fail
        let _ = writeln!(out, "{:<25} {}", name, value);
    }
    out
}

pub fn save_parameter_file(
    params: &DetectorParameters,
    path: impl AsRef<Path>,
) -> Result<(), ConfigError> {
    let path = path.as_ref();
    fs::write(path, format_parameter_file(params)).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_config_line(line_no: usize, line: &str) -> Result<ConfigEntry, ConfigError> {
    let (name, value) = line
        .split_once('=')
        .ok_or(ConfigError::MissingEquals { line: line_no })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ConfigError::MissingEquals { line: line_no });
    }

    if name == ENERGY_POINTS_KEY {
        let energies = value
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| parse_number(line_no, token))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(ConfigEntry::EnergyPoints(energies));
    }

    let value = value.split_whitespace().next().unwrap_or_default();
    Ok(ConfigEntry::Parameter(
        name.to_string(),
        parse_number(line_no, value)?,
    ))
}

/// Parse a `name = value` config; malformed lines are skipped with a warning.
///
/// An empty `EnergyPoints` list leaves the energy points unchanged.
pub fn parse_config_text(text: &str) -> ConfigFile {
    let mut config = ConfigFile::default();
    for (line_no, line) in content_lines(text) {
        match parse_config_line(line_no, line) {
            Ok(ConfigEntry::Parameter(name, value)) => config.parameters.push((name, value)),
            Ok(ConfigEntry::EnergyPoints(energies)) if !energies.is_empty() => {
                config.energy_points = Some(energies)
            }
            Ok(ConfigEntry::EnergyPoints(_)) => {
                log::warn!("Line {}: empty energy-point list ignored", line_no)
            }
            Err(e) => log::warn!("Skipping config {}", e),
        }
    }
    config
}

/// Load a config file and apply it to `params`
pub fn load_config_file(
    params: &mut DetectorParameters,
    path: impl AsRef<Path>,
) -> Result<ConfigFile, ConfigError> {
    let path = path.as_ref();
    log::info!("Loading config file {}", path.display());
    let config = parse_config_text(&read(path)?);
    config.apply(params);
    Ok(config)
}

/// Parse one energy per line; the first token of each line is used.
pub fn parse_energy_points(text: &str, source: &str) -> Result<Vec<f64>, ConfigError> {
    let energies: Vec<f64> = content_lines(text)
        .filter_map(|(line_no, line)| {
            let token = line.split_whitespace().next()?;
            match parse_number(line_no, token) {
                Ok(energy) => Some(energy),
                Err(e) => {
                    log::warn!("Skipping energy {}", e);
                    None
                }
            }
        })
        .collect();

    if energies.is_empty() {
        return Err(ConfigError::NoEnergyPoints(source.to_string()));
    }
    Ok(energies)
}

pub fn load_energy_points(path: impl AsRef<Path>) -> Result<Vec<f64>, ConfigError> {
    let path = path.as_ref();
    let energies = parse_energy_points(&read(path)?, &path.display().to_string())?;
    log::info!(
        "Loaded {} energy points from {}",
        energies.len(),
        path.display()
    );
    Ok(energies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::parameters::names;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    #[test]
    fn test_parameter_text() {
        let text = "# comment\n\nEcalSiPMPDE 0.3\nPedestal    80 trailing\nbroken\nADCbit x\n";
        let entries = parse_parameter_text(text);
        assert_eq!(
            entries,
            vec![
                ("EcalSiPMPDE".to_string(), 0.3),
                ("Pedestal".to_string(), 80.0)
            ]
        );
    }

    #[test]
    fn test_parameter_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("params.txt");

        let mut original = DetectorParameters::default();
        original.set(names::SIPM_DCR, 1.25e6);
        original.set("CustomKnob", -3.5);
        save_parameter_file(&original, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# Detector Parameters"));

        let mut loaded = DetectorParameters::default();
        let count = load_parameter_file(&mut loaded, &path).unwrap();
        assert_eq!(count, original.iter().count());
        assert_eq!(loaded.get(names::SIPM_DCR), 1.25e6);
        assert_eq!(loaded.get("CustomKnob"), -3.5);
    }

    #[test]
    fn test_config_text() {
        let text = "\
# detector config
EcalSiPMPDE = 0.3
Pedestal=80
NoEquals 5
= 4
ADCbit = twelve
EnergyPoints = 5, 25 ,125,
";
        let config = parse_config_text(text);
        assert_eq!(
            config.parameters,
            vec![
                ("EcalSiPMPDE".to_string(), 0.3),
                ("Pedestal".to_string(), 80.0)
            ]
        );
        assert_eq!(config.energy_points, Some(vec![5.0, 25.0, 125.0]));
    }

    #[test]
    fn test_config_line_errors() {
        assert!(matches!(
            parse_config_line(3, "NoEquals 5"),
            Err(ConfigError::MissingEquals { line: 3 })
        ));
        match parse_config_line(7, "EnergyPoints = 1, two") {
            Err(ConfigError::InvalidValue { line, value }) => {
                assert_eq!(line, 7);
                assert_eq!(value, "two");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_energy_list_keeps_points() {
        let config = parse_config_text("EnergyPoints = \n");
        assert_eq!(config.energy_points, None);
    }

    #[test]
    fn test_config_applies_dependencies() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.cfg");
        fs::write(&path, "EcalSiPMPDE = 0.5\nEnergyPoints = 1, 2\n").unwrap();

        let mut params = DetectorParameters::default();
        load_config_file(&mut params, &path).unwrap();
        assert_relative_eq!(params.get(names::CRY_ATTENUATION), 0.01);
        assert_eq!(params.energy_points(), &[1.0, 2.0]);
    }

    #[test]
    fn test_energy_points() {
        let energies = parse_energy_points("# MeV\n10\n 20.5 \nabc\n\n1e3\n", "inline").unwrap();
        assert_eq!(energies, vec![10.0, 20.5, 1000.0]);

        assert!(matches!(
            parse_energy_points("# nothing\n", "inline"),
            Err(ConfigError::NoEnergyPoints(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.txt");
        assert!(matches!(
            load_energy_points(&missing),
            Err(ConfigError::Io { .. })
        ));
        let mut params = DetectorParameters::default();
        assert!(matches!(
            load_parameter_file(&mut params, &missing),
            Err(ConfigError::Io { .. })
        ));
    }
}
