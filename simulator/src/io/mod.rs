//! File formats: parameter and config files, energy-point lists, trace CSV

pub mod config_file;
pub mod trace_csv;

pub use config_file::{
    load_config_file, load_energy_points, load_parameter_file, save_parameter_file, ConfigError,
    ConfigFile,
};
pub use trace_csv::CsvTraceSink;
