#[cfg(feature = "cli")]
pub mod args;
pub mod cli;
pub mod settings;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use args::{CliConfig, Command, DatasetArgs, GeocoderArgs};
pub use settings::Settings;
