use crate::config::settings::Settings;
use crate::config::toml_config::TomlConfig;
use crate::domain::model::{Department, PropertyType};
use crate::utils::error::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "price-estimator")]
#[command(about = "Geo DVF dataset fetcher and real-estate price estimation tools")]
pub struct CliConfig {
    /// TOML configuration file; command-line flags override its values
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit JSON log lines")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the Geo DVF URLs for the requested years and departments
    Urls(DatasetArgs),
    /// Download the files missing from the local cache
    Download(DatasetArgs),
    /// Remove the cached files of the requested years and departments
    Cleanup(DatasetArgs),
    /// Download, clean and export sales with per-commune statistics
    Run {
        #[command(flatten)]
        dataset: DatasetArgs,

        #[arg(long)]
        output_path: Option<String>,
    },
    /// Convert an address to coordinates
    Geocode {
        address: String,

        #[command(flatten)]
        geocoder: GeocoderArgs,
    },
    /// Convert coordinates to an address
    Reverse {
        #[arg(allow_negative_numbers = true)]
        latitude: f64,

        #[arg(allow_negative_numbers = true)]
        longitude: f64,

        #[command(flatten)]
        geocoder: GeocoderArgs,
    },
    /// Estimate a property's value from comparable nearby sales
    Estimate {
        #[arg(long)]
        address: String,

        /// Built surface in m²
        #[arg(long)]
        surface: f64,

        #[arg(long, default_value = "appartement")]
        property_type: PropertyType,

        #[arg(long)]
        radius_km: Option<f64>,

        #[arg(long)]
        min_comparables: Option<usize>,

        #[command(flatten)]
        dataset: DatasetArgs,

        #[command(flatten)]
        geocoder: GeocoderArgs,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct DatasetArgs {
    #[arg(long, value_delimiter = ',')]
    pub years: Vec<i32>,

    #[arg(long, value_delimiter = ',')]
    pub departments: Vec<Department>,

    #[arg(long)]
    pub storage_path: Option<PathBuf>,

    #[arg(long)]
    pub dataset_url: Option<String>,

    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl DatasetArgs {
    pub fn apply_to(&self, settings: &mut Settings) {
        if !self.years.is_empty() {
            settings.years = self.years.clone();
        }
        if !self.departments.is_empty() {
            settings.departments = self.departments.clone();
        }
        if let Some(path) = &self.storage_path {
            settings.storage_path = Some(path.clone());
        }
        if let Some(url) = &self.dataset_url {
            settings.dataset_url = url.clone();
        }
        if let Some(n) = self.concurrency {
            settings.concurrent_downloads = n;
        }
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct GeocoderArgs {
    #[arg(long)]
    pub nominatim_url: Option<String>,

    #[arg(long)]
    pub user_agent: Option<String>,

    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl GeocoderArgs {
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(url) = &self.nominatim_url {
            settings.geocoder.endpoint = url.clone();
        }
        if let Some(user_agent) = &self.user_agent {
            settings.geocoder.user_agent = user_agent.clone();
        }
        if let Some(secs) = self.timeout_secs {
            settings.geocoder.timeout = Duration::from_secs(secs);
        }
    }
}

impl CliConfig {
    /// Defaults, then `--config`, then the subcommand's flags.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::default();

        if let Some(path) = &self.config {
            tracing::info!("📁 Loading configuration from: {}", path.display());
            TomlConfig::from_file(path)?.apply_to(&mut settings);
        }

        match &self.command {
            Command::Urls(dataset) | Command::Download(dataset) | Command::Cleanup(dataset) => {
                dataset.apply_to(&mut settings);
            }
            Command::Run {
                dataset,
                output_path,
            } => {
                dataset.apply_to(&mut settings);
                if let Some(path) = output_path {
                    settings.output_path = path.clone();
                }
            }
            Command::Geocode { geocoder, .. } | Command::Reverse { geocoder, .. } => {
                geocoder.apply_to(&mut settings);
            }
            Command::Estimate {
                dataset, geocoder, ..
            } => {
                dataset.apply_to(&mut settings);
                geocoder.apply_to(&mut settings);
            }
        }

        Ok(settings)
    }
}
