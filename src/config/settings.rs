use crate::core::pipeline::SaleFilter;
use crate::datasets::geo_dvf::{DEFAULT_CONCURRENT_DOWNLOADS, DEFAULT_DATASET_URL};
use crate::domain::model::Department;
use crate::domain::ports::ConfigProvider;
use crate::geo::GeocoderConfig;
use crate::utils::error::{EstimatorError, Result};
use crate::utils::validation::{
    validate_path, validate_positive_number, validate_url, validate_year, Validate,
};
use std::path::{Path, PathBuf};

/// Resolved configuration: defaults, then the TOML file, then command-line flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub years: Vec<i32>,
    pub departments: Vec<Department>,
    pub storage_path: Option<PathBuf>,
    pub dataset_url: String,
    pub concurrent_downloads: usize,
    pub output_path: String,
    pub geocoder: GeocoderConfig,
    pub filter: SaleFilter,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            years: Vec::new(),
            departments: Department::ile_de_france(),
            storage_path: None,
            dataset_url: DEFAULT_DATASET_URL.to_string(),
            concurrent_downloads: DEFAULT_CONCURRENT_DOWNLOADS,
            output_path: "./output".to_string(),
            geocoder: GeocoderConfig::default(),
            filter: SaleFilter::default(),
        }
    }
}

impl Settings {
    /// Dataset commands need at least one year; there is no sensible default.
    pub fn require_years(&self) -> Result<()> {
        if self.years.is_empty() {
            return Err(EstimatorError::MissingConfigError {
                field: "years".to_string(),
            });
        }
        Ok(())
    }
}

impl ConfigProvider for Settings {
    fn years(&self) -> &[i32] {
        &self.years
    }

    fn departments(&self) -> &[Department] {
        &self.departments
    }

    fn storage_path(&self) -> Option<&Path> {
        self.storage_path.as_deref()
    }

    fn dataset_url(&self) -> &str {
        &self.dataset_url
    }

    fn concurrent_downloads(&self) -> usize {
        self.concurrent_downloads
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        for year in &self.years {
            validate_year("years", *year)?;
        }
        validate_url("dataset_url", &self.dataset_url)?;
        validate_positive_number("concurrent_downloads", self.concurrent_downloads, 1)?;
        validate_path("output_path", &self.output_path)?;
        if let Some(path) = &self.storage_path {
            validate_path("storage_path", &path.to_string_lossy())?;
        }
        validate_url("geocoder.endpoint", &self.geocoder.endpoint)?;

        if self.filter.min_price_per_m2 >= self.filter.max_price_per_m2 {
            return Err(EstimatorError::ConfigValidationError {
                field: "filters".to_string(),
                message: format!(
                    "min_price_per_m2 ({}) must be lower than max_price_per_m2 ({})",
                    self.filter.min_price_per_m2, self.filter.max_price_per_m2
                ),
            });
        }
        Ok(())
    }
}
