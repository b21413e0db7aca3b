use crate::config::settings::Settings;
use crate::core::pipeline::SaleFilter;
use crate::domain::model::Department;
use crate::utils::error::{EstimatorError, Result};
use crate::utils::validation::Validate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub dataset: DatasetConfig,
    pub geocoder: Option<GeocoderSection>,
    pub output: Option<OutputConfig>,
    pub filters: Option<SaleFilter>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub years: Option<Vec<i32>>,
    pub departments: Option<Vec<Department>>,
    pub storage_path: Option<PathBuf>,
    pub url: Option<String>,
    pub concurrent_downloads: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeocoderSection {
    pub endpoint: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub min_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub output_path: String,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EstimatorError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EstimatorError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${DVF_CACHE_DIR})，未設定的保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EstimatorError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// Overlays every value present in the file onto `settings`.
    pub fn apply_to(&self, settings: &mut Settings) {
        let dataset = &self.dataset;
        if let Some(years) = &dataset.years {
            settings.years = years.clone();
        }
        if let Some(departments) = &dataset.departments {
            settings.departments = departments.clone();
        }
        if let Some(path) = &dataset.storage_path {
            settings.storage_path = Some(path.clone());
        }
        if let Some(url) = &dataset.url {
            settings.dataset_url = url.clone();
        }
        if let Some(n) = dataset.concurrent_downloads {
            settings.concurrent_downloads = n;
        }

        if let Some(geocoder) = &self.geocoder {
            if let Some(endpoint) = &geocoder.endpoint {
                settings.geocoder.endpoint = endpoint.clone();
            }
            if let Some(user_agent) = &geocoder.user_agent {
                settings.geocoder.user_agent = user_agent.clone();
            }
            if let Some(secs) = geocoder.timeout_seconds {
                settings.geocoder.timeout = Duration::from_secs(secs);
            }
            if let Some(ms) = geocoder.min_interval_ms {
                settings.geocoder.min_interval = Duration::from_millis(ms);
            }
        }

        if let Some(output) = &self.output {
            settings.output_path = output.output_path.clone();
        }
        if let Some(filters) = &self.filters {
            settings.filter = filters.clone();
        }
    }

    pub fn to_settings(&self) -> Settings {
        let mut settings = Settings::default();
        self.apply_to(&mut settings);
        settings
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.to_settings().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::PropertyType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[dataset]
years = [2022, 2023]
departments = ["75", "2A"]
storage_path = "data/geo_dvf"
url = "https://files.data.gouv.fr/geo-dvf/latest/csv"
concurrent_downloads = 2

[geocoder]
user_agent = "price_estimator_test"
timeout_seconds = 5
min_interval_ms = 1500

[output]
output_path = "./dvf-output"

[filters]
property_types = ["Appartement"]
min_surface = 12.0
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        let settings = config.to_settings();

        assert_eq!(settings.years, vec![2022, 2023]);
        assert_eq!(settings.departments[1].as_str(), "2A");
        assert_eq!(settings.storage_path, Some(PathBuf::from("data/geo_dvf")));
        assert_eq!(settings.concurrent_downloads, 2);
        assert_eq!(settings.geocoder.user_agent, "price_estimator_test");
        assert_eq!(settings.geocoder.timeout, Duration::from_secs(5));
        assert_eq!(settings.geocoder.min_interval, Duration::from_millis(1500));
        assert_eq!(settings.output_path, "./dvf-output");
        assert_eq!(settings.filter.property_types, vec![PropertyType::Appartement]);
        assert_eq!(settings.filter.min_surface, 12.0);
        // 未指定的欄位沿用預設值
        assert_eq!(settings.filter.max_price_per_m2, 30_000.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let settings = TomlConfig::from_toml_str("").unwrap().to_settings();
        assert!(settings.years.is_empty());
        assert_eq!(settings.departments.len(), 4);
    }

    #[test]
    fn test_invalid_department_rejected() {
        let toml_content = r#"
[dataset]
departments = ["20"]
"#;
        assert!(TomlConfig::from_toml_str(toml_content).is_err());
    }

    #[test]
    fn test_numeric_departments_accepted() {
        let toml_content = r#"
[dataset]
years = [2023]
departments = [75, 1, "2A", 971]
"#;
        let settings = TomlConfig::from_toml_str(toml_content).unwrap().to_settings();
        let codes: Vec<&str> = settings.departments.iter().map(|d| d.as_str()).collect();
        assert_eq!(codes, vec!["75", "01", "2A", "971"]);

        let invalid = "[dataset]\ndepartments = [20]\n";
        assert!(TomlConfig::from_toml_str(invalid).is_err());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("PRICE_ESTIMATOR_TEST_CACHE", "/var/cache/dvf");

        let toml_content = r#"
[dataset]
storage_path = "${PRICE_ESTIMATOR_TEST_CACHE}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(
            config.dataset.storage_path,
            Some(PathBuf::from("/var/cache/dvf"))
        );

        std::env::remove_var("PRICE_ESTIMATOR_TEST_CACHE");
    }

    #[test]
    fn test_config_validation() {
        let toml_content = r#"
[dataset]
years = [2023]
url = "invalid-url"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[dataset]\nyears = [2021]\n")
            .unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.dataset.years, Some(vec![2021]));
    }
}
