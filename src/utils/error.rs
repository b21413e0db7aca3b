use thiserror::Error;

#[derive(Error, Debug)]
pub enum EstimatorError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Download of {url} failed with HTTP status {status}")]
    DownloadError { url: String, status: u16 },

    #[error("Geocoding error: {message}")]
    GeocodingError { message: String },

    #[error("No dataset files found under {path}")]
    DatasetNotFound { path: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Data,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EstimatorError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::HttpError(_) | Self::DownloadError { .. } | Self::GeocodingError { .. } => {
                ErrorCategory::Network
            }
            Self::CsvError(_)
            | Self::SerializationError(_)
            | Self::ValidationError { .. }
            | Self::DatasetNotFound { .. } => ErrorCategory::Data,
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::IoError(_) | Self::ZipError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::HttpError(_) | Self::DownloadError { .. } | Self::GeocodingError { .. } => {
                ErrorSeverity::Medium
            }
            Self::CsvError(_)
            | Self::SerializationError(_)
            | Self::ValidationError { .. }
            | Self::DatasetNotFound { .. } => ErrorSeverity::High,
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. }
            | Self::IoError(_)
            | Self::ZipError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(e) => e.is_timeout() || e.is_connect(),
            Self::DownloadError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::HttpError(_) => {
                "Check your network connection and retry; the remote service may be temporarily unavailable".to_string()
            }
            Self::DownloadError { status, .. } if *status == 429 || *status >= 500 => {
                "The dataset server is busy, retry the download later".to_string()
            }
            Self::DownloadError { .. } => {
                "Check the dataset URL and the requested years and departments".to_string()
            }
            Self::GeocodingError { .. } => {
                "Check the address spelling or retry later; Nominatim allows one request per second".to_string()
            }
            Self::DatasetNotFound { .. } => {
                "Run the `download` command for the same years and departments first".to_string()
            }
            Self::CsvError(_) => {
                "The cached file may be corrupted; run `cleanup` and download it again".to_string()
            }
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => {
                "Fix the configuration file or command-line arguments and retry".to_string()
            }
            Self::IoError(_) | Self::ZipError(_) => {
                "Check disk space and permissions on the storage and output directories".to_string()
            }
            Self::SerializationError(_) | Self::ValidationError { .. } => {
                "Inspect the input data; run with --verbose for details".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::HttpError(_) => "Could not reach the remote service".to_string(),
            Self::DownloadError { url, status } => {
                format!("Download failed ({}) for {}", status, url)
            }
            Self::GeocodingError { message } => format!("Geocoding failed: {}", message),
            Self::DatasetNotFound { path } => {
                format!("No downloaded dataset was found in {}", path)
            }
            Self::InvalidConfigValueError { field, reason, .. } => {
                format!("Invalid setting '{}': {}", field, reason)
            }
            Self::MissingConfigError { field } => format!("Missing setting '{}'", field),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EstimatorError>;
