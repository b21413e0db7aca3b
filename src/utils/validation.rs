use crate::utils::error::{EstimatorError, Result};
use chrono::Datelike;
use url::Url;

/// First year published in the Geo DVF dataset.
pub const MIN_DVF_YEAR: i32 = 2014;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(EstimatorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(EstimatorError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(EstimatorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(EstimatorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(EstimatorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(EstimatorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EstimatorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(EstimatorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// Geo DVF years run from 2014 up to the current calendar year.
pub fn validate_year(field_name: &str, year: i32) -> Result<()> {
    let current = chrono::Utc::now().year();
    validate_range(field_name, year, MIN_DVF_YEAR, current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("dataset.url", "https://files.data.gouv.fr").is_ok());
        assert!(validate_url("dataset.url", "http://localhost:8080").is_ok());
        assert!(validate_url("dataset.url", "").is_err());
        assert!(validate_url("dataset.url", "invalid-url").is_err());
        assert!(validate_url("dataset.url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("concurrent_downloads", 4, 1).is_ok());
        assert!(validate_positive_number("concurrent_downloads", 0, 1).is_err());
    }

    #[test]
    fn test_validate_year() {
        assert!(validate_year("years", 2014).is_ok());
        assert!(validate_year("years", 2023).is_ok());
        assert!(validate_year("years", 2013).is_err());
        assert!(validate_year("years", 3000).is_err());
    }

    #[test]
    fn test_validate_non_empty_string() {
        assert!(validate_non_empty_string("geocoder.user_agent", "price_estimator").is_ok());
        assert!(validate_non_empty_string("geocoder.user_agent", "   ").is_err());
    }
}
