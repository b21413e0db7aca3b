use crate::utils::error::{EstimatorError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Mean Earth radius used for haversine distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A French department code: `01`..`95` (no `20`), `2A`/`2B` or `971`..`976`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub struct Department(String);

/// `75` and `"75"` are both accepted in config files.
#[derive(Deserialize)]
#[serde(untagged)]
enum DepartmentCode {
    Number(u32),
    Text(String),
}

impl<'de> Deserialize<'de> for Department {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let department = match DepartmentCode::deserialize(deserializer)? {
            DepartmentCode::Number(n) => Self::try_from(n),
            DepartmentCode::Text(code) => Self::new(&code),
        };
        department.map_err(serde::de::Error::custom)
    }
}

impl Department {
    pub fn new(code: &str) -> Result<Self> {
        let code = code.trim().to_ascii_uppercase();
        let invalid = |reason: &str| EstimatorError::InvalidConfigValueError {
            field: "departments".to_string(),
            value: code.clone(),
            reason: reason.to_string(),
        };

        if code == "2A" || code == "2B" {
            return Ok(Self(code));
        }
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("Department code must be numeric, 2A or 2B"));
        }

        match code.len() {
            1 | 2 => {
                let n: u32 = code
                    .parse()
                    .map_err(|_| invalid("Department code must be numeric"))?;
                Self::try_from(n)
            }
            3 => {
                let n: u32 = code
                    .parse()
                    .map_err(|_| invalid("Department code must be numeric"))?;
                if (971..=976).contains(&n) {
                    Ok(Self(code))
                } else {
                    Err(invalid("Overseas departments range from 971 to 976"))
                }
            }
            _ => Err(invalid("Department code is too long")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Île-de-France core: Paris and the petite couronne.
    pub fn ile_de_france() -> Vec<Self> {
        ["75", "92", "93", "94"]
            .iter()
            .map(|c| Self(c.to_string()))
            .collect()
    }
}

impl TryFrom<u32> for Department {
    type Error = EstimatorError;

    fn try_from(n: u32) -> Result<Self> {
        match n {
            1..=19 | 21..=95 => Ok(Self(format!("{:02}", n))),
            971..=976 => Ok(Self(n.to_string())),
            _ => Err(EstimatorError::InvalidConfigValueError {
                field: "departments".to_string(),
                value: n.to_string(),
                reason: "Not a French department number (Corsica is 2A/2B)".to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Department {
    type Error = EstimatorError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Department> for String {
    fn from(value: Department) -> Self {
        value.0
    }
}

impl FromStr for Department {
    type Err = EstimatorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PropertyType {
    Appartement,
    Maison,
}

impl PropertyType {
    /// Maps the DVF `type_local` column; dependencies and commercial premises yield `None`.
    pub fn from_type_local(value: &str) -> Option<Self> {
        match value.trim() {
            "Appartement" => Some(Self::Appartement),
            "Maison" => Some(Self::Maison),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Appartement => "Appartement",
            Self::Maison => "Maison",
        }
    }
}

impl FromStr for PropertyType {
    type Err = EstimatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "appartement" | "apartment" | "flat" => Ok(Self::Appartement),
            "maison" | "house" => Ok(Self::Maison),
            other => Err(EstimatorError::ValidationError {
                message: format!("Unknown property type '{}': use appartement or maison", other),
            }),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(EstimatorError::ValidationError {
                message: format!("Latitude {} is outside [-90, 90]", latitude),
            });
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(EstimatorError::ValidationError {
                message: format!("Longitude {} is outside [-180, 180]", longitude),
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Great-circle distance in kilometres (haversine).
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// One row of a Geo DVF CSV file. Columns not listed here are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DvfRow {
    pub id_mutation: String,
    pub date_mutation: Option<NaiveDate>,
    #[serde(default)]
    pub nature_mutation: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub valeur_fonciere: Option<f64>,
    #[serde(default)]
    pub adresse_numero: Option<String>,
    #[serde(default)]
    pub adresse_nom_voie: Option<String>,
    #[serde(default)]
    pub code_postal: Option<String>,
    #[serde(default)]
    pub code_commune: String,
    #[serde(default)]
    pub nom_commune: String,
    #[serde(default)]
    pub code_departement: String,
    #[serde(default)]
    pub type_local: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub surface_reelle_bati: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub nombre_pieces_principales: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub surface_terrain: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub latitude: Option<f64>,
}

impl DvfRow {
    pub fn property_type(&self) -> Option<PropertyType> {
        self.type_local.as_deref().and_then(PropertyType::from_type_local)
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Coordinates::new(lat, lon).ok(),
            _ => None,
        }
    }

    pub fn address(&self) -> String {
        let street = [self.adresse_numero.as_deref(), self.adresse_nom_voie.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let city = [self.code_postal.as_deref(), Some(self.nom_commune.as_str())]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        match (street.is_empty(), city.is_empty()) {
            (false, false) => format!("{}, {}", street, city),
            (false, true) => street,
            _ => city,
        }
    }
}

/// A residential sale priced per square metre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id_mutation: String,
    pub date: Option<NaiveDate>,
    pub code_departement: String,
    pub code_commune: String,
    pub nom_commune: String,
    pub address: String,
    pub property_type: PropertyType,
    pub price: f64,
    pub surface: f64,
    pub rooms: Option<u32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub price_per_m2: f64,
}

impl Sale {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Coordinates::new(lat, lon).ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommuneSummary {
    pub code_commune: String,
    pub nom_commune: String,
    pub property_type: PropertyType,
    pub sales: usize,
    pub mean_price_per_m2: f64,
    pub median_price_per_m2: f64,
    pub min_price_per_m2: f64,
    pub max_price_per_m2: f64,
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub sales: Vec<Sale>,
    pub summaries: Vec<CommuneSummary>,
    pub rows_read: usize,
    pub rows_dropped: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadReport {
    pub downloaded: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub missing: Vec<String>,
}

impl DownloadReport {
    pub fn total(&self) -> usize {
        self.downloaded.len() + self.skipped.len() + self.missing.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimate {
    pub value: f64,
    pub median_price_per_m2: f64,
    pub comparables: usize,
    pub radius_km: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_department_parsing() {
        assert_eq!(Department::new("75").unwrap().as_str(), "75");
        assert_eq!(Department::new("1").unwrap().as_str(), "01");
        assert_eq!(Department::new("2a").unwrap().as_str(), "2A");
        assert_eq!(Department::new("974").unwrap().as_str(), "974");
        assert_eq!(Department::try_from(92u32).unwrap().as_str(), "92");

        assert!(Department::new("20").is_err());
        assert!(Department::new("96").is_err());
        assert!(Department::new("977").is_err());
        assert!(Department::new("").is_err());
        assert!(Department::new("Paris").is_err());
        assert!(Department::try_from(0u32).is_err());
    }

    #[test]
    fn test_department_serde_as_string() {
        let dep: Department = serde_json::from_str("\"2B\"").unwrap();
        assert_eq!(dep.as_str(), "2B");
        assert_eq!(serde_json::to_string(&dep).unwrap(), "\"2B\"");
        assert!(serde_json::from_str::<Department>("\"99\"").is_err());
    }

    #[test]
    fn test_department_deserializes_from_number() {
        let deps: Vec<Department> = serde_json::from_str(r#"[92, 5, "2A"]"#).unwrap();
        let codes: Vec<&str> = deps.iter().map(Department::as_str).collect();
        assert_eq!(codes, vec!["92", "05", "2A"]);
        assert!(serde_json::from_str::<Department>("20").is_err());
        assert!(serde_json::from_str::<Department>("-75").is_err());
    }

    #[test]
    fn test_property_type_parsing() {
        assert_eq!("Maison".parse::<PropertyType>().unwrap(), PropertyType::Maison);
        assert_eq!("apartment".parse::<PropertyType>().unwrap(), PropertyType::Appartement);
        assert!("Local industriel".parse::<PropertyType>().is_err());
        assert_eq!(PropertyType::from_type_local("Dépendance"), None);
    }

    #[test]
    fn test_coordinates_bounds() {
        assert!(Coordinates::new(48.8566, 2.3522).is_ok());
        assert!(Coordinates::new(91.0, 2.0).is_err());
        assert!(Coordinates::new(48.0, -181.0).is_err());
        assert!(Coordinates::new(f64::NAN, 2.0).is_err());
    }

    #[test]
    fn test_distance_paris_to_versailles() {
        let notre_dame = Coordinates::new(48.8530, 2.3499).unwrap();
        let versailles = Coordinates::new(48.8049, 2.1204).unwrap();
        let d = notre_dame.distance_km(&versailles);
        assert!((16.0..18.5).contains(&d), "unexpected distance {}", d);
        assert_eq!(notre_dame.distance_km(&notre_dame), 0.0);
    }

    #[test]
    fn test_row_address() {
        let row = DvfRow {
            adresse_numero: Some("12".to_string()),
            adresse_nom_voie: Some("RUE DE RIVOLI".to_string()),
            code_postal: Some("75001".to_string()),
            nom_commune: "Paris 1er Arrondissement".to_string(),
            ..Default::default()
        };
        assert_eq!(row.address(), "12 RUE DE RIVOLI, 75001 Paris 1er Arrondissement");
    }
}
