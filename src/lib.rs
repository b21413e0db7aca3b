pub mod config;
pub mod core;
pub mod datasets;
pub mod domain;
pub mod geo;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{cli::LocalStorage, Settings};

pub use crate::core::{etl::EtlEngine, pipeline::DvfPipeline};
pub use datasets::GeoDvfDataset;
pub use domain::model::{Coordinates, Department, PropertyType};
pub use geo::{address_to_coordinates, coordinates_to_address, NominatimGeocoder};
pub use utils::error::{EstimatorError, Result};
