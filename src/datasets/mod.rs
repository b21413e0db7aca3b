pub mod geo_dvf;

pub use geo_dvf::GeoDvfDataset;
