use crate::domain::model::{Coordinates, Department, DvfRow, TransformResult};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn years(&self) -> &[i32];
    fn departments(&self) -> &[Department];
    fn storage_path(&self) -> Option<&Path>;
    fn dataset_url(&self) -> &str;
    fn concurrent_downloads(&self) -> usize;
    fn output_path(&self) -> &str;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<DvfRow>>;
    async fn transform(&self, data: Vec<DvfRow>) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<String>;
}

/// Forward and reverse geocoding. `Ok(None)` means the service answered but found nothing.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>>;
    async fn reverse(&self, coordinates: Coordinates) -> Result<Option<String>>;
}
