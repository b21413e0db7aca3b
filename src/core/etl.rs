use crate::core::Pipeline;
use crate::utils::error::Result;
use std::time::Instant;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self) -> Result<String> {
        let started = Instant::now();
        tracing::info!("🚀 Starting ETL process");

        // Extract
        tracing::info!("📥 Extracting Geo DVF rows...");
        let raw_data = self.pipeline.extract().await?;
        tracing::info!("Extracted {} rows", raw_data.len());

        // Transform
        tracing::info!("🔄 Cleaning sales...");
        let transformed = self.pipeline.transform(raw_data).await?;
        tracing::info!(
            "Kept {} sales ({} rows dropped) across {} commune summaries",
            transformed.sales.len(),
            transformed.rows_dropped,
            transformed.summaries.len()
        );

        // Load
        tracing::info!("💾 Writing output...");
        let output_path = self.pipeline.load(transformed).await?;
        tracing::info!(
            "Output saved to: {} in {:?}",
            output_path,
            started.elapsed()
        );

        Ok(output_path)
    }
}
