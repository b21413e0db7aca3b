use clap::Parser;
use price_estimator::config::Command;
use price_estimator::core::estimator::{estimate, EstimateRequest};
use price_estimator::core::pipeline::clean_sales;
use price_estimator::utils::error::{ErrorSeverity, EstimatorError, Result};
use price_estimator::utils::{logger, validation::Validate};
use price_estimator::{
    address_to_coordinates, coordinates_to_address, CliConfig, DvfPipeline, EtlEngine,
    GeoDvfDataset, LocalStorage, NominatimGeocoder, Settings,
};

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting price-estimator");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    if let Err(e) = run(cli).await {
        tracing::error!(
            "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };

        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

async fn run(cli: CliConfig) -> Result<()> {
    let settings = cli.settings()?;
    settings.validate()?;

    match &cli.command {
        Command::Urls(_) => {
            settings.require_years()?;
            for url in GeoDvfDataset::from_config(&settings)?.urls() {
                println!("{}", url);
            }
        }
        Command::Download(_) => {
            settings.require_years()?;
            let dataset = GeoDvfDataset::from_config(&settings)?;
            let report = dataset.download().await?;

            println!(
                "✅ {} downloaded, {} already cached, {} missing upstream",
                report.downloaded.len(),
                report.skipped.len(),
                report.missing.len()
            );
            for url in &report.missing {
                println!("⚠️ missing: {}", url);
            }
            println!("📁 Cache: {}", dataset.storage_path().display());
        }
        Command::Cleanup(_) => {
            settings.require_years()?;
            let dataset = GeoDvfDataset::from_config(&settings)?;
            let removed = dataset.cleanup()?;
            println!(
                "🧹 Removed {} file(s) from {}",
                removed,
                dataset.storage_path().display()
            );
        }
        Command::Run { .. } => {
            settings.require_years()?;
            let storage = LocalStorage::new(settings.output_path.clone());
            let pipeline =
                DvfPipeline::new(storage, settings.clone())?.with_filter(settings.filter.clone());

            let cache = pipeline.dataset().storage_path().to_path_buf();

            let output_path = EtlEngine::new(pipeline).run().await?;
            println!("✅ ETL process completed successfully!");
            println!("📁 Output saved to: {}", output_path);
            println!("📁 Cache: {}", cache.display());
        }
        Command::Geocode { address, .. } => {
            let geocoder = NominatimGeocoder::new(settings.geocoder.clone())?;
            match address_to_coordinates(&geocoder, address).await {
                Some(coordinates) => println!("{}", coordinates),
                None => println!("No coordinates found for '{}'", address),
            }
        }
        Command::Reverse {
            latitude,
            longitude,
            ..
        } => {
            let geocoder = NominatimGeocoder::new(settings.geocoder.clone())?;
            match coordinates_to_address(&geocoder, *latitude, *longitude).await {
                Some(address) => println!("{}", address),
                None => println!("No address found for ({}, {})", latitude, longitude),
            }
        }
        Command::Estimate {
            address,
            surface,
            property_type,
            radius_km,
            min_comparables,
            ..
        } => {
            settings.require_years()?;
            run_estimate(
                &settings,
                address,
                *surface,
                *property_type,
                *radius_km,
                *min_comparables,
            )
            .await?;
        }
    }

    Ok(())
}

async fn run_estimate(
    settings: &Settings,
    address: &str,
    surface: f64,
    property_type: price_estimator::PropertyType,
    radius_km: Option<f64>,
    min_comparables: Option<usize>,
) -> Result<()> {
    let geocoder = NominatimGeocoder::new(settings.geocoder.clone())?;
    let target = address_to_coordinates(&geocoder, address)
        .await
        .ok_or_else(|| EstimatorError::GeocodingError {
            message: format!("Address not found: {}", address),
        })?;
    tracing::info!("📍 {} -> {}", address, target);

    let dataset = GeoDvfDataset::from_config(settings)?;
    dataset.download().await?;
    let cleaned = clean_sales(dataset.read_rows()?, &settings.filter);

    let mut request = EstimateRequest::new(target, surface, property_type);
    if let Some(radius) = radius_km {
        request = request.with_radius_km(radius);
    }
    if let Some(n) = min_comparables {
        request = request.with_min_comparables(n);
    }

    match estimate(&cleaned.sales, &request)? {
        Some(result) => {
            println!(
                "💶 Estimated value: {:.0} € ({:.0} €/m² median over {} sales within {} km)",
                result.value, result.median_price_per_m2, result.comparables, result.radius_km
            );
        }
        None => {
            println!(
                "Not enough comparable {} sales within {} km of {}",
                property_type, request.radius_km, target
            );
        }
    }
    Ok(())
}
