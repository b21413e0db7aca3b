use crate::core::estimator::{median, round2};
use crate::core::{ConfigProvider, DvfRow, Pipeline, Storage, TransformResult};
use crate::datasets::GeoDvfDataset;
use crate::domain::model::{CommuneSummary, PropertyType, Sale};
use crate::utils::error::{EstimatorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

pub const OUTPUT_ARCHIVE: &str = "dvf_output.zip";

/// Rules deciding which DVF mutations become priced sales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaleFilter {
    /// Empty means every residential type.
    pub property_types: Vec<PropertyType>,
    pub min_surface: f64,
    pub min_price_per_m2: f64,
    pub max_price_per_m2: f64,
}

impl Default for SaleFilter {
    fn default() -> Self {
        Self {
            property_types: Vec::new(),
            min_surface: 9.0,
            min_price_per_m2: 500.0,
            max_price_per_m2: 30_000.0,
        }
    }
}

impl SaleFilter {
    fn accepts_type(&self, kind: PropertyType) -> bool {
        self.property_types.is_empty() || self.property_types.contains(&kind)
    }
}

/// Keeps sales (`Vente`) whose mutation holds exactly one dwelling, then prices them per m².
///
/// A mutation spread over several dwellings only carries the total price, so it
/// cannot be split per unit and is dropped.
pub fn clean_sales(rows: Vec<DvfRow>, filter: &SaleFilter) -> TransformResult {
    let rows_read = rows.len();

    let mut mutations: BTreeMap<String, Vec<DvfRow>> = BTreeMap::new();
    for row in rows {
        if row.nature_mutation == "Vente" {
            mutations.entry(row.id_mutation.clone()).or_default().push(row);
        }
    }

    let mut sales = Vec::new();
    for rows in mutations.values() {
        let mut dwellings = rows.iter().filter(|r| r.property_type().is_some());
        let (Some(dwelling), None) = (dwellings.next(), dwellings.next()) else {
            continue;
        };
        if let Some(sale) = to_sale(dwelling, filter) {
            sales.push(sale);
        }
    }

    let summaries = summarize(&sales);
    tracing::debug!(
        "Kept {} sale(s) out of {} row(s), {} commune summaries",
        sales.len(),
        rows_read,
        summaries.len()
    );

    TransformResult {
        rows_dropped: rows_read - sales.len(),
        rows_read,
        sales,
        summaries,
    }
}

fn to_sale(row: &DvfRow, filter: &SaleFilter) -> Option<Sale> {
    let property_type = row.property_type()?;
    if !filter.accepts_type(property_type) {
        return None;
    }

    let price = row.valeur_fonciere.filter(|p| *p > 0.0)?;
    let surface = row
        .surface_reelle_bati
        .filter(|s| *s > 0.0 && *s >= filter.min_surface)?;

    let price_per_m2 = price / surface;
    if price_per_m2 < filter.min_price_per_m2 || price_per_m2 > filter.max_price_per_m2 {
        return None;
    }

    let coordinates = row.coordinates();
    Some(Sale {
        id_mutation: row.id_mutation.clone(),
        date: row.date_mutation,
        code_departement: row.code_departement.clone(),
        code_commune: row.code_commune.clone(),
        nom_commune: row.nom_commune.clone(),
        address: row.address(),
        property_type,
        price,
        surface,
        rooms: row
            .nombre_pieces_principales
            .filter(|r| *r >= 0.0)
            .map(|r| r as u32),
        latitude: coordinates.map(|c| c.latitude),
        longitude: coordinates.map(|c| c.longitude),
        price_per_m2: round2(price_per_m2),
    })
}

fn summarize(sales: &[Sale]) -> Vec<CommuneSummary> {
    let mut groups: BTreeMap<(&str, PropertyType), Vec<&Sale>> = BTreeMap::new();
    for sale in sales {
        groups
            .entry((sale.code_commune.as_str(), sale.property_type))
            .or_default()
            .push(sale);
    }

    groups
        .into_iter()
        .filter_map(|((code_commune, property_type), group)| {
            let mut prices: Vec<f64> = group.iter().map(|s| s.price_per_m2).collect();
            let count = prices.len();
            let mean = prices.iter().sum::<f64>() / count as f64;
            let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
            let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let median = median(&mut prices)?;

            Some(CommuneSummary {
                code_commune: code_commune.to_string(),
                nom_commune: group[0].nom_commune.clone(),
                property_type,
                sales: count,
                mean_price_per_m2: round2(mean),
                median_price_per_m2: round2(median),
                min_price_per_m2: min,
                max_price_per_m2: max,
            })
        })
        .collect()
}

fn to_csv<T: Serialize>(items: &[T]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for item in items {
        writer.serialize(item)?;
    }
    writer
        .into_inner()
        .map_err(|e| EstimatorError::from(std::io::Error::other(e.to_string())))
}

/// Download, clean and export Geo DVF sales for the configured years and departments.
pub struct DvfPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
    dataset: GeoDvfDataset,
    filter: SaleFilter,
}

impl<S: Storage, C: ConfigProvider> DvfPipeline<S, C> {
    pub fn new(storage: S, config: C) -> Result<Self> {
        let dataset = GeoDvfDataset::from_config(&config)?;
        Ok(Self {
            storage,
            config,
            dataset,
            filter: SaleFilter::default(),
        })
    }

    pub fn with_filter(mut self, filter: SaleFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn dataset(&self) -> &GeoDvfDataset {
        &self.dataset
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for DvfPipeline<S, C> {
    async fn extract(&self) -> Result<Vec<DvfRow>> {
        let report = self.dataset.download().await?;
        tracing::debug!(
            "Download report: {} new, {} cached, {} missing",
            report.downloaded.len(),
            report.skipped.len(),
            report.missing.len()
        );
        self.dataset.read_rows()
    }

    async fn transform(&self, data: Vec<DvfRow>) -> Result<TransformResult> {
        Ok(clean_sales(data, &self.filter))
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let output_path = format!("{}/{}", self.config.output_path(), OUTPUT_ARCHIVE);

        let zip_data = {
            let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

            zip.start_file::<_, ()>("sales.csv", FileOptions::default())?;
            zip.write_all(&to_csv(&result.sales)?)?;

            zip.start_file::<_, ()>("summary.csv", FileOptions::default())?;
            zip.write_all(&to_csv(&result.summaries)?)?;

            zip.start_file::<_, ()>("summary.json", FileOptions::default())?;
            let json_data = serde_json::to_string_pretty(&result.summaries)?;
            zip.write_all(json_data.as_bytes())?;

            // 完成並取回底層 Vec<u8>
            let cursor = zip.finish()?;
            cursor.into_inner()
        };

        tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
        self.storage.write_file(OUTPUT_ARCHIVE, &zip_data).await?;

        Ok(output_path)
    }
}
