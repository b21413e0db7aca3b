use crate::domain::model::{Coordinates, Estimate, PropertyType, Sale};
use crate::utils::error::{EstimatorError, Result};

pub const DEFAULT_RADIUS_KM: f64 = 1.0;
pub const DEFAULT_MIN_COMPARABLES: usize = 5;

#[derive(Debug, Clone)]
pub struct EstimateRequest {
    pub target: Coordinates,
    pub surface: f64,
    pub property_type: PropertyType,
    pub radius_km: f64,
    pub min_comparables: usize,
}

impl EstimateRequest {
    pub fn new(target: Coordinates, surface: f64, property_type: PropertyType) -> Self {
        Self {
            target,
            surface,
            property_type,
            radius_km: DEFAULT_RADIUS_KM,
            min_comparables: DEFAULT_MIN_COMPARABLES,
        }
    }

    pub fn with_radius_km(mut self, radius_km: f64) -> Self {
        self.radius_km = radius_km;
        self
    }

    pub fn with_min_comparables(mut self, min_comparables: usize) -> Self {
        self.min_comparables = min_comparables;
        self
    }
}

/// Median price per m² of same-type sales within the radius, times the surface.
///
/// Returns `Ok(None)` when fewer than `min_comparables` sales qualify.
pub fn estimate(sales: &[Sale], request: &EstimateRequest) -> Result<Option<Estimate>> {
    if request.surface.is_nan() || request.surface <= 0.0 {
        return Err(EstimatorError::ValidationError {
            message: format!("Surface must be positive, got {}", request.surface),
        });
    }
    if request.radius_km.is_nan() || request.radius_km <= 0.0 {
        return Err(EstimatorError::ValidationError {
            message: format!("Radius must be positive, got {}", request.radius_km),
        });
    }

    let mut prices: Vec<f64> = sales
        .iter()
        .filter(|s| s.property_type == request.property_type)
        .filter(|s| {
            s.coordinates()
                .is_some_and(|c| c.distance_km(&request.target) <= request.radius_km)
        })
        .map(|s| s.price_per_m2)
        .collect();

    tracing::debug!(
        "{} comparable {} sale(s) within {} km of {}",
        prices.len(),
        request.property_type,
        request.radius_km,
        request.target
    );

    if prices.len() < request.min_comparables.max(1) {
        return Ok(None);
    }

    let comparables = prices.len();
    let Some(median_price_per_m2) = median(&mut prices) else {
        return Ok(None);
    };

    Ok(Some(Estimate {
        value: (median_price_per_m2 * request.surface).round(),
        median_price_per_m2: round2(median_price_per_m2),
        comparables,
        radius_km: request.radius_km,
    }))
}

pub(crate) fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
