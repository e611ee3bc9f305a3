use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use immostat_engine::build::BuildReport;
use immostat_engine::config::{CodeNormalization, GeoScope, PipelineConfig, PriceBand};
use immostat_types::error::{ImmoError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: u32 = 1;

/// Describes how a snapshot was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub generation: u64,
    pub created_at: DateTime<Utc>,
    pub report: BuildReport,
    pub price_band: PriceBand,
    pub normalization: CodeNormalization,
    pub scope: GeoScope,
    pub min_surface: f64,
    pub min_value: f64,
}

impl Manifest {
    pub fn new(generation: u64, config: &PipelineConfig, report: &BuildReport) -> Self {
        Manifest {
            version: MANIFEST_VERSION,
            generation,
            created_at: Utc::now(),
            report: *report,
            price_band: config.price_band,
            normalization: config.normalization,
            scope: config.scope.clone(),
            min_surface: config.min_surface,
            min_value: config.min_value,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| ImmoError::Format(format!("JSON serialization error: {}", e)))
    }

    pub fn from_json(bytes: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(bytes)
            .map_err(|e| ImmoError::Format(format!("Invalid manifest: {}", e)))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ImmoError::Format(format!(
                "Unsupported manifest version {}",
                manifest.version
            )));
        }
        Ok(manifest)
    }
}
