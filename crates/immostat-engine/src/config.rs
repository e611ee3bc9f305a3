//! Pipeline configuration.
//!
//! The regional and national variants of the cleaning pipeline differ only
//! in geographic scope, price plausibility band and municipality-code
//! normalization, so one engine is parameterized by this struct.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use immostat_types::error::{ImmoError, Result};

/// Île-de-France departments, the default scope of the regional preset.
pub const ILE_DE_FRANCE: [&str; 8] = ["75", "77", "78", "91", "92", "93", "94", "95"];

/// Whether the band edges themselves are plausible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandBounds {
    Exclusive,
    Inclusive,
}

/// Plausible price-per-area band. Rows outside it are treated as entry
/// errors and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBand {
    pub min: f64,
    pub max: f64,
    pub bounds: BandBounds,
}

impl PriceBand {
    pub fn exclusive(min: f64, max: f64) -> Self {
        PriceBand {
            min,
            max,
            bounds: BandBounds::Exclusive,
        }
    }

    pub fn inclusive(min: f64, max: f64) -> Self {
        PriceBand {
            min,
            max,
            bounds: BandBounds::Inclusive,
        }
    }

    pub fn contains(&self, price: f64) -> bool {
        match self.bounds {
            BandBounds::Exclusive => price > self.min && price < self.max,
            BandBounds::Inclusive => price >= self.min && price <= self.max,
        }
    }
}

/// How sub-district (arrondissement) codes of Paris, Lyon and Marseille are
/// reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeNormalization {
    /// Keep arrondissement codes so each district is its own municipality.
    KeepAsIs,
    /// Rewrite arrondissement codes to the parent city.
    CollapseToParent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeoScope {
    All,
    Departments(BTreeSet<String>),
}

impl GeoScope {
    pub fn departments<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        GeoScope::Departments(codes.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, department: &str) -> bool {
        match self {
            GeoScope::All => true,
            GeoScope::Departments(set) => set.contains(department),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Rows per source batch.
    pub batch_size: usize,

    /// Batches processed concurrently.
    pub workers: usize,

    /// Surface must be strictly greater than this.
    pub min_surface: f64,

    /// Value must be strictly greater than this.
    pub min_value: f64,

    pub price_band: PriceBand,

    pub normalization: CodeNormalization,

    pub scope: GeoScope,
}

impl PipelineConfig {
    /// A configuration with the given price band and defaults for
    /// everything else. Batch size and worker count come from the global
    /// tunables.
    pub fn new(price_band: PriceBand) -> Self {
        PipelineConfig {
            batch_size: immostat_config::get_batch_size(),
            workers: immostat_config::get_workers(),
            min_surface: 9.0,
            min_value: 1000.0,
            price_band,
            normalization: CodeNormalization::KeepAsIs,
            scope: GeoScope::All,
        }
    }

    /// Regional subset: tighter band, restricted scope.
    pub fn regional<I, S>(departments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PipelineConfig {
            scope: GeoScope::departments(departments),
            ..PipelineConfig::new(PriceBand::exclusive(1000.0, 40000.0))
        }
    }

    /// Île-de-France preset.
    pub fn ile_de_france() -> Self {
        Self::regional(ILE_DE_FRANCE)
    }

    /// Whole-country subset: wider band.
    pub fn national() -> Self {
        PipelineConfig::new(PriceBand::exclusive(500.0, 25000.0))
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ImmoError::Config("batch_size must be positive".to_string()));
        }
        if self.workers == 0 {
            return Err(ImmoError::Config("workers must be positive".to_string()));
        }
        let band = &self.price_band;
        if !band.min.is_finite() || !band.max.is_finite() || band.min > band.max {
            return Err(ImmoError::Config(format!(
                "invalid price band [{}, {}]",
                band.min, band.max
            )));
        }
        if self.min_surface < 0.0 || self.min_value < 0.0 {
            return Err(ImmoError::Config("thresholds must not be negative".to_string()));
        }
        Ok(())
    }
}
