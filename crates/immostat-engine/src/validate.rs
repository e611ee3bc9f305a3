//! Validator: the fixed predicate chain applied to every raw row.
//!
//! Rules, in order: geographic scope, sale nature, property category,
//! presence of the numeric and identifying fields, numeric parsing, then
//! the surface and value thresholds. Presence is checked before any
//! threshold comparison. Each dropped row yields exactly one
//! [`RejectReason`].

use std::fmt;

use serde::{Deserialize, Serialize};

use immostat_geo::centroid::department_code;
use immostat_types::record::{PropertyType, RawRecord, SALE_NATURE};

use crate::config::{GeoScope, PipelineConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    OutOfScope,
    NotASale,
    UnsupportedPropertyType,
    MissingField,
    MalformedField,
    SurfaceTooSmall,
    ValueTooSmall,
    InvalidDate,
    PriceOutOfBand,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::OutOfScope => "out of scope",
            RejectReason::NotASale => "not a sale",
            RejectReason::UnsupportedPropertyType => "unsupported property type",
            RejectReason::MissingField => "missing field",
            RejectReason::MalformedField => "malformed field",
            RejectReason::SurfaceTooSmall => "surface too small",
            RejectReason::ValueTooSmall => "value too small",
            RejectReason::InvalidDate => "invalid date",
            RejectReason::PriceOutOfBand => "price out of band",
        };
        f.write_str(s)
    }
}

/// Dropped-row counters, one per reason. Merges by addition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectCounts {
    pub out_of_scope: u64,
    pub not_a_sale: u64,
    pub unsupported_property_type: u64,
    pub missing_field: u64,
    pub malformed_field: u64,
    pub surface_too_small: u64,
    pub value_too_small: u64,
    pub invalid_date: u64,
    pub price_out_of_band: u64,
}

impl RejectCounts {
    fn slot(&mut self, reason: RejectReason) -> &mut u64 {
        match reason {
            RejectReason::OutOfScope => &mut self.out_of_scope,
            RejectReason::NotASale => &mut self.not_a_sale,
            RejectReason::UnsupportedPropertyType => &mut self.unsupported_property_type,
            RejectReason::MissingField => &mut self.missing_field,
            RejectReason::MalformedField => &mut self.malformed_field,
            RejectReason::SurfaceTooSmall => &mut self.surface_too_small,
            RejectReason::ValueTooSmall => &mut self.value_too_small,
            RejectReason::InvalidDate => &mut self.invalid_date,
            RejectReason::PriceOutOfBand => &mut self.price_out_of_band,
        }
    }

    pub fn record(&mut self, reason: RejectReason) {
        *self.slot(reason) += 1;
    }

    pub fn get(&self, reason: RejectReason) -> u64 {
        let mut copy = *self;
        *copy.slot(reason)
    }

    pub fn merge(&mut self, other: &RejectCounts) {
        self.out_of_scope += other.out_of_scope;
        self.not_a_sale += other.not_a_sale;
        self.unsupported_property_type += other.unsupported_property_type;
        self.missing_field += other.missing_field;
        self.malformed_field += other.malformed_field;
        self.surface_too_small += other.surface_too_small;
        self.value_too_small += other.value_too_small;
        self.invalid_date += other.invalid_date;
        self.price_out_of_band += other.price_out_of_band;
    }

    pub fn total(&self) -> u64 {
        self.out_of_scope
            + self.not_a_sale
            + self.unsupported_property_type
            + self.missing_field
            + self.malformed_field
            + self.surface_too_small
            + self.value_too_small
            + self.invalid_date
            + self.price_out_of_band
    }
}

/// A row that passed validation. Numeric fields are parsed; the date is
/// still textual and is handled by the deriver.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub date: Option<String>,
    pub value: f64,
    pub surface: f64,
    pub department: String,
    pub municipality_code: String,
    pub municipality_name: String,
    pub property_type: PropertyType,
}

/// Parse a decimal field. Accepts `,` as the decimal separator and
/// ignores embedded spaces.
pub fn parse_decimal(s: &str) -> Option<f64> {
    let cleaned: String = s
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub struct Validator<'a> {
    config: &'a PipelineConfig,
}

impl<'a> Validator<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Validator { config }
    }

    pub fn check(&self, raw: &RawRecord) -> Result<ValidatedRecord, RejectReason> {
        // Department is taken from its own column, or else from the
        // leading digits of the municipality code.
        let department = raw
            .department
            .as_deref()
            .or_else(|| raw.municipality_code.as_deref().and_then(department_code));
        let in_scope = match department {
            Some(dept) => self.config.scope.contains(dept),
            None => self.config.scope == GeoScope::All,
        };
        if !in_scope {
            return Err(RejectReason::OutOfScope);
        }

        if raw.nature.as_deref().map(str::trim) != Some(SALE_NATURE) {
            return Err(RejectReason::NotASale);
        }
        let property_type = raw
            .property_type
            .as_deref()
            .and_then(PropertyType::parse)
            .ok_or(RejectReason::UnsupportedPropertyType)?;

        let (value, surface, code, department) = match (
            raw.value.as_deref(),
            raw.surface.as_deref(),
            raw.municipality_code.as_deref(),
            department,
        ) {
            (Some(v), Some(s), Some(c), Some(d)) => (v, s, c, d),
            _ => return Err(RejectReason::MissingField),
        };

        let value = parse_decimal(value).ok_or(RejectReason::MalformedField)?;
        let surface = parse_decimal(surface).ok_or(RejectReason::MalformedField)?;

        if surface <= self.config.min_surface {
            return Err(RejectReason::SurfaceTooSmall);
        }
        if value <= self.config.min_value {
            return Err(RejectReason::ValueTooSmall);
        }

        Ok(ValidatedRecord {
            date: raw.date.clone(),
            value,
            surface,
            department: department.to_string(),
            municipality_code: code.to_string(),
            municipality_name: raw.municipality_name.clone().unwrap_or_default(),
            property_type,
        })
    }

    /// Keep the rows that pass, counting the others.
    pub fn validate(&self, rows: &[RawRecord], counts: &mut RejectCounts) -> Vec<ValidatedRecord> {
        rows.iter()
            .filter_map(|raw| match self.check(raw) {
                Ok(v) => Some(v),
                Err(reason) => {
                    counts.record(reason);
                    None
                }
            })
            .collect()
    }
}
