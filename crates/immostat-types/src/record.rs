//! Raw and cleaned transaction records.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::date::Period;

/// The only transaction nature retained by the pipeline.
pub const SALE_NATURE: &str = "Vente";

/// Property category. Other categories (dependencies, commercial premises)
/// are dropped during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    #[serde(rename = "Maison")]
    House,
    #[serde(rename = "Appartement")]
    Apartment,
}

impl PropertyType {
    pub const ALL: [PropertyType; 2] = [PropertyType::House, PropertyType::Apartment];

    /// Parse a category label. Accepts the French labels used in the source
    /// data as well as their English equivalents, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "maison" | "house" => Some(PropertyType::House),
            "appartement" | "apartment" => Some(PropertyType::Apartment),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PropertyType::House => "Maison",
            PropertyType::Apartment => "Appartement",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One input row, exactly as read. Every field may be missing; numeric
/// fields stay textual until validation so that an unparseable value is a
/// counted rejection rather than a decode failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub date: Option<String>,
    pub nature: Option<String>,
    pub value: Option<String>,
    pub department: Option<String>,
    pub municipality_code: Option<String>,
    pub municipality_name: Option<String>,
    pub property_type: Option<String>,
    pub surface: Option<String>,
}

/// A validated, derived sale.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub date: NaiveDate,
    pub value: f64,
    pub department: String,
    pub municipality_code: String,
    pub municipality_name: String,
    pub property_type: PropertyType,
    pub surface: f64,
    pub price_per_m2: f64,
    pub period: Period,
}

impl TransactionRecord {
    /// Render the record back into raw form so that it can be fed through
    /// validation again.
    pub fn to_raw(&self) -> RawRecord {
        RawRecord {
            date: Some(self.date.format("%Y-%m-%d").to_string()),
            nature: Some(SALE_NATURE.to_string()),
            value: Some(self.value.to_string()),
            department: Some(self.department.clone()),
            municipality_code: Some(self.municipality_code.clone()),
            municipality_name: Some(self.municipality_name.clone()),
            property_type: Some(self.property_type.label().to_string()),
            surface: Some(self.surface.to_string()),
        }
    }
}
