//! Deriver: price-per-area, plausibility band, municipality code
//! normalization and the period key.

use immostat_types::date::{parse_record_date, Period};
use immostat_types::record::{RawRecord, TransactionRecord};

use crate::config::{CodeNormalization, PipelineConfig, PriceBand};
use crate::validate::{RejectCounts, RejectReason, ValidatedRecord, Validator};

/// Cities whose arrondissements carry their own municipality codes:
/// (first arrondissement code, last arrondissement code, parent code, parent name).
const ARRONDISSEMENTS: [(u32, u32, &str, &str); 3] = [
    (75101, 75120, "75056", "Paris"),
    (13201, 13216, "13055", "Marseille"),
    (69381, 69389, "69123", "Lyon"),
];

/// The parent city of an arrondissement code, if it is one.
pub fn parent_municipality(code: &str) -> Option<(&'static str, &'static str)> {
    if code.len() != 5 {
        return None;
    }
    let n: u32 = code.parse().ok()?;
    ARRONDISSEMENTS
        .iter()
        .find(|(first, last, _, _)| (*first..=*last).contains(&n))
        .map(|(_, _, parent, name)| (*parent, *name))
}

/// Rewrite a municipality code and name under `mode`.
pub fn normalize_municipality(code: String, name: String, mode: CodeNormalization) -> (String, String) {
    match mode {
        CodeNormalization::KeepAsIs => (code, name),
        CodeNormalization::CollapseToParent => match parent_municipality(&code) {
            Some((parent, parent_name)) => (parent.to_string(), parent_name.to_string()),
            None => (code, name),
        },
    }
}

pub struct Deriver {
    band: PriceBand,
    normalization: CodeNormalization,
}

impl Deriver {
    pub fn new(config: &PipelineConfig) -> Self {
        Deriver {
            band: config.price_band,
            normalization: config.normalization,
        }
    }

    pub fn derive(&self, row: ValidatedRecord) -> Result<TransactionRecord, RejectReason> {
        // surface > min_surface >= 0 was established by the validator
        let price_per_m2 = row.value / row.surface;
        if !self.band.contains(price_per_m2) {
            return Err(RejectReason::PriceOutOfBand);
        }
        let date = row
            .date
            .as_deref()
            .and_then(parse_record_date)
            .ok_or(RejectReason::InvalidDate)?;
        let (municipality_code, municipality_name) =
            normalize_municipality(row.municipality_code, row.municipality_name, self.normalization);

        Ok(TransactionRecord {
            date,
            value: row.value,
            department: row.department,
            municipality_code,
            municipality_name,
            property_type: row.property_type,
            surface: row.surface,
            price_per_m2,
            period: Period::of(date),
        })
    }

    pub fn derive_all(&self, rows: Vec<ValidatedRecord>, counts: &mut RejectCounts) -> Vec<TransactionRecord> {
        rows.into_iter()
            .filter_map(|row| match self.derive(row) {
                Ok(rec) => Some(rec),
                Err(reason) => {
                    counts.record(reason);
                    None
                }
            })
            .collect()
    }
}

/// Run the validator and the deriver over `rows`.
pub fn clean_rows(config: &PipelineConfig, rows: &[RawRecord], counts: &mut RejectCounts) -> Vec<TransactionRecord> {
    let validated = Validator::new(config).validate(rows, counts);
    Deriver::new(config).derive_all(validated, counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use immostat_types::record::PropertyType;

    fn validated(value: f64, surface: f64, code: &str, date: &str) -> ValidatedRecord {
        ValidatedRecord {
            date: Some(date.to_string()),
            value,
            surface,
            department: code[..2].to_string(),
            municipality_code: code.to_string(),
            municipality_name: format!("Commune {}", code),
            property_type: PropertyType::House,
        }
    }

    #[test]
    fn test_price_and_period() {
        let cfg = PipelineConfig::national();
        let rec = Deriver::new(&cfg)
            .derive(validated(200_000.0, 80.0, "33063", "2022-11-07"))
            .unwrap();
        assert_eq!(rec.price_per_m2, 2500.0);
        assert_eq!(rec.period, Period { year: 2022, month: 11 });
        assert_eq!(rec.date, NaiveDate::from_ymd_opt(2022, 11, 7).unwrap());
    }

    #[test]
    fn test_band_edges() {
        let mut cfg = PipelineConfig::regional(["75"]);
        let at_min = validated(100_000.0, 100.0, "75056", "2022-01-01");
        let at_max = validated(4_000_000.0, 100.0, "75056", "2022-01-01");

        let exclusive = Deriver::new(&cfg);
        assert_eq!(exclusive.derive(at_min.clone()), Err(RejectReason::PriceOutOfBand));
        assert_eq!(exclusive.derive(at_max.clone()), Err(RejectReason::PriceOutOfBand));

        cfg.price_band = PriceBand::inclusive(1000.0, 40000.0);
        let inclusive = Deriver::new(&cfg);
        assert!(inclusive.derive(at_min).is_ok());
        assert!(inclusive.derive(at_max).is_ok());
    }

    #[test]
    fn test_invalid_date() {
        let cfg = PipelineConfig::national();
        let deriver = Deriver::new(&cfg);
        assert_eq!(
            deriver.derive(validated(200_000.0, 80.0, "33063", "2022-02-30")),
            Err(RejectReason::InvalidDate)
        );
        let mut row = validated(200_000.0, 80.0, "33063", "");
        row.date = None;
        assert_eq!(deriver.derive(row), Err(RejectReason::InvalidDate));
    }

    #[test]
    fn test_normalization_modes() {
        let mut cfg = PipelineConfig::national();
        let row = validated(500_000.0, 50.0, "75111", "2023-06-01");

        let kept = Deriver::new(&cfg).derive(row.clone()).unwrap();
        assert_eq!(kept.municipality_code, "75111");

        cfg.normalization = CodeNormalization::CollapseToParent;
        let collapsed = Deriver::new(&cfg).derive(row).unwrap();
        assert_eq!(collapsed.municipality_code, "75056");
        assert_eq!(collapsed.municipality_name, "Paris");

        assert_eq!(parent_municipality("13216"), Some(("13055", "Marseille")));
        assert_eq!(parent_municipality("69389"), Some(("69123", "Lyon")));
        assert_eq!(parent_municipality("69390"), None);
        assert_eq!(parent_municipality("2A004"), None);
    }

    #[test]
    fn test_clean_rows_counts_every_drop() {
        let cfg = PipelineConfig::national();
        let good = RawRecord {
            date: Some("2023-03-15".into()),
            nature: Some("Vente".into()),
            value: Some("150000".into()),
            department: Some("69".into()),
            municipality_code: Some("69381".into()),
            municipality_name: Some("Lyon 1er Arrondissement".into()),
            property_type: Some("Appartement".into()),
            surface: Some("50".into()),
        };
        let mut bad_date = good.clone();
        bad_date.date = Some("garbage".into());
        let mut too_cheap = good.clone();
        too_cheap.value = Some("20000".into());

        let mut counts = RejectCounts::default();
        let out = clean_rows(&cfg, &[good, bad_date, too_cheap], &mut counts);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].price_per_m2, 3000.0);
        assert_eq!(counts.invalid_date, 1);
        assert_eq!(counts.price_out_of_band, 1);
    }
}
