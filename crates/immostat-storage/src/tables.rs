//! CSV row formats of the snapshot files.

use std::io::{Read, Write};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use immostat_engine::aggregate::{AggregateSet, MunicipalityKey, SnapshotAggregates};
use immostat_types::bucket::AggregateBucket;
use immostat_types::date::Period;
use immostat_types::error::{ImmoError, Result};
use immostat_types::record::{PropertyType, TransactionRecord};

pub const DETAILS_FILE: &str = "details.csv";
pub const MUNICIPALITIES_FILE: &str = "municipalities.csv";
pub const PERIODS_FILE: &str = "periods.csv";
pub const PROPERTY_TYPES_FILE: &str = "property_types.csv";

pub(crate) fn csv_error(e: csv::Error) -> ImmoError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => ImmoError::Io(io),
        other => ImmoError::Format(format!("CSV error: {:?}", other)),
    }
}

/// One detailed record: the input fields plus price per m² and period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    pub date_mutation: NaiveDate,
    pub valeur_fonciere: f64,
    pub code_departement: String,
    pub code_commune: String,
    pub nom_commune: String,
    pub type_local: PropertyType,
    pub surface_reelle_bati: f64,
    pub prix_m2: f64,
    pub periode: Period,
}

impl From<&TransactionRecord> for DetailRow {
    fn from(r: &TransactionRecord) -> Self {
        DetailRow {
            date_mutation: r.date,
            valeur_fonciere: r.value,
            code_departement: r.department.clone(),
            code_commune: r.municipality_code.clone(),
            nom_commune: r.municipality_name.clone(),
            type_local: r.property_type,
            surface_reelle_bati: r.surface,
            prix_m2: r.price_per_m2,
            periode: r.period,
        }
    }
}

impl From<DetailRow> for TransactionRecord {
    fn from(r: DetailRow) -> Self {
        TransactionRecord {
            date: r.date_mutation,
            value: r.valeur_fonciere,
            department: r.code_departement,
            municipality_code: r.code_commune,
            municipality_name: r.nom_commune,
            property_type: r.type_local,
            surface: r.surface_reelle_bati,
            price_per_m2: r.prix_m2,
            period: r.periode,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MunicipalityRow {
    code_commune: String,
    nom_commune: String,
    code_departement: String,
    prix_m2_moyen: f64,
    nb_ventes: u64,
    somme_prix_m2: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PeriodRow {
    periode: Period,
    prix_m2_moyen: f64,
    nb_ventes: u64,
    somme_prix_m2: f64,
}

/// Price and value buckets of one type share their count.
#[derive(Debug, Serialize, Deserialize)]
struct PropertyTypeRow {
    type_local: PropertyType,
    nb_ventes: u64,
    prix_m2_moyen: f64,
    somme_prix_m2: f64,
    valeur_totale: f64,
}

fn bucket(count: u64, sum: f64, what: &str) -> Result<AggregateBucket> {
    AggregateBucket::from_parts(count, sum)
        .ok_or_else(|| ImmoError::Format(format!("Empty bucket in {}", what)))
}

pub fn write_municipalities<W: Write>(writer: W, set: &AggregateSet<MunicipalityKey>) -> Result<W> {
    let mut csv = csv::Writer::from_writer(writer);
    for (key, b) in set.iter() {
        csv.serialize(MunicipalityRow {
            code_commune: key.code.clone(),
            nom_commune: key.name.clone(),
            code_departement: key.department.clone(),
            prix_m2_moyen: b.mean(),
            nb_ventes: b.count(),
            somme_prix_m2: b.sum(),
        })
        .map_err(csv_error)?;
    }
    csv.into_inner().map_err(|e| ImmoError::Io(e.into_error()))
}

pub fn read_municipalities<R: Read>(reader: R) -> Result<AggregateSet<MunicipalityKey>> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut set = AggregateSet::new();
    for row in csv.deserialize::<MunicipalityRow>() {
        let row = row.map_err(csv_error)?;
        let key = MunicipalityKey {
            code: row.code_commune,
            name: row.nom_commune,
            department: row.code_departement,
        };
        set.insert_bucket(key, bucket(row.nb_ventes, row.somme_prix_m2, MUNICIPALITIES_FILE)?);
    }
    Ok(set)
}

pub fn write_periods<W: Write>(writer: W, set: &AggregateSet<Period>) -> Result<W> {
    let mut csv = csv::Writer::from_writer(writer);
    for (period, b) in set.iter() {
        csv.serialize(PeriodRow {
            periode: *period,
            prix_m2_moyen: b.mean(),
            nb_ventes: b.count(),
            somme_prix_m2: b.sum(),
        })
        .map_err(csv_error)?;
    }
    csv.into_inner().map_err(|e| ImmoError::Io(e.into_error()))
}

pub fn read_periods<R: Read>(reader: R) -> Result<AggregateSet<Period>> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut set = AggregateSet::new();
    for row in csv.deserialize::<PeriodRow>() {
        let row = row.map_err(csv_error)?;
        set.insert_bucket(row.periode, bucket(row.nb_ventes, row.somme_prix_m2, PERIODS_FILE)?);
    }
    Ok(set)
}

pub fn write_property_types<W: Write>(writer: W, aggs: &SnapshotAggregates) -> Result<W> {
    let mut csv = csv::Writer::from_writer(writer);
    for (ty, price) in aggs.type_prices.iter() {
        let value_sum = aggs.type_values.get(ty).map(|b| b.sum()).unwrap_or(0.0);
        csv.serialize(PropertyTypeRow {
            type_local: *ty,
            nb_ventes: price.count(),
            prix_m2_moyen: price.mean(),
            somme_prix_m2: price.sum(),
            valeur_totale: value_sum,
        })
        .map_err(csv_error)?;
    }
    csv.into_inner().map_err(|e| ImmoError::Io(e.into_error()))
}

/// Returns `(type_prices, type_values)`.
pub fn read_property_types<R: Read>(
    reader: R,
) -> Result<(AggregateSet<PropertyType>, AggregateSet<PropertyType>)> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut prices = AggregateSet::new();
    let mut values = AggregateSet::new();
    for row in csv.deserialize::<PropertyTypeRow>() {
        let row = row.map_err(csv_error)?;
        prices.insert_bucket(row.type_local, bucket(row.nb_ventes, row.somme_prix_m2, PROPERTY_TYPES_FILE)?);
        values.insert_bucket(row.type_local, bucket(row.nb_ventes, row.valeur_totale, PROPERTY_TYPES_FILE)?);
    }
    Ok((prices, values))
}

pub fn read_details<R: Read>(reader: R) -> Result<Vec<TransactionRecord>> {
    let mut csv = csv::Reader::from_reader(reader);
    csv.deserialize::<DetailRow>()
        .map(|row| row.map(TransactionRecord::from).map_err(csv_error))
        .collect()
}
