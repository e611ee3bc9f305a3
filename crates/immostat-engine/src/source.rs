//! Record source: lazily yields raw rows in fixed-size batches from a
//! (possibly gzip-compressed) delimited file.
//!
//! The sequence is finite and non-restartable. A decode failure (corrupt or
//! truncated input) is returned on the batch where it occurs and ends the
//! sequence; no partial batch is recovered.

use std::io::Read;
use std::pin::Pin;

use csv::{ByteRecord, ReaderBuilder};
use futures::stream::{self, Stream};
use tracing::debug;

use immostat_io::compression::{decompress_if_gzip, open_input};
use immostat_io::vfs::VirtualFileSystem;
use immostat_types::error::{ImmoError, Result};
use immostat_types::record::RawRecord;

use crate::batch::RawBatch;

pub const DATE_COLUMN: &str = "date_mutation";
pub const NATURE_COLUMN: &str = "nature_mutation";
pub const VALUE_COLUMN: &str = "valeur_fonciere";
pub const DEPARTMENT_COLUMN: &str = "code_departement";
pub const MUNICIPALITY_CODE_COLUMN: &str = "code_commune";
pub const MUNICIPALITY_NAME_COLUMN: &str = "nom_commune";
pub const PROPERTY_TYPE_COLUMN: &str = "type_local";
pub const SURFACE_COLUMN: &str = "surface_reelle_bati";

/// A stream of raw batches.
pub type BatchStream = Pin<Box<dyn Stream<Item = Result<RawBatch>> + Send>>;

#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// Rows per batch.
    pub batch_size: usize,
    /// Field delimiter.
    pub delimiter: u8,
}

impl Default for SourceOptions {
    fn default() -> Self {
        SourceOptions {
            batch_size: immostat_config::get_batch_size(),
            delimiter: b',',
        }
    }
}

/// Positions of the required columns in the header.
#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    date: usize,
    nature: usize,
    value: usize,
    department: usize,
    municipality_code: usize,
    municipality_name: usize,
    property_type: usize,
    surface: usize,
}

impl ColumnMap {
    fn resolve(header: &ByteRecord) -> Result<Self> {
        let names: Vec<String> = header
            .iter()
            .map(|h| String::from_utf8_lossy(h).trim().trim_start_matches('\u{feff}').to_string())
            .collect();
        let find = |name: &str| {
            names.iter().position(|n| n == name).ok_or_else(|| {
                ImmoError::Format(format!("Input is missing required column '{}'", name))
            })
        };
        Ok(ColumnMap {
            date: find(DATE_COLUMN)?,
            nature: find(NATURE_COLUMN)?,
            value: find(VALUE_COLUMN)?,
            department: find(DEPARTMENT_COLUMN)?,
            municipality_code: find(MUNICIPALITY_CODE_COLUMN)?,
            municipality_name: find(MUNICIPALITY_NAME_COLUMN)?,
            property_type: find(PROPERTY_TYPE_COLUMN)?,
            surface: find(SURFACE_COLUMN)?,
        })
    }

    fn extract(&self, record: &ByteRecord) -> RawRecord {
        RawRecord {
            date: field(record, self.date),
            nature: field(record, self.nature),
            value: field(record, self.value),
            department: field(record, self.department),
            municipality_code: field(record, self.municipality_code),
            municipality_name: field(record, self.municipality_name),
            property_type: field(record, self.property_type),
            surface: field(record, self.surface),
        }
    }
}

/// Missing trailing fields and empty fields both read as `None`.
fn field(record: &ByteRecord, index: usize) -> Option<String> {
    let raw = record.get(index)?;
    let value = String::from_utf8_lossy(raw);
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub struct RecordSource {
    reader: csv::Reader<Box<dyn Read + Send>>,
    columns: ColumnMap,
    batch_size: usize,
    record: ByteRecord,
    next_seq: u64,
    rows_read: u64,
    finished: bool,
}

impl RecordSource {
    /// Open `path` on `fs`. Gzip input is decompressed transparently.
    pub fn open(fs: &dyn VirtualFileSystem, path: &str, options: &SourceOptions) -> Result<Self> {
        let input = open_input(fs, path)?;
        debug!(path, batch_size = options.batch_size, "opened record source");
        Self::from_reader(input, options)
    }

    /// Read from an already-open handle, decompressing it if it is gzip.
    pub fn from_reader(input: Box<dyn Read + Send>, options: &SourceOptions) -> Result<Self> {
        let input = decompress_if_gzip(input)?;
        let mut reader = ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(input);

        let header = reader.byte_headers().map_err(|e| match e.into_kind() {
            csv::ErrorKind::Io(io) => ImmoError::Io(io),
            other => ImmoError::Format(format!("Unreadable header: {:?}", other)),
        })?;
        let columns = ColumnMap::resolve(header)?;

        Ok(RecordSource {
            reader,
            columns,
            batch_size: options.batch_size.max(1),
            record: ByteRecord::new(),
            next_seq: 0,
            rows_read: 0,
            finished: false,
        })
    }

    /// Rows read so far.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn into_stream(self) -> BatchStream {
        Box::pin(stream::iter(self))
    }

    fn next_batch(&mut self) -> Result<Option<RawBatch>> {
        let mut rows = Vec::with_capacity(self.batch_size);
        while rows.len() < self.batch_size {
            let more = self.reader.read_byte_record(&mut self.record).map_err(|e| {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                ImmoError::Decode(format!("batch {} near line {}: {}", self.next_seq, line, e))
            })?;
            if !more {
                break;
            }
            rows.push(self.columns.extract(&self.record));
        }
        if rows.is_empty() {
            return Ok(None);
        }
        self.rows_read += rows.len() as u64;
        let batch = RawBatch::new(self.next_seq, rows);
        self.next_seq += 1;
        Ok(Some(batch))
    }
}

impl Iterator for RecordSource {
    type Item = Result<RawBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    use flate2::write::GzEncoder;
    use flate2::Compression;
    use futures::StreamExt;
    use immostat_io::local_fs::LocalFileSystem;

    const HEADER: &str = "id_mutation,date_mutation,nature_mutation,valeur_fonciere,code_departement,code_commune,nom_commune,type_local,surface_reelle_bati";

    fn csv_rows(n: usize) -> String {
        let mut s = String::from(HEADER);
        s.push('\n');
        for i in 0..n {
            s.push_str(&format!(
                "2023-{},2023-01-{:02},Vente,{},01,01053,Bourg-en-Bresse,Maison,{}\n",
                i,
                (i % 28) + 1,
                100_000 + i,
                50 + i % 40
            ));
        }
        s
    }

    fn source(text: &str, batch_size: usize) -> RecordSource {
        let options = SourceOptions {
            batch_size,
            ..Default::default()
        };
        RecordSource::from_reader(Box::new(Cursor::new(text.as_bytes().to_vec())), &options).unwrap()
    }

    #[test]
    fn test_batches_in_order() {
        let batches: Vec<RawBatch> = source(&csv_rows(5), 2).map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches.iter().map(|b| b.seq).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(batches[2].num_rows(), 1);
        assert_eq!(batches[0].rows[1].value.as_deref(), Some("100001"));
        assert_eq!(batches[0].rows[0].department.as_deref(), Some("01"));
        assert_eq!(batches[0].rows[0].municipality_code.as_deref(), Some("01053"));
    }

    #[test]
    fn test_empty_and_short_rows() {
        let text = format!("{}\n1,2023-01-01,Vente,,01,01053\n", HEADER);
        let rows: Vec<RawRecord> = source(&text, 10).flat_map(|b| b.unwrap().rows).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, None);
        assert_eq!(rows[0].surface, None);
        assert_eq!(rows[0].property_type, None);
    }

    #[test]
    fn test_header_only() {
        let mut src = source(&format!("{}\n", HEADER), 10);
        assert!(src.next().is_none());
        assert!(src.next().is_none());
        assert_eq!(src.rows_read(), 0);
    }

    #[test]
    fn test_missing_column() {
        let options = SourceOptions::default();
        let result = RecordSource::from_reader(
            Box::new(Cursor::new(b"date_mutation,valeur_fonciere\n".to_vec())),
            &options,
        );
        assert!(matches!(result, Err(ImmoError::Format(_))));
    }

    #[test]
    fn test_semicolon_delimiter() {
        let text = csv_rows(3).replace(',', ";");
        let options = SourceOptions {
            batch_size: 10,
            delimiter: b';',
        };
        let src = RecordSource::from_reader(Box::new(Cursor::new(text.into_bytes())), &options).unwrap();
        let rows: Vec<RawRecord> = src.flat_map(|b| b.unwrap().rows).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].nature.as_deref(), Some("Vente"));
    }

    #[test]
    fn test_open_gzip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dvf.csv.gz");
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(csv_rows(250).as_bytes()).unwrap();
        std::fs::write(&path, enc.finish().unwrap()).unwrap();

        let options = SourceOptions {
            batch_size: 100,
            ..Default::default()
        };
        let mut src = RecordSource::open(&LocalFileSystem, path.to_str().unwrap(), &options).unwrap();
        let sizes: Vec<usize> = src.by_ref().map(|b| b.unwrap().num_rows()).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(src.rows_read(), 250);
    }

    #[test]
    fn test_open_missing_file_is_io_error() {
        let result = RecordSource::open(&LocalFileSystem, "/no/such/dvf.csv.gz", &SourceOptions::default());
        assert!(matches!(result, Err(ImmoError::Io(_))));
    }

    #[test]
    fn test_truncated_gzip_aborts_with_decode_error() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(csv_rows(20_000).as_bytes()).unwrap();
        let data = enc.finish().unwrap();
        let truncated = data[..data.len() * 3 / 5].to_vec();

        let options = SourceOptions {
            batch_size: 1000,
            ..Default::default()
        };
        let src = RecordSource::from_reader(Box::new(Cursor::new(truncated)), &options).unwrap();
        let results: Vec<Result<RawBatch>> = src.collect();
        let (last, before) = results.split_last().unwrap();
        assert!(matches!(last, Err(ImmoError::Decode(_))));
        assert!(before.iter().all(|r| r.is_ok()));
        assert!(!before.is_empty());
    }

    #[tokio::test]
    async fn test_into_stream() {
        let stream = source(&csv_rows(7), 3).into_stream();
        let batches: Vec<Result<RawBatch>> = stream.collect().await;
        assert_eq!(batches.len(), 3);
    }
}
