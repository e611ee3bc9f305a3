//! Snapshot publication and loading.
//!
//! A build writes into a staging directory through a [`SnapshotWriter`].
//! Publishing renames the staging directory into place and then replaces
//! `CURRENT`, so readers see either the previous snapshot or the new one.
//! A writer that is dropped without being published removes its staging
//! directory.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use immostat_engine::aggregate::SnapshotAggregates;
use immostat_engine::build::{run_build, BuildReport, RecordSink};
use immostat_engine::config::PipelineConfig;
use immostat_engine::snapshot::Snapshot;
use immostat_engine::source::RecordSource;
use immostat_io::local_fs::LocalFileSystem;
use immostat_io::vfs::{join, VirtualFileSystem, WritableFile};
use immostat_types::error::{ImmoError, Result};
use immostat_types::record::TransactionRecord;

use crate::manifest::{Manifest, MANIFEST_FILE};
use crate::tables::{
    csv_error, read_details, read_municipalities, read_periods, read_property_types, write_municipalities,
    write_periods, write_property_types, DetailRow, DETAILS_FILE, MUNICIPALITIES_FILE, PERIODS_FILE,
    PROPERTY_TYPES_FILE,
};

pub const CURRENT_FILE: &str = "CURRENT";
const SNAPSHOT_PREFIX: &str = "snapshot-";
const STAGING_PREFIX: &str = ".staging-";

fn snapshot_dir_name(generation: u64) -> String {
    format!("{}{:06}", SNAPSHOT_PREFIX, generation)
}

fn parse_generation(name: &str) -> Option<u64> {
    name.trim().strip_prefix(SNAPSHOT_PREFIX)?.parse().ok()
}

pub struct SnapshotStore {
    fs: Arc<dyn VirtualFileSystem>,
    root: String,
    current: Mutex<Option<Arc<Snapshot>>>,
}

impl SnapshotStore {
    /// Open (creating if needed) a store rooted at `root`. Staging
    /// directories left behind by an interrupted build are removed.
    pub fn open(fs: Arc<dyn VirtualFileSystem>, root: &str) -> Result<Self> {
        fs.mkdir_p(root)?;
        for name in fs.list_dir(root)? {
            if name.starts_with(STAGING_PREFIX) {
                debug!(name = %name, "removing abandoned staging directory");
                fs.remove_dir_all(&join(root, &name))?;
            }
        }
        Ok(SnapshotStore {
            fs,
            root: root.to_string(),
            current: Mutex::new(None),
        })
    }

    pub fn open_local(root: &str) -> Result<Self> {
        Self::open(Arc::new(LocalFileSystem), root)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    fn cache(&self) -> MutexGuard<'_, Option<Arc<Snapshot>>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Generation named by `CURRENT`, if anything has been published.
    pub fn current_generation(&self) -> Result<Option<u64>> {
        let path = join(&self.root, CURRENT_FILE);
        if !self.fs.exists(&path)? {
            return Ok(None);
        }
        let name = self.fs.read_to_string(&path)?;
        parse_generation(&name)
            .map(Some)
            .ok_or_else(|| ImmoError::Format(format!("Invalid {} contents: '{}'", CURRENT_FILE, name.trim())))
    }

    fn next_generation(&self) -> Result<u64> {
        let highest = self
            .fs
            .list_dir(&self.root)?
            .iter()
            .filter_map(|name| parse_generation(name))
            .max()
            .unwrap_or(0);
        let current = self.current_generation()?.unwrap_or(0);
        Ok(highest.max(current) + 1)
    }

    /// Start a new snapshot. Records are streamed into the returned writer.
    pub fn begin(&self, config: &PipelineConfig) -> Result<SnapshotWriter> {
        let generation = self.next_generation()?;
        let staging = join(&self.root, &format!("{}{:06}", STAGING_PREFIX, generation));
        self.fs.mkdir_p(&staging)?;
        let file = self.fs.open_write(&join(&staging, DETAILS_FILE))?;
        debug!(generation, staging = %staging, "started snapshot");
        Ok(SnapshotWriter {
            fs: self.fs.clone(),
            staging,
            generation,
            config: config.clone(),
            details: Some(csv::Writer::from_writer(file)),
            rows: 0,
            published: false,
        })
    }

    /// Finish `writer` and make it the current snapshot. Older snapshot
    /// directories are deleted afterwards.
    pub fn publish(
        &self,
        mut writer: SnapshotWriter,
        aggregates: &SnapshotAggregates,
        report: &BuildReport,
    ) -> Result<u64> {
        if writer.rows != report.rows_kept {
            return Err(ImmoError::Format(format!(
                "Snapshot holds {} records but the build kept {}",
                writer.rows, report.rows_kept
            )));
        }
        writer.finish(aggregates, report)?;

        let generation = writer.generation;
        let name = snapshot_dir_name(generation);
        self.fs.rename(&writer.staging, &join(&self.root, &name))?;
        writer.published = true;
        self.fs.write_atomic(&join(&self.root, CURRENT_FILE), name.as_bytes())?;
        *self.cache() = None;
        info!(generation, rows = report.rows_kept, "published snapshot");

        self.remove_older_than(generation);
        Ok(generation)
    }

    fn remove_older_than(&self, generation: u64) {
        let names = match self.fs.list_dir(&self.root) {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "could not list snapshot store");
                return;
            }
        };
        for name in names {
            if parse_generation(&name).is_some_and(|g| g < generation) {
                if let Err(e) = self.fs.remove_dir_all(&join(&self.root, &name)) {
                    warn!(name = %name, error = %e, "could not remove old snapshot");
                }
            }
        }
    }

    /// Run a build from `source` straight into a new published snapshot.
    /// On failure or cancellation nothing is published.
    pub async fn build(
        &self,
        source: RecordSource,
        config: Arc<PipelineConfig>,
        cancel: CancellationToken,
    ) -> Result<(u64, BuildReport)> {
        let writer = self.begin(&config)?;
        let out = run_build(source, config, writer, cancel).await?;
        let generation = self.publish(out.sink, &out.aggregates, &out.report)?;
        Ok((generation, out.report))
    }

    /// Manifest of the current snapshot.
    pub fn manifest(&self) -> Result<Option<Manifest>> {
        let Some(generation) = self.current_generation()? else {
            return Ok(None);
        };
        let dir = join(&self.root, &snapshot_dir_name(generation));
        let text = self.fs.read_to_string(&join(&dir, MANIFEST_FILE))?;
        Manifest::from_json(&text).map(Some)
    }

    /// Read the current snapshot from disk, replacing the cached one.
    pub fn load(&self) -> Result<Option<Arc<Snapshot>>> {
        let Some(manifest) = self.manifest()? else {
            *self.cache() = None;
            return Ok(None);
        };
        let dir = join(&self.root, &snapshot_dir_name(manifest.generation));

        let records = read_details(self.fs.open_read(&join(&dir, DETAILS_FILE))?)?;
        if records.len() as u64 != manifest.report.rows_kept {
            return Err(ImmoError::Format(format!(
                "{} holds {} records, manifest says {}",
                DETAILS_FILE,
                records.len(),
                manifest.report.rows_kept
            )));
        }
        let municipalities = read_municipalities(self.fs.open_read(&join(&dir, MUNICIPALITIES_FILE))?)?;
        let periods = read_periods(self.fs.open_read(&join(&dir, PERIODS_FILE))?)?;
        let (type_prices, type_values) =
            read_property_types(self.fs.open_read(&join(&dir, PROPERTY_TYPES_FILE))?)?;
        let aggregates = SnapshotAggregates {
            municipalities,
            periods,
            type_prices,
            type_values,
        };

        let snapshot = Arc::new(Snapshot::new(manifest.generation, records, aggregates));
        debug!(generation = manifest.generation, rows = snapshot.len(), "loaded snapshot");
        *self.cache() = Some(snapshot.clone());
        Ok(Some(snapshot))
    }

    /// The current snapshot, loaded on first use and cached until the next
    /// publish.
    pub fn current(&self) -> Result<Option<Arc<Snapshot>>> {
        if let Some(snapshot) = self.cache().as_ref() {
            return Ok(Some(snapshot.clone()));
        }
        self.load()
    }
}

/// Streams one build's detailed records into a staging directory.
pub struct SnapshotWriter {
    fs: Arc<dyn VirtualFileSystem>,
    staging: String,
    generation: u64,
    config: PipelineConfig,
    details: Option<csv::Writer<Box<dyn WritableFile>>>,
    rows: u64,
    published: bool,
}

impl SnapshotWriter {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn write_table<F>(&self, name: &str, write: F) -> Result<()>
    where
        F: FnOnce(Box<dyn WritableFile>) -> Result<Box<dyn WritableFile>>,
    {
        let file = self.fs.open_write(&join(&self.staging, name))?;
        let mut file = write(file)?;
        file.flush_all()
    }

    fn finish(&mut self, aggregates: &SnapshotAggregates, report: &BuildReport) -> Result<()> {
        if let Some(details) = self.details.take() {
            let mut file = details.into_inner().map_err(|e| ImmoError::Io(e.into_error()))?;
            file.flush_all()?;
        }
        self.write_table(MUNICIPALITIES_FILE, |f| write_municipalities(f, &aggregates.municipalities))?;
        self.write_table(PERIODS_FILE, |f| write_periods(f, &aggregates.periods))?;
        self.write_table(PROPERTY_TYPES_FILE, |f| write_property_types(f, aggregates))?;

        let manifest = Manifest::new(self.generation, &self.config, report);
        self.write_table(MANIFEST_FILE, |mut f| {
            f.write_all(&manifest.to_json()?)?;
            Ok(f)
        })
    }
}

impl RecordSink for SnapshotWriter {
    fn write_batch(&mut self, records: &[TransactionRecord]) -> Result<()> {
        let details = self
            .details
            .as_mut()
            .ok_or_else(|| ImmoError::Format("Snapshot writer already finished".to_string()))?;
        for record in records {
            details.serialize(DetailRow::from(record)).map_err(csv_error)?;
        }
        self.rows += records.len() as u64;
        Ok(())
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        self.details = None;
        if let Err(e) = self.fs.remove_dir_all(&self.staging) {
            warn!(staging = %self.staging, error = %e, "could not remove staging directory");
        }
    }
}
