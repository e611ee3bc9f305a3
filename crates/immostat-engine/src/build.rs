//! Batch build: source → validator → deriver → aggregator → sink.
//!
//! The source is drained on a blocking task into a bounded channel, so at
//! most about `workers` raw batches are in memory at once. Up to `workers`
//! batches are cleaned and folded concurrently on blocking worker tasks.
//! Results are consumed in input order and each batch's contribution is
//! merged only once it is complete. Cancellation is observed between
//! batches and discards everything built so far.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use immostat_types::error::{ImmoError, Result};
use immostat_types::record::TransactionRecord;

use crate::aggregate::SnapshotAggregates;
use crate::batch::RawBatch;
use crate::config::PipelineConfig;
use crate::derive::clean_rows;
use crate::source::RecordSource;
use crate::validate::RejectCounts;

/// Receives the detailed records of each batch, in input order.
pub trait RecordSink: Send {
    fn write_batch(&mut self, records: &[TransactionRecord]) -> Result<()>;
}

impl RecordSink for Vec<TransactionRecord> {
    fn write_batch(&mut self, records: &[TransactionRecord]) -> Result<()> {
        self.extend_from_slice(records);
        Ok(())
    }
}

/// Discards records; for aggregate-only builds.
pub struct NullSink;

impl RecordSink for NullSink {
    fn write_batch(&mut self, _records: &[TransactionRecord]) -> Result<()> {
        Ok(())
    }
}

/// Everything one raw batch contributes to a build.
#[derive(Debug, Clone)]
pub struct BatchContribution {
    pub seq: u64,
    pub rows_read: u64,
    pub records: Vec<TransactionRecord>,
    pub aggregates: SnapshotAggregates,
    pub rejects: RejectCounts,
}

pub fn process_batch(config: &PipelineConfig, batch: RawBatch) -> BatchContribution {
    let mut rejects = RejectCounts::default();
    let records = clean_rows(config, &batch.rows, &mut rejects);
    let aggregates = SnapshotAggregates::from_records(&records);
    BatchContribution {
        seq: batch.seq,
        rows_read: batch.rows.len() as u64,
        records,
        aggregates,
        rejects,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub batches: u64,
    pub rows_read: u64,
    pub rows_kept: u64,
    pub rejects: RejectCounts,
}

impl BuildReport {
    fn absorb(&mut self, contribution: &BatchContribution) {
        self.batches += 1;
        self.rows_read += contribution.rows_read;
        self.rows_kept += contribution.records.len() as u64;
        self.rejects.merge(&contribution.rejects);
    }
}

/// Result of a completed build. The sink is handed back so that the caller
/// can finish or commit it.
pub struct BuildOutput<S> {
    pub sink: S,
    pub aggregates: SnapshotAggregates,
    pub report: BuildReport,
}

fn join_error(e: tokio::task::JoinError) -> ImmoError {
    ImmoError::Io(std::io::Error::other(format!("worker task failed: {}", e)))
}

pub async fn run_build<S>(
    source: RecordSource,
    config: Arc<PipelineConfig>,
    mut sink: S,
    cancel: CancellationToken,
) -> Result<BuildOutput<S>>
where
    S: RecordSink + 'static,
{
    config.validate()?;
    let workers = config.workers;
    info!(workers, batch_size = config.batch_size, "starting build");

    let (tx, rx) = mpsc::channel::<Result<RawBatch>>(workers);
    let producer_cancel = cancel.clone();
    let producer = tokio::task::spawn_blocking(move || {
        for batch in source {
            if producer_cancel.is_cancelled() {
                break;
            }
            // receiver gone: the build stopped early
            if tx.blocking_send(batch).is_err() {
                break;
            }
        }
    });

    let batches = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
    let mut contributions = Box::pin(
        batches
            .map(|item| {
                let config = config.clone();
                async move {
                    let batch = item?;
                    tokio::task::spawn_blocking(move || process_batch(&config, batch))
                        .await
                        .map_err(join_error)
                }
            })
            .buffered(workers),
    );

    let mut aggregates = SnapshotAggregates::default();
    let mut report = BuildReport::default();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            next = contributions.next() => Some(next),
        };
        let Some(next) = next else {
            info!(batches = report.batches, "build cancelled");
            return Err(ImmoError::Cancelled);
        };
        let Some(contribution) = next else {
            break;
        };
        let contribution = contribution?;
        debug!(
            seq = contribution.seq,
            rows = contribution.rows_read,
            kept = contribution.records.len(),
            "batch complete"
        );
        report.absorb(&contribution);
        aggregates.merge_from(contribution.aggregates);

        let records = contribution.records;
        sink = tokio::task::spawn_blocking(move || sink.write_batch(&records).map(|_| sink))
            .await
            .map_err(join_error)??;
    }
    drop(contributions);
    producer.await.map_err(join_error)?;

    if cancel.is_cancelled() {
        return Err(ImmoError::Cancelled);
    }
    info!(
        batches = report.batches,
        rows_read = report.rows_read,
        rows_kept = report.rows_kept,
        rejected = report.rejects.total(),
        "build complete"
    );
    Ok(BuildOutput {
        sink,
        aggregates,
        report,
    })
}

/// Blocking wrapper around [`run_build`].
pub fn build_sync<S>(source: RecordSource, config: Arc<PipelineConfig>, sink: S) -> Result<BuildOutput<S>>
where
    S: RecordSink + 'static,
{
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_build(source, config, sink, CancellationToken::new()))
}
