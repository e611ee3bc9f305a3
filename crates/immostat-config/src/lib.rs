//! Process-wide tunables for the immostat runtime.
//!
//! Values are initialized from environment variables on first access and
//! can be overridden at runtime via setter functions.
//!
//! - `IMMOSTAT_BATCH_SIZE`: rows per batch pulled from the record source.
//!   Accepts `K`/`M` suffixes (powers of 1000). Default: 100K.
//!
//! - `IMMOSTAT_WORKERS`: number of batches processed concurrently during a
//!   build. Default: available parallelism.
//!
//! - `IMMOSTAT_QUERY_CACHE_CAPACITY`: maximum number of cached query
//!   responses per snapshot. `0` disables caching. Default: 64.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const DEFAULT_BATCH_SIZE: usize = 100_000;
const DEFAULT_QUERY_CACHE_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Atomic globals
// ---------------------------------------------------------------------------

static BATCH_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_BATCH_SIZE);
// 0 means "not set": resolved to available parallelism on read.
static WORKERS: AtomicUsize = AtomicUsize::new(0);
static QUERY_CACHE_CAPACITY: AtomicUsize = AtomicUsize::new(DEFAULT_QUERY_CACHE_CAPACITY);

static INIT: Once = Once::new();

/// Ensure environment variable overrides are applied (idempotent).
fn ensure_init() {
    INIT.call_once(|| {
        if let Ok(val) = std::env::var("IMMOSTAT_BATCH_SIZE") {
            if let Ok(n) = parse_count(&val) {
                if n > 0 {
                    BATCH_SIZE.store(n, Ordering::Relaxed);
                }
            }
        }
        if let Ok(val) = std::env::var("IMMOSTAT_WORKERS") {
            if let Ok(n) = parse_count(&val) {
                WORKERS.store(n, Ordering::Relaxed);
            }
        }
        if let Ok(val) = std::env::var("IMMOSTAT_QUERY_CACHE_CAPACITY") {
            if let Ok(n) = parse_count(&val) {
                QUERY_CACHE_CAPACITY.store(n, Ordering::Relaxed);
            }
        }
    });
}

/// Parse a row count. Supports plain integers and `K`/`M` suffixes
/// (case-insensitive, powers of 1000).
fn parse_count(s: &str) -> Result<usize, ()> {
    let s = s.trim();
    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('M').or_else(|| s.strip_suffix('m')) {
        (n.trim(), 1_000_000)
    } else if let Some(n) = s.strip_suffix('K').or_else(|| s.strip_suffix('k')) {
        (n.trim(), 1_000)
    } else {
        (s, 1)
    };
    let n = num_str.parse::<usize>().map_err(|_| ())?;
    n.checked_mul(multiplier).ok_or(())
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Get the number of rows per source batch.
pub fn get_batch_size() -> usize {
    ensure_init();
    BATCH_SIZE.load(Ordering::Relaxed)
}

/// Set the number of rows per source batch. Zero is ignored.
pub fn set_batch_size(rows: usize) {
    ensure_init();
    if rows > 0 {
        BATCH_SIZE.store(rows, Ordering::Relaxed);
    }
}

/// Get the number of batches processed concurrently (always at least 1).
pub fn get_workers() -> usize {
    ensure_init();
    match WORKERS.load(Ordering::Relaxed) {
        0 => default_workers(),
        n => n,
    }
}

/// Set the number of concurrent batch workers. `0` restores the default.
pub fn set_workers(n: usize) {
    ensure_init();
    WORKERS.store(n, Ordering::Relaxed);
}

/// Get the maximum number of cached query responses per snapshot.
pub fn get_query_cache_capacity() -> usize {
    ensure_init();
    QUERY_CACHE_CAPACITY.load(Ordering::Relaxed)
}

/// Set the maximum number of cached query responses per snapshot.
pub fn set_query_cache_capacity(entries: usize) {
    ensure_init();
    QUERY_CACHE_CAPACITY.store(entries, Ordering::Relaxed);
}
