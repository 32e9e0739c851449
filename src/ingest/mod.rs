//! Reading the raw song and event datasets from object storage.

pub mod discovery;
pub mod parse;
pub mod records;

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::path::Path;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::EtlError;
use crate::storage::StoreHandle;

pub use discovery::discover_objects;
pub use parse::decode_json;
pub use records::{RawEvent, RawSong, NEXT_SONG_PAGE};

/// Files fetched per unit of `fetch_concurrency` before a batch is decoded.
const FILES_PER_FETCH_SLOT: usize = 8;

/// A record family that can be loaded from a tree of JSON files.
pub trait RawRecord: DeserializeOwned + Send + 'static {
    /// Human-readable name used in log lines.
    const KIND: &'static str;

    /// Records failing this check are dropped and counted as malformed.
    fn is_well_formed(&self) -> bool {
        true
    }
}

impl RawRecord for RawSong {
    const KIND: &'static str = "song";

    fn is_well_formed(&self) -> bool {
        RawSong::is_well_formed(self)
    }
}

impl RawRecord for RawEvent {
    const KIND: &'static str = "event";
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    pub files: usize,
    pub records: usize,
    pub malformed: usize,
}

impl ParseStats {
    fn merge(&mut self, other: ParseStats) {
        self.files += other.files;
        self.records += other.records;
        self.malformed += other.malformed;
    }
}

#[derive(Debug)]
pub struct Ingested<T> {
    pub records: Vec<T>,
    pub stats: ParseStats,
}

/// Options shared by both dataset loads.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub extensions: Vec<String>,
    pub fetch_concurrency: usize,
}

/// Discover, fetch and decode every record of one family under `prefix`.
///
/// Listing or fetch failures are fatal. Undecodable fragments and records
/// failing [`RawRecord::is_well_formed`] are skipped and counted.
pub async fn load<T: RawRecord>(
    handle: &StoreHandle,
    prefix: &Path,
    options: &IngestOptions,
) -> Result<Ingested<T>> {
    let objects = discover_objects(handle, prefix, &options.extensions).await?;
    info!(
        "Found {} {} files under {}/{}",
        objects.len(),
        T::KIND,
        handle.label,
        prefix
    );

    let locations: Vec<Path> = objects.into_iter().map(|m| m.location).collect();
    let batch_size = options.fetch_concurrency.max(1) * FILES_PER_FETCH_SLOT;

    // Raw bytes of at most one batch are held at a time.
    let mut ingested = Ingested {
        records: Vec::new(),
        stats: ParseStats::default(),
    };
    for batch in locations.chunks(batch_size) {
        let files = fetch_all(handle, batch.iter().cloned(), options).await?;
        let decoded = tokio::task::spawn_blocking(move || decode_files::<T>(&files))
            .await
            .context("decode task panicked")?;
        ingested.stats.merge(decoded.stats);
        ingested.records.extend(decoded.records);
    }

    if ingested.stats.malformed > 0 {
        warn!(
            "Skipped {} malformed {} records",
            ingested.stats.malformed,
            T::KIND
        );
    }
    debug!("Decoded {:?} for {} records", ingested.stats, T::KIND);

    Ok(ingested)
}

async fn fetch_all(
    handle: &StoreHandle,
    locations: impl Iterator<Item = Path>,
    options: &IngestOptions,
) -> Result<Vec<(Path, Bytes)>, EtlError> {
    futures::stream::iter(locations)
        .map(|location| {
            let store = handle.store.clone();
            async move {
                let result = store
                    .get(&location)
                    .await
                    .map_err(|e| EtlError::storage("get", &location, e))?;
                let bytes = result
                    .bytes()
                    .await
                    .map_err(|e| EtlError::storage("read", &location, e))?;
                Ok::<_, EtlError>((location, bytes))
            }
        })
        .buffered(options.fetch_concurrency.max(1))
        .try_collect()
        .await
}

/// Decode files in parallel; output order follows input file order.
pub fn decode_files<T: RawRecord>(files: &[(Path, Bytes)]) -> Ingested<T> {
    let per_file: Vec<Ingested<T>> = files
        .par_iter()
        .map(|(location, bytes)| {
            let file = decode_file::<T>(bytes);
            if file.stats.malformed > 0 {
                debug!("{} malformed records in {}", file.stats.malformed, location);
            }
            file
        })
        .collect();

    let mut stats = ParseStats::default();
    let mut records = Vec::new();
    for file in per_file {
        stats.merge(file.stats);
        records.extend(file.records);
    }

    Ingested { records, stats }
}

fn decode_file<T: RawRecord>(bytes: &[u8]) -> Ingested<T> {
    let decoded = decode_json(bytes);
    let mut stats = ParseStats {
        files: 1,
        records: 0,
        malformed: decoded.malformed,
    };

    let mut records = Vec::with_capacity(decoded.values.len());
    for value in decoded.values {
        match serde_json::from_value::<T>(value) {
            Ok(record) if record.is_well_formed() => records.push(record),
            _ => stats.malformed += 1,
        }
    }
    stats.records = records.len();

    Ingested { records, stats }
}
