//! One batch run: read both raw datasets, build the star schema, write it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use object_store::memory::InMemory;
use object_store::path::Path;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::EtlError;
use crate::export::{ExportOptions, TableReport, TableWriter};
use crate::ingest::{self, IngestOptions, Ingested, ParseStats, RawEvent, RawSong};
use crate::storage::{Location, StoreHandle};
use crate::tables::songplays::{self, CatalogIndex};
use crate::tables::{
    artists, select_plays, songs, time, users, ArtistRow, MonotonicIds, RowIdSource, SongRow,
    SongplayRow, TimeRow, UserRow,
};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub song_prefix: String,
    pub log_prefix: String,
    pub ingest: IngestOptions,
    pub export: ExportOptions,
    pub duration_tolerance: f64,
    /// Build every table but write nothing.
    pub dry_run: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            song_prefix: config.storage.song_prefix.clone(),
            log_prefix: config.storage.log_prefix.clone(),
            ingest: IngestOptions {
                extensions: config.storage.extensions.clone(),
                fetch_concurrency: config.pipeline.fetch_concurrency,
            },
            export: ExportOptions::new(&config.output, config.pipeline.write_mode),
            duration_tolerance: config.pipeline.duration_tolerance,
            dry_run: false,
        }
    }
}

/// The five tables of one run, each sorted by its key.
#[derive(Debug, Default)]
pub struct StarSchema {
    pub songs: Vec<SongRow>,
    pub artists: Vec<ArtistRow>,
    pub time: Vec<TimeRow>,
    pub users: Vec<UserRow>,
    pub songplays: Vec<SongplayRow>,
    /// Events dropped because they are not plays.
    pub filtered_events: usize,
    /// Play events missing `ts` or `userId`.
    pub malformed_plays: usize,
}

impl StarSchema {
    /// Derive all tables from the raw records. Pure; no I/O.
    pub fn build(
        raw_songs: &[RawSong],
        raw_events: Vec<RawEvent>,
        duration_tolerance: f64,
        ids: &dyn RowIdSource,
    ) -> Self {
        let songs = songs::extract(raw_songs);
        let artists = artists::extract(raw_songs);

        let selection = select_plays(raw_events);
        let time = time::extract(&selection.plays);
        let users = users::extract(&selection.plays);

        let catalog = CatalogIndex::new(&songs, &artists, duration_tolerance);
        let songplays = songplays::build(&selection.plays, &catalog, ids);

        Self {
            songs,
            artists,
            time,
            users,
            songplays,
            filtered_events: selection.filtered,
            malformed_plays: selection.malformed,
        }
    }

    pub fn unresolved_songplays(&self) -> usize {
        self.songplays.iter().filter(|r| r.song_id.is_none()).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub song_input: ParseStats,
    pub event_input: ParseStats,
    pub filtered_events: usize,
    pub malformed_plays: usize,
    pub songs: usize,
    pub artists: usize,
    pub time: usize,
    pub users: usize,
    pub songplays: usize,
    pub unresolved_songplays: usize,
    pub tables: Vec<TableReport>,
}

impl RunSummary {
    /// Every record skipped as malformed, across both datasets.
    pub fn skipped_records(&self) -> usize {
        self.song_input.malformed + self.event_input.malformed + self.malformed_plays
    }
}

pub struct Pipeline {
    input: StoreHandle,
    output: StoreHandle,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(input: StoreHandle, output: StoreHandle, options: PipelineOptions) -> Self {
        Self {
            input,
            output,
            options,
        }
    }

    /// Open the input and output locations named in the config.
    pub fn from_config(config: &Config, dry_run: bool) -> Result<Self> {
        let input_location = Location::parse(&config.storage.input)?;
        let output_location = Location::parse(&config.storage.output)?;

        let input = StoreHandle::open(&input_location, &config.aws, false)
            .with_context(|| format!("Failed to open input location {}", input_location))?;

        let output = match &output_location {
            Location::Memory if !dry_run => {
                return Err(EtlError::InvalidLocation {
                    location: config.storage.output.clone(),
                    reason: "memory:// output is discarded on exit; use it with --dry-run"
                        .to_string(),
                }
                .into());
            }
            // A dry run never touches the output, so a local root need not exist.
            Location::Local { .. } if dry_run => StoreHandle::new(
                Arc::new(InMemory::new()),
                Path::default(),
                output_location.to_string(),
            ),
            _ => StoreHandle::open(&output_location, &config.aws, true)
                .with_context(|| format!("Failed to open output location {}", output_location))?,
        };

        let mut options = PipelineOptions::from_config(config);
        options.dry_run = dry_run;

        Ok(Self::new(input, output, options))
    }

    pub fn output(&self) -> &StoreHandle {
        &self.output
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        info!(
            "Starting run: input {} -> output {}{}",
            self.input.label,
            self.output.label,
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        let raw_songs: Ingested<RawSong> = ingest::load(
            &self.input,
            &self.input.path(&self.options.song_prefix),
            &self.options.ingest,
        )
        .await
        .context("Failed to load song data")?;

        let raw_events: Ingested<RawEvent> = ingest::load(
            &self.input,
            &self.input.path(&self.options.log_prefix),
            &self.options.ingest,
        )
        .await
        .context("Failed to load log data")?;

        // Fail on an unreachable output before anything is written.
        if !self.options.dry_run {
            self.output
                .probe()
                .await
                .context("Output location is not accessible")?;
        }

        let ids = MonotonicIds::default();
        let schema = StarSchema::build(
            &raw_songs.records,
            raw_events.records,
            self.options.duration_tolerance,
            &ids,
        );

        if schema.malformed_plays > 0 {
            warn!(
                "Skipped {} play events missing ts or userId",
                schema.malformed_plays
            );
        }
        debug!(
            "Filtered {} non-play events; {} songplays without a catalog match",
            schema.filtered_events,
            schema.unresolved_songplays()
        );

        let tables = if self.options.dry_run {
            Vec::new()
        } else {
            self.write_all(&schema).await?
        };

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            dry_run: self.options.dry_run,
            song_input: raw_songs.stats,
            event_input: raw_events.stats,
            filtered_events: schema.filtered_events,
            malformed_plays: schema.malformed_plays,
            songs: schema.songs.len(),
            artists: schema.artists.len(),
            time: schema.time.len(),
            users: schema.users.len(),
            songplays: schema.songplays.len(),
            unresolved_songplays: schema.unresolved_songplays(),
            tables,
        };

        info!(
            "Run finished: {} songs, {} artists, {} time, {} users, {} songplays ({} unresolved), {} records skipped",
            summary.songs,
            summary.artists,
            summary.time,
            summary.users,
            summary.songplays,
            summary.unresolved_songplays,
            summary.skipped_records()
        );

        Ok(summary)
    }

    async fn write_all(&self, schema: &StarSchema) -> Result<Vec<TableReport>> {
        let writer = TableWriter::new(&self.output, self.options.export);

        // No cross-table atomicity: a failure here leaves earlier tables in
        // place, and the failed table without its _SUCCESS marker.
        Ok(vec![
            writer.write(&schema.songs).await.context("Failed to write songs")?,
            writer
                .write(&schema.artists)
                .await
                .context("Failed to write artists")?,
            writer.write(&schema.users).await.context("Failed to write users")?,
            writer.write(&schema.time).await.context("Failed to write time")?,
            writer
                .write(&schema.songplays)
                .await
                .context("Failed to write songplays")?,
        ])
    }
}
