use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::Datelike;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use super::time::{start_time_column, start_time_type};
use super::{i64_column, string_column, ArtistRow, PlayEvent, SongRow, StarTable};

/// Hands out `songplay_id`s.
pub trait RowIdSource: Send + Sync {
    /// Strictly greater than every id returned before.
    fn next_id(&self) -> i64;
}

/// Process-wide counter starting at a fixed value.
#[derive(Debug, Default)]
pub struct MonotonicIds {
    next: AtomicI64,
}

impl MonotonicIds {
    pub fn starting_at(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }
}

impl RowIdSource for MonotonicIds {
    fn next_id(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongplayRow {
    pub songplay_id: i64,
    /// Epoch milliseconds.
    pub start_time: i64,
    pub user_id: String,
    pub level: Option<String>,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: Option<i64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
    pub year: i32,
    pub month: i32,
}

#[derive(Debug, Clone)]
struct Candidate<'a> {
    song_id: &'a str,
    artist_id: &'a str,
    duration: Option<f64>,
}

/// Songs joined to their artists, keyed by title then artist name.
pub struct CatalogIndex<'a> {
    by_title: HashMap<&'a str, HashMap<&'a str, Vec<Candidate<'a>>>>,
    tolerance: f64,
}

impl<'a> CatalogIndex<'a> {
    pub fn new(songs: &'a [SongRow], artists: &'a [ArtistRow], tolerance: f64) -> Self {
        let names: HashMap<&'a str, &'a str> = artists
            .iter()
            .filter_map(|a| Some((a.artist_id.as_str(), a.name.as_deref()?)))
            .collect();

        let mut by_title: HashMap<&'a str, HashMap<&'a str, Vec<Candidate<'a>>>> = HashMap::new();
        for song in songs {
            let (Some(title), Some(&name)) =
                (song.title.as_deref(), names.get(song.artist_id.as_str()))
            else {
                continue;
            };
            by_title
                .entry(title)
                .or_default()
                .entry(name)
                .or_default()
                .push(Candidate {
                    song_id: &song.song_id,
                    artist_id: &song.artist_id,
                    duration: song.duration,
                });
        }
        for candidates in by_title.values_mut().flat_map(|by_artist| by_artist.values_mut()) {
            candidates.sort_by(|a, b| a.song_id.cmp(b.song_id));
        }

        Self { by_title, tolerance }
    }

    /// `(song_id, artist_id)` of the catalog entry an event refers to.
    ///
    /// Title and artist name must match exactly. When the event carries a
    /// `length`, the song's duration must be within the tolerance of it.
    /// Several hits resolve to the smallest `song_id`.
    pub fn resolve(
        &self,
        song: &str,
        artist: &str,
        length: Option<f64>,
    ) -> Option<(&'a str, &'a str)> {
        self.by_title
            .get(song)?
            .get(artist)?
            .iter()
            .find(|c| match (length, c.duration) {
                (None, _) => true,
                (Some(length), Some(duration)) => (length - duration).abs() <= self.tolerance,
                (Some(_), None) => false,
            })
            .map(|c| (c.song_id, c.artist_id))
    }
}

/// Build the fact table: one row per play, in play order, ids from `ids`.
pub fn build(
    plays: &[PlayEvent],
    catalog: &CatalogIndex<'_>,
    ids: &dyn RowIdSource,
) -> Vec<SongplayRow> {
    plays
        .iter()
        .map(|play| {
            let event = &play.event;
            let resolved = match (event.song.as_deref(), event.artist.as_deref()) {
                (Some(song), Some(artist)) => catalog.resolve(song, artist, event.length),
                _ => None,
            };

            SongplayRow {
                songplay_id: ids.next_id(),
                start_time: play.ts,
                user_id: play.user_id.clone(),
                level: event.level.clone(),
                song_id: resolved.map(|(song_id, _)| song_id.to_string()),
                artist_id: resolved.map(|(_, artist_id)| artist_id.to_string()),
                session_id: event.session_id,
                location: event.location.clone(),
                user_agent: event.user_agent.clone(),
                year: play.start_time.year(),
                month: play.start_time.month() as i32,
            }
        })
        .collect()
}

impl StarTable for SongplayRow {
    const NAME: &'static str = "songplays";
    const PARTITION_BY: &'static [&'static str] = &["year", "month"];

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("songplay_id", DataType::Int64, false),
            Field::new("start_time", start_time_type(), false),
            Field::new("user_id", DataType::Utf8, false),
            Field::new("level", DataType::Utf8, true),
            Field::new("song_id", DataType::Utf8, true),
            Field::new("artist_id", DataType::Utf8, true),
            Field::new("session_id", DataType::Int64, true),
            Field::new("location", DataType::Utf8, true),
            Field::new("user_agent", DataType::Utf8, true),
        ]))
    }

    fn partition_values(&self) -> Vec<Option<String>> {
        vec![Some(self.year.to_string()), Some(self.month.to_string())]
    }

    fn to_record_batch(rows: &[&Self]) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(
            Self::schema(),
            vec![
                i64_column(rows, |r| Some(r.songplay_id)),
                start_time_column(rows, |r| r.start_time),
                string_column(rows, |r| Some(r.user_id.as_str())),
                string_column(rows, |r| r.level.as_deref()),
                string_column(rows, |r| r.song_id.as_deref()),
                string_column(rows, |r| r.artist_id.as_deref()),
                i64_column(rows, |r| r.session_id),
                string_column(rows, |r| r.location.as_deref()),
                string_column(rows, |r| r.user_agent.as_deref()),
            ],
        )
    }
}
