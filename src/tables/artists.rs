use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{cmp_f64, f64_column, populated, string_column, StarTable};
use crate::ingest::records::{non_empty, RawSong};

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistRow {
    pub artist_id: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ArtistRow {
    pub fn from_raw(raw: &RawSong) -> Option<Self> {
        Some(Self {
            artist_id: non_empty(&raw.artist_id)?.to_string(),
            name: raw.artist_name.clone(),
            // The song files use "" for an unknown location.
            location: non_empty(&raw.artist_location).map(str::to_string),
            latitude: raw.artist_latitude,
            longitude: raw.artist_longitude,
        })
    }

    fn completeness(&self) -> usize {
        populated(&[
            self.name.is_some(),
            self.location.is_some(),
            self.latitude.is_some(),
            self.longitude.is_some(),
        ])
    }

    fn content_cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.location.cmp(&other.location))
            .then_with(|| cmp_f64(self.latitude, other.latitude))
            .then_with(|| cmp_f64(self.longitude, other.longitude))
    }

    fn preferred_over(&self, other: &Self) -> bool {
        match self.completeness().cmp(&other.completeness()) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.content_cmp(other) == Ordering::Less,
        }
    }
}

/// One `artists` row per `artist_id`, sorted by id. An artist appears in
/// every song file of theirs; the most complete description wins.
pub fn extract(raw: &[RawSong]) -> Vec<ArtistRow> {
    let mut by_id: BTreeMap<String, ArtistRow> = BTreeMap::new();

    for row in raw.iter().filter_map(ArtistRow::from_raw) {
        match by_id.get(&row.artist_id) {
            Some(existing) if !row.preferred_over(existing) => {}
            _ => {
                by_id.insert(row.artist_id.clone(), row);
            }
        }
    }

    by_id.into_values().collect()
}

impl StarTable for ArtistRow {
    const NAME: &'static str = "artists";

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("artist_id", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("location", DataType::Utf8, true),
            Field::new("latitude", DataType::Float64, true),
            Field::new("longitude", DataType::Float64, true),
        ]))
    }

    fn to_record_batch(rows: &[&Self]) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(
            Self::schema(),
            vec![
                string_column(rows, |r| Some(r.artist_id.as_str())),
                string_column(rows, |r| r.name.as_deref()),
                string_column(rows, |r| r.location.as_deref()),
                f64_column(rows, |r| r.latitude),
                f64_column(rows, |r| r.longitude),
            ],
        )
    }
}
