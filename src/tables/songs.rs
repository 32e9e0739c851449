use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{cmp_f64, f64_column, populated, string_column, StarTable};
use crate::ingest::records::{non_empty, RawSong};

#[derive(Debug, Clone, PartialEq)]
pub struct SongRow {
    pub song_id: String,
    pub title: Option<String>,
    pub artist_id: String,
    pub year: Option<i32>,
    pub duration: Option<f64>,
}

impl SongRow {
    pub fn from_raw(raw: &RawSong) -> Option<Self> {
        Some(Self {
            song_id: non_empty(&raw.song_id)?.to_string(),
            title: raw.title.clone(),
            artist_id: non_empty(&raw.artist_id)?.to_string(),
            year: raw.year,
            duration: raw.duration,
        })
    }

    fn completeness(&self) -> usize {
        populated(&[
            self.title.is_some(),
            self.year.is_some(),
            self.duration.is_some(),
        ])
    }

    fn content_cmp(&self, other: &Self) -> Ordering {
        self.artist_id
            .cmp(&other.artist_id)
            .then_with(|| self.title.cmp(&other.title))
            .then_with(|| self.year.cmp(&other.year))
            .then_with(|| cmp_f64(self.duration, other.duration))
    }

    /// Whether `self` should replace `other` as the row for a shared
    /// `song_id`: the more complete row wins, then the smaller content.
    fn preferred_over(&self, other: &Self) -> bool {
        match self.completeness().cmp(&other.completeness()) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.content_cmp(other) == Ordering::Less,
        }
    }
}

/// Project raw song records into `songs` rows, one per `song_id`, sorted
/// by `song_id`.
pub fn extract(raw: &[RawSong]) -> Vec<SongRow> {
    let mut by_id: BTreeMap<String, SongRow> = BTreeMap::new();

    for row in raw.iter().filter_map(SongRow::from_raw) {
        match by_id.get(&row.song_id) {
            Some(existing) if !row.preferred_over(existing) => {}
            _ => {
                by_id.insert(row.song_id.clone(), row);
            }
        }
    }

    by_id.into_values().collect()
}

impl StarTable for SongRow {
    const NAME: &'static str = "songs";
    const PARTITION_BY: &'static [&'static str] = &["year", "artist_id"];

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("song_id", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, true),
            Field::new("duration", DataType::Float64, true),
        ]))
    }

    fn partition_values(&self) -> Vec<Option<String>> {
        vec![
            self.year.map(|y| y.to_string()),
            Some(self.artist_id.clone()),
        ]
    }

    fn to_record_batch(rows: &[&Self]) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(
            Self::schema(),
            vec![
                string_column(rows, |r| Some(r.song_id.as_str())),
                string_column(rows, |r| r.title.as_deref()),
                f64_column(rows, |r| r.duration),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(song_id: &str, artist_id: &str, title: Option<&str>, year: Option<i32>) -> RawSong {
        RawSong {
            song_id: Some(song_id.to_string()),
            title: title.map(str::to_string),
            artist_id: Some(artist_id.to_string()),
            artist_name: None,
            artist_location: None,
            artist_latitude: None,
            artist_longitude: None,
            year,
            duration: Some(200.5),
            num_songs: Some(1),
        }
    }

    #[test]
    fn test_extract_projects_and_sorts() {
        let rows = extract(&[
            raw("S2", "A1", Some("Second"), Some(1999)),
            raw("S1", "A1", Some("Test"), Some(2000)),
        ]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].song_id, "S1");
        assert_eq!(rows[0].title.as_deref(), Some("Test"));
        assert_eq!(rows[0].year, Some(2000));
        assert_eq!(rows[0].duration, Some(200.5));
        assert_eq!(rows[1].song_id, "S2");
    }

    #[test]
    fn test_duplicate_song_resolution_ignores_input_order() {
        let sparse = raw("S1", "A1", None, Some(2000));
        let full_b = raw("S1", "A1", Some("B"), Some(2000));
        let full_a = raw("S1", "A1", Some("A"), Some(2000));

        let forward = extract(&[sparse.clone(), full_b.clone(), full_a.clone()]);
        let backward = extract(&[full_a, full_b, sparse]);

        assert_eq!(forward, backward);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].title.as_deref(), Some("A"));
    }

    #[test]
    fn test_partition_values() {
        let row = SongRow::from_raw(&raw("S1", "A1", Some("Test"), None)).unwrap();
        assert_eq!(row.partition_values(), vec![None, Some("A1".to_string())]);
    }

    #[test]
    fn test_record_batch_leaves_out_partition_columns() {
        let rows = extract(&[raw("S1", "A1", Some("Test"), Some(2000))]);
        let refs: Vec<&SongRow> = rows.iter().collect();
        let batch = SongRow::to_record_batch(&refs).unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.num_columns(), 3);
        assert!(batch.schema().field_with_name("year").is_err());
    }
}
