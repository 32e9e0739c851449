//! The star schema: one fact table (`songplays`) and four dimensions
//! (`songs`, `artists`, `time`, `users`).
//!
//! Each table module owns its row type, the rule deriving rows from raw
//! records, and the Arrow layout its Parquet files use.

pub mod artists;
pub mod plays;
pub mod songplays;
pub mod songs;
pub mod time;
pub mod users;

use arrow::array::{ArrayRef, Float64Array, Int32Array, Int64Array, StringArray};
use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use std::cmp::Ordering;
use std::sync::Arc;

pub use artists::ArtistRow;
pub use plays::{select_plays, PlayEvent, PlaySelection};
pub use songplays::{MonotonicIds, RowIdSource, SongplayRow};
pub use songs::SongRow;
pub use time::TimeRow;
pub use users::UserRow;

/// A table of the star schema as it is laid out in storage.
pub trait StarTable: Sized {
    /// Table name; the output directory is `<name>.parquet`.
    const NAME: &'static str;

    /// Hive partition columns, outermost first. They are encoded in the
    /// object path and left out of the Parquet files.
    const PARTITION_BY: &'static [&'static str] = &[];

    /// Arrow schema of the columns stored inside each file.
    fn schema() -> SchemaRef;

    /// Values of [`Self::PARTITION_BY`] for this row, `None` for null.
    fn partition_values(&self) -> Vec<Option<String>> {
        Vec::new()
    }

    fn to_record_batch(rows: &[&Self]) -> Result<RecordBatch, ArrowError>;

    fn dir_name() -> String {
        format!("{}.parquet", Self::NAME)
    }
}

pub(crate) fn string_column<'a, R: 'a>(
    rows: &[&'a R],
    get: impl Fn(&'a R) -> Option<&'a str>,
) -> ArrayRef {
    Arc::new(rows.iter().map(|r| get(*r)).collect::<StringArray>())
}

pub(crate) fn f64_column<R>(rows: &[&R], get: impl Fn(&R) -> Option<f64>) -> ArrayRef {
    Arc::new(rows.iter().map(|r| get(*r)).collect::<Float64Array>())
}

pub(crate) fn i32_column<R>(rows: &[&R], get: impl Fn(&R) -> Option<i32>) -> ArrayRef {
    Arc::new(rows.iter().map(|r| get(*r)).collect::<Int32Array>())
}

pub(crate) fn i64_column<R>(rows: &[&R], get: impl Fn(&R) -> Option<i64>) -> ArrayRef {
    Arc::new(rows.iter().map(|r| get(*r)).collect::<Int64Array>())
}

/// Total order over optional floats: `None` first, then `f64::total_cmp`.
pub(crate) fn cmp_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

/// Number of populated values among a row's optional attributes.
pub(crate) fn populated(flags: &[bool]) -> usize {
    flags.iter().filter(|f| **f).count()
}
