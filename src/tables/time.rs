use arrow::array::{ArrayRef, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{i32_column, PlayEvent, StarTable};

/// Calendar breakdown of one play timestamp, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRow {
    /// Epoch milliseconds.
    pub start_time: i64,
    pub hour: i32,
    pub day: i32,
    /// ISO-8601 week number.
    pub week: i32,
    pub month: i32,
    pub year: i32,
    /// Monday = 0 through Sunday = 6.
    pub weekday: i32,
}

impl TimeRow {
    pub fn from_instant(start_time: i64, instant: DateTime<Utc>) -> Self {
        Self {
            start_time,
            hour: instant.hour() as i32,
            day: instant.day() as i32,
            week: instant.iso_week().week() as i32,
            month: instant.month() as i32,
            year: instant.year(),
            weekday: instant.weekday().num_days_from_monday() as i32,
        }
    }

    pub fn from_millis(ts: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_millis(ts).map(|instant| Self::from_instant(ts, instant))
    }
}

/// One `time` row per distinct play timestamp, sorted by `start_time`.
pub fn extract(plays: &[PlayEvent]) -> Vec<TimeRow> {
    let mut by_ts: BTreeMap<i64, TimeRow> = BTreeMap::new();
    for play in plays {
        by_ts
            .entry(play.ts)
            .or_insert_with(|| TimeRow::from_instant(play.ts, play.start_time));
    }
    by_ts.into_values().collect()
}

pub(crate) fn start_time_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()))
}

pub(crate) fn start_time_column<R>(rows: &[&R], get: impl Fn(&R) -> i64) -> ArrayRef {
    Arc::new(
        TimestampMillisecondArray::from(rows.iter().map(|r| get(*r)).collect::<Vec<_>>())
            .with_timezone("UTC"),
    )
}

impl StarTable for TimeRow {
    const NAME: &'static str = "time";
    const PARTITION_BY: &'static [&'static str] = &["year", "month"];

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("start_time", start_time_type(), false),
            Field::new("hour", DataType::Int32, false),
            Field::new("day", DataType::Int32, false),
            Field::new("week", DataType::Int32, false),
            Field::new("weekday", DataType::Int32, false),
        ]))
    }

    fn partition_values(&self) -> Vec<Option<String>> {
        vec![Some(self.year.to_string()), Some(self.month.to_string())]
    }

    fn to_record_batch(rows: &[&Self]) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(
            Self::schema(),
            vec![
                start_time_column(rows, |r| r.start_time),
                i32_column(rows, |r| Some(r.hour)),
                i32_column(rows, |r| Some(r.day)),
                i32_column(rows, |r| Some(r.week)),
                i32_column(rows, |r| Some(r.weekday)),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::plays::tests::event;
    use crate::tables::select_plays;

    #[test]
    fn test_calendar_fields_in_utc() {
        // 2018-11-02T01:25:34.796Z, a Friday in ISO week 44
        let row = TimeRow::from_millis(1541121934796).unwrap();
        assert_eq!(
            row,
            TimeRow {
                start_time: 1541121934796,
                hour: 1,
                day: 2,
                week: 44,
                month: 11,
                year: 2018,
                weekday: 4,
            }
        );
    }

    #[test]
    fn test_iso_week_at_year_boundary() {
        // 2018-12-31 is Monday of ISO week 1 of 2019
        let row = TimeRow::from_millis(1546214400000).unwrap();
        assert_eq!((row.year, row.month, row.day), (2018, 12, 31));
        assert_eq!(row.week, 1);
        assert_eq!(row.weekday, 0);
    }

    #[test]
    fn test_extract_dedups_timestamps() {
        let plays = select_plays(vec![
            event(1541121934796, "10", "NextSong"),
            event(1541121934796, "11", "NextSong"),
            event(1541106106796, "10", "NextSong"),
        ])
        .plays;

        let rows = extract(&plays);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].start_time < rows[1].start_time);
    }

    #[test]
    fn test_record_batch_has_no_nulls() {
        let rows = [TimeRow::from_millis(1541121934796).unwrap()];
        let refs: Vec<&TimeRow> = rows.iter().collect();
        let batch = TimeRow::to_record_batch(&refs).unwrap();
        assert_eq!(batch.num_columns(), 5);
        for column in batch.columns() {
            assert_eq!(column.null_count(), 0);
        }
    }
}
