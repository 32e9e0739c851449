use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{string_column, PlayEvent, StarTable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub user_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: Option<String>,
}

struct Latest<'a> {
    ts: i64,
    play: &'a PlayEvent,
}

impl Latest<'_> {
    fn tie_key(&self) -> (&Option<String>, &Option<String>, &Option<String>, &Option<String>) {
        let e = &self.play.event;
        (&e.level, &e.first_name, &e.last_name, &e.gender)
    }

    /// Later plays win; equal timestamps fall back to the greater attributes.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.ts
            .cmp(&other.ts)
            .then_with(|| self.tie_key().cmp(&other.tie_key()))
    }
}

/// One `users` row per `user_id`, taken from the user's latest play, sorted
/// by `user_id`. A user who upgraded from `free` to `paid` shows `paid`.
pub fn extract(plays: &[PlayEvent]) -> Vec<UserRow> {
    let mut latest: BTreeMap<&str, Latest<'_>> = BTreeMap::new();

    for play in plays {
        let candidate = Latest { ts: play.ts, play };
        match latest.get(play.user_id.as_str()) {
            Some(current) if candidate.rank_cmp(current) != Ordering::Greater => {}
            _ => {
                latest.insert(play.user_id.as_str(), candidate);
            }
        }
    }

    latest
        .into_iter()
        .map(|(user_id, Latest { play, .. })| UserRow {
            user_id: user_id.to_string(),
            first_name: play.event.first_name.clone(),
            last_name: play.event.last_name.clone(),
            gender: play.event.gender.clone(),
            level: play.event.level.clone(),
        })
        .collect()
}

impl StarTable for UserRow {
    const NAME: &'static str = "users";

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("user_id", DataType::Utf8, false),
            Field::new("first_name", DataType::Utf8, true),
            Field::new("last_name", DataType::Utf8, true),
            Field::new("gender", DataType::Utf8, true),
            Field::new("level", DataType::Utf8, true),
        ]))
    }

    fn to_record_batch(rows: &[&Self]) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(
            Self::schema(),
            vec![
                string_column(rows, |r| Some(r.user_id.as_str())),
                string_column(rows, |r| r.first_name.as_deref()),
                string_column(rows, |r| r.last_name.as_deref()),
                string_column(rows, |r| r.gender.as_deref()),
                string_column(rows, |r| r.level.as_deref()),
            ],
        )
    }
}
