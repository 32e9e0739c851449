//! Play events: the `NextSong` events every event-derived table starts from.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use super::cmp_f64;
use crate::ingest::records::RawEvent;

/// A well-formed `NextSong` event with its required fields resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayEvent {
    pub ts: i64,
    pub start_time: DateTime<Utc>,
    pub user_id: String,
    pub event: RawEvent,
}

impl PlayEvent {
    /// `None` when the event lacks `ts` or `userId`, or `ts` is out of range.
    pub fn from_raw(event: RawEvent) -> Option<Self> {
        let ts = event.ts?;
        let start_time = DateTime::<Utc>::from_timestamp_millis(ts)?;
        let user_id = event.user_id.clone()?;
        Some(Self {
            ts,
            start_time,
            user_id,
            event,
        })
    }

    /// Total order on event content, independent of where the event was read.
    pub fn content_cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (&self.event, &other.event);
        self.ts
            .cmp(&other.ts)
            .then_with(|| self.user_id.cmp(&other.user_id))
            .then_with(|| a.session_id.cmp(&b.session_id))
            .then_with(|| a.item_in_session.cmp(&b.item_in_session))
            .then_with(|| a.song.cmp(&b.song))
            .then_with(|| a.artist.cmp(&b.artist))
            .then_with(|| cmp_f64(a.length, b.length))
            .then_with(|| a.level.cmp(&b.level))
            .then_with(|| a.location.cmp(&b.location))
            .then_with(|| a.user_agent.cmp(&b.user_agent))
            .then_with(|| a.first_name.cmp(&b.first_name))
            .then_with(|| a.last_name.cmp(&b.last_name))
            .then_with(|| a.gender.cmp(&b.gender))
    }
}

#[derive(Debug, Default)]
pub struct PlaySelection {
    /// Sorted by [`PlayEvent::content_cmp`].
    pub plays: Vec<PlayEvent>,
    /// Events on any page other than `NextSong`.
    pub filtered: usize,
    /// `NextSong` events that could not be used.
    pub malformed: usize,
}

/// Keep `NextSong` events, resolve their required fields and sort them.
pub fn select_plays(events: Vec<RawEvent>) -> PlaySelection {
    let mut selection = PlaySelection::default();

    for event in events {
        if !event.is_song_play() {
            selection.filtered += 1;
            continue;
        }
        match PlayEvent::from_raw(event) {
            Some(play) => selection.plays.push(play),
            None => selection.malformed += 1,
        }
    }

    selection.plays.sort_by(|a, b| a.content_cmp(b));
    selection
}
