//! Raw record shapes as they appear in the song and event JSON files.

use serde::{Deserialize, Serialize};

/// Page value marking an event as an actual song play.
pub const NEXT_SONG_PAGE: &str = "NextSong";

/// One song-metadata object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSong {
    #[serde(default)]
    pub song_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist_id: Option<String>,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub artist_location: Option<String>,
    #[serde(default)]
    pub artist_latitude: Option<f64>,
    #[serde(default)]
    pub artist_longitude: Option<f64>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub num_songs: Option<i64>,
}

impl RawSong {
    /// A song record is usable only when it names both its song and artist.
    pub fn is_well_formed(&self) -> bool {
        non_empty(&self.song_id).is_some() && non_empty(&self.artist_id).is_some()
    }
}

/// One user-app event from the activity logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub item_in_session: Option<i64>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub length: Option<f64>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub registration: Option<f64>,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub session_id: Option<i64>,
    #[serde(default)]
    pub song: Option<String>,
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub ts: Option<i64>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default, deserialize_with = "lenient::identifier")]
    pub user_id: Option<String>,
}

impl RawEvent {
    pub fn is_song_play(&self) -> bool {
        self.page.as_deref() == Some(NEXT_SONG_PAGE)
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Deserializers for fields the logs emit as either JSON numbers or strings.
mod lenient {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Int(i64),
        Float(f64),
        Text(String),
    }

    pub fn integer<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Scalar>::deserialize(deserializer)?;
        Ok(match value {
            Some(Scalar::Int(v)) => Some(v),
            Some(Scalar::Float(v)) if v.is_finite() && v.fract() == 0.0 => Some(v as i64),
            Some(Scalar::Float(_)) => None,
            Some(Scalar::Text(s)) => s.trim().parse().ok(),
            None => None,
        })
    }

    pub fn identifier<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Scalar>::deserialize(deserializer)?;
        Ok(match value {
            Some(Scalar::Int(v)) => Some(v.to_string()),
            Some(Scalar::Float(v)) if v.is_finite() && v.fract() == 0.0 => {
                Some((v as i64).to_string())
            }
            Some(Scalar::Float(v)) => Some(v.to_string()),
            Some(Scalar::Text(s)) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            None => None,
        })
    }
}
