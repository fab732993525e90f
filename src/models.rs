//! Data models exchanged with the archive backend.
//!
//! These types are what `/search` returns and what the search session
//! exposes to callers.

use serde::{Deserialize, Deserializer, Serialize};

/// One archived clip as returned by `/search`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub video_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filename: String,
    /// Upload timestamp rendered in IST by the server (`YYYY-MM-DD HH:MM:SS`).
    #[serde(default, deserialize_with = "null_as_default")]
    pub upload_date_ist: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub camera_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub plates_found: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub file_size: u64,
}

/// Treat an explicit JSON `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Archive-wide vs. filter-matching clip counts, surfaced as received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    pub total: u64,
    pub filtered: u64,
}

/// A successfully interpreted `/search` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    pub stats: SearchStats,
}
