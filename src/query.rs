//! Search filter (the query model).
//!
//! A [`Filter`] holds the five user-editable criteria. Values are kept
//! verbatim; format checking (`YYYY-MM-DD`, `HH:MM:SS`) is left to the
//! server, which answers malformed input with a 400 and a message.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One filter criterion, in canonical serialization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    Date,
    StartTime,
    EndTime,
    CameraId,
    Plate,
}

impl FilterField {
    pub const ALL: [FilterField; 5] = [
        FilterField::Date,
        FilterField::StartTime,
        FilterField::EndTime,
        FilterField::CameraId,
        FilterField::Plate,
    ];

    /// Query-string key sent to `/search`.
    pub fn key(self) -> &'static str {
        match self {
            FilterField::Date => "date",
            FilterField::StartTime => "start_time",
            FilterField::EndTime => "end_time",
            FilterField::CameraId => "camera_id",
            FilterField::Plate => "plate",
        }
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for FilterField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterField::ALL
            .into_iter()
            .find(|field| field.key() == s)
            .ok_or_else(|| {
                format!(
                    "unknown filter field '{}'. Use date, start_time, end_time, camera_id, or plate.",
                    s
                )
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub camera_id: String,
    #[serde(default)]
    pub plate: String,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: FilterField) -> &str {
        match field {
            FilterField::Date => &self.date,
            FilterField::StartTime => &self.start_time,
            FilterField::EndTime => &self.end_time,
            FilterField::CameraId => &self.camera_id,
            FilterField::Plate => &self.plate,
        }
    }

    pub fn set_field(&mut self, field: FilterField, value: impl Into<String>) {
        let slot = match field {
            FilterField::Date => &mut self.date,
            FilterField::StartTime => &mut self.start_time,
            FilterField::EndTime => &mut self.end_time,
            FilterField::CameraId => &mut self.camera_id,
            FilterField::Plate => &mut self.plate,
        };
        *slot = value.into();
    }

    /// Builder-style [`set_field`](Self::set_field).
    pub fn with(mut self, field: FilterField, value: impl Into<String>) -> Self {
        self.set_field(field, value);
        self
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        FilterField::ALL.iter().all(|f| self.get(*f).is_empty())
    }

    /// Form-encoded query string of the non-empty fields, in [`FilterField::ALL`] order.
    pub fn serialize(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for field in FilterField::ALL {
            let value = self.get(field);
            if !value.is_empty() {
                query.append_pair(field.key(), value);
            }
        }
        query.finish()
    }
}
