use base64::Engine;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

pub const WIRE_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TripId(pub i64);

impl TripId {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Boolean trip attributes that can be toggled optimistically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripField {
    Favorite,
    Repeat,
}

impl TripField {
    pub const ALL: [Self; 2] = [Self::Favorite, Self::Repeat];

    /// Last path segment of the toggle endpoint.
    #[must_use]
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::Favorite => "favorite",
            Self::Repeat => "repeat",
        }
    }

    /// Body key the trip service expects for this field.
    #[must_use]
    pub const fn wire_key(self) -> &'static str {
        match self {
            Self::Favorite => "isfavorite",
            Self::Repeat => "ripeti",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Favorite => "favorite",
            Self::Repeat => "trip to repeat",
        }
    }
}

impl fmt::Display for TripField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// A base64 image as exchanged with the trip service. Kept encoded; decoded
/// only when its header needs probing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImagePayload(String);

impl ImagePayload {
    #[must_use]
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Raw image bytes. Accepts a bare base64 string or a `data:` URI.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let encoded = self.0.trim();
        let encoded = match encoded.strip_prefix("data:") {
            Some(rest) => rest.split_once(',').map_or(rest, |(_, data)| data),
            None => encoded,
        };
        base64::engine::general_purpose::STANDARD.decode(encoded)
    }

    #[must_use]
    pub fn digest(&self) -> blake3::Hash {
        blake3::hash(self.0.as_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub title: String,
    pub location: String,
    pub description: String,
    pub category: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub images: Vec<ImagePayload>,
    pub is_favorite: bool,
    pub repeat: bool,
}

impl Trip {
    #[must_use]
    pub fn new(id: TripId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            location: String::new(),
            description: String::new(),
            category: String::new(),
            start_date: None,
            end_date: None,
            images: Vec::new(),
            is_favorite: false,
            repeat: false,
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    #[must_use]
    pub fn with_dates(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    #[must_use]
    pub fn with_images(mut self, images: Vec<ImagePayload>) -> Self {
        self.images = images;
        self
    }

    #[must_use]
    pub const fn field(&self, field: TripField) -> bool {
        match field {
            TripField::Favorite => self.is_favorite,
            TripField::Repeat => self.repeat,
        }
    }

    pub fn set_field(&mut self, field: TripField, value: bool) {
        match field {
            TripField::Favorite => self.is_favorite = value,
            TripField::Repeat => self.repeat = value,
        }
    }

    /// Length of the trip in whole days, never less than one. `None` unless
    /// both dates are known.
    #[must_use]
    pub fn duration_days(&self) -> Option<i64> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => Some((end - start).num_days().max(1)),
            _ => None,
        }
    }

    /// `needle` must already be lowercased.
    #[must_use]
    pub fn matches_lowercase(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle) || self.location.to_lowercase().contains(needle)
    }
}

/// A trip as the trip service serializes it. Every spelling of the boolean
/// flags seen across server versions is accepted here and nowhere else.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripRecord {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, rename = "isFavorite")]
    pub is_favorite_camel: Option<bool>,
    #[serde(default)]
    pub isfavorite: Option<bool>,
    #[serde(default)]
    pub favorite: Option<bool>,
    #[serde(default)]
    pub ripeti: Option<bool>,
    #[serde(default)]
    pub repeat: Option<bool>,
}

impl TripRecord {
    #[must_use]
    pub fn has_images(&self) -> bool {
        self.images.as_ref().is_some_and(|i| !i.is_empty()) || self.image.is_some()
    }
}

impl From<TripRecord> for Trip {
    fn from(record: TripRecord) -> Self {
        let id = TripId(record.id);
        let start_date = record.start_date.as_deref().and_then(parse_wire_date);
        let mut end_date = record.end_date.as_deref().and_then(parse_wire_date);

        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                warn!(trip_id = %id, %start, %end, "dropping end date earlier than start date");
                end_date = None;
            }
        }

        let title = record.title.unwrap_or_default();
        if title.trim().is_empty() {
            warn!(trip_id = %id, "trip record has no title");
        }

        let images = match (record.images, record.image) {
            (Some(images), _) if !images.is_empty() => {
                images.into_iter().map(ImagePayload::new).collect()
            }
            (_, Some(single)) if !single.trim().is_empty() => vec![ImagePayload::new(single)],
            _ => Vec::new(),
        };

        Self {
            id,
            title,
            location: record.location.unwrap_or_default(),
            description: record.description.unwrap_or_default(),
            category: record.category.unwrap_or_default(),
            start_date,
            end_date,
            images,
            is_favorite: record
                .is_favorite_camel
                .or(record.isfavorite)
                .or(record.favorite)
                .unwrap_or(false),
            repeat: record.ripeti.or(record.repeat).unwrap_or(false),
        }
    }
}

/// Reads the calendar date at the start of `raw`. Timestamps such as
/// `2024-05-01T00:00:00.000Z` keep their date part.
#[must_use]
pub fn parse_wire_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let head = raw.get(..10).unwrap_or(raw);
    match NaiveDate::parse_from_str(head, WIRE_DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(e) => {
            warn!(value = raw, error = %e, "ignoring unparseable date");
            None
        }
    }
}

#[must_use]
pub fn format_wire_date(date: NaiveDate) -> String {
    date.format(WIRE_DATE_FORMAT).to_string()
}

pub fn parse_trip(body: &[u8]) -> Result<Trip, serde_json::Error> {
    serde_json::from_slice::<TripRecord>(body).map(Trip::from)
}

/// Parses a list response. Returns the trips together with the ids whose
/// record carried image data.
pub fn parse_trip_list(body: &[u8]) -> Result<Vec<(Trip, bool)>, serde_json::Error> {
    let records: Vec<TripRecord> = serde_json::from_slice(body)?;
    Ok(records
        .into_iter()
        .map(|record| {
            let has_images = record.has_images();
            (Trip::from(record), has_images)
        })
        .collect())
}
