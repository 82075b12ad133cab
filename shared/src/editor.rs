use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::trip::{format_wire_date, ImagePayload, Trip};

/// Form contents for a new trip or a full edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripDraft {
    pub title: String,
    pub location: String,
    pub description: String,
    pub category: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub images: Vec<ImagePayload>,
}

impl TripDraft {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
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
    pub fn from_trip(trip: &Trip) -> Self {
        Self {
            title: trip.title.clone(),
            location: trip.location.clone(),
            description: trip.description.clone(),
            category: trip.category.clone(),
            start_date: trip.start_date,
            end_date: trip.end_date,
            images: trip.images.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(ValidationError::InvalidDateRange {
                    start: format_wire_date(start),
                    end: format_wire_date(end),
                });
            }
        }
        Ok(())
    }

    pub fn to_create_request(&self) -> Result<NewTripRequest, ValidationError> {
        self.validate()?;
        Ok(NewTripRequest {
            fields: self.fields(),
            images: self
                .images
                .iter()
                .filter(|i| !i.is_empty())
                .cloned()
                .collect(),
        })
    }

    pub fn to_update_request(&self) -> Result<TripUpdateRequest, ValidationError> {
        self.validate()?;
        Ok(self.fields())
    }

    /// Writes the editable fields onto `trip`, keeping its id, images and
    /// flags.
    pub fn apply_to(&self, trip: &mut Trip) {
        trip.title = self.title.trim().to_string();
        trip.location = self.location.trim().to_string();
        trip.description = self.description.clone();
        trip.category = self.category.trim().to_string();
        trip.start_date = self.start_date;
        trip.end_date = self.end_date;
    }

    fn fields(&self) -> TripUpdateRequest {
        TripUpdateRequest {
            title: self.title.trim().to_string(),
            description: self.description.clone(),
            category: self.category.trim().to_string(),
            location: self.location.trim().to_string(),
            start_date: self.start_date.map(format_wire_date),
            end_date: self.end_date.map(format_wire_date),
        }
    }
}

/// Body of `PATCH /api/trips/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TripUpdateRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Body of `POST /api/trips`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTripRequest {
    #[serde(flatten)]
    pub fields: TripUpdateRequest,
    pub images: Vec<ImagePayload>,
}
