use serde::{Deserialize, Serialize};

use crate::capabilities::HttpResult;
use crate::config::AppConfig;
use crate::editor::TripDraft;
use crate::geometry::{CarouselKey, ImageAspect};
use crate::mutation::{MutationToken, ReadId};
use crate::sequence::Ticket;
use crate::trip::{ImagePayload, TripField, TripId};

#[derive(Debug, Serialize, Deserialize)]
pub enum Event {
    Noop,

    /// Replaces the configuration. The core issues no request before the
    /// first valid one.
    Configure(AppConfig),

    // Trip list and detail
    RefreshRequested,
    #[serde(skip)]
    RefreshResponse {
        ticket: Ticket,
        read: ReadId,
        result: Box<HttpResult>,
    },
    TripRequested {
        id: TripId,
    },
    #[serde(skip)]
    TripResponse {
        id: TripId,
        ticket: Ticket,
        read: ReadId,
        result: Box<HttpResult>,
    },
    TripClosed,
    DeleteTripRequested {
        id: TripId,
    },
    #[serde(skip)]
    DeleteTripResponse {
        id: TripId,
        result: Box<HttpResult>,
    },

    // Optimistic flags
    ToggleRequested {
        id: TripId,
        field: TripField,
    },
    #[serde(skip)]
    ToggleResponse {
        id: TripId,
        field: TripField,
        token: MutationToken,
        result: Box<HttpResult>,
    },

    // Editor
    CreateTripRequested(TripDraft),
    #[serde(skip)]
    CreateTripResponse {
        result: Box<HttpResult>,
    },
    UpdateTripRequested {
        id: TripId,
        draft: TripDraft,
    },
    #[serde(skip)]
    UpdateTripResponse {
        id: TripId,
        draft: TripDraft,
        result: Box<HttpResult>,
    },
    DraftImagesChanged {
        images: Vec<ImagePayload>,
    },
    DraftDiscarded,

    SearchQueryChanged {
        query: String,
    },

    // Location suggestions
    LocationQueryChanged {
        text: String,
    },
    #[serde(skip)]
    LocationSuggestionsResponse {
        ticket: Ticket,
        result: Box<HttpResult>,
    },
    LocationSuggestionPicked {
        name: String,
    },
    SuggestionsDismissed,

    // Map
    MapOpened,
    #[serde(skip)]
    MapLocationResponse {
        location: String,
        ticket: Ticket,
        result: Box<HttpResult>,
    },

    ImageAspectsResolved {
        key: CarouselKey,
        generation: u64,
        indices: Vec<usize>,
        aspects: Vec<ImageAspect>,
    },

    // Categories
    CategoriesRequested {
        force: bool,
    },
    #[serde(skip)]
    CategoriesResponse {
        ticket: Ticket,
        result: Box<HttpResult>,
    },
    AddCategoryRequested {
        name: String,
    },
    #[serde(skip)]
    AddCategoryResponse {
        name: String,
        /// The trip waiting for its category to exist before it is created.
        pending_trip: Option<TripDraft>,
        result: Box<HttpResult>,
    },
    RemoveCategoryRequested {
        name: String,
    },
    #[serde(skip)]
    RemoveCategoryResponse {
        name: String,
        result: Box<HttpResult>,
    },

    DismissError,
    DismissToast,
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Configure(_) => "configure",
            Self::RefreshRequested => "refresh_requested",
            Self::RefreshResponse { .. } => "refresh_response",
            Self::TripRequested { .. } => "trip_requested",
            Self::TripResponse { .. } => "trip_response",
            Self::TripClosed => "trip_closed",
            Self::DeleteTripRequested { .. } => "delete_trip_requested",
            Self::DeleteTripResponse { .. } => "delete_trip_response",
            Self::ToggleRequested { .. } => "toggle_requested",
            Self::ToggleResponse { .. } => "toggle_response",
            Self::CreateTripRequested(_) => "create_trip_requested",
            Self::CreateTripResponse { .. } => "create_trip_response",
            Self::UpdateTripRequested { .. } => "update_trip_requested",
            Self::UpdateTripResponse { .. } => "update_trip_response",
            Self::DraftImagesChanged { .. } => "draft_images_changed",
            Self::DraftDiscarded => "draft_discarded",
            Self::SearchQueryChanged { .. } => "search_query_changed",
            Self::LocationQueryChanged { .. } => "location_query_changed",
            Self::LocationSuggestionsResponse { .. } => "location_suggestions_response",
            Self::LocationSuggestionPicked { .. } => "location_suggestion_picked",
            Self::SuggestionsDismissed => "suggestions_dismissed",
            Self::MapOpened => "map_opened",
            Self::MapLocationResponse { .. } => "map_location_response",
            Self::ImageAspectsResolved { .. } => "image_aspects_resolved",
            Self::CategoriesRequested { .. } => "categories_requested",
            Self::CategoriesResponse { .. } => "categories_response",
            Self::AddCategoryRequested { .. } => "add_category_requested",
            Self::AddCategoryResponse { .. } => "add_category_response",
            Self::RemoveCategoryRequested { .. } => "remove_category_requested",
            Self::RemoveCategoryResponse { .. } => "remove_category_response",
            Self::DismissError => "dismiss_error",
            Self::DismissToast => "dismiss_toast",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::RefreshRequested
                | Self::TripRequested { .. }
                | Self::TripClosed
                | Self::DeleteTripRequested { .. }
                | Self::ToggleRequested { .. }
                | Self::CreateTripRequested(_)
                | Self::UpdateTripRequested { .. }
                | Self::DraftImagesChanged { .. }
                | Self::DraftDiscarded
                | Self::SearchQueryChanged { .. }
                | Self::LocationQueryChanged { .. }
                | Self::LocationSuggestionPicked { .. }
                | Self::SuggestionsDismissed
                | Self::MapOpened
                | Self::CategoriesRequested { .. }
                | Self::AddCategoryRequested { .. }
                | Self::RemoveCategoryRequested { .. }
                | Self::DismissError
                | Self::DismissToast
        )
    }
}
