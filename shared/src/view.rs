use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorSeverity};
use crate::geometry::CarouselKey;
use crate::map::{self, Coordinates, MapPin};
use crate::model::{Model, ToastKind, ToastMessage};
use crate::stats::TripStats;
use crate::trip::{format_wire_date, Trip, TripField, TripId};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserFacingError {
    pub message: String,
    pub is_transient: bool,
    pub is_retryable: bool,
    pub error_code: String,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            is_transient: e.severity == ErrorSeverity::Transient,
            is_retryable: e.is_retryable(),
            error_code: e.code().to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToastView {
    pub message: String,
    pub kind: ToastKind,
    pub duration_ms: u64,
}

impl From<&ToastMessage> for ToastView {
    fn from(t: &ToastMessage) -> Self {
        Self {
            message: t.message.clone(),
            kind: t.kind,
            duration_ms: t.duration_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TripListItem {
    pub id: TripId,
    pub title: String,
    pub location: String,
    pub category: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub is_favorite: bool,
    pub repeat: bool,
    /// A toggle is waiting for the server.
    pub favorite_pending: bool,
    pub repeat_pending: bool,
    pub is_deleting: bool,
}

impl TripListItem {
    fn new(trip: &Trip, model: &Model) -> Self {
        Self {
            id: trip.id,
            title: trip.title.clone(),
            location: trip.location.clone(),
            category: trip.category.clone(),
            start_date: trip.start_date.map(format_wire_date),
            end_date: trip.end_date.map(format_wire_date),
            is_favorite: trip.is_favorite,
            repeat: trip.repeat,
            favorite_pending: model.mutations.is_pending(trip.id, TripField::Favorite),
            repeat_pending: model.mutations.is_pending(trip.id, TripField::Repeat),
            is_deleting: model.pending_deletes.contains(&trip.id),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TripDetail {
    pub item: TripListItem,
    pub description: String,
    /// Base64 payloads, in display order.
    pub images: Vec<String>,
    /// One ratio per image; 16:9 until probed.
    pub image_ratios: Vec<f64>,
    pub duration_days: Option<i64>,
    pub is_loading: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DraftView {
    pub location: String,
    pub image_ratios: Vec<f64>,
    pub suggestions: Vec<String>,
    pub suggestions_loading: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MapView {
    pub pins: Vec<MapPin>,
    pub center: Coordinates,
    pub is_locating: bool,
    /// The pins as a GeoJSON `FeatureCollection`.
    pub geojson: String,
}

impl MapView {
    fn new(model: &Model) -> Self {
        let pins = map::pins(model.trips.trips(), &model.map);
        Self {
            center: map::center(&pins),
            is_locating: model.map.is_locating(),
            geojson: map::feature_collection(&pins).to_string(),
            pins,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewModel {
    /// Trips matching the search query, in store order.
    pub trips: Vec<TripListItem>,
    pub search_query: String,
    pub is_loaded: bool,
    pub is_refreshing: bool,
    /// `Some(id)` while a selected trip is not in the store yet.
    pub selected_trip_id: Option<TripId>,
    pub selected: Option<TripDetail>,
    pub draft: DraftView,
    pub map: MapView,
    pub categories: Vec<String>,
    pub categories_loading: bool,
    pub stats: TripStats,
    pub average_duration_label: String,
    pub is_saving: bool,
    pub pending_mutations: usize,
    pub error: Option<UserFacingError>,
    pub toast: Option<ToastView>,
}

impl ViewModel {
    #[must_use]
    pub fn derive(model: &Model) -> Self {
        let trips = model
            .search
            .matches()
            .iter()
            .filter_map(|id| model.trips.get(*id))
            .map(|trip| TripListItem::new(trip, model))
            .collect();

        let selected = model.selected_trip.and_then(|id| {
            let trip = model.trips.get(id)?;
            Some(TripDetail {
                item: TripListItem::new(trip, model),
                description: trip.description.clone(),
                images: trip.images.iter().map(|i| i.as_str().to_string()).collect(),
                image_ratios: model.geometry.ratios(CarouselKey::Trip(id)),
                duration_days: trip.duration_days(),
                is_loading: model.trips.fetch_in_flight(id),
            })
        });

        let stats = TripStats::compute(model.trips.trips());

        Self {
            trips,
            search_query: model.search.query().to_string(),
            is_loaded: model.trips.is_loaded(),
            is_refreshing: model.trips.refresh_in_flight(),
            selected_trip_id: model.selected_trip,
            selected,
            draft: DraftView {
                location: model.draft.location.clone(),
                image_ratios: model.geometry.ratios(CarouselKey::Draft),
                suggestions: model.suggestions.items().to_vec(),
                suggestions_loading: model.suggestions.is_loading(),
            },
            map: MapView::new(model),
            categories: model.categories.names().to_vec(),
            categories_loading: model.categories.is_loading(),
            average_duration_label: stats.average_duration_label(),
            stats,
            is_saving: model.is_saving,
            pending_mutations: model.mutations.pending_count(),
            error: model.active_error.as_ref().map(UserFacingError::from),
            toast: model
                .active_toast
                .as_ref()
                .filter(|t| !t.is_expired(model.view_timestamp_ms))
                .map(ToastView::from),
        }
    }
}
