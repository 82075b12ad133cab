use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::categories::CategoryRegistry;
use crate::config::{AppConfig, Endpoints};
use crate::editor::TripDraft;
use crate::error::{AppError, MutationError};
use crate::geometry::GeometryTracker;
use crate::get_current_time_ms;
use crate::map::MapPins;
use crate::mutation::MutationController;
use crate::search::SearchFilter;
use crate::store::TripStore;
use crate::suggestions::LocationSuggestions;
use crate::trip::TripId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToastMessage {
    pub message: String,
    pub kind: ToastKind,
    pub created_at_ms: u64,
    pub duration_ms: u64,
}

impl ToastMessage {
    #[must_use]
    pub fn new(message: impl Into<String>, kind: ToastKind) -> Self {
        Self {
            message: message.into(),
            kind,
            created_at_ms: get_current_time_ms(),
            duration_ms: kind.default_duration_ms(),
        }
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > self.duration_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl ToastKind {
    #[must_use]
    pub const fn default_duration_ms(self) -> u64 {
        match self {
            Self::Info => 3000,
            Self::Success => 2000,
            Self::Warning => 4000,
            Self::Error => 5000,
        }
    }
}

/// Everything the core knows. Only `update` mutates it.
pub struct Model {
    pub config: AppConfig,
    /// `None` until a valid configuration has been applied.
    pub endpoints: Option<Endpoints>,
    pub trips: TripStore,
    pub mutations: MutationController,
    pub search: SearchFilter,
    pub suggestions: LocationSuggestions,
    pub categories: CategoryRegistry,
    pub geometry: GeometryTracker,
    pub map: MapPins,
    pub selected_trip: Option<TripId>,
    pub draft: TripDraft,
    pub pending_deletes: HashSet<TripId>,
    pub is_saving: bool,
    pub active_error: Option<AppError>,
    pub active_toast: Option<ToastMessage>,
    /// Most recent failed mutation, kept for shells that want the details.
    pub last_mutation_error: Option<MutationError>,
    pub view_timestamp_ms: u64,
}

impl Default for Model {
    fn default() -> Self {
        let config = AppConfig::default();
        Self {
            endpoints: config.validate().ok(),
            geometry: GeometryTracker::new(config.aspect_cache_capacity()),
            config,
            trips: TripStore::new(),
            mutations: MutationController::new(),
            search: SearchFilter::default(),
            suggestions: LocationSuggestions::default(),
            categories: CategoryRegistry::default(),
            map: MapPins::default(),
            selected_trip: None,
            draft: TripDraft::default(),
            pending_deletes: HashSet::new(),
            is_saving: false,
            active_error: None,
            active_toast: None,
            last_mutation_error: None,
            view_timestamp_ms: get_current_time_ms(),
        }
    }
}

impl Model {
    pub fn update_timestamp(&mut self) {
        self.view_timestamp_ms = get_current_time_ms();
    }

    pub fn set_error(&mut self, error: AppError) {
        self.active_error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.active_error = None;
    }

    pub fn show_toast(&mut self, message: impl Into<String>, kind: ToastKind) {
        self.active_toast = Some(ToastMessage::new(message, kind));
    }

    pub fn clear_toast(&mut self) {
        self.active_toast = None;
    }

    /// Reports a rolled-back mutation as a warning toast.
    pub fn report_mutation_error(&mut self, error: MutationError) {
        self.show_toast(error.user_facing_message(), ToastKind::Warning);
        self.last_mutation_error = Some(error);
    }

    /// Keeps the filtered view in step with the store.
    pub fn rederive_search(&mut self) {
        self.search.rederive(self.trips.trips());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::trip::TripField;

    #[test]
    fn test_default_model_is_configured() {
        let model = Model::default();
        assert!(model.endpoints.is_some());
        assert!(!model.trips.is_loaded());
    }

    #[test]
    fn test_toast_expiry() {
        let toast = ToastMessage::new("saved", ToastKind::Success);
        assert!(!toast.is_expired(toast.created_at_ms + 1000));
        assert!(toast.is_expired(toast.created_at_ms + 2001));
    }

    #[test]
    fn test_mutation_error_becomes_warning_toast() {
        let mut model = Model::default();
        model.report_mutation_error(MutationError::Toggle {
            trip_id: TripId(2),
            field: TripField::Favorite,
            cause: AppError::new(ErrorKind::Network, "offline"),
        });
        let toast = model.active_toast.as_ref().unwrap();
        assert_eq!(toast.kind, ToastKind::Warning);
        assert!(toast.message.starts_with("Couldn't update favorite."));
        assert!(model.active_error.is_none());
    }
}
