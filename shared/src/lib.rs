//! Shared core of the Tripbook travel journal: the trip store, optimistic
//! flag toggles, image geometry, location suggestions, map pins, search and
//! the category registry. [`App`] is a Crux app; [`Shell`] drives it
//! headlessly.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]

pub mod app;
pub mod capabilities;
pub mod categories;
pub mod config;
pub mod editor;
pub mod error;
pub mod event;
pub mod geometry;
pub mod map;
pub mod model;
pub mod mutation;
pub mod search;
pub mod sequence;
pub mod shell;
pub mod stats;
pub mod store;
pub mod suggestions;
pub mod trip;
pub mod view;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use config::{AppConfig, ConfigError, Endpoints};
pub use editor::TripDraft;
pub use error::{AppError, AppResult, ErrorKind, ErrorSeverity, MutationError, ValidationError};
pub use event::Event;
pub use model::{Model, ToastKind, ToastMessage};
pub use shell::{HttpClient, ReqwestClient, Shell};
pub use trip::{ImagePayload, Trip, TripField, TripId};
pub use view::ViewModel;

#[must_use]
pub fn get_current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
