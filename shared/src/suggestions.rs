use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::sequence::{SequenceGuard, Ticket};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionAction {
    /// Input too short: the list was emptied and nothing is requested.
    Cleared,
    Fetch { ticket: Ticket, query: String },
}

/// Place-name suggestions for the location field. Only the answer to the
/// newest lookup is ever shown.
#[derive(Debug, Default)]
pub struct LocationSuggestions {
    items: Vec<String>,
    guard: SequenceGuard,
}

impl LocationSuggestions {
    #[must_use]
    pub fn items(&self) -> &[String] {
        &self.items
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.guard.in_flight()
    }

    pub fn on_input(&mut self, text: &str, min_chars: usize) -> SuggestionAction {
        let query = text.trim();
        if query.chars().count() < min_chars {
            self.items.clear();
            self.guard.invalidate();
            return SuggestionAction::Cleared;
        }
        SuggestionAction::Fetch {
            ticket: self.guard.issue(),
            query: query.to_string(),
        }
    }

    /// Applies a lookup answer. Stale answers are dropped; failures keep the
    /// previous suggestions and are only logged.
    pub fn apply(&mut self, ticket: Ticket, result: Result<Vec<String>, AppError>) -> bool {
        if !self.guard.settle(ticket) {
            debug!(%ticket, "discarding stale location suggestions");
            return false;
        }
        match result {
            Ok(items) => {
                self.items = items;
                true
            }
            Err(e) => {
                warn!(%ticket, error = %e, "location lookup failed");
                false
            }
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.guard.invalidate();
    }
}

#[derive(Debug, Deserialize)]
struct GeocoderPlace {
    #[serde(default)]
    display_name: Option<String>,
}

/// Reads `display_name` from each geocoder result, keeping at most `limit`.
pub fn parse_geocoder_response(body: &[u8], limit: usize) -> Result<Vec<String>, serde_json::Error> {
    let places: Vec<GeocoderPlace> = serde_json::from_slice(body)?;
    Ok(places
        .into_iter()
        .filter_map(|p| p.display_name)
        .filter(|name| !name.trim().is_empty())
        .take(limit)
        .collect())
}
