use crate::trip::{Trip, TripId};

/// Trips whose title or location contains `query`, ignoring case, in their
/// original order. A blank query matches everything.
pub fn filter_trips<'a>(trips: &'a [Trip], query: &str) -> Vec<&'a Trip> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return trips.iter().collect();
    }
    trips.iter().filter(|t| t.matches_lowercase(&needle)).collect()
}

/// The current query and the ids it matches. Re-derived whenever the query or
/// the store changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    query: String,
    matches: Vec<TripId>,
}

impl SearchFilter {
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub fn matches(&self) -> &[TripId] {
        &self.matches
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.query.trim().is_empty()
    }

    pub fn set_query(&mut self, query: impl Into<String>, trips: &[Trip]) {
        self.query = query.into();
        self.rederive(trips);
    }

    pub fn rederive(&mut self, trips: &[Trip]) {
        self.matches = filter_trips(trips, &self.query)
            .into_iter()
            .map(|t| t.id)
            .collect();
    }
}
