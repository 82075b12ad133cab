use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::sequence::{SequenceGuard, Ticket};
use crate::trip::{Trip, TripField, TripId};

/// The client's copy of the trip collection, in server order.
///
/// Every change is a single synchronous call, so readers never see a
/// half-applied refresh.
#[derive(Debug, Default)]
pub struct TripStore {
    trips: Vec<Trip>,
    /// Trips point-fetched (with images) during this session.
    fetched: HashSet<TripId>,
    refresh: SequenceGuard,
    fetches: HashMap<TripId, SequenceGuard>,
    loaded: bool,
}

impl TripStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_trips(trips: Vec<Trip>) -> Self {
        Self {
            trips,
            loaded: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn trips(&self) -> &[Trip] {
        &self.trips
    }

    #[must_use]
    pub fn get(&self, id: TripId) -> Option<&Trip> {
        self.trips.iter().find(|t| t.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: TripId) -> bool {
        self.get(id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.trips.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }

    /// Whether a refresh has ever completed.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn begin_refresh(&mut self) -> Ticket {
        self.refresh.issue()
    }

    #[must_use]
    pub const fn refresh_in_flight(&self) -> bool {
        self.refresh.in_flight()
    }

    /// Replaces the collection if `ticket` is the latest refresh. Images the
    /// list endpoint leaves out are carried over for trips already fetched.
    pub fn complete_refresh(&mut self, ticket: Ticket, list: Vec<(Trip, bool)>) -> bool {
        if !self.refresh.settle(ticket) {
            debug!(%ticket, "discarding stale refresh");
            return false;
        }

        let mut previous: HashMap<TripId, Trip> =
            self.trips.drain(..).map(|t| (t.id, t)).collect();

        let trips: Vec<Trip> = list
            .into_iter()
            .map(|(mut trip, has_images)| {
                if !has_images && self.fetched.contains(&trip.id) {
                    if let Some(old) = previous.remove(&trip.id) {
                        trip.images = old.images;
                    }
                }
                trip
            })
            .collect();

        let ids: HashSet<TripId> = trips.iter().map(|t| t.id).collect();
        self.fetched.retain(|id| ids.contains(id));
        self.fetches.retain(|id, guard| ids.contains(id) || guard.in_flight());
        self.trips = trips;
        self.loaded = true;
        true
    }

    /// Returns `true` if the failed refresh was the latest one. The
    /// collection is left untouched either way.
    pub fn fail_refresh(&mut self, ticket: Ticket) -> bool {
        self.refresh.settle(ticket)
    }

    /// `true` when the trip is absent or only known from the list endpoint.
    #[must_use]
    pub fn needs_fetch(&self, id: TripId) -> bool {
        !self.fetched.contains(&id)
    }

    pub fn begin_fetch(&mut self, id: TripId) -> Ticket {
        self.fetches.entry(id).or_default().issue()
    }

    #[must_use]
    pub fn fetch_in_flight(&self, id: TripId) -> bool {
        self.fetches.get(&id).is_some_and(SequenceGuard::in_flight)
    }

    pub fn complete_fetch(&mut self, id: TripId, ticket: Ticket, trip: Trip) -> bool {
        let current = self.fetches.get_mut(&id).is_some_and(|g| g.settle(ticket));
        if !current {
            debug!(trip_id = %id, %ticket, "discarding stale trip fetch");
            return false;
        }
        self.upsert(trip);
        self.fetched.insert(id);
        true
    }

    pub fn fail_fetch(&mut self, id: TripId, ticket: Ticket) -> bool {
        self.fetches.get_mut(&id).is_some_and(|g| g.settle(ticket))
    }

    /// Sets one boolean field locally and returns its previous value. Never
    /// touches the network.
    pub fn apply_field_update(&mut self, id: TripId, field: TripField, value: bool) -> Option<bool> {
        let trip = self.trips.iter_mut().find(|t| t.id == id)?;
        let previous = trip.field(field);
        trip.set_field(field, value);
        Some(previous)
    }

    /// Replaces the trip with the same id in place, or appends it.
    pub fn upsert(&mut self, trip: Trip) {
        match self.trips.iter_mut().find(|t| t.id == trip.id) {
            Some(slot) => *slot = trip,
            None => self.trips.push(trip),
        }
    }

    /// Newly created trips go first, matching the server's newest-first order.
    pub fn insert_front(&mut self, trip: Trip) {
        self.trips.retain(|t| t.id != trip.id);
        self.trips.insert(0, trip);
    }

    pub fn remove(&mut self, id: TripId) -> Option<Trip> {
        let index = self.trips.iter().position(|t| t.id == id)?;
        self.fetched.remove(&id);
        self.fetches.remove(&id);
        Some(self.trips.remove(index))
    }
}
