//! Optimistic favorite/repeat toggles.
//!
//! A toggle flips the value in the [`TripStore`] immediately and records a
//! [`PendingMutation`]. At most one mutation is pending per (trip, field); a
//! second toggle supersedes the first instead of queueing behind it. Answers
//! for superseded tokens never overwrite what the user sees, but a superseded
//! success still moves the rollback baseline, so a later failure restores the
//! last value the server actually accepted.
//!
//! Reads of server state (list refreshes and point fetches) are tracked as
//! well. A read issued before a toggle was confirmed may still carry the old
//! value, so the confirmation is kept and re-applied until every such read
//! has settled.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AppError, MutationError};
use crate::store::TripStore;
use crate::trip::{TripField, TripId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MutationToken(u64);

impl MutationToken {
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MutationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Identifies one read of server state: a refresh or a point fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReadId(u64);

impl fmt::Display for ReadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    AppliedLocally,
    Confirmed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    pub token: MutationToken,
    pub trip_id: TripId,
    pub field: TripField,
    /// Value shown before this toggle.
    pub previous: bool,
    pub requested: bool,
    /// Last value known to be accepted by the server.
    pub baseline: bool,
    pub status: MutationStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Confirmed(PendingMutation),
    RolledBack {
        mutation: PendingMutation,
        error: MutationError,
    },
    /// The answer belonged to an overtaken toggle. `applied` is set when a
    /// late confirmation was written to the store because nothing newer was
    /// left to show.
    Superseded { applied: bool },
    /// No mutation with this token is known, e.g. the trip was deleted.
    Unknown,
}

type FieldKey = (TripId, TripField);

#[derive(Debug, Clone, Copy)]
struct Confirmation {
    token: MutationToken,
    value: bool,
    /// Reads numbered up to here were issued before the server accepted
    /// the value.
    reads_before: u64,
}

#[derive(Debug, Default)]
struct FieldLedger {
    pending: Option<PendingMutation>,
    /// Overtaken tokens still waiting for an answer, with the value each one
    /// asked for.
    superseded: HashMap<MutationToken, bool>,
    /// Newest token the server accepted, and its value.
    confirmed: Option<Confirmation>,
}

impl FieldLedger {
    /// Nothing in flight and no open read that could still carry a value
    /// older than the confirmation.
    fn is_settled(&self, oldest_open_read: Option<u64>) -> bool {
        self.pending.is_none()
            && self.superseded.is_empty()
            && self.confirmed.map_or(true, |c| {
                oldest_open_read.map_or(true, |oldest| oldest > c.reads_before)
            })
    }

    fn record_confirmation(&mut self, token: MutationToken, value: bool, reads_before: u64) -> bool {
        let newer = self.confirmed.map_or(true, |c| token > c.token);
        if newer {
            self.confirmed = Some(Confirmation {
                token,
                value,
                reads_before,
            });
        }
        newer
    }
}

#[derive(Debug)]
pub struct MutationController {
    ledgers: HashMap<FieldKey, FieldLedger>,
    next_token: u64,
    reads_issued: u64,
    open_reads: BTreeSet<u64>,
}

impl Default for MutationController {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ledgers: HashMap::new(),
            next_token: 1,
            reads_issued: 0,
            open_reads: BTreeSet::new(),
        }
    }

    fn oldest_open_read(&self) -> Option<u64> {
        self.open_reads.first().copied()
    }

    /// Registers a refresh or point fetch about to be sent.
    pub fn begin_read(&mut self) -> ReadId {
        self.reads_issued += 1;
        self.open_reads.insert(self.reads_issued);
        ReadId(self.reads_issued)
    }

    /// Marks `read` as answered, whatever the outcome, and drops the
    /// confirmations no open read can contradict any more.
    pub fn finish_read(&mut self, read: ReadId) {
        self.open_reads.remove(&read.0);
        let oldest = self.oldest_open_read();
        self.ledgers.retain(|_, ledger| !ledger.is_settled(oldest));
    }

    #[must_use]
    pub fn open_reads(&self) -> usize {
        self.open_reads.len()
    }

    /// Flips `field` on the trip and records the pending mutation. Returns
    /// `None` when the trip is not in the store.
    pub fn begin(
        &mut self,
        store: &mut TripStore,
        trip_id: TripId,
        field: TripField,
    ) -> Option<PendingMutation> {
        let previous = store.get(trip_id)?.field(field);
        let requested = !previous;

        let token = MutationToken(self.next_token);
        self.next_token += 1;

        let ledger = self.ledgers.entry((trip_id, field)).or_default();
        let baseline = match ledger.pending.take() {
            Some(overtaken) => {
                debug!(
                    trip_id = %trip_id,
                    %field,
                    superseded = %overtaken.token,
                    by = %token,
                    "superseding pending toggle"
                );
                ledger.superseded.insert(overtaken.token, overtaken.requested);
                overtaken.baseline
            }
            None => previous,
        };

        let mutation = PendingMutation {
            token,
            trip_id,
            field,
            previous,
            requested,
            baseline,
            status: MutationStatus::AppliedLocally,
        };
        ledger.pending = Some(mutation.clone());
        store.apply_field_update(trip_id, field, requested);
        Some(mutation)
    }

    /// Applies the server's answer for `token`.
    pub fn resolve(
        &mut self,
        store: &mut TripStore,
        trip_id: TripId,
        field: TripField,
        token: MutationToken,
        outcome: Result<(), AppError>,
    ) -> Resolution {
        let key = (trip_id, field);
        let reads_before = self.reads_issued;
        let oldest = self.oldest_open_read();
        let Some(ledger) = self.ledgers.get_mut(&key) else {
            debug!(trip_id = %trip_id, %field, %token, "answer for unknown toggle");
            return Resolution::Unknown;
        };

        let resolution = if ledger.pending.as_ref().is_some_and(|p| p.token == token) {
            Self::resolve_current(ledger, store, outcome, reads_before)
        } else if let Some(requested) = ledger.superseded.remove(&token) {
            Self::resolve_superseded(ledger, store, key, token, requested, outcome, reads_before)
        } else {
            debug!(trip_id = %trip_id, %field, %token, "answer for unknown toggle");
            Resolution::Unknown
        };

        if ledger.is_settled(oldest) {
            self.ledgers.remove(&key);
        }
        resolution
    }

    fn resolve_current(
        ledger: &mut FieldLedger,
        store: &mut TripStore,
        outcome: Result<(), AppError>,
        reads_before: u64,
    ) -> Resolution {
        let Some(mut mutation) = ledger.pending.take() else {
            return Resolution::Unknown;
        };

        match outcome {
            Ok(()) => {
                ledger.record_confirmation(mutation.token, mutation.requested, reads_before);
                mutation.status = MutationStatus::Confirmed;
                info!(
                    trip_id = %mutation.trip_id,
                    field = %mutation.field,
                    value = mutation.requested,
                    "toggle confirmed"
                );
                Resolution::Confirmed(mutation)
            }
            Err(cause) => {
                store.apply_field_update(mutation.trip_id, mutation.field, mutation.baseline);
                mutation.status = MutationStatus::RolledBack;
                warn!(
                    trip_id = %mutation.trip_id,
                    field = %mutation.field,
                    restored = mutation.baseline,
                    error = %cause,
                    "toggle rolled back"
                );
                let error = MutationError::Toggle {
                    trip_id: mutation.trip_id,
                    field: mutation.field,
                    cause,
                };
                Resolution::RolledBack { mutation, error }
            }
        }
    }

    fn resolve_superseded(
        ledger: &mut FieldLedger,
        store: &mut TripStore,
        (trip_id, field): FieldKey,
        token: MutationToken,
        requested: bool,
        outcome: Result<(), AppError>,
        reads_before: u64,
    ) -> Resolution {
        match outcome {
            Ok(()) => {
                if !ledger.record_confirmation(token, requested, reads_before) {
                    return Resolution::Superseded { applied: false };
                }
                match ledger.pending.as_mut() {
                    Some(current) => {
                        current.baseline = requested;
                        Resolution::Superseded { applied: false }
                    }
                    None => {
                        // Everything newer was rolled back; this is now the
                        // freshest server state.
                        store.apply_field_update(trip_id, field, requested);
                        Resolution::Superseded { applied: true }
                    }
                }
            }
            Err(e) => {
                debug!(trip_id = %trip_id, %field, %token, error = %e, "superseded toggle failed");
                Resolution::Superseded { applied: false }
            }
        }
    }

    /// Puts local knowledge back on top of what `read` just wrote into the
    /// store: every pending value, and every confirmation `read` was issued
    /// too early to see.
    pub fn reconcile(&self, store: &mut TripStore, read: ReadId) {
        for (&(trip_id, field), ledger) in &self.ledgers {
            if let Some(mutation) = &ledger.pending {
                store.apply_field_update(trip_id, field, mutation.requested);
            } else if let Some(confirmed) = ledger.confirmed {
                if read.0 <= confirmed.reads_before {
                    debug!(
                        trip_id = %trip_id,
                        %field,
                        %read,
                        token = %confirmed.token,
                        "restoring confirmed value over an older read"
                    );
                    store.apply_field_update(trip_id, field, confirmed.value);
                }
            }
        }
    }

    #[must_use]
    pub fn pending(&self, trip_id: TripId, field: TripField) -> Option<&PendingMutation> {
        self.ledgers
            .get(&(trip_id, field))
            .and_then(|l| l.pending.as_ref())
    }

    #[must_use]
    pub fn is_pending(&self, trip_id: TripId, field: TripField) -> bool {
        self.pending(trip_id, field).is_some()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.ledgers.values().filter(|l| l.pending.is_some()).count()
    }

    /// Drops all bookkeeping for a trip that no longer exists.
    pub fn forget_trip(&mut self, trip_id: TripId) {
        self.ledgers.retain(|(id, _), _| *id != trip_id);
    }
}
