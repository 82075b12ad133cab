//! Last-request-wins bookkeeping.
//!
//! Every request whose answer can be overtaken by a newer one is tagged with a
//! [`Ticket`]. Only the most recently issued ticket may settle; answers for
//! older tickets arrive, get logged and are dropped.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ticket(u64);

impl Ticket {
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceGuard {
    issued: u64,
    in_flight: bool,
}

impl SequenceGuard {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            issued: 0,
            in_flight: false,
        }
    }

    pub fn issue(&mut self) -> Ticket {
        self.issued += 1;
        self.in_flight = true;
        Ticket(self.issued)
    }

    #[must_use]
    pub const fn is_current(&self, ticket: Ticket) -> bool {
        self.in_flight && ticket.0 == self.issued
    }

    /// Consumes the answer for `ticket`. Returns `false` when a newer ticket
    /// has been issued since, or the guard was invalidated.
    pub fn settle(&mut self, ticket: Ticket) -> bool {
        if self.is_current(ticket) {
            self.in_flight = false;
            true
        } else {
            false
        }
    }

    /// Every outstanding ticket becomes stale.
    pub fn invalidate(&mut self) {
        self.issued += 1;
        self.in_flight = false;
    }

    #[must_use]
    pub const fn in_flight(&self) -> bool {
        self.in_flight
    }

    #[must_use]
    pub const fn latest(&self) -> Option<Ticket> {
        if self.issued == 0 {
            None
        } else {
            Some(Ticket(self.issued))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_latest_ticket_settles() {
        let mut guard = SequenceGuard::new();
        let first = guard.issue();
        let second = guard.issue();

        assert!(!guard.settle(first));
        assert!(guard.in_flight());
        assert!(guard.settle(second));
        assert!(!guard.in_flight());
    }

    #[test]
    fn test_ticket_settles_once() {
        let mut guard = SequenceGuard::new();
        let ticket = guard.issue();
        assert!(guard.settle(ticket));
        assert!(!guard.settle(ticket));
    }

    #[test]
    fn test_invalidate_drops_outstanding() {
        let mut guard = SequenceGuard::new();
        let ticket = guard.issue();
        guard.invalidate();
        assert!(!guard.in_flight());
        assert!(!guard.is_current(ticket));
        assert!(!guard.settle(ticket));

        let next = guard.issue();
        assert!(next > ticket);
        assert!(guard.settle(next));
    }

    #[test]
    fn test_latest() {
        let mut guard = SequenceGuard::new();
        assert_eq!(guard.latest(), None);
        let ticket = guard.issue();
        assert_eq!(guard.latest(), Some(ticket));
        assert_eq!(ticket.to_string(), "#1");
    }
}
