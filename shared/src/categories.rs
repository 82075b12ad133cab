use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppError, ErrorKind, ValidationError};
use crate::sequence::{SequenceGuard, Ticket};
use crate::trip::Trip;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRecord {
    #[serde(alias = "name")]
    pub nome: String,
}

pub fn parse_category_list(body: &[u8]) -> Result<Vec<String>, serde_json::Error> {
    let records: Vec<CategoryRecord> = serde_json::from_slice(body)?;
    Ok(records.into_iter().map(|r| r.nome).collect())
}

/// Local mirror of the server's category list, kept in ascending order.
#[derive(Debug, Default)]
pub struct CategoryRegistry {
    names: Vec<String>,
    loaded: bool,
    guard: SequenceGuard,
    pending_adds: HashSet<String>,
    pending_removes: HashSet<String>,
}

impl CategoryRegistry {
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.binary_search_by(|n| n.as_str().cmp(name)).is_ok()
    }

    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.guard.in_flight()
    }

    #[must_use]
    pub fn is_busy(&self, name: &str) -> bool {
        self.pending_adds.contains(name) || self.pending_removes.contains(name)
    }

    /// Issues a list ticket unless the cached list can be served.
    pub fn begin_list(&mut self, force: bool) -> Option<Ticket> {
        if !force && (self.loaded || self.guard.in_flight()) {
            return None;
        }
        Some(self.guard.issue())
    }

    pub fn apply_list(&mut self, ticket: Ticket, mut names: Vec<String>) -> bool {
        if !self.guard.settle(ticket) {
            debug!(%ticket, "discarding stale category list");
            return false;
        }
        names.sort();
        names.dedup();
        self.names = names;
        self.loaded = true;
        true
    }

    /// The cached list is kept as it was.
    pub fn fail_list(&mut self, ticket: Ticket) -> bool {
        self.guard.settle(ticket)
    }

    /// Checks a new name before any request. `Ok(None)` means an identical add
    /// is already in flight.
    pub fn begin_add(&mut self, raw: &str) -> Result<Option<String>, AppError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyCategoryName.into());
        }
        if self.contains(name) {
            return Err(Self::duplicate(name));
        }
        if !self.pending_adds.insert(name.to_string()) {
            return Ok(None);
        }
        Ok(Some(name.to_string()))
    }

    pub fn complete_add(&mut self, name: &str, result: Result<(), AppError>) -> Result<(), AppError> {
        self.pending_adds.remove(name);
        match result {
            Ok(()) => {
                self.insert_sorted(name.to_string());
                info!(category = name, "category added");
                Ok(())
            }
            Err(e) if e.kind == ErrorKind::Conflict || e.http_status() == Some(409) => {
                Err(Self::duplicate(name).with_internal(e.to_string()))
            }
            Err(e) => Err(e.with_context("category", name)),
        }
    }

    /// Whether a trip category must be registered on the server first.
    #[must_use]
    pub fn needs_registration(&self, name: &str) -> bool {
        let name = name.trim();
        !name.is_empty() && !self.contains(name) && !self.pending_adds.contains(name)
    }

    /// Refuses locally when a known trip still uses the category.
    pub fn begin_remove(&mut self, raw: &str, trips: &[Trip]) -> Result<Option<String>, AppError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyCategoryName.into());
        }
        let users = trips.iter().filter(|t| t.category == name).count();
        if users > 0 {
            return Err(Self::in_use(name).with_context("trips", users.to_string()));
        }
        if !self.pending_removes.insert(name.to_string()) {
            return Ok(None);
        }
        Ok(Some(name.to_string()))
    }

    pub fn complete_remove(
        &mut self,
        name: &str,
        result: Result<(), AppError>,
    ) -> Result<(), AppError> {
        self.pending_removes.remove(name);
        match result {
            Ok(()) => {
                self.names.retain(|n| n != name);
                info!(category = name, "category removed");
                Ok(())
            }
            Err(e) if matches!(e.http_status(), Some(409 | 422)) => {
                Err(Self::in_use(name).with_internal(e.to_string()))
            }
            Err(e) if e.kind == ErrorKind::NotFound => {
                self.names.retain(|n| n != name);
                Err(e.with_context("category", name))
            }
            Err(e) => Err(e.with_context("category", name)),
        }
    }

    fn insert_sorted(&mut self, name: String) {
        if let Err(index) = self.names.binary_search(&name) {
            self.names.insert(index, name);
        }
    }

    fn duplicate(name: &str) -> AppError {
        AppError::new(ErrorKind::Conflict, format!("Category '{name}' already exists"))
            .with_context("category", name)
    }

    fn in_use(name: &str) -> AppError {
        AppError::new(
            ErrorKind::ReferentialIntegrity,
            format!("Category '{name}' is used by a trip"),
        )
        .with_context("category", name)
    }
}
