use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use super::{Association, AssociationType};
use crate::helpers::{generate_alphanumeric, now};
use crate::types::{codes, ErrorKind, OpenIdError, OpenIdReturnType};

/// Attempts at finding an unused handle before [ServerAssociationStore::generate] gives up
pub const HANDLE_GENERATION_ATTEMPTS: usize = 5;

/// # ServerAssociationStore
/// Provider side association storage, keyed by handle.
///
/// Implementations must never return an expired association from `load` and must make
/// `insert_if_absent` atomic per handle.
pub trait ServerAssociationStore: Send + Sync {
    /// Stores `association` unless its handle is taken. Returns `false` when the handle exists.
    fn insert_if_absent(&self, association: Association) -> bool;

    /// The association with `handle`, if it exists and has not expired
    fn load(&self, handle: &str) -> Option<Association>;

    /// Removes the association with `handle`. Returns whether it existed.
    fn remove(&self, handle: &str) -> bool;

    /// Creates and stores a new association with a unique random handle.
    ///
    /// A handle collision is retried up to [HANDLE_GENERATION_ATTEMPTS] times, then reported as
    /// an error. An existing association is never overwritten.
    fn generate(
        &self,
        assoc_type: AssociationType,
        lifetime: i64,
    ) -> OpenIdReturnType<Association> {
        for attempt in 1..=HANDLE_GENERATION_ATTEMPTS {
            let handle = format!("{}-{}", now(), generate_alphanumeric(16));
            let association = Association::generate(assoc_type, handle, lifetime);

            if self.insert_if_absent(association.clone()) {
                return Ok(association);
            }

            debug!(attempt, "association handle collision");
        }

        Err(Box::new(OpenIdError::new_association_error(
            ErrorKind::Protocol,
            codes::HANDLE_COLLISION,
            format!("no unique handle after {HANDLE_GENERATION_ATTEMPTS} attempts"),
        )))
    }
}

/// # ConsumerAssociationStore
/// Relying party side association storage, keyed by provider endpoint and handle.
pub trait ConsumerAssociationStore: Send + Sync {
    /// Stores `association` for `op_url`, replacing one with the same handle
    fn save(&self, op_url: &str, association: Association);

    /// The unexpired association of `op_url` with `handle`
    fn load(&self, op_url: &str, handle: &str) -> Option<Association>;

    /// The unexpired association of `op_url` that lives longest
    fn load_latest(&self, op_url: &str) -> Option<Association>;

    /// Removes the association of `op_url` with `handle`
    fn remove(&self, op_url: &str, handle: &str);
}

/// # InMemoryServerAssociationStore
/// Mutex guarded map. Expired associations are swept on every mutating call.
pub struct InMemoryServerAssociationStore {
    associations: Mutex<HashMap<String, Association>>,
    now: fn() -> i64,
}

impl InMemoryServerAssociationStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::with_clock(now)
    }

    /// Creates an empty store that reads time from `now`
    pub fn with_clock(now: fn() -> i64) -> Self {
        Self {
            associations: Mutex::new(HashMap::new()),
            now,
        }
    }

    /// Number of stored (possibly expired) associations
    pub fn len(&self) -> usize {
        self.associations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Checks if the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryServerAssociationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerAssociationStore for InMemoryServerAssociationStore {
    fn insert_if_absent(&self, association: Association) -> bool {
        let at = (self.now)();
        let mut associations = self
            .associations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        associations.retain(|_, a| !a.has_expired_at(at));

        if associations.contains_key(association.handle()) {
            return false;
        }

        associations.insert(association.handle().to_string(), association);
        true
    }

    fn load(&self, handle: &str) -> Option<Association> {
        let at = (self.now)();

        self.associations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .filter(|a| !a.has_expired_at(at))
            .cloned()
    }

    fn remove(&self, handle: &str) -> bool {
        let at = (self.now)();
        let mut associations = self
            .associations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let removed = associations.remove(handle).is_some();
        associations.retain(|_, a| !a.has_expired_at(at));
        removed
    }
}

impl Debug for InMemoryServerAssociationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryServerAssociationStore")
            .field("associations", &self.len())
            .finish()
    }
}

/// # InMemoryConsumerAssociationStore
/// Mutex guarded map of provider url to its associations.
pub struct InMemoryConsumerAssociationStore {
    associations: Mutex<HashMap<String, HashMap<String, Association>>>,
    now: fn() -> i64,
}

impl InMemoryConsumerAssociationStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::with_clock(now)
    }

    /// Creates an empty store that reads time from `now`
    pub fn with_clock(now: fn() -> i64) -> Self {
        Self {
            associations: Mutex::new(HashMap::new()),
            now,
        }
    }
}

impl Default for InMemoryConsumerAssociationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsumerAssociationStore for InMemoryConsumerAssociationStore {
    fn save(&self, op_url: &str, association: Association) {
        let at = (self.now)();
        let mut associations = self
            .associations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        associations
            .entry(op_url.to_string())
            .or_default()
            .insert(association.handle().to_string(), association);

        associations.retain(|_, by_handle| {
            by_handle.retain(|_, a| !a.has_expired_at(at));
            !by_handle.is_empty()
        });
    }

    fn load(&self, op_url: &str, handle: &str) -> Option<Association> {
        let at = (self.now)();

        self.associations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(op_url)
            .and_then(|by_handle| by_handle.get(handle))
            .filter(|a| !a.has_expired_at(at))
            .cloned()
    }

    fn load_latest(&self, op_url: &str) -> Option<Association> {
        let at = (self.now)();

        self.associations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(op_url)?
            .values()
            .filter(|a| !a.has_expired_at(at))
            .max_by_key(|a| a.expiry())
            .cloned()
    }

    fn remove(&self, op_url: &str, handle: &str) {
        let mut associations = self
            .associations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(by_handle) = associations.get_mut(op_url) {
            by_handle.remove(handle);
            if by_handle.is_empty() {
                associations.remove(op_url);
            }
        }
    }
}

impl Debug for InMemoryConsumerAssociationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryConsumerAssociationStore")
            .finish_non_exhaustive()
    }
}
