//! Nonce generation and anti-replay bookkeeping.
//!
//! Every nonce value gets a single window of acceptance: the first time it
//! is seen a record is stored with an expiry, and any later use before that
//! expiry is a replay.

use crate::config::Clock;
use crate::error::RepositoryError;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A nonce value and the instant its record stops protecting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonce {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Nonce {
    /// Creates a nonce record.
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Nonce {
            value: value.into(),
            expires_at,
        }
    }

    /// The opaque value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Expiry instant.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the record expired strictly before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Outcome of presenting a nonce value to a [NonceRepository].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceClaim {
    /// Never seen before; a record has been stored.
    Fresh,
    /// Seen before but the record expired; the record is left untouched.
    Expired,
    /// Seen before and still protected.
    Replayed,
}

/// Storage of seen nonces, owned outside the crate.
///
/// # Concurrency
///
/// Two concurrent validations presenting the same value must never both
/// get [NonceClaim::Fresh]. The provided [NonceRepository::claim] runs
/// `find` then `save` without any synchronization, which is only sound for
/// single threaded use. Stores shared between threads must override `claim`
/// with an operation atomic per value, such as a unique constraint insert or
/// a compare-and-swap.
pub trait NonceRepository: Send + Sync {
    /// Finds the record of `value`.
    fn find(&self, value: &str) -> Result<Option<Nonce>, RepositoryError>;

    /// Stores `nonce`, replacing any record with the same value.
    fn save(&self, nonce: Nonce) -> Result<(), RepositoryError>;

    /// Records a use of `nonce.value()` observed at `now`.
    fn claim(&self, nonce: Nonce, now: DateTime<Utc>) -> Result<NonceClaim, RepositoryError> {
        match self.find(nonce.value())? {
            Some(existing) if existing.is_expired(now) => Ok(NonceClaim::Expired),
            Some(_) => Ok(NonceClaim::Replayed),
            None => {
                self.save(nonce)?;
                Ok(NonceClaim::Fresh)
            }
        }
    }
}

/// [NonceRepository] kept in process memory, atomic per nonce value.
#[derive(Debug, Default)]
pub struct InMemoryNonceRepository {
    nonces: DashMap<String, Nonce>,
}

impl InMemoryNonceRepository {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.nonces.len()
    }

    /// Whether no record is stored.
    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }

    /// Drops every record expired before `now`.
    ///
    /// Without purging the store grows with every distinct nonce seen. A
    /// purged value is unknown again: its next use is claimed as
    /// [NonceClaim::Fresh] instead of [NonceClaim::Expired].
    pub fn purge_expired(&self, now: DateTime<Utc>) {
        self.nonces.retain(|_, nonce| !nonce.is_expired(now));
    }
}

impl NonceRepository for InMemoryNonceRepository {
    fn find(&self, value: &str) -> Result<Option<Nonce>, RepositoryError> {
        Ok(self.nonces.get(value).map(|entry| entry.value().clone()))
    }

    fn save(&self, nonce: Nonce) -> Result<(), RepositoryError> {
        self.nonces.insert(nonce.value.clone(), nonce);
        Ok(())
    }

    fn claim(&self, nonce: Nonce, now: DateTime<Utc>) -> Result<NonceClaim, RepositoryError> {
        // the shard lock is held for the whole entry match
        match self.nonces.entry(nonce.value.clone()) {
            Entry::Occupied(existing) if existing.get().is_expired(now) => Ok(NonceClaim::Expired),
            Entry::Occupied(_) => Ok(NonceClaim::Replayed),
            Entry::Vacant(slot) => {
                slot.insert(nonce);
                Ok(NonceClaim::Fresh)
            }
        }
    }
}

/// Mints fresh nonces.
pub trait NonceGenerator: Send + Sync {
    /// Returns a nonce whose value was never returned before.
    fn generate(&self) -> Nonce;
}

/// [NonceGenerator] producing random UUID v4 values.
#[derive(Clone)]
pub struct UuidNonceGenerator {
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl UuidNonceGenerator {
    /// Creates a generator whose nonces expire `ttl` after minting.
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        UuidNonceGenerator { ttl, clock }
    }
}

impl NonceGenerator for UuidNonceGenerator {
    fn generate(&self) -> Nonce {
        Nonce::new(Uuid::new_v4().to_string(), self.clock.now() + self.ttl)
    }
}
