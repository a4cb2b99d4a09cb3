//! Named collections of live broker resources.
//!
//! The registry is pure storage: five ordered collections of (name, handle)
//! pairs, one per resource kind, owned by exactly one broker facade. It
//! enforces no name uniqueness and evicts nothing; strategies decide what
//! goes in and when entries are closed. Insertion order is preserved, and
//! the accessors for "the" connection and session deliberately return the
//! last entry so policies that stack multiple entries see the most recent
//! one win.

use crate::transport::{ConnectionHandle, ConsumerHandle, Destination, ProducerHandle, SessionHandle};
use std::sync::RwLock;

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

/// A (name, handle) pair stored in one of the registry collections.
///
/// The empty name is legal and used for singleton resources.
#[derive(Debug, Clone)]
pub struct NamedResource<T> {
    pub name: String,
    pub handle: T,
}

impl<T> NamedResource<T> {
    fn new(name: impl Into<String>, handle: T) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }
}

#[derive(Default)]
struct Collections {
    connections: Vec<NamedResource<ConnectionHandle>>,
    sessions: Vec<NamedResource<SessionHandle>>,
    consumers: Vec<NamedResource<ConsumerHandle>>,
    producers: Vec<NamedResource<ProducerHandle>>,
    destinations: Vec<NamedResource<Destination>>,
}

/// Per-resource-kind entry counts, for logging and assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryCounts {
    pub connections: usize,
    pub sessions: usize,
    pub consumers: usize,
    pub producers: usize,
    pub destinations: usize,
}

/// Ordered, named collections of connections, sessions, consumers,
/// producers, and destinations for one broker instance.
#[derive(Default)]
pub struct ResourceRegistry {
    inner: RwLock<Collections>,
}

impl ResourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all five collections with empty ones
    pub fn reset(&self) {
        let mut inner = self.inner.write().unwrap();
        *inner = Collections::default();
    }

    /// Append a connection entry
    pub fn add_connection(&self, name: impl Into<String>, handle: ConnectionHandle) {
        let mut inner = self.inner.write().unwrap();
        inner.connections.push(NamedResource::new(name, handle));
    }

    /// Snapshot of all connection entries, in insertion order
    pub fn connections(&self) -> Vec<NamedResource<ConnectionHandle>> {
        self.inner
            .read()
            .unwrap()
            .connections
            .clone()
    }

    /// The active connection: the last entry, if any
    pub fn connection(&self) -> Option<ConnectionHandle> {
        self.inner
            .read()
            .unwrap()
            .connections
            .last()
            .map(|entry| entry.handle.clone())
    }

    /// Append a session entry
    pub fn add_session(&self, name: impl Into<String>, handle: SessionHandle) {
        let mut inner = self.inner.write().unwrap();
        inner.sessions.push(NamedResource::new(name, handle));
    }

    /// Snapshot of all session entries, in insertion order
    pub fn sessions(&self) -> Vec<NamedResource<SessionHandle>> {
        self.inner
            .read()
            .unwrap()
            .sessions
            .clone()
    }

    /// The active session: the last entry, if any
    pub fn session(&self) -> Option<SessionHandle> {
        self.inner
            .read()
            .unwrap()
            .sessions
            .last()
            .map(|entry| entry.handle.clone())
    }

    /// Append a consumer entry
    pub fn add_consumer(&self, name: impl Into<String>, handle: ConsumerHandle) {
        let mut inner = self.inner.write().unwrap();
        inner.consumers.push(NamedResource::new(name, handle));
    }

    /// Snapshot of all consumer entries, in insertion order
    pub fn consumers(&self) -> Vec<NamedResource<ConsumerHandle>> {
        self.inner
            .read()
            .unwrap()
            .consumers
            .clone()
    }

    /// Append a producer entry
    pub fn add_producer(&self, name: impl Into<String>, handle: ProducerHandle) {
        let mut inner = self.inner.write().unwrap();
        inner.producers.push(NamedResource::new(name, handle));
    }

    /// Snapshot of all producer entries, in insertion order
    pub fn producers(&self) -> Vec<NamedResource<ProducerHandle>> {
        self.inner
            .read()
            .unwrap()
            .producers
            .clone()
    }

    /// Append a destination entry
    pub fn add_destination(&self, name: impl Into<String>, handle: Destination) {
        let mut inner = self.inner.write().unwrap();
        inner.destinations.push(NamedResource::new(name, handle));
    }

    /// Snapshot of all destination entries, in insertion order
    pub fn destinations(&self) -> Vec<NamedResource<Destination>> {
        self.inner
            .read()
            .unwrap()
            .destinations
            .clone()
    }

    /// Find a destination by exact, case-sensitive name match
    pub fn find_destination(&self, name: &str) -> Option<Destination> {
        self.inner
            .read()
            .unwrap()
            .destinations
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.handle.clone())
    }

    /// Entry counts per resource kind
    pub fn counts(&self) -> RegistryCounts {
        let inner = self.inner.read().unwrap();
        RegistryCounts {
            connections: inner.connections.len(),
            sessions: inner.sessions.len(),
            consumers: inner.consumers.len(),
            producers: inner.producers.len(),
            destinations: inner.destinations.len(),
        }
    }
}
