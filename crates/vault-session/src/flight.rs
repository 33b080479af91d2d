//! Per-key single-flight registry.
//!
//! At most one operation per key is in flight. Starting an operation spawns it
//! onto the runtime, so it runs to completion even if every waiter goes away,
//! and hands back a [`Shared`] handle that any number of callers can await for
//! the same outcome.
//!
//! The registry itself is not synchronised. The cache keeps it behind the same
//! lock as its entries, so checking for a flight and registering a new one is a
//! single atomic step.

use std::collections::HashMap;
use std::future::Future;

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::error::{Error, Result};

/// Handle to an in-flight operation. Cheap to clone, awaitable many times.
pub type Flight<V> = Shared<BoxFuture<'static, Result<V>>>;

/// Identifies one started operation so that only it can clear its own slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Registry mapping keys to their in-progress operation.
pub struct SingleFlight<V> {
    flights: HashMap<String, (Ticket, Flight<V>)>,
    next_ticket: u64,
}

impl<V> Default for SingleFlight<V> {
    fn default() -> Self {
        Self {
            flights: HashMap::new(),
            next_ticket: 0,
        }
    }
}

impl<V> SingleFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the operation in flight for `key`, if any.
    pub fn get(&self, key: &str) -> Option<Flight<V>> {
        self.flights.get(key).map(|(_, flight)| flight.clone())
    }

    /// Whether an operation is in flight for `key`.
    pub fn is_flying(&self, key: &str) -> bool {
        self.flights.contains_key(key)
    }

    /// Number of operations in flight.
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    /// Whether nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }

    /// Join the operation in flight for `key`, or start one.
    ///
    /// `start` is only called when nothing is in flight; it receives the
    /// [`Ticket`] the new operation must pass to [`SingleFlight::finish`].
    /// Returns the handle and whether a new operation was started.
    pub fn join_or_start<F, Fut>(&mut self, key: &str, start: F) -> (Flight<V>, bool)
    where
        F: FnOnce(Ticket) -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        if let Some(flight) = self.get(key) {
            return (flight, false);
        }

        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;

        let handle = tokio::spawn(start(ticket));
        let flight = async move {
            handle
                .await
                .unwrap_or_else(|e| Err(Error::ConnectionFailed(format!("session task failed: {e}"))))
        }
        .boxed()
        .shared();

        self.flights
            .insert(key.to_string(), (ticket, flight.clone()));
        (flight, true)
    }

    /// Clear the slot for `key` if it still belongs to `ticket`.
    pub fn finish(&mut self, key: &str, ticket: Ticket) -> bool {
        match self.flights.get(key) {
            Some((current, _)) if *current == ticket => {
                self.flights.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Handles for every operation in flight.
    pub fn all(&self) -> Vec<Flight<V>> {
        self.flights.values().map(|(_, f)| f.clone()).collect()
    }
}
