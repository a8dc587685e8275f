//! Session tables with cancellable expiry timers.
//!
//! Each record may carry one armed timer. Timers are tagged with a generation
//! number: a timer only reaps the slot if the slot still holds that exact
//! generation, so a replaced or already-removed record is never touched by a
//! stale timer. Every removal path cancels the slot's timer.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::session::RecordingSession;
use super::types::StreamReservation;
use crate::{Error, Result};

/// Which table a record lives in; decides how expiry is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Recordings,
    Reservations,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recordings => f.write_str("recordings"),
            Self::Reservations => f.write_str("reservations"),
        }
    }
}

struct ArmedTimer {
    generation: u64,
    cancel: CancellationToken,
}

struct Slot<V> {
    value: V,
    timer: Option<ArmedTimer>,
}

impl<V> Slot<V> {
    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel.cancel();
        }
    }
}

struct TableInner<V> {
    kind: TableKind,
    slots: DashMap<String, Slot<V>>,
    next_generation: AtomicU64,
}

impl<V> TableInner<V> {
    fn expire(&self, id: &str, generation: u64) {
        let removed = self.slots.remove_if(id, |_, slot| {
            slot.timer
                .as_ref()
                .is_some_and(|t| t.generation == generation)
        });
        if removed.is_some() {
            match self.kind {
                TableKind::Recordings => {
                    info!(video_id = %id, "Automatically cleaned up finished recording session")
                }
                TableKind::Reservations => debug!(video_id = %id, "Stream reservation expired"),
            }
        }
    }
}

/// A keyed table whose records can expire.
pub struct TimedTable<V> {
    inner: Arc<TableInner<V>>,
}

impl<V> Clone for TimedTable<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> TimedTable<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(kind: TableKind) -> Self {
        Self {
            inner: Arc::new(TableInner {
                kind,
                slots: DashMap::new(),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn kind(&self) -> TableKind {
        self.inner.kind
    }

    /// Insert a record, replacing (and disarming) any previous one under `id`.
    pub fn insert(&self, id: impl Into<String>, value: V, timeout: Option<Duration>) {
        let id = id.into();
        let previous = self.inner.slots.insert(id.clone(), Slot { value, timer: None });
        if let Some(mut previous) = previous {
            previous.disarm();
        }
        if let Some(timeout) = timeout {
            self.arm(&id, timeout);
        }
    }

    pub fn get(&self, id: &str) -> Option<V> {
        self.inner.slots.get(id).map(|slot| slot.value.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.slots.contains_key(id)
    }

    /// Remove a record and cancel its timer. Absent ids are a no-op.
    pub fn remove(&self, id: &str) -> Option<V> {
        self.remove_if(id, |_| true)
    }

    /// Remove a record only if `pred` holds for it, atomically with the check.
    pub fn remove_if(&self, id: &str, pred: impl FnOnce(&V) -> bool) -> Option<V> {
        self.inner
            .slots
            .remove_if(id, |_, slot| pred(&slot.value))
            .map(|(_, mut slot)| {
                slot.disarm();
                slot.value
            })
    }

    /// Arm (or re-arm) the expiry timer of an existing record.
    ///
    /// Returns `false` if `id` is absent; no timer is created in that case.
    pub fn arm(&self, id: &str, timeout: Duration) -> bool {
        self.arm_if(id, timeout, |_| true)
    }

    /// Arm the timer only if the record under `id` satisfies `pred`.
    pub fn arm_if(&self, id: &str, timeout: Duration, pred: impl FnOnce(&V) -> bool) -> bool {
        let Some(mut slot) = self.inner.slots.get_mut(id) else {
            return false;
        };
        if !pred(&slot.value) {
            return false;
        }
        slot.disarm();
        slot.timer = Some(self.spawn_timer(id.to_string(), timeout));
        true
    }

    /// Cancel the timer of a record without removing it.
    pub fn disarm(&self, id: &str) {
        if let Some(mut slot) = self.inner.slots.get_mut(id) {
            slot.disarm();
        }
    }

    pub fn is_armed(&self, id: &str) -> bool {
        self.inner
            .slots
            .get(id)
            .is_some_and(|slot| slot.timer.is_some())
    }

    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.is_empty()
    }

    /// Snapshot of every record currently in the table.
    pub fn values(&self) -> Vec<V> {
        self.inner
            .slots
            .iter()
            .map(|entry| entry.value().value.clone())
            .collect()
    }

    fn spawn_timer(&self, id: String, timeout: Duration) -> ArmedTimer {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let inner: Weak<TableInner<V>> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Some(inner) = inner.upgrade() {
                        inner.expire(&id, generation);
                    }
                }
            }
        });

        ArmedTimer { generation, cancel }
    }
}

/// The two session tables owned by the lifecycle manager.
#[derive(Clone)]
pub struct SessionStore {
    recordings: TimedTable<Arc<RecordingSession>>,
    reservations: TimedTable<StreamReservation>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            recordings: TimedTable::new(TableKind::Recordings),
            reservations: TimedTable::new(TableKind::Reservations),
        }
    }

    pub fn recordings(&self) -> &TimedTable<Arc<RecordingSession>> {
        &self.recordings
    }

    pub fn reservations(&self) -> &TimedTable<StreamReservation> {
        &self.reservations
    }

    /// Flip a reservation to consumed and return it, in one step.
    ///
    /// The record stays in the table (as consumed) until the caller removes it
    /// or its timer fires; concurrent callers observe `AlreadyConsumed`.
    pub fn consume_once(&self, id: &str) -> Result<StreamReservation> {
        match self.reservations.inner.slots.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                let reservation = &mut entry.get_mut().value;
                if reservation.consumed {
                    Err(Error::already_consumed(id))
                } else {
                    reservation.consumed = true;
                    Ok(reservation.clone())
                }
            }
            Entry::Vacant(_) => Err(Error::not_found(id)),
        }
    }
}
