mod conflict;
mod error;
mod mutations;
mod queries;

pub use error::{EngineError, ErrorKind};

use std::sync::Arc;
use std::time::{Duration, Instant};

use ulid::Ulid;

use crate::locks::{KeyedLocks, RoomLocks};
use crate::model::Day;
use crate::store::ReservationStore;

use conflict::with_deadline;

/// Request to occupy `room_id` for `[from, until)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MakeReservation {
    pub room_id: Ulid,
    pub requester_id: Ulid,
    pub from: Day,
    pub until: Day,
}

impl MakeReservation {
    pub fn new(room_id: Ulid, requester_id: Ulid, from: Day, until: Day) -> Self {
        Self {
            room_id,
            requester_id,
            from,
            until,
        }
    }
}

/// Does `requester_id` hold `room_id` on day `at`?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationQuery {
    pub room_id: Ulid,
    pub requester_id: Ulid,
    pub at: Day,
}

impl ReservationQuery {
    pub fn new(room_id: Ulid, requester_id: Ulid, at: Day) -> Self {
        Self {
            room_id,
            requester_id,
            at,
        }
    }
}

/// Admits or rejects reservations.
///
/// Each admission holds the room's exclusive lock across the overlap check
/// and the insert, so for one room admissions are totally ordered and each
/// one sees every earlier commit. Different rooms never wait on each other.
pub struct ReservationService<S, L = KeyedLocks> {
    store: Arc<S>,
    locks: L,
    /// `None` waits for the room lock indefinitely.
    lock_timeout: Option<Duration>,
}

impl<S: ReservationStore> ReservationService<S, KeyedLocks> {
    pub fn with_store(store: Arc<S>) -> Self {
        Self::new(store, KeyedLocks::new())
    }
}

impl<S: ReservationStore, L: RoomLocks> ReservationService<S, L> {
    pub fn new(store: Arc<S>, locks: L) -> Self {
        Self {
            store,
            locks,
            lock_timeout: None,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn locks(&self) -> &L {
        &self.locks
    }

    /// Rooms are never removed, so a room seen here is still there once its
    /// lock is held. Checking first keeps unknown ids out of the lock table.
    async fn ensure_room(&self, room_id: Ulid) -> Result<(), EngineError> {
        match self.store.room(room_id).await {
            Some(_) => Ok(()),
            None => Err(EngineError::RoomNotFound(room_id)),
        }
    }

    async fn lock_exclusive(&self, room_id: Ulid) -> Result<L::Guard, EngineError> {
        let wait = Instant::now();
        let guard = with_deadline(
            self.lock_timeout,
            room_id,
            self.locks.acquire_exclusive(room_id),
        )
        .await;
        metrics::histogram!(crate::observability::LOCK_WAIT_SECONDS, "mode" => "exclusive")
            .record(wait.elapsed().as_secs_f64());
        guard
    }

    async fn lock_shared(&self, room_id: Ulid) -> Result<L::Guard, EngineError> {
        let wait = Instant::now();
        let guard = with_deadline(
            self.lock_timeout,
            room_id,
            self.locks.acquire_shared(room_id),
        )
        .await;
        metrics::histogram!(crate::observability::LOCK_WAIT_SECONDS, "mode" => "shared")
            .record(wait.elapsed().as_secs_f64());
        guard
    }
}
