use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::engine::EngineError;

/// Grants access tokens scoped to a single room id.
///
/// Dropping the guard releases the lock, so every exit path gives it back,
/// including a cancelled future. Guards are not reentrant: one
/// logical operation acquires at most one guard per room.
#[async_trait]
pub trait RoomLocks: Send + Sync {
    type Guard: Send;

    /// Suspend until no other holder, shared or exclusive, has `room_id`.
    async fn acquire_exclusive(&self, room_id: Ulid) -> Result<Self::Guard, EngineError>;

    /// Suspend until no exclusive holder has `room_id`.
    async fn acquire_shared(&self, room_id: Ulid) -> Result<Self::Guard, EngineError>;
}

pub enum RoomGuard {
    Exclusive(OwnedRwLockWriteGuard<()>),
    Shared(OwnedRwLockReadGuard<()>),
}

impl RoomGuard {
    pub fn is_exclusive(&self) -> bool {
        matches!(self, RoomGuard::Exclusive(_))
    }
}

/// One async RwLock per room id, created on first use. Rooms never share a
/// lock, so admissions on different rooms never wait on each other.
#[derive(Default)]
pub struct KeyedLocks {
    locks: DashMap<Ulid, Arc<RwLock<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, room_id: Ulid) -> Arc<RwLock<()>> {
        // Clone out of the map before awaiting; a DashMap shard guard must
        // never be held across an await point.
        self.locks.entry(room_id).or_default().clone()
    }

    /// True if some guard on `room_id` is currently outstanding.
    pub fn is_held(&self, room_id: &Ulid) -> bool {
        self.locks
            .get(room_id)
            .is_some_and(|lock| lock.try_write().is_err())
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[async_trait]
impl RoomLocks for KeyedLocks {
    type Guard = RoomGuard;

    async fn acquire_exclusive(&self, room_id: Ulid) -> Result<RoomGuard, EngineError> {
        let lock = self.lock_for(room_id);
        Ok(RoomGuard::Exclusive(lock.write_owned().await))
    }

    async fn acquire_shared(&self, room_id: Ulid) -> Result<RoomGuard, EngineError> {
        let lock = self.lock_for(room_id);
        Ok(RoomGuard::Shared(lock.read_owned().await))
    }
}
