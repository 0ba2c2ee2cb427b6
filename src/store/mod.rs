mod durable;
mod memory;
#[cfg(test)]
mod tests;

pub use durable::DurableStore;
pub use memory::InMemoryStore;

use std::collections::HashSet;

use async_trait::async_trait;
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::{DateRange, Day, Reservation, RoomInfo};

/// Committed reservations, per room.
///
/// `has_overlap` followed by `insert` is only atomic when the caller holds the
/// room's exclusive lock from [`crate::locks::RoomLocks`]; the store itself
/// never serializes admissions.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn register_room(&self, room: RoomInfo) -> Result<(), EngineError>;

    async fn room(&self, room_id: Ulid) -> Option<RoomInfo>;

    fn room_count(&self) -> usize;

    /// True iff any committed reservation on `room_id` overlaps `range`.
    async fn has_overlap(&self, room_id: Ulid, range: &DateRange) -> Result<bool, EngineError>;

    /// Persist a new reservation. Fails with `DuplicateId` if the id is taken
    /// and with `RoomNotAvailable` if it overlaps a committed reservation; on
    /// any failure nothing is committed. Once started, an insert runs to
    /// completion even if the caller's future is dropped.
    async fn insert(&self, reservation: Reservation) -> Result<(), EngineError>;

    /// True iff `requester_id` holds a reservation on `room_id` covering `at`.
    async fn is_occupied_at(
        &self,
        room_id: Ulid,
        at: Day,
        requester_id: Ulid,
    ) -> Result<bool, EngineError>;

    /// Committed reservations held by any of `requester_ids`, across all rooms.
    async fn count_by_requesters(&self, requester_ids: &HashSet<Ulid>) -> Result<usize, EngineError>;

    /// Reservations on a room, sorted by start day.
    async fn reservations_for_room(&self, room_id: Ulid) -> Result<Vec<Reservation>, EngineError>;
}
