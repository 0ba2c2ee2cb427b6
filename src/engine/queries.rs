use std::collections::HashSet;

use ulid::Ulid;

use crate::locks::RoomLocks;
use crate::model::*;
use crate::store::ReservationStore;

use super::conflict::validate_requesters;
use super::{EngineError, ReservationQuery, ReservationService};

impl<S: ReservationStore, L: RoomLocks> ReservationService<S, L> {
    /// Point-in-time read of committed state; takes no lock.
    pub async fn is_reserved(&self, query: ReservationQuery) -> Result<bool, EngineError> {
        self.store
            .is_occupied_at(query.room_id, query.at, query.requester_id)
            .await
    }

    /// Reservations held by any of `requester_ids`, across all rooms. Takes no lock.
    pub async fn reservations_count(&self, requester_ids: &HashSet<Ulid>) -> Result<usize, EngineError> {
        validate_requesters(requester_ids)?;
        self.store.count_by_requesters(requester_ids).await
    }

    pub async fn reservations_count_for(&self, requester_id: Ulid) -> Result<usize, EngineError> {
        self.reservations_count(&HashSet::from([requester_id])).await
    }

    pub async fn room(&self, room_id: Ulid) -> Option<RoomInfo> {
        self.store.room(room_id).await
    }

    /// Every reservation on the room, sorted by start day. Read under the
    /// room's shared lock, so no admission lands halfway through.
    pub async fn room_schedule(&self, room_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        self.ensure_room(room_id).await?;
        let _guard = self.lock_shared(room_id).await?;
        self.store.reservations_for_room(room_id).await
    }
}
