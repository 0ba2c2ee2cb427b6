use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::engine::EngineError;
use crate::limits::*;
use crate::model::*;

use super::ReservationStore;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

pub struct InMemoryStore {
    rooms: DashMap<Ulid, SharedRoomState>,
    /// Reverse lookup: reservation id → room id. Doubles as the uniqueness index.
    reservation_rooms: DashMap<Ulid, Ulid>,
    requester_counts: DashMap<Ulid, usize>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            reservation_rooms: DashMap::new(),
            requester_counts: DashMap::new(),
        }
    }

    /// Rebuild state from a replayed event log. Events naming an unknown room,
    /// reusing a reservation id, or overlapping an earlier reservation are
    /// skipped.
    pub fn from_events(events: &[Event]) -> Self {
        let mut rooms: HashMap<Ulid, RoomState> = HashMap::new();
        let store = Self::new();

        for event in events {
            match event {
                Event::RoomRegistered { id, name } => {
                    rooms
                        .entry(*id)
                        .or_insert_with(|| RoomState::new(*id, name.clone()));
                }
                Event::ReservationMade {
                    id,
                    room_id,
                    requester_id,
                    range,
                } => {
                    let Some(rs) = rooms.get_mut(room_id) else {
                        continue;
                    };
                    if !rs.is_free(range) {
                        continue;
                    }
                    if store.claim_id(*id, *room_id).is_err() {
                        continue;
                    }
                    store.commit(
                        rs,
                        Reservation {
                            id: *id,
                            room_id: *room_id,
                            requester_id: *requester_id,
                            range: *range,
                        },
                    );
                }
            }
        }

        for (id, rs) in rooms {
            store.rooms.insert(id, Arc::new(RwLock::new(rs)));
        }
        store
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn reservation_count(&self) -> usize {
        self.reservation_rooms.len()
    }

    // ── Building blocks shared with the durable store ────────

    pub(super) fn check_new_room(&self, room: &RoomInfo) -> Result<(), EngineError> {
        if let Some(ref n) = room.name
            && n.len() > MAX_NAME_LEN
        {
            return Err(EngineError::LimitExceeded("room name too long"));
        }
        if self.rooms.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if self.rooms.contains_key(&room.id) {
            return Err(EngineError::AlreadyExists(room.id));
        }
        Ok(())
    }

    pub(super) fn add_room(&self, room: RoomInfo) -> Result<(), EngineError> {
        match self.rooms.entry(room.id) {
            Entry::Occupied(_) => Err(EngineError::AlreadyExists(room.id)),
            Entry::Vacant(v) => {
                v.insert(Arc::new(RwLock::new(RoomState::new(room.id, room.name))));
                Ok(())
            }
        }
    }

    pub(super) fn room_or_not_found(&self, room_id: &Ulid) -> Result<SharedRoomState, EngineError> {
        self.get_room(room_id)
            .ok_or(EngineError::RoomNotFound(*room_id))
    }

    /// Last check before a reservation becomes visible, made under the room's
    /// write guard. Admission has already checked overlap under the room
    /// lock; this catches an insert that outlived its caller's lock.
    pub(super) fn check_insert(rs: &RoomState, reservation: &Reservation) -> Result<(), EngineError> {
        if rs.reservations.len() >= MAX_RESERVATIONS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many reservations on room"));
        }
        if !rs.is_free(&reservation.range) {
            return Err(EngineError::RoomNotAvailable(rs.id));
        }
        Ok(())
    }

    /// Reserve `id` in the uniqueness index.
    pub(super) fn claim_id(&self, id: Ulid, room_id: Ulid) -> Result<(), EngineError> {
        match self.reservation_rooms.entry(id) {
            Entry::Occupied(_) => Err(EngineError::DuplicateId(id)),
            Entry::Vacant(v) => {
                v.insert(room_id);
                Ok(())
            }
        }
    }

    pub(super) fn release_id(&self, id: &Ulid) {
        self.reservation_rooms.remove(id);
    }

    /// Make a claimed reservation visible. Caller holds the room's write guard.
    pub(super) fn commit(&self, rs: &mut RoomState, reservation: Reservation) {
        *self
            .requester_counts
            .entry(reservation.requester_id)
            .or_insert(0) += 1;
        rs.insert_reservation(reservation);
    }
}

#[async_trait]
impl ReservationStore for InMemoryStore {
    async fn register_room(&self, room: RoomInfo) -> Result<(), EngineError> {
        self.check_new_room(&room)?;
        self.add_room(room)
    }

    async fn room(&self, room_id: Ulid) -> Option<RoomInfo> {
        let rs = self.get_room(&room_id)?;
        let guard = rs.read().await;
        Some(guard.info())
    }

    fn room_count(&self) -> usize {
        self.rooms.len()
    }

    async fn has_overlap(&self, room_id: Ulid, range: &DateRange) -> Result<bool, EngineError> {
        let rs = self.room_or_not_found(&room_id)?;
        let guard = rs.read().await;
        Ok(!guard.is_free(range))
    }

    async fn insert(&self, reservation: Reservation) -> Result<(), EngineError> {
        let rs = self.room_or_not_found(&reservation.room_id)?;
        let mut guard = rs.write().await;
        Self::check_insert(&guard, &reservation)?;
        self.claim_id(reservation.id, reservation.room_id)?;
        self.commit(&mut guard, reservation);
        Ok(())
    }

    async fn is_occupied_at(
        &self,
        room_id: Ulid,
        at: Day,
        requester_id: Ulid,
    ) -> Result<bool, EngineError> {
        let Some(rs) = self.get_room(&room_id) else {
            return Ok(false);
        };
        let guard = rs.read().await;
        Ok(guard.occupied_by(at, requester_id))
    }

    async fn count_by_requesters(&self, requester_ids: &HashSet<Ulid>) -> Result<usize, EngineError> {
        Ok(requester_ids
            .iter()
            .map(|id| self.requester_counts.get(id).map_or(0, |c| *c.value()))
            .sum())
    }

    async fn reservations_for_room(&self, room_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        let rs = self.room_or_not_found(&room_id)?;
        let guard = rs.read().await;
        Ok(guard.reservations.clone())
    }
}
