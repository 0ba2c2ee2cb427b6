use std::time::Instant;

use tracing::{debug, info};
use ulid::Ulid;

use crate::locks::RoomLocks;
use crate::model::*;
use crate::observability::{self, admission_outcome};
use crate::store::ReservationStore;

use super::conflict::validate_range;
use super::{EngineError, MakeReservation, ReservationService};

impl<S: ReservationStore, L: RoomLocks> ReservationService<S, L> {
    pub async fn register_room(&self, id: Ulid, name: Option<String>) -> Result<(), EngineError> {
        self.store.register_room(RoomInfo { id, name }).await?;
        metrics::gauge!(observability::ROOMS_REGISTERED).set(self.store.room_count() as f64);
        info!(room = %id, "room registered");
        Ok(())
    }

    /// Admit `cmd` or reject it. Returns the new reservation's id.
    ///
    /// `RoomNotAvailable` is a final answer for this interval; the core never
    /// retries it.
    pub async fn make_reservation(&self, cmd: MakeReservation) -> Result<Ulid, EngineError> {
        let start = Instant::now();
        let result = self.admit(cmd).await;
        metrics::counter!(observability::ADMISSIONS_TOTAL, "outcome" => admission_outcome(&result))
            .increment(1);
        metrics::histogram!(observability::ADMISSION_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());
        result
    }

    async fn admit(&self, cmd: MakeReservation) -> Result<Ulid, EngineError> {
        let range = DateRange::new(cmd.from, cmd.until)?;
        validate_range(&range)?;
        self.ensure_room(cmd.room_id).await?;

        let _guard = self.lock_exclusive(cmd.room_id).await?;

        if self.store.has_overlap(cmd.room_id, &range).await? {
            debug!(
                room = %cmd.room_id,
                requester = %cmd.requester_id,
                %range,
                "room not available"
            );
            return Err(EngineError::RoomNotAvailable(cmd.room_id));
        }

        let reservation = Reservation {
            id: Ulid::new(),
            room_id: cmd.room_id,
            requester_id: cmd.requester_id,
            range,
        };
        let id = reservation.id;
        self.store.insert(reservation).await?;

        info!(
            reservation = %id,
            room = %cmd.room_id,
            requester = %cmd.requester_id,
            %range,
            "reservation made"
        );
        Ok(id)
    }
}
