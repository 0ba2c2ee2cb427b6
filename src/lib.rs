pub mod cli;
pub mod config;
pub mod engine;
pub mod limits;
pub mod locks;
pub mod model;
pub mod observability;
pub mod store;
pub mod wal;

pub use engine::{EngineError, ErrorKind, MakeReservation, ReservationQuery, ReservationService};
pub use locks::{KeyedLocks, RoomLocks};
pub use model::{DateRange, Day, Reservation, RoomInfo};
pub use store::{DurableStore, InMemoryStore, ReservationStore};
