use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

/// Calendar day, the only time type.
pub type Day = NaiveDate;

/// Half-open range of days `[from, until)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Day,
    pub until: Day,
}

impl DateRange {
    pub fn new(from: Day, until: Day) -> Result<Self, EngineError> {
        if from >= until {
            return Err(EngineError::InvalidInterval { from, until });
        }
        Ok(Self { from, until })
    }

    /// Number of nights covered.
    pub fn nights(&self) -> i64 {
        (self.until - self.from).num_days()
    }

    /// Touching endpoints do not overlap: `[a, b)` and `[b, c)` are disjoint.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.from < other.until && other.from < self.until
    }

    pub fn contains(&self, day: Day) -> bool {
        self.from <= day && day < self.until
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_range(&self, other: &DateRange) -> bool {
        self.from <= other.from && other.until <= self.until
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.from, self.until)
    }
}

/// A committed grant of one room to one requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub room_id: Ulid,
    pub requester_id: Ulid,
    pub range: DateRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: Ulid,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub name: Option<String>,
    /// Committed reservations, sorted by `range.from`.
    pub reservations: Vec<Reservation>,
}

impl RoomState {
    pub fn new(id: Ulid, name: Option<String>) -> Self {
        Self {
            id,
            name,
            reservations: Vec::new(),
        }
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id,
            name: self.name.clone(),
        }
    }

    /// Insert reservation maintaining sort order by `range.from`.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.range.from, |r| r.range.from)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    /// Return only reservations whose range overlaps the query window.
    /// Uses binary search to skip reservations starting at or after `query.until`.
    pub fn overlapping(&self, query: &DateRange) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.range.from < query.until);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.range.until > query.from)
    }

    pub fn is_free(&self, query: &DateRange) -> bool {
        self.overlapping(query).next().is_none()
    }

    pub fn occupied_by(&self, day: Day, requester_id: Ulid) -> bool {
        let right_bound = self.reservations.partition_point(|r| r.range.from <= day);
        self.reservations[..right_bound]
            .iter()
            .any(|r| r.requester_id == requester_id && r.range.contains(day))
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomRegistered {
        id: Ulid,
        name: Option<String>,
    },
    ReservationMade {
        id: Ulid,
        room_id: Ulid,
        requester_id: Ulid,
        range: DateRange,
    },
}

impl From<&Reservation> for Event {
    fn from(r: &Reservation) -> Self {
        Event::ReservationMade {
            id: r.id,
            room_id: r.room_id,
            requester_id: r.requester_id,
            range: r.range,
        }
    }
}
