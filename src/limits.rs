//! Upper bounds on caller input, enforced before any lock is taken.

pub const MAX_ROOMS: usize = 100_000;
pub const MAX_RESERVATIONS_PER_ROOM: usize = 100_000;
/// Longest single stay, in nights.
pub const MAX_STAY_DAYS: i64 = 3_660;
pub const MAX_REQUESTERS_PER_QUERY: usize = 10_000;
pub const MAX_NAME_LEN: usize = 256;
