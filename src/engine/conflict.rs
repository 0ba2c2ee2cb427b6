use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use tracing::warn;
use ulid::Ulid;

use crate::limits::*;
use crate::model::DateRange;

use super::EngineError;

pub(crate) fn validate_range(range: &DateRange) -> Result<(), EngineError> {
    if range.nights() > MAX_STAY_DAYS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

pub(crate) fn validate_requesters(requester_ids: &HashSet<Ulid>) -> Result<(), EngineError> {
    if requester_ids.len() > MAX_REQUESTERS_PER_QUERY {
        return Err(EngineError::LimitExceeded("too many requesters in query"));
    }
    Ok(())
}

/// Await a lock acquisition, giving up after `limit` if one is set.
/// Dropping the pending acquisition on timeout leaves nothing held.
pub(crate) async fn with_deadline<G>(
    limit: Option<Duration>,
    room_id: Ulid,
    acquire: impl Future<Output = Result<G, EngineError>>,
) -> Result<G, EngineError> {
    let Some(limit) = limit else {
        return acquire.await;
    };
    match tokio::time::timeout(limit, acquire).await {
        Ok(result) => result,
        Err(_) => {
            warn!(room = %room_id, timeout_ms = limit.as_millis() as u64, "lock wait timed out");
            metrics::counter!(crate::observability::LOCK_TIMEOUTS_TOTAL).increment(1);
            Err(EngineError::LockTimeout(room_id))
        }
    }
}
