use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::*;
use crate::observability;
use crate::wal::Wal;

use super::{InMemoryStore, ReservationStore};

const LOG_QUEUE_CAPACITY: usize = 4096;
const MAX_BATCH: usize = 512;

struct PendingAppend {
    event: Event,
    done: oneshot::Sender<io::Result<()>>,
}

/// Owns the log file. Whatever queues up while one fsync runs goes out
/// together in the next, so concurrent rooms share the cost of a sync.
async fn run_log_writer(
    mut wal: Wal,
    mut queue: mpsc::Receiver<PendingAppend>,
    appended: Arc<AtomicU64>,
) {
    let mut pending = Vec::with_capacity(MAX_BATCH);
    while queue.recv_many(&mut pending, MAX_BATCH).await > 0 {
        let (events, waiters): (Vec<Event>, Vec<_>) =
            pending.drain(..).map(|p| (p.event, p.done)).unzip();

        let started = Instant::now();
        let result = wal.append_batch(&events);
        metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(events.len() as f64);

        if result.is_ok() {
            appended.fetch_add(events.len() as u64, Ordering::Relaxed);
        }
        for done in waiters {
            let outcome = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = done.send(outcome);
        }
    }
    debug!("reservation log writer stopped");
}

#[derive(Clone)]
struct LogHandle {
    queue: mpsc::Sender<PendingAppend>,
    appended: Arc<AtomicU64>,
}

impl LogHandle {
    /// Resolves once `event` is fsynced, or with the reason it never will be.
    async fn append(&self, event: Event) -> Result<(), EngineError> {
        let (done, synced) = oneshot::channel();
        self.queue
            .send(PendingAppend { event, done })
            .await
            .map_err(|_| EngineError::WalError("log writer shut down".into()))?;
        synced
            .await
            .map_err(|_| EngineError::WalError("log writer dropped the append".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }
}

/// Run a log-then-apply step on its own task.
///
/// Once an event is queued it may reach the disk, so the matching memory
/// update has to run even when the caller stops polling halfway.
async fn detached<F>(step: F) -> Result<(), EngineError>
where
    F: Future<Output = Result<(), EngineError>> + Send + 'static,
{
    tokio::spawn(step)
        .await
        .map_err(|e| EngineError::WalError(format!("log step aborted: {e}")))?
}

/// In-memory index backed by the reservation log. A mutation reports
/// success only once it is both fsynced and visible in memory; a failed one
/// leaves neither trace.
pub struct DurableStore {
    memory: Arc<InMemoryStore>,
    log: LogHandle,
    /// Serializes room registration so the log never records a room twice.
    registration: Arc<Mutex<()>>,
    path: PathBuf,
}

impl DurableStore {
    /// Replay the log at `path` and start its writer. Must be called from
    /// within a tokio runtime.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (wal, events) = Wal::open(&path)?;
        let memory = InMemoryStore::from_events(&events);

        let (queue, rx) = mpsc::channel(LOG_QUEUE_CAPACITY);
        let appended = Arc::new(AtomicU64::new(0));
        tokio::spawn(run_log_writer(wal, rx, appended.clone()));

        info!(
            path = %path.display(),
            events = events.len(),
            rooms = memory.room_count(),
            reservations = memory.reservation_count(),
            "replayed reservation log"
        );
        metrics::gauge!(observability::ROOMS_REGISTERED).set(memory.room_count() as f64);

        Ok(Self {
            memory: Arc::new(memory),
            log: LogHandle { queue, appended },
            registration: Arc::new(Mutex::new(())),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn reservation_count(&self) -> usize {
        self.memory.reservation_count()
    }

    /// Events fsynced since the log was opened.
    pub fn wal_appends(&self) -> u64 {
        self.log.appended.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ReservationStore for DurableStore {
    async fn register_room(&self, room: RoomInfo) -> Result<(), EngineError> {
        let memory = self.memory.clone();
        let log = self.log.clone();
        let registration = self.registration.clone();
        detached(async move {
            let _serial = registration.lock_owned().await;
            memory.check_new_room(&room)?;
            log.append(Event::RoomRegistered {
                id: room.id,
                name: room.name.clone(),
            })
            .await?;
            memory.add_room(room)
        })
        .await
    }

    async fn room(&self, room_id: Ulid) -> Option<RoomInfo> {
        self.memory.room(room_id).await
    }

    fn room_count(&self) -> usize {
        self.memory.room_count()
    }

    async fn has_overlap(&self, room_id: Ulid, range: &DateRange) -> Result<bool, EngineError> {
        self.memory.has_overlap(room_id, range).await
    }

    async fn insert(&self, reservation: Reservation) -> Result<(), EngineError> {
        let rs = self.memory.room_or_not_found(&reservation.room_id)?;
        let memory = self.memory.clone();
        let log = self.log.clone();
        detached(async move {
            // Held until the commit: lock-free readers see the reservation
            // either before or after it is durable, never in between.
            let mut guard = rs.write_owned().await;
            InMemoryStore::check_insert(&guard, &reservation)?;
            memory.claim_id(reservation.id, reservation.room_id)?;
            if let Err(e) = log.append(Event::from(&reservation)).await {
                memory.release_id(&reservation.id);
                return Err(e);
            }
            memory.commit(&mut guard, reservation);
            Ok(())
        })
        .await
    }

    async fn is_occupied_at(
        &self,
        room_id: Ulid,
        at: Day,
        requester_id: Ulid,
    ) -> Result<bool, EngineError> {
        self.memory.is_occupied_at(room_id, at, requester_id).await
    }

    async fn count_by_requesters(&self, requester_ids: &HashSet<Ulid>) -> Result<usize, EngineError> {
        self.memory.count_by_requesters(requester_ids).await
    }

    async fn reservations_for_room(&self, room_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        self.memory.reservations_for_room(room_id).await
    }
}
