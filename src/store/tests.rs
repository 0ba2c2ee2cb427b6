use super::*;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio_test::{assert_err, assert_ok};

use crate::limits::MAX_NAME_LEN;
use crate::model::Event;

fn day(n: u32) -> Day {
    NaiveDate::from_yo_opt(2022, n).unwrap()
}

fn range(from: u32, until: u32) -> DateRange {
    DateRange::new(day(from), day(until)).unwrap()
}

fn reservation(room_id: Ulid, requester_id: Ulid, from: u32, until: u32) -> Reservation {
    Reservation {
        id: Ulid::new(),
        room_id,
        requester_id,
        range: range(from, until),
    }
}

fn room(id: Ulid) -> RoomInfo {
    RoomInfo { id, name: None }
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("roomlock_test_store");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

// ── In-memory store ──────────────────────────────────────

#[tokio::test]
async fn has_overlap_follows_half_open_rule() {
    let store = InMemoryStore::new();
    let r1 = Ulid::new();
    store.register_room(room(r1)).await.unwrap();
    store.insert(reservation(r1, Ulid::new(), 5, 10)).await.unwrap();

    assert!(store.has_overlap(r1, &range(5, 10)).await.unwrap());
    assert!(store.has_overlap(r1, &range(6, 7)).await.unwrap());
    assert!(store.has_overlap(r1, &range(1, 20)).await.unwrap());
    assert!(store.has_overlap(r1, &range(9, 12)).await.unwrap());
    assert!(!store.has_overlap(r1, &range(1, 5)).await.unwrap());
    assert!(!store.has_overlap(r1, &range(10, 12)).await.unwrap());
}

#[tokio::test]
async fn unknown_room_is_not_found() {
    let store = InMemoryStore::new();
    let ghost = Ulid::new();

    let overlap = store.has_overlap(ghost, &range(1, 2)).await;
    assert!(matches!(overlap, Err(EngineError::RoomNotFound(id)) if id == ghost));

    let insert = store.insert(reservation(ghost, Ulid::new(), 1, 2)).await;
    assert!(matches!(insert, Err(EngineError::RoomNotFound(_))));

    // Point reads on an unknown room are simply "not reserved"
    assert!(!store.is_occupied_at(ghost, day(1), Ulid::new()).await.unwrap());
}

#[tokio::test]
async fn duplicate_room_rejected() {
    let store = InMemoryStore::new();
    let id = Ulid::new();
    assert_ok!(store.register_room(room(id)).await);
    let again = store.register_room(room(id)).await;
    assert!(matches!(again, Err(EngineError::AlreadyExists(_))));
    assert_eq!(store.room_count(), 1);
}

#[tokio::test]
async fn room_name_too_long_rejected() {
    let store = InMemoryStore::new();
    let result = store
        .register_room(RoomInfo {
            id: Ulid::new(),
            name: Some("x".repeat(MAX_NAME_LEN + 1)),
        })
        .await;
    assert!(matches!(result, Err(EngineError::LimitExceeded(_))));
    assert_eq!(store.room_count(), 0);
}

#[tokio::test]
async fn duplicate_reservation_id_rejected() {
    let store = InMemoryStore::new();
    let r1 = Ulid::new();
    let r2 = Ulid::new();
    store.register_room(room(r1)).await.unwrap();
    store.register_room(room(r2)).await.unwrap();

    let first = reservation(r1, Ulid::new(), 1, 3);
    let mut clash = reservation(r2, Ulid::new(), 1, 3);
    clash.id = first.id;

    assert_ok!(store.insert(first.clone()).await);
    let result = store.insert(clash).await;
    assert!(matches!(result, Err(EngineError::DuplicateId(id)) if id == first.id));

    // The failed insert left nothing behind on the second room
    assert!(store.reservations_for_room(r2).await.unwrap().is_empty());
    assert_eq!(store.reservations_for_room(r1).await.unwrap(), vec![first]);
}

#[tokio::test]
async fn insert_refuses_overlap_even_without_admission() {
    let store = InMemoryStore::new();
    let r1 = Ulid::new();
    store.register_room(room(r1)).await.unwrap();
    store.insert(reservation(r1, Ulid::new(), 5, 10)).await.unwrap();

    let clash = reservation(r1, Ulid::new(), 8, 12);
    let result = store.insert(clash.clone()).await;
    assert!(matches!(result, Err(EngineError::RoomNotAvailable(id)) if id == r1));
    assert_eq!(store.reservation_count(), 1);

    // The refused id was never claimed
    let mut retry = reservation(r1, Ulid::new(), 10, 12);
    retry.id = clash.id;
    assert_ok!(store.insert(retry).await);
}

#[tokio::test]
async fn is_occupied_at_checks_requester_and_day() {
    let store = InMemoryStore::new();
    let r1 = Ulid::new();
    let alice = Ulid::new();
    let bob = Ulid::new();
    store.register_room(room(r1)).await.unwrap();
    store.insert(reservation(r1, alice, 1, 5)).await.unwrap();

    assert!(store.is_occupied_at(r1, day(1), alice).await.unwrap());
    assert!(store.is_occupied_at(r1, day(4), alice).await.unwrap());
    assert!(!store.is_occupied_at(r1, day(5), alice).await.unwrap());
    assert!(!store.is_occupied_at(r1, day(2), bob).await.unwrap());
}

#[tokio::test]
async fn count_spans_rooms() {
    let store = InMemoryStore::new();
    let rooms = [Ulid::new(), Ulid::new(), Ulid::new()];
    for r in rooms {
        store.register_room(room(r)).await.unwrap();
    }
    let alice = Ulid::new();
    let bob = Ulid::new();
    let carol = Ulid::new();

    store.insert(reservation(rooms[0], alice, 1, 2)).await.unwrap();
    store.insert(reservation(rooms[1], alice, 1, 2)).await.unwrap();
    store.insert(reservation(rooms[2], bob, 1, 2)).await.unwrap();
    store.insert(reservation(rooms[0], carol, 3, 4)).await.unwrap();

    let count = |ids: &[Ulid]| {
        let set: HashSet<Ulid> = ids.iter().copied().collect();
        let store = &store;
        async move { store.count_by_requesters(&set).await.unwrap() }
    };
    assert_eq!(count(&[alice]).await, 2);
    assert_eq!(count(&[alice, bob]).await, 3);
    assert_eq!(count(&[alice, bob, carol]).await, 4);
    assert_eq!(count(&[Ulid::new()]).await, 0);
    assert_eq!(count(&[]).await, 0);
}

#[tokio::test]
async fn reservations_for_room_sorted() {
    let store = InMemoryStore::new();
    let r1 = Ulid::new();
    let who = Ulid::new();
    store.register_room(room(r1)).await.unwrap();
    store.insert(reservation(r1, who, 20, 22)).await.unwrap();
    store.insert(reservation(r1, who, 1, 3)).await.unwrap();
    store.insert(reservation(r1, who, 10, 12)).await.unwrap();

    let listed = store.reservations_for_room(r1).await.unwrap();
    let starts: Vec<_> = listed.iter().map(|r| r.range.from).collect();
    assert_eq!(starts, vec![day(1), day(10), day(20)]);
}

#[test]
fn from_events_skips_orphans_duplicates_and_overlaps() {
    let r1 = Ulid::new();
    let who = Ulid::new();
    let kept = reservation(r1, who, 1, 3);
    let events = vec![
        Event::RoomRegistered {
            id: r1,
            name: Some("Blue".into()),
        },
        Event::RoomRegistered {
            id: r1,
            name: Some("Ignored".into()),
        },
        Event::from(&kept),
        Event::from(&kept),
        Event::from(&reservation(Ulid::new(), who, 1, 3)),
        Event::from(&reservation(r1, Ulid::new(), 2, 4)),
    ];

    let store = InMemoryStore::from_events(&events);
    assert_eq!(store.room_count(), 1);
    assert_eq!(store.reservation_count(), 1);

    let rs = store.get_room(&r1).unwrap();
    let guard = rs.try_read().unwrap();
    assert_eq!(guard.name.as_deref(), Some("Blue"));
    assert_eq!(guard.reservations, vec![kept]);
}

// ── Durable store ────────────────────────────────────────

#[tokio::test]
async fn durable_reopen_replays_state() {
    let path = test_wal_path("reopen_replays.wal");
    let r1 = Ulid::new();
    let alice = Ulid::new();
    let made = reservation(r1, alice, 1, 5);

    {
        let store = DurableStore::open(&path).unwrap();
        store
            .register_room(RoomInfo {
                id: r1,
                name: Some("Blue".into()),
            })
            .await
            .unwrap();
        store.insert(made.clone()).await.unwrap();
        assert_eq!(store.wal_appends(), 2);
    }

    let reopened = DurableStore::open(&path).unwrap();
    assert_eq!(reopened.room_count(), 1);
    assert_eq!(reopened.reservation_count(), 1);
    assert_eq!(
        reopened.room(r1).await,
        Some(RoomInfo {
            id: r1,
            name: Some("Blue".into())
        })
    );
    assert!(reopened.is_occupied_at(r1, day(2), alice).await.unwrap());
    assert!(reopened.has_overlap(r1, &range(4, 6)).await.unwrap());
    assert_eq!(reopened.reservations_for_room(r1).await.unwrap(), vec![made]);
    assert_eq!(reopened.wal_appends(), 0);
}

#[tokio::test]
async fn durable_rejections_do_not_touch_wal() {
    let path = test_wal_path("rejections_no_wal.wal");
    let store = DurableStore::open(&path).unwrap();
    let r1 = Ulid::new();
    store.register_room(room(r1)).await.unwrap();

    assert_err!(store.register_room(room(r1)).await);
    assert_err!(store.insert(reservation(Ulid::new(), Ulid::new(), 1, 2)).await);

    let first = reservation(r1, Ulid::new(), 1, 2);
    let mut dup = reservation(r1, Ulid::new(), 5, 6);
    dup.id = first.id;
    store.insert(first).await.unwrap();
    assert_err!(store.insert(dup).await);

    assert_eq!(store.wal_appends(), 2);
}

#[tokio::test]
async fn durable_group_commit_batches_inserts() {
    let path = test_wal_path("group_commit.wal");
    let store = Arc::new(DurableStore::open(&path).unwrap());

    let n = 20;
    let mut rooms = Vec::new();
    for _ in 0..n {
        let id = Ulid::new();
        store.register_room(room(id)).await.unwrap();
        rooms.push(id);
    }

    let who = Ulid::new();
    let mut handles = Vec::new();
    for &r in &rooms {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.insert(reservation(r, who, 1, 8)).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let ids = HashSet::from([who]);
    assert_eq!(store.count_by_requesters(&ids).await.unwrap(), n);

    let reopened = DurableStore::open(&path).unwrap();
    assert_eq!(reopened.room_count(), n);
    assert_eq!(reopened.count_by_requesters(&ids).await.unwrap(), n);
}

#[tokio::test]
async fn durable_insert_outlives_abandoned_caller() {
    let path = test_wal_path("abandoned_insert.wal");
    let r1 = Ulid::new();
    let alice = Ulid::new();
    let first = reservation(r1, alice, 1, 5);

    {
        let store = DurableStore::open(&path).unwrap();
        store.register_room(room(r1)).await.unwrap();

        // Poll once, then give up while the append is in flight
        let abandoned = tokio::time::timeout(Duration::ZERO, store.insert(first.clone())).await;
        assert!(abandoned.is_err());

        // The insert still finishes: durable and visible, or neither
        tokio::time::timeout(Duration::from_secs(5), async {
            while !store.is_occupied_at(r1, day(1), alice).await.unwrap() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("abandoned insert never became visible");

        let overlapping = store.insert(reservation(r1, Ulid::new(), 2, 4)).await;
        assert!(matches!(overlapping, Err(EngineError::RoomNotAvailable(_))));
        assert_eq!(store.wal_appends(), 2);
    }

    let reopened = DurableStore::open(&path).unwrap();
    assert_eq!(reopened.reservations_for_room(r1).await.unwrap(), vec![first]);
}

#[tokio::test]
async fn durable_memory_matches_log_after_refused_inserts() {
    let path = test_wal_path("refused_inserts.wal");
    let r1 = Ulid::new();
    let live = {
        let store = DurableStore::open(&path).unwrap();
        store.register_room(room(r1)).await.unwrap();
        store.insert(reservation(r1, Ulid::new(), 1, 5)).await.unwrap();
        for (from, until) in [(1, 5), (4, 6), (2, 3)] {
            assert_err!(store.insert(reservation(r1, Ulid::new(), from, until)).await);
        }
        store.insert(reservation(r1, Ulid::new(), 5, 7)).await.unwrap();
        store.reservations_for_room(r1).await.unwrap()
    };

    let reopened = DurableStore::open(&path).unwrap();
    assert_eq!(reopened.reservations_for_room(r1).await.unwrap(), live);
    assert_eq!(live.len(), 2);
}
