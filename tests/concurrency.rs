//! Concurrent mutation scenarios run through `BoardService`.
//!
//! These exercise the per-row lock map together with the serialized SQLite
//! handle: many requests in flight at once must still leave every container
//! densely ordered, and subscribers must hear one event per committed change.

use std::time::Duration;

use taskboard::board::db::{self, BoardDb, DbHandle};
use taskboard::board::locks::LockKey;
use taskboard::board::models::{ChangeEvent, EventType, ItemKind, MoveIntent, MoveOutcome};
use taskboard::board::notifier::{Outbound, SubscriberRegistry, Subscription};
use taskboard::board::service::{BoardLimits, BoardService};

const ALICE: i64 = 1;

struct Setup {
    service: BoardService,
    board_id: i64,
    column_id: i64,
    tasks: Vec<i64>,
}

async fn setup(task_count: usize) -> Setup {
    let db = DbHandle::new(BoardDb::new_in_memory().unwrap());
    let service = BoardService::new(db, SubscriberRegistry::new(256), BoardLimits::default());
    let board = service.create_board(ALICE, "Race").await.unwrap();
    let column = service.create_column(ALICE, board.id, "Todo", None).await.unwrap();
    let mut tasks = Vec::new();
    for i in 0..task_count {
        let task = service
            .create_task(ALICE, column.id, &format!("T{}", i), "", None)
            .await
            .unwrap();
        tasks.push(task.id);
    }
    Setup {
        service,
        board_id: board.id,
        column_id: column.id,
        tasks,
    }
}

fn live_positions(service: &BoardService, column_id: i64) -> Vec<(i64, i64)> {
    let guard = service.db().lock_sync().unwrap();
    db::live_positions(guard.conn(), ItemKind::Task, column_id).unwrap()
}

fn assert_dense(positions: &[(i64, i64)]) {
    for (expected, (_, position)) in positions.iter().enumerate() {
        assert_eq!(*position, expected as i64, "positions must be dense: {:?}", positions);
    }
}

fn drain_events(subscription: &mut Subscription) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    while let Some(frame) = subscription.try_recv() {
        if let Outbound::Event(json) = frame {
            events.push(serde_json::from_str(&json).unwrap());
        }
    }
    events
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_moves_of_different_tasks_keep_positions_dense() {
    let Setup {
        service,
        board_id,
        column_id,
        tasks,
    } = setup(8).await;
    let mut subscription = service.subscribe(ALICE, board_id).await.unwrap();

    let mut handles = Vec::new();
    for (i, &task_id) in tasks.iter().enumerate() {
        let service = service.clone();
        let target = ((i * 5) % tasks.len()) as i64;
        handles.push(tokio::spawn(async move {
            service
                .move_item(
                    ALICE,
                    ItemKind::Task,
                    task_id,
                    MoveIntent {
                        position: target,
                        container_id: None,
                    },
                )
                .await
        }));
    }

    let mut moved = 0;
    for handle in handles {
        if let MoveOutcome::Moved { .. } = handle.await.unwrap().unwrap() {
            moved += 1;
        }
    }

    let positions = live_positions(&service, column_id);
    assert_eq!(positions.len(), tasks.len());
    assert_dense(&positions);

    let mut ids: Vec<i64> = positions.into_iter().map(|(id, _)| id).collect();
    ids.sort();
    assert_eq!(ids, tasks);

    let events = drain_events(&mut subscription);
    assert_eq!(events.len(), moved);
    assert!(events.iter().all(|e| e.event_type == EventType::TaskMoved));
    assert!(service.locks().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_get_distinct_slots() {
    let Setup { service, column_id, .. } = setup(0).await;

    let mut handles = Vec::new();
    for i in 0..12 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .create_task(ALICE, column_id, &format!("N{}", i), "", None)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let positions = live_positions(&service, column_id);
    assert_eq!(positions.len(), 12);
    assert_dense(&positions);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_moves_and_deletes_keep_positions_dense() {
    let Setup {
        service,
        column_id,
        tasks,
        ..
    } = setup(10).await;

    let mut handles = Vec::new();
    for (i, &task_id) in tasks.iter().enumerate() {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            if i % 3 == 0 {
                service.delete_item(ALICE, ItemKind::Task, task_id).await.map(|_| ())
            } else {
                let intent = MoveIntent {
                    position: 0,
                    container_id: None,
                };
                service.move_item(ALICE, ItemKind::Task, task_id, intent).await.map(|_| ())
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let positions = live_positions(&service, column_id);
    assert_eq!(positions.len(), 6);
    assert_dense(&positions);
}

/// A held row lock stalls only requests for that row. Moves of other tasks
/// in the same column go through, which is the accepted race surface that
/// the serialized store closes.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn row_lock_blocks_only_the_same_item() {
    let Setup {
        service,
        column_id,
        tasks,
        ..
    } = setup(3).await;
    let (a, b) = (tasks[0], tasks[1]);

    let held = service.locks().acquire(LockKey::Task(a)).await;

    let to_end = MoveIntent {
        position: 2,
        container_id: None,
    };
    let other = tokio::time::timeout(
        Duration::from_secs(5),
        service.move_item(ALICE, ItemKind::Task, b, to_end),
    )
    .await;
    assert!(matches!(other, Ok(Ok(MoveOutcome::Moved { .. }))));

    let blocked = {
        let service = service.clone();
        tokio::spawn(async move {
            let to_start = MoveIntent {
                position: 0,
                container_id: None,
            };
            service.move_item(ALICE, ItemKind::Task, a, to_start).await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!blocked.is_finished());

    drop(held);
    let outcome = tokio::time::timeout(Duration::from_secs(5), blocked)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, MoveOutcome::Unchanged(_)));

    let positions = live_positions(&service, column_id);
    assert_eq!(positions.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![a, tasks[2], b]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cross_column_shuffle_preserves_every_task() {
    let Setup {
        service,
        board_id,
        column_id,
        tasks,
    } = setup(6).await;
    let done = service.create_column(ALICE, board_id, "Done", None).await.unwrap();

    let mut handles = Vec::new();
    for &task_id in &tasks {
        let service = service.clone();
        let done_id = done.id;
        handles.push(tokio::spawn(async move {
            let intent = MoveIntent {
                position: 0,
                container_id: Some(done_id),
            };
            service.move_item(ALICE, ItemKind::Task, task_id, intent).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(live_positions(&service, column_id).is_empty());
    let positions = live_positions(&service, done.id);
    assert_eq!(positions.len(), tasks.len());
    assert_dense(&positions);
}
