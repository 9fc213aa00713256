//! Property tests for the dense position invariant.
//!
//! Random sequences of create/move/delete/archive operations run against an
//! in-memory database and a plain `Vec` model side by side. After every
//! operation, each column's live tasks must match the model and occupy
//! exactly positions `0..n`.

use proptest::prelude::*;
use taskboard::board::db::{self, BoardDb};
use taskboard::board::executor;
use taskboard::board::guard;
use taskboard::board::models::{ItemKind, MoveIntent};
use taskboard::board::notifier::{Notifier, SubscriberRegistry};
use taskboard::board::unit_of_work::UnitOfWork;
use taskboard::errors::{BoardError, BoardResult};

const COLUMNS: usize = 2;

#[derive(Debug, Clone)]
enum Op {
    Create { column: usize, position: Option<i64> },
    Move { task: usize, position: i64, column: Option<usize> },
    Delete { task: usize },
    Archive { task: usize },
    Unarchive { task: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..COLUMNS, prop::option::of(0i64..6))
            .prop_map(|(column, position)| Op::Create { column, position }),
        4 => (0usize..16, -1i64..7, prop::option::of(0..COLUMNS))
            .prop_map(|(task, position, column)| Op::Move { task, position, column }),
        1 => (0usize..16).prop_map(|task| Op::Delete { task }),
        1 => (0usize..16).prop_map(|task| Op::Archive { task }),
        1 => (0usize..16).prop_map(|task| Op::Unarchive { task }),
    ]
}

/// Expected state: live order per column plus archived tasks and their column.
#[derive(Default)]
struct Model {
    live: [Vec<i64>; COLUMNS],
    archived: Vec<(i64, usize)>,
}

impl Model {
    fn locate(&self, id: i64) -> Option<(usize, usize)> {
        self.live
            .iter()
            .enumerate()
            .find_map(|(c, ids)| ids.iter().position(|&t| t == id).map(|p| (c, p)))
    }
}

struct Harness {
    db: BoardDb,
    notifier: Notifier,
    columns: [i64; COLUMNS],
    created: Vec<i64>,
    model: Model,
}

impl Harness {
    fn new() -> Self {
        let mut store = BoardDb::new_in_memory().unwrap();
        let notifier = Notifier::new(SubscriberRegistry::new(4));
        let board = db::insert_board(store.conn(), "Props").unwrap();
        let mut columns = [0; COLUMNS];
        {
            let mut uow = store.begin().unwrap();
            for (i, slot) in columns.iter_mut().enumerate() {
                *slot = guard::create_column(&mut uow, &notifier, board.id, &format!("C{}", i), None)
                    .unwrap()
                    .id;
            }
            uow.commit().unwrap();
        }
        Self {
            db: store,
            notifier,
            columns,
            created: Vec::new(),
            model: Model::default(),
        }
    }

    fn run<R>(&mut self, f: impl FnOnce(&mut UnitOfWork<'_>, &Notifier) -> BoardResult<R>) -> BoardResult<R> {
        let notifier = self.notifier.clone();
        let mut uow = self.db.begin()?;
        let result = f(&mut uow, &notifier)?;
        uow.commit()?;
        Ok(result)
    }

    fn task_id(&self, index: usize) -> Option<i64> {
        if self.created.is_empty() {
            return None;
        }
        Some(self.created[index % self.created.len()])
    }

    fn apply(&mut self, op: &Op) {
        match *op {
            Op::Create { column, position } => {
                let column_id = self.columns[column];
                let len = self.model.live[column].len() as i64;
                let result = self.run(|uow, n| guard::create_task(uow, n, column_id, "t", "", position));
                match (result, position) {
                    (Ok(task), None) => {
                        self.model.live[column].push(task.id);
                        self.created.push(task.id);
                    }
                    (Ok(task), Some(p)) => {
                        assert!(p <= len);
                        self.model.live[column].insert(p as usize, task.id);
                        self.created.push(task.id);
                    }
                    (Err(BoardError::OutOfRange { .. }), Some(p)) => assert!(p > len),
                    (Err(e), _) => panic!("unexpected create error: {}", e),
                }
            }
            Op::Move { task, position, column } => {
                let Some(id) = self.task_id(task) else { return };
                let container_id = column.map(|c| self.columns[c]);
                let intent = MoveIntent { position, container_id };
                let result = self.run(|uow, n| executor::move_item(uow, n, ItemKind::Task, id, intent));

                let expected = match self.model.locate(id) {
                    None if self.model.archived.iter().any(|&(t, _)| t == id) => "conflict",
                    None => "not_found",
                    Some((from, _)) => {
                        let to = column.unwrap_or(from);
                        let max = if to == from {
                            self.model.live[to].len() as i64 - 1
                        } else {
                            self.model.live[to].len() as i64
                        };
                        if position < 0 || position > max { "out_of_range" } else { "ok" }
                    }
                };
                match (expected, result) {
                    ("ok", Ok(_)) => {
                        let (from, index) = self.model.locate(id).unwrap();
                        self.model.live[from].remove(index);
                        let to = column.unwrap_or(from);
                        self.model.live[to].insert(position as usize, id);
                    }
                    ("conflict", Err(BoardError::Conflict(_)))
                    | ("not_found", Err(BoardError::NotFound { .. }))
                    | ("out_of_range", Err(BoardError::OutOfRange { .. })) => {}
                    (expected, other) => panic!("expected {}, got {:?}", expected, other),
                }
            }
            Op::Delete { task } => {
                let Some(id) = self.task_id(task) else { return };
                let result = self.run(|uow, n| guard::delete_item(uow, n, ItemKind::Task, id));
                if let Some((c, index)) = self.model.locate(id) {
                    assert!(result.is_ok());
                    self.model.live[c].remove(index);
                } else if let Some(index) = self.model.archived.iter().position(|&(t, _)| t == id) {
                    assert!(result.is_ok());
                    self.model.archived.remove(index);
                } else {
                    assert!(matches!(result, Err(BoardError::NotFound { .. })));
                }
            }
            Op::Archive { task } => {
                let Some(id) = self.task_id(task) else { return };
                let result = self.run(|uow, n| guard::set_archived(uow, n, ItemKind::Task, id, true));
                if let Some((c, index)) = self.model.locate(id) {
                    assert!(result.is_ok());
                    self.model.live[c].remove(index);
                    self.model.archived.push((id, c));
                }
            }
            Op::Unarchive { task } => {
                let Some(id) = self.task_id(task) else { return };
                let result = self.run(|uow, n| guard::set_archived(uow, n, ItemKind::Task, id, false));
                if let Some(index) = self.model.archived.iter().position(|&(t, _)| t == id) {
                    assert!(result.is_ok());
                    let (_, c) = self.model.archived.remove(index);
                    self.model.live[c].push(id);
                }
            }
        }
    }

    fn live_ids(&self, column: usize) -> Vec<i64> {
        let positions = db::live_positions(self.db.conn(), ItemKind::Task, self.columns[column]).unwrap();
        for (expected, (_, position)) in positions.iter().enumerate() {
            assert_eq!(*position, expected as i64, "positions must be dense and zero-based");
        }
        positions.into_iter().map(|(id, _)| id).collect()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Live positions stay exactly `0..n` and match the model after every step.
    #[test]
    fn prop_live_positions_stay_dense(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut harness = Harness::new();
        for op in &ops {
            harness.apply(op);
            for column in 0..COLUMNS {
                prop_assert_eq!(
                    harness.live_ids(column),
                    harness.model.live[column].clone(),
                    "column {} diverged after {:?}",
                    column,
                    op
                );
            }
        }
    }

    /// Moving an item away and back restores the original order.
    #[test]
    fn prop_move_round_trip(len in 1usize..8, from_seed in 0usize..8, to_seed in 0usize..8) {
        let mut harness = Harness::new();
        for _ in 0..len {
            harness.apply(&Op::Create { column: 0, position: None });
        }
        let original = harness.live_ids(0);
        let from = from_seed % len;
        let to = to_seed % len;

        harness.apply(&Op::Move { task: from, position: to as i64, column: None });
        harness.apply(&Op::Move { task: from, position: from as i64, column: None });
        prop_assert_eq!(harness.live_ids(0), original);
    }
}
