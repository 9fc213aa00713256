//! Locked mutation executor for moves.
//!
//! [`move_item`] runs inside an open [`UnitOfWork`]. The caller is expected
//! to already hold the item's row lock from
//! [`ItemLockMap`](super::locks::ItemLockMap); the executor re-reads the row
//! inside the transaction, so each move computes its shift from the current
//! committed position rather than from what the client last saw.

use crate::errors::{BoardError, BoardResult};

use super::db;
use super::models::{ChangeEvent, ItemKind, MoveIntent, MoveOutcome, OrderedItem, Placement};
use super::notifier::Notifier;
use super::position;
use super::unit_of_work::UnitOfWork;

/// Move an item of `kind` to the slot described by `intent`.
///
/// Writes nothing and publishes nothing when the item already sits at the
/// requested slot.
pub fn move_item(
    uow: &mut UnitOfWork<'_>,
    notifier: &Notifier,
    kind: ItemKind,
    id: i64,
    intent: MoveIntent,
) -> BoardResult<MoveOutcome> {
    let item = db::lock_item(uow, kind, id)?.ok_or_else(|| BoardError::not_found(kind.label(), id))?;
    if item.archived {
        return Err(BoardError::Conflict(format!(
            "{} {} is archived and cannot be moved",
            kind.label(),
            id
        )));
    }

    let from = item.placement();
    let target = Placement {
        container_id: intent.container_id.unwrap_or(item.container_id),
        position: intent.position,
    };
    let same_container = target.container_id == from.container_id;

    if target == from {
        tracing::debug!(kind = kind.label(), id, position = from.position, "move is a no-op");
        return Ok(MoveOutcome::Unchanged(item));
    }

    if same_container {
        check_source_live(uow, &item)?;
    } else {
        check_destination(uow, &item, target.container_id)?;
    }

    let live = db::count_live(uow, kind, target.container_id)?;
    position::check_move_bounds(target.position, live, same_container)?;

    let Some(plan) = position::plan_move(from, target) else {
        return Ok(MoveOutcome::Unchanged(item));
    };
    for shift in &plan.shifts {
        db::apply_shift(uow, kind, shift)?;
    }
    db::set_placement(uow, kind, id, plan.target)?;
    db::touch_board(uow, item.board_id)?;

    let details = if same_container {
        format!("position {} -> {}", from.position, plan.target.position)
    } else {
        format!(
            "{} {}:{} -> {}:{}",
            kind.container_label().to_lowercase(),
            from.container_id,
            from.position,
            plan.target.container_id,
            plan.target.position
        )
    };
    notifier.publish(
        uow,
        ChangeEvent::new(kind.moved_event(), item.board_id, id).with_details(details),
    );

    tracing::debug!(
        kind = kind.label(),
        id,
        from_container = from.container_id,
        from_position = from.position,
        to_container = plan.target.container_id,
        to_position = plan.target.position,
        "item moved"
    );

    Ok(MoveOutcome::Moved {
        item: OrderedItem {
            container_id: plan.target.container_id,
            position: plan.target.position,
            ..item
        },
        from,
    })
}

/// An archived column's tasks are frozen in place. They may still be moved
/// out to a live column.
fn check_source_live(uow: &UnitOfWork<'_>, item: &OrderedItem) -> BoardResult<()> {
    if item.kind != ItemKind::Task {
        return Ok(());
    }
    let column = db::find_container(uow, ItemKind::Task, item.container_id)?;
    if column.is_some_and(|c| c.archived) {
        return Err(BoardError::Conflict(format!(
            "Column {} is archived",
            item.container_id
        )));
    }
    Ok(())
}

/// Cross-container moves: tasks may change column within their board;
/// columns never change board.
fn check_destination(uow: &UnitOfWork<'_>, item: &OrderedItem, container_id: i64) -> BoardResult<()> {
    match item.kind {
        ItemKind::Column => Err(BoardError::Conflict(
            "Columns cannot be moved to another board".to_string(),
        )),
        ItemKind::Task => {
            let container = db::find_container(uow, ItemKind::Task, container_id)?
                .filter(|c| c.board_id == item.board_id)
                .ok_or_else(|| BoardError::not_found("Column", container_id))?;
            if container.archived {
                return Err(BoardError::Conflict(format!(
                    "Column {} is archived",
                    container_id
                )));
            }
            Ok(())
        }
    }
}
