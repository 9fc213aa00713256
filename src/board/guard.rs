//! Collection invariant guard.
//!
//! Creates, deletes and archive toggles all change how many live items a
//! container holds. Each one pairs its row write with the matching range
//! shift so the container's live positions stay exactly `0..n`.

use crate::errors::{BoardError, BoardResult};

use super::db;
use super::models::{ChangeEvent, Column, ItemKind, OrderedItem, Task};
use super::notifier::Notifier;
use super::position::{self, Shift};
use super::unit_of_work::UnitOfWork;

/// Resolve the container for a new item, rejecting archived columns.
fn live_container(uow: &UnitOfWork<'_>, kind: ItemKind, container_id: i64) -> BoardResult<db::ContainerInfo> {
    let container = db::find_container(uow, kind, container_id)?
        .ok_or_else(|| BoardError::not_found(kind.container_label(), container_id))?;
    if container.archived {
        return Err(BoardError::Conflict(format!(
            "{} {} is archived",
            kind.container_label(),
            container_id
        )));
    }
    Ok(container)
}

/// Pick the slot for a new item and open it.
///
/// No position appends. An explicit position must lie in `0..=live_count`;
/// items at or after it move up by one.
fn reserve_slot(
    uow: &UnitOfWork<'_>,
    kind: ItemKind,
    container_id: i64,
    requested: Option<i64>,
) -> BoardResult<i64> {
    let Some(position) = requested else {
        let max = db::find_max_position(uow, kind, container_id)?;
        return Ok(position::append_position(max));
    };
    let live = db::count_live(uow, kind, container_id)?;
    position::check_insert_bounds(position, live)?;
    if position < live {
        db::apply_shift(
            uow,
            kind,
            &Shift::IncrementFrom {
                container_id,
                from: position,
            },
        )?;
    }
    Ok(position)
}

pub fn create_column(
    uow: &mut UnitOfWork<'_>,
    notifier: &Notifier,
    board_id: i64,
    name: &str,
    requested: Option<i64>,
) -> BoardResult<Column> {
    live_container(uow, ItemKind::Column, board_id)?;
    let position = reserve_slot(uow, ItemKind::Column, board_id, requested)?;
    let column = db::insert_column(uow, board_id, name, position)?;
    db::touch_board(uow, board_id)?;
    notifier.publish(
        uow,
        ChangeEvent::new(ItemKind::Column.created_event(), board_id, column.id),
    );
    tracing::debug!(board_id, column_id = column.id, position, "column created");
    Ok(column)
}

pub fn create_task(
    uow: &mut UnitOfWork<'_>,
    notifier: &Notifier,
    column_id: i64,
    name: &str,
    description: &str,
    requested: Option<i64>,
) -> BoardResult<Task> {
    let container = live_container(uow, ItemKind::Task, column_id)?;
    let position = reserve_slot(uow, ItemKind::Task, column_id, requested)?;
    let task = db::insert_task(uow, column_id, name, description, position)?;
    db::touch_board(uow, container.board_id)?;
    notifier.publish(
        uow,
        ChangeEvent::new(ItemKind::Task.created_event(), container.board_id, task.id),
    );
    tracing::debug!(column_id, task_id = task.id, position, "task created");
    Ok(task)
}

/// Delete an item and close the gap it leaves.
///
/// A column that still holds live tasks is refused; its archived tasks go
/// with it.
pub fn delete_item(
    uow: &mut UnitOfWork<'_>,
    notifier: &Notifier,
    kind: ItemKind,
    id: i64,
) -> BoardResult<OrderedItem> {
    let item = db::lock_item(uow, kind, id)?.ok_or_else(|| BoardError::not_found(kind.label(), id))?;

    if kind == ItemKind::Column {
        let children = db::count_live(uow, ItemKind::Task, id)?;
        if children > 0 {
            return Err(BoardError::Conflict(format!(
                "Column {} still contains {} task(s)",
                id, children
            )));
        }
    }

    db::delete_item_row(uow, kind, id)?;
    if !item.archived {
        db::apply_shift(uow, kind, &position::removal_shift(item.placement()))?;
    }
    db::touch_board(uow, item.board_id)?;
    notifier.publish(uow, ChangeEvent::new(kind.deleted_event(), item.board_id, id));
    tracing::debug!(
        kind = kind.label(),
        id,
        container_id = item.container_id,
        position = item.position,
        "item deleted"
    );
    Ok(item)
}

/// Archive or unarchive an item.
///
/// Archiving takes the item out of the live ordering and keeps its last
/// position frozen on the row. Unarchiving appends it to its container.
/// Toggling to the current state writes nothing.
pub fn set_archived(
    uow: &mut UnitOfWork<'_>,
    notifier: &Notifier,
    kind: ItemKind,
    id: i64,
    archived: bool,
) -> BoardResult<OrderedItem> {
    let item = db::lock_item(uow, kind, id)?.ok_or_else(|| BoardError::not_found(kind.label(), id))?;
    if item.archived == archived {
        return Ok(item);
    }

    let position = if archived {
        db::set_archived(uow, kind, id, true, item.position)?;
        db::apply_shift(uow, kind, &position::removal_shift(item.placement()))?;
        item.position
    } else {
        if kind == ItemKind::Task {
            live_container(uow, kind, item.container_id)?;
        }
        let max = db::find_max_position(uow, kind, item.container_id)?;
        let position = position::append_position(max);
        db::set_archived(uow, kind, id, false, position)?;
        position
    };

    db::touch_board(uow, item.board_id)?;
    let details = if archived { "archived" } else { "unarchived" };
    notifier.publish(
        uow,
        ChangeEvent::new(kind.updated_event(), item.board_id, id).with_details(details),
    );
    tracing::debug!(kind = kind.label(), id, position, archived, "archive state changed");

    Ok(OrderedItem {
        position,
        archived,
        ..item
    })
}
