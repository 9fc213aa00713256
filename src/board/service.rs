//! Board operations as seen by a request handler.
//!
//! Every mutation follows the same protocol: take the row lock from
//! [`ItemLockMap`], then run one closure on the [`DbHandle`] that opens a
//! [`UnitOfWork`], authorizes the actor against the board's collaborators,
//! performs the write through the executor or guard, and commits. Events
//! published during the closure reach subscribers only once that commit
//! succeeds.

use std::sync::Arc;

use crate::errors::{BoardError, BoardResult};

use super::db::{self, DbHandle};
use super::executor;
use super::guard;
use super::locks::{ItemLockMap, LockKey};
use super::membership::{self, MembershipAction, MembershipChange};
use super::models::*;
use super::notifier::{Notifier, SubscriberRegistry, Subscription};
use super::unit_of_work::UnitOfWork;

/// Per-user limits enforced by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardLimits {
    pub max_boards_per_user: u32,
}

impl Default for BoardLimits {
    fn default() -> Self {
        Self {
            max_boards_per_user: 10,
        }
    }
}

#[derive(Clone)]
pub struct BoardService {
    db: DbHandle,
    locks: ItemLockMap,
    notifier: Notifier,
    limits: BoardLimits,
}

/// Load a board's collaborators and check that `actor` is one of them.
fn authorize(conn: &rusqlite::Connection, board_id: i64, actor: UserId) -> BoardResult<Vec<Collaborator>> {
    if db::get_board(conn, board_id)?.is_none() {
        return Err(BoardError::not_found("Board", board_id));
    }
    let collaborators = db::list_collaborators(conn, board_id)?;
    membership::require_collaborator(&collaborators, actor)?;
    Ok(collaborators)
}

/// Authorize against the board that owns an existing item.
fn authorize_item(uow: &UnitOfWork<'_>, kind: ItemKind, id: i64, actor: UserId) -> BoardResult<OrderedItem> {
    let item = db::find_item(uow, kind, id)?.ok_or_else(|| BoardError::not_found(kind.label(), id))?;
    authorize(uow, item.board_id, actor)?;
    Ok(item)
}

fn require_name(name: &str) -> BoardResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(BoardError::BadRequest("name must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

/// Persist the changes the membership policy decided on and describe them
/// for the change event.
fn apply_membership(conn: &rusqlite::Connection, board_id: i64, changes: &[MembershipChange]) -> BoardResult<String> {
    let mut details = Vec::with_capacity(changes.len());
    for change in changes {
        match *change {
            MembershipChange::Added { user_id, role } => {
                db::insert_collaborator(conn, board_id, user_id, role)?;
                details.push(format!("collaborator {} added as {}", user_id, role));
            }
            MembershipChange::Removed { user_id } => {
                db::delete_collaborator(conn, board_id, user_id)?;
                details.push(format!("collaborator {} removed", user_id));
            }
            MembershipChange::RoleChanged { user_id, role } => {
                db::update_role(conn, board_id, user_id, role)?;
                details.push(format!("collaborator {} is now {}", user_id, role));
            }
        }
    }
    Ok(details.join("; "))
}

impl BoardService {
    pub fn new(db: DbHandle, registry: Arc<SubscriberRegistry>, limits: BoardLimits) -> Self {
        Self {
            db,
            locks: ItemLockMap::new(),
            notifier: Notifier::new(registry),
            limits,
        }
    }

    pub fn db(&self) -> &DbHandle {
        &self.db
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        self.notifier.registry()
    }

    pub fn locks(&self) -> &ItemLockMap {
        &self.locks
    }

    // ── Boards ────────────────────────────────────────────────────────

    /// Create a board with `actor` as its first admin.
    pub async fn create_board(&self, actor: UserId, name: &str) -> BoardResult<Board> {
        let name = require_name(name)?;
        let cap = self.limits.max_boards_per_user;
        self.db
            .call(move |db| {
                let uow = db.begin()?;
                membership::check_board_cap(db::count_boards_for_user(&uow, actor)?, cap)?;
                let board = db::insert_board(&uow, &name)?;
                db::insert_collaborator(&uow, board.id, actor, Role::Admin)?;
                uow.commit()?;
                tracing::info!(board_id = board.id, actor, "board created");
                Ok(board)
            })
            .await
    }

    pub async fn board_view(&self, actor: UserId, board_id: i64) -> BoardResult<BoardView> {
        self.db
            .call(move |db| {
                authorize(db.conn(), board_id, actor)?;
                db::board_view(db.conn(), board_id)?.ok_or_else(|| BoardError::not_found("Board", board_id))
            })
            .await
    }

    pub async fn rename_board(&self, actor: UserId, board_id: i64, name: &str) -> BoardResult<Board> {
        let name = require_name(name)?;
        let _lock = self.locks.acquire(LockKey::Board(board_id)).await;
        let notifier = self.notifier.clone();
        self.db
            .call(move |db| {
                let mut uow = db.begin()?;
                authorize(&uow, board_id, actor)?;
                db::rename_board(&uow, board_id, &name)?;
                db::touch_board(&uow, board_id)?;
                notifier.publish(
                    &mut uow,
                    ChangeEvent::new(EventType::BoardUpdated, board_id, board_id).with_details("renamed"),
                );
                let board = db::get_board(&uow, board_id)?.ok_or_else(|| BoardError::not_found("Board", board_id))?;
                uow.commit()?;
                Ok(board)
            })
            .await
    }

    // ── Columns ───────────────────────────────────────────────────────

    pub async fn create_column(
        &self,
        actor: UserId,
        board_id: i64,
        name: &str,
        position: Option<i64>,
    ) -> BoardResult<Column> {
        let name = require_name(name)?;
        let _lock = self
            .locks
            .acquire(LockKey::container(ItemKind::Column, board_id))
            .await;
        let notifier = self.notifier.clone();
        self.db
            .call(move |db| {
                let mut uow = db.begin()?;
                authorize(&uow, board_id, actor)?;
                let column = guard::create_column(&mut uow, &notifier, board_id, &name, position)?;
                uow.commit()?;
                Ok(column)
            })
            .await
    }

    pub async fn rename_column(&self, actor: UserId, column_id: i64, name: &str) -> BoardResult<Column> {
        let name = require_name(name)?;
        let _lock = self.locks.acquire(LockKey::Column(column_id)).await;
        let notifier = self.notifier.clone();
        self.db
            .call(move |db| {
                let mut uow = db.begin()?;
                let item = authorize_item(&uow, ItemKind::Column, column_id, actor)?;
                db::rename_column(&uow, column_id, &name)?;
                db::touch_board(&uow, item.board_id)?;
                notifier.publish(
                    &mut uow,
                    ChangeEvent::new(EventType::ColumnUpdated, item.board_id, column_id).with_details("renamed"),
                );
                let column = db::get_column(&uow, column_id)?
                    .ok_or_else(|| BoardError::not_found("Column", column_id))?;
                uow.commit()?;
                Ok(column)
            })
            .await
    }

    // ── Tasks ─────────────────────────────────────────────────────────

    pub async fn create_task(
        &self,
        actor: UserId,
        column_id: i64,
        name: &str,
        description: &str,
        position: Option<i64>,
    ) -> BoardResult<Task> {
        let name = require_name(name)?;
        let description = description.to_string();
        let _lock = self
            .locks
            .acquire(LockKey::container(ItemKind::Task, column_id))
            .await;
        let notifier = self.notifier.clone();
        self.db
            .call(move |db| {
                let mut uow = db.begin()?;
                let column = db::find_container(&uow, ItemKind::Task, column_id)?
                    .ok_or_else(|| BoardError::not_found("Column", column_id))?;
                authorize(&uow, column.board_id, actor)?;
                let task = guard::create_task(&mut uow, &notifier, column_id, &name, &description, position)?;
                uow.commit()?;
                Ok(task)
            })
            .await
    }

    /// Edit a task's name and/or description. Fields left `None` are kept.
    pub async fn update_task(
        &self,
        actor: UserId,
        task_id: i64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> BoardResult<Task> {
        let name = name.map(require_name).transpose()?;
        let description = description.map(str::to_string);
        let _lock = self.locks.acquire(LockKey::Task(task_id)).await;
        let notifier = self.notifier.clone();
        self.db
            .call(move |db| {
                let mut uow = db.begin()?;
                let item = authorize_item(&uow, ItemKind::Task, task_id, actor)?;
                db::update_task(&uow, task_id, name.as_deref(), description.as_deref())?;
                db::touch_board(&uow, item.board_id)?;
                notifier.publish(
                    &mut uow,
                    ChangeEvent::new(EventType::TaskUpdated, item.board_id, task_id),
                );
                let task = db::get_task(&uow, task_id)?.ok_or_else(|| BoardError::not_found("Task", task_id))?;
                uow.commit()?;
                Ok(task)
            })
            .await
    }

    // ── Ordered items (columns and tasks) ─────────────────────────────

    /// Move a column within its board or a task within/between columns.
    pub async fn move_item(
        &self,
        actor: UserId,
        kind: ItemKind,
        id: i64,
        intent: MoveIntent,
    ) -> BoardResult<MoveOutcome> {
        let _lock = self.locks.acquire(LockKey::item(kind, id)).await;
        let notifier = self.notifier.clone();
        self.db
            .call(move |db| {
                let mut uow = db.begin()?;
                authorize_item(&uow, kind, id, actor)?;
                let outcome = executor::move_item(&mut uow, &notifier, kind, id, intent)?;
                uow.commit()?;
                Ok(outcome)
            })
            .await
    }

    pub async fn delete_item(&self, actor: UserId, kind: ItemKind, id: i64) -> BoardResult<OrderedItem> {
        let _lock = self.locks.acquire(LockKey::item(kind, id)).await;
        let notifier = self.notifier.clone();
        self.db
            .call(move |db| {
                let mut uow = db.begin()?;
                authorize_item(&uow, kind, id, actor)?;
                let item = guard::delete_item(&mut uow, &notifier, kind, id)?;
                uow.commit()?;
                Ok(item)
            })
            .await
    }

    pub async fn set_archived(
        &self,
        actor: UserId,
        kind: ItemKind,
        id: i64,
        archived: bool,
    ) -> BoardResult<OrderedItem> {
        let _lock = self.locks.acquire(LockKey::item(kind, id)).await;
        let notifier = self.notifier.clone();
        self.db
            .call(move |db| {
                let mut uow = db.begin()?;
                authorize_item(&uow, kind, id, actor)?;
                let item = guard::set_archived(&mut uow, &notifier, kind, id, archived)?;
                uow.commit()?;
                Ok(item)
            })
            .await
    }

    // ── Collaborators ─────────────────────────────────────────────────

    pub async fn collaborators(&self, actor: UserId, board_id: i64) -> BoardResult<Vec<Collaborator>> {
        self.db
            .call(move |db| authorize(db.conn(), board_id, actor))
            .await
    }

    pub async fn add_collaborator(
        &self,
        actor: UserId,
        board_id: i64,
        user_id: UserId,
        role: Role,
    ) -> BoardResult<Vec<Collaborator>> {
        self.change_membership(actor, board_id, MembershipAction::Add { user_id, role })
            .await
    }

    pub async fn change_role(
        &self,
        actor: UserId,
        board_id: i64,
        user_id: UserId,
        role: Role,
    ) -> BoardResult<Vec<Collaborator>> {
        self.change_membership(actor, board_id, MembershipAction::ChangeRole { user_id, role })
            .await
    }

    /// Remove a collaborator. Actors may always remove themselves.
    pub async fn remove_collaborator(
        &self,
        actor: UserId,
        board_id: i64,
        user_id: UserId,
    ) -> BoardResult<Vec<Collaborator>> {
        self.change_membership(actor, board_id, MembershipAction::Remove { user_id })
            .await
    }

    async fn change_membership(
        &self,
        actor: UserId,
        board_id: i64,
        action: MembershipAction,
    ) -> BoardResult<Vec<Collaborator>> {
        let _lock = self.locks.acquire(LockKey::Board(board_id)).await;
        let notifier = self.notifier.clone();
        let cap = self.limits.max_boards_per_user;
        self.db
            .call(move |db| {
                let mut uow = db.begin()?;
                let collaborators = authorize(&uow, board_id, actor)?;
                let changes = membership::evaluate(&collaborators, actor, action)?;
                if changes.is_empty() {
                    return Ok(collaborators);
                }
                if let MembershipAction::Add { user_id, .. } = action {
                    membership::check_board_cap(db::count_boards_for_user(&uow, user_id)?, cap)?;
                }
                let details = apply_membership(&uow, board_id, &changes)?;
                db::touch_board(&uow, board_id)?;
                notifier.publish(
                    &mut uow,
                    ChangeEvent::new(EventType::BoardUpdated, board_id, board_id).with_details(details),
                );
                let updated = db::list_collaborators(&uow, board_id)?;
                uow.commit()?;
                tracing::info!(board_id, actor, ?action, "membership changed");
                Ok(updated)
            })
            .await
    }

    // ── Events ────────────────────────────────────────────────────────

    /// Register `actor` for change events on `board_id`.
    pub async fn subscribe(&self, actor: UserId, board_id: i64) -> BoardResult<Subscription> {
        self.db
            .call(move |db| authorize(db.conn(), board_id, actor).map(|_| ()))
            .await?;
        Ok(self.registry().register(board_id))
    }
}
