//! Task board: ordered columns and tasks with live change notification.
//!
//! ## Overview
//!
//! Boards hold ordered columns; columns hold ordered tasks. Every container
//! keeps its live items at dense, zero-based positions no matter how many
//! clients reorder concurrently, and subscribers of a board hear about a
//! change only once it has committed.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │          │ <─────── │    └─ api.rs  (handlers, Actor, ApiError)        │
//! └──────────┘ WebSocket│         │                                        │
//!       ^               │         v                                        │
//!       │               │  service.rs  (BoardService: lock → tx → commit)  │
//!       │               │         │                                        │
//!       │               │         ├─ executor.rs  (move_item)              │
//!       │               │         ├─ guard.rs     (create/delete/archive)  │
//!       │               │         │     └─ position.rs (pure arithmetic)   │
//!       │               │         └─ membership.rs (collaborator policy)   │
//!       │               │         v                                        │
//!       │               │  db.rs + unit_of_work.rs  (SQLite, hooks)        │
//!       │               │         │ after commit                           │
//!       │               │         v                                        │
//!       └────────────── │  notifier.rs → ws.rs  (registry, heartbeat)      │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module          | Responsibility                                          |
//! |-----------------|---------------------------------------------------------|
//! | `models`        | `Board`, `Column`, `Task`, `ChangeEvent`, `MoveIntent`  |
//! | `locks`         | `ItemLockMap`: per-row async mutexes in a `DashMap`     |
//! | `unit_of_work`  | Transaction wrapper with after-commit/rollback hooks    |
//!
//! ## Typical Request Flow (move task)
//!
//! 1. `PATCH /api/tasks/{id}/move` → `api::move_task()`
//! 2. `BoardService::move_item` waits for the task's row lock, then runs one
//!    closure on the blocking pool.
//! 3. Inside a `BEGIN IMMEDIATE` transaction the actor is checked against the
//!    board's collaborators and `executor::move_item` re-reads the row,
//!    validates bounds, shifts neighbours with range `UPDATE`s, re-homes the
//!    task and bumps the board revision.
//! 4. The `TASK_MOVED` event is parked on the unit of work and delivered to
//!    the board's subscribers after commit.

pub mod api;
pub mod db;
pub mod executor;
pub mod guard;
pub mod locks;
pub mod membership;
pub mod models;
pub mod notifier;
pub mod position;
pub mod server;
pub mod service;
pub mod unit_of_work;
pub mod ws;
