use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type UserId = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub id: i64,
    pub name: String,
    pub revision: i64,
    pub date_modified: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Column {
    pub id: i64,
    pub board_id: i64,
    pub name: String,
    pub position: i64,
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub column_id: i64,
    pub name: String,
    pub description: String,
    pub position: i64,
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Which ordered collection an item lives in.
///
/// Columns are ordered within a board, tasks within a column. Both share the
/// same position arithmetic and differ only in table and container key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Column,
    Task,
}

impl ItemKind {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Column => "board_columns",
            Self::Task => "tasks",
        }
    }

    pub fn container_key(&self) -> &'static str {
        match self {
            Self::Column => "board_id",
            Self::Task => "column_id",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Column => "Column",
            Self::Task => "Task",
        }
    }

    pub fn container_label(&self) -> &'static str {
        match self {
            Self::Column => "Board",
            Self::Task => "Column",
        }
    }

    pub fn created_event(&self) -> EventType {
        match self {
            Self::Column => EventType::ColumnCreated,
            Self::Task => EventType::TaskCreated,
        }
    }

    pub fn updated_event(&self) -> EventType {
        match self {
            Self::Column => EventType::ColumnUpdated,
            Self::Task => EventType::TaskUpdated,
        }
    }

    pub fn moved_event(&self) -> EventType {
        match self {
            Self::Column => EventType::ColumnMoved,
            Self::Task => EventType::TaskMoved,
        }
    }

    pub fn deleted_event(&self) -> EventType {
        match self {
            Self::Column => EventType::ColumnDeleted,
            Self::Task => EventType::TaskDeleted,
        }
    }
}

/// Storage view of an ordered row, shared by columns and tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderedItem {
    pub kind: ItemKind,
    pub id: i64,
    pub container_id: i64,
    pub board_id: i64,
    pub position: i64,
    pub archived: bool,
}

impl OrderedItem {
    pub fn placement(&self) -> Placement {
        Placement {
            container_id: self.container_id,
            position: self.position,
        }
    }
}

/// A slot in an ordered collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub container_id: i64,
    pub position: i64,
}

/// Requested destination for a move. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MoveIntent {
    pub position: i64,
    #[serde(default)]
    pub container_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The item already sat at the requested slot; nothing was written.
    Unchanged(OrderedItem),
    Moved {
        item: OrderedItem,
        from: Placement,
    },
}

impl MoveOutcome {
    pub fn item(&self) -> &OrderedItem {
        match self {
            Self::Unchanged(item) | Self::Moved { item, .. } => item,
        }
    }
}

// ── Membership ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Member => "MEMBER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "MEMBER" => Ok(Self::Member),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collaborator {
    pub board_id: i64,
    pub user_id: UserId,
    pub role: Role,
    pub joined_at: String,
}

// ── Change events ─────────────────────────────────────────────────────

/// Fixed vocabulary of change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    TaskCreated,
    TaskUpdated,
    TaskMoved,
    TaskDeleted,
    ColumnCreated,
    ColumnUpdated,
    ColumnDeleted,
    ColumnMoved,
    BoardUpdated,
    LabelCreated,
    LabelUpdated,
    LabelDeleted,
    CommentCreated,
    CommentUpdated,
    CommentDeleted,
    ActivityLogged,
}

/// Notification describing a committed mutation. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub board_id: i64,
    pub entity_id: i64,
    pub details: Option<String>,
}

impl ChangeEvent {
    pub fn new(event_type: EventType, board_id: i64, entity_id: i64) -> Self {
        Self {
            event_type,
            board_id,
            entity_id,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

// API view types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardView {
    pub board: Board,
    pub columns: Vec<ColumnView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnView {
    #[serde(flatten)]
    pub column: Column,
    pub tasks: Vec<Task>,
}
