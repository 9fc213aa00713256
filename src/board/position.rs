//! Position arithmetic for dense, zero-based ordered collections.
//!
//! Everything here is pure: given where an item is and where it should go,
//! compute which neighbours shift and by how much. The storage layer turns
//! each [`Shift`] into a single range `UPDATE`.

use crate::errors::{BoardError, BoardResult};

use super::models::Placement;

/// `MAX(position)` of a container with no live items.
pub const EMPTY_MAX_POSITION: i64 = -1;

/// A single range update over the live items of one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    /// `position >= from` moves up by one (opens a slot).
    IncrementFrom { container_id: i64, from: i64 },
    /// `position > after` moves down by one (closes a gap).
    DecrementAfter { container_id: i64, after: i64 },
    /// `low <= position <= high` moves up by one.
    IncrementInRange { container_id: i64, low: i64, high: i64 },
    /// `low <= position <= high` moves down by one.
    DecrementInRange { container_id: i64, low: i64, high: i64 },
}

impl Shift {
    pub fn container_id(&self) -> i64 {
        match *self {
            Self::IncrementFrom { container_id, .. }
            | Self::DecrementAfter { container_id, .. }
            | Self::IncrementInRange { container_id, .. }
            | Self::DecrementInRange { container_id, .. } => container_id,
        }
    }

    /// Position an item at `position` in `container_id` ends up at.
    pub fn apply(&self, container_id: i64, position: i64) -> i64 {
        if container_id != self.container_id() {
            return position;
        }
        match *self {
            Self::IncrementFrom { from, .. } if position >= from => position + 1,
            Self::DecrementAfter { after, .. } if position > after => position - 1,
            Self::IncrementInRange { low, high, .. } if (low..=high).contains(&position) => {
                position + 1
            }
            Self::DecrementInRange { low, high, .. } if (low..=high).contains(&position) => {
                position - 1
            }
            _ => position,
        }
    }
}

/// Neighbour shifts plus the moved item's final slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    pub shifts: Vec<Shift>,
    pub target: Placement,
}

/// Plan a move from `from` to `to`. Returns `None` when the move is a no-op.
///
/// The moved item itself is never inside any planned range: same-container
/// ranges exclude the old slot, and cross-container shifts touch the old
/// container strictly after it and the new container before re-homing.
pub fn plan_move(from: Placement, to: Placement) -> Option<MovePlan> {
    if from == to {
        return None;
    }

    let shifts = if from.container_id == to.container_id {
        let container_id = from.container_id;
        if to.position > from.position {
            vec![Shift::DecrementInRange {
                container_id,
                low: from.position + 1,
                high: to.position,
            }]
        } else {
            vec![Shift::IncrementInRange {
                container_id,
                low: to.position,
                high: from.position - 1,
            }]
        }
    } else {
        vec![removal_shift(from), insertion_shift(to)]
    };

    Some(MovePlan { shifts, target: to })
}

/// Shift that closes the gap left by removing the item at `slot`.
pub fn removal_shift(slot: Placement) -> Shift {
    Shift::DecrementAfter {
        container_id: slot.container_id,
        after: slot.position,
    }
}

/// Shift that opens `slot` for an inserted item.
pub fn insertion_shift(slot: Placement) -> Shift {
    Shift::IncrementFrom {
        container_id: slot.container_id,
        from: slot.position,
    }
}

/// Slot for an item appended after the current maximum.
pub fn append_position(max_position: Option<i64>) -> i64 {
    max_position.unwrap_or(EMPTY_MAX_POSITION) + 1
}

/// Validate a move destination against the live item count.
///
/// Within one container the item already occupies a slot, so the valid range
/// is `0..live_count`. Across containers the destination gains a slot, so
/// appending (`position == live_count`) is allowed.
pub fn check_move_bounds(requested: i64, live_count: i64, same_container: bool) -> BoardResult<()> {
    let max = if same_container {
        live_count - 1
    } else {
        live_count
    };
    check_range(requested, max)
}

/// Validate an explicit insertion position. Appending is allowed.
pub fn check_insert_bounds(requested: i64, live_count: i64) -> BoardResult<()> {
    check_range(requested, live_count)
}

fn check_range(requested: i64, max: i64) -> BoardResult<()> {
    if requested < 0 || requested > max {
        return Err(BoardError::OutOfRange {
            requested,
            max: max.max(0),
        });
    }
    Ok(())
}
