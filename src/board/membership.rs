//! Board membership policy.
//!
//! A pure decision function over the current collaborator set. Storage is
//! not touched here: the service layer loads the collaborators, asks
//! [`evaluate`] what should happen, and applies the returned changes.
//!
//! Rules:
//! - a board always keeps at least one collaborator;
//! - while a board has two or more collaborators it keeps at least one admin;
//! - removing the last admin promotes a remaining collaborator, whereas
//!   demoting the last admin is refused outright;
//! - the sole collaborator can only be (re)assigned `ADMIN`.

use thiserror::Error;

use crate::errors::{BoardError, BoardResult};

use super::models::{Collaborator, Role, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipAction {
    Add { user_id: UserId, role: Role },
    Remove { user_id: UserId },
    ChangeRole { user_id: UserId, role: Role },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Added { user_id: UserId, role: Role },
    Removed { user_id: UserId },
    RoleChanged { user_id: UserId, role: Role },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("User {0} is not a collaborator on this board")]
    NotCollaborator(UserId),

    #[error("Only board admins can manage collaborators")]
    RequiresAdmin,

    #[error("User {0} is not a collaborator")]
    UnknownCollaborator(UserId),

    #[error("User {0} is already a collaborator")]
    AlreadyCollaborator(UserId),

    #[error("Cannot remove the only collaborator of a board")]
    SoleCollaborator,

    #[error("Cannot demote the last admin of a board")]
    LastAdmin,

    #[error("The only collaborator of a board must remain an admin")]
    SoleCollaboratorMustBeAdmin,
}

impl From<Denial> for BoardError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::NotCollaborator(_) | Denial::RequiresAdmin => {
                BoardError::Forbidden(denial.to_string())
            }
            Denial::UnknownCollaborator(user_id) => BoardError::not_found("Collaborator", user_id),
            Denial::AlreadyCollaborator(_)
            | Denial::SoleCollaborator
            | Denial::LastAdmin
            | Denial::SoleCollaboratorMustBeAdmin => BoardError::Conflict(denial.to_string()),
        }
    }
}

fn role_of(collaborators: &[Collaborator], user_id: UserId) -> Option<Role> {
    collaborators
        .iter()
        .find(|c| c.user_id == user_id)
        .map(|c| c.role)
}

/// Role of `actor` on the board, or a denial if they are not a collaborator.
pub fn require_collaborator(collaborators: &[Collaborator], actor: UserId) -> Result<Role, Denial> {
    role_of(collaborators, actor).ok_or(Denial::NotCollaborator(actor))
}

pub fn require_admin(collaborators: &[Collaborator], actor: UserId) -> Result<(), Denial> {
    match require_collaborator(collaborators, actor)? {
        Role::Admin => Ok(()),
        Role::Member => Err(Denial::RequiresAdmin),
    }
}

/// Decide the membership changes for `action` taken by `actor`.
///
/// An empty change list means the action is an allowed no-op.
pub fn evaluate(
    collaborators: &[Collaborator],
    actor: UserId,
    action: MembershipAction,
) -> Result<Vec<MembershipChange>, Denial> {
    match action {
        MembershipAction::Add { user_id, role } => {
            require_admin(collaborators, actor)?;
            if role_of(collaborators, user_id).is_some() {
                return Err(Denial::AlreadyCollaborator(user_id));
            }
            Ok(vec![MembershipChange::Added { user_id, role }])
        }
        MembershipAction::Remove { user_id } => {
            if actor != user_id {
                require_admin(collaborators, actor)?;
            } else {
                require_collaborator(collaborators, actor)?;
            }
            let target_role =
                role_of(collaborators, user_id).ok_or(Denial::UnknownCollaborator(user_id))?;
            if collaborators.len() == 1 {
                return Err(Denial::SoleCollaborator);
            }

            let mut changes = vec![MembershipChange::Removed { user_id }];
            let remaining = collaborators.iter().filter(|c| c.user_id != user_id);
            let admin_remains = remaining.clone().any(|c| c.role == Role::Admin);
            if target_role == Role::Admin && !admin_remains {
                // Any remaining collaborator will do; the lowest id keeps it
                // deterministic.
                if let Some(heir) = remaining.min_by_key(|c| c.user_id) {
                    changes.push(MembershipChange::RoleChanged {
                        user_id: heir.user_id,
                        role: Role::Admin,
                    });
                }
            }
            Ok(changes)
        }
        MembershipAction::ChangeRole { user_id, role } => {
            require_admin(collaborators, actor)?;
            let current =
                role_of(collaborators, user_id).ok_or(Denial::UnknownCollaborator(user_id))?;
            if collaborators.len() == 1 && role != Role::Admin {
                return Err(Denial::SoleCollaboratorMustBeAdmin);
            }
            if current == role {
                return Ok(Vec::new());
            }
            let other_admin = collaborators
                .iter()
                .any(|c| c.user_id != user_id && c.role == Role::Admin);
            if current == Role::Admin && !other_admin {
                return Err(Denial::LastAdmin);
            }
            Ok(vec![MembershipChange::RoleChanged { user_id, role }])
        }
    }
}

/// Enforce the per-user board-membership cap before joining or creating a
/// board.
pub fn check_board_cap(current_boards: i64, cap: u32) -> BoardResult<()> {
    if current_boards >= i64::from(cap) {
        return Err(BoardError::LimitExceeded { limit: cap });
    }
    Ok(())
}
