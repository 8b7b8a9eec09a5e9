//! Authorization policy
//!
//! A single decision table mapping an actor's roles and a requested action to
//! allow or deny. Services call [`authorize`] before touching any store; nothing
//! here performs I/O.

use std::collections::BTreeSet;

use crate::{
    error::AppError,
    models::{
        role::{holds_staff_role, Role},
        user::User,
    },
};

/// The caller of an operation, resolved from its user record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub username: String,
    pub roles: BTreeSet<Role>,
}

impl Actor {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_staff(&self) -> bool {
        holds_staff_role(&self.roles)
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Actor {
            id: user.id,
            username: user.username.clone(),
            roles: user.roles.clone(),
        }
    }
}

/// Actions gated by the policy, with the targets the decision depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action<'a> {
    ViewOwnProfile,
    UpdateOwnProfile,
    ViewOwnHistory,
    /// List, look up or update arbitrary users
    AdministerUsers,
    /// Create an account holding `requested_roles`
    CreateUser { requested_roles: &'a BTreeSet<Role> },
    /// Replace another account's role set
    AssignRoles { roles: &'a BTreeSet<Role> },
    /// Borrow with no explicit borrower
    BorrowForSelf,
    /// Borrow naming an explicit borrower
    BorrowOnBehalf,
    /// Hand a book to a borrower holding `borrower_roles`
    LendTo { borrower_roles: &'a BTreeSet<Role> },
    ReturnBorrowing { owner_id: i64 },
    ViewBorrowing { owner_id: i64 },
    ViewUserHistory { user_id: i64 },
    ListActiveBorrowings,
    ListOverdueBorrowings,
    ListReturnedBorrowings,
    BrowseCatalog,
    ManageCatalog,
}

/// Why an action was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    Unauthenticated,
    Forbidden(String),
    /// The action is allowed but its target is not acceptable
    InvalidTarget(String),
    RoleCreation(Role),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Denial),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl From<Denial> for AppError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::Unauthenticated => AppError::Authentication("Authentication required".to_string()),
            Denial::Forbidden(msg) => AppError::Authorization(msg),
            Denial::InvalidTarget(msg) => AppError::InvalidArgument(msg),
            Denial::RoleCreation(role) => AppError::RoleCreation(role),
        }
    }
}

fn deny(message: &str) -> Decision {
    Decision::Deny(Denial::Forbidden(message.to_string()))
}

fn staff_only(actor: &Actor, message: &str) -> Decision {
    if actor.is_staff() {
        Decision::Allow
    } else {
        deny(message)
    }
}

fn owner_or_staff(actor: &Actor, owner_id: i64, message: &str) -> Decision {
    if actor.id == owner_id || actor.is_staff() {
        Decision::Allow
    } else {
        deny(message)
    }
}

/// Any role beyond PATRON needs an ADMIN actor
fn role_grant(actor: Option<&Actor>, roles: &BTreeSet<Role>) -> Decision {
    let is_admin = actor.map_or(false, |a| a.has_role(Role::Admin));
    match roles.iter().find(|r| **r != Role::Patron) {
        Some(role) if !is_admin => Decision::Deny(Denial::RoleCreation(*role)),
        _ => Decision::Allow,
    }
}

/// Decide whether `actor` may perform `action`.
///
/// `None` is an anonymous caller; the only thing it may do is create a
/// PATRON account (self-registration).
pub fn can_perform(actor: Option<&Actor>, action: &Action<'_>) -> Decision {
    if let Action::CreateUser { requested_roles } = action {
        return role_grant(actor, requested_roles);
    }

    let Some(actor) = actor else {
        return Decision::Deny(Denial::Unauthenticated);
    };

    match action {
        Action::ViewOwnProfile | Action::UpdateOwnProfile | Action::ViewOwnHistory => {
            Decision::Allow
        }
        Action::ViewUserHistory { user_id } if *user_id == actor.id => Decision::Allow,

        Action::AdministerUsers => staff_only(
            actor,
            "Managing other users requires the ADMIN or LIBRARIAN role",
        ),
        Action::CreateUser { requested_roles } => role_grant(Some(actor), requested_roles),
        Action::AssignRoles { roles } => match staff_only(
            actor,
            "Changing roles requires the ADMIN or LIBRARIAN role",
        ) {
            Decision::Allow => role_grant(Some(actor), roles),
            denied => denied,
        },

        Action::BorrowForSelf => {
            if actor.is_staff() {
                deny("Staff accounts cannot borrow for themselves; specify the patron's user id")
            } else {
                Decision::Allow
            }
        }
        Action::BorrowOnBehalf => staff_only(
            actor,
            "Only ADMIN or LIBRARIAN may borrow on behalf of another user",
        ),
        Action::LendTo { borrower_roles } => {
            if holds_staff_role(borrower_roles) || !borrower_roles.contains(&Role::Patron) {
                Decision::Deny(Denial::InvalidTarget(
                    "Books can only be borrowed for PATRON accounts".to_string(),
                ))
            } else {
                Decision::Allow
            }
        }

        Action::ReturnBorrowing { owner_id } => owner_or_staff(
            actor,
            *owner_id,
            "Only the borrower or staff may return this borrowing",
        ),
        Action::ViewBorrowing { owner_id } => owner_or_staff(
            actor,
            *owner_id,
            "Only the borrower or staff may view this borrowing",
        ),
        Action::ViewUserHistory { .. } => staff_only(
            actor,
            "Viewing another user's history requires the ADMIN or LIBRARIAN role",
        ),
        Action::ListActiveBorrowings
        | Action::ListOverdueBorrowings
        | Action::ListReturnedBorrowings => staff_only(
            actor,
            "Borrowing reports require the ADMIN or LIBRARIAN role",
        ),

        Action::BrowseCatalog => Decision::Allow,
        Action::ManageCatalog => staff_only(
            actor,
            "Catalog changes require the ADMIN or LIBRARIAN role",
        ),
    }
}

/// [`can_perform`] as a `Result`, for use with `?`
pub fn authorize(actor: Option<&Actor>, action: &Action<'_>) -> Result<(), AppError> {
    match can_perform(actor, action) {
        Decision::Allow => Ok(()),
        Decision::Deny(denial) => {
            tracing::debug!(?action, ?denial, "authorization denied");
            Err(denial.into())
        }
    }
}
