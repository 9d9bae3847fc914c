// Role resolution for signed-in identities

use crate::models::{Role, SystemUserAccount};

/// Role given to identities with no account row
pub const DEFAULT_ROLE: Role = Role::Reader;

/// Second step of role lookup: the account's role, or the default when
/// the first step (find by auth id) found nothing.
pub fn effective_role(account: Option<&SystemUserAccount>) -> Role {
    account.map_or(DEFAULT_ROLE, |a| a.role)
}

pub fn can_delete(role: Role) -> bool {
    role.is_admin()
}
