//! Ownership checks shared by file and folder operations.

use super::Caller;
use crate::{Result, VaultError};

/// Require that the caller owns the resource or is an admin.
///
/// `what` names the resource in the error message.
pub fn require_owner(caller: &Caller, owner_id: &str, what: &str) -> Result<()> {
    if caller.can_access(owner_id) {
        Ok(())
    } else {
        Err(VaultError::Permission(format!(
            "{what} belongs to another user"
        )))
    }
}

/// Whether a file owned by `file_owner` may be placed into a folder owned by
/// `folder_owner`. Admins may cross owners.
pub fn can_place(caller: &Caller, file_owner: &str, folder_owner: &str) -> bool {
    caller.is_admin() || file_owner == folder_owner
}
