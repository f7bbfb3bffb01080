//! Caller identity and role.

use std::fmt;
use std::str::FromStr;

/// Role carried in the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Role {
    /// Regular account; sees only its own files and folders.
    #[default]
    Member = 0,
    /// Staff account; sees and manages everything.
    Admin = 1,
}

impl Role {
    /// Convert role to its token string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "member" | "user" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// The authenticated principal on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Owner id from the token subject.
    pub user_id: String,
    /// Role from the token.
    pub role: Role,
}

impl Caller {
    /// Create a caller with the member role.
    pub fn member(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Member,
        }
    }

    /// Create a caller with the admin role.
    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Admin,
        }
    }

    /// Whether this caller is an admin.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether this caller may read or change a resource owned by `owner_id`.
    pub fn can_access(&self, owner_id: &str) -> bool {
        self.is_admin() || self.user_id == owner_id
    }

    /// Owner filter for listings: `None` for admins, the caller's id otherwise.
    pub fn owner_scope(&self) -> Option<&str> {
        if self.is_admin() {
            None
        } else {
            Some(&self.user_id)
        }
    }
}
