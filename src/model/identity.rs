use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::error::{Error, Result};

use super::id::VoterId;

/// Privilege levels, as asserted by the identity provider.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Role {
    Student = 0,
    Admin = 1,
}

impl Display for Role {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Student => "student",
                Self::Admin => "admin",
            }
        )
    }
}

/// The authenticated subject making a request.
///
/// This is passed explicitly into every engine call that cares who is
/// asking; the engine trusts it and never re-authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub voter_id: VoterId,
    pub role: Role,
}

impl Identity {
    pub fn new(voter_id: impl Into<VoterId>, role: Role) -> Self {
        Self {
            voter_id: voter_id.into(),
            role,
        }
    }

    /// The identity used by background tasks acting on behalf of the system.
    pub fn system() -> Self {
        Self::new("system", Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fail with [`Error::Unauthorized`] unless this identity is an admin.
    pub fn require_admin(&self, action: &str) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Error::Unauthorized(format!(
                "{} '{}' may not {}",
                self.role, self.voter_id, action
            )))
        }
    }
}
