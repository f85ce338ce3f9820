use records::Role;
use uuid::Uuid;

use crate::error::Error;

/// Authenticated caller identity, passed explicitly into every engine
/// operation instead of being read from ambient session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn student(id: Uuid) -> Self {
        Identity {
            id,
            role: Role::Student,
        }
    }

    pub fn admin(id: Uuid) -> Self {
        Identity {
            id,
            role: Role::Admin,
        }
    }

    /// Attempt-taking operations are student-only.
    pub fn require_student(&self) -> Result<(), Error> {
        match self.role {
            Role::Student => Ok(()),
            Role::Admin => Err(Error::Authorization(
                "attempt-taking requires the student role".into(),
            )),
        }
    }
}

/// Source of the current identity, the seam to the session provider.
pub trait IdentityProvider: Send + Sync {
    /// `None` means anonymous.
    fn current(&self) -> Option<Identity>;
}

/// Fixed identity, used by tests and single-user embeddings.
pub struct StaticIdentity(pub Identity);

impl IdentityProvider for StaticIdentity {
    fn current(&self) -> Option<Identity> {
        Some(self.0)
    }
}

/// Resolves the provider's identity or fails with `Authorization`.
pub fn require_identity(provider: &dyn IdentityProvider) -> Result<Identity, Error> {
    provider
        .current()
        .ok_or_else(|| Error::Authorization("not signed in".into()))
}
