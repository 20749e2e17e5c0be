use std::fmt::{Display, Formatter};

use keeper_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Logical owner of a job body: the declaring type plus the member name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerIdentity {
    type_full_name: NonEmptyString,
    member_name: NonEmptyString,
}

impl OwnerIdentity {
    /// Creates a validated owner identity.
    pub fn new(
        type_full_name: impl Into<String>,
        member_name: impl Into<String>,
    ) -> AppResult<Self> {
        let type_full_name = NonEmptyString::new(type_full_name).map_err(|_| {
            AppError::Validation("owner type_full_name must not be empty".to_owned())
        })?;
        let member_name = NonEmptyString::new(member_name)
            .map_err(|_| AppError::Validation("owner member_name must not be empty".to_owned()))?;

        Ok(Self {
            type_full_name,
            member_name,
        })
    }

    /// Returns the declaring type name.
    #[must_use]
    pub fn type_full_name(&self) -> &str {
        self.type_full_name.as_str()
    }

    /// Returns the member name.
    #[must_use]
    pub fn member_name(&self) -> &str {
        self.member_name.as_str()
    }
}

impl Display for OwnerIdentity {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}.{}",
            self.type_full_name.as_str(),
            self.member_name.as_str()
        )
    }
}

/// Key identifying one fleet-wide mutual-exclusion domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockId(String);

impl LockId {
    /// Creates a lock id from an already formatted value.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        NonEmptyString::new(value)
            .map(|value| Self(value.into()))
            .map_err(|_| AppError::Validation("lock id must not be empty".to_owned()))
    }

    /// Formats `{owner}` with an optional `.{scope}` suffix for a non-empty resolved scope.
    #[must_use]
    pub fn for_owner(owner: &OwnerIdentity, resolved_scope: &str) -> Self {
        let mut value = owner.to_string();
        if !resolved_scope.is_empty() {
            value.push('.');
            value.push_str(resolved_scope);
        }

        Self(value)
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for LockId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}
