use std::collections::BTreeMap;

use keeper_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::lock_id::{LockId, OwnerIdentity};

/// Late-bound route values available to scope templates at invocation time.
pub type RouteValues = BTreeMap<String, String>;

/// Boundary at which a singleton lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingletonMode {
    /// Lock is held for each invocation of the job body.
    Function,
    /// Lock is held for the full running lifetime of the trigger listener.
    Trigger,
}

impl SingletonMode {
    /// Returns stable mode value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Trigger => "trigger",
        }
    }
}

/// Scope template that may reference route values as `{name}` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScopeTemplate(String);

impl TryFrom<String> for ScopeTemplate {
    type Error = AppError;

    fn try_from(value: String) -> AppResult<Self> {
        Self::new(value)
    }
}

impl From<ScopeTemplate> for String {
    fn from(value: ScopeTemplate) -> Self {
        value.0
    }
}

enum Segment<'a> {
    Literal(&'a str),
    Parameter(&'a str),
}

impl ScopeTemplate {
    /// Creates a validated scope template.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let template = Self(value.into());
        template.segments()?;
        Ok(template)
    }

    /// Returns the raw template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns true when the template needs route values to resolve.
    #[must_use]
    pub fn has_parameters(&self) -> bool {
        self.segments()
            .map(|segments| {
                segments
                    .iter()
                    .any(|segment| matches!(segment, Segment::Parameter(_)))
            })
            .unwrap_or(false)
    }

    /// Substitutes every `{name}` placeholder with its route value.
    pub fn resolve(&self, route_values: &RouteValues) -> AppResult<String> {
        let mut resolved = String::with_capacity(self.0.len());
        for segment in self.segments()? {
            match segment {
                Segment::Literal(text) => resolved.push_str(text),
                Segment::Parameter(name) => {
                    let value = route_values.get(name).ok_or_else(|| {
                        AppError::NotFound(format!(
                            "route value '{name}' required by singleton scope '{}'",
                            self.0
                        ))
                    })?;
                    resolved.push_str(value.as_str());
                }
            }
        }

        Ok(resolved)
    }

    fn segments(&self) -> AppResult<Vec<Segment<'_>>> {
        let mut segments = Vec::new();
        let mut rest = self.0.as_str();

        while let Some(open) = rest.find(['{', '}']) {
            if rest[open..].starts_with('}') {
                return Err(AppError::Validation(format!(
                    "singleton scope '{}' has an unmatched '}}'",
                    self.0
                )));
            }

            if open > 0 {
                segments.push(Segment::Literal(&rest[..open]));
            }

            let after_open = &rest[open + 1..];
            let close = after_open.find('}').ok_or_else(|| {
                AppError::Validation(format!(
                    "singleton scope '{}' has an unterminated parameter",
                    self.0
                ))
            })?;
            let name = after_open[..close].trim();
            if name.is_empty() || name.contains('{') {
                return Err(AppError::Validation(format!(
                    "singleton scope '{}' has an invalid parameter name",
                    self.0
                )));
            }

            segments.push(Segment::Parameter(name));
            rest = &after_open[close + 1..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest));
        }

        Ok(segments)
    }
}

/// Singleton configuration attached to one job definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingletonPolicy {
    mode: SingletonMode,
    #[serde(default)]
    scope: ScopeTemplate,
}

impl SingletonPolicy {
    /// Creates a policy with an unscoped lock.
    #[must_use]
    pub fn new(mode: SingletonMode) -> Self {
        Self {
            mode,
            scope: ScopeTemplate::default(),
        }
    }

    /// Creates a policy with a scope template.
    #[must_use]
    pub fn scoped(mode: SingletonMode, scope: ScopeTemplate) -> Self {
        Self { mode, scope }
    }

    /// Returns the guard mode.
    #[must_use]
    pub fn mode(&self) -> SingletonMode {
        self.mode
    }

    /// Returns the scope template.
    #[must_use]
    pub fn scope(&self) -> &ScopeTemplate {
        &self.scope
    }

    /// Resolves the scope template and formats the lock id for one owner.
    pub fn lock_id(&self, owner: &OwnerIdentity, route_values: &RouteValues) -> AppResult<LockId> {
        let resolved_scope = self.scope.resolve(route_values)?;
        Ok(LockId::for_owner(owner, resolved_scope.as_str()))
    }
}
