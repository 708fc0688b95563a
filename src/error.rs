#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

use crate::registry::EntityKind;

/// Boxed error returned by graph drivers across the transaction seam.
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, QueryError>;

/// Statement of a query plan that was running when the driver failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Count,
    Page,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Count => write!(f, "count"),
            Stage::Page => write!(f, "page"),
        }
    }
}

/// Problems detected while building a [`crate::registry::FieldRegistry`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("field '{name}' registered twice for {entity}")]
    DuplicateField { entity: EntityKind, name: String },
    #[error("empty exposed name registered for {entity}")]
    EmptyExposedName { entity: EntityKind },
    #[error("field '{name}' on {entity} maps to invalid property '{property}'")]
    InvalidProperty {
        entity: EntityKind,
        name: String,
        property: String,
    },
}

/// Errors surfaced by the filter/sort/pagination layer.
///
/// Everything except [`QueryError::QueryExecution`] is raised before any
/// statement reaches the database.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Exposed name is not registered for the entity kind.
    #[error("field '{name}' is not registered for {entity}")]
    FieldNotFound { entity: EntityKind, name: String },
    /// A filter or sort rule references an alias no pattern brings into scope.
    #[error("alias '{alias}' is referenced but neither the base pattern nor an optional join binds it")]
    UnknownAlias { alias: String },
    /// Skip/limit supplied by the caller are out of range.
    #[error("invalid page (skip {skip}, limit {limit}): {reason}")]
    InvalidPage {
        skip: i64,
        limit: i64,
        reason: &'static str,
    },
    /// Filter tree or leaf violates a construction invariant.
    #[error("invalid filter: {reason}")]
    InvalidFilter { reason: String },
    /// Two filter scopes would emit the same parameter name.
    #[error("parameter '{name}' emitted by more than one filter scope")]
    DuplicateParameter { name: String },
    /// Startup registration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The graph driver rejected or failed a statement.
    #[error("{stage} query for {entity} failed (filters: [{}]): {source}", filters.join(", "))]
    QueryExecution {
        entity: EntityKind,
        filters: Vec<String>,
        stage: Stage,
        #[source]
        source: DriverError,
    },
}

impl QueryError {
    /// Builds an [`QueryError::InvalidFilter`] from any message.
    pub fn invalid_filter(reason: impl Into<String>) -> Self {
        QueryError::InvalidFilter {
            reason: reason.into(),
        }
    }

    /// Builds an [`QueryError::FieldNotFound`].
    pub fn field_not_found(entity: EntityKind, name: impl Into<String>) -> Self {
        QueryError::FieldNotFound {
            entity,
            name: name.into(),
        }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::FieldNotFound { .. } => "FieldNotFound",
            QueryError::UnknownAlias { .. } => "UnknownAlias",
            QueryError::InvalidPage { .. } => "InvalidPage",
            QueryError::InvalidFilter { .. } => "InvalidFilter",
            QueryError::DuplicateParameter { .. } => "DuplicateParameter",
            QueryError::Registry(_) => "Registry",
            QueryError::QueryExecution { .. } => "QueryExecution",
        }
    }

    /// True when the request input, not the endpoint wiring, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            QueryError::InvalidPage { .. }
                | QueryError::InvalidFilter { .. }
                | QueryError::FieldNotFound { .. }
        )
    }
}

/// Convenience wrapper that formats query errors with their codes.
pub struct QueryErrorWithCode<'a>(pub &'a QueryError);

impl fmt::Display for QueryErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
