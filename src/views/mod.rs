//! Endpoint wiring: each list view fixes its base pattern, its optional joins
//! and the mapping from request properties to filter scopes and sort rules.

pub mod contact;
pub mod organization;

use std::fmt;
use std::str::FromStr;

use crate::assembler::QueryPlan;
use crate::error::{QueryError, Result};
use crate::input::{FilterInput, FilterItem, ListRequest, Operation};
use crate::pagination::Pagination;
use crate::registry::{EntityKind, FieldRegistry};

pub use contact::ContactView;
pub use organization::{OrganizationView, RenewalLikelihood};

/// Request-independent knobs shared by all views.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewOptions {
    /// Page size applied when the request carries no pagination.
    pub default_limit: i64,
    /// Largest page size accepted.
    pub max_limit: Option<i64>,
    /// Case sensitivity for string leaves and sorts that do not specify it.
    pub case_sensitive_default: bool,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            default_limit: crate::assembler::DEFAULT_PAGE_LIMIT,
            max_limit: None,
            case_sensitive_default: false,
        }
    }
}

impl ViewOptions {
    /// Validated `(skip, limit)` for a request.
    pub fn window(&self, pagination: Option<Pagination>) -> Result<(i64, i64)> {
        let page = match pagination {
            Some(requested) => Pagination::new(requested.page, requested.limit)?,
            None => Pagination::new(1, self.default_limit)?,
        };
        if let Some(max) = self.max_limit {
            if page.limit > max {
                return Err(QueryError::InvalidPage {
                    skip: page.skip(),
                    limit: page.limit,
                    reason: "limit exceeds the configured maximum",
                });
            }
        }
        Ok((page.skip(), page.limit))
    }
}

/// List views known to the CLI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum View {
    /// Organization dashboard listing.
    Organizations,
    /// Contact listing.
    Contacts,
}

impl View {
    /// Entity kind returned by the view.
    pub fn entity(self) -> EntityKind {
        match self {
            View::Organizations => EntityKind::Organization,
            View::Contacts => EntityKind::Contact,
        }
    }

    /// Builds the plan for one request.
    pub fn plan(
        self,
        registry: &FieldRegistry,
        tenant: &str,
        request: &ListRequest,
        options: &ViewOptions,
    ) -> Result<QueryPlan> {
        match self {
            View::Organizations => OrganizationView::new().plan(registry, tenant, request, options),
            View::Contacts => ContactView::new().plan(registry, tenant, request, options),
        }
    }
}

impl FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "organizations" | "organization" => Ok(View::Organizations),
            "contacts" | "contact" => Ok(View::Contacts),
            other => Err(format!("unknown view '{other}' (expected organizations or contacts)")),
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Organizations => write!(f, "organizations"),
            View::Contacts => write!(f, "contacts"),
        }
    }
}

/// Splits a request filter into routable leaves (the root leaf and plain AND
/// children) and the structured remainder.
pub(crate) fn split_top_level(filter: &FilterInput) -> (Vec<&FilterItem>, Vec<FilterInput>) {
    let mut items: Vec<&FilterItem> = filter.filter.iter().collect();
    let mut rest = Vec::new();
    for child in &filter.and {
        match (&child.filter, child.and.is_empty() && child.or.is_empty() && child.not.is_none()) {
            (Some(item), true) => items.push(item),
            _ => rest.push(child.clone()),
        }
    }
    if !filter.or.is_empty() || filter.not.is_some() {
        rest.push(FilterInput {
            or: filter.or.clone(),
            not: filter.not.clone(),
            ..FilterInput::default()
        });
    }
    (items, rest)
}

pub(crate) fn forced(item: &FilterItem, operation: Operation, include_empty: bool) -> FilterItem {
    FilterItem {
        operation,
        include_empty,
        ..item.clone()
    }
}
