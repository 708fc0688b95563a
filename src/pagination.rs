//! Pagination envelope and the read-transaction seam to graph drivers.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::assembler::{check_page, LogicalQuery, QueryPlan};
use crate::error::{DriverError, QueryError, Result, Stage};
use crate::value::Params;

/// What a statement returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Returns {
    /// A single `count(distinct(root))` value.
    Count,
    /// Distinct roots within the window.
    Page {
        /// Rows skipped.
        skip: i64,
        /// Maximum rows returned.
        limit: i64,
    },
}

/// One statement of a plan as handed to a driver.
#[derive(Clone, Copy, Debug)]
pub struct CompiledQuery<'a> {
    /// Cypher text.
    pub text: &'a str,
    /// Shared parameter map.
    pub parameters: &'a Params,
    /// Structured form for engines that do not parse text.
    pub logical: &'a LogicalQuery,
    /// Variable bound to the returned entity.
    pub root_alias: &'a str,
    /// Result shape.
    pub returns: Returns,
}

impl QueryPlan {
    /// The count statement.
    pub fn count_query(&self) -> CompiledQuery<'_> {
        self.compiled(&self.count_query_text, Returns::Count)
    }

    /// The page statement.
    pub fn page_query(&self) -> CompiledQuery<'_> {
        self.compiled(
            &self.page_query_text,
            Returns::Page {
                skip: self.skip,
                limit: self.limit,
            },
        )
    }

    fn compiled<'a>(&'a self, text: &'a str, returns: Returns) -> CompiledQuery<'a> {
        CompiledQuery {
            text,
            parameters: &self.parameters,
            logical: &self.logical,
            root_alias: &self.root_alias,
            returns,
        }
    }
}

/// Open read transaction of a graph driver.
///
/// Both statements of a plan run on the same transaction so they observe one
/// snapshot.
pub trait ReadTransaction {
    /// Opaque node handle returned by the driver.
    type Node;

    /// Runs a [`Returns::Count`] statement.
    fn count(&mut self, query: &CompiledQuery<'_>) -> std::result::Result<i64, DriverError>;

    /// Runs a [`Returns::Page`] statement.
    fn nodes(&mut self, query: &CompiledQuery<'_>)
        -> std::result::Result<Vec<Self::Node>, DriverError>;
}

/// Driver session able to open read transactions.
pub trait GraphSession {
    /// Opaque node handle returned by the driver.
    type Node;
    /// Transaction type borrowed from the session.
    type Tx<'s>: ReadTransaction<Node = Self::Node>
    where
        Self: 's;

    /// Opens a read transaction.
    fn begin_read(&self) -> std::result::Result<Self::Tx<'_>, DriverError>;
}

/// `{totalCount, items}` returned to callers of a paginated query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedNodes<N> {
    /// Rows matching the filter, ignoring the window.
    pub total_count: i64,
    /// Nodes of the requested window, in order.
    pub items: Vec<N>,
}

impl<N> PaginatedNodes<N> {
    /// Number of pages of size `limit` needed to cover `total_count`.
    pub fn total_pages(&self, limit: i64) -> i64 {
        if limit <= 0 || self.total_count <= 0 {
            return 0;
        }
        self.total_count / limit + i64::from(self.total_count % limit != 0)
    }

    /// Maps every item, keeping the count.
    pub fn map<M>(self, f: impl FnMut(N) -> M) -> PaginatedNodes<M> {
        PaginatedNodes {
            total_count: self.total_count,
            items: self.items.into_iter().map(f).collect(),
        }
    }
}

/// 1-based page request as exposed by list endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Page number, starting at 1.
    pub page: i64,
    /// Page size.
    pub limit: i64,
}

impl Pagination {
    /// Validates a page request.
    pub fn new(page: i64, limit: i64) -> Result<Self> {
        if page < 1 {
            return Err(QueryError::InvalidPage {
                skip: page.saturating_sub(1).saturating_mul(limit),
                limit,
                reason: "page numbers start at 1",
            });
        }
        check_page(0, limit)?;
        Ok(Self { page, limit })
    }

    /// Rows skipped before this page.
    pub fn skip(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// Runs the count then the page statement of `plan` on `tx`.
pub fn execute<T: ReadTransaction>(plan: &QueryPlan, tx: &mut T) -> Result<PaginatedNodes<T::Node>> {
    check_page(plan.skip, plan.limit)?;
    let total_count = tx
        .count(&plan.count_query())
        .map_err(|source| execution_error(plan, Stage::Count, source))?;
    let items = tx
        .nodes(&plan.page_query())
        .map_err(|source| execution_error(plan, Stage::Page, source))?;
    debug!(
        entity = %plan.entity,
        total_count,
        returned = items.len(),
        skip = plan.skip,
        limit = plan.limit,
        "executed paginated query"
    );
    Ok(PaginatedNodes { total_count, items })
}

/// Opens one read transaction on `session` and [`execute`]s `plan` inside it.
pub fn execute_read<S: GraphSession>(session: &S, plan: &QueryPlan) -> Result<PaginatedNodes<S::Node>> {
    check_page(plan.skip, plan.limit)?;
    let mut tx = session
        .begin_read()
        .map_err(|source| execution_error(plan, Stage::Count, source))?;
    execute(plan, &mut tx)
}

fn execution_error(plan: &QueryPlan, stage: Stage, source: DriverError) -> QueryError {
    warn!(
        entity = %plan.entity,
        stage = %stage,
        filters = ?plan.active_filters,
        error = %source,
        "graph driver failed"
    );
    QueryError::QueryExecution {
        entity: plan.entity,
        filters: plan.active_filters.clone(),
        stage,
        source,
    }
}
