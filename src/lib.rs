//! Dynamic filter, sort and pagination query compilation for the CRM graph API.
//!
//! A list request is translated into a [`FilterNode`] tree and a list of
//! [`SortRule`]s, compiled into Cypher fragments with collision-free parameter
//! names, and assembled by [`QueryAssembler`] into a count query and a page
//! query that share one parameter map. [`execute`] runs both inside one read
//! transaction and returns a [`PaginatedNodes`] envelope.

#![warn(missing_docs)]

pub mod assembler;
pub mod config;
pub mod error;
pub mod expr;
pub mod filter;
pub mod input;
pub mod memory;
pub mod pagination;
pub mod pattern;
pub mod registry;
pub mod sort;
pub mod telemetry;
pub mod value;
pub mod views;

pub use assembler::{assemble, FilterScope, QueryAssembler, QueryPlan};
pub use error::{QueryError, RegistryError, Result};
pub use filter::{Comparator, FilterNode, LeafComparison, LogicalOperator};
pub use input::{FilterInput, FilterItem, ListRequest, Operation, SortInput, Translator};
pub use pagination::{execute, execute_read, GraphSession, PaginatedNodes, Pagination, ReadTransaction};
pub use pattern::{BasePattern, OptionalJoins, PatternPath};
pub use registry::{EntityKind, FieldMeta, FieldRegistry, ValueKind};
pub use sort::{SortDirection, SortRule};
pub use value::{Params, Value};
pub use views::{View, ViewOptions};
