//! Query assembler: turns a pattern, filter scopes and sort rules into the
//! count/page statement pair of a [`QueryPlan`].
//!
//! Both statements are rendered from one shared prefix (`MATCH`, the
//! `OPTIONAL MATCH` clauses that are actually needed, and `WHERE`), so they can
//! only differ in their tails:
//!
//! ```text
//! <prefix> RETURN count(distinct(o))
//! <prefix> RETURN distinct(o) ORDER BY ... SKIP $skip LIMIT $limit
//! ```
//!
//! When a sort key reads a joined alias the page tail projects it first with
//! `WITH o, <aliases> ORDER BY ...` because a `DISTINCT` projection cannot be
//! ordered by variables it does not return.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{QueryError, Result};
use crate::expr::{ident, OrderKey, Predicate};
use crate::filter::{self, FilterNode};
use crate::pattern::{optional_clause, BasePattern, OptionalJoins, PatternPath};
use crate::registry::{EntityKind, FieldRegistry};
use crate::sort::{self, SortRule};
use crate::value::{Params, Value};

/// Parameter holding the number of rows skipped by the page statement.
pub const SKIP_PARAM: &str = "skip";
/// Parameter holding the page size.
pub const LIMIT_PARAM: &str = "limit";
/// Page size used when the caller does not set one.
pub const DEFAULT_PAGE_LIMIT: i64 = 20;

/// Filter subtree compiled against one alias with its own parameter prefix.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterScope {
    alias: String,
    param_prefix: String,
    node: FilterNode,
}

impl FilterScope {
    /// Scope whose leaves default to `alias` and whose parameters are `{param_prefix}{n}`.
    pub fn new(alias: impl Into<String>, param_prefix: impl Into<String>, node: FilterNode) -> Self {
        Self {
            alias: alias.into(),
            param_prefix: param_prefix.into(),
            node,
        }
    }

    /// Scope using the conventional `{alias}_param_` prefix.
    pub fn on(alias: impl Into<String>, node: FilterNode) -> Self {
        let alias = alias.into();
        let param_prefix = format!("{alias}_param_");
        Self::new(alias, param_prefix, node)
    }

    /// Default alias.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Filter tree.
    pub fn node(&self) -> &FilterNode {
        &self.node
    }
}

/// Structured form of a plan for engines that evaluate it without parsing text.
#[derive(Clone, Debug, PartialEq)]
pub struct LogicalQuery {
    /// Mandatory pattern.
    pub base: BasePattern,
    /// Optional joins actually emitted, in emission order.
    pub joins: Vec<(String, PatternPath)>,
    /// Combined `WHERE` predicate.
    pub predicate: Option<Predicate>,
    /// Ordering keys in priority order.
    pub order: Vec<OrderKey>,
}

/// Output of the assembler: two statements sharing one parameter map.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlan {
    /// Statement returning `count(distinct(root))`.
    pub count_query_text: String,
    /// Statement returning one ordered page of distinct roots.
    pub page_query_text: String,
    /// Parameters for both statements, including `skip` and `limit`.
    pub parameters: Params,
    /// Joined aliases brought into scope by filters or sort rules.
    pub required_aliases: BTreeSet<String>,
    /// Variable bound to the returned entity.
    pub root_alias: String,
    /// Returned entity kind.
    pub entity: EntityKind,
    /// Rows skipped by the page statement.
    pub skip: i64,
    /// Page size.
    pub limit: i64,
    /// Logical filter names active in the request, for diagnostics.
    pub active_filters: Vec<String>,
    /// Structured form of both statements.
    #[serde(skip)]
    pub logical: LogicalQuery,
}

/// Builder collecting everything one plan needs.
#[derive(Debug)]
pub struct QueryAssembler<'a> {
    registry: &'a FieldRegistry,
    base: &'a BasePattern,
    joins: &'a OptionalJoins,
    scopes: Vec<FilterScope>,
    rules: Vec<SortRule>,
    skip: i64,
    limit: i64,
    active_filters: Vec<String>,
}

impl<'a> QueryAssembler<'a> {
    /// Starts a plan over `base` with the given optional joins.
    pub fn new(registry: &'a FieldRegistry, base: &'a BasePattern, joins: &'a OptionalJoins) -> Self {
        Self {
            registry,
            base,
            joins,
            scopes: Vec::new(),
            rules: Vec::new(),
            skip: 0,
            limit: DEFAULT_PAGE_LIMIT,
            active_filters: Vec::new(),
        }
    }

    /// Adds a filter scope; scopes are AND-ed in the order they are added.
    pub fn filter(mut self, scope: FilterScope) -> Self {
        self.scopes.push(scope);
        self
    }

    /// Appends sort rules after any already given.
    pub fn sort(mut self, rules: impl IntoIterator<Item = SortRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Sets the page window.
    pub fn page(mut self, skip: i64, limit: i64) -> Self {
        self.skip = skip;
        self.limit = limit;
        self
    }

    /// Records a logical filter name for error context.
    pub fn active_filter(mut self, name: impl Into<String>) -> Self {
        self.active_filters.push(name.into());
        self
    }

    /// Validates and renders the plan.
    pub fn assemble(self) -> Result<QueryPlan> {
        check_page(self.skip, self.limit)?;
        let root = self.base.root_alias();
        let entity = self.base.entity();

        let mut parameters = Params::new();
        let mut predicates = Vec::new();
        let mut aliases = BTreeSet::new();
        for scope in &self.scopes {
            let compiled = filter::compile(&scope.node, &scope.alias, &scope.param_prefix);
            for (name, value) in compiled.params {
                insert_unique(&mut parameters, name, value)?;
            }
            aliases.extend(compiled.aliases);
            predicates.extend(compiled.predicate);
        }
        let predicate = match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(Predicate::And(predicates)),
        };

        let order = sort::compile_or_default(&self.rules, self.registry, entity, root)?;
        aliases.extend(order.aliases.iter().cloned());

        let joins = self.required_joins(&aliases)?;
        let required_aliases: BTreeSet<String> =
            joins.iter().map(|(alias, _)| alias.clone()).collect();

        insert_unique(&mut parameters, SKIP_PARAM.to_owned(), Value::Int(self.skip))?;
        insert_unique(&mut parameters, LIMIT_PARAM.to_owned(), Value::Int(self.limit))?;

        let mut clauses = vec![self.base.to_string()];
        clauses.extend(joins.iter().map(|(_, path)| optional_clause(path)));
        if let Some(predicate) = &predicate {
            clauses.push(format!("WHERE {predicate}"));
        }
        let prefix = clauses.join(" ");
        let root_ident = ident(root);

        let count_query_text = format!("{prefix} RETURN count(distinct({root_ident}))");
        let projected: Vec<&str> = order
            .aliases
            .iter()
            .map(String::as_str)
            .filter(|alias| *alias != root)
            .collect();
        let page_query_text = if projected.is_empty() {
            format!(
                "{prefix} RETURN distinct({root_ident}) {} SKIP ${SKIP_PARAM} LIMIT ${LIMIT_PARAM}",
                order.fragment
            )
        } else {
            let with: Vec<_> = std::iter::once(root)
                .chain(projected)
                .map(ident)
                .collect();
            format!(
                "{prefix} WITH {} {} RETURN distinct({root_ident}) SKIP ${SKIP_PARAM} LIMIT ${LIMIT_PARAM}",
                with.join(", "),
                order.fragment
            )
        };

        let parameter_names: Vec<&str> = parameters.keys().map(String::as_str).collect();
        debug!(
            entity = %entity,
            required_aliases = ?required_aliases,
            parameters = ?parameter_names,
            skip = self.skip,
            limit = self.limit,
            "assembled query plan"
        );
        trace!(count = %count_query_text, page = %page_query_text, "query texts");

        Ok(QueryPlan {
            count_query_text,
            page_query_text,
            parameters,
            required_aliases,
            root_alias: root.to_owned(),
            entity,
            skip: self.skip,
            limit: self.limit,
            active_filters: self.active_filters,
            logical: LogicalQuery {
                base: self.base.clone(),
                joins,
                predicate,
                order: order.keys,
            },
        })
    }

    /// Selects the joins binding `referenced`, plus the joins they start from,
    /// in declared order.
    fn required_joins(&self, referenced: &BTreeSet<String>) -> Result<Vec<(String, PatternPath)>> {
        let bound = self.base.bound_aliases();
        let mut needed: BTreeSet<&str> = BTreeSet::new();
        let mut pending: Vec<&str> = referenced
            .iter()
            .map(String::as_str)
            .filter(|alias| !bound.contains(alias))
            .collect();
        while let Some(alias) = pending.pop() {
            if !needed.insert(alias) {
                continue;
            }
            let path = self
                .joins
                .get(alias)
                .ok_or_else(|| QueryError::UnknownAlias {
                    alias: alias.to_owned(),
                })?;
            if !bound.contains(path.start.as_str()) {
                pending.push(path.start.as_str());
            }
        }

        let mut in_scope: BTreeSet<&str> = bound.clone();
        let mut out = Vec::new();
        for (alias, path) in self.joins.iter() {
            if !needed.contains(alias) {
                continue;
            }
            if !in_scope.contains(path.start.as_str()) {
                return Err(QueryError::UnknownAlias {
                    alias: path.start.clone(),
                });
            }
            in_scope.insert(alias);
            in_scope.extend(path.bound_aliases());
            out.push((alias.to_owned(), path.clone()));
        }
        Ok(out)
    }
}

/// Assembles a plan for one filter tree on the root alias (parameters `{root}_param_n`).
pub fn assemble(
    registry: &FieldRegistry,
    base: &BasePattern,
    joins: &OptionalJoins,
    filter: &FilterNode,
    rules: &[SortRule],
    skip: i64,
    limit: i64,
) -> Result<QueryPlan> {
    QueryAssembler::new(registry, base, joins)
        .filter(FilterScope::on(base.root_alias(), filter.clone()))
        .sort(rules.iter().cloned())
        .page(skip, limit)
        .assemble()
}

/// Rejects windows that would otherwise be clamped.
pub fn check_page(skip: i64, limit: i64) -> Result<()> {
    if skip < 0 {
        return Err(QueryError::InvalidPage {
            skip,
            limit,
            reason: "skip must not be negative",
        });
    }
    if limit <= 0 {
        return Err(QueryError::InvalidPage {
            skip,
            limit,
            reason: "limit must be positive",
        });
    }
    Ok(())
}

fn insert_unique(parameters: &mut Params, name: String, value: Value) -> Result<()> {
    if parameters.contains_key(&name) {
        return Err(QueryError::DuplicateParameter { name });
    }
    parameters.insert(name, value);
    Ok(())
}
