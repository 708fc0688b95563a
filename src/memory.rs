//! In-memory graph implementing the read-transaction seam.
//!
//! Plans are evaluated from their [`LogicalQuery`], never by parsing Cypher:
//! base hops are inner joins, optional joins are null padded, predicates use
//! three-valued logic, roots are de-duplicated keeping their first row, and
//! nulls sort last ascending and first descending.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assembler::LogicalQuery;
use crate::error::DriverError;
use crate::expr::{CompareOp, Operand, OrderKey, Predicate};
use crate::pagination::{CompiledQuery, GraphSession, ReadTransaction, Returns};
use crate::pattern::{EdgeDirection, Hop, PatternPath};
use crate::value::{Params, Value};

/// Errors raised while loading or querying a [`MemoryGraph`].
#[derive(Debug, Error)]
pub enum MemoryError {
    /// A node key was inserted twice.
    #[error("node '{0}' already exists")]
    DuplicateKey(String),
    /// An edge references a key that was never inserted.
    #[error("edge references unknown node '{0}'")]
    UnknownNode(String),
    /// A fixture property cannot be represented as a value.
    #[error("node '{key}' has unsupported value for property '{property}'")]
    UnsupportedProperty {
        /// Node key.
        key: String,
        /// Property name.
        property: String,
    },
    /// Fixture document is not valid JSON.
    #[error("invalid graph fixture: {0}")]
    Fixture(#[from] serde_json::Error),
    /// A statement referenced a parameter missing from the map.
    #[error("missing parameter ${0}")]
    MissingParameter(String),
    /// A function received an argument of the wrong type.
    #[error("{function}() does not accept {found}")]
    Type {
        /// Function name.
        function: &'static str,
        /// Offending type.
        found: &'static str,
    },
    /// A statement used the wrong result shape.
    #[error("statement does not return {0}")]
    Shape(&'static str),
}

/// Node stored in the graph and returned by page statements.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MemoryNode {
    /// Unique key.
    pub key: String,
    /// Labels.
    pub labels: Vec<String>,
    /// Properties.
    pub properties: BTreeMap<String, Value>,
}

impl MemoryNode {
    /// Node with labels and no properties.
    pub fn new(key: impl Into<String>, labels: &[&str]) -> Self {
        Self {
            key: key.into(),
            labels: labels.iter().map(|l| (*l).to_owned()).collect(),
            properties: BTreeMap::new(),
        }
    }

    /// Sets a property; null values are not stored.
    pub fn with(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.properties.insert(property.into(), value);
        }
        self
    }

    fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

#[derive(Clone, Debug)]
struct Edge {
    from: usize,
    to: usize,
    rel_type: String,
}

#[derive(Debug, Default)]
struct GraphData {
    nodes: Vec<MemoryNode>,
    edges: Vec<Edge>,
    by_key: HashMap<String, usize>,
}

/// Thread-safe in-memory property graph.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    data: RwLock<GraphData>,
}

#[derive(Deserialize)]
struct Fixture {
    #[serde(default)]
    nodes: Vec<NodeFixture>,
    #[serde(default)]
    edges: Vec<EdgeFixture>,
}

#[derive(Deserialize)]
struct NodeFixture {
    key: String,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    properties: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct EdgeFixture {
    from: String,
    to: String,
    #[serde(rename = "type")]
    rel_type: String,
}

impl MemoryGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `{"nodes": [{key, labels, properties}], "edges": [{from, to, type}]}`.
    ///
    /// String properties in RFC 3339 form are stored as datetimes.
    pub fn from_json(raw: &str) -> Result<Self, MemoryError> {
        let fixture: Fixture = serde_json::from_str(raw)?;
        let graph = MemoryGraph::new();
        for node in fixture.nodes {
            let mut properties = BTreeMap::new();
            for (property, json) in node.properties {
                let value = match &json {
                    serde_json::Value::String(s) => {
                        Value::parse_datetime(s).unwrap_or_else(|| Value::String(s.clone()))
                    }
                    other => Value::from_json(other).ok_or_else(|| MemoryError::UnsupportedProperty {
                        key: node.key.clone(),
                        property: property.clone(),
                    })?,
                };
                if !value.is_null() {
                    properties.insert(property, value);
                }
            }
            graph.insert_node(MemoryNode {
                key: node.key,
                labels: node.labels,
                properties,
            })?;
        }
        for edge in fixture.edges {
            graph.insert_edge(&edge.from, &edge.rel_type, &edge.to)?;
        }
        Ok(graph)
    }

    /// Adds a node; keys are unique.
    pub fn insert_node(&self, node: MemoryNode) -> Result<(), MemoryError> {
        let mut data = self.data.write();
        if data.by_key.contains_key(&node.key) {
            return Err(MemoryError::DuplicateKey(node.key));
        }
        let idx = data.nodes.len();
        data.by_key.insert(node.key.clone(), idx);
        data.nodes.push(node);
        Ok(())
    }

    /// Adds `(from)-[:rel_type]->(to)`.
    pub fn insert_edge(&self, from: &str, rel_type: &str, to: &str) -> Result<(), MemoryError> {
        let mut data = self.data.write();
        let lookup = |key: &str| {
            data.by_key
                .get(key)
                .copied()
                .ok_or_else(|| MemoryError::UnknownNode(key.to_owned()))
        };
        let edge = Edge {
            from: lookup(from)?,
            to: lookup(to)?,
            rel_type: rel_type.to_owned(),
        };
        data.edges.push(edge);
        Ok(())
    }

    /// Number of stored nodes.
    pub fn node_count(&self) -> usize {
        self.data.read().nodes.len()
    }
}

/// Read transaction holding the graph's read lock until dropped.
pub struct MemoryTransaction<'g> {
    data: RwLockReadGuard<'g, GraphData>,
}

impl GraphSession for MemoryGraph {
    type Node = MemoryNode;
    type Tx<'s> = MemoryTransaction<'s>;

    fn begin_read(&self) -> Result<MemoryTransaction<'_>, DriverError> {
        Ok(MemoryTransaction {
            data: self.data.read(),
        })
    }
}

impl ReadTransaction for MemoryTransaction<'_> {
    type Node = MemoryNode;

    fn count(&mut self, query: &CompiledQuery<'_>) -> Result<i64, DriverError> {
        if query.returns != Returns::Count {
            return Err(MemoryError::Shape("a count").into());
        }
        let rows = self.data.matching_rows(query.logical, query.parameters)?;
        let roots: HashSet<usize> = rows.iter().filter_map(|row| row.get(query.root_alias)).collect();
        Ok(roots.len() as i64)
    }

    fn nodes(&mut self, query: &CompiledQuery<'_>) -> Result<Vec<MemoryNode>, DriverError> {
        let Returns::Page { skip, limit } = query.returns else {
            return Err(MemoryError::Shape("a page").into());
        };
        let rows = self.data.matching_rows(query.logical, query.parameters)?;
        let ordered = self.data.order_rows(rows, &query.logical.order, query.parameters)?;
        let mut seen = HashSet::new();
        let page = ordered
            .iter()
            .filter_map(|row| row.get(query.root_alias))
            .filter(|idx| seen.insert(*idx))
            .skip(usize::try_from(skip).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|idx| self.data.nodes[idx].clone())
            .collect();
        Ok(page)
    }
}

/// Alias bindings of one pattern row; unbound optional aliases are absent.
#[derive(Clone, Debug, Default)]
struct Row(BTreeMap<String, usize>);

impl Row {
    fn get(&self, alias: &str) -> Option<usize> {
        self.0.get(alias).copied()
    }
}

impl GraphData {
    fn matching_rows(&self, query: &LogicalQuery, params: &Params) -> Result<Vec<Row>, MemoryError> {
        let root_label = query.base.entity().label();
        let root_alias = query.base.root_alias();
        let mut rows: Vec<Row> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.has_label(root_label))
            .map(|(idx, _)| Row(BTreeMap::from([(root_alias.to_owned(), idx)])))
            .collect();

        for path in query.base.paths() {
            rows = rows
                .into_iter()
                .flat_map(|row| self.extend(&row, path))
                .collect();
        }
        for (_, path) in &query.joins {
            rows = rows
                .into_iter()
                .flat_map(|row| {
                    let extended = self.extend(&row, path);
                    if extended.is_empty() {
                        vec![row]
                    } else {
                        extended
                    }
                })
                .collect();
        }

        let Some(predicate) = &query.predicate else {
            return Ok(rows);
        };
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if self.eval(predicate, &row, params)? == Some(true) {
                kept.push(row);
            }
        }
        Ok(kept)
    }

    /// Every extension of `row` matching `path`; empty when the start is unbound.
    fn extend(&self, row: &Row, path: &PatternPath) -> Vec<Row> {
        let Some(start) = row.get(&path.start) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        self.walk(start, &path.hops, row.clone(), &mut out);
        out
    }

    fn walk(&self, at: usize, hops: &[Hop], row: Row, out: &mut Vec<Row>) {
        let Some((hop, rest)) = hops.split_first() else {
            out.push(row);
            return;
        };
        for next in self.neighbours(at, hop) {
            if let Some(alias) = &hop.node.alias {
                match row.get(alias) {
                    Some(bound) if bound != next => continue,
                    _ => {}
                }
            }
            let mut extended = row.clone();
            if let Some(alias) = &hop.node.alias {
                extended.0.insert(alias.clone(), next);
            }
            self.walk(next, rest, extended, out);
        }
    }

    fn neighbours<'a>(&'a self, at: usize, hop: &'a Hop) -> impl Iterator<Item = usize> + 'a {
        self.edges
            .iter()
            .filter(move |edge| edge.rel_type == hop.rel_type)
            .filter_map(move |edge| match hop.direction {
                EdgeDirection::Out if edge.from == at => Some(edge.to),
                EdgeDirection::In if edge.to == at => Some(edge.from),
                EdgeDirection::Both if edge.from == at => Some(edge.to),
                EdgeDirection::Both if edge.to == at => Some(edge.from),
                _ => None,
            })
            .filter(move |idx| match &hop.node.label {
                Some(label) => self.nodes[*idx].has_label(label),
                None => true,
            })
    }

    fn eval(&self, predicate: &Predicate, row: &Row, params: &Params) -> Result<Option<bool>, MemoryError> {
        Ok(match predicate {
            Predicate::Literal(value) => Some(*value),
            Predicate::IsNull(operand) => Some(self.operand(operand, row, params)?.is_null()),
            Predicate::Compare { left, op, right } => {
                let left = self.operand(left, row, params)?;
                let right = self.operand(right, row, params)?;
                compare(&left, *op, &right)
            }
            Predicate::Not(inner) => self.eval(inner, row, params)?.map(|b| !b),
            Predicate::And(items) => {
                let mut result = Some(true);
                for item in items {
                    match self.eval(item, row, params)? {
                        Some(false) => return Ok(Some(false)),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                result
            }
            Predicate::Or(items) => {
                let mut result = Some(false);
                for item in items {
                    match self.eval(item, row, params)? {
                        Some(true) => return Ok(Some(true)),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                result
            }
        })
    }

    fn operand(&self, operand: &Operand, row: &Row, params: &Params) -> Result<Value, MemoryError> {
        match operand {
            Operand::Property { alias, property } => Ok(row
                .get(alias)
                .and_then(|idx| self.nodes[idx].properties.get(property))
                .cloned()
                .unwrap_or(Value::Null)),
            Operand::Param(name) => params
                .get(name)
                .cloned()
                .ok_or_else(|| MemoryError::MissingParameter(name.clone())),
            Operand::Lower(inner) => match self.operand(inner, row, params)? {
                Value::Null => Ok(Value::Null),
                Value::String(s) => Ok(Value::String(s.to_lowercase())),
                other => Err(MemoryError::Type {
                    function: "toLower",
                    found: other.type_name(),
                }),
            },
            Operand::Blank(inner) => Ok(match self.operand(inner, row, params)? {
                Value::Null => Value::Int(1),
                Value::String(s) if s.is_empty() => Value::Int(1),
                _ => Value::Int(0),
            }),
            Operand::Coalesce(items) => {
                for item in items {
                    let value = self.operand(item, row, params)?;
                    if !value.is_null() {
                        return Ok(value);
                    }
                }
                Ok(Value::Null)
            }
        }
    }

    fn order_rows(&self, rows: Vec<Row>, order: &[OrderKey], params: &Params) -> Result<Vec<Row>, MemoryError> {
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let keys = order
                .iter()
                .map(|key| self.operand(&key.operand, &row, params))
                .collect::<Result<Vec<_>, _>>()?;
            keyed.push((keys, row));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            order
                .iter()
                .zip(a.iter().zip(b))
                .map(|(key, (x, y))| {
                    let ord = sort_order(x, y);
                    if key.descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> Option<bool> {
    if left.is_null() || right.is_null() {
        return None;
    }
    match op {
        CompareOp::Eq => equals(left, right),
        CompareOp::Contains => match (left, right) {
            (Value::String(haystack), Value::String(needle)) => Some(haystack.contains(needle.as_str())),
            _ => None,
        },
        CompareOp::In => {
            let Value::List(items) = right else {
                return None;
            };
            let mut saw_null = false;
            for item in items {
                match equals(left, item) {
                    Some(true) => return Some(true),
                    None => saw_null = true,
                    Some(false) => {}
                }
            }
            if saw_null {
                None
            } else {
                Some(false)
            }
        }
        CompareOp::Gte => comparable(left, right).map(|ord| ord != Ordering::Less),
        CompareOp::Lte => comparable(left, right).map(|ord| ord != Ordering::Greater),
    }
}

fn equals(left: &Value, right: &Value) -> Option<bool> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::List(a), Value::List(b)) => {
            if a.len() != b.len() {
                return Some(false);
            }
            let mut result = Some(true);
            for (x, y) in a.iter().zip(b) {
                match equals(x, y) {
                    Some(false) => return Some(false),
                    None => result = None,
                    Some(true) => {}
                }
            }
            result
        }
        _ => Some(comparable(left, right) == Some(Ordering::Equal)),
    }
}

/// Ordering between values of compatible types; `None` otherwise.
fn comparable(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Total order used by `ORDER BY`: values of one type compare naturally,
/// mixed types by type rank, null after everything.
fn sort_order(left: &Value, right: &Value) -> Ordering {
    comparable(left, right).unwrap_or_else(|| rank(left).cmp(&rank(right)))
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::List(_) => 0,
        Value::DateTime(_) => 1,
        Value::String(_) => 2,
        Value::Bool(_) => 3,
        Value::Int(_) | Value::Float(_) => 4,
        Value::Null => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{assemble, QueryAssembler, FilterScope};
    use crate::filter::{Comparator, FilterNode, LeafComparison};
    use crate::pagination::execute_read;
    use crate::pattern::{BasePattern, NodePattern, OptionalJoins};
    use crate::registry::{EntityKind, FieldRegistry};
    use crate::sort::{SortDirection, SortRule};

    fn graph() -> MemoryGraph {
        let graph = MemoryGraph::new();
        for (key, name, updated) in [("a", Some("Beta"), 3i64), ("b", None, 2), ("c", Some("alpha"), 1)] {
            graph
                .insert_node(
                    MemoryNode::new(key, &["Organization"])
                        .with("name", name)
                        .with("updatedAt", Value::DateTime(updated as i128)),
                )
                .expect("insert org");
        }
        graph.insert_node(MemoryNode::new("d1", &["Domain"]).with("domain", "beta.io")).expect("domain");
        graph.insert_node(MemoryNode::new("d2", &["Domain"]).with("domain", "beta.com")).expect("domain");
        graph.insert_edge("a", "HAS_DOMAIN", "d1").expect("edge");
        graph.insert_edge("a", "HAS_DOMAIN", "d2").expect("edge");
        graph
    }

    fn keys(nodes: &[MemoryNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.key.as_str()).collect()
    }

    #[test]
    fn default_order_is_updated_at_descending() {
        let registry = FieldRegistry::standard().expect("registry");
        let base = BasePattern::new("o", EntityKind::Organization);
        let plan = assemble(&registry, &base, &OptionalJoins::new(), &FilterNode::empty(), &[], 0, 10)
            .expect("plan");
        let page = execute_read(&graph(), &plan).expect("run");
        assert_eq!(page.total_count, 3);
        assert_eq!(keys(&page.items), vec!["a", "b", "c"]);
    }

    #[test]
    fn optional_join_rows_collapse_to_distinct_roots() {
        let registry = FieldRegistry::standard().expect("registry");
        let base = BasePattern::new("o", EntityKind::Organization);
        let joins = OptionalJoins::new().join(
            "d",
            PatternPath::from("o").out("HAS_DOMAIN", NodePattern::new("d", "Domain")),
        );
        let plan = QueryAssembler::new(&registry, &base, &joins)
            .sort([SortRule::new("d", "domain", SortDirection::Asc)])
            .assemble()
            .expect("plan");
        let page = execute_read(&graph(), &plan).expect("run");
        assert_eq!(page.total_count, 3);
        // a has domains; b and c only have the null-padded row, which sorts last.
        assert_eq!(keys(&page.items), vec!["a", "b", "c"]);
    }

    #[test]
    fn nulls_never_satisfy_comparisons() {
        let registry = FieldRegistry::standard().expect("registry");
        let base = BasePattern::new("o", EntityKind::Organization);
        let not_beta = FilterNode::leaf(
            LeafComparison::new("name", Comparator::Equals, "Beta").expect("leaf"),
        )
        .negated();
        let plan = QueryAssembler::new(&registry, &base, &OptionalJoins::new())
            .filter(FilterScope::on("o", not_beta))
            .assemble()
            .expect("plan");
        let page = execute_read(&graph(), &plan).expect("run");
        assert_eq!(keys(&page.items), vec!["c"]);
    }

    #[test]
    fn fixtures_load_datetimes_and_edges() {
        let graph = MemoryGraph::from_json(
            r#"{"nodes":[{"key":"o1","labels":["Organization"],"properties":{"updatedAt":"2024-01-01T00:00:00Z","employees":12}},
                          {"key":"t1","labels":["Tag"],"properties":{"name":"vip"}}],
                "edges":[{"from":"o1","to":"t1","type":"TAGGED"}]}"#,
        )
        .expect("fixture");
        assert_eq!(graph.node_count(), 2);
        let data = graph.data.read();
        assert!(matches!(data.nodes[0].properties["updatedAt"], Value::DateTime(_)));
        assert_eq!(data.edges.len(), 1);
    }

    #[test]
    fn edges_to_missing_nodes_are_rejected() {
        let graph = MemoryGraph::new();
        graph.insert_node(MemoryNode::new("o1", &["Organization"])).expect("insert");
        assert!(matches!(
            graph.insert_edge("o1", "TAGGED", "nope"),
            Err(MemoryError::UnknownNode(key)) if key == "nope"
        ));
        assert!(matches!(
            graph.insert_node(MemoryNode::new("o1", &[])),
            Err(MemoryError::DuplicateKey(_))
        ));
    }
}
