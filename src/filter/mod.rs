//! Filter expression trees.
//!
//! A [`FilterNode`] is either a leaf comparison or an operator node combining
//! child nodes with AND/OR, optionally negated. Trees are validated while they
//! are built and are immutable afterwards; [`compile`] lowers them into a
//! Cypher `WHERE` fragment plus the parameter map it references.

mod compile;

pub use compile::{compile, CompiledFilter};

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};
use crate::registry::FieldMeta;
use crate::value::Value;

/// Comparison performed by a leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Comparator {
    /// Property equals the value.
    Equals,
    /// String property contains the value.
    Contains,
    /// Property is one of the listed values.
    In,
    /// Property is greater than or equal to the value.
    Gte,
    /// Property is less than or equal to the value.
    Lte,
    /// Property is null or absent.
    IsNull,
}

/// Combinator applied to the children of an operator node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogicalOperator {
    /// No combinator: valid for leaves and single-child wrappers only.
    #[default]
    None,
    /// All children must hold.
    And,
    /// At least one child must hold.
    Or,
}

/// Single property/operator/value test.
#[derive(Clone, Debug, PartialEq)]
pub struct LeafComparison {
    property_path: String,
    comparator: Comparator,
    value: Value,
    case_sensitivity_capable: bool,
    case_sensitive: bool,
    alias: Option<String>,
}

impl LeafComparison {
    /// Creates a case-sensitive comparison against a physical property.
    ///
    /// `value` must be null exactly when `comparator` is [`Comparator::IsNull`];
    /// `IN` requires a list (possibly empty) and `CONTAINS` a string.
    pub fn new(
        property_path: impl Into<String>,
        comparator: Comparator,
        value: impl Into<Value>,
    ) -> Result<Self> {
        let property_path = property_path.into();
        let value = value.into();
        if property_path.is_empty() {
            return Err(QueryError::invalid_filter("leaf property path is empty"));
        }
        validate_value(&property_path, comparator, &value)?;
        Ok(Self {
            property_path,
            comparator,
            value,
            case_sensitivity_capable: false,
            case_sensitive: true,
            alias: None,
        })
    }

    /// `property IS NULL`; cannot fail.
    pub fn is_null(property_path: impl Into<String>) -> Self {
        Self {
            property_path: property_path.into(),
            comparator: Comparator::IsNull,
            value: Value::Null,
            case_sensitivity_capable: false,
            case_sensitive: true,
            alias: None,
        }
    }

    /// Creates a comparison on a registry-resolved field, inheriting its case capability.
    pub fn for_field(
        field: &FieldMeta,
        comparator: Comparator,
        value: impl Into<Value>,
    ) -> Result<Self> {
        let mut leaf = Self::new(field.property.clone(), comparator, value)?;
        leaf.case_sensitivity_capable = field.case_sensitivity_capable;
        Ok(leaf)
    }

    /// Overrides both case flags.
    pub fn with_case_sensitivity(mut self, capable: bool, case_sensitive: bool) -> Self {
        self.case_sensitivity_capable = capable;
        self.case_sensitive = case_sensitive;
        self
    }

    /// Requests case-sensitive (`true`) or case-insensitive (`false`) matching.
    ///
    /// Ignored at compile time when the field is not case-sensitivity capable.
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Evaluates the leaf against another pattern alias than the scope default.
    pub fn on_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Physical property compared by the leaf.
    pub fn property_path(&self) -> &str {
        &self.property_path
    }

    /// Comparison operator.
    pub fn comparator(&self) -> Comparator {
        self.comparator
    }

    /// Compared value; null only for [`Comparator::IsNull`].
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Whether both operands are lower-cased at compile time.
    pub fn lowers_operands(&self) -> bool {
        self.case_sensitivity_capable && !self.case_sensitive
    }

    /// Alias override, if any.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }
}

fn validate_value(property: &str, comparator: Comparator, value: &Value) -> Result<()> {
    match (comparator, value) {
        (Comparator::IsNull, Value::Null) => Ok(()),
        (Comparator::IsNull, other) => Err(QueryError::invalid_filter(format!(
            "IS_NULL on '{property}' takes no value (got {})",
            other.type_name()
        ))),
        (_, Value::Null) => Err(QueryError::invalid_filter(format!(
            "{comparator:?} on '{property}' requires a non-null value"
        ))),
        (Comparator::In, Value::List(_)) => Ok(()),
        (Comparator::In, other) => Err(QueryError::invalid_filter(format!(
            "IN on '{property}' requires a list (got {})",
            other.type_name()
        ))),
        (_, Value::List(_)) => Err(QueryError::invalid_filter(format!(
            "{comparator:?} on '{property}' does not accept a list"
        ))),
        (Comparator::Contains, Value::String(_)) => Ok(()),
        (Comparator::Contains, other) => Err(QueryError::invalid_filter(format!(
            "CONTAINS on '{property}' requires a string (got {})",
            other.type_name()
        ))),
        _ => Ok(()),
    }
}

/// Node of a filter expression tree.
///
/// A node is either a leaf (no children) or an operator node (no leaf). An
/// operator node without children is the empty tree: it contributes no `WHERE`
/// clause and is elided when nested inside another node.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct FilterNode {
    negate: bool,
    logical_operator: LogicalOperator,
    children: Vec<FilterNode>,
    leaf: Option<LeafComparison>,
}

impl FilterNode {
    /// The empty tree.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wraps a single comparison.
    pub fn leaf(leaf: LeafComparison) -> Self {
        Self {
            leaf: Some(leaf),
            ..Self::default()
        }
    }

    /// Conjunction of `children`.
    pub fn and(children: Vec<FilterNode>) -> Self {
        Self {
            logical_operator: LogicalOperator::And,
            children,
            ..Self::default()
        }
    }

    /// Disjunction of `children`.
    pub fn or(children: Vec<FilterNode>) -> Self {
        Self {
            logical_operator: LogicalOperator::Or,
            children,
            ..Self::default()
        }
    }

    /// Operator node with an explicit combinator.
    ///
    /// [`LogicalOperator::None`] is only valid with at most one child.
    pub fn group(operator: LogicalOperator, children: Vec<FilterNode>) -> Result<Self> {
        if operator == LogicalOperator::None && children.len() > 1 {
            return Err(QueryError::invalid_filter(format!(
                "operator node without a logical operator has {} children",
                children.len()
            )));
        }
        Ok(Self {
            logical_operator: operator,
            children,
            ..Self::default()
        })
    }

    /// Returns the node with its negation flag flipped.
    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    /// Whether the compiled fragment is wrapped in `NOT`.
    pub fn is_negated(&self) -> bool {
        self.negate
    }

    /// Combinator of an operator node.
    pub fn logical_operator(&self) -> LogicalOperator {
        self.logical_operator
    }

    /// Children of an operator node; empty for leaves.
    pub fn children(&self) -> &[FilterNode] {
        &self.children
    }

    /// Comparison of a leaf node.
    pub fn as_leaf(&self) -> Option<&LeafComparison> {
        self.leaf.as_ref()
    }

    /// True when compiling the node emits no fragment.
    pub fn is_empty(&self) -> bool {
        self.leaf.is_none() && self.children.iter().all(FilterNode::is_empty)
    }

    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        match &self.leaf {
            Some(_) => 1,
            None => self.children.iter().map(FilterNode::leaf_count).sum(),
        }
    }
}

impl From<LeafComparison> for FilterNode {
    fn from(leaf: LeafComparison) -> Self {
        FilterNode::leaf(leaf)
    }
}
