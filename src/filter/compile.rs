use std::collections::BTreeSet;

use crate::expr::{CompareOp, Operand, Predicate};
use crate::value::{Params, Value};

use super::{Comparator, FilterNode, LeafComparison, LogicalOperator};

/// Output of [`compile`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledFilter {
    /// Rendered `WHERE` body; empty when the tree is empty.
    pub fragment: String,
    /// Parameters referenced by `fragment`.
    pub params: Params,
    /// Pattern aliases read by the fragment.
    pub aliases: BTreeSet<String>,
    /// Logical form of `fragment`; `None` when the tree is empty.
    pub predicate: Option<Predicate>,
}

impl CompiledFilter {
    /// True when the tree contributed no predicate.
    pub fn is_empty(&self) -> bool {
        self.predicate.is_none()
    }
}

/// Compiles `node` against `base_alias`, naming parameters `{param_prefix}{n}`.
///
/// `n` counts leaves across the whole tree in depth-first order starting at 1,
/// so compiling the same tree with the same prefix always yields the same names.
pub fn compile(node: &FilterNode, base_alias: &str, param_prefix: &str) -> CompiledFilter {
    let mut compiler = Compiler {
        base_alias,
        param_prefix,
        counter: 0,
        params: Params::new(),
    };
    let predicate = compiler.node(node);
    let fragment = predicate
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    let aliases = predicate
        .as_ref()
        .map(|p| p.aliases().into_iter().map(str::to_owned).collect())
        .unwrap_or_default();
    CompiledFilter {
        fragment,
        params: compiler.params,
        aliases,
        predicate,
    }
}

struct Compiler<'a> {
    base_alias: &'a str,
    param_prefix: &'a str,
    counter: usize,
    params: Params,
}

impl Compiler<'_> {
    fn node(&mut self, node: &FilterNode) -> Option<Predicate> {
        let compiled = match node.as_leaf() {
            Some(leaf) => Some(self.leaf(leaf)),
            None => self.group(node.logical_operator(), node.children()),
        }?;
        Some(if node.is_negated() {
            Predicate::Not(Box::new(compiled))
        } else {
            compiled
        })
    }

    fn group(&mut self, operator: LogicalOperator, children: &[FilterNode]) -> Option<Predicate> {
        let compiled: Vec<Predicate> = children.iter().filter_map(|c| self.node(c)).collect();
        if compiled.is_empty() {
            return None;
        }
        Some(match operator {
            LogicalOperator::Or => Predicate::Or(compiled),
            LogicalOperator::And | LogicalOperator::None => Predicate::And(compiled),
        })
    }

    fn leaf(&mut self, leaf: &LeafComparison) -> Predicate {
        let alias = leaf.alias().unwrap_or(self.base_alias);
        let property = Operand::property(alias, leaf.property_path());
        let op = match leaf.comparator() {
            Comparator::IsNull => return Predicate::IsNull(property),
            Comparator::In => match leaf.value() {
                Value::List(items) if items.is_empty() => return Predicate::Literal(false),
                _ => CompareOp::In,
            },
            Comparator::Equals => CompareOp::Eq,
            Comparator::Contains => CompareOp::Contains,
            Comparator::Gte => CompareOp::Gte,
            Comparator::Lte => CompareOp::Lte,
        };
        let param = self.next_param();
        let lower = leaf.lowers_operands() && has_text(leaf.value());
        let (left, right, value) = match (lower, op) {
            (false, _) => (property, Operand::Param(param.clone()), leaf.value().clone()),
            // Lists are lowered here; Cypher has no element-wise toLower.
            (true, CompareOp::In) => (
                property.lower(),
                Operand::Param(param.clone()),
                leaf.value().to_lowercase(),
            ),
            (true, _) => (
                property.lower(),
                Operand::Param(param.clone()).lower(),
                leaf.value().clone(),
            ),
        };
        self.params.insert(param, value);
        Predicate::Compare { left, op, right }
    }

    fn next_param(&mut self) -> String {
        self.counter += 1;
        format!("{}{}", self.param_prefix, self.counter)
    }
}

fn has_text(value: &Value) -> bool {
    match value {
        Value::String(_) => true,
        Value::List(items) => !items.is_empty() && items.iter().all(|v| matches!(v, Value::String(_))),
        _ => false,
    }
}
