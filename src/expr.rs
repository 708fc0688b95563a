//! Logical predicate and ordering IR.
//!
//! The filter and sort compilers lower their inputs into these structures once.
//! Rendering them with [`fmt::Display`] yields the Cypher fragments embedded in
//! the query text, while engines that do not speak Cypher (the in-memory engine)
//! evaluate the same structures directly, so text and semantics cannot drift.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

/// Value-producing expression inside a predicate or sort key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    /// `alias.property`
    Property {
        /// Pattern variable the property is read from.
        alias: String,
        /// Physical property name.
        property: String,
    },
    /// `$name`, resolved from the plan parameter map.
    Param(String),
    /// `toLower(inner)`
    Lower(Box<Operand>),
    /// `coalesce(a, b, ...)`
    Coalesce(Vec<Operand>),
    /// `1` when the inner value is null or the empty string, otherwise `0`.
    Blank(Box<Operand>),
}

impl Operand {
    /// Shorthand for [`Operand::Property`].
    pub fn property(alias: impl Into<String>, property: impl Into<String>) -> Self {
        Operand::Property {
            alias: alias.into(),
            property: property.into(),
        }
    }

    /// Wraps the operand in `toLower(...)`.
    pub fn lower(self) -> Self {
        Operand::Lower(Box::new(self))
    }

    /// Wraps the operand in a blank indicator.
    pub fn blank(self) -> Self {
        Operand::Blank(Box::new(self))
    }

    fn collect_aliases<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Operand::Property { alias, .. } => {
                out.insert(alias.as_str());
            }
            Operand::Param(_) => {}
            Operand::Lower(inner) | Operand::Blank(inner) => inner.collect_aliases(out),
            Operand::Coalesce(items) => items.iter().for_each(|item| item.collect_aliases(out)),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Property { alias, property } => {
                write!(f, "{}.{}", ident(alias), ident(property))
            }
            Operand::Param(name) => write!(f, "${}", ident(name)),
            Operand::Lower(inner) => write!(f, "toLower({inner})"),
            Operand::Blank(inner) => write!(f, "CASE WHEN coalesce({inner}, '') = '' THEN 1 ELSE 0 END"),
            Operand::Coalesce(items) => {
                write!(f, "coalesce(")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Binary comparison operators emitted by the filter compiler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `CONTAINS`
    Contains,
    /// `IN`
    In,
    /// `>=`
    Gte,
    /// `<=`
    Lte,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Contains => "CONTAINS",
            CompareOp::In => "IN",
            CompareOp::Gte => ">=",
            CompareOp::Lte => "<=",
        }
    }
}

/// Boolean predicate tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    /// `left <op> right`
    Compare {
        /// Left operand, usually a property.
        left: Operand,
        /// Comparison operator.
        op: CompareOp,
        /// Right operand, usually a parameter.
        right: Operand,
    },
    /// `operand IS NULL`
    IsNull(Operand),
    /// `true` / `false`
    Literal(bool),
    /// Parenthesised conjunction.
    And(Vec<Predicate>),
    /// Parenthesised disjunction.
    Or(Vec<Predicate>),
    /// `NOT (...)`
    Not(Box<Predicate>),
}

impl Predicate {
    /// Aliases read by any operand of the predicate.
    pub fn aliases(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_aliases(&mut out);
        out
    }

    fn collect_aliases<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Predicate::Compare { left, right, .. } => {
                left.collect_aliases(out);
                right.collect_aliases(out);
            }
            Predicate::IsNull(operand) => operand.collect_aliases(out),
            Predicate::Literal(_) => {}
            Predicate::And(items) | Predicate::Or(items) => {
                items.iter().for_each(|item| item.collect_aliases(out))
            }
            Predicate::Not(inner) => inner.collect_aliases(out),
        }
    }

    fn is_group(&self) -> bool {
        matches!(self, Predicate::And(_) | Predicate::Or(_))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { left, op, right } => write!(f, "{left} {} {right}", op.symbol()),
            Predicate::IsNull(operand) => write!(f, "{operand} IS NULL"),
            Predicate::Literal(value) => write!(f, "{value}"),
            Predicate::And(items) => write_group(f, items, " AND "),
            Predicate::Or(items) => write_group(f, items, " OR "),
            Predicate::Not(inner) if inner.is_group() => write!(f, "NOT {inner}"),
            Predicate::Not(inner) => write!(f, "NOT ({inner})"),
        }
    }
}

fn write_group(f: &mut fmt::Formatter<'_>, items: &[Predicate], joiner: &str) -> fmt::Result {
    write!(f, "(")?;
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            f.write_str(joiner)?;
        }
        write!(f, "{item}")?;
    }
    write!(f, ")")
}

/// One `ORDER BY` key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderKey {
    /// Sort value expression.
    pub operand: Operand,
    /// Descending when true; ascending keys render without a direction token.
    pub descending: bool,
}

impl OrderKey {
    /// Aliases read by the sort expression.
    pub fn aliases(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.operand.collect_aliases(&mut out);
        out
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "{} DESC", self.operand)
        } else {
            write!(f, "{}", self.operand)
        }
    }
}

/// True for identifiers that need no quoting in Cypher.
pub(crate) fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Renders an identifier, back-tick quoting it when it is not plain.
pub(crate) fn ident(name: &str) -> Cow<'_, str> {
    if is_plain_identifier(name) {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("`{}`", name.replace('`', "``")))
    }
}
