//! API-level filter, sort and pagination input and its translation into
//! [`FilterNode`] trees and [`SortRule`]s through the field registry.

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};
use crate::filter::{Comparator, FilterNode, LeafComparison};
use crate::pagination::Pagination;
use crate::registry::{EntityKind, FieldMeta, FieldRegistry, ValueKind};
use crate::sort::{SortDirection, SortRule};
use crate::value::Value;

/// Recursive filter object: any combination of a leaf, AND/OR lists and a negated child.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterInput {
    /// Negated sub-filter.
    pub not: Option<Box<FilterInput>>,
    /// Sub-filters that must all hold.
    pub and: Vec<FilterInput>,
    /// Sub-filters of which one must hold.
    pub or: Vec<FilterInput>,
    /// Leaf comparison.
    pub filter: Option<FilterItem>,
}

/// Comparison operators accepted from API input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// Equality.
    #[default]
    Eq,
    /// Substring match.
    Contains,
    /// Membership.
    In,
    /// Lower bound.
    Gte,
    /// Upper bound.
    Lte,
    /// Null or absent.
    IsNull,
    /// Inclusive range given as a two-element list.
    Between,
}

/// Leaf of a [`FilterInput`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterItem {
    /// Logical (exposed) property name.
    pub property: String,
    /// Comparison; equality when omitted.
    #[serde(default)]
    pub operation: Operation,
    /// Untyped value, coerced using the field's registered kind.
    #[serde(default)]
    pub value: serde_json::Value,
    /// Case-sensitive matching; the configured default when omitted.
    #[serde(default)]
    pub case_sensitive: Option<bool>,
    /// Also match empty strings and missing values.
    #[serde(default)]
    pub include_empty: bool,
}

impl FilterItem {
    /// Equality leaf on `property`.
    pub fn new(property: impl Into<String>, operation: Operation, value: serde_json::Value) -> Self {
        Self {
            property: property.into(),
            operation,
            value,
            case_sensitive: None,
            include_empty: false,
        }
    }
}

impl FilterInput {
    /// Input holding only a leaf.
    pub fn leaf(item: FilterItem) -> Self {
        Self {
            filter: Some(item),
            ..Self::default()
        }
    }

    /// Input whose children must all hold.
    pub fn all(children: Vec<FilterInput>) -> Self {
        Self {
            and: children,
            ..Self::default()
        }
    }

    /// Leaf items in depth-first order.
    pub fn items(&self) -> Vec<&FilterItem> {
        let mut out = Vec::new();
        self.collect_items(&mut out);
        out
    }

    fn collect_items<'a>(&'a self, out: &mut Vec<&'a FilterItem>) {
        out.extend(self.filter.iter());
        for child in self.and.iter().chain(&self.or) {
            child.collect_items(out);
        }
        if let Some(not) = &self.not {
            not.collect_items(out);
        }
    }

    /// Distinct logical property names in first-use order.
    pub fn active_filters(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for item in self.items() {
            if !names.contains(&item.property) {
                names.push(item.property.clone());
            }
        }
        names
    }
}

/// Single sort key requested by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortInput {
    /// Logical sort key.
    pub by: String,
    /// Direction; ascending when omitted.
    #[serde(default)]
    pub direction: SortDirection,
    /// Case-sensitive ordering; the configured default when omitted.
    #[serde(default)]
    pub case_sensitive: Option<bool>,
}

/// Complete list request as accepted by the CLI and list endpoints.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListRequest {
    /// Filter tree.
    #[serde(rename = "where")]
    pub filter: Option<FilterInput>,
    /// Sort key.
    pub sort: Option<SortInput>,
    /// 1-based page window.
    pub pagination: Option<Pagination>,
}

/// Translates input objects for one entity kind through the registry.
#[derive(Clone, Copy, Debug)]
pub struct Translator<'a> {
    registry: &'a FieldRegistry,
    entity: EntityKind,
    case_sensitive_default: bool,
}

impl<'a> Translator<'a> {
    /// Translator for `entity`; string comparisons are case-insensitive by default.
    pub fn new(registry: &'a FieldRegistry, entity: EntityKind) -> Self {
        Self {
            registry,
            entity,
            case_sensitive_default: false,
        }
    }

    /// Overrides the case sensitivity applied when input leaves omit it.
    pub fn case_sensitive_default(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive_default = case_sensitive;
        self
    }

    /// Registry the translator resolves through.
    pub fn registry(&self) -> &'a FieldRegistry {
        self.registry
    }

    /// Entity kind the translator resolves against.
    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    /// Translates a whole input tree; leaves are resolved against this entity.
    pub fn filter(&self, input: &FilterInput) -> Result<FilterNode> {
        let mut parts = Vec::new();
        if let Some(item) = &input.filter {
            parts.push(self.item(item)?);
        }
        if !input.and.is_empty() {
            parts.push(FilterNode::and(
                input.and.iter().map(|c| self.filter(c)).collect::<Result<_>>()?,
            ));
        }
        if !input.or.is_empty() {
            parts.push(FilterNode::or(
                input.or.iter().map(|c| self.filter(c)).collect::<Result<_>>()?,
            ));
        }
        if let Some(not) = &input.not {
            parts.push(self.filter(not)?.negated());
        }
        Ok(match parts.len() {
            0 => FilterNode::empty(),
            1 => parts.remove(0),
            _ => FilterNode::and(parts),
        })
    }

    /// Translates one leaf, expanding `BETWEEN` and include-empty requests.
    pub fn item(&self, item: &FilterItem) -> Result<FilterNode> {
        let field = self.registry.resolve(self.entity, &item.property)?;
        self.item_on(field, item)
    }

    /// Like [`Translator::item`] for an already resolved field.
    pub fn item_on(&self, field: &FieldMeta, item: &FilterItem) -> Result<FilterNode> {
        let case_sensitive = item.case_sensitive.unwrap_or(self.case_sensitive_default);
        let leaf = |comparator, value: Value| -> Result<FilterNode> {
            Ok(FilterNode::leaf(
                LeafComparison::for_field(field, comparator, value)?.case_sensitive(case_sensitive),
            ))
        };
        let node = match item.operation {
            Operation::IsNull => leaf(Comparator::IsNull, Value::Null)?,
            Operation::Between => {
                let (low, high) = range_bounds(&item.property, coerce(field.kind, &item.property, &item.value)?)?;
                FilterNode::and(vec![leaf(Comparator::Gte, low)?, leaf(Comparator::Lte, high)?])
            }
            operation => {
                let comparator = match operation {
                    Operation::Contains => Comparator::Contains,
                    Operation::In => Comparator::In,
                    Operation::Gte => Comparator::Gte,
                    Operation::Lte => Comparator::Lte,
                    _ => Comparator::Equals,
                };
                leaf(comparator, coerce(field.kind, &item.property, &item.value)?)?
            }
        };
        if !item.include_empty || item.operation == Operation::IsNull {
            return Ok(node);
        }
        let mut alternatives = vec![node];
        if field.kind == ValueKind::String {
            alternatives.push(leaf(Comparator::Equals, Value::from(""))?);
        }
        alternatives.push(leaf(Comparator::IsNull, Value::Null)?);
        Ok(FilterNode::or(alternatives))
    }

    /// Resolves a sort key on `alias`.
    pub fn sort(&self, alias: &str, input: &SortInput) -> Result<SortRule> {
        let field = self.registry.resolve(self.entity, &input.by)?;
        Ok(SortRule::for_field(alias, field, input.direction)
            .case_sensitive(input.case_sensitive.unwrap_or(self.case_sensitive_default)))
    }
}

/// Converts untyped JSON into a value of the field's kind.
pub fn coerce(kind: ValueKind, property: &str, json: &serde_json::Value) -> Result<Value> {
    let value = Value::from_json(json).ok_or_else(|| {
        QueryError::invalid_filter(format!("value of '{property}' must not be an object"))
    })?;
    coerce_value(kind, property, value)
}

fn coerce_value(kind: ValueKind, property: &str, value: Value) -> Result<Value> {
    match (kind, value) {
        (_, Value::List(items)) => Ok(Value::List(
            items
                .into_iter()
                .map(|item| coerce_value(kind, property, item))
                .collect::<Result<_>>()?,
        )),
        (ValueKind::DateTime, Value::String(raw)) => Value::parse_datetime(&raw).ok_or_else(|| {
            QueryError::invalid_filter(format!("'{raw}' is not an RFC 3339 timestamp for '{property}'"))
        }),
        (ValueKind::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
        (ValueKind::Bool, Value::String(raw)) => match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(QueryError::invalid_filter(format!("'{raw}' is not a boolean for '{property}'"))),
        },
        (_, value) => Ok(value),
    }
}

fn range_bounds(property: &str, value: Value) -> Result<(Value, Value)> {
    match value {
        Value::List(mut items) if items.len() == 2 && items.iter().all(|v| !v.is_null()) => {
            let high = items.pop().unwrap_or(Value::Null);
            let low = items.pop().unwrap_or(Value::Null);
            Ok((low, high))
        }
        _ => Err(QueryError::invalid_filter(format!(
            "BETWEEN on '{property}' requires two non-null bounds"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::compile;
    use serde_json::json;

    fn translator(registry: &FieldRegistry) -> Translator<'_> {
        Translator::new(registry, EntityKind::Organization)
    }

    #[test]
    fn parses_nested_request_documents() {
        let request: ListRequest = serde_json::from_value(json!({
            "where": {"and": [
                {"filter": {"property": "NAME", "operation": "CONTAINS", "value": "acme", "includeEmpty": true}},
                {"not": {"filter": {"property": "IS_CUSTOMER", "value": true}}}
            ]},
            "sort": {"by": "NAME", "direction": "DESC"},
            "pagination": {"page": 2, "limit": 10}
        }))
        .expect("request");
        let filter = request.filter.expect("filter");
        assert_eq!(filter.active_filters(), vec!["NAME", "IS_CUSTOMER"]);
        assert_eq!(request.sort.map(|s| s.direction), Some(SortDirection::Desc));
        assert_eq!(request.pagination.map(|p| p.skip()), Some(10));
    }

    #[test]
    fn include_empty_expands_to_three_alternatives() {
        let registry = FieldRegistry::standard().expect("registry");
        let mut item = FilterItem::new("NAME", Operation::Contains, json!("Acme"));
        item.include_empty = true;
        let node = translator(&registry).item(&item).expect("node");
        assert_eq!(
            compile(&node, "o", "o_param_").fragment,
            "(toLower(o.name) CONTAINS toLower($o_param_1) OR toLower(o.name) = toLower($o_param_2) OR o.name IS NULL)"
        );
    }

    #[test]
    fn between_becomes_a_closed_range() {
        let registry = FieldRegistry::standard().expect("registry");
        let item = FilterItem::new("FORECAST_ARR", Operation::Between, json!([100, 2500.5]));
        let compiled = compile(&translator(&registry).item(&item).expect("node"), "o", "o_param_");
        assert_eq!(
            compiled.fragment,
            "(o.renewalForecastArr >= $o_param_1 AND o.renewalForecastArr <= $o_param_2)"
        );
        assert_eq!(compiled.params["o_param_1"], Value::Float(100.0));
        let bad = FilterItem::new("FORECAST_ARR", Operation::Between, json!([1]));
        assert!(translator(&registry).item(&bad).is_err());
    }

    #[test]
    fn datetimes_are_parsed_by_field_kind() {
        let registry = FieldRegistry::standard().expect("registry");
        let item = FilterItem::new("RENEWAL_DATE", Operation::Lte, json!("2024-03-01T00:00:00Z"));
        let compiled = compile(&translator(&registry).item(&item).expect("node"), "o", "p");
        assert!(matches!(compiled.params["p1"], Value::DateTime(_)));
        let bad = FilterItem::new("RENEWAL_DATE", Operation::Lte, json!("soon"));
        assert_eq!(
            translator(&registry).item(&bad).expect_err("bad date").code(),
            "InvalidFilter"
        );
    }

    #[test]
    fn unknown_properties_fail_resolution() {
        let registry = FieldRegistry::standard().expect("registry");
        let item = FilterItem::new("SHOE_SIZE", Operation::Eq, json!(42));
        assert_eq!(
            translator(&registry).item(&item).expect_err("unknown").code(),
            "FieldNotFound"
        );
    }

    #[test]
    fn case_default_applies_to_sorts() {
        let registry = FieldRegistry::standard().expect("registry");
        let sort = SortInput {
            by: "NAME".into(),
            direction: SortDirection::Asc,
            case_sensitive: None,
        };
        let rule = translator(&registry).sort("o", &sort).expect("rule");
        assert_eq!(rule.order_keys()[0].to_string(), "toLower(o.name)");
        let strict = translator(&registry).case_sensitive_default(true).sort("o", &sort).expect("rule");
        assert_eq!(strict.order_keys()[0].to_string(), "o.name");
    }
}
