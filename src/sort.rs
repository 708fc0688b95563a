//! Sort rules and their `ORDER BY` rendering.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};
use crate::expr::{Operand, OrderKey};
use crate::registry::{EntityKind, FieldMeta, FieldRegistry, DEFAULT_SORT_FIELD};

/// Sort direction; ascending is rendered without a token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

impl FromStr for SortDirection {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(SortDirection::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(SortDirection::Desc)
        } else {
            Err(QueryError::invalid_filter(format!("unknown sort direction '{s}'")))
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// One key of a multi-key ordering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortRule {
    entity_alias: String,
    property_path: String,
    direction: SortDirection,
    case_sensitivity_capable: bool,
    case_sensitive: bool,
    coalesce_alias: Option<String>,
    blanks_last: bool,
}

impl SortRule {
    /// Case-sensitive rule on `alias.property`.
    pub fn new(
        entity_alias: impl Into<String>,
        property_path: impl Into<String>,
        direction: SortDirection,
    ) -> Self {
        Self {
            entity_alias: entity_alias.into(),
            property_path: property_path.into(),
            direction,
            case_sensitivity_capable: false,
            case_sensitive: true,
            coalesce_alias: None,
            blanks_last: false,
        }
    }

    /// Rule on a registry-resolved field, inheriting its case capability.
    pub fn for_field(entity_alias: impl Into<String>, field: &FieldMeta, direction: SortDirection) -> Self {
        let mut rule = Self::new(entity_alias, field.property.clone(), direction);
        rule.case_sensitivity_capable = field.case_sensitivity_capable;
        rule
    }

    /// Requests case-sensitive (`true`) or case-insensitive (`false`) ordering.
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Overrides both case flags.
    pub fn with_case_sensitivity(mut self, capable: bool, case_sensitive: bool) -> Self {
        self.case_sensitivity_capable = capable;
        self.case_sensitive = case_sensitive;
        self
    }

    /// Falls back to the same property on `alias` when the primary value is null.
    pub fn coalesce_with(mut self, alias: impl Into<String>) -> Self {
        self.coalesce_alias = Some(alias.into());
        self
    }

    /// Orders null and empty-string values after all others, in either direction.
    pub fn blanks_last(mut self) -> Self {
        self.blanks_last = true;
        self
    }

    /// Primary alias.
    pub fn entity_alias(&self) -> &str {
        &self.entity_alias
    }

    /// Sorted property.
    pub fn property_path(&self) -> &str {
        &self.property_path
    }

    /// Direction.
    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    /// Fallback alias, if any.
    pub fn coalesce_alias(&self) -> Option<&str> {
        self.coalesce_alias.as_deref()
    }

    /// Logical ordering keys for this rule: the value key, preceded by an
    /// ascending blank indicator when [`SortRule::blanks_last`] is set.
    pub fn order_keys(&self) -> Vec<OrderKey> {
        let primary = Operand::property(self.entity_alias.clone(), self.property_path.clone());
        let raw = match &self.coalesce_alias {
            Some(fallback) => Operand::Coalesce(vec![
                primary,
                Operand::property(fallback.clone(), self.property_path.clone()),
            ]),
            None => primary,
        };
        let mut keys = Vec::with_capacity(2);
        if self.blanks_last {
            keys.push(OrderKey {
                operand: raw.clone().blank(),
                descending: false,
            });
        }
        let operand = if self.case_sensitivity_capable && !self.case_sensitive {
            raw.lower()
        } else {
            raw
        };
        keys.push(OrderKey {
            operand,
            descending: self.direction == SortDirection::Desc,
        });
        keys
    }
}

/// The rule injected when a request supplies none: `UPDATED_AT DESC` on the root.
pub fn default_rule(registry: &FieldRegistry, entity: EntityKind, root_alias: &str) -> Result<SortRule> {
    let field = registry.resolve(entity, DEFAULT_SORT_FIELD)?;
    Ok(SortRule::for_field(root_alias, field, SortDirection::Desc))
}

/// Output of [`compile`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompiledSort {
    /// `ORDER BY ...`; empty only when no rule was given.
    pub fragment: String,
    /// Logical keys in priority order.
    pub keys: Vec<OrderKey>,
    /// Aliases read by any key.
    pub aliases: BTreeSet<String>,
}

/// Renders `rules` in order as one `ORDER BY` clause.
pub fn compile(rules: &[SortRule]) -> CompiledSort {
    let keys: Vec<OrderKey> = rules.iter().flat_map(SortRule::order_keys).collect();
    if keys.is_empty() {
        return CompiledSort::default();
    }
    let aliases = keys
        .iter()
        .flat_map(|key| key.aliases().into_iter().map(str::to_owned).collect::<Vec<_>>())
        .collect();
    let rendered: Vec<String> = keys.iter().map(ToString::to_string).collect();
    CompiledSort {
        fragment: format!("ORDER BY {}", rendered.join(", ")),
        keys,
        aliases,
    }
}

/// Like [`compile`], substituting [`default_rule`] for an empty list.
pub fn compile_or_default(
    rules: &[SortRule],
    registry: &FieldRegistry,
    entity: EntityKind,
    root_alias: &str,
) -> Result<CompiledSort> {
    if rules.is_empty() {
        Ok(compile(&[default_rule(registry, entity, root_alias)?]))
    } else {
        Ok(compile(rules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_descending_is_marked() {
        let compiled = compile(&[
            SortRule::new("o", "name", SortDirection::Asc),
            SortRule::new("o", "updatedAt", SortDirection::Desc),
        ]);
        assert_eq!(compiled.fragment, "ORDER BY o.name, o.updatedAt DESC");
    }

    #[test]
    fn coalesce_is_lowered_as_a_whole() {
        let rule = SortRule::new("parent", "name", SortDirection::Desc)
            .with_case_sensitivity(true, false)
            .coalesce_with("o");
        let compiled = compile(&[rule]);
        assert_eq!(
            compiled.fragment,
            "ORDER BY toLower(coalesce(parent.name, o.name)) DESC"
        );
        assert_eq!(
            compiled.aliases,
            BTreeSet::from(["o".to_string(), "parent".to_string()])
        );
    }

    #[test]
    fn case_insensitivity_needs_capability() {
        let rule = SortRule::new("o", "website", SortDirection::Asc).case_sensitive(false);
        assert_eq!(compile(&[rule]).fragment, "ORDER BY o.website");
    }

    #[test]
    fn empty_rules_fall_back_to_updated_at() {
        let registry = FieldRegistry::standard().expect("standard registry");
        let compiled = compile_or_default(&[], &registry, EntityKind::Organization, "o")
            .expect("default sort");
        assert_eq!(compiled.fragment, "ORDER BY o.updatedAt DESC");
    }

    #[test]
    fn parses_directions_loosely() {
        assert_eq!("desc".parse::<SortDirection>().ok(), Some(SortDirection::Desc));
        assert_eq!("ASC".parse::<SortDirection>().ok(), Some(SortDirection::Asc));
        assert!("down".parse::<SortDirection>().is_err());
    }
}
