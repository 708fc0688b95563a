//! Graph patterns consumed by the query assembler.
//!
//! A [`BasePattern`] is the mandatory `MATCH` every plan starts from; an
//! [`OptionalJoins`] table lists the `OPTIONAL MATCH` fragments an endpoint can
//! bring into scope, in the order they are emitted.

use std::collections::BTreeSet;
use std::fmt;

use crate::expr::ident;
use crate::registry::EntityKind;

/// Direction of a relationship hop relative to the node it starts from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EdgeDirection {
    /// `-[:T]->`
    #[default]
    Out,
    /// `<-[:T]-`
    In,
    /// `-[:T]-`
    Both,
}

/// Node in a pattern path; anonymous when `alias` is `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodePattern {
    /// Variable bound to the node.
    pub alias: Option<String>,
    /// Required label.
    pub label: Option<String>,
}

impl NodePattern {
    /// `(alias:Label)`
    pub fn new(alias: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            label: Some(label.into()),
        }
    }

    /// `(:Label)`
    pub fn anonymous(label: impl Into<String>) -> Self {
        Self {
            alias: None,
            label: Some(label.into()),
        }
    }

    /// `(alias:Label)` for an entity kind.
    pub fn entity(alias: impl Into<String>, entity: EntityKind) -> Self {
        Self::new(alias, entity.label())
    }
}

impl fmt::Display for NodePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        if let Some(alias) = &self.alias {
            write!(f, "{}", ident(alias))?;
        }
        if let Some(label) = &self.label {
            write!(f, ":{}", ident(label))?;
        }
        write!(f, ")")
    }
}

/// One relationship traversal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hop {
    /// Relationship type.
    pub rel_type: String,
    /// Traversal direction.
    pub direction: EdgeDirection,
    /// Node reached by the hop.
    pub node: NodePattern,
}

/// Linear path starting at an alias already in scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternPath {
    /// Alias the path starts from.
    pub start: String,
    /// Traversals in order.
    pub hops: Vec<Hop>,
}

impl PatternPath {
    /// Starts a path at `start`.
    pub fn from(start: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            hops: Vec::new(),
        }
    }

    /// Appends `-[:rel]->(node)`.
    pub fn out(self, rel_type: impl Into<String>, node: NodePattern) -> Self {
        self.hop(rel_type, EdgeDirection::Out, node)
    }

    /// Appends `<-[:rel]-(node)`.
    pub fn incoming(self, rel_type: impl Into<String>, node: NodePattern) -> Self {
        self.hop(rel_type, EdgeDirection::In, node)
    }

    /// Appends `-[:rel]-(node)`.
    pub fn either(self, rel_type: impl Into<String>, node: NodePattern) -> Self {
        self.hop(rel_type, EdgeDirection::Both, node)
    }

    fn hop(mut self, rel_type: impl Into<String>, direction: EdgeDirection, node: NodePattern) -> Self {
        self.hops.push(Hop {
            rel_type: rel_type.into(),
            direction,
            node,
        });
        self
    }

    /// Aliases newly bound by the hops of this path.
    pub fn bound_aliases(&self) -> impl Iterator<Item = &str> {
        self.hops.iter().filter_map(|hop| hop.node.alias.as_deref())
    }
}

impl fmt::Display for PatternPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", ident(&self.start))?;
        for hop in &self.hops {
            let rel = ident(&hop.rel_type);
            match hop.direction {
                EdgeDirection::Out => write!(f, "-[:{rel}]->")?,
                EdgeDirection::In => write!(f, "<-[:{rel}]-")?,
                EdgeDirection::Both => write!(f, "-[:{rel}]-")?,
            }
            write!(f, "{}", hop.node)?;
        }
        Ok(())
    }
}

/// Mandatory `MATCH` clause: the root entity plus any required hops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasePattern {
    root_alias: String,
    entity: EntityKind,
    paths: Vec<PatternPath>,
}

impl BasePattern {
    /// `MATCH (alias:Label)`
    pub fn new(root_alias: impl Into<String>, entity: EntityKind) -> Self {
        Self {
            root_alias: root_alias.into(),
            entity,
            paths: Vec::new(),
        }
    }

    /// Adds a mandatory path, rendered after the root node separated by a comma.
    pub fn with_path(mut self, path: PatternPath) -> Self {
        self.paths.push(path);
        self
    }

    /// Variable bound to the root entity.
    pub fn root_alias(&self) -> &str {
        &self.root_alias
    }

    /// Entity kind of the root node.
    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    /// Mandatory paths.
    pub fn paths(&self) -> &[PatternPath] {
        &self.paths
    }

    /// Every alias the base pattern binds.
    pub fn bound_aliases(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::from([self.root_alias.as_str()]);
        for path in &self.paths {
            out.extend(path.bound_aliases());
        }
        out
    }
}

impl fmt::Display for BasePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MATCH {}",
            NodePattern::entity(self.root_alias.clone(), self.entity)
        )?;
        for path in &self.paths {
            write!(f, ", {path}")?;
        }
        Ok(())
    }
}

/// Optional joins keyed by the alias they bring into scope, in emission order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptionalJoins {
    entries: Vec<(String, PatternPath)>,
}

impl OptionalJoins {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the join that binds `alias`. Redeclaring an alias replaces its
    /// path but keeps its original position.
    pub fn join(mut self, alias: impl Into<String>, path: PatternPath) -> Self {
        let alias = alias.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == alias) {
            Some(entry) => entry.1 = path,
            None => self.entries.push((alias, path)),
        }
        self
    }

    /// Path declared for `alias`.
    pub fn get(&self, alias: &str) -> Option<&PatternPath> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == alias)
            .map(|(_, path)| path)
    }

    /// Iterates `(alias, path)` pairs in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PatternPath)> {
        self.entries.iter().map(|(alias, path)| (alias.as_str(), path))
    }

    /// Number of declared joins.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no join is declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Renders one optional join clause as emitted in plans.
pub(crate) fn optional_clause(path: &PatternPath) -> String {
    format!("OPTIONAL MATCH {path} WITH *")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_base_pattern_with_hops() {
        let base = BasePattern::new("c", EntityKind::Contact).with_path(
            PatternPath::from("c").incoming("HAS", NodePattern::anonymous("Tenant")),
        );
        assert_eq!(base.to_string(), "MATCH (c:Contact), (c)<-[:HAS]-(:Tenant)");
        assert_eq!(base.bound_aliases(), BTreeSet::from(["c"]));
    }

    #[test]
    fn renders_multi_hop_optional_join() {
        let path = PatternPath::from("c")
            .out("WORKS_AS", NodePattern::anonymous("JobRole"))
            .out("ROLE_IN", NodePattern::entity("org", EntityKind::Organization));
        assert_eq!(
            optional_clause(&path),
            "OPTIONAL MATCH (c)-[:WORKS_AS]->(:JobRole)-[:ROLE_IN]->(org:Organization) WITH *"
        );
        assert_eq!(path.bound_aliases().collect::<Vec<_>>(), vec!["org"]);
    }

    #[test]
    fn redeclared_join_keeps_position() {
        let joins = OptionalJoins::new()
            .join("d", PatternPath::from("o").out("HAS_DOMAIN", NodePattern::new("d", "Domain")))
            .join("e", PatternPath::from("o").out("HAS", NodePattern::new("e", "Email")))
            .join("d", PatternPath::from("o").either("HAS_DOMAIN", NodePattern::new("d", "Domain")));
        let order: Vec<_> = joins.iter().map(|(alias, _)| alias).collect();
        assert_eq!(order, vec!["d", "e"]);
        assert_eq!(
            joins.get("d").map(ToString::to_string).as_deref(),
            Some("(o)-[:HAS_DOMAIN]-(d:Domain)")
        );
    }
}
