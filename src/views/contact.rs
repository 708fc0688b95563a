//! Contact listing.
//!
//! `EMAIL` and `ORGANIZATION` filters target joined nodes; every other property
//! resolves against the contact fields.

use crate::assembler::{FilterScope, QueryAssembler, QueryPlan};
use crate::error::Result;
use crate::filter::{Comparator, FilterNode, LeafComparison};
use crate::input::{ListRequest, Operation, SortInput, Translator};
use crate::pattern::{BasePattern, NodePattern, OptionalJoins, PatternPath};
use crate::registry::{EntityKind, FieldRegistry};
use crate::sort::SortRule;

use super::{forced, split_top_level, ViewOptions};

const ROOT: &str = "c";

/// Base pattern and joins of the contact listing.
#[derive(Clone, Debug)]
pub struct ContactView {
    base: BasePattern,
    joins: OptionalJoins,
}

impl Default for ContactView {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactView {
    /// `MATCH (c:Contact)` with joins `e` then `org`.
    pub fn new() -> Self {
        let base = BasePattern::new(ROOT, EntityKind::Contact);
        let joins = OptionalJoins::new()
            .join(
                "e",
                PatternPath::from(ROOT).out("HAS", NodePattern::entity("e", EntityKind::Email)),
            )
            .join(
                "org",
                PatternPath::from(ROOT)
                    .out("WORKS_AS", NodePattern::anonymous("JobRole"))
                    .out("ROLE_IN", NodePattern::entity("org", EntityKind::Organization)),
            );
        Self { base, joins }
    }

    /// Optional joins in emission order.
    pub fn joins(&self) -> &OptionalJoins {
        &self.joins
    }

    /// Builds the count/page plan for `request` within `tenant`.
    pub fn plan(
        &self,
        registry: &FieldRegistry,
        tenant: &str,
        request: &ListRequest,
        options: &ViewOptions,
    ) -> Result<QueryPlan> {
        let (skip, limit) = options.window(request.pagination)?;
        let contacts = Translator::new(registry, EntityKind::Contact)
            .case_sensitive_default(options.case_sensitive_default);

        let mut own = vec![FilterNode::leaf(LeafComparison::for_field(
            registry.resolve(EntityKind::Contact, "TENANT")?,
            Comparator::Equals,
            tenant,
        )?)];
        let mut email = Vec::new();
        let mut org = Vec::new();
        if let Some(filter) = &request.filter {
            let (items, rest) = split_top_level(filter);
            for item in items {
                match item.property.as_str() {
                    "EMAIL" => {
                        let field = registry.resolve(EntityKind::Email, "EMAIL")?;
                        email.push(contacts.item_on(field, &forced(item, Operation::Contains, false))?);
                    }
                    "ORGANIZATION" => {
                        let field = registry.resolve(EntityKind::Organization, "NAME")?;
                        org.push(contacts.item_on(field, &forced(item, Operation::Contains, false))?);
                    }
                    _ => own.push(contacts.item(item)?),
                }
            }
            for nested in &rest {
                own.push(contacts.filter(nested)?);
            }
        }

        let rules = match &request.sort {
            Some(sort) => vec![self.sort_rule(registry, &contacts, sort, options.case_sensitive_default)?],
            None => Vec::new(),
        };

        let mut assembler = QueryAssembler::new(registry, &self.base, &self.joins)
            .filter(FilterScope::on(ROOT, FilterNode::and(own)))
            .filter(FilterScope::on("e", FilterNode::and(email)))
            .filter(FilterScope::on("org", FilterNode::and(org)))
            .sort(rules)
            .page(skip, limit);
        if let Some(filter) = &request.filter {
            for name in filter.active_filters() {
                assembler = assembler.active_filter(name);
            }
        }
        assembler.assemble()
    }

    fn sort_rule(
        &self,
        registry: &FieldRegistry,
        contacts: &Translator<'_>,
        sort: &SortInput,
        case_default: bool,
    ) -> Result<SortRule> {
        let case_sensitive = sort.case_sensitive.unwrap_or(case_default);
        let joined = |alias: &str, entity, name: &str| -> Result<SortRule> {
            Ok(SortRule::for_field(alias, registry.resolve(entity, name)?, sort.direction)
                .case_sensitive(case_sensitive))
        };
        match sort.by.as_str() {
            "EMAIL" => joined("e", EntityKind::Email, "EMAIL"),
            "ORGANIZATION" => joined("org", EntityKind::Organization, "NAME"),
            _ => contacts.sort(ROOT, sort),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan(value: serde_json::Value) -> QueryPlan {
        let registry = FieldRegistry::standard().expect("registry");
        let request: ListRequest = serde_json::from_value(value).expect("request");
        ContactView::new()
            .plan(&registry, "t1", &request, &ViewOptions::default())
            .expect("plan")
    }

    #[test]
    fn plain_filters_need_no_joins() {
        let plan = plan(json!({"where": {"filter": {"property": "FIRST_NAME", "operation": "CONTAINS", "value": "Ann"}}}));
        assert_eq!(
            plan.count_query_text,
            "MATCH (c:Contact) WHERE (c.tenant = $c_param_1 AND toLower(c.firstName) CONTAINS toLower($c_param_2)) RETURN count(distinct(c))"
        );
        assert!(plan.required_aliases.is_empty());
    }

    #[test]
    fn organization_filter_walks_job_roles() {
        let plan = plan(json!({
            "where": {"filter": {"property": "ORGANIZATION", "value": "acme"}},
            "sort": {"by": "EMAIL", "direction": "DESC"}
        }));
        assert!(plan.count_query_text.contains(
            "OPTIONAL MATCH (c)-[:HAS]->(e:Email) WITH * OPTIONAL MATCH (c)-[:WORKS_AS]->(:JobRole)-[:ROLE_IN]->(org:Organization) WITH *"
        ));
        assert!(plan
            .page_query_text
            .contains("WITH c, e ORDER BY toLower(e.email) DESC RETURN distinct(c)"));
        assert!(plan.parameters.contains_key("org_param_1"));
    }
}
