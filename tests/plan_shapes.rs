#![allow(missing_docs)]

use crm_query::views::{ContactView, OrganizationView};
use crm_query::{
    assemble, filter, BasePattern, Comparator, EntityKind, FieldRegistry, FilterNode,
    LeafComparison, ListRequest, OptionalJoins, QueryPlan, SortDirection, SortRule, Value,
    ViewOptions,
};
use serde_json::json;

fn registry() -> FieldRegistry {
    FieldRegistry::standard().expect("registry")
}

fn organizations(request: serde_json::Value) -> QueryPlan {
    let request: ListRequest = serde_json::from_value(request).expect("request");
    OrganizationView::new()
        .plan(&registry(), "t1", &request, &ViewOptions::default())
        .expect("plan")
}

fn prefix(plan: &QueryPlan) -> &str {
    plan.count_query_text
        .strip_suffix(" RETURN count(distinct(o))")
        .expect("count tail")
}

#[test]
fn unfiltered_plan_matches_the_root_only() {
    let registry = registry();
    let base = BasePattern::new("o", EntityKind::Organization);
    let plan = assemble(&registry, &base, &OptionalJoins::new(), &FilterNode::empty(), &[], 0, 20)
        .expect("plan");
    assert_eq!(plan.count_query_text, "MATCH (o:Organization) RETURN count(distinct(o))");
    assert_eq!(
        plan.page_query_text,
        "MATCH (o:Organization) RETURN distinct(o) ORDER BY o.updatedAt DESC SKIP $skip LIMIT $limit"
    );
    assert_eq!(plan.parameters.len(), 2);
}

#[test]
fn count_and_page_share_one_prefix() {
    let plan = organizations(json!({
        "where": {"and": [
            {"filter": {"property": "EMAIL", "value": "acme"}},
            {"filter": {"property": "COUNTRY", "value": "US"}}
        ]},
        "sort": {"by": "DOMAIN"}
    }));
    let shared = prefix(&plan);
    assert!(plan.page_query_text.starts_with(shared));
    assert_eq!(
        &plan.page_query_text[shared.len()..],
        " WITH o, d ORDER BY toLower(d.domain) RETURN distinct(o) SKIP $skip LIMIT $limit"
    );
}

#[test]
fn only_referenced_joins_are_emitted() {
    let plain = organizations(json!({"where": {"filter": {"property": "NAME", "value": "acme"}}}));
    assert!(!plain.count_query_text.contains("OPTIONAL MATCH"));
    assert!(!plain.page_query_text.contains("OPTIONAL MATCH"));
    assert!(plain.required_aliases.is_empty());

    let joined = organizations(json!({"where": {"and": [
        {"filter": {"property": "TAGS", "value": ["tag-1"]}},
        {"filter": {"property": "EMAIL", "value": "acme"}}
    ]}}));
    let text = &joined.count_query_text;
    let email = text.find("OPTIONAL MATCH (o)-[:HAS]->(e:Email) WITH *").expect("email join");
    let tags = text.find("OPTIONAL MATCH (o)-[:TAGGED]->(t:Tag) WITH *").expect("tag join");
    assert!(email < tags);
    assert!(!text.contains("HAS_DOMAIN"));
    assert!(!text.contains("SUBSIDIARY_OF"));
    assert_eq!(
        joined.required_aliases.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["e", "t"]
    );
}

#[test]
fn scopes_keep_their_own_parameter_prefixes() {
    let plan = organizations(json!({"where": {"and": [
        {"filter": {"property": "EMAIL", "value": "Billing"}},
        {"filter": {"property": "REGION", "value": "CA"}},
        {"filter": {"property": "LOCALITY", "value": "Oakland"}}
    ]}}));
    assert!(!plan.parameters.contains_key("o_param_3"));
    for name in ["o_param_1", "o_param_2", "e_param_1", "e_param_2", "l_param_1", "l_param_2"] {
        assert!(plan.parameters.contains_key(name), "missing {name}");
    }
    assert!(plan.count_query_text.contains(
        "(toLower(e.email) CONTAINS toLower($e_param_1) OR toLower(e.rawEmail) CONTAINS toLower($e_param_2))"
    ));
    assert!(plan
        .count_query_text
        .contains("(toLower(l.region) = toLower($l_param_1) OR toLower(l.locality) = toLower($l_param_2))"));
}

#[test]
fn empty_in_renders_false() {
    let registry = registry();
    let base = BasePattern::new("o", EntityKind::Organization);
    let stage = registry.resolve(EntityKind::Organization, "STAGE").expect("STAGE");
    let leaf = LeafComparison::for_field(stage, Comparator::In, Value::List(Vec::new())).expect("leaf");
    let plan = assemble(&registry, &base, &OptionalJoins::new(), &FilterNode::leaf(leaf), &[], 0, 5)
        .expect("plan");
    assert_eq!(plan.count_query_text, "MATCH (o:Organization) WHERE false RETURN count(distinct(o))");
    assert!(!plan.parameters.contains_key("o_param_1"));
}

#[test]
fn compiling_twice_yields_identical_parameters() {
    let registry = registry();
    let name = registry.resolve(EntityKind::Organization, "NAME").expect("NAME");
    let employees = registry.resolve(EntityKind::Organization, "EMPLOYEES").expect("EMPLOYEES");
    let tree = FilterNode::and(vec![
        FilterNode::or(vec![
            LeafComparison::for_field(name, Comparator::Contains, "a").expect("leaf").into(),
            FilterNode::and(vec![
                LeafComparison::for_field(employees, Comparator::Gte, 10i64).expect("leaf").into(),
                LeafComparison::for_field(employees, Comparator::Lte, 50i64).expect("leaf").into(),
            ])
            .negated(),
        ]),
        LeafComparison::for_field(name, Comparator::Equals, "b").expect("leaf").into(),
    ]);
    let first = filter::compile(&tree, "o", "o_param_");
    let second = filter::compile(&tree, "o", "o_param_");
    assert_eq!(first.params, second.params);
    assert_eq!(first.fragment, second.fragment);
    assert_eq!(
        first.params.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["o_param_1", "o_param_2", "o_param_3", "o_param_4"]
    );
    assert!(first.fragment.contains("NOT (o.employees >= $o_param_2 AND o.employees <= $o_param_3)"));
}

#[test]
fn explicit_sort_rules_replace_the_default() {
    let registry = registry();
    let base = BasePattern::new("o", EntityKind::Organization);
    let name = registry.resolve(EntityKind::Organization, "NAME").expect("NAME");
    let rules = [SortRule::for_field("o", name, SortDirection::Desc).case_sensitive(false)];
    let plan = assemble(&registry, &base, &OptionalJoins::new(), &FilterNode::empty(), &rules, 40, 20)
        .expect("plan");
    assert!(plan.page_query_text.ends_with("ORDER BY toLower(o.name) DESC SKIP $skip LIMIT $limit"));
    assert!(!plan.page_query_text.contains("updatedAt"));
    assert_eq!(plan.parameters["skip"], Value::Int(40));
}

#[test]
fn contact_plans_walk_job_roles_only_when_needed() {
    let registry = registry();
    let view = ContactView::new();
    let request: ListRequest =
        serde_json::from_value(json!({"where": {"filter": {"property": "ORGANIZATION", "value": "Acme"}}}))
            .expect("request");
    let plan = view
        .plan(&registry, "t1", &request, &ViewOptions::default())
        .expect("plan");
    assert!(plan
        .count_query_text
        .contains("OPTIONAL MATCH (c)-[:WORKS_AS]->(:JobRole)-[:ROLE_IN]->(org:Organization) WITH *"));
    assert!(!plan.count_query_text.contains("(e:Email)"));
    assert!(plan.count_query_text.ends_with("RETURN count(distinct(c))"));
}

#[test]
fn plans_serialize_for_inspection() {
    let plan = organizations(json!({"pagination": {"page": 2, "limit": 5}}));
    let json = serde_json::to_value(&plan).expect("serialize");
    assert_eq!(json["skip"], 5);
    assert_eq!(json["limit"], 5);
    assert_eq!(json["entity"], "ORGANIZATION");
    assert!(json["countQueryText"].as_str().expect("text").starts_with("MATCH (o:Organization)"));
    assert!(json.get("logical").is_none());
}
