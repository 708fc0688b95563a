#![allow(missing_docs)]

use std::collections::HashSet;

use crm_query::memory::{MemoryGraph, MemoryNode};
use crm_query::pattern::NodePattern;
use crm_query::{
    assemble, execute_read, filter, BasePattern, Comparator, EntityKind, FieldRegistry, FilterNode,
    LeafComparison, OptionalJoins, PaginatedNodes, PatternPath, QueryPlan, SortDirection, SortRule,
    Value,
};
use proptest::prelude::*;
use proptest::sample::select;

#[derive(Clone, Debug)]
struct Org {
    name: Option<String>,
    employees: Option<i64>,
    updated: i64,
    emails: Vec<String>,
}

fn arb_org() -> impl Strategy<Value = Org> {
    (
        prop::option::of(select(vec!["Acme Corp", "acme labs", "ACME CORP", "Globex", "", "INITECH"])),
        prop::option::of(0i64..100),
        0i64..4,
        prop::collection::vec(select(vec!["sales@acme.io", "ops@globex.com", "ceo@initech.com"]), 0..3),
    )
        .prop_map(|(name, employees, updated, emails)| Org {
            name: name.map(str::to_owned),
            employees,
            updated,
            emails: emails.into_iter().map(str::to_owned).collect(),
        })
}

fn leaf(property: &str, comparator: Comparator, value: impl Into<Value>) -> LeafComparison {
    LeafComparison::new(property, comparator, value).expect("valid leaf")
}

fn arb_root_leaf() -> impl Strategy<Value = FilterNode> {
    prop_oneof![
        (select(vec!["acme", "Acme", "glob", ""]), any::<bool>()).prop_map(|(needle, sensitive)| {
            FilterNode::leaf(leaf("name", Comparator::Contains, needle).with_case_sensitivity(true, sensitive))
        }),
        (select(vec!["Acme Corp", "", "Globex"]), any::<bool>()).prop_map(|(exact, sensitive)| {
            FilterNode::leaf(leaf("name", Comparator::Equals, exact).with_case_sensitivity(true, sensitive))
        }),
        (0i64..100).prop_map(|n| FilterNode::leaf(leaf("employees", Comparator::Gte, n))),
        (0i64..100).prop_map(|n| FilterNode::leaf(leaf("employees", Comparator::Lte, n))),
        Just(FilterNode::leaf(LeafComparison::is_null("name"))),
        Just(FilterNode::leaf(LeafComparison::is_null("employees"))),
        (prop::collection::vec(select(vec!["Globex", "INITECH", "initech"]), 0..3), any::<bool>()).prop_map(
            |(names, sensitive)| {
                FilterNode::leaf(leaf("name", Comparator::In, names).with_case_sensitivity(true, sensitive))
            }
        ),
    ]
}

fn arb_email_leaf() -> impl Strategy<Value = FilterNode> {
    select(vec!["acme", "globex", "ACME"]).prop_map(|needle| {
        FilterNode::leaf(
            leaf("email", Comparator::Contains, needle)
                .with_case_sensitivity(true, false)
                .on_alias("e"),
        )
    })
}

fn arb_filter(with_joins: bool) -> impl Strategy<Value = FilterNode> {
    let leaves = if with_joins {
        prop_oneof![3 => arb_root_leaf(), 1 => arb_email_leaf()].boxed()
    } else {
        arb_root_leaf().boxed()
    };
    leaves.prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(FilterNode::and),
            prop::collection::vec(inner.clone(), 0..3).prop_map(FilterNode::or),
            inner.prop_map(FilterNode::negated),
        ]
    })
}

fn arb_direction() -> impl Strategy<Value = SortDirection> {
    prop_oneof![Just(SortDirection::Asc), Just(SortDirection::Desc)]
}

fn arb_sort_rule() -> impl Strategy<Value = SortRule> {
    prop_oneof![
        (arb_direction(), any::<bool>()).prop_map(|(direction, sensitive)| {
            SortRule::new("o", "name", direction).with_case_sensitivity(true, sensitive)
        }),
        arb_direction().prop_map(|direction| SortRule::new("o", "employees", direction)),
        arb_direction().prop_map(|direction| SortRule::new("o", "updatedAt", direction)),
        (arb_direction(), any::<bool>()).prop_map(|(direction, sensitive)| {
            SortRule::new("e", "email", direction).with_case_sensitivity(true, sensitive)
        }),
        arb_direction().prop_map(|direction| {
            SortRule::new("e", "name", direction)
                .with_case_sensitivity(true, false)
                .coalesce_with("o")
        }),
    ]
}

fn arb_sort() -> impl Strategy<Value = Vec<SortRule>> {
    prop::collection::vec(arb_sort_rule(), 0..3)
}

fn graph(orgs: &[Org]) -> MemoryGraph {
    let graph = MemoryGraph::new();
    for (idx, org) in orgs.iter().enumerate() {
        let key = format!("o{idx}");
        graph
            .insert_node(
                MemoryNode::new(key.clone(), &["Organization"])
                    .with("name", org.name.clone())
                    .with("employees", org.employees)
                    .with("updatedAt", Value::DateTime(i128::from(org.updated))),
            )
            .expect("insert org");
        for (n, email) in org.emails.iter().enumerate() {
            let email_key = format!("{key}-e{n}");
            graph
                .insert_node(MemoryNode::new(email_key.clone(), &["Email"]).with("email", email.as_str()))
                .expect("insert email");
            graph.insert_edge(&key, "HAS", &email_key).expect("edge");
        }
    }
    graph
}

fn joins() -> OptionalJoins {
    OptionalJoins::new().join(
        "e",
        PatternPath::from("o").out("HAS", NodePattern::entity("e", EntityKind::Email)),
    )
}

fn plan(filter: &FilterNode, skip: i64, limit: i64) -> QueryPlan {
    sorted_plan(filter, &[], skip, limit)
}

fn sorted_plan(filter: &FilterNode, sort: &[SortRule], skip: i64, limit: i64) -> QueryPlan {
    let registry = FieldRegistry::standard().expect("registry");
    let base = BasePattern::new("o", EntityKind::Organization);
    assemble(&registry, &base, &joins(), filter, sort, skip, limit).expect("plan")
}

fn run(graph: &MemoryGraph, filter: &FilterNode, skip: i64, limit: i64) -> PaginatedNodes<MemoryNode> {
    run_sorted(graph, filter, &[], skip, limit)
}

fn run_sorted(
    graph: &MemoryGraph,
    filter: &FilterNode,
    sort: &[SortRule],
    skip: i64,
    limit: i64,
) -> PaginatedNodes<MemoryNode> {
    execute_read(graph, &sorted_plan(filter, sort, skip, limit)).expect("execute")
}

fn keys(page: &PaginatedNodes<MemoryNode>) -> Vec<String> {
    page.items.iter().map(|node| node.key.clone()).collect()
}

proptest! {
    #[test]
    fn prop_unbounded_page_matches_count(
        orgs in prop::collection::vec(arb_org(), 0..12),
        filter in arb_filter(true),
    ) {
        let graph = graph(&orgs);
        let page = run(&graph, &filter, 0, orgs.len() as i64 + 1);
        prop_assert_eq!(page.items.len() as i64, page.total_count);
    }

    #[test]
    fn prop_pages_concatenate_without_gaps(
        orgs in prop::collection::vec(arb_org(), 0..12),
        filter in arb_filter(true),
        size in 1i64..5,
    ) {
        let graph = graph(&orgs);
        let full = run(&graph, &filter, 0, orgs.len() as i64 + 1);
        let mut collected = Vec::new();
        let mut skip = 0;
        loop {
            let page = run(&graph, &filter, skip, size);
            prop_assert_eq!(page.total_count, full.total_count);
            if page.items.is_empty() {
                break;
            }
            collected.extend(keys(&page));
            skip += size;
        }
        let distinct: HashSet<&String> = collected.iter().collect();
        prop_assert_eq!(distinct.len(), collected.len());
        prop_assert_eq!(collected.len() as i64, full.total_count);
        prop_assert_eq!(collected, keys(&full));
    }

    #[test]
    fn prop_sorted_pages_concatenate_without_gaps(
        orgs in prop::collection::vec(arb_org(), 0..12),
        filter in arb_filter(true),
        sort in arb_sort(),
        size in 1i64..5,
    ) {
        let graph = graph(&orgs);
        let full = run_sorted(&graph, &filter, &sort, 0, orgs.len() as i64 + 1);
        prop_assert_eq!(full.items.len() as i64, full.total_count);
        let mut collected = Vec::new();
        let mut skip = 0;
        loop {
            let page = run_sorted(&graph, &filter, &sort, skip, size);
            prop_assert_eq!(page.total_count, full.total_count);
            if page.items.is_empty() {
                break;
            }
            collected.extend(keys(&page));
            skip += size;
        }
        let distinct: HashSet<&String> = collected.iter().collect();
        prop_assert_eq!(distinct.len(), collected.len());
        prop_assert_eq!(collected, keys(&full));

        let again = run_sorted(&graph, &filter, &sort, 0, orgs.len() as i64 + 1);
        prop_assert_eq!(keys(&again), keys(&full));
    }

    #[test]
    fn prop_joined_sort_keys_project_their_aliases(sort in arb_sort()) {
        let plan = sorted_plan(&FilterNode::empty(), &sort, 0, 10);
        let reads_email = sort.iter().any(|rule| rule.entity_alias() == "e");
        prop_assert_eq!(plan.page_query_text.contains(" WITH o, e ORDER BY "), reads_email);
        prop_assert_eq!(
            plan.page_query_text.contains("OPTIONAL MATCH (o)-[:HAS]->(e:Email) WITH *"),
            reads_email
        );
        prop_assert!(!plan.count_query_text.contains("ORDER BY"));
    }

    #[test]
    fn prop_default_order_is_repeatable(
        orgs in prop::collection::vec(arb_org(), 0..12),
        filter in arb_filter(true),
    ) {
        let graph = graph(&orgs);
        let first = run(&graph, &filter, 0, 50);
        let second = run(&graph, &filter, 0, 50);
        prop_assert_eq!(keys(&first), keys(&second));
    }

    #[test]
    fn prop_recompiling_yields_identical_parameters(tree in arb_filter(true)) {
        let first = filter::compile(&tree, "o", "o_param_");
        let second = filter::compile(&tree, "o", "o_param_");
        prop_assert_eq!(&first.params, &second.params);
        prop_assert_eq!(&first.fragment, &second.fragment);

        let plan = plan(&tree, 0, 10);
        let prefix = plan
            .count_query_text
            .strip_suffix(" RETURN count(distinct(o))")
            .expect("count tail");
        prop_assert!(plan.page_query_text.starts_with(prefix));
        for name in first.params.keys() {
            prop_assert!(plan.parameters.contains_key(name));
        }
    }

    #[test]
    fn prop_root_only_filters_never_join(filter in arb_filter(false)) {
        let plan = plan(&filter, 0, 10);
        prop_assert!(!plan.count_query_text.contains("OPTIONAL MATCH"));
        prop_assert!(!plan.page_query_text.contains("OPTIONAL MATCH"));
        prop_assert!(plan.required_aliases.is_empty());
    }
}

#[test]
fn empty_in_matches_nothing() {
    let orgs: Vec<Org> = (0..4)
        .map(|n| Org {
            name: Some(format!("Org {n}")),
            employees: Some(n),
            updated: n,
            emails: Vec::new(),
        })
        .collect();
    let graph = graph(&orgs);
    let filter = FilterNode::leaf(leaf("name", Comparator::In, Value::List(Vec::new())));
    let page = run(&graph, &filter, 0, 10);
    assert_eq!(page.total_count, 0);
    assert!(page.items.is_empty());

    let either = FilterNode::or(vec![filter, FilterNode::leaf(leaf("employees", Comparator::Gte, 2i64))]);
    assert_eq!(run(&graph, &either, 0, 10).total_count, 2);
}

#[test]
fn case_insensitive_contains_ignores_stored_case() {
    let orgs = ["acme corp", "ACME CORP", "Globex"].map(|name| Org {
        name: Some(name.to_owned()),
        employees: None,
        updated: 0,
        emails: Vec::new(),
    });
    let graph = graph(&orgs);
    let insensitive = FilterNode::leaf(
        leaf("name", Comparator::Contains, "Acme").with_case_sensitivity(true, false),
    );
    let page = run(&graph, &insensitive, 0, 10);
    assert_eq!(page.total_count, 2);
    assert_eq!(keys(&page), vec!["o0".to_string(), "o1".to_string()]);

    let sensitive = FilterNode::leaf(leaf("name", Comparator::Contains, "Acme").with_case_sensitivity(true, true));
    assert_eq!(run(&graph, &sensitive, 0, 10).total_count, 0);
}
