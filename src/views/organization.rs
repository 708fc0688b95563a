//! Organization dashboard listing.
//!
//! Request properties map onto five filter scopes, each compiled with its own
//! parameter prefix:
//!
//! | scope   | alias   | prefix          | combinator |
//! |---------|---------|-----------------|------------|
//! | org     | `o`     | `o_param_`      | AND        |
//! | email   | `e`     | `e_param_`      | OR         |
//! | place   | `l`     | `l_param_`      | OR         |
//! | owner   | `owner` | `owner_param_`  | AND        |
//! | tags    | `t`     | `t_param_`      | AND        |
//!
//! The tenant leaf and the hidden-organization leaf are always part of the org
//! scope. Properties without a dedicated mapping are resolved generically
//! against the organization fields.

use serde_json::Value as Json;

use crate::assembler::{FilterScope, QueryAssembler, QueryPlan};
use crate::error::{QueryError, Result};
use crate::filter::{Comparator, FilterNode, LeafComparison};
use crate::input::{FilterItem, ListRequest, Operation, SortInput, Translator};
use crate::pattern::{BasePattern, NodePattern, OptionalJoins, PatternPath};
use crate::registry::{EntityKind, FieldRegistry};
use crate::sort::{SortDirection, SortRule};
use crate::value::Value;

use super::{forced, split_top_level, ViewOptions};

const ROOT: &str = "o";

/// Renewal likelihood as exposed by the API and as stored on organizations.
///
/// The table is a process-wide constant; nothing mutates it after compilation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenewalLikelihood {
    /// Renewal expected.
    High,
    /// Renewal uncertain.
    Medium,
    /// Renewal unlikely.
    Low,
    /// Churn expected.
    Zero,
}

struct LikelihoodEntry {
    likelihood: RenewalLikelihood,
    api: &'static str,
    stored: &'static str,
    order: i64,
}

const LIKELIHOODS: [LikelihoodEntry; 4] = [
    LikelihoodEntry { likelihood: RenewalLikelihood::High, api: "HIGH_RENEWAL", stored: "HIGH", order: 10 },
    LikelihoodEntry { likelihood: RenewalLikelihood::Medium, api: "MEDIUM_RENEWAL", stored: "MEDIUM", order: 20 },
    LikelihoodEntry { likelihood: RenewalLikelihood::Low, api: "LOW_RENEWAL", stored: "LOW", order: 30 },
    LikelihoodEntry { likelihood: RenewalLikelihood::Zero, api: "ZERO_RENEWAL", stored: "ZERO", order: 40 },
];

impl RenewalLikelihood {
    fn entry(self) -> &'static LikelihoodEntry {
        match self {
            RenewalLikelihood::High => &LIKELIHOODS[0],
            RenewalLikelihood::Medium => &LIKELIHOODS[1],
            RenewalLikelihood::Low => &LIKELIHOODS[2],
            RenewalLikelihood::Zero => &LIKELIHOODS[3],
        }
    }

    /// Parses an API value; stored spellings are accepted too.
    pub fn parse(raw: &str) -> Option<Self> {
        LIKELIHOODS
            .iter()
            .find(|e| e.api.eq_ignore_ascii_case(raw) || e.stored.eq_ignore_ascii_case(raw))
            .map(|e| e.likelihood)
    }

    /// Maps a stored value back to the enum.
    pub fn from_stored(stored: &str) -> Option<Self> {
        LIKELIHOODS.iter().find(|e| e.stored == stored).map(|e| e.likelihood)
    }

    /// API spelling.
    pub fn api_name(self) -> &'static str {
        self.entry().api
    }

    /// Spelling stored in `derivedRenewalLikelihood`.
    pub fn stored(self) -> &'static str {
        self.entry().stored
    }

    /// Value stored in `derivedRenewalLikelihoodOrder`; lower is more likely.
    pub fn sort_order(self) -> i64 {
        self.entry().order
    }
}

/// Base pattern and joins of the organization listing.
#[derive(Clone, Debug)]
pub struct OrganizationView {
    base: BasePattern,
    joins: OptionalJoins,
}

impl Default for OrganizationView {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Scopes {
    org: Vec<FilterNode>,
    email: Vec<FilterNode>,
    location: Vec<FilterNode>,
    owner: Vec<FilterNode>,
    tags: Vec<FilterNode>,
}

impl OrganizationView {
    /// Declares the pattern; joins are emitted in the order owner, d, e, l, t, parent.
    pub fn new() -> Self {
        let base = BasePattern::new(ROOT, EntityKind::Organization);
        let joins = OptionalJoins::new()
            .join(
                "owner",
                PatternPath::from(ROOT).incoming("OWNS", NodePattern::entity("owner", EntityKind::User)),
            )
            .join(
                "d",
                PatternPath::from(ROOT).out("HAS_DOMAIN", NodePattern::entity("d", EntityKind::Domain)),
            )
            .join(
                "e",
                PatternPath::from(ROOT).out("HAS", NodePattern::entity("e", EntityKind::Email)),
            )
            .join(
                "l",
                PatternPath::from(ROOT)
                    .out("ASSOCIATED_WITH", NodePattern::entity("l", EntityKind::Location)),
            )
            .join(
                "t",
                PatternPath::from(ROOT).out("TAGGED", NodePattern::entity("t", EntityKind::Tag)),
            )
            .join(
                "parent",
                PatternPath::from(ROOT)
                    .out("SUBSIDIARY_OF", NodePattern::entity("parent", EntityKind::Organization)),
            );
        Self { base, joins }
    }

    /// Mandatory pattern.
    pub fn base(&self) -> &BasePattern {
        &self.base
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
        let translator = Translator::new(registry, EntityKind::Organization)
            .case_sensitive_default(options.case_sensitive_default);

        let mut scopes = Scopes::default();
        scopes.org.push(FilterNode::leaf(LeafComparison::for_field(
            registry.resolve(EntityKind::Organization, "TENANT")?,
            Comparator::Equals,
            tenant,
        )?));
        let hide = registry.resolve(EntityKind::Organization, "HIDE")?;
        scopes.org.push(FilterNode::or(vec![
            FilterNode::leaf(LeafComparison::for_field(hide, Comparator::Equals, false)?),
            FilterNode::leaf(LeafComparison::for_field(hide, Comparator::IsNull, Value::Null)?),
        ]));

        if let Some(filter) = &request.filter {
            let (items, rest) = split_top_level(filter);
            for item in items {
                self.route(&translator, item, &mut scopes)?;
            }
            for nested in &rest {
                scopes.org.push(translator.filter(nested)?);
            }
        }

        let rules = match &request.sort {
            Some(sort) => sort_rules(&translator, sort, options.case_sensitive_default)?,
            None => Vec::new(),
        };

        let mut assembler = QueryAssembler::new(registry, &self.base, &self.joins)
            .filter(FilterScope::on(ROOT, FilterNode::and(scopes.org)))
            .filter(FilterScope::on("e", FilterNode::or(scopes.email)))
            .filter(FilterScope::on("l", FilterNode::or(scopes.location)))
            .filter(FilterScope::on("owner", FilterNode::and(scopes.owner)))
            .filter(FilterScope::on("t", FilterNode::and(scopes.tags)))
            .sort(rules)
            .page(skip, limit);
        if let Some(filter) = &request.filter {
            for name in filter.active_filters() {
                assembler = assembler.active_filter(name);
            }
        }
        assembler.assemble()
    }

    fn route(&self, translator: &Translator<'_>, item: &FilterItem, scopes: &mut Scopes) -> Result<()> {
        let registry = translator.registry();
        let org = |name: &str| registry.resolve(EntityKind::Organization, name);
        match item.property.as_str() {
            "ORGANIZATION" => {
                let mut any = Vec::new();
                for name in ["NAME", "WEBSITE", "CUSTOMER_OS_ID", "REFERENCE_ID"] {
                    any.push(translator.item_on(org(name)?, &forced(item, Operation::Contains, false))?);
                }
                scopes.org.push(FilterNode::or(any));
            }
            "NAME" | "WEBSITE" => {
                let field = org(&item.property)?;
                scopes.org.push(translator.item_on(field, &forced(item, Operation::Contains, item.include_empty))?);
            }
            "EMAIL" => {
                for name in ["EMAIL", "RAW_EMAIL"] {
                    let field = registry.resolve(EntityKind::Email, name)?;
                    scopes.email.push(translator.item_on(field, &forced(item, Operation::Contains, false))?);
                }
            }
            "COUNTRY" | "REGION" | "LOCALITY" => {
                let field = registry.resolve(EntityKind::Location, &item.property)?;
                scopes.location.push(translator.item_on(field, &forced(item, Operation::Eq, false))?);
            }
            "OWNER_ID" => {
                let field = registry.resolve(EntityKind::User, "ID")?;
                let mut owner = forced(item, Operation::In, false);
                owner.value = as_list(&item.value);
                let node = translator.item_on(field, &owner)?;
                scopes.owner.push(if item.include_empty {
                    FilterNode::or(vec![node, FilterNode::leaf(LeafComparison::is_null(field.property.clone()))])
                } else {
                    node
                });
            }
            "IS_CUSTOMER" | "LAST_TOUCHPOINT_TYPE" => {
                let mut listed = forced(item, Operation::In, false);
                listed.value = as_list(&item.value);
                scopes.org.push(translator.item_on(org(&item.property)?, &listed)?);
            }
            "RENEWAL_LIKELIHOOD" => {
                let mut stored = Vec::new();
                for raw in as_strings(&item.property, &item.value)? {
                    let likelihood = RenewalLikelihood::parse(&raw).ok_or_else(|| {
                        QueryError::invalid_filter(format!("unknown renewal likelihood '{raw}'"))
                    })?;
                    stored.push(Json::from(likelihood.stored()));
                }
                let mut listed = forced(item, Operation::In, false);
                listed.value = Json::Array(stored);
                scopes.org.push(translator.item_on(org("RENEWAL_LIKELIHOOD")?, &listed)?);
            }
            "RENEWAL_CYCLE_NEXT" | "RENEWAL_DATE" => {
                scopes.org.push(translator.item_on(org(&item.property)?, &forced(item, Operation::Lte, false))?);
            }
            "LAST_TOUCHPOINT_AT" => {
                scopes.org.push(translator.item_on(org(&item.property)?, &forced(item, Operation::Gte, false))?);
            }
            "FORECAST_ARR" => {
                scopes.org.push(translator.item_on(org(&item.property)?, &forced(item, Operation::Between, false))?);
            }
            "TAGS" => {
                let field = registry.resolve(EntityKind::Tag, "ID")?;
                let mut listed = forced(item, Operation::In, false);
                listed.value = as_list(&item.value);
                scopes.tags.push(translator.item_on(field, &listed)?);
            }
            _ => scopes.org.push(translator.item(item)?),
        }
        Ok(())
    }
}

fn as_list(value: &Json) -> Json {
    match value {
        Json::Array(_) => value.clone(),
        Json::Null => Json::Array(Vec::new()),
        other => Json::Array(vec![other.clone()]),
    }
}

fn as_strings(property: &str, value: &Json) -> Result<Vec<String>> {
    let items = match value {
        Json::String(raw) => return Ok(vec![raw.clone()]),
        Json::Array(items) => items,
        other => {
            return Err(QueryError::invalid_filter(format!(
                "{property} expects a string or a list of strings, got {other}"
            )))
        }
    };
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_owned).ok_or_else(|| {
                QueryError::invalid_filter(format!("{property} list items must be strings, got {item}"))
            })
        })
        .collect()
}

fn sort_rules(translator: &Translator<'_>, sort: &SortInput, case_default: bool) -> Result<Vec<SortRule>> {
    let registry = translator.registry();
    let direction = sort.direction;
    let case_sensitive = sort.case_sensitive.unwrap_or(case_default);
    let rule = |alias: &str, entity: EntityKind, name: &str, direction: SortDirection| -> Result<SortRule> {
        Ok(SortRule::for_field(alias, registry.resolve(entity, name)?, direction).case_sensitive(case_sensitive))
    };
    Ok(match sort.by.as_str() {
        "ORGANIZATION" => vec![
            rule("parent", EntityKind::Organization, "NAME", direction)?.coalesce_with(ROOT),
            rule("parent", EntityKind::Organization, "NAME", SortDirection::Desc)?.case_sensitive(true),
            rule(ROOT, EntityKind::Organization, "NAME", direction)?,
        ],
        "NAME" => vec![rule(ROOT, EntityKind::Organization, "NAME", direction)?.blanks_last()],
        "DOMAIN" => vec![rule("d", EntityKind::Domain, "DOMAIN", direction)?],
        "LOCATION" => vec![
            rule("l", EntityKind::Location, "COUNTRY", direction)?,
            rule("l", EntityKind::Location, "REGION", direction)?,
            rule("l", EntityKind::Location, "LOCALITY", direction)?,
        ],
        "OWNER" => vec![
            rule("owner", EntityKind::User, "FIRST_NAME", direction)?.blanks_last(),
            rule("owner", EntityKind::User, "LAST_NAME", direction)?.blanks_last(),
        ],
        "RENEWAL_LIKELIHOOD" => vec![rule(ROOT, EntityKind::Organization, "RENEWAL_LIKELIHOOD_ORDER", direction)?],
        "LAST_TOUCHPOINT" => vec![rule(ROOT, EntityKind::Organization, "LAST_TOUCHPOINT_AT", direction)?],
        _ => vec![translator.sort(ROOT, sort)?],
    })
}
