//! Field metadata registry bridging API-facing attribute names to graph properties.
//!
//! Every list endpoint exposes logical attribute names (`NAME`, `OWNER_ID`, ...)
//! that have to be translated to the physical property stored on the node
//! before a filter or sort rule can be compiled. The registry is declared once,
//! at process start, from the static tables in this module; a duplicate or
//! malformed registration fails [`FieldRegistryBuilder::build`] instead of
//! surfacing as a silent mismatch at request time.
//!
//! A built [`FieldRegistry`] is never mutated again, so it can be shared
//! between request handlers (`&FieldRegistry` or `Arc<FieldRegistry>`) without
//! synchronization.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, RegistryError, Result};
use crate::expr::is_plain_identifier;

/// Exposed name of the field every entity is sorted by when no sort is supplied.
pub const DEFAULT_SORT_FIELD: &str = "UPDATED_AT";

/// Closed set of entity kinds addressable by list endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    /// Customer or prospect organization.
    Organization,
    /// Person attached to organizations.
    Contact,
    /// Tenant user (owners, assignees).
    User,
    /// Commercial contract of an organization.
    Contract,
    /// Invoice issued for a contract.
    Invoice,
    /// Sales or renewal opportunity.
    Opportunity,
    /// Email address node.
    Email,
    /// Web domain node.
    Domain,
    /// Postal location node.
    Location,
    /// Free-form tag.
    Tag,
    /// Social profile link.
    Social,
}

impl EntityKind {
    /// All kinds, in declaration order.
    pub const ALL: [EntityKind; 11] = [
        EntityKind::Organization,
        EntityKind::Contact,
        EntityKind::User,
        EntityKind::Contract,
        EntityKind::Invoice,
        EntityKind::Opportunity,
        EntityKind::Email,
        EntityKind::Domain,
        EntityKind::Location,
        EntityKind::Tag,
        EntityKind::Social,
    ];

    /// Graph label carried by nodes of this kind.
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Organization => "Organization",
            EntityKind::Contact => "Contact",
            EntityKind::User => "User",
            EntityKind::Contract => "Contract",
            EntityKind::Invoice => "Invoice",
            EntityKind::Opportunity => "Opportunity",
            EntityKind::Email => "Email",
            EntityKind::Domain => "Domain",
            EntityKind::Location => "Location",
            EntityKind::Tag => "Tag",
            EntityKind::Social => "Social",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Storage type of a property, used to coerce request values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// UTF-8 text.
    String,
    /// Boolean flag.
    Bool,
    /// Signed integer.
    Int,
    /// Floating point number.
    Float,
    /// Timestamp stored as a datetime.
    DateTime,
}

/// Resolved metadata for one exposed field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldMeta {
    /// Physical property name on the node.
    pub property: String,
    /// Whether the property may be compared on lower-cased operands.
    pub case_sensitivity_capable: bool,
    /// Storage type of the property.
    pub kind: ValueKind,
}

/// Read-only mapping of `(entity kind, exposed name)` to [`FieldMeta`].
#[derive(Debug, Default)]
pub struct FieldRegistry {
    entities: HashMap<EntityKind, HashMap<String, FieldMeta>>,
}

impl FieldRegistry {
    /// Starts an empty builder.
    pub fn builder() -> FieldRegistryBuilder {
        FieldRegistryBuilder::default()
    }

    /// Builds the production table covering every [`EntityKind`].
    pub fn standard() -> std::result::Result<Self, RegistryError> {
        let mut builder = FieldRegistry::builder();
        for (entity, specs) in STANDARD_FIELDS {
            builder = builder.entity(*entity, |fields| {
                for spec in specs.iter() {
                    fields.push(spec.exposed, spec.property, spec.kind, spec.case_capable);
                }
            });
        }
        builder.build()
    }

    /// Resolves an exposed name to its property metadata.
    pub fn resolve(&self, entity: EntityKind, exposed: &str) -> Result<&FieldMeta> {
        self.entities
            .get(&entity)
            .and_then(|fields| fields.get(exposed))
            .ok_or_else(|| QueryError::field_not_found(entity, exposed))
    }

    /// Returns true when the exposed name is registered for the entity.
    pub fn contains(&self, entity: EntityKind, exposed: &str) -> bool {
        self.entities
            .get(&entity)
            .is_some_and(|fields| fields.contains_key(exposed))
    }

    /// Iterates the exposed names registered for an entity, sorted by name.
    pub fn exposed_names(&self, entity: EntityKind) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .entities
            .get(&entity)
            .map(|fields| fields.keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }
}

/// Collects field declarations for a single entity kind.
pub struct EntityFields {
    entity: EntityKind,
    fields: Vec<(String, FieldMeta)>,
}

impl EntityFields {
    /// Declares a field with explicit type and case capability.
    pub fn push(
        &mut self,
        exposed: impl Into<String>,
        property: impl Into<String>,
        kind: ValueKind,
        case_sensitivity_capable: bool,
    ) -> &mut Self {
        self.fields.push((
            exposed.into(),
            FieldMeta {
                property: property.into(),
                case_sensitivity_capable,
                kind,
            },
        ));
        self
    }

    /// Declares a string field that supports case-insensitive comparison.
    pub fn text(&mut self, exposed: impl Into<String>, property: impl Into<String>) -> &mut Self {
        self.push(exposed, property, ValueKind::String, true)
    }

    /// Declares a field compared verbatim.
    pub fn plain(
        &mut self,
        exposed: impl Into<String>,
        property: impl Into<String>,
        kind: ValueKind,
    ) -> &mut Self {
        self.push(exposed, property, kind, false)
    }
}

/// Builder validating registrations before the registry is frozen.
#[derive(Default)]
pub struct FieldRegistryBuilder {
    declared: Vec<EntityFields>,
}

impl FieldRegistryBuilder {
    /// Declares the fields of one entity kind. May be called repeatedly for the same kind.
    pub fn entity<F>(mut self, entity: EntityKind, declare: F) -> Self
    where
        F: FnOnce(&mut EntityFields),
    {
        let mut fields = EntityFields {
            entity,
            fields: Vec::new(),
        };
        declare(&mut fields);
        self.declared.push(fields);
        self
    }

    /// Validates every declaration and freezes the registry.
    pub fn build(self) -> std::result::Result<FieldRegistry, RegistryError> {
        let mut entities: HashMap<EntityKind, HashMap<String, FieldMeta>> = HashMap::new();
        for declared in self.declared {
            let entity = declared.entity;
            let table = entities.entry(entity).or_default();
            for (exposed, meta) in declared.fields {
                if exposed.trim().is_empty() {
                    return Err(RegistryError::EmptyExposedName { entity });
                }
                if !is_plain_identifier(&meta.property) {
                    return Err(RegistryError::InvalidProperty {
                        entity,
                        name: exposed,
                        property: meta.property,
                    });
                }
                if table.contains_key(&exposed) {
                    return Err(RegistryError::DuplicateField {
                        entity,
                        name: exposed,
                    });
                }
                table.insert(exposed, meta);
            }
        }
        Ok(FieldRegistry { entities })
    }
}

struct FieldSpec {
    exposed: &'static str,
    property: &'static str,
    kind: ValueKind,
    case_capable: bool,
}

const fn text(exposed: &'static str, property: &'static str) -> FieldSpec {
    FieldSpec {
        exposed,
        property,
        kind: ValueKind::String,
        case_capable: true,
    }
}

const fn plain(exposed: &'static str, property: &'static str, kind: ValueKind) -> FieldSpec {
    FieldSpec {
        exposed,
        property,
        kind,
        case_capable: false,
    }
}

use ValueKind::{Bool, DateTime, Float, Int, String as Str};

const ORGANIZATION_FIELDS: &[FieldSpec] = &[
    plain("ID", "id", Str),
    plain("TENANT", "tenant", Str),
    text("NAME", "name"),
    text("WEBSITE", "website"),
    text("CUSTOMER_OS_ID", "customerOsId"),
    text("REFERENCE_ID", "referenceId"),
    text("INDUSTRY", "industry"),
    text("DESCRIPTION", "description"),
    plain("STAGE", "stage", Str),
    plain("IS_CUSTOMER", "isCustomer", Bool),
    plain("IS_PUBLIC", "isPublic", Bool),
    plain("HIDE", "hide", Bool),
    plain("EMPLOYEES", "employees", Int),
    plain("YEAR_FOUNDED", "yearFounded", Int),
    plain("RENEWAL_LIKELIHOOD", "derivedRenewalLikelihood", Str),
    plain("RENEWAL_LIKELIHOOD_ORDER", "derivedRenewalLikelihoodOrder", Int),
    plain("RENEWAL_CYCLE_NEXT", "billingDetailsRenewalCycleNext", DateTime),
    plain("RENEWAL_DATE", "derivedNextRenewalAt", DateTime),
    plain("FORECAST_ARR", "renewalForecastArr", Float),
    plain("LAST_TOUCHPOINT_AT", "lastTouchpointAt", DateTime),
    plain("LAST_TOUCHPOINT_TYPE", "lastTouchpointType", Str),
    plain("CREATED_AT", "createdAt", DateTime),
    plain("UPDATED_AT", "updatedAt", DateTime),
];

const CONTACT_FIELDS: &[FieldSpec] = &[
    plain("ID", "id", Str),
    plain("TENANT", "tenant", Str),
    text("NAME", "name"),
    text("FIRST_NAME", "firstName"),
    text("LAST_NAME", "lastName"),
    text("PREFIX", "prefix"),
    text("DESCRIPTION", "description"),
    plain("TIMEZONE", "timezone", Str),
    plain("CREATED_AT", "createdAt", DateTime),
    plain("UPDATED_AT", "updatedAt", DateTime),
];

const USER_FIELDS: &[FieldSpec] = &[
    plain("ID", "id", Str),
    plain("TENANT", "tenant", Str),
    text("FIRST_NAME", "firstName"),
    text("LAST_NAME", "lastName"),
    plain("CREATED_AT", "createdAt", DateTime),
    plain("UPDATED_AT", "updatedAt", DateTime),
];

const CONTRACT_FIELDS: &[FieldSpec] = &[
    plain("ID", "id", Str),
    plain("TENANT", "tenant", Str),
    text("NAME", "name"),
    plain("STATUS", "status", Str),
    plain("BILLING_CYCLE", "billingCycle", Str),
    plain("SERVICE_STARTED_AT", "serviceStartedAt", DateTime),
    plain("ENDED_AT", "endedAt", DateTime),
    plain("CREATED_AT", "createdAt", DateTime),
    plain("UPDATED_AT", "updatedAt", DateTime),
];

const INVOICE_FIELDS: &[FieldSpec] = &[
    plain("ID", "id", Str),
    plain("TENANT", "tenant", Str),
    text("NUMBER", "number"),
    plain("STATUS", "status", Str),
    plain("DRY_RUN", "dryRun", Bool),
    plain("AMOUNT", "totalAmount", Float),
    plain("DUE_DATE", "dueDate", DateTime),
    plain("CREATED_AT", "createdAt", DateTime),
    plain("UPDATED_AT", "updatedAt", DateTime),
];

const OPPORTUNITY_FIELDS: &[FieldSpec] = &[
    plain("ID", "id", Str),
    plain("TENANT", "tenant", Str),
    text("NAME", "name"),
    plain("INTERNAL_TYPE", "internalType", Str),
    plain("INTERNAL_STAGE", "internalStage", Str),
    plain("AMOUNT", "amount", Float),
    plain("MAX_AMOUNT", "maxAmount", Float),
    plain("RENEWAL_LIKELIHOOD", "renewalLikelihood", Str),
    plain("CREATED_AT", "createdAt", DateTime),
    plain("UPDATED_AT", "updatedAt", DateTime),
];

const EMAIL_FIELDS: &[FieldSpec] = &[
    plain("ID", "id", Str),
    text("EMAIL", "email"),
    text("RAW_EMAIL", "rawEmail"),
    plain("UPDATED_AT", "updatedAt", DateTime),
];

const DOMAIN_FIELDS: &[FieldSpec] = &[
    text("DOMAIN", "domain"),
    plain("UPDATED_AT", "updatedAt", DateTime),
];

const LOCATION_FIELDS: &[FieldSpec] = &[
    plain("ID", "id", Str),
    text("COUNTRY", "country"),
    plain("COUNTRY_A2", "countryCodeA2", Str),
    text("REGION", "region"),
    text("LOCALITY", "locality"),
    plain("UPDATED_AT", "updatedAt", DateTime),
];

const TAG_FIELDS: &[FieldSpec] = &[
    plain("ID", "id", Str),
    text("NAME", "name"),
    plain("UPDATED_AT", "updatedAt", DateTime),
];

const SOCIAL_FIELDS: &[FieldSpec] = &[
    plain("ID", "id", Str),
    text("URL", "url"),
    plain("FOLLOWERS_COUNT", "followersCount", Int),
    plain("UPDATED_AT", "updatedAt", DateTime),
];

static STANDARD_FIELDS: &[(EntityKind, &[FieldSpec])] = &[
    (EntityKind::Organization, ORGANIZATION_FIELDS),
    (EntityKind::Contact, CONTACT_FIELDS),
    (EntityKind::User, USER_FIELDS),
    (EntityKind::Contract, CONTRACT_FIELDS),
    (EntityKind::Invoice, INVOICE_FIELDS),
    (EntityKind::Opportunity, OPPORTUNITY_FIELDS),
    (EntityKind::Email, EMAIL_FIELDS),
    (EntityKind::Domain, DOMAIN_FIELDS),
    (EntityKind::Location, LOCATION_FIELDS),
    (EntityKind::Tag, TAG_FIELDS),
    (EntityKind::Social, SOCIAL_FIELDS),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_builds_and_covers_every_kind() {
        let registry = FieldRegistry::standard().expect("standard registry");
        for kind in EntityKind::ALL {
            assert!(
                !registry.exposed_names(kind).is_empty(),
                "{kind} has no registered fields"
            );
        }
    }

    #[test]
    fn every_listable_kind_has_a_default_sort_field() {
        let registry = FieldRegistry::standard().expect("standard registry");
        for kind in EntityKind::ALL {
            registry
                .resolve(kind, DEFAULT_SORT_FIELD)
                .unwrap_or_else(|err| panic!("{kind}: {err}"));
        }
    }

    #[test]
    fn resolve_returns_property_and_capability() {
        let registry = FieldRegistry::standard().expect("standard registry");
        let name = registry
            .resolve(EntityKind::Organization, "NAME")
            .expect("NAME registered");
        assert_eq!(name.property, "name");
        assert!(name.case_sensitivity_capable);

        let customer = registry
            .resolve(EntityKind::Organization, "IS_CUSTOMER")
            .expect("IS_CUSTOMER registered");
        assert_eq!(customer.property, "isCustomer");
        assert!(!customer.case_sensitivity_capable);
        assert_eq!(customer.kind, ValueKind::Bool);
    }

    #[test]
    fn unknown_names_fail_with_field_not_found() {
        let registry = FieldRegistry::standard().expect("standard registry");
        let err = registry
            .resolve(EntityKind::Contact, "WEBSITE")
            .expect_err("contacts have no website");
        assert!(matches!(
            err,
            QueryError::FieldNotFound { entity: EntityKind::Contact, ref name } if name == "WEBSITE"
        ));
    }

    #[test]
    fn duplicate_registration_fails_at_build_time() {
        let err = FieldRegistry::builder()
            .entity(EntityKind::Tag, |fields| {
                fields.text("NAME", "name");
            })
            .entity(EntityKind::Tag, |fields| {
                fields.text("NAME", "label");
            })
            .build()
            .expect_err("duplicate must fail");
        assert_eq!(
            err,
            RegistryError::DuplicateField {
                entity: EntityKind::Tag,
                name: "NAME".into()
            }
        );
    }

    #[test]
    fn malformed_property_fails_at_build_time() {
        let err = FieldRegistry::builder()
            .entity(EntityKind::Domain, |fields| {
                fields.plain("DOMAIN", "domain name", ValueKind::String);
            })
            .build()
            .expect_err("property with a space must fail");
        assert!(matches!(err, RegistryError::InvalidProperty { .. }));
    }
}
