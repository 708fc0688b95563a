//! Canonical parameter value representation shared by the filter compiler,
//! the query plan parameter map and the in-memory engine.
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Parameter map attached to a compiled query plan.
///
/// Ordered so rendering and logging are reproducible across calls.
pub type Params = BTreeMap<String, Value>;

/// Typed value tagged with explicit type information so the wire format remains
/// unambiguous when plans are exported as JSON.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// Null literal.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// 64-bit floating point literal.
    Float(f64),
    /// UTF-8 string literal.
    String(String),
    /// Nanoseconds since Unix epoch in UTC.
    #[serde(serialize_with = "rfc3339_nanos::serialize")]
    DateTime(i128),
    /// Homogeneous or mixed list, used by `IN` comparisons.
    List(Vec<Value>),
}

fn format_rfc3339(nanos: i128) -> Option<String> {
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
}

mod rfc3339_nanos {
    use serde::Serializer;

    /// Writes an RFC 3339 timestamp, or the raw nanosecond count when it falls
    /// outside the representable calendar range.
    pub fn serialize<S: Serializer>(nanos: &i128, serializer: S) -> Result<S::Ok, S::Error> {
        match super::format_rfc3339(*nanos) {
            Some(formatted) => serializer.serialize_str(&formatted),
            None => serializer.serialize_str(&nanos.to_string()),
        }
    }
}

impl Value {
    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::List(_) => "list",
        }
    }

    /// Lower-cases string payloads, including strings nested in lists.
    pub fn to_lowercase(&self) -> Value {
        match self {
            Value::String(s) => Value::String(s.to_lowercase()),
            Value::List(items) => Value::List(items.iter().map(Value::to_lowercase).collect()),
            other => other.clone(),
        }
    }

    /// Parses an RFC 3339 timestamp into a [`Value::DateTime`].
    pub fn parse_datetime(raw: &str) -> Option<Value> {
        OffsetDateTime::parse(raw, &Rfc3339)
            .ok()
            .map(|dt| Value::DateTime(dt.unix_timestamp_nanos()))
    }

    /// Converts an untagged JSON document (fixtures, API payloads) into a value.
    ///
    /// Objects are not representable as parameters and map to `None`.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        Some(match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64()?),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::List(
                items
                    .iter()
                    .map(Value::from_json)
                    .collect::<Option<Vec<_>>>()?,
            ),
            serde_json::Value::Object(_) => return None,
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::DateTime(nanos) => match format_rfc3339(*nanos) {
                Some(formatted) => write!(f, "datetime({formatted})"),
                None => write!(f, "datetime({nanos})"),
            },
            Value::List(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(values: Vec<V>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(value: Option<V>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
