//! Typed intermediate representation of an ontology.
//!
//! The IR is what every downstream stage (diff, gates, compiler, drift)
//! consumes. It serializes back to ODL-shaped JSON, so the canonical form
//! emitted by the normalizer is itself a valid ODL document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Property types ─────────────────────────────────────────────

/// Allowed ODL property types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Number,
    Integer,
    Decimal,
    Boolean,
    Date,
    Timestamp,
    Time,
    Array,
    Object,
}

impl PropertyType {
    pub const ALL: &'static [&'static str] = &[
        "string",
        "number",
        "integer",
        "decimal",
        "boolean",
        "date",
        "timestamp",
        "time",
        "array",
        "object",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
            Self::Time => "time",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "decimal" => Some(Self::Decimal),
            "boolean" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            "timestamp" => Some(Self::Timestamp),
            "time" => Some(Self::Time),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    /// Join-key compatibility: exact match, or decimal↔number.
    pub fn join_compatible(self, other: Self) -> bool {
        if self == other {
            return true;
        }
        matches!(
            (self, other),
            (Self::Decimal, Self::Number) | (Self::Number, Self::Decimal)
        )
    }

    /// Safe widening for type changes: integer→decimal→number, date→timestamp.
    pub fn widens_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Integer, Self::Decimal)
                | (Self::Integer, Self::Number)
                | (Self::Decimal, Self::Number)
                | (Self::Date, Self::Timestamp)
        )
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Cardinality ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Cardinality {
    pub const ALL: &'static [&'static str] =
        &["one_to_one", "one_to_many", "many_to_one", "many_to_many"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneToOne => "one_to_one",
            Self::OneToMany => "one_to_many",
            Self::ManyToOne => "many_to_one",
            Self::ManyToMany => "many_to_many",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "one_to_one" => Some(Self::OneToOne),
            "one_to_many" => Some(Self::OneToMany),
            "many_to_one" => Some(Self::ManyToOne),
            "many_to_many" => Some(Self::ManyToMany),
            _ => None,
        }
    }

    /// Strictness ordering: many_to_many < many_to_one/one_to_many < one_to_one.
    /// Moving to a higher value tightens the relationship.
    pub fn strictness(&self) -> u8 {
        match self {
            Self::ManyToMany => 0,
            Self::ManyToOne | Self::OneToMany => 1,
            Self::OneToOne => 2,
        }
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Metric types ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Sum,
    Count,
    Average,
    Min,
    Max,
    DistinctCount,
    Custom,
}

impl MetricType {
    pub const ALL: &'static [&'static str] = &[
        "sum",
        "count",
        "average",
        "min",
        "max",
        "distinct_count",
        "custom",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Average => "average",
            Self::Min => "min",
            Self::Max => "max",
            Self::DistinctCount => "distinct_count",
            Self::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sum" => Some(Self::Sum),
            "count" => Some(Self::Count),
            "average" => Some(Self::Average),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "distinct_count" => Some(Self::DistinctCount),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    /// Aggregation hint surfaced to the target system.
    pub fn aggregation_hint(&self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Count => "COUNT",
            Self::Average => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::DistinctCount => "COUNT_DISTINCT",
            Self::Custom => "CUSTOM",
        }
    }
}

// ── IR nodes ───────────────────────────────────────────────────

/// A single join-key pair. Inner order is semantic (from-property,
/// to-property) and preserved through normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinKey(pub String, pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyIr {
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nullable: bool,
    pub required: bool,
}

/// Per-object warehouse mapping overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMappingIr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl ObjectMappingIr {
    pub fn is_empty(&self) -> bool {
        self.table.is_none() && self.schema.is_none() && self.database.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectIr {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub identifiers: Vec<String>,
    pub properties: Vec<PropertyIr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<ObjectMappingIr>,
}

impl ObjectIr {
    pub fn property(&self, name: &str) -> Option<&PropertyIr> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipIr {
    pub name: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "joinKeys")]
    pub join_keys: Vec<JoinKey>,
    pub cardinality: Cardinality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricIr {
    pub name: String,
    pub expression: String,
    pub grain: Vec<String>,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionIr {
    pub name: String,
    /// Always of the form `Object.property`; validated before IR construction.
    #[serde(rename = "sourceProperty")]
    pub source_property: String,
    #[serde(rename = "type")]
    pub dimension_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DimensionIr {
    /// Split `Object.property` into its two halves.
    pub fn source_parts(&self) -> (&str, &str) {
        match self.source_property.split_once('.') {
            Some((obj, prop)) => (obj, prop),
            None => (self.source_property.as_str(), ""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMappingIr {
    pub database: String,
    pub schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    #[serde(rename = "tableMappings")]
    pub table_mappings: BTreeMap<String, String>,
}

/// The full normalized ontology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyIr {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub objects: Vec<ObjectIr>,
    pub relationships: Vec<RelationshipIr>,
    pub metrics: Vec<MetricIr>,
    pub dimensions: Vec<DimensionIr>,
    #[serde(
        rename = "targetMapping",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub target_mapping: Option<TargetMappingIr>,
}

impl OntologyIr {
    pub fn object(&self, name: &str) -> Option<&ObjectIr> {
        self.objects.iter().find(|o| o.name == name)
    }

    /// Resolve the physical table for an object: per-object mapping, then
    /// the global tableMappings entry, then snake_case of the object name.
    pub fn table_for(&self, object: &ObjectIr) -> String {
        if let Some(table) = object.mapping.as_ref().and_then(|m| m.table.clone()) {
            return table;
        }
        if let Some(tm) = self.target_mapping.as_ref() {
            if let Some(table) = tm.table_mappings.get(&object.name) {
                return table.clone();
            }
        }
        snake_case(&object.name)
    }

    /// Resolve (database, schema) for an object with global fallback.
    pub fn location_for(&self, object: &ObjectIr) -> (Option<String>, Option<String>) {
        let mapping = object.mapping.as_ref();
        let database = mapping
            .and_then(|m| m.database.clone())
            .or_else(|| self.target_mapping.as_ref().map(|t| t.database.clone()));
        let schema = mapping
            .and_then(|m| m.schema.clone())
            .or_else(|| self.target_mapping.as_ref().map(|t| t.schema.clone()));
        (database, schema)
    }
}

/// CamelCase / mixedCase → snake_case.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else {
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
            out.push(ch);
        }
    }
    out
}
