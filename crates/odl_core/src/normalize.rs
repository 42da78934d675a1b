//! Normalization: validated ODL document → canonical IR → canonical bytes.
//!
//! Ordering rules:
//!   - objects, properties, relationships, metrics, dimensions sorted by name
//!     (lexicographic, case-sensitive);
//!   - map keys sorted (BTreeMap);
//!   - joinKeys outer list sorted by (from, to); inner pair order preserved;
//!   - metric grain sorted (it is a set of object names);
//!   - identifiers keep author order (primary-key order is semantic).
//! Defaults are made explicit (`nullable: true`, `required: false`,
//! cardinality `many_to_one`, metric type `custom`, dimension type
//! `categorical`); strings are trimmed of surrounding whitespace.
//!
//! The canonical serialization is two-space-indented JSON with stable key
//! order, UTF-8, LF line endings and a single trailing newline. It parses
//! back as an ODL document, so normalize ∘ serialize ∘ parse ∘ normalize is
//! the identity on bytes.

use crate::error::{OdlError, Result};
use crate::hash;
use crate::ir::{
    Cardinality, DimensionIr, JoinKey, MetricIr, MetricType, ObjectIr, ObjectMappingIr,
    OntologyIr, PropertyIr, PropertyType, RelationshipIr, TargetMappingIr,
};
use crate::odl::{self, OdlDocument};
use crate::validate;

/// A fully-processed ontology payload ready for storage.
#[derive(Debug, Clone)]
pub struct NormalizedOntology {
    pub ir: OntologyIr,
    /// Canonical serialization; this is the stored payload.
    pub canonical: String,
    /// Hex SHA-256 of the canonical bytes (domain-prefixed).
    pub content_hash: String,
}

/// Parse, validate, and normalize an ODL JSON string end to end.
pub fn process(json: &str) -> Result<NormalizedOntology> {
    let doc = odl::parse(json)?;
    validate::validate(&doc)?;
    let ir = normalize(&doc);
    let canonical = canonical_json(&ir)?;
    let content_hash = hash::content_hash(&canonical);
    Ok(NormalizedOntology {
        ir,
        canonical,
        content_hash,
    })
}

/// Normalize a validated document into the typed IR.
pub fn normalize(doc: &OdlDocument) -> OntologyIr {
    let mut objects: Vec<ObjectIr> = doc
        .objects
        .iter()
        .map(|obj| {
            let mut properties: Vec<PropertyIr> = obj
                .properties
                .iter()
                .map(|p| PropertyIr {
                    name: trim(p.name.as_deref()),
                    property_type: p
                        .property_type
                        .as_deref()
                        .and_then(PropertyType::parse)
                        .unwrap_or(PropertyType::String),
                    description: trim_opt(p.description.as_deref()),
                    nullable: p.nullable.unwrap_or(true),
                    required: p.required.unwrap_or(false),
                })
                .collect();
            properties.sort_by(|a, b| a.name.cmp(&b.name));

            let mapping = obj.mapping.as_ref().map(|m| ObjectMappingIr {
                table: trim_opt(m.table.as_deref()),
                schema: trim_opt(m.schema.as_deref()),
                database: trim_opt(m.database.as_deref()),
            });

            ObjectIr {
                name: trim(obj.name.as_deref()),
                description: trim_opt(obj.description.as_deref()),
                identifiers: obj.identifiers.iter().map(|i| i.trim().to_string()).collect(),
                properties,
                mapping: mapping.filter(|m| !m.is_empty()),
            }
        })
        .collect();
    objects.sort_by(|a, b| a.name.cmp(&b.name));

    let mut relationships: Vec<RelationshipIr> = doc
        .relationships
        .iter()
        .map(|rel| {
            let mut join_keys: Vec<JoinKey> = rel
                .join_keys
                .iter()
                .filter(|pair| pair.len() == 2)
                .map(|pair| JoinKey(pair[0].trim().to_string(), pair[1].trim().to_string()))
                .collect();
            join_keys.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

            RelationshipIr {
                name: trim(rel.name.as_deref()),
                from: trim(rel.from.as_deref()),
                to: trim(rel.to.as_deref()),
                join_keys,
                cardinality: rel
                    .cardinality
                    .as_deref()
                    .and_then(Cardinality::parse)
                    .unwrap_or(Cardinality::ManyToOne),
                description: trim_opt(rel.description.as_deref()),
            }
        })
        .collect();
    relationships.sort_by(|a, b| a.name.cmp(&b.name));

    let mut metrics: Vec<MetricIr> = doc
        .metrics
        .iter()
        .map(|m| {
            let mut grain: Vec<String> = m.grain.iter().map(|g| g.trim().to_string()).collect();
            grain.sort();
            MetricIr {
                name: trim(m.name.as_deref()),
                expression: trim(m.expression.as_deref()),
                grain,
                metric_type: m
                    .metric_type
                    .as_deref()
                    .and_then(MetricType::parse)
                    .unwrap_or(MetricType::Custom),
                format: trim_opt(m.format.as_deref()),
                description: trim_opt(m.description.as_deref()),
            }
        })
        .collect();
    metrics.sort_by(|a, b| a.name.cmp(&b.name));

    let mut dimensions: Vec<DimensionIr> = doc
        .dimensions
        .iter()
        .map(|d| DimensionIr {
            name: trim(d.name.as_deref()),
            source_property: trim(d.source_property.as_deref()),
            dimension_type: d
                .dimension_type
                .as_deref()
                .map(|t| t.trim().to_string())
                .unwrap_or_else(|| "categorical".to_string()),
            description: trim_opt(d.description.as_deref()),
        })
        .collect();
    dimensions.sort_by(|a, b| a.name.cmp(&b.name));

    let target_mapping = doc.target_mapping.as_ref().map(|tm| TargetMappingIr {
        database: trim(tm.database.as_deref()),
        schema: trim(tm.schema.as_deref()),
        warehouse: trim_opt(tm.warehouse.as_deref()),
        table_mappings: tm
            .table_mappings
            .iter()
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect(),
    });

    OntologyIr {
        version: trim(doc.version.as_deref()),
        name: trim_opt(doc.name.as_deref()),
        description: trim_opt(doc.description.as_deref()),
        objects,
        relationships,
        metrics,
        dimensions,
        target_mapping,
    }
}

/// Serialize the IR into its canonical byte form.
pub fn canonical_json(ir: &OntologyIr) -> Result<String> {
    let mut out = serde_json::to_string_pretty(ir)
        .map_err(|e| OdlError::Internal(anyhow::anyhow!("canonical serialization failed: {e}")))?;
    out.push('\n');
    Ok(out)
}

fn trim(s: Option<&str>) -> String {
    s.unwrap_or_default().trim().to_string()
}

fn trim_opt(s: Option<&str>) -> Option<String> {
    s.map(|v| v.trim().to_string())
}
