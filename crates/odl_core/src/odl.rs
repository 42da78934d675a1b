//! Raw ODL document types and JSON parsing.
//!
//! This is the only dynamic→static boundary in the engine: enumerations stay
//! as strings here so the validator can report *where* an unknown value sits
//! instead of surfacing a serde error. The normalizer converts a validated
//! document into the typed IR.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OdlError;
use crate::validate::ValidationIssue;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OdlDocument {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub objects: Vec<OdlObject>,
    #[serde(default)]
    pub relationships: Vec<OdlRelationship>,
    #[serde(default)]
    pub metrics: Vec<OdlMetric>,
    #[serde(default)]
    pub dimensions: Vec<OdlDimension>,
    #[serde(rename = "targetMapping", default)]
    pub target_mapping: Option<OdlTargetMapping>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OdlObject {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub identifiers: Vec<String>,
    #[serde(default)]
    pub properties: Vec<OdlProperty>,
    #[serde(default)]
    pub mapping: Option<OdlObjectMapping>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OdlProperty {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub nullable: Option<bool>,
    #[serde(default)]
    pub required: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OdlObjectMapping {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OdlRelationship {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    /// Pairs `[from_property, to_property]`; kept raw so malformed pairs can
    /// be reported with their index.
    #[serde(rename = "joinKeys", default)]
    pub join_keys: Vec<Vec<String>>,
    #[serde(default)]
    pub cardinality: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OdlMetric {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub grain: Vec<String>,
    #[serde(rename = "type", default)]
    pub metric_type: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OdlDimension {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "sourceProperty", default)]
    pub source_property: Option<String>,
    #[serde(rename = "type", default)]
    pub dimension_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OdlTargetMapping {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub warehouse: Option<String>,
    #[serde(rename = "tableMappings", default)]
    pub table_mappings: BTreeMap<String, String>,
}

/// Parse an ODL document from a JSON string.
pub fn parse(json: &str) -> Result<OdlDocument, OdlError> {
    let value: Value = serde_json::from_str(json).map_err(|e| {
        OdlError::InvalidStructure(vec![ValidationIssue::structural(
            "",
            format!("document is not valid JSON: {e}"),
        )])
    })?;
    parse_value(value)
}

/// Parse an ODL document from an already-decoded JSON value.
pub fn parse_value(value: Value) -> Result<OdlDocument, OdlError> {
    if !value.is_object() {
        return Err(OdlError::InvalidStructure(vec![ValidationIssue::structural(
            "",
            "document root must be a JSON object",
        )]));
    }
    serde_json::from_value(value).map_err(|e| {
        OdlError::InvalidStructure(vec![ValidationIssue::structural(
            "",
            format!("document does not match the ODL shape: {e}"),
        )])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let doc = parse(
            r#"{
                "version": "1.0",
                "objects": [
                    {"name": "Customer", "identifiers": ["id"],
                     "properties": [{"name": "id", "type": "string"}]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.version.as_deref(), Some("1.0"));
        assert_eq!(doc.objects.len(), 1);
        assert_eq!(doc.objects[0].properties[0].property_type.as_deref(), Some("string"));
        assert!(doc.relationships.is_empty());
    }

    #[test]
    fn test_parse_rejects_non_object_root() {
        let err = parse("[1, 2, 3]").unwrap_err();
        assert_eq!(err.code(), "INVALID_STRUCTURE");
    }

    #[test]
    fn test_parse_rejects_bad_json() {
        let err = parse("{not json").unwrap_err();
        assert_eq!(err.code(), "INVALID_STRUCTURE");
    }

    #[test]
    fn test_parse_keeps_unknown_enums_as_strings() {
        let doc = parse(
            r#"{
                "version": "1.0",
                "objects": [{"name": "A", "identifiers": ["id"],
                             "properties": [{"name": "id", "type": "varchar"}]}],
                "relationships": [{"name": "r", "from": "A", "to": "A",
                                   "joinKeys": [["id", "id"]],
                                   "cardinality": "one_to_some"}]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.objects[0].properties[0].property_type.as_deref(), Some("varchar"));
        assert_eq!(doc.relationships[0].cardinality.as_deref(), Some("one_to_some"));
    }
}
