//! Two-layer ODL validation.
//!
//! *Structural*: required fields, recognized enumerations, name shape.
//! *Referential*: every cross-reference resolves with compatible types.
//!
//! The result is all-or-nothing: either the document is clean or an ordered
//! issue list comes back — no partially-validated documents. Softer checks
//! (duplicate names, identifier coverage, mapping completeness) belong to the
//! evaluation gates, not here.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::OdlError;
use crate::ir::{Cardinality, MetricType, PropertyType};
use crate::odl::{OdlDocument, OdlObject};

/// A single validation finding with a JSON-pointer-style location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn structural(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn reference(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[A-Za-z][A-Za-z0-9_]*$").expect("valid name pattern"))
}

pub fn is_valid_name(name: &str) -> bool {
    name_pattern().is_match(name)
}

/// Validate a parsed document. Structural issues short-circuit referential
/// checking — references against a malformed document are not meaningful.
pub fn validate(doc: &OdlDocument) -> Result<(), OdlError> {
    let issues = structural_issues(doc);
    if !issues.is_empty() {
        return Err(OdlError::InvalidStructure(issues));
    }
    let issues = referential_issues(doc);
    if !issues.is_empty() {
        return Err(OdlError::InvalidReference(issues));
    }
    Ok(())
}

// ── Structural layer ───────────────────────────────────────────

pub fn structural_issues(doc: &OdlDocument) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if doc.version.as_deref().map_or(true, |v| v.trim().is_empty()) {
        issues.push(ValidationIssue::structural(
            "/version",
            "missing required field 'version'",
        ));
    }
    if doc.objects.is_empty() {
        issues.push(ValidationIssue::structural(
            "/objects",
            "'objects' must contain at least one object",
        ));
    }

    for (i, obj) in doc.objects.iter().enumerate() {
        check_name(&obj.name, &format!("/objects/{i}/name"), "object", &mut issues);
        for (j, prop) in obj.properties.iter().enumerate() {
            let base = format!("/objects/{i}/properties/{j}");
            check_name(&prop.name, &format!("{base}/name"), "property", &mut issues);
            match prop.property_type.as_deref() {
                None => issues.push(ValidationIssue::structural(
                    format!("{base}/type"),
                    "missing required field 'type'",
                )),
                Some(t) if PropertyType::parse(t).is_none() => {
                    issues.push(ValidationIssue::structural(
                        format!("{base}/type"),
                        format!(
                            "unknown property type '{t}'; allowed: {}",
                            PropertyType::ALL.join(", ")
                        ),
                    ))
                }
                Some(_) => {}
            }
        }
    }

    for (i, rel) in doc.relationships.iter().enumerate() {
        let base = format!("/relationships/{i}");
        check_name(&rel.name, &format!("{base}/name"), "relationship", &mut issues);
        if rel.from.as_deref().map_or(true, str::is_empty) {
            issues.push(ValidationIssue::structural(
                format!("{base}/from"),
                "missing required field 'from'",
            ));
        }
        if rel.to.as_deref().map_or(true, str::is_empty) {
            issues.push(ValidationIssue::structural(
                format!("{base}/to"),
                "missing required field 'to'",
            ));
        }
        for (j, pair) in rel.join_keys.iter().enumerate() {
            if pair.len() != 2 {
                issues.push(ValidationIssue::structural(
                    format!("{base}/joinKeys/{j}"),
                    format!("join key pair must have exactly 2 entries, found {}", pair.len()),
                ));
            }
        }
        if let Some(card) = rel.cardinality.as_deref() {
            if Cardinality::parse(card).is_none() {
                issues.push(ValidationIssue::structural(
                    format!("{base}/cardinality"),
                    format!(
                        "unknown cardinality '{card}'; allowed: {}",
                        Cardinality::ALL.join(", ")
                    ),
                ));
            }
        }
    }

    for (i, metric) in doc.metrics.iter().enumerate() {
        let base = format!("/metrics/{i}");
        check_name(&metric.name, &format!("{base}/name"), "metric", &mut issues);
        if metric.expression.as_deref().map_or(true, |e| e.trim().is_empty()) {
            issues.push(ValidationIssue::structural(
                format!("{base}/expression"),
                "missing required field 'expression'",
            ));
        }
        if let Some(ty) = metric.metric_type.as_deref() {
            if MetricType::parse(ty).is_none() {
                issues.push(ValidationIssue::structural(
                    format!("{base}/type"),
                    format!("unknown metric type '{ty}'; allowed: {}", MetricType::ALL.join(", ")),
                ));
            }
        }
    }

    for (i, dim) in doc.dimensions.iter().enumerate() {
        let base = format!("/dimensions/{i}");
        check_name(&dim.name, &format!("{base}/name"), "dimension", &mut issues);
        match dim.source_property.as_deref() {
            None => issues.push(ValidationIssue::structural(
                format!("{base}/sourceProperty"),
                "missing required field 'sourceProperty'",
            )),
            Some(sp) if !sp.contains('.') => issues.push(ValidationIssue::structural(
                format!("{base}/sourceProperty"),
                format!("'{sp}' is not of the form 'Object.property'"),
            )),
            Some(_) => {}
        }
    }

    if let Some(tm) = &doc.target_mapping {
        if tm.database.as_deref().map_or(true, str::is_empty) {
            issues.push(ValidationIssue::structural(
                "/targetMapping/database",
                "missing required field 'database'",
            ));
        }
        if tm.schema.as_deref().map_or(true, str::is_empty) {
            issues.push(ValidationIssue::structural(
                "/targetMapping/schema",
                "missing required field 'schema'",
            ));
        }
    }

    issues
}

fn check_name(
    name: &Option<String>,
    path: &str,
    what: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    match name.as_deref() {
        None => issues.push(ValidationIssue::structural(
            path,
            format!("missing required field 'name' on {what}"),
        )),
        Some(n) if !is_valid_name(n.trim()) => issues.push(ValidationIssue::structural(
            path,
            format!("invalid {what} name '{n}': must match ^[A-Za-z][A-Za-z0-9_]*$"),
        )),
        Some(_) => {}
    }
}

// ── Referential layer ──────────────────────────────────────────

pub fn referential_issues(doc: &OdlDocument) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let object_names: Vec<&str> = doc
        .objects
        .iter()
        .filter_map(|o| o.name.as_deref())
        .collect();

    let find_object = |name: &str| -> Option<&OdlObject> {
        doc.objects.iter().find(|o| o.name.as_deref() == Some(name))
    };

    for (i, rel) in doc.relationships.iter().enumerate() {
        let base = format!("/relationships/{i}");
        let rel_name = rel.name.as_deref().unwrap_or("?");

        let from = rel.from.as_deref().unwrap_or("");
        let to = rel.to.as_deref().unwrap_or("");
        let from_obj = find_object(from);
        let to_obj = find_object(to);

        if from_obj.is_none() {
            issues.push(ValidationIssue::reference(
                format!("{base}/from"),
                format!(
                    "relationship '{rel_name}' references unknown object '{from}'; declared: {}",
                    object_names.join(", ")
                ),
            ));
        }
        if to_obj.is_none() {
            issues.push(ValidationIssue::reference(
                format!("{base}/to"),
                format!(
                    "relationship '{rel_name}' references unknown object '{to}'; declared: {}",
                    object_names.join(", ")
                ),
            ));
        }

        if let (Some(from_obj), Some(to_obj)) = (from_obj, to_obj) {
            for (j, pair) in rel.join_keys.iter().enumerate() {
                if pair.len() != 2 {
                    continue;
                }
                let from_prop = find_property(from_obj, &pair[0]);
                let to_prop = find_property(to_obj, &pair[1]);
                if from_prop.is_none() {
                    issues.push(ValidationIssue::reference(
                        format!("{base}/joinKeys/{j}/0"),
                        format!(
                            "relationship '{rel_name}' join key names unknown property '{}' on '{from}'",
                            pair[0]
                        ),
                    ));
                }
                if to_prop.is_none() {
                    issues.push(ValidationIssue::reference(
                        format!("{base}/joinKeys/{j}/1"),
                        format!(
                            "relationship '{rel_name}' join key names unknown property '{}' on '{to}'",
                            pair[1]
                        ),
                    ));
                }
                if let (Some(a), Some(b)) = (from_prop, to_prop) {
                    if !a.join_compatible(b) {
                        issues.push(ValidationIssue::reference(
                            format!("{base}/joinKeys/{j}"),
                            format!(
                                "relationship '{rel_name}' joins incompatible types {a} and {b} \
                                 ({}.{} vs {}.{})",
                                from, pair[0], to, pair[1]
                            ),
                        ));
                    }
                }
            }
        }
    }

    for (i, metric) in doc.metrics.iter().enumerate() {
        let metric_name = metric.name.as_deref().unwrap_or("?");
        for (j, grain) in metric.grain.iter().enumerate() {
            if find_object(grain).is_none() {
                issues.push(ValidationIssue::reference(
                    format!("/metrics/{i}/grain/{j}"),
                    format!("metric '{metric_name}' grain references unknown object '{grain}'"),
                ));
            }
        }
    }

    for (i, dim) in doc.dimensions.iter().enumerate() {
        let dim_name = dim.name.as_deref().unwrap_or("?");
        let Some(sp) = dim.source_property.as_deref() else {
            continue;
        };
        let Some((obj_name, prop_name)) = sp.split_once('.') else {
            continue;
        };
        match find_object(obj_name) {
            None => issues.push(ValidationIssue::reference(
                format!("/dimensions/{i}/sourceProperty"),
                format!("dimension '{dim_name}' references unknown object '{obj_name}'"),
            )),
            Some(obj) if find_property(obj, prop_name).is_none() => {
                issues.push(ValidationIssue::reference(
                    format!("/dimensions/{i}/sourceProperty"),
                    format!(
                        "dimension '{dim_name}' references unknown property '{prop_name}' on '{obj_name}'"
                    ),
                ))
            }
            Some(_) => {}
        }
    }

    if let Some(tm) = &doc.target_mapping {
        for key in tm.table_mappings.keys() {
            if find_object(key).is_none() {
                issues.push(ValidationIssue::reference(
                    format!("/targetMapping/tableMappings/{key}"),
                    format!("table mapping key '{key}' does not name a declared object"),
                ));
            }
        }
    }

    issues
}

fn find_property(obj: &OdlObject, name: &str) -> Option<PropertyType> {
    obj.properties
        .iter()
        .find(|p| p.name.as_deref() == Some(name))
        .and_then(|p| p.property_type.as_deref())
        .and_then(PropertyType::parse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odl::parse;

    fn doc(json: &str) -> OdlDocument {
        parse(json).unwrap()
    }

    #[test]
    fn test_valid_document_passes() {
        let d = doc(
            r#"{
                "version": "1.0",
                "objects": [
                    {"name": "Customer", "identifiers": ["customer_id"],
                     "properties": [
                        {"name": "customer_id", "type": "string"},
                        {"name": "email", "type": "string"}]},
                    {"name": "Order", "identifiers": ["order_id"],
                     "properties": [
                        {"name": "order_id", "type": "string"},
                        {"name": "customer_id", "type": "string"}]}
                ],
                "relationships": [
                    {"name": "placed_by", "from": "Order", "to": "Customer",
                     "joinKeys": [["customer_id", "customer_id"]],
                     "cardinality": "many_to_one"}
                ],
                "metrics": [
                    {"name": "OrderCount", "expression": "COUNT(order_id)",
                     "grain": ["Order"], "type": "count"}
                ],
                "dimensions": [
                    {"name": "CustomerEmail", "sourceProperty": "Customer.email"}
                ]
            }"#,
        );
        assert!(validate(&d).is_ok());
    }

    #[test]
    fn test_missing_version_is_structural() {
        let d = doc(r#"{"objects": [{"name": "A", "properties": [{"name": "x", "type": "string"}]}]}"#);
        match validate(&d).unwrap_err() {
            OdlError::InvalidStructure(issues) => {
                assert!(issues.iter().any(|i| i.path == "/version"));
            }
            other => panic!("expected InvalidStructure, got {other}"),
        }
    }

    #[test]
    fn test_bad_name_is_structural() {
        let d = doc(
            r#"{"version": "1.0",
                "objects": [{"name": "2Bad", "properties": [{"name": "x", "type": "string"}]}]}"#,
        );
        match validate(&d).unwrap_err() {
            OdlError::InvalidStructure(issues) => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].path, "/objects/0/name");
            }
            other => panic!("expected InvalidStructure, got {other}"),
        }
    }

    #[test]
    fn test_unknown_type_is_structural() {
        let d = doc(
            r#"{"version": "1.0",
                "objects": [{"name": "A",
                             "properties": [{"name": "x", "type": "varchar"}]}]}"#,
        );
        match validate(&d).unwrap_err() {
            OdlError::InvalidStructure(issues) => {
                assert_eq!(issues[0].path, "/objects/0/properties/0/type");
            }
            other => panic!("expected InvalidStructure, got {other}"),
        }
    }

    #[test]
    fn test_unresolved_dimension_is_referential() {
        let d = doc(
            r#"{"version": "1.0",
                "objects": [{"name": "Order",
                             "properties": [{"name": "order_id", "type": "string"}]}],
                "dimensions": [{"name": "Bad", "sourceProperty": "Order.nonexistent"}]}"#,
        );
        match validate(&d).unwrap_err() {
            OdlError::InvalidReference(issues) => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].path, "/dimensions/0/sourceProperty");
                assert!(issues[0].message.contains("nonexistent"));
            }
            other => panic!("expected InvalidReference, got {other}"),
        }
    }

    #[test]
    fn test_incompatible_join_types_are_referential() {
        let d = doc(
            r#"{"version": "1.0",
                "objects": [
                    {"name": "A", "properties": [{"name": "k", "type": "string"}]},
                    {"name": "B", "properties": [{"name": "k", "type": "integer"}]}],
                "relationships": [
                    {"name": "r", "from": "A", "to": "B", "joinKeys": [["k", "k"]]}]}"#,
        );
        match validate(&d).unwrap_err() {
            OdlError::InvalidReference(issues) => {
                assert!(issues[0].message.contains("incompatible"));
            }
            other => panic!("expected InvalidReference, got {other}"),
        }
    }

    #[test]
    fn test_decimal_number_join_is_compatible() {
        let d = doc(
            r#"{"version": "1.0",
                "objects": [
                    {"name": "A", "properties": [{"name": "k", "type": "decimal"}]},
                    {"name": "B", "properties": [{"name": "k", "type": "number"}]}],
                "relationships": [
                    {"name": "r", "from": "A", "to": "B", "joinKeys": [["k", "k"]]}]}"#,
        );
        assert!(validate(&d).is_ok());
    }

    #[test]
    fn test_unknown_grain_object_is_referential() {
        let d = doc(
            r#"{"version": "1.0",
                "objects": [{"name": "A", "properties": [{"name": "x", "type": "string"}]}],
                "metrics": [{"name": "M", "expression": "COUNT(1)", "grain": ["Missing"]}]}"#,
        );
        match validate(&d).unwrap_err() {
            OdlError::InvalidReference(issues) => {
                assert_eq!(issues[0].path, "/metrics/0/grain/0");
            }
            other => panic!("expected InvalidReference, got {other}"),
        }
    }

    #[test]
    fn test_table_mapping_key_must_be_declared() {
        let d = doc(
            r#"{"version": "1.0",
                "objects": [{"name": "A", "properties": [{"name": "x", "type": "string"}]}],
                "targetMapping": {"database": "DB", "schema": "PUBLIC",
                                  "tableMappings": {"Ghost": "ghosts"}}}"#,
        );
        match validate(&d).unwrap_err() {
            OdlError::InvalidReference(issues) => {
                assert_eq!(issues[0].path, "/targetMapping/tableMappings/Ghost");
            }
            other => panic!("expected InvalidReference, got {other}"),
        }
    }

    #[test]
    fn test_duplicate_names_pass_validation() {
        // Duplicates are an evaluation-gate concern, not a validation error.
        let d = doc(
            r#"{"version": "1.0",
                "objects": [
                    {"name": "A", "properties": [{"name": "x", "type": "string"}]},
                    {"name": "A", "properties": [{"name": "x", "type": "string"}]}]}"#,
        );
        assert!(validate(&d).is_ok());
    }
}
