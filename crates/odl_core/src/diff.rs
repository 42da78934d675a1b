//! Structural diff between two normalized ontology versions.
//!
//! Output is a deterministic, ordered list of `(path, kind, severity)`
//! change records plus summary counts. Determinism matters: diff records are
//! persisted keyed by version pair and must serialize to identical bytes on
//! every run.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ir::{ObjectIr, OntologyIr};

/// Minimum property-name overlap for the object-rename heuristic.
const RENAME_OVERLAP_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Breaking,
    NonBreaking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "object.added")]
    ObjectAdded,
    #[serde(rename = "object.removed")]
    ObjectRemoved,
    #[serde(rename = "object.renamed")]
    ObjectRenamed,
    #[serde(rename = "property.added")]
    PropertyAdded,
    #[serde(rename = "property.removed")]
    PropertyRemoved,
    #[serde(rename = "property.type_changed")]
    PropertyTypeChanged,
    #[serde(rename = "property.nullable_changed")]
    PropertyNullableChanged,
    #[serde(rename = "property.required_changed")]
    PropertyRequiredChanged,
    #[serde(rename = "identifier.changed")]
    IdentifierChanged,
    #[serde(rename = "relationship.added")]
    RelationshipAdded,
    #[serde(rename = "relationship.removed")]
    RelationshipRemoved,
    #[serde(rename = "relationship.joinkeys_changed")]
    RelationshipJoinKeysChanged,
    #[serde(rename = "relationship.cardinality_changed")]
    RelationshipCardinalityChanged,
    #[serde(rename = "metric.added")]
    MetricAdded,
    #[serde(rename = "metric.removed")]
    MetricRemoved,
    #[serde(rename = "metric.expression_changed")]
    MetricExpressionChanged,
    #[serde(rename = "metric.grain_changed")]
    MetricGrainChanged,
    #[serde(rename = "dimension.added")]
    DimensionAdded,
    #[serde(rename = "dimension.removed")]
    DimensionRemoved,
    #[serde(rename = "dimension.source_changed")]
    DimensionSourceChanged,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ObjectAdded => "object.added",
            Self::ObjectRemoved => "object.removed",
            Self::ObjectRenamed => "object.renamed",
            Self::PropertyAdded => "property.added",
            Self::PropertyRemoved => "property.removed",
            Self::PropertyTypeChanged => "property.type_changed",
            Self::PropertyNullableChanged => "property.nullable_changed",
            Self::PropertyRequiredChanged => "property.required_changed",
            Self::IdentifierChanged => "identifier.changed",
            Self::RelationshipAdded => "relationship.added",
            Self::RelationshipRemoved => "relationship.removed",
            Self::RelationshipJoinKeysChanged => "relationship.joinkeys_changed",
            Self::RelationshipCardinalityChanged => "relationship.cardinality_changed",
            Self::MetricAdded => "metric.added",
            Self::MetricRemoved => "metric.removed",
            Self::MetricExpressionChanged => "metric.expression_changed",
            Self::MetricGrainChanged => "metric.grain_changed",
            Self::DimensionAdded => "dimension.added",
            Self::DimensionRemoved => "dimension.removed",
            Self::DimensionSourceChanged => "dimension.source_changed",
        }
    }
}

/// A single classified change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    pub kind: ChangeKind,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Change {
    fn breaking(path: impl Into<String>, kind: ChangeKind, detail: Option<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            severity: Severity::Breaking,
            detail,
        }
    }

    fn non_breaking(path: impl Into<String>, kind: ChangeKind, detail: Option<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            severity: Severity::NonBreaking,
            detail,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    /// Count per change kind (keys are the dotted kind strings).
    pub counts: BTreeMap<String, usize>,
    pub total_breaking: usize,
    pub total_non_breaking: usize,
    pub has_breaking: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyDiff {
    pub changes: Vec<Change>,
    pub summary: DiffSummary,
}

/// Compare two normalized IRs.
pub fn diff(old: &OntologyIr, new: &OntologyIr) -> OntologyDiff {
    let mut changes = Vec::new();

    diff_objects(old, new, &mut changes);
    diff_relationships(old, new, &mut changes);
    diff_metrics(old, new, &mut changes);
    diff_dimensions(old, new, &mut changes);

    let mut summary = DiffSummary::default();
    for change in &changes {
        *summary.counts.entry(change.kind.as_str().to_string()).or_insert(0) += 1;
        match change.severity {
            Severity::Breaking => summary.total_breaking += 1,
            Severity::NonBreaking => summary.total_non_breaking += 1,
        }
    }
    summary.has_breaking = summary.total_breaking > 0;

    OntologyDiff { changes, summary }
}

// ── Objects ────────────────────────────────────────────────────

fn diff_objects(old: &OntologyIr, new: &OntologyIr, changes: &mut Vec<Change>) {
    let old_map: BTreeMap<&str, &ObjectIr> =
        old.objects.iter().map(|o| (o.name.as_str(), o)).collect();
    let new_map: BTreeMap<&str, &ObjectIr> =
        new.objects.iter().map(|o| (o.name.as_str(), o)).collect();

    let removed: Vec<&str> = old_map
        .keys()
        .filter(|name| !new_map.contains_key(*name))
        .copied()
        .collect();
    let added: Vec<&str> = new_map
        .keys()
        .filter(|name| !old_map.contains_key(*name))
        .copied()
        .collect();

    let renames = detect_renames(&removed, &added, &old_map, &new_map);
    let renamed_from: BTreeSet<&str> = renames.keys().copied().collect();
    let renamed_to: BTreeSet<&str> = renames.values().copied().collect();

    for name in &removed {
        if let Some(to) = renames.get(name) {
            changes.push(Change::breaking(
                format!("objects/{name}"),
                ChangeKind::ObjectRenamed,
                Some(format!("renamed to '{to}'")),
            ));
        } else if !renamed_from.contains(name) {
            changes.push(Change::breaking(
                format!("objects/{name}"),
                ChangeKind::ObjectRemoved,
                None,
            ));
        }
    }
    for name in &added {
        if !renamed_to.contains(name) {
            changes.push(Change::non_breaking(
                format!("objects/{name}"),
                ChangeKind::ObjectAdded,
                None,
            ));
        }
    }

    // Surviving objects: identifiers, then properties.
    for (name, old_obj) in &old_map {
        let Some(new_obj) = new_map.get(name) else {
            continue;
        };
        if old_obj.identifiers != new_obj.identifiers {
            changes.push(Change::breaking(
                format!("objects/{name}/identifiers"),
                ChangeKind::IdentifierChanged,
                Some(format!(
                    "[{}] -> [{}]",
                    old_obj.identifiers.join(", "),
                    new_obj.identifiers.join(", ")
                )),
            ));
        }
        diff_properties(name, old_obj, new_obj, changes);
    }
}

/// Rename heuristic: identical identifiers and ≥ 80 % property-name overlap.
/// A pairing is accepted only when it is unambiguous in both directions;
/// ties refuse the rename and fall back to removed + added.
fn detect_renames<'a>(
    removed: &[&'a str],
    added: &[&'a str],
    old_map: &BTreeMap<&str, &ObjectIr>,
    new_map: &BTreeMap<&str, &ObjectIr>,
) -> BTreeMap<&'a str, &'a str> {
    let mut candidates: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut claimed: BTreeMap<&str, usize> = BTreeMap::new();

    for old_name in removed {
        let old_obj = old_map[old_name];
        for new_name in added {
            let new_obj = new_map[new_name];
            if old_obj.identifiers == new_obj.identifiers
                && property_overlap(old_obj, new_obj) >= RENAME_OVERLAP_THRESHOLD
            {
                candidates.entry(*old_name).or_default().push(*new_name);
                *claimed.entry(*new_name).or_insert(0) += 1;
            }
        }
    }

    candidates
        .into_iter()
        .filter_map(|(old_name, matches)| match matches.as_slice() {
            [single] if claimed.get(single) == Some(&1) => Some((old_name, *single)),
            _ => None,
        })
        .collect()
}

fn property_overlap(a: &ObjectIr, b: &ObjectIr) -> f64 {
    let a_names: BTreeSet<&str> = a.property_names().collect();
    let b_names: BTreeSet<&str> = b.property_names().collect();
    let denom = a_names.len().max(b_names.len());
    if denom == 0 {
        return 1.0;
    }
    a_names.intersection(&b_names).count() as f64 / denom as f64
}

fn diff_properties(
    object: &str,
    old_obj: &ObjectIr,
    new_obj: &ObjectIr,
    changes: &mut Vec<Change>,
) {
    let old_props: BTreeMap<&str, &crate::ir::PropertyIr> =
        old_obj.properties.iter().map(|p| (p.name.as_str(), p)).collect();
    let new_props: BTreeMap<&str, &crate::ir::PropertyIr> =
        new_obj.properties.iter().map(|p| (p.name.as_str(), p)).collect();

    for (name, prop) in &new_props {
        if old_props.contains_key(name) {
            continue;
        }
        let path = format!("objects/{object}/properties/{name}");
        // A new column that is both non-nullable and required cannot be
        // satisfied by existing rows.
        if !prop.nullable && prop.required {
            changes.push(Change::breaking(
                path,
                ChangeKind::PropertyAdded,
                Some("non-nullable and required".into()),
            ));
        } else {
            changes.push(Change::non_breaking(path, ChangeKind::PropertyAdded, None));
        }
    }

    for name in old_props.keys() {
        if !new_props.contains_key(name) {
            changes.push(Change::breaking(
                format!("objects/{object}/properties/{name}"),
                ChangeKind::PropertyRemoved,
                None,
            ));
        }
    }

    for (name, old_prop) in &old_props {
        let Some(new_prop) = new_props.get(name) else {
            continue;
        };
        let path = format!("objects/{object}/properties/{name}");

        if old_prop.property_type != new_prop.property_type {
            let detail = Some(format!("{} -> {}", old_prop.property_type, new_prop.property_type));
            if old_prop.property_type.widens_to(new_prop.property_type) {
                changes.push(Change::non_breaking(
                    path.clone(),
                    ChangeKind::PropertyTypeChanged,
                    detail,
                ));
            } else {
                changes.push(Change::breaking(
                    path.clone(),
                    ChangeKind::PropertyTypeChanged,
                    detail,
                ));
            }
        }
        if old_prop.nullable != new_prop.nullable {
            let detail = Some(format!("{} -> {}", old_prop.nullable, new_prop.nullable));
            if old_prop.nullable && !new_prop.nullable {
                changes.push(Change::breaking(
                    path.clone(),
                    ChangeKind::PropertyNullableChanged,
                    detail,
                ));
            } else {
                changes.push(Change::non_breaking(
                    path.clone(),
                    ChangeKind::PropertyNullableChanged,
                    detail,
                ));
            }
        }
        if old_prop.required != new_prop.required {
            let detail = Some(format!("{} -> {}", old_prop.required, new_prop.required));
            if !old_prop.required && new_prop.required {
                changes.push(Change::breaking(path, ChangeKind::PropertyRequiredChanged, detail));
            } else {
                changes.push(Change::non_breaking(
                    path,
                    ChangeKind::PropertyRequiredChanged,
                    detail,
                ));
            }
        }
    }
}

// ── Relationships ──────────────────────────────────────────────

fn diff_relationships(old: &OntologyIr, new: &OntologyIr, changes: &mut Vec<Change>) {
    let old_map: BTreeMap<&str, &crate::ir::RelationshipIr> =
        old.relationships.iter().map(|r| (r.name.as_str(), r)).collect();
    let new_map: BTreeMap<&str, &crate::ir::RelationshipIr> =
        new.relationships.iter().map(|r| (r.name.as_str(), r)).collect();

    for name in new_map.keys() {
        if !old_map.contains_key(name) {
            changes.push(Change::non_breaking(
                format!("relationships/{name}"),
                ChangeKind::RelationshipAdded,
                None,
            ));
        }
    }
    for name in old_map.keys() {
        if !new_map.contains_key(name) {
            changes.push(Change::breaking(
                format!("relationships/{name}"),
                ChangeKind::RelationshipRemoved,
                None,
            ));
        }
    }

    for (name, old_rel) in &old_map {
        let Some(new_rel) = new_map.get(name) else {
            continue;
        };
        let path = format!("relationships/{name}");

        if old_rel.join_keys != new_rel.join_keys
            || old_rel.from != new_rel.from
            || old_rel.to != new_rel.to
        {
            changes.push(Change::breaking(
                path.clone(),
                ChangeKind::RelationshipJoinKeysChanged,
                None,
            ));
        }
        if old_rel.cardinality != new_rel.cardinality {
            let detail = Some(format!("{} -> {}", old_rel.cardinality, new_rel.cardinality));
            if new_rel.cardinality.strictness() > old_rel.cardinality.strictness() {
                changes.push(Change::breaking(
                    path,
                    ChangeKind::RelationshipCardinalityChanged,
                    detail,
                ));
            } else {
                changes.push(Change::non_breaking(
                    path,
                    ChangeKind::RelationshipCardinalityChanged,
                    detail,
                ));
            }
        }
    }
}

// ── Metrics ────────────────────────────────────────────────────

fn diff_metrics(old: &OntologyIr, new: &OntologyIr, changes: &mut Vec<Change>) {
    let old_map: BTreeMap<&str, &crate::ir::MetricIr> =
        old.metrics.iter().map(|m| (m.name.as_str(), m)).collect();
    let new_map: BTreeMap<&str, &crate::ir::MetricIr> =
        new.metrics.iter().map(|m| (m.name.as_str(), m)).collect();

    for name in new_map.keys() {
        if !old_map.contains_key(name) {
            changes.push(Change::non_breaking(
                format!("metrics/{name}"),
                ChangeKind::MetricAdded,
                None,
            ));
        }
    }
    for name in old_map.keys() {
        if !new_map.contains_key(name) {
            changes.push(Change::breaking(
                format!("metrics/{name}"),
                ChangeKind::MetricRemoved,
                None,
            ));
        }
    }

    for (name, old_metric) in &old_map {
        let Some(new_metric) = new_map.get(name) else {
            continue;
        };
        let path = format!("metrics/{name}");
        if old_metric.expression != new_metric.expression {
            changes.push(Change::breaking(
                path.clone(),
                ChangeKind::MetricExpressionChanged,
                None,
            ));
        }
        if old_metric.grain != new_metric.grain {
            changes.push(Change::breaking(
                path,
                ChangeKind::MetricGrainChanged,
                Some(format!(
                    "[{}] -> [{}]",
                    old_metric.grain.join(", "),
                    new_metric.grain.join(", ")
                )),
            ));
        }
    }
}

// ── Dimensions ─────────────────────────────────────────────────

fn diff_dimensions(old: &OntologyIr, new: &OntologyIr, changes: &mut Vec<Change>) {
    let old_map: BTreeMap<&str, &crate::ir::DimensionIr> =
        old.dimensions.iter().map(|d| (d.name.as_str(), d)).collect();
    let new_map: BTreeMap<&str, &crate::ir::DimensionIr> =
        new.dimensions.iter().map(|d| (d.name.as_str(), d)).collect();

    for name in new_map.keys() {
        if !old_map.contains_key(name) {
            changes.push(Change::non_breaking(
                format!("dimensions/{name}"),
                ChangeKind::DimensionAdded,
                None,
            ));
        }
    }
    for name in old_map.keys() {
        if !new_map.contains_key(name) {
            changes.push(Change::breaking(
                format!("dimensions/{name}"),
                ChangeKind::DimensionRemoved,
                None,
            ));
        }
    }

    for (name, old_dim) in &old_map {
        let Some(new_dim) = new_map.get(name) else {
            continue;
        };
        if old_dim.source_property != new_dim.source_property {
            changes.push(Change::breaking(
                format!("dimensions/{name}"),
                ChangeKind::DimensionSourceChanged,
                Some(format!("{} -> {}", old_dim.source_property, new_dim.source_property)),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize;

    fn ir(json: &str) -> OntologyIr {
        normalize::process(json).unwrap().ir
    }

    fn customer(properties: &str, identifiers: &str) -> String {
        format!(
            r#"{{"version": "1.0",
                 "objects": [{{"name": "Customer",
                               "identifiers": [{identifiers}],
                               "properties": [{properties}]}}]}}"#
        )
    }

    #[test]
    fn test_diff_identity_is_empty() {
        let a = ir(&customer(
            r#"{"name": "id", "type": "string"}, {"name": "email", "type": "string"}"#,
            r#""id""#,
        ));
        let result = diff(&a, &a);
        assert!(result.changes.is_empty());
        assert!(!result.summary.has_breaking);
        assert_eq!(result.summary.total_non_breaking, 0);
    }

    #[test]
    fn test_nullable_property_added_is_non_breaking() {
        let old = ir(&customer(r#"{"name": "id", "type": "string"}"#, r#""id""#));
        let new = ir(&customer(
            r#"{"name": "id", "type": "string"}, {"name": "phone", "type": "string", "nullable": true}"#,
            r#""id""#,
        ));
        let result = diff(&old, &new);
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].kind, ChangeKind::PropertyAdded);
        assert_eq!(result.changes[0].severity, Severity::NonBreaking);
        assert!(!result.summary.has_breaking);
    }

    #[test]
    fn test_required_non_nullable_property_added_is_breaking() {
        let old = ir(&customer(r#"{"name": "id", "type": "string"}"#, r#""id""#));
        let new = ir(&customer(
            r#"{"name": "id", "type": "string"},
               {"name": "ssn", "type": "string", "nullable": false, "required": true}"#,
            r#""id""#,
        ));
        let result = diff(&old, &new);
        assert_eq!(result.changes[0].severity, Severity::Breaking);
    }

    #[test]
    fn test_property_removed_plus_added_when_rename_overlap_too_low() {
        // Removing email and adding contact_email: two property records,
        // not a rename (renames apply to objects, not properties).
        let old = ir(&customer(
            r#"{"name": "id", "type": "string"}, {"name": "email", "type": "string"}"#,
            r#""id""#,
        ));
        let new = ir(&customer(
            r#"{"name": "id", "type": "string"}, {"name": "contact_email", "type": "string"}"#,
            r#""id""#,
        ));
        let result = diff(&old, &new);
        assert_eq!(result.changes.len(), 2);
        assert!(result.summary.has_breaking);
        assert_eq!(result.summary.counts["property.added"], 1);
        assert_eq!(result.summary.counts["property.removed"], 1);
        assert_eq!(result.summary.total_breaking, 1);
        assert_eq!(result.summary.total_non_breaking, 1);
    }

    #[test]
    fn test_object_rename_detected() {
        let old = ir(
            r#"{"version": "1.0",
                "objects": [{"name": "Client", "identifiers": ["id"],
                             "properties": [
                                {"name": "id", "type": "string"},
                                {"name": "email", "type": "string"},
                                {"name": "region", "type": "string"},
                                {"name": "segment", "type": "string"},
                                {"name": "joined_at", "type": "date"}]}]}"#,
        );
        let new = ir(
            r#"{"version": "1.0",
                "objects": [{"name": "Customer", "identifiers": ["id"],
                             "properties": [
                                {"name": "id", "type": "string"},
                                {"name": "email", "type": "string"},
                                {"name": "region", "type": "string"},
                                {"name": "segment", "type": "string"},
                                {"name": "phone", "type": "string"}]}]}"#,
        );
        let result = diff(&old, &new);
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].kind, ChangeKind::ObjectRenamed);
        assert_eq!(result.changes[0].severity, Severity::Breaking);
        assert_eq!(result.changes[0].detail.as_deref(), Some("renamed to 'Customer'"));
    }

    #[test]
    fn test_ambiguous_rename_refused() {
        // Two added objects both match the removed one: refuse the rename.
        let old = ir(
            r#"{"version": "1.0",
                "objects": [{"name": "Client", "identifiers": ["id"],
                             "properties": [{"name": "id", "type": "string"}]}]}"#,
        );
        let new = ir(
            r#"{"version": "1.0",
                "objects": [
                    {"name": "Customer", "identifiers": ["id"],
                     "properties": [{"name": "id", "type": "string"}]},
                    {"name": "Account", "identifiers": ["id"],
                     "properties": [{"name": "id", "type": "string"}]}]}"#,
        );
        let result = diff(&old, &new);
        let kinds: Vec<ChangeKind> = result.changes.iter().map(|c| c.kind).collect();
        assert!(kinds.contains(&ChangeKind::ObjectRemoved));
        assert_eq!(
            kinds.iter().filter(|k| **k == ChangeKind::ObjectAdded).count(),
            2
        );
        assert!(!kinds.contains(&ChangeKind::ObjectRenamed));
    }

    #[test]
    fn test_type_widening_is_non_breaking() {
        let old = ir(&customer(r#"{"name": "amount", "type": "integer"}"#, r#""amount""#));
        let new = ir(&customer(r#"{"name": "amount", "type": "decimal"}"#, r#""amount""#));
        let result = diff(&old, &new);
        assert_eq!(result.changes[0].kind, ChangeKind::PropertyTypeChanged);
        assert_eq!(result.changes[0].severity, Severity::NonBreaking);
    }

    #[test]
    fn test_type_narrowing_is_breaking() {
        let old = ir(&customer(r#"{"name": "amount", "type": "number"}"#, r#""amount""#));
        let new = ir(&customer(r#"{"name": "amount", "type": "integer"}"#, r#""amount""#));
        let result = diff(&old, &new);
        assert_eq!(result.changes[0].severity, Severity::Breaking);
    }

    #[test]
    fn test_nullable_direction() {
        let old = ir(&customer(
            r#"{"name": "x", "type": "string", "nullable": true}"#,
            r#""x""#,
        ));
        let new = ir(&customer(
            r#"{"name": "x", "type": "string", "nullable": false}"#,
            r#""x""#,
        ));
        assert_eq!(diff(&old, &new).changes[0].severity, Severity::Breaking);
        assert_eq!(diff(&new, &old).changes[0].severity, Severity::NonBreaking);
    }

    #[test]
    fn test_cardinality_tighten_vs_relax() {
        let base = r#"{"version": "1.0",
            "objects": [
                {"name": "A", "properties": [{"name": "k", "type": "string"}]},
                {"name": "B", "properties": [{"name": "k", "type": "string"}]}],
            "relationships": [
                {"name": "r", "from": "A", "to": "B",
                 "joinKeys": [["k", "k"]], "cardinality": "CARD"}]}"#;
        let loose = ir(&base.replace("CARD", "many_to_many"));
        let tight = ir(&base.replace("CARD", "one_to_one"));
        let tightened = diff(&loose, &tight);
        assert_eq!(tightened.changes[0].kind, ChangeKind::RelationshipCardinalityChanged);
        assert_eq!(tightened.changes[0].severity, Severity::Breaking);
        let relaxed = diff(&tight, &loose);
        assert_eq!(relaxed.changes[0].severity, Severity::NonBreaking);
    }

    #[test]
    fn test_metric_expression_and_grain_changes_break() {
        let base = r#"{"version": "1.0",
            "objects": [
                {"name": "Order", "properties": [{"name": "total", "type": "decimal"}]},
                {"name": "Customer", "properties": [{"name": "id", "type": "string"}]}],
            "metrics": [{"name": "Revenue", "expression": "EXPR",
                         "grain": [GRAIN], "type": "sum"}]}"#;
        let old = ir(&base.replace("EXPR", "SUM(total)").replace("GRAIN", r#""Order""#));
        let new_expr = ir(&base.replace("EXPR", "SUM(total) - 1").replace("GRAIN", r#""Order""#));
        let new_grain = ir(&base
            .replace("EXPR", "SUM(total)")
            .replace("GRAIN", r#""Order", "Customer""#));

        let d1 = diff(&old, &new_expr);
        assert_eq!(d1.changes[0].kind, ChangeKind::MetricExpressionChanged);
        assert_eq!(d1.changes[0].severity, Severity::Breaking);

        let d2 = diff(&old, &new_grain);
        assert_eq!(d2.changes[0].kind, ChangeKind::MetricGrainChanged);
        assert_eq!(d2.changes[0].severity, Severity::Breaking);
    }

    #[test]
    fn test_diff_deterministic_bytes() {
        let old = ir(&customer(
            r#"{"name": "id", "type": "string"}, {"name": "email", "type": "string"}"#,
            r#""id""#,
        ));
        let new = ir(&customer(
            r#"{"name": "id", "type": "string"}, {"name": "phone", "type": "string"}"#,
            r#""id""#,
        ));
        let a = serde_json::to_string(&diff(&old, &new)).unwrap();
        let b = serde_json::to_string(&diff(&old, &new)).unwrap();
        assert_eq!(a, b);
    }
}
