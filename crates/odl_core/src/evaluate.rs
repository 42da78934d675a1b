//! Evaluation gates — rule bundles applied to an IR before promotion.
//!
//! Gates are deterministic predicates grouped into three categories. A
//! threshold profile decides which results count as failure:
//!   - `strict`   fails on any failure or warning
//!   - `standard` fails only on errors
//!   - `lenient`  fails only on deployability errors
//!
//! Profiles are monotone: a version passing `strict` passes `standard`,
//! and a version passing `standard` passes `lenient`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ir::OntologyIr;

/// Tokens a metric expression must not contain.
const EXPRESSION_DENYLIST: &[&str] = &[";", "DROP ", "GRANT "];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateCategory {
    Structural,
    Semantic,
    Deployability,
}

impl GateCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structural => "structural",
            Self::Semantic => "semantic",
            Self::Deployability => "deployability",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Pass,
    Fail,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub gate: String,
    pub category: GateCategory,
    pub status: GateStatus,
    pub message: String,
}

impl GateResult {
    fn pass(gate: &str, category: GateCategory, message: impl Into<String>) -> Self {
        Self {
            gate: gate.into(),
            category,
            status: GateStatus::Pass,
            message: message.into(),
        }
    }

    fn fail(gate: &str, category: GateCategory, message: impl Into<String>) -> Self {
        Self {
            gate: gate.into(),
            category,
            status: GateStatus::Fail,
            message: message.into(),
        }
    }

    fn warning(gate: &str, category: GateCategory, message: impl Into<String>) -> Self {
        Self {
            gate: gate.into(),
            category,
            status: GateStatus::Warning,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdProfile {
    Strict,
    Standard,
    Lenient,
}

impl ThresholdProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Standard => "standard",
            Self::Lenient => "lenient",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "strict" => Some(Self::Strict),
            "standard" => Some(Self::Standard),
            "lenient" => Some(Self::Lenient),
            _ => None,
        }
    }

    /// Whether a gate result counts as a failure under this profile.
    fn fails_on(&self, result: &GateResult) -> bool {
        match self {
            Self::Strict => result.status != GateStatus::Pass,
            Self::Standard => result.status == GateStatus::Fail,
            Self::Lenient => {
                result.status == GateStatus::Fail
                    && result.category == GateCategory::Deployability
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub profile: ThresholdProfile,
    pub passed: bool,
    /// category → gate id → result.
    pub metrics: BTreeMap<String, BTreeMap<String, GateResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_failure: Option<GateResult>,
}

/// Run all gate bundles against an IR under the given profile.
pub fn evaluate(ir: &OntologyIr, profile: ThresholdProfile) -> EvaluationOutcome {
    let mut results = Vec::new();
    structural_gates(ir, &mut results);
    semantic_gates(ir, &mut results);
    deployability_gates(ir, &mut results);

    let first_failure = results.iter().find(|r| profile.fails_on(r)).cloned();
    let passed = first_failure.is_none();

    let mut metrics: BTreeMap<String, BTreeMap<String, GateResult>> = BTreeMap::new();
    for result in results {
        metrics
            .entry(result.category.as_str().to_string())
            .or_default()
            .insert(result.gate.clone(), result);
    }

    EvaluationOutcome {
        profile,
        passed,
        metrics,
        first_failure,
    }
}

// ── Structural bundle ──────────────────────────────────────────

fn structural_gates(ir: &OntologyIr, results: &mut Vec<GateResult>) {
    const CAT: GateCategory = GateCategory::Structural;

    let mut duplicates = Vec::new();
    collect_duplicates("object", ir.objects.iter().map(|o| o.name.as_str()), &mut duplicates);
    collect_duplicates(
        "relationship",
        ir.relationships.iter().map(|r| r.name.as_str()),
        &mut duplicates,
    );
    collect_duplicates("metric", ir.metrics.iter().map(|m| m.name.as_str()), &mut duplicates);
    collect_duplicates(
        "dimension",
        ir.dimensions.iter().map(|d| d.name.as_str()),
        &mut duplicates,
    );
    for obj in &ir.objects {
        collect_duplicates(
            &format!("property on '{}'", obj.name),
            obj.property_names(),
            &mut duplicates,
        );
    }
    results.push(if duplicates.is_empty() {
        GateResult::pass("no_duplicate_names", CAT, "all names unique")
    } else {
        GateResult::fail(
            "no_duplicate_names",
            CAT,
            format!("duplicate names: {}", duplicates.join("; ")),
        )
    });

    let missing_identifiers: Vec<&str> = ir
        .objects
        .iter()
        .filter(|o| o.identifiers.is_empty())
        .map(|o| o.name.as_str())
        .collect();
    results.push(if missing_identifiers.is_empty() {
        GateResult::pass("identifiers_present", CAT, "every object declares an identifier")
    } else {
        GateResult::fail(
            "identifiers_present",
            CAT,
            format!("objects without identifiers: {}", missing_identifiers.join(", ")),
        )
    });

    let mut dangling = Vec::new();
    for obj in &ir.objects {
        for ident in &obj.identifiers {
            if obj.property(ident).is_none() {
                dangling.push(format!("{}.{}", obj.name, ident));
            }
        }
    }
    results.push(if dangling.is_empty() {
        GateResult::pass("identifiers_resolve", CAT, "all identifiers name declared properties")
    } else {
        GateResult::fail(
            "identifiers_resolve",
            CAT,
            format!("identifiers without matching property: {}", dangling.join(", ")),
        )
    });

    // Property types are always populated in the typed IR; the gate remains
    // so profile output is complete and stable.
    results.push(GateResult::pass(
        "property_types_present",
        CAT,
        "all property types declared",
    ));
}

fn collect_duplicates<'a>(
    what: &str,
    names: impl Iterator<Item = &'a str>,
    out: &mut Vec<String>,
) {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            out.push(format!("{what} '{name}'"));
        }
    }
}

// ── Semantic bundle ────────────────────────────────────────────

fn semantic_gates(ir: &OntologyIr, results: &mut Vec<GateResult>) {
    const CAT: GateCategory = GateCategory::Semantic;

    let mut bad_joins = Vec::new();
    for rel in &ir.relationships {
        let (Some(from), Some(to)) = (ir.object(&rel.from), ir.object(&rel.to)) else {
            bad_joins.push(format!("{}: endpoint object missing", rel.name));
            continue;
        };
        if rel.join_keys.is_empty() {
            bad_joins.push(format!("{}: no join keys", rel.name));
        }
        for key in &rel.join_keys {
            match (from.property(&key.0), to.property(&key.1)) {
                (Some(a), Some(b)) if a.property_type.join_compatible(b.property_type) => {}
                (Some(a), Some(b)) => bad_joins.push(format!(
                    "{}: {} vs {} ({} -> {})",
                    rel.name, a.property_type, b.property_type, key.0, key.1
                )),
                _ => bad_joins.push(format!("{}: unknown property in ({}, {})", rel.name, key.0, key.1)),
            }
        }
    }
    results.push(if bad_joins.is_empty() {
        GateResult::pass("join_keys_compatible", CAT, "all join keys compatible")
    } else {
        GateResult::fail(
            "join_keys_compatible",
            CAT,
            format!("incompatible joins: {}", bad_joins.join("; ")),
        )
    });

    let mut bad_dims = Vec::new();
    for dim in &ir.dimensions {
        let (obj_name, prop_name) = dim.source_parts();
        match ir.object(obj_name) {
            Some(obj) if obj.property(prop_name).is_some() => {}
            _ => bad_dims.push(format!("{} -> {}", dim.name, dim.source_property)),
        }
    }
    results.push(if bad_dims.is_empty() {
        GateResult::pass("dimensions_resolve", CAT, "all dimensions resolve")
    } else {
        GateResult::fail(
            "dimensions_resolve",
            CAT,
            format!("unresolved dimensions: {}", bad_dims.join(", ")),
        )
    });

    let mut bad_grains = Vec::new();
    for metric in &ir.metrics {
        if metric.grain.is_empty() {
            bad_grains.push(format!("{}: empty grain", metric.name));
        }
        for grain in &metric.grain {
            if ir.object(grain).is_none() {
                bad_grains.push(format!("{}: unknown object '{grain}'", metric.name));
            }
        }
    }
    results.push(if bad_grains.is_empty() {
        GateResult::pass("metric_grains_valid", CAT, "all metric grains valid")
    } else {
        GateResult::fail(
            "metric_grains_valid",
            CAT,
            format!("invalid grains: {}", bad_grains.join("; ")),
        )
    });

    let mut bad_expressions = Vec::new();
    for metric in &ir.metrics {
        if metric.expression.trim().is_empty() {
            bad_expressions.push(format!("{}: empty expression", metric.name));
            continue;
        }
        let upper = metric.expression.to_uppercase();
        for token in EXPRESSION_DENYLIST {
            if upper.contains(token) {
                bad_expressions.push(format!("{}: contains '{}'", metric.name, token.trim()));
            }
        }
    }
    results.push(if bad_expressions.is_empty() {
        GateResult::pass("metric_expressions_safe", CAT, "all metric expressions safe")
    } else {
        GateResult::fail(
            "metric_expressions_safe",
            CAT,
            format!("unsafe expressions: {}", bad_expressions.join("; ")),
        )
    });
}

// ── Deployability bundle ───────────────────────────────────────

fn deployability_gates(ir: &OntologyIr, results: &mut Vec<GateResult>) {
    const CAT: GateCategory = GateCategory::Deployability;

    let unmapped: Vec<&str> = ir
        .objects
        .iter()
        .filter(|obj| {
            let per_object = obj.mapping.as_ref().and_then(|m| m.table.as_deref()).is_some();
            let global = ir
                .target_mapping
                .as_ref()
                .map(|tm| tm.table_mappings.contains_key(&obj.name))
                .unwrap_or(false);
            !per_object && !global
        })
        .map(|o| o.name.as_str())
        .collect();
    results.push(if unmapped.is_empty() {
        GateResult::pass("table_mappings_complete", CAT, "every object has a table mapping")
    } else {
        GateResult::fail(
            "table_mappings_complete",
            CAT,
            format!("objects without table mapping: {}", unmapped.join(", ")),
        )
    });

    let unlocated: Vec<&str> = ir
        .objects
        .iter()
        .filter(|obj| {
            let (database, schema) = ir.location_for(obj);
            database.map_or(true, |d| d.is_empty()) || schema.map_or(true, |s| s.is_empty())
        })
        .map(|o| o.name.as_str())
        .collect();
    results.push(if unlocated.is_empty() {
        GateResult::pass("database_schema_set", CAT, "database and schema resolve for every object")
    } else {
        GateResult::fail(
            "database_schema_set",
            CAT,
            format!("objects without database/schema: {}", unlocated.join(", ")),
        )
    });

    let warehouse_set = ir
        .target_mapping
        .as_ref()
        .and_then(|tm| tm.warehouse.as_deref())
        .map_or(false, |w| !w.is_empty());
    results.push(if warehouse_set {
        GateResult::pass("warehouse_declared", CAT, "warehouse declared")
    } else {
        GateResult::warning("warehouse_declared", CAT, "no warehouse declared")
    });
}
