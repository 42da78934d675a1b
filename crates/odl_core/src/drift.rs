//! Drift detection — declared ontology vs. the live warehouse.
//!
//! Two probes:
//!   - *mapping drift*: per-object column comparison against the live
//!     catalog under a coarse type equivalence, with a Levenshtein-bounded
//!     rename inference;
//!   - *view drift*: the live semantic-view YAML compared under
//!     normalization to the YAML the compiler would produce for the version
//!     recorded as deployed.
//!
//! Findings become OPEN drift events; the store coalesces identical open
//! events via the dedup hash computed here.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::ir::{OntologyIr, PropertyType};
use crate::ports::WarehouseAdapter;
use crate::runner::CancelFlag;
use crate::types::DriftEventType;

/// Maximum raw diff lines carried in a YAML_DIVERGED event.
const MAX_DIFF_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftFinding {
    pub event_type: DriftEventType,
    pub details: serde_json::Value,
}

/// Coalescing key for open events: {ontology, event_type, details}.
pub fn dedup_hash(ontology_id: Uuid, event_type: DriftEventType, details: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ontology_id.as_bytes());
    hasher.update(b":");
    hasher.update(event_type.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(details.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

// ── Coarse type equivalence ────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoarseType {
    Text,
    Numeric,
    Boolean,
    Temporal,
    Other,
}

impl CoarseType {
    pub fn of_property(ty: PropertyType) -> Self {
        match ty {
            PropertyType::String => Self::Text,
            PropertyType::Number | PropertyType::Integer | PropertyType::Decimal => Self::Numeric,
            PropertyType::Boolean => Self::Boolean,
            PropertyType::Date | PropertyType::Timestamp | PropertyType::Time => Self::Temporal,
            PropertyType::Array | PropertyType::Object => Self::Other,
        }
    }

    pub fn of_warehouse(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();
        const TEXT: &[&str] = &["VARCHAR", "TEXT", "STRING", "CHAR"];
        const NUMERIC: &[&str] = &["NUMBER", "DECIMAL", "NUMERIC", "INT", "BIGINT", "FLOAT", "DOUBLE"];
        const TEMPORAL: &[&str] = &["DATE", "TIMESTAMP", "TIME"];
        if TEXT.iter().any(|p| upper.starts_with(p)) {
            Self::Text
        } else if NUMERIC.iter().any(|p| upper.starts_with(p)) {
            Self::Numeric
        } else if upper.starts_with("BOOL") {
            Self::Boolean
        } else if TEMPORAL.iter().any(|p| upper.starts_with(p)) {
            Self::Temporal
        } else {
            Self::Other
        }
    }
}

// ── Detector ───────────────────────────────────────────────────

pub struct DriftDetector {
    adapter: Arc<dyn WarehouseAdapter>,
    config: EngineConfig,
}

impl DriftDetector {
    pub fn new(adapter: Arc<dyn WarehouseAdapter>, config: EngineConfig) -> Self {
        Self { adapter, config }
    }

    /// Compare each declared object's mapping against the live catalog.
    pub async fn detect_mapping_drift(
        &self,
        ir: &OntologyIr,
        cancel: &CancelFlag,
    ) -> Result<Vec<DriftFinding>> {
        let Some(target) = ir.target_mapping.as_ref() else {
            return Ok(Vec::new());
        };
        let catalog = self
            .adapter
            .list_catalog(&target.database, &target.schema)
            .await?;

        let mut findings = Vec::new();
        for obj in &ir.objects {
            cancel.checkpoint()?;
            let table = ir.table_for(obj);
            let Some(live_columns) = catalog.get(&table) else {
                findings.push(DriftFinding {
                    event_type: DriftEventType::TableMissing,
                    details: json!({
                        "object": obj.name,
                        "table": table,
                        "database": target.database,
                        "schema": target.schema,
                    }),
                });
                continue;
            };
            self.compare_columns(obj, &table, live_columns, &mut findings);
        }
        Ok(findings)
    }

    fn compare_columns(
        &self,
        obj: &crate::ir::ObjectIr,
        table: &str,
        live_columns: &BTreeMap<String, String>,
        findings: &mut Vec<DriftFinding>,
    ) {
        let declared: BTreeMap<&str, PropertyType> = obj
            .properties
            .iter()
            .map(|p| (p.name.as_str(), p.property_type))
            .collect();

        let dropped: Vec<&str> = declared
            .keys()
            .filter(|name| !live_columns.contains_key(**name))
            .copied()
            .collect();
        let added: Vec<&str> = live_columns
            .keys()
            .map(String::as_str)
            .filter(|name| !declared.contains_key(name))
            .collect();

        // Rename inference: a dropped/added pair within the edit-distance
        // bound and of identical coarse type, unambiguous in both directions.
        let mut candidates: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut claimed: BTreeMap<&str, usize> = BTreeMap::new();
        for d in &dropped {
            let d_coarse = CoarseType::of_property(declared[d]);
            for a in &added {
                let a_coarse = CoarseType::of_warehouse(&live_columns[*a]);
                if d_coarse == a_coarse
                    && strsim::levenshtein(d, a) <= self.config.drift_rename_max_distance
                {
                    candidates.entry(*d).or_default().push(*a);
                    *claimed.entry(*a).or_insert(0) += 1;
                }
            }
        }
        let renames: BTreeMap<&str, &str> = candidates
            .into_iter()
            .filter_map(|(d, matches)| match matches.as_slice() {
                [single] if claimed.get(single) == Some(&1) => Some((d, *single)),
                _ => None,
            })
            .collect();
        let renamed_to: Vec<&str> = renames.values().copied().collect();

        for (from, to) in &renames {
            findings.push(DriftFinding {
                event_type: DriftEventType::ColumnRenamed,
                details: json!({
                    "object": obj.name,
                    "table": table,
                    "from_column": from,
                    "to_column": to,
                }),
            });
        }
        for name in dropped {
            if renames.contains_key(name) {
                continue;
            }
            findings.push(DriftFinding {
                event_type: DriftEventType::ColumnDropped,
                details: json!({
                    "object": obj.name,
                    "table": table,
                    "column": name,
                    "declared_type": declared[name].as_str(),
                }),
            });
        }
        for name in added {
            if renamed_to.contains(&name) {
                continue;
            }
            findings.push(DriftFinding {
                event_type: DriftEventType::ColumnAdded,
                details: json!({
                    "object": obj.name,
                    "table": table,
                    "column": name,
                    "live_type": live_columns[name],
                }),
            });
        }

        // Columns present on both sides: coarse type must agree.
        for (name, declared_type) in &declared {
            let Some(live_type) = live_columns.get(*name) else {
                continue;
            };
            if CoarseType::of_property(*declared_type) != CoarseType::of_warehouse(live_type) {
                findings.push(DriftFinding {
                    event_type: DriftEventType::ColumnTypeChanged,
                    details: json!({
                        "object": obj.name,
                        "table": table,
                        "column": name,
                        "declared_type": declared_type.as_str(),
                        "live_type": live_type,
                    }),
                });
            }
        }
    }

    /// Compare the live semantic-view YAML against what the compiler
    /// produces for the deployed version. Byte-equality under normalization;
    /// a missing live view is "not deployed", not drift.
    pub async fn detect_view_drift(
        &self,
        view_fqn: &str,
        expected_yaml: &str,
    ) -> Result<Option<DriftFinding>> {
        let Some(live_yaml) = self.adapter.export_existing(view_fqn).await? else {
            return Ok(None);
        };

        let expected_canonical = canonicalize_yaml(expected_yaml);
        let live_canonical = canonicalize_yaml(&live_yaml);
        if expected_canonical == live_canonical {
            return Ok(None);
        }

        Ok(Some(DriftFinding {
            event_type: DriftEventType::YamlDiverged,
            details: json!({
                "view_fqn": view_fqn,
                "expected_hash": crate::hash::content_hash(&expected_canonical),
                "live_hash": crate::hash::content_hash(&live_canonical),
                "diff": diff_lines(expected_yaml, &live_yaml, MAX_DIFF_LINES),
            }),
        }))
    }
}

/// Parse YAML and re-serialize through JSON for a key-order-insensitive
/// comparison; unparseable input compares raw.
fn canonicalize_yaml(yaml: &str) -> String {
    match serde_yaml::from_str::<serde_json::Value>(yaml) {
        Ok(value) => value.to_string(),
        Err(_) => yaml.to_string(),
    }
}

/// Minimal line diff: `-` lines only in expected, `+` lines only in live.
fn diff_lines(expected: &str, live: &str, max: usize) -> Vec<String> {
    let expected_lines: Vec<&str> = expected.lines().collect();
    let live_lines: Vec<&str> = live.lines().collect();
    let mut out = Vec::new();
    for line in &expected_lines {
        if !live_lines.contains(line) && out.len() < max {
            out.push(format!("- {line}"));
        }
    }
    for line in &live_lines {
        if !expected_lines.contains(line) && out.len() < max {
            out.push(format!("+ {line}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::OdlError;
    use crate::normalize;
    use crate::ports::{AnalystAnswer, Catalog, DeployCallOutcome, VerifyOutcome};

    #[derive(Default)]
    struct FakeCatalog {
        catalog: Mutex<Catalog>,
        live_view: Option<String>,
    }

    impl FakeCatalog {
        fn with_table(table: &str, columns: &[(&str, &str)]) -> Self {
            let mut catalog = Catalog::new();
            catalog.insert(
                table.to_string(),
                columns
                    .iter()
                    .map(|(n, t)| (n.to_string(), t.to_string()))
                    .collect(),
            );
            Self {
                catalog: Mutex::new(catalog),
                live_view: None,
            }
        }
    }

    #[async_trait]
    impl WarehouseAdapter for FakeCatalog {
        async fn verify(&self, _: &str, _: &str, _: &str) -> Result<VerifyOutcome> {
            Err(OdlError::Transport("not wired".into()))
        }
        async fn deploy(&self, _: &str, _: &str, _: &str, _: &str) -> Result<DeployCallOutcome> {
            Err(OdlError::Transport("not wired".into()))
        }
        async fn export_existing(&self, _: &str) -> Result<Option<String>> {
            Ok(self.live_view.clone())
        }
        async fn list_catalog(&self, _: &str, _: &str) -> Result<Catalog> {
            Ok(self.catalog.lock().unwrap().clone())
        }
        async fn ask(&self, _: &str, _: &str) -> Result<AnalystAnswer> {
            Err(OdlError::Transport("not wired".into()))
        }
    }

    const CUSTOMERS: &str = r#"{
        "version": "1.0",
        "objects": [
            {"name": "Customer", "identifiers": ["customer_id"],
             "properties": [
                {"name": "customer_id", "type": "string"},
                {"name": "email", "type": "string"},
                {"name": "age", "type": "integer"}]}
        ],
        "targetMapping": {"database": "RETAIL_DB", "schema": "PUBLIC",
                          "tableMappings": {"Customer": "customers"}}
    }"#;

    fn detector(adapter: FakeCatalog) -> DriftDetector {
        DriftDetector::new(Arc::new(adapter), EngineConfig::default())
    }

    fn ir() -> OntologyIr {
        normalize::process(CUSTOMERS).unwrap().ir
    }

    #[tokio::test]
    async fn test_no_drift_when_catalog_matches() {
        let adapter = FakeCatalog::with_table(
            "customers",
            &[("customer_id", "VARCHAR"), ("email", "VARCHAR"), ("age", "NUMBER")],
        );
        let findings = detector(adapter)
            .detect_mapping_drift(&ir(), &CancelFlag::new())
            .await
            .unwrap();
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn test_table_missing() {
        let adapter = FakeCatalog::default();
        let findings = detector(adapter)
            .detect_mapping_drift(&ir(), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].event_type, DriftEventType::TableMissing);
        assert_eq!(findings[0].details["table"], "customers");
    }

    #[tokio::test]
    async fn test_column_dropped() {
        let adapter = FakeCatalog::with_table(
            "customers",
            &[("customer_id", "VARCHAR"), ("age", "NUMBER")],
        );
        let findings = detector(adapter)
            .detect_mapping_drift(&ir(), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].event_type, DriftEventType::ColumnDropped);
        assert_eq!(findings[0].details["column"], "email");
    }

    #[tokio::test]
    async fn test_rename_inferred_within_distance() {
        // email -> emails: distance 1, same coarse type.
        let adapter = FakeCatalog::with_table(
            "customers",
            &[("customer_id", "VARCHAR"), ("emails", "VARCHAR"), ("age", "NUMBER")],
        );
        let findings = detector(adapter)
            .detect_mapping_drift(&ir(), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].event_type, DriftEventType::ColumnRenamed);
        assert_eq!(findings[0].details["from_column"], "email");
        assert_eq!(findings[0].details["to_column"], "emails");
    }

    #[tokio::test]
    async fn test_rename_not_inferred_across_types() {
        // Close name but different coarse type: drop + add.
        let adapter = FakeCatalog::with_table(
            "customers",
            &[("customer_id", "VARCHAR"), ("emaily", "NUMBER"), ("age", "NUMBER")],
        );
        let findings = detector(adapter)
            .detect_mapping_drift(&ir(), &CancelFlag::new())
            .await
            .unwrap();
        let kinds: Vec<DriftEventType> = findings.iter().map(|f| f.event_type).collect();
        assert!(kinds.contains(&DriftEventType::ColumnDropped));
        assert!(kinds.contains(&DriftEventType::ColumnAdded));
        assert!(!kinds.contains(&DriftEventType::ColumnRenamed));
    }

    #[tokio::test]
    async fn test_rename_too_distant_reports_two_events() {
        let adapter = FakeCatalog::with_table(
            "customers",
            &[
                ("customer_id", "VARCHAR"),
                ("contact_email", "VARCHAR"),
                ("age", "NUMBER"),
            ],
        );
        let findings = detector(adapter)
            .detect_mapping_drift(&ir(), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(findings.len(), 2);
        let kinds: Vec<DriftEventType> = findings.iter().map(|f| f.event_type).collect();
        assert!(kinds.contains(&DriftEventType::ColumnDropped));
        assert!(kinds.contains(&DriftEventType::ColumnAdded));
    }

    #[tokio::test]
    async fn test_column_type_changed() {
        let adapter = FakeCatalog::with_table(
            "customers",
            &[
                ("customer_id", "VARCHAR"),
                ("email", "VARCHAR"),
                ("age", "BOOLEAN"),
            ],
        );
        let findings = detector(adapter)
            .detect_mapping_drift(&ir(), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].event_type, DriftEventType::ColumnTypeChanged);
        assert_eq!(findings[0].details["column"], "age");
    }

    #[tokio::test]
    async fn test_view_drift_equal_under_normalization() {
        let mut adapter = FakeCatalog::default();
        // Same content, different key order
        adapter.live_view = Some("semantic_model:\n  version: '1.0'\n  name: retail\n".into());
        let finding = detector(adapter)
            .detect_view_drift(
                "RETAIL_DB.PUBLIC.retail_view",
                "semantic_model:\n  name: retail\n  version: '1.0'\n",
            )
            .await
            .unwrap();
        assert!(finding.is_none());
    }

    #[tokio::test]
    async fn test_view_drift_diverged() {
        let mut adapter = FakeCatalog::default();
        adapter.live_view = Some("semantic_model:\n  name: retail_edited\n".into());
        let finding = detector(adapter)
            .detect_view_drift("RETAIL_DB.PUBLIC.retail_view", "semantic_model:\n  name: retail\n")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finding.event_type, DriftEventType::YamlDiverged);
        let diff = finding.details["diff"].as_array().unwrap();
        assert!(!diff.is_empty());
    }

    #[tokio::test]
    async fn test_view_not_deployed_is_not_drift() {
        let adapter = FakeCatalog::default();
        let finding = detector(adapter)
            .detect_view_drift("RETAIL_DB.PUBLIC.retail_view", "semantic_model: {}")
            .await
            .unwrap();
        assert!(finding.is_none());
    }

    #[test]
    fn test_dedup_hash_stable_and_discriminating() {
        let ontology = Uuid::new_v4();
        let details = json!({"column": "email", "table": "customers"});
        let h1 = dedup_hash(ontology, DriftEventType::ColumnDropped, &details);
        let h2 = dedup_hash(ontology, DriftEventType::ColumnDropped, &details);
        assert_eq!(h1, h2);
        let h3 = dedup_hash(ontology, DriftEventType::ColumnAdded, &details);
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_coarse_warehouse_types() {
        assert_eq!(CoarseType::of_warehouse("VARCHAR(255)"), CoarseType::Text);
        assert_eq!(CoarseType::of_warehouse("NUMBER(38,0)"), CoarseType::Numeric);
        assert_eq!(CoarseType::of_warehouse("TIMESTAMP_NTZ"), CoarseType::Temporal);
        assert_eq!(CoarseType::of_warehouse("BOOLEAN"), CoarseType::Boolean);
        assert_eq!(CoarseType::of_warehouse("VARIANT"), CoarseType::Other);
    }
}
