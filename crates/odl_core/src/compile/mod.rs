//! Compiler — ontology version → deployable artifact bundle.
//!
//! The compiler is a pure function of (IR, source metadata, options): no
//! clocks, no I/O, no stored state. The only timestamp in a bundle lives in
//! metadata.json, which is excluded from the bundle hash.

pub mod bundle;
pub mod scripts;
pub mod semantic_yaml;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OdlError, Result};
use crate::ir::OntologyIr;

pub use bundle::{ArtifactBundle, ArtifactFile, BundleMetadata};

pub const TARGET: &str = "SNOWFLAKE";

/// Identity of the version being compiled, surfaced in the YAML header and
/// bundle metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileSource {
    pub ontology_name: String,
    pub version_number: i32,
    pub content_hash: String,
}

/// One deployment environment in a promotion bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentTarget {
    pub name: String,
    pub database: String,
    pub schema: String,
    pub view_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileOptions {
    pub view_name: String,
    /// Override the ontology's declared database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Override the ontology's declared schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Non-empty list switches to a promotion bundle.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<EnvironmentTarget>,
    /// Timestamp recorded in metadata.json; supplied by the caller so the
    /// compiler itself stays pure.
    pub compiled_at: DateTime<Utc>,
}

impl CompileOptions {
    pub fn single(view_name: impl Into<String>, compiled_at: DateTime<Utc>) -> Self {
        Self {
            view_name: view_name.into(),
            database: None,
            schema: None,
            environments: Vec::new(),
            compiled_at,
        }
    }
}

/// Compile a version into an artifact bundle.
pub fn compile(ir: &OntologyIr, source: &CompileSource, options: &CompileOptions) -> Result<ArtifactBundle> {
    let (database, schema) = resolve_target(ir, options)?;
    let yaml = semantic_yaml::render(ir, source, &database, &schema)?;

    let mut files = vec![ArtifactFile::new(bundle::SEMANTIC_MODEL_FILE, yaml.clone())];

    if options.environments.is_empty() {
        files.push(ArtifactFile::new(
            bundle::VERIFY_FILE,
            scripts::verify_sql(&database, &schema, &yaml),
        ));
        files.push(ArtifactFile::new(
            bundle::DEPLOY_FILE,
            scripts::deploy_sql(&database, &schema, &options.view_name, &yaml),
        ));
        files.push(ArtifactFile::new(
            bundle::ROLLBACK_FILE,
            scripts::rollback_sql(&database, &schema, &options.view_name, None),
        ));
        files.push(ArtifactFile::new(
            bundle::INSTRUCTIONS_FILE,
            instructions_md(&database, &schema, &options.view_name),
        ));
        files.push(ArtifactFile::new(
            bundle::ROLLBACK_DOC_FILE,
            rollback_md(&database, &schema, &options.view_name),
        ));
    } else {
        for env in &options.environments {
            files.push(ArtifactFile::new(
                format!("{}/{}", env.name, bundle::VERIFY_FILE),
                scripts::verify_sql(&env.database, &env.schema, &yaml),
            ));
            files.push(ArtifactFile::new(
                format!("{}/{}", env.name, bundle::DEPLOY_FILE),
                scripts::deploy_sql(&env.database, &env.schema, &env.view_name, &yaml),
            ));
            files.push(ArtifactFile::new(
                format!("{}/{}", env.name, bundle::ROLLBACK_FILE),
                scripts::rollback_sql(&env.database, &env.schema, &env.view_name, None),
            ));
        }
        files.push(ArtifactFile::new(
            bundle::INSTRUCTIONS_FILE,
            promotion_instructions_md(&options.environments),
        ));
        files.push(ArtifactFile::new(
            bundle::ROLLBACK_DOC_FILE,
            promotion_rollback_md(&options.environments),
        ));
    }

    let metadata = BundleMetadata {
        source_ontology: source.ontology_name.clone(),
        version_number: source.version_number,
        content_hash: source.content_hash.clone(),
        bundle_hash: String::new(),
        created_at: options.compiled_at,
        target: TARGET.to_string(),
        environments: options.environments.iter().map(|e| e.name.clone()).collect(),
        objects_count: ir.objects.len(),
        relationships_count: ir.relationships.len(),
        metrics_count: ir.metrics.len(),
        dimensions_count: ir.dimensions.len(),
    };

    ArtifactBundle::assemble(files, metadata)
}

fn resolve_target(ir: &OntologyIr, options: &CompileOptions) -> Result<(String, String)> {
    let database = options
        .database
        .clone()
        .or_else(|| ir.target_mapping.as_ref().map(|t| t.database.clone()))
        .filter(|d| !d.is_empty())
        .ok_or_else(|| OdlError::CompileFailed("no target database declared or supplied".into()))?;
    let schema = options
        .schema
        .clone()
        .or_else(|| ir.target_mapping.as_ref().map(|t| t.schema.clone()))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| OdlError::CompileFailed("no target schema declared or supplied".into()))?;
    Ok((database, schema))
}

fn instructions_md(database: &str, schema: &str, view_name: &str) -> String {
    format!(
        "# Deployment Instructions\n\
         \n\
         ## Prerequisites\n\
         \n\
         - Warehouse account with access to {database}.{schema}\n\
         - Permission to create semantic views\n\
         \n\
         ## Apply Steps\n\
         \n\
         1. Review semantic_model.yaml\n\
         2. Run verify.sql to validate the model\n\
         3. Run deploy.sql to create {database}.{schema}.{view_name}\n\
         4. Confirm with the trailing SELECT in deploy.sql\n"
    )
}

fn rollback_md(database: &str, schema: &str, view_name: &str) -> String {
    format!(
        "# Rollback Instructions\n\
         \n\
         1. Run rollback.sql to drop {database}.{schema}.{view_name}\n\
         2. If rollback_semantic_model.yaml is present, the script restores\n\
         \x20\x20\x20the previous definition automatically\n"
    )
}

fn promotion_instructions_md(environments: &[EnvironmentTarget]) -> String {
    let mut out = String::from(
        "# Promotion Instructions\n\n\
         Apply per environment, in order. The shared semantic model sits at\n\
         the bundle root; scripts in each subdirectory target one environment.\n\n",
    );
    for env in environments {
        out.push_str(&format!(
            "## {}\n\n\
             1. Run {}/verify.sql\n\
             2. Run {}/deploy.sql (creates {}.{}.{})\n\n",
            env.name, env.name, env.name, env.database, env.schema, env.view_name
        ));
    }
    out
}

fn promotion_rollback_md(environments: &[EnvironmentTarget]) -> String {
    let mut out = String::from("# Promotion Rollback\n\n");
    for env in environments {
        out.push_str(&format!(
            "- {}: run {}/rollback.sql (drops {}.{}.{})\n",
            env.name, env.name, env.database, env.schema, env.view_name
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize;

    const RETAIL: &str = r#"{
        "version": "1.0",
        "name": "retail",
        "objects": [
            {"name": "Customer", "identifiers": ["customer_id"],
             "properties": [{"name": "customer_id", "type": "string"},
                            {"name": "email", "type": "string"}]},
            {"name": "Order", "identifiers": ["order_id"],
             "properties": [{"name": "order_id", "type": "string"},
                            {"name": "customer_id", "type": "string"},
                            {"name": "total", "type": "decimal"}]},
            {"name": "Product", "identifiers": ["product_id"],
             "properties": [{"name": "product_id", "type": "string"},
                            {"name": "name", "type": "string"}]},
            {"name": "OrderItem", "identifiers": ["item_id"],
             "properties": [{"name": "item_id", "type": "string"},
                            {"name": "order_id", "type": "string"},
                            {"name": "product_id", "type": "string"},
                            {"name": "quantity", "type": "integer"}]}
        ],
        "relationships": [
            {"name": "placed_by", "from": "Order", "to": "Customer",
             "joinKeys": [["customer_id", "customer_id"]], "cardinality": "many_to_one"},
            {"name": "contains", "from": "OrderItem", "to": "Order",
             "joinKeys": [["order_id", "order_id"]], "cardinality": "many_to_one"}
        ],
        "metrics": [
            {"name": "TotalRevenue", "expression": "SUM(total)",
             "grain": ["Order"], "type": "sum"},
            {"name": "OrderCount", "expression": "COUNT(order_id)",
             "grain": ["Order"], "type": "count"}
        ],
        "dimensions": [],
        "targetMapping": {"database": "RETAIL_DB", "schema": "PUBLIC",
                          "tableMappings": {"Customer": "customers", "Order": "orders",
                                            "Product": "products", "OrderItem": "order_items"}}
    }"#;

    fn source() -> CompileSource {
        CompileSource {
            ontology_name: "retail".into(),
            version_number: 1,
            content_hash: "h1".into(),
        }
    }

    fn fixed_time() -> DateTime<Utc> {
        chrono::DateTime::parse_from_rfc3339("2026-01-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_single_bundle_layout() {
        let ir = normalize::process(RETAIL).unwrap().ir;
        let bundle = compile(
            &ir,
            &source(),
            &CompileOptions::single("retail_view", fixed_time()),
        )
        .unwrap();
        for path in [
            bundle::SEMANTIC_MODEL_FILE,
            bundle::VERIFY_FILE,
            bundle::DEPLOY_FILE,
            bundle::ROLLBACK_FILE,
            bundle::INSTRUCTIONS_FILE,
            bundle::ROLLBACK_DOC_FILE,
            bundle::METADATA_FILE,
        ] {
            assert!(bundle.has_file(path), "missing {path}");
        }
        let yaml = &bundle.file(bundle::SEMANTIC_MODEL_FILE).unwrap().content;
        assert!(yaml.matches("physical_table:").count() == 4);
        assert!(yaml.matches("join_keys:").count() == 2);
        let verify = &bundle.file(bundle::VERIFY_FILE).unwrap().content;
        assert!(verify.contains("verify_only => TRUE"));
    }

    #[test]
    fn test_compile_deterministic() {
        let ir = normalize::process(RETAIL).unwrap().ir;
        let opts = CompileOptions::single("retail_view", fixed_time());
        let a = compile(&ir, &source(), &opts).unwrap();
        let b = compile(&ir, &source(), &opts).unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_compile_hash_stable_across_timestamps() {
        let ir = normalize::process(RETAIL).unwrap().ir;
        let a = compile(&ir, &source(), &CompileOptions::single("retail_view", fixed_time())).unwrap();
        let later = fixed_time() + chrono::Duration::hours(3);
        let b = compile(&ir, &source(), &CompileOptions::single("retail_view", later)).unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_missing_target_fails() {
        let mut value: serde_json::Value = serde_json::from_str(RETAIL).unwrap();
        value.as_object_mut().unwrap().remove("targetMapping");
        let ir = normalize::process(&value.to_string()).unwrap().ir;
        let err = compile(
            &ir,
            &source(),
            &CompileOptions::single("retail_view", fixed_time()),
        )
        .unwrap_err();
        assert_eq!(err.code(), "COMPILE_FAILED");
    }

    #[test]
    fn test_promotion_bundle_layout() {
        let ir = normalize::process(RETAIL).unwrap().ir;
        let mut opts = CompileOptions::single("retail_view", fixed_time());
        opts.environments = vec![
            EnvironmentTarget {
                name: "dev".into(),
                database: "DEV_DB".into(),
                schema: "PUBLIC".into(),
                view_name: "dev_retail_view".into(),
            },
            EnvironmentTarget {
                name: "prod".into(),
                database: "PROD_DB".into(),
                schema: "PUBLIC".into(),
                view_name: "prod_retail_view".into(),
            },
        ];
        let bundle = compile(&ir, &source(), &opts).unwrap();
        assert!(bundle.has_file("semantic_model.yaml"));
        assert!(bundle.has_file("dev/verify.sql"));
        assert!(bundle.has_file("dev/deploy.sql"));
        assert!(bundle.has_file("dev/rollback.sql"));
        assert!(bundle.has_file("prod/deploy.sql"));
        // Root-level single-env scripts are absent in promotion bundles
        assert!(!bundle.has_file("verify.sql"));
        let prod_deploy = &bundle.file("prod/deploy.sql").unwrap().content;
        assert!(prod_deploy.contains("'PROD_DB.PUBLIC.prod_retail_view'"));
        let meta = bundle.metadata().unwrap();
        assert_eq!(meta.environments, vec!["dev".to_string(), "prod".to_string()]);
    }
}
