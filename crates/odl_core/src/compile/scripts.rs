//! SQL script generation for verify / deploy / rollback / export.
//!
//! The YAML payload is embedded as a dollar-quoted string literal, matching
//! the warehouse's `SYSTEM$CREATE_SEMANTIC_VIEW_FROM_YAML` procedure call
//! convention.

/// verify.sql: verify-only call, targets `database.schema`, creates nothing.
pub fn verify_sql(database: &str, schema: &str, yaml: &str) -> String {
    format!(
        "-- Verify semantic model (no view is created)\n\
         -- Run this before deploy.sql to validate the model.\n\
         \n\
         CALL SYSTEM$CREATE_SEMANTIC_VIEW_FROM_YAML(\n\
         \x20\x20'{database}.{schema}',\n\
         \x20\x20$${yaml}$$,\n\
         \x20\x20verify_only => TRUE\n\
         );\n"
    )
}

/// deploy.sql: creates (or replaces) the semantic view.
pub fn deploy_sql(database: &str, schema: &str, view_name: &str, yaml: &str) -> String {
    format!(
        "-- Deploy semantic view\n\
         -- Run verify.sql first.\n\
         \n\
         CALL SYSTEM$CREATE_SEMANTIC_VIEW_FROM_YAML(\n\
         \x20\x20'{database}.{schema}.{view_name}',\n\
         \x20\x20$${yaml}$$,\n\
         \x20\x20verify_only => FALSE\n\
         );\n\
         \n\
         -- Confirm deployment\n\
         SELECT * FROM {database}.{schema}.INFORMATION_SCHEMA.VIEWS\n\
         WHERE TABLE_SCHEMA = '{schema}' AND TABLE_NAME = '{view_name}';\n"
    )
}

/// rollback.sql: drop, then re-create from the captured model when present.
pub fn rollback_sql(
    database: &str,
    schema: &str,
    view_name: &str,
    rollback_yaml: Option<&str>,
) -> String {
    let mut sql = format!(
        "-- Rollback semantic view\n\
         \n\
         DROP SEMANTIC VIEW IF EXISTS {database}.{schema}.{view_name};\n"
    );
    if let Some(yaml) = rollback_yaml {
        sql.push_str(&format!(
            "\n\
             -- Restore the previous definition (captured pre-deploy in\n\
             -- rollback_semantic_model.yaml)\n\
             CALL SYSTEM$CREATE_SEMANTIC_VIEW_FROM_YAML(\n\
             \x20\x20'{database}.{schema}.{view_name}',\n\
             \x20\x20$${yaml}$$,\n\
             \x20\x20verify_only => FALSE\n\
             );\n"
        ));
    }
    sql
}

/// Export the live YAML definition of an existing semantic view.
pub fn export_sql(view_fqn: &str) -> String {
    format!(
        "-- Export semantic view YAML\n\
         \n\
         SELECT SYSTEM$READ_YAML_FROM_SEMANTIC_VIEW('{view_fqn}') AS semantic_model_yaml;\n"
    )
}
