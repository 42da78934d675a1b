//! Semantic-model YAML emission.
//!
//! Output is byte-stable: struct field order fixed, sequences carry the IR's
//! normalized ordering, optional fields omitted when absent. A header comment
//! ties the document back to its source version.

use serde::Serialize;

use crate::error::{OdlError, Result};
use crate::ir::{OntologyIr, PropertyType};

use super::CompileSource;

#[derive(Debug, Serialize)]
pub struct SemanticModelDoc {
    pub semantic_model: SemanticModel,
}

#[derive(Debug, Serialize)]
pub struct SemanticModel {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub logical_tables: Vec<LogicalTable>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<JoinPath>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub facts: Vec<Fact>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<DimensionOut>,
}

#[derive(Debug, Serialize)]
pub struct LogicalTable {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub physical_table: PhysicalTable,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<Column>,
}

#[derive(Debug, Serialize)]
pub struct PhysicalTable {
    pub database: String,
    pub schema: String,
    pub table: String,
}

#[derive(Debug, Serialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub nullable: bool,
}

#[derive(Debug, Serialize)]
pub struct JoinPath {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub from_table: String,
    pub to_table: String,
    pub cardinality: String,
    pub join_type: String,
    pub join_keys: Vec<JoinColumnPair>,
}

#[derive(Debug, Serialize)]
pub struct JoinColumnPair {
    pub from_column: String,
    pub to_column: String,
}

#[derive(Debug, Serialize)]
pub struct Fact {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub expression: String,
    pub grain: Vec<String>,
    pub aggregation_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DimensionOut {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub table: String,
    pub column: String,
    #[serde(rename = "type")]
    pub dimension_type: String,
}

/// Map an ODL property type to the warehouse column type.
pub fn warehouse_type(ty: PropertyType) -> &'static str {
    match ty {
        PropertyType::String => "VARCHAR",
        PropertyType::Number => "NUMBER",
        PropertyType::Integer => "INTEGER",
        PropertyType::Decimal => "DECIMAL",
        PropertyType::Boolean => "BOOLEAN",
        PropertyType::Date => "DATE",
        PropertyType::Timestamp => "TIMESTAMP_NTZ",
        PropertyType::Time => "TIME",
        PropertyType::Array => "ARRAY",
        PropertyType::Object => "OBJECT",
    }
}

fn join_type(cardinality: crate::ir::Cardinality) -> &'static str {
    match cardinality {
        crate::ir::Cardinality::OneToOne => "INNER",
        _ => "LEFT",
    }
}

/// Render the semantic-model YAML for an IR, with the version header comment.
pub fn render(ir: &OntologyIr, source: &CompileSource, database: &str, schema: &str) -> Result<String> {
    let model_name = ir
        .name
        .clone()
        .unwrap_or_else(|| source.ontology_name.clone());

    let logical_tables = ir
        .objects
        .iter()
        .map(|obj| {
            let (obj_db, obj_schema) = ir.location_for(obj);
            LogicalTable {
                name: obj.name.clone(),
                description: obj.description.clone(),
                physical_table: PhysicalTable {
                    database: obj_db.unwrap_or_else(|| database.to_string()),
                    schema: obj_schema.unwrap_or_else(|| schema.to_string()),
                    table: ir.table_for(obj),
                },
                primary_key: obj.identifiers.clone(),
                columns: obj
                    .properties
                    .iter()
                    .map(|p| Column {
                        name: p.name.clone(),
                        column_type: warehouse_type(p.property_type).to_string(),
                        nullable: p.nullable,
                    })
                    .collect(),
            }
        })
        .collect();

    let relationships = ir
        .relationships
        .iter()
        .map(|rel| {
            let from_table = ir
                .object(&rel.from)
                .map(|o| ir.table_for(o))
                .unwrap_or_else(|| rel.from.clone());
            let to_table = ir
                .object(&rel.to)
                .map(|o| ir.table_for(o))
                .unwrap_or_else(|| rel.to.clone());
            JoinPath {
                name: rel.name.clone(),
                description: rel.description.clone(),
                from_table,
                to_table,
                cardinality: rel.cardinality.as_str().to_string(),
                join_type: join_type(rel.cardinality).to_string(),
                join_keys: rel
                    .join_keys
                    .iter()
                    .map(|k| JoinColumnPair {
                        from_column: k.0.clone(),
                        to_column: k.1.clone(),
                    })
                    .collect(),
            }
        })
        .collect();

    let facts = ir
        .metrics
        .iter()
        .map(|m| Fact {
            name: m.name.clone(),
            description: m.description.clone(),
            expression: m.expression.clone(),
            grain: m.grain.clone(),
            aggregation_type: m.metric_type.aggregation_hint().to_string(),
            format: m.format.clone(),
        })
        .collect();

    let dimensions = ir
        .dimensions
        .iter()
        .map(|d| {
            let (obj_name, prop_name) = d.source_parts();
            let table = ir
                .object(obj_name)
                .map(|o| ir.table_for(o))
                .unwrap_or_else(|| obj_name.to_string());
            DimensionOut {
                name: d.name.clone(),
                description: d.description.clone(),
                table,
                column: prop_name.to_string(),
                dimension_type: d.dimension_type.clone(),
            }
        })
        .collect();

    let doc = SemanticModelDoc {
        semantic_model: SemanticModel {
            name: model_name,
            version: ir.version.clone(),
            description: ir.description.clone(),
            logical_tables,
            relationships,
            facts,
            dimensions,
        },
    };

    let body = serde_yaml::to_string(&doc)
        .map_err(|e| OdlError::CompileFailed(format!("YAML emission failed: {e}")))?;

    Ok(format!(
        "# Semantic model compiled from ontology '{}'\n# version: {}\n# content_hash: {}\n{}",
        source.ontology_name, source.version_number, source.content_hash, body
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize;

    fn source() -> CompileSource {
        CompileSource {
            ontology_name: "retail".into(),
            version_number: 1,
            content_hash: "deadbeef".into(),
        }
    }

    const DOC: &str = r#"{
        "version": "1.0",
        "name": "retail",
        "objects": [
            {"name": "Customer", "identifiers": ["customer_id"],
             "properties": [
                {"name": "customer_id", "type": "string", "nullable": false},
                {"name": "email", "type": "string"}]},
            {"name": "OrderItem", "identifiers": ["item_id"],
             "properties": [
                {"name": "item_id", "type": "string"},
                {"name": "quantity", "type": "integer"}]}
        ],
        "relationships": [],
        "metrics": [
            {"name": "ItemCount", "expression": "SUM(quantity)",
             "grain": ["OrderItem"], "type": "sum"}
        ],
        "dimensions": [
            {"name": "CustomerEmail", "sourceProperty": "Customer.email"}
        ],
        "targetMapping": {"database": "RETAIL_DB", "schema": "PUBLIC",
                          "tableMappings": {"Customer": "customers"}}
    }"#;

    #[test]
    fn test_render_header_and_structure() {
        let ir = normalize::process(DOC).unwrap().ir;
        let yaml = render(&ir, &source(), "RETAIL_DB", "PUBLIC").unwrap();
        assert!(yaml.starts_with("# Semantic model compiled from ontology 'retail'\n"));
        assert!(yaml.contains("# version: 1\n"));
        assert!(yaml.contains("# content_hash: deadbeef\n"));
        assert!(yaml.contains("semantic_model:"));
        assert!(yaml.contains("logical_tables:"));
    }

    #[test]
    fn test_table_mapping_and_snake_case_fallback() {
        let ir = normalize::process(DOC).unwrap().ir;
        let yaml = render(&ir, &source(), "RETAIL_DB", "PUBLIC").unwrap();
        // Mapped through tableMappings
        assert!(yaml.contains("table: customers"));
        // No mapping for OrderItem: snake_case fallback
        assert!(yaml.contains("table: order_item"));
    }

    #[test]
    fn test_warehouse_type_map() {
        assert_eq!(warehouse_type(PropertyType::String), "VARCHAR");
        assert_eq!(warehouse_type(PropertyType::Timestamp), "TIMESTAMP_NTZ");
        assert_eq!(warehouse_type(PropertyType::Decimal), "DECIMAL");
        assert_eq!(warehouse_type(PropertyType::Boolean), "BOOLEAN");
    }

    #[test]
    fn test_render_deterministic() {
        let ir = normalize::process(DOC).unwrap().ir;
        let a = render(&ir, &source(), "RETAIL_DB", "PUBLIC").unwrap();
        let b = render(&ir, &source(), "RETAIL_DB", "PUBLIC").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dimension_resolves_to_table_and_column() {
        let ir = normalize::process(DOC).unwrap().ir;
        let yaml = render(&ir, &source(), "RETAIL_DB", "PUBLIC").unwrap();
        assert!(yaml.contains("column: email"));
    }
}
