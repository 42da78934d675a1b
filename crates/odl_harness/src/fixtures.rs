//! Shared fixture documents: the retail ontology in three evolutions, plus
//! a regression question set.

/// Version 1: four objects, three relationships, two metrics.
pub const RETAIL_ODL_V1: &str = r#"{
    "version": "1.0",
    "name": "retail",
    "description": "Retail order analytics",
    "objects": [
        {"name": "Customer", "identifiers": ["customer_id"],
         "properties": [
            {"name": "customer_id", "type": "string", "nullable": false, "required": true},
            {"name": "email", "type": "string"},
            {"name": "region", "type": "string"}]},
        {"name": "Order", "identifiers": ["order_id"],
         "properties": [
            {"name": "order_id", "type": "string", "nullable": false, "required": true},
            {"name": "customer_id", "type": "string"},
            {"name": "ordered_at", "type": "timestamp"},
            {"name": "total", "type": "decimal"}]},
        {"name": "Product", "identifiers": ["product_id"],
         "properties": [
            {"name": "product_id", "type": "string", "nullable": false, "required": true},
            {"name": "name", "type": "string"},
            {"name": "unit_price", "type": "decimal"}]},
        {"name": "OrderItem", "identifiers": ["item_id"],
         "properties": [
            {"name": "item_id", "type": "string", "nullable": false, "required": true},
            {"name": "order_id", "type": "string"},
            {"name": "product_id", "type": "string"},
            {"name": "quantity", "type": "integer"}]}
    ],
    "relationships": [
        {"name": "placed_by", "from": "Order", "to": "Customer",
         "joinKeys": [["customer_id", "customer_id"]], "cardinality": "many_to_one"},
        {"name": "contains", "from": "OrderItem", "to": "Order",
         "joinKeys": [["order_id", "order_id"]], "cardinality": "many_to_one"},
        {"name": "includes", "from": "OrderItem", "to": "Product",
         "joinKeys": [["product_id", "product_id"]], "cardinality": "many_to_one"}
    ],
    "metrics": [
        {"name": "TotalRevenue", "expression": "SUM(total)",
         "grain": ["Order"], "type": "sum", "format": "$#,##0.00"},
        {"name": "OrderCount", "expression": "COUNT(order_id)",
         "grain": ["Order"], "type": "count"}
    ],
    "dimensions": [
        {"name": "CustomerRegion", "sourceProperty": "Customer.region"}
    ],
    "targetMapping": {
        "database": "RETAIL_DB", "schema": "PUBLIC",
        "tableMappings": {"Customer": "customers", "Order": "orders",
                          "Product": "products", "OrderItem": "order_items"}
    }
}"#;

/// Version 2: adds nullable `Customer.phone` (non-breaking evolution).
pub fn retail_odl_v2() -> String {
    RETAIL_ODL_V1.replace(
        r#"{"name": "email", "type": "string"},"#,
        r#"{"name": "email", "type": "string"},
            {"name": "phone", "type": "string", "nullable": true},"#,
    )
}

/// Version 3: replaces `Customer.email` with `Customer.contact_email`
/// (breaking removal + non-breaking addition; the rename heuristic refuses).
pub fn retail_odl_v3() -> String {
    RETAIL_ODL_V1.replace(
        r#"{"name": "email", "type": "string"},"#,
        r#"{"name": "contact_email", "type": "string"},"#,
    )
}

/// Question set exercising tables, SQL patterns, and answer snippets.
pub const RETAIL_QUESTIONS: &str = r#"{
    "questions": [
        {"question": "How many orders were placed?",
         "expected_tables": ["orders"],
         "expected_sql_patterns": ["COUNT"]},
        {"question": "What is the total revenue?",
         "expected_tables": ["orders"],
         "expected_answer_snippet": "revenue"}
    ]
}"#;

/// Catalog columns matching `RETAIL_ODL_V1` for the mock warehouse.
pub const RETAIL_CATALOG: &[(&str, &[(&str, &str)])] = &[
    (
        "customers",
        &[
            ("customer_id", "VARCHAR"),
            ("email", "VARCHAR"),
            ("region", "VARCHAR"),
        ],
    ),
    (
        "orders",
        &[
            ("order_id", "VARCHAR"),
            ("customer_id", "VARCHAR"),
            ("ordered_at", "TIMESTAMP_NTZ"),
            ("total", "NUMBER"),
        ],
    ),
    (
        "products",
        &[
            ("product_id", "VARCHAR"),
            ("name", "VARCHAR"),
            ("unit_price", "NUMBER"),
        ],
    ),
    (
        "order_items",
        &[
            ("item_id", "VARCHAR"),
            ("order_id", "VARCHAR"),
            ("product_id", "VARCHAR"),
            ("quantity", "NUMBER"),
        ],
    ),
];
