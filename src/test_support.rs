//! Shared fixtures: a small commerce schema and a scriptable backend.

use crate::backend::{BackendColumn, ExecutionBackend, TableRef};
use crate::error::BackendError;
use crate::registry::{RawDocument, RegistrySnapshot, SourceContents};
use crate::sql::ParamMap;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const ORDERS: &str = r#"
table_name: orders
description: One row per order across every storefront
date_column: order_date
platforms: [shopify, amazon, ebay]
columns:
  - name: order_id
    type: STRING
  - name: order_date
    type: DATE
  - name: customer_id
    type: STRING
  - name: product_id
    type: STRING
  - name: platform
    type: STRING
  - name: total_amount
    type: NUMERIC
    business_term: sales
    description: Order total in store currency
    aggregation_rules: [SUM, AVG]
relationships:
  - table: customers
    type: many_to_one
    keys:
      customer_id: customer_id
  - table: products
    type: many_to_one
    keys:
      product_id: product_id
common_metrics:
  - name: total_sales
    sql_template: SUM(total_amount)
    description: Total sales
  - name: order_count
    sql_template: COUNT(DISTINCT order_id)
    description: Number of orders
  - name: average_order_value
    sql_template: AVG(total_amount)
    description: Average order value
query_templates:
  - name: sales_by_platform
    type: sales
    template: |
      SELECT orders.platform, {metrics}
      FROM {table}
      {joins}
      WHERE {date_condition}
        AND {platform_condition}
      GROUP BY orders.platform
  - name: performance_by_category
    type: performance
    metrics: [total_sales, order_count]
    template: |
      SELECT products.category, {metrics}
      FROM {table}
      {joins}
      WHERE {date_condition}
        AND {platform_condition}
      GROUP BY products.category
  - name: default
    template: |
      SELECT {metrics}
      FROM {table}
      {joins}
      WHERE {date_condition}
        AND {platform_condition}
query_types: [sales, performance]
"#;

pub const CUSTOMERS: &str = r#"
table_name: customers
date_column: signup_date
columns:
  - name: customer_id
    type: STRING
  - name: customer_name
    type: STRING
    business_term: customer name
  - name: email
    type: STRING
  - name: signup_date
    type: DATE
  - name: platform
    type: STRING
  - name: lifetime_value
    type: NUMERIC
common_metrics:
  - name: customer_count
    sql_template: COUNT(DISTINCT customer_id)
    description: Number of customers
query_templates:
  - name: customer_overview
    type: customers
    metrics: [customer_count]
    template: |
      SELECT customers.platform, {metrics}
      FROM {table}
      {joins}
      WHERE {date_condition}
        AND {platform_condition}
      GROUP BY customers.platform
query_types: [customers]
"#;

pub const PRODUCTS: &str = r#"
table_name: products
columns:
  - name: product_id
    type: STRING
  - name: product_name
    type: STRING
  - name: category
    type: STRING
  - name: platform
    type: STRING
  - name: created_at
    type: TIMESTAMP
relationships:
  - table: inventory
    type: one_to_many
    keys:
      product_id: product_id
common_metrics:
  - name: unique_products
    sql_template: COUNT(DISTINCT product_id)
    description: Distinct products
query_types: [inventory, performance]
"#;

pub const INVENTORY: &str = r#"
table_name: inventory
columns:
  - name: product_id
    type: STRING
  - name: quantity
    type: INT64
    business_term: stock level
    aggregation_rules: [SUM]
  - name: reorder_point
    type: INT64
  - name: snapshot_date
    type: DATE
  - name: platform
    type: STRING
common_metrics:
  - name: stock_count
    sql_template: SUM(quantity)
    description: Units in stock
  - name: low_stock
    sql_template: COUNTIF(quantity <= reorder_point)
    description: Products at or below their reorder point
query_templates:
  - name: inventory_levels
    type: inventory
    metrics: [stock_count]
    template: |
      SELECT inventory.platform, {metrics}
      FROM {table}
      {joins}
      WHERE {date_condition}
        AND {platform_condition}
      GROUP BY inventory.platform
query_types: [inventory]
"#;

pub fn fixture_documents() -> Vec<RawDocument> {
    vec![
        RawDocument::yaml("consolidated", "consolidated/orders.yaml", ORDERS),
        RawDocument::yaml("consolidated", "consolidated/customers.yaml", CUSTOMERS),
        RawDocument::yaml("consolidated", "consolidated/products.yaml", PRODUCTS),
        RawDocument::yaml("shopify", "shopify/inventory.yaml", INVENTORY),
    ]
}

pub fn fixture_contents() -> SourceContents {
    SourceContents {
        documents: fixture_documents(),
        unreadable: Vec::new(),
    }
}

pub fn fixture_snapshot() -> RegistrySnapshot {
    RegistrySnapshot::build(fixture_contents())
}

/// Minimal valid document for one table
pub fn table_doc(namespace: &str, table: &str) -> RawDocument {
    let content = format!(
        "table_name: {table}\ncolumns:\n  - name: id\n    type: STRING\n  - name: created_at\n    type: TIMESTAMP\n"
    );
    RawDocument::yaml(namespace, &format!("{}/{}.yaml", namespace, table), &content)
}

/// 2024-03-15 12:00 UTC, a Friday
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
}

pub fn platforms(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Backend whose answers are fixed up front
#[derive(Default)]
pub struct StubBackend {
    pub missing: HashSet<String>,
    pub bytes: u64,
    pub delay: Option<Duration>,
    pub rejection: Option<String>,
    pub exists_calls: AtomicUsize,
    pub dry_run_calls: AtomicUsize,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = bytes;
        self
    }

    pub fn with_missing(mut self, table: &str) -> Self {
        self.missing.insert(table.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_rejection(mut self, cause: &str) -> Self {
        self.rejection = Some(cause.to_string());
        self
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn dry_run_calls(&self) -> usize {
        self.dry_run_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ExecutionBackend for StubBackend {
    async fn table_exists(&self, table: &TableRef) -> Result<bool, BackendError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(!self.missing.contains(&table.table))
    }

    async fn get_table_schema(&self, _table: &TableRef) -> Result<Vec<BackendColumn>, BackendError> {
        self.pause().await;
        Ok(Vec::new())
    }

    async fn dry_run(&self, _sql: &str, _params: &ParamMap) -> Result<u64, BackendError> {
        self.dry_run_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        match &self.rejection {
            Some(cause) => Err(BackendError::Failed {
                operation: "dry_run".to_string(),
                cause: cause.clone(),
            }),
            None => Ok(self.bytes),
        }
    }
}
