//! Request boundary
//!
//! Runs classify → generate → validate against a single registry snapshot and
//! owns the timing and logging around the pipeline. Errors are rendered for
//! callers here and nowhere else.

use crate::error::{ErrorResponse, QueryError};
use crate::registry::SchemaRegistry;
use crate::router::{QueryRouter, TimeContext};
use crate::sql::{ParamMap, SqlGenerator, SqlValidator, TimeWindow};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// One line of input: `{"text": "...", "platforms": ["shopify"]}`
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    #[serde(default)]
    pub platforms: Vec<String>,
}

/// A validated statement ready for the execution backend
#[derive(Debug, Clone, Serialize)]
pub struct QueryPlan {
    pub query_type: String,
    pub sql: String,
    pub params: ParamMap,
    pub tables: Vec<String>,
    pub template: String,
    pub time_window: TimeWindow,
    pub time_context: TimeContext,
    pub fingerprint: String,
    pub elapsed_ms: u64,
}

/// Returned when the request cannot be classified. The caller is expected to
/// ask the user to rephrase rather than run anything.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationalReply {
    pub message: String,
    pub time_context: TimeContext,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutcome {
    Plan(QueryPlan),
    Conversational(ConversationalReply),
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Outcome(QueryOutcome),
    Failure { error: ErrorResponse },
}

pub struct QueryService {
    registry: Arc<SchemaRegistry>,
    router: QueryRouter,
    generator: SqlGenerator,
    validator: SqlValidator,
    verbose_errors: bool,
}

impl QueryService {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        router: QueryRouter,
        generator: SqlGenerator,
        validator: SqlValidator,
        verbose_errors: bool,
    ) -> Self {
        Self {
            registry,
            router,
            generator,
            validator,
            verbose_errors,
        }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub async fn handle(&self, text: &str, platforms: &[String]) -> Result<QueryOutcome, QueryError> {
        let started = Instant::now();
        let snapshot = self.registry.snapshot().await?;

        let (_, invalid) = self.router.validate_platforms(&snapshot, platforms);
        if !invalid.is_empty() {
            return Err(QueryError::InvalidPlatforms(invalid.into_iter().collect()));
        }

        let classification = self.router.classify_query(&snapshot, text);
        let Some(query_type) = classification.query_type else {
            return Ok(QueryOutcome::Conversational(ConversationalReply {
                message: format!(
                    "Could not tell which data the request is about. Try asking about {}.",
                    self.router.query_types().join(", ")
                ),
                time_context: classification.context,
            }));
        };

        let generated = self
            .generator
            .generate_query(&snapshot, text, platforms, Some(&query_type))?;
        let generated_at = started.elapsed();

        self.validator
            .validate(&snapshot, &generated.sql, &generated.params)
            .await?;

        let elapsed = started.elapsed();
        info!(
            "Planned {} query over {:?} in {:?} (generation {:?})",
            query_type, generated.tables, elapsed, generated_at
        );

        Ok(QueryOutcome::Plan(QueryPlan {
            query_type,
            sql: generated.sql,
            params: generated.params,
            tables: generated.tables,
            template: generated.context.template,
            time_window: generated.context.time_window,
            time_context: classification.context,
            fingerprint: snapshot.fingerprint().to_string(),
            elapsed_ms: elapsed.as_millis() as u64,
        }))
    }

    /// Like [`handle`](Self::handle) but never fails: errors become a
    /// caller-safe body.
    pub async fn respond(&self, request: &QueryRequest) -> QueryResponse {
        let started = Instant::now();
        match self.handle(&request.text, &request.platforms).await {
            Ok(outcome) => QueryResponse::Outcome(outcome),
            Err(e) => {
                warn!("Request failed after {:?}: {}", started.elapsed(), e);
                QueryResponse::Failure {
                    error: e.to_response(self.verbose_errors),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RetryPolicy;
    use crate::error::GenerationError;
    use crate::registry::{DocumentSource, RawDocument};
    use crate::sql::{GeneratorSettings, ValidatorSettings};
    use crate::test_support::{fixture_documents, platforms, table_doc, StubBackend};
    use std::time::Duration;

    fn registry(source: DocumentSource) -> Arc<SchemaRegistry> {
        Arc::new(SchemaRegistry::new(
            source,
            platforms(&["shopify", "amazon", "ebay"]),
            Duration::from_secs(3600),
        ))
    }

    fn service(registry: Arc<SchemaRegistry>, backend: StubBackend, verbose: bool) -> QueryService {
        QueryService::new(
            registry,
            QueryRouter::new(),
            SqlGenerator::new(GeneratorSettings::default()),
            SqlValidator::new(
                Arc::new(backend),
                ValidatorSettings {
                    max_bytes_processed: 1_000,
                },
                RetryPolicy::default(),
            ),
            verbose,
        )
    }

    async fn fixture_service(backend: StubBackend) -> QueryService {
        let registry = registry(DocumentSource::Inline(fixture_documents()));
        registry.initialize().await.unwrap();
        service(registry, backend, false)
    }

    #[tokio::test]
    async fn test_plans_sales_query() {
        let service = fixture_service(StubBackend::new().with_bytes(10)).await;
        let outcome = service
            .handle("What were my total sales last month?", &platforms(&["shopify", "amazon"]))
            .await
            .unwrap();

        let QueryOutcome::Plan(plan) = outcome else {
            panic!("expected a plan");
        };
        assert_eq!(plan.query_type, "sales");
        assert_eq!(plan.tables, vec!["orders"]);
        assert_eq!(plan.template, "sales_by_platform");
        assert_eq!(plan.time_window.pattern.as_deref(), Some("last_month"));
        assert_eq!(plan.time_context.time_range.as_deref(), Some("last month"));
        assert!(plan.sql.contains("orders.platform IN UNNEST(@platforms)"));
        assert!(plan.params.contains_key("platforms"));
        assert!(!plan.fingerprint.is_empty());
    }

    #[tokio::test]
    async fn test_unclassified_is_conversational() {
        let service = fixture_service(StubBackend::new()).await;
        let outcome = service.handle("hello there", &[]).await.unwrap();

        let QueryOutcome::Conversational(reply) = outcome else {
            panic!("expected a conversational reply");
        };
        assert!(reply.message.contains("sales, inventory, customers, performance"));
    }

    #[tokio::test]
    async fn test_invalid_platforms_rejected() {
        let service = fixture_service(StubBackend::new()).await;
        let err = service
            .handle("sales last month", &platforms(&["shopify", "etsy"]))
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::InvalidPlatforms(ref p) if p == &vec!["etsy".to_string()]));
    }

    #[tokio::test]
    async fn test_registry_unavailable_before_load() {
        let service = service(
            registry(DocumentSource::Inline(fixture_documents())),
            StubBackend::new(),
            false,
        );
        let response = service
            .respond(&QueryRequest {
                text: "sales".to_string(),
                platforms: Vec::new(),
            })
            .await;

        let QueryResponse::Failure { error } = response else {
            panic!("expected a failure");
        };
        assert_eq!(error.error, "registry_unavailable");
        assert!(error.retryable);
    }

    #[tokio::test]
    async fn test_generation_error_is_caller_safe() {
        let registry = registry(DocumentSource::Inline(vec![table_doc("amazon", "returns")]));
        registry.initialize().await.unwrap();

        let quiet = service(registry.clone(), StubBackend::new(), false);
        let request = QueryRequest {
            text: "sales by platform".to_string(),
            platforms: Vec::new(),
        };
        let QueryResponse::Failure { error } = quiet.respond(&request).await else {
            panic!("expected a failure");
        };
        assert_eq!(error.error, "invalid_request");
        assert!(error.detail.is_none());

        let verbose = service(registry, StubBackend::new(), true);
        let QueryResponse::Failure { error } = verbose.respond(&request).await else {
            panic!("expected a failure");
        };
        assert_eq!(error.detail.as_deref(), Some("No tables match the request"));
    }

    #[tokio::test]
    async fn test_cost_ceiling_surfaces_reason() {
        let service = fixture_service(StubBackend::new().with_bytes(5_000)).await;
        let err = service
            .handle("total sales last month", &platforms(&["shopify"]))
            .await
            .unwrap_err();

        let response = err.to_response(false);
        assert_eq!(response.error, "validation_failed");
        assert!(response.message.contains("5000"));
    }

    #[tokio::test]
    async fn test_requested_platforms_are_never_dropped() {
        let refunds = RawDocument::yaml(
            "shopify",
            "shopify/refunds.yaml",
            r#"
table_name: refunds
columns:
  - {name: refund_date, type: DATE}
  - {name: amount, type: NUMERIC}
common_metrics:
  - {name: refund_total, sql_template: SUM(amount)}
query_templates:
  - name: default
    template: "SELECT {metrics} FROM {table} {joins} WHERE {date_condition} AND {platform_condition}"
query_types: [sales]
"#,
        );
        let registry = registry(DocumentSource::Inline(vec![refunds]));
        registry.initialize().await.unwrap();
        let service = service(registry, StubBackend::new(), false);

        let err = service
            .handle("refund_total sales last month", &platforms(&["shopify"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::Generation(GenerationError::PlatformFilterUnavailable { .. })
        ));

        // Without a platform set the table is queried as a whole
        let outcome = service
            .handle("refund_total sales last month", &[])
            .await
            .unwrap();
        assert!(matches!(outcome, QueryOutcome::Plan(_)));
    }

    #[tokio::test]
    async fn test_backend_rejection_hides_cause() {
        let cause = "Access Denied: project internal-billing-42 user svc@corp.iam";
        let service = fixture_service(StubBackend::new().with_rejection(cause)).await;
        let request = QueryRequest {
            text: "total sales last month".to_string(),
            platforms: platforms(&["shopify"]),
        };

        let QueryResponse::Failure { error } = service.respond(&request).await else {
            panic!("expected a failure");
        };
        assert_eq!(error.error, "backend_rejected");
        assert!(error.detail.is_none());
        let body = serde_json::to_string(&error).unwrap();
        assert!(!body.contains("internal-billing-42"), "{}", body);
    }

    #[tokio::test]
    async fn test_response_json_shape() {
        let service = fixture_service(StubBackend::new()).await;
        let request: QueryRequest =
            serde_json::from_str(r#"{"text": "total sales this month"}"#).unwrap();
        assert!(request.platforms.is_empty());

        let body = serde_json::to_value(service.respond(&request).await).unwrap();
        assert_eq!(body["kind"], "plan");
        assert_eq!(body["query_type"], "sales");
        assert_eq!(body["params"]["platforms"]["type"], "ARRAY<STRING>");

        let body = serde_json::to_value(
            service
                .respond(&QueryRequest {
                    text: "sales".to_string(),
                    platforms: platforms(&["etsy"]),
                })
                .await,
        )
        .unwrap();
        assert_eq!(body["error"]["error"], "invalid_platforms");
    }
}
