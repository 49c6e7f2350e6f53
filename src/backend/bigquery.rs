use crate::backend::{BackendColumn, ExecutionBackend, TableRef};
use crate::error::BackendError;
use crate::sql::{ParamMap, ParamValue};
use async_trait::async_trait;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::model::{query_parameter, query_parameter_type, query_parameter_value};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct BigQuerySettings {
    pub project_id: String,
    pub dataset: String,
    pub location: Option<String>,
}

/// Backend over the BigQuery REST API
pub struct BigQueryBackend {
    client: gcp_bigquery_client::Client,
    settings: BigQuerySettings,
}

impl BigQueryBackend {
    pub async fn from_service_account_json(
        service_key_json: &str,
        settings: BigQuerySettings,
    ) -> anyhow::Result<Self> {
        let service_account_key = yup_oauth2::parse_service_account_key(service_key_json)?;
        let client =
            gcp_bigquery_client::Client::from_service_account_key(service_account_key, true).await?;

        info!(
            "BigQuery backend ready for {}.{}",
            settings.project_id, settings.dataset
        );

        Ok(Self { client, settings })
    }

    fn resolve<'a>(&'a self, table: &'a TableRef) -> (&'a str, &'a str, &'a str) {
        (
            table.project.as_deref().unwrap_or(&self.settings.project_id),
            table.dataset.as_deref().unwrap_or(&self.settings.dataset),
            &table.table,
        )
    }
}

fn failed(operation: &str, e: impl std::fmt::Display) -> BackendError {
    BackendError::Failed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

fn is_not_found(message: &str) -> bool {
    message.contains("404") || message.contains("notFound") || message.contains("Not found")
}

#[async_trait]
impl ExecutionBackend for BigQueryBackend {
    async fn table_exists(&self, table: &TableRef) -> Result<bool, BackendError> {
        let (project, dataset, table_id) = self.resolve(table);

        match self.client.table().get(project, dataset, table_id, None).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e.to_string()) => {
                debug!("Table {}.{}.{} not found", project, dataset, table_id);
                Ok(false)
            }
            Err(e) => Err(failed("table_exists", e)),
        }
    }

    async fn get_table_schema(&self, table: &TableRef) -> Result<Vec<BackendColumn>, BackendError> {
        let (project, dataset, table_id) = self.resolve(table);

        let table = self
            .client
            .table()
            .get(project, dataset, table_id, None)
            .await
            .map_err(|e| failed("get_table_schema", e))?;

        let fields = table.schema.fields.unwrap_or_default();

        Ok(fields
            .into_iter()
            .map(|field| BackendColumn {
                data_type: match serde_json::to_value(&field.r#type) {
                    Ok(serde_json::Value::String(s)) => s,
                    _ => "UNKNOWN".to_string(),
                },
                name: field.name,
                mode: field.mode,
                description: field.description,
            })
            .collect())
    }

    async fn dry_run(&self, sql: &str, params: &ParamMap) -> Result<u64, BackendError> {
        let mut request = QueryRequest::new(sql);
        request.dry_run = Some(true);
        request.location = self.settings.location.clone();
        if !params.is_empty() {
            request.parameter_mode = Some("NAMED".to_string());
            request.query_parameters = Some(
                params
                    .iter()
                    .map(|(name, value)| query_parameter::QueryParameter {
                        name: Some(name.clone()),
                        parameter_type: Some(parameter_type(value)),
                        parameter_value: Some(parameter_value(value)),
                    })
                    .collect(),
            );
        }

        let result = self
            .client
            .job()
            .query(&self.settings.project_id, request)
            .await
            .map_err(|e| failed("dry_run", e))?;

        let bytes = result
            .query_response()
            .total_bytes_processed
            .as_deref()
            .and_then(|b| b.parse::<u64>().ok())
            .unwrap_or(0);

        debug!("Dry run estimated {} bytes", bytes);
        Ok(bytes)
    }
}

fn parameter_type(value: &ParamValue) -> query_parameter_type::QueryParameterType {
    match value {
        ParamValue::Array(items) => query_parameter_type::QueryParameterType {
            array_type: Some(Box::new(query_parameter_type::QueryParameterType {
                array_type: None,
                struct_types: None,
                r#type: ParamValue::element_type(items).to_string(),
            })),
            struct_types: None,
            r#type: "ARRAY".to_string(),
        },
        scalar => query_parameter_type::QueryParameterType {
            array_type: None,
            struct_types: None,
            r#type: scalar.scalar_type().to_string(),
        },
    }
}

fn parameter_value(value: &ParamValue) -> query_parameter_value::QueryParameterValue {
    match value {
        ParamValue::Array(items) => query_parameter_value::QueryParameterValue {
            array_values: Some(items.iter().map(parameter_value).collect()),
            struct_values: None,
            value: None,
        },
        scalar => query_parameter_value::QueryParameterValue {
            array_values: None,
            struct_values: None,
            value: scalar.scalar_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_parameter_mapping() {
        let value = ParamValue::Array(vec![
            ParamValue::String("shopify".to_string()),
            ParamValue::String("amazon".to_string()),
        ]);

        let ty = parameter_type(&value);
        assert_eq!(ty.r#type, "ARRAY");
        assert_eq!(ty.array_type.unwrap().r#type, "STRING");

        let val = parameter_value(&value);
        let items = val.array_values.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].value.as_deref(), Some("shopify"));
    }

    #[test]
    fn test_scalar_parameter_mapping() {
        let ty = parameter_type(&ParamValue::Int(7));
        assert_eq!(ty.r#type, "INT64");
        assert!(ty.array_type.is_none());
        assert_eq!(parameter_value(&ParamValue::Bool(true)).value.as_deref(), Some("true"));
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found("Response error (error: 404 Not found: Table p:d.t)"));
        assert!(!is_not_found("403 Access Denied"));
    }
}
