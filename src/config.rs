use crate::backend::{BigQuerySettings, RetryPolicy};
use crate::registry::DocumentSource;
use crate::sql::{GeneratorSettings, ValidatorSettings};
use anyhow::Context;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub schema_dir: PathBuf,
    pub schema_archive: Option<PathBuf>,
    pub available_platforms: Vec<String>,
    pub refresh_interval: Duration,
    pub max_bytes_processed: u64,
    pub project_id: String,
    pub dataset: String,
    pub location: Option<String>,
    /// Service account key JSON. Absent means the offline backend is used.
    pub service_key: Option<String>,
    pub backend_timeout: Duration,
    pub backend_max_retries: u32,
    pub backend_retry_base: Duration,
    pub default_window_days: i64,
    pub verbose_errors: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let schema_dir = env::var("SCHEMA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./knowledge_base/schemas"));

        let schema_archive = env::var("SCHEMA_ARCHIVE").ok().map(PathBuf::from);

        let available_platforms = parse_list(
            &env::var("AVAILABLE_PLATFORMS").unwrap_or_else(|_| "shopify,amazon,ebay".to_string()),
        );

        let refresh_interval_secs: u64 = env::var("SCHEMA_REFRESH_INTERVAL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .unwrap_or(3600);

        let max_bytes_processed: u64 = env::var("MAX_BYTES_PROCESSED")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10 * 1024 * 1024 * 1024);

        let project_id = env::var("PROJECT_ID").unwrap_or_else(|_| "project".to_string());
        let dataset = env::var("BIGQUERY_DATASET").unwrap_or_else(|_| "commerce".to_string());
        let location = env::var("BIGQUERY_LOCATION").ok().filter(|l| !l.is_empty());

        let service_key = match env::var("BIGQUERY_SERVICE_KEY") {
            Ok(value) if !value.trim().is_empty() => Some(load_service_key(&value)?),
            _ => None,
        };

        let backend_timeout_secs: u64 = env::var("BACKEND_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let backend_max_retries: u32 = env::var("BACKEND_MAX_RETRIES")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .unwrap_or(3);

        let backend_retry_base_ms: u64 = env::var("BACKEND_RETRY_BASE_MS")
            .unwrap_or_else(|_| "200".to_string())
            .parse()
            .unwrap_or(200);

        let default_window_days: i64 = env::var("DEFAULT_WINDOW_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let verbose_errors = env::var("VERBOSE_ERRORS")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        Ok(Config {
            schema_dir,
            schema_archive,
            available_platforms,
            refresh_interval: Duration::from_secs(refresh_interval_secs),
            max_bytes_processed,
            project_id,
            dataset,
            location,
            service_key,
            backend_timeout: Duration::from_secs(backend_timeout_secs),
            backend_max_retries: backend_max_retries.max(1),
            backend_retry_base: Duration::from_millis(backend_retry_base_ms),
            default_window_days: default_window_days.max(1),
            verbose_errors,
        })
    }

    /// The archive wins over the directory when both are set
    pub fn document_source(&self) -> DocumentSource {
        match &self.schema_archive {
            Some(archive) => DocumentSource::Archive(archive.clone()),
            None => DocumentSource::Directory(self.schema_dir.clone()),
        }
    }

    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            project_id: self.project_id.clone(),
            dataset: self.dataset.clone(),
            default_window_days: self.default_window_days,
        }
    }

    pub fn validator_settings(&self) -> ValidatorSettings {
        ValidatorSettings {
            max_bytes_processed: self.max_bytes_processed,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.backend_max_retries,
            timeout: self.backend_timeout,
            base_delay: self.backend_retry_base,
            ..RetryPolicy::default()
        }
    }

    pub fn bigquery_settings(&self) -> BigQuerySettings {
        BigQuerySettings {
            project_id: self.project_id.clone(),
            dataset: self.dataset.clone(),
            location: self.location.clone(),
        }
    }
}

/// Inline JSON, or a path to a key file
fn load_service_key(value: &str) -> anyhow::Result<String> {
    let trimmed = value.trim();
    if trimmed.starts_with('{') {
        return Ok(trimmed.to_string());
    }
    std::fs::read_to_string(trimmed)
        .with_context(|| format!("Failed to read BIGQUERY_SERVICE_KEY file {}", trimmed))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
