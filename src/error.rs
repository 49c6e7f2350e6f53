use serde::Serialize;
use thiserror::Error;

/// Failures raised while loading or reading the schema registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Schema document {origin} rejected: {cause}")]
    SchemaLoad { origin: String, cause: String },

    #[error("Schema source unreadable: {cause}")]
    SourceUnreadable { cause: String },

    #[error("Snapshot rejected: {cause}")]
    SnapshotRejected { cause: String },

    #[error("Schema registry has not completed an initial load")]
    Unavailable,
}

/// The request cannot be turned into SQL without guessing.
#[derive(Debug, Error, PartialEq)]
pub enum GenerationError {
    #[error("No tables match the request")]
    NoTables,

    #[error("Table {table} has no usable date column")]
    NoDateColumn { table: String },

    #[error("No query template resolvable for query type {query_type:?}")]
    NoTemplate { query_type: Option<String> },

    #[error("No relationship path from {from} to {to}")]
    NoJoinPath { from: String, to: String },

    #[error("Template {template} requires metrics but none could be resolved")]
    NoMetrics { template: String },

    #[error("Template {template} left placeholder {{{placeholder}}} unsubstituted")]
    UnresolvedPlaceholder { template: String, placeholder: String },

    #[error("Platforms requested but template {template} cannot filter {tables:?} by platform")]
    PlatformFilterUnavailable { template: String, tables: Vec<String> },
}

/// Why a query type cannot be served for a set of platforms.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SupportError {
    #[error("Query type '{0}' not supported")]
    UnknownQueryType(String),

    #[error("Invalid platforms: {}", .0.join(", "))]
    InvalidPlatforms(Vec<String>),

    #[error("No tables available for {0} queries")]
    NoTables(String),
}

/// Errors from the execution backend collaborator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    #[error("Backend call {operation} timed out after {attempts} attempt(s)")]
    Timeout { operation: String, attempts: u32 },

    #[error("Backend call {operation} failed: {cause}")]
    Failed { operation: String, cause: String },
}

impl BackendError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BackendError::Timeout { .. })
    }
}

/// Outcome of a failed validation chain. Only the first failing step is reported.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Query rejected by security rule {rule}")]
    SecurityViolation { rule: &'static str },

    #[error("{reason}")]
    Failed { reason: String },

    #[error("Backend timed out during {operation}")]
    BackendTimeout { operation: String },

    /// The cause is backend text and stays out of non-verbose responses
    #[error("Backend rejected {operation}: {cause}")]
    BackendRejected { operation: String, cause: String },
}

impl ValidationError {
    pub fn failed(reason: impl Into<String>) -> Self {
        ValidationError::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_security_violation(&self) -> bool {
        matches!(self, ValidationError::SecurityViolation { .. })
    }
}

impl From<BackendError> for ValidationError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Timeout { operation, .. } => ValidationError::BackendTimeout { operation },
            BackendError::Failed { operation, cause } => {
                ValidationError::BackendRejected { operation, cause }
            }
        }
    }
}

/// Errors surfaced at the request boundary.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Unknown data sources requested: {}", .0.join(", "))]
    InvalidPlatforms(Vec<String>),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl QueryError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QueryError::Validation(ValidationError::BackendTimeout { .. })
                | QueryError::Registry(RegistryError::Unavailable)
        )
    }

    /// Render the error for a caller. Internal detail is only attached when
    /// `verbose` is set, and security violations never carry the matched text.
    pub fn to_response(&self, verbose: bool) -> ErrorResponse {
        let (error, message) = match self {
            QueryError::Registry(RegistryError::Unavailable) => (
                "registry_unavailable",
                "Schema metadata is still loading, try again shortly".to_string(),
            ),
            QueryError::Registry(_) => (
                "registry_error",
                "Schema metadata could not be loaded".to_string(),
            ),
            QueryError::Generation(_) => (
                "invalid_request",
                "The request could not be mapped to a query over the available data".to_string(),
            ),
            QueryError::Validation(ValidationError::SecurityViolation { .. }) => (
                "security_violation",
                "The query was rejected by the security policy".to_string(),
            ),
            QueryError::Validation(ValidationError::Failed { reason }) => {
                ("validation_failed", reason.clone())
            }
            QueryError::Validation(ValidationError::BackendTimeout { .. }) => (
                "backend_timeout",
                "The query backend did not respond in time".to_string(),
            ),
            QueryError::Validation(ValidationError::BackendRejected { .. }) => (
                "backend_rejected",
                "The query backend rejected the statement".to_string(),
            ),
            QueryError::InvalidPlatforms(_) => ("invalid_platforms", self.to_string()),
        };

        ErrorResponse {
            error: error.to_string(),
            message,
            retryable: self.is_retryable(),
            detail: if verbose { Some(self.to_string()) } else { None },
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
