//! Error types for route decoration and dependency resolution

use crate::settings::ConfigError;
use http::StatusCode;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// One entry of a [`ValidationError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    /// Where the value was expected, e.g. `["header", "X-Token"]`
    pub loc: Vec<String>,
    /// Human-readable message
    pub msg: String,
}

/// A request value was missing or could not be coerced.
///
/// Raised by custom-field markers and surfaced to the router as a 422.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    errors: Vec<ErrorDetail>,
}

impl ValidationError {
    /// Create an error with a single entry.
    pub fn new<L, S>(loc: L, msg: impl Into<String>) -> Self
    where
        L: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            errors: vec![ErrorDetail {
                loc: loc.into_iter().map(Into::into).collect(),
                msg: msg.into(),
            }],
        }
    }

    /// Append the entries of another error.
    pub fn merge(mut self, other: ValidationError) -> Self {
        self.errors.extend(other.errors);
        self
    }

    /// All entries.
    pub fn errors(&self) -> &[ErrorDetail] {
        &self.errors
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.errors.iter().map(|e| e.msg.as_str()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Errors that can occur while decorating routes or resolving dependencies
#[derive(Error, Debug)]
pub enum DiError {
    /// A custom-field extractor rejected the request
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A provider or handler asked for a specific HTTP failure
    #[error("HTTP {status}: {detail}")]
    Http { status: StatusCode, detail: String },

    /// A provider failed while producing its value
    #[error("{0}")]
    Failed(String),

    /// A plain parameter had neither a supplied value nor a default
    #[error("Missing argument `{name}` for {provider}")]
    MissingArgument { provider: String, name: String },

    /// An argument was present but held a different type
    #[error("Type mismatch for `{name}`: expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    /// An auto-injected value (app, settings, state) is not available
    #[error("No {kind} available to inject into `{name}`")]
    MissingContext { kind: &'static str, name: String },

    /// Value was not found in the application state
    #[error("State value not found: {type_name}")]
    NotFound { type_name: &'static str },

    /// The dependency graph references itself
    #[error("Circular dependency detected: {chain}")]
    CircularDependency { chain: String },

    /// The dependency graph is deeper than the configured limit
    #[error("Dependency chain exceeds maximum depth of {max} at {provider}")]
    DepthExceeded { provider: String, max: usize },

    /// A synchronous route depends on an async provider
    #[error("Synchronous route {route} cannot use async dependency {provider}")]
    AsyncDependencyInSyncRoute { route: String, provider: String },

    /// A blocking call was made on an async route
    #[error("Route {route} is async and must be awaited")]
    AsyncHandler { route: String },

    /// The handler cannot be registered as a route
    #[error("Invalid handler {name}: {reason}")]
    InvalidHandler { name: String, reason: String },

    /// No route registered for the method and path
    #[error("No route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// The application owning a route was dropped
    #[error("Application has been dropped")]
    AppDropped,

    /// The request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Settings could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Internal error
    #[error("Internal DI error: {0}")]
    Internal(String),
}

impl DiError {
    /// Create a provider failure
    #[inline]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    /// Create an HTTP error with an explicit status code.
    ///
    /// Invalid codes fall back to 500.
    pub fn http(status: u16, detail: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            detail: detail.into(),
        }
    }

    /// Create a NotFound error for a type
    #[inline]
    pub fn not_found<T: 'static>() -> Self {
        Self::NotFound {
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Status code the router should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Http { status, .. } => *status,
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for errors caused by how routes or providers were declared.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::CircularDependency { .. }
                | Self::DepthExceeded { .. }
                | Self::AsyncDependencyInSyncRoute { .. }
                | Self::InvalidHandler { .. }
                | Self::TypeMismatch { .. }
        )
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;
