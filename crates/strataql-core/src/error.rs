//! Error types for the `StrataQL` core.
//!
//! # Error Hierarchy
//!
//! ```text
//! StrataQLError
//! ├── Config            - Invalid client configuration
//! ├── Parse             - GraphQL parsing errors
//! ├── Validation        - Schema/input validation errors
//! ├── UnknownField      - Field missing from the schema
//! ├── UnknownType       - Type missing from the schema
//! ├── TooManyOperations - Multi-operation documents are rejected
//! ├── Executor          - External executor / transport failures
//! ├── Subscriber        - Subscription transport failures
//! ├── Store             - Cache tier read/write failures
//! ├── Cancelled         - Request abandoned before completion
//! └── Internal          - Unexpected internal errors
//! ```
//!
//! The enum is `Clone` on purpose: when several coalesced callers wait on one
//! in-flight fetch, the same rejection must be delivered to every one of them.

use thiserror::Error;

/// Result type alias for `StrataQL` operations.
pub type Result<T> = std::result::Result<T, StrataQLError>;

/// Main error type for `StrataQL` operations.
#[derive(Error, Debug, Clone)]
pub enum StrataQLError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid client configuration.
    ///
    /// Returned by `create` when the supplied options are malformed, e.g.
    /// neither `schema` nor `introspection` was provided.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration problem.
        message: String,
    },

    // ========================================================================
    // GraphQL Errors
    // ========================================================================
    /// GraphQL parsing error.
    ///
    /// Returned when the GraphQL query string cannot be parsed.
    #[error("Parse error: {message}")]
    Parse {
        /// Error message describing the parse failure, position included.
        message: String,
    },

    /// GraphQL validation error.
    ///
    /// Returned when a query is syntactically valid but semantically invalid.
    #[error("Validation error: {message}")]
    Validation {
        /// Error message describing the validation failure.
        message: String,
        /// Path to the field with the error (e.g., "query.user.posts").
        path:    Option<String>,
    },

    /// Unknown field error.
    ///
    /// Returned when a query references a field that doesn't exist in the schema.
    #[error("Unknown field '{field}' on type '{type_name}'")]
    UnknownField {
        /// The field name that was not found.
        field:     String,
        /// The type on which the field was queried.
        type_name: String,
    },

    /// Unknown type error.
    ///
    /// Returned when a query references a type that doesn't exist in the schema.
    #[error("Unknown type '{type_name}'")]
    UnknownType {
        /// The type name that was not found.
        type_name: String,
    },

    /// Multi-operation document error.
    ///
    /// Documents carrying more than one top-level operation are rejected; the
    /// cache pipeline is defined over single-operation documents only.
    #[error("Expected exactly one operation, document defines {count}")]
    TooManyOperations {
        /// Number of operations found in the document.
        count: usize,
    },

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// External executor error.
    ///
    /// Wraps whatever the transport or execute layer returned, including a
    /// GraphQL `errors` array delivered without data.
    #[error("Executor error: {message}")]
    Executor {
        /// Error message from the executor.
        message: String,
        /// The GraphQL `errors` payload, when the executor returned one.
        errors:  Option<serde_json::Value>,
    },

    /// Subscription transport error.
    #[error("Subscriber error: {message}")]
    Subscriber {
        /// Error message from the subscriber.
        message: String,
    },

    /// Cache tier store error.
    ///
    /// Read errors degrade to cache misses before ever reaching callers; this
    /// surfaces through the cache promise for write failures and through
    /// `import` for malformed snapshots.
    #[error("Store error in '{tier}' tier: {message}")]
    Store {
        /// Which tier failed ("responses", "queryPaths", "dataEntities").
        tier:    String,
        /// Error message.
        message: String,
    },

    /// Request abandoned before completion.
    ///
    /// Returned to coalesced waiters whose active request vanished without
    /// delivering an outcome.
    #[error("Request {request_id} cancelled: {reason}")]
    Cancelled {
        /// Opaque request id for tracking/logging.
        request_id: String,
        /// Reason for cancellation.
        reason:     String,
    },

    // ========================================================================
    // Internal Errors
    // ========================================================================
    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl StrataQLError {
    /// Short machine-readable code for the error kind.
    ///
    /// Used as the `code` field of emitted `error` events.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "CONFIG",
            Self::Parse { .. } => "PARSE",
            Self::Validation { .. } => "VALIDATION",
            Self::UnknownField { .. } => "UNKNOWN_FIELD",
            Self::UnknownType { .. } => "UNKNOWN_TYPE",
            Self::TooManyOperations { .. } => "TOO_MANY_OPERATIONS",
            Self::Executor { .. } => "EXECUTOR",
            Self::Subscriber { .. } => "SUBSCRIBER",
            Self::Store { .. } => "STORE",
            Self::Cancelled { .. } => "CANCELLED",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    /// Whether the error left cache state untouched.
    ///
    /// Parse, validation and executor failures never mutate the tiers.
    #[must_use]
    pub fn is_pre_resolve(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. }
                | Self::Validation { .. }
                | Self::UnknownField { .. }
                | Self::UnknownType { .. }
                | Self::TooManyOperations { .. }
                | Self::Executor { .. }
        )
    }
}
