//! Error types for the binding layer.

use thiserror::Error;

/// Result type for binding-system operations.
pub type Result<T> = std::result::Result<T, SystemError>;

/// Errors raised while loading static schema data.
///
/// Schema data is authored alongside the native handlers; a failure here is a
/// configuration bug, not a runtime input problem.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The schema JSON did not match the expected shape.
    #[error("malformed schema: {0}")]
    Json(#[from] serde_json::Error),

    /// A parameter declared neither a `type` nor a `$ref`.
    #[error("parameter '{0}' declares neither a type nor a $ref")]
    MissingKind(String),

    /// A parameter declared a type token this layer does not know.
    #[error("parameter '{name}' has unknown type '{kind}'")]
    UnknownKind { name: String, kind: String },
}

/// Detailed reasons a value failed schema conversion.
///
/// These are internal diagnostics: at the invocation boundary every variant
/// except [`Thrown`](ConversionError::Thrown) collapses into the generic
/// [`InvocationError::InvalidInvocation`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// Null or absent input for a non-optional schema node.
    #[error("missing required value")]
    MissingRequired,

    /// The input's kind cannot satisfy the schema node at all.
    #[error("expected {expected}, found {found}")]
    UnexpectedType {
        expected: &'static str,
        found: &'static str,
    },

    /// A declared non-optional object property was absent from the input.
    #[error("missing required property '{0}'")]
    MissingProperty(String),

    /// A numeric value fell below the schema's `minimum`.
    #[error("{value} is less than the minimum of {minimum}")]
    BelowMinimum { value: f64, minimum: i64 },

    /// A string was not a member of the schema's enum.
    #[error("'{0}' is not an accepted enum value")]
    InvalidEnumValue(String),

    /// The value cannot be represented canonically (e.g. a function inside
    /// an `any`-typed node).
    #[error("value cannot be converted")]
    UnserializableValue,

    /// The host environment raised an exception while the input was being
    /// read (e.g. a hostile property getter). Must propagate verbatim.
    #[error("{0}")]
    Thrown(String),
}

impl ConversionError {
    /// Whether this error is a host-environment exception, which must be
    /// re-raised rather than collapsed into a generic rejection.
    pub fn is_thrown(&self) -> bool {
        matches!(self, ConversionError::Thrown(_))
    }
}

/// Errors surfaced to the calling script for a failed method invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvocationError {
    /// The supplied arguments did not match the method's signature.
    ///
    /// Deliberately carries no detail about which argument failed; the
    /// structured reason is logged internally instead.
    #[error("Invalid invocation")]
    InvalidInvocation,

    /// A host-environment exception raised while reading caller-supplied
    /// values, re-raised verbatim.
    #[error("{0}")]
    Thrown(String),

    /// The method does not exist or is not exposed in this context.
    #[error("no such method: {0}")]
    NoSuchMethod(String),
}

/// Errors from the binding-system facade.
#[derive(Debug, Error)]
pub enum SystemError {
    /// No schema is registered under the requested API name.
    #[error("unknown API: {0}")]
    UnknownApi(String),

    /// The API's schema data failed to load.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_error_message_is_generic() {
        assert_eq!(
            InvocationError::InvalidInvocation.to_string(),
            "Invalid invocation"
        );
    }

    #[test]
    fn test_thrown_error_preserves_message() {
        let err = InvocationError::Thrown("boom".to_string());
        assert_eq!(err.to_string(), "boom");
        assert!(ConversionError::Thrown("boom".to_string()).is_thrown());
        assert!(!ConversionError::MissingRequired.is_thrown());
    }
}
