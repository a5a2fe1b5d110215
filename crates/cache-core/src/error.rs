use std::fmt;
use thiserror::Error as ThisError;

///
/// CacheError
/// Structured runtime error with a stable classification.
///
/// Mirrors the field, entity or fragment at fault rather than a formatted
/// string alone, so callers can match on `kind` without parsing messages.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct CacheError {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl CacheError {
    #[must_use]
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }

    /// Zero or more than one unnamed operation, or an ambiguous fragment
    /// name, in the document passed to `read`/`write`.
    #[must_use]
    pub fn malformed_document(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedDocument, ErrorOrigin::Document, message)
    }

    /// A fragment spread references a name with no matching definition.
    #[must_use]
    pub fn missing_fragment(name: &str) -> Self {
        Self::new(
            ErrorKind::MissingFragment,
            ErrorOrigin::Document,
            format!("fragment '{name}' is not defined"),
        )
    }

    /// `returnPartial = false` and a selected field was absent.
    #[must_use]
    pub fn missing_field(entity_id: &str, field: &str) -> Self {
        Self::new(
            ErrorKind::MissingField,
            ErrorOrigin::Read,
            format!("field '{field}' missing on entity '{entity_id}'"),
        )
    }

    /// Strict-mode write found an object where a reference/scalar was
    /// expected, or a stable-ID reference clobbered by an ID-less object
    /// of the same declared type.
    #[must_use]
    pub fn schema_shape_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchemaShapeMismatch, ErrorOrigin::Write, message)
    }

    /// The explicit fragment matcher was consulted before its
    /// possible-types table was loaded.
    #[must_use]
    pub fn matcher_not_ready() -> Self {
        Self::new(
            ErrorKind::MatcherNotReady,
            ErrorOrigin::Matcher,
            "fragment matcher consulted before possible-types table was loaded",
        )
    }

    #[must_use]
    pub const fn is_missing_field(&self) -> bool {
        matches!(self.kind, ErrorKind::MissingField | ErrorKind::DanglingReference)
    }
}

///
/// ErrorKind
/// Taxonomy of cache error conditions (spec.md §7).
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    MalformedDocument,
    MissingFragment,
    MissingField,
    SchemaShapeMismatch,
    MatcherNotReady,
    DanglingReference,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MalformedDocument => "malformed_document",
            Self::MissingFragment => "missing_fragment",
            Self::MissingField => "missing_field",
            Self::SchemaShapeMismatch => "schema_shape_mismatch",
            Self::MatcherNotReady => "matcher_not_ready",
            Self::DanglingReference => "dangling_reference",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Which subsystem raised the error.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Document,
    Write,
    Read,
    Matcher,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Document => "document",
            Self::Write => "write",
            Self::Read => "read",
            Self::Matcher => "matcher",
        };
        write!(f, "{label}")
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
