//! The NETCONF error element.
//!
//! Validation and RPC failures are reported to clients as structured
//! error elements rather than bare strings. The tag set is the closed
//! set from RFC 6241; the engine never invents new tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol layer the error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    /// Content/semantic error.
    Application,
    /// Operation/framing error.
    Protocol,
}

/// Severity of an error element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Error,
    Warning,
}

/// The closed set of NETCONF error tags the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorTag {
    InUse,
    InvalidValue,
    MissingElement,
    UnknownElement,
    BadAttribute,
    OperationFailed,
    DataMissing,
    DataExists,
    AccessDenied,
    LockDenied,
}

impl ErrorTag {
    /// The wire form of the tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorTag::InUse => "in-use",
            ErrorTag::InvalidValue => "invalid-value",
            ErrorTag::MissingElement => "missing-element",
            ErrorTag::UnknownElement => "unknown-element",
            ErrorTag::BadAttribute => "bad-attribute",
            ErrorTag::OperationFailed => "operation-failed",
            ErrorTag::DataMissing => "data-missing",
            ErrorTag::DataExists => "data-exists",
            ErrorTag::AccessDenied => "access-denied",
            ErrorTag::LockDenied => "lock-denied",
        }
    }
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured NETCONF error element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Layer the error belongs to.
    pub error_type: ErrorType,
    /// Tag from the closed set.
    pub tag: ErrorTag,
    /// Severity, almost always `Error`.
    pub severity: ErrorSeverity,
    /// Human-readable message.
    pub message: String,
    /// Path to the offending node, when known.
    pub path: Option<String>,
    /// Application-specific tag (e.g. from a YANG `must` statement).
    pub app_tag: Option<String>,
    /// Extra info element, e.g. the session id holding a lock.
    pub info: Option<String>,
}

impl RpcError {
    /// Create an error with the given type, tag and message.
    pub fn new(error_type: ErrorType, tag: ErrorTag, message: impl Into<String>) -> Self {
        Self {
            error_type,
            tag,
            severity: ErrorSeverity::Error,
            message: message.into(),
            path: None,
            app_tag: None,
            info: None,
        }
    }

    /// Attach an error path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach an application tag.
    pub fn with_app_tag(mut self, app_tag: impl Into<String>) -> Self {
        self.app_tag = Some(app_tag.into());
        self
    }

    /// Attach an info element.
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    // ========== Tag constructors ==========

    /// A value failed a type or range constraint.
    pub fn invalid_value(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorType::Application, ErrorTag::InvalidValue, message).with_path(path)
    }

    /// A required element is absent.
    pub fn missing_element(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorType::Application, ErrorTag::MissingElement, message).with_path(path)
    }

    /// An element has no matching schema statement.
    pub fn unknown_element(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorType::Application, ErrorTag::UnknownElement, message).with_path(path)
    }

    /// An attribute is not allowed here.
    pub fn bad_attribute(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorType::Application, ErrorTag::BadAttribute, message).with_path(path)
    }

    /// The requested resource is in use (e.g. datastore locked).
    pub fn in_use(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Protocol, ErrorTag::InUse, message)
    }

    /// A lock request was denied; `session` is the holder.
    pub fn lock_denied(session: u32, message: impl Into<String>) -> Self {
        Self::new(ErrorType::Protocol, ErrorTag::LockDenied, message)
            .with_info(format!("<session-id>{}</session-id>", session))
    }

    /// A cardinality or referential constraint found data missing.
    pub fn data_missing(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorType::Application, ErrorTag::DataMissing, message).with_path(path)
    }

    /// Data unexpectedly present (e.g. duplicate list key).
    pub fn data_exists(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorType::Application, ErrorTag::DataExists, message).with_path(path)
    }

    /// Access denied.
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Protocol, ErrorTag::AccessDenied, message)
    }

    /// Catch-all operation failure.
    pub fn operation_failed(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self::new(error_type, ErrorTag::OperationFailed, message)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {} ({})", self.tag, self.message, path),
            None => write!(f, "{}: {}", self.tag, self.message),
        }
    }
}

/// An accumulated list of error elements.
///
/// The validator collects every failure it finds; callers decide
/// whether to surface all of them or stop at the first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcErrors {
    errors: Vec<RpcError>,
}

impl RpcErrors {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error.
    pub fn push(&mut self, error: RpcError) {
        self.errors.push(error);
    }

    /// True if no errors were collected.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of collected errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// All collected errors.
    pub fn all(&self) -> &[RpcError] {
        &self.errors
    }

    /// The first error, if any.
    pub fn first(&self) -> Option<&RpcError> {
        self.errors.first()
    }

    /// Merge another collection into this one.
    pub fn merge(&mut self, other: RpcErrors) {
        self.errors.extend(other.errors);
    }

    /// Turn the collection into a result: `Ok` when empty.
    pub fn into_result(self) -> Result<(), RpcErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<RpcError> for RpcErrors {
    fn from(error: RpcError) -> Self {
        let mut errors = RpcErrors::new();
        errors.push(error);
        errors
    }
}

impl IntoIterator for RpcErrors {
    type Item = RpcError;
    type IntoIter = std::vec::IntoIter<RpcError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a> IntoIterator for &'a RpcErrors {
    type Item = &'a RpcError;
    type IntoIter = std::slice::Iter<'a, RpcError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl fmt::Display for RpcErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msgs: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        f.write_str(&msgs.join("; "))
    }
}
