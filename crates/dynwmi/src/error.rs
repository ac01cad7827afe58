// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error kinds and provider error translation.
//!
//! Every transport failure is funnelled through [`translate`], which renders
//! the provider's status (and its nested detail, when present) into a
//! readable multi-line message and maps a small fixed table of status codes
//! to specific [`Error`] variants. Everything else surfaces as
//! [`Error::Provider`].
//!
//! Locally detected misuse (wrong argument shapes, unknown names, missing
//! namespace) is raised directly, before any transport call.

use crate::provider::{ProviderError, WBEM_E_INVALID_QUERY, WBEM_E_TIMED_OUT};
use std::fmt::Write as _;

/// Errors returned by dynwmi operations.
///
/// # Example
///
/// ```rust,no_run
/// use dynwmi::Error;
///
/// fn report(result: dynwmi::Result<()>) {
///     match result {
///         Err(e) if e.is_timeout() => println!("nothing yet"),
///         Err(Error::InvalidQuery { message }) => println!("bad WQL:\n{}", message),
///         Err(e) => println!("failed: {}", e),
///         Ok(()) => {}
///     }
/// }
/// ```
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Provider Errors (translated)
    // ========================================================================
    /// Any provider failure without a more specific kind.
    Provider {
        /// Top-level status code.
        code: u32,
        /// Translated multi-line message.
        message: String,
    },
    /// The provider rejected a WQL query (`WBEM_E_INVALID_QUERY`).
    InvalidQuery {
        /// Translated multi-line message.
        message: String,
    },
    /// An event wait elapsed without a notification (`WBEM_E_TIMED_OUT`).
    TimedOut {
        /// Translated multi-line message.
        message: String,
    },

    // ========================================================================
    // Usage Errors (raised locally)
    // ========================================================================
    /// Query or watch requested on a class with no owning namespace.
    NoNamespace(String),
    /// Write to a name that is not a declared property.
    AttributeNotFound {
        /// Requested name.
        name: String,
        /// Class (or path) of the object written to.
        owner: String,
    },
    /// Named argument that is not a declared input parameter.
    UnknownParameter {
        /// Supplied name.
        name: String,
        /// Signature of the method.
        signature: String,
    },
    /// Non-array value supplied for an array-typed parameter.
    ParameterType {
        /// Declared parameter name.
        parameter: String,
        /// Positional index, when bound positionally.
        position: Option<usize>,
    },
    /// More positional arguments than declared input parameters.
    TooManyArguments {
        /// Method name.
        method: String,
        /// Declared input parameter count.
        expected: usize,
        /// Supplied positional argument count.
        given: usize,
    },
    /// Equality against a value that is not a managed object.
    EqualityTypeMismatch(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Conflicting or incomplete connection options.
    InvalidConnection(String),
    /// Timestamp text that is not a tick count or provider timestamp.
    InvalidTimestamp(String),
    /// Configuration file could not be parsed or is missing a profile.
    Config(String),
    /// I/O error with underlying cause.
    IoError(std::io::Error),
}

impl Error {
    /// True for watcher timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::TimedOut { .. })
    }

    /// True when the provider rejected the query text.
    pub fn is_invalid_query(&self) -> bool {
        matches!(self, Error::InvalidQuery { .. })
    }

    /// Provider status code for translated errors.
    pub fn code(&self) -> Option<u32> {
        match self {
            Error::Provider { code, .. } => Some(*code),
            Error::InvalidQuery { .. } => Some(WBEM_E_INVALID_QUERY),
            Error::TimedOut { .. } => Some(WBEM_E_TIMED_OUT),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Provider
            Error::Provider { message, .. }
            | Error::InvalidQuery { message }
            | Error::TimedOut { message } => write!(f, "{}", message),
            // Usage
            Error::NoNamespace(class) => {
                write!(f, "Class {} has no namespace to query from", class)
            }
            Error::AttributeNotFound { name, owner } => {
                write!(f, "{} is not a property of {}", name, owner)
            }
            Error::UnknownParameter { name, signature } => {
                write!(f, "{} is not a valid parameter for {}", name, signature)
            }
            Error::ParameterType {
                position: Some(n), ..
            } => write!(f, "parameter {} must be iterable", n),
            Error::ParameterType {
                parameter,
                position: None,
            } => write!(f, "{} must be iterable", parameter),
            Error::TooManyArguments {
                method,
                expected,
                given,
            } => write!(
                f,
                "{} takes {} positional argument(s) but {} were given",
                method, expected, given
            ),
            Error::EqualityTypeMismatch(type_name) => {
                write!(f, "Can't compare a managed object with {}", type_name)
            }
            // Configuration
            Error::InvalidConnection(msg) => write!(f, "Invalid connection: {}", msg),
            Error::InvalidTimestamp(raw) => write!(f, "Invalid timestamp: {}", raw),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e)
    }
}

impl From<ProviderError> for Error {
    fn from(e: ProviderError) -> Self {
        translate(e)
    }
}

/// Convenient alias for API results using the public `Error` type.
pub type Result<T> = core::result::Result<T, Error>;

/// Render a provider failure the way the scripting host reports it.
///
/// ```text
/// 80020009 - Exception occurred.
///   Error in: SWbemServicesEx
///   80041017 - Invalid query
/// ```
pub fn format_provider_error(err: &ProviderError) -> String {
    let mut message = format!("{:08X} - {}", err.hresult, err.name);
    if let Some(info) = &err.info {
        let _ = write!(
            message,
            "\n  Error in: {}\n  {:08X} - {}",
            info.source,
            info.scode,
            info.description.trim()
        );
    }
    message
}

/// Translate a provider failure into an [`Error`].
///
/// The code table is consulted with the top-level status first, then with
/// the nested status.
pub fn translate(err: ProviderError) -> Error {
    log::debug!(
        "[dynwmi::error] provider failure hresult={:08X} scode={:?}",
        err.hresult,
        err.scode()
    );
    let message = format_provider_error(&err);
    let kind = [Some(err.hresult), err.scode()]
        .into_iter()
        .flatten()
        .find(|code| matches!(*code, WBEM_E_INVALID_QUERY | WBEM_E_TIMED_OUT));
    match kind {
        Some(WBEM_E_INVALID_QUERY) => Error::InvalidQuery { message },
        Some(WBEM_E_TIMED_OUT) => Error::TimedOut { message },
        _ => Error::Provider {
            code: err.hresult,
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ExcepInfo, DISP_E_EXCEPTION, WBEM_E_NOT_FOUND};

    #[test]
    fn test_message_without_detail() {
        let err = translate(ProviderError::new(WBEM_E_NOT_FOUND, "Not found"));
        assert_eq!(err.to_string(), "80041002 - Not found");
        assert_eq!(err.code(), Some(WBEM_E_NOT_FOUND));
    }

    #[test]
    fn test_message_with_detail_trims_description() {
        let err = ProviderError::new(DISP_E_EXCEPTION, "Exception occurred.").with_info(ExcepInfo {
            source: "SWbemServicesEx".into(),
            description: "Not found \r\n".into(),
            scode: WBEM_E_NOT_FOUND,
        });
        assert_eq!(
            format_provider_error(&err),
            "80020009 - Exception occurred.\n  Error in: SWbemServicesEx\n  80041002 - Not found"
        );
        // Nested code not in the table: base kind with the top-level code
        match translate(err) {
            Error::Provider { code, .. } => assert_eq!(code, DISP_E_EXCEPTION),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_table_checks_top_level_then_nested() {
        let top = translate(ProviderError::new(WBEM_E_INVALID_QUERY, "Invalid query"));
        assert!(top.is_invalid_query());

        let nested = translate(ProviderError::wbem(WBEM_E_INVALID_QUERY, "SWbemServicesEx", ""));
        assert!(nested.is_invalid_query());

        let timeout = translate(ProviderError::wbem(WBEM_E_TIMED_OUT, "SWbemEventSource", ""));
        assert!(timeout.is_timeout());
        assert_eq!(timeout.code(), Some(WBEM_E_TIMED_OUT));
    }

    #[test]
    fn test_parameter_type_messages() {
        let positional = Error::ParameterType {
            parameter: "Values".into(),
            position: Some(1),
        };
        assert_eq!(positional.to_string(), "parameter 1 must be iterable");
        let named = Error::ParameterType {
            parameter: "Values".into(),
            position: None,
        };
        assert_eq!(named.to_string(), "Values must be iterable");
    }
}
