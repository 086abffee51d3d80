// Error taxonomy shared by the core and every backend
//
// Backend errors travel through the context untouched: whatever a driver
// returns from init_driver or a surface call is what the caller sees.

use crate::driver::{Backend, Capabilities};
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed or missing input, e.g. a driver without a required capability
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation invoked out of lifecycle order
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Surface operation on a context that has not been activated
    #[error("context not initialized: {0}")]
    NotInitialized(String),

    /// The bound driver does not populate the requested capability slot
    #[error("{backend} driver does not support {capability:?}")]
    Unsupported {
        backend: Backend,
        capability: Capabilities,
    },

    /// The native backend reported an error
    #[error("{backend} backend failed during {operation}: {message}{}", native_suffix(.code))]
    BackendFailure {
        backend: Backend,
        operation: &'static str,
        code: Option<i32>,
        message: String,
    },
}

fn native_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" (native code {c})")).unwrap_or_default()
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn not_initialized(msg: impl Into<String>) -> Self {
        Self::NotInitialized(msg.into())
    }

    pub fn unsupported(backend: Backend, capability: Capabilities) -> Self {
        Self::Unsupported {
            backend,
            capability,
        }
    }

    pub fn backend(
        backend: Backend,
        operation: &'static str,
        code: Option<i32>,
        message: impl Into<String>,
    ) -> Self {
        Self::BackendFailure {
            backend,
            operation,
            code,
            message: message.into(),
        }
    }

    /// True for lifecycle-order violations, including `NotInitialized`.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState(_) | Self::NotInitialized(_))
    }

    /// Native error code, if the failure came from a backend that reports one.
    pub fn native_code(&self) -> Option<i32> {
        match self {
            Self::BackendFailure { code, .. } => *code,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_failure_message_names_operation_and_code() {
        let err = Error::backend(Backend::Vulkan, "vkCreateDevice", Some(-3), "out of memory");
        let text = err.to_string();
        assert!(text.contains("vkCreateDevice"));
        assert!(text.contains("native code -3"));
        assert_eq!(err.native_code(), Some(-3));
    }

    #[test]
    fn backend_failure_without_code_omits_suffix() {
        let err = Error::backend(Backend::Null, "init_driver", None, "forced");
        assert!(!err.to_string().contains("native code"));
    }

    #[test]
    fn not_initialized_counts_as_invalid_state() {
        assert!(Error::not_initialized("x").is_invalid_state());
        assert!(Error::invalid_state("x").is_invalid_state());
        assert!(!Error::invalid_argument("x").is_invalid_state());
    }
}
