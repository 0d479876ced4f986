//! Error types for component declaration and handler execution.
//!
//! - [`DiscoveryError`]: a source declared malformed metadata; returned to the
//!   registering caller, which must not proceed with a half-registered source
//! - [`HandlerError`]: a constructor or handler reported failure; always
//!   recovered locally by the runtime

use thiserror::Error;

use crate::target::TargetKind;

/// Result returned by component handlers and constructors.
pub type HandlerResult<T = ()> = Result<T, HandlerError>;

/// Failure reported by a component constructor or event handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Wraps a panic payload caught while running user code.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self::new(format!("panicked: {detail}"))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Malformed component metadata detected while discovering a source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("component `{component}` declared twice in source `{source_name}`")]
    DuplicateComponent {
        source_name: String,
        component: String,
    },

    #[error("component `{component}` binds `{event}` as an update with frequency 0")]
    ZeroFrequency { component: String, event: String },

    #[error("component `{component}` has no constructor")]
    MissingConstructor { component: String },

    #[error("stateless component `{component}` cannot attach to {kind} targets")]
    StatelessEntityComponent { component: String, kind: TargetKind },

    #[error("stateless component `{component}` must not declare a constructor")]
    StatelessWithConstructor { component: String },

    #[error("session component `{component}` cannot use {what}")]
    TargetOnlyOption {
        component: String,
        what: &'static str,
    },

    #[error("component `{component}` has an empty run location")]
    EmptyRunLocation { component: String },

    #[error("source `{source_name}` failed to register: {reason}")]
    Source { source_name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_panic_payloads() {
        let err = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(HandlerError::from_panic(err.as_ref()).message(), "panicked: boom");

        let err = std::panic::catch_unwind(|| panic!("{}", String::from("owned"))).unwrap_err();
        assert_eq!(
            HandlerError::from_panic(err.as_ref()).message(),
            "panicked: owned"
        );
    }

    #[test]
    fn test_discovery_error_messages() {
        let err = DiscoveryError::ZeroFrequency {
            component: "radar".into(),
            event: "Update".into(),
        };
        assert_eq!(
            err.to_string(),
            "component `radar` binds `Update` as an update with frequency 0"
        );
    }
}
