//! Error types for the mobile session coordinator
//!
//! Errors fall into a few broad groups, which decide how the coordinator reacts:
//!
//! - **Caller errors** - an operation was invoked with no eligible call or no
//!   session, or with a malformed argument. These are returned to the bridge.
//! - **Engine errors** - an individual SIP engine primitive failed (adding an
//!   address, applying DNS servers, ...). These are logged and never abort a
//!   reconciliation pass.
//! - **Fatal errors** - the engine could not allocate an agent, so no session
//!   exists. Only `initialize` surfaces these.
//!
//! # Example
//!
//! ```rust
//! use rvoip_mobile_core::MobileError;
//!
//! let err = MobileError::engine("add_address", "interface gone");
//! assert!(err.is_recoverable());
//! assert_eq!(err.category(), "engine");
//!
//! let err = MobileError::NoCurrentCall;
//! assert!(err.is_caller_error());
//! ```

use crate::engine::CallHandle;

/// Result type for coordinator operations
pub type MobileResult<T> = Result<T, MobileError>;

/// Errors produced by the mobile session coordinator
#[derive(Debug, Clone, thiserror::Error)]
pub enum MobileError {
    // Caller errors
    /// A call-control operation was invoked while no call is current
    #[error("No current call")]
    NoCurrentCall,

    /// An operation that needs a registered agent was invoked without one
    #[error("No session: initialize must succeed first")]
    NoSession,

    #[error("Call not found: {handle}")]
    CallNotFound { handle: CallHandle },

    #[error("Call already exists: {handle}")]
    CallAlreadyExists { handle: CallHandle },

    #[error("Invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    // Configuration
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // Engine / platform
    /// The engine refused to create a user agent for the account
    #[error("Agent allocation failed: {reason}")]
    AgentAllocationFailed { reason: String },

    #[error("Call setup failed: {reason}")]
    CallSetupFailed { reason: String },

    #[error("Engine operation {operation} failed: {reason}")]
    EngineError { operation: String, reason: String },

    // Lifecycle
    /// The coordination task is no longer running
    #[error("Coordinator stopped")]
    CoordinatorStopped,

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl MobileError {
    /// Create an engine error for the named primitive
    pub fn engine(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EngineError {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn agent_allocation_failed(reason: impl Into<String>) -> Self {
        Self::AgentAllocationFailed {
            reason: reason.into(),
        }
    }

    pub fn call_setup_failed(reason: impl Into<String>) -> Self {
        Self::CallSetupFailed {
            reason: reason.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Whether retrying the same operation later could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            MobileError::EngineError { .. }
            | MobileError::CallSetupFailed { .. }
            | MobileError::NoCurrentCall => true,

            MobileError::AgentAllocationFailed { .. }
            | MobileError::InvalidConfiguration { .. }
            | MobileError::InvalidArgument { .. }
            | MobileError::CoordinatorStopped => false,

            _ => false,
        }
    }

    /// Whether the error was caused by how the operation was invoked
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            MobileError::NoCurrentCall
                | MobileError::NoSession
                | MobileError::CallNotFound { .. }
                | MobileError::CallAlreadyExists { .. }
                | MobileError::InvalidArgument { .. }
        )
    }

    /// Short category name, used as a structured logging field
    pub fn category(&self) -> &'static str {
        match self {
            MobileError::NoCurrentCall
            | MobileError::CallNotFound { .. }
            | MobileError::CallAlreadyExists { .. }
            | MobileError::CallSetupFailed { .. } => "call",
            MobileError::NoSession | MobileError::AgentAllocationFailed { .. } => "session",
            MobileError::InvalidArgument { .. } => "argument",
            MobileError::InvalidConfiguration { .. } => "configuration",
            MobileError::EngineError { .. } => "engine",
            MobileError::CoordinatorStopped | MobileError::InternalError { .. } => "system",
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for MobileError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        MobileError::CoordinatorStopped
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for MobileError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        MobileError::CoordinatorStopped
    }
}

impl From<serde_json::Error> for MobileError {
    fn from(e: serde_json::Error) -> Self {
        MobileError::invalid_configuration("json", e.to_string())
    }
}
