//! Closed set of engine error kinds.
//!
//! Every fallible core operation returns one of these variants rather than
//! an opaque `anyhow`-style error: the scheduler and error-boundary path
//! (see `scheduler.rs`) match on them to decide whether to surface a
//! subtree fallback, the built-in error screen, or a fatal shutdown.

use thiserror::Error;

/// The closed set of error kinds produced by the core pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// A prop validator rejected a value (negative gap, unknown enum, non-finite number, …).
    #[error("invalid props: {message}")]
    InvalidProps {
        /// Human-readable description of the rejected prop.
        message: String,
    },

    /// Measure/layout could not produce a valid rect for a subtree.
    #[error("layout fatal: {message}")]
    LayoutFatal {
        /// Human-readable description of the layout failure.
        message: String,
    },

    /// An inbound event batch's header or records were malformed.
    #[error("event batch malformed: {message}")]
    BatchMalformed {
        /// Human-readable description of the parse failure.
        message: String,
    },

    /// The view function or a callback threw.
    #[error("user code threw: {message}")]
    UserCodeThrew {
        /// The message captured from the panic/error payload.
        message: String,
    },

    /// `request_frame`/`poll_events` was rejected by the backend.
    #[error("backend failure: {message}")]
    BackendFailure {
        /// Human-readable description of the backend failure.
        message: String,
    },
}

/// Result alias used throughout the core pipeline.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Shorthand for an `InvalidProps` error.
    pub fn invalid_props(message: impl Into<String>) -> Self {
        Self::InvalidProps {
            message: message.into(),
        }
    }

    /// Shorthand for a `LayoutFatal` error.
    pub fn layout_fatal(message: impl Into<String>) -> Self {
        Self::LayoutFatal {
            message: message.into(),
        }
    }

    /// Shorthand for a `BatchMalformed` error.
    pub fn batch_malformed(message: impl Into<String>) -> Self {
        Self::BatchMalformed {
            message: message.into(),
        }
    }

    /// Shorthand for a `UserCodeThrew` error.
    pub fn user_code_threw(message: impl Into<String>) -> Self {
        Self::UserCodeThrew {
            message: message.into(),
        }
    }

    /// Shorthand for a `BackendFailure` error.
    pub fn backend_failure(message: impl Into<String>) -> Self {
        Self::BackendFailure {
            message: message.into(),
        }
    }

    /// Builds a `UserCodeThrew` error from a `catch_unwind` panic payload,
    /// recovering a `&str`/`String` message where the payload carries one.
    pub fn from_panic_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panicked with a non-string payload".to_string());
        Self::user_code_threw(message)
    }
}

/// Receives errors raised by user callbacks (`on_click`, `on_unmount`, view
/// functions, …) that were caught rather than allowed to unwind past the
/// core pipeline. The default sink just logs; embedders that want an
/// error-boundary UI or telemetry hook can supply their own.
pub trait UserCodeErrorSink {
    fn report(&mut self, error: EngineError);
}

/// Logs the error via the `log` facade and otherwise drops it.
#[derive(Debug, Default)]
pub struct LoggingErrorSink;

impl UserCodeErrorSink for LoggingErrorSink {
    fn report(&mut self, error: EngineError) {
        log::error!("{error}");
    }
}
