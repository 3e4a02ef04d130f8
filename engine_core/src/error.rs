//! Error types for the engine core
//!
//! This module defines the error types used by both crates of the workspace:
//! configuration errors reported synchronously at the call site, and device
//! errors forwarded from the backend.

use std::fmt;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (Vulkan call failure, device lost, ...)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (texture, buffer, sampler, ...)
    InvalidResource(String),

    /// Initialization failed (instance, device, subsystems)
    InitializationFailed(String),

    /// Malformed pipeline or descriptor configuration
    InvalidConfiguration(String),

    /// Binding rejected (undeclared slot, replica or element out of range, kind mismatch)
    InvalidBinding(String),

    /// Push constant update rejected (no matching range, size too large)
    InvalidPushConstant(String),

    /// A shader referenced by a pipeline configuration has been released
    ShaderReleased(String),

    /// Format not supported by the device for the requested usage
    UnsupportedFormat(String),

    /// `allocate_descriptors` was already called on this pipeline
    DescriptorsAlreadyAllocated(String),

    /// Descriptor sets are used before `allocate_descriptors`
    DescriptorsNotAllocated(String),

    /// No room left in the descriptor pool
    DescriptorPoolExhausted(String),

    /// Descriptor sets bound while staged writes are still pending
    UnflushedDescriptorWrites(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::InvalidBinding(msg) => write!(f, "Invalid binding: {}", msg),
            Error::InvalidPushConstant(msg) => write!(f, "Invalid push constant: {}", msg),
            Error::ShaderReleased(msg) => write!(f, "Shader released: {}", msg),
            Error::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            Error::DescriptorsAlreadyAllocated(msg) => {
                write!(f, "Descriptors already allocated: {}", msg)
            }
            Error::DescriptorsNotAllocated(msg) => write!(f, "Descriptors not allocated: {}", msg),
            Error::DescriptorPoolExhausted(msg) => write!(f, "Descriptor pool exhausted: {}", msg),
            Error::UnflushedDescriptorWrites(msg) => {
                write!(f, "Unflushed descriptor writes: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}

// ===== ERROR MACROS =====

/// Log an ERROR message and build an `Error::BackendError` from it
///
/// # Example
///
/// ```no_run
/// # use engine_core::engine_err;
/// let err = engine_err!("ecore::vulkan", "Failed to create fence: {}", "VK_ERROR_DEVICE_LOST");
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::ecore::Error::BackendError(message)
    }};
}

/// Log an ERROR message and return an `Error::BackendError` from the current function
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $($arg)*))
    };
}

/// Log an already-built error at ERROR severity and return it from the current function
///
/// # Example
///
/// ```no_run
/// # use engine_core::engine_bail_err;
/// # use engine_core::ecore::{Error, Result};
/// fn check(count: u32) -> Result<()> {
///     if count == 0 {
///         engine_bail_err!("ecore::pipeline",
///             Error::InvalidConfiguration("binding count is 0".to_string()));
///     }
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! engine_bail_err {
    ($source:expr, $error:expr) => {{
        let error = $error;
        $crate::engine_error!($source, "{}", error);
        return Err(error);
    }};
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
