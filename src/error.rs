use thiserror::Error;

/// Main error type for the voxcore tensor and hash-map core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Shape-related errors with detailed suggestions
    #[error("Shape error: {0}")]
    ShapeMismatch(String),

    /// Dtype mismatch between operands
    #[error("Dtype error: {0}")]
    DtypeMismatch(String),

    /// Device mismatch between operands
    #[error("Device mismatch: {0}")]
    DeviceMismatch(String),

    /// Device-related errors (unknown device, missing backend)
    #[error("Device error: {0}")]
    DeviceError(String),

    /// Invalid argument passed to a constructor or operation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The dtype is outside the dispatch table of an operation
    #[error("Unsupported dtype {dtype} in {operation}")]
    UnsupportedDtype {
        operation: String,
        dtype: String,
    },

    /// Memory-related errors
    #[error("Memory error: {0}")]
    MemoryError(String),

    /// Linear algebra routine reported a non-zero info code
    #[error("Linalg error: {routine} failed with info = {info}")]
    LinalgError {
        routine: String,
        info: i64,
    },

    /// Index outside the addressed dimension
    #[error("Index out of range: {0}")]
    IndexOutOfRange(String),

    /// A hash backend batch does not fit in the reserved capacity
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Operation errors with context
    #[error("Operation error: {operation} - {message}")]
    OperationError {
        operation: String,
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// IO errors
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal errors that shouldn't happen
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl CoreError {
    /// Create a shape error with helpful suggestions
    pub fn shape_error(expected: &str, got: &str, suggestion: Option<&str>) -> Self {
        let message = if let Some(sugg) = suggestion {
            format!("Expected {}, got {}. Suggestion: {}", expected, got, sugg)
        } else {
            format!("Expected {}, got {}", expected, got)
        };
        CoreError::ShapeMismatch(message)
    }

    /// Create a dtype mismatch error
    pub fn dtype_error(expected: &str, got: &str) -> Self {
        CoreError::DtypeMismatch(format!("Expected {}, got {}", expected, got))
    }

    /// Create a device mismatch error
    pub fn device_mismatch(expected: &str, got: &str) -> Self {
        CoreError::DeviceMismatch(format!("Expected {}, got {}", expected, got))
    }

    /// Create a device error with helpful context
    pub fn device_error(device: &str, message: &str) -> Self {
        CoreError::DeviceError(format!("Device '{}': {}", device, message))
    }

    /// Create an unsupported dtype error for a dispatch table
    pub fn unsupported_dtype(operation: &str, dtype: &str) -> Self {
        CoreError::UnsupportedDtype {
            operation: operation.to_string(),
            dtype: dtype.to_string(),
        }
    }

    /// Create an operation error with context
    pub fn operation_error(operation: &str, message: &str) -> Self {
        CoreError::OperationError {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a memory error with allocation information
    pub fn memory_error(requested: usize, device: &str, context: &str) -> Self {
        CoreError::MemoryError(format!(
            "Failed to allocate {} bytes on {}. Context: {}",
            requested, device, context
        ))
    }

    /// Create a linalg error carrying the routine's info code
    pub fn linalg_error(routine: &str, info: i64) -> Self {
        CoreError::LinalgError {
            routine: routine.to_string(),
            info,
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

/// Result type for voxcore operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ContractViolation,
    UnsupportedDtype,
    DeviceUnavailable,
    OutOfMemory,
    NumericalFailure,
    ConfigInvalid,
    IoFailed,
    InternalError,
}

impl CoreError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::ShapeMismatch(_)
            | CoreError::DtypeMismatch(_)
            | CoreError::DeviceMismatch(_)
            | CoreError::InvalidArgument(_)
            | CoreError::IndexOutOfRange(_)
            | CoreError::CapacityExceeded(_)
            | CoreError::OperationError { .. } => ErrorCode::ContractViolation,
            CoreError::UnsupportedDtype { .. } => ErrorCode::UnsupportedDtype,
            CoreError::DeviceError(_) => ErrorCode::DeviceUnavailable,
            CoreError::MemoryError(_) => ErrorCode::OutOfMemory,
            CoreError::LinalgError { .. } => ErrorCode::NumericalFailure,
            CoreError::ConfigurationError(_) => ErrorCode::ConfigInvalid,
            CoreError::IoError(_) | CoreError::SerializationError(_) => ErrorCode::IoFailed,
            CoreError::InternalError(_) => ErrorCode::InternalError,
        }
    }

    /// Resource failures come from the environment rather than from the caller's arguments
    pub fn is_resource_failure(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::OutOfMemory | ErrorCode::DeviceUnavailable | ErrorCode::NumericalFailure
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_error() {
        let error = CoreError::shape_error("{2, 3}", "{3, 2}", Some("Did you mean to transpose?"));
        assert!(error.to_string().contains("Expected {2, 3}, got {3, 2}"));
        assert!(error.to_string().contains("Did you mean to transpose?"));
    }

    #[test]
    fn test_error_codes() {
        let shape_error = CoreError::ShapeMismatch("test".to_string());
        assert_eq!(shape_error.code(), ErrorCode::ContractViolation);
        assert!(!shape_error.is_resource_failure());

        let linalg = CoreError::linalg_error("getrf", 3);
        assert_eq!(linalg.code(), ErrorCode::NumericalFailure);
        assert!(linalg.is_resource_failure());
        assert!(linalg.to_string().contains("info = 3"));
    }

    #[test]
    fn test_unsupported_dtype_message() {
        let error = CoreError::unsupported_dtype("Inverse", "Int32");
        assert_eq!(error.to_string(), "Unsupported dtype Int32 in Inverse");
    }
}
