use crate::DType;

/// Errors surfaced by descriptor construction, kernel compilation and
/// the checked engine entry points.
///
/// Numeric saturation is never an error; out-of-range quantized values
/// clamp silently.
#[derive(Debug, thiserror::Error)]
pub enum KoreError {
    #[error("invalid post-op '{op}': {reason}")]
    InvalidPostOp { op: &'static str, reason: String },

    #[error("unsupported post-op '{op}' for {dtype}: {reason}")]
    UnsupportedPostOp {
        op: &'static str,
        dtype: DType,
        reason: String,
    },

    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("invalid config: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = KoreError::InvalidPostOp {
            op: "quantize",
            reason: "scale must be positive, got 0".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid post-op 'quantize': scale must be positive, got 0"
        );

        let err = KoreError::UnsupportedPostOp {
            op: "gelu",
            dtype: DType::I8,
            reason: "activation requires a float type".into(),
        };
        assert!(err.to_string().contains("'gelu' for i8"));

        let err = KoreError::DTypeMismatch { expected: DType::F32, got: DType::U8 };
        assert_eq!(err.to_string(), "dtype mismatch: expected f32, got u8");
    }
}
