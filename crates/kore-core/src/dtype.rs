use std::fmt;

use half::{bf16, f16};

/// Element representations understood by the kernel engine.
///
/// Floats are processed in an f32 working register and rounded back to
/// their storage precision; integer types saturate at their bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit IEEE 754 single-precision float
    F32,
    /// 16-bit Brain Float (same exponent range as F32, reduced mantissa)
    BF16,
    /// 16-bit IEEE 754 half-precision float
    F16,
    /// 8-bit signed integer
    I8,
    /// 8-bit unsigned integer
    U8,
}

impl DType {
    /// Size in bytes of a single element.
    pub fn element_size(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::BF16 | DType::F16 => 2,
            DType::I8 | DType::U8 => 1,
        }
    }

    /// Number of bytes needed to store `n` elements of this dtype.
    pub fn storage_bytes(&self, n: usize) -> usize {
        self.element_size() * n
    }

    /// Whether this dtype is a floating-point type.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F32 | DType::BF16 | DType::F16)
    }

    /// Whether this dtype is an integer type.
    pub fn is_integer(&self) -> bool {
        matches!(self, DType::I8 | DType::U8)
    }

    /// Largest finite magnitude of a float dtype, or None for integers.
    pub fn float_max(&self) -> Option<f32> {
        match self {
            DType::F32 => Some(f32::MAX),
            DType::BF16 => Some(bf16::MAX.to_f32()),
            DType::F16 => Some(f16::MAX.to_f32()),
            DType::I8 | DType::U8 => None,
        }
    }

    /// Inclusive representable range of an integer dtype, or None for floats.
    pub fn integer_bounds(&self) -> Option<(i32, i32)> {
        match self {
            DType::I8 => Some((i8::MIN as i32, i8::MAX as i32)),
            DType::U8 => Some((u8::MIN as i32, u8::MAX as i32)),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::BF16 => write!(f, "bf16"),
            DType::F16 => write!(f, "f16"),
            DType::I8 => write!(f, "i8"),
            DType::U8 => write!(f, "u8"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_sizes() {
        assert_eq!(DType::F32.element_size(), 4);
        assert_eq!(DType::BF16.element_size(), 2);
        assert_eq!(DType::F16.element_size(), 2);
        assert_eq!(DType::I8.element_size(), 1);
        assert_eq!(DType::U8.element_size(), 1);
    }

    #[test]
    fn test_storage_bytes() {
        assert_eq!(DType::F32.storage_bytes(10), 40);
        assert_eq!(DType::BF16.storage_bytes(3), 6);
        assert_eq!(DType::U8.storage_bytes(0), 0);
    }

    #[test]
    fn test_dtype_categories() {
        assert!(DType::F32.is_float());
        assert!(DType::BF16.is_float());
        assert!(!DType::F32.is_integer());
        assert!(DType::I8.is_integer());
        assert!(!DType::U8.is_float());
    }

    #[test]
    fn test_float_max() {
        assert_eq!(DType::F16.float_max(), Some(65504.0));
        assert_eq!(DType::F32.float_max(), Some(f32::MAX));
        assert!(DType::BF16.float_max().unwrap() > 3.0e38);
        assert_eq!(DType::I8.float_max(), None);
    }

    #[test]
    fn test_integer_bounds() {
        assert_eq!(DType::I8.integer_bounds(), Some((-128, 127)));
        assert_eq!(DType::U8.integer_bounds(), Some((0, 255)));
        assert_eq!(DType::F32.integer_bounds(), None);
        assert_eq!(DType::BF16.integer_bounds(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", DType::F32), "f32");
        assert_eq!(format!("{}", DType::BF16), "bf16");
        assert_eq!(format!("{}", DType::I8), "i8");
    }
}
