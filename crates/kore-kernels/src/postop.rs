//! Post-op descriptors.
//!
//! A [`PostOpAttr`] is one fused elementwise transform: the kind of
//! transform with its numeric parameters, plus the dtype the transform
//! operates on (for `Quantize` and `Cast` the dtype it produces, for
//! `Dequantize` the integer dtype it reads).

use std::fmt;
use std::hash::{Hash, Hasher};

use kore_core::{DType, KoreError, Result};

/// Elementwise transform with its parameters inline.
#[derive(Debug, Clone, Copy)]
pub enum PostOpKind {
    /// Leaky ReLU; `alpha` is the negative slope (0 for plain ReLU).
    Relu { alpha: f32 },
    /// GELU, tanh approximation.
    Gelu,
    Tanh,
    Sigmoid,
    Exp,
    /// Polynomial `e^x` approximation, relative error below 1e-3.
    LowPrecisionExp,
    /// `x * sigmoid(alpha * x)`
    Swish { alpha: f32 },
    /// `alpha * x + beta`
    Linear { alpha: f32, beta: f32 },
    /// Clamp into `[min, max]`.
    Clip { min: f32, max: f32 },
    /// `round_ties_even(x / scale) + zero_point`, saturated into the target integer type.
    Quantize { scale: f32, zero_point: i32 },
    /// `(q - zero_point) * scale`, producing f32.
    Dequantize { scale: f32, zero_point: i32 },
    /// Representation change to the attr's dtype.
    Cast,
}

impl PostOpKind {
    pub fn name(&self) -> &'static str {
        match self {
            PostOpKind::Relu { .. } => "relu",
            PostOpKind::Gelu => "gelu",
            PostOpKind::Tanh => "tanh",
            PostOpKind::Sigmoid => "sigmoid",
            PostOpKind::Exp => "exp",
            PostOpKind::LowPrecisionExp => "low_precision_exp",
            PostOpKind::Swish { .. } => "swish",
            PostOpKind::Linear { .. } => "linear",
            PostOpKind::Clip { .. } => "clip",
            PostOpKind::Quantize { .. } => "quantize",
            PostOpKind::Dequantize { .. } => "dequantize",
            PostOpKind::Cast => "cast",
        }
    }

    /// Float-only transforms that keep the working dtype.
    pub fn is_activation(&self) -> bool {
        matches!(
            self,
            PostOpKind::Relu { .. }
                | PostOpKind::Gelu
                | PostOpKind::Tanh
                | PostOpKind::Sigmoid
                | PostOpKind::Exp
                | PostOpKind::LowPrecisionExp
                | PostOpKind::Swish { .. }
                | PostOpKind::Linear { .. }
        )
    }

    // Tag and raw parameter bits. Bitwise comparison keeps Eq reflexive
    // and consistent with Hash; validated params are never NaN.
    fn identity(&self) -> (u8, [u32; 2]) {
        match *self {
            PostOpKind::Relu { alpha } => (0, [alpha.to_bits(), 0]),
            PostOpKind::Gelu => (1, [0, 0]),
            PostOpKind::Tanh => (2, [0, 0]),
            PostOpKind::Sigmoid => (3, [0, 0]),
            PostOpKind::Exp => (4, [0, 0]),
            PostOpKind::LowPrecisionExp => (5, [0, 0]),
            PostOpKind::Swish { alpha } => (6, [alpha.to_bits(), 0]),
            PostOpKind::Linear { alpha, beta } => (7, [alpha.to_bits(), beta.to_bits()]),
            PostOpKind::Clip { min, max } => (8, [min.to_bits(), max.to_bits()]),
            PostOpKind::Quantize { scale, zero_point } => (9, [scale.to_bits(), zero_point as u32]),
            PostOpKind::Dequantize { scale, zero_point } => {
                (10, [scale.to_bits(), zero_point as u32])
            }
            PostOpKind::Cast => (11, [0, 0]),
        }
    }
}

impl PartialEq for PostOpKind {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for PostOpKind {}

impl Hash for PostOpKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

/// One fused elementwise transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PostOpAttr {
    kind: PostOpKind,
    data_type: DType,
}

impl PostOpAttr {
    /// Build an attr. Parameters are checked by [`PostOpAttr::validate`],
    /// which descriptor construction always runs.
    pub fn new(kind: PostOpKind, data_type: DType) -> Self {
        Self { kind, data_type }
    }

    pub fn relu(data_type: DType) -> Self {
        Self::new(PostOpKind::Relu { alpha: 0.0 }, data_type)
    }

    pub fn leaky_relu(data_type: DType, alpha: f32) -> Self {
        Self::new(PostOpKind::Relu { alpha }, data_type)
    }

    pub fn gelu(data_type: DType) -> Self {
        Self::new(PostOpKind::Gelu, data_type)
    }

    pub fn tanh(data_type: DType) -> Self {
        Self::new(PostOpKind::Tanh, data_type)
    }

    pub fn sigmoid(data_type: DType) -> Self {
        Self::new(PostOpKind::Sigmoid, data_type)
    }

    pub fn exp(data_type: DType) -> Self {
        Self::new(PostOpKind::Exp, data_type)
    }

    pub fn low_precision_exp(data_type: DType) -> Self {
        Self::new(PostOpKind::LowPrecisionExp, data_type)
    }

    pub fn swish(data_type: DType, alpha: f32) -> Self {
        Self::new(PostOpKind::Swish { alpha }, data_type)
    }

    pub fn linear(data_type: DType, alpha: f32, beta: f32) -> Self {
        Self::new(PostOpKind::Linear { alpha, beta }, data_type)
    }

    pub fn clip(data_type: DType, min: f32, max: f32) -> Self {
        Self::new(PostOpKind::Clip { min, max }, data_type)
    }

    pub fn quantize(data_type: DType, scale: f32, zero_point: i32) -> Self {
        Self::new(PostOpKind::Quantize { scale, zero_point }, data_type)
    }

    pub fn dequantize(data_type: DType, scale: f32, zero_point: i32) -> Self {
        Self::new(PostOpKind::Dequantize { scale, zero_point }, data_type)
    }

    pub fn cast(data_type: DType) -> Self {
        Self::new(PostOpKind::Cast, data_type)
    }

    pub fn kind(&self) -> PostOpKind {
        self.kind
    }

    pub fn data_type(&self) -> DType {
        self.data_type
    }

    /// Check that every parameter the kind needs is finite and
    /// representable in `data_type`.
    ///
    /// This does not decide whether the (kind, dtype) pair can be
    /// compiled; that is reported as `UnsupportedPostOp` by the compiler.
    pub fn validate(&self) -> Result<()> {
        let op = self.kind.name();
        match self.kind {
            PostOpKind::Relu { alpha } | PostOpKind::Swish { alpha } => {
                require_param(op, "alpha", alpha, self.data_type)
            }
            PostOpKind::Linear { alpha, beta } => {
                require_param(op, "alpha", alpha, self.data_type)?;
                require_param(op, "beta", beta, self.data_type)
            }
            PostOpKind::Clip { min, max } => {
                require_param(op, "min", min, self.data_type)?;
                require_param(op, "max", max, self.data_type)?;
                if min > max {
                    return Err(invalid(op, format!("min {} exceeds max {}", min, max)));
                }
                if let Some((lo, hi)) = self.data_type.integer_bounds() {
                    for (name, bound) in [("min", min), ("max", max)] {
                        if bound.fract() != 0.0 {
                            return Err(invalid(op, format!(
                                "{} {} is not integral for {}",
                                name, bound, self.data_type
                            )));
                        }
                        if bound < lo as f32 || bound > hi as f32 {
                            return Err(invalid(op, format!(
                                "{} {} outside {} range [{}, {}]",
                                name, bound, self.data_type, lo, hi
                            )));
                        }
                    }
                }
                Ok(())
            }
            PostOpKind::Quantize { scale, zero_point }
            | PostOpKind::Dequantize { scale, zero_point } => {
                require_param(op, "scale", scale, self.data_type)?;
                if scale <= 0.0 {
                    return Err(invalid(op, format!("scale must be positive, got {}", scale)));
                }
                if let Some((lo, hi)) = self.data_type.integer_bounds() {
                    if zero_point < lo || zero_point > hi {
                        return Err(invalid(op, format!(
                            "zero_point {} outside {} range [{}, {}]",
                            zero_point, self.data_type, lo, hi
                        )));
                    }
                }
                Ok(())
            }
            PostOpKind::Gelu
            | PostOpKind::Tanh
            | PostOpKind::Sigmoid
            | PostOpKind::Exp
            | PostOpKind::LowPrecisionExp
            | PostOpKind::Cast => Ok(()),
        }
    }
}

fn invalid(op: &'static str, reason: String) -> KoreError {
    KoreError::InvalidPostOp { op, reason }
}

// Float params must be finite and, for a float attr, fit its dtype.
fn require_param(op: &'static str, name: &str, value: f32, data_type: DType) -> Result<()> {
    if !value.is_finite() {
        return Err(invalid(op, format!("{} must be finite, got {}", name, value)));
    }
    if let Some(max) = data_type.float_max() {
        if value.abs() > max {
            return Err(invalid(op, format!(
                "{} {} overflows {} (max {})",
                name, value, data_type, max
            )));
        }
    }
    Ok(())
}

impl fmt::Display for PostOpAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.kind.name(), self.data_type)?;
        match self.kind {
            PostOpKind::Relu { alpha } if alpha != 0.0 => write!(f, "(alpha={})", alpha),
            PostOpKind::Swish { alpha } => write!(f, "(alpha={})", alpha),
            PostOpKind::Linear { alpha, beta } => write!(f, "(alpha={}, beta={})", alpha, beta),
            PostOpKind::Clip { min, max } => write!(f, "({}, {})", min, max),
            PostOpKind::Quantize { scale, zero_point }
            | PostOpKind::Dequantize { scale, zero_point } => {
                write!(f, "(scale={}, zp={})", scale, zero_point)
            }
            _ => Ok(()),
        }
    }
}
