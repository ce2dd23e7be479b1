//! Scalar activation functions used by compiled post-op stages.

use std::f32::consts::LOG2_E;

/// GELU (tanh approximation): 0.5 * x * (1 + tanh(sqrt(2/pi) * (x + 0.044715 * x^3)))
pub fn gelu(x: f32) -> f32 {
    const SQRT_2_OVER_PI: f32 = 0.797_884_6;
    let inner = SQRT_2_OVER_PI * (x + 0.044715 * x * x * x);
    0.5 * x * (1.0 + inner.tanh())
}

/// Sigmoid: 1 / (1 + exp(-x))
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// e^x via 2^(x * log2 e): integer part goes straight into the exponent
/// bits, fractional part through a cubic fit of 2^f on [0, 1).
///
/// Relative error stays below 1e-3; inputs are clamped so the result is
/// always a normal float.
pub fn low_precision_exp(x: f32) -> f32 {
    let t = x.clamp(-87.0, 88.0) * LOG2_E;
    let n = t.floor();
    let f = t - n;
    let p = 1.0 + f * (0.695_976_1 + f * (0.224_940_3 + f * 0.079_083_4));
    // n is in [-126, 126], so the biased exponent is a valid normal.
    let scale = f32::from_bits(((n as i32 + 127) as u32) << 23);
    p * scale
}
