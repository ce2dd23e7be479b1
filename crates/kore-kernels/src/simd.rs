//! Runtime SIMD capability detection.
//!
//! The compiled kernels are plain Rust loops over fixed-width batches; the
//! detected vector width only decides how many f32 lanes one batch holds
//! so the autovectorizer can fill a full register per stage.

use std::sync::OnceLock;

/// SIMD capabilities detected at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimdCapability {
    pub avx2: bool,
    pub avx512f: bool,
    pub neon: bool,
    pub fma: bool,
}

static DETECTED: OnceLock<SimdCapability> = OnceLock::new();

impl SimdCapability {
    /// Detect SIMD capabilities for the current CPU (cached after first call).
    pub fn detect() -> &'static SimdCapability {
        DETECTED.get_or_init(|| {
            #[cfg(target_arch = "x86_64")]
            {
                SimdCapability {
                    avx2: is_x86_feature_detected!("avx2"),
                    avx512f: is_x86_feature_detected!("avx512f"),
                    fma: is_x86_feature_detected!("fma"),
                    neon: false,
                }
            }

            #[cfg(target_arch = "aarch64")]
            {
                SimdCapability {
                    avx2: false,
                    avx512f: false,
                    fma: false,
                    neon: true, // mandatory on AArch64
                }
            }

            #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
            {
                SimdCapability::scalar()
            }
        })
    }

    pub const fn scalar() -> Self {
        SimdCapability { avx2: false, avx512f: false, neon: false, fma: false }
    }

    /// Best available SIMD tier as a human-readable string.
    pub fn best_tier(&self) -> &'static str {
        if self.avx512f {
            "AVX-512"
        } else if self.avx2 {
            "AVX2"
        } else if self.neon {
            "NEON"
        } else {
            "scalar"
        }
    }

    /// f32 lanes per kernel batch for this tier.
    ///
    /// Scalar targets still batch 8 wide: the per-batch stage dispatch
    /// is what gets amortized there, not register width.
    pub fn preferred_lanes(&self) -> usize {
        if self.avx512f {
            16
        } else if self.neon {
            4
        } else {
            8
        }
    }
}
