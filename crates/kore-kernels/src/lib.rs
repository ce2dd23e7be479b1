//! # kore-kernels
//!
//! Elementwise post-op kernel engine for Kore.
//!
//! Provides:
//! - Post-op descriptors (activations, quantize/dequantize, cast, clip, linear)
//! - Kernel descriptors with a deterministic per-thread work partition
//! - A compiler that lowers a (dtype, post-op chain) pair into a specialized
//!   batch kernel, or into a 256-entry lookup table for 8-bit inputs
//! - A process-lifetime kernel cache keyed by (dtype, chain)
//! - Range executor plus a rayon-backed dispatch layer
//! - Runtime SIMD capability detection for the batch width

pub mod activation;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod descriptor;
pub mod dispatch;
pub mod engine;
pub mod executor;
pub mod partition;
pub mod postop;
pub mod simd;

pub use cache::{CacheStats, KernelCache, KernelHandle};
pub use compiler::{CompileOptions, CompiledKernel};
pub use config::EngineConfig;
pub use descriptor::{build_descriptor, KernelDescriptor, KernelKey};
pub use engine::EltwiseEngine;
pub use executor::{run, run_in_place};
pub use partition::Partition;
pub use postop::{PostOpAttr, PostOpKind};
pub use simd::SimdCapability;
