//! Engine configuration.

use std::num::NonZeroUsize;
use std::path::Path;

use serde::{Deserialize, Serialize};

use kore_core::{KoreError, Result};

use crate::compiler::{CompileOptions, MAX_LANES};
use crate::simd::SimdCapability;

/// Configuration for an [`EltwiseEngine`](crate::EltwiseEngine).
///
/// The thread count is always supplied by the caller; the engine never
/// infers it from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads per request; also the partition width. Must be >= 1.
    pub thread_count: usize,

    /// Collapse 8-bit-input kernels into 256-entry lookup tables.
    pub lookup_tables: bool,

    /// f32 lanes per batch. `None` picks a width from the detected SIMD tier.
    pub batch_lanes: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_count: 1,
            lookup_tables: true,
            batch_lanes: None,
        }
    }
}

impl EngineConfig {
    pub fn with_threads(thread_count: usize) -> Self {
        Self { thread_count, ..Self::default() }
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| KoreError::Config(format!("invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| KoreError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            return Err(KoreError::Config("thread_count must be at least 1".into()));
        }
        if let Some(lanes) = self.batch_lanes {
            if lanes == 0 || lanes > MAX_LANES {
                return Err(KoreError::Config(format!(
                    "batch_lanes must be in 1..={}, got {}",
                    MAX_LANES, lanes
                )));
            }
        }
        Ok(())
    }

    /// Thread count as the partitioner takes it.
    pub fn threads(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.thread_count)
            .ok_or_else(|| KoreError::Config("thread_count must be at least 1".into()))
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            lanes: self
                .batch_lanes
                .unwrap_or_else(|| SimdCapability::detect().preferred_lanes()),
            lookup_tables: self.lookup_tables,
        }
    }
}
