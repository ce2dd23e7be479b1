//! Process-lifetime cache of compiled post-op kernels.
//!
//! The same handful of (dtype, chain) shapes recurs across every layer
//! of a model, so each shape is compiled once and reused for any element
//! count. Lookups take a shared read lock. A miss takes the single
//! upgradable lock, re-checks, compiles while plain readers keep going,
//! and only then upgrades to insert; no key is ever compiled twice.
//!
//! There is no eviction: the set of shapes is fixed per architecture.
//! Failed compilations are not remembered.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use kore_core::Result;

use crate::compiler::{self, CompileOptions, CompiledKernel};
use crate::descriptor::{KernelDescriptor, KernelKey};

/// Shared handle to a cached kernel. The cache keeps its own reference
/// for the lifetime of the cache.
pub type KernelHandle = Arc<CompiledKernel>;

/// Counters for cache behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Successful compilations; equals `entries` since nothing is evicted.
    pub compilations: u64,
    pub entries: usize,
}

pub struct KernelCache {
    kernels: RwLock<HashMap<KernelKey, KernelHandle>>,
    options: CompileOptions,
    hits: AtomicU64,
    misses: AtomicU64,
    compilations: AtomicU64,
}

impl fmt::Debug for KernelCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelCache")
            .field("entries", &self.len())
            .field("options", &self.options)
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for KernelCache {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

impl KernelCache {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            kernels: RwLock::new(HashMap::new()),
            options,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            compilations: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Return the kernel for `descriptor`'s (dtype, chain), compiling it
    /// on first use.
    pub fn get_or_compile(&self, descriptor: &KernelDescriptor) -> Result<KernelHandle> {
        self.get_or_compile_key(descriptor.key())
    }

    /// Same as [`Self::get_or_compile`], keyed directly.
    pub fn get_or_compile_key(&self, key: &KernelKey) -> Result<KernelHandle> {
        if let Some(kernel) = self.kernels.read().get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("kernel cache hit: {}", key);
            return Ok(Arc::clone(kernel));
        }

        let guard = self.kernels.upgradable_read();
        // Another thread may have compiled it while we waited.
        if let Some(kernel) = guard.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(kernel));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let kernel = match compiler::compile(key, &self.options) {
            Ok(kernel) => Arc::new(kernel),
            Err(err) => {
                tracing::debug!("kernel compilation rejected for {}: {}", key, err);
                return Err(err);
            }
        };
        self.compilations.fetch_add(1, Ordering::Relaxed);

        let mut map = RwLockUpgradableReadGuard::upgrade(guard);
        map.insert(key.clone(), Arc::clone(&kernel));
        Ok(kernel)
    }

    /// Cached kernel for `key`, if any. Does not touch the counters.
    pub fn get(&self, key: &KernelKey) -> Option<KernelHandle> {
        self.kernels.read().get(key).cloned()
    }

    pub fn contains(&self, key: &KernelKey) -> bool {
        self.kernels.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.kernels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            compilations: self.compilations.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postop::PostOpAttr;
    use kore_core::{DType, KoreError};
    use std::num::NonZeroUsize;
    use std::sync::Barrier;

    fn desc(n: usize, chain: &[PostOpAttr]) -> KernelDescriptor {
        KernelDescriptor::new(n, DType::F32, chain.iter().copied(), NonZeroUsize::MIN).unwrap()
    }

    #[test]
    fn test_same_shape_shares_kernel() {
        let cache = KernelCache::default();
        let chain = [PostOpAttr::relu(DType::F32), PostOpAttr::quantize(DType::I8, 0.1, 0)];
        let a = cache.get_or_compile(&desc(10, &chain)).unwrap();
        let b = cache.get_or_compile(&desc(10_000, &chain)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.compilations, 1);
    }

    #[test]
    fn test_distinct_shapes_get_distinct_kernels() {
        let cache = KernelCache::default();
        let a = cache.get_or_compile(&desc(8, &[PostOpAttr::relu(DType::F32)])).unwrap();
        let b = cache.get_or_compile(&desc(8, &[PostOpAttr::gelu(DType::F32)])).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(a.key()));
        assert!(cache.get(b.key()).is_some());
    }

    #[test]
    fn test_failures_are_not_cached() {
        let cache = KernelCache::default();
        let bad = KernelDescriptor::new(
            4,
            DType::I8,
            [PostOpAttr::tanh(DType::I8)],
            NonZeroUsize::MIN,
        )
        .unwrap();
        for _ in 0..2 {
            let err = cache.get_or_compile(&bad).unwrap_err();
            assert!(matches!(err, KoreError::UnsupportedPostOp { .. }));
        }
        assert!(cache.is_empty());
        let stats = cache.stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.compilations, 0);
    }

    #[test]
    fn test_concurrent_miss_compiles_once() {
        const THREADS: usize = 8;
        let cache = KernelCache::default();
        let barrier = Barrier::new(THREADS);
        let chain = [
            PostOpAttr::gelu(DType::F32),
            PostOpAttr::quantize(DType::U8, 0.05, 128),
        ];

        let kernels: Vec<KernelHandle> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|i| {
                    let cache = &cache;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        cache.get_or_compile(&desc(64 + i, &chain)).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for k in &kernels[1..] {
            assert!(Arc::ptr_eq(&kernels[0], k));
        }
        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.compilations, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, (THREADS - 1) as u64);
    }
}
