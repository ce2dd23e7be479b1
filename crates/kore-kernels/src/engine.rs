//! Checked entry point tying config, cache and dispatch together.
//!
//! The engine owns one kernel cache and one rayon pool sized from the
//! configured thread count. Buffer dtypes and sizes are validated here,
//! once per request, so the executor underneath can stay assertion-only.

use std::fmt;

use rayon::{ThreadPool, ThreadPoolBuilder};

use kore_core::{BufferView, BufferViewMut, DType, KoreError, Result};

use crate::cache::{KernelCache, KernelHandle};
use crate::config::EngineConfig;
use crate::descriptor::KernelDescriptor;
use crate::dispatch;
use crate::postop::PostOpAttr;
use crate::simd::SimdCapability;

pub struct EltwiseEngine {
    config: EngineConfig,
    cache: KernelCache,
    pool: ThreadPool,
}

impl fmt::Debug for EltwiseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EltwiseEngine")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("pool_threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl EltwiseEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let options = config.compile_options();
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.thread_count)
            .thread_name(|i| format!("kore-eltwise-{}", i))
            .build()
            .map_err(|e| KoreError::Config(format!("failed to build thread pool: {}", e)))?;

        tracing::info!(
            "eltwise engine: {} threads, simd {}, {} lanes, lookup tables {}",
            config.thread_count,
            SimdCapability::detect().best_tier(),
            options.lanes,
            if options.lookup_tables { "on" } else { "off" },
        );

        Ok(Self {
            cache: KernelCache::new(options),
            config,
            pool,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &KernelCache {
        &self.cache
    }

    /// Build a descriptor partitioned over the configured thread count.
    pub fn build_descriptor(
        &self,
        element_count: usize,
        data_type: DType,
        postop_chain: impl IntoIterator<Item = PostOpAttr>,
    ) -> Result<KernelDescriptor> {
        KernelDescriptor::new(element_count, data_type, postop_chain, self.config.threads()?)
    }

    pub fn get_or_compile(&self, descriptor: &KernelDescriptor) -> Result<KernelHandle> {
        self.cache.get_or_compile(descriptor)
    }

    /// Run `descriptor`'s chain over `src` into `dst`.
    ///
    /// Both views must start at element 0 and hold at least
    /// `descriptor.element_count()` elements of the kernel's input and
    /// output dtype respectively. Descriptors partitioned over more than
    /// one thread run on the engine's pool.
    pub fn execute(
        &self,
        descriptor: &KernelDescriptor,
        src: &BufferView<'_>,
        mut dst: BufferViewMut<'_>,
    ) -> Result<()> {
        let kernel = self.get_or_compile(descriptor)?;
        let n = descriptor.element_count();

        if src.dtype() != kernel.input_dtype() {
            return Err(KoreError::DTypeMismatch { expected: kernel.input_dtype(), got: src.dtype() });
        }
        if dst.dtype() != kernel.output_dtype() {
            return Err(KoreError::DTypeMismatch { expected: kernel.output_dtype(), got: dst.dtype() });
        }
        check_extent("src", src.base(), src.len(), n)?;
        check_extent("dst", dst.base(), dst.len(), n)?;

        let partition = descriptor.partition();
        if partition.thread_count() == 1 {
            dispatch::run_serial(&kernel, partition, src, &mut dst);
        } else {
            let (dst, _) = dst.split_at(n);
            dispatch::run_partitioned(&self.pool, &kernel, partition, src, dst);
        }
        Ok(())
    }
}

fn check_extent(name: &str, base: usize, len: usize, element_count: usize) -> Result<()> {
    if base != 0 {
        return Err(KoreError::StorageError(format!(
            "{} view starts at element {}, expected 0",
            name, base
        )));
    }
    if len < element_count {
        return Err(KoreError::StorageError(format!(
            "{} too small: need {} elements, got {}",
            name, element_count, len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn engine(threads: usize) -> EltwiseEngine {
        EltwiseEngine::new(EngineConfig::with_threads(threads)).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = EltwiseEngine::new(EngineConfig::with_threads(0)).unwrap_err();
        assert!(matches!(err, KoreError::Config(_)));
    }

    #[test]
    fn test_descriptor_uses_configured_threads() {
        let engine = engine(3);
        let desc = engine.build_descriptor(10, DType::F32, [PostOpAttr::relu(DType::F32)]).unwrap();
        assert_eq!(desc.thread_count(), 3);
        let ranges: Vec<_> = desc.partition().ranges().collect();
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);
    }

    #[test]
    fn test_execute_dequantize_relu() {
        let engine = engine(3);
        let desc = engine
            .build_descriptor(
                10,
                DType::I8,
                [PostOpAttr::dequantize(DType::I8, 0.5, 10), PostOpAttr::relu(DType::F32)],
            )
            .unwrap();
        let input: Vec<i8> = (0..10).map(|i| i * 2 + 4).collect();
        let mut output = vec![0.0f32; 10];
        engine
            .execute(&desc, &BufferView::from_i8(&input), BufferViewMut::from_f32(&mut output))
            .unwrap();

        let expected: Vec<f32> = input.iter().map(|&q| ((q as f32 - 10.0) * 0.5).max(0.0)).collect();
        assert_eq!(output, expected);
    }

    #[test]
    fn test_execute_leaves_tail_untouched() {
        let engine = engine(2);
        let desc = engine
            .build_descriptor(5, DType::F32, [PostOpAttr::linear(DType::F32, 0.0, 1.0)])
            .unwrap();
        let input = [0.0f32; 8];
        let mut output = [-1.0f32; 8];
        engine
            .execute(&desc, &BufferView::from_f32(&input), BufferViewMut::from_f32(&mut output))
            .unwrap();
        assert_eq!(output, [1.0, 1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_execute_checks_dtypes() {
        let engine = engine(1);
        let desc = engine
            .build_descriptor(4, DType::F32, [PostOpAttr::quantize(DType::I8, 0.1, 0)])
            .unwrap();
        let input = [0.0f32; 4];

        let mut wrong = [0u8; 4];
        let err = engine
            .execute(&desc, &BufferView::from_f32(&input), BufferViewMut::from_u8(&mut wrong))
            .unwrap_err();
        assert!(matches!(err, KoreError::DTypeMismatch { expected: DType::I8, got: DType::U8 }));

        let ints = [0i8; 4];
        let mut out = [0i8; 4];
        let err = engine
            .execute(&desc, &BufferView::from_i8(&ints), BufferViewMut::from_i8(&mut out))
            .unwrap_err();
        assert!(matches!(err, KoreError::DTypeMismatch { expected: DType::F32, got: DType::I8 }));
    }

    #[test]
    fn test_execute_checks_sizes() {
        let engine = engine(2);
        let desc = engine.build_descriptor(6, DType::F32, Vec::<PostOpAttr>::new()).unwrap();
        let input = [0.0f32; 6];
        let mut short = [0.0f32; 5];
        let err = engine
            .execute(&desc, &BufferView::from_f32(&input), BufferViewMut::from_f32(&mut short))
            .unwrap_err();
        assert!(matches!(err, KoreError::StorageError(_)));

        let mut data = [0.0f32; 12];
        let (_, offset) = BufferViewMut::from_f32(&mut data).split_at(6);
        let err = engine.execute(&desc, &BufferView::from_f32(&input), offset).unwrap_err();
        assert!(matches!(err, KoreError::StorageError(_)));
    }

    #[test]
    fn test_unsupported_chain_surfaces_each_time() {
        let engine = engine(1);
        let desc = engine.build_descriptor(4, DType::U8, [PostOpAttr::exp(DType::U8)]).unwrap();
        for _ in 0..3 {
            assert!(matches!(
                engine.get_or_compile(&desc),
                Err(KoreError::UnsupportedPostOp { op: "exp", .. })
            ));
        }
        assert!(engine.cache().is_empty());
    }

    #[test]
    fn test_kernels_shared_across_sizes() {
        let engine = engine(4);
        let chain = [PostOpAttr::sigmoid(DType::F32)];
        let a = engine.get_or_compile(&engine.build_descriptor(3, DType::F32, chain).unwrap()).unwrap();
        let b = engine.get_or_compile(&engine.build_descriptor(3000, DType::F32, chain).unwrap()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(engine.cache().stats().compilations, 1);
    }
}
