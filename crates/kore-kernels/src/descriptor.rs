//! Kernel descriptors: one elementwise compute request.
//!
//! A descriptor pairs a [`KernelKey`] (boundary dtype + ordered post-op
//! chain) with an element count and the partition derived from it. Only
//! the key takes part in equality and hashing, so descriptors that differ
//! in element count share one compiled kernel.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;

use smallvec::SmallVec;

use kore_core::{DType, Result};

use crate::partition::Partition;
use crate::postop::PostOpAttr;

/// Chains are short in practice (dequant, activation, requant).
pub type PostOpChain = SmallVec<[PostOpAttr; 4]>;

/// Cache identity of a kernel: input dtype plus the ordered chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelKey {
    data_type: DType,
    chain: PostOpChain,
}

impl KernelKey {
    pub fn new(data_type: DType, chain: impl IntoIterator<Item = PostOpAttr>) -> Self {
        Self { data_type, chain: chain.into_iter().collect() }
    }

    pub fn data_type(&self) -> DType {
        self.data_type
    }

    pub fn chain(&self) -> &[PostOpAttr] {
        &self.chain
    }
}

impl fmt::Display for KernelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> [", self.data_type)?;
        for (i, attr) in self.chain.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", attr)?;
        }
        write!(f, "]")
    }
}

/// Immutable compute contract for one elementwise request.
#[derive(Debug, Clone)]
pub struct KernelDescriptor {
    key: KernelKey,
    partition: Partition,
}

impl KernelDescriptor {
    /// Validate every post-op and derive the per-thread partition.
    ///
    /// Fails with `InvalidPostOp` on the first attr whose parameters are
    /// missing, non-finite, or out of range for its dtype.
    pub fn new(
        element_count: usize,
        data_type: DType,
        postop_chain: impl IntoIterator<Item = PostOpAttr>,
        thread_count: NonZeroUsize,
    ) -> Result<Self> {
        let key = KernelKey::new(data_type, postop_chain);
        for attr in key.chain() {
            attr.validate()?;
        }
        Ok(Self {
            key,
            partition: Partition::new(element_count, thread_count),
        })
    }

    pub fn element_count(&self) -> usize {
        self.partition.element_count()
    }

    pub fn data_type(&self) -> DType {
        self.key.data_type()
    }

    pub fn postop_chain(&self) -> &[PostOpAttr] {
        self.key.chain()
    }

    pub fn elements_per_thread(&self) -> usize {
        self.partition.elements_per_thread()
    }

    pub fn remainder_elements(&self) -> usize {
        self.partition.remainder_elements()
    }

    pub fn thread_count(&self) -> usize {
        self.partition.thread_count()
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn key(&self) -> &KernelKey {
        &self.key
    }
}

impl PartialEq for KernelDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for KernelDescriptor {}

impl Hash for KernelDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// Free-function form of [`KernelDescriptor::new`].
pub fn build_descriptor(
    element_count: usize,
    data_type: DType,
    postop_chain: impl IntoIterator<Item = PostOpAttr>,
    thread_count: NonZeroUsize,
) -> Result<KernelDescriptor> {
    KernelDescriptor::new(element_count, data_type, postop_chain, thread_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kore_core::KoreError;
    use std::collections::HashSet;

    fn threads(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_partition_fields() {
        let desc = build_descriptor(10, DType::F32, [PostOpAttr::relu(DType::F32)], threads(3))
            .unwrap();
        assert_eq!(desc.element_count(), 10);
        assert_eq!(desc.elements_per_thread(), 3);
        assert_eq!(desc.remainder_elements(), 1);
        assert_eq!(
            desc.elements_per_thread() * desc.thread_count() + desc.remainder_elements(),
            desc.element_count()
        );
    }

    #[test]
    fn test_invalid_postop_rejected() {
        let err = build_descriptor(
            16,
            DType::F32,
            [PostOpAttr::relu(DType::F32), PostOpAttr::quantize(DType::I8, 0.0, 0)],
            threads(2),
        )
        .unwrap_err();
        assert!(matches!(err, KoreError::InvalidPostOp { op: "quantize", .. }));
    }

    #[test]
    fn test_equality_ignores_element_count() {
        let chain = [PostOpAttr::gelu(DType::F32), PostOpAttr::quantize(DType::U8, 0.1, 128)];
        let a = build_descriptor(100, DType::F32, chain, threads(4)).unwrap();
        let b = build_descriptor(7, DType::F32, chain, threads(1)).unwrap();
        assert_eq!(a, b);

        let set: HashSet<KernelDescriptor> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_chain_order_matters() {
        let clip = PostOpAttr::clip(DType::F32, -1.0, 1.0);
        let relu = PostOpAttr::relu(DType::F32);
        let a = build_descriptor(4, DType::F32, [clip, relu], threads(1)).unwrap();
        let b = build_descriptor(4, DType::F32, [relu, clip], threads(1)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_dtype_participates_in_key() {
        let a = build_descriptor(4, DType::F32, Vec::<PostOpAttr>::new(), threads(1)).unwrap();
        let b = build_descriptor(4, DType::BF16, Vec::<PostOpAttr>::new(), threads(1)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_display() {
        let key = KernelKey::new(
            DType::I8,
            [PostOpAttr::dequantize(DType::I8, 0.5, 10), PostOpAttr::relu(DType::F32)],
        );
        assert_eq!(key.to_string(), "i8 -> [dequantize<i8>(scale=0.5, zp=10), relu<f32>]");
    }
}
