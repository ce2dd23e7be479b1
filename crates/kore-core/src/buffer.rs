//! Borrowed views over caller-owned element buffers.
//!
//! The engine never allocates or frees element storage. A view pairs a
//! byte slice with its dtype and the global index (`base`) of its first
//! element, so a buffer split into disjoint per-thread pieces still
//! addresses elements by their position in the whole tensor.

use std::ops::Range;

use half::{bf16, f16};

use crate::{DType, KoreError, Result};

fn check_len(nbytes: usize, dtype: DType) -> Result<()> {
    if nbytes % dtype.element_size() != 0 {
        return Err(KoreError::StorageError(format!(
            "{} bytes is not a whole number of {} elements",
            nbytes, dtype
        )));
    }
    Ok(())
}

/// Read-only view over a caller-owned buffer.
#[derive(Debug, Clone, Copy)]
pub struct BufferView<'a> {
    bytes: &'a [u8],
    dtype: DType,
    base: usize,
}

impl<'a> BufferView<'a> {
    /// Wrap raw bytes holding elements of `dtype`.
    pub fn new(bytes: &'a [u8], dtype: DType) -> Result<Self> {
        check_len(bytes.len(), dtype)?;
        Ok(Self { bytes, dtype, base: 0 })
    }

    pub fn from_f32(data: &'a [f32]) -> Self {
        Self { bytes: bytemuck::cast_slice(data), dtype: DType::F32, base: 0 }
    }

    pub fn from_bf16(data: &'a [bf16]) -> Self {
        Self { bytes: bytemuck::cast_slice(data), dtype: DType::BF16, base: 0 }
    }

    pub fn from_f16(data: &'a [f16]) -> Self {
        Self { bytes: bytemuck::cast_slice(data), dtype: DType::F16, base: 0 }
    }

    pub fn from_i8(data: &'a [i8]) -> Self {
        Self { bytes: bytemuck::cast_slice(data), dtype: DType::I8, base: 0 }
    }

    pub fn from_u8(data: &'a [u8]) -> Self {
        Self { bytes: data, dtype: DType::U8, base: 0 }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Number of elements in the view.
    pub fn len(&self) -> usize {
        self.bytes.len() / self.dtype.element_size()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Global index of the first element.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Global element range addressed by this view.
    pub fn range(&self) -> Range<usize> {
        self.base..self.base + self.len()
    }

    /// Whether `range` (global indices) lies inside this view.
    pub fn covers(&self, range: &Range<usize>) -> bool {
        range.start <= range.end && range.start >= self.base && range.end <= self.base + self.len()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Bytes of the elements in `range` (global indices).
    ///
    /// Panics if `range` is not covered by the view.
    pub fn elements(&self, range: Range<usize>) -> &'a [u8] {
        let size = self.dtype.element_size();
        let start = (range.start - self.base) * size;
        let end = (range.end - self.base) * size;
        &self.bytes[start..end]
    }
}

/// Mutable view over a caller-owned buffer.
///
/// Splitting consumes the view and yields disjoint halves, which is how
/// parallel workers get non-overlapping write access to one `dst`.
#[derive(Debug)]
pub struct BufferViewMut<'a> {
    bytes: &'a mut [u8],
    dtype: DType,
    base: usize,
}

impl<'a> BufferViewMut<'a> {
    /// Wrap raw mutable bytes holding elements of `dtype`.
    pub fn new(bytes: &'a mut [u8], dtype: DType) -> Result<Self> {
        check_len(bytes.len(), dtype)?;
        Ok(Self { bytes, dtype, base: 0 })
    }

    pub fn from_f32(data: &'a mut [f32]) -> Self {
        Self { bytes: bytemuck::cast_slice_mut(data), dtype: DType::F32, base: 0 }
    }

    pub fn from_bf16(data: &'a mut [bf16]) -> Self {
        Self { bytes: bytemuck::cast_slice_mut(data), dtype: DType::BF16, base: 0 }
    }

    pub fn from_f16(data: &'a mut [f16]) -> Self {
        Self { bytes: bytemuck::cast_slice_mut(data), dtype: DType::F16, base: 0 }
    }

    pub fn from_i8(data: &'a mut [i8]) -> Self {
        Self { bytes: bytemuck::cast_slice_mut(data), dtype: DType::I8, base: 0 }
    }

    pub fn from_u8(data: &'a mut [u8]) -> Self {
        Self { bytes: data, dtype: DType::U8, base: 0 }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / self.dtype.element_size()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn range(&self) -> Range<usize> {
        self.base..self.base + self.len()
    }

    pub fn covers(&self, range: &Range<usize>) -> bool {
        range.start <= range.end && range.start >= self.base && range.end <= self.base + self.len()
    }

    /// Mutable bytes of the elements in `range` (global indices).
    ///
    /// Panics if `range` is not covered by the view.
    pub fn elements_mut(&mut self, range: Range<usize>) -> &mut [u8] {
        let size = self.dtype.element_size();
        let start = (range.start - self.base) * size;
        let end = (range.end - self.base) * size;
        &mut self.bytes[start..end]
    }

    /// Split at global element index `at` into `[base, at)` and `[at, end)`.
    ///
    /// Panics if `at` is outside the view.
    pub fn split_at(self, at: usize) -> (BufferViewMut<'a>, BufferViewMut<'a>) {
        assert!(
            at >= self.base && at <= self.base + self.len(),
            "split index {} outside view {:?}",
            at,
            self.range()
        );
        let size = self.dtype.element_size();
        let (left, right) = self.bytes.split_at_mut((at - self.base) * size);
        (
            BufferViewMut { bytes: left, dtype: self.dtype, base: self.base },
            BufferViewMut { bytes: right, dtype: self.dtype, base: at },
        )
    }
}
