//! Range execution of compiled kernels over caller-owned buffers.
//!
//! Neither entry point spawns threads or returns errors. Callers own the
//! concurrency: each worker calls [`run`] once with its own range and its
//! own disjoint piece of `dst`. Precondition checks are debug assertions
//! only.

use std::ops::Range;

use kore_core::{BufferView, BufferViewMut};

use crate::compiler::CompiledKernel;

/// Apply `kernel` to every element index in `range` (global, half-open),
/// reading `src[i]` and writing the chain output to `dst[i]`.
///
/// `src` must carry the kernel's input dtype and `dst` its output dtype,
/// and both views must cover `range`.
pub fn run(kernel: &CompiledKernel, src: &BufferView<'_>, dst: &mut BufferViewMut<'_>, range: Range<usize>) {
    debug_assert_eq!(src.dtype(), kernel.input_dtype(), "src dtype");
    debug_assert_eq!(dst.dtype(), kernel.output_dtype(), "dst dtype");
    debug_assert!(src.covers(&range), "range {:?} outside src {:?}", range, src.range());
    debug_assert!(dst.covers(&range), "range {:?} outside dst {:?}", range, dst.range());

    if range.is_empty() {
        return;
    }
    kernel.apply(src.elements(range.clone()), dst.elements_mut(range));
}

/// Apply `kernel` to `buf[range]`, overwriting the input.
///
/// Only valid for kernels whose input and output element sizes match
/// (see [`CompiledKernel::in_place_compatible`]).
pub fn run_in_place(kernel: &CompiledKernel, buf: &mut BufferViewMut<'_>, range: Range<usize>) {
    debug_assert!(kernel.in_place_compatible(), "kernel {} cannot run in place", kernel.key());
    debug_assert_eq!(buf.dtype(), kernel.input_dtype(), "buf dtype");
    debug_assert!(buf.covers(&range), "range {:?} outside buf {:?}", range, buf.range());

    if range.is_empty() {
        return;
    }
    kernel.apply_in_place(buf.elements_mut(range));
}
