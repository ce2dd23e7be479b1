//! Caller-side concurrency: one executor call per partition range.
//!
//! `dst` is split into disjoint sub-views along the partition boundaries,
//! so every worker holds exclusive write access to exactly its own range.

use rayon::prelude::*;
use rayon::ThreadPool;

use kore_core::{BufferView, BufferViewMut};

use crate::compiler::CompiledKernel;
use crate::executor;
use crate::partition::Partition;

/// Split `dst` into one sub-view per partition range, in thread order.
fn split_by_partition<'a>(partition: &Partition, dst: BufferViewMut<'a>) -> Vec<BufferViewMut<'a>> {
    let mut parts = Vec::with_capacity(partition.thread_count());
    let mut rest = dst;
    for range in partition.ranges() {
        let (part, tail) = rest.split_at(range.end);
        parts.push(part);
        rest = tail;
    }
    parts
}

/// Run `kernel` over every range of `partition` on `pool`.
///
/// `dst` must start at global index 0 and hold at least
/// `partition.element_count()` elements.
pub fn run_partitioned(
    pool: &ThreadPool,
    kernel: &CompiledKernel,
    partition: &Partition,
    src: &BufferView<'_>,
    dst: BufferViewMut<'_>,
) {
    let mut parts = split_by_partition(partition, dst);
    pool.install(|| {
        parts.par_iter_mut().for_each(|part| {
            let range = part.range();
            executor::run(kernel, src, part, range);
        });
    });
}

/// Same ranges as [`run_partitioned`], one after another on the calling thread.
pub fn run_serial(
    kernel: &CompiledKernel,
    partition: &Partition,
    src: &BufferView<'_>,
    dst: &mut BufferViewMut<'_>,
) {
    for range in partition.ranges() {
        executor::run(kernel, src, dst, range);
    }
}
