//! Lowering of a (dtype, post-op chain) pair into an executable kernel.
//!
//! Every post-op is matched on exactly once, here, and turned into a
//! boxed batch closure over `&mut [f32]`. Per-dtype rounding is picked by
//! monomorphizing [`float_stage`], and loaders/storers are plain function
//! pointers chosen from the boundary dtypes. At run time a kernel walks
//! its input in batches of `lanes` elements: load, every stage over the
//! whole batch, store.
//!
//! Kernels whose input is one byte wide can be collapsed further into a
//! 256-entry lookup table by evaluating the staged kernel over every
//! input bit pattern.

use std::fmt;
use std::time::Instant;

use half::{bf16, f16};

use kore_core::{DType, KoreError, Result};

use crate::activation::{gelu, low_precision_exp, sigmoid};
use crate::descriptor::KernelKey;
use crate::postop::{PostOpAttr, PostOpKind};
use crate::simd::SimdCapability;

/// Upper bound on the batch width; sizes the executor's stack scratch.
pub const MAX_LANES: usize = 64;

type StageFn = Box<dyn Fn(&mut [f32]) + Send + Sync>;
type LoadFn = fn(&[u8], &mut [f32]);
type StoreFn = fn(&[f32], &mut [u8]);

/// Code-generation knobs shared by every kernel a cache compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// f32 lanes per batch, clamped to `1..=MAX_LANES`.
    pub lanes: usize,
    /// Collapse 8-bit-input kernels into 256-entry lookup tables.
    pub lookup_tables: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            lanes: SimdCapability::detect().preferred_lanes(),
            lookup_tables: true,
        }
    }
}

enum KernelBody {
    Staged {
        load: LoadFn,
        stages: Vec<StageFn>,
        store: StoreFn,
    },
    /// `table[b * out_size..][..out_size]` holds the output for input byte `b`.
    Lookup { table: Box<[u8]> },
}

/// Stateless executable for one (dtype, post-op chain) pair.
///
/// Safe to invoke from many threads at once on disjoint ranges.
pub struct CompiledKernel {
    key: KernelKey,
    input: DType,
    output: DType,
    lanes: usize,
    body: KernelBody,
}

impl fmt::Debug for CompiledKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledKernel")
            .field("key", &self.key.to_string())
            .field("input", &self.input)
            .field("output", &self.output)
            .field("lanes", &self.lanes)
            .field("lookup_table", &self.is_lookup_table())
            .finish()
    }
}

impl CompiledKernel {
    pub fn key(&self) -> &KernelKey {
        &self.key
    }

    /// Dtype the kernel reads from `src`.
    pub fn input_dtype(&self) -> DType {
        self.input
    }

    /// Dtype the kernel writes to `dst` (the chain's final working type).
    pub fn output_dtype(&self) -> DType {
        self.output
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    pub fn is_lookup_table(&self) -> bool {
        matches!(self.body, KernelBody::Lookup { .. })
    }

    /// Whether the kernel may overwrite its own input buffer.
    pub fn in_place_compatible(&self) -> bool {
        self.input.element_size() == self.output.element_size()
    }

    /// Transform whole input elements in `src` into `dst`.
    ///
    /// `src` and `dst` must hold the same number of elements.
    pub(crate) fn apply(&self, src: &[u8], dst: &mut [u8]) {
        let in_size = self.input.element_size();
        let out_size = self.output.element_size();
        debug_assert_eq!(src.len() / in_size, dst.len() / out_size);

        match &self.body {
            KernelBody::Staged { load, stages, store } => {
                let mut scratch = [0.0f32; MAX_LANES];
                let src_batches = src.chunks(self.lanes * in_size);
                let dst_batches = dst.chunks_mut(self.lanes * out_size);
                for (s, d) in src_batches.zip(dst_batches) {
                    let batch = &mut scratch[..s.len() / in_size];
                    load(s, batch);
                    for stage in stages {
                        stage(batch);
                    }
                    store(batch, d);
                }
            }
            KernelBody::Lookup { table } => {
                for (&b, d) in src.iter().zip(dst.chunks_exact_mut(out_size)) {
                    let at = b as usize * out_size;
                    d.copy_from_slice(&table[at..at + out_size]);
                }
            }
        }
    }

    /// Transform `buf` in place. Requires [`Self::in_place_compatible`].
    pub(crate) fn apply_in_place(&self, buf: &mut [u8]) {
        debug_assert!(self.in_place_compatible());
        let size = self.input.element_size();

        match &self.body {
            KernelBody::Staged { load, stages, store } => {
                let mut scratch = [0.0f32; MAX_LANES];
                for chunk in buf.chunks_mut(self.lanes * size) {
                    let batch = &mut scratch[..chunk.len() / size];
                    load(&*chunk, batch);
                    for stage in stages {
                        stage(batch);
                    }
                    store(batch, chunk);
                }
            }
            KernelBody::Lookup { table } => {
                // One-byte in and out.
                for b in buf.iter_mut() {
                    *b = table[*b as usize];
                }
            }
        }
    }

    fn into_lookup_table(self) -> Self {
        let patterns: Vec<u8> = (0..=u8::MAX).collect();
        let mut table = vec![0u8; patterns.len() * self.output.element_size()];
        self.apply(&patterns, &mut table);
        Self {
            body: KernelBody::Lookup { table: table.into_boxed_slice() },
            ..self
        }
    }
}

/// Compile `key` into a kernel.
///
/// Fails with `InvalidPostOp` for malformed parameters and with
/// `UnsupportedPostOp` when a stage has no specialization for its dtype
/// or does not accept the working dtype the chain hands it.
pub fn compile(key: &KernelKey, options: &CompileOptions) -> Result<CompiledKernel> {
    let started = Instant::now();
    let input = key.data_type();

    let mut working = input;
    let mut stages = Vec::with_capacity(key.chain().len());
    for attr in key.chain() {
        attr.validate()?;
        let (stage, next) = lower(attr, working)?;
        stages.extend(stage);
        working = next;
    }
    let output = working;

    let kernel = CompiledKernel {
        key: key.clone(),
        input,
        output,
        lanes: options.lanes.clamp(1, MAX_LANES),
        body: KernelBody::Staged {
            load: loader(input),
            stages,
            store: storer(output),
        },
    };
    let kernel = if options.lookup_tables && input.element_size() == 1 {
        kernel.into_lookup_table()
    } else {
        kernel
    };

    tracing::debug!(
        "compiled eltwise kernel {} -> {} ({}, {} lanes) in {:?}",
        key,
        output,
        if kernel.is_lookup_table() { "lookup" } else { "staged" },
        kernel.lanes,
        started.elapsed(),
    );
    Ok(kernel)
}

fn unsupported(attr: &PostOpAttr, reason: String) -> KoreError {
    KoreError::UnsupportedPostOp {
        op: attr.kind().name(),
        dtype: attr.data_type(),
        reason,
    }
}

fn expect_working(attr: &PostOpAttr, working: DType) -> Result<()> {
    if attr.data_type() != working {
        return Err(unsupported(attr, format!(
            "expects {} input but the chain carries {}",
            attr.data_type(),
            working
        )));
    }
    Ok(())
}

fn expect_activation_input(attr: &PostOpAttr, working: DType) -> Result<()> {
    if !attr.data_type().is_float() {
        return Err(unsupported(attr, "activation requires a float type".into()));
    }
    expect_working(attr, working)
}

/// Lower one attr given the working dtype entering it. Returns the stage
/// (None for pure relabels) and the working dtype it leaves behind.
fn lower(attr: &PostOpAttr, working: DType) -> Result<(Option<StageFn>, DType)> {
    let dt = attr.data_type();
    if attr.kind().is_activation() {
        expect_activation_input(attr, working)?;
    }
    let stage: StageFn = match attr.kind() {
        PostOpKind::Relu { alpha } => float_stage(dt, move |x| if x >= 0.0 { x } else { alpha * x }),
        PostOpKind::Gelu => float_stage(dt, gelu),
        PostOpKind::Tanh => float_stage(dt, f32::tanh),
        PostOpKind::Sigmoid => float_stage(dt, sigmoid),
        PostOpKind::Exp => float_stage(dt, f32::exp),
        PostOpKind::LowPrecisionExp => float_stage(dt, low_precision_exp),
        PostOpKind::Swish { alpha } => float_stage(dt, move |x| x * sigmoid(alpha * x)),
        PostOpKind::Linear { alpha, beta } => float_stage(dt, move |x| alpha * x + beta),
        PostOpKind::Clip { min, max } => {
            expect_working(attr, working)?;
            if dt.is_float() {
                float_stage(dt, move |x| x.clamp(min, max))
            } else {
                // Integer bounds are validated integral; the value stays integral.
                Box::new(move |batch: &mut [f32]| {
                    for v in batch.iter_mut() {
                        *v = v.clamp(min, max);
                    }
                })
            }
        }
        PostOpKind::Quantize { scale, zero_point } => {
            let (lo, hi) = dt.integer_bounds().ok_or_else(|| {
                unsupported(attr, "quantize target must be an integer type".into())
            })?;
            if !working.is_float() {
                return Err(unsupported(attr, format!(
                    "expects a float input but the chain carries {}",
                    working
                )));
            }
            let (lo, hi, zp) = (lo as f32, hi as f32, zero_point as f32);
            Box::new(move |batch: &mut [f32]| {
                for v in batch.iter_mut() {
                    *v = saturate((*v / scale).round_ties_even() + zp, lo, hi);
                }
            })
        }
        PostOpKind::Dequantize { scale, zero_point } => {
            if !dt.is_integer() {
                return Err(unsupported(attr, "dequantize source must be an integer type".into()));
            }
            expect_working(attr, working)?;
            let zp = zero_point as f32;
            let stage: StageFn = Box::new(move |batch: &mut [f32]| {
                for v in batch.iter_mut() {
                    *v = (*v - zp) * scale;
                }
            });
            return Ok((Some(stage), DType::F32));
        }
        PostOpKind::Cast => return Ok((cast_stage(working, dt), dt)),
    };
    Ok((Some(stage), dt))
}

/// Wrap a scalar float op, rounding each result to `dt`'s precision.
fn float_stage<F>(dt: DType, f: F) -> StageFn
where
    F: Fn(f32) -> f32 + Send + Sync + 'static,
{
    match dt {
        DType::BF16 => Box::new(move |batch: &mut [f32]| {
            for v in batch.iter_mut() {
                *v = bf16::from_f32(f(*v)).to_f32();
            }
        }),
        DType::F16 => Box::new(move |batch: &mut [f32]| {
            for v in batch.iter_mut() {
                *v = f16::from_f32(f(*v)).to_f32();
            }
        }),
        _ => Box::new(move |batch: &mut [f32]| {
            for v in batch.iter_mut() {
                *v = f(*v);
            }
        }),
    }
}

fn cast_stage(from: DType, to: DType) -> Option<StageFn> {
    if from == to {
        return None;
    }
    match to {
        // Every working value is already an exact f32.
        DType::F32 => None,
        DType::BF16 | DType::F16 => Some(float_stage(to, |x| x)),
        DType::I8 | DType::U8 => {
            let (lo, hi) = to.integer_bounds()?;
            let (lo, hi) = (lo as f32, hi as f32);
            let stage: StageFn = Box::new(move |batch: &mut [f32]| {
                for v in batch.iter_mut() {
                    *v = saturate(v.round_ties_even(), lo, hi);
                }
            });
            Some(stage)
        }
    }
}

/// Clamp into an integer range, sending NaN to 0 the way `store_i8` and
/// `store_u8` do, so later stages see the value that would be stored.
fn saturate(x: f32, lo: f32, hi: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(lo, hi)
    }
}

fn loader(dt: DType) -> LoadFn {
    match dt {
        DType::F32 => load_f32,
        DType::BF16 => load_bf16,
        DType::F16 => load_f16,
        DType::I8 => load_i8,
        DType::U8 => load_u8,
    }
}

fn storer(dt: DType) -> StoreFn {
    match dt {
        DType::F32 => store_f32,
        DType::BF16 => store_bf16,
        DType::F16 => store_f16,
        DType::I8 => store_i8,
        DType::U8 => store_u8,
    }
}

fn load_f32(src: &[u8], dst: &mut [f32]) {
    for (b, v) in src.chunks_exact(4).zip(dst.iter_mut()) {
        *v = f32::from_ne_bytes([b[0], b[1], b[2], b[3]]);
    }
}

fn load_bf16(src: &[u8], dst: &mut [f32]) {
    for (b, v) in src.chunks_exact(2).zip(dst.iter_mut()) {
        *v = bf16::from_bits(u16::from_ne_bytes([b[0], b[1]])).to_f32();
    }
}

fn load_f16(src: &[u8], dst: &mut [f32]) {
    for (b, v) in src.chunks_exact(2).zip(dst.iter_mut()) {
        *v = f16::from_bits(u16::from_ne_bytes([b[0], b[1]])).to_f32();
    }
}

fn load_i8(src: &[u8], dst: &mut [f32]) {
    for (&b, v) in src.iter().zip(dst.iter_mut()) {
        *v = b as i8 as f32;
    }
}

fn load_u8(src: &[u8], dst: &mut [f32]) {
    for (&b, v) in src.iter().zip(dst.iter_mut()) {
        *v = b as f32;
    }
}

fn store_f32(src: &[f32], dst: &mut [u8]) {
    for (v, b) in src.iter().zip(dst.chunks_exact_mut(4)) {
        b.copy_from_slice(&v.to_ne_bytes());
    }
}

fn store_bf16(src: &[f32], dst: &mut [u8]) {
    for (v, b) in src.iter().zip(dst.chunks_exact_mut(2)) {
        b.copy_from_slice(&bf16::from_f32(*v).to_bits().to_ne_bytes());
    }
}

fn store_f16(src: &[f32], dst: &mut [u8]) {
    for (v, b) in src.iter().zip(dst.chunks_exact_mut(2)) {
        b.copy_from_slice(&f16::from_f32(*v).to_bits().to_ne_bytes());
    }
}

// Float-to-int `as` saturates and maps NaN to 0.
fn store_i8(src: &[f32], dst: &mut [u8]) {
    for (v, b) in src.iter().zip(dst.iter_mut()) {
        *b = (*v as i8) as u8;
    }
}

fn store_u8(src: &[f32], dst: &mut [u8]) {
    for (v, b) in src.iter().zip(dst.iter_mut()) {
        *b = *v as u8;
    }
}
