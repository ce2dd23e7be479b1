//! # kore-core
//!
//! Foundational types shared by the Kore kernel crates:
//! - Element dtypes (F32, BF16, F16, I8, U8) with integer saturation bounds
//! - The `KoreError` taxonomy and `Result` alias
//! - Borrowed buffer views over caller-owned element storage

pub mod buffer;
pub mod dtype;
pub mod error;

pub use buffer::{BufferView, BufferViewMut};
pub use dtype::DType;
pub use error::KoreError;

pub type Result<T> = std::result::Result<T, KoreError>;
