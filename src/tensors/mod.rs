//! Dense tensor primitives.
//!
//! # Core Tensor Utilities
//!
//! This module defines the fixed-shape numeric containers every layer, loss and
//! optimizer is built on:
//!
//! - [`Vector`] and [`Matrix`]: owned, row-major buffers. A matrix is indexed
//!   `[row, col]`, where rows are batch samples and columns are features.
//! - [`VectorView`] and [`MatrixView`]: non-owning windows over an owner's
//!   buffer. A view borrows its owner, so the compiler rejects any use after
//!   the owner is resized, moved or dropped.
//! - [`dot`]: vector and matrix products, including the transposed variants
//!   `Aᵗ·B` and `A·Bᵗ`, computed without materializing a transpose.
//! - [`transform`]: fused per-element maps over one to three same-shaped
//!   operands, written straight into an output buffer.
//!
//! ## Design Highlights
//!
//! - Shapes are fixed at construction and change only through an explicit
//!   `resize`, which reallocates only when the shape actually differs.
//! - Element-wise operations between two tensors require identical shapes and
//!   report [`Error::Dimension`](crate::Error::Dimension) otherwise.
//! - Products accumulate in [`TensorFloat`]; there is no mixed precision.
//!
//! ## Example
//!
//! ```rust
//! use briny_mlp::tensors::{Matrix, TensorOps};
//!
//! let m = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
//! assert_eq!(m.shape(), &[2, 3]);
//! assert_eq!(m[(1, 2)], 6.0);
//! ```

pub mod dot;
pub mod transform;

mod matrix;
mod vector;
mod view;

pub use self::matrix::Matrix;
pub use self::vector::Vector;
pub use self::view::{MatrixView, VectorView};

use crate::error::Result;

/// The float used in tensors (`f32`).
pub type TensorFloat = f32;

/// Read access shared by owned tensors and views.
pub trait TensorOps {
    /// The tensor's shape: `[len]` for vectors, `[rows, cols]` for matrices.
    fn shape(&self) -> &[usize];

    /// The flat, row-major element buffer.
    fn data(&self) -> &[TensorFloat];

    /// Number of elements.
    fn len(&self) -> usize {
        self.data().len()
    }

    /// Whether the tensor holds no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Write access for owned tensors.
pub trait TensorOpsMut: TensorOps {
    /// The flat, row-major element buffer.
    fn data_mut(&mut self) -> &mut [TensorFloat];

    /// Resizes to `shape` if it differs from the current one.
    ///
    /// # Errors
    ///
    /// [`Error::Dimension`](crate::Error::Dimension) when `shape` has a
    /// different rank than this tensor.
    fn resize_to(&mut self, shape: &[usize]) -> Result<()>;
}
