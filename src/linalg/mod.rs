//! Dense linear algebra on 2-D Float32/Float64 tensors
//!
//! Tensors are converted to column-major host buffers, handed to the routines in
//! [`lapack`], and the results are transposed back to row-major tensors.

pub mod det;
pub mod inverse;
pub mod lapack;
pub mod least_squares;
pub mod lu;
pub mod matmul;
pub mod solve;
pub mod tri;

pub use det::det;
pub use inverse::inverse;
pub use least_squares::least_squares;
pub use lu::{lu, lu_ipiv};
pub use matmul::matmul;
pub use solve::solve;
pub use tri::{tril, triu, triul};

use crate::context::Context;
use crate::dispatch::Element;
use crate::error::{CoreError, CoreResult};
use crate::tensor::{Device, Tensor};

impl Tensor {
    /// Matrix product; `rhs` may be a vector treated as one column.
    pub fn matmul(&self, rhs: &Tensor) -> CoreResult<Tensor> {
        matmul(self, rhs)
    }

    pub fn inverse(&self) -> CoreResult<Tensor> {
        inverse(self)
    }

    /// `X` with `self * X = b` for square `self`.
    pub fn solve(&self, b: &Tensor) -> CoreResult<Tensor> {
        solve(self, b)
    }

    /// Packed LU factors and 1-based Int32 pivots.
    pub fn lu_ipiv(&self) -> CoreResult<(Tensor, Tensor)> {
        lu_ipiv(self)
    }

    /// `(P, L, U)` with `self = P * L * U`; with `permute_l` the second factor is `P * L`.
    pub fn lu(&self, permute_l: bool) -> CoreResult<(Tensor, Tensor, Tensor)> {
        lu(self, permute_l)
    }

    pub fn det(&self) -> CoreResult<f64> {
        det(self)
    }

    /// Minimizes `|self * X - b|` for `rows >= cols`.
    pub fn least_squares(&self, b: &Tensor) -> CoreResult<Tensor> {
        least_squares(self, b)
    }

    pub fn triu(&self, diagonal: i64) -> CoreResult<Tensor> {
        triu(self, diagonal)
    }

    pub fn tril(&self, diagonal: i64) -> CoreResult<Tensor> {
        tril(self, diagonal)
    }

    /// Upper part and unit-diagonal lower part in one call.
    pub fn triul(&self, diagonal: i64) -> CoreResult<(Tensor, Tensor)> {
        triul(self, diagonal)
    }
}

pub(crate) fn ensure_cpu(tensor: &Tensor, op: &str) -> CoreResult<()> {
    if tensor.device().is_cpu() {
        Ok(())
    } else {
        Err(CoreError::device_error(
            &tensor.device().to_string(),
            &format!("{} has no kernel for this device", op),
        ))
    }
}

/// `(rows, cols)` of a 2-D tensor.
pub(crate) fn matrix_dims(tensor: &Tensor, op: &str) -> CoreResult<(usize, usize)> {
    if tensor.ndim() != 2 {
        return Err(CoreError::shape_error(
            "a 2-D matrix",
            &tensor.shape().to_string(),
            Some(&format!("{} works on matrices only", op)),
        ));
    }
    Ok((tensor.shape()[0] as usize, tensor.shape()[1] as usize))
}

pub(crate) fn square_dim(tensor: &Tensor, op: &str) -> CoreResult<usize> {
    let (rows, cols) = matrix_dims(tensor, op)?;
    if rows != cols {
        return Err(CoreError::shape_error(
            "a square matrix",
            &tensor.shape().to_string(),
            None,
        ));
    }
    Ok(rows)
}

/// Right-hand side as a matrix: vectors become one column.
pub(crate) fn as_columns(b: &Tensor, op: &str) -> CoreResult<Tensor> {
    match b.ndim() {
        1 => b.reshape([b.shape()[0], 1]),
        2 => Ok(b.clone()),
        _ => Err(CoreError::shape_error(
            "a vector or 2-D matrix",
            &b.shape().to_string(),
            Some(&format!("{} works on matrices only", op)),
        )),
    }
}

/// Column-major host copy of a 2-D tensor.
pub(crate) fn to_col_major<T: Element>(tensor: &Tensor) -> CoreResult<Vec<T>> {
    tensor.t()?.contiguous()?.to_vec::<T>()
}

/// Row-major `rows x cols` tensor from column-major data.
pub(crate) fn from_col_major<T: Element>(
    ctx: &Context,
    data: Vec<T>,
    rows: usize,
    cols: usize,
    device: &Device,
) -> CoreResult<Tensor> {
    Tensor::from_vec(ctx, data, [cols as i64, rows as i64], device)?
        .t()?
        .contiguous()
}
