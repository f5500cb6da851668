//! Square linear systems

use crate::dispatch_float_dtype;
use crate::error::{CoreError, CoreResult};
use crate::tensor::Tensor;
use super::lapack::{getrf, getrs};
use super::{as_columns, ensure_cpu, from_col_major, matrix_dims, square_dim, to_col_major};

/// Solve `a * x = b` for square `a`; `x` has the shape of `b`.
pub fn solve(a: &Tensor, b: &Tensor) -> CoreResult<Tensor> {
    b.assert_device(&a.device())?;
    ensure_cpu(a, "Solve")?;
    b.assert_dtype(a.dtype())?;
    let n = square_dim(a, "Solve")?;
    let b_matrix = as_columns(b, "Solve")?;
    let (rows, nrhs) = matrix_dims(&b_matrix, "Solve")?;
    if rows != n {
        return Err(CoreError::shape_error(
            &format!("a right-hand side with {} rows", n),
            &b.shape().to_string(),
            None,
        ));
    }
    let x = dispatch_float_dtype!(a.dtype(), "Solve", T => {
        let mut lu = to_col_major::<T>(a)?;
        let (ipiv, info) = getrf(n, &mut lu);
        if info != 0 {
            return Err(CoreError::linalg_error("getrf", info));
        }
        let mut x = to_col_major::<T>(&b_matrix)?;
        getrs(n, nrhs, &lu, &ipiv, &mut x);
        from_col_major(a.context(), x, n, nrhs, &a.device())
    })?;
    x.reshape(b.shape().clone())
}
