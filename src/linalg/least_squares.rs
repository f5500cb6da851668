//! Least-squares solve via Householder QR

use crate::dispatch_float_dtype;
use crate::error::{CoreError, CoreResult};
use crate::tensor::Tensor;
use super::lapack::gels;
use super::{as_columns, ensure_cpu, from_col_major, matrix_dims, to_col_major};

/// Least-squares solution of `a * x = b` for `a` with at least as many rows as columns.
///
/// `b` is `{m}` or `{m, k}`; the result is `{n}` or `{n, k}`.
pub fn least_squares(a: &Tensor, b: &Tensor) -> CoreResult<Tensor> {
    b.assert_device(&a.device())?;
    ensure_cpu(a, "LeastSquares")?;
    b.assert_dtype(a.dtype())?;
    let (m, n) = matrix_dims(a, "LeastSquares")?;
    if m < n {
        return Err(CoreError::shape_error(
            "a matrix with rows >= cols",
            &a.shape().to_string(),
            None,
        ));
    }
    let b_matrix = as_columns(b, "LeastSquares")?;
    let (rows, nrhs) = matrix_dims(&b_matrix, "LeastSquares")?;
    if rows != m {
        return Err(CoreError::shape_error(
            &format!("a right-hand side with {} rows", m),
            &b.shape().to_string(),
            None,
        ));
    }

    let x = dispatch_float_dtype!(a.dtype(), "LeastSquares", T => {
        let mut qr = to_col_major::<T>(a)?;
        let mut rhs = to_col_major::<T>(&b_matrix)?;
        let info = gels(m, n, nrhs, &mut qr, &mut rhs);
        if info != 0 {
            return Err(CoreError::linalg_error("gels", info));
        }
        let mut x = Vec::with_capacity(n * nrhs);
        for col in rhs.chunks(m.max(1)).take(nrhs) {
            x.extend_from_slice(&col[..n]);
        }
        from_col_major(a.context(), x, n, nrhs, &a.device())
    })?;
    if b.ndim() == 1 {
        x.reshape([n as i64])
    } else {
        Ok(x)
    }
}
