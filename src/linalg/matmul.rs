//! Matrix multiplication

use rayon::prelude::*;

use crate::dispatch_float_dtype;
use crate::dispatch::Element;
use crate::error::{CoreError, CoreResult};
use crate::tensor::{Dtype, Tensor};
use super::lapack::gemm_column;
use super::{as_columns, ensure_cpu, from_col_major, matrix_dims, to_col_major};

/// `a (m x k) * b (k x n)`; a 1-D `b` yields a 1-D result of length `m`.
/// Int32 and Int64 operands are promoted to Float32.
pub fn matmul(a: &Tensor, b: &Tensor) -> CoreResult<Tensor> {
    b.assert_device(&a.device())?;
    ensure_cpu(a, "Matmul")?;
    b.assert_dtype(a.dtype())?;
    let (m, k) = matrix_dims(a, "Matmul")?;
    let b_matrix = as_columns(b, "Matmul")?;
    let (k_b, n) = matrix_dims(&b_matrix, "Matmul")?;
    if k != k_b {
        return Err(CoreError::shape_error(
            &format!("a right operand with {} rows", k),
            &b.shape().to_string(),
            None,
        ));
    }

    let (a, b_matrix) = if a.dtype() == Dtype::INT32 || a.dtype() == Dtype::INT64 {
        (a.to(Dtype::FLOAT32)?, b_matrix.to(Dtype::FLOAT32)?)
    } else {
        (a.clone(), b_matrix)
    };
    let ctx = a.context();
    tracing::trace!(m, k, n, dtype = %a.dtype(), "matmul");

    let product = dispatch_float_dtype!(a.dtype(), "Matmul", T => {
        let a_cm = to_col_major::<T>(&a)?;
        let b_cm = to_col_major::<T>(&b_matrix)?;
        let mut c = vec![T::zero(); m * n];
        ctx.executor().install(|| {
            c.par_chunks_mut(m.max(1))
                .zip(b_cm.par_chunks(k.max(1)))
                .for_each(|(c_col, b_col)| gemm_column(m, k, &a_cm, b_col, c_col));
        });
        from_col_major(ctx, c, m, n, &a.device())
    })?;

    if b.ndim() == 1 {
        product.reshape([m as i64])
    } else {
        Ok(product)
    }
}
