//! Matrix inverse through LU factorization

use crate::dispatch_float_dtype;
use crate::error::{CoreError, CoreResult};
use crate::tensor::Tensor;
use super::lapack::{getrf, getri};
use super::{ensure_cpu, from_col_major, square_dim, to_col_major};

/// Inverse of a square matrix; singular input fails with the `getrf` info code.
pub fn inverse(a: &Tensor) -> CoreResult<Tensor> {
    ensure_cpu(a, "Inverse")?;
    let n = square_dim(a, "Inverse")?;
    dispatch_float_dtype!(a.dtype(), "Inverse", T => {
        let mut lu = to_col_major::<T>(a)?;
        let (ipiv, info) = getrf(n, &mut lu);
        if info != 0 {
            return Err(CoreError::linalg_error("getrf", info));
        }
        from_col_major(a.context(), getri(n, &lu, &ipiv), n, n, &a.device())
    })
}
