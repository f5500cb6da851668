//! Determinant

use crate::dispatch_float_dtype;
use crate::dispatch::{Element, FloatElement};
use crate::error::CoreResult;
use crate::tensor::Tensor;
use super::lapack::getrf;
use super::{ensure_cpu, square_dim, to_col_major};

/// Determinant of a square matrix.
///
/// 2x2 and 3x3 use the closed form; larger matrices multiply the LU pivots and
/// flip the sign once per row swap. A singular matrix has determinant 0.
pub fn det(a: &Tensor) -> CoreResult<f64> {
    ensure_cpu(a, "Det")?;
    let n = square_dim(a, "Det")?;
    dispatch_float_dtype!(a.dtype(), "Det", T => {
        match n {
            2 | 3 => {
                let m: Vec<f64> = a.contiguous()?.to_vec::<T>()?.into_iter().map(|v| v.to_f64()).collect();
                Ok(if n == 2 { det2(&m) } else { det3(&m) })
            }
            _ => {
                let mut lu = to_col_major::<T>(a)?;
                Ok(det_lu(n, &mut lu))
            }
        }
    })
}

fn det2(m: &[f64]) -> f64 {
    m[0] * m[3] - m[1] * m[2]
}

fn det3(m: &[f64]) -> f64 {
    m[0] * (m[4] * m[8] - m[5] * m[7]) - m[1] * (m[3] * m[8] - m[5] * m[6]) + m[2] * (m[3] * m[7] - m[4] * m[6])
}

/// Determinant through the LU factorization of a column-major matrix.
pub(crate) fn det_lu<T: FloatElement>(n: usize, lu: &mut [T]) -> f64 {
    let (ipiv, info) = getrf(n, lu);
    if info != 0 {
        return 0.0;
    }
    let mut det = 1.0;
    for (i, &p) in ipiv.iter().enumerate() {
        det *= lu[i + i * n].to_f64();
        if p as usize != i + 1 {
            det = -det;
        }
    }
    det
}
