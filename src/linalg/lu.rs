//! LU factorization with partial pivoting

use crate::dispatch_float_dtype;
use crate::dispatch::Element;
use crate::error::{CoreError, CoreResult};
use crate::tensor::{Device, Tensor};
use super::lapack::getrf;
use super::{ensure_cpu, from_col_major, square_dim, to_col_major, triul};

/// Packed LU factorization with partial pivoting.
///
/// Returns the combined `L \ U` matrix (unit diagonal of `L` implied) and the
/// 1-based Int32 pivot vector: row `i` was swapped with row `ipiv[i]`.
pub fn lu_ipiv(a: &Tensor) -> CoreResult<(Tensor, Tensor)> {
    ensure_cpu(a, "LU")?;
    let n = square_dim(a, "LU")?;
    let (lu, ipiv) = dispatch_float_dtype!(a.dtype(), "LU", T => {
        let mut lu = to_col_major::<T>(a)?;
        let (ipiv, info) = getrf(n, &mut lu);
        if info != 0 {
            return Err(CoreError::linalg_error("getrf", info));
        }
        Ok((from_col_major(a.context(), lu, n, n, &a.device())?, ipiv))
    })?;
    let ipiv = Tensor::from_vec(a.context(), ipiv, [n as i64], &a.device())?;
    Ok((lu, ipiv))
}

/// `(P, L, U)` with `a = P * L * U`. With `permute_l` the second factor is `P * L`.
pub fn lu(a: &Tensor, permute_l: bool) -> CoreResult<(Tensor, Tensor, Tensor)> {
    let (packed, ipiv) = lu_ipiv(a)?;
    let (upper, lower) = triul(&packed, 0)?;
    let p = permutation_matrix(a, &ipiv.to_vec::<i32>()?)?;
    if permute_l {
        let permuted = p.matmul(&lower)?;
        Ok((p, permuted, upper))
    } else {
        Ok((p, lower, upper))
    }
}

/// `P` such that `P^T * a` applies the row swaps recorded in `ipiv`.
fn permutation_matrix(a: &Tensor, ipiv: &[i32]) -> CoreResult<Tensor> {
    let n = ipiv.len();
    let mut perm: Vec<usize> = (0..n).collect();
    for (i, &p) in ipiv.iter().enumerate() {
        perm.swap(i, p as usize - 1);
    }
    dispatch_float_dtype!(a.dtype(), "LU", T => {
        let mut values = vec![T::zero(); n * n];
        for (i, &row) in perm.iter().enumerate() {
            values[row * n + i] = T::one();
        }
        Tensor::from_vec(a.context(), values, [n as i64, n as i64], &Device::cpu())?.to_device(&a.device())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::tensor::Dtype;

    fn sample(ctx: &Context) -> Tensor {
        Tensor::from_vec(
            ctx,
            vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0],
            [3, 3],
            &Device::cpu(),
        )
        .unwrap()
    }

    #[test]
    fn test_factors_reconstruct_input() {
        let ctx = Context::default();
        let a = sample(&ctx);
        let (p, l, u) = lu(&a, false).unwrap();
        let rebuilt = p.matmul(&l).unwrap().matmul(&u).unwrap();
        assert!(rebuilt.all_close(&a, 1e-12, 1e-12).unwrap());

        let (_, pl, u2) = lu(&a, true).unwrap();
        assert!(pl.matmul(&u2).unwrap().all_close(&a, 1e-12, 1e-12).unwrap());
    }

    #[test]
    fn test_ipiv_is_one_based() {
        let ctx = Context::default();
        let (_, ipiv) = lu_ipiv(&sample(&ctx)).unwrap();
        assert_eq!(ipiv.dtype(), Dtype::INT32);
        // The largest entry of the first column sits in row 3.
        assert_eq!(ipiv.to_vec::<i32>().unwrap()[0], 3);
    }

    #[test]
    fn test_requires_square_float() {
        let ctx = Context::default();
        let rect = Tensor::zeros(&ctx, [2, 3], Dtype::FLOAT64, &Device::cpu()).unwrap();
        assert!(lu_ipiv(&rect).is_err());
        let ints = Tensor::eye(&ctx, 2, Dtype::INT64, &Device::cpu()).unwrap();
        assert!(lu(&ints, false).is_err());
    }
}
