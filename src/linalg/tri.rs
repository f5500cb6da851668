//! Upper and lower triangular parts

use std::ptr;

use crate::dispatch_dtype;
use crate::dispatch::Element;
use crate::error::CoreResult;
use crate::parallel::SendPtr;
use crate::tensor::Tensor;
use super::{ensure_cpu, matrix_dims};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Upper,
    Lower,
    UnitLower,
}

/// Elements with `col - row >= diagonal`; the rest are zero.
pub fn triu(a: &Tensor, diagonal: i64) -> CoreResult<Tensor> {
    triangle(a, diagonal, Part::Upper)
}

/// Elements with `col - row <= diagonal`; the rest are zero.
pub fn tril(a: &Tensor, diagonal: i64) -> CoreResult<Tensor> {
    triangle(a, diagonal, Part::Lower)
}

/// `(upper, lower)`: `upper` as in [`triu`]; `lower` keeps `col - row < diagonal` and
/// has ones where `col - row == diagonal`.
pub fn triul(a: &Tensor, diagonal: i64) -> CoreResult<(Tensor, Tensor)> {
    Ok((
        triangle(a, diagonal, Part::Upper)?,
        triangle(a, diagonal, Part::UnitLower)?,
    ))
}

fn triangle(a: &Tensor, diagonal: i64, part: Part) -> CoreResult<Tensor> {
    ensure_cpu(a, "Triul")?;
    let (_, cols) = matrix_dims(a, "Triul")?;
    let cols = cols as i64;
    let src = a.contiguous()?;
    let dst = Tensor::empty(a.context(), a.shape().clone(), a.dtype(), &a.device())?;
    dispatch_dtype!(a.dtype(), "Triul", T => {
        let src_ptr = SendPtr::from_const(src.data_ptr() as *const T);
        let dst_ptr = SendPtr::new(dst.data_ptr_mut() as *mut T);
        a.context().parallel_for(&a.device(), dst.num_elements(), |idx| {
            let offset = idx % cols - idx / cols;
            // SAFETY: src and dst are contiguous with the same element count.
            unsafe {
                let v = ptr::read_unaligned(src_ptr.get().add(idx as usize));
                let out = match part {
                    Part::Upper if offset >= diagonal => v,
                    Part::Lower if offset <= diagonal => v,
                    Part::UnitLower if offset < diagonal => v,
                    Part::UnitLower if offset == diagonal => T::one(),
                    _ => T::zero(),
                };
                ptr::write_unaligned(dst_ptr.get().add(idx as usize), out);
            }
        })
    })?;
    Ok(dst)
}
