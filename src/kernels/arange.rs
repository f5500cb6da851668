//! Arange: evenly spaced values over a half-open interval

use std::ptr;

use crate::context::Context;
use crate::dispatch::Element;
use crate::error::{CoreError, CoreResult};
use crate::parallel::SendPtr;
use crate::tensor::{Device, Dtype, Scalar, Tensor};
use crate::dispatch_dtype;

/// Number of values `arange` produces; never negative.
pub fn arange_count(start: Scalar, stop: Scalar, step: Scalar) -> CoreResult<i64> {
    let step_f = step.to_f64();
    if step_f == 0.0 {
        return Err(CoreError::InvalidArgument("Arange step must not be zero".to_string()));
    }
    let count = ((stop.to_f64() - start.to_f64()) / step_f).ceil();
    if !count.is_finite() {
        return Err(CoreError::InvalidArgument(format!(
            "Arange({}, {}, {}) has no finite length",
            start, stop, step
        )));
    }
    Ok(count.max(0.0) as i64)
}

/// `[start, start + step, ...)` up to but excluding `stop`, as a 1-D tensor.
pub fn arange(
    ctx: &Context,
    start: Scalar,
    stop: Scalar,
    step: Scalar,
    dtype: Dtype,
    device: &Device,
) -> CoreResult<Tensor> {
    let count = arange_count(start, stop, step)?;
    let host = Tensor::empty(ctx, [count], dtype, &Device::cpu())?;
    let integral = !dtype.is_float() && !start.is_double() && !step.is_double();
    let out = SendPtr::new(host.data_ptr_mut());
    dispatch_dtype!(dtype, "Arange", T => {
        ctx.parallel_for(&Device::cpu(), count, |i| {
            let v: T = if integral {
                T::from_i128(start.to::<i64>() as i128 + i as i128 * step.to::<i64>() as i128)
            } else {
                T::from_f64(start.to_f64() + i as f64 * step.to_f64())
            };
            // SAFETY: host holds `count` elements.
            unsafe { ptr::write_unaligned((out.get() as *mut T).add(i as usize), v) };
        })
    })?;
    host.to_device(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_range() {
        let ctx = Context::default();
        let t = arange(&ctx, 0i64.into(), 10i64.into(), 3i64.into(), Dtype::INT64, &Device::cpu()).unwrap();
        assert_eq!(t.to_vec::<i64>().unwrap(), vec![0, 3, 6, 9]);
    }

    #[test]
    fn test_fractional_step() {
        let ctx = Context::default();
        let t = arange(&ctx, 0.0.into(), 1.0.into(), 0.25.into(), Dtype::FLOAT32, &Device::cpu()).unwrap();
        assert_eq!(t.to_vec::<f32>().unwrap(), vec![0.0, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_empty_and_negative_ranges() {
        assert_eq!(arange_count(5i64.into(), 0i64.into(), 1i64.into()).unwrap(), 0);
        assert_eq!(arange_count(5i64.into(), 0i64.into(), (-2i64).into()).unwrap(), 3);
        assert!(arange_count(0i64.into(), 1i64.into(), 0i64.into()).is_err());

        let ctx = Context::default();
        let t = arange(&ctx, 3i64.into(), 3i64.into(), 1i64.into(), Dtype::INT32, &Device::cpu()).unwrap();
        assert_eq!(t.num_elements(), 0);
    }

    #[test]
    fn test_step_away_from_stop_is_empty() {
        let ctx = Context::default();
        let t = Tensor::arange(&ctx, 0i64, 10i64, -1i64, Dtype::INT64, &Device::cpu()).unwrap();
        assert_eq!(t.num_elements(), 0);
        assert_eq!(t.shape().as_slice(), &[0]);
    }
}
