//! Unary element-wise kernels, including copy with dtype and device conversion

use std::ptr;
use std::sync::Arc;

use crate::dispatch::{Element, FloatElement};
use crate::error::{CoreError, CoreResult};
use crate::tensor::{shape, Blob, Device, Dtype, Scalar, Tensor};
use crate::{dispatch_dtype, dispatch_dtype_with_bool, dispatch_float_dtype};
use super::indexer::Indexer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryEWOpCode {
    Sqrt,
    Sin,
    Cos,
    Neg,
    Exp,
    Log,
    Abs,
    IsNan,
    IsInf,
    IsFinite,
    Floor,
    Ceil,
    Round,
    Trunc,
    LogicalNot,
}

impl UnaryEWOpCode {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryEWOpCode::Sqrt => "Sqrt",
            UnaryEWOpCode::Sin => "Sin",
            UnaryEWOpCode::Cos => "Cos",
            UnaryEWOpCode::Neg => "Neg",
            UnaryEWOpCode::Exp => "Exp",
            UnaryEWOpCode::Log => "Log",
            UnaryEWOpCode::Abs => "Abs",
            UnaryEWOpCode::IsNan => "IsNan",
            UnaryEWOpCode::IsInf => "IsInf",
            UnaryEWOpCode::IsFinite => "IsFinite",
            UnaryEWOpCode::Floor => "Floor",
            UnaryEWOpCode::Ceil => "Ceil",
            UnaryEWOpCode::Round => "Round",
            UnaryEWOpCode::Trunc => "Trunc",
            UnaryEWOpCode::LogicalNot => "LogicalNot",
        }
    }

    /// Ops whose result is a boolean regardless of the input dtype.
    pub fn is_predicate(&self) -> bool {
        matches!(
            self,
            UnaryEWOpCode::IsNan | UnaryEWOpCode::IsInf | UnaryEWOpCode::IsFinite | UnaryEWOpCode::LogicalNot
        )
    }
}

/// Element-wise `dst = op(src)`; `src` and `dst` must have the same shape and device.
pub fn unary_ew(src: &Tensor, dst: &Tensor, op: UnaryEWOpCode) -> CoreResult<()> {
    dst.assert_device(&src.device())?;
    dst.assert_shape(src.shape())?;
    let name = op.name();
    match op {
        UnaryEWOpCode::IsNan | UnaryEWOpCode::IsInf | UnaryEWOpCode::IsFinite => {
            dst.assert_dtype(Dtype::BOOL)?;
            dispatch_dtype_with_bool!(src.dtype(), name, T => {
                launch_unary::<T, bool, _>(src, dst, move |v: T| match op {
                    UnaryEWOpCode::IsNan => v.is_nan(),
                    UnaryEWOpCode::IsInf => v.is_inf(),
                    _ => !v.is_nan() && !v.is_inf(),
                })
            })
        }
        UnaryEWOpCode::LogicalNot => {
            if dst.dtype() == Dtype::BOOL {
                dispatch_dtype_with_bool!(src.dtype(), name, T => {
                    launch_unary::<T, bool, _>(src, dst, |v: T| !v.to_bool())
                })
            } else {
                dst.assert_dtype(src.dtype())?;
                dispatch_dtype_with_bool!(src.dtype(), name, T => {
                    launch_unary::<T, T, _>(src, dst, |v: T| T::from_bool(!v.to_bool()))
                })
            }
        }
        UnaryEWOpCode::Neg | UnaryEWOpCode::Abs => {
            dst.assert_dtype(src.dtype())?;
            dispatch_dtype!(src.dtype(), name, T => {
                launch_unary::<T, T, _>(src, dst, move |v: T| {
                    if op == UnaryEWOpCode::Neg { v.neg() } else { v.abs() }
                })
            })
        }
        _ => {
            dst.assert_dtype(src.dtype())?;
            dispatch_float_dtype!(src.dtype(), name, T => {
                launch_unary::<T, T, _>(src, dst, move |v: T| float_op(op, v))
            })
        }
    }
}

#[inline]
fn float_op<T: FloatElement>(op: UnaryEWOpCode, v: T) -> T {
    match op {
        UnaryEWOpCode::Sqrt => v.sqrt(),
        UnaryEWOpCode::Sin => v.sin(),
        UnaryEWOpCode::Cos => v.cos(),
        UnaryEWOpCode::Exp => v.exp(),
        UnaryEWOpCode::Log => v.ln(),
        UnaryEWOpCode::Floor => v.floor(),
        UnaryEWOpCode::Ceil => v.ceil(),
        UnaryEWOpCode::Round => v.round(),
        UnaryEWOpCode::Trunc => v.trunc(),
        _ => v,
    }
}

fn launch_unary<S, D, F>(src: &Tensor, dst: &Tensor, f: F) -> CoreResult<()>
where
    S: Element,
    D: Element,
    F: Fn(S) -> D + Send + Sync,
{
    let indexer = Indexer::new(&[src], dst)?;
    dst.context()
        .parallel_for(&dst.device(), indexer.num_workloads(), |i| unsafe {
            let v = ptr::read_unaligned(indexer.input_ptr(0, i) as *const S);
            ptr::write_unaligned(indexer.output_ptr(i) as *mut D, f(v));
        })
}

/// Copy `src` into `dst`, broadcasting `src` and converting dtype and device.
///
/// Contiguous same-dtype copies are a single memcpy. Anything else touching an
/// accelerator is staged through host memory.
pub fn copy(src: &Tensor, dst: &Tensor) -> CoreResult<()> {
    if !shape::is_broadcastable_to(src.shape(), dst.shape()) {
        return Err(CoreError::shape_error(
            &format!("a source broadcastable to {}", dst.shape()),
            &src.shape().to_string(),
            None,
        ));
    }
    if (src.dtype().is_object() || dst.dtype().is_object()) && src.dtype() != dst.dtype() {
        return Err(CoreError::dtype_error(&dst.dtype().to_string(), &src.dtype().to_string()));
    }
    if dst.is_empty() {
        return Ok(());
    }

    let src_device = src.device();
    let dst_device = dst.device();
    let plain = src.dtype() == dst.dtype()
        && src.shape() == dst.shape()
        && src.is_contiguous()
        && dst.is_contiguous();
    if plain {
        let num_bytes = dst.num_elements() as usize * dst.dtype().byte_size();
        // SAFETY: both views cover `num_bytes` contiguous bytes of their blobs.
        return unsafe {
            dst.context()
                .memory()
                .memcpy(dst.data_ptr_mut(), &dst_device, src.data_ptr(), &src_device, num_bytes)
        };
    }
    if src_device.is_cpu() && dst_device.is_cpu() {
        return copy_strided_cpu(src, dst);
    }

    tracing::trace!(%src_device, %dst_device, "staging strided copy through host memory");
    let host_src = stage_to_host(src)?;
    let host_dst = stage_to_host(dst)?;
    copy_strided_cpu(&host_src, &host_dst)?;
    if !dst_device.is_cpu() {
        let blob = dst.blob();
        // SAFETY: host_dst's blob mirrors dst's blob byte for byte.
        unsafe {
            dst.context().memory().memcpy(
                blob.data_ptr(),
                &dst_device,
                host_dst.blob().data_ptr(),
                &Device::cpu(),
                blob.byte_size(),
            )?;
        }
    }
    Ok(())
}

/// Host view with the same layout, backed by a copy of the whole blob.
fn stage_to_host(tensor: &Tensor) -> CoreResult<Tensor> {
    if tensor.device().is_cpu() {
        return Ok(tensor.clone());
    }
    let ctx = tensor.context();
    let blob = tensor.blob();
    let host = Blob::new(ctx, blob.byte_size(), &Device::cpu())?;
    // SAFETY: both blobs hold `byte_size` bytes.
    unsafe {
        ctx.memory().memcpy(
            host.data_ptr(),
            &Device::cpu(),
            blob.data_ptr(),
            &tensor.device(),
            blob.byte_size(),
        )?;
    }
    Ok(Tensor::from_parts(
        tensor.shape().clone(),
        tensor.strides().clone(),
        tensor.dtype(),
        Arc::new(host),
        tensor.byte_offset(),
    ))
}

fn copy_strided_cpu(src: &Tensor, dst: &Tensor) -> CoreResult<()> {
    let indexer = Indexer::new(&[src], dst)?;
    let ctx = dst.context();
    let n = indexer.num_workloads();
    if src.dtype() == dst.dtype() {
        let element_size = dst.dtype().byte_size();
        return ctx.parallel_for(&Device::cpu(), n, |i| unsafe {
            ptr::copy(indexer.input_ptr(0, i), indexer.output_ptr(i), element_size);
        });
    }
    dispatch_dtype_with_bool!(src.dtype(), "Copy", S => {
        dispatch_dtype_with_bool!(dst.dtype(), "Copy", D => {
            ctx.parallel_for(&Device::cpu(), n, |i| unsafe {
                let v = ptr::read_unaligned(indexer.input_ptr(0, i) as *const S);
                ptr::write_unaligned(indexer.output_ptr(i) as *mut D, v.cast::<D>());
            })
        })
    })
}

/// Set every element of `dst` to `value` converted to its dtype.
pub fn fill(dst: &Tensor, value: Scalar) -> CoreResult<()> {
    if dst.is_empty() {
        return Ok(());
    }
    let ctx = dst.context();
    if !dst.device().is_cpu() {
        let host = Tensor::empty(ctx, dst.shape().clone(), dst.dtype(), &Device::cpu())?;
        fill(&host, value)?;
        return copy(&host, dst);
    }
    dispatch_dtype_with_bool!(dst.dtype(), "Fill", T => {
        let v: T = value.to::<T>();
        let indexer = Indexer::new(&[], dst)?;
        ctx.parallel_for(&Device::cpu(), indexer.num_workloads(), |i| unsafe {
            ptr::write_unaligned(indexer.output_ptr(i) as *mut T, v);
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::memory::testing::HostBackedDeviceManager;
    use crate::tensor::DeviceType;

    fn ctx() -> Context {
        Context::default()
    }

    #[test]
    fn test_float_math() {
        let ctx = ctx();
        let src = Tensor::from_vec(&ctx, vec![4.0f32, 9.0, 2.25], [3], &Device::cpu()).unwrap();
        let dst = Tensor::empty(&ctx, [3], Dtype::FLOAT32, &Device::cpu()).unwrap();
        unary_ew(&src, &dst, UnaryEWOpCode::Sqrt).unwrap();
        assert_eq!(dst.to_vec::<f32>().unwrap(), vec![2.0, 3.0, 1.5]);
    }

    #[test]
    fn test_float_math_rejects_integers() {
        let ctx = ctx();
        let src = Tensor::from_vec(&ctx, vec![4i32], [1], &Device::cpu()).unwrap();
        let dst = Tensor::empty(&ctx, [1], Dtype::INT32, &Device::cpu()).unwrap();
        let err = unary_ew(&src, &dst, UnaryEWOpCode::Sqrt).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedDtype { .. }));
    }

    #[test]
    fn test_predicates_write_bool() {
        let ctx = ctx();
        let src = Tensor::from_vec(&ctx, vec![1.0f64, f64::NAN, f64::INFINITY], [3], &Device::cpu()).unwrap();
        let dst = Tensor::empty(&ctx, [3], Dtype::BOOL, &Device::cpu()).unwrap();
        unary_ew(&src, &dst, UnaryEWOpCode::IsFinite).unwrap();
        assert_eq!(dst.to_vec::<bool>().unwrap(), vec![true, false, false]);
        unary_ew(&src, &dst, UnaryEWOpCode::IsNan).unwrap();
        assert_eq!(dst.to_vec::<bool>().unwrap(), vec![false, true, false]);

        let wrong = Tensor::empty(&ctx, [3], Dtype::FLOAT64, &Device::cpu()).unwrap();
        assert!(unary_ew(&src, &wrong, UnaryEWOpCode::IsInf).is_err());
    }

    #[test]
    fn test_logical_not_in_place_keeps_dtype() {
        let ctx = ctx();
        let t = Tensor::from_vec(&ctx, vec![0i32, 5, -1], [3], &Device::cpu()).unwrap();
        unary_ew(&t, &t, UnaryEWOpCode::LogicalNot).unwrap();
        assert_eq!(t.to_vec::<i32>().unwrap(), vec![1, 0, 0]);
    }

    #[test]
    fn test_neg_on_strided_view() {
        let ctx = ctx();
        let t = Tensor::from_vec(&ctx, vec![1i64, 2, 3, 4], [2, 2], &Device::cpu()).unwrap();
        let tt = t.t().unwrap();
        let dst = Tensor::empty(&ctx, [2, 2], Dtype::INT64, &Device::cpu()).unwrap();
        unary_ew(&tt, &dst, UnaryEWOpCode::Neg).unwrap();
        assert_eq!(dst.to_vec::<i64>().unwrap(), vec![-1, -3, -2, -4]);
    }

    #[test]
    fn test_copy_converts_dtype() {
        let ctx = ctx();
        let src = Tensor::from_vec(&ctx, vec![true, false], [2], &Device::cpu()).unwrap();
        let dst = Tensor::empty(&ctx, [2], Dtype::FLOAT32, &Device::cpu()).unwrap();
        copy(&src, &dst).unwrap();
        assert_eq!(dst.to_vec::<f32>().unwrap(), vec![1.0, 0.0]);

        let object = Tensor::empty(&ctx, [2], Dtype::object(3).unwrap(), &Device::cpu()).unwrap();
        assert!(copy(&src, &object).is_err());
    }

    #[test]
    fn test_copy_object_elements_bytewise() {
        let ctx = ctx();
        let bytes = Tensor::from_vec(&ctx, vec![1u8, 2, 3, 4, 5, 6], [6], &Device::cpu()).unwrap();
        let objects = Tensor::from_parts(
            [3].into(),
            [1].into(),
            Dtype::object(2).unwrap(),
            bytes.blob().clone(),
            0,
        );
        let every_other = objects.slice(0, 0, 3, 2).unwrap().deep_copy().unwrap();
        let copied = unsafe { std::slice::from_raw_parts(every_other.data_ptr(), 4) };
        assert_eq!(copied, &[1, 2, 5, 6]);
    }

    #[test]
    fn test_accelerator_round_trip() {
        let ctx = ctx();
        ctx.memory().register(DeviceType::Cuda, Arc::new(HostBackedDeviceManager::new()));
        let cuda = Device::cuda(0);

        let host = Tensor::from_vec(&ctx, (0..6).collect::<Vec<i32>>(), [2, 3], &Device::cpu()).unwrap();
        let device = host.to_device(&cuda).unwrap();
        assert_eq!(device.device(), cuda);

        // Strided and converting copies stage through the host.
        let transposed = device.t().unwrap().contiguous().unwrap();
        assert_eq!(transposed.device(), cuda);
        assert_eq!(transposed.to_vec::<i32>().unwrap(), vec![0, 3, 1, 4, 2, 5]);
        let floats = device.to(Dtype::FLOAT64).unwrap();
        assert_eq!(floats.to_vec::<f64>().unwrap(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);

        let filled = Tensor::full(&ctx, [2], 7u8, Dtype::UINT8, &cuda).unwrap();
        assert_eq!(filled.to_vec::<u8>().unwrap(), vec![7, 7]);
    }

    #[test]
    fn test_accelerator_kernels_report_device_error() {
        let ctx = ctx();
        ctx.memory().register(DeviceType::Cuda, Arc::new(HostBackedDeviceManager::new()));
        let t = Tensor::zeros(&ctx, [2], Dtype::FLOAT32, &Device::cuda(0)).unwrap();
        let err = unary_ew(&t, &t, UnaryEWOpCode::Neg).unwrap_err();
        assert!(matches!(err, CoreError::DeviceError(_)));
    }
}
