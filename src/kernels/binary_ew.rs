//! Binary element-wise kernels with NumPy broadcasting

use std::ptr;

use crate::dispatch::Element;
use crate::error::{CoreError, CoreResult};
use crate::tensor::{shape, Dtype, Tensor};
use crate::{dispatch_dtype, dispatch_dtype_with_bool};
use super::indexer::Indexer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryEWOpCode {
    Add,
    Sub,
    Mul,
    Div,
    Maximum,
    Minimum,
    LogicalAnd,
    LogicalOr,
    LogicalXor,
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl BinaryEWOpCode {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryEWOpCode::Add => "Add",
            BinaryEWOpCode::Sub => "Sub",
            BinaryEWOpCode::Mul => "Mul",
            BinaryEWOpCode::Div => "Div",
            BinaryEWOpCode::Maximum => "Maximum",
            BinaryEWOpCode::Minimum => "Minimum",
            BinaryEWOpCode::LogicalAnd => "LogicalAnd",
            BinaryEWOpCode::LogicalOr => "LogicalOr",
            BinaryEWOpCode::LogicalXor => "LogicalXor",
            BinaryEWOpCode::Gt => "Gt",
            BinaryEWOpCode::Lt => "Lt",
            BinaryEWOpCode::Ge => "Ge",
            BinaryEWOpCode::Le => "Le",
            BinaryEWOpCode::Eq => "Eq",
            BinaryEWOpCode::Ne => "Ne",
        }
    }

    /// Comparison and logical ops produce booleans.
    pub fn is_boolean(&self) -> bool {
        !matches!(
            self,
            BinaryEWOpCode::Add
                | BinaryEWOpCode::Sub
                | BinaryEWOpCode::Mul
                | BinaryEWOpCode::Div
                | BinaryEWOpCode::Maximum
                | BinaryEWOpCode::Minimum
        )
    }
}

/// Element-wise `dst = lhs op rhs`.
///
/// `lhs` and `rhs` share a dtype and device and broadcast to exactly `dst`'s shape.
/// Arithmetic writes the input dtype; boolean ops write Bool, or the input dtype
/// as 0/1 when `dst` is one of the operands.
pub fn binary_ew(lhs: &Tensor, rhs: &Tensor, dst: &Tensor, op: BinaryEWOpCode) -> CoreResult<()> {
    let device = lhs.device();
    rhs.assert_device(&device)?;
    dst.assert_device(&device)?;
    rhs.assert_dtype(lhs.dtype())?;
    let broadcast = shape::broadcasted_shape(lhs.shape(), rhs.shape())?;
    if broadcast != *dst.shape() {
        return Err(CoreError::shape_error(
            &broadcast.to_string(),
            &dst.shape().to_string(),
            Some("the output must have the broadcast shape of both operands"),
        ));
    }
    let name = op.name();

    if !op.is_boolean() {
        dst.assert_dtype(lhs.dtype())?;
        return dispatch_dtype!(lhs.dtype(), name, T => {
            launch_binary::<T, T, _>(lhs, rhs, dst, move |a: T, b: T| arithmetic(op, a, b))
        });
    }
    if dst.dtype() == Dtype::BOOL {
        dispatch_dtype_with_bool!(lhs.dtype(), name, T => {
            launch_binary::<T, bool, _>(lhs, rhs, dst, move |a: T, b: T| predicate(op, a, b))
        })
    } else {
        dst.assert_dtype(lhs.dtype())?;
        dispatch_dtype_with_bool!(lhs.dtype(), name, T => {
            launch_binary::<T, T, _>(lhs, rhs, dst, move |a: T, b: T| T::from_bool(predicate(op, a, b)))
        })
    }
}

#[inline]
fn arithmetic<T: Element>(op: BinaryEWOpCode, a: T, b: T) -> T {
    match op {
        BinaryEWOpCode::Add => a.add(b),
        BinaryEWOpCode::Sub => a.sub(b),
        BinaryEWOpCode::Mul => a.mul(b),
        BinaryEWOpCode::Div => a.div(b),
        BinaryEWOpCode::Maximum => {
            if a > b { a } else { b }
        }
        BinaryEWOpCode::Minimum => {
            if a < b { a } else { b }
        }
        _ => a,
    }
}

#[inline]
fn predicate<T: Element>(op: BinaryEWOpCode, a: T, b: T) -> bool {
    match op {
        BinaryEWOpCode::LogicalAnd => a.to_bool() && b.to_bool(),
        BinaryEWOpCode::LogicalOr => a.to_bool() || b.to_bool(),
        BinaryEWOpCode::LogicalXor => a.to_bool() != b.to_bool(),
        BinaryEWOpCode::Gt => a > b,
        BinaryEWOpCode::Lt => a < b,
        BinaryEWOpCode::Ge => a >= b,
        BinaryEWOpCode::Le => a <= b,
        BinaryEWOpCode::Eq => a == b,
        BinaryEWOpCode::Ne => a != b,
        _ => false,
    }
}

fn launch_binary<S, D, F>(lhs: &Tensor, rhs: &Tensor, dst: &Tensor, f: F) -> CoreResult<()>
where
    S: Element,
    D: Element,
    F: Fn(S, S) -> D + Send + Sync,
{
    let indexer = Indexer::new(&[lhs, rhs], dst)?;
    dst.context()
        .parallel_for(&dst.device(), indexer.num_workloads(), |i| unsafe {
            let a = ptr::read_unaligned(indexer.input_ptr(0, i) as *const S);
            let b = ptr::read_unaligned(indexer.input_ptr(1, i) as *const S);
            ptr::write_unaligned(indexer.output_ptr(i) as *mut D, f(a, b));
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::tensor::Device;

    #[test]
    fn test_broadcast_add() {
        let ctx = Context::default();
        let a = Tensor::from_vec(&ctx, vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3], &Device::cpu()).unwrap();
        let b = Tensor::from_vec(&ctx, vec![10.0f32, 20.0, 30.0], [3], &Device::cpu()).unwrap();
        let dst = Tensor::empty(&ctx, [2, 3], Dtype::FLOAT32, &Device::cpu()).unwrap();
        binary_ew(&a, &b, &dst, BinaryEWOpCode::Add).unwrap();
        assert_eq!(dst.to_vec::<f32>().unwrap(), vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
    }

    #[test]
    fn test_full_operands_broadcast_to_sevens() {
        let ctx = Context::default();
        let a = Tensor::full(&ctx, [2, 3], 5i64, Dtype::FLOAT32, &Device::cpu()).unwrap();
        let b = Tensor::full(&ctx, [3], 2i64, Dtype::FLOAT32, &Device::cpu()).unwrap();
        let dst = Tensor::empty(&ctx, [2, 3], Dtype::FLOAT32, &Device::cpu()).unwrap();
        binary_ew(&a, &b, &dst, BinaryEWOpCode::Add).unwrap();
        assert_eq!(dst.to_vec::<f32>().unwrap(), vec![7.0; 6]);
    }

    #[test]
    fn test_output_shape_must_be_exact() {
        let ctx = Context::default();
        let a = Tensor::zeros(&ctx, [3], Dtype::INT32, &Device::cpu()).unwrap();
        let dst = Tensor::empty(&ctx, [2, 3], Dtype::INT32, &Device::cpu()).unwrap();
        assert!(binary_ew(&a, &a, &dst, BinaryEWOpCode::Add).is_err());
    }

    #[test]
    fn test_comparisons_write_bool() {
        let ctx = Context::default();
        let a = Tensor::from_vec(&ctx, vec![1i64, 5, 3], [3], &Device::cpu()).unwrap();
        let b = Tensor::from_vec(&ctx, vec![2i64, 5, 1], [3], &Device::cpu()).unwrap();
        let dst = Tensor::empty(&ctx, [3], Dtype::BOOL, &Device::cpu()).unwrap();
        binary_ew(&a, &b, &dst, BinaryEWOpCode::Ge).unwrap();
        assert_eq!(dst.to_vec::<bool>().unwrap(), vec![false, true, true]);

        binary_ew(&a, &b, &a, BinaryEWOpCode::Lt).unwrap();
        assert_eq!(a.to_vec::<i64>().unwrap(), vec![1, 0, 0]);
    }

    #[test]
    fn test_integer_division_by_zero_is_zero() {
        let ctx = Context::default();
        let a = Tensor::from_vec(&ctx, vec![7i32, 8], [2], &Device::cpu()).unwrap();
        let b = Tensor::from_vec(&ctx, vec![0i32, 3], [2], &Device::cpu()).unwrap();
        let dst = Tensor::empty(&ctx, [2], Dtype::INT32, &Device::cpu()).unwrap();
        binary_ew(&a, &b, &dst, BinaryEWOpCode::Div).unwrap();
        assert_eq!(dst.to_vec::<i32>().unwrap(), vec![0, 2]);
    }

    #[test]
    fn test_arithmetic_rejects_bool_and_mixed_dtypes() {
        let ctx = Context::default();
        let b = Tensor::from_vec(&ctx, vec![true], [1], &Device::cpu()).unwrap();
        assert!(matches!(
            binary_ew(&b, &b, &b, BinaryEWOpCode::Add),
            Err(CoreError::UnsupportedDtype { .. })
        ));

        let f = Tensor::zeros(&ctx, [1], Dtype::FLOAT32, &Device::cpu()).unwrap();
        let i = Tensor::zeros(&ctx, [1], Dtype::INT32, &Device::cpu()).unwrap();
        assert!(matches!(
            binary_ew(&f, &i, &f, BinaryEWOpCode::Mul),
            Err(CoreError::DtypeMismatch(_))
        ));
    }

    #[test]
    fn test_logical_ops_on_bool() {
        let ctx = Context::default();
        let a = Tensor::from_vec(&ctx, vec![true, true, false], [3], &Device::cpu()).unwrap();
        let b = Tensor::from_vec(&ctx, vec![true, false, false], [3], &Device::cpu()).unwrap();
        let dst = Tensor::empty(&ctx, [3], Dtype::BOOL, &Device::cpu()).unwrap();
        binary_ew(&a, &b, &dst, BinaryEWOpCode::LogicalXor).unwrap();
        assert_eq!(dst.to_vec::<bool>().unwrap(), vec![false, true, false]);
    }
}
