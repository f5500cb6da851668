//! Tensor math: element-wise operators, reductions, advanced indexing and comparisons

use crate::error::{CoreError, CoreResult};
use crate::kernels::{self, BinaryEWOpCode, ReductionOpCode, UnaryEWOpCode};
use crate::dispatch_dtype_with_bool;
use super::core::Tensor;
use super::dtype::Dtype;
use super::scalar::Scalar;
use super::shape;

macro_rules! arithmetic_ops {
    ($($name:ident, $name_:ident, $scalar:ident, $scalar_:ident => $op:ident;)*) => {
        impl Tensor {
            $(
                pub fn $name(&self, rhs: &Tensor) -> CoreResult<Tensor> {
                    self.binary_op(rhs, BinaryEWOpCode::$op)
                }

                pub fn $name_(&mut self, rhs: &Tensor) -> CoreResult<()> {
                    self.binary_op_(rhs, BinaryEWOpCode::$op)
                }

                pub fn $scalar(&self, value: impl Into<Scalar>) -> CoreResult<Tensor> {
                    self.binary_op(&self.scalar_operand(value.into())?, BinaryEWOpCode::$op)
                }

                pub fn $scalar_(&mut self, value: impl Into<Scalar>) -> CoreResult<()> {
                    let rhs = self.scalar_operand(value.into())?;
                    self.binary_op_(&rhs, BinaryEWOpCode::$op)
                }
            )*
        }
    };
}

arithmetic_ops! {
    add, add_, add_scalar, add_scalar_ => Add;
    sub, sub_, sub_scalar, sub_scalar_ => Sub;
    mul, mul_, mul_scalar, mul_scalar_ => Mul;
    div, div_, div_scalar, div_scalar_ => Div;
}

macro_rules! boolean_ops {
    ($($name:ident, $scalar:ident => $op:ident;)*) => {
        impl Tensor {
            $(
                /// Element-wise predicate producing a Bool tensor.
                pub fn $name(&self, rhs: &Tensor) -> CoreResult<Tensor> {
                    self.binary_op(rhs, BinaryEWOpCode::$op)
                }

                pub fn $scalar(&self, value: impl Into<Scalar>) -> CoreResult<Tensor> {
                    self.binary_op(&self.scalar_operand(value.into())?, BinaryEWOpCode::$op)
                }
            )*
        }
    };
}

boolean_ops! {
    gt, gt_scalar => Gt;
    lt, lt_scalar => Lt;
    ge, ge_scalar => Ge;
    le, le_scalar => Le;
    eq, eq_scalar => Eq;
    ne, ne_scalar => Ne;
    logical_and, logical_and_scalar => LogicalAnd;
    logical_or, logical_or_scalar => LogicalOr;
    logical_xor, logical_xor_scalar => LogicalXor;
}

macro_rules! unary_ops {
    ($($name:ident, $name_:ident => $op:ident;)*) => {
        impl Tensor {
            $(
                pub fn $name(&self) -> CoreResult<Tensor> {
                    self.unary_op(UnaryEWOpCode::$op)
                }

                pub fn $name_(&mut self) -> CoreResult<()> {
                    kernels::unary_ew(self, self, UnaryEWOpCode::$op)
                }
            )*
        }
    };
}

unary_ops! {
    sqrt, sqrt_ => Sqrt;
    sin, sin_ => Sin;
    cos, cos_ => Cos;
    neg, neg_ => Neg;
    exp, exp_ => Exp;
    log, log_ => Log;
    abs, abs_ => Abs;
    floor, floor_ => Floor;
    ceil, ceil_ => Ceil;
    round, round_ => Round;
    trunc, trunc_ => Trunc;
    logical_not, logical_not_ => LogicalNot;
}

impl Tensor {
    pub fn maximum(&self, rhs: &Tensor) -> CoreResult<Tensor> {
        self.binary_op(rhs, BinaryEWOpCode::Maximum)
    }

    pub fn minimum(&self, rhs: &Tensor) -> CoreResult<Tensor> {
        self.binary_op(rhs, BinaryEWOpCode::Minimum)
    }

    pub fn is_nan(&self) -> CoreResult<Tensor> {
        self.unary_op(UnaryEWOpCode::IsNan)
    }

    pub fn is_inf(&self) -> CoreResult<Tensor> {
        self.unary_op(UnaryEWOpCode::IsInf)
    }

    pub fn is_finite(&self) -> CoreResult<Tensor> {
        self.unary_op(UnaryEWOpCode::IsFinite)
    }

    /// Clamp every element into `[min, max]`.
    pub fn clip(&self, min: impl Into<Scalar>, max: impl Into<Scalar>) -> CoreResult<Tensor> {
        let lower = self.scalar_operand(min.into())?;
        let upper = self.scalar_operand(max.into())?;
        self.maximum(&lower)?.minimum(&upper)
    }

    fn scalar_operand(&self, value: Scalar) -> CoreResult<Tensor> {
        Tensor::full(self.context(), shape::SizeVector::scalar(), value, self.dtype(), &self.device())
    }

    fn binary_op(&self, rhs: &Tensor, op: BinaryEWOpCode) -> CoreResult<Tensor> {
        let out_shape = shape::broadcasted_shape(self.shape(), rhs.shape())?;
        let out_dtype = if op.is_boolean() { Dtype::BOOL } else { self.dtype() };
        let dst = Tensor::empty(self.context(), out_shape, out_dtype, &self.device())?;
        kernels::binary_ew(self, rhs, &dst, op)?;
        Ok(dst)
    }

    fn binary_op_(&mut self, rhs: &Tensor, op: BinaryEWOpCode) -> CoreResult<()> {
        kernels::binary_ew(self, rhs, self, op)
    }

    fn unary_op(&self, op: UnaryEWOpCode) -> CoreResult<Tensor> {
        let out_dtype = if op.is_predicate() { Dtype::BOOL } else { self.dtype() };
        let dst = Tensor::empty(self.context(), self.shape().clone(), out_dtype, &self.device())?;
        kernels::unary_ew(self, &dst, op)?;
        Ok(dst)
    }

    fn reduce(&self, dims: &[i64], keepdim: bool, op: ReductionOpCode) -> CoreResult<Tensor> {
        let dims = shape::normalize_dims(dims, self.ndim())?;
        let out_shape = shape::reduction_shape(self.shape(), &dims, keepdim);
        let dst = Tensor::empty(self.context(), out_shape, op.output_dtype(self.dtype()), &self.device())?;
        kernels::reduction(self, &dst, &dims, keepdim, op)?;
        Ok(dst)
    }

    pub fn sum(&self, dims: &[i64], keepdim: bool) -> CoreResult<Tensor> {
        self.reduce(dims, keepdim, ReductionOpCode::Sum)
    }

    pub fn prod(&self, dims: &[i64], keepdim: bool) -> CoreResult<Tensor> {
        self.reduce(dims, keepdim, ReductionOpCode::Prod)
    }

    pub fn min(&self, dims: &[i64], keepdim: bool) -> CoreResult<Tensor> {
        self.reduce(dims, keepdim, ReductionOpCode::Min)
    }

    pub fn max(&self, dims: &[i64], keepdim: bool) -> CoreResult<Tensor> {
        self.reduce(dims, keepdim, ReductionOpCode::Max)
    }

    /// True where every element along `dims` is true. Bool tensors only.
    pub fn all(&self, dims: &[i64], keepdim: bool) -> CoreResult<Tensor> {
        self.reduce(dims, keepdim, ReductionOpCode::All)
    }

    pub fn any(&self, dims: &[i64], keepdim: bool) -> CoreResult<Tensor> {
        self.reduce(dims, keepdim, ReductionOpCode::Any)
    }

    /// Int64 positions of the minima over one dimension or over all dimensions.
    pub fn arg_min(&self, dims: &[i64], keepdim: bool) -> CoreResult<Tensor> {
        self.arg_reduce(dims, keepdim, ReductionOpCode::ArgMin)
    }

    pub fn arg_max(&self, dims: &[i64], keepdim: bool) -> CoreResult<Tensor> {
        self.arg_reduce(dims, keepdim, ReductionOpCode::ArgMax)
    }

    fn arg_reduce(&self, dims: &[i64], keepdim: bool, op: ReductionOpCode) -> CoreResult<Tensor> {
        if keepdim {
            return Err(CoreError::InvalidArgument(format!("{} does not support keepdim", op.name())));
        }
        let normalized = shape::normalize_dims(dims, self.ndim())?;
        if normalized.len() != 1 && normalized.len() != self.ndim() {
            return Err(CoreError::InvalidArgument(format!(
                "{} reduces one dimension or all of them, got {:?}",
                op.name(),
                dims
            )));
        }
        self.reduce(dims, false, op)
    }

    /// Gather with integer or boolean index tensors applied to the leading dimensions.
    pub fn index_get(&self, index_tensors: &[Tensor]) -> CoreResult<Tensor> {
        kernels::index_get(self, index_tensors)
    }

    /// Scatter `value` into the positions selected by `index_tensors`.
    pub fn index_set(&mut self, index_tensors: &[Tensor], value: &Tensor) -> CoreResult<()> {
        kernels::index_set(self, value, index_tensors)
    }

    pub fn nonzero(&self) -> CoreResult<Tensor> {
        kernels::nonzero(self)
    }

    /// Same shape, dtype, device and element-wise `|a - b| <= atol + rtol * |b|`.
    pub fn all_close(&self, other: &Tensor, rtol: f64, atol: f64) -> CoreResult<bool> {
        if !self.is_comparable(other)? {
            return Ok(false);
        }
        let a = self.to(Dtype::FLOAT64)?.to_vec::<f64>()?;
        let b = other.to(Dtype::FLOAT64)?.to_vec::<f64>()?;
        Ok(a.iter().zip(&b).all(|(a, b)| (a - b).abs() <= atol + rtol * b.abs()))
    }

    /// Same shape, dtype, device and exactly equal elements.
    pub fn all_equal(&self, other: &Tensor) -> CoreResult<bool> {
        if !self.is_comparable(other)? {
            return Ok(false);
        }
        dispatch_dtype_with_bool!(self.dtype(), "AllEqual", T => {
            Ok(self.to_vec::<T>()? == other.to_vec::<T>()?)
        })
    }

    fn is_comparable(&self, other: &Tensor) -> CoreResult<bool> {
        if self.device() != other.device() {
            return Err(CoreError::device_mismatch(&self.device().to_string(), &other.device().to_string()));
        }
        Ok(self.shape() == other.shape() && self.dtype() == other.dtype())
    }
}
