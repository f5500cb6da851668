//! Reductions over a set of dimensions: each output element folds its slice serially

use std::ptr;

use crate::dispatch::Element;
use crate::error::{CoreError, CoreResult};
use crate::parallel::SendPtr;
use crate::tensor::{shape, Dtype, SizeVector, Tensor};
use crate::dispatch_dtype;
use super::indexer::offset_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReductionOpCode {
    Sum,
    Prod,
    Min,
    Max,
    ArgMin,
    ArgMax,
    All,
    Any,
}

impl ReductionOpCode {
    pub fn name(&self) -> &'static str {
        match self {
            ReductionOpCode::Sum => "Sum",
            ReductionOpCode::Prod => "Prod",
            ReductionOpCode::Min => "Min",
            ReductionOpCode::Max => "Max",
            ReductionOpCode::ArgMin => "ArgMin",
            ReductionOpCode::ArgMax => "ArgMax",
            ReductionOpCode::All => "All",
            ReductionOpCode::Any => "Any",
        }
    }

    pub fn is_arg(&self) -> bool {
        matches!(self, ReductionOpCode::ArgMin | ReductionOpCode::ArgMax)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, ReductionOpCode::All | ReductionOpCode::Any)
    }

    /// Dtype of the result for an input of `src_dtype`.
    pub fn output_dtype(&self, src_dtype: Dtype) -> Dtype {
        if self.is_arg() {
            Dtype::INT64
        } else {
            src_dtype
        }
    }

    /// Ops that have no value over an empty slice.
    fn needs_elements(&self) -> bool {
        matches!(
            self,
            ReductionOpCode::Min | ReductionOpCode::Max | ReductionOpCode::ArgMin | ReductionOpCode::ArgMax
        )
    }
}

/// Split of the source dimensions into kept (outer) and reduced (inner) parts.
struct ReductionLayout {
    outer_shape: SizeVector,
    outer_src_strides: SizeVector,
    outer_dst_strides: SizeVector,
    inner_shape: SizeVector,
    inner_src_strides: SizeVector,
}

impl ReductionLayout {
    fn new(src: &Tensor, dst: &Tensor, dims: &[usize], keepdim: bool) -> Self {
        let src_size = src.dtype().byte_size() as i64;
        let dst_size = dst.dtype().byte_size() as i64;
        let mut layout = ReductionLayout {
            outer_shape: SizeVector::scalar(),
            outer_src_strides: SizeVector::scalar(),
            outer_dst_strides: SizeVector::scalar(),
            inner_shape: SizeVector::scalar(),
            inner_src_strides: SizeVector::scalar(),
        };
        let mut dst_dim = 0;
        for d in 0..src.ndim() {
            if dims.contains(&d) {
                layout.inner_shape.push(src.shape()[d]);
                layout.inner_src_strides.push(src.strides()[d] * src_size);
                if keepdim {
                    dst_dim += 1;
                }
            } else {
                layout.outer_shape.push(src.shape()[d]);
                layout.outer_src_strides.push(src.strides()[d] * src_size);
                layout.outer_dst_strides.push(dst.strides()[dst_dim] * dst_size);
                dst_dim += 1;
            }
        }
        layout
    }
}

/// Reduce `src` over `dims` (normalized, ascending) into `dst`.
pub fn reduction(
    src: &Tensor,
    dst: &Tensor,
    dims: &[usize],
    keepdim: bool,
    op: ReductionOpCode,
) -> CoreResult<()> {
    dst.assert_device(&src.device())?;
    dst.assert_shape(&shape::reduction_shape(src.shape(), dims, keepdim))?;
    let name = op.name();
    if op.is_boolean() {
        src.assert_dtype(Dtype::BOOL)?;
    }
    dst.assert_dtype(op.output_dtype(src.dtype()))?;

    let layout = ReductionLayout::new(src, dst, dims, keepdim);
    let num_inner = layout.inner_shape.num_elements();
    if num_inner == 0 && op.needs_elements() {
        return Err(CoreError::operation_error(
            name,
            &format!("cannot reduce zero-size dimensions of shape {}", src.shape()),
        ));
    }

    if op.is_boolean() {
        return launch_reduction::<bool, bool, _>(src, dst, &layout, move |values| {
            let mut acc = op == ReductionOpCode::All;
            for v in values {
                acc = if op == ReductionOpCode::All { acc && v } else { acc || v };
            }
            acc
        });
    }
    if op.is_arg() {
        return dispatch_dtype!(src.dtype(), name, T => {
            launch_reduction::<T, i64, _>(src, dst, &layout, move |values| {
                let mut best_index = 0i64;
                let mut best = T::zero();
                for (j, v) in values.enumerate() {
                    let better = if op == ReductionOpCode::ArgMin { v < best } else { v > best };
                    if j == 0 || better {
                        best = v;
                        best_index = j as i64;
                    }
                }
                best_index
            })
        });
    }
    dispatch_dtype!(src.dtype(), name, T => {
        launch_reduction::<T, T, _>(src, dst, &layout, move |values| {
            let mut acc = match op {
                ReductionOpCode::Prod => T::one(),
                ReductionOpCode::Min => T::highest(),
                ReductionOpCode::Max => T::lowest(),
                _ => T::zero(),
            };
            for v in values {
                acc = match op {
                    ReductionOpCode::Prod => acc.mul(v),
                    ReductionOpCode::Min => if v < acc { v } else { acc },
                    ReductionOpCode::Max => if v > acc { v } else { acc },
                    _ => acc.add(v),
                };
            }
            acc
        })
    })
}

fn launch_reduction<S, D, F>(src: &Tensor, dst: &Tensor, layout: &ReductionLayout, fold: F) -> CoreResult<()>
where
    S: Element,
    D: Element,
    F: Fn(&mut dyn Iterator<Item = S>) -> D + Send + Sync,
{
    let src_ptr = SendPtr::from_const(src.data_ptr());
    let dst_ptr = SendPtr::new(dst.data_ptr_mut());
    let num_outputs = layout.outer_shape.num_elements();
    let num_inner = layout.inner_shape.num_elements();
    dst.context().parallel_for(&dst.device(), num_outputs, |o| {
        let base = offset_of(&layout.outer_shape, &layout.outer_src_strides, o);
        let mut values = (0..num_inner).map(|j| {
            let offset = base + offset_of(&layout.inner_shape, &layout.inner_src_strides, j);
            // SAFETY: offsets stay inside src's view.
            unsafe { ptr::read_unaligned(src_ptr.get().wrapping_offset(offset as isize) as *const S) }
        });
        let result = fold(&mut values);
        let out = offset_of(&layout.outer_shape, &layout.outer_dst_strides, o);
        // SAFETY: each output element is written by exactly one iteration.
        unsafe { ptr::write_unaligned(dst_ptr.get().wrapping_offset(out as isize) as *mut D, result) };
    })
}
