//! Advanced (integer array and boolean mask) indexing

use std::ptr;

use crate::dispatch::Element;
use crate::error::{CoreError, CoreResult};
use crate::parallel::SendPtr;
use crate::tensor::{shape, Device, Dtype, SizeVector, Tensor};
use crate::dispatch_dtype_with_bool;
use super::indexer::{broadcast_byte_strides, offset_of};

/// Index tensors normalized against one source tensor.
///
/// Boolean masks are expanded into one integer index per masked dimension, all
/// indices are broadcast to a common `indexed_shape`, wrapped and range-checked.
pub(crate) struct AdvancedIndex {
    indexed_shape: SizeVector,
    indices: Vec<Vec<i64>>,
    output_shape: SizeVector,
}

impl AdvancedIndex {
    pub(crate) fn new(tensor: &Tensor, index_tensors: &[Tensor]) -> CoreResult<Self> {
        let mut expanded: Vec<Tensor> = Vec::with_capacity(index_tensors.len());
        for index in index_tensors {
            let dim = expanded.len();
            if index.dtype() == Dtype::BOOL {
                if index.ndim() == 0 {
                    return Err(CoreError::InvalidArgument(
                        "Boolean mask index must have at least one dimension".to_string(),
                    ));
                }
                let covered = tensor.shape().get(dim..dim + index.ndim());
                if covered != Some(index.shape().as_slice()) {
                    return Err(CoreError::shape_error(
                        &format!("a mask matching dimensions {}..{} of {}", dim, dim + index.ndim(), tensor.shape()),
                        &index.shape().to_string(),
                        None,
                    ));
                }
                let positions = nonzero(index)?;
                for d in 0..index.ndim() {
                    expanded.push(positions.index_extract(0, d as i64)?);
                }
            } else if index.dtype().is_int() {
                if index.dtype() == Dtype::UINT64 {
                    if let Some(&big) = index.to_vec::<u64>()?.iter().find(|&&v| v > i64::MAX as u64) {
                        return Err(CoreError::IndexOutOfRange(format!(
                            "Index {} for dimension {} of shape {}",
                            big,
                            dim,
                            tensor.shape()
                        )));
                    }
                }
                expanded.push(index.to(Dtype::INT64)?);
            } else {
                return Err(CoreError::dtype_error("an integer or Bool index", &index.dtype().to_string()));
            }
        }
        if expanded.is_empty() {
            return Err(CoreError::InvalidArgument("At least one index tensor is required".to_string()));
        }
        if expanded.len() > tensor.ndim() {
            return Err(CoreError::IndexOutOfRange(format!(
                "{} indices for a tensor of shape {}",
                expanded.len(),
                tensor.shape()
            )));
        }

        let mut indexed_shape = expanded[0].shape().clone();
        for index in &expanded[1..] {
            indexed_shape = shape::broadcasted_shape(&indexed_shape, index.shape())?;
        }

        let mut indices = Vec::with_capacity(expanded.len());
        for (dim, index) in expanded.iter().enumerate() {
            let size = tensor.shape()[dim];
            let mut values = index.expand(indexed_shape.clone())?.to_vec::<i64>()?;
            for v in values.iter_mut() {
                let wrapped = if *v < 0 { *v + size } else { *v };
                if wrapped < 0 || wrapped >= size {
                    return Err(CoreError::IndexOutOfRange(format!(
                        "Index {} out of range for dimension {} of size {}",
                        v, dim, size
                    )));
                }
                *v = wrapped;
            }
            indices.push(values);
        }

        let mut output_shape = indexed_shape.clone();
        for &d in &tensor.shape()[indices.len()..] {
            output_shape.push(d);
        }
        Ok(Self {
            indexed_shape,
            indices,
            output_shape,
        })
    }

    /// Byte offset in `tensor` of indexed position `i` (without the trailing dims).
    #[inline]
    fn indexed_offset(&self, byte_strides: &[i64], i: usize) -> i64 {
        self.indices
            .iter()
            .zip(byte_strides)
            .map(|(index, stride)| index[i] * stride)
            .sum()
    }

    /// True when two indexed positions address the same sub-tensor.
    fn has_duplicates(&self, tensor_shape: &SizeVector) -> bool {
        let n = self.indexed_shape.num_elements() as usize;
        let mut linear: Vec<i64> = (0..n)
            .map(|i| {
                self.indices
                    .iter()
                    .enumerate()
                    .fold(0i64, |acc, (dim, index)| acc * tensor_shape[dim] + index[i])
            })
            .collect();
        linear.sort_unstable();
        linear.windows(2).any(|w| w[0] == w[1])
    }
}

/// Byte strides and shape of the dimensions left after the indexed ones.
fn trailing_layout(tensor: &Tensor, num_indexed: usize) -> (SizeVector, SizeVector, SizeVector) {
    let element_size = tensor.dtype().byte_size() as i64;
    let byte_strides: SizeVector = tensor.strides().iter().map(|s| s * element_size).collect();
    let indexed_strides: SizeVector = byte_strides[..num_indexed].iter().copied().collect();
    let rest_shape: SizeVector = tensor.shape()[num_indexed..].iter().copied().collect();
    let rest_strides: SizeVector = byte_strides[num_indexed..].iter().copied().collect();
    (indexed_strides, rest_shape, rest_strides)
}

/// Gather `src[index_tensors]` into a new contiguous tensor.
pub fn index_get(src: &Tensor, index_tensors: &[Tensor]) -> CoreResult<Tensor> {
    let index = AdvancedIndex::new(src, index_tensors)?;
    let dst = Tensor::empty(src.context(), index.output_shape.clone(), src.dtype(), &src.device())?;
    let (indexed_strides, rest_shape, rest_strides) = trailing_layout(src, index.indices.len());
    let num_rest = rest_shape.num_elements();
    let element_size = src.dtype().byte_size();
    let src_ptr = SendPtr::from_const(src.data_ptr());
    let dst_ptr = SendPtr::new(dst.data_ptr_mut());

    src.context().parallel_for(&src.device(), dst.num_elements(), |o| {
        let i = (o / num_rest) as usize;
        let offset = index.indexed_offset(&indexed_strides, i) + offset_of(&rest_shape, &rest_strides, o % num_rest);
        // SAFETY: indices were range-checked; dst is contiguous and sized for every o.
        unsafe {
            ptr::copy_nonoverlapping(
                src_ptr.get().wrapping_offset(offset as isize),
                dst_ptr.get().add(o as usize * element_size),
                element_size,
            );
        }
    })?;
    Ok(dst)
}

/// Scatter `value` (broadcast to the indexed result shape) into `dst[index_tensors]`.
///
/// When indices repeat, the last occurrence in row-major order wins.
pub fn index_set(dst: &Tensor, value: &Tensor, index_tensors: &[Tensor]) -> CoreResult<()> {
    let index = AdvancedIndex::new(dst, index_tensors)?;
    let output_shape = index.output_shape.clone();
    if !shape::is_broadcastable_to(value.shape(), &output_shape) {
        return Err(CoreError::shape_error(
            &format!("a value broadcastable to {}", output_shape),
            &value.shape().to_string(),
            None,
        ));
    }
    let value = value.to(dst.dtype())?.to_device(&dst.device())?;
    let value_strides = broadcast_byte_strides(&value, &output_shape);
    let (indexed_strides, rest_shape, rest_strides) = trailing_layout(dst, index.indices.len());
    let num_rest = rest_shape.num_elements();
    let element_size = dst.dtype().byte_size();
    let src_ptr = SendPtr::from_const(value.data_ptr());
    let dst_ptr = SendPtr::new(dst.data_ptr_mut());

    let body = |o: i64| {
        let i = (o / num_rest) as usize;
        let offset = index.indexed_offset(&indexed_strides, i) + offset_of(&rest_shape, &rest_strides, o % num_rest);
        let src_offset = offset_of(&output_shape, &value_strides, o);
        // SAFETY: indices were range-checked against dst's shape.
        unsafe {
            ptr::copy(
                src_ptr.get().wrapping_offset(src_offset as isize),
                dst_ptr.get().wrapping_offset(offset as isize),
                element_size,
            );
        }
    };
    let n = output_shape.num_elements();
    if index.has_duplicates(dst.shape()) {
        if !dst.device().is_cpu() {
            return Err(CoreError::device_error(
                &dst.device().to_string(),
                "no kernel launcher is available for this device",
            ));
        }
        tracing::trace!(n, "index_set with repeated indices runs serially");
        (0..n).for_each(body);
        return Ok(());
    }
    dst.context().parallel_for(&dst.device(), n, body)
}

/// Coordinates of the non-zero elements as an Int64 tensor of shape `{ndim, count}`.
pub fn nonzero(src: &Tensor) -> CoreResult<Tensor> {
    let host = src.to_device(&Device::cpu())?;
    let flags: Vec<bool> = dispatch_dtype_with_bool!(src.dtype(), "NonZero", T => {
        Ok(host.to_vec::<T>()?.into_iter().map(|v: T| v.to_bool()).collect::<Vec<bool>>())
    })?;
    let count = flags.iter().filter(|f| **f).count();
    let ndim = src.ndim();
    let mut coords = vec![0i64; ndim * count];
    for (c, flat) in flags.iter().enumerate().filter(|(_, f)| **f).map(|(i, _)| i as i64).enumerate() {
        let mut rem = flat;
        for d in (0..ndim).rev() {
            let size = src.shape()[d];
            coords[d * count + c] = rem % size;
            rem /= size;
        }
    }
    Tensor::from_vec(src.context(), coords, [ndim as i64, count as i64], &src.device())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    fn grid(ctx: &Context) -> Tensor {
        Tensor::from_vec(ctx, (0..12).collect::<Vec<i32>>(), [3, 4], &Device::cpu()).unwrap()
    }

    fn index(ctx: &Context, values: Vec<i64>) -> Tensor {
        let n = values.len() as i64;
        Tensor::from_vec(ctx, values, [n], &Device::cpu()).unwrap()
    }

    #[test]
    fn test_get_rows() {
        let ctx = Context::default();
        let out = index_get(&grid(&ctx), &[index(&ctx, vec![2, 0])]).unwrap();
        assert_eq!(out.shape(), &SizeVector::from([2, 4]));
        assert_eq!(out.to_vec::<i32>().unwrap(), vec![8, 9, 10, 11, 0, 1, 2, 3]);
    }

    #[test]
    fn test_get_points_with_negative_indices() {
        let ctx = Context::default();
        let rows = index(&ctx, vec![0, -1]);
        let cols = index(&ctx, vec![1, -1]);
        let out = index_get(&grid(&ctx), &[rows, cols]).unwrap();
        assert_eq!(out.to_vec::<i32>().unwrap(), vec![1, 11]);
    }

    #[test]
    fn test_out_of_range_is_rejected_before_copy() {
        let ctx = Context::default();
        let err = index_get(&grid(&ctx), &[index(&ctx, vec![0, 3])]).unwrap_err();
        assert!(matches!(err, CoreError::IndexOutOfRange(_)));
    }

    #[test]
    fn test_huge_unsigned_index_does_not_wrap() {
        let ctx = Context::default();
        // u64::MAX would become -1 as Int64 and wrap to the last row.
        let huge = Tensor::from_vec(&ctx, vec![u64::MAX], [1], &Device::cpu()).unwrap();
        let err = index_get(&grid(&ctx), &[huge]).unwrap_err();
        assert!(matches!(err, CoreError::IndexOutOfRange(_)));

        let small = Tensor::from_vec(&ctx, vec![1u64], [1], &Device::cpu()).unwrap();
        let out = index_get(&grid(&ctx), &[small]).unwrap();
        assert_eq!(out.to_vec::<i32>().unwrap(), vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_bool_mask_get_and_set() {
        let ctx = Context::default();
        let t = grid(&ctx);
        let mask = Tensor::from_vec(&ctx, vec![true, false, true], [3], &Device::cpu()).unwrap();
        let rows = index_get(&t, &[mask.clone()]).unwrap();
        assert_eq!(rows.shape(), &SizeVector::from([2, 4]));

        let zero = Tensor::scalar(&ctx, 0i32, &Device::cpu()).unwrap();
        index_set(&t, &zero, &[mask]).unwrap();
        assert_eq!(t.to_vec::<i32>().unwrap()[..8], [0, 0, 0, 0, 4, 5, 6, 7]);

        let bad_mask = Tensor::from_vec(&ctx, vec![true, false], [2], &Device::cpu()).unwrap();
        assert!(index_get(&t, &[bad_mask]).is_err());
    }

    #[test]
    fn test_set_last_duplicate_wins() {
        let ctx = Context::default();
        let t = Tensor::zeros(&ctx, [3], Dtype::FLOAT64, &Device::cpu()).unwrap();
        let values = Tensor::from_vec(&ctx, vec![1.0f64, 2.0, 3.0], [3], &Device::cpu()).unwrap();
        index_set(&t, &values, &[index(&ctx, vec![1, 1, 2])]).unwrap();
        assert_eq!(t.to_vec::<f64>().unwrap(), vec![0.0, 2.0, 3.0]);
    }

    #[test]
    fn test_nonzero_coordinates() {
        let ctx = Context::default();
        let t = Tensor::from_vec(&ctx, vec![0.0f32, 1.5, 0.0, -2.0], [2, 2], &Device::cpu()).unwrap();
        let nz = nonzero(&t).unwrap();
        assert_eq!(nz.shape(), &SizeVector::from([2, 2]));
        assert_eq!(nz.to_vec::<i64>().unwrap(), vec![0, 1, 1, 1]);
    }
}
