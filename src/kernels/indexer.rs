//! Maps a linear workload index to byte addresses of broadcast operands

use crate::error::{CoreError, CoreResult};
use crate::parallel::SendPtr;
use crate::tensor::{shape, SizeVector, Tensor};

/// One operand's base pointer and byte strides aligned to the iteration shape.
#[derive(Clone, Copy)]
struct Operand {
    ptr: SendPtr<u8>,
    strides_index: usize,
}

/// Walks the output shape in row-major order; inputs are broadcast onto it with
/// zero strides on stretched dimensions.
pub(crate) struct Indexer {
    shape: SizeVector,
    byte_strides: Vec<SizeVector>,
    inputs: Vec<Operand>,
    output: Operand,
}

impl Indexer {
    pub(crate) fn new(inputs: &[&Tensor], output: &Tensor) -> CoreResult<Self> {
        let shape = output.shape().clone();
        let mut byte_strides = Vec::with_capacity(inputs.len() + 1);
        let mut operands = Vec::with_capacity(inputs.len());
        for (i, input) in inputs.iter().enumerate() {
            if !shape::is_broadcastable_to(input.shape(), &shape) {
                return Err(CoreError::shape_error(
                    &format!("an operand broadcastable to {}", shape),
                    &input.shape().to_string(),
                    None,
                ));
            }
            byte_strides.push(broadcast_byte_strides(input, &shape));
            operands.push(Operand {
                ptr: SendPtr::from_const(input.data_ptr()),
                strides_index: i,
            });
        }
        byte_strides.push(broadcast_byte_strides(output, &shape));
        let output = Operand {
            ptr: SendPtr::new(output.data_ptr_mut()),
            strides_index: inputs.len(),
        };
        Ok(Self {
            shape,
            byte_strides,
            inputs: operands,
            output,
        })
    }

    pub(crate) fn num_workloads(&self) -> i64 {
        self.shape.num_elements()
    }

    #[inline]
    fn byte_offset(&self, strides_index: usize, mut workload: i64) -> isize {
        let strides = &self.byte_strides[strides_index];
        let mut offset = 0i64;
        for d in (0..self.shape.ndim()).rev() {
            let size = self.shape[d];
            offset += (workload % size) * strides[d];
            workload /= size;
        }
        offset as isize
    }

    #[inline]
    pub(crate) fn input_ptr(&self, input: usize, workload: i64) -> *const u8 {
        let op = self.inputs[input];
        op.ptr.get().wrapping_offset(self.byte_offset(op.strides_index, workload)) as *const u8
    }

    #[inline]
    pub(crate) fn output_ptr(&self, workload: i64) -> *mut u8 {
        self.output
            .ptr
            .get()
            .wrapping_offset(self.byte_offset(self.output.strides_index, workload))
    }
}

/// Byte strides of `tensor` viewed with `shape`; leading and stretched dims get 0.
pub(crate) fn broadcast_byte_strides(tensor: &Tensor, shape: &SizeVector) -> SizeVector {
    let element_size = tensor.dtype().byte_size() as i64;
    let lead = shape.ndim() - tensor.ndim();
    let mut strides = SizeVector::filled(shape.ndim(), 0);
    for d in lead..shape.ndim() {
        let src_d = d - lead;
        if tensor.shape()[src_d] == shape[d] {
            strides[d] = tensor.strides()[src_d] * element_size;
        }
    }
    strides
}

/// Byte offset of the row-major `workload` within `shape` under `byte_strides`.
#[inline]
pub(crate) fn offset_of(shape: &[i64], byte_strides: &[i64], mut workload: i64) -> i64 {
    let mut offset = 0;
    for d in (0..shape.len()).rev() {
        offset += (workload % shape[d]) * byte_strides[d];
        workload /= shape[d];
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::tensor::{Device, Dtype};

    #[test]
    fn test_broadcast_strides() {
        let ctx = Context::default();
        let row = Tensor::zeros(&ctx, [3], Dtype::INT32, &Device::cpu()).unwrap();
        let out = Tensor::zeros(&ctx, [2, 3], Dtype::INT32, &Device::cpu()).unwrap();
        assert_eq!(broadcast_byte_strides(&row, out.shape()), SizeVector::from([0, 4]));
        assert_eq!(broadcast_byte_strides(&out, out.shape()), SizeVector::from([12, 4]));

        let indexer = Indexer::new(&[&row], &out).unwrap();
        assert_eq!(indexer.num_workloads(), 6);
        let base = row.data_ptr() as usize;
        assert_eq!(indexer.input_ptr(0, 4) as usize - base, 4);
        assert_eq!(indexer.output_ptr(4) as usize - out.data_ptr() as usize, 16);
    }

    #[test]
    fn test_rejects_non_broadcastable() {
        let ctx = Context::default();
        let a = Tensor::zeros(&ctx, [4], Dtype::INT32, &Device::cpu()).unwrap();
        let out = Tensor::zeros(&ctx, [2, 3], Dtype::INT32, &Device::cpu()).unwrap();
        assert!(Indexer::new(&[&a], &out).is_err());
    }

    #[test]
    fn test_offset_of_transposed() {
        // 2x3 transposed view of a contiguous 3x2 float tensor.
        assert_eq!(offset_of(&[2, 3], &[4, 8], 4), 4 + 8);
    }
}
