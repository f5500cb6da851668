//! Device hash backend interface, columnar key/value buffer and backend factory

use crate::context::Context;
use crate::error::{CoreError, CoreResult};
use crate::tensor::{Device, Dtype, SizeVector, Tensor};
use super::cpu::CpuHashBackend;
use super::HashBackendType;

/// Keys hold between one and this many integer elements.
pub const MAX_KEY_ELEMENTS: i64 = 6;

/// Element types and per-entry shapes of the key and value columns.
#[derive(Debug, Clone, PartialEq)]
pub struct HashLayout {
    pub key_dtype: Dtype,
    pub key_element_shape: SizeVector,
    pub value_dtypes: Vec<Dtype>,
    pub value_element_shapes: Vec<SizeVector>,
}

impl HashLayout {
    pub fn new(
        key_dtype: Dtype,
        key_element_shape: impl Into<SizeVector>,
        value_dtypes: Vec<Dtype>,
        value_element_shapes: Vec<SizeVector>,
    ) -> CoreResult<Self> {
        let layout = Self {
            key_dtype,
            key_element_shape: key_element_shape.into(),
            value_dtypes,
            value_element_shapes,
        };
        layout.validate()?;
        Ok(layout)
    }

    fn validate(&self) -> CoreResult<()> {
        if !self.key_dtype.is_int() && !self.key_dtype.is_uint() {
            return Err(CoreError::dtype_error("an integer key dtype", &self.key_dtype.to_string()));
        }
        let key_elements = self.key_element_shape.checked_num_elements()?;
        if !(1..=MAX_KEY_ELEMENTS).contains(&key_elements) {
            return Err(CoreError::InvalidArgument(format!(
                "Keys must hold 1 to {} elements, got shape {}",
                MAX_KEY_ELEMENTS, self.key_element_shape
            )));
        }
        if self.value_dtypes.len() != self.value_element_shapes.len() {
            return Err(CoreError::InvalidArgument(format!(
                "{} value dtypes for {} value element shapes",
                self.value_dtypes.len(),
                self.value_element_shapes.len()
            )));
        }
        for (dtype, shape) in self.value_dtypes.iter().zip(&self.value_element_shapes) {
            if !dtype.is_defined() {
                return Err(CoreError::InvalidArgument("Value columns need a defined dtype".to_string()));
            }
            shape.checked_num_elements()?;
        }
        Ok(())
    }
}

/// One key tensor `{capacity, key_elems...}` plus one tensor per value column,
/// all addressed by the same buffer index.
#[derive(Debug, Clone)]
pub struct HashBackendBuffer {
    key_buffer: Tensor,
    value_buffers: Vec<Tensor>,
}

impl HashBackendBuffer {
    pub fn new(ctx: &Context, capacity: i64, layout: &HashLayout, device: &Device) -> CoreResult<Self> {
        let key_buffer = Tensor::empty(
            ctx,
            batch_shape(capacity, &layout.key_element_shape),
            layout.key_dtype,
            device,
        )?;
        let value_buffers = layout
            .value_dtypes
            .iter()
            .zip(&layout.value_element_shapes)
            .map(|(dtype, shape)| Tensor::empty(ctx, batch_shape(capacity, shape), *dtype, device))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Self {
            key_buffer,
            value_buffers,
        })
    }

    pub fn capacity(&self) -> i64 {
        self.key_buffer.shape()[0]
    }

    pub fn key_buffer(&self) -> &Tensor {
        &self.key_buffer
    }

    pub fn value_buffers(&self) -> &[Tensor] {
        &self.value_buffers
    }

    pub fn value_buffer(&self, i: usize) -> CoreResult<&Tensor> {
        self.value_buffers.get(i).ok_or_else(|| {
            CoreError::IndexOutOfRange(format!(
                "Value column {} of a map with {} value columns",
                i,
                self.value_buffers.len()
            ))
        })
    }

    /// Bytes occupied by one key.
    pub fn key_row_bytes(&self) -> usize {
        row_bytes(&self.key_buffer)
    }

    pub fn value_row_bytes(&self) -> Vec<usize> {
        self.value_buffers.iter().map(row_bytes).collect()
    }

    pub fn layout(&self) -> HashLayout {
        HashLayout {
            key_dtype: self.key_buffer.dtype(),
            key_element_shape: element_shape(&self.key_buffer),
            value_dtypes: self.value_buffers.iter().map(|v| v.dtype()).collect(),
            value_element_shapes: self.value_buffers.iter().map(element_shape).collect(),
        }
    }

    pub fn deep_copy(&self) -> CoreResult<Self> {
        Ok(Self {
            key_buffer: self.key_buffer.deep_copy()?,
            value_buffers: self
                .value_buffers
                .iter()
                .map(|v| v.deep_copy())
                .collect::<CoreResult<Vec<_>>>()?,
        })
    }

    /// Check a key batch against the key column and return its length.
    pub fn check_keys(&self, keys: &Tensor) -> CoreResult<i64> {
        check_batch(&self.key_buffer, keys, "keys")
    }

    /// Check one value batch per value column, each `n` rows long.
    pub fn check_values(&self, values: &[Tensor], n: i64) -> CoreResult<()> {
        if values.len() != self.value_buffers.len() {
            return Err(CoreError::InvalidArgument(format!(
                "Expected {} value tensors, got {}",
                self.value_buffers.len(),
                values.len()
            )));
        }
        for (buffer, value) in self.value_buffers.iter().zip(values) {
            let rows = check_batch(buffer, value, "values")?;
            if rows != n {
                return Err(CoreError::shape_error(
                    &format!("{} value rows", n),
                    &format!("{} rows", rows),
                    None,
                ));
            }
        }
        Ok(())
    }
}

fn batch_shape(n: i64, element_shape: &SizeVector) -> SizeVector {
    let mut shape = SizeVector::from([n]);
    for &d in element_shape.iter() {
        shape.push(d);
    }
    shape
}

fn element_shape(buffer: &Tensor) -> SizeVector {
    SizeVector::from(&buffer.shape()[1..])
}

fn row_bytes(buffer: &Tensor) -> usize {
    element_shape(buffer).num_elements() as usize * buffer.dtype().byte_size()
}

fn check_batch(buffer: &Tensor, batch: &Tensor, what: &str) -> CoreResult<i64> {
    batch.assert_device(&buffer.device())?;
    batch.assert_dtype(buffer.dtype())?;
    let elements = element_shape(buffer);
    if batch.ndim() != elements.len() + 1 || batch.shape()[1..] != elements[..] {
        return Err(CoreError::shape_error(
            &format!("{} shaped {{N, {}}}", what, elements.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")),
            &batch.shape().to_string(),
            None,
        ));
    }
    Ok(batch.shape()[0])
}

/// Parallel hash table storing its entries in a [`HashBackendBuffer`].
///
/// Batch calls return `buf_indices` (Int32) and `masks` (Bool) of length `N`, both
/// on the backend's device. Buffer indices stay valid until the entry is erased,
/// the table is cleared, or the backend is reserved to a new capacity.
pub trait DeviceHashBackend: Send + Sync {
    /// Insert keys with their values. New keys claim a slot; keys already present
    /// report their index with mask `false` and keep their old values.
    fn insert(&mut self, keys: &Tensor, values: &[Tensor]) -> CoreResult<(Tensor, Tensor)>;

    /// Insert keys without writing any value column.
    fn activate(&mut self, keys: &Tensor) -> CoreResult<(Tensor, Tensor)>;

    fn find(&self, keys: &Tensor) -> CoreResult<(Tensor, Tensor)>;

    fn erase(&mut self, keys: &Tensor) -> CoreResult<Tensor>;

    /// Buffer indices of every live entry.
    fn get_active_indices(&self) -> CoreResult<Tensor>;

    fn clear(&mut self) -> CoreResult<()>;

    /// Rebuild at `capacity` entries, re-inserting every live entry.
    fn reserve(&mut self, capacity: i64) -> CoreResult<()>;

    fn size(&self) -> i64;

    fn capacity(&self) -> i64;

    fn bucket_count(&self) -> i64;

    /// Live entries per bucket, counted at their home bucket.
    fn bucket_sizes(&self) -> CoreResult<Vec<i64>>;

    fn load_factor(&self) -> f32 {
        self.size() as f32 / self.bucket_count() as f32
    }

    fn device(&self) -> Device;

    fn buffer(&self) -> &HashBackendBuffer;

    fn deep_copy(&self) -> CoreResult<Box<dyn DeviceHashBackend>>;
}

/// Backend for `device`. Only the CPU has a hash backend in this crate.
pub fn create_device_hash_backend(
    ctx: &Context,
    backend_type: HashBackendType,
    capacity: i64,
    layout: &HashLayout,
    device: &Device,
) -> CoreResult<Box<dyn DeviceHashBackend>> {
    if capacity <= 0 || capacity > i32::MAX as i64 {
        return Err(CoreError::InvalidArgument(format!(
            "Hash map capacity must be in 1..={}, got {}",
            i32::MAX,
            capacity
        )));
    }
    if !device.is_cpu() {
        return Err(CoreError::device_error(
            &device.to_string(),
            "no hash backend is available for this device",
        ));
    }
    tracing::debug!(?backend_type, capacity, device = %device, "creating hash backend");
    match backend_type {
        HashBackendType::Default | HashBackendType::LinearProbing => {
            Ok(Box::new(CpuHashBackend::new(ctx, capacity, layout, device)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_validation() {
        assert!(HashLayout::new(Dtype::INT32, [3], vec![], vec![]).is_ok());
        assert!(HashLayout::new(Dtype::UINT16, [2, 3], vec![], vec![]).is_ok());
        assert!(HashLayout::new(Dtype::FLOAT32, [3], vec![], vec![]).is_err());
        assert!(HashLayout::new(Dtype::INT64, [7], vec![], vec![]).is_err());
        assert!(HashLayout::new(Dtype::INT64, [0], vec![], vec![]).is_err());
        assert!(HashLayout::new(Dtype::INT64, [3], vec![Dtype::FLOAT32], vec![]).is_err());
    }

    #[test]
    fn test_buffer_shapes_and_checks() {
        let ctx = Context::default();
        let layout = HashLayout::new(
            Dtype::INT32,
            [3],
            vec![Dtype::FLOAT32, Dtype::UINT8],
            vec![SizeVector::from([1]), SizeVector::from([2, 2])],
        )
        .unwrap();
        let buffer = HashBackendBuffer::new(&ctx, 10, &layout, &Device::cpu()).unwrap();
        assert_eq!(buffer.capacity(), 10);
        assert_eq!(buffer.key_row_bytes(), 12);
        assert_eq!(buffer.value_row_bytes(), vec![4, 4]);
        assert_eq!(buffer.value_buffer(1).unwrap().shape(), &SizeVector::from([10, 2, 2]));
        assert!(buffer.value_buffer(2).is_err());
        assert_eq!(buffer.layout(), layout);

        let keys = Tensor::zeros(&ctx, [4, 3], Dtype::INT32, &Device::cpu()).unwrap();
        assert_eq!(buffer.check_keys(&keys).unwrap(), 4);
        let flat = Tensor::zeros(&ctx, [12], Dtype::INT32, &Device::cpu()).unwrap();
        assert!(buffer.check_keys(&flat).is_err());
        let wide = Tensor::zeros(&ctx, [4, 3], Dtype::INT64, &Device::cpu()).unwrap();
        assert!(buffer.check_keys(&wide).is_err());

        let values = vec![
            Tensor::zeros(&ctx, [4, 1], Dtype::FLOAT32, &Device::cpu()).unwrap(),
            Tensor::zeros(&ctx, [4, 2, 2], Dtype::UINT8, &Device::cpu()).unwrap(),
        ];
        assert!(buffer.check_values(&values, 4).is_ok());
        assert!(buffer.check_values(&values, 5).is_err());
        assert!(buffer.check_values(&values[..1], 4).is_err());
    }

    #[test]
    fn test_factory_rejects_accelerators() {
        let ctx = Context::default();
        let layout = HashLayout::new(Dtype::INT64, [1], vec![], vec![]).unwrap();
        let err = create_device_hash_backend(&ctx, HashBackendType::Default, 8, &layout, &Device::cuda(0));
        assert!(matches!(err, Err(CoreError::DeviceError(_))));
        assert!(create_device_hash_backend(&ctx, HashBackendType::Default, 0, &layout, &Device::cpu()).is_err());
    }
}
