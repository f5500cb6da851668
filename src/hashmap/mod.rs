//! Parallel hash map over integer-vector keys with tensor-backed columnar storage
//!
//! Keys are rows of an integer tensor `{N, key_elems...}`; each value column is a
//! tensor `{N, value_elems...}`. Batch calls hand back buffer indices into
//! [`HashMap::key_tensor`] and [`HashMap::value_tensors`] together with boolean masks.

pub mod backend;
pub mod cpu;
pub mod hash;
pub mod hash_set;

pub use backend::{create_device_hash_backend, DeviceHashBackend, HashBackendBuffer, HashLayout};
pub use cpu::CpuHashBackend;
pub use hash_set::HashSet;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::CoreResult;
use crate::tensor::{Device, Dtype, SizeVector, Tensor};

/// Backend selection for [`create_device_hash_backend`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashBackendType {
    /// Whatever the device's default backend is
    Default,
    LinearProbing,
}

pub struct HashMap {
    ctx: Context,
    backend_type: HashBackendType,
    backend: Box<dyn DeviceHashBackend>,
}

impl HashMap {
    /// Map with a single value column.
    pub fn new(
        ctx: &Context,
        init_capacity: i64,
        key_dtype: Dtype,
        key_element_shape: impl Into<SizeVector>,
        value_dtype: Dtype,
        value_element_shape: impl Into<SizeVector>,
        device: &Device,
    ) -> CoreResult<Self> {
        let layout = HashLayout::new(
            key_dtype,
            key_element_shape,
            vec![value_dtype],
            vec![value_element_shape.into()],
        )?;
        Self::with_layout(ctx, init_capacity, layout, device)
    }

    /// Map with any number of value columns, including none.
    pub fn multi_valued(
        ctx: &Context,
        init_capacity: i64,
        key_dtype: Dtype,
        key_element_shape: impl Into<SizeVector>,
        value_dtypes: Vec<Dtype>,
        value_element_shapes: Vec<SizeVector>,
        device: &Device,
    ) -> CoreResult<Self> {
        let layout = HashLayout::new(key_dtype, key_element_shape, value_dtypes, value_element_shapes)?;
        Self::with_layout(ctx, init_capacity, layout, device)
    }

    /// Map on the context's configured default backend.
    pub fn with_layout(ctx: &Context, init_capacity: i64, layout: HashLayout, device: &Device) -> CoreResult<Self> {
        Self::with_backend(ctx, ctx.config().hashmap.default_backend, init_capacity, layout, device)
    }

    pub fn with_backend(
        ctx: &Context,
        backend_type: HashBackendType,
        init_capacity: i64,
        layout: HashLayout,
        device: &Device,
    ) -> CoreResult<Self> {
        let capacity = init_capacity.max(ctx.config().hashmap.min_capacity as i64);
        let backend = create_device_hash_backend(ctx, backend_type, capacity, &layout, device)?;
        Ok(Self {
            ctx: ctx.clone(),
            backend_type,
            backend,
        })
    }

    /// Insert `keys` with one value tensor. Returns `(buf_indices, masks)`; `masks[i]`
    /// is true when row `i` inserted a new entry.
    pub fn insert(&mut self, keys: &Tensor, values: &Tensor) -> CoreResult<(Tensor, Tensor)> {
        self.insert_multi(keys, std::slice::from_ref(values))
    }

    /// Insert `keys` with one value tensor per value column.
    pub fn insert_multi(&mut self, keys: &Tensor, values: &[Tensor]) -> CoreResult<(Tensor, Tensor)> {
        let n = self.backend.buffer().check_keys(keys)?;
        self.backend.buffer().check_values(values, n)?;
        self.grow_for(n)?;
        self.backend.insert(keys, values)
    }

    /// Insert `keys` and leave the value columns of new entries unwritten.
    pub fn activate(&mut self, keys: &Tensor) -> CoreResult<(Tensor, Tensor)> {
        let n = self.backend.buffer().check_keys(keys)?;
        self.grow_for(n)?;
        self.backend.activate(keys)
    }

    pub fn find(&self, keys: &Tensor) -> CoreResult<(Tensor, Tensor)> {
        self.backend.find(keys)
    }

    pub fn erase(&mut self, keys: &Tensor) -> CoreResult<Tensor> {
        self.backend.erase(keys)
    }

    pub fn get_active_indices(&self) -> CoreResult<Tensor> {
        self.backend.get_active_indices()
    }

    pub fn clear(&mut self) -> CoreResult<()> {
        self.backend.clear()
    }

    /// Rebuild with room for `capacity` entries. Buffer indices change.
    pub fn reserve(&mut self, capacity: i64) -> CoreResult<()> {
        self.backend.reserve(capacity)
    }

    fn grow_for(&mut self, n: i64) -> CoreResult<()> {
        let (size, capacity) = (self.size(), self.capacity());
        if size + n > capacity {
            let new_capacity = (2 * capacity).max(size + n);
            tracing::debug!(size, batch = n, capacity, new_capacity, "growing hash map");
            self.backend.reserve(new_capacity)?;
        }
        Ok(())
    }

    pub fn size(&self) -> i64 {
        self.backend.size()
    }

    pub fn capacity(&self) -> i64 {
        self.backend.capacity()
    }

    pub fn bucket_count(&self) -> i64 {
        self.backend.bucket_count()
    }

    pub fn load_factor(&self) -> f32 {
        self.backend.load_factor()
    }

    pub fn bucket_sizes(&self) -> CoreResult<Vec<i64>> {
        self.backend.bucket_sizes()
    }

    /// Key buffer `{capacity, key_elems...}`, addressed by buffer index.
    pub fn key_tensor(&self) -> Tensor {
        self.backend.buffer().key_buffer().clone()
    }

    pub fn value_tensors(&self) -> Vec<Tensor> {
        self.backend.buffer().value_buffers().to_vec()
    }

    pub fn value_tensor(&self, i: usize) -> CoreResult<Tensor> {
        self.backend.buffer().value_buffer(i).cloned()
    }

    /// Independent copy; buffer indices stay valid in the copy.
    pub fn deep_copy(&self) -> CoreResult<Self> {
        Ok(Self {
            ctx: self.ctx.clone(),
            backend_type: self.backend_type,
            backend: self.backend.deep_copy()?,
        })
    }

    pub fn device(&self) -> Device {
        self.backend.device()
    }

    pub fn backend_type(&self) -> HashBackendType {
        self.backend_type
    }

    pub fn key_dtype(&self) -> Dtype {
        self.backend.buffer().key_buffer().dtype()
    }

    pub fn key_element_shape(&self) -> SizeVector {
        SizeVector::from(&self.backend.buffer().key_buffer().shape()[1..])
    }

    pub fn value_dtypes(&self) -> Vec<Dtype> {
        self.backend.buffer().value_buffers().iter().map(|v| v.dtype()).collect()
    }
}

impl std::fmt::Debug for HashMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashMap")
            .field("backend_type", &self.backend_type)
            .field("device", &self.device())
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .field("key_dtype", &self.key_dtype())
            .field("key_element_shape", &self.key_element_shape())
            .finish()
    }
}
