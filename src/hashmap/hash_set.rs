use crate::context::Context;
use crate::error::CoreResult;
use crate::tensor::{Device, Dtype, SizeVector, Tensor};
use super::{HashBackendType, HashLayout, HashMap};

/// Set of integer-vector keys: a [`HashMap`] without value columns.
#[derive(Debug)]
pub struct HashSet {
    map: HashMap,
}

impl HashSet {
    pub fn new(
        ctx: &Context,
        init_capacity: i64,
        key_dtype: Dtype,
        key_element_shape: impl Into<SizeVector>,
        device: &Device,
    ) -> CoreResult<Self> {
        let layout = HashLayout::new(key_dtype, key_element_shape, Vec::new(), Vec::new())?;
        Ok(Self {
            map: HashMap::with_layout(ctx, init_capacity, layout, device)?,
        })
    }

    pub fn with_backend(
        ctx: &Context,
        backend_type: HashBackendType,
        init_capacity: i64,
        key_dtype: Dtype,
        key_element_shape: impl Into<SizeVector>,
        device: &Device,
    ) -> CoreResult<Self> {
        let layout = HashLayout::new(key_dtype, key_element_shape, Vec::new(), Vec::new())?;
        Ok(Self {
            map: HashMap::with_backend(ctx, backend_type, init_capacity, layout, device)?,
        })
    }

    pub fn insert(&mut self, keys: &Tensor) -> CoreResult<(Tensor, Tensor)> {
        self.map.insert_multi(keys, &[])
    }

    pub fn find(&self, keys: &Tensor) -> CoreResult<(Tensor, Tensor)> {
        self.map.find(keys)
    }

    pub fn erase(&mut self, keys: &Tensor) -> CoreResult<Tensor> {
        self.map.erase(keys)
    }

    pub fn get_active_indices(&self) -> CoreResult<Tensor> {
        self.map.get_active_indices()
    }

    pub fn clear(&mut self) -> CoreResult<()> {
        self.map.clear()
    }

    pub fn reserve(&mut self, capacity: i64) -> CoreResult<()> {
        self.map.reserve(capacity)
    }

    pub fn size(&self) -> i64 {
        self.map.size()
    }

    pub fn capacity(&self) -> i64 {
        self.map.capacity()
    }

    pub fn bucket_count(&self) -> i64 {
        self.map.bucket_count()
    }

    pub fn load_factor(&self) -> f32 {
        self.map.load_factor()
    }

    pub fn bucket_sizes(&self) -> CoreResult<Vec<i64>> {
        self.map.bucket_sizes()
    }

    pub fn key_tensor(&self) -> Tensor {
        self.map.key_tensor()
    }

    pub fn deep_copy(&self) -> CoreResult<Self> {
        Ok(Self {
            map: self.map.deep_copy()?,
        })
    }

    pub fn device(&self) -> Device {
        self.map.device()
    }

    pub fn key_dtype(&self) -> Dtype {
        self.map.key_dtype()
    }

    pub fn key_element_shape(&self) -> SizeVector {
        self.map.key_element_shape()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_semantics() {
        let ctx = Context::default();
        let mut set = HashSet::new(&ctx, 4, Dtype::INT64, [1], &Device::cpu()).unwrap();
        let keys = Tensor::from_vec(&ctx, vec![3i64, 1, 3, 2, 1], [5, 1], &Device::cpu()).unwrap();
        let (_, masks) = set.insert(&keys).unwrap();
        assert_eq!(masks.to_vec::<bool>().unwrap(), vec![true, true, false, true, false]);
        assert_eq!(set.size(), 3);

        let mut members = set
            .key_tensor()
            .index_get(&[set.get_active_indices().unwrap()])
            .unwrap()
            .to_vec::<i64>()
            .unwrap();
        members.sort();
        assert_eq!(members, vec![1, 2, 3]);

        set.erase(&Tensor::from_vec(&ctx, vec![2i64], [1, 1], &Device::cpu()).unwrap()).unwrap();
        let (_, masks) = set.find(&keys).unwrap();
        assert_eq!(masks.to_vec::<bool>().unwrap(), vec![true, true, true, false, true]);
    }

    #[test]
    fn test_set_grows_past_capacity() {
        let ctx = Context::default();
        let mut set = HashSet::with_backend(&ctx, HashBackendType::LinearProbing, 16, Dtype::UINT16, [2], &Device::cpu()).unwrap();
        let keys = Tensor::from_vec(&ctx, (0..100u16).collect::<Vec<u16>>(), [50, 2], &Device::cpu()).unwrap();
        set.insert(&keys).unwrap();
        assert_eq!(set.size(), 50);
        assert!(set.capacity() >= 50);
        let copy = set.deep_copy().unwrap();
        set.clear().unwrap();
        assert_eq!(copy.size(), 50);
        assert_eq!(copy.key_element_shape(), SizeVector::from([2]));
    }
}
