//! CPU hash backend: linear probing over an atomic slot table

use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use crate::context::Context;
use crate::error::{CoreError, CoreResult};
use crate::parallel::SendPtr;
use crate::tensor::{Device, Dtype, Tensor};
use super::backend::{DeviceHashBackend, HashBackendBuffer, HashLayout};
use super::hash::{key_hasher, KeyHashFn};

const EMPTY: u64 = u64::MAX;
const TOMBSTONE: u64 = u64::MAX - 1;
/// A claimed slot whose key is still being written.
const BUSY: u64 = u64::MAX - 2;

fn is_entry(state: u64) -> bool {
    state < BUSY
}

/// Open-addressing table whose slots hold buffer indices.
///
/// Slots are claimed with compare-and-swap, so one batch runs in parallel and
/// duplicate keys inside the batch resolve to a single winner. Free buffer indices
/// live in a heap: `heap[top..capacity]` are free.
pub struct CpuHashBackend {
    ctx: Context,
    device: Device,
    buffer: HashBackendBuffer,
    hasher: KeyHashFn,
    key_row_bytes: usize,
    slots: Vec<AtomicU64>,
    heap: Vec<AtomicU32>,
    heap_top: AtomicUsize,
    tombstones: AtomicUsize,
}

impl CpuHashBackend {
    pub fn new(ctx: &Context, capacity: i64, layout: &HashLayout, device: &Device) -> CoreResult<Self> {
        if !device.is_cpu() {
            return Err(CoreError::device_error(&device.to_string(), "CpuHashBackend requires a CPU device"));
        }
        let hasher = key_hasher(layout.key_dtype)?;
        let buffer = HashBackendBuffer::new(ctx, capacity, layout, device)?;
        let bucket_count = (2 * capacity as usize).next_power_of_two();
        Ok(Self {
            ctx: ctx.clone(),
            device: *device,
            key_row_bytes: buffer.key_row_bytes(),
            buffer,
            hasher,
            slots: (0..bucket_count).map(|_| AtomicU64::new(EMPTY)).collect(),
            heap: (0..capacity as u32).map(AtomicU32::new).collect(),
            heap_top: AtomicUsize::new(0),
            tombstones: AtomicUsize::new(0),
        })
    }

    fn home_slot(&self, key: &[u8]) -> usize {
        (self.hasher)(key) as usize & (self.slots.len() - 1)
    }

    fn key_at(&self, index: u32) -> &[u8] {
        // SAFETY: index < capacity and the key buffer is a contiguous CPU tensor.
        unsafe {
            slice::from_raw_parts(
                self.buffer.key_buffer().data_ptr().add(index as usize * self.key_row_bytes),
                self.key_row_bytes,
            )
        }
    }

    fn allocate(&self) -> u32 {
        let top = self.heap_top.fetch_add(1, Ordering::AcqRel);
        self.heap[top].load(Ordering::Acquire)
    }

    fn release(&self, index: u32) {
        let top = self.heap_top.fetch_sub(1, Ordering::AcqRel) - 1;
        self.heap[top].store(index, Ordering::Release);
    }

    /// Slot and buffer index holding `key`.
    fn lookup(&self, key: &[u8]) -> Option<(usize, u32)> {
        let mask = self.slots.len() - 1;
        let mut slot = self.home_slot(key);
        for _ in 0..self.slots.len() {
            match self.slots[slot].load(Ordering::Acquire) {
                EMPTY => return None,
                state if is_entry(state) && self.key_at(state as u32) == key => {
                    return Some((slot, state as u32));
                }
                _ => {}
            }
            slot = (slot + 1) & mask;
        }
        None
    }

    /// Buffer index of `key`, inserting it first when absent.
    fn claim(&self, key: &[u8]) -> (u32, bool) {
        let mask = self.slots.len() - 1;
        let mut slot = self.home_slot(key);
        loop {
            let entry = &self.slots[slot];
            let mut state = entry.load(Ordering::Acquire);
            loop {
                match state {
                    EMPTY => match entry.compare_exchange(EMPTY, BUSY, Ordering::AcqRel, Ordering::Acquire) {
                        Ok(_) => {
                            let index = self.allocate();
                            // SAFETY: the claimed index is owned by this call until published.
                            unsafe {
                                ptr::copy_nonoverlapping(
                                    key.as_ptr(),
                                    self.buffer.key_buffer().data_ptr_mut().add(index as usize * self.key_row_bytes),
                                    self.key_row_bytes,
                                );
                            }
                            entry.store(index as u64, Ordering::Release);
                            return (index, true);
                        }
                        Err(current) => state = current,
                    },
                    BUSY => {
                        std::hint::spin_loop();
                        state = entry.load(Ordering::Acquire);
                    }
                    TOMBSTONE => break,
                    index => {
                        if self.key_at(index as u32) == key {
                            return (index as u32, false);
                        }
                        break;
                    }
                }
            }
            slot = (slot + 1) & mask;
        }
    }

    /// Rebuild the slot table from the live entries; buffer indices do not move.
    fn compact(&mut self) {
        let live: Vec<u32> = self
            .slots
            .iter()
            .map(|s| s.load(Ordering::Acquire))
            .filter(|&s| is_entry(s))
            .map(|s| s as u32)
            .collect();
        for slot in &self.slots {
            slot.store(EMPTY, Ordering::Relaxed);
        }
        let mask = self.slots.len() - 1;
        for index in live {
            let mut slot = self.home_slot(self.key_at(index));
            while self.slots[slot].load(Ordering::Relaxed) != EMPTY {
                slot = (slot + 1) & mask;
            }
            self.slots[slot].store(index as u64, Ordering::Release);
        }
        tracing::debug!(
            tombstones = self.tombstones.load(Ordering::Relaxed),
            size = self.size(),
            "compacted hash slot table"
        );
        self.tombstones.store(0, Ordering::Relaxed);
    }

    fn insert_impl(&mut self, keys: &Tensor, values: Option<&[Tensor]>) -> CoreResult<(Tensor, Tensor)> {
        let n = self.buffer.check_keys(keys)?;
        if let Some(values) = values {
            self.buffer.check_values(values, n)?;
        }
        if self.size() + n > self.capacity() {
            return Err(CoreError::CapacityExceeded(format!(
                "{} entries plus a batch of {} exceed capacity {}",
                self.size(),
                n,
                self.capacity()
            )));
        }
        let occupied = self.size() as usize + self.tombstones.load(Ordering::Relaxed) + n as usize;
        if occupied * 4 > self.slots.len() * 3 {
            self.compact();
        }

        let keys = keys.contiguous()?;
        let buf_indices = Tensor::empty(&self.ctx, [n], Dtype::INT32, &self.device)?;
        let masks = Tensor::empty(&self.ctx, [n], Dtype::BOOL, &self.device)?;
        let key_ptr = SendPtr::from_const(keys.data_ptr());
        let index_ptr = SendPtr::new(buf_indices.data_ptr_mut() as *mut i32);
        let mask_ptr = SendPtr::new(masks.data_ptr_mut() as *mut bool);
        let row = self.key_row_bytes;
        let table = &*self;
        tracing::trace!(n, "hash insert");
        table.ctx.parallel_for(&table.device, n, |i| {
            let i = i as usize;
            // SAFETY: row i of the contiguous key batch; outputs are written at i only.
            unsafe {
                let key = slice::from_raw_parts(key_ptr.get().add(i * row), row);
                let (index, inserted) = table.claim(key);
                ptr::write_unaligned(index_ptr.get().add(i), index as i32);
                ptr::write_unaligned(mask_ptr.get().add(i), inserted);
            }
        })?;

        if let Some(values) = values {
            let rows = self.buffer.value_row_bytes();
            for ((buffer, value), &row) in self.buffer.value_buffers().iter().zip(values).zip(&rows) {
                let value = value.contiguous()?;
                let src = SendPtr::from_const(value.data_ptr());
                let dst = SendPtr::new(buffer.data_ptr_mut());
                self.ctx.parallel_for(&self.device, n, |i| {
                    let i = i as usize;
                    // SAFETY: only rows that won their slot are written, each to its own buffer index.
                    unsafe {
                        if ptr::read_unaligned(mask_ptr.get().add(i)) {
                            let index = ptr::read_unaligned(index_ptr.get().add(i)) as usize;
                            ptr::copy_nonoverlapping(src.get().add(i * row), dst.get().add(index * row), row);
                        }
                    }
                })?;
            }
        }
        Ok((buf_indices, masks))
    }
}

impl DeviceHashBackend for CpuHashBackend {
    fn insert(&mut self, keys: &Tensor, values: &[Tensor]) -> CoreResult<(Tensor, Tensor)> {
        self.insert_impl(keys, Some(values))
    }

    fn activate(&mut self, keys: &Tensor) -> CoreResult<(Tensor, Tensor)> {
        self.insert_impl(keys, None)
    }

    fn find(&self, keys: &Tensor) -> CoreResult<(Tensor, Tensor)> {
        let n = self.buffer.check_keys(keys)?;
        let keys = keys.contiguous()?;
        let buf_indices = Tensor::empty(&self.ctx, [n], Dtype::INT32, &self.device)?;
        let masks = Tensor::empty(&self.ctx, [n], Dtype::BOOL, &self.device)?;
        let key_ptr = SendPtr::from_const(keys.data_ptr());
        let index_ptr = SendPtr::new(buf_indices.data_ptr_mut() as *mut i32);
        let mask_ptr = SendPtr::new(masks.data_ptr_mut() as *mut bool);
        let row = self.key_row_bytes;
        self.ctx.parallel_for(&self.device, n, |i| {
            let i = i as usize;
            // SAFETY: row i of the contiguous key batch; outputs are written at i only.
            unsafe {
                let key = slice::from_raw_parts(key_ptr.get().add(i * row), row);
                let found = self.lookup(key);
                ptr::write_unaligned(index_ptr.get().add(i), found.map_or(0, |(_, index)| index as i32));
                ptr::write_unaligned(mask_ptr.get().add(i), found.is_some());
            }
        })?;
        Ok((buf_indices, masks))
    }

    fn erase(&mut self, keys: &Tensor) -> CoreResult<Tensor> {
        let n = self.buffer.check_keys(keys)?;
        let keys = keys.contiguous()?;
        let masks = Tensor::empty(&self.ctx, [n], Dtype::BOOL, &self.device)?;
        let key_ptr = SendPtr::from_const(keys.data_ptr());
        let mask_ptr = SendPtr::new(masks.data_ptr_mut() as *mut bool);
        let row = self.key_row_bytes;
        let table = &*self;
        table.ctx.parallel_for(&table.device, n, |i| {
            let i = i as usize;
            // SAFETY: row i of the contiguous key batch; the mask is written at i only.
            unsafe {
                let key = slice::from_raw_parts(key_ptr.get().add(i * row), row);
                let erased = match table.lookup(key) {
                    Some((slot, index))
                        if table.slots[slot]
                            .compare_exchange(index as u64, TOMBSTONE, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok() =>
                    {
                        table.release(index);
                        table.tombstones.fetch_add(1, Ordering::AcqRel);
                        true
                    }
                    _ => false,
                };
                ptr::write_unaligned(mask_ptr.get().add(i), erased);
            }
        })?;
        Ok(masks)
    }

    fn get_active_indices(&self) -> CoreResult<Tensor> {
        let active: Vec<i32> = self
            .slots
            .iter()
            .map(|s| s.load(Ordering::Acquire))
            .filter(|&s| is_entry(s))
            .map(|s| s as i32)
            .collect();
        let n = active.len() as i64;
        Tensor::from_vec(&self.ctx, active, [n], &self.device)
    }

    fn clear(&mut self) -> CoreResult<()> {
        for slot in &self.slots {
            slot.store(EMPTY, Ordering::Relaxed);
        }
        for (i, entry) in self.heap.iter().enumerate() {
            entry.store(i as u32, Ordering::Relaxed);
        }
        self.heap_top.store(0, Ordering::Release);
        self.tombstones.store(0, Ordering::Release);
        tracing::debug!(capacity = self.capacity(), "cleared hash backend");
        Ok(())
    }

    fn reserve(&mut self, capacity: i64) -> CoreResult<()> {
        if capacity <= self.capacity() {
            return Ok(());
        }
        let layout = self.buffer.layout();
        let mut rebuilt = CpuHashBackend::new(&self.ctx, capacity, &layout, &self.device)?;
        let active = self.get_active_indices()?;
        if !active.is_empty() {
            let index = [active];
            let keys = self.buffer.key_buffer().index_get(&index)?;
            let values = self
                .buffer
                .value_buffers()
                .iter()
                .map(|v| v.index_get(&index))
                .collect::<CoreResult<Vec<_>>>()?;
            rebuilt.insert(&keys, &values)?;
        }
        tracing::debug!(from = self.capacity(), to = capacity, size = self.size(), "reserved hash backend");
        *self = rebuilt;
        Ok(())
    }

    fn size(&self) -> i64 {
        self.heap_top.load(Ordering::Acquire) as i64
    }

    fn capacity(&self) -> i64 {
        self.buffer.capacity()
    }

    fn bucket_count(&self) -> i64 {
        self.slots.len() as i64
    }

    fn bucket_sizes(&self) -> CoreResult<Vec<i64>> {
        let mut sizes = vec![0i64; self.slots.len()];
        for slot in &self.slots {
            let state = slot.load(Ordering::Acquire);
            if is_entry(state) {
                sizes[self.home_slot(self.key_at(state as u32))] += 1;
            }
        }
        Ok(sizes)
    }

    fn device(&self) -> Device {
        self.device
    }

    fn buffer(&self) -> &HashBackendBuffer {
        &self.buffer
    }

    fn deep_copy(&self) -> CoreResult<Box<dyn DeviceHashBackend>> {
        Ok(Box::new(Self {
            ctx: self.ctx.clone(),
            device: self.device,
            buffer: self.buffer.deep_copy()?,
            hasher: self.hasher,
            key_row_bytes: self.key_row_bytes,
            slots: self.slots.iter().map(|s| AtomicU64::new(s.load(Ordering::Acquire))).collect(),
            heap: self.heap.iter().map(|h| AtomicU32::new(h.load(Ordering::Acquire))).collect(),
            heap_top: AtomicUsize::new(self.heap_top.load(Ordering::Acquire)),
            tombstones: AtomicUsize::new(self.tombstones.load(Ordering::Acquire)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::SizeVector;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashMap as StdHashMap;

    fn backend(ctx: &Context, capacity: i64) -> CpuHashBackend {
        let layout = HashLayout::new(Dtype::INT64, [2], vec![Dtype::FLOAT32], vec![SizeVector::from([1])]).unwrap();
        CpuHashBackend::new(ctx, capacity, &layout, &Device::cpu()).unwrap()
    }

    fn keys(ctx: &Context, pairs: &[[i64; 2]]) -> Tensor {
        let flat: Vec<i64> = pairs.iter().flatten().copied().collect();
        Tensor::from_vec(ctx, flat, [pairs.len() as i64, 2], &Device::cpu()).unwrap()
    }

    fn values(ctx: &Context, v: &[f32]) -> Tensor {
        Tensor::from_vec(ctx, v.to_vec(), [v.len() as i64, 1], &Device::cpu()).unwrap()
    }

    #[test]
    fn test_parallel_batch_claims_one_slot_per_key() {
        let ctx = Context::default();
        let mut rng = StdRng::seed_from_u64(7);
        let pairs: Vec<[i64; 2]> = (0..5000).map(|_| [rng.gen_range(0..40), rng.gen_range(-20..20)]).collect();
        let vals: Vec<f32> = (0..pairs.len()).map(|i| i as f32).collect();
        let mut table = backend(&ctx, 5000);
        let (indices, masks) = table.insert(&keys(&ctx, &pairs), &[values(&ctx, &vals)]).unwrap();
        let indices = indices.to_vec::<i32>().unwrap();
        let masks = masks.to_vec::<bool>().unwrap();

        let mut slot_of: StdHashMap<[i64; 2], i32> = StdHashMap::new();
        for (pair, &index) in pairs.iter().zip(&indices) {
            assert_eq!(*slot_of.entry(*pair).or_insert(index), index);
        }
        assert_eq!(masks.iter().filter(|&&m| m).count(), slot_of.len());
        assert_eq!(table.size(), slot_of.len() as i64);

        // The stored value comes from the row that won the slot.
        let stored = table.buffer().value_buffer(0).unwrap().to_vec::<f32>().unwrap();
        for (row, (&index, &won)) in indices.iter().zip(&masks).enumerate() {
            if won {
                assert_eq!(stored[index as usize], row as f32);
            }
        }
    }

    #[test]
    fn test_find_and_erase() {
        let ctx = Context::default();
        let mut table = backend(&ctx, 16);
        let present = keys(&ctx, &[[1, 2], [3, 4], [5, 6]]);
        let (inserted, _) = table.insert(&present, &[values(&ctx, &[1.0, 2.0, 3.0])]).unwrap();

        let (found, masks) = table.find(&keys(&ctx, &[[3, 4], [9, 9], [1, 2]])).unwrap();
        assert_eq!(masks.to_vec::<bool>().unwrap(), vec![true, false, true]);
        let inserted = inserted.to_vec::<i32>().unwrap();
        let found = found.to_vec::<i32>().unwrap();
        assert_eq!((found[0], found[2]), (inserted[1], inserted[0]));

        let erased = table.erase(&keys(&ctx, &[[3, 4], [3, 4], [7, 7]])).unwrap();
        assert_eq!(erased.to_vec::<bool>().unwrap(), vec![true, false, false]);
        assert_eq!(table.size(), 2);
        let (_, masks) = table.find(&keys(&ctx, &[[3, 4]])).unwrap();
        assert_eq!(masks.to_vec::<bool>().unwrap(), vec![false]);
        assert_eq!(table.get_active_indices().unwrap().num_elements(), table.size());
    }

    #[test]
    fn test_tombstones_trigger_compaction() {
        let ctx = Context::default();
        let mut table = backend(&ctx, 8);
        assert_eq!(table.bucket_count(), 16);
        for round in 0..4i64 {
            let batch: Vec<[i64; 2]> = (0..8).map(|i| [round, i]).collect();
            let (_, masks) = table.activate(&keys(&ctx, &batch)).unwrap();
            assert!(masks.to_vec::<bool>().unwrap().iter().all(|&m| m));
            assert_eq!(table.size(), 8);
            let erased = table.erase(&keys(&ctx, &batch[..4])).unwrap();
            assert!(erased.to_vec::<bool>().unwrap().iter().all(|&m| m));
            let erased = table.erase(&keys(&ctx, &batch[4..])).unwrap();
            assert!(erased.to_vec::<bool>().unwrap().iter().all(|&m| m));
            assert_eq!(table.size(), 0);
        }
        assert!(table.tombstones.load(Ordering::Relaxed) <= 8);
        table.activate(&keys(&ctx, &[[9, 9]])).unwrap();
        assert_eq!(table.bucket_sizes().unwrap().iter().sum::<i64>(), 1);
    }

    #[test]
    fn test_capacity_exceeded() {
        let ctx = Context::default();
        let mut table = backend(&ctx, 2);
        let err = table.activate(&keys(&ctx, &[[1, 1], [2, 2], [3, 3]]));
        assert!(matches!(err, Err(CoreError::CapacityExceeded(_))));
        assert_eq!(table.size(), 0);
    }

    #[test]
    fn test_reserve_keeps_entries() {
        let ctx = Context::default();
        let mut table = backend(&ctx, 4);
        let batch = keys(&ctx, &[[1, 0], [2, 0], [3, 0]]);
        table.insert(&batch, &[values(&ctx, &[10.0, 20.0, 30.0])]).unwrap();
        table.reserve(64).unwrap();
        assert_eq!(table.capacity(), 64);
        assert_eq!(table.bucket_count(), 128);
        assert_eq!(table.size(), 3);

        let (found, masks) = table.find(&batch).unwrap();
        assert!(masks.to_vec::<bool>().unwrap().iter().all(|&m| m));
        let stored = table.buffer().value_buffer(0).unwrap().to_vec::<f32>().unwrap();
        let found: Vec<f32> = found.to_vec::<i32>().unwrap().iter().map(|&i| stored[i as usize]).collect();
        assert_eq!(found, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_clear_and_deep_copy() {
        let ctx = Context::default();
        let mut table = backend(&ctx, 8);
        table.activate(&keys(&ctx, &[[1, 1], [2, 2]])).unwrap();
        let copy = table.deep_copy().unwrap();
        table.clear().unwrap();
        assert_eq!(table.size(), 0);
        assert_eq!(copy.size(), 2);
        let (_, masks) = copy.find(&keys(&ctx, &[[2, 2]])).unwrap();
        assert_eq!(masks.to_vec::<bool>().unwrap(), vec![true]);
        let (_, masks) = table.find(&keys(&ctx, &[[2, 2]])).unwrap();
        assert_eq!(masks.to_vec::<bool>().unwrap(), vec![false]);
    }
}
