//! Free-block cache in front of any device memory manager

use parking_lot::Mutex;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::CoreResult;
use crate::tensor::Device;
use super::DeviceMemoryManager;

struct CachedBlock(NonNull<u8>);

// SAFETY: a parked block is owned by the cache alone until it is handed out again.
unsafe impl Send for CachedBlock {}

#[derive(Default)]
struct CachePools {
    blocks: HashMap<(Device, usize), Vec<CachedBlock>>,
    cached_bytes: usize,
}

/// Keeps freed blocks keyed by `(device, byte_size)` and hands them back to
/// same-sized requests without touching the wrapped allocator.
pub struct CachedMemoryManager {
    inner: Arc<dyn DeviceMemoryManager>,
    pools: Mutex<CachePools>,
    max_cached_bytes: usize,
}

impl CachedMemoryManager {
    pub fn new(inner: Arc<dyn DeviceMemoryManager>, max_cached_bytes: usize) -> Self {
        Self {
            inner,
            pools: Mutex::new(CachePools::default()),
            max_cached_bytes,
        }
    }

    /// Bytes currently parked in the cache
    pub fn cached_bytes(&self) -> usize {
        self.pools.lock().cached_bytes
    }

    pub fn num_cached_blocks(&self) -> usize {
        self.pools.lock().blocks.values().map(Vec::len).sum()
    }

    fn release_pools(&self, pools: &mut CachePools) {
        let mut released = 0usize;
        for ((device, size), blocks) in pools.blocks.drain() {
            for block in blocks {
                // SAFETY: parked blocks came from `inner.malloc` with this size and device.
                unsafe { self.inner.free(block.0.as_ptr(), size, &device) };
                released += size;
            }
        }
        pools.cached_bytes = 0;
        if released > 0 {
            tracing::debug!(released_bytes = released, "released memory cache");
        }
    }
}

impl DeviceMemoryManager for CachedMemoryManager {
    fn malloc(&self, byte_size: usize, device: &Device) -> CoreResult<*mut u8> {
        if byte_size == 0 {
            return Ok(std::ptr::null_mut());
        }
        {
            let mut pools = self.pools.lock();
            if let Some(block) = pools
                .blocks
                .get_mut(&(*device, byte_size))
                .and_then(Vec::pop)
            {
                pools.cached_bytes -= byte_size;
                return Ok(block.0.as_ptr());
            }
        }

        match self.inner.malloc(byte_size, device) {
            Ok(ptr) => Ok(ptr),
            Err(err) => {
                tracing::debug!(byte_size, %device, "allocation failed, releasing cache and retrying: {}", err);
                self.release_cache();
                self.inner.malloc(byte_size, device)
            }
        }
    }

    unsafe fn free(&self, ptr: *mut u8, byte_size: usize, device: &Device) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        let mut pools = self.pools.lock();
        pools
            .blocks
            .entry((*device, byte_size))
            .or_default()
            .push(CachedBlock(ptr));
        pools.cached_bytes += byte_size;

        if pools.cached_bytes > self.max_cached_bytes {
            tracing::debug!(
                cached_bytes = pools.cached_bytes,
                max_cached_bytes = self.max_cached_bytes,
                "memory cache over budget"
            );
            self.release_pools(&mut pools);
        }
    }

    unsafe fn memcpy(
        &self,
        dst: *mut u8,
        dst_device: &Device,
        src: *const u8,
        src_device: &Device,
        num_bytes: usize,
    ) -> CoreResult<()> {
        self.inner.memcpy(dst, dst_device, src, src_device, num_bytes)
    }

    fn release_cache(&self) {
        let mut pools = self.pools.lock();
        self.release_pools(&mut pools);
    }

    fn name(&self) -> &'static str {
        "CachedMemoryManager"
    }
}

impl Drop for CachedMemoryManager {
    fn drop(&mut self) {
        self.release_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::CpuMemoryManager;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls that reach the wrapped allocator
    struct CountingManager {
        inner: CpuMemoryManager,
        mallocs: AtomicUsize,
        frees: AtomicUsize,
    }

    impl CountingManager {
        fn new() -> Self {
            Self {
                inner: CpuMemoryManager::new(64),
                mallocs: AtomicUsize::new(0),
                frees: AtomicUsize::new(0),
            }
        }
    }

    impl DeviceMemoryManager for CountingManager {
        fn malloc(&self, byte_size: usize, device: &Device) -> CoreResult<*mut u8> {
            self.mallocs.fetch_add(1, Ordering::SeqCst);
            self.inner.malloc(byte_size, device)
        }

        unsafe fn free(&self, ptr: *mut u8, byte_size: usize, device: &Device) {
            self.frees.fetch_add(1, Ordering::SeqCst);
            self.inner.free(ptr, byte_size, device)
        }

        unsafe fn memcpy(
            &self,
            dst: *mut u8,
            dst_device: &Device,
            src: *const u8,
            src_device: &Device,
            num_bytes: usize,
        ) -> CoreResult<()> {
            self.inner.memcpy(dst, dst_device, src, src_device, num_bytes)
        }

        fn name(&self) -> &'static str {
            "CountingManager"
        }
    }

    #[test]
    fn test_same_size_reuses_block() {
        let counting = Arc::new(CountingManager::new());
        let cached = CachedMemoryManager::new(counting.clone(), 1 << 20);
        let cpu = Device::cpu();

        let first = cached.malloc(256, &cpu).unwrap();
        unsafe { cached.free(first, 256, &cpu) };
        assert_eq!(cached.cached_bytes(), 256);

        let second = cached.malloc(256, &cpu).unwrap();
        assert_eq!(first, second);
        assert_eq!(counting.mallocs.load(Ordering::SeqCst), 1);
        assert_eq!(counting.frees.load(Ordering::SeqCst), 0);
        assert_eq!(cached.cached_bytes(), 0);

        unsafe { cached.free(second, 256, &cpu) };
    }

    #[test]
    fn test_different_size_falls_through() {
        let counting = Arc::new(CountingManager::new());
        let cached = CachedMemoryManager::new(counting.clone(), 1 << 20);
        let cpu = Device::cpu();

        let a = cached.malloc(128, &cpu).unwrap();
        unsafe { cached.free(a, 128, &cpu) };
        let b = cached.malloc(512, &cpu).unwrap();
        assert_eq!(counting.mallocs.load(Ordering::SeqCst), 2);
        unsafe { cached.free(b, 512, &cpu) };
        assert_eq!(cached.num_cached_blocks(), 2);
    }

    #[test]
    fn test_release_cache_frees_parked_blocks_only() {
        let counting = Arc::new(CountingManager::new());
        let cached = CachedMemoryManager::new(counting.clone(), 1 << 20);
        let cpu = Device::cpu();

        let parked = cached.malloc(64, &cpu).unwrap();
        let checked_out = cached.malloc(64, &cpu).unwrap();
        unsafe { cached.free(parked, 64, &cpu) };

        cached.release_cache();
        assert_eq!(counting.frees.load(Ordering::SeqCst), 1);
        assert_eq!(cached.cached_bytes(), 0);

        // the checked-out block is still usable
        unsafe {
            *checked_out = 7;
            assert_eq!(*checked_out, 7);
            cached.free(checked_out, 64, &cpu);
        }
    }

    #[test]
    fn test_over_budget_releases_automatically() {
        let counting = Arc::new(CountingManager::new());
        let cached = CachedMemoryManager::new(counting.clone(), 100);
        let cpu = Device::cpu();

        let ptr = cached.malloc(128, &cpu).unwrap();
        unsafe { cached.free(ptr, 128, &cpu) };
        assert_eq!(cached.cached_bytes(), 0);
        assert_eq!(counting.frees.load(Ordering::SeqCst), 1);
    }
}
