//! Device-dispatched allocation, deallocation and copies

pub mod cached;
pub mod cpu;
pub mod statistics;

pub use cached::CachedMemoryManager;
pub use cpu::CpuMemoryManager;
pub use statistics::{DeviceMemoryRecord, MemoryStatistic};

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::MemoryConfig;
use crate::error::{CoreError, CoreResult};
use crate::tensor::{Device, DeviceType};

/// Allocation strategy for one kind of device.
pub trait DeviceMemoryManager: Send + Sync {
    /// Allocate `byte_size` bytes; zero bytes yield a null pointer.
    fn malloc(&self, byte_size: usize, device: &Device) -> CoreResult<*mut u8>;

    /// # Safety
    /// `ptr` must come from `malloc` of this manager with the same size and device,
    /// and must not be used afterwards.
    unsafe fn free(&self, ptr: *mut u8, byte_size: usize, device: &Device);

    /// # Safety
    /// Both ranges must be valid for `num_bytes` on their devices.
    unsafe fn memcpy(
        &self,
        dst: *mut u8,
        dst_device: &Device,
        src: *const u8,
        src_device: &Device,
        num_bytes: usize,
    ) -> CoreResult<()>;

    /// Return cached blocks to the underlying allocator.
    fn release_cache(&self) {}

    fn name(&self) -> &'static str;
}

struct MemoryManagerInner {
    managers: RwLock<HashMap<DeviceType, Arc<dyn DeviceMemoryManager>>>,
    statistic: MemoryStatistic,
    config: MemoryConfig,
}

/// Single point of allocation for a context. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryManager {
    inner: Arc<MemoryManagerInner>,
}

impl MemoryManager {
    pub fn new(config: &MemoryConfig) -> Self {
        let manager = Self {
            inner: Arc::new(MemoryManagerInner {
                managers: RwLock::new(HashMap::new()),
                statistic: MemoryStatistic::new(),
                config: config.clone(),
            }),
        };
        manager.register(DeviceType::Cpu, Arc::new(CpuMemoryManager::new(config.alignment)));
        manager
    }

    /// Install the strategy for a device type, wrapped in a cache when caching is enabled.
    pub fn register(&self, device_type: DeviceType, manager: Arc<dyn DeviceMemoryManager>) {
        let manager: Arc<dyn DeviceMemoryManager> = if self.inner.config.enable_cache {
            Arc::new(CachedMemoryManager::new(manager, self.inner.config.max_cached_bytes))
        } else {
            manager
        };
        tracing::debug!(device_type = device_type.as_str(), manager = manager.name(), "registered memory manager");
        self.inner.managers.write().insert(device_type, manager);
    }

    pub fn has_device_type(&self, device_type: DeviceType) -> bool {
        self.inner.managers.read().contains_key(&device_type)
    }

    fn device_manager(&self, device: &Device) -> CoreResult<Arc<dyn DeviceMemoryManager>> {
        self.inner
            .managers
            .read()
            .get(&device.device_type())
            .cloned()
            .ok_or_else(|| CoreError::device_error(&device.to_string(), "no memory manager registered for this device type"))
    }

    pub fn malloc(&self, byte_size: usize, device: &Device) -> CoreResult<*mut u8> {
        let manager = self.device_manager(device)?;
        let ptr = manager.malloc(byte_size, device)?;
        if byte_size > 0 && ptr.is_null() {
            return Err(CoreError::memory_error(byte_size, &device.to_string(), manager.name()));
        }
        self.inner.statistic.count_malloc(device, byte_size);
        tracing::trace!(byte_size, %device, "malloc");
        Ok(ptr)
    }

    /// # Safety
    /// `ptr` must come from [`MemoryManager::malloc`] with the same size and device.
    pub unsafe fn free(&self, ptr: *mut u8, byte_size: usize, device: &Device) {
        if ptr.is_null() {
            return;
        }
        match self.device_manager(device) {
            Ok(manager) => {
                manager.free(ptr, byte_size, device);
                self.inner.statistic.count_free(device, byte_size);
                tracing::trace!(byte_size, %device, "free");
            }
            Err(err) => tracing::warn!("leaking {} bytes: {}", byte_size, err),
        }
    }

    /// Copy between any two devices. The accelerator side's manager performs
    /// cross-device copies; host copies go through the CPU manager.
    ///
    /// # Safety
    /// Both ranges must be valid for `num_bytes` on their devices.
    pub unsafe fn memcpy(
        &self,
        dst: *mut u8,
        dst_device: &Device,
        src: *const u8,
        src_device: &Device,
        num_bytes: usize,
    ) -> CoreResult<()> {
        if num_bytes == 0 {
            return Ok(());
        }
        if dst.is_null() || src.is_null() {
            return Err(CoreError::InvalidArgument(format!(
                "memcpy of {} bytes with a null pointer",
                num_bytes
            )));
        }
        let manager = if !dst_device.is_cpu() {
            self.device_manager(dst_device)?
        } else if !src_device.is_cpu() {
            self.device_manager(src_device)?
        } else {
            self.device_manager(&Device::cpu())?
        };
        manager.memcpy(dst, dst_device, src, src_device, num_bytes)
    }

    /// Release every cached block of every registered manager.
    pub fn release_cache(&self) {
        for manager in self.inner.managers.read().values() {
            manager.release_cache();
        }
    }

    pub fn statistic(&self) -> &MemoryStatistic {
        &self.inner.statistic
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let managers = self.inner.managers.read();
        let mut names: Vec<_> = managers
            .iter()
            .map(|(t, m)| format!("{}={}", t.as_str(), m.name()))
            .collect();
        names.sort();
        f.debug_struct("MemoryManager").field("managers", &names).finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use testing::HostBackedDeviceManager;

    #[test]
    fn test_malloc_free_counts() {
        let manager = MemoryManager::new(&MemoryConfig::default());
        let cpu = Device::cpu();
        let ptr = manager.malloc(32, &cpu).unwrap();
        assert!(manager.statistic().has_leaks());
        unsafe { manager.free(ptr, 32, &cpu) };
        assert!(!manager.statistic().has_leaks());
        assert_eq!(manager.statistic().record(&cpu).count_free, 1);
    }

    #[test]
    fn test_free_null_is_noop() {
        let manager = MemoryManager::new(&MemoryConfig::default());
        unsafe { manager.free(std::ptr::null_mut(), 16, &Device::cpu()) };
        assert_eq!(manager.statistic().record(&Device::cpu()).count_free, 0);
    }

    #[test]
    fn test_missing_accelerator_manager() {
        let manager = MemoryManager::new(&MemoryConfig::default());
        let err = manager.malloc(16, &Device::cuda(0)).unwrap_err();
        assert!(matches!(err, CoreError::DeviceError(_)));
    }

    #[test]
    fn test_memcpy_edge_cases() {
        let manager = MemoryManager::new(&MemoryConfig::default());
        let cpu = Device::cpu();
        unsafe {
            assert!(manager
                .memcpy(std::ptr::null_mut(), &cpu, std::ptr::null(), &cpu, 0)
                .is_ok());
            assert!(manager
                .memcpy(std::ptr::null_mut(), &cpu, std::ptr::null(), &cpu, 4)
                .is_err());
        }
    }

    #[test]
    fn test_cross_device_copy_uses_accelerator_manager() {
        let manager = MemoryManager::new(&MemoryConfig::default());
        manager.register(DeviceType::Cuda, Arc::new(HostBackedDeviceManager::new()));
        let gpu = Device::cuda(0);
        let cpu = Device::cpu();

        let src = [9u8, 8, 7, 6];
        let mut back = [0u8; 4];
        let device_ptr = manager.malloc(4, &gpu).unwrap();
        unsafe {
            manager.memcpy(device_ptr, &gpu, src.as_ptr(), &cpu, 4).unwrap();
            manager.memcpy(back.as_mut_ptr(), &cpu, device_ptr, &gpu, 4).unwrap();
            manager.free(device_ptr, 4, &gpu);
        }
        assert_eq!(back, src);
    }

    #[test]
    fn test_cache_wrapping_follows_config() {
        let config = MemoryConfig {
            enable_cache: true,
            ..MemoryConfig::default()
        };
        let manager = MemoryManager::new(&config);
        assert!(format!("{:?}", manager).contains("CPU=CachedMemoryManager"));

        let cpu = Device::cpu();
        let a = manager.malloc(64, &cpu).unwrap();
        unsafe { manager.free(a, 64, &cpu) };
        let b = manager.malloc(64, &cpu).unwrap();
        assert_eq!(a, b);
        unsafe { manager.free(b, 64, &cpu) };
        manager.release_cache();
    }
}
