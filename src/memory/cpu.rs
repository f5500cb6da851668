//! Host allocator with configurable alignment

use std::alloc::{alloc, dealloc, Layout};

use crate::error::{CoreError, CoreResult};
use crate::tensor::Device;
use super::DeviceMemoryManager;

/// Host memory manager backed by the global Rust allocator
pub struct CpuMemoryManager {
    alignment: usize,
}

impl CpuMemoryManager {
    pub fn new(alignment: usize) -> Self {
        Self { alignment }
    }

    fn layout(&self, byte_size: usize) -> CoreResult<Layout> {
        Layout::from_size_align(byte_size, self.alignment)
            .map_err(|e| CoreError::MemoryError(format!("Invalid layout: {}", e)))
    }
}

impl DeviceMemoryManager for CpuMemoryManager {
    fn malloc(&self, byte_size: usize, device: &Device) -> CoreResult<*mut u8> {
        if !device.is_cpu() {
            return Err(CoreError::device_error(&device.to_string(), "CpuMemoryManager only allocates host memory"));
        }
        if byte_size == 0 {
            return Ok(std::ptr::null_mut());
        }
        let layout = self.layout(byte_size)?;
        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc(layout) };
        if ptr.is_null() {
            return Err(CoreError::memory_error(byte_size, &device.to_string(), "host allocator returned null"));
        }
        Ok(ptr)
    }

    unsafe fn free(&self, ptr: *mut u8, byte_size: usize, _device: &Device) {
        if ptr.is_null() || byte_size == 0 {
            return;
        }
        let layout = Layout::from_size_align_unchecked(byte_size, self.alignment);
        dealloc(ptr, layout);
    }

    unsafe fn memcpy(
        &self,
        dst: *mut u8,
        dst_device: &Device,
        src: *const u8,
        src_device: &Device,
        num_bytes: usize,
    ) -> CoreResult<()> {
        if !dst_device.is_cpu() || !src_device.is_cpu() {
            return Err(CoreError::device_error(
                &format!("{} -> {}", src_device, dst_device),
                "CpuMemoryManager only copies host memory",
            ));
        }
        std::ptr::copy(src, dst, num_bytes);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "CpuMemoryManager"
    }
}
