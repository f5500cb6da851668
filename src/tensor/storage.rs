//! Blob: one device allocation shared by every tensor view aliasing it

use std::fmt;

use crate::context::Context;
use crate::error::CoreResult;
use super::devices::Device;

/// Release callback for memory the blob does not own.
pub type BlobDeleter = Box<dyn FnOnce(*mut u8) + Send + Sync>;

enum Release {
    Managed,
    External(Option<BlobDeleter>),
}

/// A contiguous allocation on one device, freed exactly once on drop.
///
/// Blobs are shared through `Arc`; a blob lives as long as its longest-lived view.
pub struct Blob {
    ptr: *mut u8,
    byte_size: usize,
    device: Device,
    ctx: Context,
    release: Release,
}

impl Blob {
    /// Allocate `byte_size` bytes through the context's memory manager.
    pub fn new(ctx: &Context, byte_size: usize, device: &Device) -> CoreResult<Self> {
        let ptr = ctx.memory().malloc(byte_size, device)?;
        Ok(Self {
            ptr,
            byte_size,
            device: *device,
            ctx: ctx.clone(),
            release: Release::Managed,
        })
    }

    /// Wrap caller memory; `deleter` runs instead of the memory manager on drop.
    ///
    /// # Safety
    /// `ptr` must be valid for `byte_size` bytes on `device` until `deleter` runs.
    pub unsafe fn from_external(
        ctx: &Context,
        device: &Device,
        ptr: *mut u8,
        byte_size: usize,
        deleter: BlobDeleter,
    ) -> Self {
        Self {
            ptr,
            byte_size,
            device: *device,
            ctx: ctx.clone(),
            release: Release::External(Some(deleter)),
        }
    }

    pub fn data_ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn is_external(&self) -> bool {
        matches!(self.release, Release::External(_))
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        match &mut self.release {
            Release::Managed => {
                // SAFETY: ptr came from this context's manager with this size and device.
                unsafe { self.ctx.memory().free(self.ptr, self.byte_size, &self.device) };
            }
            Release::External(deleter) => {
                if let Some(deleter) = deleter.take() {
                    deleter(self.ptr);
                }
            }
        }
    }
}

// SAFETY: the blob only hands out raw pointers; synchronising writes through
// them is the responsibility of the kernels and callers.
unsafe impl Send for Blob {}
unsafe impl Sync for Blob {}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("byte_size", &self.byte_size)
            .field("device", &self.device)
            .field("external", &self.is_external())
            .finish()
    }
}
