//! ParallelFor: fans independent loop iterations out over the device's workers

pub mod stream;

pub use stream::{current_stream, ScopedStream, Stream};

use rayon::prelude::*;
use std::sync::Arc;

use crate::config::ParallelConfig;
use crate::error::{CoreError, CoreResult};
use crate::tensor::Device;

/// Raw pointer that may cross into worker threads.
///
/// Always read it through [`SendPtr::get`] inside closures so the whole wrapper is captured.
#[derive(Debug)]
pub(crate) struct SendPtr<T>(*mut T);

impl<T> Clone for SendPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SendPtr<T> {}

// SAFETY: kernels only hand these to iterations that touch disjoint elements,
// or that read memory nobody writes during the call.
unsafe impl<T> Send for SendPtr<T> {}
unsafe impl<T> Sync for SendPtr<T> {}

impl<T> SendPtr<T> {
    pub(crate) fn new(ptr: *mut T) -> Self {
        Self(ptr)
    }

    pub(crate) fn from_const(ptr: *const T) -> Self {
        Self(ptr as *mut T)
    }

    pub(crate) fn get(self) -> *mut T {
        self.0
    }
}

/// CPU task pool behind ParallelFor
#[derive(Clone)]
pub struct ParallelExecutor {
    pool: Option<Arc<rayon::ThreadPool>>,
    min_parallel_len: usize,
}

impl ParallelExecutor {
    pub fn new(config: &ParallelConfig) -> CoreResult<Self> {
        if config.num_threads == 0 {
            return Ok(Self::global(config.min_parallel_len));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .thread_name(|i| format!("voxcore-worker-{}", i))
            .build()
            .map_err(|e| CoreError::ConfigurationError(format!("Failed to build thread pool: {}", e)))?;
        Ok(Self {
            pool: Some(Arc::new(pool)),
            min_parallel_len: config.min_parallel_len,
        })
    }

    /// Executor sharing rayon's global pool.
    pub fn global(min_parallel_len: usize) -> Self {
        Self {
            pool: None,
            min_parallel_len,
        }
    }

    pub fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Run `op` inside this executor's pool.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Run `body(i)` for every `i` in `0..n` and block until all iterations finish.
    pub fn parallel_for<F>(&self, device: &Device, n: i64, body: F) -> CoreResult<()>
    where
        F: Fn(i64) + Send + Sync,
    {
        if !device.is_cpu() {
            return Err(CoreError::device_error(
                &device.to_string(),
                "no kernel launcher is available for this device",
            ));
        }
        if n <= 0 {
            return Ok(());
        }
        tracing::trace!(n, stream = current_stream().id(), "parallel_for");
        if (n as usize) < self.min_parallel_len {
            (0..n).for_each(body);
            return Ok(());
        }
        self.install(|| (0..n).into_par_iter().for_each(|i| body(i)));
        Ok(())
    }
}

impl std::fmt::Debug for ParallelExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelExecutor")
            .field("dedicated_pool", &self.pool.is_some())
            .field("min_parallel_len", &self.min_parallel_len)
            .finish()
    }
}
