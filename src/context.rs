//! Explicitly owned runtime context: memory manager plus ParallelFor executor

use std::sync::Arc;

use crate::config::CoreConfig;
use crate::error::CoreResult;
use crate::memory::MemoryManager;
use crate::parallel::ParallelExecutor;
use crate::tensor::Device;

struct ContextInner {
    config: CoreConfig,
    memory: MemoryManager,
    executor: ParallelExecutor,
}

/// Everything a tensor or hash map needs at runtime.
///
/// Contexts are independent of each other; every blob remembers the context that
/// allocated it, so tensors never reach for process-wide state.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub fn new(config: CoreConfig) -> CoreResult<Self> {
        config.validate()?;
        let memory = MemoryManager::new(&config.memory);
        let executor = ParallelExecutor::new(&config.parallel)?;
        tracing::debug!(
            num_threads = executor.num_threads(),
            enable_cache = config.memory.enable_cache,
            "created context"
        );
        Ok(Self {
            inner: Arc::new(ContextInner {
                config,
                memory,
                executor,
            }),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.inner.memory
    }

    pub fn executor(&self) -> &ParallelExecutor {
        &self.inner.executor
    }

    pub fn parallel_for<F>(&self, device: &Device, n: i64, body: F) -> CoreResult<()>
    where
        F: Fn(i64) + Send + Sync,
    {
        self.inner.executor.parallel_for(device, n, body)
    }

    pub fn same_as(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Context {
    fn default() -> Self {
        let config = CoreConfig::default();
        Self {
            inner: Arc::new(ContextInner {
                memory: MemoryManager::new(&config.memory),
                executor: ParallelExecutor::global(config.parallel.min_parallel_len),
                config,
            }),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("memory", &self.inner.memory)
            .field("executor", &self.inner.executor)
            .finish()
    }
}
