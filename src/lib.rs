//! voxcore - device-abstracted tensor and hash-map core for voxel engines
//!
//! Features:
//! - Strided N-dimensional tensors over reference-counted device blobs
//! - Runtime dtype dispatch with a tagged `Scalar`
//! - Element-wise, reduction, indexing and linear-algebra kernels
//! - Cached device memory management with allocation statistics
//! - Parallel open-addressing hash map and hash set for sparse voxel grids

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod hashmap;
pub mod kernels;
pub mod linalg;
pub mod memory;
pub mod parallel;
pub mod tensor;

pub use config::{ConfigBuilder, CoreConfig};
pub use context::Context;
pub use dispatch::{Element, FloatElement};
pub use error::{CoreError, CoreResult, ErrorCode};
pub use hashmap::{HashBackendType, HashMap, HashSet};
pub use memory::MemoryManager;
pub use parallel::{ParallelExecutor, ScopedStream};
pub use tensor::{Device, DeviceType, Dtype, DynamicSizeVector, Scalar, SizeVector, Tensor};

use crate::config::LoggingConfig;

/// Install a `tracing` subscriber at the configured level.
///
/// Calling it again, or after another subscriber was installed, leaves the
/// existing subscriber in place.
pub fn init_logging(config: &LoggingConfig) -> CoreResult<()> {
    let level = config.level_filter()?;
    if tracing_subscriber::fmt().with_max_level(level).try_init().is_ok() {
        tracing::info!("voxcore {} logging at {}", version(), level);
    }
    Ok(())
}

/// Get the current crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_init_is_repeatable() {
        let config = LoggingConfig::default();
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&config).is_ok());

        let bad = LoggingConfig {
            level: "loud".to_string(),
        };
        assert!(init_logging(&bad).is_err());
    }

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_end_to_end_voxel_pipeline() {
        let ctx = Context::default();
        let points = Tensor::from_vec(
            &ctx,
            vec![0.2f32, 0.1, 0.9, 0.4, 0.3, 0.2, 1.6, 0.1, 0.0, 1.2, 0.8, 0.5],
            [4, 3],
            &Device::cpu(),
        )
        .unwrap();
        let voxels = points.floor().unwrap().to(Dtype::INT32).unwrap();
        let mut set = HashSet::new(&ctx, 8, Dtype::INT32, [3], &Device::cpu()).unwrap();
        let (_, masks) = set.insert(&voxels).unwrap();
        assert_eq!(masks.to_vec::<bool>().unwrap(), vec![true, false, true, false]);
        assert_eq!(set.size(), 2);
    }
}
