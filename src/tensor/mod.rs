//! Strided n-dimensional tensors over device memory
//!
//! This module provides:
//! - Device and dtype descriptors
//! - Shapes with small-vector storage and broadcasting rules
//! - Reference-counted blobs shared by every view
//! - The Tensor handle with views, element-wise math, reductions and indexing

pub mod core;
pub mod devices;
pub mod dtype;
pub mod ops;
pub mod scalar;
pub mod shape;
pub mod storage;

pub use self::core::Tensor;
pub use devices::{Device, DeviceType};
pub use dtype::{Dtype, DtypeCode};
pub use scalar::Scalar;
pub use shape::{DynamicSizeVector, SizeVector};
pub use storage::{Blob, BlobDeleter};
