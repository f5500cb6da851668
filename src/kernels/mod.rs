//! CPU kernels behind the tensor API
//!
//! Every kernel validates its operands, dispatches on dtype and fans the work out
//! through the context's ParallelFor. Devices without a kernel launcher fail with
//! a device error.

pub mod arange;
pub mod binary_ew;
pub mod index;
pub(crate) mod indexer;
pub mod reduction;
pub mod unary_ew;

pub use arange::{arange, arange_count};
pub use binary_ew::{binary_ew, BinaryEWOpCode};
pub use index::{index_get, index_set, nonzero};
pub use reduction::{reduction, ReductionOpCode};
pub use unary_ew::{copy, fill, unary_ew, UnaryEWOpCode};
