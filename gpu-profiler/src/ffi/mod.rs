//! Dynamically loaded production adapters
//!
//! Nothing here is linked at build time: the OpenCL ICD loader and the
//! counter-driver shim are opened with `libloading` when the engine starts,
//! so a missing driver only disables counter collection.

pub mod bindings;
pub mod opencl;
pub mod shim;

pub use opencl::OpenClLibrary;
pub use shim::{ShimDriver, ShimDriverProvider};
