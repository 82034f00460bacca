//! Opaque compute-API handles
//!
//! The interception layer passes platform, device, context, queue and event
//! objects through the engine without looking inside them. Each handle is the
//! object's address, which keeps them `Copy + Send + Sync` and lets test
//! doubles mint handles from plain integers.

use std::ffi::c_void;
use std::fmt;

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            pub const fn from_raw(raw: usize) -> Self {
                Self(raw)
            }

            pub fn from_ptr(ptr: *mut c_void) -> Self {
                Self(ptr as usize)
            }

            pub const fn as_raw(self) -> usize {
                self.0
            }

            pub fn as_ptr(self) -> *mut c_void {
                self.0 as *mut c_void
            }

            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }
    };
}

opaque_handle!(
    /// Platform (driver/ICD) a device belongs to
    PlatformId
);
opaque_handle!(
    /// Compute device
    DeviceId
);
opaque_handle!(
    /// Compute context
    ContextHandle
);
opaque_handle!(
    /// Command queue
    QueueHandle
);
opaque_handle!(
    /// Completion record of one unit of submitted work
    EventHandle
);
