//! Compute-API capability consumed by the engine
//!
//! The interception layer owns the real dispatch tables. The engine only needs
//! three things from them: the platform a device belongs to, an extension
//! entry point for creating counter-enabled queues, and the profiling-info
//! query that returns the raw counter report attached to a completed event.

use crate::queue_props::QueuePropertyBits;
use mdlens_shared::{ContextHandle, DeviceId, EventHandle, PlatformId, QueueHandle};
use std::sync::Arc;

/// Compute-API status code
pub type ClStatus = i32;

pub const CL_SUCCESS: ClStatus = 0;
pub const CL_INVALID_VALUE: ClStatus = -30;
pub const CL_INVALID_OPERATION: ClStatus = -59;

/// Profiling-info selector returning the GPU counter report of an event
pub const CL_PROFILING_COMMAND_PERFCOUNTERS_INTEL: u32 = 0x407F;

/// Extension entry point creating a counter-enabled queue
pub const CREATE_COUNTER_QUEUE_FN_NAME: &str = "clCreatePerfCountersCommandQueueINTEL";

/// Resolved counter-queue creation entry point.
///
/// Arguments are the context, the device, the legacy queue property bitfield
/// and the metric-set configuration token. Errors carry the driver's status.
pub type CreateCounterQueueFn = Arc<
    dyn Fn(ContextHandle, DeviceId, QueuePropertyBits, u32) -> Result<QueueHandle, ClStatus>
        + Send
        + Sync,
>;

/// Capability interface over the underlying compute API
pub trait ComputeApi: Send + Sync {
    /// Platform owning `device`
    fn device_platform(&self, device: DeviceId) -> Result<PlatformId, ClStatus>;

    /// Resolve the named counter-queue creation extension for `platform`
    fn resolve_counter_queue_fn(&self, platform: PlatformId, name: &str)
        -> Option<CreateCounterQueueFn>;

    /// Query profiling info `param` of a completed event into `buffer`.
    ///
    /// Returns the size the API reports for the value.
    fn event_profiling_info(
        &self,
        event: EventHandle,
        param: u32,
        buffer: &mut [u8],
    ) -> Result<usize, ClStatus>;
}

/// Symbolic name of a compute-API status code, for log lines
pub fn cl_status_name(status: ClStatus) -> &'static str {
    match status {
        0 => "CL_SUCCESS",
        -1 => "CL_DEVICE_NOT_FOUND",
        -2 => "CL_DEVICE_NOT_AVAILABLE",
        -5 => "CL_OUT_OF_RESOURCES",
        -6 => "CL_OUT_OF_HOST_MEMORY",
        -7 => "CL_PROFILING_INFO_NOT_AVAILABLE",
        -30 => "CL_INVALID_VALUE",
        -32 => "CL_INVALID_PLATFORM",
        -33 => "CL_INVALID_DEVICE",
        -34 => "CL_INVALID_CONTEXT",
        -35 => "CL_INVALID_QUEUE_PROPERTIES",
        -36 => "CL_INVALID_COMMAND_QUEUE",
        -58 => "CL_INVALID_EVENT",
        -59 => "CL_INVALID_OPERATION",
        -1001 => "CL_PLATFORM_NOT_FOUND_KHR",
        _ => "<unknown>",
    }
}
