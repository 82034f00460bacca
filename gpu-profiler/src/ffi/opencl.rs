//! OpenCL compute API loaded from the system ICD loader

use super::bindings::{
    cl_int, cl_platform_id, FnClCreatePerfCountersCommandQueueIntel, FnClGetDeviceInfo,
    FnClGetEventProfilingInfo, FnClGetExtensionFunctionAddressForPlatform, CL_DEVICE_PLATFORM,
};
use crate::compute::{
    ClStatus, ComputeApi, CreateCounterQueueFn, CL_INVALID_OPERATION, CL_SUCCESS,
};
use crate::queue_props::QueuePropertyBits;
use anyhow::{anyhow, Context, Result};
use libloading::Library;
use mdlens_shared::{ContextHandle, DeviceId, EventHandle, PlatformId, QueueHandle};
use std::ffi::{c_void, CString};
use std::sync::Arc;
use tracing::debug;

#[cfg(target_os = "windows")]
const CANDIDATES: &[&str] = &["OpenCL.dll"];

#[cfg(target_os = "macos")]
const CANDIDATES: &[&str] = &["/System/Library/Frameworks/OpenCL.framework/OpenCL"];

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const CANDIDATES: &[&str] = &["libOpenCL.so.1", "libOpenCL.so"];

/// [`ComputeApi`] over the OpenCL ICD loader
pub struct OpenClLibrary {
    library: Arc<Library>,
    get_device_info: FnClGetDeviceInfo,
    get_event_profiling_info: FnClGetEventProfilingInfo,
    get_extension_function_address: FnClGetExtensionFunctionAddressForPlatform,
}

impl OpenClLibrary {
    /// Load the first ICD loader found in the usual places
    pub fn load() -> Result<Self> {
        for path in CANDIDATES {
            match Self::open(path) {
                Ok(lib) => return Ok(lib),
                Err(e) => debug!("OpenCL loader {} unavailable: {:#}", path, e),
            }
        }
        Err(anyhow!("OpenCL ICD loader not found (tried {})", CANDIDATES.join(", ")))
    }

    /// Load the ICD loader at `path`
    pub fn open(path: &str) -> Result<Self> {
        let library = unsafe { Library::new(path) }
            .with_context(|| format!("failed to load {}", path))?;

        unsafe {
            let get_device_info: FnClGetDeviceInfo = *library
                .get::<FnClGetDeviceInfo>(b"clGetDeviceInfo\0")
                .context("failed to load clGetDeviceInfo")?;
            let get_event_profiling_info: FnClGetEventProfilingInfo = *library
                .get::<FnClGetEventProfilingInfo>(b"clGetEventProfilingInfo\0")
                .context("failed to load clGetEventProfilingInfo")?;
            let get_extension_function_address: FnClGetExtensionFunctionAddressForPlatform =
                *library
                    .get::<FnClGetExtensionFunctionAddressForPlatform>(
                        b"clGetExtensionFunctionAddressForPlatform\0",
                    )
                    .context("failed to load clGetExtensionFunctionAddressForPlatform")?;

            Ok(Self {
                library: Arc::new(library),
                get_device_info,
                get_event_profiling_info,
                get_extension_function_address,
            })
        }
    }
}

impl ComputeApi for OpenClLibrary {
    fn device_platform(&self, device: DeviceId) -> Result<PlatformId, ClStatus> {
        let mut platform: cl_platform_id = std::ptr::null_mut();
        let status = unsafe {
            (self.get_device_info)(
                device.as_ptr(),
                CL_DEVICE_PLATFORM,
                std::mem::size_of::<cl_platform_id>(),
                &mut platform as *mut cl_platform_id as *mut c_void,
                std::ptr::null_mut(),
            )
        };
        if status != CL_SUCCESS {
            return Err(status);
        }
        Ok(PlatformId::from_ptr(platform))
    }

    fn resolve_counter_queue_fn(
        &self,
        platform: PlatformId,
        name: &str,
    ) -> Option<CreateCounterQueueFn> {
        let name = CString::new(name).ok()?;
        let address =
            unsafe { (self.get_extension_function_address)(platform.as_ptr(), name.as_ptr()) };
        if address.is_null() {
            return None;
        }

        // The loader hands back the extension with this exact signature
        let create: FnClCreatePerfCountersCommandQueueIntel =
            unsafe { std::mem::transmute::<*mut c_void, _>(address) };
        let library = self.library.clone();

        Some(Arc::new(
            move |context: ContextHandle,
                  device: DeviceId,
                  properties: QueuePropertyBits,
                  configuration: u32| {
                let _loaded = &library;
                let mut status: cl_int = CL_SUCCESS;
                let queue = unsafe {
                    create(
                        context.as_ptr(),
                        device.as_ptr(),
                        properties,
                        configuration,
                        &mut status,
                    )
                };
                match (status, queue.is_null()) {
                    (CL_SUCCESS, false) => Ok(QueueHandle::from_ptr(queue)),
                    (CL_SUCCESS, true) => Err(CL_INVALID_OPERATION),
                    (status, _) => Err(status),
                }
            },
        ))
    }

    fn event_profiling_info(
        &self,
        event: EventHandle,
        param: u32,
        buffer: &mut [u8],
    ) -> Result<usize, ClStatus> {
        let mut written: libc::size_t = 0;
        let status = unsafe {
            (self.get_event_profiling_info)(
                event.as_ptr(),
                param,
                buffer.len(),
                buffer.as_mut_ptr() as *mut c_void,
                &mut written,
            )
        };
        if status != CL_SUCCESS {
            return Err(status);
        }
        Ok(written)
    }
}

impl std::fmt::Debug for OpenClLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenClLibrary").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_loader_is_an_error() {
        let err = OpenClLibrary::open("/nonexistent/libOpenCL.so.1").unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/libOpenCL.so.1"));
    }
}
