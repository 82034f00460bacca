//! Counter driver reached through the `mdlens_driver_*` shim library

use super::bindings::*;
use crate::driver::{CounterDriver, DriverError, DriverProvider, DriverRequest, StreamParams};
use libc::c_char;
use libloading::Library;
use mdlens_shared::{CounterReport, MetricDescriptor, MetricValue, SamplingMode, TypedValue};
use std::ffi::{CStr, CString};
use std::ptr;
use tracing::{debug, warn};

struct ShimApi {
    open: FnDriverOpen,
    close: FnDriverClose,
    metric_count: FnDriverCount,
    metric: FnDriverDescriptor,
    information_count: FnDriverCount,
    information: FnDriverDescriptor,
    open_stream: FnDriverOpenStream,
    activate: FnDriverCall,
    configuration: FnDriverCount,
    report_size: FnDriverCount,
    save_stream_reports: FnDriverCall,
    saved_report_count: FnDriverCount,
    saved_report: FnDriverSavedReport,
    io_info: FnDriverIoInfo,
    reset_saved_reports: FnDriverVoid,
    decode: FnDriverDecode,
}

impl ShimApi {
    unsafe fn load(library: &Library) -> Result<Self, libloading::Error> {
        Ok(Self {
            open: *library.get::<FnDriverOpen>(b"mdlens_driver_open\0")?,
            close: *library.get::<FnDriverClose>(b"mdlens_driver_close\0")?,
            metric_count: *library.get::<FnDriverCount>(b"mdlens_driver_metric_count\0")?,
            metric: *library.get::<FnDriverDescriptor>(b"mdlens_driver_metric\0")?,
            information_count: *library
                .get::<FnDriverCount>(b"mdlens_driver_information_count\0")?,
            information: *library.get::<FnDriverDescriptor>(b"mdlens_driver_information\0")?,
            open_stream: *library.get::<FnDriverOpenStream>(b"mdlens_driver_open_stream\0")?,
            activate: *library.get::<FnDriverCall>(b"mdlens_driver_activate\0")?,
            configuration: *library.get::<FnDriverCount>(b"mdlens_driver_configuration\0")?,
            report_size: *library.get::<FnDriverCount>(b"mdlens_driver_report_size\0")?,
            save_stream_reports: *library
                .get::<FnDriverCall>(b"mdlens_driver_save_stream_reports\0")?,
            saved_report_count: *library
                .get::<FnDriverCount>(b"mdlens_driver_saved_report_count\0")?,
            saved_report: *library.get::<FnDriverSavedReport>(b"mdlens_driver_saved_report\0")?,
            io_info: *library.get::<FnDriverIoInfo>(b"mdlens_driver_io_info\0")?,
            reset_saved_reports: *library
                .get::<FnDriverVoid>(b"mdlens_driver_reset_saved_reports\0")?,
            decode: *library.get::<FnDriverDecode>(b"mdlens_driver_decode\0")?,
        })
    }
}

/// [`DriverProvider`] loading the shim named by [`DriverRequest::library`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ShimDriverProvider;

impl ShimDriverProvider {
    pub fn new() -> Self {
        Self
    }
}

impl DriverProvider for ShimDriverProvider {
    fn connect(&self, request: &DriverRequest) -> Result<Box<dyn CounterDriver>, DriverError> {
        let unavailable = |reason: String| DriverError::LibraryUnavailable {
            library: request.library.clone(),
            reason,
        };

        let library =
            unsafe { Library::new(&request.library) }.map_err(|e| unavailable(e.to_string()))?;
        let api = unsafe { ShimApi::load(&library) }.map_err(|e| unavailable(e.to_string()))?;

        let metric_set = CString::new(request.metric_set.as_str())
            .map_err(|_| DriverError::MetricSetNotFound(request.metric_set.clone()))?;
        let metrics_file = match &request.metrics_file {
            Some(path) => Some(
                CString::new(path.to_string_lossy().into_owned()).map_err(|_| {
                    DriverError::InvalidMetricsFile {
                        path: path.clone(),
                        reason: "path contains a NUL byte".to_string(),
                    }
                })?,
            ),
            None => None,
        };
        let mode = match request.mode {
            SamplingMode::EventBased => MDLENS_MODE_EVENT_BASED,
            SamplingMode::TimeBased => MDLENS_MODE_TIME_BASED,
        };

        let mut handle: *mut mdlens_driver = ptr::null_mut();
        let status = unsafe {
            (api.open)(
                mode,
                metric_set.as_ptr(),
                metrics_file.as_ref().map_or(ptr::null(), |f| f.as_ptr()),
                u32::from(request.include_max_values),
                &mut handle,
            )
        };
        match status {
            MDLENS_DRIVER_OK if !handle.is_null() => {}
            MDLENS_DRIVER_OK => {
                return Err(DriverError::CallFailed {
                    call: "mdlens_driver_open",
                    status,
                })
            }
            MDLENS_DRIVER_METRIC_SET_NOT_FOUND => {
                return Err(DriverError::MetricSetNotFound(request.metric_set.clone()))
            }
            MDLENS_DRIVER_INVALID_METRICS_FILE => {
                return Err(DriverError::InvalidMetricsFile {
                    path: request.metrics_file.clone().unwrap_or_default(),
                    reason: "rejected by the driver".to_string(),
                })
            }
            MDLENS_DRIVER_UNSUPPORTED_MODE => return Err(DriverError::UnsupportedMode(request.mode)),
            status => {
                return Err(DriverError::CallFailed {
                    call: "mdlens_driver_open",
                    status,
                })
            }
        }

        let mut driver = ShimDriver {
            api,
            handle,
            metrics: Vec::new(),
            information: Vec::new(),
            include_max: request.include_max_values,
            _library: library,
        };
        driver.metrics = driver.descriptors(
            driver.api.metric_count,
            driver.api.metric,
            "mdlens_driver_metric",
        )?;
        driver.information = driver.descriptors(
            driver.api.information_count,
            driver.api.information,
            "mdlens_driver_information",
        )?;
        debug!(
            "Driver shim {} opened {} ({} metrics, {} information values)",
            request.library,
            request.metric_set,
            driver.metrics.len(),
            driver.information.len()
        );
        Ok(Box::new(driver))
    }
}

/// One open shim driver handle
pub struct ShimDriver {
    api: ShimApi,
    handle: *mut mdlens_driver,
    metrics: Vec<MetricDescriptor>,
    information: Vec<MetricDescriptor>,
    include_max: bool,
    // Must outlive every call through `api`; dropped after `handle` is closed
    _library: Library,
}

// Safety: the handle is only used through `&mut self` or read-only queries,
// and the session serializes all access behind its lock.
unsafe impl Send for ShimDriver {}

impl ShimDriver {
    fn descriptors(
        &self,
        count: FnDriverCount,
        describe: FnDriverDescriptor,
        call: &'static str,
    ) -> Result<Vec<MetricDescriptor>, DriverError> {
        let count = unsafe { count(self.handle) };
        (0..count)
            .map(|index| {
                let mut desc = mdlens_descriptor::default();
                let status = unsafe { describe(self.handle, index, &mut desc) };
                if status != MDLENS_DRIVER_OK {
                    return Err(DriverError::CallFailed { call, status });
                }
                Ok(MetricDescriptor::new(
                    c_string(desc.name),
                    c_string(desc.unit),
                ))
            })
            .collect()
    }

    fn value_buffers(&self) -> (Vec<mdlens_value>, Vec<mdlens_value>) {
        let n = self.metrics.len();
        let max = if self.include_max { n } else { 0 };
        (vec![mdlens_value::default(); n], vec![mdlens_value::default(); max])
    }

    fn max_ptr(&self, max: &mut [mdlens_value]) -> *mut mdlens_value {
        if self.include_max {
            max.as_mut_ptr()
        } else {
            ptr::null_mut()
        }
    }

    /// Values of an unknown type are left out; consumers match by name.
    fn build_report(&self, values: &[mdlens_value], max: &[mdlens_value]) -> CounterReport {
        let values = self
            .metrics
            .iter()
            .zip(values)
            .enumerate()
            .filter_map(|(i, (metric, raw))| {
                let mut value = MetricValue::new(metric.name.as_str(), typed_value(raw)?);
                if let Some(m) = max.get(i).and_then(typed_value) {
                    value = value.with_max(m);
                }
                Some(value)
            })
            .collect();
        CounterReport::new(values)
    }
}

impl CounterDriver for ShimDriver {
    fn metrics(&self) -> &[MetricDescriptor] {
        &self.metrics
    }

    fn information(&self) -> &[MetricDescriptor] {
        &self.information
    }

    fn includes_max_values(&self) -> bool {
        self.include_max
    }

    fn open_stream(&mut self, params: StreamParams) -> Result<(), DriverError> {
        let status = unsafe {
            (self.api.open_stream)(
                self.handle,
                params.timer_period_ns,
                params.buffer_size,
                params.pid,
            )
        };
        if status != MDLENS_DRIVER_OK {
            return Err(DriverError::CallFailed {
                call: "mdlens_driver_open_stream",
                status,
            });
        }
        Ok(())
    }

    fn activate_metric_set(&mut self) -> Result<(), DriverError> {
        let status = unsafe { (self.api.activate)(self.handle) };
        if status != MDLENS_DRIVER_OK {
            return Err(DriverError::CallFailed {
                call: "mdlens_driver_activate",
                status,
            });
        }
        Ok(())
    }

    fn metrics_configuration(&self) -> u32 {
        unsafe { (self.api.configuration)(self.handle) }
    }

    fn save_reports_from_stream(&mut self) -> bool {
        match unsafe { (self.api.save_stream_reports)(self.handle) } {
            1 => true,
            0 => false,
            status => {
                debug!("mdlens_driver_save_stream_reports returned {}", status);
                false
            }
        }
    }

    fn metrics_from_saved_reports(&mut self) -> Vec<CounterReport> {
        let count = unsafe { (self.api.saved_report_count)(self.handle) };
        let mut reports = Vec::with_capacity(count as usize);
        for index in 0..count {
            let (mut values, mut max) = self.value_buffers();
            let max_ptr = self.max_ptr(&mut max);
            let status = unsafe {
                (self.api.saved_report)(self.handle, index, values.as_mut_ptr(), max_ptr)
            };
            if status != MDLENS_DRIVER_OK {
                warn!("Couldn't read saved report {}: status {}", index, status);
                continue;
            }
            reports.push(self.build_report(&values, &max));
        }
        reports
    }

    fn io_measurement_info(&mut self) -> Vec<TypedValue> {
        if self.information.is_empty() {
            return Vec::new();
        }
        let mut values = vec![mdlens_value::default(); self.information.len()];
        let status = unsafe { (self.api.io_info)(self.handle, values.as_mut_ptr()) };
        if status != MDLENS_DRIVER_OK {
            debug!("mdlens_driver_io_info returned {}", status);
            return Vec::new();
        }
        // Keep one entry per information column
        values
            .iter()
            .map(|raw| typed_value(raw).unwrap_or_else(|| TypedValue::Str(String::new())))
            .collect()
    }

    fn reset_saved_reports(&mut self) {
        unsafe { (self.api.reset_saved_reports)(self.handle) }
    }

    fn query_report_size(&self) -> usize {
        unsafe { (self.api.report_size)(self.handle) as usize }
    }

    fn decode_report(&mut self, raw: &[u8]) -> CounterReport {
        let (mut values, mut max) = self.value_buffers();
        let max_ptr = self.max_ptr(&mut max);
        let status = unsafe {
            (self.api.decode)(
                self.handle,
                raw.as_ptr(),
                raw.len(),
                values.as_mut_ptr(),
                max_ptr,
            )
        };
        if status != MDLENS_DRIVER_OK {
            warn!("Couldn't decode counter report: status {}", status);
            return CounterReport::default();
        }
        self.build_report(&values, &max)
    }
}

impl Drop for ShimDriver {
    fn drop(&mut self) {
        unsafe { (self.api.close)(self.handle) }
    }
}

impl std::fmt::Debug for ShimDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShimDriver")
            .field("metrics", &self.metrics.len())
            .field("information", &self.information.len())
            .field("include_max", &self.include_max)
            .finish()
    }
}

fn c_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Convert a driver value; unknown value types are skipped
fn typed_value(raw: &mdlens_value) -> Option<TypedValue> {
    let value = unsafe {
        match raw.value_type {
            MDLENS_VALUE_UINT32 => TypedValue::U32(raw.value.u32_),
            MDLENS_VALUE_UINT64 => TypedValue::U64(raw.value.u64_),
            MDLENS_VALUE_FLOAT => TypedValue::F32(raw.value.f32_),
            MDLENS_VALUE_BOOL => TypedValue::Bool(raw.value.b != 0),
            MDLENS_VALUE_CSTRING => TypedValue::Str(c_string(raw.value.cstr)),
            _ => return None,
        }
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(value_type: u32, value: mdlens_value_data) -> mdlens_value {
        mdlens_value { value_type, value }
    }

    #[test]
    fn test_typed_values() {
        assert_eq!(
            typed_value(&raw(MDLENS_VALUE_UINT32, mdlens_value_data { u32_: 7 })),
            Some(TypedValue::U32(7))
        );
        assert_eq!(
            typed_value(&raw(MDLENS_VALUE_UINT64, mdlens_value_data { u64_: 1 << 40 })),
            Some(TypedValue::U64(1 << 40))
        );
        assert_eq!(
            typed_value(&raw(MDLENS_VALUE_FLOAT, mdlens_value_data { f32_: 2.5 })),
            Some(TypedValue::F32(2.5))
        );
        assert_eq!(
            typed_value(&raw(MDLENS_VALUE_BOOL, mdlens_value_data { b: 1 })),
            Some(TypedValue::Bool(true))
        );
    }

    #[test]
    fn test_string_values_are_copied() {
        let text = CString::new("EU0").unwrap();
        let value = raw(
            MDLENS_VALUE_CSTRING,
            mdlens_value_data {
                cstr: text.as_ptr(),
            },
        );
        assert_eq!(typed_value(&value), Some(TypedValue::Str("EU0".to_string())));

        let null = raw(
            MDLENS_VALUE_CSTRING,
            mdlens_value_data { cstr: ptr::null() },
        );
        assert_eq!(typed_value(&null), Some(TypedValue::Str(String::new())));
    }

    #[test]
    fn test_unknown_value_type_skipped() {
        assert_eq!(typed_value(&mdlens_value::default()), None);
    }

    #[test]
    fn test_missing_library() {
        let request = DriverRequest {
            mode: SamplingMode::EventBased,
            library: "/nonexistent/libmdlens_mdapi.so".to_string(),
            metric_set: "ComputeBasic".to_string(),
            metrics_file: None,
            include_max_values: false,
        };
        let Err(err) = ShimDriverProvider::new().connect(&request) else {
            panic!("connected to a missing library");
        };
        assert!(matches!(err, DriverError::LibraryUnavailable { .. }));
    }
}
