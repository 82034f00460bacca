//! Raw C signatures for the dynamically loaded libraries
//!
//! # OpenCL
//!
//! The handful of ICD-loader entry points the engine calls directly, plus
//! the Intel counter-queue extension resolved per platform.
//!
//! # Counter-driver shim
//!
//! The counter driver is reached through a thin shim library with a flat C
//! ABI. A driver handle is bound to one metric set and sampling mode for its
//! whole lifetime. Every function returning `int32_t` returns
//! `MDLENS_DRIVER_OK` on success.
//!
//! ```c
//! typedef struct mdlens_driver mdlens_driver;
//!
//! typedef struct {
//!     const char* name;
//!     const char* unit;
//! } mdlens_descriptor;
//!
//! typedef struct {
//!     uint32_t type;            /* MDLENS_VALUE_* */
//!     union {
//!         uint32_t    u32;
//!         uint64_t    u64;
//!         float       f32;
//!         uint8_t     b;
//!         const char* cstr;     /* owned by the driver, valid until the next call */
//!     } value;
//! } mdlens_value;
//!
//! int32_t  mdlens_driver_open(uint32_t mode, const char* metric_set,
//!                             const char* metrics_file /* nullable */,
//!                             uint32_t include_max, mdlens_driver** out);
//! void     mdlens_driver_close(mdlens_driver*);
//! uint32_t mdlens_driver_metric_count(const mdlens_driver*);
//! int32_t  mdlens_driver_metric(const mdlens_driver*, uint32_t index, mdlens_descriptor* out);
//! uint32_t mdlens_driver_information_count(const mdlens_driver*);
//! int32_t  mdlens_driver_information(const mdlens_driver*, uint32_t index, mdlens_descriptor* out);
//! int32_t  mdlens_driver_open_stream(mdlens_driver*, uint32_t timer_period_ns,
//!                                    uint32_t buffer_size, uint32_t pid);
//! int32_t  mdlens_driver_activate(mdlens_driver*);
//! uint32_t mdlens_driver_configuration(const mdlens_driver*);
//! uint32_t mdlens_driver_report_size(const mdlens_driver*);
//! int32_t  mdlens_driver_save_stream_reports(mdlens_driver*);   /* 1 when new data was saved */
//! uint32_t mdlens_driver_saved_report_count(const mdlens_driver*);
//! int32_t  mdlens_driver_saved_report(mdlens_driver*, uint32_t index,
//!                                     mdlens_value* values, mdlens_value* max_values);
//! int32_t  mdlens_driver_io_info(mdlens_driver*, mdlens_value* values);
//! void     mdlens_driver_reset_saved_reports(mdlens_driver*);
//! int32_t  mdlens_driver_decode(mdlens_driver*, const uint8_t* raw, size_t size,
//!                               mdlens_value* values, mdlens_value* max_values);
//! ```
//!
//! `values` buffers hold one entry per metric (per information value for
//! `mdlens_driver_io_info`); `max_values` is null unless the driver was
//! opened with `include_max`.

#![allow(non_camel_case_types)]

use libc::{c_char, size_t};
use std::ffi::c_void;

// ── OpenCL ───────────────────────────────────────────────────────────────────

pub type cl_int = i32;
pub type cl_uint = u32;
pub type cl_ulong = u64;
pub type cl_platform_id = *mut c_void;
pub type cl_device_id = *mut c_void;
pub type cl_context = *mut c_void;
pub type cl_command_queue = *mut c_void;
pub type cl_event = *mut c_void;

pub const CL_DEVICE_PLATFORM: cl_uint = 0x1031;

pub type FnClGetDeviceInfo = unsafe extern "system" fn(
    device: cl_device_id,
    param_name: cl_uint,
    param_value_size: size_t,
    param_value: *mut c_void,
    param_value_size_ret: *mut size_t,
) -> cl_int;

pub type FnClGetEventProfilingInfo = unsafe extern "system" fn(
    event: cl_event,
    param_name: cl_uint,
    param_value_size: size_t,
    param_value: *mut c_void,
    param_value_size_ret: *mut size_t,
) -> cl_int;

pub type FnClGetExtensionFunctionAddressForPlatform =
    unsafe extern "system" fn(platform: cl_platform_id, func_name: *const c_char) -> *mut c_void;

pub type FnClCreatePerfCountersCommandQueueIntel = unsafe extern "system" fn(
    context: cl_context,
    device: cl_device_id,
    properties: cl_ulong,
    configuration: cl_uint,
    errcode_ret: *mut cl_int,
) -> cl_command_queue;

// ── Counter-driver shim ──────────────────────────────────────────────────────

pub const MDLENS_DRIVER_OK: i32 = 0;
pub const MDLENS_DRIVER_METRIC_SET_NOT_FOUND: i32 = 1;
pub const MDLENS_DRIVER_INVALID_METRICS_FILE: i32 = 2;
pub const MDLENS_DRIVER_UNSUPPORTED_MODE: i32 = 3;

pub const MDLENS_MODE_EVENT_BASED: u32 = 0;
pub const MDLENS_MODE_TIME_BASED: u32 = 1;

pub const MDLENS_VALUE_UINT32: u32 = 0;
pub const MDLENS_VALUE_UINT64: u32 = 1;
pub const MDLENS_VALUE_FLOAT: u32 = 2;
pub const MDLENS_VALUE_BOOL: u32 = 3;
pub const MDLENS_VALUE_CSTRING: u32 = 4;

#[repr(C)]
pub struct mdlens_driver {
    _private: [u8; 0],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct mdlens_descriptor {
    pub name: *const c_char,
    pub unit: *const c_char,
}

impl Default for mdlens_descriptor {
    fn default() -> Self {
        Self {
            name: std::ptr::null(),
            unit: std::ptr::null(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union mdlens_value_data {
    pub u32_: u32,
    pub u64_: u64,
    pub f32_: f32,
    pub b: u8,
    pub cstr: *const c_char,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct mdlens_value {
    pub value_type: u32,
    pub value: mdlens_value_data,
}

impl Default for mdlens_value {
    fn default() -> Self {
        Self {
            value_type: u32::MAX,
            value: mdlens_value_data { u64_: 0 },
        }
    }
}

pub type FnDriverOpen = unsafe extern "C" fn(
    mode: u32,
    metric_set: *const c_char,
    metrics_file: *const c_char,
    include_max: u32,
    out: *mut *mut mdlens_driver,
) -> i32;
pub type FnDriverClose = unsafe extern "C" fn(driver: *mut mdlens_driver);
pub type FnDriverCount = unsafe extern "C" fn(driver: *const mdlens_driver) -> u32;
pub type FnDriverDescriptor = unsafe extern "C" fn(
    driver: *const mdlens_driver,
    index: u32,
    out: *mut mdlens_descriptor,
) -> i32;
pub type FnDriverOpenStream = unsafe extern "C" fn(
    driver: *mut mdlens_driver,
    timer_period_ns: u32,
    buffer_size: u32,
    pid: u32,
) -> i32;
pub type FnDriverCall = unsafe extern "C" fn(driver: *mut mdlens_driver) -> i32;
pub type FnDriverVoid = unsafe extern "C" fn(driver: *mut mdlens_driver);
pub type FnDriverSavedReport = unsafe extern "C" fn(
    driver: *mut mdlens_driver,
    index: u32,
    values: *mut mdlens_value,
    max_values: *mut mdlens_value,
) -> i32;
pub type FnDriverIoInfo =
    unsafe extern "C" fn(driver: *mut mdlens_driver, values: *mut mdlens_value) -> i32;
pub type FnDriverDecode = unsafe extern "C" fn(
    driver: *mut mdlens_driver,
    raw: *const u8,
    size: size_t,
    values: *mut mdlens_value,
    max_values: *mut mdlens_value,
) -> i32;
