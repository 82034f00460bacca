//! Command-queue property translation
//!
//! Counter-enabled queues can only be created from the legacy bitfield form of
//! queue properties. Callers using the extensible form (a zero-terminated list
//! of key/value pairs) go through [`translate_queue_properties`] first; any
//! property the counter queue cannot honour rejects the whole list.

use thiserror::Error;

/// Legacy queue property bitfield
pub type QueuePropertyBits = u64;

/// Key selecting the queue property bitfield in a property list
pub const CL_QUEUE_PROPERTIES: u64 = 0x1093;
/// Queue priority hint (`cl_khr_priority_hints`)
pub const CL_QUEUE_PRIORITY_KHR: u64 = 0x1096;
/// Queue throttle hint (`cl_khr_throttle_hints`)
pub const CL_QUEUE_THROTTLE_KHR: u64 = 0x1097;

pub const CL_QUEUE_OUT_OF_ORDER_EXEC_MODE_ENABLE: QueuePropertyBits = 1 << 0;
pub const CL_QUEUE_PROFILING_ENABLE: QueuePropertyBits = 1 << 1;

/// Bitfield values a counter-enabled queue supports
const SUPPORTED_BITS: [QueuePropertyBits; 4] = [
    0,
    CL_QUEUE_PROFILING_ENABLE,
    CL_QUEUE_OUT_OF_ORDER_EXEC_MODE_ENABLE,
    CL_QUEUE_PROFILING_ENABLE | CL_QUEUE_OUT_OF_ORDER_EXEC_MODE_ENABLE,
];

/// Reasons a property list cannot be expressed as a legacy bitfield
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("unsupported queue properties value {0:#x}")]
    UnsupportedValue(u64),

    #[error("unrecognized queue property key {0:#x}")]
    UnrecognizedKey(u64),

    #[error("queue property key {0:#x} has no value")]
    MissingValue(u64),
}

/// Convert an extensible property list into the legacy bitfield.
///
/// The list ends at the first zero key or at the end of the slice, whichever
/// comes first. `None` means "no properties" and yields an empty bitfield.
/// Priority and throttle hints are accepted and dropped.
pub fn translate_queue_properties(
    properties: Option<&[u64]>,
) -> Result<QueuePropertyBits, TranslateError> {
    let mut bits: QueuePropertyBits = 0;
    let Some(properties) = properties else {
        return Ok(bits);
    };

    let mut pairs = properties.iter().copied();
    while let Some(key) = pairs.next() {
        if key == 0 {
            break;
        }
        let value = pairs.next().ok_or(TranslateError::MissingValue(key))?;
        match key {
            CL_QUEUE_PROPERTIES => {
                if !SUPPORTED_BITS.contains(&value) {
                    return Err(TranslateError::UnsupportedValue(value));
                }
                bits |= value;
            }
            CL_QUEUE_PRIORITY_KHR | CL_QUEUE_THROTTLE_KHR => {}
            other => return Err(TranslateError::UnrecognizedKey(other)),
        }
    }

    Ok(bits)
}
