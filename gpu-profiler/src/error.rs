//! Engine error types
//!
//! Every failure here is local: callers log it and carry on without counter
//! data. Nothing in the engine aborts the host application.

use crate::compute::{cl_status_name, ClStatus, CL_INVALID_OPERATION, CL_INVALID_VALUE};
use crate::driver::DriverError;
use crate::queue_props::TranslateError;
use mdlens_shared::{DeviceId, PlatformId, SamplingMode};
use std::path::PathBuf;
use thiserror::Error;

fn status_name(status: &ClStatus) -> &'static str {
    cl_status_name(*status)
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("counter driver unavailable: {0}")]
    DriverUnavailable(#[from] DriverError),

    #[error(
        "session is running {active_mode} sampling of {active_set}; \
         refusing to switch to {requested_mode} sampling of {requested_set}"
    )]
    Reconfigured {
        active_mode: SamplingMode,
        active_set: String,
        requested_mode: SamplingMode,
        requested_set: String,
    },
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue properties rejected: {0}")]
    ConfigurationRejected(#[from] TranslateError),

    #[error("device {device} platform query failed: {}", status_name(.status))]
    PlatformQuery { device: DeviceId, status: ClStatus },

    #[error("couldn't get pointer to {name} on platform {platform}")]
    EntryPointMissing {
        name: &'static str,
        platform: PlatformId,
    },

    #[error("metrics discovery is not initialized")]
    SessionUninitialized,

    #[error("couldn't activate metric set: {0}")]
    ActivationFailed(#[source] DriverError),

    #[error("queue creation returned {} ({status})", status_name(.status))]
    Driver { status: ClStatus },
}

impl QueueError {
    /// Status code to hand back through the compute API's error out-parameter
    pub fn cl_error_code(&self) -> ClStatus {
        match self {
            QueueError::ConfigurationRejected(_) => CL_INVALID_VALUE,
            QueueError::PlatformQuery { status, .. } | QueueError::Driver { status } => *status,
            QueueError::EntryPointMissing { .. }
            | QueueError::SessionUninitialized
            | QueueError::ActivationFailed(_) => CL_INVALID_OPERATION,
        }
    }
}

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("dump file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dump file {path} line {line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}
