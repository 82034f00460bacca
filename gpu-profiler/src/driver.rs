//! Counter-collection driver capability
//!
//! A [`CounterDriver`] is one live connection to the vendor's metrics
//! discovery driver, bound to a single metric set and sampling mode.
//! [`DriverProvider`] constructs connections; the production provider loads a
//! shared library (see [`crate::ffi`]), tests use [`crate::testing`].

use mdlens_shared::{CounterReport, MetricDescriptor, SamplingMode, TypedValue};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Timer period of the continuous sampling stream
pub const STREAM_TIMER_PERIOD: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver library {library} could not be loaded: {reason}")]
    LibraryUnavailable { library: String, reason: String },

    #[error("metric set {0} not found")]
    MetricSetNotFound(String),

    #[error("metrics file {path} is invalid: {reason}")]
    InvalidMetricsFile { path: PathBuf, reason: String },

    #[error("{0} sampling is not supported by the driver")]
    UnsupportedMode(SamplingMode),

    #[error("driver call {call} failed with status {status}")]
    CallFailed { call: &'static str, status: i32 },
}

/// What to connect to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverRequest {
    pub mode: SamplingMode,
    pub library: String,
    pub metric_set: String,
    pub metrics_file: Option<PathBuf>,
    pub include_max_values: bool,
}

/// Parameters of a continuous sampling stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    /// Timer period in nanoseconds
    pub timer_period_ns: u32,

    /// Buffer size in bytes, 0 for the device maximum
    pub buffer_size: u32,

    /// Process to sample, 0 for all processes
    pub pid: u32,
}

impl StreamParams {
    /// Periodic sampling of every process with the driver's default buffer
    pub fn all_processes(period: Duration) -> Self {
        Self {
            timer_period_ns: u32::try_from(period.as_nanos()).unwrap_or(u32::MAX),
            buffer_size: 0,
            pid: 0,
        }
    }
}

/// Constructs driver connections
pub trait DriverProvider: Send + Sync {
    fn connect(&self, request: &DriverRequest) -> Result<Box<dyn CounterDriver>, DriverError>;
}

/// One live connection to the counter-collection driver
pub trait CounterDriver: Send {
    /// Descriptors of the active metric set, in activation order
    fn metrics(&self) -> &[MetricDescriptor];

    /// Descriptors of the I/O information values reported alongside stream samples
    fn information(&self) -> &[MetricDescriptor] {
        &[]
    }

    /// Whether decoded values carry max companions
    fn includes_max_values(&self) -> bool;

    /// Open the continuous sampling stream
    fn open_stream(&mut self, params: StreamParams) -> Result<(), DriverError>;

    /// Make the metric set current for subsequently created queues
    fn activate_metric_set(&mut self) -> Result<(), DriverError>;

    /// Configuration token for the activated metric set
    fn metrics_configuration(&self) -> u32;

    /// Move pending stream reports into the driver's saved buffer.
    /// Returns false when the stream has nothing new.
    fn save_reports_from_stream(&mut self) -> bool;

    /// Decode every saved stream report
    fn metrics_from_saved_reports(&mut self) -> Vec<CounterReport>;

    /// I/O measurement values of the last stream read
    fn io_measurement_info(&mut self) -> Vec<TypedValue>;

    /// Drop saved stream reports
    fn reset_saved_reports(&mut self);

    /// Exact size in bytes of one per-event query report
    fn query_report_size(&self) -> usize;

    /// Decode one raw per-event query report
    fn decode_report(&mut self, raw: &[u8]) -> CounterReport;
}
