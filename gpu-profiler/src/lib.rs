//! GPU performance-counter acquisition and aggregation
//!
//! Turns the counter driver's raw reports into named metric values, dumps
//! them to CSV and keeps per-operation running statistics for the summary
//! table printed at shutdown.
//!
//! The interception layer drives everything through [`CounterEngine`]:
//! counter-enabled queues are created with
//! [`CounterEngine::create_counter_queue`], completed work is reported with
//! [`CounterEngine::on_work_complete`], and [`CounterEngine::shutdown`]
//! closes the session.

pub mod aggregate;
pub mod compute;
pub mod config;
pub mod driver;
pub mod dump;
pub mod engine;
pub mod error;
pub mod event;
pub mod ffi;
pub mod queue;
pub mod queue_props;
pub mod report;
pub mod session;
pub mod stream;
pub mod telemetry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use aggregate::{AggregationRecord, MetricAggregator, OperationMetrics};
pub use compute::{ClStatus, ComputeApi, CreateCounterQueueFn};
pub use config::EngineConfig;
pub use driver::{CounterDriver, DriverError, DriverProvider, DriverRequest, StreamParams};
pub use dump::{read_dump, DumpContents, DumpWriter};
pub use engine::CounterEngine;
pub use error::{DumpError, QueueError, SessionError};
pub use event::SampleOutcome;
pub use queue::{CounterQueue, CounterQueueFactory};
pub use queue_props::{translate_queue_properties, QueuePropertyBits, TranslateError};
pub use session::CounterSession;
