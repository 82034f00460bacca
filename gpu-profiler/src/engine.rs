//! Counter engine facade
//!
//! The single entry point the interception layer talks to. It owns the
//! configuration, the session and the queue factory, initializes the
//! session at first need and routes completed work to the sampler that
//! matches the configured sampling mode.

use crate::compute::ComputeApi;
use crate::config::EngineConfig;
use crate::driver::DriverProvider;
use crate::error::{QueueError, SessionError};
use crate::event::{sample_event, SampleOutcome};
use crate::queue::{CounterQueue, CounterQueueFactory};
use crate::queue_props::QueuePropertyBits;
use crate::report;
use crate::session::CounterSession;
use crate::stream::drain_stream;
use mdlens_shared::{ContextHandle, DeviceId, EventHandle, SamplingMode};
use std::io;
use std::sync::Arc;
use tracing::{debug, info};

pub struct CounterEngine {
    config: EngineConfig,
    compute: Arc<dyn ComputeApi>,
    session: Arc<CounterSession>,
    queues: CounterQueueFactory,
}

impl CounterEngine {
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn DriverProvider>,
        compute: Arc<dyn ComputeApi>,
    ) -> Self {
        let session = Arc::new(CounterSession::new(provider, config.dump_root.clone()));
        let queues = CounterQueueFactory::new(compute.clone(), session.clone());
        Self {
            config,
            compute,
            session,
            queues,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session(&self) -> &CounterSession {
        &self.session
    }

    /// Start the counter session for the configured mode and metric set
    pub fn init_counters(&self) -> Result<(), SessionError> {
        self.session
            .ensure_initialized(&self.config.driver_request())
    }

    fn init_for_queue(&self) {
        // Failures are logged by the session; queue creation reports them
        if let Err(e) = self.init_counters() {
            debug!("Counter session not started: {}", e);
        }
    }

    /// Create a counter-enabled queue from a legacy property bitfield
    pub fn create_counter_queue(
        &self,
        context: ContextHandle,
        device: DeviceId,
        properties: QueuePropertyBits,
    ) -> Result<CounterQueue, QueueError> {
        self.init_for_queue();
        self.queues.create(context, device, properties)
    }

    /// Create a counter-enabled queue from an extensible property list
    pub fn create_counter_queue_with_properties(
        &self,
        context: ContextHandle,
        device: DeviceId,
        properties: Option<&[u64]>,
    ) -> Result<CounterQueue, QueueError> {
        self.init_for_queue();
        self.queues
            .create_with_properties(context, device, properties)
    }

    /// Collect counter data for a completed unit of work.
    ///
    /// Event-based sessions sample `event` under `operation`; time-based
    /// sessions drain whatever the stream has buffered.
    pub fn on_work_complete(&self, operation: &str, event: EventHandle) {
        match self.config.sampling {
            SamplingMode::EventBased => {
                self.sample_event(operation, event);
            }
            SamplingMode::TimeBased => {
                self.drain_stream();
            }
        }
    }

    pub fn sample_event(&self, operation: &str, event: EventHandle) -> SampleOutcome {
        sample_event(&self.session, self.compute.as_ref(), operation, event)
    }

    /// Drain the continuous sampling stream; returns the number of reports dumped
    pub fn drain_stream(&self) -> usize {
        drain_stream(&self.session)
    }

    /// Summary table of the aggregated metrics, if enabled and non-empty
    pub fn report(&self) -> Option<String> {
        report::render(&self.session.aggregator(), &self.config)
    }

    /// Write the summary table to `out`; returns whether anything was written
    pub fn write_report<W: io::Write>(&self, out: &mut W) -> io::Result<bool> {
        match self.report() {
            Some(text) => {
                out.write_all(text.as_bytes())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Tear the session down and return the final summary.
    ///
    /// A time-based stream is drained one last time before the dump is
    /// closed.
    pub fn shutdown(&self) -> Option<String> {
        if self.session.mode() == Some(SamplingMode::TimeBased) {
            let drained = self.drain_stream();
            debug!("Final stream drain wrote {} reports", drained);
        }
        let dump = self.session.dump_path();
        self.session.close();
        if let Some(path) = dump {
            info!("Metric dump complete: {}", path.display());
        }
        self.report()
    }
}

impl std::fmt::Debug for CounterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterEngine")
            .field("config", &self.config)
            .field("session", &self.session)
            .field("queues", &self.queues)
            .finish()
    }
}
