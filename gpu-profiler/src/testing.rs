//! Scripted test doubles for the driver and compute-API capabilities
//!
//! Lets the engine run end to end without a GPU or a counter driver. The
//! scripted driver decodes raw per-event reports as little-endian `u32`
//! values, one per metric, so tests build payloads with
//! [`DriverScript::encode`].

use crate::compute::{
    ClStatus, ComputeApi, CreateCounterQueueFn, CL_INVALID_VALUE,
    CL_PROFILING_COMMAND_PERFCOUNTERS_INTEL,
};
use crate::driver::{CounterDriver, DriverError, DriverProvider, DriverRequest, StreamParams};
use crate::queue_props::QueuePropertyBits;
use mdlens_shared::{
    ContextHandle, CounterReport, DeviceId, EventHandle, MetricDescriptor, MetricValue,
    PlatformId, QueueHandle, TypedValue,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const CL_INVALID_EVENT: ClStatus = -58;

/// Max companion reported by the scripted driver
pub const SCRIPTED_MAX_VALUE: u32 = 100;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Behaviour of drivers created by a [`ScriptedProvider`]
#[derive(Debug, Clone)]
pub struct DriverScript {
    pub metrics: Vec<MetricDescriptor>,
    pub information: Vec<MetricDescriptor>,
    pub configuration: u32,
    pub stream_batches: Vec<Vec<CounterReport>>,
    pub io_info: Vec<TypedValue>,
    pub fail_activation: bool,
    pub decode_empty: bool,
}

impl DriverScript {
    pub fn with_metrics(metrics: &[(&str, &str)]) -> Self {
        Self {
            metrics: metrics
                .iter()
                .map(|(name, unit)| MetricDescriptor::new(*name, *unit))
                .collect(),
            information: Vec::new(),
            configuration: 1,
            stream_batches: Vec::new(),
            io_info: Vec::new(),
            fail_activation: false,
            decode_empty: false,
        }
    }

    /// Three metrics and one information value
    pub fn compute_basic() -> Self {
        let mut script = Self::with_metrics(&[
            ("GpuTime", "ns"),
            ("EuActive", "percent"),
            ("EuStall", "percent"),
        ]);
        script.information = vec![MetricDescriptor::new("ReportLost", "")];
        script.io_info = vec![TypedValue::Bool(false)];
        script.configuration = 7;
        script
    }

    /// Reports the stream yields, one batch per successful poll
    pub fn with_stream_batches(mut self, batches: Vec<Vec<CounterReport>>) -> Self {
        self.stream_batches = batches;
        self
    }

    pub fn failing_activation(mut self) -> Self {
        self.fail_activation = true;
        self
    }

    /// Decode every per-event report to nothing
    pub fn decoding_empty(mut self) -> Self {
        self.decode_empty = true;
        self
    }

    /// Raw per-event payload carrying `values`
    pub fn encode(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Report with one `U32` value per metric
    pub fn report(&self, values: &[u32]) -> CounterReport {
        CounterReport::new(
            self.metrics
                .iter()
                .zip(values)
                .map(|(m, v)| MetricValue::new(m.name.as_str(), TypedValue::U32(*v)))
                .collect(),
        )
    }
}

/// Calls observed across every driver a provider created
#[derive(Debug, Default)]
pub struct DriverCalls {
    activations: AtomicUsize,
    polls: AtomicUsize,
    resets: AtomicUsize,
    decodes: AtomicUsize,
    streams: Mutex<Vec<StreamParams>>,
    requests: Mutex<Vec<DriverRequest>>,
}

impl DriverCalls {
    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }

    pub fn streams_opened(&self) -> Vec<StreamParams> {
        lock(&self.streams).clone()
    }

    pub fn requests(&self) -> Vec<DriverRequest> {
        lock(&self.requests).clone()
    }
}

/// Driver provider handing out [`ScriptedDriver`]s
#[derive(Debug)]
pub struct ScriptedProvider {
    script: Option<DriverScript>,
    connects: AtomicUsize,
    calls: Arc<DriverCalls>,
}

impl ScriptedProvider {
    pub fn new(script: DriverScript) -> Self {
        Self {
            script: Some(script),
            connects: AtomicUsize::new(0),
            calls: Arc::new(DriverCalls::default()),
        }
    }

    /// Provider whose every connection attempt fails
    pub fn failing() -> Self {
        Self {
            script: None,
            connects: AtomicUsize::new(0),
            calls: Arc::new(DriverCalls::default()),
        }
    }

    /// Connection attempts so far, failed ones included
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn driver_calls(&self) -> Arc<DriverCalls> {
        self.calls.clone()
    }
}

impl DriverProvider for ScriptedProvider {
    fn connect(&self, request: &DriverRequest) -> Result<Box<dyn CounterDriver>, DriverError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        lock(&self.calls.requests).push(request.clone());

        let script = self.script.clone().ok_or_else(|| DriverError::LibraryUnavailable {
            library: request.library.clone(),
            reason: "scripted failure".to_string(),
        })?;
        Ok(Box::new(ScriptedDriver {
            include_max: request.include_max_values,
            pending: script.stream_batches.iter().cloned().collect(),
            saved: Vec::new(),
            script,
            calls: self.calls.clone(),
        }))
    }
}

/// Driver replaying a [`DriverScript`]
#[derive(Debug)]
pub struct ScriptedDriver {
    script: DriverScript,
    include_max: bool,
    pending: VecDeque<Vec<CounterReport>>,
    saved: Vec<CounterReport>,
    calls: Arc<DriverCalls>,
}

impl CounterDriver for ScriptedDriver {
    fn metrics(&self) -> &[MetricDescriptor] {
        &self.script.metrics
    }

    fn information(&self) -> &[MetricDescriptor] {
        &self.script.information
    }

    fn includes_max_values(&self) -> bool {
        self.include_max
    }

    fn open_stream(&mut self, params: StreamParams) -> Result<(), DriverError> {
        lock(&self.calls.streams).push(params);
        Ok(())
    }

    fn activate_metric_set(&mut self) -> Result<(), DriverError> {
        self.calls.activations.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_activation {
            return Err(DriverError::CallFailed {
                call: "ActivateMetricSet",
                status: 1,
            });
        }
        Ok(())
    }

    fn metrics_configuration(&self) -> u32 {
        self.script.configuration
    }

    fn save_reports_from_stream(&mut self) -> bool {
        self.calls.polls.fetch_add(1, Ordering::SeqCst);
        match self.pending.pop_front() {
            Some(batch) => {
                self.saved.extend(batch);
                true
            }
            None => false,
        }
    }

    fn metrics_from_saved_reports(&mut self) -> Vec<CounterReport> {
        self.saved.clone()
    }

    fn io_measurement_info(&mut self) -> Vec<TypedValue> {
        self.script.io_info.clone()
    }

    fn reset_saved_reports(&mut self) {
        self.calls.resets.fetch_add(1, Ordering::SeqCst);
        self.saved.clear();
    }

    fn query_report_size(&self) -> usize {
        self.script.metrics.len() * std::mem::size_of::<u32>()
    }

    fn decode_report(&mut self, raw: &[u8]) -> CounterReport {
        self.calls.decodes.fetch_add(1, Ordering::SeqCst);
        if self.script.decode_empty {
            return CounterReport::default();
        }

        let values = self
            .script
            .metrics
            .iter()
            .zip(raw.chunks_exact(4))
            .map(|(metric, bytes)| {
                let value = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                let mut metric = MetricValue::new(metric.name.as_str(), TypedValue::U32(value));
                if self.include_max {
                    metric = metric.with_max(TypedValue::U32(SCRIPTED_MAX_VALUE));
                }
                metric
            })
            .collect();
        CounterReport::new(values)
    }
}

/// Arguments of one counter-queue creation call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateCall {
    pub context: ContextHandle,
    pub device: DeviceId,
    pub properties: QueuePropertyBits,
    pub configuration: u32,
}

#[derive(Debug, Default)]
struct ComputeState {
    platforms: Mutex<HashMap<DeviceId, PlatformId>>,
    supported: Mutex<HashSet<PlatformId>>,
    create_status: Mutex<Option<ClStatus>>,
    events: Mutex<HashMap<EventHandle, Result<Vec<u8>, ClStatus>>>,
    created: Mutex<Vec<CreateCall>>,
    resolutions: AtomicUsize,
    queries: AtomicUsize,
}

/// In-memory compute API
#[derive(Debug, Clone, Default)]
pub struct FakeCompute {
    state: Arc<ComputeState>,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `device` under `platform`
    pub fn with_device(self, device: DeviceId, platform: PlatformId) -> Self {
        lock(&self.state.platforms).insert(device, platform);
        self
    }

    /// Make the counter-queue extension resolvable on `platform`
    pub fn with_counter_queues(self, platform: PlatformId) -> Self {
        lock(&self.state.supported).insert(platform);
        self
    }

    /// Make every queue creation fail with `status`
    pub fn failing_queue_creation(self, status: ClStatus) -> Self {
        *lock(&self.state.create_status) = Some(status);
        self
    }

    /// Attach a raw counter report to `event`
    pub fn complete_event(&self, event: EventHandle, payload: Vec<u8>) {
        lock(&self.state.events).insert(event, Ok(payload));
    }

    /// Make the profiling query of `event` fail with `status`
    pub fn fail_event(&self, event: EventHandle, status: ClStatus) {
        lock(&self.state.events).insert(event, Err(status));
    }

    pub fn resolutions(&self) -> usize {
        self.state.resolutions.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.state.queries.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> Vec<CreateCall> {
        lock(&self.state.created).clone()
    }
}

impl ComputeApi for FakeCompute {
    fn device_platform(&self, device: DeviceId) -> Result<PlatformId, ClStatus> {
        lock(&self.state.platforms)
            .get(&device)
            .copied()
            .ok_or(CL_INVALID_VALUE)
    }

    fn resolve_counter_queue_fn(
        &self,
        platform: PlatformId,
        _name: &str,
    ) -> Option<CreateCounterQueueFn> {
        self.state.resolutions.fetch_add(1, Ordering::SeqCst);
        if !lock(&self.state.supported).contains(&platform) {
            return None;
        }

        let state = self.state.clone();
        Some(Arc::new(
            move |context: ContextHandle,
                  device: DeviceId,
                  properties: QueuePropertyBits,
                  configuration: u32| {
                if let Some(status) = *lock(&state.create_status) {
                    return Err(status);
                }
                let mut created = lock(&state.created);
                created.push(CreateCall {
                    context,
                    device,
                    properties,
                    configuration,
                });
                Ok(QueueHandle::from_raw(0x5000 + created.len()))
            },
        ))
    }

    fn event_profiling_info(
        &self,
        event: EventHandle,
        param: u32,
        buffer: &mut [u8],
    ) -> Result<usize, ClStatus> {
        self.state.queries.fetch_add(1, Ordering::SeqCst);
        if param != CL_PROFILING_COMMAND_PERFCOUNTERS_INTEL {
            return Err(CL_INVALID_VALUE);
        }
        match lock(&self.state.events).get(&event) {
            Some(Ok(payload)) => {
                let n = payload.len().min(buffer.len());
                buffer[..n].copy_from_slice(&payload[..n]);
                Ok(payload.len())
            }
            Some(Err(status)) => Err(*status),
            None => Err(CL_INVALID_EVENT),
        }
    }
}
