//! Counter-enabled command queue creation
//!
//! Queue creation activates the session's metric set, which is global driver
//! state, so every creation runs under one process-wide lock. The extension
//! entry point is resolved lazily and cached per platform.

use crate::compute::{
    cl_status_name, ComputeApi, CreateCounterQueueFn, CREATE_COUNTER_QUEUE_FN_NAME,
};
use crate::error::QueueError;
use crate::queue_props::{translate_queue_properties, QueuePropertyBits};
use crate::session::CounterSession;
use crate::telemetry;
use mdlens_shared::{ContextHandle, DeviceId, PlatformId, QueueHandle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

/// A created counter queue and the configuration it was created with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterQueue {
    pub handle: QueueHandle,
    pub configuration: u32,
}

/// Creates counter-enabled queues for a session
pub struct CounterQueueFactory {
    compute: Arc<dyn ComputeApi>,
    session: Arc<CounterSession>,
    // `None` records a platform that lacks the extension
    entry_points: RwLock<HashMap<PlatformId, Option<CreateCounterQueueFn>>>,
    creation_lock: Mutex<()>,
}

impl CounterQueueFactory {
    pub fn new(compute: Arc<dyn ComputeApi>, session: Arc<CounterSession>) -> Self {
        Self {
            compute,
            session,
            entry_points: RwLock::new(HashMap::new()),
            creation_lock: Mutex::new(()),
        }
    }

    /// Cached entry point for `platform`; `None` when not resolved yet
    fn cached(&self, platform: PlatformId) -> Option<Option<CreateCounterQueueFn>> {
        self.entry_points
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&platform)
            .cloned()
    }

    /// Resolve the entry point for `platform`. Caller holds the creation lock.
    fn resolve(&self, platform: PlatformId) -> Option<CreateCounterQueueFn> {
        if let Some(entry) = self.cached(platform) {
            return entry;
        }
        let entry = self
            .compute
            .resolve_counter_queue_fn(platform, CREATE_COUNTER_QUEUE_FN_NAME);
        self.entry_points
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(platform, entry.clone());
        entry
    }

    /// Create a counter queue from a legacy property bitfield
    pub fn create(
        &self,
        context: ContextHandle,
        device: DeviceId,
        properties: QueuePropertyBits,
    ) -> Result<CounterQueue, QueueError> {
        let result = self.create_locked(context, device, properties);
        let status = match &result {
            Ok(_) => "ok",
            Err(QueueError::Driver { .. }) => "driver_error",
            Err(QueueError::ActivationFailed(_)) => "activation_failed",
            Err(_) => "unavailable",
        };
        telemetry::QUEUE_CREATE_TOTAL.with_label_values(&[status]).inc();
        result
    }

    fn create_locked(
        &self,
        context: ContextHandle,
        device: DeviceId,
        properties: QueuePropertyBits,
    ) -> Result<CounterQueue, QueueError> {
        let platform = self
            .compute
            .device_platform(device)
            .map_err(|status| QueueError::PlatformQuery { device, status })?;

        let _guard = self
            .creation_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let Some(create_fn) = self.resolve(platform) else {
            let err = QueueError::EntryPointMissing {
                name: CREATE_COUNTER_QUEUE_FN_NAME,
                platform,
            };
            warn!("{}", err);
            return Err(err);
        };

        let configuration = self
            .session
            .with_driver(|active, _| {
                active
                    .driver
                    .activate_metric_set()
                    .map(|()| active.driver.metrics_configuration())
            })
            .ok_or(QueueError::SessionUninitialized)
            .and_then(|activated| activated.map_err(QueueError::ActivationFailed))
            .map_err(|err| {
                warn!("Metrics discovery: {}", err);
                err
            })?;

        info!(
            "Calling {} with configuration {}",
            CREATE_COUNTER_QUEUE_FN_NAME, configuration
        );
        match create_fn(context, device, properties, configuration) {
            Ok(handle) => {
                info!("{} succeeded", CREATE_COUNTER_QUEUE_FN_NAME);
                Ok(CounterQueue {
                    handle,
                    configuration,
                })
            }
            Err(status) => {
                warn!(
                    "{} returned {} ({})",
                    CREATE_COUNTER_QUEUE_FN_NAME,
                    cl_status_name(status),
                    status
                );
                Err(QueueError::Driver { status })
            }
        }
    }

    /// Create a counter queue from an extensible property list.
    ///
    /// The list must translate to a legacy bitfield; otherwise no queue is
    /// created and the compute API is not called.
    pub fn create_with_properties(
        &self,
        context: ContextHandle,
        device: DeviceId,
        properties: Option<&[u64]>,
    ) -> Result<CounterQueue, QueueError> {
        let bits = translate_queue_properties(properties).map_err(|e| {
            warn!("Cannot create a counter queue: {}", e);
            telemetry::QUEUE_CREATE_TOTAL
                .with_label_values(&["rejected"])
                .inc();
            QueueError::from(e)
        })?;
        self.create(context, device, bits)
    }
}

impl std::fmt::Debug for CounterQueueFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let platforms = self
            .entry_points
            .read()
            .map(|m| m.len())
            .unwrap_or_default();
        f.debug_struct("CounterQueueFactory")
            .field("platforms", &platforms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverRequest;
    use crate::queue_props::{
        CL_QUEUE_PRIORITY_KHR, CL_QUEUE_PROFILING_ENABLE, CL_QUEUE_PROPERTIES,
    };
    use crate::testing::{CreateCall, DriverScript, FakeCompute, ScriptedProvider};
    use mdlens_shared::SamplingMode;
    use tempfile::TempDir;

    const PLATFORM: PlatformId = PlatformId::from_raw(0x10);
    const DEVICE: DeviceId = DeviceId::from_raw(0x20);
    const CONTEXT: ContextHandle = ContextHandle::from_raw(0x30);

    struct Fixture {
        _tmp: TempDir,
        compute: FakeCompute,
        provider: Arc<ScriptedProvider>,
        session: Arc<CounterSession>,
        factory: CounterQueueFactory,
    }

    fn fixture(compute: FakeCompute, script: DriverScript, init: bool) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let provider = Arc::new(ScriptedProvider::new(script));
        let session = Arc::new(CounterSession::new(provider.clone(), tmp.path()));
        if init {
            session
                .ensure_initialized(&DriverRequest {
                    mode: SamplingMode::EventBased,
                    library: "libscripted.so".to_string(),
                    metric_set: "ComputeBasic".to_string(),
                    metrics_file: None,
                    include_max_values: false,
                })
                .unwrap();
        }
        let factory = CounterQueueFactory::new(Arc::new(compute.clone()), session.clone());
        Fixture {
            _tmp: tmp,
            compute,
            provider,
            session,
            factory,
        }
    }

    fn supported_compute() -> FakeCompute {
        FakeCompute::new()
            .with_device(DEVICE, PLATFORM)
            .with_counter_queues(PLATFORM)
    }

    #[test]
    fn test_create_queue() {
        let fx = fixture(supported_compute(), DriverScript::compute_basic(), true);
        let queue = fx
            .factory
            .create(CONTEXT, DEVICE, CL_QUEUE_PROFILING_ENABLE)
            .unwrap();

        assert_eq!(queue.configuration, 7);
        assert!(!queue.handle.is_null());
        assert_eq!(fx.provider.driver_calls().activations(), 1);
        assert_eq!(
            fx.compute.created(),
            vec![CreateCall {
                context: CONTEXT,
                device: DEVICE,
                properties: CL_QUEUE_PROFILING_ENABLE,
                configuration: 7,
            }]
        );
    }

    #[test]
    fn test_entry_point_resolved_once_per_platform() {
        let fx = fixture(supported_compute(), DriverScript::compute_basic(), true);
        for _ in 0..3 {
            fx.factory.create(CONTEXT, DEVICE, 0).unwrap();
        }
        assert_eq!(fx.compute.resolutions(), 1);
        assert_eq!(fx.provider.driver_calls().activations(), 3);
    }

    #[test]
    fn test_missing_entry_point() {
        let compute = FakeCompute::new().with_device(DEVICE, PLATFORM);
        let fx = fixture(compute, DriverScript::compute_basic(), true);

        for _ in 0..2 {
            let err = fx.factory.create(CONTEXT, DEVICE, 0).unwrap_err();
            assert!(matches!(err, QueueError::EntryPointMissing { .. }));
        }
        // Negative results are cached too
        assert_eq!(fx.compute.resolutions(), 1);
        assert_eq!(fx.provider.driver_calls().activations(), 0);
    }

    #[test]
    fn test_uninitialized_session() {
        let fx = fixture(supported_compute(), DriverScript::compute_basic(), false);
        let err = fx.factory.create(CONTEXT, DEVICE, 0).unwrap_err();
        assert!(matches!(err, QueueError::SessionUninitialized));
        assert!(fx.compute.created().is_empty());
        assert!(!fx.session.is_initialized());
    }

    #[test]
    fn test_activation_failure_skips_driver_call() {
        let fx = fixture(
            supported_compute(),
            DriverScript::compute_basic().failing_activation(),
            true,
        );
        let err = fx.factory.create(CONTEXT, DEVICE, 0).unwrap_err();
        assert!(matches!(err, QueueError::ActivationFailed(_)));
        assert!(fx.compute.created().is_empty());
    }

    #[test]
    fn test_driver_error_surfaces_status() {
        let compute = supported_compute().failing_queue_creation(-35);
        let fx = fixture(compute, DriverScript::compute_basic(), true);
        let err = fx.factory.create(CONTEXT, DEVICE, 0).unwrap_err();
        assert_eq!(err.cl_error_code(), -35);
    }

    #[test]
    fn test_unknown_device() {
        let fx = fixture(supported_compute(), DriverScript::compute_basic(), true);
        let err = fx
            .factory
            .create(CONTEXT, DeviceId::from_raw(0x99), 0)
            .unwrap_err();
        assert!(matches!(err, QueueError::PlatformQuery { .. }));
        assert_eq!(fx.compute.resolutions(), 0);
    }

    #[test]
    fn test_create_with_properties() {
        let fx = fixture(supported_compute(), DriverScript::compute_basic(), true);
        let props = [
            CL_QUEUE_PROPERTIES,
            CL_QUEUE_PROFILING_ENABLE,
            CL_QUEUE_PRIORITY_KHR,
            1,
            0,
        ];
        fx.factory
            .create_with_properties(CONTEXT, DEVICE, Some(&props))
            .unwrap();
        assert_eq!(fx.compute.created()[0].properties, CL_QUEUE_PROFILING_ENABLE);
    }

    #[test]
    fn test_rejected_properties_make_no_driver_calls() {
        let fx = fixture(supported_compute(), DriverScript::compute_basic(), true);
        let props = [CL_QUEUE_PROPERTIES, 0xFFFF, 0];
        let err = fx
            .factory
            .create_with_properties(CONTEXT, DEVICE, Some(&props))
            .unwrap_err();
        assert!(matches!(err, QueueError::ConfigurationRejected(_)));
        assert_eq!(fx.compute.resolutions(), 0);
        assert_eq!(fx.provider.driver_calls().activations(), 0);
        assert!(fx.compute.created().is_empty());
    }

    #[test]
    fn test_concurrent_creation() {
        let fx = Arc::new(fixture(
            supported_compute(),
            DriverScript::compute_basic(),
            true,
        ));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let fx = fx.clone();
                std::thread::spawn(move || fx.factory.create(CONTEXT, DEVICE, 0).unwrap())
            })
            .collect();
        let mut queues: Vec<QueueHandle> =
            handles.into_iter().map(|h| h.join().unwrap().handle).collect();
        queues.sort();
        queues.dedup();

        assert_eq!(queues.len(), 8);
        assert_eq!(fx.compute.resolutions(), 1);
        assert_eq!(fx.provider.driver_calls().activations(), 8);
    }
}
