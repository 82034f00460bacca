//! Integration test: queue creation → sampling → dump → summary
//!
//! Drives `CounterEngine` end to end with the scripted driver and compute
//! doubles, then reads the dump back from disk.

use anyhow::Result;
use mdlens_gpu::queue_props::{CL_QUEUE_PROFILING_ENABLE, CL_QUEUE_PROPERTIES};
use mdlens_gpu::report::format_table;
use mdlens_gpu::testing::{DriverScript, FakeCompute, ScriptedProvider, SCRIPTED_MAX_VALUE};
use mdlens_gpu::{read_dump, CounterEngine, EngineConfig, MetricAggregator, QueueError};
use mdlens_shared::{ContextHandle, DeviceId, EventHandle, PlatformId, SamplingMode, TypedValue};
use std::sync::Arc;

const PLATFORM: PlatformId = PlatformId::from_raw(0x1000);
const DEVICE: DeviceId = DeviceId::from_raw(0x2000);
const CONTEXT: ContextHandle = ContextHandle::from_raw(0x3000);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("mdlens_gpu=debug")
        .with_test_writer()
        .try_init();
}

fn compute() -> FakeCompute {
    FakeCompute::new()
        .with_device(DEVICE, PLATFORM)
        .with_counter_queues(PLATFORM)
}

#[test]
fn test_event_based_pipeline() -> Result<()> {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let compute = compute();
    let config = EngineConfig {
        include_max_values: true,
        dump_root: tmp.path().to_path_buf(),
        ..EngineConfig::default()
    };
    let engine = CounterEngine::new(
        config,
        Arc::new(ScriptedProvider::new(DriverScript::compute_basic())),
        Arc::new(compute.clone()),
    );

    let props = [CL_QUEUE_PROPERTIES, CL_QUEUE_PROFILING_ENABLE, 0];
    let queue = engine.create_counter_queue_with_properties(CONTEXT, DEVICE, Some(&props))?;
    assert_eq!(queue.configuration, 7);

    let samples: [(&str, [u32; 3]); 4] = [
        ("kernelA", [10, 40, 1]),
        ("kernelA", [20, 50, 2]),
        ("kernelB", [5, 90, 0]),
        ("kernelA", [30, 60, 3]),
    ];
    for (i, (operation, values)) in samples.iter().enumerate() {
        let event = EventHandle::from_raw(0x100 + i);
        compute.complete_event(event, DriverScript::encode(values));
        engine.on_work_complete(operation, event);
    }

    {
        let agg = engine.session().aggregator();
        assert_eq!(agg.average("kernelA", "GpuTime"), Some(20.0));
        assert_eq!(agg.average("kernelA", "EuActive"), Some(50.0));
        assert_eq!(agg.average("kernelB", "GpuTime"), Some(5.0));
        assert_eq!(agg.operation("kernelA").map(|op| op.calls()), Some(3));
        let names: Vec<&str> = agg.operations().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["kernelA", "kernelB"]);
    }

    let dump_path = engine.session().dump_path().expect("dump is open");
    let summary = engine.shutdown().expect("summary is rendered");
    assert!(summary.starts_with("\nDevice Performance Counter Timing"));
    assert!(summary.contains("GpuTime, EuActive, EuStall, "));

    let dump = read_dump(&dump_path)?;
    assert_eq!(dump.mode, SamplingMode::EventBased);
    let metric_names: Vec<&str> = dump.metrics.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(metric_names, vec!["GpuTime", "EuActive", "EuStall"]);
    assert!(dump.information.is_empty());
    assert_eq!(dump.rows.len(), 4);
    assert_eq!(dump.rows[2].0, "kernelB");

    let first = &dump.rows[0].1;
    assert_eq!(first.get("GpuTime").map(|m| &m.value), Some(&TypedValue::U32(10)));
    assert_eq!(
        first.get("GpuTime").and_then(|m| m.max.clone()),
        Some(TypedValue::U32(SCRIPTED_MAX_VALUE))
    );

    // The dump regenerates the same summary offline
    let mut offline = MetricAggregator::new();
    for (operation, report) in &dump.rows {
        offline.aggregate(operation, report);
    }
    assert_eq!(format_table(&offline).as_deref(), Some(summary.as_str()));
    Ok(())
}

#[test]
fn test_time_based_pipeline() -> Result<()> {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let script = DriverScript::compute_basic();
    let batches = vec![
        vec![script.report(&[100, 50, 5]), script.report(&[110, 55, 6])],
        vec![script.report(&[120, 60, 7])],
    ];
    let provider = Arc::new(ScriptedProvider::new(script.with_stream_batches(batches)));
    let compute = compute();
    let config = EngineConfig {
        sampling: SamplingMode::TimeBased,
        dump_root: tmp.path().to_path_buf(),
        ..EngineConfig::default()
    };
    let engine = CounterEngine::new(config, provider.clone(), Arc::new(compute.clone()));

    engine.create_counter_queue(CONTEXT, DEVICE, 0)?;
    assert_eq!(provider.driver_calls().streams_opened().len(), 1);

    engine.on_work_complete("kernelA", EventHandle::from_raw(1));
    let dump_path = engine.session().dump_path().expect("dump is open");
    assert!(engine.shutdown().is_none());

    // Stream sampling never touches events or the aggregator
    assert_eq!(compute.queries(), 0);
    assert!(engine.session().aggregator().is_empty());

    let dump = read_dump(&dump_path)?;
    assert_eq!(dump.mode, SamplingMode::TimeBased);
    assert_eq!(dump.information.len(), 1);
    assert_eq!(dump.information[0].name, "ReportLost");
    assert_eq!(dump.rows.len(), 3);
    for (label, report) in &dump.rows {
        assert_eq!(label, "TBS");
        assert_eq!(report.len(), 3);
        assert_eq!(report.io_info, vec![TypedValue::Bool(false)]);
    }
    assert_eq!(
        dump.rows[2].1.get("GpuTime").map(|m| &m.value),
        Some(&TypedValue::U32(120))
    );
    Ok(())
}

#[test]
fn test_unavailable_driver_disables_counters() -> Result<()> {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let compute = compute();
    let provider = Arc::new(ScriptedProvider::failing());
    let config = EngineConfig {
        dump_root: tmp.path().to_path_buf(),
        ..EngineConfig::default()
    };
    let engine = CounterEngine::new(config, provider.clone(), Arc::new(compute.clone()));

    for _ in 0..3 {
        let err = engine.create_counter_queue(CONTEXT, DEVICE, 0).unwrap_err();
        assert!(matches!(err, QueueError::SessionUninitialized));
        assert_eq!(err.cl_error_code(), -59);
    }

    let event = EventHandle::from_raw(7);
    compute.complete_event(event, DriverScript::encode(&[1, 2, 3]));
    engine.on_work_complete("kernelA", event);

    assert_eq!(compute.queries(), 0);
    assert!(compute.created().is_empty());
    assert!(engine.shutdown().is_none());
    assert!(std::fs::read_dir(tmp.path())?.next().is_none());
    Ok(())
}

#[test]
fn test_rejected_properties_create_nothing() -> Result<()> {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let compute = compute();
    let config = EngineConfig {
        dump_root: tmp.path().to_path_buf(),
        ..EngineConfig::default()
    };
    let engine = CounterEngine::new(
        config,
        Arc::new(ScriptedProvider::new(DriverScript::compute_basic())),
        Arc::new(compute.clone()),
    );

    // Unknown key
    let props = [0x1234, 1, 0];
    let err = engine
        .create_counter_queue_with_properties(CONTEXT, DEVICE, Some(&props))
        .unwrap_err();
    assert!(matches!(err, QueueError::ConfigurationRejected(_)));
    assert_eq!(err.cl_error_code(), -30);
    assert!(compute.created().is_empty());
    assert_eq!(compute.resolutions(), 0);

    // A supported list still works afterwards
    engine.create_counter_queue_with_properties(CONTEXT, DEVICE, None)?;
    assert_eq!(compute.created().len(), 1);
    Ok(())
}
