//! Per-event counter sampling
//!
//! Reads the counter report the driver attached to one completed unit of
//! work, dumps it under the operation's name and folds it into the
//! session's aggregator.

use crate::compute::{cl_status_name, ClStatus, ComputeApi, CL_PROFILING_COMMAND_PERFCOUNTERS_INTEL};
use crate::session::CounterSession;
use crate::telemetry;
use mdlens_shared::{EventHandle, SamplingMode};
use tracing::warn;

/// What happened to one event sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// No counter session; nothing was queried
    NoSession,

    /// The session samples a stream, not events
    WrongMode,

    /// The profiling-info query failed with this status
    QueryFailed(ClStatus),

    /// The report decoded to no metric values
    Empty,

    /// The report was dumped and aggregated
    Recorded { metrics: usize },
}

/// Sample the counter report of a completed `event` under `operation`
pub fn sample_event(
    session: &CounterSession,
    compute: &dyn ComputeApi,
    operation: &str,
    event: EventHandle,
) -> SampleOutcome {
    let decoded = session.with_driver(|active, dump| {
        if active.mode != SamplingMode::EventBased {
            warn!("Event sample requested for a {} session", active.mode);
            return Err(SampleOutcome::WrongMode);
        }

        let report_size = active.driver.query_report_size();
        let mut raw = vec![0u8; report_size];

        let written = compute
            .event_profiling_info(event, CL_PROFILING_COMMAND_PERFCOUNTERS_INTEL, &mut raw)
            .map_err(|status| {
                warn!(
                    "Couldn't get counter data for {}: profiling query returned {} ({:08X})",
                    operation,
                    cl_status_name(status),
                    status
                );
                telemetry::SAMPLES_DROPPED_TOTAL
                    .with_label_values(&["query_failed"])
                    .inc();
                SampleOutcome::QueryFailed(status)
            })?;

        debug_assert_eq!(
            written, report_size,
            "counter report size mismatch (driver/runtime version skew?)"
        );
        if written != report_size {
            warn!(
                "Counter report for {} is {} bytes, expected {}",
                operation, written, report_size
            );
        }

        let report = active.driver.decode_report(&raw);
        if report.is_empty() {
            telemetry::SAMPLES_DROPPED_TOTAL
                .with_label_values(&["empty"])
                .inc();
            return Err(SampleOutcome::Empty);
        }

        dump.write(operation, &report);
        Ok(report)
    });

    match decoded {
        None => SampleOutcome::NoSession,
        Some(Err(outcome)) => outcome,
        Some(Ok(report)) => {
            session.aggregator().aggregate(operation, &report);
            telemetry::REPORTS_TOTAL
                .with_label_values(&[SamplingMode::EventBased.tag()])
                .inc();
            SampleOutcome::Recorded {
                metrics: report.len(),
            }
        }
    }
}
