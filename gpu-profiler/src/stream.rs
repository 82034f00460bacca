//! Continuous (time-based) stream sampling

use crate::session::CounterSession;
use crate::telemetry;
use mdlens_shared::SamplingMode;
use tracing::{debug, warn};

/// Drain every report currently available on the session's sampling stream
/// into the dump.
///
/// Polls until the driver reports no new data, so an idle stream returns
/// immediately. Returns the number of reports written.
pub fn drain_stream(session: &CounterSession) -> usize {
    session
        .with_driver(|active, dump| {
            if active.mode != SamplingMode::TimeBased {
                warn!("Stream drain requested for a {} session", active.mode);
                return 0;
            }

            let tag = SamplingMode::TimeBased.tag();
            let mut drained = 0;
            while active.driver.save_reports_from_stream() {
                let reports = active.driver.metrics_from_saved_reports();
                let io_info = active.driver.io_measurement_info();
                debug!("Drained {} stream reports", reports.len());

                for mut report in reports {
                    report.io_info = io_info.clone();
                    dump.write(tag, &report);
                    drained += 1;
                }
                active.driver.reset_saved_reports();
            }

            if drained > 0 {
                telemetry::REPORTS_TOTAL
                    .with_label_values(&[tag])
                    .inc_by(drained as u64);
            }
            drained
        })
        .unwrap_or(0)
}
