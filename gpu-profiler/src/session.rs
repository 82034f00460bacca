//! Counter session
//!
//! Owns the connection to the counter-collection driver, the dump sink and
//! the per-operation aggregator for the lifetime of a profiling session.
//! Everything is created lazily on first need through
//! [`CounterSession::ensure_initialized`] and guarded by a single lock, so
//! concurrent first use constructs the driver and opens the dump once.

use crate::aggregate::MetricAggregator;
use crate::driver::{
    CounterDriver, DriverProvider, DriverRequest, StreamParams, STREAM_TIMER_PERIOD,
};
use crate::dump::{dump_directory, dump_file_path, DumpWriter};
use crate::error::SessionError;
use crate::telemetry;
use mdlens_shared::{CounterReport, SamplingMode};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// A live driver connection and the parameters it was created with
pub struct ActiveDriver {
    pub mode: SamplingMode,
    pub metric_set: String,
    pub driver: Box<dyn CounterDriver>,
}

impl std::fmt::Debug for ActiveDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveDriver")
            .field("mode", &self.mode)
            .field("metric_set", &self.metric_set)
            .field("metrics", &self.driver.metrics().len())
            .finish()
    }
}

#[derive(Debug, Default)]
struct SessionState {
    active: Option<ActiveDriver>,
    dump: Option<DumpWriter>,
    dump_missing_reported: bool,
    connect_failures: u32,
    /// Dumps opened earlier in this session; reopening appends to them
    opened_dumps: Vec<PathBuf>,
}

/// Dump access handed to code running under the session lock
pub struct DumpSlot<'a> {
    dump: &'a mut Option<DumpWriter>,
    missing_reported: &'a mut bool,
}

impl DumpSlot<'_> {
    /// Append a report row. A missing or failing sink drops the row.
    pub fn write(&mut self, label: &str, report: &CounterReport) {
        match self.dump.as_mut() {
            Some(dump) => match dump.write_report(label, report) {
                Ok(()) => telemetry::DUMP_ROWS_TOTAL.inc(),
                Err(e) => warn!("Failed to write metric dump row: {}", e),
            },
            None => {
                if !*self.missing_reported {
                    warn!("Metric dump is not open; counter rows will not be written");
                    *self.missing_reported = true;
                }
            }
        }
    }
}

/// Explicitly owned counter session
pub struct CounterSession {
    provider: Arc<dyn DriverProvider>,
    dump_root: PathBuf,
    state: Mutex<SessionState>,
    aggregator: Mutex<MetricAggregator>,
    uninitialized_reported: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CounterSession {
    pub fn new(provider: Arc<dyn DriverProvider>, dump_root: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            dump_root: dump_root.into(),
            state: Mutex::new(SessionState::default()),
            aggregator: Mutex::new(MetricAggregator::new()),
            uninitialized_reported: AtomicBool::new(false),
        }
    }

    /// Create the driver connection and dump sink if they do not exist yet.
    ///
    /// A no-op when a session with the same mode and metric set is live.
    /// A request for a different mode or metric set is refused; the live
    /// session is left untouched.
    pub fn ensure_initialized(&self, request: &DriverRequest) -> Result<(), SessionError> {
        let mut state = lock(&self.state);

        if let Some(active) = &state.active {
            if active.mode != request.mode || active.metric_set != request.metric_set {
                return Err(SessionError::Reconfigured {
                    active_mode: active.mode,
                    active_set: active.metric_set.clone(),
                    requested_mode: request.mode,
                    requested_set: request.metric_set.clone(),
                });
            }
            return Ok(());
        }

        let mut driver = match self.provider.connect(request) {
            Ok(driver) => {
                info!(
                    "Metrics discovery initialized: {} sampling of {} ({} metrics)",
                    request.mode,
                    request.metric_set,
                    driver.metrics().len()
                );
                driver
            }
            Err(e) => {
                if state.connect_failures == 0 {
                    warn!("Metrics discovery failed to initialize: {}", e);
                } else {
                    debug!("Metrics discovery still unavailable: {}", e);
                }
                state.connect_failures += 1;
                return Err(e.into());
            }
        };

        if request.mode == SamplingMode::TimeBased {
            if let Err(e) = driver.open_stream(StreamParams::all_processes(STREAM_TIMER_PERIOD)) {
                warn!("Failed to open metric stream: {}", e);
            }
        }

        if state.dump.is_none() {
            let path = dump_file_path(&dump_directory(&self.dump_root), &request.metric_set);
            let reopen = state.opened_dumps.contains(&path);
            let open = if reopen {
                DumpWriter::append
            } else {
                DumpWriter::create
            };
            match open(
                &path,
                request.mode,
                driver.metrics(),
                driver.information(),
                driver.includes_max_values(),
            ) {
                Ok(dump) => {
                    if reopen {
                        info!("Appending to metric dump {}", path.display());
                    } else {
                        info!("Writing metric dump to {}", path.display());
                        state.opened_dumps.push(path);
                    }
                    state.dump = Some(dump);
                }
                Err(e) => warn!("Failed to open metric dump: {}", e),
            }
        }

        state.active = Some(ActiveDriver {
            mode: request.mode,
            metric_set: request.metric_set.clone(),
            driver,
        });
        state.connect_failures = 0;
        self.uninitialized_reported.store(false, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.state).active.is_some()
    }

    /// Sampling mode of the live session
    pub fn mode(&self) -> Option<SamplingMode> {
        lock(&self.state).active.as_ref().map(|a| a.mode)
    }

    /// Path of the open dump file
    pub fn dump_path(&self) -> Option<PathBuf> {
        lock(&self.state)
            .dump
            .as_ref()
            .map(|d| d.path().to_path_buf())
    }

    pub fn dump_root(&self) -> &Path {
        &self.dump_root
    }

    /// Run `f` against the live driver and the dump sink, under the session lock.
    ///
    /// Returns `None` without calling `f` when no session exists; the first
    /// such call per session is logged.
    pub fn with_driver<R>(
        &self,
        f: impl FnOnce(&mut ActiveDriver, &mut DumpSlot<'_>) -> R,
    ) -> Option<R> {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let Some(active) = state.active.as_mut() else {
            if !self.uninitialized_reported.swap(true, Ordering::Relaxed) {
                warn!("Metrics discovery is not initialized; counter collection disabled");
            }
            return None;
        };
        let mut slot = DumpSlot {
            dump: &mut state.dump,
            missing_reported: &mut state.dump_missing_reported,
        };
        Some(f(active, &mut slot))
    }

    /// Exclusive access to the aggregator
    pub fn aggregator(&self) -> MutexGuard<'_, MetricAggregator> {
        lock(&self.aggregator)
    }

    /// Flush and close the dump and drop the driver connection.
    ///
    /// Aggregated data survives so the summary can still be rendered.
    pub fn close(&self) {
        let mut state = lock(&self.state);
        if let Some(mut dump) = state.dump.take() {
            match dump.flush() {
                Ok(()) => info!(
                    "Closed metric dump {} ({} rows)",
                    dump.path().display(),
                    dump.rows_written()
                ),
                Err(e) => warn!("Failed to flush metric dump: {}", e),
            }
        }
        state.active = None;
        state.dump_missing_reported = false;
    }
}

impl std::fmt::Debug for CounterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterSession")
            .field("dump_root", &self.dump_root)
            .field("state", &*lock(&self.state))
            .finish()
    }
}
