//! Metric dump file
//!
//! Comma-separated text file, one per session. The first line holds the
//! column names, the second the units, then one row per decoded report:
//! a label column (operation name, or the sampling tag for stream samples)
//! followed by the metric values in activation order. When max values are
//! requested each metric column is followed by a `<name>.max` column; stream
//! dumps end with `io.<name>` columns for the driver's I/O information.

use crate::error::DumpError;
use mdlens_shared::{CounterReport, MetricDescriptor, MetricValue, SamplingMode, TypedValue};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Directory created under the configured dump root
pub const DUMP_DIRECTORY_NAME: &str = "mdlens_dump";

/// File name prefix of metric dumps
pub const DUMP_FILE_PREFIX: &str = "perfcounters";

const MAX_SUFFIX: &str = ".max";
const IO_PREFIX: &str = "io.";

/// Directory that holds this process's dumps: `<root>/mdlens_dump/<process>`
pub fn dump_directory(root: &Path) -> PathBuf {
    let process = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| format!("process-{}", std::process::id()));
    root.join(DUMP_DIRECTORY_NAME).join(process)
}

/// Dump file path for a metric set inside `directory`
pub fn dump_file_path(directory: &Path, metric_set: &str) -> PathBuf {
    directory.join(format!("{}_{}.csv", DUMP_FILE_PREFIX, metric_set))
}

/// Label column title for a sampling mode
fn label_title(mode: SamplingMode) -> &'static str {
    match mode {
        SamplingMode::EventBased => "Operation",
        SamplingMode::TimeBased => "Sampling",
    }
}

/// Quote a field if it would break the row layout
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split one dump line into fields, honouring quoted fields
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Append-only writer for one session's dump file
#[derive(Debug)]
pub struct DumpWriter {
    path: PathBuf,
    out: BufWriter<File>,
    metrics: Vec<String>,
    information: usize,
    include_max: bool,
    rows: u64,
}

impl DumpWriter {
    /// Create the dump file (and its parent directories) and write the
    /// name and unit header rows.
    pub fn create(
        path: &Path,
        mode: SamplingMode,
        metrics: &[MetricDescriptor],
        information: &[MetricDescriptor],
        include_max: bool,
    ) -> Result<Self, DumpError> {
        Self::open(path, mode, metrics, information, include_max, false)
    }

    /// Open an existing dump for appending rows. Header rows are only
    /// written when the file is new or empty.
    pub fn append(
        path: &Path,
        mode: SamplingMode,
        metrics: &[MetricDescriptor],
        information: &[MetricDescriptor],
        include_max: bool,
    ) -> Result<Self, DumpError> {
        Self::open(path, mode, metrics, information, include_max, true)
    }

    fn open(
        path: &Path,
        mode: SamplingMode,
        metrics: &[MetricDescriptor],
        information: &[MetricDescriptor],
        include_max: bool,
        append: bool,
    ) -> Result<Self, DumpError> {
        let io_err = |source: std::io::Error| DumpError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = if append {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(io_err)?
        } else {
            File::create(path).map_err(io_err)?
        };
        let has_headers = append && file.metadata().map_err(io_err)?.len() > 0;

        // Information columns only exist for stream samples
        let information: &[MetricDescriptor] = match mode {
            SamplingMode::TimeBased => information,
            SamplingMode::EventBased => &[],
        };

        let mut writer = Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            metrics: metrics.iter().map(|m| m.name.clone()).collect(),
            information: information.len(),
            include_max,
            rows: 0,
        };

        let mut names = vec![label_title(mode).to_string()];
        let mut units = vec![String::new()];
        for metric in metrics {
            names.push(escape_field(&metric.name));
            units.push(escape_field(&metric.unit));
            if include_max {
                names.push(escape_field(&format!("{}{}", metric.name, MAX_SUFFIX)));
                units.push(escape_field(&metric.unit));
            }
        }
        for info in information {
            names.push(escape_field(&format!("{}{}", IO_PREFIX, info.name)));
            units.push(escape_field(&info.unit));
        }

        if !has_headers {
            writer.write_line(&names)?;
            writer.write_line(&units)?;
        }
        Ok(writer)
    }

    fn write_line(&mut self, fields: &[String]) -> Result<(), DumpError> {
        writeln!(self.out, "{}", fields.join(",")).map_err(|source| DumpError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Append one report labelled `label`.
    ///
    /// Values go under the column of their metric name; metrics missing
    /// from the report leave empty cells.
    pub fn write_report(&mut self, label: &str, report: &CounterReport) -> Result<(), DumpError> {
        let mut fields = Vec::with_capacity(1 + self.metrics.len() * 2 + self.information);
        fields.push(escape_field(label));

        for (i, name) in self.metrics.iter().enumerate() {
            let metric = match report.values.get(i) {
                Some(m) if m.name == *name => Some(m),
                _ => report.get(name),
            };
            fields.push(
                metric
                    .map(|m| escape_field(&m.value.to_string()))
                    .unwrap_or_default(),
            );
            if self.include_max {
                fields.push(
                    metric
                        .and_then(|m| m.max.as_ref())
                        .map(|v| escape_field(&v.to_string()))
                        .unwrap_or_default(),
                );
            }
        }
        for i in 0..self.information {
            fields.push(
                report
                    .io_info
                    .get(i)
                    .map(|v| escape_field(&v.to_string()))
                    .unwrap_or_default(),
            );
        }

        self.write_line(&fields)?;
        self.rows += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), DumpError> {
        self.out.flush().map_err(|source| DumpError::Io {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data rows written so far (headers excluded)
    pub fn rows_written(&self) -> u64 {
        self.rows
    }
}

/// A dump file read back from disk
#[derive(Debug, Clone, PartialEq)]
pub struct DumpContents {
    /// Sampling mode recorded in the label column title
    pub mode: SamplingMode,

    /// Metric columns, in file order
    pub metrics: Vec<MetricDescriptor>,

    /// Information columns (stream dumps only)
    pub information: Vec<MetricDescriptor>,

    /// Labelled reports in file order
    pub rows: Vec<(String, CounterReport)>,
}

#[derive(Debug, Clone, Copy)]
enum Column {
    Metric(usize),
    Max(usize),
    Info,
}

/// Parse a dump file written by [`DumpWriter`]
pub fn read_dump(path: &Path) -> Result<DumpContents, DumpError> {
    let file = File::open(path).map_err(|source| DumpError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let malformed = |line: usize, reason: String| DumpError::Malformed {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        lines.push(line.map_err(|source| DumpError::Io {
            path: path.to_path_buf(),
            source,
        })?);
    }

    let names = lines
        .first()
        .map(|l| split_fields(l))
        .ok_or_else(|| malformed(1, "missing metric name row".to_string()))?;
    let units = lines
        .get(1)
        .map(|l| split_fields(l))
        .ok_or_else(|| malformed(2, "missing metric unit row".to_string()))?;
    if units.len() != names.len() {
        return Err(malformed(
            2,
            format!("{} units for {} columns", units.len(), names.len()),
        ));
    }

    let mode = match names[0].as_str() {
        "Operation" => SamplingMode::EventBased,
        "Sampling" => SamplingMode::TimeBased,
        other => return Err(malformed(1, format!("unknown label column {:?}", other))),
    };

    let mut metrics = Vec::new();
    let mut information = Vec::new();
    let mut columns = Vec::with_capacity(names.len() - 1);
    for (name, unit) in names.iter().zip(units.iter()).skip(1) {
        if let Some(info) = name.strip_prefix(IO_PREFIX) {
            columns.push(Column::Info);
            information.push(MetricDescriptor::new(info, unit.as_str()));
        } else if name.ends_with(MAX_SUFFIX)
            && metrics
                .last()
                .map(|m: &MetricDescriptor| format!("{}{}", m.name, MAX_SUFFIX) == *name)
                .unwrap_or(false)
        {
            columns.push(Column::Max(metrics.len() - 1));
        } else {
            columns.push(Column::Metric(metrics.len()));
            metrics.push(MetricDescriptor::new(name.as_str(), unit.as_str()));
        }
    }

    let mut rows = Vec::new();
    for (i, line) in lines.iter().enumerate().skip(2) {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_fields(line);
        if fields.len() != names.len() {
            return Err(malformed(
                i + 1,
                format!("{} fields, expected {}", fields.len(), names.len()),
            ));
        }

        let mut report = CounterReport::default();
        for (column, cell) in columns.iter().zip(fields.iter().skip(1)) {
            if cell.is_empty() {
                // Information values stay positional
                if let Column::Info = column {
                    report.io_info.push(TypedValue::Str(String::new()));
                }
                continue;
            }
            let value = TypedValue::parse_cell(cell);
            match *column {
                Column::Metric(m) => report
                    .values
                    .push(MetricValue::new(metrics[m].name.as_str(), value)),
                Column::Max(m) => {
                    if let Some(last) = report.values.last_mut() {
                        if last.name == metrics[m].name {
                            last.max = Some(value);
                        }
                    }
                }
                Column::Info => report.io_info.push(value),
            }
        }
        rows.push((fields[0].clone(), report));
    }

    Ok(DumpContents {
        mode,
        metrics,
        information,
        rows,
    })
}
