//! Report command implementation

use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use mdlens_gpu::report::format_table;
use mdlens_gpu::{read_dump, DumpContents, MetricAggregator};
use mdlens_shared::SamplingMode;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Metric dump written by the counter engine
    pub dump: PathBuf,

    /// Print the aggregates as JSON instead of the table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct MetricSummary<'a> {
    metric: &'a str,
    average: f64,
    min: f64,
    max: f64,
}

#[derive(Debug, Serialize)]
struct OperationSummary<'a> {
    operation: &'a str,
    calls: u64,
    metrics: Vec<MetricSummary<'a>>,
}

pub fn run(args: ReportArgs) -> Result<()> {
    let dump = read_dump(&args.dump)
        .with_context(|| format!("Failed to read dump {}", args.dump.display()))?;
    output::info(&format!(
        "Read {} rows ({} metrics) from {}",
        dump.rows.len(),
        dump.metrics.len(),
        args.dump.display()
    ));
    if dump.mode == SamplingMode::TimeBased {
        output::warning("Time-based dump: all samples are grouped under the sampling tag");
    }

    let aggregator = aggregate_dump(&dump);
    debug!(
        "Aggregated {} operations from a {} dump",
        aggregator.len(),
        dump.mode
    );
    if args.json {
        let text = serde_json::to_string_pretty(&summaries(&aggregator))
            .context("Failed to serialize summary")?;
        println!("{}", text);
        return Ok(());
    }

    match format_table(&aggregator) {
        Some(table) => print!("{}", table),
        None => output::warning("Dump contains no counter rows"),
    }
    Ok(())
}

/// Fold every row of a dump into a fresh aggregator
fn aggregate_dump(dump: &DumpContents) -> MetricAggregator {
    let mut aggregator = MetricAggregator::new();
    for (label, report) in &dump.rows {
        aggregator.aggregate(label, report);
    }
    aggregator
}

fn summaries(aggregator: &MetricAggregator) -> Vec<OperationSummary<'_>> {
    aggregator
        .operations()
        .map(|(operation, metrics)| OperationSummary {
            operation,
            calls: metrics.calls(),
            metrics: metrics
                .iter()
                .filter_map(|(metric, record)| {
                    Some(MetricSummary {
                        metric,
                        average: record.average()?,
                        min: record.min,
                        max: record.max,
                    })
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdlens_gpu::DumpWriter;
    use mdlens_shared::{CounterReport, MetricDescriptor, MetricValue, TypedValue};

    fn write_dump(path: &std::path::Path) -> Result<()> {
        let metrics = vec![
            MetricDescriptor::new("GpuTime", "ns"),
            MetricDescriptor::new("EuActive", "percent"),
        ];
        let mut writer = DumpWriter::create(path, SamplingMode::EventBased, &metrics, &[], false)?;
        for (label, time, active) in [("kernelA", 10, 40), ("kernelA", 30, 60), ("kernelB", 5, 1)] {
            writer.write_report(
                label,
                &CounterReport::new(vec![
                    MetricValue::new("GpuTime", TypedValue::U32(time)),
                    MetricValue::new("EuActive", TypedValue::U32(active)),
                ]),
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    #[test]
    fn test_aggregate_dump() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("perfcounters_ComputeBasic.csv");
        write_dump(&path)?;

        let aggregator = aggregate_dump(&read_dump(&path)?);
        assert_eq!(aggregator.average("kernelA", "GpuTime"), Some(20.0));
        assert_eq!(aggregator.average("kernelB", "EuActive"), Some(1.0));

        let table = format_table(&aggregator).unwrap();
        assert!(table.contains("GpuTime, EuActive, "));
        Ok(())
    }

    #[test]
    fn test_json_summary() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("perfcounters_ComputeBasic.csv");
        write_dump(&path)?;

        let aggregator = aggregate_dump(&read_dump(&path)?);
        let json = serde_json::to_value(summaries(&aggregator))?;
        assert_eq!(json[0]["operation"], "kernelA");
        assert_eq!(json[0]["calls"], 2);
        assert_eq!(json[0]["metrics"][0]["metric"], "GpuTime");
        assert_eq!(json[0]["metrics"][0]["average"], 20.0);
        assert_eq!(json[0]["metrics"][0]["min"], 10.0);
        assert_eq!(json[0]["metrics"][0]["max"], 30.0);
        assert_eq!(json[1]["operation"], "kernelB");
        Ok(())
    }

    #[test]
    fn test_missing_dump_fails() {
        let args = ReportArgs {
            dump: PathBuf::from("/nonexistent/perfcounters_ComputeBasic.csv"),
            json: false,
        };
        assert!(run(args).is_err());
    }
}
