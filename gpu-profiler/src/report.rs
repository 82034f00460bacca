//! Per-operation summary table

use crate::aggregate::MetricAggregator;
use crate::config::EngineConfig;
use std::fmt::Write;

/// Width of the right-aligned operation-name column
pub const NAME_WIDTH: usize = 44;

/// Width of the right-aligned call-count column
pub const CALLS_WIDTH: usize = 6;

const TITLE: &str = "Device Performance Counter Timing: (Average metric per enqueue)";

/// Render the summary if the configuration asks for it and anything was aggregated
pub fn render(aggregator: &MetricAggregator, config: &EngineConfig) -> Option<String> {
    if !config.reports_summary() {
        return None;
    }
    format_table(aggregator)
}

/// Format the aggregator as an aligned table, one row per operation.
///
/// Columns are the metric names in first-seen order across all operations;
/// each column is as wide as its name. Cells are looked up by name, so an
/// operation without a metric gets an empty cell. Returns `None` when
/// nothing was aggregated.
pub fn format_table(aggregator: &MetricAggregator) -> Option<String> {
    aggregator.operations().next()?;

    let mut columns: Vec<&str> = Vec::new();
    for (_, metrics) in aggregator.operations() {
        for (metric, _) in metrics.iter() {
            if !columns.contains(&metric) {
                columns.push(metric);
            }
        }
    }

    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", TITLE);
    let _ = write!(
        out,
        "{:>name$}, {:>calls$}, ",
        "FunctionName",
        "Calls",
        name = NAME_WIDTH,
        calls = CALLS_WIDTH
    );
    for column in &columns {
        let _ = write!(out, "{}, ", column);
    }

    for (operation, metrics) in aggregator.operations() {
        let _ = write!(
            out,
            "\n{:>name$}, {:>calls$}, ",
            operation,
            metrics.calls(),
            name = NAME_WIDTH,
            calls = CALLS_WIDTH
        );
        for column in &columns {
            let average = metrics
                .get(column)
                .and_then(|record| record.average())
                .map(format_average)
                .unwrap_or_default();
            let _ = write!(out, "{:>width$}, ", average, width = column.len());
        }
    }
    out.push('\n');
    Some(out)
}

/// Whole numbers print without a fraction, others with up to three decimals
fn format_average(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let text = format!("{:.3}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdlens_shared::{CounterReport, MetricValue, SamplingMode, TypedValue};

    fn report(values: &[(&str, u32)]) -> CounterReport {
        CounterReport::new(
            values
                .iter()
                .map(|(name, v)| MetricValue::new(*name, TypedValue::U32(*v)))
                .collect(),
        )
    }

    #[test]
    fn test_empty_aggregator_renders_nothing() {
        let agg = MetricAggregator::new();
        assert!(format_table(&agg).is_none());
        assert!(render(&agg, &EngineConfig::default()).is_none());
    }

    #[test]
    fn test_table_layout() {
        let mut agg = MetricAggregator::new();
        for v in [10, 20, 30] {
            agg.aggregate("kernelA", &report(&[("GpuTime", v), ("EuActive", 50)]));
        }
        agg.aggregate("kernelB", &report(&[("GpuTime", 7), ("EuActive", 5)]));

        let text = format_table(&agg).unwrap();
        let lines: Vec<&str> = text.split('\n').collect();

        assert_eq!(lines[0], "");
        assert_eq!(lines[1], TITLE);
        assert_eq!(
            lines[2],
            "                                FunctionName,  Calls, GpuTime, EuActive, "
        );
        assert_eq!(
            lines[3],
            format!("{:>44}, {:>6}, {:>7}, {:>8}, ", "kernelA", 3, "20", "50")
        );
        assert_eq!(
            lines[4],
            format!("{:>44}, {:>6}, {:>7}, {:>8}, ", "kernelB", 1, "7", "5")
        );
        assert_eq!(lines[5], "");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_rows_align_with_header() {
        let mut agg = MetricAggregator::new();
        agg.aggregate("kernelA", &report(&[("GpuTime", 1), ("EuActive", 2)]));
        agg.aggregate("kernelB", &report(&[("GpuTime", 3), ("EuActive", 4)]));

        let text = format_table(&agg).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[2].len(), lines[3].len());
        assert_eq!(lines[3].len(), lines[4].len());
    }

    #[test]
    fn test_missing_metric_keeps_columns_aligned() {
        let mut agg = MetricAggregator::new();
        agg.aggregate(
            "kernelA",
            &report(&[("GpuTime", 100), ("EuActive", 50), ("EuStall", 5)]),
        );
        agg.aggregate("kernelB", &report(&[("GpuTime", 40), ("EuStall", 9)]));
        agg.aggregate("kernelC", &report(&[("GpuTime", 1), ("Extra", 2)]));

        let text = format_table(&agg).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[2],
            format!(
                "{:>44}, {:>6}, GpuTime, EuActive, EuStall, Extra, ",
                "FunctionName", "Calls"
            )
        );
        assert_eq!(
            lines[4],
            format!(
                "{:>44}, {:>6}, {:>7}, {:>8}, {:>7}, {:>5}, ",
                "kernelB", 1, "40", "", "9", ""
            )
        );
        assert_eq!(
            lines[5],
            format!(
                "{:>44}, {:>6}, {:>7}, {:>8}, {:>7}, {:>5}, ",
                "kernelC", 1, "1", "", "", "2"
            )
        );
        assert_eq!(lines[2].len(), lines[4].len());
    }

    #[test]
    fn test_fractional_averages() {
        assert_eq!(format_average(20.0), "20");
        assert_eq!(format_average(2.5), "2.5");
        assert_eq!(format_average(1.0 / 3.0), "0.333");
        assert_eq!(format_average(-4.0), "-4");
    }

    #[test]
    fn test_render_respects_configuration() {
        let mut agg = MetricAggregator::new();
        agg.aggregate("kernelA", &report(&[("GpuTime", 1)]));

        assert!(render(&agg, &EngineConfig::default()).is_some());

        let quiet = EngineConfig {
            report_timing: false,
            ..EngineConfig::default()
        };
        assert!(render(&agg, &quiet).is_none());

        let streaming = EngineConfig {
            sampling: SamplingMode::TimeBased,
            ..EngineConfig::default()
        };
        assert!(render(&agg, &streaming).is_none());
    }
}
