//! Per-operation metric aggregation
//!
//! Keeps a running sum/count (plus min/max) for every (operation, metric)
//! pair so averages are O(1) and memory does not grow with the number of
//! samples. Operations and metrics keep their insertion order; the summary
//! table aligns columns by position.

use mdlens_shared::CounterReport;
use std::collections::HashMap;

/// Running statistics of one metric under one operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationRecord {
    pub sum: f64,
    pub count: u64,
    pub min: f64,
    pub max: f64,
}

impl AggregationRecord {
    fn first(value: f64) -> Self {
        Self {
            sum: value,
            count: 1,
            min: value,
            max: value,
        }
    }

    fn observe(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Mean of the observed values; `None` before the first observation
    pub fn average(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.sum / self.count as f64)
    }
}

/// Insertion-ordered string-keyed map
#[derive(Debug, Clone)]
struct OrderedMap<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        match self.index.get(key) {
            Some(&i) => Some(&mut self.entries[i].1),
            None => None,
        }
    }

    fn insert(&mut self, key: &str, value: V) {
        self.index.insert(key.to_string(), self.entries.len());
        self.entries.push((key.to_string(), value));
    }

    fn get_or_insert_with(&mut self, key: &str, make: impl FnOnce() -> V) -> &mut V {
        let i = match self.index.get(key) {
            Some(&i) => i,
            None => {
                self.insert(key, make());
                self.entries.len() - 1
            }
        };
        &mut self.entries[i].1
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

/// Metrics aggregated under one operation name
#[derive(Debug, Clone, Default)]
pub struct OperationMetrics {
    metrics: OrderedMap<AggregationRecord>,
    reports: u64,
}

impl OperationMetrics {
    pub fn get(&self, metric: &str) -> Option<&AggregationRecord> {
        self.metrics.get(metric)
    }

    /// Metrics in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AggregationRecord)> {
        self.metrics.iter()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.len() == 0
    }

    /// Number of reports folded in
    pub fn calls(&self) -> u64 {
        self.reports
    }

    fn observe(&mut self, metric: &str, value: f64) {
        match self.metrics.get_mut(metric) {
            Some(record) => record.observe(value),
            None => self.metrics.insert(metric, AggregationRecord::first(value)),
        }
    }
}

/// Aggregated metrics for every operation seen this session
#[derive(Debug, Clone, Default)]
pub struct MetricAggregator {
    operations: OrderedMap<OperationMetrics>,
}

impl MetricAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold every numeric metric of `report` into `operation`'s records.
    ///
    /// Returns the number of values folded. String values are skipped.
    pub fn aggregate(&mut self, operation: &str, report: &CounterReport) -> usize {
        let metrics = self
            .operations
            .get_or_insert_with(operation, OperationMetrics::default);
        metrics.reports += 1;

        let mut folded = 0;
        for metric in &report.values {
            if let Some(value) = metric.value.as_f64() {
                metrics.observe(&metric.name, value);
                folded += 1;
            }
        }
        folded
    }

    /// Average of `metric` under `operation`, if anything was observed
    pub fn average(&self, operation: &str, metric: &str) -> Option<f64> {
        self.record(operation, metric)?.average()
    }

    pub fn record(&self, operation: &str, metric: &str) -> Option<&AggregationRecord> {
        self.operations.get(operation)?.get(metric)
    }

    pub fn operation(&self, operation: &str) -> Option<&OperationMetrics> {
        self.operations.get(operation)
    }

    /// Operations in first-aggregated order
    pub fn operations(&self) -> impl Iterator<Item = (&str, &OperationMetrics)> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.len() == 0
    }

    pub fn clear(&mut self) {
        self.operations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdlens_shared::{MetricValue, TypedValue};

    fn report(values: &[(&str, f32)]) -> CounterReport {
        CounterReport::new(
            values
                .iter()
                .map(|(name, v)| MetricValue::new(*name, TypedValue::F32(*v)))
                .collect(),
        )
    }

    #[test]
    fn test_average_of_three() {
        let mut agg = MetricAggregator::new();
        for v in [10.0, 20.0, 30.0] {
            agg.aggregate("kernelA", &report(&[("EuActive", v)]));
        }
        let record = agg.record("kernelA", "EuActive").unwrap();
        assert_eq!(record.count, 3);
        assert_eq!(record.min, 10.0);
        assert_eq!(record.max, 30.0);
        assert_eq!(agg.average("kernelA", "EuActive"), Some(20.0));
        // Re-reading without new data is stable
        assert_eq!(agg.average("kernelA", "EuActive"), Some(20.0));
    }

    #[test]
    fn test_interleaving_does_not_change_totals() {
        let mut split = MetricAggregator::new();
        split.aggregate("k", &report(&[("A", 1.0), ("B", 5.0)]));
        split.aggregate("k", &report(&[("A", 2.0), ("B", 6.0)]));
        split.aggregate("k", &report(&[("B", 7.0), ("A", 3.0)]));

        let mut single = MetricAggregator::new();
        for (a, b) in [(3.0, 7.0), (1.0, 5.0), (2.0, 6.0)] {
            single.aggregate("k", &report(&[("A", a), ("B", b)]));
        }

        for metric in ["A", "B"] {
            let lhs = split.record("k", metric).unwrap();
            let rhs = single.record("k", metric).unwrap();
            assert_eq!(lhs.sum, rhs.sum);
            assert_eq!(lhs.count, rhs.count);
        }
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut agg = MetricAggregator::new();
        agg.aggregate("zeta", &report(&[("Z", 1.0), ("A", 1.0), ("M", 1.0)]));
        agg.aggregate("alpha", &report(&[("Z", 2.0), ("A", 2.0), ("M", 2.0)]));

        let ops: Vec<&str> = agg.operations().map(|(name, _)| name).collect();
        assert_eq!(ops, vec!["zeta", "alpha"]);

        let metrics: Vec<&str> = agg
            .operation("alpha")
            .unwrap()
            .iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(metrics, vec!["Z", "A", "M"]);
    }

    #[test]
    fn test_strings_are_not_folded() {
        let mut agg = MetricAggregator::new();
        let mixed = CounterReport::new(vec![
            MetricValue::new("GpuTime", TypedValue::U64(100)),
            MetricValue::new("Arch", TypedValue::Str("gen12".to_string())),
        ]);
        assert_eq!(agg.aggregate("k", &mixed), 1);
        assert!(agg.record("k", "Arch").is_none());
        assert_eq!(agg.operation("k").unwrap().calls(), 1);
    }

    #[test]
    fn test_calls_count_reports_with_missing_metrics() {
        let mut agg = MetricAggregator::new();
        agg.aggregate("k", &report(&[("A", 1.0), ("B", 2.0)]));
        agg.aggregate("k", &report(&[("B", 4.0)]));

        let op = agg.operation("k").unwrap();
        assert_eq!(op.calls(), 2);
        assert_eq!(op.get("A").unwrap().count, 1);
        assert_eq!(agg.average("k", "B"), Some(3.0));
    }

    #[test]
    fn test_unknown_lookups() {
        let agg = MetricAggregator::new();
        assert!(agg.is_empty());
        assert_eq!(agg.average("k", "m"), None);
        assert!(agg.operation("k").is_none());
    }

    #[test]
    fn test_clear() {
        let mut agg = MetricAggregator::new();
        agg.aggregate("k", &report(&[("A", 1.0)]));
        assert_eq!(agg.len(), 1);
        agg.clear();
        assert!(agg.is_empty());
        agg.aggregate("k", &report(&[("A", 4.0)]));
        assert_eq!(agg.average("k", "A"), Some(4.0));
    }
}
