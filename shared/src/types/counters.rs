//! Counter data model
//!
//! These types represent what a counter-collection driver hands back once a
//! raw hardware report has been decoded: the descriptors of the active metric
//! set and the typed values of one report.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name and unit of one metric in the active metric set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricDescriptor {
    /// Symbol name, unique within a metric set
    pub name: String,

    /// Unit label (may be empty)
    pub unit: String,
}

impl MetricDescriptor {
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
        }
    }
}

/// A decoded counter value of one of the driver's numeric kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TypedValue {
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Str(String),
}

impl TypedValue {
    /// Numeric view of the value. Strings have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TypedValue::U32(v) => Some(f64::from(*v)),
            TypedValue::U64(v) => Some(*v as f64),
            TypedValue::F32(v) => Some(f64::from(*v)),
            TypedValue::F64(v) => Some(*v),
            TypedValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            TypedValue::Str(_) => None,
        }
    }

    /// Parse a dump cell back into a value. Integers stay integral; a
    /// fraction is `F32` only when `f32` reproduces the cell exactly.
    pub fn parse_cell(cell: &str) -> Self {
        let cell = cell.trim();
        if let Ok(v) = cell.parse::<u64>() {
            return match u32::try_from(v) {
                Ok(small) => TypedValue::U32(small),
                Err(_) => TypedValue::U64(v),
            };
        }
        if let Ok(v) = cell.parse::<f64>() {
            let narrow = v as f32;
            if narrow.to_string() == cell {
                return TypedValue::F32(narrow);
            }
            return TypedValue::F64(v);
        }
        match cell {
            "true" => TypedValue::Bool(true),
            "false" => TypedValue::Bool(false),
            other => TypedValue::Str(other.to_string()),
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::U32(v) => write!(f, "{}", v),
            TypedValue::U64(v) => write!(f, "{}", v),
            TypedValue::F32(v) => write!(f, "{}", v),
            TypedValue::F64(v) => write!(f, "{}", v),
            TypedValue::Bool(v) => write!(f, "{}", v),
            TypedValue::Str(v) => write!(f, "{}", v),
        }
    }
}

/// One metric of a decoded report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    /// Metric symbol name (matches a `MetricDescriptor::name`)
    pub name: String,

    /// Observed value
    pub value: TypedValue,

    /// Theoretical maximum, for metrics that report one
    #[serde(default)]
    pub max: Option<TypedValue>,
}

impl MetricValue {
    pub fn new(name: impl Into<String>, value: TypedValue) -> Self {
        Self {
            name: name.into(),
            value,
            max: None,
        }
    }

    pub fn with_max(mut self, max: TypedValue) -> Self {
        self.max = Some(max);
        self
    }
}

/// A decoded counter report, in metric-set order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterReport {
    /// Metric values in activation order
    pub values: Vec<MetricValue>,

    /// I/O measurement values, unrelated to the metric set
    #[serde(default)]
    pub io_info: Vec<TypedValue>,
}

impl CounterReport {
    pub fn new(values: Vec<MetricValue>) -> Self {
        Self {
            values,
            io_info: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Look up a metric by name
    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.values.iter().find(|m| m.name == name)
    }
}
