//! Sampling discipline selection

use serde::{Deserialize, Serialize};
use std::fmt;

/// How counter data is collected for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplingMode {
    /// One report per completed unit of work, read from its profiling record
    EventBased,

    /// Continuous timer-driven snapshots drained from a stream
    TimeBased,
}

impl SamplingMode {
    /// Short tag used in logs and as the label of continuous dump rows
    pub fn tag(self) -> &'static str {
        match self {
            SamplingMode::EventBased => "EBS",
            SamplingMode::TimeBased => "TBS",
        }
    }
}

impl Default for SamplingMode {
    fn default() -> Self {
        SamplingMode::EventBased
    }
}

impl fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingMode::EventBased => write!(f, "event-based"),
            SamplingMode::TimeBased => write!(f, "time-based"),
        }
    }
}

impl std::str::FromStr for SamplingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "event-based" | "event" | "ebs" => Ok(SamplingMode::EventBased),
            "time-based" | "time" | "tbs" => Ok(SamplingMode::TimeBased),
            _ => anyhow::bail!("Invalid sampling mode: {}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sampling_mode() {
        assert_eq!("ebs".parse::<SamplingMode>().unwrap(), SamplingMode::EventBased);
        assert_eq!("Time-Based".parse::<SamplingMode>().unwrap(), SamplingMode::TimeBased);
        assert!("both".parse::<SamplingMode>().is_err());
    }

    #[test]
    fn test_tags() {
        assert_eq!(SamplingMode::TimeBased.tag(), "TBS");
        assert_eq!(SamplingMode::EventBased.tag(), "EBS");
        assert_eq!(SamplingMode::default(), SamplingMode::EventBased);
    }
}
