//! Utility functions and helpers

use anyhow::{Context, Result};

/// Parse an unsigned integer written in decimal or with a `0x` prefix
pub fn parse_int(s: &str) -> Result<u64> {
    let s = s.trim();

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).with_context(|| format!("Invalid hex value: {}", s))
    } else {
        s.parse::<u64>()
            .with_context(|| format!("Invalid integer value: {}", s))
    }
}

/// Parse a list of integers separated by commas and/or whitespace
pub fn parse_int_list(s: &str) -> Result<Vec<u64>> {
    s.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(parse_int)
        .collect()
}
