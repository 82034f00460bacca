//! Translate command implementation

use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use mdlens_gpu::queue_props::{
    translate_queue_properties, QueuePropertyBits, CL_QUEUE_OUT_OF_ORDER_EXEC_MODE_ENABLE,
    CL_QUEUE_PROFILING_ENABLE,
};
use mdlens_shared::utils::parse_int_list;

#[derive(Args, Debug)]
pub struct TranslateArgs {
    /// Property list as key/value integers, decimal or 0x-prefixed
    /// (e.g. `0x1093 0x2 0`). An empty list means no properties.
    pub properties: Vec<String>,
}

pub fn run(args: TranslateArgs) -> Result<()> {
    let bits = translate(&args.properties)?;
    output::success(&format!("Queue properties: {:#x} ({})", bits, describe(bits)));
    Ok(())
}

fn translate(values: &[String]) -> Result<QueuePropertyBits> {
    let list = parse_int_list(&values.join(" ")).context("Invalid property list")?;
    let properties = (!list.is_empty()).then_some(list.as_slice());
    translate_queue_properties(properties).context("Queue properties rejected")
}

/// Flag names set in `bits`
fn describe(bits: QueuePropertyBits) -> String {
    let mut flags = Vec::new();
    if bits & CL_QUEUE_OUT_OF_ORDER_EXEC_MODE_ENABLE != 0 {
        flags.push("OUT_OF_ORDER_EXEC_MODE_ENABLE");
    }
    if bits & CL_QUEUE_PROFILING_ENABLE != 0 {
        flags.push("PROFILING_ENABLE");
    }
    if flags.is_empty() {
        return "none".to_string();
    }
    flags.join(" | ")
}
