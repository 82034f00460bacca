//! Config command implementation

use anyhow::{Context, Result};
use clap::Args;
use mdlens_gpu::EngineConfig;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// TOML configuration file; `MDLENS_*` environment variables override it
    #[arg(short, long, env = "MDLENS_CONFIG")]
    pub file: Option<PathBuf>,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    print!("{}", render(args.file.as_deref())?);
    Ok(())
}

fn render(file: Option<&std::path::Path>) -> Result<String> {
    let config = EngineConfig::load(file)?;
    toml::to_string_pretty(&config).context("Failed to render configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_render_file() -> Result<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(file, "metric_set = \"RenderBasic\"\nreport_timing = false")?;

        let text = render(Some(file.path()))?;
        let back: EngineConfig = toml::from_str(&text)?;
        assert_eq!(back.metric_set, "RenderBasic");
        assert!(!back.report_timing);
        Ok(())
    }

    #[test]
    fn test_invalid_file_rejected() -> Result<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(file, "metric_set = \"\"")?;
        assert!(render(Some(file.path())).is_err());
        Ok(())
    }
}
