//! `logsift check` command handler

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use logsift_core::config::LogsiftConfig;
use logsift_log_pipeline::{InputFile, LogJob};

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `check` command.
///
/// Compiles every matcher, chain and output, then lists the input files the
/// run would process. No input file is read.
pub async fn execute(config: LogsiftConfig, writer: &OutputWriter) -> Result<(), CliError> {
    let job = Arc::new(LogJob::compile(Arc::new(config.clone()))?);
    let inputs = {
        let job = Arc::clone(&job);
        tokio::task::spawn_blocking(move || job.discover())
            .await
            .map_err(|e| CliError::Config(format!("input discovery failed: {e}")))??
    };
    info!(files = inputs.len(), "configuration check passed");

    writer.render(&CheckReport::new(&config, &job, &inputs))
}

/// Summary of a compiled configuration.
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub entry_chain: String,
    pub chains: usize,
    pub cache_dir: Option<String>,
    pub output_dir: String,
    pub inputs: Vec<InputEntry>,
}

/// One discovered input file.
#[derive(Debug, Serialize)]
pub struct InputEntry {
    pub path: String,
    pub node: String,
    pub rule: usize,
}

impl CheckReport {
    fn new(config: &LogsiftConfig, job: &LogJob, inputs: &[InputFile]) -> Self {
        Self {
            entry_chain: config.general.entry_chain.clone(),
            chains: job.chains().len(),
            cache_dir: config.cache.enabled.then(|| config.cache.dir.clone()),
            output_dir: job.layout().directory().display().to_string(),
            inputs: inputs
                .iter()
                .map(|f| InputEntry {
                    path: f.path.display().to_string(),
                    node: f.node.clone(),
                    rule: f.rule,
                })
                .collect(),
        }
    }
}

impl Render for CheckReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "configuration OK")?;
        writeln!(w, "  entry chain: {} ({} chains)", self.entry_chain, self.chains)?;
        match &self.cache_dir {
            Some(dir) => writeln!(w, "  cache: {dir}")?,
            None => writeln!(w, "  cache: disabled")?,
        }
        writeln!(w, "  outputs: {}", self.output_dir)?;
        writeln!(w, "  input files: {}", self.inputs.len())?;
        for input in &self.inputs {
            writeln!(w, "    {:<12} {} (rule {})", input.node, input.path, input.rule)?;
        }
        Ok(())
    }
}
