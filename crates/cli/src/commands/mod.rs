pub(crate) mod check;
pub(crate) mod codes;
pub(crate) mod resolve;
pub(crate) mod validate;

use std::path::PathBuf;
use std::process;

use measure_core::{load_batch, RawBatch, ResolutionConfig};

use crate::{exit, report_error, Options, OutputFormat};

/// Read the configuration and every batch fragment. Exits with
/// [`exit::LOAD`] when either cannot be read.
pub(crate) fn load_inputs(inputs: &[PathBuf], options: &Options) -> (RawBatch, ResolutionConfig) {
    let config = match &options.config {
        Some(path) => match ResolutionConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                report_error(&e.to_string(), options.output, options.quiet);
                process::exit(exit::LOAD);
            }
        },
        None => ResolutionConfig::default(),
    };

    let batch = match load_batch(inputs) {
        Ok(batch) => batch,
        Err(e) => {
            match options.output {
                OutputFormat::Json => {
                    let err_json = serde_json::to_string_pretty(&e.to_json_value())
                        .unwrap_or_else(|_| format!("{{\"error\": \"{}\"}}", e));
                    eprintln!("{}", err_json);
                }
                OutputFormat::Text => {
                    if !options.quiet {
                        eprintln!("error: {}", e);
                    }
                }
            }
            process::exit(exit::LOAD);
        }
    };

    tracing::debug!(records = batch.len(), "inputs loaded");
    (batch, config)
}
