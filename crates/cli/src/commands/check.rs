use std::path::PathBuf;
use std::process;

use measure_core::{resolve_batch_with, Cancellation};

use crate::report::{self, Tally};
use crate::{exit, Options, OutputFormat};

pub(crate) fn cmd_check(inputs: &[PathBuf], deny_warnings: bool, options: &Options) {
    let (batch, config) = super::load_inputs(inputs, options);

    let mut diagnostics = Vec::new();
    let resolved = resolve_batch_with(&batch, &config, &Cancellation::new(), &mut diagnostics);
    let tally = Tally::of(&diagnostics);

    match options.output {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "diagnostics": report::to_json(&diagnostics),
                "summary": tally.to_json(),
                "types": {
                    "units": resolved.units.len(),
                    "scalars": resolved.scalars.len(),
                    "vectors": resolved.vectors.len(),
                    "vector_groups": resolved.vector_groups.len(),
                },
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&json)
                    .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e))
            );
        }
        OutputFormat::Text => {
            report::print_text(&diagnostics, options.quiet);
            if !options.quiet {
                println!(
                    "{} resolved: {}, {}",
                    report::plural(resolved.len(), "type"),
                    report::plural(tally.errors, "error"),
                    report::plural(tally.warnings, "warning")
                );
            }
        }
    }

    if tally.errors > 0 || (deny_warnings && tally.warnings > 0) {
        process::exit(exit::DIAGNOSTICS);
    }
}
