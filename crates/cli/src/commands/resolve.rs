use std::path::{Path, PathBuf};
use std::process;

use measure_core::{resolve_batch_with, serialize, Cancellation};

use crate::report::{self, Tally};
use crate::{exit, report_error, Options, OutputFormat};

pub(crate) fn cmd_resolve(inputs: &[PathBuf], out: Option<&Path>, options: &Options) {
    let (batch, config) = super::load_inputs(inputs, options);

    let mut diagnostics = Vec::new();
    let resolved = resolve_batch_with(&batch, &config, &Cancellation::new(), &mut diagnostics);
    let tally = Tally::of(&diagnostics);

    let model = match serialize(&resolved) {
        Ok(model) => model,
        Err(e) => {
            report_error(
                &format!("serialization error: {}", e),
                options.output,
                options.quiet,
            );
            process::exit(exit::DIAGNOSTICS);
        }
    };

    let document = match options.output {
        OutputFormat::Json => serde_json::json!({
            "diagnostics": report::to_json(&diagnostics),
            "model": model,
            "summary": tally.to_json(),
        }),
        OutputFormat::Text => {
            report::print_text(&diagnostics, options.quiet);
            model
        }
    };
    let pretty = serde_json::to_string_pretty(&document)
        .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));

    match out {
        Some(path) => {
            if let Err(e) = std::fs::write(path, format!("{}\n", pretty)) {
                let msg = format!("error writing '{}': {}", path.display(), e);
                report_error(&msg, options.output, options.quiet);
                process::exit(exit::LOAD);
            }
            if !options.quiet && options.output == OutputFormat::Text {
                eprintln!(
                    "wrote {} ({}) to {}",
                    report::plural(resolved.len(), "type"),
                    report::plural(tally.errors, "error"),
                    path.display()
                );
            }
        }
        None => println!("{}", pretty),
    }

    if tally.errors > 0 {
        process::exit(exit::DIAGNOSTICS);
    }
}
