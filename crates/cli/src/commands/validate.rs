use std::path::PathBuf;
use std::process;

use crate::{exit, report_error, Options, OutputFormat};

static BATCH_SCHEMA_STR: &str = include_str!("../../../../schema/batch-schema.json");

pub(crate) fn cmd_validate(fragments: &[PathBuf], options: &Options) {
    let output = options.output;
    let quiet = options.quiet;

    let schema: serde_json::Value = match serde_json::from_str(BATCH_SCHEMA_STR) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("internal error: failed to parse embedded batch schema: {}", e);
            report_error(&msg, output, quiet);
            process::exit(exit::LOAD);
        }
    };
    let validator = match jsonschema::validator_for(&schema) {
        Ok(v) => v,
        Err(e) => {
            let msg = format!("internal error: failed to compile batch schema: {}", e);
            report_error(&msg, output, quiet);
            process::exit(exit::LOAD);
        }
    };

    let mut results = Vec::with_capacity(fragments.len());
    for path in fragments {
        let doc_str = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                let msg = format!("error reading file '{}': {}", path.display(), e);
                report_error(&msg, output, quiet);
                process::exit(exit::LOAD);
            }
        };
        let doc: serde_json::Value = match serde_json::from_str(&doc_str) {
            Ok(v) => v,
            Err(e) => {
                let msg = format!("error parsing JSON in '{}': {}", path.display(), e);
                report_error(&msg, output, quiet);
                process::exit(exit::LOAD);
            }
        };
        let errors: Vec<String> = validator
            .iter_errors(&doc)
            .map(|e| format!("{}", e))
            .collect();
        results.push((path, errors));
    }

    let invalid = results.iter().filter(|(_, errors)| !errors.is_empty()).count();

    match output {
        OutputFormat::Text => {
            if !quiet {
                for (path, errors) in &results {
                    if errors.is_empty() {
                        println!("{}: valid", path.display());
                    } else {
                        eprintln!("{}: invalid", path.display());
                        for err in errors {
                            eprintln!("  - {}", err);
                        }
                    }
                }
            }
        }
        OutputFormat::Json => {
            let list: Vec<serde_json::Value> = results
                .iter()
                .map(|(path, errors)| {
                    serde_json::json!({
                        "errors": errors,
                        "file": path.display().to_string(),
                        "valid": errors.is_empty(),
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&list).unwrap_or_default()
            );
        }
    }

    if invalid > 0 {
        process::exit(exit::DIAGNOSTICS);
    }
}
