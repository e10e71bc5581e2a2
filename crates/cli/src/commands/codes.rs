use std::process;

use measure_core::DiagnosticCode;
use serde_json::{json, Value};

use crate::{exit, report_error, Options, OutputFormat};

fn describe(code: DiagnosticCode) -> Value {
    json!({
        "code": code.code(),
        "kind": code.kind(),
        "name": code.name(),
        "severity": code.default_severity(),
        "template": code.template(),
    })
}

pub(crate) fn cmd_codes(code: Option<&str>, options: &Options) {
    let selected: Vec<DiagnosticCode> = match code {
        Some(text) => match DiagnosticCode::from_code(text) {
            Some(code) => vec![code],
            None => {
                report_error(
                    &format!("unknown diagnostic code '{}'", text),
                    options.output,
                    options.quiet,
                );
                process::exit(exit::USAGE);
            }
        },
        None => DiagnosticCode::ALL.to_vec(),
    };

    match options.output {
        OutputFormat::Json => {
            let list: Vec<Value> = selected.iter().copied().map(describe).collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&list).unwrap_or_default()
            );
        }
        OutputFormat::Text => {
            for code in selected {
                println!(
                    "{}  {:<7}  {:<32}  {}",
                    code.code(),
                    code.default_severity().to_string(),
                    code.name(),
                    code.template()
                );
            }
        }
    }
}
