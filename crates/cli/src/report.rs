//! Diagnostic rendering shared by the resolving commands.

use measure_core::{Diagnostic, Severity};
use serde_json::{json, Value};

/// Diagnostic counts per severity.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Tally {
    pub errors: usize,
    pub warnings: usize,
    pub notes: usize,
}

impl Tally {
    pub fn of(diagnostics: &[Diagnostic]) -> Tally {
        let mut tally = Tally::default();
        for d in diagnostics {
            match d.severity {
                Severity::Error => tally.errors += 1,
                Severity::Warning => tally.warnings += 1,
                Severity::Note => tally.notes += 1,
            }
        }
        tally
    }

    pub fn to_json(self) -> Value {
        json!({
            "errors": self.errors,
            "notes": self.notes,
            "warnings": self.warnings,
        })
    }
}

/// One line per diagnostic on stderr. `--quiet` keeps errors only.
pub(crate) fn print_text(diagnostics: &[Diagnostic], quiet: bool) {
    for d in diagnostics {
        if quiet && !d.is_error() {
            continue;
        }
        eprintln!("{}", d);
    }
}

pub(crate) fn to_json(diagnostics: &[Diagnostic]) -> Value {
    Value::Array(diagnostics.iter().map(Diagnostic::to_json_value).collect())
}

pub(crate) fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}
