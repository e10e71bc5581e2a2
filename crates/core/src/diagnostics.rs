//! Diagnostics: located, coded findings produced by every pass.
//!
//! A [`Diagnostic`] is a value, never a control-flow exit. Passes hand them
//! to a [`DiagnosticSink`] (or carry them inside an [`Outcome`]) and keep
//! going; whether a diagnostic fails the overall build is the caller's
//! decision. The engine only decides whether the *owning item* survives.
//!
//! Every [`DiagnosticCode`] has a stable `QM####` code, belongs to exactly
//! one [`DiagnosticKind`] of the error taxonomy, and carries a default
//! severity and message template. Templates use positional `{N}`
//! placeholders filled from [`Diagnostic::args`].

use crate::ast::Provenance;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Note => write!(f, "note"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Error taxonomy. Each code maps to exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticKind {
    MissingRequiredField,
    NullOrEmptyValue,
    UnrecognizedEnumValue,
    ContradictoryFields,
    DuplicateDefinition,
    DuplicateName,
    UnresolvedReference,
    CyclicDependency,
    ContradictoryInclusionExclusion,
    DimensionOrCategoryMismatch,
    RedundantDeclaration,
    MalformedValue,
}

macro_rules! diagnostic_codes {
    ($( $variant:ident => ($code:literal, $kind:ident, $severity:ident, $template:literal), )*) => {
        /// Stable diagnostic codes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum DiagnosticCode {
            $( $variant, )*
        }

        impl DiagnosticCode {
            /// Every code, in code order.
            pub const ALL: &'static [DiagnosticCode] = &[ $( DiagnosticCode::$variant, )* ];

            /// The stable `QM####` code.
            pub fn code(self) -> &'static str {
                match self {
                    $( DiagnosticCode::$variant => $code, )*
                }
            }

            pub fn kind(self) -> DiagnosticKind {
                match self {
                    $( DiagnosticCode::$variant => DiagnosticKind::$kind, )*
                }
            }

            pub fn default_severity(self) -> Severity {
                match self {
                    $( DiagnosticCode::$variant => Severity::$severity, )*
                }
            }

            /// Message template with positional `{N}` placeholders.
            pub fn template(self) -> &'static str {
                match self {
                    $( DiagnosticCode::$variant => $template, )*
                }
            }

            /// Look a code up by its `QM####` form or its variant name.
            pub fn from_code(text: &str) -> Option<DiagnosticCode> {
                match text {
                    $( $code | stringify!($variant) => Some(DiagnosticCode::$variant), )*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $( DiagnosticCode::$variant => stringify!($variant), )*
                }
            }
        }
    };
}

diagnostic_codes! {
    // ── Pass 1: per-type processing ──────────────────────────────────
    MissingField => ("QM0101", MissingRequiredField, Error,
        "{0} '{1}' is missing required field '{2}'"),
    NullField => ("QM0102", NullOrEmptyValue, Error,
        "{0} '{1}': field '{2}' is explicitly null"),
    EmptyField => ("QM0103", NullOrEmptyValue, Error,
        "{0} '{1}': field '{2}' is empty"),
    UnrecognizedValue => ("QM0104", UnrecognizedEnumValue, Error,
        "{0} '{1}': '{3}' is not a recognized value for field '{2}' (expected one of: {4})"),
    ValueOutOfRange => ("QM0105", UnrecognizedEnumValue, Error,
        "{0} '{1}': value {3} of field '{2}' is out of range ({4})"),
    ContradictoryInclusionExclusion => ("QM0106", ContradictoryInclusionExclusion, Error,
        "{0} '{1}' declares both included and excluded unit instances"),
    ContradictoryFields => ("QM0107", ContradictoryFields, Error,
        "{0} '{1}': field '{2}' cannot be combined with '{3}'"),
    InapplicableField => ("QM0108", ContradictoryFields, Error,
        "{0} '{1}': field '{2}' does not apply to a {3}"),
    MalformedField => ("QM0109", MalformedValue, Error,
        "{0} '{1}': field '{2}' is malformed ({3})"),
    MalformedRecord => ("QM0110", MalformedValue, Error,
        "{0} at position {1} of '{2}' could not be read and is ignored ({3})"),
    ConstantShapeMismatch => ("QM0111", DimensionOrCategoryMismatch, Error,
        "{0} '{1}': constant '{2}' needs {3}"),
    UnmatchedProcessParameters => ("QM0112", ContradictoryFields, Error,
        "'{0}': process '{1}' declares {2} parameter types but {3} parameter names"),
    DuplicateProcessParameterName => ("QM0113", DuplicateName, Error,
        "'{0}': process '{1}' already defines a parameter '{2}'"),
    ProcessPropertyWithParameters => ("QM0114", ContradictoryFields, Warning,
        "'{0}': process '{1}' takes parameters and is implemented as a method, not a property"),
    MalformedDerivationExpression => ("QM0115", MalformedValue, Error,
        "'{0}': derivation expression '{1}' is malformed ({2})"),
    MirrorNotSupported => ("QM0116", RedundantDeclaration, Warning,
        "'{0}': {1} operation with '{2}' cannot be mirrored; mirroring is ignored"),

    // ── Pass 2: populations ──────────────────────────────────────────
    DuplicateDefinition => ("QM0201", DuplicateDefinition, Error,
        "type '{0}' is already defined at {1}"),
    TypeAlreadyRegistered => ("QM0202", DuplicateDefinition, Error,
        "type '{0}' is already registered as a {1}; its {2} definition is ignored"),

    // ── Member-level duplicates ──────────────────────────────────────
    DuplicateInstanceName => ("QM0301", DuplicateName, Error,
        "unit '{0}' already declares an instance named '{1}'"),
    DuplicatePluralForm => ("QM0302", DuplicateName, Warning,
        "unit '{0}': plural form '{1}' of instance '{2}' is already used"),
    DuplicateDerivationId => ("QM0303", DuplicateName, Error,
        "unit '{0}' already declares a derivation with id '{1}'"),
    DuplicateSignature => ("QM0304", DuplicateName, Error,
        "unit '{0}': signature [{1}] is already declared by derivation '{2}'"),
    DuplicateConstantName => ("QM0305", DuplicateName, Error,
        "'{0}' already declares a constant named '{1}'"),
    DuplicateOperation => ("QM0306", DuplicateName, Error,
        "'{0}' already declares a {1} operation with '{2}'"),
    DuplicateGroupMember => ("QM0307", DuplicateName, Error,
        "vector group '{0}' already has a member of dimension {1} ('{2}'); '{3}' is not registered"),
    DuplicateListing => ("QM0308", RedundantDeclaration, Warning,
        "'{0}': '{1}' is listed more than once in '{2}'"),
    DuplicateConversion => ("QM0309", DuplicateName, Error,
        "'{0}' already declares an {1} conversion with '{2}'"),
    DuplicateProcess => ("QM0310", DuplicateName, Error,
        "'{0}' already declares a process '{1}' taking [{2}]"),
    DuplicateQuantityDerivation => ("QM0311", DuplicateName, Error,
        "'{0}' already declares the derivation '{1}' over [{2}]"),
    DuplicateVectorOperation => ("QM0312", DuplicateName, Error,
        "'{0}' already declares a vector operation '{1}' with '{2}'"),

    // ── Pass 3: units ────────────────────────────────────────────────
    MissingFixedInstance => ("QM0401", MissingRequiredField, Error,
        "unit '{0}' declares no fixed instance"),
    DuplicateFixedInstance => ("QM0402", DuplicateName, Error,
        "unit '{0}' declares more than one fixed instance: {1}"),
    UnresolvedInstanceDependency => ("QM0403", UnresolvedReference, Error,
        "unit '{0}': instance '{1}' depends on unknown instance '{2}'"),
    CyclicInstanceDependency => ("QM0404", CyclicDependency, Error,
        "unit '{0}': instance '{1}' is part of a dependency cycle: {2}"),
    BiasNotSupported => ("QM0405", DimensionOrCategoryMismatch, Error,
        "unit '{0}' does not declare a bias term; biased instance '{1}' is ignored"),
    UnresolvedSignatureUnit => ("QM0406", UnresolvedReference, Error,
        "unit '{0}': derivation '{1}' references unit '{2}', which is not a resolved unit"),
    DerivationOnBiasedUnit => ("QM0407", DimensionOrCategoryMismatch, Error,
        "unit '{0}' declares a bias term and cannot be derived (derivation '{1}')"),
    UnnamedDerivation => ("QM0408", MissingRequiredField, Error,
        "unit '{0}' declares several derivations; each one needs an id"),
    UnknownDerivation => ("QM0409", UnresolvedReference, Error,
        "unit '{0}': derived instance '{1}' names unknown derivation '{2}'"),
    DerivationArityMismatch => ("QM0410", DimensionOrCategoryMismatch, Error,
        "unit '{0}': derived instance '{1}' supplies {2} unit instances but derivation '{3}' has {4} positions"),
    UnresolvedContributingInstance => ("QM0411", UnresolvedReference, Error,
        "unit '{0}': derived instance '{1}' uses '{3}', which is not an instance of unit '{2}'"),
    BiasedContribution => ("QM0412", DimensionOrCategoryMismatch, Error,
        "unit '{0}': derived instance '{1}' uses biased instance '{3}' of unit '{2}'"),
    CyclicDerivation => ("QM0413", CyclicDependency, Error,
        "unit '{0}': derivation '{1}' is part of a derivation cycle: {2}"),

    // ── Pass 4: quantities ───────────────────────────────────────────
    UnresolvedOriginal => ("QM0501", UnresolvedReference, Error,
        "specialization '{0}' refers to unknown original quantity '{1}'"),
    CyclicSpecialization => ("QM0502", CyclicDependency, Error,
        "specialization '{0}' is part of a specialization cycle: {1}"),
    OriginalCategoryMismatch => ("QM0503", DimensionOrCategoryMismatch, Error,
        "{1} specialization '{0}' refers to '{2}', which is a {3}"),
    BrokenAncestor => ("QM0504", UnresolvedReference, Warning,
        "'{0}' is dropped because its ancestor '{1}' could not be resolved"),
    OverrideMismatch => ("QM0505", DimensionOrCategoryMismatch, Error,
        "specialization '{0}' overrides '{1}' with '{2}', but it must stay '{3}'; the override is ignored"),
    UnresolvedUnit => ("QM0506", UnresolvedReference, Error,
        "'{0}' uses unit '{1}', which is not a resolved unit"),
    AlreadyIncluded => ("QM0507", RedundantDeclaration, Warning,
        "'{0}': unit instance '{1}' is already included"),
    AlreadyExcluded => ("QM0508", RedundantDeclaration, Warning,
        "'{0}': unit instance '{1}' is already excluded"),
    UnrecognizedUnitInstance => ("QM0509", UnresolvedReference, Error,
        "'{0}': '{1}' is not an instance of unit '{2}'"),
    InclusionModeSwitch => ("QM0510", ContradictoryInclusionExclusion, Error,
        "'{0}' uses {1} mode inside an inherited {2} segment; the list is ignored"),
    ConvertibleToSelf => ("QM0511", RedundantDeclaration, Warning,
        "'{0}' declares a conversion with itself"),
    RedundantOriginalConversion => ("QM0512", RedundantDeclaration, Warning,
        "'{0}': the {1} conversion with original quantity '{2}' is already implied"),
    UnresolvedConversionTarget => ("QM0513", UnresolvedReference, Error,
        "'{0}' declares a conversion with unknown quantity '{1}'"),
    ConversionCategoryMismatch => ("QM0514", DimensionOrCategoryMismatch, Error,
        "'{0}' declares a conversion with '{1}', which is not a compatible {2}"),
    UnresolvedOperationOperand => ("QM0515", UnresolvedReference, Error,
        "'{0}': {1} operation refers to unknown quantity '{2}'"),
    UnresolvedGroup => ("QM0516", UnresolvedReference, Error,
        "vector '{0}' is a member of '{1}', which is not a resolved vector group"),
    GroupUnitMismatch => ("QM0517", DimensionOrCategoryMismatch, Error,
        "vector '{0}' uses unit '{1}' but its group '{2}' uses '{3}'"),
    ConstantDimensionMismatch => ("QM0518", DimensionOrCategoryMismatch, Error,
        "'{0}': constant '{1}' has {2} components but the vector has dimension {3}"),
    UnitlessOriginalMismatch => ("QM0519", DimensionOrCategoryMismatch, Error,
        "'{0}' and its original '{1}' disagree on having a unit"),

    // ── Pass 5: validation ───────────────────────────────────────────
    BiasWithoutUnitSupport => ("QM0601", DimensionOrCategoryMismatch, Error,
        "'{0}' uses a bias term but unit '{1}' does not declare one"),
    DifferenceShapeMismatch => ("QM0602", DimensionOrCategoryMismatch, Error,
        "'{0}': difference quantity '{1}' is not a {2}"),
    UnresolvedDifference => ("QM0603", UnresolvedReference, Error,
        "'{0}': difference quantity '{1}' is not a resolved quantity"),
    UnknownDefaultUnitInstance => ("QM0604", UnresolvedReference, Error,
        "'{0}': default unit instance '{1}' is not an instance of unit '{2}'"),
    SymbolWithoutDefaultUnit => ("QM0605", MissingRequiredField, Warning,
        "'{0}' declares a default unit symbol without a default unit instance; the symbol is ignored"),
    ConstantUnitNotIncluded => ("QM0606", UnresolvedReference, Error,
        "'{0}': constant '{1}' uses unit instance '{2}', which the quantity does not expose"),
    ConstantSharesUnitName => ("QM0607", DuplicateName, Warning,
        "'{0}': constant '{1}' shares its name with a unit instance"),
    DanglingReference => ("QM0608", UnresolvedReference, Error,
        "'{0}': {1} '{2}' did not survive resolution and is removed"),
    LinkageCategoryMismatch => ("QM0609", DimensionOrCategoryMismatch, Error,
        "'{0}': {1} '{2}' is not a {3}"),
    CrossProductDimension => ("QM0610", DimensionOrCategoryMismatch, Error,
        "'{0}': cross product '{1}' needs vectors of dimension 3"),
    IncompatibleDerivationQuantities => ("QM0611", DimensionOrCategoryMismatch, Error,
        "'{0}': derivation '{1}' combines incompatible quantities ({2})"),
    DerivationResultShapeMismatch => ("QM0612", DimensionOrCategoryMismatch, Error,
        "'{0}': derivation '{1}' produces {2}, but the quantity is a {3}"),
    UnresolvedDerivationQuantity => ("QM0613", UnresolvedReference, Error,
        "'{0}': derivation '{1}' uses '{2}', which is not a resolved quantity"),
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One located finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    /// Template arguments, in placeholder order.
    pub args: Vec<String>,
    /// Originating location token.
    pub prov: Provenance,
}

impl Diagnostic {
    /// Create a diagnostic with the code's default severity.
    pub fn new(code: DiagnosticCode, prov: &Provenance, args: &[&str]) -> Self {
        Diagnostic {
            severity: code.default_severity(),
            code,
            args: args.iter().map(|a| (*a).to_owned()).collect(),
            prov: prov.clone(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn kind(&self) -> DiagnosticKind {
        self.code.kind()
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Render the code's template with this diagnostic's arguments.
    pub fn message(&self) -> String {
        let mut out = self.code.template().to_owned();
        for (i, arg) in self.args.iter().enumerate() {
            out = out.replace(&format!("{{{}}}", i), arg);
        }
        out
    }

    /// Serialize with every field present, including the rendered message.
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "args":     self.args,
            "code":     self.code.code(),
            "file":     self.prov.file,
            "kind":     self.code.kind(),
            "line":     self.prov.line,
            "message":  self.message(),
            "name":     self.code.name(),
            "severity": self.severity,
        })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}[{}]: {}",
            self.prov,
            self.severity,
            self.code.code(),
            self.message()
        )
    }
}

// ──────────────────────────────────────────────
// Sinks
// ──────────────────────────────────────────────

/// Receiver for diagnostics, passed explicitly into each stage.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);

    fn report_all(&mut self, diagnostics: Vec<Diagnostic>) {
        for d in diagnostics {
            self.report(d);
        }
    }
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn report(&mut self, _diagnostic: Diagnostic) {}
}

// ──────────────────────────────────────────────
// Outcome
// ──────────────────────────────────────────────

/// An optional value together with the diagnostics produced computing it.
///
/// Diagnostics accumulate alongside the value; an outcome may carry both.
/// Combinators concatenate diagnostics in evaluation order.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct Outcome<T> {
    value: Option<T>,
    diagnostics: Vec<Diagnostic>,
}

impl<T> Outcome<T> {
    pub fn ok(value: T) -> Self {
        Outcome {
            value: Some(value),
            diagnostics: Vec::new(),
        }
    }

    pub fn empty(diagnostics: Vec<Diagnostic>) -> Self {
        Outcome {
            value: None,
            diagnostics,
        }
    }

    pub fn failed(diagnostic: Diagnostic) -> Self {
        Outcome::empty(vec![diagnostic])
    }

    pub fn new(value: Option<T>, diagnostics: Vec<Diagnostic>) -> Self {
        Outcome { value, diagnostics }
    }

    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics.extend(diagnostics);
        self
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: self.value.map(f),
            diagnostics: self.diagnostics,
        }
    }

    /// Chain a computation that only runs when a value is present.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
        match self.value {
            Some(v) => {
                let mut next = f(v);
                let mut diagnostics = self.diagnostics;
                diagnostics.append(&mut next.diagnostics);
                Outcome {
                    value: next.value,
                    diagnostics,
                }
            }
            None => Outcome::empty(self.diagnostics),
        }
    }

    /// Drop the value when the check fails, recording why.
    pub fn validate(self, check: impl FnOnce(&T) -> Result<(), Diagnostic>) -> Outcome<T> {
        match self.value {
            Some(ref v) => match check(v) {
                Ok(()) => self,
                Err(d) => Outcome::empty(self.diagnostics).with_diagnostic(d),
            },
            None => self,
        }
    }

    /// Pair two outcomes; the value is present only when both are.
    pub fn merge<U>(self, other: Outcome<U>) -> Outcome<(T, U)> {
        let mut diagnostics = self.diagnostics;
        diagnostics.extend(other.diagnostics);
        let value = match (self.value, other.value) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        };
        Outcome { value, diagnostics }
    }

    pub fn into_parts(self) -> (Option<T>, Vec<Diagnostic>) {
        (self.value, self.diagnostics)
    }

    /// Hand the diagnostics to `sink` and keep the value.
    pub fn drain_into(self, sink: &mut dyn DiagnosticSink) -> Option<T> {
        sink.report_all(self.diagnostics);
        self.value
    }
}

impl<T> From<Result<T, Diagnostic>> for Outcome<T> {
    fn from(result: Result<T, Diagnostic>) -> Self {
        match result {
            Ok(v) => Outcome::ok(v),
            Err(d) => Outcome::failed(d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prov() -> Provenance {
        Provenance {
            file: "units.json".to_string(),
            line: 3,
        }
    }

    #[test]
    fn codes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for code in DiagnosticCode::ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
            assert_eq!(DiagnosticCode::from_code(code.code()), Some(*code));
            assert_eq!(DiagnosticCode::from_code(code.name()), Some(*code));
        }
    }

    #[test]
    fn message_fills_placeholders() {
        let d = Diagnostic::new(
            DiagnosticCode::DuplicateInstanceName,
            &prov(),
            &["Length", "Kilometre"],
        );
        assert_eq!(
            d.message(),
            "unit 'Length' already declares an instance named 'Kilometre'"
        );
        assert_eq!(d.kind(), DiagnosticKind::DuplicateName);
        assert!(d.is_error());
        assert!(d.to_string().starts_with("units.json:3: error[QM0301]"));
    }

    #[test]
    fn and_then_concatenates_diagnostics() {
        let warn = Diagnostic::new(DiagnosticCode::AlreadyIncluded, &prov(), &["Q", "Metre"]);
        let first: Outcome<u32> = Outcome::ok(2).with_diagnostic(warn.clone());
        let chained = first.and_then(|v| Outcome::ok(v * 10).with_diagnostic(warn.clone()));
        assert_eq!(chained.value(), Some(&20));
        assert_eq!(chained.diagnostics().len(), 2);
    }

    #[test]
    fn validate_drops_value_and_keeps_history() {
        let warn = Diagnostic::new(DiagnosticCode::AlreadyIncluded, &prov(), &["Q", "Metre"]);
        let err = Diagnostic::new(DiagnosticCode::MissingField, &prov(), &["unit", "L", "name"]);
        let outcome = Outcome::ok(1)
            .with_diagnostic(warn)
            .validate(|_| Err(err.clone()));
        assert!(!outcome.has_value());
        assert_eq!(outcome.diagnostics().len(), 2);
        assert_eq!(outcome.diagnostics()[1], err);
    }

    #[test]
    fn drain_into_null_sink_keeps_value() {
        let mut sink = NullSink;
        let value = Outcome::ok("kept")
            .with_diagnostic(Diagnostic::new(
                DiagnosticCode::ConvertibleToSelf,
                &prov(),
                &["Length"],
            ))
            .drain_into(&mut sink);
        assert_eq!(value, Some("kept"));
    }
}
