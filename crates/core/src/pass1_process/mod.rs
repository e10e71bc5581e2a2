//! Pass 1: Per-type processing -- validate and normalize one raw record at
//! a time, with no knowledge of other types.
//!
//! A record yields either a processed definition or a non-empty list of
//! diagnostics, never both. Members (unit instances, derivations, lists,
//! conversions, constants, operations) are items of their own: a broken
//! member is dropped and reported without rejecting its record.

mod derivation;
mod members;
mod quantity;
mod unit;

use crate::ast::{MalformedRecord, Provenance, RawBatch, RawField, RawNameList, Setting};
use crate::cancel::Cancellation;
use crate::config::ResolutionConfig;
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink, Outcome};
use crate::model::{Category, QuantityDef, UnitDef};
use std::collections::HashSet;
use tracing::{debug, info};

/// Every record that survived processing, grouped by category.
#[derive(Debug, Clone, Default)]
pub struct ProcessedBatch {
    pub units: Vec<UnitDef>,
    pub scalars: Vec<QuantityDef>,
    pub vectors: Vec<QuantityDef>,
    pub vector_groups: Vec<QuantityDef>,
}

/// Process every record of `batch`. Diagnostics reach `sink` in input order.
pub fn process_batch(
    batch: &RawBatch,
    config: &ResolutionConfig,
    cancel: &Cancellation,
    sink: &mut dyn DiagnosticSink,
) -> ProcessedBatch {
    let units = collect(
        config.map_items(&batch.units, cancel, |raw| unit::process_unit(raw, config)),
        sink,
    );

    let mut families = Vec::with_capacity(3);
    for (category, bases, specializations) in [
        (Category::Scalar, &batch.scalars, &batch.scalar_specializations),
        (Category::Vector, &batch.vectors, &batch.vector_specializations),
        (
            Category::VectorGroup,
            &batch.vector_groups,
            &batch.vector_group_specializations,
        ),
    ] {
        let mut defs = collect(
            config.map_items(bases, cancel, |raw| {
                quantity::process_base(raw, category, config)
            }),
            sink,
        );
        defs.extend(collect(
            config.map_items(specializations, cancel, |raw| {
                quantity::process_specialization(raw, category, config)
            }),
            sink,
        ));
        if category == Category::Scalar {
            defs.extend(collect(
                config.map_items(&batch.unitless_quantities, cancel, |raw| {
                    quantity::process_unitless(raw, config)
                }),
                sink,
            ));
        }
        families.push(defs);
    }
    let vector_groups = families.pop().unwrap_or_default();
    let vectors = families.pop().unwrap_or_default();
    let scalars = families.pop().unwrap_or_default();

    info!(
        records = batch.len(),
        units = units.len(),
        scalars = scalars.len(),
        vectors = vectors.len(),
        vector_groups = vector_groups.len(),
        "pass 1: processed records"
    );

    ProcessedBatch {
        units,
        scalars,
        vectors,
        vector_groups,
    }
}

fn collect<T>(outcomes: Vec<Option<Outcome<T>>>, sink: &mut dyn DiagnosticSink) -> Vec<T> {
    outcomes
        .into_iter()
        .flatten()
        .filter_map(|o| o.drain_into(sink))
        .collect()
}

/// Identity used in diagnostics for a record that may lack one.
fn display_ident(field: &RawField<String>, fallback: impl FnOnce() -> String) -> String {
    match field.value() {
        Some(s) if !s.is_empty() => s.clone(),
        _ => fallback(),
    }
}

// ──────────────────────────────────────────────
// Record checker
// ──────────────────────────────────────────────

/// Field checks for one record or member, accumulating diagnostics.
///
/// Any check that fails marks the record rejected; [`Record::report`] adds
/// diagnostics that do not.
pub(crate) struct Record<'a> {
    kind: &'static str,
    ident: String,
    prov: Provenance,
    config: &'a ResolutionConfig,
    diagnostics: Vec<Diagnostic>,
    rejected: bool,
}

impl<'a> Record<'a> {
    pub(crate) fn new(
        kind: &'static str,
        ident: impl Into<String>,
        prov: Provenance,
        config: &'a ResolutionConfig,
    ) -> Self {
        Record {
            kind,
            ident: ident.into(),
            prov,
            config,
            diagnostics: Vec::new(),
            rejected: false,
        }
    }

    pub(crate) fn prov(&self) -> &Provenance {
        &self.prov
    }

    pub(crate) fn config(&self) -> &'a ResolutionConfig {
        self.config
    }

    /// Record a diagnostic that rejects the record.
    pub(crate) fn reject(&mut self, code: DiagnosticCode, args: &[&str]) {
        self.diagnostics
            .push(Diagnostic::new(code, &self.prov, args));
        self.rejected = true;
    }

    fn reject_field(&mut self, code: DiagnosticCode, field: &str, extra: &[&str]) {
        let mut args = vec![self.kind, self.ident.as_str(), field];
        args.extend_from_slice(extra);
        let d = Diagnostic::new(code, &self.prov, &args);
        self.diagnostics.push(d);
        self.rejected = true;
    }

    /// Record a diagnostic that does not reject the record.
    pub(crate) fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Keep a member's diagnostics; the record survives either way.
    pub(crate) fn absorb<T>(&mut self, outcome: Outcome<T>) -> Option<T> {
        let (value, diagnostics) = outcome.into_parts();
        self.diagnostics.extend(diagnostics);
        value
    }

    /// Reject a record or member that could not be read at all. `within`
    /// names the enclosing list or owner.
    pub(crate) fn well_formed(&mut self, marker: Option<&MalformedRecord>, within: &str) -> bool {
        let Some(marker) = marker else {
            return true;
        };
        let index = marker.index.to_string();
        self.reject(
            DiagnosticCode::MalformedRecord,
            &[self.kind, index.as_str(), within, marker.reason.as_str()],
        );
        false
    }

    /// Reject a member list that was written but does not apply.
    pub(crate) fn inapplicable_list<T>(&mut self, items: &[T], name: &str, context: &str) {
        if !items.is_empty() {
            self.reject_field(DiagnosticCode::InapplicableField, name, &[context]);
        }
    }

    pub(crate) fn required<T: Clone>(&mut self, field: &RawField<T>, name: &str) -> Option<T> {
        match field.setting() {
            Setting::Value(v) => Some(v.clone()),
            Setting::Null => {
                self.reject_field(DiagnosticCode::NullField, name, &[]);
                None
            }
            Setting::Unset => {
                self.reject_field(DiagnosticCode::MissingField, name, &[]);
                None
            }
            Setting::Malformed(reason) => {
                self.reject_field(DiagnosticCode::MalformedField, name, &[reason]);
                None
            }
        }
    }

    /// Report a required field that was not written; its value is checked later.
    pub(crate) fn present<T>(&mut self, field: &RawField<T>, name: &str) {
        if !field.is_explicit() {
            self.reject_field(DiagnosticCode::MissingField, name, &[]);
        }
    }

    pub(crate) fn optional<T: Clone>(&mut self, field: &RawField<T>, name: &str) -> Option<T> {
        match field.setting() {
            Setting::Value(v) => Some(v.clone()),
            Setting::Null => {
                self.reject_field(DiagnosticCode::NullField, name, &[]);
                None
            }
            Setting::Malformed(reason) => {
                self.reject_field(DiagnosticCode::MalformedField, name, &[reason]);
                None
            }
            Setting::Unset => None,
        }
    }

    pub(crate) fn required_text(&mut self, field: &RawField<String>, name: &str) -> Option<String> {
        let text = self.required(field, name)?;
        self.non_empty(text, name)
    }

    pub(crate) fn optional_text(&mut self, field: &RawField<String>, name: &str) -> Option<String> {
        let text = self.optional(field, name)?;
        self.non_empty(text, name)
    }

    fn non_empty(&mut self, text: String, name: &str) -> Option<String> {
        if text.trim().is_empty() {
            self.reject_field(DiagnosticCode::EmptyField, name, &[]);
            None
        } else {
            Some(text)
        }
    }

    pub(crate) fn flag(&mut self, field: &RawField<bool>, name: &str, default: bool) -> bool {
        self.optional(field, name).unwrap_or(default)
    }

    /// A keyword field. Unset falls back to `default`; `None` makes it required.
    pub(crate) fn keyword<E: Copy>(
        &mut self,
        field: &RawField<String>,
        name: &str,
        table: &[(&str, E)],
        default: Option<E>,
    ) -> Option<E> {
        let text = match default {
            Some(d) if !field.is_explicit() => return Some(d),
            Some(_) => self.optional_text(field, name)?,
            None => self.required_text(field, name)?,
        };
        let found = table
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(text.trim()))
            .map(|(_, v)| *v);
        if found.is_none() {
            let expected = table.iter().map(|(k, _)| *k).collect::<Vec<_>>().join(", ");
            self.unrecognized(name, &text, &expected);
        }
        found
    }

    /// Reject a field that was written but does not apply.
    pub(crate) fn inapplicable<T>(&mut self, field: &RawField<T>, name: &str, context: &str) {
        if field.is_explicit() {
            self.reject_field(DiagnosticCode::InapplicableField, name, &[context]);
        }
    }

    pub(crate) fn unrecognized(&mut self, name: &str, value: &str, expected: &str) {
        self.reject_field(DiagnosticCode::UnrecognizedValue, name, &[value, expected]);
    }

    pub(crate) fn empty(&mut self, name: &str) {
        self.reject_field(DiagnosticCode::EmptyField, name, &[]);
    }

    pub(crate) fn out_of_range(&mut self, name: &str, value: &str, expected: &str) {
        self.reject_field(DiagnosticCode::ValueOutOfRange, name, &[value, expected]);
    }

    pub(crate) fn contradictory(&mut self, first: &str, second: &str) {
        self.reject_field(DiagnosticCode::ContradictoryFields, first, &[second]);
    }

    /// A list of names. Null or empty elements reject the record; repeated
    /// elements are reported and dropped.
    pub(crate) fn name_list(&mut self, field: &RawNameList, name: &str) -> Option<Vec<String>> {
        let raw = self.required(field, name)?;
        if raw.is_empty() {
            self.reject_field(DiagnosticCode::EmptyField, name, &[]);
            return None;
        }
        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(raw.len());
        for (i, element) in raw.into_iter().enumerate() {
            let Some(s) = self.element(element, name, i) else {
                continue;
            };
            if seen.insert(s.clone()) {
                names.push(s);
            } else {
                let d = Diagnostic::new(
                    DiagnosticCode::DuplicateListing,
                    &self.prov,
                    &[self.ident.as_str(), s.as_str(), name],
                )
                .with_severity(self.config.redundant_listing_severity);
                self.diagnostics.push(d);
            }
        }
        if self.rejected {
            None
        } else {
            Some(names)
        }
    }

    /// An ordered list that may be empty and may repeat. Unset is empty.
    pub(crate) fn plain_list(&mut self, field: &RawNameList, name: &str) -> Option<Vec<String>> {
        let raw = self.optional(field, name);
        if field.is_explicit() && raw.is_none() {
            return None;
        }
        let raw = raw.unwrap_or_default();
        let before = self.diagnostics.len();
        let items: Vec<String> = raw
            .into_iter()
            .enumerate()
            .filter_map(|(i, element)| self.element(element, name, i))
            .collect();
        (self.diagnostics.len() == before).then_some(items)
    }

    fn element(&mut self, element: Option<String>, name: &str, i: usize) -> Option<String> {
        let element_field = format!("{}[{}]", name, i);
        match element {
            None => {
                self.reject_field(DiagnosticCode::NullField, &element_field, &[]);
                None
            }
            Some(s) if s.trim().is_empty() => {
                self.reject_field(DiagnosticCode::EmptyField, &element_field, &[]);
                None
            }
            Some(s) => Some(s),
        }
    }

    pub(crate) fn is_rejected(&self) -> bool {
        self.rejected
    }

    /// Finish a record: the value survives only if nothing rejected it.
    pub(crate) fn finish<T>(self, value: T) -> Outcome<T> {
        if self.rejected {
            return self.fail();
        }
        Outcome::ok(value).with_diagnostics(self.diagnostics)
    }

    pub(crate) fn fail<T>(self) -> Outcome<T> {
        debug!(kind = self.kind, ident = %self.ident, "record rejected");
        Outcome::empty(self.diagnostics)
    }
}
