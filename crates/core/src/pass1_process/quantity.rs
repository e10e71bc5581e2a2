//! Quantity records: bases, specializations and unitless quantities of
//! every quantity category.

use super::derivation::process_quantity_derivation;
use super::members::{
    process_constant, process_conversion, process_operation, process_process, process_unit_list,
    process_vector_operation,
};
use super::{display_ident, Record};
use crate::ast::{Provenance, RawQuantity, RawQuantityFields, RawSpecialization, TypeIdent};
use crate::config::ResolutionConfig;
use crate::diagnostics::{DiagnosticCode, Outcome};
use crate::model::{
    CastBehaviour, Category, ConstantDef, ConversionDef, InheritFlags, ListMode, OperationDef,
    OriginalConversion, ProcessDef, QuantityDef, QuantityDerivationDef, QuantityFields,
    QuantityForm, UnitList, VectorOperationDef,
};

const UNITLESS: &str = "unitless quantity";

pub(super) fn process_base(
    raw: &RawQuantity,
    category: Category,
    config: &ResolutionConfig,
) -> Outcome<QuantityDef> {
    let label = display_ident(&raw.ident, || format!("<{} at {}>", category, raw.prov));
    let mut rec = Record::new(category.label(), label, raw.prov.clone(), config);
    let list = match category {
        Category::Vector => "vectors",
        Category::VectorGroup => "vector_groups",
        _ => "scalars",
    };
    if !rec.well_formed(raw.malformed.as_ref(), list) {
        return rec.fail();
    }
    let ident = rec.required_text(&raw.ident, "ident");

    let member_of_set = category == Category::Vector && raw.fields.member_of.is_explicit();
    if !member_of_set {
        // A group member may take its unit from the group.
        rec.present(&raw.fields.unit, "unit");
    }
    if category == Category::Vector {
        rec.present(&raw.fields.dimension, "dimension");
    }

    let Some(ident) = ident else {
        return rec.fail();
    };
    let Some(body) = process_body(&ident, category, false, &raw.fields, &mut rec) else {
        return rec.fail();
    };
    rec.finish(body.into_def(ident, &raw.prov, category, QuantityForm::Base, false))
}

pub(super) fn process_specialization(
    raw: &RawSpecialization,
    category: Category,
    config: &ResolutionConfig,
) -> Outcome<QuantityDef> {
    let label = display_ident(&raw.ident, || format!("<{} at {}>", category, raw.prov));
    let (kind, list) = match category {
        Category::Scalar => ("scalar specialization", "scalar_specializations"),
        Category::Vector => ("vector specialization", "vector_specializations"),
        _ => ("vector group specialization", "vector_group_specializations"),
    };
    let mut rec = Record::new(kind, label, raw.prov.clone(), config);
    if !rec.well_formed(raw.malformed.as_ref(), list) {
        return rec.fail();
    }
    let ident = rec.required_text(&raw.ident, "ident");
    let original = rec.required_text(&raw.original, "original");
    let form = specialization_form(raw, original.as_deref(), &mut rec);

    let (Some(ident), Some(form)) = (ident, form) else {
        return rec.fail();
    };
    if !acyclic(&ident, &form, &mut rec) {
        return rec.fail();
    }
    let Some(body) = process_body(&ident, category, false, &raw.fields, &mut rec) else {
        return rec.fail();
    };
    rec.finish(body.into_def(ident, &raw.prov, category, form, false))
}

/// A scalar without a unit. Without an original it is the root of its own
/// chain; with one, the original must be unitless too.
pub(super) fn process_unitless(raw: &RawSpecialization, config: &ResolutionConfig) -> Outcome<QuantityDef> {
    let label = display_ident(&raw.ident, || format!("<{} at {}>", UNITLESS, raw.prov));
    let mut rec = Record::new(UNITLESS, label, raw.prov.clone(), config);
    if !rec.well_formed(raw.malformed.as_ref(), "unitless_quantities") {
        return rec.fail();
    }
    let ident = rec.required_text(&raw.ident, "ident");
    let original = rec.optional_text(&raw.original, "original");
    rec.inapplicable(&raw.inherit_constants, "inherit_constants", UNITLESS);
    rec.inapplicable(&raw.inherit_units, "inherit_units", UNITLESS);

    let form = match original.as_deref() {
        Some(original) => specialization_form(raw, Some(original), &mut rec),
        None if raw.original.is_explicit() => None,
        None => {
            let context = "unitless quantity without an original";
            rec.inapplicable(&raw.inherit_operations, "inherit_operations", context);
            rec.inapplicable(&raw.inherit_conversions, "inherit_conversions", context);
            rec.inapplicable(&raw.inherit_processes, "inherit_processes", context);
            rec.inapplicable(&raw.original_conversion, "original_conversion", context);
            rec.inapplicable(&raw.forwards_cast, "forwards_cast", context);
            rec.inapplicable(&raw.backwards_cast, "backwards_cast", context);
            Some(QuantityForm::Base)
        }
    };

    let (Some(ident), Some(form)) = (ident, form) else {
        return rec.fail();
    };
    if !acyclic(&ident, &form, &mut rec) {
        return rec.fail();
    }
    let Some(body) = process_body(&ident, Category::Scalar, true, &raw.fields, &mut rec) else {
        return rec.fail();
    };
    rec.finish(body.into_def(ident, &raw.prov, Category::Scalar, form, true))
}

/// Inheritance flags and the implicit conversion with the original. Every
/// flag is checked even when `original` is missing.
fn specialization_form(
    raw: &RawSpecialization,
    original: Option<&str>,
    rec: &mut Record<'_>,
) -> Option<QuantityForm> {
    let inherit = InheritFlags {
        operations: rec.flag(&raw.inherit_operations, "inherit_operations", true),
        conversions: rec.flag(&raw.inherit_conversions, "inherit_conversions", true),
        constants: rec.flag(&raw.inherit_constants, "inherit_constants", true),
        units: rec.flag(&raw.inherit_units, "inherit_units", true),
        processes: rec.flag(&raw.inherit_processes, "inherit_processes", true),
    };
    let enabled = rec.flag(&raw.original_conversion, "original_conversion", true);
    if !enabled {
        rec.inapplicable(&raw.forwards_cast, "forwards_cast", "specialization without an original conversion");
        rec.inapplicable(&raw.backwards_cast, "backwards_cast", "specialization without an original conversion");
    }
    let forwards = rec.keyword(
        &raw.forwards_cast,
        "forwards_cast",
        CastBehaviour::KEYWORDS,
        Some(CastBehaviour::Explicit),
    );
    let backwards = rec.keyword(
        &raw.backwards_cast,
        "backwards_cast",
        CastBehaviour::KEYWORDS,
        Some(CastBehaviour::Explicit),
    );
    Some(QuantityForm::Specialization {
        original: TypeIdent::from(original?),
        inherit,
        original_conversion: OriginalConversion {
            enabled,
            forwards: forwards.unwrap_or(CastBehaviour::Explicit),
            backwards: backwards.unwrap_or(CastBehaviour::Explicit),
        },
    })
}

fn acyclic(ident: &str, form: &QuantityForm, rec: &mut Record<'_>) -> bool {
    match form {
        QuantityForm::Specialization { original, .. } if original.as_str() == ident => {
            rec.reject(
                DiagnosticCode::CyclicSpecialization,
                &[ident, format!("{} → {}", ident, ident).as_str()],
            );
            false
        }
        _ => true,
    }
}

/// Everything but the identity and the specialization link.
struct Body {
    fields: QuantityFields,
    units: Option<UnitList>,
    conversions: Vec<ConversionDef>,
    constants: Vec<ConstantDef>,
    operations: Vec<OperationDef>,
    vector_operations: Vec<VectorOperationDef>,
    processes: Vec<ProcessDef>,
    derivations: Vec<QuantityDerivationDef>,
}

impl Body {
    fn into_def(
        self,
        ident: String,
        prov: &Provenance,
        category: Category,
        form: QuantityForm,
        unitless: bool,
    ) -> QuantityDef {
        QuantityDef {
            ident: TypeIdent::from(ident),
            prov: prov.clone(),
            category,
            form,
            fields: self.fields,
            unitless,
            units: self.units,
            conversions: self.conversions,
            constants: self.constants,
            operations: self.operations,
            vector_operations: self.vector_operations,
            processes: self.processes,
            derivations: self.derivations,
        }
    }
}

fn process_body(
    ident: &str,
    category: Category,
    unitless: bool,
    raw: &RawQuantityFields,
    rec: &mut Record<'_>,
) -> Option<Body> {
    let context = category.label();
    if category != Category::Scalar {
        rec.inapplicable(&raw.vector, "vector", context);
        rec.inapplicable(&raw.allow_negative, "allow_negative", context);
    }
    if category == Category::Scalar {
        rec.inapplicable(&raw.scalar, "scalar", context);
        rec.inapplicable_list(&raw.vector_operations, "vector_operations", context);
    }
    if category != Category::Vector {
        rec.inapplicable(&raw.dimension, "dimension", context);
        rec.inapplicable(&raw.member_of, "member_of", context);
    }
    if category == Category::VectorGroup {
        rec.inapplicable_list(&raw.constants, "constants", context);
    }
    if unitless {
        rec.inapplicable(&raw.unit, "unit", UNITLESS);
        rec.inapplicable(&raw.biased, "biased", UNITLESS);
        rec.inapplicable(&raw.default_unit_instance, "default_unit_instance", UNITLESS);
        rec.inapplicable(&raw.default_unit_symbol, "default_unit_symbol", UNITLESS);
        rec.inapplicable(&raw.included_units, "included_units", UNITLESS);
        rec.inapplicable(&raw.excluded_units, "excluded_units", UNITLESS);
        rec.inapplicable(&raw.vector, "vector", UNITLESS);
        rec.inapplicable_list(&raw.constants, "constants", UNITLESS);
    }

    let dimension = match rec.optional(&raw.dimension, "dimension") {
        Some(d) if (2..=i64::from(u32::MAX)).contains(&d) => u32::try_from(d).ok(),
        Some(d) => {
            rec.out_of_range("dimension", &d.to_string(), "at least 2");
            None
        }
        None => None,
    };

    let fields = QuantityFields {
        unit: rec.optional_text(&raw.unit, "unit").map(TypeIdent::from),
        biased: rec.optional(&raw.biased, "biased"),
        difference: rec.optional_text(&raw.difference, "difference").map(TypeIdent::from),
        implement_sum: rec.optional(&raw.implement_sum, "implement_sum"),
        implement_difference: rec.optional(&raw.implement_difference, "implement_difference"),
        default_unit_instance: rec.optional_text(&raw.default_unit_instance, "default_unit_instance"),
        default_unit_symbol: rec.optional_text(&raw.default_unit_symbol, "default_unit_symbol"),
        vector: rec.optional_text(&raw.vector, "vector").map(TypeIdent::from),
        scalar: rec.optional_text(&raw.scalar, "scalar").map(TypeIdent::from),
        dimension,
        member_of: rec.optional_text(&raw.member_of, "member_of").map(TypeIdent::from),
        allow_negative: rec.optional(&raw.allow_negative, "allow_negative"),
    };

    let units = match (raw.included_units.is_explicit(), raw.excluded_units.is_explicit()) {
        (true, true) => {
            rec.reject(
                DiagnosticCode::ContradictoryInclusionExclusion,
                &[category.label(), ident],
            );
            None
        }
        (true, false) => {
            let outcome = process_unit_list(ident, ListMode::Include, &raw.included_units, rec.prov(), rec.config());
            rec.absorb(outcome)
        }
        (false, true) => {
            let outcome = process_unit_list(ident, ListMode::Exclude, &raw.excluded_units, rec.prov(), rec.config());
            rec.absorb(outcome)
        }
        (false, false) => None,
    };

    if rec.is_rejected() {
        return None;
    }

    let mut conversions = Vec::with_capacity(raw.conversions.len());
    for c in &raw.conversions {
        let outcome = process_conversion(ident, c, rec.prov(), rec.config());
        conversions.extend(rec.absorb(outcome));
    }
    let mut constants = Vec::with_capacity(raw.constants.len());
    for (i, c) in raw.constants.iter().enumerate() {
        let outcome = process_constant(ident, i, c, category, rec.prov(), rec.config());
        constants.extend(rec.absorb(outcome));
    }
    let mut operations = Vec::with_capacity(raw.operations.len());
    for o in &raw.operations {
        let outcome = process_operation(ident, o, rec.prov(), rec.config());
        operations.extend(rec.absorb(outcome));
    }
    let mut vector_operations = Vec::with_capacity(raw.vector_operations.len());
    for o in &raw.vector_operations {
        let outcome = process_vector_operation(ident, o, rec.prov(), rec.config());
        vector_operations.extend(rec.absorb(outcome));
    }
    let mut processes = Vec::with_capacity(raw.processes.len());
    for (i, p) in raw.processes.iter().enumerate() {
        let outcome = process_process(ident, i, p, rec.prov(), rec.config());
        processes.extend(rec.absorb(outcome));
    }
    let mut derivations = Vec::with_capacity(raw.derivations.len());
    for d in &raw.derivations {
        let outcome = process_quantity_derivation(ident, d, rec.prov(), rec.config());
        derivations.extend(rec.absorb(outcome));
    }

    Some(Body {
        fields,
        units,
        conversions,
        constants,
        operations,
        vector_operations,
        processes,
        derivations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RawBatch;
    use serde_json::json;

    fn base(category: Category, value: serde_json::Value) -> Outcome<QuantityDef> {
        let batch = RawBatch::from_json_value(json!({ "scalars": [value] })).unwrap();
        process_base(&batch.scalars[0], category, &ResolutionConfig::default())
    }

    fn spec(value: serde_json::Value) -> Outcome<QuantityDef> {
        let batch = RawBatch::from_json_value(json!({ "scalar_specializations": [value] })).unwrap();
        process_specialization(
            &batch.scalar_specializations[0],
            Category::Scalar,
            &ResolutionConfig::default(),
        )
    }

    fn codes<T>(outcome: &Outcome<T>) -> Vec<DiagnosticCode> {
        outcome.diagnostics().iter().map(|d| d.code).collect()
    }

    #[test]
    fn scalar_base_keeps_written_fields_only() {
        let outcome = base(
            Category::Scalar,
            json!({ "ident": "Length", "unit": "UnitOfLength", "biased": false,
                    "included_units": ["Metre"] }),
        );
        let def = outcome.value().unwrap();
        assert_eq!(def.fields.unit, Some(TypeIdent::from("UnitOfLength")));
        assert_eq!(def.fields.biased, Some(false));
        assert_eq!(def.fields.implement_sum, None);
        assert_eq!(def.units.as_ref().unwrap().mode, ListMode::Include);
    }

    #[test]
    fn base_without_unit_is_rejected() {
        let outcome = base(Category::Scalar, json!({ "ident": "Length" }));
        assert!(!outcome.has_value());
        assert_eq!(codes(&outcome), vec![DiagnosticCode::MissingField]);
    }

    #[test]
    fn both_lists_is_contradictory() {
        let outcome = base(
            Category::Scalar,
            json!({ "ident": "Length", "unit": "UnitOfLength",
                    "included_units": ["Metre"], "excluded_units": ["Kilometre"] }),
        );
        assert!(!outcome.has_value());
        assert_eq!(
            codes(&outcome),
            vec![DiagnosticCode::ContradictoryInclusionExclusion]
        );
    }

    #[test]
    fn vector_needs_dimension_of_at_least_two() {
        let missing = base(Category::Vector, json!({ "ident": "Position3", "unit": "UnitOfLength" }));
        assert_eq!(codes(&missing), vec![DiagnosticCode::MissingField]);
        let small = base(
            Category::Vector,
            json!({ "ident": "Position1", "unit": "UnitOfLength", "dimension": 1 }),
        );
        assert_eq!(codes(&small), vec![DiagnosticCode::ValueOutOfRange]);
        let member = base(
            Category::Vector,
            json!({ "ident": "Position3", "member_of": "Position", "dimension": 3 }),
        );
        assert!(member.has_value());
    }

    #[test]
    fn scalar_only_fields_do_not_apply_to_vectors() {
        let outcome = base(
            Category::Vector,
            json!({ "ident": "Velocity3", "unit": "UnitOfSpeed", "dimension": 3, "vector": "X" }),
        );
        assert_eq!(codes(&outcome), vec![DiagnosticCode::InapplicableField]);
    }

    #[test]
    fn broken_member_keeps_the_quantity() {
        let outcome = base(
            Category::Scalar,
            json!({ "ident": "Length", "unit": "UnitOfLength",
                    "constants": [{ "name": "Planck", "unit_instance": "Metre" }],
                    "operations": [{ "kind": "divide", "other": "Time", "result": "Speed" }] }),
        );
        let def = outcome.value().unwrap();
        assert!(def.constants.is_empty());
        assert_eq!(def.operations.len(), 1);
        assert_eq!(codes(&outcome), vec![DiagnosticCode::MissingField]);
    }

    #[test]
    fn specialization_defaults() {
        let outcome = spec(json!({ "ident": "Distance", "original": "Length" }));
        let def = outcome.value().unwrap();
        match &def.form {
            QuantityForm::Specialization {
                original,
                inherit,
                original_conversion,
            } => {
                assert_eq!(original.as_str(), "Length");
                assert_eq!(*inherit, InheritFlags::default());
                assert!(original_conversion.enabled);
                assert_eq!(original_conversion.forwards, CastBehaviour::Explicit);
            }
            QuantityForm::Base => panic!("expected a specialization"),
        }
        assert_eq!(def.fields.unit, None);
    }

    #[test]
    fn self_specialization_is_cyclic() {
        let outcome = spec(json!({ "ident": "Distance", "original": "Distance" }));
        assert_eq!(codes(&outcome), vec![DiagnosticCode::CyclicSpecialization]);
    }

    #[test]
    fn specialization_without_original() {
        let outcome = spec(json!({ "ident": "Distance", "inherit_units": null }));
        assert_eq!(
            codes(&outcome),
            vec![DiagnosticCode::MissingField, DiagnosticCode::NullField]
        );
    }

    fn unitless(value: serde_json::Value) -> Outcome<QuantityDef> {
        let batch = RawBatch::from_json_value(json!({ "unitless_quantities": [value] })).unwrap();
        process_unitless(&batch.unitless_quantities[0], &ResolutionConfig::default())
    }

    #[test]
    fn unitless_root_and_specialization() {
        let root = unitless(json!({ "ident": "Ratio", "allow_negative": false }));
        let def = root.value().unwrap();
        assert!(def.unitless);
        assert!(!def.is_specialization());
        assert_eq!(def.fields.allow_negative, Some(false));

        let spec = unitless(json!({ "ident": "Efficiency", "original": "Ratio", "inherit_processes": false }));
        let def = spec.value().unwrap();
        assert_eq!(def.original().map(TypeIdent::as_str), Some("Ratio"));
        assert!(!def.inherit().processes);
    }

    #[test]
    fn unit_fields_do_not_apply_to_unitless_quantities() {
        let outcome = unitless(json!({
            "ident": "Ratio",
            "unit": "UnitOfLength",
            "inherit_operations": false,
            "constants": [{ "name": "Half", "unit_instance": "Metre", "value": 0.5 }]
        }));
        assert!(!outcome.has_value());
        let fields: Vec<String> = outcome.diagnostics().iter().map(|d| d.args[2].clone()).collect();
        assert_eq!(fields, vec!["inherit_operations", "unit", "constants"]);
        assert!(outcome
            .diagnostics()
            .iter()
            .all(|d| d.code == DiagnosticCode::InapplicableField));
    }

    #[test]
    fn mistyped_field_rejects_only_its_record() {
        let outcome = base(
            Category::Scalar,
            json!({ "ident": "Width", "unit": "UnitOfLength", "biased": "yes" }),
        );
        assert!(!outcome.has_value());
        let d = &outcome.diagnostics()[0];
        assert_eq!(d.code, DiagnosticCode::MalformedField);
        assert_eq!(
            d.message(),
            "scalar 'Width': field 'biased' is malformed (invalid type: string \"yes\", expected a boolean)"
        );
    }

    #[test]
    fn members_follow_the_category() {
        let scalar = base(
            Category::Scalar,
            json!({ "ident": "Length", "unit": "UnitOfLength",
                    "vector_operations": [{ "kind": "dot", "other": "Length", "result": "Area" }] }),
        );
        assert_eq!(codes(&scalar), vec![DiagnosticCode::InapplicableField]);

        let group = base(
            Category::VectorGroup,
            json!({ "ident": "Position", "unit": "UnitOfLength",
                    "constants": [{ "name": "Ones", "unit_instance": "Metre", "value": [1, 1] }] }),
        );
        assert_eq!(codes(&group), vec![DiagnosticCode::InapplicableField]);

        let vector = base(
            Category::Vector,
            json!({ "ident": "Position3", "unit": "UnitOfLength", "dimension": 3,
                    "vector_operations": [{ "kind": "cross", "other": "Force3", "result": "Moment3" }],
                    "processes": [{ "name": "Doubled", "expression": "2 * this", "result": "Position3" }],
                    "derivations": [{ "expression": "{0} * {1}", "signature": ["Velocity3", "Time"] }] }),
        );
        let def = vector.value().unwrap();
        assert_eq!(def.vector_operations[0].name, "Cross");
        assert_eq!(def.processes[0].name, "Doubled");
        assert_eq!(def.derivations[0].expression, "({0} * {1})");
    }
}
