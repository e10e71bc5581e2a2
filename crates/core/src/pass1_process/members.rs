//! Quantity members: unit lists, conversions, constants, operations,
//! vector operations and processes.
//!
//! Each member is processed as its own item; the owning quantity keeps
//! whatever survives.

use super::{display_ident, Record};
use crate::ast::{
    ConstantValue, Provenance, RawConstant, RawConversion, RawNameList, RawOperation, RawProcess,
    RawVectorOperation, TypeIdent,
};
use crate::config::ResolutionConfig;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Outcome};
use crate::model::{
    CastBehaviour, Category, ConstantDef, ConversionDef, ConversionDirection, ListMode,
    OperandPosition, OperationDef, OperationKind, ProcessDef, ProcessParameter, UnitList,
    VectorOperationDef, VectorOperationKind,
};
use std::collections::HashSet;

pub(super) fn process_unit_list(
    owner: &str,
    mode: ListMode,
    field: &RawNameList,
    prov: &Provenance,
    config: &ResolutionConfig,
) -> Outcome<UnitList> {
    let name = match mode {
        ListMode::Include => "included_units",
        ListMode::Exclude => "excluded_units",
    };
    let mut rec = Record::new("unit list", owner, prov.clone(), config);
    match rec.name_list(field, name) {
        Some(names) => rec.finish(UnitList {
            mode,
            names,
            prov: prov.clone(),
        }),
        None => rec.fail(),
    }
}

pub(super) fn process_conversion(
    owner: &str,
    raw: &RawConversion,
    owner_prov: &Provenance,
    config: &ResolutionConfig,
) -> Outcome<ConversionDef> {
    let prov = raw.prov.or(owner_prov);
    let mut rec = Record::new("conversion", owner, prov.clone(), config);
    if !rec.well_formed(raw.malformed.as_ref(), owner) {
        return rec.fail();
    }
    let direction = rec.keyword(
        &raw.direction,
        "direction",
        ConversionDirection::KEYWORDS,
        Some(ConversionDirection::Both),
    );
    let cast = rec.keyword(
        &raw.cast,
        "cast",
        CastBehaviour::KEYWORDS,
        Some(CastBehaviour::Explicit),
    );
    let targets = rec.name_list(&raw.targets, "targets");
    match (direction, cast, targets) {
        (Some(direction), Some(cast), Some(targets)) => rec.finish(ConversionDef {
            direction,
            cast,
            targets: targets.into_iter().map(TypeIdent::from).collect(),
            prov,
        }),
        _ => rec.fail(),
    }
}

/// A scalar constant takes one number, a vector constant one number per
/// component. The component count is checked against the dimension once
/// inheritance has settled it.
pub(super) fn process_constant(
    owner: &str,
    index: usize,
    raw: &RawConstant,
    category: Category,
    owner_prov: &Provenance,
    config: &ResolutionConfig,
) -> Outcome<ConstantDef> {
    let prov = raw.prov.or(owner_prov);
    let label = display_ident(&raw.name, || format!("#{}", index));
    let mut rec = Record::new("constant", format!("{}.{}", owner, label), prov.clone(), config);
    if !rec.well_formed(raw.malformed.as_ref(), owner) {
        return rec.fail();
    }
    let name = rec.required_text(&raw.name, "name");
    let unit_instance = rec.required_text(&raw.unit_instance, "unit_instance");
    let value = match rec.required(&raw.value, "value") {
        Some(ConstantValue::Components(c)) if c.is_empty() => {
            rec.empty("value");
            None
        }
        Some(value) => {
            let need = match (category, &value) {
                (Category::Scalar, ConstantValue::Components(_)) => Some("a single number"),
                (Category::Vector, ConstantValue::Scalar(_)) => Some("one number per component"),
                _ => None,
            };
            if let Some(need) = need {
                rec.reject(
                    DiagnosticCode::ConstantShapeMismatch,
                    &[category.label(), owner, label.as_str(), need],
                );
            }
            need.is_none().then_some(value)
        }
        None => None,
    };
    let multiples = rec.optional_text(&raw.multiples, "multiples");
    match (name, unit_instance, value) {
        (Some(name), Some(unit_instance), Some(value)) => rec.finish(ConstantDef {
            name,
            unit_instance,
            value,
            multiples,
            prov,
        }),
        _ => rec.fail(),
    }
}

pub(super) fn process_operation(
    owner: &str,
    raw: &RawOperation,
    owner_prov: &Provenance,
    config: &ResolutionConfig,
) -> Outcome<OperationDef> {
    let prov = raw.prov.or(owner_prov);
    let mut rec = Record::new("operation", owner, prov.clone(), config);
    if !rec.well_formed(raw.malformed.as_ref(), owner) {
        return rec.fail();
    }
    let kind = rec.keyword(&raw.kind, "kind", OperationKind::KEYWORDS, None);
    let other = rec.required_text(&raw.other, "other");
    let result = rec.required_text(&raw.result, "result");
    let mirror = rec.flag(&raw.mirror, "mirror", false);
    match (kind, other, result) {
        (Some(kind), Some(other), Some(result)) => rec.finish(OperationDef {
            kind,
            other: TypeIdent::from(other),
            result: TypeIdent::from(result),
            mirror,
            prov,
        }),
        _ => rec.fail(),
    }
}

/// Dot and cross products. Names default per kind and position; a mirror
/// is implemented on `other` with the operands swapped.
pub(super) fn process_vector_operation(
    owner: &str,
    raw: &RawVectorOperation,
    owner_prov: &Provenance,
    config: &ResolutionConfig,
) -> Outcome<VectorOperationDef> {
    let prov = raw.prov.or(owner_prov);
    let mut rec = Record::new("vector operation", owner, prov.clone(), config);
    if !rec.well_formed(raw.malformed.as_ref(), owner) {
        return rec.fail();
    }
    let kind = rec.keyword(&raw.kind, "kind", VectorOperationKind::KEYWORDS, None);
    let position = rec.keyword(
        &raw.position,
        "position",
        OperandPosition::KEYWORDS,
        Some(OperandPosition::Left),
    );
    let other = rec.required_text(&raw.other, "other");
    let result = rec.required_text(&raw.result, "result");
    let name = rec.optional_text(&raw.name, "name");
    let mirrored_name = rec.optional_text(&raw.mirrored_name, "mirrored_name");
    let explicit_mirror = rec.optional(&raw.mirror, "mirror");
    if explicit_mirror == Some(false) && raw.mirrored_name.is_explicit() {
        rec.contradictory("mirrored_name", "mirror: false");
    }

    let (Some(kind), Some(position), Some(other), Some(result)) = (kind, position, other, result)
    else {
        return rec.fail();
    };
    if rec.is_rejected() {
        return rec.fail();
    }

    let wants_mirror = explicit_mirror.unwrap_or(false) || mirrored_name.is_some();
    let mirrorable = kind != VectorOperationKind::Dot && other != owner;
    if wants_mirror && !mirrorable {
        rec.report(Diagnostic::new(
            DiagnosticCode::MirrorNotSupported,
            &prov,
            &[owner, kind.label(), other.as_str()],
        ));
    }
    let mirrored_name = (wants_mirror && mirrorable).then(|| {
        mirrored_name.unwrap_or_else(|| kind.default_name(position.flipped()).to_owned())
    });

    rec.finish(VectorOperationDef {
        kind,
        position,
        name: name.unwrap_or_else(|| kind.default_name(position).to_owned()),
        other: TypeIdent::from(other),
        result: TypeIdent::from(result),
        mirrored_name,
        prov,
    })
}

/// A named computation. Parameter types and names pair up by position.
pub(super) fn process_process(
    owner: &str,
    index: usize,
    raw: &RawProcess,
    owner_prov: &Provenance,
    config: &ResolutionConfig,
) -> Outcome<ProcessDef> {
    let prov = raw.prov.or(owner_prov);
    let label = display_ident(&raw.name, || format!("#{}", index));
    let mut rec = Record::new("process", format!("{}.{}", owner, label), prov.clone(), config);
    if !rec.well_formed(raw.malformed.as_ref(), owner) {
        return rec.fail();
    }
    let name = rec.required_text(&raw.name, "name");
    let expression = rec.required_text(&raw.expression, "expression");
    let result = rec.required_text(&raw.result, "result");
    let types = rec.plain_list(&raw.signature, "signature");
    let names = rec.plain_list(&raw.parameter_names, "parameter_names");
    let implement_statically = rec.flag(&raw.implement_statically, "implement_statically", false);
    let property = rec.flag(&raw.property, "property", false);

    let (Some(name), Some(expression), Some(result), Some(types), Some(names)) =
        (name, expression, result, types, names)
    else {
        return rec.fail();
    };
    if types.len() != names.len() {
        rec.reject(
            DiagnosticCode::UnmatchedProcessParameters,
            &[
                owner,
                name.as_str(),
                types.len().to_string().as_str(),
                names.len().to_string().as_str(),
            ],
        );
        return rec.fail();
    }
    let mut seen = HashSet::new();
    for parameter in &names {
        if !seen.insert(parameter.as_str()) {
            rec.reject(
                DiagnosticCode::DuplicateProcessParameterName,
                &[owner, name.as_str(), parameter.as_str()],
            );
        }
    }
    if rec.is_rejected() {
        return rec.fail();
    }

    let property = if property && !names.is_empty() {
        rec.report(Diagnostic::new(
            DiagnosticCode::ProcessPropertyWithParameters,
            &prov,
            &[owner, name.as_str()],
        ));
        false
    } else {
        property
    };

    rec.finish(ProcessDef {
        name,
        expression,
        result: TypeIdent::from(result),
        parameters: names
            .into_iter()
            .zip(types)
            .map(|(name, ty)| ProcessParameter {
                name,
                ty: TypeIdent::from(ty),
            })
            .collect(),
        implement_statically,
        property,
        prov,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RawField;
    use crate::diagnostics::DiagnosticCode;

    fn config() -> ResolutionConfig {
        ResolutionConfig::default()
    }

    #[test]
    fn conversion_defaults_to_both_and_explicit() {
        let raw = RawConversion {
            targets: RawField::set(vec![Some("Length".into())]),
            ..RawConversion::default()
        };
        let outcome = process_conversion("Distance", &raw, &Provenance::default(), &config());
        let def = outcome.value().unwrap();
        assert_eq!(def.direction, ConversionDirection::Both);
        assert_eq!(def.cast, CastBehaviour::Explicit);
        assert_eq!(def.targets, vec![TypeIdent::from("Length")]);
    }

    #[test]
    fn conversion_with_bad_direction_is_dropped() {
        let raw = RawConversion {
            direction: RawField::set("sideways".into()),
            targets: RawField::set(vec![Some("Length".into())]),
            ..RawConversion::default()
        };
        let outcome = process_conversion("Distance", &raw, &Provenance::default(), &config());
        assert!(!outcome.has_value());
        assert_eq!(outcome.diagnostics()[0].code, DiagnosticCode::UnrecognizedValue);
    }

    #[test]
    fn empty_unit_list_is_rejected() {
        let field: RawNameList = RawField::set(vec![]);
        let outcome =
            process_unit_list("Length", ListMode::Include, &field, &Provenance::default(), &config());
        assert!(!outcome.has_value());
        assert_eq!(outcome.diagnostics()[0].code, DiagnosticCode::EmptyField);
    }

    #[test]
    fn constant_requires_value() {
        let raw = RawConstant {
            name: RawField::set("PlanckLength".into()),
            unit_instance: RawField::set("Metre".into()),
            ..RawConstant::default()
        };
        let outcome = process_constant("Length", 0, &raw, Category::Scalar, &Provenance::default(), &config());
        assert!(!outcome.has_value());
        assert!(outcome.diagnostics()[0]
            .message()
            .contains("'Length.PlanckLength' is missing required field 'value'"));
    }

    #[test]
    fn operation_parses_kind() {
        let raw = RawOperation {
            kind: RawField::set("Divide".into()),
            other: RawField::set("Time".into()),
            result: RawField::set("Speed".into()),
            ..RawOperation::default()
        };
        let def = process_operation("Length", &raw, &Provenance::default(), &config())
            .value()
            .cloned()
            .unwrap();
        assert_eq!(def.kind, OperationKind::Divide);
        assert!(!def.mirror);
    }

    #[test]
    fn constant_value_follows_the_shape() {
        let constant = |value: ConstantValue| RawConstant {
            name: RawField::set("Ones".into()),
            unit_instance: RawField::set("Metre".into()),
            value: RawField::set(value),
            ..RawConstant::default()
        };
        let ones = constant(ConstantValue::Components(vec![1.0, 1.0, 1.0]));
        let vector = process_constant("Position3", 0, &ones, Category::Vector, &Provenance::default(), &config());
        assert!(vector.has_value());
        assert!(vector.diagnostics().is_empty());

        let scalar = process_constant("Length", 0, &ones, Category::Scalar, &Provenance::default(), &config());
        assert!(!scalar.has_value());
        assert_eq!(
            scalar.diagnostics()[0].message(),
            "scalar 'Length': constant 'Ones' needs a single number"
        );

        let single = constant(ConstantValue::Scalar(1.0));
        let outcome = process_constant("Position3", 0, &single, Category::Vector, &Provenance::default(), &config());
        assert_eq!(outcome.diagnostics()[0].code, DiagnosticCode::ConstantShapeMismatch);

        let mistyped = RawConstant {
            value: RawField::malformed("invalid type: string \"one\", expected a number or a list of numbers"),
            ..constant(ConstantValue::Scalar(1.0))
        };
        let outcome = process_constant("Length", 0, &mistyped, Category::Scalar, &Provenance::default(), &config());
        assert_eq!(outcome.diagnostics()[0].code, DiagnosticCode::MalformedField);
    }

    fn vector_operation(kind: &str, other: &str) -> RawVectorOperation {
        RawVectorOperation {
            kind: RawField::set(kind.into()),
            other: RawField::set(other.into()),
            result: RawField::set("Moment3".into()),
            ..RawVectorOperation::default()
        }
    }

    #[test]
    fn vector_operation_names_and_mirrors() {
        let mut raw = vector_operation("cross", "Force3");
        raw.mirror = RawField::set(true);
        let def = process_vector_operation("Position3", &raw, &Provenance::default(), &config())
            .value()
            .cloned()
            .unwrap();
        assert_eq!(def.name, "Cross");
        assert_eq!(def.position, OperandPosition::Left);
        assert_eq!(def.mirrored_name.as_deref(), Some("CrossInto"));

        raw.position = RawField::set("right".into());
        raw.mirror = RawField::unset();
        raw.mirrored_name = RawField::set("CrossWith".into());
        let def = process_vector_operation("Position3", &raw, &Provenance::default(), &config())
            .value()
            .cloned()
            .unwrap();
        assert_eq!(def.name, "CrossInto");
        assert_eq!(def.mirrored_name.as_deref(), Some("CrossWith"));
    }

    #[test]
    fn vector_operation_mirror_rules() {
        let mut dot = vector_operation("dot", "Force3");
        dot.mirror = RawField::set(true);
        let outcome = process_vector_operation("Position3", &dot, &Provenance::default(), &config());
        assert_eq!(outcome.value().unwrap().mirrored_name, None);
        assert_eq!(outcome.diagnostics()[0].code, DiagnosticCode::MirrorNotSupported);

        let mut contradictory = vector_operation("cross", "Force3");
        contradictory.mirror = RawField::set(false);
        contradictory.mirrored_name = RawField::set("CrossInto".into());
        let outcome = process_vector_operation("Position3", &contradictory, &Provenance::default(), &config());
        assert!(!outcome.has_value());
        assert_eq!(outcome.diagnostics()[0].code, DiagnosticCode::ContradictoryFields);

        let mut unnamed = vector_operation("cross", "Force3");
        unnamed.name = RawField::null();
        let outcome = process_vector_operation("Position3", &unnamed, &Provenance::default(), &config());
        assert_eq!(outcome.diagnostics()[0].code, DiagnosticCode::NullField);
    }

    fn process(names: &[&str], types: &[&str]) -> RawProcess {
        RawProcess {
            name: RawField::set("Scaled".into()),
            expression: RawField::set("factor * this".into()),
            result: RawField::set("Length".into()),
            parameter_names: RawField::set(names.iter().map(|n| Some(n.to_string())).collect()),
            signature: RawField::set(types.iter().map(|t| Some(t.to_string())).collect()),
            ..RawProcess::default()
        }
    }

    #[test]
    fn process_pairs_names_with_types() {
        let def = process_process("Length", 0, &process(&["factor"], &["Scalar"]), &Provenance::default(), &config())
            .value()
            .cloned()
            .unwrap();
        assert_eq!(def.parameters[0].name, "factor");
        assert_eq!(def.parameters[0].ty.as_str(), "Scalar");
        assert!(!def.implement_statically);

        let unmatched = process_process("Length", 0, &process(&["a", "b"], &["Scalar"]), &Provenance::default(), &config());
        assert_eq!(unmatched.diagnostics()[0].code, DiagnosticCode::UnmatchedProcessParameters);

        let repeated = process_process("Length", 0, &process(&["a", "a"], &["Scalar", "Scalar"]), &Provenance::default(), &config());
        assert!(!repeated.has_value());
        assert_eq!(
            repeated.diagnostics()[0].message(),
            "'Length': process 'Scaled' already defines a parameter 'a'"
        );
    }

    #[test]
    fn property_with_parameters_becomes_a_method() {
        let mut raw = process(&["factor"], &["Scalar"]);
        raw.property = RawField::set(true);
        let outcome = process_process("Length", 0, &raw, &Provenance::default(), &config());
        assert!(!outcome.value().unwrap().property);
        assert_eq!(outcome.diagnostics()[0].severity, crate::diagnostics::Severity::Warning);

        let mut bare = process(&[], &[]);
        bare.property = RawField::set(true);
        let outcome = process_process("Length", 0, &bare, &Provenance::default(), &config());
        assert!(outcome.value().unwrap().property);
        assert!(outcome.diagnostics().is_empty());
    }
}
