//! Unit records: instances and derivable signatures.

use super::{display_ident, Record};
use crate::ast::{Provenance, RawDerivation, RawField, RawUnit, RawUnitInstance, TypeIdent};
use crate::config::ResolutionConfig;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Outcome};
use crate::model::{
    DerivationDef, Factor, InstanceDef, InstanceKind, SignatureElement, UnitDef, UnitInstanceDef,
};
use crate::prefix::Prefix;
use std::collections::HashMap;

const INSTANCE_KINDS: &[(&str, InstanceKind)] = &[
    ("fixed", InstanceKind::Fixed),
    ("alias", InstanceKind::Alias),
    ("scaled", InstanceKind::Scaled),
    ("biased", InstanceKind::Biased),
    ("prefixed", InstanceKind::Prefixed),
    ("derived", InstanceKind::Derived),
];

pub(super) fn process_unit(raw: &RawUnit, config: &ResolutionConfig) -> Outcome<UnitDef> {
    let label = display_ident(&raw.ident, || format!("<unit at {}>", raw.prov));
    let mut rec = Record::new("unit", label, raw.prov.clone(), config);
    if !rec.well_formed(raw.malformed.as_ref(), "units") {
        return rec.fail();
    }
    let ident = rec.required_text(&raw.ident, "ident");
    let quantity = rec.optional_text(&raw.quantity, "quantity");
    let bias_term = rec.flag(&raw.bias_term, "bias_term", false);
    let Some(ident) = ident else {
        return rec.fail();
    };

    let instances = process_instances(&ident, &raw.instances, &mut rec);
    let derivations = process_derivations(&ident, &raw.derivations, &mut rec);

    rec.finish(UnitDef {
        ident: TypeIdent::from(ident),
        prov: raw.prov.clone(),
        quantity: quantity.map(TypeIdent::from),
        bias_term,
        instances,
        derivations,
    })
}

// ──────────────────────────────────────────────
// Instances
// ──────────────────────────────────────────────

fn process_instances(
    unit: &str,
    raws: &[RawUnitInstance],
    rec: &mut Record<'_>,
) -> Vec<UnitInstanceDef> {
    let mut out: Vec<UnitInstanceDef> = Vec::with_capacity(raws.len());
    let mut plurals: HashMap<String, String> = HashMap::new();

    for (i, raw) in raws.iter().enumerate() {
        let outcome = process_instance(unit, i, raw, rec.prov(), rec.config());
        let Some(instance) = rec.absorb(outcome) else {
            continue;
        };
        if out.iter().any(|existing| existing.name == instance.name) {
            rec.report(Diagnostic::new(
                DiagnosticCode::DuplicateInstanceName,
                &instance.prov,
                &[unit, instance.name.as_str()],
            ));
            continue;
        }
        if let Some(plural) = &instance.plural {
            if plurals.contains_key(plural) {
                rec.report(Diagnostic::new(
                    DiagnosticCode::DuplicatePluralForm,
                    &instance.prov,
                    &[unit, plural.as_str(), instance.name.as_str()],
                ));
            } else {
                plurals.insert(plural.clone(), instance.name.clone());
            }
        }
        out.push(instance);
    }
    out
}

fn process_instance(
    unit: &str,
    index: usize,
    raw: &RawUnitInstance,
    unit_prov: &Provenance,
    config: &ResolutionConfig,
) -> Outcome<UnitInstanceDef> {
    let prov = raw.prov.or(unit_prov);
    let label = display_ident(&raw.name, || format!("#{}", index));
    let mut rec = Record::new("unit instance", format!("{}.{}", unit, label), prov.clone(), config);
    if !rec.well_formed(raw.malformed.as_ref(), unit) {
        return rec.fail();
    }

    let kind = rec.keyword(&raw.kind, "kind", INSTANCE_KINDS, None);
    let name = rec.required_text(&raw.name, "name");
    let plural = rec.optional_text(&raw.plural, "plural");
    let Some(kind) = kind else {
        return rec.fail();
    };

    let kind_label = match kind {
        InstanceKind::Fixed => "fixed instance",
        InstanceKind::Alias => "alias instance",
        InstanceKind::Scaled => "scaled instance",
        InstanceKind::Biased => "biased instance",
        InstanceKind::Prefixed => "prefixed instance",
        InstanceKind::Derived => "derived instance",
    };
    let uses_from = matches!(
        kind,
        InstanceKind::Alias | InstanceKind::Scaled | InstanceKind::Biased | InstanceKind::Prefixed
    );
    if !uses_from {
        rec.inapplicable(&raw.from, "from", kind_label);
    }
    if kind != InstanceKind::Scaled {
        rec.inapplicable(&raw.scale, "scale", kind_label);
        rec.inapplicable(&raw.scale_expression, "scale_expression", kind_label);
    }
    if kind != InstanceKind::Biased {
        rec.inapplicable(&raw.bias, "bias", kind_label);
        rec.inapplicable(&raw.bias_expression, "bias_expression", kind_label);
    }
    if kind != InstanceKind::Prefixed {
        rec.inapplicable(&raw.metric_prefix, "metric_prefix", kind_label);
        rec.inapplicable(&raw.binary_prefix, "binary_prefix", kind_label);
    }
    if kind != InstanceKind::Derived {
        rec.inapplicable(&raw.derivation, "derivation", kind_label);
        rec.inapplicable(&raw.units, "units", kind_label);
    }

    let from = if uses_from {
        rec.required_text(&raw.from, "from")
    } else {
        None
    };

    let def = match kind {
        InstanceKind::Fixed => Some(InstanceDef::Fixed),
        InstanceKind::Alias => from.map(|from| InstanceDef::Alias { from }),
        InstanceKind::Scaled => {
            let factor = factor(&mut rec, &raw.scale, "scale", &raw.scale_expression, "scale_expression");
            from.zip(factor)
                .map(|(from, factor)| InstanceDef::Scaled { from, factor })
        }
        InstanceKind::Biased => {
            let bias = factor(&mut rec, &raw.bias, "bias", &raw.bias_expression, "bias_expression");
            from.zip(bias).map(|(from, bias)| InstanceDef::Biased { from, bias })
        }
        InstanceKind::Prefixed => {
            let prefix = prefix(&mut rec, raw);
            from.zip(prefix)
                .map(|(from, prefix)| InstanceDef::Prefixed { from, prefix })
        }
        InstanceKind::Derived => {
            let derivation = rec.optional_text(&raw.derivation, "derivation");
            rec.name_list(&raw.units, "units")
                .map(|units| InstanceDef::Derived { derivation, units })
        }
    };

    match (name, def) {
        (Some(name), Some(def)) => rec.finish(UnitInstanceDef {
            name,
            plural,
            def,
            prov,
        }),
        _ => rec.fail(),
    }
}

/// Exactly one of a literal and an expression.
fn factor(
    rec: &mut Record<'_>,
    literal: &RawField<f64>,
    literal_name: &str,
    expression: &RawField<String>,
    expression_name: &str,
) -> Option<Factor> {
    match (literal.is_explicit(), expression.is_explicit()) {
        (true, true) => {
            rec.contradictory(literal_name, expression_name);
            None
        }
        (false, true) => rec
            .required_text(expression, expression_name)
            .map(Factor::Expression),
        _ => rec.required(literal, literal_name).map(Factor::Literal),
    }
}

fn prefix(rec: &mut Record<'_>, raw: &RawUnitInstance) -> Option<Prefix> {
    match (raw.metric_prefix.is_explicit(), raw.binary_prefix.is_explicit()) {
        (true, true) => {
            rec.contradictory("metric_prefix", "binary_prefix");
            None
        }
        (false, true) => {
            let name = rec.required_text(&raw.binary_prefix, "binary_prefix")?;
            let found = Prefix::binary(&name);
            if found.is_none() {
                rec.unrecognized("binary_prefix", &name, &Prefix::binary_names());
            }
            found
        }
        _ => {
            let name = rec.required_text(&raw.metric_prefix, "metric_prefix")?;
            let found = Prefix::metric(&name);
            if found.is_none() {
                rec.unrecognized("metric_prefix", &name, &Prefix::metric_names());
            }
            found
        }
    }
}

// ──────────────────────────────────────────────
// Derivations
// ──────────────────────────────────────────────

fn process_derivations(
    unit: &str,
    raws: &[RawDerivation],
    rec: &mut Record<'_>,
) -> Vec<DerivationDef> {
    let several = raws.len() > 1;
    let mut out: Vec<DerivationDef> = Vec::with_capacity(raws.len());

    for (i, raw) in raws.iter().enumerate() {
        let outcome = process_derivation(unit, i, raw, rec.prov(), rec.config());
        let Some(derivation) = rec.absorb(outcome) else {
            continue;
        };
        if several && derivation.id.is_none() {
            rec.report(Diagnostic::new(
                DiagnosticCode::UnnamedDerivation,
                &derivation.prov,
                &[unit],
            ));
            continue;
        }
        if let Some(id) = &derivation.id {
            if out.iter().any(|d| d.id.as_ref() == Some(id)) {
                rec.report(Diagnostic::new(
                    DiagnosticCode::DuplicateDerivationId,
                    &derivation.prov,
                    &[unit, id.as_str()],
                ));
                continue;
            }
        }
        let same_units = |d: &DerivationDef| {
            d.signature.len() == derivation.signature.len()
                && d.signature
                    .iter()
                    .zip(&derivation.signature)
                    .all(|(a, b)| a.unit == b.unit)
        };
        if let Some(first) = out.iter().find(|d| same_units(d)) {
            let rendered = derivation
                .signature
                .iter()
                .map(|e| e.unit.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            rec.report(Diagnostic::new(
                DiagnosticCode::DuplicateSignature,
                &derivation.prov,
                &[unit, rendered.as_str(), first.label()],
            ));
            continue;
        }
        out.push(derivation);
    }
    out
}

fn process_derivation(
    unit: &str,
    index: usize,
    raw: &RawDerivation,
    unit_prov: &Provenance,
    config: &ResolutionConfig,
) -> Outcome<DerivationDef> {
    let prov = raw.prov.or(unit_prov);
    let label = display_ident(&raw.id, || format!("#{}", index));
    let mut rec = Record::new("derivation", format!("{}/{}", unit, label), prov.clone(), config);
    if !rec.well_formed(raw.malformed.as_ref(), unit) {
        return rec.fail();
    }

    let id = rec.optional_text(&raw.id, "id");
    let expression = rec.required_text(&raw.expression, "expression");
    let Some(elements) = rec.required(&raw.signature, "signature") else {
        return rec.fail();
    };
    if elements.is_empty() {
        rec.empty("signature");
        return rec.fail();
    }

    let mut signature = Vec::with_capacity(elements.len());
    for (i, element) in elements.iter().enumerate() {
        let unit_field = format!("signature[{}].unit", i);
        let exponent_field = format!("signature[{}].exponent", i);
        let unit = rec.required_text(&element.unit, &unit_field);
        let exponent = rec.optional(&element.exponent, &exponent_field).unwrap_or(1);
        let exponent = match i32::try_from(exponent) {
            Ok(0) | Err(_) => {
                rec.out_of_range(&exponent_field, &exponent.to_string(), "a non-zero 32-bit integer");
                None
            }
            Ok(e) => Some(e),
        };
        if let (Some(unit), Some(exponent)) = (unit, exponent) {
            signature.push(SignatureElement {
                unit: TypeIdent::from(unit),
                exponent,
            });
        }
    }

    match expression {
        Some(expression) if !rec.is_rejected() => rec.finish(DerivationDef {
            id,
            expression,
            signature,
            prov,
        }),
        _ => rec.fail(),
    }
}
