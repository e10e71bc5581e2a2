//! Conversion tables: inherited entries, the implicit pair with the
//! original quantity, then the quantity's own declarations.

use super::Context;
use crate::ast::TypeIdent;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::model::{ConversionEntry, ConversionOrigin, QuantityDef, QuantityForm, ResolvedQuantity};
use indexmap::IndexMap;
use std::collections::HashSet;

pub(super) fn conversion_table(
    def: &QuantityDef,
    parent: Option<&ResolvedQuantity>,
    context: &Context,
    diagnostics: &mut Vec<Diagnostic>,
) -> IndexMap<TypeIdent, ConversionEntry> {
    let ident = &def.ident;
    let mut table = IndexMap::new();

    if let Some(parent) = parent.filter(|_| def.inherit().conversions) {
        for (target, entry) in &parent.conversions {
            if target != ident {
                table.insert(
                    target.clone(),
                    ConversionEntry {
                        origin: ConversionOrigin::Inherited,
                        ..*entry
                    },
                );
            }
        }
    }

    let implied = match &def.form {
        QuantityForm::Specialization {
            original,
            original_conversion,
            ..
        } if original_conversion.enabled => {
            table.insert(
                original.clone(),
                ConversionEntry {
                    outgoing: Some(original_conversion.forwards),
                    incoming: Some(original_conversion.backwards),
                    origin: ConversionOrigin::Specialization,
                },
            );
            Some(original)
        }
        _ => None,
    };

    let mut declared: HashSet<(&TypeIdent, bool)> = HashSet::new();
    for conversion in &def.conversions {
        for target in &conversion.targets {
            if target == ident {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::ConvertibleToSelf,
                    &conversion.prov,
                    &[ident.as_str()],
                ));
                continue;
            }
            if !context.populations.contains(context.category, target.as_str()) {
                let diagnostic = match context.populations.category_of(target.as_str()) {
                    Some(_) => Diagnostic::new(
                        DiagnosticCode::ConversionCategoryMismatch,
                        &conversion.prov,
                        &[ident.as_str(), target.as_str(), context.category.label()],
                    ),
                    None => Diagnostic::new(
                        DiagnosticCode::UnresolvedConversionTarget,
                        &conversion.prov,
                        &[ident.as_str(), target.as_str()],
                    ),
                };
                diagnostics.push(diagnostic);
                continue;
            }

            for (outgoing, wanted) in [
                (true, conversion.direction.outgoing()),
                (false, conversion.direction.incoming()),
            ] {
                if !wanted {
                    continue;
                }
                let direction = if outgoing { "outgoing" } else { "incoming" };
                if implied == Some(target) {
                    diagnostics.push(Diagnostic::new(
                        DiagnosticCode::RedundantOriginalConversion,
                        &conversion.prov,
                        &[ident.as_str(), direction, target.as_str()],
                    ));
                    continue;
                }
                if !declared.insert((target, outgoing)) {
                    diagnostics.push(Diagnostic::new(
                        DiagnosticCode::DuplicateConversion,
                        &conversion.prov,
                        &[ident.as_str(), direction, target.as_str()],
                    ));
                    continue;
                }
                let entry = table.entry(target.clone()).or_insert(ConversionEntry {
                    outgoing: None,
                    incoming: None,
                    origin: ConversionOrigin::Declared,
                });
                if entry.origin != ConversionOrigin::Declared {
                    *entry = ConversionEntry {
                        outgoing: None,
                        incoming: None,
                        origin: ConversionOrigin::Declared,
                    };
                }
                if outgoing {
                    entry.outgoing = Some(conversion.cast);
                } else {
                    entry.incoming = Some(conversion.cast);
                }
            }
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::super::tests::{length_unit, run};
    use crate::ast::TypeIdent;
    use crate::diagnostics::DiagnosticCode;
    use crate::model::{CastBehaviour, ConversionOrigin};
    use serde_json::json;

    #[test]
    fn declarations_are_checked_per_target_and_direction() {
        let (resolved, diags) = run(json!({
            "units": [length_unit()],
            "scalars": [
                { "ident": "Length", "unit": "UnitOfLength" },
                { "ident": "Width", "unit": "UnitOfLength" }
            ],
            "vectors": [{ "ident": "Position", "unit": "UnitOfLength", "dimension": 3 }],
            "scalar_specializations": [{
                "ident": "Distance",
                "original": "Length",
                "conversions": [
                    { "targets": ["Distance", "Length", "Width", "Position", "Nowhere"], "cast": "implicit" },
                    { "direction": "outgoing", "targets": ["Width"] }
                ]
            }]
        }));
        let codes: Vec<_> = diags.iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![
                DiagnosticCode::ConvertibleToSelf,
                DiagnosticCode::RedundantOriginalConversion,
                DiagnosticCode::RedundantOriginalConversion,
                DiagnosticCode::ConversionCategoryMismatch,
                DiagnosticCode::UnresolvedConversionTarget,
                DiagnosticCode::DuplicateConversion,
            ]
        );
        let distance = resolved.scalars.get("Distance").unwrap();
        let width = &distance.conversions[&TypeIdent::from("Width")];
        assert_eq!(width.outgoing, Some(CastBehaviour::Implicit));
        assert_eq!(width.incoming, Some(CastBehaviour::Implicit));
        assert_eq!(width.origin, ConversionOrigin::Declared);
        assert_eq!(distance.conversions.len(), 2);
    }

    #[test]
    fn inherited_entries_are_gated_and_replaced_by_declarations() {
        let (resolved, diags) = run(json!({
            "units": [length_unit()],
            "scalars": [
                { "ident": "Length", "unit": "UnitOfLength", "conversions": [{ "targets": ["Width"] }] },
                { "ident": "Width", "unit": "UnitOfLength" }
            ],
            "scalar_specializations": [
                { "ident": "Distance", "original": "Length" },
                { "ident": "Height", "original": "Distance",
                  "conversions": [{ "direction": "incoming", "cast": "none", "targets": ["Width"] }] },
                { "ident": "Depth", "original": "Length", "inherit_conversions": false, "original_conversion": false }
            ]
        }));
        assert!(diags.is_empty(), "{:?}", diags);
        let distance = resolved.scalars.get("Distance").unwrap();
        assert_eq!(
            distance.conversions[&TypeIdent::from("Width")].origin,
            ConversionOrigin::Inherited
        );

        let height = resolved.scalars.get("Height").unwrap();
        let length = &height.conversions[&TypeIdent::from("Length")];
        assert_eq!(length.origin, ConversionOrigin::Inherited);
        let width = &height.conversions[&TypeIdent::from("Width")];
        assert_eq!(width.origin, ConversionOrigin::Declared);
        assert_eq!(width.outgoing, None);
        assert_eq!(width.incoming, Some(CastBehaviour::None));

        assert!(resolved.scalars.get("Depth").unwrap().conversions.is_empty());
    }
}
