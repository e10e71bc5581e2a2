//! Effective unit-instance sets.
//!
//! A chain is cut into segments: one starts at the root and at every
//! specialization with `inherit_units = false`. Within a segment every list
//! uses the same mode; Include lists only add, Exclude lists only remove.

use super::Resolved;
use crate::config::ResolutionConfig;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::model::{ListMode, QuantityDef, ResolvedUnit};
use std::collections::HashSet;

/// The effective set in unit declaration order, and the segment mode that
/// specializations of `def` continue.
pub(super) fn refine(
    def: &QuantityDef,
    parent: Option<&Resolved>,
    unit: &ResolvedUnit,
    config: &ResolutionConfig,
    diagnostics: &mut Vec<Diagnostic>,
) -> (Vec<String>, Option<ListMode>) {
    let ident = def.ident.as_str();
    let continued = parent.filter(|_| def.inherit().units);

    let (mut set, mut segment): (HashSet<&str>, Option<ListMode>) = match continued {
        Some(parent) => (
            parent
                .quantity
                .unit_instances
                .iter()
                .map(String::as_str)
                .collect(),
            parent.segment,
        ),
        None => match def.units.as_ref().map(|list| list.mode) {
            Some(ListMode::Include) => (HashSet::new(), Some(ListMode::Include)),
            mode => (unit.instance_names().collect(), mode),
        },
    };

    if let Some(list) = &def.units {
        match segment {
            Some(mode) if mode != list.mode => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::InclusionModeSwitch,
                    &list.prov,
                    &[ident, list.mode.label(), mode.label()],
                ));
            }
            _ => {
                segment = Some(list.mode);
                for name in &list.names {
                    if unit.instance(name).is_none() {
                        diagnostics.push(
                            Diagnostic::new(
                                DiagnosticCode::UnrecognizedUnitInstance,
                                &list.prov,
                                &[ident, name.as_str(), unit.ident.as_str()],
                            )
                            .with_severity(config.unrecognized_listing_severity),
                        );
                        continue;
                    }
                    let changed = match list.mode {
                        ListMode::Include => set.insert(name.as_str()),
                        ListMode::Exclude => set.remove(name.as_str()),
                    };
                    if !changed {
                        let code = match list.mode {
                            ListMode::Include => DiagnosticCode::AlreadyIncluded,
                            ListMode::Exclude => DiagnosticCode::AlreadyExcluded,
                        };
                        diagnostics.push(
                            Diagnostic::new(code, &list.prov, &[ident, name.as_str()])
                                .with_severity(config.redundant_listing_severity),
                        );
                    }
                }
            }
        }
    }

    let effective = unit
        .instance_names()
        .filter(|name| set.contains(name))
        .map(str::to_owned)
        .collect();
    (effective, segment)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{length_unit, run};
    use crate::diagnostics::{DiagnosticCode, Severity};
    use serde_json::json;

    fn names(resolved: &super::super::ResolvedQuantities, ident: &str) -> Vec<String> {
        resolved.scalars.get(ident).unwrap().unit_instances.clone()
    }

    #[test]
    fn include_segment_starts_empty_and_only_grows() {
        let (resolved, diags) = run(json!({
            "units": [length_unit()],
            "scalars": [{ "ident": "Length", "unit": "UnitOfLength", "included_units": ["Kilometre", "Metre"] }],
            "scalar_specializations": [
                { "ident": "Distance", "original": "Length", "included_units": ["Foot", "Metre"] }
            ]
        }));
        assert_eq!(names(&resolved, "Length"), vec!["Metre", "Kilometre"]);
        let distance = names(&resolved, "Distance");
        assert_eq!(distance, vec!["Metre", "Kilometre", "Foot"]);
        assert!(names(&resolved, "Length").iter().all(|n| distance.contains(n)));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::AlreadyIncluded);
        assert_eq!(diags[0].severity, Severity::Warning);
    }

    #[test]
    fn exclude_segment_never_contains_excluded_names() {
        let (resolved, diags) = run(json!({
            "units": [length_unit()],
            "scalars": [{ "ident": "Length", "unit": "UnitOfLength", "excluded_units": ["Foot"] }],
            "scalar_specializations": [
                { "ident": "Distance", "original": "Length", "excluded_units": ["Foot", "Millimetre", "Parsec"] }
            ]
        }));
        assert_eq!(names(&resolved, "Length"), vec!["Metre", "Kilometre", "Millimetre"]);
        assert_eq!(names(&resolved, "Distance"), vec!["Metre", "Kilometre"]);
        let codes: Vec<_> = diags.iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![
                DiagnosticCode::AlreadyExcluded,
                DiagnosticCode::UnrecognizedUnitInstance,
            ]
        );
    }

    #[test]
    fn mode_switch_needs_a_new_segment() {
        let (resolved, diags) = run(json!({
            "units": [length_unit()],
            "scalars": [{ "ident": "Length", "unit": "UnitOfLength", "excluded_units": ["Foot"] }],
            "scalar_specializations": [
                { "ident": "Distance", "original": "Length", "included_units": ["Foot"] },
                { "ident": "Height", "original": "Length", "inherit_units": false, "included_units": ["Foot"] }
            ]
        }));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::InclusionModeSwitch);
        assert_eq!(names(&resolved, "Distance"), vec!["Metre", "Kilometre", "Millimetre"]);
        assert_eq!(names(&resolved, "Height"), vec!["Foot"]);
    }

    #[test]
    fn unlisted_quantity_exposes_every_instance() {
        let (resolved, _) = run(json!({
            "units": [length_unit()],
            "scalars": [{ "ident": "Length", "unit": "UnitOfLength" }]
        }));
        assert_eq!(
            names(&resolved, "Length"),
            vec!["Metre", "Kilometre", "Millimetre", "Foot"]
        );
    }
}
