//! Unit instance graph: one fixed root, derived roots, and every other
//! instance resolved through its single same-unit dependency.

use super::derivable::{resolve_derived_instance, UnitDerivations};
use crate::ast::TypeIdent;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Outcome};
use crate::model::{InstanceDef, Magnitude, ResolvedInstance, ResolvedUnit, UnitDef, UnitInstanceDef};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Resolve every instance of `def`. The unit is dropped only when its fixed
/// instance is missing or ambiguous; otherwise broken instances are dropped
/// one by one.
pub(super) fn resolve_unit(
    def: &UnitDef,
    derivations: UnitDerivations,
    units: &IndexMap<TypeIdent, ResolvedUnit>,
    mut diagnostics: Vec<Diagnostic>,
) -> Outcome<ResolvedUnit> {
    let unit = &def.ident;
    let fixed: Vec<&UnitInstanceDef> = def
        .instances
        .iter()
        .filter(|i| matches!(i.def, InstanceDef::Fixed))
        .collect();
    let fixed = match fixed.as_slice() {
        [only] => *only,
        [] => {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::MissingFixedInstance,
                &def.prov,
                &[unit.as_str()],
            ));
            return Outcome::empty(diagnostics);
        }
        several => {
            let names = several
                .iter()
                .map(|i| i.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::DuplicateFixedInstance,
                &def.prov,
                &[unit.as_str(), names.as_str()],
            ));
            return Outcome::empty(diagnostics);
        }
    };

    let declared: HashMap<&str, &UnitInstanceDef> = def
        .instances
        .iter()
        .map(|i| (i.name.as_str(), i))
        .collect();
    let mut resolved: HashMap<String, ResolvedInstance> = HashMap::new();
    let mut dead: HashSet<&str> = HashSet::new();
    let mut pending: Vec<&UnitInstanceDef> = Vec::new();

    resolved.insert(fixed.name.clone(), root(fixed));

    for instance in &def.instances {
        match &instance.def {
            InstanceDef::Fixed => {}
            InstanceDef::Derived { .. } => {
                let (found, reported) =
                    resolve_derived_instance(unit, instance, &derivations, units).into_parts();
                diagnostics.extend(reported);
                match found {
                    Some(r) => {
                        resolved.insert(instance.name.clone(), r);
                    }
                    None => {
                        dead.insert(&instance.name);
                    }
                }
            }
            InstanceDef::Biased { .. } if !def.bias_term => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::BiasNotSupported,
                    &instance.prov,
                    &[unit.as_str(), instance.name.as_str()],
                ));
                dead.insert(&instance.name);
            }
            _ => pending.push(instance),
        }
    }

    // Resolve in waves until nothing moves.
    loop {
        let before = pending.len();
        pending.retain(|instance| {
            let Some(from) = instance.def.depends_on() else {
                return false;
            };
            match resolved.get(from) {
                Some(dep) => {
                    let r = compose(instance, dep);
                    resolved.insert(instance.name.clone(), r);
                    false
                }
                None => true,
            }
        });
        if pending.len() == before {
            break;
        }
    }

    // Whatever is left is broken or cut off.
    let stuck: HashMap<&str, &str> = pending
        .iter()
        .filter_map(|i| i.def.depends_on().map(|from| (i.name.as_str(), from)))
        .collect();
    for instance in &pending {
        let Some(from) = instance.def.depends_on() else {
            continue;
        };
        if !declared.contains_key(from) {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::UnresolvedInstanceDependency,
                &instance.prov,
                &[unit.as_str(), instance.name.as_str(), from],
            ));
        } else if dead.contains(from) {
            debug!(unit = %unit, instance = %instance.name, depends_on = from, "dependency was rejected");
        } else if let Some(cycle) = cycle_through(&instance.name, &stuck) {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::CyclicInstanceDependency,
                &instance.prov,
                &[unit.as_str(), instance.name.as_str(), cycle.as_str()],
            ));
        } else {
            debug!(unit = %unit, instance = %instance.name, depends_on = from, "instance cut off upstream");
        }
    }

    let instances: IndexMap<String, ResolvedInstance> = def
        .instances
        .iter()
        .filter_map(|i| resolved.remove(&i.name).map(|r| (i.name.clone(), r)))
        .collect();

    Outcome::new(
        Some(ResolvedUnit {
            ident: unit.clone(),
            prov: def.prov.clone(),
            quantity: def.quantity.clone(),
            bias_term: def.bias_term,
            fixed: fixed.name.clone(),
            instances,
            derivations: derivations.resolved,
        }),
        diagnostics,
    )
}

fn root(instance: &UnitInstanceDef) -> ResolvedInstance {
    ResolvedInstance {
        name: instance.name.clone(),
        plural: instance.plural.clone(),
        kind: instance.def.kind(),
        depends_on: None,
        prefix: None,
        derivation: None,
        units: Vec::new(),
        scale: Magnitude::ONE,
        offset: Magnitude::ZERO,
        prov: instance.prov.clone(),
    }
}

/// Magnitude of `instance` from its resolved dependency.
fn compose(instance: &UnitInstanceDef, dep: &ResolvedInstance) -> ResolvedInstance {
    let (scale, offset, prefix) = match &instance.def {
        InstanceDef::Scaled { factor, .. } => (dep.scale.times(&factor.magnitude()), dep.offset.clone(), None),
        InstanceDef::Biased { bias, .. } => (dep.scale.clone(), dep.offset.plus(&bias.magnitude()), None),
        InstanceDef::Prefixed { prefix, .. } => (
            dep.scale.times(&Magnitude::Exact(prefix.factor())),
            dep.offset.clone(),
            Some(prefix.name().to_owned()),
        ),
        _ => (dep.scale.clone(), dep.offset.clone(), None),
    };
    ResolvedInstance {
        name: instance.name.clone(),
        plural: instance.plural.clone(),
        kind: instance.def.kind(),
        depends_on: Some(dep.name.clone()),
        prefix,
        derivation: None,
        units: Vec::new(),
        scale,
        offset,
        prov: instance.prov.clone(),
    }
}

/// The cycle through `start` among stuck instances, rendered `A → B → A`.
fn cycle_through(start: &str, stuck: &HashMap<&str, &str>) -> Option<String> {
    let mut path = vec![start];
    let mut current = *stuck.get(start)?;
    while current != start {
        if path.contains(&current) {
            return None;
        }
        path.push(current);
        current = *stuck.get(current)?;
    }
    path.push(start);
    Some(path.join(" → "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Provenance;
    use crate::model::Factor;
    use crate::prefix::Prefix;

    fn inst(name: &str, def: InstanceDef) -> UnitInstanceDef {
        UnitInstanceDef {
            name: name.to_string(),
            plural: None,
            def,
            prov: Provenance::new("units.json", 1),
        }
    }

    fn scaled(name: &str, from: &str, factor: f64) -> UnitInstanceDef {
        inst(
            name,
            InstanceDef::Scaled {
                from: from.to_string(),
                factor: Factor::Literal(factor),
            },
        )
    }

    fn unit(bias_term: bool, instances: Vec<UnitInstanceDef>) -> UnitDef {
        UnitDef {
            ident: TypeIdent::from("Length"),
            prov: Provenance::new("units.json", 1),
            quantity: None,
            bias_term,
            instances,
            derivations: Vec::new(),
        }
    }

    fn resolve(def: &UnitDef) -> Outcome<ResolvedUnit> {
        let derivations = UnitDerivations {
            resolved: Vec::new(),
            dropped: HashSet::new(),
        };
        resolve_unit(def, derivations, &IndexMap::new(), Vec::new())
    }

    fn codes(outcome: &Outcome<ResolvedUnit>) -> Vec<DiagnosticCode> {
        outcome.diagnostics().iter().map(|d| d.code).collect()
    }

    #[test]
    fn kilometre_is_one_thousand_metres() {
        let def = unit(
            false,
            vec![
                scaled("Kilometre", "Metre", 1000.0),
                inst("Metre", InstanceDef::Fixed),
                inst(
                    "Millimetre",
                    InstanceDef::Prefixed {
                        from: "Metre".into(),
                        prefix: Prefix::metric("milli").unwrap(),
                    },
                ),
            ],
        );
        let outcome = resolve(&def);
        assert!(outcome.diagnostics().is_empty());
        let resolved = outcome.value().unwrap();
        assert_eq!(resolved.fixed, "Metre");
        assert_eq!(resolved.instance("Kilometre").unwrap().scale, Magnitude::Exact(1000.0));
        let milli = resolved.instance("Millimetre").unwrap().scale.as_f64().unwrap();
        assert!((milli - 1e-3).abs() < 1e-15);
        assert_eq!(resolved.instance("Metre").unwrap().scale, Magnitude::ONE);
        let names: Vec<&str> = resolved.instance_names().collect();
        assert_eq!(names, vec!["Kilometre", "Metre", "Millimetre"]);
    }

    #[test]
    fn exactly_one_fixed_instance() {
        let none = resolve(&unit(false, vec![scaled("Kilometre", "Metre", 1000.0)]));
        assert!(!none.has_value());
        assert_eq!(codes(&none), vec![DiagnosticCode::MissingFixedInstance]);

        let two = resolve(&unit(
            false,
            vec![inst("Metre", InstanceDef::Fixed), inst("Foot", InstanceDef::Fixed)],
        ));
        assert!(!two.has_value());
        assert_eq!(codes(&two), vec![DiagnosticCode::DuplicateFixedInstance]);
        assert!(two.diagnostics()[0].message().contains("Metre, Foot"));
    }

    #[test]
    fn broken_edges_drop_only_the_unreachable_subset() {
        let def = unit(
            false,
            vec![
                inst("Metre", InstanceDef::Fixed),
                scaled("Kilometre", "Metre", 1000.0),
                scaled("Orphan", "Missing", 2.0),
                scaled("OrphanChild", "Orphan", 2.0),
                scaled("A", "B", 2.0),
                scaled("B", "A", 2.0),
                scaled("HangsOnCycle", "A", 2.0),
            ],
        );
        let outcome = resolve(&def);
        assert_eq!(
            codes(&outcome),
            vec![
                DiagnosticCode::UnresolvedInstanceDependency,
                DiagnosticCode::CyclicInstanceDependency,
                DiagnosticCode::CyclicInstanceDependency,
            ]
        );
        assert!(outcome.diagnostics()[1].message().ends_with("A → B → A"));
        let resolved = outcome.value().unwrap();
        let names: Vec<&str> = resolved.instance_names().collect();
        assert_eq!(names, vec!["Metre", "Kilometre"]);
    }

    #[test]
    fn bias_requires_unit_support() {
        let instances = vec![
            inst("Kelvin", InstanceDef::Fixed),
            inst(
                "Celsius",
                InstanceDef::Biased {
                    from: "Kelvin".into(),
                    bias: Factor::Literal(273.15),
                },
            ),
            scaled("Centicelsius", "Celsius", 0.01),
        ];
        let rejected = resolve(&unit(false, instances.clone()));
        assert_eq!(codes(&rejected), vec![DiagnosticCode::BiasNotSupported]);
        assert_eq!(rejected.value().unwrap().instances.len(), 1);

        let accepted = resolve(&unit(true, instances));
        assert!(accepted.diagnostics().is_empty());
        let celsius = accepted.value().unwrap().instance("Celsius").unwrap().clone();
        assert_eq!(celsius.offset, Magnitude::Exact(273.15));
        assert!(celsius.is_biased());
        let centi = accepted.value().unwrap().instance("Centicelsius").unwrap().clone();
        assert_eq!(centi.scale, Magnitude::Exact(0.01));
        assert_eq!(centi.offset, Magnitude::Exact(273.15));
    }

    #[test]
    fn expression_factor_makes_magnitude_symbolic() {
        let def = unit(
            false,
            vec![
                inst("Metre", InstanceDef::Fixed),
                inst(
                    "Foot",
                    InstanceDef::Scaled {
                        from: "Metre".into(),
                        factor: Factor::Expression("0.3048".into()),
                    },
                ),
                scaled("Yard", "Foot", 3.0),
                inst("Feet", InstanceDef::Alias { from: "Foot".into() }),
            ],
        );
        let outcome = resolve(&def);
        let resolved = outcome.value().unwrap();
        assert_eq!(
            resolved.instance("Yard").unwrap().scale,
            Magnitude::Symbolic("(0.3048) * (3)".into())
        );
        assert_eq!(
            resolved.instance("Feet").unwrap().scale,
            Magnitude::Symbolic("0.3048".into())
        );
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let def = unit(
            false,
            vec![inst("Metre", InstanceDef::Fixed), scaled("Loop", "Loop", 2.0)],
        );
        let outcome = resolve(&def);
        assert_eq!(codes(&outcome), vec![DiagnosticCode::CyclicInstanceDependency]);
        assert!(outcome.diagnostics()[0].message().ends_with("Loop → Loop"));
    }
}
