//! Derivable units: signatures, Cartesian enumeration, derived instances.

use crate::ast::TypeIdent;
use crate::config::ResolutionConfig;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Outcome};
use crate::model::{
    DerivationDef, DerivedCombination, InstanceDef, InstanceKind, Magnitude, ResolvedDerivation,
    ResolvedInstance, ResolvedUnit, SignatureElement, UnitInstanceDef,
};
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Derivations of one unit after their signature units were resolved.
pub(super) struct UnitDerivations {
    pub resolved: Vec<ResolvedDerivation>,
    /// Labels of derivations dropped anywhere in pass 3.
    pub dropped: HashSet<String>,
}

impl UnitDerivations {
    fn find(&self, id: Option<&str>) -> Option<&ResolvedDerivation> {
        match id {
            Some(id) => self.resolved.iter().find(|d| d.id.as_deref() == Some(id)),
            None if self.resolved.len() == 1 && self.dropped.is_empty() => self.resolved.first(),
            None => None,
        }
    }
}

/// Resolve every surviving derivation of `unit` against the units resolved
/// so far. A signature naming a unit that did not resolve is rejected.
pub(super) fn resolve_derivations(
    unit: &TypeIdent,
    derivations: &[DerivationDef],
    mut dropped: HashSet<String>,
    units: &IndexMap<TypeIdent, ResolvedUnit>,
    config: &ResolutionConfig,
    diagnostics: &mut Vec<Diagnostic>,
) -> UnitDerivations {
    let mut resolved = Vec::with_capacity(derivations.len());
    'derivations: for derivation in derivations {
        let mut contributing = Vec::with_capacity(derivation.signature.len());
        for element in &derivation.signature {
            match units.get(&element.unit) {
                Some(u) => contributing.push(u),
                None => {
                    diagnostics.push(Diagnostic::new(
                        DiagnosticCode::UnresolvedSignatureUnit,
                        &derivation.prov,
                        &[unit.as_str(), derivation.label(), element.unit.as_str()],
                    ));
                    dropped.insert(derivation.label().to_owned());
                    continue 'derivations;
                }
            }
        }
        let (combinations, enumerated) = enumerate(unit, derivation, &contributing, config);
        resolved.push(ResolvedDerivation {
            id: derivation.id.clone(),
            expression: derivation.expression.clone(),
            signature: derivation.signature.clone(),
            combinations,
            enumerated,
        });
    }
    UnitDerivations { resolved, dropped }
}

/// Every combination of unbiased contributing instances, with the derived
/// magnitude of each.
fn enumerate(
    unit: &TypeIdent,
    derivation: &DerivationDef,
    contributing: &[&ResolvedUnit],
    config: &ResolutionConfig,
) -> (Vec<DerivedCombination>, bool) {
    let candidates: Vec<Vec<&ResolvedInstance>> = contributing
        .iter()
        .map(|u| u.instances.values().filter(|i| !i.is_biased()).collect())
        .collect();

    let total = candidates
        .iter()
        .try_fold(1usize, |acc, c| acc.checked_mul(c.len()));
    let total = match total {
        Some(t) if t <= config.max_derived_combinations => t,
        _ => {
            warn!(
                unit = %unit,
                derivation = derivation.label(),
                limit = config.max_derived_combinations,
                "derived combinations exceed the limit; enumeration skipped"
            );
            return (Vec::new(), false);
        }
    };

    let mut out = Vec::with_capacity(total);
    if total == 0 {
        return (out, true);
    }
    let mut odometer = vec![0usize; candidates.len()];
    loop {
        let picked: Vec<&ResolvedInstance> = odometer
            .iter()
            .zip(&candidates)
            .map(|(&i, c)| c[i])
            .collect();
        let magnitude = derived_magnitude(&derivation.signature, &picked);
        out.push(DerivedCombination {
            instances: picked.iter().map(|i| i.name.clone()).collect(),
            magnitude,
        });

        // Advance the last position first.
        let mut pos = candidates.len();
        loop {
            if pos == 0 {
                return (out, true);
            }
            pos -= 1;
            odometer[pos] += 1;
            if odometer[pos] < candidates[pos].len() {
                break;
            }
            odometer[pos] = 0;
        }
    }
}

/// ∏ mᵢ^eᵢ over the signature positions.
fn derived_magnitude(signature: &[SignatureElement], picked: &[&ResolvedInstance]) -> Magnitude {
    signature
        .iter()
        .zip(picked)
        .fold(Magnitude::ONE, |acc, (element, instance)| {
            acc.times(&instance.scale.powi(element.exponent))
        })
}

/// Resolve one declared derived instance. An outcome with neither value nor
/// diagnostics means the failure was already reported upstream.
pub(super) fn resolve_derived_instance(
    unit: &TypeIdent,
    instance: &UnitInstanceDef,
    derivations: &UnitDerivations,
    units: &IndexMap<TypeIdent, ResolvedUnit>,
) -> Outcome<ResolvedInstance> {
    let InstanceDef::Derived {
        derivation: id,
        units: names,
    } = &instance.def
    else {
        return Outcome::empty(Vec::new());
    };

    find_derivation(unit, instance, id.as_deref(), derivations)
        .validate(|derivation| check_arity(unit, instance, names, derivation))
        .and_then(|derivation| {
            contributions(unit, instance, names, derivation, units).map(|picked| (derivation, picked))
        })
        .map(|(derivation, picked)| ResolvedInstance {
            name: instance.name.clone(),
            plural: instance.plural.clone(),
            kind: InstanceKind::Derived,
            depends_on: None,
            prefix: None,
            derivation: derivation.id.clone(),
            units: names.clone(),
            scale: derived_magnitude(&derivation.signature, &picked),
            offset: Magnitude::ZERO,
            prov: instance.prov.clone(),
        })
}

fn find_derivation<'d>(
    unit: &TypeIdent,
    instance: &UnitInstanceDef,
    id: Option<&str>,
    derivations: &'d UnitDerivations,
) -> Outcome<&'d ResolvedDerivation> {
    if let Some(derivation) = derivations.find(id) {
        return Outcome::ok(derivation);
    }
    let label = id.unwrap_or("<none>");
    if derivations.dropped.contains(label)
        || (id.is_none() && derivations.resolved.is_empty() && !derivations.dropped.is_empty())
    {
        debug!(unit = %unit, instance = %instance.name, "derived instance lost its derivation");
        return Outcome::empty(Vec::new());
    }
    Outcome::failed(Diagnostic::new(
        DiagnosticCode::UnknownDerivation,
        &instance.prov,
        &[unit.as_str(), instance.name.as_str(), label],
    ))
}

fn check_arity(
    unit: &TypeIdent,
    instance: &UnitInstanceDef,
    names: &[String],
    derivation: &ResolvedDerivation,
) -> Result<(), Diagnostic> {
    if names.len() == derivation.signature.len() {
        return Ok(());
    }
    Err(Diagnostic::new(
        DiagnosticCode::DerivationArityMismatch,
        &instance.prov,
        &[
            unit.as_str(),
            instance.name.as_str(),
            names.len().to_string().as_str(),
            derivation.id.as_deref().unwrap_or("<unnamed>"),
            derivation.signature.len().to_string().as_str(),
        ],
    ))
}

/// The contributing instance for every signature position. A contributing
/// unit that did not resolve was reported on its own.
fn contributions<'u>(
    unit: &TypeIdent,
    instance: &UnitInstanceDef,
    names: &[String],
    derivation: &ResolvedDerivation,
    units: &'u IndexMap<TypeIdent, ResolvedUnit>,
) -> Outcome<Vec<&'u ResolvedInstance>> {
    let mut picked = Vec::with_capacity(names.len());
    for (element, name) in derivation.signature.iter().zip(names) {
        let Some(contributing) = units.get(&element.unit) else {
            return Outcome::empty(Vec::new());
        };
        let args = [
            unit.as_str(),
            instance.name.as_str(),
            element.unit.as_str(),
            name.as_str(),
        ];
        let Some(found) = contributing.instance(name) else {
            return Outcome::failed(Diagnostic::new(
                DiagnosticCode::UnresolvedContributingInstance,
                &instance.prov,
                &args,
            ));
        };
        if found.is_biased() {
            return Outcome::failed(Diagnostic::new(
                DiagnosticCode::BiasedContribution,
                &instance.prov,
                &args,
            ));
        }
        picked.push(found);
    }
    Outcome::ok(picked)
}
