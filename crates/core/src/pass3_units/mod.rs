//! Pass 3: Unit resolution -- instance graphs, derivable signatures and the
//! Cartesian enumeration of derived instances.
//!
//! Units are resolved in dependency layers: a unit is resolved after every
//! unit named by one of its derivation signatures. Units within a layer are
//! independent and run through [`ResolutionConfig::map_items`].

mod derivable;
mod instances;

use crate::ast::TypeIdent;
use crate::cancel::Cancellation;
use crate::config::ResolutionConfig;
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::model::{DerivationDef, ResolvedUnit, UnitDef};
use crate::pass2_population::Population;
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};

/// One unit with the derivations that survived the graph checks.
struct Plan<'a> {
    def: &'a UnitDef,
    derivations: Vec<DerivationDef>,
    dropped: HashSet<String>,
}

pub fn resolve_units(
    units: &Population<UnitDef>,
    config: &ResolutionConfig,
    cancel: &Cancellation,
    sink: &mut dyn DiagnosticSink,
) -> Population<ResolvedUnit> {
    let mut plans: IndexMap<TypeIdent, Plan> = units
        .values()
        .map(|def| (def.ident.clone(), check_signatures(def, units, sink)))
        .collect();

    reject_cyclic_derivations(&mut plans, sink);

    let layers = layers(&plans);
    debug!(layers = layers.len(), "pass 3: unit layers computed");

    let mut resolved: IndexMap<TypeIdent, ResolvedUnit> = IndexMap::new();
    for layer in layers {
        let items: Vec<&Plan> = layer.iter().filter_map(|ident| plans.get(ident)).collect();
        let outcomes = config.map_items(&items, cancel, |plan| {
            let mut diagnostics = Vec::new();
            let derivations = derivable::resolve_derivations(
                &plan.def.ident,
                &plan.derivations,
                plan.dropped.clone(),
                &resolved,
                config,
                &mut diagnostics,
            );
            instances::resolve_unit(plan.def, derivations, &resolved, diagnostics)
        });
        let mut fresh = Vec::new();
        for outcome in outcomes.into_iter().flatten() {
            if let Some(unit) = outcome.drain_into(sink) {
                fresh.push(unit);
            }
        }
        for unit in fresh {
            resolved.insert(unit.ident.clone(), unit);
        }
    }

    let resolved = Population::from_unique(
        units
            .idents()
            .filter_map(|ident| resolved.swap_remove(ident)),
    );
    info!(
        units = resolved.len(),
        dropped = units.len() - resolved.len(),
        "pass 3: units resolved"
    );
    resolved
}

/// Drop derivations that cannot work whatever the resolution order.
fn check_signatures<'a>(
    def: &'a UnitDef,
    units: &Population<UnitDef>,
    sink: &mut dyn DiagnosticSink,
) -> Plan<'a> {
    let mut derivations = Vec::with_capacity(def.derivations.len());
    let mut dropped = HashSet::new();
    for derivation in &def.derivations {
        if def.bias_term {
            sink.report(Diagnostic::new(
                DiagnosticCode::DerivationOnBiasedUnit,
                &derivation.prov,
                &[def.ident.as_str(), derivation.label()],
            ));
            dropped.insert(derivation.label().to_owned());
            continue;
        }
        if let Some(missing) = derivation
            .signature
            .iter()
            .find(|element| !units.contains(element.unit.as_str()))
        {
            sink.report(Diagnostic::new(
                DiagnosticCode::UnresolvedSignatureUnit,
                &derivation.prov,
                &[def.ident.as_str(), derivation.label(), missing.unit.as_str()],
            ));
            dropped.insert(derivation.label().to_owned());
            continue;
        }
        derivations.push(derivation.clone());
    }
    Plan {
        def,
        derivations,
        dropped,
    }
}

// ──────────────────────────────────────────────
// Derivation cycles
// ──────────────────────────────────────────────

fn edges<'p>(plan: &'p Plan) -> impl Iterator<Item = &'p TypeIdent> {
    plan.derivations
        .iter()
        .flat_map(|d| d.signature.iter().map(|e| &e.unit))
}

/// Reject every derivation whose signature reaches back to its own unit.
fn reject_cyclic_derivations(plans: &mut IndexMap<TypeIdent, Plan>, sink: &mut dyn DiagnosticSink) {
    let components = strongly_connected(plans);
    if components.is_empty() {
        return;
    }

    let mut rejected: Vec<(usize, HashSet<usize>)> = Vec::new();
    for (p, plan) in plans.values().enumerate() {
        let unit = plan.def.ident.as_str();
        let Some(members) = components.iter().find(|c| c.contains(unit)) else {
            continue;
        };
        let mut cyclic = HashSet::new();
        for (d, derivation) in plan.derivations.iter().enumerate() {
            let Some(element) = derivation.signature.iter().find(|e| members.contains(&e.unit)) else {
                continue;
            };
            let cycle = cycle_path(plans, unit, element.unit.as_str(), members);
            sink.report(Diagnostic::new(
                DiagnosticCode::CyclicDerivation,
                &derivation.prov,
                &[unit, derivation.label(), cycle.as_str()],
            ));
            cyclic.insert(d);
        }
        rejected.push((p, cyclic));
    }

    for (p, cyclic) in rejected {
        let Some((_, plan)) = plans.get_index_mut(p) else {
            continue;
        };
        let derivations = std::mem::take(&mut plan.derivations);
        for (d, derivation) in derivations.into_iter().enumerate() {
            if cyclic.contains(&d) {
                plan.dropped.insert(derivation.label().to_owned());
            } else {
                plan.derivations.push(derivation);
            }
        }
    }
}

/// Strongly connected components that contain a cycle: more than one member,
/// or a single unit whose signature names itself.
fn strongly_connected(plans: &IndexMap<TypeIdent, Plan>) -> Vec<IndexSet<TypeIdent>> {
    struct Tarjan<'p, 'a> {
        plans: &'p IndexMap<TypeIdent, Plan<'a>>,
        index: HashMap<&'p str, usize>,
        low: HashMap<&'p str, usize>,
        stack: Vec<&'p str>,
        on_stack: HashSet<&'p str>,
        next: usize,
        components: Vec<IndexSet<TypeIdent>>,
    }

    impl<'p, 'a> Tarjan<'p, 'a> {
        fn visit(&mut self, node: &'p str) {
            self.index.insert(node, self.next);
            self.low.insert(node, self.next);
            self.next += 1;
            self.stack.push(node);
            self.on_stack.insert(node);

            let plans = self.plans;
            let mut self_edge = false;
            if let Some(plan) = plans.get(node) {
                for target in edges(plan) {
                    let target = target.as_str();
                    if target == node {
                        self_edge = true;
                    }
                    if !plans.contains_key(target) {
                        continue;
                    }
                    if !self.index.contains_key(target) {
                        self.visit(target);
                        let low = self.low[node].min(self.low[target]);
                        self.low.insert(node, low);
                    } else if self.on_stack.contains(target) {
                        let low = self.low[node].min(self.index[target]);
                        self.low.insert(node, low);
                    }
                }
            }

            if self.low[node] == self.index[node] {
                let mut members = IndexSet::new();
                while let Some(member) = self.stack.pop() {
                    self.on_stack.remove(member);
                    members.insert(TypeIdent::from(member));
                    if member == node {
                        break;
                    }
                }
                if members.len() > 1 || self_edge {
                    self.components.push(members);
                }
            }
        }
    }

    let mut tarjan = Tarjan {
        plans,
        index: HashMap::new(),
        low: HashMap::new(),
        stack: Vec::new(),
        on_stack: HashSet::new(),
        next: 0,
        components: Vec::new(),
    };
    for ident in plans.keys() {
        if !tarjan.index.contains_key(ident.as_str()) {
            tarjan.visit(ident.as_str());
        }
    }
    tarjan.components
}

/// Shortest loop through the edge `from → to`, rendered `A → B → A`.
fn cycle_path(
    plans: &IndexMap<TypeIdent, Plan>,
    from: &str,
    to: &str,
    members: &IndexSet<TypeIdent>,
) -> String {
    if from == to {
        return format!("{} → {}", from, to);
    }
    let mut previous: HashMap<&str, &str> = HashMap::new();
    let mut queue = VecDeque::from([to]);
    while let Some(node) = queue.pop_front() {
        if node == from {
            break;
        }
        let Some(plan) = plans.get(node) else {
            continue;
        };
        for next in edges(plan).map(TypeIdent::as_str) {
            if next != to && members.contains(next) && !previous.contains_key(next) {
                previous.insert(next, node);
                queue.push_back(next);
            }
        }
    }

    let mut back = vec![from];
    let mut cursor = from;
    while cursor != to {
        match previous.get(cursor) {
            Some(&p) => {
                back.push(p);
                cursor = p;
            }
            None => break,
        }
    }
    back.push(from);
    back.reverse();
    back.join(" → ")
}

// ──────────────────────────────────────────────
// Layers
// ──────────────────────────────────────────────

/// Kahn layering over the acyclic derivation graph. Every unit appears in
/// exactly one layer; layers keep population order.
fn layers(plans: &IndexMap<TypeIdent, Plan>) -> Vec<Vec<TypeIdent>> {
    let mut pending: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&TypeIdent>> = HashMap::new();
    for (ident, plan) in plans {
        let deps: HashSet<&str> = edges(plan)
            .map(TypeIdent::as_str)
            .filter(|d| *d != ident.as_str() && plans.contains_key(*d))
            .collect();
        pending.insert(ident.as_str(), deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(ident);
        }
    }

    let mut layers = Vec::new();
    let mut current: Vec<&TypeIdent> = plans
        .keys()
        .filter(|ident| pending.get(ident.as_str()) == Some(&0))
        .collect();
    while !current.is_empty() {
        let mut next = Vec::new();
        for ident in &current {
            for dependent in dependents.get(ident.as_str()).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        next.push(*dependent);
                    }
                }
            }
        }
        next.sort_by_key(|ident| plans.get_index_of(*ident));
        layers.push(current.into_iter().cloned().collect());
        current = next;
    }
    layers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Provenance;
    use crate::model::{Factor, InstanceDef, SignatureElement, UnitInstanceDef};

    fn instance(name: &str, def: InstanceDef) -> UnitInstanceDef {
        UnitInstanceDef {
            name: name.to_string(),
            plural: None,
            def,
            prov: Provenance::new("units.json", 1),
        }
    }

    fn derivation(id: &str, signature: &[(&str, i32)]) -> DerivationDef {
        DerivationDef {
            id: Some(id.to_string()),
            expression: "{0}".to_string(),
            signature: signature
                .iter()
                .map(|(unit, exponent)| SignatureElement {
                    unit: TypeIdent::from(*unit),
                    exponent: *exponent,
                })
                .collect(),
            prov: Provenance::new("units.json", 2),
        }
    }

    fn unit(ident: &str, fixed: &str, derivations: Vec<DerivationDef>) -> UnitDef {
        UnitDef {
            ident: TypeIdent::from(ident),
            prov: Provenance::new("units.json", 1),
            quantity: None,
            bias_term: false,
            instances: vec![instance(fixed, InstanceDef::Fixed)],
            derivations,
        }
    }

    fn run(defs: Vec<UnitDef>) -> (Population<ResolvedUnit>, Vec<Diagnostic>) {
        let mut diags = Vec::new();
        let population = Population::build(defs, &mut diags);
        let resolved = resolve_units(
            &population,
            &ResolutionConfig::default(),
            &Cancellation::new(),
            &mut diags,
        );
        (resolved, diags)
    }

    #[test]
    fn derived_unit_resolves_after_its_signature_units() {
        let mut speed = unit(
            "Speed",
            "MetrePerSecond",
            vec![derivation("speed", &[("Length", 1), ("Time", -1)])],
        );
        speed.instances.push(instance(
            "KilometrePerMinute",
            InstanceDef::Derived {
                derivation: Some("speed".into()),
                units: vec!["Kilometre".into(), "Minute".into()],
            },
        ));
        let mut length = unit("Length", "Metre", Vec::new());
        length.instances.push(instance(
            "Kilometre",
            InstanceDef::Scaled {
                from: "Metre".into(),
                factor: Factor::Literal(1000.0),
            },
        ));
        let mut time = unit("Time", "Second", Vec::new());
        time.instances.push(instance(
            "Minute",
            InstanceDef::Scaled {
                from: "Second".into(),
                factor: Factor::Literal(60.0),
            },
        ));

        let (resolved, diags) = run(vec![speed, length, time]);
        assert!(diags.is_empty(), "{:?}", diags);
        let idents: Vec<&str> = resolved.idents().map(TypeIdent::as_str).collect();
        assert_eq!(idents, vec!["Speed", "Length", "Time"]);
        let speed = resolved.get("Speed").unwrap();
        let v = speed
            .instance("KilometrePerMinute")
            .unwrap()
            .scale
            .as_f64()
            .unwrap();
        assert!((v - 1000.0 / 60.0).abs() < 1e-9);
        assert_eq!(speed.derivations[0].combinations.len(), 4);
    }

    #[test]
    fn derivation_cycle_rejects_only_the_derivations() {
        let (resolved, diags) = run(vec![
            unit("A", "a", vec![derivation("a", &[("B", 1)])]),
            unit("B", "b", vec![derivation("b", &[("A", 1)])]),
            unit("C", "c", vec![derivation("c", &[("C", 2)])]),
        ]);
        assert_eq!(resolved.len(), 3);
        let cycles: Vec<String> = diags
            .iter()
            .filter(|d| d.code == DiagnosticCode::CyclicDerivation)
            .map(|d| d.message())
            .collect();
        assert_eq!(cycles.len(), 3);
        assert!(cycles[0].ends_with("A → B → A"));
        assert!(cycles[1].ends_with("B → A → B"));
        assert!(cycles[2].ends_with("C → C"));
        assert!(resolved.values().all(|u| u.derivations.is_empty()));
    }

    #[test]
    fn biased_unit_cannot_be_derived() {
        let mut temperature = unit("Temperature", "Kelvin", vec![derivation("t", &[("Length", 1)])]);
        temperature.bias_term = true;
        let (resolved, diags) = run(vec![temperature, unit("Length", "Metre", Vec::new())]);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::DerivationOnBiasedUnit);
        assert!(resolved.get("Temperature").unwrap().derivations.is_empty());
    }

    #[test]
    fn unknown_signature_unit_is_reported_once() {
        let (resolved, diags) = run(vec![unit(
            "Speed",
            "MetrePerSecond",
            vec![derivation("speed", &[("Length", 1)])],
        )]);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::UnresolvedSignatureUnit);
        assert!(resolved.contains("Speed"));
    }

    #[test]
    fn sequential_and_parallel_runs_agree() {
        let defs = || {
            vec![
                unit("Area", "SquareMetre", vec![derivation("area", &[("Length", 2)])]),
                unit("Length", "Metre", Vec::new()),
            ]
        };
        let mut diags = Vec::new();
        let population = Population::build(defs(), &mut diags);
        let sequential = ResolutionConfig {
            parallel: false,
            ..ResolutionConfig::default()
        };
        let a = resolve_units(&population, &sequential, &Cancellation::new(), &mut diags);
        let b = resolve_units(
            &population,
            &ResolutionConfig::default(),
            &Cancellation::new(),
            &mut diags,
        );
        assert_eq!(a, b);
    }
}
