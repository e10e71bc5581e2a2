//! Pass 4: Quantity resolution -- specialization chains, inherited fields,
//! effective unit-instance sets, conversion tables and members.
//!
//! Each category is resolved layer by layer along its chains: bases first,
//! then every specialization once its original is resolved. Items of one
//! layer only read earlier layers, so they run through
//! [`ResolutionConfig::map_items`].
//!
//! Vector groups resolve before vectors (a member may take the group's
//! unit); group membership is registered once every vector is resolved.

mod chain;
mod conversion;
mod fields;
mod groups;
mod inclusion;
mod members;

use crate::ast::TypeIdent;
use crate::cancel::Cancellation;
use crate::config::ResolutionConfig;
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink, Outcome};
use crate::model::{
    Category, ListMode, QuantityDef, QuantityForm, ResolvedQuantity, ResolvedUnit,
    SpecializationInfo,
};
use crate::pass2_population::{Population, Populations};
use indexmap::IndexMap;
use tracing::info;

/// Resolved quantities of every category.
#[derive(Debug, Clone, Default)]
pub struct ResolvedQuantities {
    pub scalars: Population<ResolvedQuantity>,
    pub vectors: Population<ResolvedQuantity>,
    pub vector_groups: Population<ResolvedQuantity>,
}

/// Read-only inputs shared by every item of a category.
struct Context<'a> {
    category: Category,
    populations: &'a Populations,
    units: &'a Population<ResolvedUnit>,
    /// Resolved vector groups, available while resolving vectors.
    groups: Option<&'a Population<ResolvedQuantity>>,
    config: &'a ResolutionConfig,
}

/// A resolved quantity plus the chain state its specializations continue.
struct Resolved {
    quantity: ResolvedQuantity,
    /// Mode of the inclusion segment the quantity ends, once a list set it.
    segment: Option<ListMode>,
}

pub fn resolve_quantities(
    populations: &Populations,
    units: &Population<ResolvedUnit>,
    config: &ResolutionConfig,
    cancel: &Cancellation,
    sink: &mut dyn DiagnosticSink,
) -> ResolvedQuantities {
    let vector_groups = resolve_category(
        &populations.vector_groups,
        &Context {
            category: Category::VectorGroup,
            populations,
            units,
            groups: None,
            config,
        },
        cancel,
        sink,
    );
    let vectors = resolve_category(
        &populations.vectors,
        &Context {
            category: Category::Vector,
            populations,
            units,
            groups: Some(&vector_groups),
            config,
        },
        cancel,
        sink,
    );
    let (vector_groups, vectors) = groups::register_members(vector_groups, vectors, sink);
    let scalars = resolve_category(
        &populations.scalars,
        &Context {
            category: Category::Scalar,
            populations,
            units,
            groups: None,
            config,
        },
        cancel,
        sink,
    );

    info!(
        scalars = scalars.len(),
        vectors = vectors.len(),
        vector_groups = vector_groups.len(),
        "pass 4: quantities resolved"
    );
    ResolvedQuantities {
        scalars,
        vectors,
        vector_groups,
    }
}

fn resolve_category(
    population: &Population<QuantityDef>,
    context: &Context,
    cancel: &Cancellation,
    sink: &mut dyn DiagnosticSink,
) -> Population<ResolvedQuantity> {
    let depths = chain::chain_depths(context.category, population, context.populations, sink);
    let deepest = depths.values().copied().max().unwrap_or(0);

    let mut resolved: IndexMap<TypeIdent, Resolved> = IndexMap::new();
    for depth in 0..=deepest {
        if cancel.is_cancelled() {
            break;
        }
        let layer: Vec<&QuantityDef> = population
            .values()
            .filter(|def| depths.get(&def.ident) == Some(&depth))
            .collect();
        let outcomes = context.config.map_items(&layer, cancel, |def| {
            let parent = match def.original() {
                None => None,
                Some(original) => match resolved.get(original) {
                    Some(parent) => Some(parent),
                    None => {
                        return Outcome::failed(Diagnostic::new(
                            DiagnosticCode::BrokenAncestor,
                            &def.prov,
                            &[def.ident.as_str(), original.as_str()],
                        ))
                    }
                },
            };
            resolve_item(def, parent, context)
        });
        let mut fresh = Vec::new();
        for outcome in outcomes.into_iter().flatten() {
            if let Some(item) = outcome.drain_into(sink) {
                fresh.push(item);
            }
        }
        for item in fresh {
            resolved.insert(item.quantity.ident.clone(), item);
        }
    }

    Population::from_unique(
        population
            .idents()
            .filter_map(|ident| resolved.swap_remove(ident))
            .map(|item| item.quantity),
    )
}

/// Resolve one quantity on top of its already resolved original.
fn resolve_item(def: &QuantityDef, parent: Option<&Resolved>, context: &Context) -> Outcome<Resolved> {
    let inherited = parent.map(|p| &p.quantity);
    let mut diagnostics = Vec::new();
    let merged = fields::merge(def, inherited, context, &mut diagnostics);

    Outcome::new(merged, diagnostics)
        .and_then(|merged| {
            unit_instances(def, parent, merged.unit.as_ref(), context).map(|found| (merged, found))
        })
        .and_then(|(merged, (unit_instances, segment))| {
            let mut diagnostics = Vec::new();
            let conversions = conversion::conversion_table(def, inherited, context, &mut diagnostics);
            let constants = members::constants(def, inherited, merged.shape.dimension(), &mut diagnostics);
            let operations = members::operations(def, inherited, context, &mut diagnostics);
            let vector_operations = members::vector_operations(def, inherited, context, &mut diagnostics);
            let processes = members::processes(def, inherited, &mut diagnostics);
            let derivations = members::derivations(def, &mut diagnostics);

            let quantity = ResolvedQuantity {
                ident: def.ident.clone(),
                category: def.category,
                prov: def.prov.clone(),
                specialization: specialization_info(def, inherited),
                unit: merged.unit,
                allow_negative: merged.allow_negative,
                biased: merged.biased,
                difference: merged.difference,
                implement_sum: merged.implement_sum,
                implement_difference: merged.implement_difference,
                default_unit_instance: merged.default_unit_instance,
                default_unit_symbol: merged.default_unit_symbol,
                shape: merged.shape,
                unit_instances,
                conversions,
                constants,
                operations,
                vector_operations,
                processes,
                derivations,
            };
            Outcome::ok(Resolved { quantity, segment }).with_diagnostics(diagnostics)
        })
}

/// The effective unit-instance set. A unitless quantity has none.
fn unit_instances(
    def: &QuantityDef,
    parent: Option<&Resolved>,
    unit: Option<&TypeIdent>,
    context: &Context,
) -> Outcome<(Vec<String>, Option<ListMode>)> {
    let Some(name) = unit else {
        return Outcome::ok((Vec::new(), None));
    };
    let Some(unit) = context.units.get(name.as_str()) else {
        return Outcome::failed(Diagnostic::new(
            DiagnosticCode::UnresolvedUnit,
            &def.prov,
            &[def.ident.as_str(), name.as_str()],
        ));
    };
    let mut diagnostics = Vec::new();
    let refined = inclusion::refine(def, parent, unit, context.config, &mut diagnostics);
    Outcome::ok(refined).with_diagnostics(diagnostics)
}

fn specialization_info(def: &QuantityDef, parent: Option<&ResolvedQuantity>) -> Option<SpecializationInfo> {
    let QuantityForm::Specialization {
        original, inherit, ..
    } = &def.form
    else {
        return None;
    };
    let mut chain = vec![original.clone()];
    let root = match parent.and_then(|p| p.specialization.as_ref()) {
        Some(info) => {
            chain.extend(info.chain.iter().cloned());
            info.root.clone()
        }
        None => original.clone(),
    };
    Some(SpecializationInfo {
        original: original.clone(),
        root,
        chain,
        inherit: *inherit,
    })
}
