//! Specialization chains: follow `original` links back to a base.

use crate::ast::TypeIdent;
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::model::{Category, QuantityDef};
use crate::pass2_population::{Population, Populations};
use indexmap::IndexMap;
use tracing::debug;

/// Depth of every quantity whose chain ends at a base (bases are depth 0).
///
/// A broken link is reported against the item that owns it; every
/// descendant cut off by it gets one [`DiagnosticCode::BrokenAncestor`].
pub(super) fn chain_depths(
    category: Category,
    population: &Population<QuantityDef>,
    populations: &Populations,
    sink: &mut dyn DiagnosticSink,
) -> IndexMap<TypeIdent, usize> {
    let mut depths = IndexMap::new();
    for def in population.values() {
        match walk(def, population) {
            Walk::Base(depth) => {
                depths.insert(def.ident.clone(), depth);
            }
            Walk::Missing { owner, original } if owner == &def.ident => {
                let diagnostic = match populations.category_of(original.as_str()) {
                    Some(other) => Diagnostic::new(
                        DiagnosticCode::OriginalCategoryMismatch,
                        &def.prov,
                        &[def.ident.as_str(), category.label(), original.as_str(), other.label()],
                    ),
                    None => Diagnostic::new(
                        DiagnosticCode::UnresolvedOriginal,
                        &def.prov,
                        &[def.ident.as_str(), original.as_str()],
                    ),
                };
                sink.report(diagnostic);
            }
            Walk::Cycle(path) if path.first() == Some(&&def.ident) => {
                let rendered = path
                    .iter()
                    .map(|i| i.as_str())
                    .chain(std::iter::once(def.ident.as_str()))
                    .collect::<Vec<_>>()
                    .join(" → ");
                sink.report(Diagnostic::new(
                    DiagnosticCode::CyclicSpecialization,
                    &def.prov,
                    &[def.ident.as_str(), rendered.as_str()],
                ));
            }
            Walk::Missing { owner: ancestor, .. } => broken_ancestor(def, ancestor, sink),
            Walk::Cycle(path) => {
                if let Some(ancestor) = path.first() {
                    broken_ancestor(def, ancestor, sink);
                }
            }
        }
    }
    debug!(
        category = category.label(),
        chains = depths.len(),
        "pass 4: specialization chains walked"
    );
    depths
}

pub(super) fn broken_ancestor(def: &QuantityDef, ancestor: &TypeIdent, sink: &mut dyn DiagnosticSink) {
    sink.report(Diagnostic::new(
        DiagnosticCode::BrokenAncestor,
        &def.prov,
        &[def.ident.as_str(), ancestor.as_str()],
    ));
}

enum Walk<'a> {
    Base(usize),
    /// `owner` names an original that is not in the population.
    Missing {
        owner: &'a TypeIdent,
        original: &'a TypeIdent,
    },
    /// The members of the loop reached, starting at the first one visited.
    Cycle(Vec<&'a TypeIdent>),
}

fn walk<'a>(def: &'a QuantityDef, population: &'a Population<QuantityDef>) -> Walk<'a> {
    let mut path: Vec<&'a QuantityDef> = vec![def];
    let mut current = def;
    while let Some(original) = current.original() {
        let Some(next) = population.get(original.as_str()) else {
            return Walk::Missing {
                owner: &current.ident,
                original,
            };
        };
        if let Some(pos) = path.iter().position(|d| d.ident == next.ident) {
            return Walk::Cycle(path[pos..].iter().map(|d| &d.ident).collect());
        }
        path.push(next);
        current = next;
    }
    Walk::Base(path.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Provenance;
    use crate::model::{InheritFlags, OriginalConversion, QuantityFields, QuantityForm};

    fn scalar(ident: &str, original: Option<&str>) -> QuantityDef {
        QuantityDef {
            ident: TypeIdent::from(ident),
            prov: Provenance::new("scalars.json", 1),
            category: Category::Scalar,
            form: match original {
                None => QuantityForm::Base,
                Some(o) => QuantityForm::Specialization {
                    original: TypeIdent::from(o),
                    inherit: InheritFlags::default(),
                    original_conversion: OriginalConversion::default(),
                },
            },
            fields: QuantityFields::default(),
            unitless: false,
            units: None,
            conversions: Vec::new(),
            constants: Vec::new(),
            operations: Vec::new(),
            vector_operations: Vec::new(),
            processes: Vec::new(),
            derivations: Vec::new(),
        }
    }

    fn depths(defs: Vec<QuantityDef>) -> (IndexMap<TypeIdent, usize>, Vec<Diagnostic>) {
        let mut diags = Vec::new();
        let populations = Populations {
            scalars: Population::build(defs, &mut diags),
            ..Populations::default()
        };
        let depths = chain_depths(Category::Scalar, &populations.scalars, &populations, &mut diags);
        (depths, diags)
    }

    #[test]
    fn chain_depth_counts_hops_to_the_base() {
        let (depths, diags) = depths(vec![
            scalar("Height", Some("Distance")),
            scalar("Distance", Some("Length")),
            scalar("Length", None),
        ]);
        assert!(diags.is_empty());
        assert_eq!(depths["Length"], 0);
        assert_eq!(depths["Distance"], 1);
        assert_eq!(depths["Height"], 2);
    }

    #[test]
    fn broken_link_is_reported_once_by_its_owner() {
        let (depths, diags) = depths(vec![
            scalar("Distance", Some("Missing")),
            scalar("Height", Some("Distance")),
        ]);
        assert!(depths.is_empty());
        assert_eq!(diags[0].code, DiagnosticCode::UnresolvedOriginal);
        assert_eq!(diags[1].code, DiagnosticCode::BrokenAncestor);
        assert_eq!(
            diags[1].message(),
            "'Height' is dropped because its ancestor 'Distance' could not be resolved"
        );
    }

    #[test]
    fn cycle_is_reported_by_each_member() {
        let (depths, diags) = depths(vec![
            scalar("A", Some("B")),
            scalar("B", Some("A")),
            scalar("C", Some("A")),
        ]);
        assert!(depths.is_empty());
        let codes: Vec<_> = diags.iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![
                DiagnosticCode::CyclicSpecialization,
                DiagnosticCode::CyclicSpecialization,
                DiagnosticCode::BrokenAncestor,
            ]
        );
        assert!(diags[0].message().ends_with("A → B → A"));
        assert!(diags[1].message().ends_with("B → A → B"));
    }
}
