//! Vector group membership, one member per dimension.

use crate::ast::TypeIdent;
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::model::{ResolvedQuantity, Shape};
use crate::pass2_population::Population;
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Register every vector that names a group. The first vector of a
/// dimension wins; later ones stay resolved but leave the group.
pub(super) fn register_members(
    groups: Population<ResolvedQuantity>,
    vectors: Population<ResolvedQuantity>,
    sink: &mut dyn DiagnosticSink,
) -> (Population<ResolvedQuantity>, Population<ResolvedQuantity>) {
    let mut members: IndexMap<TypeIdent, BTreeMap<u32, TypeIdent>> = IndexMap::new();

    let vectors: Vec<ResolvedQuantity> = vectors
        .into_values()
        .map(|mut vector| {
            if let Shape::Vector {
                dimension, group, ..
            } = &mut vector.shape
            {
                let dimension = *dimension;
                if let Some(name) = group.clone() {
                    let slot = members.entry(name.clone()).or_default();
                    match slot.get(&dimension) {
                        Some(existing) => {
                            sink.report(Diagnostic::new(
                                DiagnosticCode::DuplicateGroupMember,
                                &vector.prov,
                                &[
                                    name.as_str(),
                                    dimension.to_string().as_str(),
                                    existing.as_str(),
                                    vector.ident.as_str(),
                                ],
                            ));
                            *group = None;
                        }
                        None => {
                            slot.insert(dimension, vector.ident.clone());
                        }
                    }
                }
            }
            vector
        })
        .collect();

    let groups: Vec<ResolvedQuantity> = groups
        .into_values()
        .map(|mut group| {
            if let Shape::VectorGroup {
                members: registered,
                ..
            } = &mut group.shape
            {
                if let Some(found) = members.shift_remove(&group.ident) {
                    *registered = found;
                }
            }
            group
        })
        .collect();

    (Population::from_unique(groups), Population::from_unique(vectors))
}
