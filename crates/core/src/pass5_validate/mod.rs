//! Pass 5: Cross-type validation -- checks that need every resolved
//! population at once.
//!
//! A failed check nulls or removes only the offending field or member and
//! reports it; no type is dropped here. Identity registration across
//! categories runs right after pass 2 ([`register_identities`]) so that
//! resolution only ever sees one definition per identity.

mod derivation;
mod quantity;
mod registration;

pub use registration::register_identities;

use crate::ast::{Provenance, TypeIdent};
use crate::cancel::Cancellation;
use crate::config::ResolutionConfig;
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink, Outcome};
use crate::model::{Category, ResolvedQuantity, ResolvedUnit};
use crate::pass2_population::{Definition, Population, Populations};
use crate::pass4_quantities::ResolvedQuantities;
use tracing::info;

/// Read-only view of everything that survived passes 3 and 4.
pub(crate) struct Lookup<'a> {
    units: &'a Population<ResolvedUnit>,
    quantities: &'a ResolvedQuantities,
    /// Everything that was declared, resolved or not.
    declared: &'a Populations,
}

impl<'a> Lookup<'a> {
    fn category_of(&self, ident: &str) -> Option<Category> {
        if self.units.contains(ident) {
            Some(Category::Unit)
        } else if self.quantities.scalars.contains(ident) {
            Some(Category::Scalar)
        } else if self.quantities.vectors.contains(ident) {
            Some(Category::Vector)
        } else if self.quantities.vector_groups.contains(ident) {
            Some(Category::VectorGroup)
        } else {
            None
        }
    }

    fn quantity(&self, ident: &str) -> Option<&'a ResolvedQuantity> {
        self.quantities
            .scalars
            .get(ident)
            .or_else(|| self.quantities.vectors.get(ident))
            .or_else(|| self.quantities.vector_groups.get(ident))
    }

    fn unit(&self, ident: &str) -> Option<&'a ResolvedUnit> {
        self.units.get(ident)
    }

    /// Declared in the batch but dropped before validation. Names the batch
    /// never declared are external types and are not checked.
    fn was_dropped(&self, ident: &str) -> bool {
        self.declared.category_of(ident).is_some() && self.category_of(ident).is_none()
    }

    /// `None` when `target` is resolved in one of `accepted`; otherwise the
    /// diagnostic that removes the reference.
    fn linkage(
        &self,
        owner: &TypeIdent,
        prov: &Provenance,
        what: &str,
        target: &TypeIdent,
        accepted: &[Category],
        expected: &str,
    ) -> Option<Diagnostic> {
        match self.category_of(target.as_str()) {
            Some(category) if accepted.contains(&category) => None,
            Some(_) => Some(Diagnostic::new(
                DiagnosticCode::LinkageCategoryMismatch,
                prov,
                &[owner.as_str(), what, target.as_str(), expected],
            )),
            None => Some(Diagnostic::new(
                DiagnosticCode::DanglingReference,
                prov,
                &[owner.as_str(), what, target.as_str()],
            )),
        }
    }
}

/// Validate resolved units and quantities. Every type that comes in goes
/// out, possibly with fields cleared. `declared` is the pass-2 view, used to
/// tell dropped types from external ones.
pub fn validate(
    units: Population<ResolvedUnit>,
    quantities: ResolvedQuantities,
    declared: &Populations,
    config: &ResolutionConfig,
    cancel: &Cancellation,
    sink: &mut dyn DiagnosticSink,
) -> (Population<ResolvedUnit>, ResolvedQuantities) {
    let lookup = Lookup {
        units: &units,
        quantities: &quantities,
        declared,
    };

    let checked_units = check_all(&units, config, cancel, sink, |unit| check_unit(unit, &lookup));
    let scalars = check_all(&quantities.scalars, config, cancel, sink, |q| {
        quantity::check(q, &lookup)
    });
    let vectors = check_all(&quantities.vectors, config, cancel, sink, |q| {
        quantity::check(q, &lookup)
    });
    let vector_groups = check_all(&quantities.vector_groups, config, cancel, sink, |q| {
        quantity::check(q, &lookup)
    });

    info!(
        units = checked_units.len(),
        scalars = scalars.len(),
        vectors = vectors.len(),
        vector_groups = vector_groups.len(),
        "pass 5: validated"
    );

    (
        checked_units,
        ResolvedQuantities {
            scalars,
            vectors,
            vector_groups,
        },
    )
}

fn check_all<T, F>(
    population: &Population<T>,
    config: &ResolutionConfig,
    cancel: &Cancellation,
    sink: &mut dyn DiagnosticSink,
    check: F,
) -> Population<T>
where
    T: Definition + Sync + Send,
    F: Fn(&T) -> Outcome<T> + Sync + Send,
{
    let items: Vec<&T> = population.values().collect();
    let outcomes = config.map_items(&items, cancel, |item| check(*item));
    Population::from_unique(
        outcomes
            .into_iter()
            .flatten()
            .filter_map(|outcome| outcome.drain_into(sink)),
    )
}

/// A unit's `quantity` must be a resolved scalar.
fn check_unit(unit: &ResolvedUnit, lookup: &Lookup) -> Outcome<ResolvedUnit> {
    Outcome::ok(unit.clone()).and_then(|mut unit| {
        let broken = unit.quantity.as_ref().and_then(|target| {
            lookup.linkage(
                &unit.ident,
                &unit.prov,
                "quantity",
                target,
                &[Category::Scalar],
                "scalar",
            )
        });
        match broken {
            Some(d) => {
                unit.quantity = None;
                Outcome::ok(unit).with_diagnostic(d)
            }
            None => Outcome::ok(unit),
        }
    })
}
