//! Pass 2: Population building -- collect every processed definition of one
//! category into a lookup keyed by type identity.
//!
//! The first definition of an identity wins. Every later one is recorded in
//! the duplicates side-set and reported; nothing is merged or overwritten.

use crate::ast::{Provenance, TypeIdent};
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::model::{Category, QuantityDef, ResolvedQuantity, ResolvedUnit, UnitDef};
use crate::pass1_process::ProcessedBatch;
use indexmap::{IndexMap, IndexSet};
use tracing::info;

/// Anything that can live in a [`Population`].
pub trait Definition {
    fn ident(&self) -> &TypeIdent;
    fn prov(&self) -> &Provenance;
}

macro_rules! impl_definition {
    ($($ty:ty),*) => {
        $(
            impl Definition for $ty {
                fn ident(&self) -> &TypeIdent {
                    &self.ident
                }

                fn prov(&self) -> &Provenance {
                    &self.prov
                }
            }
        )*
    };
}

impl_definition!(UnitDef, QuantityDef, ResolvedUnit, ResolvedQuantity);

/// Immutable symbol table for one category.
#[derive(Debug, Clone, PartialEq)]
pub struct Population<T> {
    entries: IndexMap<TypeIdent, T>,
    duplicates: IndexSet<TypeIdent>,
}

impl<T> Default for Population<T> {
    fn default() -> Self {
        Population {
            entries: IndexMap::new(),
            duplicates: IndexSet::new(),
        }
    }
}

impl<T: Definition> Population<T> {
    /// Build from definitions in order, reporting every repeated identity.
    pub fn build(items: impl IntoIterator<Item = T>, sink: &mut dyn DiagnosticSink) -> Self {
        let mut population: Population<T> = Population::default();
        for item in items {
            if let Some(first) = population.entries.get(item.ident()) {
                let first_at = first.prov().to_string();
                sink.report(Diagnostic::new(
                    DiagnosticCode::DuplicateDefinition,
                    item.prov(),
                    &[item.ident().as_str(), first_at.as_str()],
                ));
                population.duplicates.insert(item.ident().clone());
                continue;
            }
            population.entries.insert(item.ident().clone(), item);
        }
        population
    }

    /// Build from items already known to be unique.
    pub fn from_unique(items: impl IntoIterator<Item = T>) -> Self {
        Population {
            entries: items
                .into_iter()
                .map(|item| (item.ident().clone(), item))
                .collect(),
            duplicates: IndexSet::new(),
        }
    }
}

impl<T> Population<T> {
    pub fn get(&self, ident: &str) -> Option<&T> {
        self.entries.get(ident)
    }

    pub fn contains(&self, ident: &str) -> bool {
        self.entries.contains_key(ident)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in first-declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&TypeIdent, &T)> {
        self.entries.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    pub fn idents(&self) -> impl Iterator<Item = &TypeIdent> {
        self.entries.keys()
    }

    /// Identities declared more than once.
    pub fn duplicates(&self) -> &IndexSet<TypeIdent> {
        &self.duplicates
    }

    /// Keep only entries for which `keep` returns true.
    pub fn retain(mut self, mut keep: impl FnMut(&TypeIdent, &T) -> bool) -> Self {
        self.entries.retain(|k, v| keep(k, v));
        self
    }

    pub fn into_values(self) -> impl Iterator<Item = T> {
        self.entries.into_values()
    }
}

/// One population per category.
#[derive(Debug, Clone, Default)]
pub struct Populations {
    pub units: Population<UnitDef>,
    pub scalars: Population<QuantityDef>,
    pub vectors: Population<QuantityDef>,
    pub vector_groups: Population<QuantityDef>,
}

impl Populations {
    pub fn build(processed: ProcessedBatch, sink: &mut dyn DiagnosticSink) -> Self {
        let populations = Populations {
            units: Population::build(processed.units, sink),
            scalars: Population::build(processed.scalars, sink),
            vectors: Population::build(processed.vectors, sink),
            vector_groups: Population::build(processed.vector_groups, sink),
        };
        info!(
            units = populations.units.len(),
            scalars = populations.scalars.len(),
            vectors = populations.vectors.len(),
            vector_groups = populations.vector_groups.len(),
            duplicates = populations.units.duplicates().len()
                + populations.scalars.duplicates().len()
                + populations.vectors.duplicates().len()
                + populations.vector_groups.duplicates().len(),
            "pass 2: populations built"
        );
        populations
    }

    pub fn quantities(&self, category: Category) -> Option<&Population<QuantityDef>> {
        match category {
            Category::Unit => None,
            Category::Scalar => Some(&self.scalars),
            Category::Vector => Some(&self.vectors),
            Category::VectorGroup => Some(&self.vector_groups),
        }
    }

    /// The category holding `ident`, by registration precedence.
    pub fn category_of(&self, ident: &str) -> Option<Category> {
        Category::PRECEDENCE
            .into_iter()
            .find(|c| self.contains(*c, ident))
    }

    pub fn contains(&self, category: Category, ident: &str) -> bool {
        match category {
            Category::Unit => self.units.contains(ident),
            other => self
                .quantities(other)
                .is_some_and(|p| p.contains(ident)),
        }
    }
}
