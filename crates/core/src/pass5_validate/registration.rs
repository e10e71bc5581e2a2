//! Cross-population registration: one category per type identity.

use crate::ast::TypeIdent;
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::model::Category;
use crate::pass2_population::{Definition, Population, Populations};
use std::collections::HashMap;
use tracing::debug;

/// Drop every definition whose identity an earlier category already holds,
/// in the precedence order Unit > Scalar > Vector > VectorGroup.
pub fn register_identities(populations: Populations, sink: &mut dyn DiagnosticSink) -> Populations {
    let mut claimed: HashMap<TypeIdent, Category> = HashMap::new();
    let units = claim(populations.units, Category::Unit, &mut claimed, sink);
    let scalars = claim(populations.scalars, Category::Scalar, &mut claimed, sink);
    let vectors = claim(populations.vectors, Category::Vector, &mut claimed, sink);
    let vector_groups = claim(
        populations.vector_groups,
        Category::VectorGroup,
        &mut claimed,
        sink,
    );
    Populations {
        units,
        scalars,
        vectors,
        vector_groups,
    }
}

fn claim<T: Definition>(
    population: Population<T>,
    category: Category,
    claimed: &mut HashMap<TypeIdent, Category>,
    sink: &mut dyn DiagnosticSink,
) -> Population<T> {
    let population = population.retain(|ident, item| match claimed.get(ident) {
        Some(holder) => {
            sink.report(Diagnostic::new(
                DiagnosticCode::TypeAlreadyRegistered,
                item.prov(),
                &[ident.as_str(), holder.label(), category.label()],
            ));
            debug!(ident = ident.as_str(), category = category.label(), "registration refused");
            false
        }
        None => true,
    });
    for ident in population.idents() {
        claimed.insert(ident.clone(), category);
    }
    population
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RawBatch;
    use crate::cancel::Cancellation;
    use crate::config::ResolutionConfig;
    use crate::pass1_process::process_batch;
    use serde_json::json;

    fn populations(value: serde_json::Value, diags: &mut Vec<Diagnostic>) -> Populations {
        let batch = RawBatch::from_json_value(value).unwrap();
        let processed = process_batch(
            &batch,
            &ResolutionConfig::default(),
            &Cancellation::new(),
            diags,
        );
        Populations::build(processed, diags)
    }

    #[test]
    fn earlier_category_keeps_the_identity() {
        let mut diags = Vec::new();
        let built = populations(
            json!({
                "units": [{ "ident": "Length", "instances": [{ "kind": "fixed", "name": "Metre" }] }],
                "scalars": [
                    { "ident": "Length", "unit": "Length" },
                    { "ident": "Speed", "unit": "Length" }
                ],
                "vectors": [{ "ident": "Speed", "unit": "Length", "dimension": 3 }],
                "vector_groups": [{ "ident": "Speed", "unit": "Length" }]
            }),
            &mut diags,
        );
        assert!(diags.is_empty(), "{:?}", diags);

        let registered = register_identities(built, &mut diags);
        assert!(registered.units.contains("Length"));
        assert!(!registered.scalars.contains("Length"));
        assert!(registered.scalars.contains("Speed"));
        assert!(registered.vectors.is_empty());
        assert!(registered.vector_groups.is_empty());

        let messages: Vec<String> = diags.iter().map(|d| d.message()).collect();
        assert_eq!(
            messages,
            vec![
                "type 'Length' is already registered as a unit; its scalar definition is ignored",
                "type 'Speed' is already registered as a scalar; its vector definition is ignored",
                "type 'Speed' is already registered as a scalar; its vector group definition is ignored",
            ]
        );
        assert!(diags
            .iter()
            .all(|d| d.kind() == crate::diagnostics::DiagnosticKind::DuplicateDefinition));
    }

    #[test]
    fn distinct_identities_pass_through() {
        let mut diags = Vec::new();
        let built = populations(
            json!({
                "units": [{ "ident": "UnitOfLength", "instances": [{ "kind": "fixed", "name": "Metre" }] }],
                "scalars": [{ "ident": "Length", "unit": "UnitOfLength" }]
            }),
            &mut diags,
        );
        let registered = register_identities(built, &mut diags);
        assert!(diags.is_empty());
        assert_eq!(registered.units.len(), 1);
        assert_eq!(registered.scalars.len(), 1);
    }
}
