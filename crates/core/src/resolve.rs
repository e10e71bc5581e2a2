//! Pipeline orchestrator: raw batch in, validated resolved batch out.
//!
//! A thin driver calling each pass in order. Pass 2 is the barrier: nothing
//! resolves until every record of the batch has been processed.

use crate::ast::RawBatch;
use crate::cancel::Cancellation;
use crate::config::ResolutionConfig;
use crate::diagnostics::DiagnosticSink;
use crate::model::{ResolvedQuantity, ResolvedUnit};
use crate::pass1_process::process_batch;
use crate::pass2_population::{Population, Populations};
use crate::pass3_units::resolve_units;
use crate::pass4_quantities::resolve_quantities;
use crate::pass5_validate::{register_identities, validate};
use tracing::{info, info_span};

/// Every type that survived resolution and validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedBatch {
    pub units: Population<ResolvedUnit>,
    pub scalars: Population<ResolvedQuantity>,
    pub vectors: Population<ResolvedQuantity>,
    pub vector_groups: Population<ResolvedQuantity>,
    /// Cancellation was observed; some items may be missing.
    pub cancelled: bool,
}

impl ResolvedBatch {
    /// A resolved quantity of any category.
    pub fn quantity(&self, ident: &str) -> Option<&ResolvedQuantity> {
        self.scalars
            .get(ident)
            .or_else(|| self.vectors.get(ident))
            .or_else(|| self.vector_groups.get(ident))
    }

    pub fn len(&self) -> usize {
        self.units.len() + self.scalars.len() + self.vectors.len() + self.vector_groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolve with the default policy and no cancellation.
pub fn resolve_batch(batch: &RawBatch, sink: &mut dyn DiagnosticSink) -> ResolvedBatch {
    resolve_batch_with(
        batch,
        &ResolutionConfig::default(),
        &Cancellation::new(),
        sink,
    )
}

pub fn resolve_batch_with(
    batch: &RawBatch,
    config: &ResolutionConfig,
    cancel: &Cancellation,
    sink: &mut dyn DiagnosticSink,
) -> ResolvedBatch {
    let span = info_span!("resolve", records = batch.len(), parallel = config.parallel);
    let _guard = span.enter();

    // Pass 1: per-type processing
    let processed = process_batch(batch, config, cancel, sink);

    // Pass 2: populations, then one category per identity
    let populations = register_identities(Populations::build(processed, sink), sink);

    // Pass 3: units
    let units = resolve_units(&populations.units, config, cancel, sink);

    // Pass 4: quantities
    let quantities = resolve_quantities(&populations, &units, config, cancel, sink);

    // Pass 5: cross-type validation
    let (units, quantities) = validate(units, quantities, &populations, config, cancel, sink);

    let cancelled = cancel.is_cancelled();
    let resolved = ResolvedBatch {
        units,
        scalars: quantities.scalars,
        vectors: quantities.vectors,
        vector_groups: quantities.vector_groups,
        cancelled,
    };
    info!(types = resolved.len(), cancelled, "resolution finished");
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{DiagnosticCode, NullSink};
    use serde_json::json;

    fn batch(value: serde_json::Value) -> RawBatch {
        RawBatch::from_json_value(value).unwrap()
    }

    #[test]
    fn empty_batch_resolves_to_nothing() {
        let mut diags = Vec::new();
        let resolved = resolve_batch(&RawBatch::default(), &mut diags);
        assert!(resolved.is_empty());
        assert!(!resolved.cancelled);
        assert!(diags.is_empty());
    }

    #[test]
    fn registration_runs_before_resolution() {
        let mut diags = Vec::new();
        let resolved = resolve_batch(
            &batch(json!({
                "units": [{ "ident": "Length", "instances": [{ "kind": "fixed", "name": "Metre" }] }],
                "scalars": [{ "ident": "Length", "unit": "Length" }]
            })),
            &mut diags,
        );
        assert_eq!(resolved.len(), 1);
        assert!(resolved.quantity("Length").is_none());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::TypeAlreadyRegistered);
    }

    #[test]
    fn cancelled_run_is_flagged() {
        let cancel = Cancellation::new();
        cancel.cancel();
        let resolved = resolve_batch_with(
            &batch(json!({
                "units": [{ "ident": "U", "instances": [{ "kind": "fixed", "name": "One" }] }],
                "scalars": [{ "ident": "Q", "unit": "U" }]
            })),
            &ResolutionConfig::default(),
            &cancel,
            &mut NullSink,
        );
        assert!(resolved.cancelled);
        assert!(resolved.is_empty());
    }
}
