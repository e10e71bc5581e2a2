//! measure-core: quantity model resolution engine.
//!
//! Assembles user-declared unit and quantity definitions, scattered across
//! independently produced batch fragments, into one consistent and
//! cross-referenced model ready for code emission.
//!
//! # Pipeline
//!
//! - Pass 0: load and merge batch fragments ([`load_batch`])
//! - Pass 1: per-type processing, one raw record at a time
//! - Pass 2: population building, duplicate identities reported
//! - Pass 3: unit instance graphs and derivable units
//! - Pass 4: specialization chains, inclusion/exclusion, convertibility
//! - Pass 5: cross-type validation
//! - Pass 6: stable JSON rendering of the resolved batch
//!
//! Resolution never fails as a whole. Broken items are dropped and
//! reported through a [`DiagnosticSink`]; everything else stays usable.
//!
//! # Public API
//!
//! - [`resolve_batch()`] / [`resolve_batch_with()`] -- run passes 1-5
//! - [`ResolvedBatch`] -- the validated output
//! - [`Diagnostic`], [`DiagnosticCode`], [`Outcome`] -- diagnostics plumbing
//! - [`ResolutionConfig`] -- resolution policy

/// Format version stamped on serialized resolved batches.
pub const MODEL_FORMAT_VERSION: &str = "1.0.0";

pub mod ast;
pub mod cancel;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod model;
pub mod pass0_load;
pub mod pass1_process;
pub mod pass2_population;
pub mod pass3_units;
pub mod pass4_quantities;
pub mod pass5_validate;
pub mod pass6_serialize;
pub mod prefix;
pub mod resolve;
pub mod source;

// ── Convenience re-exports: key types ────────────────────────────────

pub use ast::{Provenance, RawBatch, RawField, TypeIdent};
pub use cancel::Cancellation;
pub use config::ResolutionConfig;
pub use diagnostics::{
    Diagnostic, DiagnosticCode, DiagnosticKind, DiagnosticSink, NullSink, Outcome, Severity,
};
pub use error::{ConfigError, LoadError};
pub use model::{Category, Magnitude, ResolvedQuantity, ResolvedUnit};
pub use pass2_population::Population;
pub use resolve::ResolvedBatch;

// ── Convenience re-exports: pipeline entry points ────────────────────

pub use pass0_load::load_batch;
pub use pass6_serialize::serialize;
pub use resolve::{resolve_batch, resolve_batch_with};
