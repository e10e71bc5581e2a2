//! Per-quantity cross-checks: bias support, difference quantity, default
//! unit, linkage, conversion targets, constants, operation operands, vector
//! operations and processes. Each check takes the quantity and hands it on,
//! possibly with fields cleared.

use super::{derivation, Lookup};
use crate::ast::TypeIdent;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Outcome};
use crate::model::{Category, ResolvedQuantity, ResolvedUnit, Shape, VectorOperationKind};
use tracing::debug;

pub(super) fn check(quantity: &ResolvedQuantity, lookup: &Lookup) -> Outcome<ResolvedQuantity> {
    let unit = quantity.unit.as_ref().and_then(|u| lookup.unit(u.as_str()));
    Outcome::ok(quantity.clone())
        .and_then(|q| check_bias(q, unit))
        .and_then(|q| check_difference(q, lookup))
        .and_then(|q| check_default_unit(q, unit))
        .and_then(|q| check_linkage(q, lookup))
        .and_then(|q| check_conversions(q, lookup))
        .and_then(|q| check_constants(q, unit))
        .and_then(|q| check_operations(q, lookup))
        .and_then(|q| check_vector_operations(q, lookup))
        .and_then(|q| check_processes(q, lookup))
        .and_then(|q| derivation::check_derivations(q, lookup))
}

pub(super) fn expected_shape(q: &ResolvedQuantity) -> String {
    match &q.shape {
        Shape::Scalar { .. } => "scalar".to_owned(),
        Shape::Vector { dimension, .. } => format!("vector of dimension {}", dimension),
        Shape::VectorGroup { .. } => "vector group".to_owned(),
    }
}

fn check_bias(mut q: ResolvedQuantity, unit: Option<&ResolvedUnit>) -> Outcome<ResolvedQuantity> {
    if !q.biased || unit.is_some_and(|u| u.bias_term) {
        return Outcome::ok(q);
    }
    let d = Diagnostic::new(
        DiagnosticCode::BiasWithoutUnitSupport,
        &q.prov,
        &[q.ident.as_str(), q.unit_label()],
    );
    q.biased = false;
    Outcome::ok(q).with_diagnostic(d)
}

/// Same category; vectors also need the same dimension. A vector naming a
/// group takes the group's member of its dimension.
fn check_difference(mut q: ResolvedQuantity, lookup: &Lookup) -> Outcome<ResolvedQuantity> {
    let Some(difference) = q.difference.clone() else {
        return Outcome::ok(q);
    };
    let Some(target) = lookup.quantity(difference.as_str()) else {
        let d = Diagnostic::new(
            DiagnosticCode::UnresolvedDifference,
            &q.prov,
            &[q.ident.as_str(), difference.as_str()],
        );
        q.difference = None;
        return Outcome::ok(q).with_diagnostic(d);
    };

    let dimension = q.shape.dimension();
    let accepted = match (&target.shape, q.category) {
        (Shape::Scalar { .. }, Category::Scalar) => Some(difference),
        (Shape::VectorGroup { .. }, Category::VectorGroup) => Some(difference),
        (Shape::Vector { .. }, Category::Vector) if target.shape.dimension() == dimension => {
            Some(difference)
        }
        (Shape::VectorGroup { members, .. }, Category::Vector) => {
            dimension.and_then(|d| members.get(&d)).cloned()
        }
        _ => None,
    };

    let mismatch = accepted.is_none().then(|| {
        Diagnostic::new(
            DiagnosticCode::DifferenceShapeMismatch,
            &q.prov,
            &[q.ident.as_str(), target.ident.as_str(), expected_shape(&q).as_str()],
        )
    });
    q.difference = accepted;
    Outcome::ok(q).with_diagnostics(mismatch.into_iter().collect())
}

fn check_default_unit(mut q: ResolvedQuantity, unit: Option<&ResolvedUnit>) -> Outcome<ResolvedQuantity> {
    let mut diagnostics = Vec::new();
    if let Some(name) = q.default_unit_instance.clone() {
        if unit.and_then(|u| u.instance(&name)).is_none() {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::UnknownDefaultUnitInstance,
                &q.prov,
                &[q.ident.as_str(), name.as_str(), q.unit_label()],
            ));
            q.default_unit_instance = None;
        }
    }
    if q.default_unit_symbol.is_some() && q.default_unit_instance.is_none() {
        diagnostics.push(Diagnostic::new(
            DiagnosticCode::SymbolWithoutDefaultUnit,
            &q.prov,
            &[q.ident.as_str()],
        ));
        q.default_unit_symbol = None;
    }
    Outcome::ok(q).with_diagnostics(diagnostics)
}

fn check_linkage(mut q: ResolvedQuantity, lookup: &Lookup) -> Outcome<ResolvedQuantity> {
    const VECTORS: &[Category] = &[Category::Vector, Category::VectorGroup];
    const SCALARS: &[Category] = &[Category::Scalar];

    let ident = q.ident.clone();
    let prov = q.prov.clone();
    let (slot, what, accepted, expected) = match &mut q.shape {
        Shape::Scalar { vector } => (vector, "vector", VECTORS, "vector or vector group"),
        Shape::Vector { scalar, .. } | Shape::VectorGroup { scalar, .. } => {
            (scalar, "scalar", SCALARS, "scalar")
        }
    };
    let broken = slot
        .as_ref()
        .and_then(|target| lookup.linkage(&ident, &prov, what, target, accepted, expected));
    if broken.is_some() {
        *slot = None;
    }
    Outcome::ok(q).with_diagnostics(broken.into_iter().collect())
}

/// Conversion targets must have survived in the same category; vector
/// targets must share the dimension.
fn check_conversions(mut q: ResolvedQuantity, lookup: &Lookup) -> Outcome<ResolvedQuantity> {
    let ident = q.ident.clone();
    let prov = q.prov.clone();
    let category = q.category;
    let dimension = q.shape.dimension();
    let expected = match dimension {
        Some(d) => format!("vector of dimension {}", d),
        None => category.label().to_owned(),
    };

    let mut diagnostics = Vec::new();
    q.conversions.retain(|target, _| {
        let found = lookup
            .quantity(target.as_str())
            .filter(|t| t.category == category);
        let diagnostic = match found {
            Some(t) if t.shape.dimension() == dimension => return true,
            Some(_) => Diagnostic::new(
                DiagnosticCode::LinkageCategoryMismatch,
                &prov,
                &[ident.as_str(), "conversion target", target.as_str(), expected.as_str()],
            ),
            None => Diagnostic::new(
                DiagnosticCode::DanglingReference,
                &prov,
                &[ident.as_str(), "conversion target", target.as_str()],
            ),
        };
        diagnostics.push(diagnostic);
        false
    });
    Outcome::ok(q).with_diagnostics(diagnostics)
}

/// Constants must use an exposed unit instance. Only the quantity's own
/// constants are reported; inherited ones were reported on the ancestor.
fn check_constants(mut q: ResolvedQuantity, unit: Option<&ResolvedUnit>) -> Outcome<ResolvedQuantity> {
    let ident = q.ident.clone();
    let exposed = &q.unit_instances;
    let mut diagnostics = Vec::new();
    q.constants.retain(|member| {
        let constant = &member.item;
        if exposed.contains(&constant.unit_instance) {
            return true;
        }
        if member.inherited {
            debug!(
                quantity = ident.as_str(),
                constant = constant.name.as_str(),
                "inherited constant uses an excluded unit instance"
            );
        } else {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::ConstantUnitNotIncluded,
                &constant.prov,
                &[ident.as_str(), constant.name.as_str(), constant.unit_instance.as_str()],
            ));
        }
        false
    });

    if let Some(unit) = unit {
        for member in q.constants.iter().filter(|m| !m.inherited) {
            let name = member.item.name.as_str();
            let shared = unit
                .instances
                .values()
                .any(|i| i.name == name || i.plural.as_deref() == Some(name));
            if shared {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::ConstantSharesUnitName,
                    &member.item.prov,
                    &[ident.as_str(), name],
                ));
            }
        }
    }
    Outcome::ok(q).with_diagnostics(diagnostics)
}

fn check_operations(mut q: ResolvedQuantity, lookup: &Lookup) -> Outcome<ResolvedQuantity> {
    let ident = q.ident.clone();
    let mut diagnostics = Vec::new();
    q.operations.retain(|member| {
        let operation = &member.item;
        let missing: Option<&TypeIdent> = [&operation.other, &operation.result]
            .into_iter()
            .find(|operand| lookup.quantity(operand.as_str()).is_none());
        let Some(operand) = missing else {
            return true;
        };
        if member.inherited {
            debug!(
                quantity = ident.as_str(),
                operand = operand.as_str(),
                "inherited operation lost an operand"
            );
        } else {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::DanglingReference,
                &operation.prov,
                &[ident.as_str(), "operation operand", operand.as_str()],
            ));
        }
        false
    });
    Outcome::ok(q).with_diagnostics(diagnostics)
}

/// `other` must be a vector or vector group and `result` a resolved
/// quantity. A cross product only exists for vectors of dimension 3.
fn check_vector_operations(mut q: ResolvedQuantity, lookup: &Lookup) -> Outcome<ResolvedQuantity> {
    const VECTORS: &[Category] = &[Category::Vector, Category::VectorGroup];

    let ident = q.ident.clone();
    let own_dimension = q.shape.dimension();
    let mut diagnostics = Vec::new();
    q.vector_operations.retain(|member| {
        let operation = &member.item;
        let found = lookup
            .linkage(
                &ident,
                &operation.prov,
                "vector operation operand",
                &operation.other,
                VECTORS,
                "vector or vector group",
            )
            .or_else(|| {
                lookup.quantity(operation.result.as_str()).is_none().then(|| {
                    Diagnostic::new(
                        DiagnosticCode::DanglingReference,
                        &operation.prov,
                        &[ident.as_str(), "vector operation result", operation.result.as_str()],
                    )
                })
            })
            .or_else(|| {
                let other_dimension = lookup
                    .quantity(operation.other.as_str())
                    .and_then(|other| other.shape.dimension());
                let fits = [own_dimension, other_dimension]
                    .into_iter()
                    .flatten()
                    .all(|d| d == 3);
                (operation.kind == VectorOperationKind::Cross && !fits).then(|| {
                    Diagnostic::new(
                        DiagnosticCode::CrossProductDimension,
                        &operation.prov,
                        &[ident.as_str(), operation.name.as_str()],
                    )
                })
            });
        let Some(d) = found else {
            return true;
        };
        if member.inherited {
            debug!(
                quantity = ident.as_str(),
                operation = operation.name.as_str(),
                "inherited vector operation no longer applies"
            );
        } else {
            diagnostics.push(d);
        }
        false
    });
    Outcome::ok(q).with_diagnostics(diagnostics)
}

/// A process may name external types freely, but not a type the batch
/// declared and then dropped.
fn check_processes(mut q: ResolvedQuantity, lookup: &Lookup) -> Outcome<ResolvedQuantity> {
    let ident = q.ident.clone();
    let mut diagnostics = Vec::new();
    q.processes.retain(|member| {
        let process = &member.item;
        let dropped = std::iter::once(("process result", &process.result))
            .chain(process.parameters.iter().map(|p| ("process parameter", &p.ty)))
            .find(|(_, ty)| lookup.was_dropped(ty.as_str()));
        let Some((what, ty)) = dropped else {
            return true;
        };
        if member.inherited {
            debug!(
                quantity = ident.as_str(),
                process = process.name.as_str(),
                "inherited process lost a type"
            );
        } else {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::DanglingReference,
                &process.prov,
                &[ident.as_str(), what, ty.as_str()],
            ));
        }
        false
    });
    Outcome::ok(q).with_diagnostics(diagnostics)
}
