//! Base-level fields: own value, else the original's resolved value, else
//! the default.

use super::Context;
use crate::ast::TypeIdent;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::model::{Category, QuantityDef, ResolvedQuantity, Shape};
use std::collections::BTreeMap;
use tracing::debug;

pub(super) struct Merged {
    /// `None` only for unitless quantities.
    pub unit: Option<TypeIdent>,
    pub allow_negative: Option<bool>,
    pub biased: bool,
    pub difference: Option<TypeIdent>,
    pub implement_sum: bool,
    pub implement_difference: bool,
    pub default_unit_instance: Option<String>,
    pub default_unit_symbol: Option<String>,
    pub shape: Shape,
}

/// Merge `def`'s own fields over `parent`. `None` when the quantity ends up
/// without a unit, or when it and its original disagree on having one.
pub(super) fn merge(
    def: &QuantityDef,
    parent: Option<&ResolvedQuantity>,
    context: &Context,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Merged> {
    let own = &def.fields;
    let ident = def.ident.as_str();

    if let Some(p) = parent.filter(|p| p.is_unitless() != def.unitless) {
        diagnostics.push(Diagnostic::new(
            DiagnosticCode::UnitlessOriginalMismatch,
            &def.prov,
            &[ident, p.ident.as_str()],
        ));
        return None;
    }

    let mut unit = match (parent.map(|p| &p.unit), &own.unit) {
        (Some(Some(inherited)), Some(u)) if u != inherited => {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::OverrideMismatch,
                &def.prov,
                &[ident, "unit", u.as_str(), inherited.as_str()],
            ));
            Some(inherited.clone())
        }
        (Some(inherited), _) => inherited.clone(),
        (None, u) => u.clone(),
    };
    let mut biased = own.biased.or(parent.map(|p| p.biased));

    let shape = match def.category {
        Category::Scalar => Shape::Scalar {
            vector: own.vector.clone().or_else(|| match parent.map(|p| &p.shape) {
                Some(Shape::Scalar { vector }) => vector.clone(),
                _ => None,
            }),
        },
        Category::Vector => {
            let (inherited_dimension, inherited_scalar) = match parent.map(|p| &p.shape) {
                Some(Shape::Vector {
                    dimension, scalar, ..
                }) => (Some(*dimension), scalar.clone()),
                _ => (None, None),
            };
            let dimension = match (inherited_dimension, own.dimension) {
                (Some(inherited), Some(declared)) if declared != inherited => {
                    diagnostics.push(Diagnostic::new(
                        DiagnosticCode::OverrideMismatch,
                        &def.prov,
                        &[
                            ident,
                            "dimension",
                            declared.to_string().as_str(),
                            inherited.to_string().as_str(),
                        ],
                    ));
                    inherited
                }
                (Some(d), _) | (None, Some(d)) => d,
                (None, None) => {
                    debug!(quantity = ident, "vector without a dimension");
                    return None;
                }
            };
            let group = membership(def, parent.is_none(), &mut unit, &mut biased, context, diagnostics);
            Shape::Vector {
                dimension,
                scalar: own.scalar.clone().or(inherited_scalar),
                group,
            }
        }
        Category::VectorGroup | Category::Unit => Shape::VectorGroup {
            scalar: own.scalar.clone().or_else(|| match parent.map(|p| &p.shape) {
                Some(Shape::VectorGroup { scalar, .. }) => scalar.clone(),
                _ => None,
            }),
            members: BTreeMap::new(),
        },
    };

    if unit.is_none() && !def.unitless {
        debug!(quantity = ident, "quantity without a unit");
        return None;
    }
    let allow_negative = match def.category {
        Category::Scalar => Some(
            own.allow_negative
                .or(parent.and_then(|p| p.allow_negative))
                .unwrap_or(true),
        ),
        _ => None,
    };

    Some(Merged {
        unit,
        allow_negative,
        biased: biased.unwrap_or(false),
        difference: own
            .difference
            .clone()
            .or_else(|| parent.and_then(|p| p.difference.clone())),
        implement_sum: own
            .implement_sum
            .or(parent.map(|p| p.implement_sum))
            .unwrap_or(true),
        implement_difference: own
            .implement_difference
            .or(parent.map(|p| p.implement_difference))
            .unwrap_or(true),
        default_unit_instance: own
            .default_unit_instance
            .clone()
            .or_else(|| parent.and_then(|p| p.default_unit_instance.clone())),
        default_unit_symbol: own
            .default_unit_symbol
            .clone()
            .or_else(|| parent.and_then(|p| p.default_unit_symbol.clone())),
        shape,
    })
}

/// Resolve a vector's own `member_of`. A base member without a unit takes
/// the group's unit and bias flag; a base member with a conflicting unit is
/// switched to the group's unit. A specialization keeps its inherited unit
/// and loses a conflicting membership instead.
fn membership(
    def: &QuantityDef,
    is_base: bool,
    unit: &mut Option<TypeIdent>,
    biased: &mut Option<bool>,
    context: &Context,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<TypeIdent> {
    let name = def.fields.member_of.as_ref()?;
    let Some(group) = context.groups.and_then(|groups| groups.get(name.as_str())) else {
        diagnostics.push(Diagnostic::new(
            DiagnosticCode::UnresolvedGroup,
            &def.prov,
            &[def.ident.as_str(), name.as_str()],
        ));
        return None;
    };
    match unit.as_ref() {
        None => {
            *unit = group.unit.clone();
            if biased.is_none() {
                *biased = Some(group.biased);
            }
            Some(name.clone())
        }
        Some(own) if Some(own) != group.unit.as_ref() => {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::GroupUnitMismatch,
                &def.prov,
                &[def.ident.as_str(), own.as_str(), name.as_str(), group.unit_label()],
            ));
            if is_base {
                *unit = group.unit.clone();
                Some(name.clone())
            } else {
                None
            }
        }
        Some(_) => Some(name.clone()),
    }
}
