//! Quantity derivations: every signature position must name a resolved
//! quantity, and the expression must produce the owner's shape.
//!
//! Vector groups in the signature expand jointly: one expansion per member
//! dimension that every group in the signature provides.

use super::quantity::expected_shape;
use super::Lookup;
use crate::ast::TypeIdent;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Outcome};
use crate::model::{
    DerivationExpansion, DerivationExpr, DerivationOperator, QuantityDerivationDef, ResolvedQuantity,
    Shape,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form {
    Scalar,
    Vector(u32),
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Form::Scalar => write!(f, "a scalar"),
            Form::Vector(d) => write!(f, "a vector of dimension {}", d),
        }
    }
}

/// A signature position once its quantity is known. A group stands for
/// its members.
enum Operand<'a> {
    Fixed(&'a TypeIdent, Form),
    Group(&'a BTreeMap<u32, TypeIdent>),
}

pub(super) fn check_derivations(mut q: ResolvedQuantity, lookup: &Lookup) -> Outcome<ResolvedQuantity> {
    let mut diagnostics = Vec::new();
    let derivations = std::mem::take(&mut q.derivations);
    for derivation in derivations {
        match expand(&q, &derivation, lookup) {
            Ok(expansions) => q.derivations.push(QuantityDerivationDef {
                expansions,
                ..derivation
            }),
            Err(d) => diagnostics.push(d),
        }
    }
    Outcome::ok(q).with_diagnostics(diagnostics)
}

fn expand(
    owner: &ResolvedQuantity,
    derivation: &QuantityDerivationDef,
    lookup: &Lookup,
) -> Result<Vec<DerivationExpansion>, Diagnostic> {
    let fail = |code: DiagnosticCode, detail: &str, extra: Option<&str>| {
        let mut args = vec![owner.ident.as_str(), derivation.expression.as_str(), detail];
        args.extend(extra);
        Diagnostic::new(code, &derivation.prov, &args)
    };

    let mut operands = Vec::with_capacity(derivation.signature.len());
    for ident in &derivation.signature {
        let Some(quantity) = lookup.quantity(ident.as_str()) else {
            return Err(fail(
                DiagnosticCode::UnresolvedDerivationQuantity,
                ident.as_str(),
                None,
            ));
        };
        operands.push(match &quantity.shape {
            Shape::Scalar { .. } => Operand::Fixed(ident, Form::Scalar),
            Shape::Vector { dimension, .. } => Operand::Fixed(ident, Form::Vector(*dimension)),
            Shape::VectorGroup { members, .. } => Operand::Group(members),
        });
    }

    let dimensions = shared_dimensions(&operands);
    let choices: Vec<Option<u32>> = match dimensions {
        None => vec![None],
        Some(ref shared) if shared.is_empty() => {
            return Err(fail(
                DiagnosticCode::IncompatibleDerivationQuantities,
                "the vector groups share no member dimension",
                None,
            ))
        }
        Some(shared) => shared.into_iter().map(Some).collect(),
    };

    let mut expansions = Vec::with_capacity(choices.len());
    for choice in choices {
        let mut forms = Vec::with_capacity(operands.len());
        let mut signature = Vec::with_capacity(operands.len());
        // Every group has a member of the chosen dimension.
        for operand in &operands {
            match (operand, choice) {
                (Operand::Fixed(ident, form), _) => {
                    forms.push(*form);
                    signature.push((*ident).clone());
                }
                (Operand::Group(members), Some(d)) => {
                    if let Some(member) = members.get(&d) {
                        forms.push(Form::Vector(d));
                        signature.push(member.clone());
                    }
                }
                (Operand::Group(_), None) => {}
            }
        }

        let form = evaluate(&derivation.tree, &forms)
            .map_err(|reason| fail(DiagnosticCode::IncompatibleDerivationQuantities, &reason, None))?;
        let produced = form.to_string();
        let result = match (&owner.shape, form) {
            (Shape::Scalar { .. }, Form::Scalar) => Some(owner.ident.clone()),
            (Shape::Vector { dimension, .. }, Form::Vector(d)) if *dimension == d => {
                Some(owner.ident.clone())
            }
            (Shape::VectorGroup { members, .. }, Form::Vector(d)) => match members.get(&d) {
                Some(member) => Some(member.clone()),
                None => {
                    let expected = format!("vector group without a member of dimension {}", d);
                    return Err(fail(
                        DiagnosticCode::DerivationResultShapeMismatch,
                        &produced,
                        Some(expected.as_str()),
                    ));
                }
            },
            _ => None,
        };
        let Some(result) = result else {
            return Err(fail(
                DiagnosticCode::DerivationResultShapeMismatch,
                &produced,
                Some(expected_shape(owner).as_str()),
            ));
        };
        expansions.push(DerivationExpansion { result, signature });
    }
    Ok(expansions)
}

/// Member dimensions every group operand provides; `None` without groups.
fn shared_dimensions(operands: &[Operand]) -> Option<BTreeSet<u32>> {
    operands
        .iter()
        .filter_map(|operand| match operand {
            Operand::Group(members) => Some(members.keys().copied().collect::<BTreeSet<u32>>()),
            Operand::Fixed(..) => None,
        })
        .reduce(|a, b| a.intersection(&b).copied().collect())
}

fn evaluate(expr: &DerivationExpr, operands: &[Form]) -> Result<Form, String> {
    let (operator, left, right) = match expr {
        DerivationExpr::One => return Ok(Form::Scalar),
        DerivationExpr::Operand(i) => {
            return operands
                .get(*i)
                .copied()
                .ok_or_else(|| format!("placeholder {{{}}} has no operand", i))
        }
        DerivationExpr::Binary {
            operator,
            left,
            right,
        } => (*operator, evaluate(left, operands)?, evaluate(right, operands)?),
    };
    let symbol = operator.symbol();
    match (operator, left, right) {
        (DerivationOperator::Add | DerivationOperator::Subtract, l, r) if l == r => Ok(l),
        (DerivationOperator::Add | DerivationOperator::Subtract, l, r) => Err(format!(
            "'{}' needs operands of the same form, found {} and {}",
            symbol, l, r
        )),
        (DerivationOperator::Multiply, Form::Scalar, other)
        | (DerivationOperator::Multiply, other, Form::Scalar) => Ok(other),
        (DerivationOperator::Multiply, _, _) => {
            Err(format!("'{}' cannot combine two vectors; use '.' or 'x'", symbol))
        }
        (DerivationOperator::Divide, l, Form::Scalar) => Ok(l),
        (DerivationOperator::Divide, _, _) => Err(format!("'{}' needs a scalar divisor", symbol)),
        (DerivationOperator::Dot, Form::Vector(a), Form::Vector(b)) if a == b => Ok(Form::Scalar),
        (DerivationOperator::Dot, _, _) => {
            Err(format!("'{}' needs two vectors of the same dimension", symbol))
        }
        (DerivationOperator::Cross, Form::Vector(3), Form::Vector(3)) => Ok(Form::Vector(3)),
        (DerivationOperator::Cross, _, _) => {
            Err(format!("'{}' needs two vectors of dimension 3", symbol))
        }
    }
}
