//! Constants, operations, vector operations, processes and derivations:
//! inherited ones first, then the quantity's own.

use super::Context;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::model::{
    Category, ConstantDef, Member, OperationDef, ProcessDef, QuantityDef, QuantityDerivationDef,
    ResolvedQuantity, VectorOperationDef,
};
use tracing::debug;

/// `dimension` is the resolved vector dimension; a component constant must
/// match it.
pub(super) fn constants(
    def: &QuantityDef,
    parent: Option<&ResolvedQuantity>,
    dimension: Option<u32>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Member<ConstantDef>> {
    let fits = |constant: &ConstantDef| match (constant.value.components(), dimension) {
        (Some(count), Some(dimension)) => count == dimension as usize,
        _ => true,
    };
    let mut out: Vec<Member<ConstantDef>> = match parent {
        Some(parent) if def.inherit().constants => parent
            .constants
            .iter()
            .filter(|m| {
                let keep = fits(&m.item);
                if !keep {
                    debug!(quantity = %def.ident, constant = %m.item.name, "inherited constant does not fit");
                }
                keep
            })
            .map(|m| Member::inherited(m.item.clone()))
            .collect(),
        _ => Vec::new(),
    };
    for constant in &def.constants {
        if !fits(constant) {
            let count = constant.value.components().unwrap_or(1).to_string();
            let dimension = dimension.unwrap_or(1).to_string();
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::ConstantDimensionMismatch,
                &constant.prov,
                &[def.ident.as_str(), constant.name.as_str(), count.as_str(), dimension.as_str()],
            ));
            continue;
        }
        if out.iter().any(|m| m.item.name == constant.name) {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::DuplicateConstantName,
                &constant.prov,
                &[def.ident.as_str(), constant.name.as_str()],
            ));
            continue;
        }
        out.push(Member::own(constant.clone()));
    }
    out
}

/// Whether `ident` names a quantity of any category.
fn is_quantity(context: &Context, ident: &str) -> bool {
    context
        .populations
        .category_of(ident)
        .is_some_and(|c| c != Category::Unit)
}

pub(super) fn operations(
    def: &QuantityDef,
    parent: Option<&ResolvedQuantity>,
    context: &Context,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Member<OperationDef>> {
    let mut out: Vec<Member<OperationDef>> = match parent {
        Some(parent) if def.inherit().operations => parent
            .operations
            .iter()
            .map(|m| Member::inherited(m.item.clone()))
            .collect(),
        _ => Vec::new(),
    };
    'operations: for operation in &def.operations {
        for operand in [&operation.other, &operation.result] {
            if !is_quantity(context, operand.as_str()) {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::UnresolvedOperationOperand,
                    &operation.prov,
                    &[def.ident.as_str(), operation.kind.label(), operand.as_str()],
                ));
                continue 'operations;
            }
        }
        if out
            .iter()
            .any(|m| m.item.kind == operation.kind && m.item.other == operation.other)
        {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::DuplicateOperation,
                &operation.prov,
                &[def.ident.as_str(), operation.kind.label(), operation.other.as_str()],
            ));
            continue;
        }
        out.push(Member::own(operation.clone()));
    }
    out
}

/// Gated by `inherit_operations`, like scalar operations.
pub(super) fn vector_operations(
    def: &QuantityDef,
    parent: Option<&ResolvedQuantity>,
    context: &Context,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Member<VectorOperationDef>> {
    let mut out: Vec<Member<VectorOperationDef>> = match parent {
        Some(parent) if def.inherit().operations => parent
            .vector_operations
            .iter()
            .map(|m| Member::inherited(m.item.clone()))
            .collect(),
        _ => Vec::new(),
    };
    'operations: for operation in &def.vector_operations {
        for operand in [&operation.other, &operation.result] {
            if !is_quantity(context, operand.as_str()) {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::UnresolvedOperationOperand,
                    &operation.prov,
                    &[def.ident.as_str(), operation.kind.label(), operand.as_str()],
                ));
                continue 'operations;
            }
        }
        if out
            .iter()
            .any(|m| m.item.name == operation.name && m.item.other == operation.other)
        {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::DuplicateVectorOperation,
                &operation.prov,
                &[def.ident.as_str(), operation.name.as_str(), operation.other.as_str()],
            ));
            continue;
        }
        out.push(Member::own(operation.clone()));
    }
    out
}

/// Processes are keyed by name and parameter types.
pub(super) fn processes(
    def: &QuantityDef,
    parent: Option<&ResolvedQuantity>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Member<ProcessDef>> {
    let mut out: Vec<Member<ProcessDef>> = match parent {
        Some(parent) if def.inherit().processes => parent
            .processes
            .iter()
            .map(|m| Member::inherited(m.item.clone()))
            .collect(),
        _ => Vec::new(),
    };
    for process in &def.processes {
        let signature = process.signature();
        if out
            .iter()
            .any(|m| m.item.name == process.name && m.item.signature() == signature)
        {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::DuplicateProcess,
                &process.prov,
                &[def.ident.as_str(), process.name.as_str(), signature.as_str()],
            ));
            continue;
        }
        out.push(Member::own(process.clone()));
    }
    out
}

/// Derivations describe how the quantity itself is produced, so a
/// specialization never inherits them.
pub(super) fn derivations(def: &QuantityDef, diagnostics: &mut Vec<Diagnostic>) -> Vec<QuantityDerivationDef> {
    let mut out: Vec<QuantityDerivationDef> = Vec::with_capacity(def.derivations.len());
    for derivation in &def.derivations {
        if out
            .iter()
            .any(|d| d.expression == derivation.expression && d.signature == derivation.signature)
        {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::DuplicateQuantityDerivation,
                &derivation.prov,
                &[
                    def.ident.as_str(),
                    derivation.expression.as_str(),
                    derivation.signature_label().as_str(),
                ],
            ));
            continue;
        }
        out.push(derivation.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::super::tests::{length_unit, run};
    use crate::diagnostics::DiagnosticCode;
    use serde_json::json;

    #[test]
    fn constant_names_stay_unique_across_the_chain() {
        let (resolved, diags) = run(json!({
            "units": [length_unit()],
            "scalars": [{
                "ident": "Length",
                "unit": "UnitOfLength",
                "constants": [{ "name": "Mile", "unit_instance": "Metre", "value": 1609.344 }]
            }],
            "scalar_specializations": [
                { "ident": "Distance", "original": "Length",
                  "constants": [
                      { "name": "Mile", "unit_instance": "Kilometre", "value": 1.609 },
                      { "name": "Marathon", "unit_instance": "Kilometre", "value": 42.195 }
                  ] },
                { "ident": "Height", "original": "Length", "inherit_constants": false,
                  "constants": [{ "name": "Mile", "unit_instance": "Kilometre", "value": 1.609 }] }
            ]
        }));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::DuplicateConstantName);
        let distance = resolved.scalars.get("Distance").unwrap();
        let names: Vec<(&str, bool)> = distance
            .constants
            .iter()
            .map(|m| (m.item.name.as_str(), m.inherited))
            .collect();
        assert_eq!(names, vec![("Mile", true), ("Marathon", false)]);
        let height = resolved.scalars.get("Height").unwrap();
        assert!(!height.constants[0].inherited);
    }

    #[test]
    fn operations_need_known_operands_and_unique_pairs() {
        let (resolved, diags) = run(json!({
            "units": [length_unit()],
            "scalars": [{
                "ident": "Length",
                "unit": "UnitOfLength",
                "operations": [
                    { "kind": "multiply", "other": "Length", "result": "Length" },
                    { "kind": "multiply", "other": "Length", "result": "Area" },
                    { "kind": "divide", "other": "Time", "result": "Speed" }
                ]
            }],
            "scalar_specializations": [{
                "ident": "Distance",
                "original": "Length",
                "operations": [{ "kind": "multiply", "other": "Length", "result": "Length" }]
            }]
        }));
        let codes: Vec<_> = diags.iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![
                DiagnosticCode::UnresolvedOperationOperand,
                DiagnosticCode::UnresolvedOperationOperand,
                DiagnosticCode::DuplicateOperation,
            ]
        );
        assert_eq!(resolved.scalars.get("Length").unwrap().operations.len(), 1);
        let distance = resolved.scalars.get("Distance").unwrap();
        assert_eq!(distance.operations.len(), 1);
        assert!(distance.operations[0].inherited);
    }

    #[test]
    fn vector_constants_need_one_component_per_dimension() {
        let (resolved, diags) = run(json!({
            "units": [length_unit()],
            "vectors": [{
                "ident": "Position3",
                "unit": "UnitOfLength",
                "dimension": 3,
                "constants": [
                    { "name": "Ones", "unit_instance": "Metre", "value": [1, 1, 1] },
                    { "name": "Flat", "unit_instance": "Metre", "value": [1, 1] }
                ]
            }],
            "vector_specializations": [{ "ident": "Displacement3", "original": "Position3" }]
        }));
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].message(),
            "'Position3': constant 'Flat' has 2 components but the vector has dimension 3"
        );
        let names: Vec<&str> = resolved
            .vectors
            .get("Displacement3")
            .unwrap()
            .constants
            .iter()
            .map(|m| m.item.name.as_str())
            .collect();
        assert_eq!(names, vec!["Ones"]);
    }

    #[test]
    fn vector_operations_follow_inherit_operations() {
        let (resolved, diags) = run(json!({
            "units": [length_unit()],
            "scalars": [{ "ident": "Area", "unit": "UnitOfLength" }],
            "vectors": [{
                "ident": "Position3",
                "unit": "UnitOfLength",
                "dimension": 3,
                "vector_operations": [
                    { "kind": "dot", "other": "Position3", "result": "Area" },
                    { "kind": "dot", "other": "Position3", "result": "Area" },
                    { "kind": "cross", "other": "Force3", "result": "Moment3" }
                ]
            }],
            "vector_specializations": [
                { "ident": "Displacement3", "original": "Position3" },
                { "ident": "Offset3", "original": "Position3", "inherit_operations": false }
            ]
        }));
        let codes: Vec<_> = diags.iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![
                DiagnosticCode::DuplicateVectorOperation,
                DiagnosticCode::UnresolvedOperationOperand,
            ]
        );
        let displacement = resolved.vectors.get("Displacement3").unwrap();
        assert_eq!(displacement.vector_operations.len(), 1);
        assert!(displacement.vector_operations[0].inherited);
        assert!(resolved.vectors.get("Offset3").unwrap().vector_operations.is_empty());
    }

    #[test]
    fn processes_follow_inherit_processes() {
        let process = json!({ "name": "Half", "expression": "this / 2", "result": "Length" });
        let (resolved, diags) = run(json!({
            "units": [length_unit()],
            "scalars": [{ "ident": "Length", "unit": "UnitOfLength", "processes": [process.clone()] }],
            "scalar_specializations": [
                { "ident": "Distance", "original": "Length", "processes": [process] },
                { "ident": "Height", "original": "Length", "inherit_processes": false }
            ]
        }));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::DuplicateProcess);
        assert_eq!(
            diags[0].message(),
            "'Distance' already declares a process 'Half' taking []"
        );
        assert!(resolved.scalars.get("Distance").unwrap().processes[0].inherited);
        assert!(resolved.scalars.get("Height").unwrap().processes.is_empty());
    }

    #[test]
    fn derivations_belong_to_their_quantity() {
        let (resolved, diags) = run(json!({
            "units": [length_unit()],
            "scalars": [{
                "ident": "Length",
                "unit": "UnitOfLength",
                "derivations": [
                    { "expression": "{0} + {1}", "signature": ["Length", "Length"] },
                    { "expression": "({0}+{1})", "signature": ["Length", "Length"] }
                ]
            }],
            "scalar_specializations": [{ "ident": "Distance", "original": "Length" }]
        }));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::DuplicateQuantityDerivation);
        assert_eq!(resolved.scalars.get("Length").unwrap().derivations.len(), 1);
        assert!(resolved.scalars.get("Distance").unwrap().derivations.is_empty());
    }
}
