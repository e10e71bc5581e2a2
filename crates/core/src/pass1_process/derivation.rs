//! Quantity derivations: the expression is parsed here, its operands are
//! checked against the populations in pass 5.

use super::Record;
use crate::ast::{Provenance, RawQuantityDerivation, TypeIdent};
use crate::config::ResolutionConfig;
use crate::diagnostics::{DiagnosticCode, Outcome};
use crate::model::{DerivationExpr, DerivationOperator, OperatorImplementation, QuantityDerivationDef};
use std::iter::Peekable;
use std::str::CharIndices;

pub(super) fn process_quantity_derivation(
    owner: &str,
    raw: &RawQuantityDerivation,
    owner_prov: &Provenance,
    config: &ResolutionConfig,
) -> Outcome<QuantityDerivationDef> {
    let prov = raw.prov.or(owner_prov);
    let mut rec = Record::new("derivation", owner, prov.clone(), config);
    if !rec.well_formed(raw.malformed.as_ref(), owner) {
        return rec.fail();
    }
    let expression = rec.required_text(&raw.expression, "expression");
    rec.present(&raw.signature, "signature");
    let signature = rec.plain_list(&raw.signature, "signature");
    let operator_implementation = rec.keyword(
        &raw.operator_implementation,
        "operator_implementation",
        OperatorImplementation::KEYWORDS,
        Some(OperatorImplementation::Exact),
    );
    let permutations = rec.flag(&raw.permutations, "permutations", false);

    let (Some(text), Some(signature), Some(operator_implementation)) =
        (expression, signature, operator_implementation)
    else {
        return rec.fail();
    };
    if signature.is_empty() {
        rec.empty("signature");
        return rec.fail();
    }

    let tree = parse_expression(&text).and_then(|tree| match tree.max_operand() {
        None => Err("no signature position is used".to_owned()),
        Some(i) if i >= signature.len() => Err(format!(
            "placeholder {{{}}} has no signature position",
            i
        )),
        Some(_) => Ok(tree),
    });
    let tree = match tree {
        Ok(tree) => tree,
        Err(reason) => {
            rec.reject(
                DiagnosticCode::MalformedDerivationExpression,
                &[owner, text.as_str(), reason.as_str()],
            );
            return rec.fail();
        }
    };

    rec.finish(QuantityDerivationDef {
        expression: tree.to_string(),
        tree,
        signature: signature.into_iter().map(TypeIdent::from).collect(),
        operator_implementation,
        permutations,
        expansions: Vec::new(),
        prov,
    })
}

/// Parse `{i}` placeholders, the literal `1`, parentheses and the binary
/// operators `+ - * / . x`. Products bind tighter than sums; both are
/// left-associative.
fn parse_expression(text: &str) -> Result<DerivationExpr, String> {
    let mut parser = Parser {
        chars: text.char_indices().peekable(),
    };
    let tree = parser.sum()?;
    match parser.peek() {
        None => Ok(tree),
        Some((at, c)) => Err(format!("unexpected '{}' at offset {}", c, at)),
    }
}

struct Parser<'a> {
    chars: Peekable<CharIndices<'a>>,
}

impl Parser<'_> {
    fn peek(&mut self) -> Option<(usize, char)> {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
        self.chars.peek().copied()
    }

    fn sum(&mut self) -> Result<DerivationExpr, String> {
        let mut left = self.product()?;
        loop {
            let operator = match self.peek() {
                Some((_, '+')) => DerivationOperator::Add,
                Some((_, '-')) => DerivationOperator::Subtract,
                _ => return Ok(left),
            };
            self.chars.next();
            left = binary(operator, left, self.product()?);
        }
    }

    fn product(&mut self) -> Result<DerivationExpr, String> {
        let mut left = self.atom()?;
        loop {
            let operator = match self.peek() {
                Some((_, '*')) => DerivationOperator::Multiply,
                Some((_, '/')) => DerivationOperator::Divide,
                Some((_, '.')) => DerivationOperator::Dot,
                Some((_, 'x')) => DerivationOperator::Cross,
                _ => return Ok(left),
            };
            self.chars.next();
            left = binary(operator, left, self.atom()?);
        }
    }

    fn atom(&mut self) -> Result<DerivationExpr, String> {
        match self.peek() {
            Some((_, '(')) => {
                self.chars.next();
                let inner = self.sum()?;
                match self.peek() {
                    Some((_, ')')) => {
                        self.chars.next();
                        Ok(inner)
                    }
                    _ => Err("unclosed parenthesis".to_owned()),
                }
            }
            Some((at, '{')) => {
                self.chars.next();
                let mut digits = String::new();
                while let Some((_, d)) = self.chars.next_if(|(_, c)| c.is_ascii_digit()) {
                    digits.push(d);
                }
                if self.chars.next_if(|(_, c)| *c == '}').is_none() || digits.is_empty() {
                    return Err(format!("malformed placeholder at offset {}", at));
                }
                digits
                    .parse()
                    .map(DerivationExpr::Operand)
                    .map_err(|_| format!("placeholder at offset {} is too large", at))
            }
            Some((at, '1')) => {
                self.chars.next();
                if self.chars.next_if(|(_, c)| c.is_ascii_digit()).is_some() {
                    return Err(format!("only the constant 1 is allowed (offset {})", at));
                }
                Ok(DerivationExpr::One)
            }
            Some((at, c)) => Err(format!("unexpected '{}' at offset {}", c, at)),
            None => Err("unexpected end of expression".to_owned()),
        }
    }
}

fn binary(operator: DerivationOperator, left: DerivationExpr, right: DerivationExpr) -> DerivationExpr {
    DerivationExpr::Binary {
        operator,
        left: Box::new(left),
        right: Box::new(right),
    }
}
