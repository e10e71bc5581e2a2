//! Processed Definitions (output of pass 1) and Resolved Models (output of
//! passes 3-5).
//!
//! Processed types keep `Option` for every overridable field: `Some` means
//! the declaration wrote the field, `None` means it did not. Resolved types
//! are fully merged and reference-free apart from type identities.

use crate::ast::{ConstantValue, Provenance, TypeIdent};
use crate::prefix::Prefix;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

// ──────────────────────────────────────────────
// Categories
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Unit,
    Scalar,
    Vector,
    VectorGroup,
}

impl Category {
    /// Registration precedence: earlier categories keep a contested identity.
    pub const PRECEDENCE: [Category; 4] = [
        Category::Unit,
        Category::Scalar,
        Category::Vector,
        Category::VectorGroup,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Unit => "unit",
            Category::Scalar => "scalar",
            Category::Vector => "vector",
            Category::VectorGroup => "vector group",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ──────────────────────────────────────────────
// Units (processed)
// ──────────────────────────────────────────────

/// A scale or bias factor: a literal, or an expression deferred to Emission.
#[derive(Debug, Clone, PartialEq)]
pub enum Factor {
    Literal(f64),
    Expression(String),
}

impl Factor {
    pub fn magnitude(&self) -> Magnitude {
        match self {
            Factor::Literal(v) => Magnitude::Exact(*v),
            Factor::Expression(e) => Magnitude::Symbolic(e.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstanceDef {
    Fixed,
    Alias { from: String },
    Scaled { from: String, factor: Factor },
    Biased { from: String, bias: Factor },
    Prefixed { from: String, prefix: Prefix },
    /// Built from one instance of each unit in a derivable signature.
    Derived {
        derivation: Option<String>,
        units: Vec<String>,
    },
}

impl InstanceDef {
    /// The same-unit instance this one is defined from, if any.
    pub fn depends_on(&self) -> Option<&str> {
        match self {
            InstanceDef::Alias { from }
            | InstanceDef::Scaled { from, .. }
            | InstanceDef::Biased { from, .. }
            | InstanceDef::Prefixed { from, .. } => Some(from),
            InstanceDef::Fixed | InstanceDef::Derived { .. } => None,
        }
    }

    pub fn kind(&self) -> InstanceKind {
        match self {
            InstanceDef::Fixed => InstanceKind::Fixed,
            InstanceDef::Alias { .. } => InstanceKind::Alias,
            InstanceDef::Scaled { .. } => InstanceKind::Scaled,
            InstanceDef::Biased { .. } => InstanceKind::Biased,
            InstanceDef::Prefixed { .. } => InstanceKind::Prefixed,
            InstanceDef::Derived { .. } => InstanceKind::Derived,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceKind {
    Fixed,
    Alias,
    Scaled,
    Biased,
    Prefixed,
    Derived,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitInstanceDef {
    pub name: String,
    pub plural: Option<String>,
    pub def: InstanceDef,
    pub prov: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SignatureElement {
    pub unit: TypeIdent,
    pub exponent: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivationDef {
    pub id: Option<String>,
    pub expression: String,
    pub signature: Vec<SignatureElement>,
    pub prov: Provenance,
}

impl DerivationDef {
    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or("<unnamed>")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitDef {
    pub ident: TypeIdent,
    pub prov: Provenance,
    pub quantity: Option<TypeIdent>,
    pub bias_term: bool,
    pub instances: Vec<UnitInstanceDef>,
    pub derivations: Vec<DerivationDef>,
}

// ──────────────────────────────────────────────
// Quantities (processed)
// ──────────────────────────────────────────────

/// Operator surface of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CastBehaviour {
    None,
    Implicit,
    Explicit,
}

impl CastBehaviour {
    pub const KEYWORDS: &'static [(&'static str, CastBehaviour)] = &[
        ("none", CastBehaviour::None),
        ("implicit", CastBehaviour::Implicit),
        ("explicit", CastBehaviour::Explicit),
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionDirection {
    Outgoing,
    Incoming,
    Both,
}

impl ConversionDirection {
    pub const KEYWORDS: &'static [(&'static str, ConversionDirection)] = &[
        ("outgoing", ConversionDirection::Outgoing),
        ("incoming", ConversionDirection::Incoming),
        ("both", ConversionDirection::Both),
    ];

    pub fn outgoing(self) -> bool {
        matches!(self, ConversionDirection::Outgoing | ConversionDirection::Both)
    }

    pub fn incoming(self) -> bool {
        matches!(self, ConversionDirection::Incoming | ConversionDirection::Both)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionDef {
    pub direction: ConversionDirection,
    pub cast: CastBehaviour,
    pub targets: Vec<TypeIdent>,
    pub prov: Provenance,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstantDef {
    pub name: String,
    pub unit_instance: String,
    pub value: ConstantValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiples: Option<String>,
    #[serde(skip)]
    pub prov: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Multiply,
    Divide,
    Add,
    Subtract,
}

impl OperationKind {
    pub const KEYWORDS: &'static [(&'static str, OperationKind)] = &[
        ("multiply", OperationKind::Multiply),
        ("divide", OperationKind::Divide),
        ("add", OperationKind::Add),
        ("subtract", OperationKind::Subtract),
    ];

    pub fn label(self) -> &'static str {
        match self {
            OperationKind::Multiply => "multiply",
            OperationKind::Divide => "divide",
            OperationKind::Add => "add",
            OperationKind::Subtract => "subtract",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationDef {
    pub kind: OperationKind,
    pub other: TypeIdent,
    pub result: TypeIdent,
    pub mirror: bool,
    #[serde(skip)]
    pub prov: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorOperationKind {
    Dot,
    Cross,
}

impl VectorOperationKind {
    pub const KEYWORDS: &'static [(&'static str, VectorOperationKind)] = &[
        ("dot", VectorOperationKind::Dot),
        ("cross", VectorOperationKind::Cross),
    ];

    pub fn label(self) -> &'static str {
        match self {
            VectorOperationKind::Dot => "dot",
            VectorOperationKind::Cross => "cross",
        }
    }

    /// Method name used when the declaration does not give one.
    pub fn default_name(self, position: OperandPosition) -> &'static str {
        match (self, position) {
            (VectorOperationKind::Dot, _) => "Dot",
            (VectorOperationKind::Cross, OperandPosition::Left) => "Cross",
            (VectorOperationKind::Cross, OperandPosition::Right) => "CrossInto",
        }
    }
}

/// Side of the product the declaring quantity sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperandPosition {
    Left,
    Right,
}

impl OperandPosition {
    pub const KEYWORDS: &'static [(&'static str, OperandPosition)] = &[
        ("left", OperandPosition::Left),
        ("right", OperandPosition::Right),
    ];

    pub fn flipped(self) -> OperandPosition {
        match self {
            OperandPosition::Left => OperandPosition::Right,
            OperandPosition::Right => OperandPosition::Left,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorOperationDef {
    pub kind: VectorOperationKind,
    pub position: OperandPosition,
    pub name: String,
    pub other: TypeIdent,
    pub result: TypeIdent,
    /// Set when the operation is also implemented on `other`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirrored_name: Option<String>,
    #[serde(skip)]
    pub prov: Provenance,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeIdent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessDef {
    pub name: String,
    pub expression: String,
    pub result: TypeIdent,
    pub parameters: Vec<ProcessParameter>,
    pub implement_statically: bool,
    pub property: bool,
    #[serde(skip)]
    pub prov: Provenance,
}

impl ProcessDef {
    /// Parameter types, joined for diagnostics and duplicate detection.
    pub fn signature(&self) -> String {
        self.parameters
            .iter()
            .map(|p| p.ty.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DerivationOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Dot,
    Cross,
}

impl DerivationOperator {
    pub fn symbol(self) -> char {
        match self {
            DerivationOperator::Add => '+',
            DerivationOperator::Subtract => '-',
            DerivationOperator::Multiply => '*',
            DerivationOperator::Divide => '/',
            DerivationOperator::Dot => '.',
            DerivationOperator::Cross => 'x',
        }
    }
}

/// Parsed derivation expression over signature positions.
#[derive(Debug, Clone, PartialEq)]
pub enum DerivationExpr {
    /// `{i}`: the quantity at signature position `i`.
    Operand(usize),
    /// The literal `1`.
    One,
    Binary {
        operator: DerivationOperator,
        left: Box<DerivationExpr>,
        right: Box<DerivationExpr>,
    },
}

impl DerivationExpr {
    /// Highest placeholder index used, if any.
    pub fn max_operand(&self) -> Option<usize> {
        match self {
            DerivationExpr::Operand(i) => Some(*i),
            DerivationExpr::One => None,
            DerivationExpr::Binary { left, right, .. } => left.max_operand().max(right.max_operand()),
        }
    }
}

impl fmt::Display for DerivationExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivationExpr::Operand(i) => write!(f, "{{{}}}", i),
            DerivationExpr::One => f.write_str("1"),
            DerivationExpr::Binary {
                operator,
                left,
                right,
            } => write!(f, "({} {} {})", left, operator.symbol(), right),
        }
    }
}

/// Which operators the emitter implements for a derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorImplementation {
    None,
    Exact,
}

impl OperatorImplementation {
    pub const KEYWORDS: &'static [(&'static str, OperatorImplementation)] = &[
        ("none", OperatorImplementation::None),
        ("exact", OperatorImplementation::Exact),
    ];
}

/// One concrete form of a derivation once vector groups are replaced by
/// their members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivationExpansion {
    pub result: TypeIdent,
    pub signature: Vec<TypeIdent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantityDerivationDef {
    /// Canonical, fully parenthesized form of the expression.
    pub expression: String,
    #[serde(skip)]
    pub tree: DerivationExpr,
    pub signature: Vec<TypeIdent>,
    pub operator_implementation: OperatorImplementation,
    pub permutations: bool,
    /// Filled by validation.
    pub expansions: Vec<DerivationExpansion>,
    #[serde(skip)]
    pub prov: Provenance,
}

impl QuantityDerivationDef {
    pub fn signature_label(&self) -> String {
        self.signature
            .iter()
            .map(TypeIdent::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListMode {
    Include,
    Exclude,
}

impl ListMode {
    pub fn label(self) -> &'static str {
        match self {
            ListMode::Include => "include",
            ListMode::Exclude => "exclude",
        }
    }
}

/// An inclusion or exclusion list of unit-instance names.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitList {
    pub mode: ListMode,
    pub names: Vec<String>,
    pub prov: Provenance,
}

/// Base-level fields a specialization may override. `None` = not written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuantityFields {
    pub unit: Option<TypeIdent>,
    pub biased: Option<bool>,
    pub difference: Option<TypeIdent>,
    pub implement_sum: Option<bool>,
    pub implement_difference: Option<bool>,
    pub default_unit_instance: Option<String>,
    pub default_unit_symbol: Option<String>,
    /// Scalar only: associated vector quantity.
    pub vector: Option<TypeIdent>,
    /// Vector and vector group only: magnitude scalar.
    pub scalar: Option<TypeIdent>,
    /// Vector only.
    pub dimension: Option<u32>,
    /// Vector only: owning vector group. Never inherited.
    pub member_of: Option<TypeIdent>,
    /// Scalar only.
    pub allow_negative: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InheritFlags {
    /// Scalar operations and vector operations alike.
    pub operations: bool,
    pub conversions: bool,
    pub constants: bool,
    pub units: bool,
    pub processes: bool,
}

impl Default for InheritFlags {
    fn default() -> Self {
        InheritFlags {
            operations: true,
            conversions: true,
            constants: true,
            units: true,
            processes: true,
        }
    }
}

/// The implicit conversion pair between a specialization and its original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OriginalConversion {
    pub enabled: bool,
    /// Specialization to original.
    pub forwards: CastBehaviour,
    /// Original to specialization.
    pub backwards: CastBehaviour,
}

impl Default for OriginalConversion {
    fn default() -> Self {
        OriginalConversion {
            enabled: true,
            forwards: CastBehaviour::Explicit,
            backwards: CastBehaviour::Explicit,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuantityForm {
    Base,
    Specialization {
        original: TypeIdent,
        inherit: InheritFlags,
        original_conversion: OriginalConversion,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantityDef {
    pub ident: TypeIdent,
    pub prov: Provenance,
    pub category: Category,
    pub form: QuantityForm,
    pub fields: QuantityFields,
    /// A scalar without a unit.
    pub unitless: bool,
    pub units: Option<UnitList>,
    pub conversions: Vec<ConversionDef>,
    pub constants: Vec<ConstantDef>,
    pub operations: Vec<OperationDef>,
    pub vector_operations: Vec<VectorOperationDef>,
    pub processes: Vec<ProcessDef>,
    /// Never inherited.
    pub derivations: Vec<QuantityDerivationDef>,
}

impl QuantityDef {
    pub fn original(&self) -> Option<&TypeIdent> {
        match &self.form {
            QuantityForm::Base => None,
            QuantityForm::Specialization { original, .. } => Some(original),
        }
    }

    pub fn is_specialization(&self) -> bool {
        self.original().is_some()
    }

    pub fn inherit(&self) -> InheritFlags {
        match &self.form {
            QuantityForm::Base => InheritFlags::default(),
            QuantityForm::Specialization { inherit, .. } => *inherit,
        }
    }
}

// ──────────────────────────────────────────────
// Magnitudes
// ──────────────────────────────────────────────

/// A magnitude relative to the unit's fixed instance.
///
/// Exact while every contributing factor is a literal; symbolic once a
/// deferred expression is involved, carrying the composed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Magnitude {
    Exact(f64),
    Symbolic(String),
}

impl Magnitude {
    pub const ONE: Magnitude = Magnitude::Exact(1.0);
    pub const ZERO: Magnitude = Magnitude::Exact(0.0);

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Magnitude::Exact(v) => Some(*v),
            Magnitude::Symbolic(_) => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Magnitude::Exact(v) if *v == 0.0)
    }

    pub fn is_one(&self) -> bool {
        matches!(self, Magnitude::Exact(v) if *v == 1.0)
    }

    pub fn times(&self, other: &Magnitude) -> Magnitude {
        match (self, other) {
            (Magnitude::Exact(a), Magnitude::Exact(b)) => Magnitude::Exact(a * b),
            _ if self.is_one() => other.clone(),
            _ if other.is_one() => self.clone(),
            _ => Magnitude::Symbolic(format!("({}) * ({})", self, other)),
        }
    }

    pub fn plus(&self, other: &Magnitude) -> Magnitude {
        match (self, other) {
            (Magnitude::Exact(a), Magnitude::Exact(b)) => Magnitude::Exact(a + b),
            _ if self.is_zero() => other.clone(),
            _ if other.is_zero() => self.clone(),
            _ => Magnitude::Symbolic(format!("({}) + ({})", self, other)),
        }
    }

    pub fn powi(&self, exponent: i32) -> Magnitude {
        match self {
            Magnitude::Exact(v) => Magnitude::Exact(v.powi(exponent)),
            _ if exponent == 1 => self.clone(),
            Magnitude::Symbolic(e) => Magnitude::Symbolic(format!("({})^({})", e, exponent)),
        }
    }
}

impl fmt::Display for Magnitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Magnitude::Exact(v) => write!(f, "{}", v),
            Magnitude::Symbolic(e) => f.write_str(e),
        }
    }
}

impl Serialize for Magnitude {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Magnitude::Exact(v) => serializer.serialize_f64(*v),
            Magnitude::Symbolic(e) => serializer.serialize_str(e),
        }
    }
}

// ──────────────────────────────────────────────
// Resolved units
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedInstance {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plural: Option<String>,
    pub kind: InstanceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivation: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub units: Vec<String>,
    /// Factor relative to the fixed instance.
    pub scale: Magnitude,
    /// Offset added after scaling.
    pub offset: Magnitude,
    #[serde(skip)]
    pub prov: Provenance,
}

impl ResolvedInstance {
    pub fn is_biased(&self) -> bool {
        !self.offset.is_zero()
    }
}

/// One enumerated derived instance: an instance name per signature position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedCombination {
    pub instances: Vec<String>,
    pub magnitude: Magnitude,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedDerivation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub expression: String,
    pub signature: Vec<SignatureElement>,
    pub combinations: Vec<DerivedCombination>,
    /// False when enumeration was skipped for size.
    pub enumerated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedUnit {
    pub ident: TypeIdent,
    #[serde(skip)]
    pub prov: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<TypeIdent>,
    pub bias_term: bool,
    /// Name of the fixed instance.
    pub fixed: String,
    pub instances: IndexMap<String, ResolvedInstance>,
    pub derivations: Vec<ResolvedDerivation>,
}

impl ResolvedUnit {
    pub fn instance(&self, name: &str) -> Option<&ResolvedInstance> {
        self.instances.get(name)
    }

    pub fn instance_names(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }
}

// ──────────────────────────────────────────────
// Resolved quantities
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionOrigin {
    /// The implicit pair with the original quantity.
    Specialization,
    Declared,
    Inherited,
}

/// Conversion table entry for one target. `None` = no conversion that way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConversionEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outgoing: Option<CastBehaviour>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incoming: Option<CastBehaviour>,
    pub origin: ConversionOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecializationInfo {
    pub original: TypeIdent,
    pub root: TypeIdent,
    /// Ancestors from the original up to the root.
    pub chain: Vec<TypeIdent>,
    pub inherit: InheritFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Shape {
    Scalar {
        #[serde(skip_serializing_if = "Option::is_none")]
        vector: Option<TypeIdent>,
    },
    Vector {
        dimension: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        scalar: Option<TypeIdent>,
        #[serde(skip_serializing_if = "Option::is_none")]
        group: Option<TypeIdent>,
    },
    VectorGroup {
        #[serde(skip_serializing_if = "Option::is_none")]
        scalar: Option<TypeIdent>,
        members: BTreeMap<u32, TypeIdent>,
    },
}

impl Shape {
    pub fn dimension(&self) -> Option<u32> {
        match self {
            Shape::Vector { dimension, .. } => Some(*dimension),
            _ => None,
        }
    }
}

/// A constant or operation, marked when it came from an ancestor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Member<T> {
    #[serde(flatten)]
    pub item: T,
    pub inherited: bool,
}

impl<T> Member<T> {
    pub fn own(item: T) -> Self {
        Member {
            item,
            inherited: false,
        }
    }

    pub fn inherited(item: T) -> Self {
        Member {
            item,
            inherited: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedQuantity {
    pub ident: TypeIdent,
    pub category: Category,
    #[serde(skip)]
    pub prov: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialization: Option<SpecializationInfo>,
    /// `None` for a unitless quantity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<TypeIdent>,
    /// Scalars only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_negative: Option<bool>,
    pub biased: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difference: Option<TypeIdent>,
    pub implement_sum: bool,
    pub implement_difference: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_unit_instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_unit_symbol: Option<String>,
    #[serde(flatten)]
    pub shape: Shape,
    /// Effective inclusion set, in unit declaration order.
    pub unit_instances: Vec<String>,
    pub conversions: IndexMap<TypeIdent, ConversionEntry>,
    pub constants: Vec<Member<ConstantDef>>,
    pub operations: Vec<Member<OperationDef>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vector_operations: Vec<Member<VectorOperationDef>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub processes: Vec<Member<ProcessDef>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub derivations: Vec<QuantityDerivationDef>,
}

impl ResolvedQuantity {
    pub fn is_unitless(&self) -> bool {
        self.unit.is_none()
    }

    /// The unit name for diagnostics.
    pub fn unit_label(&self) -> &str {
        self.unit.as_ref().map_or("<none>", TypeIdent::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_magnitudes_compose_numerically() {
        let km = Magnitude::Exact(1000.0);
        let min = Magnitude::Exact(60.0);
        let speed = km.powi(1).times(&min.powi(-1));
        let v = speed.as_f64().unwrap();
        assert!((v - 1000.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn symbolic_magnitudes_keep_expression() {
        let scale = Magnitude::Exact(1000.0).times(&Magnitude::Symbolic("Constants.Foot".into()));
        assert_eq!(scale, Magnitude::Symbolic("(1000) * (Constants.Foot)".into()));
        let unit = Magnitude::ONE.times(&Magnitude::Symbolic("x".into()));
        assert_eq!(unit, Magnitude::Symbolic("x".into()));
        assert!(!Magnitude::Symbolic("0".into()).is_zero());
    }

    #[test]
    fn magnitude_serializes_as_number_or_text() {
        assert_eq!(serde_json::to_value(Magnitude::Exact(2.5)).unwrap(), 2.5);
        assert_eq!(
            serde_json::to_value(Magnitude::Symbolic("a".into())).unwrap(),
            "a"
        );
    }

    #[test]
    fn derivation_expression_renders_canonically() {
        let tree = DerivationExpr::Binary {
            operator: DerivationOperator::Divide,
            left: Box::new(DerivationExpr::Operand(0)),
            right: Box::new(DerivationExpr::Binary {
                operator: DerivationOperator::Cross,
                left: Box::new(DerivationExpr::One),
                right: Box::new(DerivationExpr::Operand(2)),
            }),
        };
        assert_eq!(tree.to_string(), "({0} / (1 x {2}))");
        assert_eq!(tree.max_operand(), Some(2));
        assert_eq!(DerivationExpr::One.max_operand(), None);
    }

    #[test]
    fn cross_product_names_depend_on_position() {
        let cross = VectorOperationKind::Cross;
        assert_eq!(cross.default_name(OperandPosition::Left), "Cross");
        assert_eq!(cross.default_name(OperandPosition::Left.flipped()), "CrossInto");
        assert_eq!(VectorOperationKind::Dot.default_name(OperandPosition::Right), "Dot");
    }

    #[test]
    fn direction_flags() {
        assert!(ConversionDirection::Both.outgoing());
        assert!(ConversionDirection::Both.incoming());
        assert!(!ConversionDirection::Incoming.outgoing());
    }
}
