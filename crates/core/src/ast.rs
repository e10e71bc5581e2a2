//! Raw Definition records: the input contract of the resolution engine.
//!
//! Records arrive already structured (one JSON document per batch
//! fragment). Every declared field is a [`RawField`], which keeps the
//! difference between "not written", "written as null" and "written with a
//! value"; the processing pass relies on that distinction. A value of the
//! wrong type, or a list element that is not a record, is kept as a
//! malformed marker instead of failing the whole fragment.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::fmt;
use tracing::debug;

// ──────────────────────────────────────────────
// Provenance
// ──────────────────────────────────────────────

/// Opaque location token carried from the declaration site into diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(default)]
pub struct Provenance {
    pub file: String,
    pub line: u32,
}

impl Provenance {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Provenance {
            file: file.into(),
            line,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.file.is_empty() && self.line == 0
    }

    /// Members without their own location borrow the enclosing record's.
    pub fn or(&self, fallback: &Provenance) -> Provenance {
        if self.is_unknown() {
            fallback.clone()
        } else if self.file.is_empty() {
            Provenance::new(fallback.file.clone(), self.line)
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = if self.file.is_empty() {
            "<unknown>"
        } else {
            &self.file
        };
        write!(f, "{}:{}", file, self.line)
    }
}

// ──────────────────────────────────────────────
// Type identity
// ──────────────────────────────────────────────

/// Globally unique key of a declared type. Never resolved eagerly; always
/// looked up through a population.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeIdent(String);

impl TypeIdent {
    pub fn new(name: impl Into<String>) -> Self {
        TypeIdent(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TypeIdent {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeIdent {
    fn from(s: &str) -> Self {
        TypeIdent(s.to_owned())
    }
}

impl From<String> for TypeIdent {
    fn from(s: String) -> Self {
        TypeIdent(s)
    }
}

// ──────────────────────────────────────────────
// Three-state field
// ──────────────────────────────────────────────

/// A declared field: absent, explicitly null, explicitly set, or written
/// with a value of the wrong type.
///
/// Absent fields come from `#[serde(default)]`; any present JSON value
/// (including `null`) marks the field explicit. A value that does not fit
/// the field's type is kept as [`Setting::Malformed`] so that only the
/// owning record is affected.
#[derive(Debug, Clone, PartialEq)]
pub struct RawField<T> {
    state: FieldState<T>,
}

#[derive(Debug, Clone, PartialEq)]
enum FieldState<T> {
    Unset,
    Null,
    Value(T),
    Malformed(String),
}

/// View of a [`RawField`] for matching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setting<'a, T> {
    Unset,
    Null,
    Value(&'a T),
    /// The written value has the wrong type; carries the reason.
    Malformed(&'a str),
}

impl<T> Default for RawField<T> {
    fn default() -> Self {
        RawField {
            state: FieldState::Unset,
        }
    }
}

impl<T> RawField<T> {
    pub fn unset() -> Self {
        RawField::default()
    }

    pub fn null() -> Self {
        RawField {
            state: FieldState::Null,
        }
    }

    pub fn set(value: T) -> Self {
        RawField {
            state: FieldState::Value(value),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        RawField {
            state: FieldState::Malformed(reason.into()),
        }
    }

    pub fn is_explicit(&self) -> bool {
        !matches!(self.state, FieldState::Unset)
    }

    pub fn value(&self) -> Option<&T> {
        match &self.state {
            FieldState::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn setting(&self) -> Setting<'_, T> {
        match &self.state {
            FieldState::Unset => Setting::Unset,
            FieldState::Null => Setting::Null,
            FieldState::Value(v) => Setting::Value(v),
            FieldState::Malformed(reason) => Setting::Malformed(reason),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for RawField<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(RawField::null());
        }
        Ok(match serde_json::from_value(value) {
            Ok(v) => RawField::set(v),
            Err(e) => RawField::malformed(e.to_string()),
        })
    }
}

/// A list of names; individual elements may be null.
pub type RawNameList = RawField<Vec<Option<String>>>;

// ──────────────────────────────────────────────
// Malformed records
// ──────────────────────────────────────────────

/// Marker left in place of a record or member that could not be read.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedRecord {
    /// Position inside the enclosing list.
    pub index: usize,
    pub reason: String,
}

/// A record or member read from a list. Elements that fail to deserialize
/// become defaulted records carrying a [`MalformedRecord`] marker.
pub trait RawRecord: DeserializeOwned + Default {
    fn prov_mut(&mut self) -> &mut Provenance;

    fn malformed_mut(&mut self) -> &mut Option<MalformedRecord>;

    fn malformed_at(index: usize, reason: String, prov: Provenance) -> Self {
        let mut record = Self::default();
        *record.prov_mut() = prov;
        *record.malformed_mut() = Some(MalformedRecord { index, reason });
        record
    }
}

macro_rules! raw_records {
    ($($record:ty),* $(,)?) => {
        $(
            impl RawRecord for $record {
                fn prov_mut(&mut self) -> &mut Provenance {
                    &mut self.prov
                }

                fn malformed_mut(&mut self) -> &mut Option<MalformedRecord> {
                    &mut self.malformed
                }
            }
        )*
    };
}

raw_records!(
    RawUnit,
    RawUnitInstance,
    RawDerivation,
    RawQuantity,
    RawSpecialization,
    RawConversion,
    RawConstant,
    RawOperation,
    RawProcess,
    RawQuantityDerivation,
    RawVectorOperation,
);

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Read a list of records one element at a time.
fn records<'de, D, R>(deserializer: D) -> Result<Vec<R>, D::Error>
where
    D: Deserializer<'de>,
    R: RawRecord,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => {
            let reason = format!("expected a list of records, found {}", json_kind(&other));
            return Ok(vec![R::malformed_at(0, reason, Provenance::default())]);
        }
    };
    Ok(items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let prov = item
                .get("prov")
                .and_then(|p| serde_json::from_value(p.clone()).ok())
                .unwrap_or_default();
            serde_json::from_value(item).unwrap_or_else(|e| R::malformed_at(index, e.to_string(), prov))
        })
        .collect())
}

/// An unreadable location token degrades to an unknown one.
fn lenient_prov<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Provenance, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_else(|e| {
        debug!(error = %e, "unreadable location token ignored");
        Provenance::default()
    }))
}

// ──────────────────────────────────────────────
// Units
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, expecting = "a unit record object")]
pub struct RawUnit {
    pub ident: RawField<String>,
    #[serde(deserialize_with = "lenient_prov")]
    pub prov: Provenance,
    /// Scalar quantity describing the unit, if any.
    pub quantity: RawField<String>,
    pub bias_term: RawField<bool>,
    #[serde(deserialize_with = "records")]
    pub instances: Vec<RawUnitInstance>,
    #[serde(deserialize_with = "records")]
    pub derivations: Vec<RawDerivation>,
    #[serde(skip)]
    pub malformed: Option<MalformedRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, expecting = "a unit instance object")]
pub struct RawUnitInstance {
    #[serde(deserialize_with = "lenient_prov")]
    pub prov: Provenance,
    pub kind: RawField<String>,
    pub name: RawField<String>,
    pub plural: RawField<String>,
    pub from: RawField<String>,
    pub scale: RawField<f64>,
    pub scale_expression: RawField<String>,
    pub bias: RawField<f64>,
    pub bias_expression: RawField<String>,
    pub metric_prefix: RawField<String>,
    pub binary_prefix: RawField<String>,
    pub derivation: RawField<String>,
    pub units: RawNameList,
    #[serde(skip)]
    pub malformed: Option<MalformedRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, expecting = "a derivation object")]
pub struct RawDerivation {
    #[serde(deserialize_with = "lenient_prov")]
    pub prov: Provenance,
    pub id: RawField<String>,
    pub expression: RawField<String>,
    pub signature: RawField<Vec<RawSignatureElement>>,
    #[serde(skip)]
    pub malformed: Option<MalformedRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, expecting = "a signature element object")]
pub struct RawSignatureElement {
    pub unit: RawField<String>,
    pub exponent: RawField<i64>,
}

// ──────────────────────────────────────────────
// Quantities
// ──────────────────────────────────────────────

/// Fields shared by bases and specializations of every quantity category.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawQuantityFields {
    pub unit: RawField<String>,
    pub biased: RawField<bool>,
    pub difference: RawField<String>,
    pub implement_sum: RawField<bool>,
    pub implement_difference: RawField<bool>,
    pub default_unit_instance: RawField<String>,
    pub default_unit_symbol: RawField<String>,
    pub vector: RawField<String>,
    pub scalar: RawField<String>,
    pub dimension: RawField<i64>,
    pub member_of: RawField<String>,
    /// Unitless quantities only.
    pub allow_negative: RawField<bool>,
    pub included_units: RawNameList,
    pub excluded_units: RawNameList,
    #[serde(deserialize_with = "records")]
    pub conversions: Vec<RawConversion>,
    #[serde(deserialize_with = "records")]
    pub constants: Vec<RawConstant>,
    #[serde(deserialize_with = "records")]
    pub operations: Vec<RawOperation>,
    #[serde(deserialize_with = "records")]
    pub vector_operations: Vec<RawVectorOperation>,
    #[serde(deserialize_with = "records")]
    pub processes: Vec<RawProcess>,
    #[serde(deserialize_with = "records")]
    pub derivations: Vec<RawQuantityDerivation>,
}

impl RawQuantityFields {
    fn member_provs(&mut self) -> impl Iterator<Item = &mut Provenance> {
        self.conversions
            .iter_mut()
            .map(|c| &mut c.prov)
            .chain(self.constants.iter_mut().map(|c| &mut c.prov))
            .chain(self.operations.iter_mut().map(|o| &mut o.prov))
            .chain(self.vector_operations.iter_mut().map(|o| &mut o.prov))
            .chain(self.processes.iter_mut().map(|p| &mut p.prov))
            .chain(self.derivations.iter_mut().map(|d| &mut d.prov))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, expecting = "a quantity record object")]
pub struct RawQuantity {
    pub ident: RawField<String>,
    #[serde(deserialize_with = "lenient_prov")]
    pub prov: Provenance,
    #[serde(flatten)]
    pub fields: RawQuantityFields,
    #[serde(skip)]
    pub malformed: Option<MalformedRecord>,
}

/// A specialization, or a unitless quantity (whose `original` is optional).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, expecting = "a quantity record object")]
pub struct RawSpecialization {
    pub ident: RawField<String>,
    #[serde(deserialize_with = "lenient_prov")]
    pub prov: Provenance,
    pub original: RawField<String>,
    pub inherit_operations: RawField<bool>,
    pub inherit_conversions: RawField<bool>,
    pub inherit_constants: RawField<bool>,
    pub inherit_units: RawField<bool>,
    pub inherit_processes: RawField<bool>,
    pub original_conversion: RawField<bool>,
    pub forwards_cast: RawField<String>,
    pub backwards_cast: RawField<String>,
    #[serde(flatten)]
    pub fields: RawQuantityFields,
    #[serde(skip)]
    pub malformed: Option<MalformedRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, expecting = "a conversion object")]
pub struct RawConversion {
    #[serde(deserialize_with = "lenient_prov")]
    pub prov: Provenance,
    pub direction: RawField<String>,
    pub cast: RawField<String>,
    pub targets: RawNameList,
    #[serde(skip)]
    pub malformed: Option<MalformedRecord>,
}

/// A scalar constant value, or one component per vector dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, expecting = "a number or a list of numbers")]
pub enum ConstantValue {
    Scalar(f64),
    Components(Vec<f64>),
}

impl ConstantValue {
    /// Number of components; `None` for a scalar value.
    pub fn components(&self) -> Option<usize> {
        match self {
            ConstantValue::Scalar(_) => None,
            ConstantValue::Components(c) => Some(c.len()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, expecting = "a constant object")]
pub struct RawConstant {
    #[serde(deserialize_with = "lenient_prov")]
    pub prov: Provenance,
    pub name: RawField<String>,
    pub unit_instance: RawField<String>,
    pub value: RawField<ConstantValue>,
    pub multiples: RawField<String>,
    #[serde(skip)]
    pub malformed: Option<MalformedRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, expecting = "an operation object")]
pub struct RawOperation {
    #[serde(deserialize_with = "lenient_prov")]
    pub prov: Provenance,
    pub kind: RawField<String>,
    pub other: RawField<String>,
    pub result: RawField<String>,
    pub mirror: RawField<bool>,
    #[serde(skip)]
    pub malformed: Option<MalformedRecord>,
}

/// Dot or cross product of a vector quantity with another vector.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, expecting = "a vector operation object")]
pub struct RawVectorOperation {
    #[serde(deserialize_with = "lenient_prov")]
    pub prov: Provenance,
    pub kind: RawField<String>,
    pub position: RawField<String>,
    pub other: RawField<String>,
    pub result: RawField<String>,
    pub mirror: RawField<bool>,
    pub name: RawField<String>,
    pub mirrored_name: RawField<String>,
    #[serde(skip)]
    pub malformed: Option<MalformedRecord>,
}

/// A named computation exposed by a quantity.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, expecting = "a process object")]
pub struct RawProcess {
    #[serde(deserialize_with = "lenient_prov")]
    pub prov: Provenance,
    pub name: RawField<String>,
    pub expression: RawField<String>,
    pub result: RawField<String>,
    pub signature: RawNameList,
    pub parameter_names: RawNameList,
    pub implement_statically: RawField<bool>,
    pub property: RawField<bool>,
    #[serde(skip)]
    pub malformed: Option<MalformedRecord>,
}

/// An expression deriving the quantity from other quantities.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, expecting = "a quantity derivation object")]
pub struct RawQuantityDerivation {
    #[serde(deserialize_with = "lenient_prov")]
    pub prov: Provenance,
    pub expression: RawField<String>,
    pub signature: RawNameList,
    pub operator_implementation: RawField<String>,
    pub permutations: RawField<bool>,
    #[serde(skip)]
    pub malformed: Option<MalformedRecord>,
}

// ──────────────────────────────────────────────
// Batch
// ──────────────────────────────────────────────

/// Every raw record of one input batch, grouped by category.
///
/// Order inside and between categories carries no meaning.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, expecting = "a batch fragment object")]
pub struct RawBatch {
    #[serde(deserialize_with = "records")]
    pub units: Vec<RawUnit>,
    #[serde(deserialize_with = "records")]
    pub scalars: Vec<RawQuantity>,
    #[serde(deserialize_with = "records")]
    pub scalar_specializations: Vec<RawSpecialization>,
    #[serde(deserialize_with = "records")]
    pub unitless_quantities: Vec<RawSpecialization>,
    #[serde(deserialize_with = "records")]
    pub vectors: Vec<RawQuantity>,
    #[serde(deserialize_with = "records")]
    pub vector_specializations: Vec<RawSpecialization>,
    #[serde(deserialize_with = "records")]
    pub vector_groups: Vec<RawQuantity>,
    #[serde(deserialize_with = "records")]
    pub vector_group_specializations: Vec<RawSpecialization>,
}

impl RawBatch {
    /// Parse one fragment. Only text that is not a JSON object fails;
    /// mistyped fields and records are kept for pass 1 to report.
    pub fn from_json_str(text: &str) -> Result<RawBatch, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn from_json_value(value: serde_json::Value) -> Result<RawBatch, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Append every record of `other`.
    pub fn merge(&mut self, other: RawBatch) {
        self.units.extend(other.units);
        self.scalars.extend(other.scalars);
        self.scalar_specializations
            .extend(other.scalar_specializations);
        self.unitless_quantities.extend(other.unitless_quantities);
        self.vectors.extend(other.vectors);
        self.vector_specializations
            .extend(other.vector_specializations);
        self.vector_groups.extend(other.vector_groups);
        self.vector_group_specializations
            .extend(other.vector_group_specializations);
    }

    /// Number of top-level records.
    pub fn len(&self) -> usize {
        self.units.len()
            + self.scalars.len()
            + self.scalar_specializations.len()
            + self.unitless_quantities.len()
            + self.vectors.len()
            + self.vector_specializations.len()
            + self.vector_groups.len()
            + self.vector_group_specializations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill in `file` on every location token that does not name one.
    pub fn stamp_file(&mut self, file: &str) {
        fn stamp(prov: &mut Provenance, file: &str) {
            if prov.file.is_empty() {
                prov.file = file.to_owned();
            }
        }

        for unit in &mut self.units {
            stamp(&mut unit.prov, file);
            for i in &mut unit.instances {
                stamp(&mut i.prov, file);
            }
            for d in &mut unit.derivations {
                stamp(&mut d.prov, file);
            }
        }
        for q in self
            .scalars
            .iter_mut()
            .chain(self.vectors.iter_mut())
            .chain(self.vector_groups.iter_mut())
        {
            stamp(&mut q.prov, file);
            q.fields.member_provs().for_each(|p| stamp(p, file));
        }
        for s in self
            .scalar_specializations
            .iter_mut()
            .chain(self.unitless_quantities.iter_mut())
            .chain(self.vector_specializations.iter_mut())
            .chain(self.vector_group_specializations.iter_mut())
        {
            stamp(&mut s.prov, file);
            s.fields.member_provs().for_each(|p| stamp(p, file));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_field_distinguishes_absent_null_and_value() {
        let batch = RawBatch::from_json_value(json!({
            "units": [
                { "ident": "Length", "bias_term": null },
                { "ident": "Time", "bias_term": false },
                { "ident": "Mass" }
            ]
        }))
        .unwrap();
        assert_eq!(batch.units[0].bias_term.setting(), Setting::Null);
        assert_eq!(batch.units[1].bias_term.setting(), Setting::Value(&false));
        assert_eq!(batch.units[2].bias_term.setting(), Setting::Unset);
        assert!(!batch.units[2].bias_term.is_explicit());
    }

    #[test]
    fn flattened_quantity_fields_deserialize() {
        let batch = RawBatch::from_json_value(json!({
            "scalar_specializations": [{
                "ident": "Distance",
                "original": "Length",
                "inherit_units": false,
                "included_units": ["Metre", null],
                "dimension": 3
            }]
        }))
        .unwrap();
        let spec = &batch.scalar_specializations[0];
        assert_eq!(spec.original.value().map(String::as_str), Some("Length"));
        assert_eq!(spec.inherit_units.value(), Some(&false));
        assert_eq!(
            spec.fields.included_units.value(),
            Some(&vec![Some("Metre".to_string()), None])
        );
        assert_eq!(spec.fields.dimension.value(), Some(&3));
    }

    #[test]
    fn mistyped_field_is_kept_for_its_record() {
        let batch = RawBatch::from_json_value(json!({
            "scalars": [
                { "ident": "Length", "unit": "UnitOfLength" },
                { "ident": "Width", "unit": "UnitOfLength", "biased": "yes" }
            ]
        }))
        .unwrap();
        assert_eq!(batch.scalars.len(), 2);
        assert!(batch.scalars[0].malformed.is_none());
        let biased = &batch.scalars[1].fields.biased;
        assert!(biased.is_explicit());
        assert_eq!(biased.value(), None);
        match biased.setting() {
            Setting::Malformed(reason) => assert!(reason.contains("expected a boolean"), "{}", reason),
            other => panic!("unexpected setting {:?}", other),
        }
    }

    #[test]
    fn unreadable_elements_become_markers() {
        let batch = RawBatch::from_json_value(json!({
            "units": [
                7,
                { "ident": "Time", "prov": { "file": "t.json", "line": 2 } },
                { "ident": "Mass", "prov": "nowhere" }
            ],
            "vectors": "none",
            "scalars": [{ "ident": "Length", "unit": "UnitOfLength", "operations": [true] }]
        }))
        .unwrap();
        assert_eq!(batch.units.len(), 3);
        let marker = batch.units[0].malformed.as_ref().unwrap();
        assert_eq!(marker.index, 0);
        assert!(marker.reason.contains("a unit record object"), "{}", marker.reason);
        assert_eq!(batch.units[1].prov, Provenance::new("t.json", 2));
        assert!(batch.units[2].malformed.is_none());
        assert!(batch.units[2].prov.is_unknown());
        assert!(batch.vectors[0].malformed.is_some());
        assert_eq!(batch.scalars[0].fields.operations[0].malformed.as_ref().unwrap().index, 0);
    }

    #[test]
    fn text_that_is_not_an_object_fails() {
        assert!(RawBatch::from_json_str("[1, 2]").is_err());
        assert!(RawBatch::from_json_str("{ \"units\": ").is_err());
    }

    #[test]
    fn constant_value_is_a_number_or_components() {
        let batch = RawBatch::from_json_value(json!({
            "vectors": [{
                "ident": "Position3",
                "constants": [
                    { "name": "Ones", "value": [1, 1.0, 1] },
                    { "name": "Half", "value": 0.5 },
                    { "name": "Bad", "value": "one" }
                ]
            }]
        }))
        .unwrap();
        let constants = &batch.vectors[0].fields.constants;
        assert_eq!(
            constants[0].value.value(),
            Some(&ConstantValue::Components(vec![1.0, 1.0, 1.0]))
        );
        assert_eq!(constants[1].value.value(), Some(&ConstantValue::Scalar(0.5)));
        assert!(matches!(constants[2].value.setting(), Setting::Malformed(_)));
    }

    #[test]
    fn stamp_file_fills_only_missing_files() {
        let mut batch = RawBatch::from_json_value(json!({
            "units": [
                { "ident": "Length", "prov": { "line": 4 }, "instances": [{ "name": "Metre" }] },
                { "ident": "Time", "prov": { "file": "time.json", "line": 1 } }
            ]
        }))
        .unwrap();
        batch.stamp_file("units.json");
        assert_eq!(batch.units[0].prov, Provenance::new("units.json", 4));
        assert_eq!(batch.units[0].instances[0].prov.file, "units.json");
        assert_eq!(batch.units[1].prov.file, "time.json");
    }

    #[test]
    fn member_provenance_falls_back_to_record() {
        let record = Provenance::new("units.json", 7);
        assert_eq!(Provenance::default().or(&record), record);
        assert_eq!(
            Provenance::new("", 9).or(&record),
            Provenance::new("units.json", 9)
        );
    }

    #[test]
    fn merge_appends_all_categories() {
        let mut a = RawBatch::from_json_value(json!({ "units": [{ "ident": "Length" }] })).unwrap();
        let b = RawBatch::from_json_value(json!({
            "scalars": [{ "ident": "Length" }],
            "vector_groups": [{ "ident": "Position" }]
        }))
        .unwrap();
        a.merge(b);
        assert_eq!(a.len(), 3);
    }
}
