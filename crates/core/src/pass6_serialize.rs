//! Pass 6: Resolved model serialization -- canonical JSON with sorted keys,
//! types sorted by identity within each category.
//!
//! This is the hand-off value for emission. Every resolved type carries its
//! location token under `prov`.

use crate::ast::Provenance;
use crate::pass2_population::{Definition, Population};
use crate::resolve::ResolvedBatch;
use crate::MODEL_FORMAT_VERSION;
use serde::Serialize;
use serde_json::{json, Map, Value};

pub fn serialize(batch: &ResolvedBatch) -> Result<Value, serde_json::Error> {
    let mut model = Map::new();
    model.insert("cancelled".to_owned(), Value::Bool(batch.cancelled));
    model.insert("format".to_owned(), json!(MODEL_FORMAT_VERSION));
    model.insert("units".to_owned(), serialize_population(&batch.units)?);
    model.insert("scalars".to_owned(), serialize_population(&batch.scalars)?);
    model.insert("vectors".to_owned(), serialize_population(&batch.vectors)?);
    model.insert(
        "vector_groups".to_owned(),
        serialize_population(&batch.vector_groups)?,
    );
    Ok(Value::Object(model))
}

fn serialize_population<T: Definition + Serialize>(
    population: &Population<T>,
) -> Result<Value, serde_json::Error> {
    let mut items: Vec<&T> = population.values().collect();
    items.sort_by(|a, b| a.ident().cmp(b.ident()));
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let mut value = serde_json::to_value(item)?;
        if let Value::Object(fields) = &mut value {
            fields.insert("prov".to_owned(), serialize_prov(item.prov()));
        }
        out.push(value);
    }
    Ok(Value::Array(out))
}

fn serialize_prov(prov: &Provenance) -> Value {
    let mut m = Map::new();
    m.insert("file".to_owned(), json!(prov.file));
    m.insert("line".to_owned(), json!(prov.line));
    Value::Object(m)
}
