use crate::error::{Error, Result};
use crate::features::{FeatureRecord, Field, FieldKind, Value};
use serde::{Deserialize, Serialize};

/// Bumped whenever the meaning of a named field changes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

/// The ordered, named inputs a trained model expects. Recorded in the artifact at training time
/// and the only source of column order at prediction time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FeatureSchema {
    pub version: u32,
    fields: Vec<FieldSpec>,
}

impl FeatureSchema {
    pub fn from_fields(fields: &[Field]) -> FeatureSchema {
        FeatureSchema {
            version: SCHEMA_VERSION,
            fields: fields
                .iter()
                .map(|f| FieldSpec {
                    name: f.name().to_string(),
                    kind: f.kind(),
                })
                .collect(),
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn categorical(&self) -> impl Iterator<Item = (usize, &FieldSpec)> {
        self.of_kind(FieldKind::Categorical)
    }

    pub fn numeric(&self) -> impl Iterator<Item = (usize, &FieldSpec)> {
        self.of_kind(FieldKind::Numeric)
    }

    fn of_kind(&self, kind: FieldKind) -> impl Iterator<Item = (usize, &FieldSpec)> {
        self.fields
            .iter()
            .enumerate()
            .filter(move |(_, f)| f.kind == kind)
    }

    /// Maps each recorded name back to a field the deriver can produce, preserving order.
    pub fn resolve(&self) -> Result<Vec<Field>> {
        self.fields
            .iter()
            .map(|spec| match Field::from_name(&spec.name) {
                Some(field) if field.kind() == spec.kind => Ok(field),
                _ => Err(self.mismatch(Field::ALL.iter().map(|f| f.name().to_string()))),
            })
            .collect()
    }

    /// Returns the record's values in schema order. Names and arity must match exactly;
    /// submission order is irrelevant.
    pub fn align<'a>(&self, record: &'a FeatureRecord) -> Result<Vec<&'a Value>> {
        if record.len() != self.fields.len() {
            return Err(self.mismatch(record.names().map(str::to_string)));
        }
        self.fields
            .iter()
            .map(|spec| match record.get(&spec.name) {
                Some(value) if value.kind() == spec.kind => Ok(value),
                _ => Err(self.mismatch(record.names().map(str::to_string))),
            })
            .collect()
    }

    fn mismatch<I: Iterator<Item = String>>(&self, found: I) -> Error {
        Error::SchemaMismatch {
            expected: self.names(),
            found: found.collect(),
        }
    }
}
