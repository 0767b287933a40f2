use crate::features::Value;
use crate::schema::FeatureSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
struct OneHot {
    column: usize,
    name: String,
    categories: Vec<String>,
}

/// One-hot blocks for the categorical columns followed by the numeric columns, each in schema
/// order. Unseen categories encode as an all-zero block; non-finite numbers as 0.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ColumnEncoder {
    one_hot: Vec<OneHot>,
    numeric: Vec<usize>,
}

impl ColumnEncoder {
    pub fn fit<R, V>(schema: &FeatureSchema, rows: &[R]) -> ColumnEncoder
    where
        R: AsRef<[V]>,
        V: AsRef<Value>,
    {
        let one_hot = schema
            .categorical()
            .map(|(column, spec)| {
                let categories: BTreeSet<&str> = rows
                    .iter()
                    .filter_map(|row| match row.as_ref().get(column).map(V::as_ref) {
                        Some(Value::Category(s)) => Some(s.as_str()),
                        _ => None,
                    })
                    .collect();
                OneHot {
                    column,
                    name: spec.name.clone(),
                    categories: categories.into_iter().map(str::to_string).collect(),
                }
            })
            .collect();
        ColumnEncoder {
            one_hot,
            numeric: schema.numeric().map(|(column, _)| column).collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.one_hot.iter().map(|c| c.categories.len()).sum::<usize>() + self.numeric.len()
    }

    pub fn categories(&self, name: &str) -> Option<&[String]> {
        self.one_hot
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.categories.as_slice())
    }

    pub fn transform<V: AsRef<Value>>(&self, row: &[V]) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.width());
        for block in &self.one_hot {
            let start = out.len();
            out.resize(start + block.categories.len(), 0.0);
            if let Some(Value::Category(s)) = row.get(block.column).map(V::as_ref) {
                match block.categories.binary_search(s) {
                    Ok(i) => out[start + i] = 1.0,
                    Err(_) => debug!(field = %block.name, value = %s, "unseen category"),
                }
            }
        }
        for &column in &self.numeric {
            out.push(match row.get(column).map(V::as_ref) {
                Some(Value::Number(x)) if x.is_finite() => *x,
                _ => 0.0,
            });
        }
        out
    }
}

impl AsRef<Value> for Value {
    fn as_ref(&self) -> &Value {
        self
    }
}
