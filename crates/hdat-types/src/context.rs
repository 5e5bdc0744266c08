//! Run context: the large, opaque side product of a case run.
//!
//! Context is archived with every result so `show` and `diff` can
//! visualize it later, but it is never compared and never reaches the
//! golden store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Typed numeric buffer backing [`Context::Array`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayData {
    U8(Vec<u8>),
    I64(Vec<i64>),
    F64(Vec<f64>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            Self::U8(values) => values.len(),
            Self::I64(values) => values.len(),
            Self::F64(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type tag, e.g. `"f64"`.
    pub const fn element_type(&self) -> &'static str {
        match self {
            Self::U8(_) => "u8",
            Self::I64(_) => "i64",
            Self::F64(_) => "f64",
        }
    }
}

/// Opaque per-run context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Context {
    #[default]
    Empty,
    /// Raw bytes, e.g. an encoded image.
    Bytes(Vec<u8>),
    /// Arbitrary structured data.
    Json(Value),
    /// N-dimensional buffer stored in row-major order.
    Array { shape: Vec<u64>, data: ArrayData },
    /// Named sub-contexts.
    Fields(BTreeMap<String, Context>),
}

impl Context {
    /// Build an array context, checking that `shape` matches the data length.
    pub fn array(shape: Vec<u64>, data: ArrayData) -> Option<Self> {
        let expected = shape
            .iter()
            .try_fold(1u64, |acc, dim| acc.checked_mul(*dim))?;
        (expected == data.len() as u64).then_some(Self::Array { shape, data })
    }

    /// Bit-level equality. Unlike `==`, float payloads compare by bits so a
    /// stored `NaN` is identical to itself.
    pub fn is_identical(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Array {
                    shape: shape_a,
                    data: ArrayData::F64(a),
                },
                Self::Array {
                    shape: shape_b,
                    data: ArrayData::F64(b),
                },
            ) => {
                shape_a == shape_b
                    && a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (Self::Fields(a), Self::Fields(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.is_identical(vb))
            }
            _ => self == other,
        }
    }

    /// Short human description used by listings and logs.
    pub fn summary(&self) -> String {
        match self {
            Self::Empty => "empty".to_owned(),
            Self::Bytes(bytes) => format!("{} bytes", bytes.len()),
            Self::Json(_) => "json".to_owned(),
            Self::Array { shape, data } => {
                let dims: Vec<String> = shape.iter().map(u64::to_string).collect();
                format!("{}[{}]", data.element_type(), dims.join("x"))
            }
            Self::Fields(fields) => {
                let names: Vec<&str> = fields.keys().map(String::as_str).collect();
                format!("{{{}}}", names.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_shape_must_match_data() {
        assert!(Context::array(vec![2, 2], ArrayData::U8(vec![0; 4])).is_some());
        assert!(Context::array(vec![2, 3], ArrayData::U8(vec![0; 4])).is_none());
        assert!(Context::array(vec![u64::MAX, 2], ArrayData::U8(Vec::new())).is_none());
    }

    #[test]
    fn nan_payloads_are_identical_to_themselves() {
        let ctx = Context::array(vec![1], ArrayData::F64(vec![f64::NAN])).expect("valid array");
        assert_ne!(ctx, ctx.clone(), "case=partial_eq_nan");
        assert!(ctx.is_identical(&ctx.clone()), "case=bitwise_nan");
    }

    #[test]
    fn summary_describes_shape() {
        let ctx = Context::array(vec![2, 3], ArrayData::F64(vec![0.0; 6])).expect("valid array");
        assert_eq!(ctx.summary(), "f64[2x3]");
    }
}
