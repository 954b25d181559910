//! `Value`: the tagged union every document field and QE-IR constant holds.

use crate::datetime::DateTime;
use crate::decimal::Decimal128;
use crate::document::Document;
use crate::object_id::ObjectId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// The closed set of scalar and compound types a document field can hold.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Decimal128(Decimal128),
    String(String),
    Binary(Vec<u8>),
    DateTime(DateTime),
    ObjectId(ObjectId),
    Array(Vec<Value>),
    Document(Document),
}

/// Stable category rank used to order values of incompatible categories,
/// per the IndexKey comparison rule: null < number < string < binary <
/// datetime < object-id < boolean < array < document.
fn category_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Int32(_) | Value::Int64(_) | Value::Double(_) | Value::Decimal128(_) => 1,
        Value::String(_) => 2,
        Value::Binary(_) => 3,
        Value::DateTime(_) => 4,
        Value::ObjectId(_) => 5,
        Value::Bool(_) => 6,
        Value::Array(_) => 7,
        Value::Document(_) => 8,
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(
            self,
            Value::Int32(_) | Value::Int64(_) | Value::Double(_) | Value::Decimal128(_)
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    /// Exact-for-integers, lossy-for-double promotion to `Decimal128`, used
    /// for both IndexKey equality/ordering and the evaluator's numeric rules.
    pub fn to_decimal(&self) -> Option<Decimal128> {
        match self {
            Value::Int32(v) => Some(Decimal128::from_i64(*v as i64)),
            Value::Int64(v) => Some(Decimal128::from_i64(*v)),
            Value::Double(v) => Some(Decimal128::from_f64(*v)),
            Value::Decimal128(v) => Some(*v),
            _ => None,
        }
    }

    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(*v as f64),
            Value::Int64(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Decimal128(v) => Some(v.to_f64()),
            _ => None,
        }
    }

    /// Render a scalar the way the evaluator's last-resort, predicate-only
    /// ToString comparison does (§4.7 / §9). Never used for index keys.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int32(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::Decimal128(v) => v.to_string(),
            Value::String(s) => s.clone(),
            Value::Binary(b) => hex_encode(b),
            Value::DateTime(dt) => dt.to_string(),
            Value::ObjectId(id) => id.to_string(),
            Value::Array(_) | Value::Document(_) => format!("{self:?}"),
        }
    }

    /// Total order over the value universe, per the IndexKey comparison
    /// rule in spec §4.5. Cross-category values compare by `category_rank`;
    /// within a category, numeric values promote to `Decimal128`.
    pub fn cmp_key(&self, other: &Value) -> Ordering {
        let (ra, rb) = (category_rank(self), category_rank(other));
        if ra != rb {
            return ra.cmp(&rb);
        }
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (a, b) if a.is_number() && b.is_number() => {
                a.to_decimal().unwrap().cmp_value(&b.to_decimal().unwrap())
            }
            (Value::String(a), Value::String(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Value::Binary(a), Value::Binary(b)) => {
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::ObjectId(a), Value::ObjectId(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => cmp_slices(a, b),
            (Value::Document(a), Value::Document(b)) => cmp_documents(a, b),
            _ => unreachable!("category_rank guarantees matching variants"),
        }
    }

    /// Value-equality per the IndexKey rule: same as `cmp_key == Equal`.
    pub fn eq_key(&self, other: &Value) -> bool {
        self.cmp_key(other) == Ordering::Equal
    }
}

fn cmp_slices(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = x.cmp_key(y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

fn cmp_documents(a: &Document, b: &Document) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| {
        for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
            let ord = ka.cmp(kb).then_with(|| va.cmp_key(vb));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    })
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.eq_key(other)
    }
}
impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp_key(other))
    }
}
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_key(other)
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Hashed consistently with `eq_key`: cross-type numeric equality
        // (Int32(10) == Double(10.0)) must hash identically, so numbers
        // hash via their canonical decimal rendering rather than the
        // variant's native representation. Values are not expected to
        // carry NaN (the document model has no way to construct one from
        // a literal or a deserialized field).
        category_rank(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            v if v.is_number() => v.to_decimal().unwrap().hash(state),
            Value::String(s) => s.hash(state),
            Value::Binary(b) => b.hash(state),
            Value::DateTime(dt) => dt.hash(state),
            Value::ObjectId(id) => id.hash(state),
            Value::Array(items) => {
                for item in items {
                    item.hash(state);
                }
            }
            Value::Document(doc) => {
                for (k, v) in doc.iter() {
                    k.hash(state);
                    v.hash(state);
                }
            }
            Value::Int32(_) | Value::Int64(_) | Value::Double(_) | Value::Decimal128(_) => {
                unreachable!("covered by the is_number() arm above")
            }
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Value::ObjectId(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn null_is_less_than_everything() {
        assert_eq!(Value::Null.cmp_key(&Value::Int32(0)), Ordering::Less);
        assert_eq!(Value::Null.cmp_key(&Value::Bool(false)), Ordering::Less);
        assert_eq!(Value::Null.cmp_key(&Value::Null), Ordering::Equal);
    }

    #[test]
    fn category_rank_orders_incompatible_types() {
        assert_eq!(
            Value::Int32(1).cmp_key(&Value::String("a".into())),
            Ordering::Less
        );
        assert_eq!(
            Value::String("a".into()).cmp_key(&Value::Bool(true)),
            Ordering::Less
        );
        assert_eq!(
            Value::Bool(true).cmp_key(&Value::Array(vec![])),
            Ordering::Less
        );
    }

    #[test]
    fn numeric_promotion_equality() {
        assert_eq!(Value::Int32(10), Value::Double(10.0));
        assert_eq!(Value::Int64(10), Value::Decimal128(Decimal128::new(10, 0)));
        assert_eq!(Value::Double(10.0), Value::Decimal128(Decimal128::new(1000, 2)));
    }

    #[test]
    fn numeric_promotion_ordering() {
        assert_eq!(Value::Int32(5).cmp_key(&Value::Double(5.5)), Ordering::Less);
    }

    #[test]
    fn string_ordering_is_byte_wise() {
        assert_eq!(
            Value::String("a".into()).cmp_key(&Value::String("b".into())),
            Ordering::Less
        );
    }

    #[test]
    fn binary_compares_length_then_bytes() {
        let short = Value::Binary(vec![9, 9]);
        let long = Value::Binary(vec![1, 1, 1]);
        assert_eq!(short.cmp_key(&long), Ordering::Less);

        let a = Value::Binary(vec![1, 2]);
        let b = Value::Binary(vec![1, 3]);
        assert_eq!(a.cmp_key(&b), Ordering::Less);
    }

    #[test]
    fn hash_matches_cross_type_equality() {
        use std::collections::HashMap as StdMap;
        let mut map = StdMap::new();
        map.insert(Value::Int32(10), "ten");
        assert_eq!(map.get(&Value::Double(10.0)), Some(&"ten"));
    }

    proptest! {
        #[test]
        fn int_double_equality_holds(i in -1_000_000i32..1_000_000) {
            prop_assert_eq!(Value::Int32(i), Value::Double(i as f64));
        }

        #[test]
        fn cmp_key_is_antisymmetric(a in -1000i32..1000, b in -1000i32..1000) {
            let va = Value::Int32(a);
            let vb = Value::Int32(b);
            prop_assert_eq!(va.cmp_key(&vb), vb.cmp_key(&va).reverse());
        }
    }
}
