//! The query-expression evaluator: walks a [`Node`] tree against a document
//! (or a sub-value reached through member access) and produces a [`Value`].
//!
//! Evaluation follows three rules consistently: arithmetic and comparison
//! propagate `Null` when either side is `Null`; logical operators short-
//! circuit and treat `Null` as `false` unless both sides are `Null`; and a
//! type mismatch that surfaces while evaluating a *predicate* degrades to
//! `false` rather than aborting the query (§7) — callers that need a plain
//! value (projections, computed fields) see the underlying error instead.

mod node;
#[cfg(test)]
mod tests;

pub use node::{BinaryOp, Node, TargetType, UnaryOp};

use common::{DbError, DbResult};
use types::{DateTime, Decimal128, Document, Value};

/// Evaluates `Node` trees against a single root value (almost always a
/// document). Stateless beyond the root, so one evaluator is built per row.
pub struct Evaluator<'a> {
    root: &'a Value,
}

impl<'a> Evaluator<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }

    /// Evaluate a node used in predicate (filter) position: any evaluation
    /// error or non-bool result degrades to `false` rather than failing the
    /// query, per the type-mismatch rule in §7.
    pub fn evaluate_predicate(&self, node: &Node) -> bool {
        matches!(self.evaluate(node), Ok(Value::Bool(true)))
    }

    /// Evaluate a node used in value position (projections, computed
    /// fields): errors propagate to the caller.
    pub fn evaluate(&self, node: &Node) -> DbResult<Value> {
        match node {
            Node::Constant(v) => Ok(v.clone()),
            Node::Parameter => Ok(self.root.clone()),
            Node::Member { name, inner } => {
                let base = match inner {
                    Some(inner) => self.evaluate(inner)?,
                    None => self.root.clone(),
                };
                Ok(resolve_member(&base, name))
            }
            Node::Unary { op, operand } => self.evaluate_unary(*op, operand),
            Node::Binary { op, left, right } => self.evaluate_binary(*op, left, right),
            Node::Function { name, target, args } => {
                let receiver = match target {
                    Some(t) => self.evaluate(t)?,
                    None => self.root.clone(),
                };
                self.evaluate_function(name, &receiver, args)
            }
            Node::Conditional {
                test,
                if_true,
                if_false,
            } => {
                if matches!(self.evaluate(test), Ok(Value::Bool(true))) {
                    self.evaluate(if_true)
                } else {
                    self.evaluate(if_false)
                }
            }
            Node::Constructor { type_name, args } => {
                let mut doc = Document::new();
                doc.insert("__type", Value::String(type_name.clone()));
                for (i, arg) in args.iter().enumerate() {
                    doc.insert(format!("_{i}"), self.evaluate(arg)?);
                }
                Ok(Value::Document(doc))
            }
            Node::MemberInit { type_name, members } => {
                let mut doc = Document::new();
                doc.insert("__type", Value::String(type_name.clone()));
                for (name, value_node) in members {
                    doc.insert(name.clone(), self.evaluate(value_node)?);
                }
                Ok(Value::Document(doc))
            }
        }
    }

    fn evaluate_unary(&self, op: UnaryOp, operand: &Node) -> DbResult<Value> {
        let v = self.evaluate(operand)?;
        match op {
            UnaryOp::Not => match v {
                Value::Null => Ok(Value::Null),
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => Err(DbError::BadArgument(format!(
                    "NOT expects a bool, got {other:?}"
                ))),
            },
            UnaryOp::ArrayLength => match v {
                Value::Array(items) => Ok(Value::Int64(items.len() as i64)),
                _ => Ok(Value::Null),
            },
            UnaryOp::Convert(target) => Ok(convert(&v, target)),
        }
    }

    fn evaluate_binary(&self, op: BinaryOp, left: &Node, right: &Node) -> DbResult<Value> {
        use BinaryOp::*;

        if matches!(op, And | Or) {
            return self.evaluate_logical(op, left, right);
        }

        let l = self.evaluate(left)?;
        let r = self.evaluate(right)?;
        if l.is_null() || r.is_null() {
            return Ok(Value::Null);
        }

        match op {
            Add | Subtract | Multiply | Divide => arithmetic(op, &l, &r),
            Equal | NotEqual | Less | LessEq | Greater | GreaterEq => {
                let ord = compare(&l, &r);
                let result = match op {
                    Equal => ord == std::cmp::Ordering::Equal,
                    NotEqual => ord != std::cmp::Ordering::Equal,
                    Less => ord == std::cmp::Ordering::Less,
                    LessEq => ord != std::cmp::Ordering::Greater,
                    Greater => ord == std::cmp::Ordering::Greater,
                    GreaterEq => ord != std::cmp::Ordering::Less,
                    _ => unreachable!(),
                };
                Ok(Value::Bool(result))
            }
            And | Or => unreachable!("handled above"),
        }
    }

    /// `And`/`Or` short-circuit: `left` is returned as-is when it alone
    /// determines the result, and `right` is never evaluated in that case
    /// (its errors must not surface).
    fn evaluate_logical(&self, op: BinaryOp, left: &Node, right: &Node) -> DbResult<Value> {
        let l = self.evaluate(left)?;
        if op == BinaryOp::And && matches!(l, Value::Bool(false)) {
            return Ok(l);
        }
        if op == BinaryOp::Or && matches!(l, Value::Bool(true)) {
            return Ok(l);
        }
        let r = self.evaluate(right)?;
        if op == BinaryOp::And {
            tri_state(&l, &r, |a, b| a && b)
        } else {
            tri_state(&l, &r, |a, b| a || b)
        }
    }

    fn evaluate_function(&self, name: &str, receiver: &Value, args: &[Node]) -> DbResult<Value> {
        let mut evaluated_args = Vec::with_capacity(args.len());
        for arg in args {
            evaluated_args.push(self.evaluate(arg)?);
        }
        call_function(name, receiver, &evaluated_args)
    }
}

/// `null` is treated as `false` unless both operands are `null`, in which
/// case the result is `null` too.
fn tri_state(l: &Value, r: &Value, f: impl Fn(bool, bool) -> bool) -> DbResult<Value> {
    if l.is_null() && r.is_null() {
        return Ok(Value::Null);
    }
    let lb = truthy(l)?;
    let rb = truthy(r)?;
    Ok(Value::Bool(f(lb, rb)))
}

fn truthy(v: &Value) -> DbResult<bool> {
    match v {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(DbError::BadArgument(format!(
            "expected a bool in logical position, got {other:?}"
        ))),
    }
}

/// Member resolution rules (§4.7): the `Id` alias maps to `_id`; `Count`
/// reads the length of an array or the field count of a document; string
/// `Length` counts UTF-16 code units; `DateTime` exposes its date/time
/// components. Any unmatched combination resolves to `Null` rather than
/// erroring, since member access sits in predicate as well as value position.
fn resolve_member(value: &Value, name: &str) -> Value {
    if name.eq_ignore_ascii_case("count") {
        return match value {
            Value::Array(items) => Value::Int64(items.len() as i64),
            Value::Document(doc) => Value::Int64(doc.len() as i64),
            _ => Value::Null,
        };
    }

    match value {
        Value::Document(doc) => {
            if name.eq_ignore_ascii_case("id") {
                return doc.get_ci("_id").map(|(_, v)| v.clone()).unwrap_or(Value::Null);
            }
            doc.get_ci(name).map(|(_, v)| v.clone()).unwrap_or(Value::Null)
        }
        Value::String(s) if name.eq_ignore_ascii_case("length") => {
            Value::Int32(s.encode_utf16().count() as i32)
        }
        Value::DateTime(dt) => resolve_datetime_member(dt, name),
        _ => Value::Null,
    }
}

fn resolve_datetime_member(dt: &DateTime, name: &str) -> Value {
    let lower = name.to_ascii_lowercase();
    match lower.as_str() {
        "year" => Value::Int32(dt.year()),
        "month" => Value::Int32(dt.month() as i32),
        "day" => Value::Int32(dt.day() as i32),
        "hour" => Value::Int32(dt.hour() as i32),
        "minute" => Value::Int32(dt.minute() as i32),
        "second" => Value::Int32(dt.second() as i32),
        "date" => Value::DateTime(dt.date()),
        "dayofweek" => Value::String(format!("{:?}", dt.day_of_week())),
        _ => Value::Null,
    }
}

/// Explicit `Convert` coercion. Degrades to `Null` on an unrepresentable
/// combination (e.g. converting a document to `Int32`) rather than erroring,
/// matching the evaluator's general tolerance for type mismatches.
fn convert(value: &Value, target: TargetType) -> Value {
    match target {
        TargetType::String => Value::String(value.to_display_string()),
        TargetType::Bool => match value {
            Value::Bool(b) => Value::Bool(*b),
            Value::Null => Value::Null,
            _ => Value::Null,
        },
        TargetType::Int32 => value
            .to_decimal()
            .map(|d| Value::Int32(d.to_f64() as i32))
            .unwrap_or(Value::Null),
        TargetType::Int64 => value
            .to_decimal()
            .map(|d| Value::Int64(d.to_f64() as i64))
            .unwrap_or(Value::Null),
        TargetType::Double => value.to_f64().map(Value::Double).unwrap_or(Value::Null),
        TargetType::Decimal128 => value.to_decimal().map(Value::Decimal128).unwrap_or(Value::Null),
    }
}

/// Two-path comparison (§4.7/§9): numeric-or-same-category values compare
/// via `Value::cmp_key` (identical to the B+Tree's IndexKey ordering);
/// incompatible categories fall back to comparing `to_display_string()`
/// output. This ToString fallback is scoped to the evaluator alone and is
/// never reachable from an index's key comparison.
fn compare(l: &Value, r: &Value) -> std::cmp::Ordering {
    let same_category = (l.is_number() && r.is_number())
        || std::mem::discriminant(l) == std::mem::discriminant(r);
    if same_category {
        l.cmp_key(r)
    } else {
        l.to_display_string().cmp(&r.to_display_string())
    }
}

/// Arithmetic promotion (§4.7): integer-only inputs stay integral when the
/// result fits (`int32`, else `int64`); any `double` or `decimal128` operand
/// promotes the whole expression to that wider type. Division by zero
/// yields `Null`; integer division that isn't exact promotes to `double`.
fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> DbResult<Value> {
    if !l.is_number() || !r.is_number() {
        return Err(DbError::BadArgument(format!(
            "arithmetic requires numeric operands, got {l:?} and {r:?}"
        )));
    }

    if matches!(l, Value::Decimal128(_)) || matches!(r, Value::Decimal128(_)) {
        return decimal_arithmetic(op, l.to_decimal().unwrap(), r.to_decimal().unwrap());
    }
    if matches!(l, Value::Double(_)) || matches!(r, Value::Double(_)) {
        return double_arithmetic(op, l.to_f64().unwrap(), r.to_f64().unwrap());
    }

    let (li, ri) = (as_i64(l), as_i64(r));
    match op {
        BinaryOp::Add => Ok(narrow(li + ri)),
        BinaryOp::Subtract => Ok(narrow(li - ri)),
        BinaryOp::Multiply => Ok(narrow(li * ri)),
        BinaryOp::Divide => {
            if ri == 0 {
                return Ok(Value::Null);
            }
            if li % ri == 0 {
                Ok(narrow(li / ri))
            } else {
                Ok(Value::Double(li as f64 / ri as f64))
            }
        }
        _ => unreachable!("only arithmetic ops reach here"),
    }
}

fn as_i64(v: &Value) -> i64 {
    match v {
        Value::Int32(v) => *v as i64,
        Value::Int64(v) => *v,
        _ => unreachable!("caller already checked is_number and ruled out double/decimal"),
    }
}

fn narrow(v: i64) -> Value {
    if let Ok(v32) = i32::try_from(v) {
        Value::Int32(v32)
    } else {
        Value::Int64(v)
    }
}

fn double_arithmetic(op: BinaryOp, l: f64, r: f64) -> DbResult<Value> {
    let result = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Subtract => l - r,
        BinaryOp::Multiply => l * r,
        BinaryOp::Divide => {
            if r == 0.0 {
                return Ok(Value::Null);
            }
            l / r
        }
        _ => unreachable!(),
    };
    Ok(Value::Double(result))
}

/// `Decimal128` exposes only `add`; subtraction is synthesized by negating
/// the right operand's mantissa, and multiply/divide round-trip through
/// `f64` (the same lossy path `from_f64` already takes for literals),
/// trading a little precision at the far end of the mantissa for not having
/// to hand-roll 128-bit fixed-point multiplication.
fn decimal_arithmetic(op: BinaryOp, l: Decimal128, r: Decimal128) -> DbResult<Value> {
    match op {
        BinaryOp::Add => Ok(Value::Decimal128(l.add(&r))),
        BinaryOp::Subtract => {
            let negated = Decimal128::new(-r.mantissa(), r.scale());
            Ok(Value::Decimal128(l.add(&negated)))
        }
        BinaryOp::Multiply => Ok(Value::Decimal128(Decimal128::from_f64(l.to_f64() * r.to_f64()))),
        BinaryOp::Divide => {
            if r.to_f64() == 0.0 {
                return Ok(Value::Null);
            }
            Ok(Value::Decimal128(Decimal128::from_f64(l.to_f64() / r.to_f64())))
        }
        _ => unreachable!(),
    }
}

/// String, math, datetime, and collection function tables (§4.7). Lookup is
/// case-insensitive and flat: a name that doesn't match any table is an
/// unsupported function, which is fatal rather than degrading (unlike a
/// member-access miss), since it usually signals a planner/evaluator gap
/// rather than a normal missing-field case.
fn call_function(name: &str, receiver: &Value, args: &[Value]) -> DbResult<Value> {
    let lower = name.to_ascii_lowercase();
    match lower.as_str() {
        "contains" | "startswith" | "endswith" => {
            let needle = args.first().and_then(Value::as_str).unwrap_or("");
            let hay = match receiver.as_str() {
                Some(s) => s,
                None => return Ok(Value::Bool(false)),
            };
            let result = match lower.as_str() {
                "contains" => hay.contains(needle),
                "startswith" => hay.starts_with(needle),
                _ => hay.ends_with(needle),
            };
            Ok(Value::Bool(result))
        }
        "tolower" | "toupper" | "trim" => {
            let Some(s) = receiver.as_str() else {
                return Ok(receiver.clone());
            };
            let result = match lower.as_str() {
                "tolower" => s.to_lowercase(),
                "toupper" => s.to_uppercase(),
                _ => s.trim().to_string(),
            };
            Ok(Value::String(result))
        }
        "substring" => {
            let Some(s) = receiver.as_str() else {
                return Ok(receiver.clone());
            };
            let start = args
                .first()
                .and_then(Value::to_f64)
                .ok_or_else(|| DbError::BadArgument("Substring requires a start index".into()))?
                as usize;
            let chars: Vec<char> = s.chars().collect();
            let start = start.min(chars.len());
            let len = args
                .get(1)
                .and_then(Value::to_f64)
                .map(|l| l as usize)
                .unwrap_or(chars.len() - start);
            let end = (start + len).min(chars.len());
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        "replace" => {
            let Some(s) = receiver.as_str() else {
                return Ok(receiver.clone());
            };
            let from = args.first().and_then(Value::as_str).unwrap_or("");
            let to = args.get(1).and_then(Value::as_str).unwrap_or("");
            Ok(Value::String(s.replace(from, to)))
        }
        "abs" | "ceiling" | "floor" | "sqrt" | "round" => {
            let Some(x) = receiver.to_f64() else {
                return Ok(Value::Null);
            };
            let result = match lower.as_str() {
                "abs" => x.abs(),
                "ceiling" => x.ceil(),
                "floor" => x.floor(),
                "sqrt" => x.sqrt(),
                _ => {
                    let digits = args.first().and_then(Value::to_f64).unwrap_or(0.0);
                    let factor = 10f64.powf(digits);
                    (x * factor).round() / factor
                }
            };
            Ok(Value::Double(result))
        }
        "pow" => {
            let base = receiver.to_f64().unwrap_or(0.0);
            let exp = args.first().and_then(Value::to_f64).unwrap_or(0.0);
            Ok(Value::Double(base.powf(exp)))
        }
        "min" | "max" => {
            // Two forms share a name: `Min(a, b)` picks the lesser/greater of
            // two scalars; `array.Min()` reduces a collection. Disambiguated
            // by whether an argument was supplied.
            if let Some(other) = args.first() {
                let ord = compare(receiver, other);
                let pick_left = match lower.as_str() {
                    "min" => ord != std::cmp::Ordering::Greater,
                    _ => ord != std::cmp::Ordering::Less,
                };
                return Ok(if pick_left { receiver.clone() } else { other.clone() });
            }
            let Value::Array(items) = receiver else {
                return Ok(Value::Null);
            };
            if items.is_empty() {
                return Ok(Value::Null);
            }
            let picked = match lower.as_str() {
                "min" => items.iter().min_by(|a, b| compare(a, b)),
                _ => items.iter().max_by(|a, b| compare(a, b)),
            };
            Ok(picked.cloned().unwrap())
        }
        "adddays" | "addhours" | "addminutes" | "addseconds" | "addmonths" | "addyears" => {
            let Value::DateTime(dt) = receiver else {
                return Ok(Value::Null);
            };
            let amount = args.first().and_then(Value::to_f64).unwrap_or(0.0);
            let result = match lower.as_str() {
                "adddays" => dt.add_days(amount as i64),
                "addhours" => dt.add_hours(amount as i64),
                "addminutes" => dt.add_minutes(amount as i64),
                "addseconds" => dt.add_seconds(amount as i64),
                "addmonths" => dt.add_months(amount as i32),
                _ => dt.add_years(amount as i32),
            };
            Ok(Value::DateTime(result))
        }
        "tostring" => Ok(Value::String(receiver.to_display_string())),
        "count" => Ok(match receiver {
            Value::Array(items) => Value::Int64(items.len() as i64),
            _ => Value::Null,
        }),
        "sum" | "average" => {
            let Value::Array(items) = receiver else {
                return Ok(Value::Null);
            };
            let values: Vec<f64> = items.iter().filter_map(Value::to_f64).collect();
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let total: f64 = values.iter().sum();
            Ok(Value::Double(if lower == "sum" {
                total
            } else {
                total / values.len() as f64
            }))
        }
        other => Err(DbError::Unsupported(format!("function '{other}'"))),
    }
}
