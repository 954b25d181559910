//! Pipeline stages that run over a materialized document set once the
//! access path has produced it (spec §4.9): Filter, OrderBy/ThenBy,
//! Skip/Take, Distinct, GroupBy, Aggregation, and the terminal reducers.
//!
//! Every stage here operates in memory — the access path in [`crate::scan`]
//! is what decides how many documents reach this file in the first place.

use common::{DbError, DbResult};
use expr::{Evaluator, Node};
use types::{Document, Value};

/// A materialized sequence of documents being threaded through pipeline
/// stages. OrderBy and GroupBy both require seeing every element, so the
/// pipeline never tries to stay lazy — it commits to a `Vec` up front.
pub struct Pipeline {
    documents: Vec<Document>,
}

impl Pipeline {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Apply a residual predicate, keeping only documents it evaluates
    /// true for. Per §4.7, any error or non-boolean result degrades to
    /// `false` rather than aborting the whole scan.
    pub fn filter(mut self, predicate: &Node) -> Self {
        self.documents.retain(|doc| {
            let root = Value::Document(doc.clone());
            Evaluator::new(&root).evaluate_predicate(predicate)
        });
        self
    }

    /// Stable sort by one or more keys, each paired with its direction.
    pub fn order_by(mut self, keys: &[(Node, SortDirection)]) -> DbResult<Self> {
        let mut keyed = Vec::with_capacity(self.documents.len());
        for doc in self.documents {
            let root = Value::Document(doc.clone());
            let evaluator = Evaluator::new(&root);
            let mut values = Vec::with_capacity(keys.len());
            for (node, _) in keys {
                values.push(evaluator.evaluate(node)?);
            }
            keyed.push((values, doc));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            for (i, (_, direction)) in keys.iter().enumerate() {
                let ordering = a[i].cmp_key(&b[i]);
                let ordering = match direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                };
                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
        self.documents = keyed.into_iter().map(|(_, doc)| doc).collect();
        Ok(self)
    }

    /// Negative counts are treated as zero (§4.9).
    pub fn skip(mut self, count: i64) -> Self {
        let count = count.max(0) as usize;
        self.documents = self.documents.into_iter().skip(count).collect();
        self
    }

    /// Negative counts are treated as zero (§4.9).
    pub fn take(mut self, count: i64) -> Self {
        let count = count.max(0) as usize;
        self.documents.truncate(count);
        self
    }

    /// Value-equality dedup, preserving first-seen order.
    pub fn distinct(mut self) -> Self {
        let mut seen: Vec<Document> = Vec::new();
        self.documents.retain(|doc| {
            if seen.iter().any(|s| s == doc) {
                false
            } else {
                seen.push(doc.clone());
                true
            }
        });
        self
    }

    /// Value-equality keyed partition. `Null` is a valid key; equal keys
    /// group together regardless of where they first appear.
    pub fn group_by(self, key: &Node) -> DbResult<Vec<(Value, Vec<Document>)>> {
        let mut groups: Vec<(Value, Vec<Document>)> = Vec::new();
        for doc in self.documents {
            let root = Value::Document(doc.clone());
            let key_value = Evaluator::new(&root).evaluate(key)?;
            match groups.iter_mut().find(|(k, _)| k == &key_value) {
                Some((_, docs)) => docs.push(doc),
                None => groups.push((key_value, vec![doc])),
            }
        }
        Ok(groups)
    }

    /// Evaluate `selector` for every document, returning the raw values —
    /// the shared groundwork for [`Aggregation`].
    fn values(&self, selector: &Node) -> DbResult<Vec<Value>> {
        self.documents
            .iter()
            .map(|doc| {
                let root = Value::Document(doc.clone());
                Evaluator::new(&root).evaluate(selector)
            })
            .collect()
    }

    pub fn aggregate(&self, kind: Aggregation, selector: Option<&Node>) -> DbResult<Value> {
        match kind {
            Aggregation::Count => Ok(Value::Int64(self.documents.len() as i64)),
            Aggregation::LongCount => Ok(Value::Int64(self.documents.len() as i64)),
            _ => {
                let selector = selector.ok_or_else(|| {
                    DbError::BadArgument("Sum/Average/Min/Max require a selector".into())
                })?;
                let values = self.values(selector)?;
                aggregate_values(kind, &values)
            }
        }
    }

    pub fn first(&self) -> DbResult<Value> {
        self.documents
            .first()
            .cloned()
            .map(Value::Document)
            .ok_or(DbError::NoElements)
    }

    pub fn first_or_default(&self) -> Value {
        self.documents.first().cloned().map(Value::Document).unwrap_or(Value::Null)
    }

    pub fn last(&self) -> DbResult<Value> {
        self.documents
            .last()
            .cloned()
            .map(Value::Document)
            .ok_or(DbError::NoElements)
    }

    pub fn last_or_default(&self) -> Value {
        self.documents.last().cloned().map(Value::Document).unwrap_or(Value::Null)
    }

    pub fn single(&self) -> DbResult<Value> {
        match self.documents.len() {
            0 => Err(DbError::NoElements),
            1 => Ok(Value::Document(self.documents[0].clone())),
            _ => Err(DbError::MoreThanOneElement),
        }
    }

    pub fn single_or_default(&self) -> DbResult<Value> {
        match self.documents.len() {
            0 => Ok(Value::Null),
            1 => Ok(Value::Document(self.documents[0].clone())),
            _ => Err(DbError::MoreThanOneElement),
        }
    }

    pub fn element_at(&self, index: usize) -> DbResult<Value> {
        self.documents
            .get(index)
            .cloned()
            .map(Value::Document)
            .ok_or(DbError::NoElements)
    }

    pub fn element_at_or_default(&self, index: usize) -> Value {
        self.documents.get(index).cloned().map(Value::Document).unwrap_or(Value::Null)
    }

    /// `true` over an empty sequence, matching the vacuous-truth convention.
    pub fn all(&self, predicate: &Node) -> bool {
        self.documents.iter().all(|doc| {
            let root = Value::Document(doc.clone());
            Evaluator::new(&root).evaluate_predicate(predicate)
        })
    }

    /// With no predicate, `any` is just non-emptiness.
    pub fn any(&self, predicate: Option<&Node>) -> bool {
        match predicate {
            None => !self.documents.is_empty(),
            Some(predicate) => self.documents.iter().any(|doc| {
                let root = Value::Document(doc.clone());
                Evaluator::new(&root).evaluate_predicate(predicate)
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Average,
    Min,
    Max,
    Count,
    LongCount,
}

fn aggregate_values(kind: Aggregation, values: &[Value]) -> DbResult<Value> {
    match kind {
        Aggregation::Sum => {
            if values.is_empty() {
                return Ok(Value::Int64(0));
            }
            let total = values.iter().filter_map(Value::to_f64).sum::<f64>();
            Ok(Value::Double(total))
        }
        Aggregation::Average => {
            if values.is_empty() {
                return Ok(Value::Int64(0));
            }
            let total = values.iter().filter_map(Value::to_f64).sum::<f64>();
            Ok(Value::Double(total / values.len() as f64))
        }
        Aggregation::Min => Ok(values.iter().min_by(|a, b| a.cmp_key(b)).cloned().unwrap_or(Value::Null)),
        Aggregation::Max => Ok(values.iter().max_by(|a, b| a.cmp_key(b)).cloned().unwrap_or(Value::Null)),
        Aggregation::Count | Aggregation::LongCount => {
            unreachable!("Count/LongCount never reach aggregate_values")
        }
    }
}
