//! Composable reads over a [`Collection`] (spec §4.9): a predicate the
//! planner can push into an access path, plus the pipeline stages that run
//! over whatever documents that access path produces.

use crate::Collection;
use common::DbResult;
use executor::{Aggregation, Pipeline, SortDirection};
use expr::Node;
use types::{Document, Value};

/// A query under construction. Each builder method returns `Self` so calls
/// chain; nothing runs until a terminal method (`run`, `first`, `count`,
/// ...) is called.
pub struct Query<'db> {
    collection: Collection<'db>,
    predicate: Option<Node>,
    order: Vec<(Node, SortDirection)>,
    skip: Option<i64>,
    take: Option<i64>,
    distinct: bool,
}

impl<'db> Query<'db> {
    pub(crate) fn new(collection: Collection<'db>) -> Self {
        Self {
            collection,
            predicate: None,
            order: Vec::new(),
            skip: None,
            take: None,
            distinct: false,
        }
    }

    /// Restrict results to documents `predicate` evaluates true for. The
    /// planner decides whether this is served by an index or a full scan
    /// with in-memory filtering; either way the result set is identical.
    pub fn filter(mut self, predicate: Node) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Add an ordering key; later calls act as `ThenBy`/`ThenByDescending`.
    pub fn order_by(mut self, key: Node, direction: SortDirection) -> Self {
        self.order.push((key, direction));
        self
    }

    pub fn skip(mut self, count: i64) -> Self {
        self.skip = Some(count);
        self
    }

    pub fn take(mut self, count: i64) -> Self {
        self.take = Some(count);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    fn pipeline(&self) -> DbResult<Pipeline> {
        let documents = self.collection.find(self.predicate.as_ref())?;
        let mut pipeline = Pipeline::new(documents);
        if !self.order.is_empty() {
            pipeline = pipeline.order_by(&self.order)?;
        }
        if self.distinct {
            pipeline = pipeline.distinct();
        }
        if let Some(count) = self.skip {
            pipeline = pipeline.skip(count);
        }
        if let Some(count) = self.take {
            pipeline = pipeline.take(count);
        }
        Ok(pipeline)
    }

    /// Materialize every document the query selects, in whatever order the
    /// `order_by` chain (if any) produced.
    pub fn run(self) -> DbResult<Vec<Document>> {
        Ok(self.pipeline()?.into_documents())
    }

    /// Run the query, then reshape each surviving document through
    /// `selector`.
    pub fn project(self, selector: &Node) -> DbResult<Vec<Document>> {
        executor::project(&self.pipeline()?.into_documents(), selector)
    }

    pub fn group_by(self, key: &Node) -> DbResult<Vec<(Value, Vec<Document>)>> {
        self.pipeline()?.group_by(key)
    }

    pub fn aggregate(self, kind: Aggregation, selector: Option<&Node>) -> DbResult<Value> {
        self.pipeline()?.aggregate(kind, selector)
    }

    pub fn first(self) -> DbResult<Value> {
        self.pipeline()?.first()
    }

    pub fn first_or_default(self) -> DbResult<Value> {
        Ok(self.pipeline()?.first_or_default())
    }

    pub fn single(self) -> DbResult<Value> {
        self.pipeline()?.single()
    }

    pub fn single_or_default(self) -> DbResult<Value> {
        self.pipeline()?.single_or_default()
    }

    pub fn count(self) -> DbResult<i64> {
        match self.pipeline()?.aggregate(Aggregation::Count, None)? {
            Value::Int64(n) => Ok(n),
            other => unreachable!("Count always yields Int64, got {other:?}"),
        }
    }

    pub fn any(self) -> DbResult<bool> {
        Ok(self.pipeline()?.any(None))
    }
}
