//! Query executor: runs a [`planner::ExecutionPlan`] against storage and
//! threads the result through the pipeline stages of spec §4.9.
//!
//! # Architecture
//!
//! ```text
//! collection + predicate
//!     |
//!     v
//! planner::Planner::plan  -> ExecutionPlan (strategy, keys, residual)
//!     |
//!     v
//! scan::execute_plan      -> Vec<Document> (access path + exact re-check)
//!     |
//!     v
//! filter::Pipeline        -> Filter/OrderBy/Skip/Take/Distinct/GroupBy/...
//! ```
//!
//! Every write (`dml::insert`/`update`/`delete`) and every query runs
//! inside a [`TransactionCoordinator`], whether or not the caller opened
//! an explicit transaction — an uncoordinated write outside of `run`
//! would leave dirty pages with no before-image to roll back to.

mod builder;
mod dml;
mod filter;
mod project;
mod scan;

#[cfg(test)]
mod tests;

pub use builder::TransactionCoordinator;
pub use dml::{delete, insert, update};
pub use filter::{Aggregation, Pipeline, SortDirection};
pub use project::project;
pub use scan::execute_plan;

use catalog::CollectionEntry;
use common::{DbResult, ExecutionStats};
use expr::Node;
use planner::Planner;
use std::time::Instant;
use storage::PageAccess;
use types::Document;

/// Plan and run a read-only query against `collection`, returning every
/// document that survives both the access path and the residual filter.
pub fn query(
    pa: &mut impl PageAccess,
    collection: &CollectionEntry,
    predicate: Option<&Node>,
    stats: &mut ExecutionStats,
) -> DbResult<Vec<Document>> {
    let plan_started = Instant::now();
    let plan = Planner::plan(collection, predicate);
    stats.plan_time += plan_started.elapsed();

    let pipeline_started = Instant::now();
    let documents = execute_plan(pa, collection, &plan, stats)?;
    let produced = documents.len();

    let pipeline = Pipeline::new(documents);
    let pipeline = match &plan.residual {
        Some(residual) => pipeline.filter(residual),
        None => pipeline,
    };
    stats.documents_filtered += (produced - pipeline.len()) as u64;
    stats.pipeline_time += pipeline_started.elapsed();

    Ok(pipeline.into_documents())
}
