//! Project stage: reshapes each document through a selector expression
//! (§4.9). A bare `Constructor`/`MemberInit` node produces a new tagged
//! document; any other expression produces a single-field `"value"`
//! wrapper so scalar projections still round-trip as documents.

use common::DbResult;
use expr::{Evaluator, Node};
use types::{Document, Value};

pub fn project(documents: &[Document], selector: &Node) -> DbResult<Vec<Document>> {
    documents
        .iter()
        .map(|doc| {
            let root = Value::Document(doc.clone());
            let projected = Evaluator::new(&root).evaluate(selector)?;
            Ok(match projected {
                Value::Document(inner) => inner,
                other => {
                    let mut wrapper = Document::new();
                    wrapper.insert("value", other);
                    wrapper
                }
            })
        })
        .collect()
}
