//! Access-path planner: turns a collection plus an optional predicate into
//! an [`ExecutionPlan`] choosing among a primary-key lookup, a secondary
//! index scan, or a full table scan (§4.8).
//!
//! The planner never touches storage — it only reasons over the catalog's
//! index descriptors and the shape of the predicate tree, producing a plan
//! the executor's pipeline then drives against the collection store and
//! B+Tree indexes.


use catalog::{CollectionEntry, IndexDescriptor};
use expr::{BinaryOp, Node};
use hashbrown::HashMap;
use types::Value;

/// The comparison an [`IndexScanKey`] applies against one index field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

/// One bound placed on a single index field, in field order.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexScanKey {
    pub field: String,
    pub comparison: Comparison,
    pub value: Value,
}

/// The chosen access path for a collection query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    FullTableScan,
    PrimaryKeyLookup,
    IndexScan,
}

/// The planner's output: an access path plus whatever predicate work is
/// left for the pipeline to apply in memory (§4.9's Filter stage).
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionPlan {
    pub strategy: Strategy,
    pub index_ref: Option<String>,
    pub keys: Vec<IndexScanKey>,
    pub estimated_cost: f64,
    pub estimated_result_count: u64,
    pub residual: Option<Node>,
}

/// One atomic comparison extracted from the predicate: `field op constant`.
#[derive(Clone, Debug)]
struct Atom {
    field: String,
    comparison: Comparison,
    value: Value,
}

pub struct Planner;

impl Planner {
    /// Choose an access path for `predicate` over `collection`.
    pub fn plan(collection: &CollectionEntry, predicate: Option<&Node>) -> ExecutionPlan {
        let Some(predicate) = predicate else {
            return full_scan(None);
        };

        let conjuncts = flatten_and(predicate);
        let mut atoms = Vec::new();
        let mut unparsed = Vec::new();
        for conjunct in &conjuncts {
            match extract_atom(conjunct) {
                Some(atom) => atoms.push(atom),
                None => unparsed.push((*conjunct).clone()),
            }
        }

        if atoms.is_empty() {
            return full_scan(Some(predicate.clone()));
        }

        // One usable atom per field: an equality atom wins over a range
        // atom; every other atom on that field is pushed into the residual.
        let mut by_field: HashMap<String, Atom> = HashMap::new();
        let mut residual_atoms: Vec<Atom> = Vec::new();
        for atom in atoms {
            match by_field.get(&atom.field) {
                None => {
                    by_field.insert(atom.field.clone(), atom);
                }
                Some(existing) => {
                    if existing.comparison != Comparison::Equal && atom.comparison == Comparison::Equal
                    {
                        let displaced = by_field.insert(atom.field.clone(), atom).unwrap();
                        residual_atoms.push(displaced);
                    } else {
                        residual_atoms.push(atom);
                    }
                }
            }
        }

        if let Some(id_atom) = by_field.get(&collection.id_field_name).filter(|a| a.comparison == Comparison::Equal) {
            let key = IndexScanKey {
                field: id_atom.field.clone(),
                comparison: Comparison::Equal,
                value: id_atom.value.clone(),
            };
            let mut leftover: Vec<Atom> = by_field
                .into_iter()
                .filter(|(f, _)| f != &collection.id_field_name)
                .map(|(_, a)| a)
                .collect();
            leftover.extend(residual_atoms);
            return ExecutionPlan {
                strategy: Strategy::PrimaryKeyLookup,
                index_ref: None,
                keys: vec![key],
                estimated_cost: 1.0,
                estimated_result_count: 1,
                residual: rebuild_residual(unparsed, leftover),
            };
        }

        match best_index(collection, &by_field) {
            Some((index, keys, matched_fields)) => {
                let unique_full_match = index.unique && matched_fields.len() == index.fields.len();
                let estimated_result_count = if unique_full_match { 1 } else { 100 };
                let mut leftover: Vec<Atom> = by_field
                    .into_iter()
                    .filter(|(f, _)| !matched_fields.contains(f))
                    .map(|(_, a)| a)
                    .collect();
                leftover.extend(residual_atoms);
                ExecutionPlan {
                    strategy: Strategy::IndexScan,
                    index_ref: Some(index.name.clone()),
                    keys,
                    estimated_cost: matched_fields.len() as f64,
                    estimated_result_count,
                    residual: rebuild_residual(unparsed, leftover),
                }
            }
            None => full_scan(Some(predicate.clone())),
        }
    }
}

fn full_scan(residual: Option<Node>) -> ExecutionPlan {
    ExecutionPlan {
        strategy: Strategy::FullTableScan,
        index_ref: None,
        keys: Vec::new(),
        estimated_cost: f64::INFINITY,
        estimated_result_count: u64::MAX,
        residual,
    }
}

/// Split a predicate into its top-level AND conjuncts.
fn flatten_and(node: &Node) -> Vec<&Node> {
    match node {
        Node::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            let mut out = flatten_and(left);
            out.extend(flatten_and(right));
            out
        }
        other => vec![other],
    }
}

/// Match `field op constant` or `constant op field`, normalizing the latter
/// by flipping the comparison direction.
fn extract_atom(node: &Node) -> Option<Atom> {
    let Node::Binary { op, left, right } = node else {
        return None;
    };
    let comparison = match op {
        BinaryOp::Equal => Comparison::Equal,
        BinaryOp::Less => Comparison::Less,
        BinaryOp::LessEq => Comparison::LessEq,
        BinaryOp::Greater => Comparison::Greater,
        BinaryOp::GreaterEq => Comparison::GreaterEq,
        _ => return None,
    };

    if let (Node::Member { name, inner: None }, Node::Constant(v)) = (left.as_ref(), right.as_ref()) {
        return Some(Atom {
            field: name.clone(),
            comparison,
            value: v.clone(),
        });
    }
    if let (Node::Constant(v), Node::Member { name, inner: None }) = (left.as_ref(), right.as_ref()) {
        return Some(Atom {
            field: name.clone(),
            comparison: flip(comparison),
            value: v.clone(),
        });
    }
    None
}

fn flip(c: Comparison) -> Comparison {
    match c {
        Comparison::Equal => Comparison::Equal,
        Comparison::Less => Comparison::Greater,
        Comparison::LessEq => Comparison::GreaterEq,
        Comparison::Greater => Comparison::Less,
        Comparison::GreaterEq => Comparison::LessEq,
    }
}

/// Find the best usable index: the longest leading run of an index's key
/// fields covered by equality atoms, optionally closed off by one range
/// atom on the next field. Ranked by prefix length, then uniqueness.
fn best_index<'a>(
    collection: &'a CollectionEntry,
    by_field: &HashMap<String, Atom>,
) -> Option<(&'a IndexDescriptor, Vec<IndexScanKey>, Vec<String>)> {
    let mut best: Option<(&IndexDescriptor, Vec<IndexScanKey>, Vec<String>)> = None;

    for index in &collection.indexes {
        let mut keys = Vec::new();
        let mut matched = Vec::new();
        for field in &index.fields {
            match by_field.get(field) {
                Some(atom) if atom.comparison == Comparison::Equal => {
                    keys.push(IndexScanKey {
                        field: field.clone(),
                        comparison: Comparison::Equal,
                        value: atom.value.clone(),
                    });
                    matched.push(field.clone());
                }
                Some(atom) => {
                    keys.push(IndexScanKey {
                        field: field.clone(),
                        comparison: atom.comparison,
                        value: atom.value.clone(),
                    });
                    matched.push(field.clone());
                    break;
                }
                None => break,
            }
        }

        if matched.is_empty() {
            continue;
        }

        let is_better = match &best {
            None => true,
            Some((best_idx, _, best_matched)) => {
                matched.len() > best_matched.len() || (matched.len() == best_matched.len() && index.unique && !best_idx.unique)
            }
        };
        if is_better {
            best = Some((index, keys, matched));
        }
    }

    best
}

/// Reconstruct the residual predicate: the conjuncts that never parsed as
/// atoms, ANDed with the atoms that weren't absorbed into the chosen path.
fn rebuild_residual(unparsed: Vec<Node>, leftover_atoms: Vec<Atom>) -> Option<Node> {
    let mut parts = unparsed;
    for atom in leftover_atoms {
        parts.push(atom_to_node(&atom));
    }
    parts.into_iter().reduce(|left, right| {
        Node::Binary {
            op: BinaryOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    })
}

fn atom_to_node(atom: &Atom) -> Node {
    let op = match atom.comparison {
        Comparison::Equal => BinaryOp::Equal,
        Comparison::Less => BinaryOp::Less,
        Comparison::LessEq => BinaryOp::LessEq,
        Comparison::Greater => BinaryOp::Greater,
        Comparison::GreaterEq => BinaryOp::GreaterEq,
    };
    Node::Binary {
        op,
        left: Box::new(Node::member(atom.field.clone())),
        right: Box::new(Node::Constant(atom.value.clone())),
    }
}
