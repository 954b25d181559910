//! The query-expression IR: a tagged node tree shared by the planner's
//! predicate analysis and the executor's evaluator. Every projection,
//! filter, and computed field a query carries compiles down to this tree.

use serde::{Deserialize, Serialize};
use types::Value;

/// Target type for an explicit `Convert` coercion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetType {
    Int32,
    Int64,
    Double,
    Decimal128,
    String,
    Bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Convert(TargetType),
    ArrayLength,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    And,
    Or,
}

/// A node in the query-expression tree.
///
/// `Member` resolves a name against a value: against `inner` when present,
/// otherwise against the expression root (the document or parameter being
/// evaluated). `Function` dispatches by name against the string, math,
/// datetime, and collection tables (§4.7); `target` is the receiver the
/// function acts on, defaulting to the root when absent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Node {
    Constant(Value),
    Parameter,
    Member {
        name: String,
        inner: Option<Box<Node>>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Function {
        name: String,
        target: Option<Box<Node>>,
        args: Vec<Node>,
    },
    Conditional {
        test: Box<Node>,
        if_true: Box<Node>,
        if_false: Box<Node>,
    },
    Constructor {
        type_name: String,
        args: Vec<Node>,
    },
    MemberInit {
        type_name: String,
        members: Vec<(String, Node)>,
    },
}

impl Node {
    pub fn member(name: impl Into<String>) -> Self {
        Node::Member {
            name: name.into(),
            inner: None,
        }
    }

    pub fn member_of(name: impl Into<String>, inner: Node) -> Self {
        Node::Member {
            name: name.into(),
            inner: Some(Box::new(inner)),
        }
    }

    pub fn binary(op: BinaryOp, left: Node, right: Node) -> Self {
        Node::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}
