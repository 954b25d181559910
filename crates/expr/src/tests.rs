use super::*;
use types::ObjectId;

fn doc_with(fields: &[(&str, Value)]) -> Value {
    let mut doc = Document::new();
    for (k, v) in fields {
        doc.insert(*k, v.clone());
    }
    Value::Document(doc)
}

#[test]
fn constant_and_parameter_round_trip() {
    let root = Value::Int32(7);
    let eval = Evaluator::new(&root);
    assert_eq!(eval.evaluate(&Node::Constant(Value::Bool(true))).unwrap(), Value::Bool(true));
    assert_eq!(eval.evaluate(&Node::Parameter).unwrap(), Value::Int32(7));
}

#[test]
fn member_access_is_case_insensitive() {
    let root = doc_with(&[("Email", Value::String("a@x.com".into()))]);
    let eval = Evaluator::new(&root);
    let result = eval.evaluate(&Node::member("email")).unwrap();
    assert_eq!(result, Value::String("a@x.com".into()));
}

#[test]
fn id_alias_resolves_to_underscore_id_field() {
    let id = ObjectId::new();
    let root = doc_with(&[("_id", Value::ObjectId(id))]);
    let eval = Evaluator::new(&root);
    assert_eq!(eval.evaluate(&Node::member("Id")).unwrap(), Value::ObjectId(id));
}

#[test]
fn count_on_array_and_document() {
    let arr_root = Value::Array(vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)]);
    let eval = Evaluator::new(&arr_root);
    assert_eq!(eval.evaluate(&Node::member("Count")).unwrap(), Value::Int64(3));

    let doc_root = doc_with(&[("a", Value::Int32(1)), ("b", Value::Int32(2))]);
    let eval = Evaluator::new(&doc_root);
    assert_eq!(eval.evaluate(&Node::member("Count")).unwrap(), Value::Int64(2));
}

#[test]
fn string_length_counts_utf16_code_units() {
    let root = Value::String("hi".into());
    let eval = Evaluator::new(&root);
    assert_eq!(eval.evaluate(&Node::member("Length")).unwrap(), Value::Int32(2));
}

#[test]
fn datetime_components_resolve_by_member() {
    use types::DateTime;
    let dt = DateTime::from_unix_micros(0).add_years(54).add_months(2).add_days(14);
    let root = Value::DateTime(dt);
    let eval = Evaluator::new(&root);
    assert_eq!(eval.evaluate(&Node::member("Year")).unwrap(), Value::Int32(dt.year()));
    assert_eq!(eval.evaluate(&Node::member("Month")).unwrap(), Value::Int32(dt.month() as i32));
}

#[test]
fn unmatched_member_degrades_to_null() {
    let root = doc_with(&[("a", Value::Int32(1))]);
    let eval = Evaluator::new(&root);
    assert_eq!(eval.evaluate(&Node::member("missing")).unwrap(), Value::Null);
}

#[test]
fn arithmetic_promotes_int32_to_int64_on_overflow() {
    let root = Value::Null;
    let eval = Evaluator::new(&root);
    let expr = Node::binary(
        BinaryOp::Add,
        Node::Constant(Value::Int32(i32::MAX)),
        Node::Constant(Value::Int32(1)),
    );
    assert_eq!(eval.evaluate(&expr).unwrap(), Value::Int64(i32::MAX as i64 + 1));
}

#[test]
fn division_by_zero_is_null() {
    let root = Value::Null;
    let eval = Evaluator::new(&root);
    let expr = Node::binary(
        BinaryOp::Divide,
        Node::Constant(Value::Int32(10)),
        Node::Constant(Value::Int32(0)),
    );
    assert_eq!(eval.evaluate(&expr).unwrap(), Value::Null);
}

#[test]
fn non_exact_integer_division_promotes_to_double() {
    let root = Value::Null;
    let eval = Evaluator::new(&root);
    let expr = Node::binary(
        BinaryOp::Divide,
        Node::Constant(Value::Int32(7)),
        Node::Constant(Value::Int32(2)),
    );
    assert_eq!(eval.evaluate(&expr).unwrap(), Value::Double(3.5));
}

#[test]
fn arithmetic_with_a_null_operand_is_null() {
    let root = Value::Null;
    let eval = Evaluator::new(&root);
    let expr = Node::binary(BinaryOp::Add, Node::Constant(Value::Null), Node::Constant(Value::Int32(1)));
    assert_eq!(eval.evaluate(&expr).unwrap(), Value::Null);
}

#[test]
fn decimal_subtract_and_multiply_use_the_addition_and_float_fallback() {
    use types::Decimal128;
    let root = Value::Null;
    let eval = Evaluator::new(&root);
    let sub = Node::binary(
        BinaryOp::Subtract,
        Node::Constant(Value::Decimal128(Decimal128::new(500, 2))),
        Node::Constant(Value::Decimal128(Decimal128::new(150, 2))),
    );
    assert_eq!(eval.evaluate(&sub).unwrap(), Value::Decimal128(Decimal128::new(350, 2)));

    let mul = Node::binary(
        BinaryOp::Multiply,
        Node::Constant(Value::Decimal128(Decimal128::new(200, 2))),
        Node::Constant(Value::Decimal128(Decimal128::new(300, 2))),
    );
    assert_eq!(eval.evaluate(&mul).unwrap(), Value::Decimal128(Decimal128::from_f64(6.0)));
}

#[test]
fn comparison_promotes_across_numeric_types() {
    let root = Value::Null;
    let eval = Evaluator::new(&root);
    let expr = Node::binary(
        BinaryOp::Equal,
        Node::Constant(Value::Int32(10)),
        Node::Constant(Value::Double(10.0)),
    );
    assert_eq!(eval.evaluate(&expr).unwrap(), Value::Bool(true));
}

#[test]
fn comparison_falls_back_to_tostring_for_incompatible_categories() {
    let root = Value::Null;
    let eval = Evaluator::new(&root);
    let expr = Node::binary(
        BinaryOp::Equal,
        Node::Constant(Value::String("true".into())),
        Node::Constant(Value::Bool(true)),
    );
    assert_eq!(eval.evaluate(&expr).unwrap(), Value::Bool(true));
}

#[test]
fn and_short_circuits_without_evaluating_right() {
    let root = Value::Null;
    let eval = Evaluator::new(&root);
    // Right side is an unsupported function; if evaluated it would error.
    let boom = Node::Function {
        name: "NoSuchFunction".into(),
        target: None,
        args: vec![],
    };
    let expr = Node::binary(BinaryOp::And, Node::Constant(Value::Bool(false)), boom);
    assert_eq!(eval.evaluate(&expr).unwrap(), Value::Bool(false));
}

#[test]
fn and_with_null_and_true_treats_null_as_false() {
    let root = Value::Null;
    let eval = Evaluator::new(&root);
    let expr = Node::binary(BinaryOp::And, Node::Constant(Value::Null), Node::Constant(Value::Bool(true)));
    assert_eq!(eval.evaluate(&expr).unwrap(), Value::Bool(false));
}

#[test]
fn and_of_two_nulls_is_null() {
    let root = Value::Null;
    let eval = Evaluator::new(&root);
    let expr = Node::binary(BinaryOp::And, Node::Constant(Value::Null), Node::Constant(Value::Null));
    assert_eq!(eval.evaluate(&expr).unwrap(), Value::Null);
}

#[test]
fn predicate_evaluation_degrades_errors_to_false() {
    let root = Value::Null;
    let eval = Evaluator::new(&root);
    let bad_not = Node::Unary {
        op: UnaryOp::Not,
        operand: Box::new(Node::Constant(Value::Int32(1))),
    };
    assert!(!eval.evaluate_predicate(&bad_not));
    assert!(eval.evaluate(&bad_not).is_err());
}

#[test]
fn string_functions_contains_and_starts_with() {
    let root = Value::String("hello world".into());
    let eval = Evaluator::new(&root);
    let contains = Node::Function {
        name: "Contains".into(),
        target: None,
        args: vec![Node::Constant(Value::String("world".into()))],
    };
    assert_eq!(eval.evaluate(&contains).unwrap(), Value::Bool(true));
}

#[test]
fn string_function_on_wrong_type_degrades_gracefully() {
    let root = Value::Int32(5);
    let eval = Evaluator::new(&root);
    let contains = Node::Function {
        name: "Contains".into(),
        target: None,
        args: vec![Node::Constant(Value::String("x".into()))],
    };
    assert_eq!(eval.evaluate(&contains).unwrap(), Value::Bool(false));

    let upper = Node::Function {
        name: "ToUpper".into(),
        target: None,
        args: vec![],
    };
    assert_eq!(eval.evaluate(&upper).unwrap(), Value::Int32(5));
}

#[test]
fn substring_extracts_a_char_range() {
    let root = Value::String("hello world".into());
    let eval = Evaluator::new(&root);
    let expr = Node::Function {
        name: "Substring".into(),
        target: None,
        args: vec![Node::Constant(Value::Int32(6)), Node::Constant(Value::Int32(5))],
    };
    assert_eq!(eval.evaluate(&expr).unwrap(), Value::String("world".into()));
}

#[test]
fn math_functions_operate_on_the_receiver() {
    let root = Value::Double(-4.5);
    let eval = Evaluator::new(&root);
    let abs = Node::Function {
        name: "Abs".into(),
        target: None,
        args: vec![],
    };
    assert_eq!(eval.evaluate(&abs).unwrap(), Value::Double(4.5));
}

#[test]
fn pow_computes_exponentiation() {
    let root = Value::Double(2.0);
    let eval = Evaluator::new(&root);
    let expr = Node::Function {
        name: "Pow".into(),
        target: None,
        args: vec![Node::Constant(Value::Int32(10))],
    };
    assert_eq!(eval.evaluate(&expr).unwrap(), Value::Double(1024.0));
}

#[test]
fn datetime_add_functions_shift_components() {
    use types::DateTime;
    let dt = DateTime::from_unix_micros(0);
    let root = Value::DateTime(dt);
    let eval = Evaluator::new(&root);
    let expr = Node::Function {
        name: "AddDays".into(),
        target: None,
        args: vec![Node::Constant(Value::Int32(1))],
    };
    assert_eq!(eval.evaluate(&expr).unwrap(), Value::DateTime(dt.add_days(1)));
}

#[test]
fn collection_sum_and_average_over_an_array() {
    let root = Value::Array(vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)]);
    let eval = Evaluator::new(&root);
    let sum = Node::Function {
        name: "Sum".into(),
        target: None,
        args: vec![],
    };
    assert_eq!(eval.evaluate(&sum).unwrap(), Value::Double(6.0));

    let avg = Node::Function {
        name: "Average".into(),
        target: None,
        args: vec![],
    };
    assert_eq!(eval.evaluate(&avg).unwrap(), Value::Double(2.0));
}

#[test]
fn scalar_min_max_pick_the_lesser_or_greater_value() {
    let root = Value::Null;
    let eval = Evaluator::new(&root);
    let min = Node::Function {
        name: "Min".into(),
        target: Some(Box::new(Node::Constant(Value::Int32(5)))),
        args: vec![Node::Constant(Value::Int32(9))],
    };
    assert_eq!(eval.evaluate(&min).unwrap(), Value::Int32(5));
}

#[test]
fn unknown_function_is_unsupported() {
    let root = Value::Null;
    let eval = Evaluator::new(&root);
    let expr = Node::Function {
        name: "DoesNotExist".into(),
        target: None,
        args: vec![],
    };
    let err = eval.evaluate(&expr).unwrap_err();
    assert!(matches!(err, DbError::Unsupported(_)));
}

#[test]
fn conditional_picks_the_matching_branch() {
    let root = Value::Null;
    let eval = Evaluator::new(&root);
    let expr = Node::Conditional {
        test: Box::new(Node::Constant(Value::Bool(false))),
        if_true: Box::new(Node::Constant(Value::Int32(1))),
        if_false: Box::new(Node::Constant(Value::Int32(2))),
    };
    assert_eq!(eval.evaluate(&expr).unwrap(), Value::Int32(2));
}

#[test]
fn member_init_builds_a_tagged_document() {
    let root = Value::Null;
    let eval = Evaluator::new(&root);
    let expr = Node::MemberInit {
        type_name: "Summary".into(),
        members: vec![("total".to_string(), Node::Constant(Value::Int32(42)))],
    };
    let result = eval.evaluate(&expr).unwrap();
    let doc = result.as_document().unwrap();
    assert_eq!(doc.get("total"), Some(&Value::Int32(42)));
    assert_eq!(doc.get("__type"), Some(&Value::String("Summary".into())));
}

#[test]
fn array_length_unary_op() {
    let root = Value::Array(vec![Value::Int32(1), Value::Int32(2)]);
    let eval = Evaluator::new(&root);
    let expr = Node::Unary {
        op: UnaryOp::ArrayLength,
        operand: Box::new(Node::Parameter),
    };
    assert_eq!(eval.evaluate(&expr).unwrap(), Value::Int64(2));
}

#[test]
fn convert_to_string_renders_the_display_form() {
    let root = Value::Null;
    let eval = Evaluator::new(&root);
    let expr = Node::Unary {
        op: UnaryOp::Convert(TargetType::String),
        operand: Box::new(Node::Constant(Value::Int32(42))),
    };
    assert_eq!(eval.evaluate(&expr).unwrap(), Value::String("42".into()));
}
