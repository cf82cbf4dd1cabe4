use super::*;
use crate::utils::Location;

fn at() -> Location {
    Location::start_of("test.pas".into())
}

fn int(value: i64) -> Node {
    Node::new(NodeKind::IntLiteral(value), at())
}

fn var(name: &str) -> Node {
    Node::new(NodeKind::Variable(name.into()), at())
}

#[test]
fn test_lvalues() {
    assert!(var("x").is_lvalue());
    let deref = Node::new(NodeKind::Dereference(Box::new(var("p"))), at());
    assert!(deref.is_lvalue());
    assert!(!int(1).is_lvalue());
    let call = Node::new(NodeKind::Call { name: "f".into(), args: vec![] }, at());
    assert!(!call.is_lvalue());
}

#[test]
fn test_constant_int() {
    assert_eq!(int(7).constant_int(), Some(7));
    assert_eq!(Node::new(NodeKind::CharLiteral(65), at()).constant_int(), Some(65));
    let negated = Node::new(NodeKind::Unary { op: UnaryOperator::Neg, operand: Box::new(int(3)) }, at());
    assert_eq!(negated.constant_int(), Some(-3));
    assert_eq!(var("x").constant_int(), None);
}

#[test]
fn test_signature_is_the_overload_key() {
    let param = |ty: Type| Parameter { name: "x".into(), ty, is_reference: false, loc: at() };
    let function = FunctionDefinition {
        name: "f".into(),
        link_name: None,
        library: None,
        params: vec![param(Type::int32()), param(Type::String)],
        body: None,
        is_procedure: false,
        is_variadic: false,
        is_external: false,
        return_type: Type::Boolean,
        loc: at(),
    };
    assert_eq!(function.signature(), "f(Integer32,String)");
    assert!(function.is_result_name("result"));
    assert!(function.is_result_name("f"));
}

#[test]
fn test_system_functions_are_case_insensitive() {
    assert_eq!(SystemFunction::lookup("WriteLn"), Some(SystemFunction::Writeln));
    assert_eq!(SystemFunction::lookup("setlength").map(SystemFunction::name), Some("setlength"));
    assert_eq!(SystemFunction::lookup("readln"), None);
    assert!(SystemFunction::Halt.allows_bare_call());
    assert!(!SystemFunction::Length.allows_bare_call());
}

#[test]
fn test_dump_indents_children() {
    let sum = Node::new(
        NodeKind::Binary { op: BinaryOperator::Add, lhs: Box::new(var("a")), rhs: Box::new(int(1)) },
        at(),
    );
    let assign = Node::new(NodeKind::Assignment { target: Box::new(var("a")), value: Box::new(sum) }, at());
    assert_eq!(
        assign.dump(),
        "Assign :=\n  Variable a\n  Binary +\n    Variable a\n    Int 1\n"
    );
}

#[test]
fn test_dump_nested_block_and_loop() {
    let mut body = Block::new("repeat", at());
    body.statements.push(Node::new(NodeKind::Break, at()));
    let repeat = Node::new(
        NodeKind::Repeat { body, condition: Box::new(Node::new(NodeKind::BoolLiteral(true), at())) },
        at(),
    );
    assert_eq!(repeat.dump(), "Repeat\n  Block repeat\n    Break\n  Bool true\n");
}
