use super::*;
use crate::analyzer::types::Type;
use crate::ast::{BinaryOperator, ComparisonOperator, NodeKind, SystemFunction, UnitKind};
use crate::lexer;
use crate::reporter::{CompilerError, ParserError};
use std::collections::HashMap;

/// Lexes and parses `source`, panicking on any error.
fn parse_source_ok(source: &str) -> Unit {
    let (tokens, lex_errors) = lexer::lex(source, "test.pas".into());
    assert!(lex_errors.is_empty(), "lexer failed unexpectedly: {:?}", lex_errors);

    let (unit, parse_errors) = parse(&tokens, source, "test.pas".into(), &mut NoUnits);
    assert!(parse_errors.is_empty(), "parser failed unexpectedly: {:?}", parse_errors);

    unit.expect("parser returned no unit despite reporting no errors")
}

/// Lexes and parses `source` and returns every error.
fn parse_source_fail(source: &str) -> Vec<CompilerError> {
    let (tokens, mut errors) = lexer::lex(source, "test.pas".into());
    let (_unit, parse_errors) = parse(&tokens, source, "test.pas".into(), &mut NoUnits);
    errors.extend(parse_errors);
    errors
}

fn main_statement(unit: &Unit, index: usize) -> &NodeKind {
    &unit.body.statements[index].kind
}

/// Serves units from a map of already parsed sources.
struct MapResolver(HashMap<&'static str, &'static str>);

impl UnitResolver for MapResolver {
    fn resolve(&mut self, name: &str, loc: &Location) -> Result<SymbolTable, Vec<CompilerError>> {
        let Some(source) = self.0.get(name).copied() else {
            return NoUnits.resolve(name, loc);
        };
        let (tokens, _) = lexer::lex(source, format!("{}.pas", name).into());
        match parse(&tokens, source, format!("{}.pas", name).into(), self) {
            (Some(unit), errors) if errors.is_empty() => Ok(unit.symbols),
            (_, errors) => Err(errors),
        }
    }
}

// --- happy path ---

#[test]
fn test_minimal_program() {
    let unit = parse_source_ok("program hello; begin writeln('hi') end.");
    assert_eq!(unit.kind, UnitKind::Program);
    assert_eq!(unit.name, "hello");
    assert_eq!(unit.body.name, "hello");
    assert!(matches!(
        main_statement(&unit, 0),
        NodeKind::SystemCall { function: SystemFunction::Writeln, args, .. } if args.len() == 1
    ));
}

#[test]
fn test_library_unit_without_initialization() {
    let unit = parse_source_ok(
        "unit mathx; interface function twice(x: integer): integer; implementation \
         function twice(x: integer): integer; begin twice := x * 2 end; end.",
    );
    assert_eq!(unit.kind, UnitKind::Library);
    assert_eq!(unit.entry_name(), "mathx");
    let twice: Vec<_> = unit.symbols.functions_named("twice").collect();
    assert_eq!(twice.len(), 1, "the interface declaration is replaced by the definition");
    assert!(twice[0].body.is_some());
}

#[test]
fn test_global_declarations() {
    let unit = parse_source_ok(
        "program p; const n = 3; limit: int64 = 10; var a, b: integer; s: string = 'x'; begin end.",
    );
    let n = unit.symbols.variable("n").expect("constant n");
    assert!(n.is_constant);
    assert_eq!(n.ty, Type::int32());
    assert_eq!(unit.symbols.variable("limit").map(|v| v.ty.clone()), Some(Type::integer(64)));
    for name in ["a", "b"] {
        let var = unit.symbols.variable(name).expect("declared");
        assert_eq!((var.ty.clone(), var.scope_id), (Type::int32(), 0));
    }
    assert!(unit.symbols.variable("s").is_some_and(|v| v.initializer.is_some()));
}

#[test]
fn test_array_bounds_from_constants_and_nesting() {
    let unit = parse_source_ok("program p; const n = 4; var m: array[1..n, 0..1] of byte; begin end.");
    let ty = &unit.symbols.variable("m").expect("declared").ty;
    assert_eq!(ty.to_string(), "array[1..4] of array[0..1] of Integer8");
}

#[test]
fn test_type_section_records_and_pointers() {
    let unit = parse_source_ok(
        "program p; type point = record x, y: integer; end; ppoint = ^point; \
         var q: ppoint; begin q^.x := 1 end.",
    );
    let point = unit.symbols.type_name("point").expect("declared");
    let record = point.as_record().expect("a record");
    assert_eq!(record.name, "point");
    assert_eq!(record.field_index("y"), Some(1));
    assert_eq!(unit.symbols.type_name("ppoint"), Some(&Type::pointer_to(point.clone())));
    assert!(matches!(
        main_statement(&unit, 0),
        NodeKind::Assignment { target, .. } if matches!(target.kind, NodeKind::FieldAccess { .. })
    ));
}

#[test]
fn test_routine_with_locals_and_reference_parameters() {
    let unit = parse_source_ok(
        "program p; procedure swap(var a, b: integer); var t: integer; begin t := a; a := b; b := t end; \
         begin end.",
    );
    let swap = unit.symbols.functions_named("swap").next().expect("declared");
    assert!(swap.is_procedure);
    assert!(swap.params.iter().all(|p| p.is_reference));
    let body = swap.body.as_ref().expect("has a body");
    assert_eq!(body.variables[0].scope_id, 1);
    assert_eq!(body.statements.len(), 3);
}

#[test]
fn test_external_declaration_with_link_name() {
    let unit = parse_source_ok(
        "program p; function c_abs(x: integer): integer; cdecl; external 'c' name 'abs'; begin end.",
    );
    let func = unit.symbols.functions_named("c_abs").next().expect("declared");
    assert!(func.is_external);
    assert_eq!(func.link_name.as_deref(), Some("abs"));
    assert_eq!(func.library.as_deref(), Some("c"));
    assert!(func.body.is_none());
}

#[test]
fn test_overloads_share_a_name() {
    let unit = parse_source_ok(
        "program p; function f(x: integer): integer; overload; begin f := x end; \
         function f(x: real): real; overload; begin f := x end; begin end.",
    );
    assert!(unit.symbols.is_overloaded("f"));
}

#[test]
fn test_operator_precedence() {
    let unit = parse_source_ok("program p; var x: boolean; begin x := 1 + 2 * 3 < 10 end.");
    let NodeKind::Assignment { value, .. } = main_statement(&unit, 0) else {
        panic!("expected an assignment");
    };
    let NodeKind::Comparison { op: ComparisonOperator::Lt, lhs, .. } = &value.kind else {
        panic!("comparison binds loosest, got {:?}", value.kind);
    };
    let NodeKind::Binary { op: BinaryOperator::Add, rhs, .. } = &lhs.kind else {
        panic!("expected an addition, got {:?}", lhs.kind);
    };
    assert!(matches!(rhs.kind, NodeKind::Binary { op: BinaryOperator::Mul, .. }));
}

#[test]
fn test_negative_literals_are_folded() {
    let unit = parse_source_ok("program p; var x: integer; begin x := -5 end.");
    assert!(matches!(
        main_statement(&unit, 0),
        NodeKind::Assignment { value, .. } if value.kind == NodeKind::IntLiteral(-5)
    ));
}

#[test]
fn test_bare_identifiers_become_calls_or_variables() {
    let unit = parse_source_ok(
        "program p; var n: integer; function seven: integer; begin seven := 7 end; \
         begin n := seven; writeln; n := n end.",
    );
    assert!(matches!(
        main_statement(&unit, 0),
        NodeKind::Assignment { value, .. } if matches!(&value.kind, NodeKind::Call { name, args } if name == "seven" && args.is_empty())
    ));
    assert!(matches!(main_statement(&unit, 1), NodeKind::SystemCall { function: SystemFunction::Writeln, .. }));
    assert!(matches!(
        main_statement(&unit, 2),
        NodeKind::Assignment { value, .. } if value.kind == NodeKind::Variable("n".into())
    ));
}

#[test]
fn test_assert_keeps_its_source_text() {
    let unit = parse_source_ok("program p; var i: integer; begin assert(i = 1) end.");
    assert!(matches!(
        main_statement(&unit, 0),
        NodeKind::SystemCall { function: SystemFunction::Assert, source_text: Some(text), .. } if text == "i = 1"
    ));
}

#[test]
fn test_control_flow_statements() {
    let unit = parse_source_ok(
        "program p; var i: integer; begin \
           for i := 10 downto 1 do if i = 5 then break else continue; \
           while i < 3 do i := i + 1; \
           repeat i := i - 1 until i = 0 \
         end.",
    );
    assert!(matches!(main_statement(&unit, 0), NodeKind::For { descending: true, .. }));
    assert!(matches!(main_statement(&unit, 1), NodeKind::While { .. }));
    assert!(matches!(main_statement(&unit, 2), NodeKind::Repeat { body, .. } if body.statements.len() == 1));
}

#[test]
fn test_uses_imports_symbols() {
    let mut resolver = MapResolver(HashMap::from([(
        "helpers",
        "unit helpers; interface var counter: integer; procedure bump; implementation \
         procedure bump; begin counter := counter + 1 end; end.",
    )]));
    let source = "program p; uses helpers; begin bump; counter := 2 end.";
    let (tokens, _) = lexer::lex(source, "test.pas".into());
    let (unit, errors) = parse(&tokens, source, "test.pas".into(), &mut resolver);
    assert!(errors.is_empty(), "{:?}", errors);
    let unit = unit.expect("parsed");
    assert_eq!(unit.uses, vec!["helpers".to_string()]);
    assert!(unit.symbols.has_function("bump"));
    assert!(matches!(main_statement(&unit, 0), NodeKind::Call { name, .. } if name == "bump"));
}

// --- sad path ---

#[test]
fn test_break_outside_loop_is_reported() {
    let errors = parse_source_fail("program p; begin break end.");
    assert!(matches!(
        errors.as_slice(),
        [CompilerError::Parsing(ParserError::Invalid { message, .. })] if message.contains("break")
    ));
}

#[test]
fn test_unknown_type_is_reported() {
    let errors = parse_source_fail("program p; var x: widget; begin end.");
    assert!(matches!(
        errors.as_slice(),
        [CompilerError::Parsing(ParserError::UnknownType { name, .. })] if name == "widget"
    ));
}

#[test]
fn test_redefinition_points_at_previous() {
    let errors = parse_source_fail("program p; var x: integer;\nvar x: byte; begin end.");
    match errors.as_slice() {
        [CompilerError::Parsing(ParserError::Redefinition { name, previous, loc })] => {
            assert_eq!(name, "x");
            assert_eq!((previous.row, loc.row), (1, 2));
        }
        other => panic!("expected a single redefinition, got {:?}", other),
    }
}

#[test]
fn test_local_may_not_shadow_parameter() {
    let errors = parse_source_fail(
        "program p; function f(n: integer): integer; var n: byte; begin f := 0 end; begin end.",
    );
    assert!(
        errors.iter().any(|e| matches!(
            e,
            CompilerError::Parsing(ParserError::Invalid { message, .. }) if message.contains("duplicates a parameter")
        )),
        "{:?}",
        errors
    );
}

#[test]
fn test_missing_unit_is_reported() {
    let errors = parse_source_fail("program p; uses nowhere; begin end.");
    assert!(matches!(
        errors.as_slice(),
        [CompilerError::Parsing(ParserError::UnitNotFound { name, .. })] if name == "nowhere"
    ));
}

#[test]
fn test_recovery_reports_several_errors() {
    let errors = parse_source_fail("program p; var x: integer; begin x := ; x := 1; 3 + ; end.");
    assert!(errors.len() >= 2, "expected recovery to find more than one error: {:?}", errors);
}

#[test]
fn test_missing_final_dot() {
    let errors = parse_source_fail("program p; begin end");
    assert!(matches!(
        errors.as_slice(),
        [CompilerError::Parsing(ParserError::UnexpectedToken { found, .. })] if found == "end of file"
    ));
}
