// In src/analyzer/test.rs

use super::types::Type;
use super::{check_unit, Binding, TypeEnv};
use crate::ast::{NodeKind, Unit};
use crate::lexer::lex;
use crate::parser::{parse, NoUnits};
use crate::reporter::TypeError;

/// Lexes and parses `src`; both phases must succeed.
fn setup(src: &str) -> Unit {
    let (tokens, lex_errors) = lex(src, "test.pas".into());
    assert!(lex_errors.is_empty(), "lexing failed: {:?}", lex_errors);
    let (unit, parse_errors) = parse(&tokens, src, "test.pas".into(), &mut NoUnits);
    assert!(parse_errors.is_empty(), "parsing failed: {:?}", parse_errors);
    unit.expect("a unit is produced when there are no errors")
}

fn check_ok(src: &str) -> Unit {
    let unit = setup(src);
    if let Err(error) = check_unit(&unit) {
        panic!("type check failed unexpectedly: {}", error);
    }
    unit
}

fn check_err(src: &str) -> TypeError {
    let unit = setup(src);
    match check_unit(&unit) {
        Ok(()) => panic!("type check passed, but an error was expected"),
        Err(error) => error,
    }
}

// --- accepted programs ---

#[test]
fn test_integer_widths_and_float_widening_are_accepted() {
    check_ok(
        "program p; var b: byte; i: integer; big: int64; r: real; begin \
           b := 300; i := b; big := i * b; r := i; r := r / 2 \
         end.",
    );
}

#[test]
fn test_string_concatenation_and_pchar() {
    check_ok(
        "program p; function puts(s: pchar): integer; cdecl; external; \
         var s: string; begin s := 'a' + 'b'; s := s + #33; puts(pchar(s)) end.",
    );
}

#[test]
fn test_records_pointers_and_new() {
    check_ok(
        "program p; type node = record value: integer; next: pointer; end; pnode = ^node; \
         var n: pnode; begin new(n); n^.value := 3; n^.next := nil; if n <> nil then n^.value := 4 end.",
    );
}

#[test]
fn test_functions_and_reference_parameters() {
    check_ok(
        "program p; procedure inc2(var x: integer); begin x := x + 2 end; \
         function twice(x: integer): integer; begin result := x * 2 end; \
         var a: integer; begin inc2(a); a := twice(a); exit(a) end.",
    );
}

#[test]
fn test_dynamic_arrays_and_bounds_queries() {
    check_ok(
        "program p; var d: array of integer; f: array[1..3] of integer; i: integer; begin \
           setlength(d, 4); for i := low(f) to high(f) do f[i] := length(d); f[3] := f[1] \
         end.",
    );
}

#[test]
fn test_one_character_literal_stands_for_a_char() {
    check_ok(
        "program p; procedure put(c: char); begin end; \
         function first(s: string): char; begin exit('?') end; \
         var c: char = 'x'; s: string; begin \
           c := 'a'; s := 'abc'; if s[1] = 'a' then put('b'); if 'z' <> c then c := #0 \
         end.",
    );
}

// --- rejected programs ---

#[test]
fn test_quoted_literal_is_a_char_only_in_char_context() {
    let error = check_err("program p; var i: integer; begin i := 'a' end.");
    assert!(error.to_string().contains("'String'"), "{}", error);
    let error = check_err("program p; var c: char; begin c := 'ab' end.");
    assert!(error.to_string().contains("'Integer8'"), "{}", error);
}

#[test]
fn test_boolean_into_integer_names_both_types() {
    let error = check_err("program p; var i: integer; begin i := true end.");
    let message = error.to_string();
    assert!(message.contains("Boolean"), "{}", message);
    assert!(message.contains("Integer32"), "{}", message);
}

#[test]
fn test_constant_index_out_of_range() {
    let error = check_err("program p; var a: array[1..3] of integer; begin a[4] := 0 end.");
    assert!(error.to_string().contains("index 4 is out of range for array[1..3]"), "{}", error);
    assert_eq!(error.records[0].loc.row, 1);
}

#[test]
fn test_condition_must_be_boolean() {
    let error = check_err("program p; var i: integer; begin while i do i := 0 end.");
    assert!(error.to_string().contains("condition of 'while'"), "{}", error);
    let error = check_err("program p; var i: integer; begin repeat i := 1 until i + 1 end.");
    assert!(error.to_string().contains("'until'"), "{}", error);
}

#[test]
fn test_reference_argument_needs_exact_type() {
    let error = check_err(
        "program p; procedure bump(var x: int64); begin x := x + 1 end; var i: integer; begin bump(i) end.",
    );
    assert!(error.to_string().contains("passed by reference"), "{}", error);
    assert_eq!(error.records.len(), 2, "the parameter declaration is attached");
}

#[test]
fn test_reference_argument_needs_a_variable() {
    let error = check_err(
        "program p; procedure bump(var x: integer); begin x := x + 1 end; begin bump(3) end.",
    );
    assert!(error.to_string().contains("must be a variable"), "{}", error);
}

#[test]
fn test_assignment_to_constant() {
    let error = check_err("program p; const k = 1; begin k := 2 end.");
    assert!(error.to_string().contains("cannot assign to constant 'k'"), "{}", error);
}

#[test]
fn test_operand_mismatch_names_the_operator() {
    let error = check_err("program p; var b: boolean; i: integer; begin i := i + b end.");
    assert!(error.to_string().contains("for operator '+'"), "{}", error);
}

#[test]
fn test_string_comparison_is_rejected() {
    let error = check_err("program p; var s: string; begin if s = 'a' then s := '' end.");
    assert!(error.to_string().contains("cannot compare"), "{}", error);
}

#[test]
fn test_system_call_arity() {
    let error = check_err("program p; var d: array of integer; begin setlength(d) end.");
    assert!(error.to_string().contains("'setlength' expects 2 argument(s)"), "{}", error);
}

#[test]
fn test_exit_value_in_procedure() {
    let error = check_err("program p; procedure q; begin exit(1) end; begin end.");
    assert!(error.to_string().contains("'exit' in a procedure"), "{}", error);
}

// --- scope lookup ---

#[test]
fn test_lookup_order_prefers_parameters_then_locals_then_globals() {
    let unit = check_ok(
        "program p; var x: boolean; y: real; \
         function f(x: integer): int64; var y: byte; begin f := x end; begin end.",
    );
    let function = unit.symbols.functions_named("f").next().expect("declared");
    let body = function.body.as_ref().expect("has a body");

    let mut env = TypeEnv::for_function(&unit, function);
    assert!(matches!(env.lookup("x"), Some(Binding::Parameter(_))));
    assert!(matches!(env.lookup("f"), Some(Binding::ReturnSlot(_))));
    assert_eq!(env.variable_type("result"), Type::integer(64));
    // before the body is entered, `y` is the global
    assert_eq!(env.variable_type("y"), Type::float64());
    env.enter_block(body);
    assert_eq!(env.variable_type("y"), Type::integer(8));
    env.exit_block();
    assert_eq!(env.variable_type("y"), Type::float64());
    assert!(env.lookup("missing").is_none());
}

#[test]
fn test_expression_types() {
    let unit = check_ok(
        "program p; var i: integer; b: byte; r: single; s: string; a: array[0..1] of real; begin \
           i := i div b; r := r * i; s := s + s; a[0] := i / b \
         end.",
    );
    let env = TypeEnv::new(&unit);
    let types: Vec<Type> = unit
        .body
        .statements
        .iter()
        .map(|statement| match &statement.kind {
            NodeKind::Assignment { value, .. } => value.resolve_type(&env),
            other => panic!("expected an assignment, got {:?}", other),
        })
        .collect();
    assert_eq!(
        types,
        vec![Type::int32(), Type::Float { width: 32 }, Type::String, Type::float64()]
    );
}
