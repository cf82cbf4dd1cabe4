// In src/codegen/test.rs

use super::*;
use crate::analyzer::check_unit;
use crate::lexer;
use crate::parser::{self, NoUnits};

// --- Test Harness ---

/// Runs lex -> parse -> check -> lower on `source` and returns the textual IR.
/// Any failure on the way panics with the collected errors.
fn codegen_test_harness(source: &str) -> String {
    let (tokens, lexer_errors) = lexer::lex(source, "test.pas".into());
    if !lexer_errors.is_empty() {
        panic!("Lexing failed: {:?}", lexer_errors);
    }

    let (unit, parser_errors) = parser::parse(&tokens, source, "test.pas".into(), &mut NoUnits);
    if !parser_errors.is_empty() {
        panic!("Parsing failed: {:?}", parser_errors);
    }
    let unit = unit.expect("Parsing succeeded but produced no unit");

    if let Err(error) = check_unit(&unit) {
        panic!("Type check failed: {}", error);
    }

    match codegen(&unit) {
        Ok(ir) => ir,
        Err(errors) => panic!("CodeGen failed: {:?}", errors),
    }
}

/// Like the harness, but skips the type checker and expects lowering to fail.
fn codegen_errors(source: &str) -> Vec<CompilerError> {
    let (tokens, _) = lexer::lex(source, "test.pas".into());
    let (unit, _) = parser::parse(&tokens, source, "test.pas".into(), &mut NoUnits);
    let unit = unit.expect("the parser recovers a unit");
    match codegen(&unit) {
        Ok(ir) => panic!("CodeGen succeeded unexpectedly:\n{}", ir),
        Err(errors) => errors,
    }
}

// --- Test Cases ---

#[test]
fn test_program_entry_and_exit() {
    let ir = codegen_test_harness("program p; begin end.");
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains("define i32 @main()"));
    assert!(ir.contains("call void @exit(i32 0)"));
    assert!(ir.contains("unreachable"));
}

#[test]
fn test_standard_handles_are_external() {
    let ir = codegen_test_harness("program p; begin end.");
    assert!(ir.contains("@stdin = external global ptr"));
    assert!(ir.contains("@stdout = external global ptr"));
    assert!(ir.contains("@stderr = external global ptr"));
}

#[test]
fn test_library_entry_is_named_after_the_unit() {
    let ir = codegen_test_harness("unit mathlib; interface function twice(n: integer): integer; implementation function twice(n: integer): integer; begin twice := n * 2 end; end.");
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains("define void @mathlib()"));
    assert!(ir.contains("define i32 @twice(i32 %n)"));
    assert!(!ir.contains("@main"));
}

#[test]
fn test_writeln_integer_uses_printf() {
    let ir = codegen_test_harness("program p; var x: integer; begin x := 2 + 3; writeln(x); end.");
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains("@x = global i32 0"));
    assert!(ir.contains("declare i32 @printf(ptr, ...)"));
    assert!(ir.contains(r#"c"%d\0A\00""#));
}

#[test]
fn test_writeln_formats_follow_argument_types() {
    let ir = codegen_test_harness(
        "program p; var big: int64; r: real; s: string; b: boolean; \
         begin big := 1; r := 1.5; s := 'x'; b := true; writeln(big, r, s, b, #65); end.",
    );
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains(r#"c"%lld%f%.*s%s%c\0A\00""#));
    assert!(ir.contains(r#"c"TRUE\00""#));
    assert!(ir.contains(r#"c"FALSE\00""#));
}

#[test]
fn test_function_result_slot_is_returned() {
    let ir = codegen_test_harness(
        "program p; function sq(n: integer): integer; begin sq := n * n end; begin writeln(sq(4)) end.",
    );
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains("define i32 @sq(i32 %n)"));
    assert!(ir.contains("mul i32"));
    assert!(ir.contains("ret i32"));
    assert!(ir.contains("call i32 @sq(i32 4)"));
}

#[test]
fn test_reference_parameter_is_a_pointer() {
    let ir = codegen_test_harness(
        "program p; var a: integer; procedure inc(var x: integer); begin x := x + 1 end; begin inc(a) end.",
    );
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains("define void @inc(ptr %x)"));
    assert!(ir.contains("call void @inc(ptr @a)"));
}

#[test]
fn test_aggregate_value_parameter_is_copied() {
    let ir = codegen_test_harness(
        "program p; type point = record x, y: integer; end; var q: point; \
         function sum(r: point): integer; begin sum := r.x + r.y end; \
         begin q.x := 1; q.y := 2; writeln(sum(q)) end.",
    );
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains("%record.point = type { i32, i32 }"));
    assert!(ir.contains("define i32 @sum(ptr noalias %r)"));
    assert!(ir.contains("@llvm.memcpy"));
}

#[test]
fn test_overloads_are_mangled() {
    let ir = codegen_test_harness(
        "program p; procedure show(n: integer); begin writeln(n) end; \
         procedure show(s: string); begin writeln(s) end; \
         begin show(1); show('one') end.",
    );
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains("@show$Integer32"));
    assert!(ir.contains("@show$String"));
}

#[test]
fn test_external_function_uses_link_name() {
    let ir = codegen_test_harness(
        "program p; function c_abs(n: integer): integer; cdecl; external 'c' name 'abs'; \
         begin writeln(c_abs(-3)) end.",
    );
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains("declare i32 @abs(i32)"));
    assert!(!ir.contains("@c_abs"));
}

#[test]
fn test_string_concatenation_allocates() {
    let ir = codegen_test_harness("program p; var s: string; begin s := 'ab' + 'cd'; writeln(s) end.");
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains("%string = type { i64, i64, ptr }"));
    assert!(ir.contains("call ptr @malloc"));
    assert!(ir.contains(r#"c"ab\00""#));
    assert!(ir.contains(r#"c"cd\00""#));
}

#[test]
fn test_mixed_widths_are_sign_extended() {
    let ir = codegen_test_harness(
        "program p; var b: byte; big: int64; begin b := 3; big := b + big; end.",
    );
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains("sext i8"));
    assert!(ir.contains("add i64"));
}

#[test]
fn test_division_is_floating_point() {
    let ir = codegen_test_harness("program p; var a: integer; r: real; begin a := 7; r := a / 2 end.");
    assert!(ir.contains("fdiv double"));
    assert!(ir.contains("sitofp i32"));
}

#[test]
fn test_div_and_mod_are_signed() {
    let ir = codegen_test_harness("program p; var a: integer; begin a := 7; a := (a div 2) + (a mod 2) end.");
    assert!(ir.contains("sdiv i32"));
    assert!(ir.contains("srem i32"));
}

#[test]
fn test_for_loop_blocks() {
    let ir = codegen_test_harness("program p; var i, n: integer; begin n := 3; for i := 1 to n do writeln(i) end.");
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains("for.body:"));
    assert!(ir.contains("for.step:"));
    assert!(ir.contains("for.end:"));
    assert!(ir.contains("icmp sle i32"));
    assert!(!ir.contains("icmp slt i32"));
}

#[test]
fn test_downto_counts_down() {
    let ir = codegen_test_harness("program p; var i, n: integer; begin n := 3; for i := n downto 1 do writeln(i) end.");
    assert!(ir.contains("icmp sge i32 %for.next"));
    assert!(ir.contains("sub i32"));
}

#[test]
fn test_break_jumps_to_innermost_loop_exit() {
    let ir = codegen_test_harness(
        "program p; var i, j: integer; begin \
         while true do begin \
           for j := 1 to 2 do break; \
           break \
         end \
         end.",
    );
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains("br label %for.end"));
    assert!(ir.contains("br label %while.end"));
}

#[test]
fn test_repeat_tests_after_body() {
    let ir = codegen_test_harness("program p; var i: integer; begin i := 0; repeat i := i + 1 until i >= 3 end.");
    assert!(ir.contains("repeat.body:"));
    assert!(ir.contains("repeat.cond:"));
    assert!(ir.contains("icmp sge i32"));
}

#[test]
fn test_fixed_array_index_is_rebased() {
    let ir = codegen_test_harness("program p; var a: array[1..3] of integer; i: integer; begin i := 2; a[i] := 7 end.");
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains("@a = global [3 x i32] zeroinitializer"));
    assert!(ir.contains("getelementptr inbounds [3 x i32], ptr @a"));
}

#[test]
fn test_dynamic_array_setlength_and_high() {
    let ir = codegen_test_harness(
        "program p; var a: array of integer; begin setlength(a, 4); a[high(a)] := 1; writeln(length(a)) end.",
    );
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains("%dynarray = type { i64, ptr }"));
    assert!(ir.contains("call ptr @calloc"));
}

#[test]
fn test_new_allocates_pointee() {
    let ir = codegen_test_harness("program p; var p: ^integer; begin new(p); p^ := 5 end.");
    assert!(ir.contains("call ptr @calloc(i64 1, i64 "));
}

#[test]
fn test_assert_reports_source_text() {
    let ir = codegen_test_harness("program p; var x: integer; begin x := 1; assert(x = 1) end.");
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains(r#"c"x = 1\00""#));
    assert!(ir.contains(r#"c"test.pas\00""#));
    assert!(ir.contains("call void @abort()"));
    assert!(ir.contains("@fprintf"));
}

#[test]
fn test_writeln_to_file_uses_fprintf() {
    let ir = codegen_test_harness("program p; begin writeln(stderr, 'oops') end.");
    assert!(ir.contains("declare i32 @fprintf(ptr, ptr, ...)"));
    assert!(ir.contains("load ptr, ptr @stderr"));
}

#[test]
fn test_literal_global_initializer_is_constant_folded() {
    let ir = codegen_test_harness("program p; const k = 5; var n: integer = 7; begin writeln(k + n) end.");
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains("@k = private constant i32 5"));
    assert!(ir.contains("@n = global i32 7"));
}

#[test]
fn test_computed_global_initializer_runs_at_startup() {
    let ir = codegen_test_harness("program p; var a: integer = 2; b: integer = a * 3; begin writeln(b) end.");
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains("@b = global i32 0"));
    assert!(ir.contains("store i32 %mul, ptr @b"));
}

#[test]
fn test_exit_in_function_returns_value() {
    let ir = codegen_test_harness(
        "program p; function f(n: integer): integer; begin if n > 0 then exit(1); f := 0 end; begin writeln(f(2)) end.",
    );
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains("after.exit:"));
    assert!(ir.contains("ret i32"));
}

#[test]
fn test_unresolved_function_is_reported_without_aborting() {
    let errors = codegen_errors("program p; begin missing(1); also_missing(2) end.");
    let unresolved = errors
        .iter()
        .filter(|e| matches!(e, CompilerError::CodeGen(CodeGenError::UnresolvedReference { .. })))
        .count();
    assert_eq!(unresolved, 2, "errors: {:?}", errors);
}

#[test]
fn test_argument_count_mismatch_is_soft() {
    let errors = codegen_errors(
        "program p; procedure two(a, b: integer); begin end; begin two(1); two(1, 2, 3) end.",
    );
    let mismatches: Vec<_> = errors
        .iter()
        .filter_map(|e| match e {
            CompilerError::CodeGen(CodeGenError::ArgumentCountMismatch { expected, found, .. }) => {
                Some((*expected, *found))
            }
            _ => None,
        })
        .collect();
    assert_eq!(mismatches, vec![(2, 1), (2, 3)]);
}

#[test]
fn test_errors_in_sibling_subtrees_are_all_reported() {
    let errors = codegen_errors(
        "program p; var i: integer; begin \
           if missing(1) = 0 then other_missing(2); \
           while gone(3) > 0 do lost(4); \
           i := absent(5) + nowhere(6); \
           writeln(unknown(7), hidden(8)) \
         end.",
    );
    let names: Vec<&str> = errors
        .iter()
        .filter_map(|e| match e {
            CompilerError::CodeGen(CodeGenError::UnresolvedReference { name, .. }) => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        names,
        vec!["missing", "other_missing", "gone", "lost", "absent", "nowhere", "unknown", "hidden"]
    );
}

#[test]
fn test_unresolved_call_still_reports_its_arguments() {
    let errors = codegen_errors("program p; begin outer(inner(1)) end.");
    let names: Vec<&str> = errors
        .iter()
        .filter_map(|e| match e {
            CompilerError::CodeGen(CodeGenError::UnresolvedReference { name, .. }) => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["inner", "outer"]);
}

#[test]
fn test_one_character_literal_lowers_to_a_byte() {
    let ir = codegen_test_harness(
        "program p; procedure put(c: char); begin writeln(c) end; \
         var c: char = 'x'; s: string; begin \
           s := 'abc'; c := 'a'; if s[1] = 'b' then put('b') \
         end.",
    );
    println!("--- IR ---\n{}\n", ir);

    assert!(ir.contains("@c = global i8 120"));
    assert!(ir.contains("store i8 97, ptr @c"));
    assert!(ir.contains("icmp eq i8"));
    assert!(ir.contains("call void @put(i8 98)"));
    assert!(ir.contains(r#"c"%c\0A\00""#));
}

#[test]
fn test_literal_bytes_are_emitted_once() {
    let ir = codegen_test_harness(
        "program p; var b: boolean; begin b := true; writeln(b); writeln(b); writeln('hi'); writeln('hi') end.",
    );
    println!("--- IR ---\n{}\n", ir);

    assert_eq!(ir.matches(r#"c"TRUE\00""#).count(), 1);
    assert_eq!(ir.matches(r#"c"FALSE\00""#).count(), 1);
    assert_eq!(ir.matches(r#"c"hi\00""#).count(), 1);
    assert_eq!(ir.matches(r#"c"%s\0A\00""#).count(), 1);
}

#[test]
fn test_for_loop_steps_before_its_bottom_test() {
    let ir = codegen_test_harness("program p; var i, j: integer; begin for i := 1 to 3 do j := i end.");
    println!("--- IR ---\n{}\n", ir);

    let step = ir.find("for.step:").expect("a step block");
    let next = ir[step..].find("%for.next = add i32").expect("the counter is stepped");
    let test = ir[step..].find("%for.more = icmp sle i32 %for.next").expect("the stepped counter is tested");
    assert!(next < test);
}
