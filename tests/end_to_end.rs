//! Compiles whole programs, links them with clang and checks what they print.
//! Every test is skipped when no `clang` is on the PATH.

use pascalc::reporter::CompilerError;
use std::fs;
use std::process::Command;

fn clang_available() -> bool {
    Command::new("clang").arg("--version").output().is_ok_and(|o| o.status.success())
}

/// Compiles and runs `source`, returning the exit code and stdout.
fn run(source: &str) -> Option<(i32, String)> {
    if !clang_available() {
        eprintln!("clang not found; skipping");
        return None;
    }
    let ir = match pascalc::compile(source, "e2e.pas") {
        Ok(ir) => ir,
        Err(errors) => panic!("compilation failed: {:?}", errors),
    };

    let dir = tempfile::tempdir().expect("temp dir");
    let ll = dir.path().join("prog.ll");
    let exe = dir.path().join("prog");
    fs::write(&ll, ir).expect("write IR");

    let status = Command::new("clang").arg(&ll).arg("-o").arg(&exe).status().expect("run clang");
    assert!(status.success(), "clang rejected the module");

    let output = Command::new(&exe).output().expect("run program");
    let stdout = String::from_utf8(output.stdout).expect("utf-8 output");
    Some((output.status.code().unwrap_or(-1), stdout))
}

#[test]
fn arithmetic_result_is_printed() {
    let Some((code, stdout)) = run("program a; var x: integer; begin x := 2 + 3; writeln(x); end.") else {
        return;
    };
    assert_eq!(code, 0);
    assert_eq!(stdout, "5\n");
}

#[test]
fn string_constant_concatenation() {
    let Some((code, stdout)) = run("program b; const s = 'ab'; begin writeln(s + 'c'); end.") else {
        return;
    };
    assert_eq!(code, 0);
    assert_eq!(stdout, "abc\n");
}

#[test]
fn boolean_into_integer_is_rejected_before_lowering() {
    let errors = pascalc::compile("program c; var i: integer; begin i := 1 > 0; end.", "e2e.pas").unwrap_err();
    assert_eq!(errors.len(), 1);
    let CompilerError::Type(error) = &errors[0] else {
        panic!("expected a type error, got {:?}", errors[0]);
    };
    let message = error.to_string();
    assert!(message.contains("Boolean") && message.contains("Integer32"), "{}", message);
}

#[test]
fn counting_loop_prints_each_value() {
    let Some((code, stdout)) = run("program d; var i: integer; begin for i := 1 to 3 do writeln(i); end.") else {
        return;
    };
    assert_eq!(code, 0);
    assert_eq!(stdout, "1\n2\n3\n");
}

#[test]
fn loop_is_skipped_when_start_exceeds_end() {
    let Some((_, stdout)) =
        run("program e; var i, n: integer; begin n := 0; for i := 1 to n do writeln(i); writeln('done'); end.")
    else {
        return;
    };
    assert_eq!(stdout, "done\n");
}

#[test]
fn break_leaves_only_the_innermost_loop() {
    let source = "program f; var i, j: integer; begin \
                    for i := 1 to 2 do begin \
                      for j := 1 to 5 do begin if j = 2 then break; writeln(j) end; \
                      writeln(i * 10) \
                    end \
                  end.";
    let Some((_, stdout)) = run(source) else { return };
    assert_eq!(stdout, "1\n10\n1\n20\n");
}

#[test]
fn setlength_then_length_agree() {
    let source = "program g; var a: array of integer; begin setlength(a, 4); a[3] := 9; \
                  writeln(length(a)); writeln(a[3]) end.";
    let Some((_, stdout)) = run(source) else { return };
    assert_eq!(stdout, "4\n9\n");
}

#[test]
fn exit_code_reaches_the_shell() {
    let Some((code, _)) = run("program h; begin exit(3) end.") else { return };
    assert_eq!(code, 3);
}

#[test]
fn counter_is_one_past_the_bound_after_the_loop() {
    let source = "program i; var i, j: integer; begin \
                    for i := 1 to 3 do j := i; writeln(i); \
                    for i := 3 downto 1 do j := i; writeln(i) \
                  end.";
    let Some((_, stdout)) = run(source) else { return };
    assert_eq!(stdout, "4\n0\n");
}

#[test]
fn quoted_characters_compare_and_print_as_characters() {
    let source = "program j; var c: char; s: string; begin \
                    s := 'hey'; c := 'h'; if s[1] = c then writeln(c); \
                    s[2] := 'a'; writeln(s) \
                  end.";
    let Some((_, stdout)) = run(source) else { return };
    assert_eq!(stdout, "h\nhay\n");
}
