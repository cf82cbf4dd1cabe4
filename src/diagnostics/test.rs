// In src/diagnostics/test.rs

use super::*;
use crate::reporter::{CodeGenError, TypeError};

fn loc(row: usize, col: usize) -> Location {
    Location::new("demo.pas".into(), 0, 1, row, col)
}

#[test]
fn test_plain_rendering_has_file_row_col_severity() {
    let diag = Diagnostic::warning(loc(3, 7), "unused directive");
    assert_eq!(diag.to_string(), "demo.pas:3:7: warning: unused directive");
}

#[test]
fn test_type_error_yields_one_diagnostic_per_record() {
    let error: CompilerError = TypeError::new(&loc(1, 1), "first")
        .with_record(&loc(2, 5), "second")
        .into();
    let diags = error.to_diagnostics();
    assert_eq!(diags.len(), 2);
    assert_eq!(diags[0].code, "E0200");
    assert_eq!(diags[1].to_string(), "demo.pas:2:5: error: second");
}

#[test]
fn test_soft_codegen_errors_are_flagged() {
    let soft = CodeGenError::UnresolvedReference { kind: "variable", name: "x".into(), loc: loc(1, 1) };
    assert!(soft.is_soft());
    assert!(!CodeGenError::internal("boom").is_soft());
    let error: CompilerError = soft.into();
    assert_eq!(error.code().code, "E0300");
}

#[test]
fn test_bag_tracks_errors_and_ignores_warnings() {
    let mut bag = DiagnosticBag::new();
    bag.report(Diagnostic::hint(loc(1, 1), "consider `integer`"));
    assert!(!bag.has_errors());
    bag.extend_errors(&[TypeError::new(&loc(1, 1), "bad").into()]);
    assert!(bag.has_errors());
    assert_eq!(bag.len(), 2);
}

#[test]
fn test_codes_can_be_looked_up_for_explanations() {
    let code = codes::lookup("e0104").expect("registered code");
    assert_eq!(code.title, "Unit not found");
    assert!(codes::lookup("E9999").is_none());
}
