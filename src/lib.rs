pub mod analyzer;
pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod driver;
pub mod lexer;
pub mod parser;
pub mod reporter;
pub mod utils;

use reporter::CompilerError;

/// Compiles a standalone source (no `uses`) to textual LLVM IR.
///
/// `file_name` is only used in locations and `assert` messages. Lexer and
/// parser errors are reported together; type checking stops at the first
/// error; lowering reports every soft error it finds.
pub fn compile(source: &str, file_name: &str) -> Result<String, Vec<CompilerError>> {
    let (tokens, mut errors) = lexer::lex(source, file_name.into());

    // Tokens are parsed even after lexer errors, to surface more problems.
    let (unit, parser_errors) = parser::parse(&tokens, source, file_name.into(), &mut parser::NoUnits);
    errors.extend(parser_errors);

    let unit = match unit {
        Some(unit) if errors.is_empty() => unit,
        _ => return Err(errors),
    };

    analyzer::check_unit(&unit).map_err(|e| vec![e.into()])?;
    codegen::codegen(&unit)
}
