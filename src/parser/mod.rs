//! src/parser/mod.rs
//!
//! The public face of the syntax phase: tokens in, a typed [`Unit`] out.
//!
//! Parsing and scope bookkeeping happen together. Declarations are entered
//! into the unit's [`SymbolTable`] as they are read, type names are resolved
//! to descriptors on the spot and `uses` clauses are satisfied through a
//! [`UnitResolver`] before the rest of the importing unit is parsed.

mod main;
#[cfg(test)]
mod test;

use crate::analyzer::symbols::SymbolTable;
use crate::ast::Unit;
use crate::lexer::Spanned;
use crate::reporter::{CompilerError, ParserError};
use crate::utils::Location;
use main::{Parse, Parser};
use std::sync::Arc;

/// Supplies the public symbols of units named in `uses` clauses.
pub trait UnitResolver {
    /// Loads unit `name` (already lower-cased) and returns its symbol table.
    /// Errors inside the imported unit are returned so the importer can
    /// report them alongside its own.
    fn resolve(&mut self, name: &str, loc: &Location) -> Result<SymbolTable, Vec<CompilerError>>;
}

/// A resolver for standalone sources: every `uses` is an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoUnits;

impl UnitResolver for NoUnits {
    fn resolve(&mut self, name: &str, loc: &Location) -> Result<SymbolTable, Vec<CompilerError>> {
        Err(vec![ParserError::UnitNotFound { name: name.to_string(), loc: Some(loc.clone()) }.into()])
    }
}

/// Parses one file.
///
/// `source` must be the text `tokens` were lexed from; it is used to recover
/// the verbatim text of `assert` arguments. The unit is returned whenever the
/// parser got to the end of it, even if errors were recorded on the way.
pub fn parse(
    tokens: &[Spanned],
    source: &str,
    file: Arc<str>,
    resolver: &mut dyn UnitResolver,
) -> (Option<Unit>, Vec<CompilerError>) {
    let (unit, errors) = Parser::new(tokens, source, file, resolver).parse();
    if let Some(unit) = &unit {
        log::debug!(
            "parsed unit `{}`: {} global(s), {} routine(s), {} error(s)",
            unit.name,
            unit.symbols.variables().len(),
            unit.symbols.functions().len(),
            errors.len()
        );
    }
    (unit, errors)
}
