// src/driver.rs

//! File-level compilation: options, loading of `uses`d units and the full
//! lex -> parse -> check -> lower pipeline over them.

use crate::analyzer::check_unit;
use crate::analyzer::symbols::SymbolTable;
use crate::codegen;
use crate::diagnostics::Diagnostic;
use crate::lexer::{lex_with, Preprocessor};
use crate::parser::{parse, UnitResolver};
use crate::reporter::{CompilerError, ParserError};
use crate::utils::Location;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Front-end configuration.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Symbols predefined for `{$ifdef}`.
    pub defines: Vec<String>,
    /// Directories searched for `uses`d units after the importer's own.
    pub search_paths: Vec<PathBuf>,
}

/// Finds the source of a unit named in a `uses` clause.
pub trait UnitLoader {
    /// Returns the file name and text of unit `name` (lower-cased), looking
    /// first in `dir`, the importing file's directory.
    fn load(&self, name: &str, dir: &Path, options: &CompileOptions) -> Option<(PathBuf, String)>;
}

/// Loads `name.pas` from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileLoader;

impl UnitLoader for FileLoader {
    fn load(&self, name: &str, dir: &Path, options: &CompileOptions) -> Option<(PathBuf, String)> {
        let file_name = format!("{}.pas", name);
        std::iter::once(dir)
            .chain(options.search_paths.iter().map(PathBuf::as_path))
            .map(|candidate| candidate.join(&file_name))
            .find_map(|path| {
                log::trace!("looking for unit `{}` at {}", name, path.display());
                fs::read_to_string(&path).ok().map(|text| (path, text))
            })
    }
}

/// Serves units from memory, keyed by lower-cased name.
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    units: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit(mut self, name: &str, source: impl Into<String>) -> Self {
        self.units.insert(name.to_ascii_lowercase(), source.into());
        self
    }
}

impl UnitLoader for MemoryLoader {
    fn load(&self, name: &str, _dir: &Path, _options: &CompileOptions) -> Option<(PathBuf, String)> {
        self.units
            .get(name)
            .map(|text| (PathBuf::from(format!("{}.pas", name)), text.clone()))
    }
}

/// Compiles files, resolving their `uses` clauses through a [`UnitLoader`].
pub struct Compiler {
    options: CompileOptions,
    loader: Box<dyn UnitLoader>,
    /// Every file read so far, for rendering diagnostics.
    sources: Vec<(Arc<str>, String)>,
    /// Warnings and hints from every file read so far.
    notes: Vec<Diagnostic>,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self::with_loader(options, FileLoader)
    }

    pub fn with_loader(options: CompileOptions, loader: impl UnitLoader + 'static) -> Self {
        Self { options, loader: Box::new(loader), sources: Vec::new(), notes: Vec::new() }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// The text of every file loaded by previous compilations.
    pub fn sources(&self) -> &[(Arc<str>, String)] {
        &self.sources
    }

    /// Non-fatal diagnostics of previous compilations.
    pub fn notes(&self) -> &[Diagnostic] {
        &self.notes
    }

    /// Compiles the file at `path` to textual LLVM IR.
    pub fn compile_file(&mut self, path: &Path) -> Result<String, Vec<CompilerError>> {
        let source = fs::read_to_string(path).map_err(|e| {
            log::error!("cannot read {}: {}", path.display(), e);
            vec![CompilerError::from(ParserError::UnitNotFound { name: path.display().to_string(), loc: None })]
        })?;
        self.compile_source(&source, path)
    }

    /// Compiles `source` as if it were read from `path`; `uses` are looked up
    /// next to `path`.
    pub fn compile_source(&mut self, source: &str, path: &Path) -> Result<String, Vec<CompilerError>> {
        let file: Arc<str> = path.display().to_string().into();
        self.sources.push((file.clone(), source.to_string()));

        let mut preprocessor = Preprocessor::new(&self.options.defines);
        let (tokens, mut errors) = lex_with(source, file.clone(), &mut preprocessor);
        self.notes.extend(preprocessor.take_notes());
        log::debug!("lexed {} token(s) from {}", tokens.len(), file);

        let mut graph = UnitGraph {
            loader: self.loader.as_ref(),
            options: &self.options,
            sources: &mut self.sources,
            notes: &mut self.notes,
            dir: parent_dir(path),
            in_progress: Vec::new(),
        };
        let (unit, parse_errors) = parse(&tokens, source, file, &mut graph);
        errors.extend(parse_errors);

        let unit = match unit {
            Some(unit) if errors.is_empty() => unit,
            _ => return Err(errors),
        };
        check_unit(&unit).map_err(|e| vec![e.into()])?;
        codegen::codegen(&unit)
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// Resolves `uses` depth-first, tracking the chain of units being loaded so
/// cycles are reported instead of followed.
struct UnitGraph<'c> {
    loader: &'c dyn UnitLoader,
    options: &'c CompileOptions,
    sources: &'c mut Vec<(Arc<str>, String)>,
    notes: &'c mut Vec<Diagnostic>,
    /// Directory of the file currently being parsed.
    dir: PathBuf,
    in_progress: Vec<String>,
}

impl UnitResolver for UnitGraph<'_> {
    fn resolve(&mut self, name: &str, loc: &Location) -> Result<SymbolTable, Vec<CompilerError>> {
        if self.in_progress.iter().any(|n| n == name) {
            return Err(vec![ParserError::CircularUnit { name: name.to_string(), loc: Some(loc.clone()) }.into()]);
        }
        let Some((path, source)) = self.loader.load(name, &self.dir, self.options) else {
            return Err(vec![ParserError::UnitNotFound { name: name.to_string(), loc: Some(loc.clone()) }.into()]);
        };
        log::debug!("loading unit `{}` from {}", name, path.display());

        let file: Arc<str> = path.display().to_string().into();
        self.sources.push((file.clone(), source.clone()));
        let mut preprocessor = Preprocessor::new(&self.options.defines);
        let (tokens, mut errors) = lex_with(&source, file.clone(), &mut preprocessor);
        self.notes.extend(preprocessor.take_notes());

        let importer_dir = std::mem::replace(&mut self.dir, parent_dir(&path));
        self.in_progress.push(name.to_string());
        let (unit, parse_errors) = parse(&tokens, &source, file, self);
        self.in_progress.pop();
        self.dir = importer_dir;

        errors.extend(parse_errors);
        match unit {
            Some(unit) if errors.is_empty() => Ok(unit.symbols),
            _ => Err(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;

    fn compiler(loader: MemoryLoader) -> Compiler {
        Compiler::with_loader(CompileOptions::default(), loader)
    }

    #[test]
    fn imported_routines_are_lowered_into_the_importer() {
        let loader = MemoryLoader::new().with_unit(
            "mathx",
            "unit mathx; interface function twice(x: integer): integer; implementation \
             function twice(x: integer): integer; begin twice := x * 2 end; end.",
        );
        let ir = compiler(loader)
            .compile_source("program p; uses mathx; begin writeln(twice(21)) end.", Path::new("p.pas"))
            .expect("compiles");
        assert!(ir.contains("define i32 @twice(i32 %x)"));
        assert!(ir.contains("define i32 @main()"));
        assert!(!ir.contains("define void @mathx()"));
    }

    #[test]
    fn missing_unit_is_reported() {
        let errors = compiler(MemoryLoader::new())
            .compile_source("program p; uses nowhere; begin end.", Path::new("p.pas"))
            .unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            CompilerError::Parsing(ParserError::UnitNotFound { name, .. }) if name == "nowhere"
        )));
    }

    #[test]
    fn circular_uses_are_reported() {
        let loader = MemoryLoader::new()
            .with_unit("a", "unit a; interface uses b; implementation end.")
            .with_unit("b", "unit b; interface uses a; implementation end.");
        let errors = compiler(loader)
            .compile_source("program p; uses a; begin end.", Path::new("p.pas"))
            .unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            CompilerError::Parsing(ParserError::CircularUnit { name, .. }) if name == "a"
        )));
    }

    #[test]
    fn defines_select_conditional_code() {
        let source = "program p; begin {$ifdef FAST} writeln(1) {$else} writeln('slow') {$endif} end.";
        let options = CompileOptions { defines: vec!["fast".into()], ..Default::default() };
        let ir = Compiler::with_loader(options, MemoryLoader::new())
            .compile_source(source, Path::new("p.pas"))
            .expect("compiles");
        assert!(ir.contains(r#"c"%d\0A\00""#));
        assert!(!ir.contains("slow"));
    }

    #[test]
    fn directive_notes_are_collected_from_every_file() {
        let loader = MemoryLoader::new().with_unit("u", "unit u; {$define x} {$define x} interface implementation end.");
        let mut compiler = compiler(loader);
        compiler
            .compile_source("program p; {$mode objfpc} uses u; begin end.", Path::new("p.pas"))
            .expect("compiles");
        let notes: Vec<(Severity, &str)> = compiler
            .notes()
            .iter()
            .map(|d| (d.severity, d.location.as_ref().map_or("", |l| l.file.as_ref())))
            .collect();
        assert_eq!(notes, vec![(Severity::Warning, "p.pas"), (Severity::Hint, "u.pas")]);
    }

    #[test]
    fn sources_are_kept_for_diagnostics() {
        let loader = MemoryLoader::new().with_unit("u", "unit u; interface implementation end.");
        let mut compiler = compiler(loader);
        compiler
            .compile_source("program p; uses u; begin end.", Path::new("p.pas"))
            .expect("compiles");
        let files: Vec<&str> = compiler.sources().iter().map(|(f, _)| f.as_ref()).collect();
        assert_eq!(files, vec!["p.pas", "u.pas"]);
    }
}
