// Conditional compilation: {$define}, {$undef}, {$ifdef}, {$ifndef}, {$else}, {$endif}.

use crate::diagnostics::Diagnostic;
use crate::reporter::LexerError;
use crate::utils::Location;
use std::collections::HashSet;

/// Symbol defined for every compilation.
pub const COMPILER_SYMBOL: &str = "pascalc";

#[derive(Debug)]
struct Frame {
    enclosing_active: bool,
    condition: bool,
    in_else: bool,
    opened_at: Location,
}

impl Frame {
    fn is_active(&self) -> bool {
        self.enclosing_active && (self.condition != self.in_else)
    }
}

/// Tracks the defined symbols and the nesting of conditional regions while a
/// file is lexed. One instance is used per file.
#[derive(Debug)]
pub struct Preprocessor {
    symbols: HashSet<String>,
    stack: Vec<Frame>,
    /// Non-fatal findings: ignored directives, redundant defines.
    notes: Vec<Diagnostic>,
}

impl Preprocessor {
    /// A preprocessor with `defines` (case-insensitive) plus the compiler's
    /// own symbol predefined.
    pub fn new<S: AsRef<str>>(defines: &[S]) -> Self {
        let mut symbols: HashSet<String> = defines.iter().map(|d| d.as_ref().to_ascii_lowercase()).collect();
        symbols.insert(COMPILER_SYMBOL.to_string());
        Self { symbols, stack: Vec::new(), notes: Vec::new() }
    }

    /// Whether tokens at the current position are compiled.
    pub fn is_active(&self) -> bool {
        self.stack.last().is_none_or(Frame::is_active)
    }

    /// Applies one `{$...}` directive; `text` is the directive body.
    pub fn directive(&mut self, text: &str, loc: &Location) -> Result<(), LexerError> {
        let mut words = text.split_whitespace();
        let command = words.next().unwrap_or_default().to_ascii_lowercase();
        let argument = words.next().map(str::to_ascii_lowercase);

        match command.as_str() {
            "ifdef" | "ifndef" => {
                let symbol = argument.ok_or_else(|| missing_symbol(&command, loc))?;
                let defined = self.symbols.contains(&symbol);
                self.stack.push(Frame {
                    enclosing_active: self.is_active(),
                    condition: if command == "ifdef" { defined } else { !defined },
                    in_else: false,
                    opened_at: loc.clone(),
                });
            }
            "else" => match self.stack.last_mut() {
                Some(frame) if !frame.in_else => frame.in_else = true,
                Some(_) => {
                    return Err(LexerError::Directive { message: "duplicate `{$else}`".into(), loc: loc.clone() });
                }
                None => {
                    return Err(LexerError::Directive {
                        message: "`{$else}` without a matching `{$ifdef}`".into(),
                        loc: loc.clone(),
                    });
                }
            },
            "endif" => {
                if self.stack.pop().is_none() {
                    return Err(LexerError::Directive {
                        message: "`{$endif}` without a matching `{$ifdef}`".into(),
                        loc: loc.clone(),
                    });
                }
            }
            "define" if self.is_active() => {
                let symbol = argument.ok_or_else(|| missing_symbol(&command, loc))?;
                log::trace!("{}: defining `{}`", loc, symbol);
                if self.symbols.contains(&symbol) {
                    self.notes.push(Diagnostic::hint(loc.clone(), format!("`{}` is already defined", symbol)));
                }
                self.symbols.insert(symbol);
            }
            "undef" if self.is_active() => {
                let symbol = argument.ok_or_else(|| missing_symbol(&command, loc))?;
                self.symbols.remove(&symbol);
            }
            "define" | "undef" => {}
            _ => {
                if self.is_active() {
                    log::warn!("{}: ignoring unsupported directive `{{${}}}`", loc, text);
                    self.notes
                        .push(Diagnostic::warning(loc.clone(), format!("unsupported directive `{{${}}}` is ignored", text)));
                }
            }
        }
        Ok(())
    }

    /// Warnings and hints collected since the last call.
    pub fn take_notes(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.notes)
    }

    /// Reports a conditional region left open at the end of `file`.
    pub fn finish(&mut self, file: &str) -> Result<(), LexerError> {
        match self.stack.pop() {
            Some(frame) => {
                self.stack.clear();
                Err(LexerError::Directive {
                    message: format!("conditional region is missing `{{$endif}}` before the end of `{}`", file),
                    loc: frame.opened_at,
                })
            }
            None => Ok(()),
        }
    }
}

fn missing_symbol(command: &str, loc: &Location) -> LexerError {
    LexerError::Directive { message: format!("`{{${}}}` needs a symbol name", command), loc: loc.clone() }
}
