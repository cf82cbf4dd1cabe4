// Lexical analysis: source text -> located tokens.
use logos::{FilterResult, Logos};
use crate::reporter::{CompilerError, LexerError};
use crate::utils::{LineIndex, Location};
use std::fmt;
use std::sync::Arc;

mod preprocess;
#[cfg(test)]
mod test;

pub use preprocess::Preprocessor;

/// A token paired with where it was read.
pub type Spanned = (Token, Location);

/// Error kinds reported by token callbacks.
#[derive(Debug, Default, Clone, PartialEq)]
pub enum LexingError {
    #[default]
    InvalidToken,
    InvalidInteger,
    InvalidReal,
    InvalidCharCode,
    UnterminatedComment,
}

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(error = LexingError)]
#[logos(skip r"[ \t\r\n\f]+")]
// `{ ... }` comments; `{$` starts a directive instead
#[logos(skip r"\{([^$}][^}]*)?\}")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // --- keywords ---
    #[token("program", ignore(ascii_case))]
    Program,
    #[token("unit", ignore(ascii_case))]
    Unit,
    #[token("interface", ignore(ascii_case))]
    Interface,
    #[token("implementation", ignore(ascii_case))]
    Implementation,
    #[token("uses", ignore(ascii_case))]
    Uses,
    #[token("const", ignore(ascii_case))]
    Const,
    #[token("type", ignore(ascii_case))]
    Type,
    #[token("var", ignore(ascii_case))]
    Var,
    #[token("function", ignore(ascii_case))]
    Function,
    #[token("procedure", ignore(ascii_case))]
    Procedure,
    #[token("begin", ignore(ascii_case))]
    Begin,
    #[token("end", ignore(ascii_case))]
    End,
    #[token("if", ignore(ascii_case))]
    If,
    #[token("then", ignore(ascii_case))]
    Then,
    #[token("else", ignore(ascii_case))]
    Else,
    #[token("while", ignore(ascii_case))]
    While,
    #[token("do", ignore(ascii_case))]
    Do,
    #[token("for", ignore(ascii_case))]
    For,
    #[token("to", ignore(ascii_case))]
    To,
    #[token("downto", ignore(ascii_case))]
    Downto,
    #[token("repeat", ignore(ascii_case))]
    Repeat,
    #[token("until", ignore(ascii_case))]
    Until,
    #[token("break", ignore(ascii_case))]
    Break,
    #[token("continue", ignore(ascii_case))]
    Continue,
    #[token("array", ignore(ascii_case))]
    Array,
    #[token("of", ignore(ascii_case))]
    Of,
    #[token("record", ignore(ascii_case))]
    Record,
    #[token("file", ignore(ascii_case))]
    File,
    #[token("nil", ignore(ascii_case))]
    Nil,

    /// `(* ... *)` comments are consumed by the callback and never emitted.
    #[token("(*", skip_paren_comment)]
    CommentStart,

    // --- word operators ---
    #[token("div", ignore(ascii_case))]
    Div,
    #[token("mod", ignore(ascii_case))]
    Mod,
    #[token("and", ignore(ascii_case))]
    And,
    #[token("or", ignore(ascii_case))]
    Or,
    #[token("xor", ignore(ascii_case))]
    Xor,
    #[token("not", ignore(ascii_case))]
    Not,
    #[token("shl", ignore(ascii_case))]
    Shl,
    #[token("shr", ignore(ascii_case))]
    Shr,

    // --- literals ---
    #[token("true", |_| true, ignore(ascii_case))]
    #[token("false", |_| false, ignore(ascii_case))]
    Boolean(bool),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", lex_real)]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", lex_real)]
    Real(f64),

    #[regex(r"[0-9]+", lex_decimal)]
    #[regex(r"\$[0-9a-fA-F]+", lex_hex)]
    Integer(i64),

    /// `'text'`, with `''` standing for one quote. Held as bytes, since
    /// merged `#nn` codes may be any byte value.
    #[regex(r"'([^'\n]|'')*'", lex_string)]
    String(Vec<u8>),

    /// `#65` or `#$41`
    #[regex(r"#[0-9]+", lex_char_code)]
    #[regex(r"#\$[0-9a-fA-F]+", lex_char_code)]
    CharCode(u8),

    /// The body of a `{$ ... }` compiler directive.
    #[regex(r"\{\$[^}]*\}", |lex| { let s = lex.slice(); s[2..s.len() - 1].trim().to_string() })]
    Directive(String),

    /// Identifiers are case-insensitive and stored lower-cased.
    #[regex("[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_ascii_lowercase())]
    Ident(String),

    // --- symbols ---
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("=")]
    Eq,
    #[token("<>")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token(":=")]
    Assign,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("..")]
    DotDot,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("^")]
    Caret,
    #[token("@")]
    At,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Boolean(value) => write!(f, "`{}`", value),
            Token::Real(value) => write!(f, "real literal `{}`", value),
            Token::Integer(value) => write!(f, "integer literal `{}`", value),
            Token::String(value) => write!(f, "string literal '{}'", String::from_utf8_lossy(value)),
            Token::CharCode(value) => write!(f, "character code `#{}`", value),
            Token::Directive(text) => write!(f, "directive `{{${}}}`", text),
            Token::Ident(name) => write!(f, "identifier `{}`", name),
            other => write!(f, "`{}`", other.text()),
        }
    }
}

impl Token {
    /// Source spelling of keyword and symbol tokens.
    pub fn text(&self) -> &'static str {
        match self {
            Token::Program => "program",
            Token::Unit => "unit",
            Token::Interface => "interface",
            Token::Implementation => "implementation",
            Token::Uses => "uses",
            Token::Const => "const",
            Token::Type => "type",
            Token::Var => "var",
            Token::Function => "function",
            Token::Procedure => "procedure",
            Token::Begin => "begin",
            Token::End => "end",
            Token::If => "if",
            Token::Then => "then",
            Token::Else => "else",
            Token::While => "while",
            Token::Do => "do",
            Token::For => "for",
            Token::To => "to",
            Token::Downto => "downto",
            Token::Repeat => "repeat",
            Token::Until => "until",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::Array => "array",
            Token::Of => "of",
            Token::Record => "record",
            Token::File => "file",
            Token::Nil => "nil",
            Token::Div => "div",
            Token::Mod => "mod",
            Token::And => "and",
            Token::Or => "or",
            Token::Xor => "xor",
            Token::Not => "not",
            Token::Shl => "shl",
            Token::Shr => "shr",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Eq => "=",
            Token::NotEq => "<>",
            Token::Lt => "<",
            Token::LtEq => "<=",
            Token::Gt => ">",
            Token::GtEq => ">=",
            Token::Assign => ":=",
            Token::Colon => ":",
            Token::Semicolon => ";",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::DotDot => "..",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Caret => "^",
            Token::At => "@",
            Token::CommentStart => "(*",
            Token::Boolean(_)
            | Token::Real(_)
            | Token::Integer(_)
            | Token::String(_)
            | Token::CharCode(_)
            | Token::Directive(_)
            | Token::Ident(_) => "",
        }
    }
}

// --- literal callbacks ---

fn lex_decimal(lex: &mut logos::Lexer<Token>) -> Result<i64, LexingError> {
    lex.slice().parse().map_err(|_| LexingError::InvalidInteger)
}

fn lex_hex(lex: &mut logos::Lexer<Token>) -> Result<i64, LexingError> {
    i64::from_str_radix(&lex.slice()[1..], 16).map_err(|_| LexingError::InvalidInteger)
}

fn lex_real(lex: &mut logos::Lexer<Token>) -> Result<f64, LexingError> {
    lex.slice().parse().map_err(|_| LexingError::InvalidReal)
}

fn lex_string(lex: &mut logos::Lexer<Token>) -> Vec<u8> {
    let slice = lex.slice();
    slice[1..slice.len() - 1].replace("''", "'").into_bytes()
}

fn skip_paren_comment(lex: &mut logos::Lexer<Token>) -> FilterResult<(), LexingError> {
    match lex.remainder().find("*)") {
        Some(end) => {
            lex.bump(end + 2);
            FilterResult::Skip
        }
        None => {
            lex.bump(lex.remainder().len());
            FilterResult::Error(LexingError::UnterminatedComment)
        }
    }
}

fn lex_char_code(lex: &mut logos::Lexer<Token>) -> Result<u8, LexingError> {
    let digits = &lex.slice()[1..];
    let value = match digits.strip_prefix('$') {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => digits.parse(),
    };
    value
        .ok()
        .and_then(|v| u8::try_from(v).ok())
        .ok_or(LexingError::InvalidCharCode)
}

/// Lexes `source` with no predefined conditional symbols.
pub fn lex(source: &str, file: Arc<str>) -> (Vec<Spanned>, Vec<CompilerError>) {
    lex_with(source, file, &mut Preprocessor::new::<&str>(&[]))
}

/// Lexes `source`, evaluating conditional directives with `preprocessor`.
///
/// Tokens (and errors) inside inactive `{$ifdef}` regions are dropped.
/// Adjacent string and character-code literals are merged, so `'a'#10'b'`
/// becomes one string token.
pub fn lex_with(
    source: &str,
    file: Arc<str>,
    preprocessor: &mut Preprocessor,
) -> (Vec<Spanned>, Vec<CompilerError>) {
    let lines = LineIndex::new(source);
    let locate = |span: std::ops::Range<usize>| {
        let (row, col) = lines.locate(span.start);
        Location::new(file.clone(), span.start, span.len(), row, col)
    };

    let mut tokens: Vec<Spanned> = Vec::new();
    let mut errors: Vec<CompilerError> = Vec::new();

    for (result, span) in Token::lexer(source).spanned() {
        let loc = locate(span.clone());
        match result {
            Ok(Token::Directive(text)) => {
                if let Err(error) = preprocessor.directive(&text, &loc) {
                    errors.push(error.into());
                }
            }
            _ if !preprocessor.is_active() => {}
            Ok(token) => push_merging_literals(&mut tokens, token, loc),
            Err(kind) => {
                let text = source[span].to_string();
                let error = match kind {
                    LexingError::InvalidToken => LexerError::UnrecognizedToken { text, loc },
                    LexingError::InvalidInteger => LexerError::InvalidLiteral { kind: "integer", text, loc },
                    LexingError::InvalidReal => LexerError::InvalidLiteral { kind: "real", text, loc },
                    LexingError::InvalidCharCode => LexerError::InvalidLiteral { kind: "character", text, loc },
                    LexingError::UnterminatedComment => LexerError::UnterminatedComment { loc },
                };
                errors.push(error.into());
            }
        }
    }

    if let Err(error) = preprocessor.finish(&file) {
        errors.push(error.into());
    }
    log::debug!("lexed {} token(s) from `{}`", tokens.len(), file);
    (tokens, errors)
}

fn push_merging_literals(tokens: &mut Vec<Spanned>, token: Token, loc: Location) {
    let piece = match &token {
        Token::String(bytes) => Some(bytes.as_slice()),
        Token::CharCode(code) => Some(std::slice::from_ref(code)),
        _ => None,
    };
    if let (Some(piece), Some((previous, previous_loc))) = (piece, tokens.last_mut()) {
        let adjacent = previous_loc.offset + previous_loc.len == loc.offset;
        if adjacent {
            let merged = match previous {
                Token::String(bytes) => Some([bytes.as_slice(), piece].concat()),
                Token::CharCode(code) => Some([std::slice::from_ref(code), piece].concat()),
                _ => None,
            };
            if let Some(merged) = merged {
                *previous = Token::String(merged);
                *previous_loc = previous_loc.to(&loc);
                return;
            }
        }
    }
    tokens.push((token, loc));
}
