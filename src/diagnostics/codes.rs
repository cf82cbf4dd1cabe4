// src/diagnostics/codes.rs

use crate::diagnostics::Severity;

/// A registered diagnostic code together with its long-form explanation.
#[derive(Debug, Clone)]
pub struct ErrorCode {
    pub code: &'static str,
    pub severity: Severity,
    pub title: &'static str,
    pub explanation: &'static str,
}

/*
E00xx: lexical and preprocessor errors.
E01xx: syntax and unit-loading errors.
E02xx: type errors.
E03xx: lowering errors.
*/

// --- E00xx ---

pub const E0001_UNRECOGNIZED_TOKEN: ErrorCode = ErrorCode {
    code: "E0001",
    severity: Severity::Error,
    title: "Unrecognized input",
    explanation: "The lexer met a character sequence that does not start any token, \
                  for example a stray `?` or an unterminated string literal.",
};

pub const E0002_INVALID_LITERAL: ErrorCode = ErrorCode {
    code: "E0002",
    severity: Severity::Error,
    title: "Invalid literal",
    explanation: "A numeric or character literal is malformed or does not fit its type. \
                  Integer literals must fit into 64 bits and `#nn` codes into one byte.",
};

pub const E0003_DIRECTIVE: ErrorCode = ErrorCode {
    code: "E0003",
    severity: Severity::Error,
    title: "Unbalanced conditional directive",
    explanation: "Every `{$ifdef}`/`{$ifndef}` needs a matching `{$endif}`, and `{$else}` \
                  may only appear once inside such a region.",
};

pub const E0004_UNTERMINATED_COMMENT: ErrorCode = ErrorCode {
    code: "E0004",
    severity: Severity::Error,
    title: "Unterminated comment",
    explanation: "A `(*` comment runs to the end of the file without a closing `*)`.",
};

// --- E01xx ---

pub const E0100_UNEXPECTED_TOKEN: ErrorCode = ErrorCode {
    code: "E0100",
    severity: Severity::Error,
    title: "Syntax error",
    explanation: "The token stream does not match the grammar here. Check for a missing \
                  `;`, an unbalanced `begin`/`end` or a misspelled keyword.",
};

pub const E0101_UNKNOWN_TYPE: ErrorCode = ErrorCode {
    code: "E0101",
    severity: Severity::Error,
    title: "Unknown type",
    explanation: "A type name was used that is neither built in nor declared in a `type` \
                  section of this unit or of a unit it uses.",
};

pub const E0102_REDEFINITION: ErrorCode = ErrorCode {
    code: "E0102",
    severity: Severity::Error,
    title: "Redefinition",
    explanation: "A name was declared twice in the same scope. Routines may share a name \
                  only if their parameter type lists differ.",
};

pub const E0103_INVALID: ErrorCode = ErrorCode {
    code: "E0103",
    severity: Severity::Error,
    title: "Invalid construct",
    explanation: "The construct is well-formed but not allowed here, e.g. `break` outside \
                  of a loop or an assignment to something that is not a variable.",
};

pub const E0104_UNIT_NOT_FOUND: ErrorCode = ErrorCode {
    code: "E0104",
    severity: Severity::Error,
    title: "Unit not found",
    explanation: "A unit named in a `uses` clause could not be found next to the importing \
                  file or in any `-I` search directory. Unit files are named `<unit>.pas`.",
};

pub const E0105_CIRCULAR_UNIT: ErrorCode = ErrorCode {
    code: "E0105",
    severity: Severity::Error,
    title: "Circular unit reference",
    explanation: "Units may not use each other in a cycle.",
};

// --- E02xx ---

pub const E0200_TYPE_MISMATCH: ErrorCode = ErrorCode {
    code: "E0200",
    severity: Severity::Error,
    title: "Type error",
    explanation: "Operand or argument types do not unify: an assignment of a value of the \
                  wrong type, a non-Boolean condition, a constant array index outside the \
                  declared bounds, and so on. Type errors stop the compilation of the unit.",
};

// --- E03xx ---

pub const E0300_UNRESOLVED: ErrorCode = ErrorCode {
    code: "E0300",
    severity: Severity::Error,
    title: "Unresolved reference",
    explanation: "A variable, routine or record field name could not be resolved while \
                  generating code. Lowering continues so that further errors are reported.",
};

pub const E0301_ARGUMENT_COUNT: ErrorCode = ErrorCode {
    code: "E0301",
    severity: Severity::Error,
    title: "Wrong number of arguments",
    explanation: "A routine was called with a different number of arguments than it \
                  declares. Only `varargs` routines accept extra arguments.",
};

pub const E0399_INTERNAL: ErrorCode = ErrorCode {
    code: "E0399",
    severity: Severity::Error,
    title: "Internal compiler error",
    explanation: "The code generator reached a state it cannot handle, or LLVM rejected \
                  the generated module. This is a bug in the compiler.",
};

pub const ALL: &[&ErrorCode] = &[
    &E0001_UNRECOGNIZED_TOKEN,
    &E0002_INVALID_LITERAL,
    &E0003_DIRECTIVE,
    &E0004_UNTERMINATED_COMMENT,
    &E0100_UNEXPECTED_TOKEN,
    &E0101_UNKNOWN_TYPE,
    &E0102_REDEFINITION,
    &E0103_INVALID,
    &E0104_UNIT_NOT_FOUND,
    &E0105_CIRCULAR_UNIT,
    &E0200_TYPE_MISMATCH,
    &E0300_UNRESOLVED,
    &E0301_ARGUMENT_COUNT,
    &E0399_INTERNAL,
];

/// Looks a code up by its `Exxxx` name.
pub fn lookup(code: &str) -> Option<&'static ErrorCode> {
    ALL.iter().copied().find(|c| c.code.eq_ignore_ascii_case(code))
}
