//! src/ast/mod.rs
//!
//! The typed syntax tree produced by the parser and consumed by the type
//! checker and the lowering engine.
//!
//! The node set is closed: every node kind is a variant of [`NodeKind`], and
//! each operation of the node protocol (`print`, `resolve_type`, `type_check`,
//! `lower`) is one exhaustive `match`. Declarations (variables, functions,
//! units) carry their type descriptors, resolved by the parser; expression
//! types are inferred on demand from the enclosing scope.

mod print;
#[cfg(test)]
mod test;

use crate::analyzer::symbols::SymbolTable;
use crate::analyzer::types::Type;
use crate::utils::Location;

/// One node of the tree together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub loc: Location,
}

impl Node {
    pub fn new(kind: NodeKind, loc: Location) -> Self {
        Self { kind, loc }
    }

    /// Whether the node denotes a storage location (can be assigned to or
    /// passed by reference).
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Variable(_)
                | NodeKind::ArrayAccess { .. }
                | NodeKind::FieldAccess { .. }
                | NodeKind::Dereference(_)
        )
    }

    /// The statically known integer value of the node, if it is a literal.
    pub fn constant_int(&self) -> Option<i64> {
        match &self.kind {
            NodeKind::IntLiteral(value) => Some(*value),
            NodeKind::CharLiteral(code) => Some(i64::from(*code)),
            NodeKind::Unary { op: UnaryOperator::Neg, operand } => operand.constant_int().map(|v| -v),
            _ => None,
        }
    }

    /// The byte of a `#nn` code or of a one-character quoted literal.
    pub fn char_value(&self) -> Option<u8> {
        match &self.kind {
            NodeKind::CharLiteral(code) => Some(*code),
            NodeKind::StringLiteral(bytes) if bytes.len() == 1 => Some(bytes[0]),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // --- literals ---
    IntLiteral(i64),
    RealLiteral(f64),
    BoolLiteral(bool),
    /// Raw bytes; `#nn` codes above 127 are kept as single bytes.
    StringLiteral(Vec<u8>),
    /// `#65`: a single character code.
    CharLiteral(u8),
    NilLiteral,

    // --- accesses ---
    Variable(String),
    ArrayAccess { array: Box<Node>, index: Box<Node> },
    FieldAccess { record: Box<Node>, field: String },
    /// `p^`
    Dereference(Box<Node>),
    /// `@x`
    AddressOf(Box<Node>),

    // --- operators ---
    Unary { op: UnaryOperator, operand: Box<Node> },
    Binary { op: BinaryOperator, lhs: Box<Node>, rhs: Box<Node> },
    Comparison { op: ComparisonOperator, lhs: Box<Node>, rhs: Box<Node> },

    // --- calls ---
    Call { name: String, args: Vec<Node> },
    /// A built-in routine. `source_text` holds the verbatim text of the
    /// argument list, which `assert` prints on failure.
    SystemCall { function: SystemFunction, args: Vec<Node>, source_text: Option<String> },

    // --- statements ---
    Assignment { target: Box<Node>, value: Box<Node> },
    Block(Block),
    If { condition: Box<Node>, then_branch: Box<Node>, else_branch: Option<Box<Node>> },
    While { condition: Box<Node>, body: Box<Node> },
    For {
        variable: String,
        start: Box<Node>,
        end: Box<Node>,
        descending: bool,
        body: Box<Node>,
    },
    Repeat { body: Block, condition: Box<Node> },
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    /// `/`, always a float division.
    Divide,
    /// `div`
    IntDiv,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::IntDiv => "div",
            BinaryOperator::Mod => "mod",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::Xor => "xor",
            BinaryOperator::Shl => "shl",
            BinaryOperator::Shr => "shr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl ComparisonOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "=",
            ComparisonOperator::NotEq => "<>",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::LtEq => "<=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::GtEq => ">=",
        }
    }
}

/// The closed set of built-in routines, recognized by name before ordinary
/// call resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemFunction {
    Write,
    Writeln,
    Printf,
    Exit,
    Low,
    High,
    SetLength,
    Length,
    PChar,
    New,
    Halt,
    Assert,
}

impl SystemFunction {
    /// Case-insensitive lookup.
    pub fn lookup(name: &str) -> Option<Self> {
        let function = match name.to_ascii_lowercase().as_str() {
            "write" => SystemFunction::Write,
            "writeln" => SystemFunction::Writeln,
            "printf" => SystemFunction::Printf,
            "exit" => SystemFunction::Exit,
            "low" => SystemFunction::Low,
            "high" => SystemFunction::High,
            "setlength" => SystemFunction::SetLength,
            "length" => SystemFunction::Length,
            "pchar" => SystemFunction::PChar,
            "new" => SystemFunction::New,
            "halt" => SystemFunction::Halt,
            "assert" => SystemFunction::Assert,
            _ => return None,
        };
        Some(function)
    }

    pub fn name(self) -> &'static str {
        match self {
            SystemFunction::Write => "write",
            SystemFunction::Writeln => "writeln",
            SystemFunction::Printf => "printf",
            SystemFunction::Exit => "exit",
            SystemFunction::Low => "low",
            SystemFunction::High => "high",
            SystemFunction::SetLength => "setlength",
            SystemFunction::Length => "length",
            SystemFunction::PChar => "pchar",
            SystemFunction::New => "new",
            SystemFunction::Halt => "halt",
            SystemFunction::Assert => "assert",
        }
    }

    /// Routines that may be invoked without parentheses.
    pub fn allows_bare_call(self) -> bool {
        matches!(self, SystemFunction::Writeln | SystemFunction::Exit | SystemFunction::Halt)
    }
}

/// A statement block together with the variables it declares.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// A tag used for debugging output and IR value names.
    pub name: String,
    pub variables: Vec<VariableDefinition>,
    pub statements: Vec<Node>,
    pub loc: Location,
}

impl Block {
    pub fn new(name: impl Into<String>, loc: Location) -> Self {
        Self { name: name.into(), variables: Vec::new(), statements: Vec::new(), loc }
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDefinition> {
        self.variables.iter().find(|var| var.name == name)
    }
}

/// A `var` or `const` declaration, at unit level or inside a routine.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    pub ty: Type,
    /// Nesting depth of the declaring scope: 0 for unit level.
    pub scope_id: usize,
    pub initializer: Option<Node>,
    pub is_constant: bool,
    pub loc: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
    /// `var` parameters are passed by address.
    pub is_reference: bool,
    pub loc: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    /// Symbol name of a foreign routine, when it differs from `name`.
    pub link_name: Option<String>,
    /// Library a foreign routine comes from (`external 'c'`).
    pub library: Option<String>,
    pub params: Vec<Parameter>,
    /// `None` for foreign and forward declarations.
    pub body: Option<Block>,
    pub is_procedure: bool,
    pub is_variadic: bool,
    pub is_external: bool,
    pub return_type: Type,
    pub loc: Location,
}

impl FunctionDefinition {
    /// The overload key: `name(type1,type2,...)`.
    pub fn signature(&self) -> String {
        let types: Vec<Type> = self.params.iter().map(|p| p.ty.clone()).collect();
        signature_of(&self.name, &types)
    }

    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Whether `name` refers to this function's return-value slot.
    pub fn is_result_name(&self, name: &str) -> bool {
        !self.is_procedure && (name == self.name || name == "result")
    }
}

/// Builds the lookup key used for overload resolution.
pub fn signature_of(name: &str, types: &[Type]) -> String {
    let types: Vec<String> = types.iter().map(ToString::to_string).collect();
    format!("{}({})", name, types.join(","))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Program,
    Library,
}

/// A whole compilation unit: its symbol table and its top-level block.
#[derive(Debug, Clone)]
pub struct Unit {
    pub kind: UnitKind,
    pub name: String,
    pub uses: Vec<String>,
    pub symbols: SymbolTable,
    pub body: Block,
    pub loc: Location,
}

impl Unit {
    /// Name of the emitted entry function.
    pub fn entry_name(&self) -> &str {
        match self.kind {
            UnitKind::Program => "main",
            UnitKind::Library => &self.name,
        }
    }
}
