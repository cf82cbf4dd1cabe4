// In src/analyzer/mod.rs

pub mod symbols;
pub mod types;
mod check;
pub(crate) mod resolve;
#[cfg(test)]
mod test;

use crate::ast::{Block, FunctionDefinition, Node, Parameter, Unit, VariableDefinition};
use crate::reporter::TypeError;
use types::Type;

// --- scope environment ---

/// The lexical context a node is inspected in: the unit, the enclosing
/// routine (if any) and the chain of blocks entered so far.
///
/// Both the type checker and the lowering engine thread one of these through
/// the tree; it never owns anything, it only borrows the tree being walked.
#[derive(Debug, Clone)]
pub struct TypeEnv<'a> {
    pub unit: &'a Unit,
    pub function: Option<&'a FunctionDefinition>,
    blocks: Vec<&'a Block>,
}

/// What a name resolved to.
#[derive(Debug, Clone, Copy)]
pub enum Binding<'a> {
    Parameter(&'a Parameter),
    /// The return-value slot of the enclosing function.
    ReturnSlot(&'a FunctionDefinition),
    Local(&'a VariableDefinition),
    Global(&'a VariableDefinition),
}

impl<'a> Binding<'a> {
    pub fn ty(&self) -> &'a Type {
        match self {
            Binding::Parameter(param) => &param.ty,
            Binding::ReturnSlot(func) => &func.return_type,
            Binding::Local(var) | Binding::Global(var) => &var.ty,
        }
    }

    pub fn is_constant(&self) -> bool {
        match self {
            Binding::Local(var) | Binding::Global(var) => var.is_constant,
            _ => false,
        }
    }
}

impl<'a> TypeEnv<'a> {
    /// The unit-level environment (outside every routine).
    pub fn new(unit: &'a Unit) -> Self {
        Self { unit, function: None, blocks: Vec::new() }
    }

    /// A fresh environment for the body of `function`.
    pub fn for_function(unit: &'a Unit, function: &'a FunctionDefinition) -> Self {
        Self { unit, function: Some(function), blocks: Vec::new() }
    }

    pub fn enter_block(&mut self, block: &'a Block) {
        self.blocks.push(block);
    }

    pub fn exit_block(&mut self) {
        self.blocks.pop();
    }

    /// Looks `name` up: parameters, then the return slot, then the enclosing
    /// blocks innermost first, then unit-level variables.
    pub fn lookup(&self, name: &str) -> Option<Binding<'a>> {
        if let Some(function) = self.function {
            if let Some(param) = function.param(name) {
                return Some(Binding::Parameter(param));
            }
            if function.is_result_name(name) {
                return Some(Binding::ReturnSlot(function));
            }
        }
        for block in self.blocks.iter().rev() {
            if let Some(var) = block.variable(name) {
                return Some(Binding::Local(var));
            }
        }
        self.unit.symbols.variable(name).map(Binding::Global)
    }

    /// The static type of `name`, `Unknown` when nothing matches.
    pub fn variable_type(&self, name: &str) -> Type {
        self.lookup(name).map(|b| b.ty().clone()).unwrap_or(Type::Unknown)
    }

    /// Resolves a call of `name` with `args` and returns the routine with
    /// the argument types it was matched on. When nothing takes the
    /// arguments as written, one-character quoted literals are retried as
    /// characters.
    pub fn resolve_call(&self, name: &str, args: &[Node]) -> (Option<&'a FunctionDefinition>, Vec<Type>) {
        let unit: &'a Unit = self.unit;
        let arg_types: Vec<Type> = args.iter().map(|a| a.resolve_type(self)).collect();
        if let Some(func) = unit.symbols.resolve_call(name, &arg_types) {
            return (Some(func), arg_types);
        }
        if !args.iter().any(|a| a.char_value().is_some()) {
            return (None, arg_types);
        }
        let as_chars: Vec<Type> = args
            .iter()
            .zip(&arg_types)
            .map(|(arg, ty)| if arg.char_value().is_some() { Type::integer(8) } else { ty.clone() })
            .collect();
        match unit.symbols.resolve_call(name, &as_chars) {
            Some(func) => (Some(func), as_chars),
            None => (None, arg_types),
        }
    }
}

/// Type-checks a whole unit: unit-level initializers, every routine body and
/// the main block. Stops at the first failure.
pub fn check_unit(unit: &Unit) -> Result<(), TypeError> {
    log::debug!("type-checking unit `{}`", unit.name);
    unit.type_check()
}
