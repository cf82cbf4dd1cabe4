// src/analyzer/symbols.rs

use crate::analyzer::types::Type;
use crate::ast::{signature_of, FunctionDefinition, VariableDefinition};
use crate::utils::Location;
use std::collections::HashMap;

/// The C stream handles every unit can write to.
pub const STANDARD_HANDLES: [&str; 3] = ["stdin", "stdout", "stderr"];

/// Unit-level definitions: global variables and constants, routines (keyed by
/// signature so they can be overloaded) and named types.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    variables: Vec<VariableDefinition>,
    functions: Vec<FunctionDefinition>,
    type_names: HashMap<String, Type>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// A table seeded with the built-in type aliases and the standard stream
    /// handles.
    pub fn new() -> Self {
        let mut table = Self {
            variables: Vec::new(),
            functions: Vec::new(),
            type_names: HashMap::new(),
        };

        let aliases = [
            ("shortint", Type::integer(8)),
            ("byte", Type::integer(8)),
            ("char", Type::integer(8)),
            ("smallint", Type::integer(16)),
            ("word", Type::integer(16)),
            ("longint", Type::int32()),
            ("integer", Type::int32()),
            ("cardinal", Type::int32()),
            ("dword", Type::int32()),
            ("int64", Type::integer(64)),
            ("qword", Type::integer(64)),
            ("string", Type::String),
            ("boolean", Type::Boolean),
            ("real", Type::float64()),
            ("double", Type::float64()),
            ("single", Type::Float { width: 32 }),
            ("pchar", Type::pchar()),
            ("pointer", Type::Pointer(None)),
            ("text", Type::File(None)),
        ];
        for (name, ty) in aliases {
            table.type_names.insert(name.to_string(), ty);
        }

        let builtin = Location::start_of("<builtin>".into());
        for handle in STANDARD_HANDLES {
            table.variables.push(VariableDefinition {
                name: handle.to_string(),
                ty: Type::File(None),
                scope_id: 0,
                initializer: None,
                is_constant: false,
                loc: builtin.clone(),
            });
        }
        table
    }

    // --- variables ---

    pub fn variables(&self) -> &[VariableDefinition] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDefinition> {
        self.variables.iter().find(|var| var.name == name)
    }

    /// Adds a unit-level variable. Returns the clashing definition on redefinition.
    pub fn add_variable(&mut self, var: VariableDefinition) -> Result<(), &VariableDefinition> {
        if let Some(index) = self.variables.iter().position(|v| v.name == var.name) {
            return Err(&self.variables[index]);
        }
        self.variables.push(var);
        Ok(())
    }

    // --- functions ---

    pub fn functions(&self) -> &[FunctionDefinition] {
        &self.functions
    }

    /// Adds a routine. A body-less forward declaration with the same
    /// signature is replaced by the full definition.
    pub fn add_function(&mut self, func: FunctionDefinition) -> Result<(), &FunctionDefinition> {
        let signature = func.signature();
        if let Some(index) = self.functions.iter().position(|f| f.signature() == signature) {
            let existing = &self.functions[index];
            let is_forward = existing.body.is_none() && !existing.is_external;
            if !is_forward || func.body.is_none() {
                return Err(&self.functions[index]);
            }
            self.functions[index] = func;
            return Ok(());
        }
        self.functions.push(func);
        Ok(())
    }

    pub fn function_by_signature(&self, signature: &str) -> Option<&FunctionDefinition> {
        self.functions.iter().find(|f| f.signature() == signature)
    }

    pub fn functions_named<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s FunctionDefinition> + 's {
        self.functions.iter().filter(move |f| f.name == name)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f.name == name)
    }

    /// Whether more than one routine shares `name`.
    pub fn is_overloaded(&self, name: &str) -> bool {
        self.functions_named(name).count() > 1
    }

    /// Resolves a call from the actual argument types.
    ///
    /// The exact `name(types)` signature wins; otherwise a foreign routine
    /// with the bare name; otherwise the single same-arity candidate whose
    /// parameters accept the arguments.
    pub fn resolve_call(&self, name: &str, arg_types: &[Type]) -> Option<&FunctionDefinition> {
        let signature = signature_of(name, arg_types);
        if let Some(func) = self.function_by_signature(&signature) {
            log::trace!("resolved call `{}` by exact signature", signature);
            return Some(func);
        }
        // Iterated directly so the result borrows only `self`.
        let named = || self.functions.iter().filter(move |f| f.name == name);
        if let Some(func) = named().find(|f| f.is_external) {
            log::trace!("resolved call `{}` to foreign routine `{}`", signature, func.signature());
            return Some(func);
        }

        let mut candidates = named().filter(|f| {
            f.params.len() == arg_types.len()
                && f.params.iter().zip(arg_types).all(|(param, arg)| {
                    arg.is_unknown()
                        || param.ty.accepts(arg)
                        || (matches!(param.ty, Type::Pointer(_)) && *arg == Type::String)
                })
        });
        let candidate = candidates.next()?;
        if candidates.next().is_some() {
            log::trace!("call `{}` is ambiguous", signature);
            return None;
        }
        log::trace!("resolved call `{}` to compatible overload `{}`", signature, candidate.signature());
        Some(candidate)
    }

    // --- types ---

    pub fn type_name(&self, name: &str) -> Option<&Type> {
        self.type_names.get(name)
    }

    pub fn add_type(&mut self, name: impl Into<String>, ty: Type) {
        self.type_names.insert(name.into(), ty);
    }

    /// Merges the public definitions of an imported unit. Definitions this
    /// table already has are kept.
    pub fn import(&mut self, other: SymbolTable) {
        for var in other.variables {
            if self.variable(&var.name).is_none() {
                self.variables.push(var);
            }
        }
        for func in other.functions {
            if self.function_by_signature(&func.signature()).is_none() {
                self.functions.push(func);
            }
        }
        for (name, ty) in other.type_names {
            self.type_names.entry(name).or_insert(ty);
        }
    }
}
