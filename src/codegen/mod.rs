// In src/codegen/mod.rs

//! Lowering of a type-checked [`Unit`] to LLVM IR.
//!
//! Values of simple types (integers, booleans, floats, pointers, file
//! handles) travel as IR values. Strings, arrays and records are aggregates:
//! an expression of such a type lowers to the *address* of its storage, and
//! copies are explicit `memcpy`s of the whole layout.

mod expression;
mod function;
mod globals;
mod lvalue;
mod runtime;
mod statement;
mod system;
mod types;
mod unit;
mod utils;
#[cfg(test)]
mod test;

use crate::analyzer::TypeEnv;
use crate::analyzer::types::Type;
use crate::ast::Unit;
use crate::reporter::{CodeGenError, CompilerError};
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{FunctionValue, GlobalValue, PointerValue};
use std::collections::HashMap;

// --- core abstractions ---

/// The per-routine lowering state, threaded by mutable reference through
/// every `lower` call. Owns nothing global; that lives in [`CodeGen`].
pub struct CodeGenCtx<'a, 'ctx> {
    pub codegen: &'a mut CodeGen<'ctx>,
    /// Scope used to resolve the static types of the nodes being lowered.
    pub env: TypeEnv<'a>,
    pub current_function: Option<FunctionValue<'ctx>>,
    /// Storage of named slots: frame 0 holds parameters and the result slot,
    /// one frame is pushed per block entered.
    scopes: Vec<HashMap<String, PointerValue<'ctx>>>,
    /// `(continue target, break target)` of every enclosing loop.
    loop_stack: Vec<(BasicBlock<'ctx>, BasicBlock<'ctx>)>,
}

/// Lowering of one tree element.
pub trait Lower<'a, 'ctx> {
    type Output;
    fn lower(&'a self, ctx: &mut CodeGenCtx<'a, 'ctx>) -> Result<Self::Output, CodeGenError>;
}

/// Owner of the module being built and of all cross-routine state.
pub struct CodeGen<'ctx> {
    context: &'ctx Context,
    module: Module<'ctx>,
    builder: Builder<'ctx>,
    diagnostics: Vec<CompilerError>,

    /// Routines by signature (`name(T1,T2)`).
    functions: HashMap<String, FunctionValue<'ctx>>,
    globals: HashMap<String, GlobalValue<'ctx>>,
    /// Memoized IR layout of every type lowered so far.
    layouts: HashMap<Type, BasicTypeEnum<'ctx>>,
    /// Constant byte arrays by content; each distinct literal is emitted once.
    strings: HashMap<Vec<u8>, GlobalValue<'ctx>>,
    /// Unit-level variables whose initializers are not constants; they are
    /// evaluated at the start of the entry function.
    deferred_initializers: Vec<String>,
}

impl<'ctx> CodeGen<'ctx> {
    pub fn new(context: &'ctx Context, module_name: &str) -> Self {
        let module = context.create_module(module_name);
        let builder = context.create_builder();
        Self {
            context,
            module,
            builder,
            diagnostics: Vec::new(),
            functions: HashMap::new(),
            globals: HashMap::new(),
            layouts: HashMap::new(),
            strings: HashMap::new(),
            deferred_initializers: Vec::new(),
        }
    }

    /// Lowers the whole unit. Consumes the generator and returns the textual
    /// IR, or every error found on the way.
    pub fn run(mut self, unit: &Unit) -> Result<String, Vec<CompilerError>> {
        log::debug!("lowering unit `{}`", unit.name);

        // PASS 1: unit-level variables and the standard handles
        globals::generate_globals(&mut self, unit);

        // PASS 2: every routine's declaration, so bodies can call each other
        function::generate_function_declarations(&mut self, unit);

        // PASS 3: routine bodies
        function::generate_function_bodies(&mut self, unit);

        // PASS 4: the entry function
        if let Err(err) = unit::generate_entry(&mut self, unit) {
            self.diagnostics.push(err.into());
        }

        if !self.diagnostics.is_empty() {
            return Err(self.diagnostics);
        }

        if let Err(e) = self.module.verify() {
            self.diagnostics.push(CodeGenError::Verification { message: e.to_string() }.into());
            return Err(self.diagnostics);
        }

        Ok(self.module.print_to_string().to_string())
    }

    /// A lowering context positioned inside `function`.
    pub(super) fn create_ctx<'a>(
        &'a mut self,
        env: TypeEnv<'a>,
        function: FunctionValue<'ctx>,
    ) -> CodeGenCtx<'a, 'ctx> {
        CodeGenCtx {
            codegen: self,
            env,
            current_function: Some(function),
            scopes: vec![HashMap::new()],
            loop_stack: Vec::new(),
        }
    }
}

impl<'a, 'ctx> CodeGenCtx<'a, 'ctx> {
    /// Binds `name` to `slot` in the innermost frame.
    pub(super) fn bind(&mut self, name: impl Into<String>, slot: PointerValue<'ctx>) {
        if let Some(frame) = self.scopes.last_mut() {
            frame.insert(name.into(), slot);
        }
    }

    /// The storage of `name`: innermost frame first, then unit-level variables.
    pub(super) fn lookup_slot(&self, name: &str) -> Option<PointerValue<'ctx>> {
        self.scopes
            .iter()
            .rev()
            .find_map(|frame| frame.get(name).copied())
            .or_else(|| self.codegen.globals.get(name).map(|g| g.as_pointer_value()))
    }

    /// The return-value slot of the current function, bound in frame 0.
    pub(super) fn result_slot(&self) -> Option<PointerValue<'ctx>> {
        self.scopes.first().and_then(|frame| frame.get("result").copied())
    }

    /// The routine being emitted into.
    pub(super) fn function(&self) -> Result<FunctionValue<'ctx>, CodeGenError> {
        self.current_function
            .ok_or_else(|| CodeGenError::internal("code emitted outside of a function"))
    }

    pub(super) fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Retires the innermost frame; its slots are no longer reachable by name.
    pub(super) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Runs `f` with `(continue_bb, break_bb)` as the innermost loop targets.
    pub(super) fn with_loop<T>(
        &mut self,
        continue_bb: BasicBlock<'ctx>,
        break_bb: BasicBlock<'ctx>,
        f: impl FnOnce(&mut Self) -> Result<T, CodeGenError>,
    ) -> Result<T, CodeGenError> {
        self.loop_stack.push((continue_bb, break_bb));
        let result = f(self);
        self.loop_stack.pop();
        result
    }

    pub(super) fn loop_targets(&self) -> Option<(BasicBlock<'ctx>, BasicBlock<'ctx>)> {
        self.loop_stack.last().copied()
    }

    /// Records an error that does not stop lowering. The node that raised it
    /// lowers to no value.
    pub(super) fn soft_error<T>(&mut self, error: CodeGenError) -> Result<Option<T>, CodeGenError> {
        log::error!("{}", error);
        self.codegen.diagnostics.push(error.into());
        Ok(None)
    }
}

/// Lowers a type-checked unit to textual LLVM IR.
pub fn codegen(unit: &Unit) -> Result<String, Vec<CompilerError>> {
    let context = Context::create();
    let codegen = CodeGen::new(&context, &unit.name);
    codegen.run(unit)
}
