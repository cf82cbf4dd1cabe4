// In src/codegen/unit.rs

use super::expression::lower_as;
use super::runtime::build_process_exit;
use super::utils::{is_terminated, store_value};
use super::{CodeGen, Lower};
use crate::analyzer::TypeEnv;
use crate::ast::{Unit, UnitKind};
use crate::reporter::CodeGenError;

/// Pass 4: the entry function.
///
/// A program gets `i32 main()`, a library a `void` function named after the
/// unit. It evaluates the deferred global initializers, runs the unit's main
/// block and ends the process with status 0.
pub(super) fn generate_entry(codegen: &mut CodeGen, unit: &Unit) -> Result<(), CodeGenError> {
    let fn_type = match unit.kind {
        UnitKind::Program => codegen.context.i32_type().fn_type(&[], false),
        UnitKind::Library => codegen.context.void_type().fn_type(&[], false),
    };
    let entry = codegen.module.add_function(unit.entry_name(), fn_type, None);
    let deferred = std::mem::take(&mut codegen.deferred_initializers);
    log::debug!("emitting entry `{}` ({} deferred initializer(s))", unit.entry_name(), deferred.len());

    let mut ctx = codegen.create_ctx(TypeEnv::new(unit), entry);
    let block = ctx.codegen.context.append_basic_block(entry, "entry");
    ctx.codegen.builder.position_at_end(block);

    for name in &deferred {
        let Some(var) = unit.symbols.variable(name) else { continue };
        let Some(initializer) = &var.initializer else { continue };
        let from = initializer.resolve_type_for(&var.ty, &ctx.env);
        let Some(value) = lower_as(initializer, &from, &mut ctx)? else { continue };
        let slot = ctx
            .lookup_slot(name)
            .ok_or_else(|| CodeGenError::internal(format!("global `{}` was never emitted", name)))?;
        store_value(slot, &var.ty, value, &from, &mut ctx)?;
    }

    unit.body.lower(&mut ctx)?;

    if !is_terminated(&ctx) {
        let status = ctx.codegen.context.i32_type().const_zero();
        build_process_exit(status, &mut ctx)?;
    }
    Ok(())
}
