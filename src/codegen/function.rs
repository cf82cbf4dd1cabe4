// In src/codegen/function.rs

use super::utils::{create_entry_block_alloca, create_slot, is_terminated};
use super::{CodeGen, CodeGenCtx, Lower};
use crate::analyzer::TypeEnv;
use crate::ast::{FunctionDefinition, Unit};
use crate::reporter::CodeGenError;
use inkwell::attributes::{Attribute, AttributeLoc};
use inkwell::module::Linkage;

/// Pass 2: declares every routine of the unit, imported ones included.
pub(super) fn generate_function_declarations(codegen: &mut CodeGen, unit: &Unit) {
    for func in unit.symbols.functions() {
        if let Err(err) = generate_single_decl(codegen, unit, func) {
            codegen.diagnostics.push(err.into());
        }
    }
}

/// Pass 3: lowers every routine that has a body. A failing routine is
/// reported and the next one is still lowered.
pub(super) fn generate_function_bodies(codegen: &mut CodeGen, unit: &Unit) {
    for func in unit.symbols.functions() {
        if func.body.is_none() {
            continue;
        }
        if let Err(err) = generate_single_body(codegen, unit, func) {
            codegen.diagnostics.push(err.into());
        }
    }
}

/// The symbol a routine is emitted under. Foreign routines keep their link
/// name; overloads get their parameter types appended.
fn link_name(unit: &Unit, func: &FunctionDefinition) -> String {
    if func.is_external {
        return func.link_name.clone().unwrap_or_else(|| func.name.clone());
    }
    if !unit.symbols.is_overloaded(&func.name) {
        return func.name.clone();
    }
    let mut mangled = func.name.clone();
    for param in &func.params {
        mangled.push('$');
        mangled.extend(
            param
                .ty
                .to_string()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }),
        );
    }
    mangled
}

fn generate_single_decl(codegen: &mut CodeGen, unit: &Unit, func: &FunctionDefinition) -> Result<(), CodeGenError> {
    let name = link_name(unit, func);
    let fn_type = codegen.function_type(func)?;

    // Several foreign declarations may bind the same symbol.
    let function = match codegen.module.get_function(&name) {
        Some(existing) if func.is_external => existing,
        _ => {
            let linkage = func.is_external.then_some(Linkage::External);
            codegen.module.add_function(&name, fn_type, linkage)
        }
    };

    // By-value aggregates arrive as a pointer to a caller-owned copy.
    let noalias = Attribute::get_named_enum_kind_id("noalias");
    for (index, param) in func.params.iter().enumerate() {
        if !param.is_reference && !param.ty.is_simple() {
            let attribute = codegen.context.create_enum_attribute(noalias, 0);
            function.add_attribute(AttributeLoc::Param(index as u32), attribute);
        }
    }

    log::debug!("declared `{}` as `{}`", func.signature(), name);
    codegen.functions.insert(func.signature(), function);
    Ok(())
}

fn generate_single_body(codegen: &mut CodeGen, unit: &Unit, func: &FunctionDefinition) -> Result<(), CodeGenError> {
    let Some(body) = &func.body else { return Ok(()) };
    let function = codegen
        .functions
        .get(&func.signature())
        .copied()
        .ok_or_else(|| CodeGenError::internal(format!("routine `{}` was never declared", func.signature())))?;

    let env = TypeEnv::for_function(unit, func);
    let mut ctx = codegen.create_ctx(env, function);

    let entry_block = ctx.codegen.context.append_basic_block(function, "entry");
    ctx.codegen.builder.position_at_end(entry_block);

    // Frame 0: parameters and the result slot.
    for (param, value) in func.params.iter().zip(function.get_param_iter()) {
        value.set_name(&param.name);
        if param.is_reference || !param.ty.is_simple() {
            ctx.bind(param.name.clone(), value.into_pointer_value());
        } else {
            let layout = ctx.codegen.llvm_type(&param.ty)?;
            let slot = create_entry_block_alloca(&param.name, layout, &ctx)?;
            ctx.codegen.builder.build_store(slot, value)?;
            ctx.bind(param.name.clone(), slot);
        }
    }
    if !func.is_procedure {
        let slot = create_slot("result", &func.return_type, &mut ctx)?;
        ctx.bind(func.name.clone(), slot);
        ctx.bind("result", slot);
    }

    body.lower(&mut ctx)?;

    if !is_terminated(&ctx) {
        build_function_return(&mut ctx)?;
    }

    // Soft errors leave holes in the IR; verification would only repeat them.
    if ctx.codegen.diagnostics.is_empty() && !function.verify(false) {
        return Err(CodeGenError::Internal {
            message: format!("routine `{}` failed verification", func.signature()),
            loc: Some(func.loc.clone()),
        });
    }
    Ok(())
}

/// Returns from the current routine: the value in the result slot for a
/// function, nothing for a procedure.
pub(super) fn build_function_return(ctx: &mut CodeGenCtx<'_, '_>) -> Result<(), CodeGenError> {
    let Some(func) = ctx.env.function else {
        return Err(CodeGenError::internal("return outside of a routine"));
    };
    if func.is_procedure {
        ctx.codegen.builder.build_return(None)?;
        return Ok(());
    }
    let slot = ctx
        .result_slot()
        .ok_or_else(|| CodeGenError::internal(format!("`{}` has no result slot", func.name)))?;
    let layout = ctx.codegen.llvm_type(&func.return_type)?;
    let value = ctx.codegen.builder.build_load(layout, slot, "retval")?;
    ctx.codegen.builder.build_return(Some(&value))?;
    Ok(())
}
