// In src/codegen/globals.rs

use super::CodeGen;
use crate::analyzer::symbols::STANDARD_HANDLES;
use crate::analyzer::types::Type;
use crate::ast::{Node, NodeKind, Unit, UnaryOperator, VariableDefinition};
use crate::reporter::CodeGenError;
use inkwell::module::Linkage;
use inkwell::values::BasicValueEnum;

/// Pass 1: one IR global per unit-level variable.
///
/// The standard stream handles are external symbols provided by libc.
/// Literal initializers become the global's initial value; anything else is
/// queued and evaluated at the start of the entry function.
pub(super) fn generate_globals(codegen: &mut CodeGen, unit: &Unit) {
    for var in unit.symbols.variables() {
        if let Err(err) = generate_single_global(codegen, var) {
            codegen.diagnostics.push(err.into());
        }
    }
}

fn generate_single_global(codegen: &mut CodeGen, var: &VariableDefinition) -> Result<(), CodeGenError> {
    if STANDARD_HANDLES.contains(&var.name.as_str()) {
        let global = codegen.module.add_global(codegen.ptr_type(), None, &var.name);
        global.set_linkage(Linkage::External);
        codegen.globals.insert(var.name.clone(), global);
        return Ok(());
    }

    let layout = codegen.llvm_type(&var.ty)?;
    let global = codegen.module.add_global(layout, None, &var.name);

    let initial = match &var.initializer {
        Some(initializer) => {
            let value = generate_const_expression(codegen, initializer, &var.ty)?;
            if value.is_none() {
                log::debug!("initializer of `{}` is evaluated at startup", var.name);
                codegen.deferred_initializers.push(var.name.clone());
            }
            value
        }
        None => None,
    };

    match initial {
        Some(value) => {
            global.set_initializer(&value);
            if var.is_constant && var.ty.is_simple() {
                global.set_constant(true);
                global.set_linkage(Linkage::Private);
            }
        }
        None => global.set_initializer(&layout.const_zero()),
    }

    codegen.globals.insert(var.name.clone(), global);
    Ok(())
}

/// The compile-time value of a literal initializer stored into a `ty` slot,
/// or `None` when it has to be computed at run time.
fn generate_const_expression<'ctx>(
    codegen: &mut CodeGen<'ctx>,
    expr: &Node,
    ty: &Type,
) -> Result<Option<BasicValueEnum<'ctx>>, CodeGenError> {
    let value: BasicValueEnum<'ctx> = match (&expr.kind, ty) {
        (_, Type::Integer { width }) => match expr.constant_int().or_else(|| expr.char_value().map(i64::from)) {
            Some(value) => codegen.context.custom_width_int_type(*width).const_int(value as u64, true).into(),
            None => return Ok(None),
        },
        (_, Type::Float { .. }) => {
            let Some(value) = constant_real(expr) else { return Ok(None) };
            codegen.llvm_type(ty)?.into_float_type().const_float(value).into()
        }
        (NodeKind::BoolLiteral(value), Type::Boolean) => {
            codegen.context.bool_type().const_int(u64::from(*value), false).into()
        }
        (NodeKind::NilLiteral, Type::Pointer(_) | Type::File(_)) => codegen.ptr_type().const_null().into(),
        (NodeKind::StringLiteral(text), Type::String) => {
            let bytes = codegen.string_bytes(text);
            let header_type = codegen.string_header_type()?;
            let i64_type = codegen.context.i64_type();
            header_type
                .const_named_struct(&[
                    i64_type.const_zero().into(),
                    i64_type.const_int(text.len() as u64, false).into(),
                    bytes.as_pointer_value().into(),
                ])
                .into()
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn constant_real(expr: &Node) -> Option<f64> {
    match &expr.kind {
        NodeKind::RealLiteral(value) => Some(*value),
        NodeKind::Unary { op: UnaryOperator::Neg, operand } => constant_real(operand).map(|v| -v),
        _ => expr.constant_int().map(|v| v as f64),
    }
}
