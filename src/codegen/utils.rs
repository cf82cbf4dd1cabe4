// In src/codegen/utils.rs

use super::CodeGenCtx;
use crate::analyzer::types::Type;
use crate::ast::ComparisonOperator;
use crate::reporter::CodeGenError;
use inkwell::types::BasicType;
use inkwell::values::{BasicValueEnum, IntValue, PointerValue};
use inkwell::{FloatPredicate, IntPredicate};

/// Creates an `alloca` at the top of the current function's entry block,
/// where mem2reg can promote it.
pub(super) fn create_entry_block_alloca<'ctx, T: BasicType<'ctx>>(
    name: &str,
    ty: T,
    ctx: &CodeGenCtx<'_, 'ctx>,
) -> Result<PointerValue<'ctx>, CodeGenError> {
    let builder = ctx.codegen.context.create_builder();
    let entry_block = ctx
        .current_function
        .and_then(|f| f.get_first_basic_block())
        .ok_or_else(|| CodeGenError::internal(format!("no entry block to allocate `{}` in", name)))?;

    match entry_block.get_first_instruction() {
        Some(first_instr) => builder.position_before(&first_instr),
        None => builder.position_at_end(entry_block),
    }

    Ok(builder.build_alloca(ty, name)?)
}

/// A zero-initialized stack slot for a value of type `ty`.
pub(super) fn create_slot<'ctx>(
    name: &str,
    ty: &Type,
    ctx: &mut CodeGenCtx<'_, 'ctx>,
) -> Result<PointerValue<'ctx>, CodeGenError> {
    let layout = ctx.codegen.llvm_type(ty)?;
    let slot = create_entry_block_alloca(name, layout, ctx)?;
    ctx.codegen.builder.build_store(slot, layout.const_zero())?;
    Ok(slot)
}

pub(super) fn int_predicate(op: ComparisonOperator) -> IntPredicate {
    match op {
        ComparisonOperator::Eq => IntPredicate::EQ,
        ComparisonOperator::NotEq => IntPredicate::NE,
        ComparisonOperator::Gt => IntPredicate::SGT,
        ComparisonOperator::GtEq => IntPredicate::SGE,
        ComparisonOperator::Lt => IntPredicate::SLT,
        ComparisonOperator::LtEq => IntPredicate::SLE,
    }
}

pub(super) fn float_predicate(op: ComparisonOperator) -> FloatPredicate {
    match op {
        ComparisonOperator::Eq => FloatPredicate::OEQ,
        ComparisonOperator::NotEq => FloatPredicate::ONE,
        ComparisonOperator::Gt => FloatPredicate::OGT,
        ComparisonOperator::GtEq => FloatPredicate::OGE,
        ComparisonOperator::Lt => FloatPredicate::OLT,
        ComparisonOperator::LtEq => FloatPredicate::OLE,
    }
}

/// Sign-extends the narrower of two integers so both have the wider width.
pub(super) fn unify_int_widths<'ctx>(
    lhs: IntValue<'ctx>,
    rhs: IntValue<'ctx>,
    ctx: &CodeGenCtx<'_, 'ctx>,
) -> Result<(IntValue<'ctx>, IntValue<'ctx>), CodeGenError> {
    let (l_width, r_width) = (lhs.get_type().get_bit_width(), rhs.get_type().get_bit_width());
    let builder = &ctx.codegen.builder;
    if l_width == r_width {
        return Ok((lhs, rhs));
    }
    log::trace!("widening i{} and i{} to i{}", l_width, r_width, l_width.max(r_width));
    if l_width < r_width {
        Ok((builder.build_int_cast_sign_flag(lhs, rhs.get_type(), true, "widen")?, rhs))
    } else {
        Ok((lhs, builder.build_int_cast_sign_flag(rhs, lhs.get_type(), true, "widen")?))
    }
}

/// Converts a simple value of type `from` into the representation of `to`:
/// integer width changes, integer to float, float width changes.
pub(super) fn coerce<'ctx>(
    value: BasicValueEnum<'ctx>,
    from: &Type,
    to: &Type,
    ctx: &mut CodeGenCtx<'_, 'ctx>,
) -> Result<BasicValueEnum<'ctx>, CodeGenError> {
    match (from, to) {
        (Type::Integer { width: a }, Type::Integer { width: b }) if a != b => {
            let target = ctx.codegen.context.custom_width_int_type(*b);
            let builder = &ctx.codegen.builder;
            Ok(builder.build_int_cast_sign_flag(value.into_int_value(), target, true, "intcast")?.into())
        }
        (Type::Integer { .. }, Type::Float { .. }) => {
            let target = ctx.codegen.llvm_type(to)?.into_float_type();
            let builder = &ctx.codegen.builder;
            Ok(builder.build_signed_int_to_float(value.into_int_value(), target, "itofp")?.into())
        }
        (Type::Float { width: a }, Type::Float { width: b }) if a != b => {
            let target = ctx.codegen.llvm_type(to)?.into_float_type();
            let builder = &ctx.codegen.builder;
            Ok(builder.build_float_cast(value.into_float_value(), target, "fpcast")?.into())
        }
        _ => Ok(value),
    }
}

/// Copies `size_of(ty)` bytes from `src` to `dst`.
pub(super) fn copy_aggregate<'ctx>(
    dst: PointerValue<'ctx>,
    src: PointerValue<'ctx>,
    ty: &Type,
    ctx: &mut CodeGenCtx<'_, 'ctx>,
) -> Result<(), CodeGenError> {
    let layout = ctx.codegen.llvm_type(ty)?;
    let size = layout
        .size_of()
        .ok_or_else(|| CodeGenError::internal(format!("type `{}` has no size", ty)))?;
    ctx.codegen
        .builder
        .build_memcpy(dst, 1, src, 1, size)
        .map_err(|e| CodeGenError::internal(e.to_string()))?;
    Ok(())
}

/// Stores `value` (of type `from`) into a slot of type `to`. Aggregates are
/// copied byte-wise from the address `value` holds.
pub(super) fn store_value<'ctx>(
    slot: PointerValue<'ctx>,
    to: &Type,
    value: BasicValueEnum<'ctx>,
    from: &Type,
    ctx: &mut CodeGenCtx<'_, 'ctx>,
) -> Result<(), CodeGenError> {
    if !to.is_simple() {
        return copy_aggregate(slot, value.into_pointer_value(), to, ctx);
    }
    let value = coerce(value, from, to, ctx)?;
    ctx.codegen.builder.build_store(slot, value)?;
    Ok(())
}

/// Loads the value of a slot. Aggregates are represented by their address,
/// so for them the slot itself is the value.
pub(super) fn load_value<'ctx>(
    slot: PointerValue<'ctx>,
    ty: &Type,
    name: &str,
    ctx: &mut CodeGenCtx<'_, 'ctx>,
) -> Result<BasicValueEnum<'ctx>, CodeGenError> {
    if !ty.is_simple() {
        return Ok(slot.into());
    }
    let layout = ctx.codegen.llvm_type(ty)?;
    Ok(ctx.codegen.builder.build_load(layout, slot, name)?)
}

/// Whether the block the builder is positioned in already ends in a terminator.
pub(super) fn is_terminated(ctx: &CodeGenCtx<'_, '_>) -> bool {
    ctx.codegen
        .builder
        .get_insert_block()
        .is_none_or(|block| block.get_terminator().is_some())
}

/// Continues emission in a fresh block after an unconditional jump, return or
/// `unreachable`. Statements that follow land there and are dead.
pub(super) fn start_dead_block(ctx: &mut CodeGenCtx<'_, '_>, name: &str) -> Result<(), CodeGenError> {
    let function = ctx.function()?;
    let block = ctx.codegen.context.append_basic_block(function, name);
    ctx.codegen.builder.position_at_end(block);
    Ok(())
}

/// Converts an integer index to `i64` for address arithmetic.
pub(super) fn index_to_i64<'ctx>(
    index: IntValue<'ctx>,
    ctx: &CodeGenCtx<'_, 'ctx>,
) -> Result<IntValue<'ctx>, CodeGenError> {
    let i64_type = ctx.codegen.context.i64_type();
    if index.get_type().get_bit_width() == 64 {
        return Ok(index);
    }
    Ok(ctx.codegen.builder.build_int_cast_sign_flag(index, i64_type, true, "idx")?)
}
