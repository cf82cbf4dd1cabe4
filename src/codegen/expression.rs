// In src/codegen/expression.rs

use super::lvalue::LowerAddress;
use super::runtime::{append_char, concat_strings, string_data, string_literal};
use super::utils::{
    coerce, copy_aggregate, create_entry_block_alloca, create_slot, float_predicate, int_predicate, load_value,
    unify_int_widths,
};
use super::{statement, system, CodeGenCtx, Lower};
use crate::analyzer::resolve::{binary_result_type, comparison_operand_types};
use crate::analyzer::types::Type;
use crate::ast::{BinaryOperator, ComparisonOperator, Node, NodeKind, UnaryOperator};
use crate::reporter::CodeGenError;
use inkwell::values::{BasicMetadataValueEnum, BasicValue, BasicValueEnum};

impl<'a, 'ctx> Lower<'a, 'ctx> for Node {
    /// `None` when the node produces no value: procedure calls, statements,
    /// and nodes whose lowering recorded a soft error.
    type Output = Option<BasicValueEnum<'ctx>>;

    fn lower(&'a self, ctx: &mut CodeGenCtx<'a, 'ctx>) -> Result<Self::Output, CodeGenError> {
        match &self.kind {
            NodeKind::IntLiteral(_)
            | NodeKind::RealLiteral(_)
            | NodeKind::BoolLiteral(_)
            | NodeKind::StringLiteral(_)
            | NodeKind::CharLiteral(_)
            | NodeKind::NilLiteral => lower_literal(self, ctx).map(Some),

            NodeKind::Variable(_)
            | NodeKind::ArrayAccess { .. }
            | NodeKind::FieldAccess { .. }
            | NodeKind::Dereference(_) => {
                let ty = self.resolve_type(&ctx.env);
                let Some(slot) = self.lower_address(ctx)? else { return Ok(None) };
                Ok(Some(load_value(slot, &ty, "load", ctx)?))
            }

            NodeKind::AddressOf(target) => Ok(target.lower_address(ctx)?.map(|p| p.as_basic_value_enum())),

            NodeKind::Unary { op, operand } => lower_unary(*op, operand, ctx),
            NodeKind::Binary { op, lhs, rhs } => lower_binary(*op, lhs, rhs, self, ctx),
            NodeKind::Comparison { op, lhs, rhs } => lower_comparison(*op, lhs, rhs, self, ctx),

            NodeKind::Call { name, args } => lower_call(name, args, self, ctx),
            NodeKind::SystemCall { function, args, source_text } => {
                system::lower_system_call(*function, args, source_text.as_deref(), self, ctx)
            }

            NodeKind::Assignment { .. }
            | NodeKind::Block(_)
            | NodeKind::If { .. }
            | NodeKind::While { .. }
            | NodeKind::For { .. }
            | NodeKind::Repeat { .. }
            | NodeKind::Break
            | NodeKind::Continue => {
                statement::lower_statement(self, ctx)?;
                Ok(None)
            }
        }
    }
}

fn lower_literal<'ctx>(node: &Node, ctx: &mut CodeGenCtx<'_, 'ctx>) -> Result<BasicValueEnum<'ctx>, CodeGenError> {
    let context = ctx.codegen.context;
    let value: BasicValueEnum<'ctx> = match &node.kind {
        NodeKind::IntLiteral(value) => {
            let width = node.resolve_type(&ctx.env).integer_width().unwrap_or(64);
            context.custom_width_int_type(width).const_int(*value as u64, true).into()
        }
        NodeKind::RealLiteral(value) => context.f64_type().const_float(*value).into(),
        NodeKind::BoolLiteral(value) => context.bool_type().const_int(u64::from(*value), false).into(),
        NodeKind::CharLiteral(code) => context.i8_type().const_int(u64::from(*code), false).into(),
        NodeKind::NilLiteral => ctx.codegen.ptr_type().const_null().into(),
        NodeKind::StringLiteral(text) => string_literal(text, ctx)?.into(),
        _ => {
            return Err(CodeGenError::Internal {
                message: "not a literal".into(),
                loc: Some(node.loc.clone()),
            });
        }
    };
    Ok(value)
}

/// Lowers `node` as a value of `ty`, the type it was resolved to in its
/// context. A one-character quoted literal resolved as a character lowers
/// to an `i8` constant instead of a string header.
pub(super) fn lower_as<'a, 'ctx>(
    node: &'a Node,
    ty: &Type,
    ctx: &mut CodeGenCtx<'a, 'ctx>,
) -> Result<Option<BasicValueEnum<'ctx>>, CodeGenError> {
    match node.char_value() {
        Some(code) if *ty == Type::integer(8) => {
            Ok(Some(ctx.codegen.context.i8_type().const_int(u64::from(code), false).into()))
        }
        _ => node.lower(ctx),
    }
}

fn lower_unary<'a, 'ctx>(
    op: UnaryOperator,
    operand: &'a Node,
    ctx: &mut CodeGenCtx<'a, 'ctx>,
) -> Result<Option<BasicValueEnum<'ctx>>, CodeGenError> {
    let Some(value) = operand.lower(ctx)? else { return Ok(None) };
    let builder = &ctx.codegen.builder;
    let result: BasicValueEnum<'ctx> = match (op, value) {
        (UnaryOperator::Neg, BasicValueEnum::FloatValue(v)) => builder.build_float_neg(v, "fneg")?.into(),
        (UnaryOperator::Neg, BasicValueEnum::IntValue(v)) => builder.build_int_neg(v, "neg")?.into(),
        // Bitwise on integers, logical on i1.
        (UnaryOperator::Not, BasicValueEnum::IntValue(v)) => builder.build_not(v, "not")?.into(),
        _ => {
            return Err(CodeGenError::Internal {
                message: format!("unary operator {:?} on a non-scalar operand", op),
                loc: Some(operand.loc.clone()),
            });
        }
    };
    Ok(Some(result))
}

fn lower_binary<'a, 'ctx>(
    op: BinaryOperator,
    lhs: &'a Node,
    rhs: &'a Node,
    node: &Node,
    ctx: &mut CodeGenCtx<'a, 'ctx>,
) -> Result<Option<BasicValueEnum<'ctx>>, CodeGenError> {
    use BinaryOperator::*;

    let (l_ty, r_ty) = (lhs.resolve_type(&ctx.env), rhs.resolve_type(&ctx.env));
    // Both sides are lowered even when one fails, so errors in each are reported.
    let (l_val, r_val) = (lhs.lower(ctx)?, rhs.lower(ctx)?);
    let (Some(l_val), Some(r_val)) = (l_val, r_val) else { return Ok(None) };

    let value: BasicValueEnum<'ctx> = match (op, &l_ty, &r_ty) {
        (Add, Type::String, Type::String) => {
            concat_strings(l_val.into_pointer_value(), r_val.into_pointer_value(), ctx)?.into()
        }
        (Add, Type::String, Type::Integer { .. }) => {
            append_char(l_val.into_pointer_value(), r_val.into_int_value(), ctx)?.into()
        }

        // Both sides are always evaluated.
        (And | Or | Xor, Type::Boolean, Type::Boolean) => {
            let (l, r) = (l_val.into_int_value(), r_val.into_int_value());
            let builder = &ctx.codegen.builder;
            match op {
                And => builder.build_and(l, r, "and")?.into(),
                Or => builder.build_or(l, r, "or")?.into(),
                _ => builder.build_xor(l, r, "xor")?.into(),
            }
        }

        (Divide, l, r) if l.is_numeric() && r.is_numeric() => {
            let f64_ty = Type::float64();
            let l = coerce(l_val, l, &f64_ty, ctx)?.into_float_value();
            let r = coerce(r_val, r, &f64_ty, ctx)?.into_float_value();
            ctx.codegen.builder.build_float_div(l, r, "fdiv")?.into()
        }

        (_, Type::Integer { .. }, Type::Integer { .. }) => {
            let (l, r) = unify_int_widths(l_val.into_int_value(), r_val.into_int_value(), ctx)?;
            let builder = &ctx.codegen.builder;
            match op {
                Add => builder.build_int_add(l, r, "add")?,
                Sub => builder.build_int_sub(l, r, "sub")?,
                Mul => builder.build_int_mul(l, r, "mul")?,
                IntDiv => builder.build_int_signed_div(l, r, "div")?,
                Mod => builder.build_int_signed_rem(l, r, "mod")?,
                And => builder.build_and(l, r, "and")?,
                Or => builder.build_or(l, r, "or")?,
                Xor => builder.build_xor(l, r, "xor")?,
                Shl => builder.build_left_shift(l, r, "shl")?,
                Shr => builder.build_right_shift(l, r, false, "shr")?,
                Divide => return Err(CodeGenError::internal("integer operands of `/` are converted to floats")),
            }
            .into()
        }

        (Add | Sub | Mul, l, r) if l.is_numeric() && r.is_numeric() => {
            let result_ty = binary_result_type(op, l, r);
            let lf = coerce(l_val, l, &result_ty, ctx)?.into_float_value();
            let rf = coerce(r_val, r, &result_ty, ctx)?.into_float_value();
            let builder = &ctx.codegen.builder;
            match op {
                Add => builder.build_float_add(lf, rf, "fadd")?,
                Sub => builder.build_float_sub(lf, rf, "fsub")?,
                _ => builder.build_float_mul(lf, rf, "fmul")?,
            }
            .into()
        }

        _ => {
            return Err(CodeGenError::Internal {
                message: format!("operator `{}` on `{}` and `{}`", op.symbol(), l_ty, r_ty),
                loc: Some(node.loc.clone()),
            });
        }
    };
    Ok(Some(value))
}

fn lower_comparison<'a, 'ctx>(
    op: ComparisonOperator,
    lhs: &'a Node,
    rhs: &'a Node,
    node: &Node,
    ctx: &mut CodeGenCtx<'a, 'ctx>,
) -> Result<Option<BasicValueEnum<'ctx>>, CodeGenError> {
    let (l_ty, r_ty) = comparison_operand_types(lhs, rhs, &ctx.env);
    let (l_val, r_val) = (lower_as(lhs, &l_ty, ctx)?, lower_as(rhs, &r_ty, ctx)?);
    let (Some(l_val), Some(r_val)) = (l_val, r_val) else { return Ok(None) };
    let i64_type = ctx.codegen.context.i64_type();
    let i32_type = ctx.codegen.context.i32_type();

    let result = match (&l_ty, &r_ty) {
        (Type::Integer { .. }, Type::Integer { .. }) => {
            let (l, r) = unify_int_widths(l_val.into_int_value(), r_val.into_int_value(), ctx)?;
            ctx.codegen.builder.build_int_compare(int_predicate(op), l, r, "cmp")?
        }
        (l, r) if l.is_numeric() && r.is_numeric() => {
            let f64_ty = Type::float64();
            let lf = coerce(l_val, l, &f64_ty, ctx)?.into_float_value();
            let rf = coerce(r_val, r, &f64_ty, ctx)?.into_float_value();
            ctx.codegen.builder.build_float_compare(float_predicate(op), lf, rf, "fcmp")?
        }
        // false < true
        (Type::Boolean, Type::Boolean) => {
            let builder = &ctx.codegen.builder;
            let l = builder.build_int_z_extend(l_val.into_int_value(), i32_type, "bool")?;
            let r = builder.build_int_z_extend(r_val.into_int_value(), i32_type, "bool")?;
            builder.build_int_compare(int_predicate(op), l, r, "cmp")?
        }
        (Type::Pointer(_) | Type::File(_), Type::Pointer(_) | Type::File(_)) => {
            let builder = &ctx.codegen.builder;
            let l = builder.build_ptr_to_int(l_val.into_pointer_value(), i64_type, "addr")?;
            let r = builder.build_ptr_to_int(r_val.into_pointer_value(), i64_type, "addr")?;
            builder.build_int_compare(int_predicate(op), l, r, "cmp")?
        }
        _ => {
            return Err(CodeGenError::Internal {
                message: format!("comparison `{}` on `{}` and `{}`", op.symbol(), l_ty, r_ty),
                loc: Some(node.loc.clone()),
            });
        }
    };
    Ok(Some(result.into()))
}

fn lower_call<'a, 'ctx>(
    name: &str,
    args: &'a [Node],
    node: &Node,
    ctx: &mut CodeGenCtx<'a, 'ctx>,
) -> Result<Option<BasicValueEnum<'ctx>>, CodeGenError> {
    let unit = ctx.env.unit;
    let (resolved, arg_types) = ctx.env.resolve_call(name, args);
    // A lone routine called with the wrong number of arguments is still
    // found, so the arity check below can name the mismatch.
    let resolved = resolved.or_else(|| {
        let mut named = unit.symbols.functions_named(name);
        match (named.next(), named.next()) {
            (Some(only), None) if only.params.len() != args.len() => Some(only),
            _ => None,
        }
    });
    let Some(func) = resolved else {
        // The arguments may hold errors of their own.
        for arg in args {
            arg.lower(ctx)?;
        }
        return ctx.soft_error(CodeGenError::UnresolvedReference {
            kind: "function",
            name: name.to_string(),
            loc: node.loc.clone(),
        });
    };

    let arity_ok = if func.is_variadic {
        args.len() >= func.params.len()
    } else {
        args.len() == func.params.len()
    };
    if !arity_ok {
        return ctx.soft_error(CodeGenError::ArgumentCountMismatch {
            name: name.to_string(),
            expected: func.params.len(),
            found: args.len(),
            loc: node.loc.clone(),
        });
    }

    let signature = func.signature();
    let Some(function) = ctx.codegen.functions.get(&signature).copied() else {
        return Err(CodeGenError::Internal {
            message: format!("routine `{}` was never declared", signature),
            loc: Some(node.loc.clone()),
        });
    };

    // Every argument is lowered before giving up on a failed one.
    let mut values: Vec<BasicMetadataValueEnum<'ctx>> = Vec::with_capacity(args.len());
    let mut complete = true;
    for (position, (arg, arg_ty)) in args.iter().zip(&arg_types).enumerate() {
        let param = func.params.get(position);
        let value: Option<BasicMetadataValueEnum<'ctx>> = match param {
            Some(param) if param.is_reference => arg.lower_address(ctx)?.map(Into::into),
            // By-value aggregates travel as the address of a private copy.
            Some(param) if !param.ty.is_simple() => match arg.lower(ctx)? {
                Some(value) => {
                    let copy = create_slot("arg.copy", &param.ty, ctx)?;
                    copy_aggregate(copy, value.into_pointer_value(), &param.ty, ctx)?;
                    Some(copy.into())
                }
                None => None,
            },
            Some(param) => match lower_as(arg, arg_ty, ctx)? {
                Some(value) if matches!(param.ty, Type::Pointer(_)) && *arg_ty == Type::String => {
                    Some(string_data(value.into_pointer_value(), ctx)?.into())
                }
                Some(value) => Some(coerce(value, arg_ty, &param.ty, ctx)?.into()),
                None => None,
            },
            None => match arg.lower(ctx)? {
                Some(value) => Some(promote_vararg(value, arg_ty, ctx)?.into()),
                None => None,
            },
        };
        match value {
            Some(value) => values.push(value),
            None => complete = false,
        }
    }
    if !complete {
        return Ok(None);
    }

    log::trace!("call `{}` with {} argument(s)", signature, values.len());
    let call_name = if func.is_procedure { "" } else { "call" };
    let call = ctx.codegen.builder.build_call(function, &values, call_name)?;
    let Some(result) = call.try_as_basic_value().left() else {
        return Ok(None);
    };

    // Aggregate results come back by value; spill them so they are addressable.
    if !func.return_type.is_simple() {
        let spill = create_entry_block_alloca("call.result", result.get_type(), ctx)?;
        ctx.codegen.builder.build_store(spill, result)?;
        return Ok(Some(spill.into()));
    }
    Ok(Some(result))
}

/// The C default argument promotions, applied to variadic extras: narrow
/// integers and booleans widen to `i32`, `single` widens to `double`, and a
/// string passes its character data.
pub(super) fn promote_vararg<'ctx>(
    value: BasicValueEnum<'ctx>,
    ty: &Type,
    ctx: &mut CodeGenCtx<'_, 'ctx>,
) -> Result<BasicValueEnum<'ctx>, CodeGenError> {
    let i32_type = ctx.codegen.context.i32_type();
    match ty {
        Type::Integer { width } if *width < 32 => {
            Ok(ctx.codegen.builder.build_int_s_extend(value.into_int_value(), i32_type, "promote")?.into())
        }
        Type::Boolean => Ok(ctx.codegen.builder.build_int_z_extend(value.into_int_value(), i32_type, "promote")?.into()),
        Type::Float { width: 32 } => coerce(value, ty, &Type::float64(), ctx),
        Type::String => Ok(string_data(value.into_pointer_value(), ctx)?.into()),
        _ => Ok(value),
    }
}
