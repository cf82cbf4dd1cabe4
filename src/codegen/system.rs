// In src/codegen/system.rs

//! Lowering of the built-in routines. Each one has its own shape; none of
//! them goes through ordinary call resolution.

use super::expression::{lower_as, promote_vararg};
use super::function::build_function_return;
use super::lvalue::LowerAddress;
use super::runtime::{
    array_length, build_process_exit, call_libc, resize_array, resize_string, string_data, string_length, LibC,
};
use super::utils::{coerce, start_dead_block, store_value};
use super::{CodeGenCtx, Lower};
use crate::analyzer::types::Type;
use crate::ast::{Node, NodeKind, SystemFunction};
use crate::reporter::CodeGenError;
use inkwell::types::BasicType;
use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, IntValue};

type Lowered<'ctx> = Result<Option<BasicValueEnum<'ctx>>, CodeGenError>;

pub(super) fn lower_system_call<'a, 'ctx>(
    function: SystemFunction,
    args: &'a [Node],
    source_text: Option<&str>,
    node: &Node,
    ctx: &mut CodeGenCtx<'a, 'ctx>,
) -> Lowered<'ctx> {
    log::trace!("lowering built-in `{}` with {} argument(s)", function.name(), args.len());
    match function {
        SystemFunction::Write => lower_write(args, false, node, ctx),
        SystemFunction::Writeln => lower_write(args, true, node, ctx),
        SystemFunction::Printf => lower_printf(args, node, ctx),
        SystemFunction::Exit => lower_exit(args.first(), ctx),
        SystemFunction::Halt => {
            let code = exit_code(args.first(), ctx)?;
            build_process_exit(code, ctx)?;
            start_dead_block(ctx, "after.halt")?;
            Ok(None)
        }
        SystemFunction::Low | SystemFunction::High => {
            lower_bound(function == SystemFunction::High, first_arg(args, node)?, ctx)
        }
        SystemFunction::Length => lower_length(first_arg(args, node)?, node, ctx),
        SystemFunction::SetLength => lower_setlength(args, node, ctx),
        SystemFunction::PChar => {
            let Some(string) = first_arg(args, node)?.lower(ctx)? else { return Ok(None) };
            Ok(Some(string_data(string.into_pointer_value(), ctx)?.into()))
        }
        SystemFunction::New => lower_new(first_arg(args, node)?, node, ctx),
        SystemFunction::Assert => lower_assert(first_arg(args, node)?, source_text, node, ctx),
    }
}

fn first_arg<'a>(args: &'a [Node], node: &Node) -> Result<&'a Node, CodeGenError> {
    args.first().ok_or_else(|| CodeGenError::Internal {
        message: "built-in called without its argument".into(),
        loc: Some(node.loc.clone()),
    })
}

fn truncate_to_i32<'ctx>(value: IntValue<'ctx>, ctx: &CodeGenCtx<'_, 'ctx>) -> Result<IntValue<'ctx>, CodeGenError> {
    let i32_type = ctx.codegen.context.i32_type();
    Ok(ctx.codegen.builder.build_int_truncate_or_bit_cast(value, i32_type, "len32")?)
}

/// `write`/`writeln`: one `printf` (or `fprintf` when the first argument is a
/// file) whose format is assembled from the static argument types.
fn lower_write<'a, 'ctx>(args: &'a [Node], newline: bool, node: &Node, ctx: &mut CodeGenCtx<'a, 'ctx>) -> Lowered<'ctx> {
    let (stream, printed) = match args.split_first() {
        Some((first, rest)) if matches!(first.resolve_type(&ctx.env), Type::File(_)) => {
            let Some(stream) = first.lower(ctx)? else { return Ok(None) };
            (Some(stream), rest)
        }
        _ => (None, args),
    };

    let i32_type = ctx.codegen.context.i32_type();
    let mut format = String::new();
    let mut values: Vec<BasicMetadataValueEnum<'ctx>> = Vec::new();
    let mut complete = true;
    for arg in printed {
        let ty = arg.resolve_type(&ctx.env);
        let Some(value) = arg.lower(ctx)? else {
            complete = false;
            continue;
        };
        match (&arg.kind, &ty) {
            // `char` values print as characters.
            (NodeKind::CharLiteral(_), _) | (_, Type::Integer { width: 8 }) => {
                format.push_str("%c");
                values.push(ctx.codegen.builder.build_int_s_extend(value.into_int_value(), i32_type, "ch")?.into());
            }
            (_, Type::Integer { width }) if *width <= 32 => {
                format.push_str("%d");
                values.push(coerce(value, &ty, &Type::int32(), ctx)?.into());
            }
            (_, Type::Integer { .. }) => {
                format.push_str("%lld");
                values.push(value.into());
            }
            (_, Type::Boolean) => {
                format.push_str("%s");
                let yes = ctx.codegen.string_bytes("TRUE").as_pointer_value();
                let no = ctx.codegen.string_bytes("FALSE").as_pointer_value();
                let text = ctx.codegen.builder.build_select(value.into_int_value(), yes, no, "bool.text")?;
                values.push(text.into());
            }
            (_, Type::Float { .. }) => {
                format.push_str("%f");
                values.push(coerce(value, &ty, &Type::float64(), ctx)?.into());
            }
            (_, Type::String) => {
                format.push_str("%.*s");
                let header = value.into_pointer_value();
                let len = string_length(header, ctx)?;
                values.push(truncate_to_i32(len, ctx)?.into());
                values.push(string_data(header, ctx)?.into());
            }
            (_, Type::Pointer(_) | Type::File(_)) => {
                format.push_str("%p");
                values.push(value.into());
            }
            _ => {
                return Err(CodeGenError::Internal {
                    message: format!("cannot print a value of type `{}`", ty),
                    loc: Some(arg.loc.clone()),
                });
            }
        }
    }
    if !complete {
        return Ok(None);
    }
    if newline {
        format.push('\n');
    }
    if format.is_empty() {
        return Ok(None);
    }

    let format = ctx.codegen.string_bytes(&format).as_pointer_value();
    match stream {
        Some(stream) => {
            let mut call_args = vec![stream.into(), format.into()];
            call_args.extend(values);
            call_libc(LibC::Fprintf, &call_args, ctx)?;
        }
        None => {
            let mut call_args = vec![format.into()];
            call_args.extend(values);
            call_libc(LibC::Printf, &call_args, ctx)?;
        }
    }
    log::trace!("lowered {} at {}:{}", if newline { "writeln" } else { "write" }, node.loc.row, node.loc.col);
    Ok(None)
}

/// `printf(fmt, ...)` straight to libc. A string format passes its data.
fn lower_printf<'a, 'ctx>(args: &'a [Node], node: &Node, ctx: &mut CodeGenCtx<'a, 'ctx>) -> Lowered<'ctx> {
    let format_node = first_arg(args, node)?;
    let format_ty = format_node.resolve_type(&ctx.env);
    let Some(format) = format_node.lower(ctx)? else { return Ok(None) };
    let format = match format_ty {
        Type::String => string_data(format.into_pointer_value(), ctx)?,
        _ => format.into_pointer_value(),
    };

    let mut call_args: Vec<BasicMetadataValueEnum<'ctx>> = vec![format.into()];
    for arg in &args[1..] {
        let ty = arg.resolve_type(&ctx.env);
        let Some(value) = arg.lower(ctx)? else { return Ok(None) };
        call_args.push(promote_vararg(value, &ty, ctx)?.into());
    }
    call_libc(LibC::Printf, &call_args, ctx)
}

/// An `i32` process exit code from an optional integer argument.
fn exit_code<'a, 'ctx>(arg: Option<&'a Node>, ctx: &mut CodeGenCtx<'a, 'ctx>) -> Result<IntValue<'ctx>, CodeGenError> {
    let i32_type = ctx.codegen.context.i32_type();
    let Some(arg) = arg else { return Ok(i32_type.const_zero()) };
    let ty = arg.resolve_type(&ctx.env);
    match arg.lower(ctx)? {
        Some(value) => Ok(coerce(value, &ty, &Type::int32(), ctx)?.into_int_value()),
        None => Ok(i32_type.const_zero()),
    }
}

/// `exit` leaves the current routine, storing its argument as the result
/// first. Outside a routine it terminates the process.
fn lower_exit<'a, 'ctx>(arg: Option<&'a Node>, ctx: &mut CodeGenCtx<'a, 'ctx>) -> Lowered<'ctx> {
    match ctx.env.function {
        Some(func) => {
            if let Some(arg) = arg {
                let from = arg.resolve_type_for(&func.return_type, &ctx.env);
                let Some(value) = lower_as(arg, &from, ctx)? else { return Ok(None) };
                let slot = ctx
                    .result_slot()
                    .ok_or_else(|| CodeGenError::internal(format!("`{}` has no result slot", func.name)))?;
                store_value(slot, &func.return_type, value, &from, ctx)?;
            }
            build_function_return(ctx)?;
        }
        None => {
            let code = exit_code(arg, ctx)?;
            build_process_exit(code, ctx)?;
        }
    }
    start_dead_block(ctx, "after.exit")?;
    Ok(None)
}

/// `low(a)` / `high(a)`: constants for fixed arrays, `0` and `length - 1`
/// for dynamic ones.
fn lower_bound<'a, 'ctx>(high: bool, array: &'a Node, ctx: &mut CodeGenCtx<'a, 'ctx>) -> Lowered<'ctx> {
    let i32_type = ctx.codegen.context.i32_type();
    let ty = array.resolve_type(&ctx.env);
    let Some(array_ty) = ty.as_array() else {
        return Err(CodeGenError::Internal {
            message: format!("bounds of a value of type `{}`", ty),
            loc: Some(array.loc.clone()),
        });
    };
    match (array_ty.bounds, high) {
        (Some((low, _)), false) => Ok(Some(i32_type.const_int(low as u64, true).into())),
        (Some((_, high)), true) => Ok(Some(i32_type.const_int(high as u64, true).into())),
        (None, false) => Ok(Some(i32_type.const_zero().into())),
        (None, true) => {
            let Some(header) = array.lower(ctx)? else { return Ok(None) };
            let len = array_length(header.into_pointer_value(), ctx)?;
            let len = truncate_to_i32(len, ctx)?;
            let last = ctx.codegen.builder.build_int_sub(len, i32_type.const_int(1, false), "high")?;
            Ok(Some(last.into()))
        }
    }
}

fn lower_length<'a, 'ctx>(value: &'a Node, node: &Node, ctx: &mut CodeGenCtx<'a, 'ctx>) -> Lowered<'ctx> {
    let i32_type = ctx.codegen.context.i32_type();
    let ty = value.resolve_type(&ctx.env);
    if let Some((low, high)) = ty.as_array().and_then(|a| a.bounds) {
        return Ok(Some(i32_type.const_int((high - low + 1) as u64, true).into()));
    }
    let Some(header) = value.lower(ctx)? else { return Ok(None) };
    let header = header.into_pointer_value();
    let len = match ty {
        Type::String => string_length(header, ctx)?,
        Type::Array(_) => array_length(header, ctx)?,
        other => {
            return Err(CodeGenError::Internal {
                message: format!("length of a value of type `{}`", other),
                loc: Some(node.loc.clone()),
            });
        }
    };
    Ok(Some(truncate_to_i32(len, ctx)?.into()))
}

/// `setlength(v, n)`: a fresh zero-filled payload of `n` elements (bytes for
/// strings, plus a terminating zero).
fn lower_setlength<'a, 'ctx>(args: &'a [Node], node: &Node, ctx: &mut CodeGenCtx<'a, 'ctx>) -> Lowered<'ctx> {
    let [target, length] = args else {
        return Err(CodeGenError::Internal {
            message: "'setlength' takes a variable and a length".into(),
            loc: Some(node.loc.clone()),
        });
    };
    let target_ty = target.resolve_type(&ctx.env);
    let length_ty = length.resolve_type(&ctx.env);
    let Some(header) = target.lower_address(ctx)? else { return Ok(None) };
    let Some(length) = length.lower(ctx)? else { return Ok(None) };
    let length = coerce(length, &length_ty, &Type::integer(64), ctx)?.into_int_value();

    match &target_ty {
        Type::String => resize_string(header, length, ctx)?,
        Type::Array(array) if array.bounds.is_none() => {
            let element = ctx.codegen.llvm_type(&array.element)?;
            let element_size = element
                .size_of()
                .ok_or_else(|| CodeGenError::internal(format!("type `{}` has no size", array.element)))?;
            resize_array(header, length, element_size, ctx)?;
        }
        other => {
            return Err(CodeGenError::Internal {
                message: format!("cannot resize a value of type `{}`", other),
                loc: Some(target.loc.clone()),
            });
        }
    }
    Ok(None)
}

/// `new(p)`: points `p` at a zeroed heap block the size of its pointee.
fn lower_new<'a, 'ctx>(pointer: &'a Node, node: &Node, ctx: &mut CodeGenCtx<'a, 'ctx>) -> Lowered<'ctx> {
    let ty = pointer.resolve_type(&ctx.env);
    let Some(pointee) = ty.pointee() else {
        return Err(CodeGenError::Internal {
            message: format!("'new' on a value of type `{}`", ty),
            loc: Some(node.loc.clone()),
        });
    };
    let Some(slot) = pointer.lower_address(ctx)? else { return Ok(None) };
    let layout = ctx.codegen.llvm_type(pointee)?;
    let size = layout
        .size_of()
        .ok_or_else(|| CodeGenError::internal(format!("type `{}` has no size", pointee)))?;
    let one = ctx.codegen.context.i64_type().const_int(1, false);
    let block = call_libc(LibC::Calloc, &[one.into(), size.into()], ctx)?
        .ok_or_else(|| CodeGenError::internal("calloc returned no value"))?;
    ctx.codegen.builder.build_store(slot, block)?;
    Ok(None)
}

/// `assert(cond)`: on failure, reports `file:line: assertion failed: text` on
/// stderr and aborts.
fn lower_assert<'a, 'ctx>(
    condition: &'a Node,
    source_text: Option<&str>,
    node: &Node,
    ctx: &mut CodeGenCtx<'a, 'ctx>,
) -> Lowered<'ctx> {
    let Some(holds) = condition.lower(ctx)? else { return Ok(None) };
    let function = ctx.function()?;
    let context = ctx.codegen.context;
    let fail_bb = context.append_basic_block(function, "assert.fail");
    let ok_bb = context.append_basic_block(function, "assert.ok");
    ctx.codegen.builder.build_conditional_branch(holds.into_int_value(), ok_bb, fail_bb)?;

    ctx.codegen.builder.position_at_end(fail_bb);
    let stderr = ctx
        .codegen
        .globals
        .get("stderr")
        .map(|g| g.as_pointer_value())
        .ok_or_else(|| CodeGenError::internal("the `stderr` handle is not declared"))?;
    let stream = ctx.codegen.builder.build_load(ctx.codegen.ptr_type(), stderr, "stderr")?;
    let format = ctx.codegen.string_bytes("%s:%d: assertion failed: %s\n").as_pointer_value();
    let file = ctx.codegen.string_bytes(node.loc.file.as_bytes()).as_pointer_value();
    let line = context.i32_type().const_int(node.loc.row as u64, false);
    let text = ctx.codegen.string_bytes(source_text.unwrap_or("")).as_pointer_value();
    call_libc(
        LibC::Fprintf,
        &[stream.into(), format.into(), file.into(), line.into(), text.into()],
        ctx,
    )?;
    call_libc(LibC::Abort, &[], ctx)?;
    ctx.codegen.builder.build_unreachable()?;

    ctx.codegen.builder.position_at_end(ok_bb);
    Ok(None)
}
