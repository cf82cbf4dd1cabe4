// In src/codegen/statement.rs

use super::expression::lower_as;
use super::lvalue::LowerAddress;
use super::utils::{coerce, create_slot, is_terminated, start_dead_block, store_value};
use super::{CodeGenCtx, Lower};
use crate::ast::{Block, Node, NodeKind};
use crate::reporter::CodeGenError;
use inkwell::IntPredicate;

impl<'a, 'ctx> Lower<'a, 'ctx> for Block {
    type Output = ();

    /// Allocates the block's variables in a fresh frame, runs their
    /// initializers in declaration order, then lowers the statements.
    fn lower(&'a self, ctx: &mut CodeGenCtx<'a, 'ctx>) -> Result<(), CodeGenError> {
        ctx.env.enter_block(self);
        ctx.push_scope();
        let result = lower_block_contents(self, ctx);
        ctx.pop_scope();
        ctx.env.exit_block();
        result
    }
}

fn lower_block_contents<'a, 'ctx>(block: &'a Block, ctx: &mut CodeGenCtx<'a, 'ctx>) -> Result<(), CodeGenError> {
    for var in &block.variables {
        let slot = create_slot(&var.name, &var.ty, ctx)?;
        ctx.bind(var.name.clone(), slot);
        if let Some(initializer) = &var.initializer {
            let from = initializer.resolve_type_for(&var.ty, &ctx.env);
            if let Some(value) = lower_as(initializer, &from, ctx)? {
                store_value(slot, &var.ty, value, &from, ctx)?;
            }
        }
    }
    for statement in &block.statements {
        statement.lower(ctx)?;
    }
    Ok(())
}

/// Lowers a statement node. Expression nodes never reach here.
pub(super) fn lower_statement<'a, 'ctx>(node: &'a Node, ctx: &mut CodeGenCtx<'a, 'ctx>) -> Result<(), CodeGenError> {
    match &node.kind {
        NodeKind::Assignment { target, value } => lower_assignment(target, value, ctx),
        NodeKind::Block(block) => block.lower(ctx),
        NodeKind::If { condition, then_branch, else_branch } => {
            lower_if(condition, then_branch, else_branch.as_deref(), ctx)
        }
        NodeKind::While { condition, body } => lower_while(condition, body, ctx),
        NodeKind::For { variable, start, end, descending, body } => {
            lower_for(variable, start, end, *descending, body, node, ctx)
        }
        NodeKind::Repeat { body, condition } => lower_repeat(body, condition, ctx),
        NodeKind::Break | NodeKind::Continue => {
            let Some((continue_bb, break_bb)) = ctx.loop_targets() else {
                return Err(CodeGenError::Internal {
                    message: "loop control outside of a loop".into(),
                    loc: Some(node.loc.clone()),
                });
            };
            let target = if matches!(node.kind, NodeKind::Break) { break_bb } else { continue_bb };
            ctx.codegen.builder.build_unconditional_branch(target)?;
            start_dead_block(ctx, "after.jump")
        }
        _ => Err(CodeGenError::Internal {
            message: "expression lowered as a statement".into(),
            loc: Some(node.loc.clone()),
        }),
    }
}

fn lower_assignment<'a, 'ctx>(
    target: &'a Node,
    value: &'a Node,
    ctx: &mut CodeGenCtx<'a, 'ctx>,
) -> Result<(), CodeGenError> {
    let to = target.resolve_type(&ctx.env);
    let from = value.resolve_type_for(&to, &ctx.env);
    let new_value = lower_as(value, &from, ctx)?;
    let slot = target.lower_address(ctx)?;
    match (slot, new_value) {
        (Some(slot), Some(new_value)) => store_value(slot, &to, new_value, &from, ctx),
        _ => Ok(()),
    }
}

fn lower_if<'a, 'ctx>(
    condition: &'a Node,
    then_branch: &'a Node,
    else_branch: Option<&'a Node>,
    ctx: &mut CodeGenCtx<'a, 'ctx>,
) -> Result<(), CodeGenError> {
    let cond = condition.lower(ctx)?;
    let function = ctx.function()?;
    let context = ctx.codegen.context;

    let then_bb = context.append_basic_block(function, "if.then");
    let merge_bb = context.append_basic_block(function, "if.end");
    let else_bb = match else_branch {
        Some(_) => context.prepend_basic_block(merge_bb, "if.else"),
        None => merge_bb,
    };
    match cond {
        Some(cond) => ctx.codegen.builder.build_conditional_branch(cond.into_int_value(), then_bb, else_bb)?,
        // The failed condition is already reported; the branches are still lowered.
        None => ctx.codegen.builder.build_unconditional_branch(then_bb)?,
    };

    ctx.codegen.builder.position_at_end(then_bb);
    then_branch.lower(ctx)?;
    if !is_terminated(ctx) {
        ctx.codegen.builder.build_unconditional_branch(merge_bb)?;
    }

    if let Some(else_branch) = else_branch {
        ctx.codegen.builder.position_at_end(else_bb);
        else_branch.lower(ctx)?;
        if !is_terminated(ctx) {
            ctx.codegen.builder.build_unconditional_branch(merge_bb)?;
        }
    }

    ctx.codegen.builder.position_at_end(merge_bb);
    Ok(())
}

fn lower_while<'a, 'ctx>(condition: &'a Node, body: &'a Node, ctx: &mut CodeGenCtx<'a, 'ctx>) -> Result<(), CodeGenError> {
    let function = ctx.function()?;
    let context = ctx.codegen.context;
    let cond_bb = context.append_basic_block(function, "while.cond");
    let body_bb = context.append_basic_block(function, "while.body");
    let after_bb = context.append_basic_block(function, "while.end");

    ctx.codegen.builder.build_unconditional_branch(cond_bb)?;
    ctx.codegen.builder.position_at_end(cond_bb);
    match condition.lower(ctx)? {
        Some(cond) => ctx.codegen.builder.build_conditional_branch(cond.into_int_value(), body_bb, after_bb)?,
        None => ctx.codegen.builder.build_unconditional_branch(body_bb)?,
    };

    ctx.codegen.builder.position_at_end(body_bb);
    ctx.with_loop(cond_bb, after_bb, |ctx| body.lower(ctx).map(|_| ()))?;
    if !is_terminated(ctx) {
        ctx.codegen.builder.build_unconditional_branch(cond_bb)?;
    }

    ctx.codegen.builder.position_at_end(after_bb);
    Ok(())
}

/// `for v := start to end do body`.
///
/// `end` is evaluated once. The body runs when `start <= end` (`>=` for
/// `downto`). After each iteration the counter is stepped and then tested
/// against `end`, so a completed loop leaves it at `end + 1` (`end - 1`).
/// `continue` jumps to the step.
fn lower_for<'a, 'ctx>(
    variable: &str,
    start: &'a Node,
    end: &'a Node,
    descending: bool,
    body: &'a Node,
    node: &Node,
    ctx: &mut CodeGenCtx<'a, 'ctx>,
) -> Result<(), CodeGenError> {
    let var_ty = ctx.env.variable_type(variable);
    let slot = ctx.lookup_slot(variable);
    if slot.is_none() {
        ctx.soft_error::<()>(CodeGenError::UnresolvedReference {
            kind: "variable",
            name: variable.to_string(),
            loc: node.loc.clone(),
        })?;
    }

    let (start_ty, end_ty) = (start.resolve_type(&ctx.env), end.resolve_type(&ctx.env));
    let start_val = start.lower(ctx)?;
    let end_val = end.lower(ctx)?;

    let function = ctx.function()?;
    let context = ctx.codegen.context;
    let body_bb = context.append_basic_block(function, "for.body");
    let step_bb = context.append_basic_block(function, "for.step");
    let after_bb = context.append_basic_block(function, "for.end");

    let (Some(slot), Some(start_val), Some(end_val)) = (slot, start_val, end_val) else {
        // Something in the header failed; the body is still lowered for its own errors.
        ctx.codegen.builder.build_unconditional_branch(body_bb)?;
        ctx.codegen.builder.position_at_end(body_bb);
        ctx.with_loop(step_bb, after_bb, |ctx| body.lower(ctx).map(|_| ()))?;
        if !is_terminated(ctx) {
            ctx.codegen.builder.build_unconditional_branch(step_bb)?;
        }
        ctx.codegen.builder.position_at_end(step_bb);
        ctx.codegen.builder.build_unconditional_branch(after_bb)?;
        ctx.codegen.builder.position_at_end(after_bb);
        return Ok(());
    };

    let counter_type = ctx.codegen.llvm_type(&var_ty)?.into_int_type();
    let start_val = coerce(start_val, &start_ty, &var_ty, ctx)?.into_int_value();
    let end_val = coerce(end_val, &end_ty, &var_ty, ctx)?.into_int_value();
    ctx.codegen.builder.build_store(slot, start_val)?;

    let predicate = if descending { IntPredicate::SGE } else { IntPredicate::SLE };
    let enter = ctx.codegen.builder.build_int_compare(predicate, start_val, end_val, "for.enter")?;
    ctx.codegen.builder.build_conditional_branch(enter, body_bb, after_bb)?;

    ctx.codegen.builder.position_at_end(body_bb);
    ctx.with_loop(step_bb, after_bb, |ctx| body.lower(ctx).map(|_| ()))?;
    if !is_terminated(ctx) {
        ctx.codegen.builder.build_unconditional_branch(step_bb)?;
    }

    let builder = &ctx.codegen.builder;
    builder.position_at_end(step_bb);
    let current = builder.build_load(counter_type, slot, variable)?.into_int_value();
    let one = counter_type.const_int(1, false);
    let next = if descending {
        builder.build_int_sub(current, one, "for.next")?
    } else {
        builder.build_int_add(current, one, "for.next")?
    };
    builder.build_store(slot, next)?;
    let more = builder.build_int_compare(predicate, next, end_val, "for.more")?;
    builder.build_conditional_branch(more, body_bb, after_bb)?;

    builder.position_at_end(after_bb);
    Ok(())
}

/// `repeat body until condition`: the body runs at least once and
/// `continue` jumps to the condition.
fn lower_repeat<'a, 'ctx>(body: &'a Block, condition: &'a Node, ctx: &mut CodeGenCtx<'a, 'ctx>) -> Result<(), CodeGenError> {
    let function = ctx.function()?;
    let context = ctx.codegen.context;
    let body_bb = context.append_basic_block(function, "repeat.body");
    let cond_bb = context.append_basic_block(function, "repeat.cond");
    let after_bb = context.append_basic_block(function, "repeat.end");

    ctx.codegen.builder.build_unconditional_branch(body_bb)?;
    ctx.codegen.builder.position_at_end(body_bb);
    ctx.with_loop(cond_bb, after_bb, |ctx| body.lower(ctx))?;
    if !is_terminated(ctx) {
        ctx.codegen.builder.build_unconditional_branch(cond_bb)?;
    }

    ctx.codegen.builder.position_at_end(cond_bb);
    match condition.lower(ctx)? {
        Some(done) => ctx.codegen.builder.build_conditional_branch(done.into_int_value(), after_bb, body_bb)?,
        None => ctx.codegen.builder.build_unconditional_branch(after_bb)?,
    };

    ctx.codegen.builder.position_at_end(after_bb);
    Ok(())
}
