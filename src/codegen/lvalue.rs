// In src/codegen/lvalue.rs

use super::runtime::{array_data, string_data};
use super::utils::index_to_i64;
use super::{CodeGenCtx, Lower};
use crate::analyzer::types::Type;
use crate::ast::{Node, NodeKind};
use crate::reporter::CodeGenError;
use inkwell::values::{IntValue, PointerValue};

/// Lowering of a node to the address of the storage it denotes.
pub(super) trait LowerAddress<'a, 'ctx> {
    fn lower_address(&'a self, ctx: &mut CodeGenCtx<'a, 'ctx>) -> Result<Option<PointerValue<'ctx>>, CodeGenError>;
}

impl<'a, 'ctx> LowerAddress<'a, 'ctx> for Node {
    fn lower_address(&'a self, ctx: &mut CodeGenCtx<'a, 'ctx>) -> Result<Option<PointerValue<'ctx>>, CodeGenError> {
        match &self.kind {
            NodeKind::Variable(name) => match ctx.lookup_slot(name) {
                Some(slot) => Ok(Some(slot)),
                None => ctx.soft_error(CodeGenError::UnresolvedReference {
                    kind: "variable",
                    name: name.clone(),
                    loc: self.loc.clone(),
                }),
            },

            NodeKind::ArrayAccess { array, index } => {
                let array_ty = array.resolve_type(&ctx.env);
                // Aggregates lower to their address, pointers to their value.
                let Some(base) = array.lower(ctx)? else { return Ok(None) };
                let Some(index) = index.lower(ctx)? else { return Ok(None) };
                let index = index_to_i64(index.into_int_value(), ctx)?;
                element_address(base.into_pointer_value(), index, &array_ty, self, ctx)
            }

            NodeKind::FieldAccess { record, field } => {
                let record_ty = record.resolve_type(&ctx.env);
                let Some(layout) = record_ty.as_record() else {
                    return Err(CodeGenError::Internal {
                        message: format!("field access on a value of type `{}`", record_ty),
                        loc: Some(self.loc.clone()),
                    });
                };
                let Some(position) = layout.field_index(field) else {
                    return ctx.soft_error(CodeGenError::UnresolvedReference {
                        kind: "field",
                        name: field.clone(),
                        loc: self.loc.clone(),
                    });
                };
                let Some(base) = record.lower(ctx)? else { return Ok(None) };
                let struct_type = ctx.codegen.llvm_type(&record_ty)?.into_struct_type();
                let address = ctx.codegen.builder.build_struct_gep(
                    struct_type,
                    base.into_pointer_value(),
                    position as u32,
                    field,
                )?;
                Ok(Some(address))
            }

            // The address a pointer holds is the storage of `p^`.
            NodeKind::Dereference(pointer) => Ok(pointer.lower(ctx)?.map(|p| p.into_pointer_value())),

            _ => Err(CodeGenError::Internal {
                message: "expression does not denote a storage location".into(),
                loc: Some(self.loc.clone()),
            }),
        }
    }
}

/// Address of element `index` of the container at `base`.
///
/// Fixed arrays are offset by their low bound, strings are 1-based, dynamic
/// arrays and typed pointers are 0-based.
fn element_address<'ctx>(
    base: PointerValue<'ctx>,
    index: IntValue<'ctx>,
    container: &Type,
    node: &Node,
    ctx: &mut CodeGenCtx<'_, 'ctx>,
) -> Result<Option<PointerValue<'ctx>>, CodeGenError> {
    let i64_type = ctx.codegen.context.i64_type();
    match container {
        Type::Array(array) => match array.bounds {
            Some((low, _)) => {
                let layout = ctx.codegen.llvm_type(container)?;
                let builder = &ctx.codegen.builder;
                let offset = builder.build_int_sub(index, i64_type.const_int(low as u64, true), "offset")?;
                let zero = i64_type.const_zero();
                let address = unsafe { builder.build_in_bounds_gep(layout, base, &[zero, offset], "elem")? };
                Ok(Some(address))
            }
            None => {
                let element = ctx.codegen.llvm_type(&array.element)?;
                let data = array_data(base, ctx)?;
                let address = unsafe { ctx.codegen.builder.build_in_bounds_gep(element, data, &[index], "elem")? };
                Ok(Some(address))
            }
        },
        Type::String => {
            let data = string_data(base, ctx)?;
            let builder = &ctx.codegen.builder;
            let offset = builder.build_int_sub(index, i64_type.const_int(1, false), "offset")?;
            let i8_type = ctx.codegen.context.i8_type();
            let address = unsafe { builder.build_in_bounds_gep(i8_type, data, &[offset], "char")? };
            Ok(Some(address))
        }
        Type::Pointer(Some(pointee)) => {
            let element = ctx.codegen.llvm_type(pointee)?;
            let address = unsafe { ctx.codegen.builder.build_in_bounds_gep(element, base, &[index], "elem")? };
            Ok(Some(address))
        }
        other => Err(CodeGenError::Internal {
            message: format!("cannot index a value of type `{}`", other),
            loc: Some(node.loc.clone()),
        }),
    }
}
