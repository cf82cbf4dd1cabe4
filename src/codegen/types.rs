// In src/codegen/types.rs

use super::CodeGen;
use crate::analyzer::types::Type;
use crate::ast::{FunctionDefinition, Parameter};
use crate::reporter::CodeGenError;
use inkwell::types::{AnyType, BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType, PointerType, StructType};
use inkwell::AddressSpace;

/// Field positions of the string header `{ refcount, length, data }`.
pub(super) const STRING_LENGTH_FIELD: u32 = 1;
pub(super) const STRING_DATA_FIELD: u32 = 2;
/// Field positions of the dynamic array header `{ length, data }`.
pub(super) const ARRAY_LENGTH_FIELD: u32 = 0;
pub(super) const ARRAY_DATA_FIELD: u32 = 1;

impl<'ctx> CodeGen<'ctx> {
    /// The IR layout of `ty`. Composite layouts are built once per generator
    /// and reused, so struct identities stay stable for field GEPs.
    pub(super) fn llvm_type(&mut self, ty: &Type) -> Result<BasicTypeEnum<'ctx>, CodeGenError> {
        if let Some(layout) = self.layouts.get(ty) {
            return Ok(*layout);
        }

        let layout: BasicTypeEnum<'ctx> = match ty {
            Type::Integer { width } => self.context.custom_width_int_type(*width).into(),
            Type::Boolean => self.context.bool_type().into(),
            Type::Float { width: 32 } => self.context.f32_type().into(),
            Type::Float { .. } => self.context.f64_type().into(),
            Type::Pointer(_) | Type::File(_) => self.ptr_type().into(),
            Type::String => {
                let i64_type = self.context.i64_type();
                let header = self.context.opaque_struct_type("string");
                header.set_body(&[i64_type.into(), i64_type.into(), self.ptr_type().into()], false);
                header.into()
            }
            Type::Array(array) => match array.bounds {
                Some((low, high)) => {
                    let element = self.llvm_type(&array.element)?;
                    let count = u32::try_from(high - low + 1).map_err(|_| {
                        CodeGenError::internal(format!("array[{}..{}] is too large to lay out", low, high))
                    })?;
                    element.array_type(count).into()
                }
                None => {
                    // One header type is shared by every dynamic array.
                    let header = match self.context.get_struct_type("dynarray") {
                        Some(header) => header,
                        None => {
                            let header = self.context.opaque_struct_type("dynarray");
                            header.set_body(&[self.context.i64_type().into(), self.ptr_type().into()], false);
                            header
                        }
                    };
                    header.into()
                }
            },
            Type::Record(record) => {
                let mut fields = Vec::with_capacity(record.fields.len());
                for (_, field_ty) in &record.fields {
                    fields.push(self.llvm_type(field_ty)?);
                }
                let layout = self.context.opaque_struct_type(&format!("record.{}", record.name));
                layout.set_body(&fields, false);
                layout.into()
            }
            Type::Unknown => {
                return Err(CodeGenError::internal("cannot lay out a value of unknown type"));
            }
        };

        log::trace!("layout of `{}` is `{}`", ty, layout.print_to_string());
        self.layouts.insert(ty.clone(), layout);
        Ok(layout)
    }

    pub(super) fn ptr_type(&self) -> PointerType<'ctx> {
        self.context.ptr_type(AddressSpace::default())
    }

    pub(super) fn string_header_type(&mut self) -> Result<StructType<'ctx>, CodeGenError> {
        Ok(self.llvm_type(&Type::String)?.into_struct_type())
    }

    pub(super) fn dynarray_header_type(&mut self) -> Result<StructType<'ctx>, CodeGenError> {
        Ok(self.llvm_type(&Type::dynamic_array(Type::Unknown))?.into_struct_type())
    }

    /// How a parameter travels: by address for `var` parameters and
    /// aggregates, by value otherwise.
    pub(super) fn param_type(&mut self, param: &Parameter) -> Result<BasicMetadataTypeEnum<'ctx>, CodeGenError> {
        if param.is_reference || !param.ty.is_simple() {
            Ok(self.ptr_type().into())
        } else {
            Ok(self.llvm_type(&param.ty)?.into())
        }
    }

    /// The native signature of a routine. Aggregates are returned by value.
    pub(super) fn function_type(&mut self, func: &FunctionDefinition) -> Result<FunctionType<'ctx>, CodeGenError> {
        let mut params = Vec::with_capacity(func.params.len());
        for param in &func.params {
            params.push(self.param_type(param)?);
        }
        if func.is_procedure {
            Ok(self.context.void_type().fn_type(&params, func.is_variadic))
        } else {
            Ok(self.llvm_type(&func.return_type)?.fn_type(&params, func.is_variadic))
        }
    }
}
