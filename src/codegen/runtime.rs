// In src/codegen/runtime.rs

//! C library entry points and the string / dynamic array runtime layouts.

use super::types::{ARRAY_DATA_FIELD, ARRAY_LENGTH_FIELD, STRING_DATA_FIELD, STRING_LENGTH_FIELD};
use super::utils::create_entry_block_alloca;
use super::{CodeGen, CodeGenCtx};
use crate::reporter::CodeGenError;
use inkwell::module::Linkage;
use inkwell::types::BasicMetadataTypeEnum;
use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, FunctionValue, GlobalValue, IntValue, PointerValue};

/// The libc routines lowered code may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum LibC {
    Printf,
    Fprintf,
    Malloc,
    Calloc,
    Exit,
    Abort,
}

impl<'ctx> CodeGen<'ctx> {
    /// The declaration of `routine`, added to the module on first use.
    pub(super) fn libc(&self, routine: LibC) -> FunctionValue<'ctx> {
        let (name, fn_type) = {
            let ptr: BasicMetadataTypeEnum = self.ptr_type().into();
            let i64_type = self.context.i64_type();
            let i32_type = self.context.i32_type();
            let void = self.context.void_type();
            match routine {
                LibC::Printf => ("printf", i32_type.fn_type(&[ptr], true)),
                LibC::Fprintf => ("fprintf", i32_type.fn_type(&[ptr, ptr], true)),
                LibC::Malloc => ("malloc", self.ptr_type().fn_type(&[i64_type.into()], false)),
                LibC::Calloc => ("calloc", self.ptr_type().fn_type(&[i64_type.into(), i64_type.into()], false)),
                LibC::Exit => ("exit", void.fn_type(&[i32_type.into()], false)),
                LibC::Abort => ("abort", void.fn_type(&[], false)),
            }
        };
        self.module
            .get_function(name)
            .unwrap_or_else(|| self.module.add_function(name, fn_type, Some(Linkage::External)))
    }

    /// A private, writable, null-terminated byte array holding `text`,
    /// shared by every use of the same bytes.
    pub(super) fn string_bytes(&mut self, text: impl AsRef<[u8]>) -> GlobalValue<'ctx> {
        let text = text.as_ref();
        if let Some(global) = self.strings.get(text) {
            return *global;
        }
        let bytes = self.context.const_string(text, true);
        let global = self.module.add_global(bytes.get_type(), None, ".str");
        global.set_linkage(Linkage::Private);
        global.set_initializer(&bytes);
        self.strings.insert(text.to_vec(), global);
        global
    }
}

/// Calls a libc routine and returns its result, if any.
pub(super) fn call_libc<'ctx>(
    routine: LibC,
    args: &[BasicMetadataValueEnum<'ctx>],
    ctx: &mut CodeGenCtx<'_, 'ctx>,
) -> Result<Option<BasicValueEnum<'ctx>>, CodeGenError> {
    let function = ctx.codegen.libc(routine);
    let call = ctx.codegen.builder.build_call(function, args, "")?;
    Ok(call.try_as_basic_value().left())
}

/// `exit(code)` followed by `unreachable`.
pub(super) fn build_process_exit<'ctx>(code: IntValue<'ctx>, ctx: &mut CodeGenCtx<'_, 'ctx>) -> Result<(), CodeGenError> {
    call_libc(LibC::Exit, &[code.into()], ctx)?;
    ctx.codegen.builder.build_unreachable()?;
    Ok(())
}

fn allocate<'ctx>(size: IntValue<'ctx>, ctx: &mut CodeGenCtx<'_, 'ctx>) -> Result<PointerValue<'ctx>, CodeGenError> {
    call_libc(LibC::Malloc, &[size.into()], ctx)?
        .map(|v| v.into_pointer_value())
        .ok_or_else(|| CodeGenError::internal("malloc returned no value"))
}

fn allocate_zeroed<'ctx>(
    count: IntValue<'ctx>,
    element_size: IntValue<'ctx>,
    ctx: &mut CodeGenCtx<'_, 'ctx>,
) -> Result<PointerValue<'ctx>, CodeGenError> {
    call_libc(LibC::Calloc, &[count.into(), element_size.into()], ctx)?
        .map(|v| v.into_pointer_value())
        .ok_or_else(|| CodeGenError::internal("calloc returned no value"))
}

// --- strings ---

/// The `length` field of a string header, as `i64`.
pub(super) fn string_length<'ctx>(header: PointerValue<'ctx>, ctx: &mut CodeGenCtx<'_, 'ctx>) -> Result<IntValue<'ctx>, CodeGenError> {
    let header_type = ctx.codegen.string_header_type()?;
    let builder = &ctx.codegen.builder;
    let field = builder.build_struct_gep(header_type, header, STRING_LENGTH_FIELD, "len.addr")?;
    Ok(builder.build_load(ctx.codegen.context.i64_type(), field, "len")?.into_int_value())
}

/// The `data` pointer of a string header.
pub(super) fn string_data<'ctx>(header: PointerValue<'ctx>, ctx: &mut CodeGenCtx<'_, 'ctx>) -> Result<PointerValue<'ctx>, CodeGenError> {
    let header_type = ctx.codegen.string_header_type()?;
    let builder = &ctx.codegen.builder;
    let field = builder.build_struct_gep(header_type, header, STRING_DATA_FIELD, "data.addr")?;
    Ok(builder.build_load(ctx.codegen.ptr_type(), field, "data")?.into_pointer_value())
}

/// Fills the header at `header` with `{ 0, length, data }`.
fn fill_string_header<'ctx>(
    header: PointerValue<'ctx>,
    length: IntValue<'ctx>,
    data: PointerValue<'ctx>,
    ctx: &mut CodeGenCtx<'_, 'ctx>,
) -> Result<(), CodeGenError> {
    let header_type = ctx.codegen.string_header_type()?;
    let builder = &ctx.codegen.builder;
    let refcount = builder.build_struct_gep(header_type, header, 0, "refcount.addr")?;
    builder.build_store(refcount, ctx.codegen.context.i64_type().const_zero())?;
    let len = builder.build_struct_gep(header_type, header, STRING_LENGTH_FIELD, "len.addr")?;
    builder.build_store(len, length)?;
    let field = builder.build_struct_gep(header_type, header, STRING_DATA_FIELD, "data.addr")?;
    builder.build_store(field, data)?;
    Ok(())
}

/// A fresh header for the literal `text`.
pub(super) fn string_literal<'ctx>(text: &[u8], ctx: &mut CodeGenCtx<'_, 'ctx>) -> Result<PointerValue<'ctx>, CodeGenError> {
    let bytes = ctx.codegen.string_bytes(text);
    let header_type = ctx.codegen.string_header_type()?;
    let header = create_entry_block_alloca("strlit", header_type, ctx)?;
    let length = ctx.codegen.context.i64_type().const_int(text.len() as u64, false);
    fill_string_header(header, length, bytes.as_pointer_value(), ctx)?;
    Ok(header)
}

/// `lhs + rhs`: a new buffer of `len(lhs) + len(rhs) + 1` bytes holding both
/// payloads and a terminating zero, under a fresh header.
pub(super) fn concat_strings<'ctx>(
    lhs: PointerValue<'ctx>,
    rhs: PointerValue<'ctx>,
    ctx: &mut CodeGenCtx<'_, 'ctx>,
) -> Result<PointerValue<'ctx>, CodeGenError> {
    let (l_len, l_data) = (string_length(lhs, ctx)?, string_data(lhs, ctx)?);
    let (r_len, r_data) = (string_length(rhs, ctx)?, string_data(rhs, ctx)?);
    let i64_type = ctx.codegen.context.i64_type();
    let i8_type = ctx.codegen.context.i8_type();

    let total = ctx.codegen.builder.build_int_add(l_len, r_len, "concat.len")?;
    let size = ctx.codegen.builder.build_int_add(total, i64_type.const_int(1, false), "concat.size")?;
    let buffer = allocate(size, ctx)?;

    let builder = &ctx.codegen.builder;
    builder.build_memcpy(buffer, 1, l_data, 1, l_len).map_err(|e| CodeGenError::internal(e.to_string()))?;
    let tail = unsafe { builder.build_in_bounds_gep(i8_type, buffer, &[l_len], "concat.tail")? };
    builder.build_memcpy(tail, 1, r_data, 1, r_len).map_err(|e| CodeGenError::internal(e.to_string()))?;
    let end = unsafe { builder.build_in_bounds_gep(i8_type, buffer, &[total], "concat.end")? };
    builder.build_store(end, i8_type.const_zero())?;

    let header_type = ctx.codegen.string_header_type()?;
    let header = create_entry_block_alloca("concat", header_type, ctx)?;
    fill_string_header(header, total, buffer, ctx)?;
    Ok(header)
}

/// `s + c` for a character code `c`: a new buffer of `len(s) + 2` bytes.
pub(super) fn append_char<'ctx>(
    string: PointerValue<'ctx>,
    ch: IntValue<'ctx>,
    ctx: &mut CodeGenCtx<'_, 'ctx>,
) -> Result<PointerValue<'ctx>, CodeGenError> {
    let (len, data) = (string_length(string, ctx)?, string_data(string, ctx)?);
    let i64_type = ctx.codegen.context.i64_type();
    let i8_type = ctx.codegen.context.i8_type();

    let size = ctx.codegen.builder.build_int_add(len, i64_type.const_int(2, false), "append.size")?;
    let buffer = allocate(size, ctx)?;

    let builder = &ctx.codegen.builder;
    builder.build_memcpy(buffer, 1, data, 1, len).map_err(|e| CodeGenError::internal(e.to_string()))?;
    let slot = unsafe { builder.build_in_bounds_gep(i8_type, buffer, &[len], "append.char")? };
    let ch = builder.build_int_cast_sign_flag(ch, i8_type, true, "char")?;
    builder.build_store(slot, ch)?;
    let total = builder.build_int_add(len, i64_type.const_int(1, false), "append.len")?;
    let end = unsafe { builder.build_in_bounds_gep(i8_type, buffer, &[total], "append.end")? };
    builder.build_store(end, i8_type.const_zero())?;

    let header_type = ctx.codegen.string_header_type()?;
    let header = create_entry_block_alloca("append", header_type, ctx)?;
    fill_string_header(header, total, buffer, ctx)?;
    Ok(header)
}

/// `setlength(s, n)` on a string: a zeroed buffer of `n + 1` bytes.
pub(super) fn resize_string<'ctx>(
    header: PointerValue<'ctx>,
    length: IntValue<'ctx>,
    ctx: &mut CodeGenCtx<'_, 'ctx>,
) -> Result<(), CodeGenError> {
    let i64_type = ctx.codegen.context.i64_type();
    let size = ctx.codegen.builder.build_int_add(length, i64_type.const_int(1, false), "str.size")?;
    let buffer = allocate_zeroed(size, i64_type.const_int(1, false), ctx)?;
    let header_type = ctx.codegen.string_header_type()?;
    let builder = &ctx.codegen.builder;
    let len = builder.build_struct_gep(header_type, header, STRING_LENGTH_FIELD, "len.addr")?;
    builder.build_store(len, length)?;
    let data = builder.build_struct_gep(header_type, header, STRING_DATA_FIELD, "data.addr")?;
    builder.build_store(data, buffer)?;
    Ok(())
}

// --- dynamic arrays ---

pub(super) fn array_length<'ctx>(header: PointerValue<'ctx>, ctx: &mut CodeGenCtx<'_, 'ctx>) -> Result<IntValue<'ctx>, CodeGenError> {
    let header_type = ctx.codegen.dynarray_header_type()?;
    let builder = &ctx.codegen.builder;
    let field = builder.build_struct_gep(header_type, header, ARRAY_LENGTH_FIELD, "len.addr")?;
    Ok(builder.build_load(ctx.codegen.context.i64_type(), field, "len")?.into_int_value())
}

pub(super) fn array_data<'ctx>(header: PointerValue<'ctx>, ctx: &mut CodeGenCtx<'_, 'ctx>) -> Result<PointerValue<'ctx>, CodeGenError> {
    let header_type = ctx.codegen.dynarray_header_type()?;
    let builder = &ctx.codegen.builder;
    let field = builder.build_struct_gep(header_type, header, ARRAY_DATA_FIELD, "data.addr")?;
    Ok(builder.build_load(ctx.codegen.ptr_type(), field, "data")?.into_pointer_value())
}

/// `setlength(a, n)`: a zero-filled payload of `n` elements. Old contents are
/// not carried over.
pub(super) fn resize_array<'ctx>(
    header: PointerValue<'ctx>,
    length: IntValue<'ctx>,
    element_size: IntValue<'ctx>,
    ctx: &mut CodeGenCtx<'_, 'ctx>,
) -> Result<(), CodeGenError> {
    let buffer = allocate_zeroed(length, element_size, ctx)?;
    let header_type = ctx.codegen.dynarray_header_type()?;
    let builder = &ctx.codegen.builder;
    let len = builder.build_struct_gep(header_type, header, ARRAY_LENGTH_FIELD, "len.addr")?;
    builder.build_store(len, length)?;
    let data = builder.build_struct_gep(header_type, header, ARRAY_DATA_FIELD, "data.addr")?;
    builder.build_store(data, buffer)?;
    Ok(())
}
