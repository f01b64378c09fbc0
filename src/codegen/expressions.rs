//! Expression lowering (`spec.md` §4.5's "Expression lowering highlights").
//!
//! Grounded in `why_lib`'s per-node `codegen(&self, ctx) -> ReturnValue`
//! methods (see e.g. `codegen/expressions/ast_string.rs`,
//! `codegen/expressions/binary.rs`), but collapsed into one big match over
//! [`Expr`] rather than one `Codegen` impl per node type, since this AST is
//! a closed enum rather than an open set of node structs.

use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValue, BasicValueEnum};
use inkwell::{AddressSpace, FloatPredicate, IntPredicate};

use crate::ast::{BinaryOp, Expr, FStringExprPart, UnaryOp};
use crate::diagnostics::Diagnostic;
use crate::types::Type;

use super::CodegenContext;

impl<'ctx> CodegenContext<'ctx> {
    /// Pure, codegen-free type inference over an already-parsed
    /// expression — used wherever a declared type is implicit (`let x = e`
    /// with no annotation) or a coercion decision needs to know the
    /// source type of a value already lowered.
    pub(super) fn infer_expr_type(&self, expr: &Expr) -> Result<Type, Diagnostic> {
        Ok(match expr {
            Expr::Number(..) => Type::Int,
            Expr::Float(..) => Type::Float,
            Expr::Str(..) | Expr::FString(..) => Type::String,
            Expr::Bool(..) => Type::Bool,
            Expr::Null(..) => Type::Null,
            Expr::Identifier(name, info) => {
                if let Some((_, ty)) = self.lookup_variable(name) {
                    ty
                } else if let Some(ty) = self.find_function_return_type(name) {
                    ty
                } else {
                    return Err(self.err(format!("unresolved identifier '{name}'"), info));
                }
            }
            Expr::Array { element_type, elements, .. } => Type::Array {
                element: Box::new(self.resolve_type(element_type)?),
                size: Some(elements.len()),
            },
            Expr::Zeros { element_type, .. } => Type::Array {
                element: Box::new(self.resolve_type(element_type)?),
                size: None,
            },
            Expr::ArrayAccess { name, info, .. } => match self.infer_expr_type(name)? {
                Type::Array { element, .. } => *element,
                other => {
                    return Err(self.err(format!("cannot index into non-array type '{other}'"), info))
                }
            },
            Expr::StructAccess { base, field, info } => {
                let base_ty = self.infer_expr_type(base)?;
                self.field_type_of(&base_ty, field, info)?
            }
            Expr::StructAccessFromArray { array_access, field_path, info } => {
                let mut ty = self.infer_expr_type(array_access)?;
                for field in field_path {
                    ty = self.field_type_of(&ty, field, info)?;
                }
                ty
            }
            Expr::StringCharAccess { .. } => Type::String,
            Expr::BinaryOp { lhs, op, rhs, info } => self.infer_binary_type(lhs, *op, rhs, info)?,
            Expr::UnaryOp { op: UnaryOp::Not, .. } => Type::Bool,
            Expr::UnaryOp { operand, .. } => self.infer_expr_type(operand)?,
            Expr::Cast { target_type, .. } => self.resolve_type(target_type)?,
            Expr::Concat { .. } => Type::String,
            Expr::Reference { expr, .. } => Type::Reference {
                target: Box::new(self.infer_expr_type(expr)?),
                mutable: true,
            },
            Expr::Call { name, info, .. } => self.builtin_or_function_return_type(name, info)?,
            Expr::StructConstructor { name, info, .. } => {
                self.struct_table.get(name).map(|i| i.semantic).ok_or_else(|| {
                    self.err(format!("struct '{name}' was never defined"), info)
                })?
            }
        })
    }

    fn builtin_or_function_return_type(&self, name: &str, info: &crate::ast::NodeInfo) -> Result<Type, Diagnostic> {
        if let Some(ty) = self.find_function_return_type(name) {
            return Ok(ty);
        }
        Ok(match name {
            "to_str" | "array_to_str" => Type::String,
            "to_int" | "ord" | "length" => Type::Int,
            "to_float" => Type::Float,
            "printf" | "print" => Type::Void,
            _ => return Err(self.err(format!("call to undeclared function '{name}'"), info)),
        })
    }

    fn field_type_of(&self, base_ty: &Type, field: &str, info: &crate::ast::NodeInfo) -> Result<Type, Diagnostic> {
        let struct_ty = match base_ty {
            Type::Struct { .. } => base_ty,
            Type::Reference { target, .. } => target.as_ref(),
            other => return Err(self.err(format!("'{other}' has no fields"), info)),
        };
        let Type::Struct { name, .. } = struct_ty else {
            return Err(self.err("field access on non-struct type".to_string(), info));
        };
        let info_table = self.struct_table.get(name).ok_or_else(|| {
            self.err(format!("struct '{name}' was never defined"), info)
        })?;
        info_table
            .field_types
            .get(field)
            .cloned()
            .ok_or_else(|| self.err(format!("struct '{name}' has no field '{field}'"), info))
    }

    fn infer_binary_type(&self, lhs: &Expr, op: BinaryOp, rhs: &Expr, info: &crate::ast::NodeInfo) -> Result<Type, Diagnostic> {
        use BinaryOp::*;
        match op {
            Gt | Lt | Ge | Le | Eq | Ne | And | Or => Ok(Type::Bool),
            _ => {
                let lt = self.infer_expr_type(lhs)?;
                let rt = self.infer_expr_type(rhs)?;
                match (op, &lt, &rt) {
                    (Add, Type::String, _) | (Add, _, Type::String) => Ok(Type::String),
                    (_, Type::Float, _) | (_, _, Type::Float) => Ok(Type::Float),
                    _ => {
                        let _ = info;
                        Ok(Type::Int)
                    }
                }
            }
        }
    }

    pub(super) fn err(&self, message: impl Into<String>, info: &crate::ast::NodeInfo) -> Diagnostic {
        let message: String = message.into();
        Diagnostic::codegen_at(message, info.span.clone(), info.source_line.clone())
    }

    /// Lowers an expression to its LLVM value, per `spec.md` §4.5's
    /// "Expression lowering highlights".
    pub(super) fn lower_expr(&self, expr: &Expr) -> Result<BasicValueEnum<'ctx>, Diagnostic> {
        Ok(match expr {
            Expr::Number(n, _) => self.context.i64_type().const_int(*n as u64, true).into(),
            Expr::Float(f, _) => self.context.f64_type().const_float(*f).into(),
            Expr::Bool(b, _) => self.context.bool_type().const_int(*b as u64, false).into(),
            Expr::Null(_) => self.context.ptr_type(AddressSpace::default()).const_null().into(),
            Expr::Str(s, _) => self.build_string_literal(s).into(),
            Expr::FString(parts, _) => self.lower_fstring(parts)?.into(),
            Expr::Identifier(name, info) => self.lower_identifier(name, info)?,
            Expr::Array { elements, element_type, .. } => self.lower_array_literal(elements, element_type)?,
            Expr::Zeros { size, element_type, .. } => self.lower_zeros(size, element_type)?,
            Expr::ArrayAccess { name, index, info } => self.lower_array_access(name, index, info)?,
            Expr::StringCharAccess { literal, index, .. } => self.lower_string_char_access(literal, index)?,
            Expr::StructAccess { base, field, info } => self.lower_struct_access(base, field, info)?,
            Expr::StructAccessFromArray { array_access, field_path, info } => {
                self.lower_struct_access_from_array(array_access, field_path, info)?
            }
            Expr::BinaryOp { lhs, op, rhs, info } => self.lower_binary_op(lhs, *op, rhs, info)?,
            Expr::UnaryOp { op, operand, .. } => self.lower_unary_op(*op, operand)?,
            Expr::Cast { expr, target_type, info } => self.lower_cast(expr, target_type, info)?,
            Expr::Concat { lhs, rhs, .. } => self.lower_concat(lhs, rhs)?,
            Expr::Reference { expr, info } => self.lower_reference(expr, info)?,
            Expr::Call { name, args, info } => self.lower_call(name, args, info)?,
            Expr::StructConstructor { name, args, info } => self.lower_struct_constructor(name, args, info)?,
        })
    }

    pub(super) fn build_string_literal(&self, s: &str) -> inkwell::values::PointerValue<'ctx> {
        self.builder.build_global_string_ptr(s, "").unwrap().as_pointer_value()
    }

    fn lower_identifier(&self, name: &str, info: &crate::ast::NodeInfo) -> Result<BasicValueEnum<'ctx>, Diagnostic> {
        if let Some((ptr, ty)) = self.lookup_variable(name) {
            let llvm_ty = self.struct_table.llvm_basic_type(&ty);
            return Ok(self.builder.build_load(llvm_ty, ptr, name).unwrap());
        }
        if let Some(function) = self.find_function_value(name) {
            return Ok(function.as_global_value().as_pointer_value().into());
        }
        Err(self.err(format!("unresolved identifier '{name}'"), info))
    }

    fn lower_fstring(&self, parts: &[FStringExprPart]) -> Result<inkwell::values::PointerValue<'ctx>, Diagnostic> {
        let mut acc: Option<inkwell::values::PointerValue<'ctx>> = None;
        for part in parts {
            let piece = match part {
                FStringExprPart::Literal(text) => self.build_string_literal(text),
                FStringExprPart::Expr { expr, format_spec } => {
                    self.lower_fstring_expr_part(expr, format_spec.as_deref())?
                }
            };
            acc = Some(match acc {
                None => piece,
                Some(prev) => self.concat_ptrs(prev, piece)?,
            });
        }
        Ok(acc.unwrap_or_else(|| self.build_string_literal("")))
    }

    fn lower_fstring_expr_part(
        &self,
        expr: &Expr,
        format_spec: Option<&str>,
    ) -> Result<inkwell::values::PointerValue<'ctx>, Diagnostic> {
        let ty = self.infer_expr_type(expr)?;
        let value = self.lower_expr(expr)?;
        self.stringify(value, &ty, format_spec)
    }

    /// Converts a lowered value to a heap string, per the format-spec
    /// rules in `spec.md` §4.5 (`%[spec]d|o|x` for ints, `%[spec]f|e|g`
    /// for floats, "true"/"false" select for bools).
    fn stringify(
        &self,
        value: BasicValueEnum<'ctx>,
        ty: &Type,
        format_spec: Option<&str>,
    ) -> Result<inkwell::values::PointerValue<'ctx>, Diagnostic> {
        Ok(match ty {
            Type::Int => {
                let spec = format_spec.unwrap_or("d");
                let fmt = format!("%ll{spec}");
                self.sprintf_one(&fmt, value.into_int_value().into())
            }
            Type::Float => {
                let fmt = format!("%{}", format_spec.unwrap_or("f"));
                self.sprintf_one(&fmt, value.into_float_value().into())
            }
            Type::Bool => {
                let truthy = self.truthify(value)?;
                let true_ptr = self.bool_literal_ptr(true);
                let false_ptr = self.bool_literal_ptr(false);
                self.builder.build_select(truthy, true_ptr, false_ptr, "").unwrap().into_pointer_value()
            }
            Type::String => value.into_pointer_value(),
            other => return Err(Diagnostic::codegen(format!("'{other}' cannot be interpolated into a string"), None, "")),
        })
    }

    fn sprintf_one(&self, fmt: &str, arg: inkwell::values::BasicMetadataValueEnum<'ctx>) -> inkwell::values::PointerValue<'ctx> {
        let fmt_ptr = self.build_string_literal(fmt);
        let buf = self.malloc_bytes(64);
        self.builder
            .build_call(self.runtime.sprintf, &[buf.into(), fmt_ptr.into(), arg], "")
            .unwrap();
        self.track_alloc(buf);
        buf
    }

    fn malloc_bytes(&self, n: u64) -> inkwell::values::PointerValue<'ctx> {
        let size = self.context.i64_type().const_int(n, false);
        self.builder
            .build_call(self.runtime.malloc, &[size.into()], "malloc")
            .unwrap()
            .try_as_basic_value()
            .left()
            .unwrap()
            .into_pointer_value()
    }

    /// `malloc`s a fresh buffer sized `strlen(a) + strlen(b) + 1`,
    /// `strcpy`s `a` in, `strcat`s `b` on, and registers the result.
    fn concat_ptrs(
        &self,
        a: inkwell::values::PointerValue<'ctx>,
        b: inkwell::values::PointerValue<'ctx>,
    ) -> Result<inkwell::values::PointerValue<'ctx>, Diagnostic> {
        let i64_ty = self.context.i64_type();
        let len_a = self.builder.build_call(self.runtime.strlen, &[a.into()], "").unwrap().try_as_basic_value().left().unwrap().into_int_value();
        let len_b = self.builder.build_call(self.runtime.strlen, &[b.into()], "").unwrap().try_as_basic_value().left().unwrap().into_int_value();
        let total = self.builder.build_int_add(len_a, len_b, "").unwrap();
        let total = self.builder.build_int_add(total, i64_ty.const_int(1, false), "").unwrap();
        let buf = self
            .builder
            .build_call(self.runtime.malloc, &[total.into()], "concat")
            .unwrap()
            .try_as_basic_value()
            .left()
            .unwrap()
            .into_pointer_value();
        self.builder.build_call(self.runtime.strcpy, &[buf.into(), a.into()], "").unwrap();
        self.builder.build_call(self.runtime.strcat, &[buf.into(), b.into()], "").unwrap();
        self.track_alloc(buf);
        Ok(buf)
    }

    fn lower_concat(&self, lhs: &Expr, rhs: &Expr) -> Result<BasicValueEnum<'ctx>, Diagnostic> {
        let a = self.lower_expr(lhs)?.into_pointer_value();
        let b = self.lower_expr(rhs)?.into_pointer_value();
        Ok(self.concat_ptrs(a, b)?.into())
    }

    /// `malloc(n * sizeof(T))`, tracked, with each element stored at its
    /// index (`spec.md` §4.5's `Array{T,n}` literal rule).
    fn lower_array_literal(&self, elements: &[Expr], element_type: &crate::ast::TypeAnnotation) -> Result<BasicValueEnum<'ctx>, Diagnostic> {
        let elem_ty = self.resolve_type(element_type)?;
        let elem_llvm = self.struct_table.llvm_basic_type(&elem_ty);
        let elem_size = self.sizeof(elem_llvm);
        let n = self.context.i64_type().const_int(elements.len() as u64, false);
        let total = self.builder.build_int_mul(elem_size, n, "").unwrap();
        let buf = self.builder.build_call(self.runtime.malloc, &[total.into()], "arrlit").unwrap().try_as_basic_value().left().unwrap().into_pointer_value();
        self.track_alloc(buf);
        for (i, el) in elements.iter().enumerate() {
            let value_ty = self.infer_expr_type(el)?;
            let value = self.lower_expr(el)?;
            // A struct-typed element whose initializer yields a
            // constructor pointer is loaded into the backing `[n x
            // struct]` storage by value (`spec.md` §4.5's `Array{T,n}`
            // literal rule); anything else stores directly.
            let coerced = self.coerce_value(value, &value_ty, &elem_ty);
            let idx = self.context.i64_type().const_int(i as u64, false);
            let slot = unsafe { self.builder.build_in_bounds_gep(elem_llvm, buf, &[idx], "").unwrap() };
            self.builder.build_store(slot, coerced).unwrap();
        }
        Ok(buf.into())
    }

    /// `malloc(n * sizeof(T))` with every slot zeroed.
    fn lower_zeros(&self, size: &Expr, element_type: &crate::ast::TypeAnnotation) -> Result<BasicValueEnum<'ctx>, Diagnostic> {
        let elem_ty = self.resolve_type(element_type)?;
        let elem_llvm = self.struct_table.llvm_basic_type(&elem_ty);
        let elem_size = self.sizeof(elem_llvm);
        let n = self.lower_expr(size)?.into_int_value();
        let total = self.builder.build_int_mul(elem_size, n, "").unwrap();
        let buf = self.builder.build_call(self.runtime.malloc, &[total.into()], "zeros").unwrap().try_as_basic_value().left().unwrap().into_pointer_value();
        self.track_alloc(buf);

        let i64_ty = self.context.i64_type();
        let current_fn = self.builder.get_insert_block().unwrap().get_parent().unwrap();
        let i = self.builder.build_alloca(i64_ty, "zeros.i").unwrap();
        self.builder.build_store(i, i64_ty.const_zero()).unwrap();
        let cond = self.context.append_basic_block(current_fn, "zeros.cond");
        let body = self.context.append_basic_block(current_fn, "zeros.body");
        let end = self.context.append_basic_block(current_fn, "zeros.end");
        self.builder.build_unconditional_branch(cond).unwrap();

        self.builder.position_at_end(cond);
        let i_val = self.builder.build_load(i64_ty, i, "").unwrap().into_int_value();
        let keep_going = self.builder.build_int_compare(IntPredicate::SLT, i_val, n, "").unwrap();
        self.builder.build_conditional_branch(keep_going, body, end).unwrap();

        self.builder.position_at_end(body);
        let slot = unsafe { self.builder.build_in_bounds_gep(elem_llvm, buf, &[i_val], "").unwrap() };
        self.builder.build_store(slot, zero_of(self.context, elem_llvm)).unwrap();
        let next = self.builder.build_int_add(i_val, i64_ty.const_int(1, false), "").unwrap();
        self.builder.build_store(i, next).unwrap();
        self.builder.build_unconditional_branch(cond).unwrap();

        self.builder.position_at_end(end);
        Ok(buf.into())
    }

    pub(super) fn sizeof(&self, ty: BasicTypeEnum<'ctx>) -> inkwell::values::IntValue<'ctx> {
        let ptr_ty = ty.ptr_type(AddressSpace::default());
        let null = ptr_ty.const_null();
        let one = self.context.i64_type().const_int(1, false);
        let gep = unsafe { self.builder.build_in_bounds_gep(ty, null, &[one], "sizeof").unwrap() };
        self.builder.build_ptr_to_int(gep, self.context.i64_type(), "sizeof.int").unwrap()
    }

    /// Resolves the addressable base of an array/struct-holding
    /// expression to `(storage_ptr, element_llvm_type, is_sized_value)`.
    pub(super) fn array_base(&self, name: &Expr) -> Result<(inkwell::values::PointerValue<'ctx>, BasicTypeEnum<'ctx>, bool), Diagnostic> {
        let ty = self.infer_expr_type(name)?;
        let Type::Array { element, size } = ty else {
            return Err(self.err("indexing into a non-array value".to_string(), name.info()));
        };
        let elem_llvm = self.struct_table.llvm_basic_type(&element);
        match name {
            Expr::Identifier(id, info) => {
                let (ptr, _) = self.lookup_variable(id).ok_or_else(|| self.err(format!("unresolved identifier '{id}'"), info))?;
                if size.is_some() {
                    Ok((ptr, elem_llvm, true))
                } else {
                    let loaded = self.builder.build_load(self.context.ptr_type(AddressSpace::default()), ptr, "").unwrap().into_pointer_value();
                    Ok((loaded, elem_llvm, false))
                }
            }
            other => {
                let value = self.lower_expr(other)?.into_pointer_value();
                Ok((value, elem_llvm, false))
            }
        }
    }

    fn lower_array_access(&self, name: &Expr, index: &Expr, info: &crate::ast::NodeInfo) -> Result<BasicValueEnum<'ctx>, Diagnostic> {
        if let Ok(Type::String) = self.infer_expr_type(name) {
            return self.lower_string_char_access(name, index);
        }
        let (base, elem_llvm, is_sized) = self.array_base(name)?;
        let idx = self.lower_expr(index)?.into_int_value();
        let slot = if is_sized {
            unsafe {
                self.builder
                    .build_in_bounds_gep(base_array_type(elem_llvm), base, &[self.context.i64_type().const_zero(), idx], "")
                    .map_err(|_| self.err("array access failed".to_string(), info))?
            }
        } else {
            unsafe {
                self.builder
                    .build_in_bounds_gep(elem_llvm, base, &[idx], "")
                    .map_err(|_| self.err("array access failed".to_string(), info))?
            }
        };
        Ok(self.builder.build_load(elem_llvm, slot, "").unwrap())
    }

    /// `String` indexing loads the byte and hands it to the `char_to_str`
    /// shim, which returns a freshly heap-allocated one-char string.
    fn lower_string_char_access(&self, literal: &Expr, index: &Expr) -> Result<BasicValueEnum<'ctx>, Diagnostic> {
        let base = self.lower_expr(literal)?.into_pointer_value();
        let idx = self.lower_expr(index)?.into_int_value();
        let slot = unsafe { self.builder.build_in_bounds_gep(self.context.i8_type(), base, &[idx], "").unwrap() };
        let byte = self.builder.build_load(self.context.i8_type(), slot, "").unwrap();
        let ptr = self
            .builder
            .build_call(self.runtime.char_to_str, &[byte.into()], "")
            .unwrap()
            .try_as_basic_value()
            .left()
            .unwrap()
            .into_pointer_value();
        self.track_alloc(ptr);
        Ok(ptr.into())
    }

    /// Resolves the pointer to the concrete struct (following one
    /// reference-load if the holding variable is a `ref Struct`).
    fn struct_base_ptr(&self, base: &Expr, info: &crate::ast::NodeInfo) -> Result<(inkwell::values::PointerValue<'ctx>, String), Diagnostic> {
        let base_ty = self.infer_expr_type(base)?;
        let struct_name = match &base_ty {
            Type::Struct { name, .. } => name.clone(),
            Type::Reference { target, .. } => match target.as_ref() {
                Type::Struct { name, .. } => name.clone(),
                other => return Err(self.err(format!("'{other}' is not a struct"), info)),
            },
            other => return Err(self.err(format!("'{other}' is not a struct"), info)),
        };

        let is_reference = matches!(base_ty, Type::Reference { .. });
        let ptr = match base {
            Expr::Identifier(id, id_info) => {
                let (slot, _) = self.lookup_variable(id).ok_or_else(|| self.err(format!("unresolved identifier '{id}'"), id_info))?;
                if is_reference {
                    self.builder.build_load(self.context.ptr_type(AddressSpace::default()), slot, "").unwrap().into_pointer_value()
                } else {
                    slot
                }
            }
            other => {
                let value = self.lower_expr(other)?.into_pointer_value();
                value
            }
        };
        Ok((ptr, struct_name))
    }

    fn lower_struct_access(&self, base: &Expr, field: &str, info: &crate::ast::NodeInfo) -> Result<BasicValueEnum<'ctx>, Diagnostic> {
        let (ptr, struct_name) = self.struct_base_ptr(base, info)?;
        self.gep_field(ptr, &struct_name, field, info)
    }

    fn lower_struct_access_from_array(&self, array_access: &Expr, field_path: &[String], info: &crate::ast::NodeInfo) -> Result<BasicValueEnum<'ctx>, Diagnostic> {
        let Expr::ArrayAccess { name, index, .. } = array_access else {
            return Err(self.err("malformed array-then-field access".to_string(), info));
        };
        let (base, elem_llvm, is_sized) = self.array_base(name)?;
        let idx = self.lower_expr(index)?.into_int_value();
        let elem_ptr = if is_sized {
            unsafe { self.builder.build_in_bounds_gep(base_array_type(elem_llvm), base, &[self.context.i64_type().const_zero(), idx], "").unwrap() }
        } else {
            unsafe { self.builder.build_in_bounds_gep(elem_llvm, base, &[idx], "").unwrap() }
        };

        let Type::Array { element, .. } = self.infer_expr_type(name)? else {
            return Err(self.err("expected array base".to_string(), info));
        };
        let Type::Struct { name: mut struct_name, .. } = *element else {
            return Err(self.err("array element is not a struct".to_string(), info));
        };

        let mut ptr = elem_ptr;
        for (i, field) in field_path.iter().enumerate() {
            if i == field_path.len() - 1 {
                return self.gep_field(ptr, &struct_name, field, info);
            }
            let field_ty = self.struct_table.get(&struct_name).and_then(|s| s.field_types.get(field).cloned()).ok_or_else(|| {
                self.err(format!("struct '{struct_name}' has no field '{field}'"), info)
            })?;
            let idx = self.struct_table.get(&struct_name).and_then(|s| s.field_index.get(field).copied()).unwrap();
            let llvm_struct = self.struct_table.llvm_type(&struct_name).unwrap();
            ptr = self.builder.build_struct_gep(llvm_struct, ptr, idx as u32, "").unwrap();
            match field_ty {
                Type::Reference { target, .. } => {
                    ptr = self.builder.build_load(self.context.ptr_type(AddressSpace::default()), ptr, "").unwrap().into_pointer_value();
                    if let Type::Struct { name: n, .. } = *target {
                        struct_name = n;
                    }
                }
                Type::Struct { name: n, .. } => struct_name = n,
                _ => {}
            }
        }
        unreachable!("field_path is non-empty per the parser's collection rule")
    }

    fn gep_field(&self, ptr: inkwell::values::PointerValue<'ctx>, struct_name: &str, field: &str, info: &crate::ast::NodeInfo) -> Result<BasicValueEnum<'ctx>, Diagnostic> {
        let struct_info = self.struct_table.get(struct_name).ok_or_else(|| self.err(format!("struct '{struct_name}' was never defined"), info))?;
        let idx = *struct_info.field_index.get(field).ok_or_else(|| self.err(format!("struct '{struct_name}' has no field '{field}'"), info))?;
        let field_ty = struct_info.field_types.get(field).cloned().unwrap();
        let field_ptr = self.builder.build_struct_gep(struct_info.llvm_type, ptr, idx as u32, "").unwrap();

        Ok(match &field_ty {
            // Array- and struct-typed fields are returned unloaded: the
            // caller indexes/GEPs further from this pointer.
            Type::Array { size: Some(_), .. } | Type::Struct { .. } => field_ptr.into(),
            Type::Reference { .. } => self.builder.build_load(self.context.ptr_type(AddressSpace::default()), field_ptr, "").unwrap(),
            other => {
                let llvm_ty = self.struct_table.llvm_basic_type(other);
                self.builder.build_load(llvm_ty, field_ptr, "").unwrap()
            }
        })
    }

    fn lower_unary_op(&self, op: UnaryOp, operand: &Expr) -> Result<BasicValueEnum<'ctx>, Diagnostic> {
        let value = self.lower_expr(operand)?;
        Ok(match op {
            UnaryOp::Not => {
                let truthy = self.truthify(value)?;
                self.builder.build_not(truthy, "").unwrap().into()
            }
            UnaryOp::Neg => match value {
                BasicValueEnum::IntValue(i) => self.builder.build_int_neg(i, "").unwrap().into(),
                BasicValueEnum::FloatValue(f) => self.builder.build_float_neg(f, "").unwrap().into(),
                _ => return Err(self.err("cannot negate a non-numeric value".to_string(), operand.info())),
            },
        })
    }

    pub(super) fn truthify(&self, value: BasicValueEnum<'ctx>) -> Result<inkwell::values::IntValue<'ctx>, Diagnostic> {
        Ok(match value {
            BasicValueEnum::IntValue(i) if i.get_type().get_bit_width() == 1 => i,
            BasicValueEnum::IntValue(i) => self.builder.build_int_compare(IntPredicate::NE, i, i.get_type().const_zero(), "").unwrap(),
            _ => return Err(Diagnostic::codegen("expected a boolean-like value".to_string(), None, "")),
        })
    }

    fn lower_reference(&self, expr: &Expr, info: &crate::ast::NodeInfo) -> Result<BasicValueEnum<'ctx>, Diagnostic> {
        match expr {
            Expr::Identifier(name, id_info) => {
                // Every local/global is addressed by an alloca/global
                // pointer regardless of its value type, so taking a
                // reference is just handing that pointer back.
                let (ptr, _) = self.lookup_variable(name).ok_or_else(|| self.err(format!("unresolved identifier '{name}'"), id_info))?;
                Ok(ptr.into())
            }
            other => {
                // Already a pointer-shaped value (struct constructor, array literal, …).
                self.lower_expr(other).and_then(|v| match v {
                    BasicValueEnum::PointerValue(_) => Ok(v),
                    _ => Err(self.err("cannot take a reference to a non-addressable expression".to_string(), info)),
                })
            }
        }
    }

    fn lower_binary_op(&self, lhs: &Expr, op: BinaryOp, rhs: &Expr, info: &crate::ast::NodeInfo) -> Result<BasicValueEnum<'ctx>, Diagnostic> {
        use BinaryOp::*;

        let lhs_ty = self.infer_expr_type(lhs)?;
        let rhs_ty = self.infer_expr_type(rhs)?;

        // `+` with exactly one string operand is rejected (`spec.md` §8
        // property 7); with two strings it concatenates.
        if matches!(op, Add) && (lhs_ty == Type::String || rhs_ty == Type::String) {
            if lhs_ty != Type::String || rhs_ty != Type::String {
                return Err(self.err("'+' requires both operands to be strings, or neither".to_string(), info));
            }
            return self.lower_concat(lhs, rhs);
        }

        if matches!(op, Eq | Ne) && (lhs_ty == Type::String || rhs_ty == Type::String) {
            let a = self.lower_expr(lhs)?.into_pointer_value();
            let b = self.lower_expr(rhs)?.into_pointer_value();
            let cmp = self.builder.build_call(self.runtime.strcmp, &[a.into(), b.into()], "").unwrap().try_as_basic_value().left().unwrap().into_int_value();
            let zero = cmp.get_type().const_zero();
            let pred = if matches!(op, Eq) { IntPredicate::EQ } else { IntPredicate::NE };
            return Ok(self.builder.build_int_compare(pred, cmp, zero, "").unwrap().into());
        }

        if matches!(op, Eq | Ne) && (lhs_ty == Type::Null || rhs_ty == Type::Null) {
            let a = self.lower_expr(lhs)?.into_pointer_value();
            let b = self.lower_expr(rhs)?.into_pointer_value();
            let pred = if matches!(op, Eq) { IntPredicate::EQ } else { IntPredicate::NE };
            return Ok(self.builder.build_int_compare(pred, a, b, "").unwrap().into());
        }

        if matches!(op, And | Or) {
            let a = self.truthify(self.lower_expr(lhs)?)?;
            let b = self.truthify(self.lower_expr(rhs)?)?;
            return Ok(match op {
                And => self.builder.build_and(a, b, "").unwrap().into(),
                Or => self.builder.build_or(a, b, "").unwrap().into(),
                _ => unreachable!(),
            });
        }

        let a = self.lower_expr(lhs)?;
        let b = self.lower_expr(rhs)?;
        let float_mode = lhs_ty == Type::Float || rhs_ty == Type::Float;

        if float_mode {
            let a = self.to_float(a);
            let b = self.to_float(b);
            return Ok(match op {
                Add => self.builder.build_float_add(a, b, "").unwrap().into(),
                Sub => self.builder.build_float_sub(a, b, "").unwrap().into(),
                Mul => self.builder.build_float_mul(a, b, "").unwrap().into(),
                Div => self.builder.build_float_div(a, b, "").unwrap().into(),
                Mod => self.builder.build_call(self.runtime.fmod, &[a.into(), b.into()], "").unwrap().try_as_basic_value().left().unwrap(),
                Gt => self.builder.build_float_compare(FloatPredicate::OGT, a, b, "").unwrap().into(),
                Lt => self.builder.build_float_compare(FloatPredicate::OLT, a, b, "").unwrap().into(),
                Ge => self.builder.build_float_compare(FloatPredicate::OGE, a, b, "").unwrap().into(),
                Le => self.builder.build_float_compare(FloatPredicate::OLE, a, b, "").unwrap().into(),
                Eq => self.builder.build_float_compare(FloatPredicate::OEQ, a, b, "").unwrap().into(),
                Ne => self.builder.build_float_compare(FloatPredicate::ONE, a, b, "").unwrap().into(),
                And | Or => unreachable!("handled above"),
            });
        }

        let a = a.into_int_value();
        let b = b.into_int_value();
        Ok(match op {
            Add => self.builder.build_int_add(a, b, "").unwrap().into(),
            Sub => self.builder.build_int_sub(a, b, "").unwrap().into(),
            Mul => self.builder.build_int_mul(a, b, "").unwrap().into(),
            Div => self.builder.build_int_signed_div(a, b, "").unwrap().into(),
            Mod => self.builder.build_int_signed_rem(a, b, "").unwrap().into(),
            Gt => self.builder.build_int_compare(IntPredicate::SGT, a, b, "").unwrap().into(),
            Lt => self.builder.build_int_compare(IntPredicate::SLT, a, b, "").unwrap().into(),
            Ge => self.builder.build_int_compare(IntPredicate::SGE, a, b, "").unwrap().into(),
            Le => self.builder.build_int_compare(IntPredicate::SLE, a, b, "").unwrap().into(),
            Eq => self.builder.build_int_compare(IntPredicate::EQ, a, b, "").unwrap().into(),
            Ne => self.builder.build_int_compare(IntPredicate::NE, a, b, "").unwrap().into(),
            And | Or => unreachable!("handled above"),
        })
    }

    fn to_float(&self, value: BasicValueEnum<'ctx>) -> inkwell::values::FloatValue<'ctx> {
        match value {
            BasicValueEnum::FloatValue(f) => f,
            BasicValueEnum::IntValue(i) => self.builder.build_signed_int_to_float(i, self.context.f64_type(), "").unwrap(),
            _ => unreachable!("only int/float operands reach to_float"),
        }
    }

    fn lower_cast(&self, expr: &Expr, target_type: &crate::ast::TypeAnnotation, info: &crate::ast::NodeInfo) -> Result<BasicValueEnum<'ctx>, Diagnostic> {
        let source_ty = self.infer_expr_type(expr)?;
        let target_ty = self.resolve_type(target_type)?;
        let value = self.lower_expr(expr)?;

        Ok(match (&source_ty, &target_ty) {
            (Type::Int, Type::Float) => self.builder.build_signed_int_to_float(value.into_int_value(), self.context.f64_type(), "").unwrap().into(),
            (Type::Float, Type::Int) => self.builder.build_float_to_signed_int(value.into_float_value(), self.context.i64_type(), "").unwrap().into(),
            (Type::Int, Type::Bool) => self.builder.build_int_compare(IntPredicate::NE, value.into_int_value(), self.context.i64_type().const_zero(), "").unwrap().into(),
            (Type::Float, Type::Bool) => self.builder.build_float_compare(FloatPredicate::ONE, value.into_float_value(), self.context.f64_type().const_zero(), "").unwrap().into(),
            (_, Type::String) => self.stringify(value, &source_ty, None)?.into(),
            (Type::String, Type::Int) => self.builder.build_call(self.runtime.to_int, &[value.into()], "").unwrap().try_as_basic_value().left().unwrap(),
            (Type::String, Type::Float) => self.builder.build_call(self.runtime.to_float, &[value.into()], "").unwrap().try_as_basic_value().left().unwrap(),
            _ if source_ty == target_ty => value,
            (from, to) => return Err(self.err(format!("unsupported cast from '{from}' to '{to}'"), info)),
        })
    }

    fn lower_call(&self, name: &str, args: &[Expr], info: &crate::ast::NodeInfo) -> Result<BasicValueEnum<'ctx>, Diagnostic> {
        if let Some(function) = self.find_function_value(name) {
            let mut llvm_args = vec![];
            for a in args {
                llvm_args.push(self.lower_expr(a)?.into());
            }
            let call = self.builder.build_call(function, &llvm_args, "").unwrap();
            return Ok(call
                .try_as_basic_value()
                .left()
                .unwrap_or_else(|| self.context.ptr_type(AddressSpace::default()).const_null().into()));
        }

        match name {
            "length" => {
                let arg_ty = self.infer_expr_type(&args[0])?;
                match arg_ty {
                    Type::Array { size: Some(n), .. } => Ok(self.context.i64_type().const_int(n as u64, false).into()),
                    Type::String => {
                        let s = self.lower_expr(&args[0])?.into_pointer_value();
                        Ok(self.builder.build_call(self.runtime.strlen, &[s.into()], "").unwrap().try_as_basic_value().left().unwrap())
                    }
                    _ => Err(self.err("'length' expects a string or sized array".to_string(), info)),
                }
            }
            "ord" => {
                let s = self.lower_expr(&args[0])?.into_pointer_value();
                let byte = self.builder.build_load(self.context.i8_type(), s, "").unwrap().into_int_value();
                Ok(self.builder.build_int_z_extend(byte, self.context.i64_type(), "").unwrap().into())
            }
            "to_str" => {
                let ty = self.infer_expr_type(&args[0])?;
                let val = self.lower_expr(&args[0])?;
                Ok(self.stringify(val, &ty, None)?.into())
            }
            "to_int" => Ok(self.builder.build_call(self.runtime.to_int, &[self.lower_expr(&args[0])?.into()], "").unwrap().try_as_basic_value().left().unwrap()),
            "to_float" => Ok(self.builder.build_call(self.runtime.to_float, &[self.lower_expr(&args[0])?.into()], "").unwrap().try_as_basic_value().left().unwrap()),
            "printf" => {
                let mut llvm_args = vec![];
                for a in args {
                    llvm_args.push(self.lower_expr(a)?.into());
                }
                Ok(self.builder.build_call(self.runtime.printf, &llvm_args, "").unwrap().try_as_basic_value().left().unwrap_or_else(|| self.context.i32_type().const_zero().into()))
            }
            other => Err(self.err(format!("call to undeclared function '{other}'"), info)),
        }
    }

    /// `malloc(sizeof(struct))` via the `gep(null, 1)`+`ptrtoint` trick,
    /// tracked, with fields stored in declaration order.
    fn lower_struct_constructor(&self, name: &str, args: &[Expr], info: &crate::ast::NodeInfo) -> Result<BasicValueEnum<'ctx>, Diagnostic> {
        let struct_info = self.struct_table.get(name).ok_or_else(|| self.err(format!("struct '{name}' was never defined"), info))?;
        let size = self.sizeof(struct_info.llvm_type.into());
        let ptr = self.builder.build_call(self.runtime.malloc, &[size.into()], "structlit").unwrap().try_as_basic_value().left().unwrap().into_pointer_value();
        self.track_alloc(ptr);

        let mut fields: Vec<(String, Type)> = struct_info
            .field_index
            .iter()
            .map(|(name, idx)| (*idx, name.clone()))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|(idx, name)| {
                let ty = struct_info.field_types[&name].clone();
                (idx, name, ty)
            })
            .map(|(_, name, ty)| (name, ty))
            .collect();
        fields.sort_by_key(|(name, _)| struct_info.field_index[name]);

        for ((field_name, field_ty), arg) in fields.iter().zip(args.iter()) {
            let idx = struct_info.field_index[field_name];
            let field_ptr = self.builder.build_struct_gep(struct_info.llvm_type, ptr, idx as u32, "").unwrap();

            // A sized array field is stored inline (`spec.md` §4.5's
            // `Array{Struct{N},n}` rule); the argument lowers to a
            // separate heap pointer (an array literal, `zeros(...)`, or
            // another sized array), so its elements are copied into the
            // field's inline storage rather than the pointer itself
            // being stored over that storage.
            if let Type::Array { element, size: Some(n) } = field_ty {
                self.copy_array_elements(arg, field_ptr, element, *n)?;
                continue;
            }

            let arg_ty = self.infer_expr_type(arg)?;
            let arg_val = self.lower_expr(arg)?;
            let coerced = self.coerce_value(arg_val, &arg_ty, field_ty);
            self.builder.build_store(field_ptr, coerced).unwrap();
        }

        Ok(ptr.into())
    }

    /// Bridges a lowered value's actual type to a destination's declared
    /// type: a `StructConstructor` (pointer) stored into a by-value
    /// struct slot is loaded first; `Null` stored into a pointer-shaped
    /// slot passes through unchanged (already a typed null per
    /// `spec.md` §4.5's `Null` rule).
    pub(super) fn coerce_value(&self, value: BasicValueEnum<'ctx>, value_ty: &Type, declared_ty: &Type) -> BasicValueEnum<'ctx> {
        match (declared_ty, value_ty, value) {
            (Type::Struct { .. }, Type::Struct { .. }, BasicValueEnum::PointerValue(p)) => {
                let llvm_ty = self.struct_table.llvm_basic_type(declared_ty);
                self.builder.build_load(llvm_ty, p, "").unwrap()
            }
            _ => value,
        }
    }
}

fn zero_of<'ctx>(context: &'ctx inkwell::context::Context, ty: BasicTypeEnum<'ctx>) -> BasicValueEnum<'ctx> {
    match ty {
        BasicTypeEnum::IntType(t) => t.const_zero().into(),
        BasicTypeEnum::FloatType(t) => t.const_zero().into(),
        BasicTypeEnum::PointerType(_) => context.ptr_type(AddressSpace::default()).const_null().into(),
        BasicTypeEnum::ArrayType(t) => t.const_zero().into(),
        BasicTypeEnum::StructType(t) => t.const_zero().into(),
        BasicTypeEnum::VectorType(t) => t.const_zero().into(),
        BasicTypeEnum::ScalableVectorType(t) => t.const_zero().into(),
    }
}

fn base_array_type(elem: BasicTypeEnum<'_>) -> inkwell::types::ArrayType<'_> {
    // Placeholder array size; only ever used as the pointee type for a
    // `[0, i]` GEP, where the outer dimension is never read.
    elem.array_type(0)
}
