//! Statement lowering (`spec.md` §4.5's per-`Stmt` lowering rules).
//!
//! Grounded in the same `CodeGen::codegen(&self, ctx)` shape `why_lib` uses
//! for its own statement nodes (see e.g.
//! `codegen/statements/while_loop.rs`'s cond/body/end block layout and
//! terminator-checking idiom), collapsed into one big match since this
//! AST is a closed `Stmt` enum rather than one struct per statement kind.

use inkwell::values::BasicValueEnum;
use inkwell::AddressSpace;

use crate::ast::{AssignmentKind, NodeInfo, Stmt, TypeAnnotation};
use crate::diagnostics::Diagnostic;
use crate::types::Type;

use super::CodegenContext;

impl<'ctx> CodegenContext<'ctx> {
    /// Lowers one statement. Declarations/definitions that only matter at
    /// Phase A (`StructDefinition`, `Function`, `Use`) are no-ops here —
    /// by the time any function body reaches this method they have
    /// already been fully processed by [`super::generate`].
    pub(super) fn lower_stmt(&self, stmt: &Stmt) -> Result<(), Diagnostic> {
        match stmt {
            Stmt::Assignment { .. } => self.lower_assignment_stmt(stmt),
            Stmt::ArrayAssignment { name, index, value, info } => {
                self.lower_array_assignment(name, index, value, info)
            }
            Stmt::ArrayFieldAssignment { name, index, field_path, value, info } => {
                self.lower_array_field_assignment(name, index, field_path, value, info)
            }
            Stmt::StructAssignment { name, field, value, info } => {
                self.lower_field_path_assignment(name, std::slice::from_ref(field), value, info)
            }
            Stmt::NestedStructAssignment { name, field_path, value, info } => {
                self.lower_field_path_assignment(name, field_path, value, info)
            }
            Stmt::If { condition, then_branch, else_branch, .. } => {
                self.lower_if(condition, then_branch, else_branch.as_deref())
            }
            Stmt::While { condition, body, .. } => self.lower_while(condition, body),
            Stmt::Return { value, .. } => self.lower_return(value.as_ref()),
            Stmt::Break { info } => self.lower_break(info),
            Stmt::Print { value, .. } => self.lower_print(value),
            Stmt::ExprStmt { value, .. } => {
                self.lower_expr(value)?;
                Ok(())
            }
            Stmt::StructDefinition { .. } | Stmt::Function { .. } | Stmt::Use { .. } => Ok(()),
        }
    }

    fn lower_assignment_stmt(&self, stmt: &Stmt) -> Result<(), Diagnostic> {
        let Stmt::Assignment { kind, id, declared_type, value, is_global, info } = stmt else {
            unreachable!("lower_assignment_stmt only ever receives Stmt::Assignment")
        };

        if *is_global {
            // Every top-level global already got its storage declared in
            // Phase A.2 (`super::generate`); a `global` written inside a
            // nested block at the top level still needs storage the
            // first time it is reached here.
            if !self.globals.borrow().contains_key(id) {
                super::declare_global_stmt(self, stmt)?;
            }
            return self.lower_global_initializer(stmt);
        }

        match kind {
            AssignmentKind::Declaration => self.lower_local_declaration(id, declared_type, value, info),
            AssignmentKind::Reassignment => self.lower_reassignment(id, value, info),
        }
    }

    /// `let`/bare local declaration: `alloca` of the declared (or
    /// inferred) type, then an initializer store whose shape depends on
    /// that type — element-wise copy for a sized array, a plain pointer
    /// store for a reference (`null` needs no conversion with this
    /// generator's opaque-`ptr` scheme, see `structs.rs`), coercion store
    /// otherwise.
    fn lower_local_declaration(
        &self,
        id: &str,
        declared_type: &Option<TypeAnnotation>,
        value: &crate::ast::Expr,
        info: &NodeInfo,
    ) -> Result<(), Diagnostic> {
        let declared_ty = match declared_type {
            Some(annotation) => self.resolve_type(annotation)?,
            None => self.infer_expr_type(value)?,
        };
        let llvm_ty = self.struct_table.llvm_basic_type(&declared_ty);
        let alloca = self
            .builder
            .build_alloca(llvm_ty, id)
            .map_err(|_| self.err(format!("failed to allocate local '{id}'"), info))?;

        match declared_ty.clone() {
            Type::Array { element, size: Some(n) } => {
                self.copy_array_elements(value, alloca, &element, n)?;
            }
            Type::Reference { .. } => {
                let value_val = self.lower_expr(value)?;
                self.builder.build_store(alloca, value_val).unwrap();
            }
            other => {
                let value_ty = self.infer_expr_type(value)?;
                let value_val = self.lower_expr(value)?;
                let coerced = self.coerce_value(value_val, &value_ty, &other);
                self.builder.build_store(alloca, coerced).unwrap();
            }
        }

        self.declare_local(id, alloca, declared_ty);
        Ok(())
    }

    fn lower_reassignment(&self, id: &str, value: &crate::ast::Expr, info: &NodeInfo) -> Result<(), Diagnostic> {
        let (ptr, declared_ty) = self
            .lookup_variable(id)
            .ok_or_else(|| self.err(format!("assignment to undeclared variable '{id}'"), info))?;

        match &declared_ty {
            // A sized array (local or global) is reassigned element-wise;
            // a string/reference reassignment is just a pointer store —
            // opaque `ptr` needs no bitcast to change what it "points at".
            Type::Array { element, size: Some(n) } => {
                self.copy_array_elements(value, ptr, element, *n)?;
            }
            other => {
                let value_ty = self.infer_expr_type(value)?;
                let value_val = self.lower_expr(value)?;
                let coerced = self.coerce_value(value_val, &value_ty, other);
                self.builder.build_store(ptr, coerced).unwrap();
            }
        }
        Ok(())
    }

    /// Resolves `value`'s element-storage pointer via [`CodegenContext::array_base`]
    /// (an array literal, `zeros(...)`, another sized-array-valued
    /// identifier, or a struct-field array read) and copies its first `n`
    /// elements into `dest`'s inline array storage.
    pub(super) fn copy_array_elements(
        &self,
        value: &crate::ast::Expr,
        dest: inkwell::values::PointerValue<'ctx>,
        element: &Type,
        n: usize,
    ) -> Result<(), Diagnostic> {
        let (value_ptr, _, _) = self.array_base(value)?;
        let elem_llvm = self.struct_table.llvm_basic_type(element);
        let arr_ty = elem_llvm.array_type(n as u32);
        let i64_ty = self.context.i64_type();

        for i in 0..n {
            let idx = i64_ty.const_int(i as u64, false);
            let src = unsafe { self.builder.build_in_bounds_gep(elem_llvm, value_ptr, &[idx], "").unwrap() };
            let dst = unsafe {
                self.builder
                    .build_in_bounds_gep(arr_ty, dest, &[i64_ty.const_zero(), idx], "")
                    .unwrap()
            };
            let loaded = self.builder.build_load(elem_llvm, src, "").unwrap();
            self.builder.build_store(dst, loaded).unwrap();
        }
        Ok(())
    }

    /// Resolves `name`'s base (following a reference/sized-array
    /// distinction the way [`CodegenContext::array_base`] does for reads),
    /// computes the element pointer, and stores `value` there —
    /// `spec.md` §4.5's `ArrayAssignment` rule. `name` may itself be a
    /// struct field access (`struct.field[i] = v`), which
    /// [`CodegenContext::array_base`] already resolves by lowering it to
    /// a pointer.
    fn lower_array_assignment(
        &self,
        name: &crate::ast::Expr,
        index: &crate::ast::Expr,
        value: &crate::ast::Expr,
        info: &NodeInfo,
    ) -> Result<(), Diagnostic> {
        let (base, elem_llvm, is_sized) = self.array_base(name)?;
        let idx = self.lower_expr(index)?.into_int_value();
        let slot = if is_sized {
            unsafe {
                self.builder
                    .build_in_bounds_gep(elem_llvm.array_type(0), base, &[self.context.i64_type().const_zero(), idx], "")
                    .map_err(|_| self.err("array assignment failed", info))?
            }
        } else {
            unsafe {
                self.builder
                    .build_in_bounds_gep(elem_llvm, base, &[idx], "")
                    .map_err(|_| self.err("array assignment failed", info))?
            }
        };

        let elem_ty = match self.infer_expr_type(name)? {
            Type::Array { element, .. } => *element,
            other => return Err(self.err(format!("cannot index into non-array type '{other}'"), info)),
        };
        let value_ty = self.infer_expr_type(value)?;
        let value_val = self.lower_expr(value)?;
        let coerced = self.coerce_value(value_val, &value_ty, &elem_ty);
        self.builder.build_store(slot, coerced).unwrap();
        Ok(())
    }

    /// `spec.md` §4.5's `ArrayFieldAssignment` rule: resolve the array
    /// element's struct pointer, then walk `field_path` via GEP, storing
    /// at the final field. Unlike the one-level limitation `spec.md` §9
    /// flags in the original source, this walks every intermediate level
    /// (mirroring [`CodegenContext::lower_struct_access_from_array`]'s
    /// read-side extension of the same walk).
    fn lower_array_field_assignment(
        &self,
        name: &str,
        index: &crate::ast::Expr,
        field_path: &[String],
        value: &crate::ast::Expr,
        info: &NodeInfo,
    ) -> Result<(), Diagnostic> {
        let (ptr, ty) = self
            .lookup_variable(name)
            .ok_or_else(|| self.err(format!("assignment to undeclared variable '{name}'"), info))?;
        let Type::Array { element, size } = ty else {
            return Err(self.err(format!("'{name}' is not an array"), info));
        };
        let elem_llvm = self.struct_table.llvm_basic_type(&element);
        let idx = self.lower_expr(index)?.into_int_value();
        let elem_ptr = if size.is_some() {
            unsafe {
                self.builder
                    .build_in_bounds_gep(elem_llvm.array_type(0), ptr, &[self.context.i64_type().const_zero(), idx], "")
                    .unwrap()
            }
        } else {
            let loaded = self
                .builder
                .build_load(self.context.ptr_type(AddressSpace::default()), ptr, "")
                .unwrap()
                .into_pointer_value();
            unsafe { self.builder.build_in_bounds_gep(elem_llvm, loaded, &[idx], "").unwrap() }
        };

        let Type::Struct { name: struct_name, .. } = *element else {
            return Err(self.err("array element is not a struct".to_string(), info));
        };

        self.walk_field_path_and_store(elem_ptr, struct_name, field_path, value, info)
    }

    /// Shared by `StructAssignment`/`NestedStructAssignment` and
    /// `ArrayFieldAssignment`: walks `field_path` from `ptr` (already
    /// addressing a `struct_name` value), GEP-ing through embedded-struct
    /// intermediates directly and auto-vivifying (malloc + store-back,
    /// merged via `phi`) through null reference intermediates, per
    /// `spec.md` §4.5's `StructAssignment`/`NestedStructAssignment` rule.
    fn walk_field_path_and_store(
        &self,
        mut ptr: inkwell::values::PointerValue<'ctx>,
        mut struct_name: String,
        field_path: &[String],
        value: &crate::ast::Expr,
        info: &NodeInfo,
    ) -> Result<(), Diagnostic> {
        for (i, field) in field_path.iter().enumerate() {
            let struct_info = self
                .struct_table
                .get(&struct_name)
                .ok_or_else(|| self.err(format!("struct '{struct_name}' was never defined"), info))?;
            let field_idx = *struct_info
                .field_index
                .get(field)
                .ok_or_else(|| self.err(format!("struct '{struct_name}' has no field '{field}'"), info))?;
            let field_ty = struct_info.field_types.get(field).cloned().unwrap();
            let field_ptr = self.builder.build_struct_gep(struct_info.llvm_type, ptr, field_idx as u32, "").unwrap();

            if i == field_path.len() - 1 {
                let value_ty = self.infer_expr_type(value)?;
                let value_val = self.lower_expr(value)?;
                let coerced = self.coerce_value(value_val, &value_ty, &field_ty);
                self.builder.build_store(field_ptr, coerced).unwrap();
                return Ok(());
            }

            match field_ty {
                // Embedded-struct intermediate: the field GEP already
                // addresses the next struct to walk into.
                Type::Struct { name: n, .. } => {
                    ptr = field_ptr;
                    struct_name = n;
                }
                Type::Reference { target, .. } => {
                    let Type::Struct { name: n, .. } = *target else {
                        return Err(self.err("reference intermediate does not target a struct".to_string(), info));
                    };
                    ptr = self.auto_vivify(field_ptr, &n, info)?;
                    struct_name = n;
                }
                other => return Err(self.err(format!("'{other}' has no fields"), info)),
            }
        }
        unreachable!("field_path is non-empty per the parser's collection rule")
    }

    /// Loads the pointer stored at `field_ptr`; if it is null, `malloc`s
    /// a fresh `struct_name` value, stores it back into `field_ptr`, and
    /// merges the "already there" and "freshly built" pointers with a
    /// `phi` before the walk continues.
    fn auto_vivify(
        &self,
        field_ptr: inkwell::values::PointerValue<'ctx>,
        struct_name: &str,
        info: &NodeInfo,
    ) -> Result<inkwell::values::PointerValue<'ctx>, Diagnostic> {
        let ptr_ty = self.context.ptr_type(AddressSpace::default());
        let current_fn = self.builder.get_insert_block().unwrap().get_parent().unwrap();

        let before_block = self.builder.get_insert_block().unwrap();
        let existing = self.builder.build_load(ptr_ty, field_ptr, "").unwrap().into_pointer_value();
        let is_null = self.builder.build_is_null(existing, "").unwrap();

        let alloc_block = self.context.append_basic_block(current_fn, "autoviv.alloc");
        let merge_block = self.context.append_basic_block(current_fn, "autoviv.merge");
        self.builder.build_conditional_branch(is_null, alloc_block, merge_block).unwrap();

        self.builder.position_at_end(alloc_block);
        let struct_info = self
            .struct_table
            .get(struct_name)
            .ok_or_else(|| self.err(format!("struct '{struct_name}' was never defined"), info))?;
        let size = self.sizeof(struct_info.llvm_type.into());
        let fresh = self
            .builder
            .build_call(self.runtime.malloc, &[size.into()], "autoviv")
            .unwrap()
            .try_as_basic_value()
            .left()
            .unwrap()
            .into_pointer_value();
        self.track_alloc(fresh);
        self.builder.build_store(field_ptr, fresh).unwrap();
        self.builder.build_unconditional_branch(merge_block).unwrap();
        let alloc_block_end = self.builder.get_insert_block().unwrap();

        self.builder.position_at_end(merge_block);
        let phi = self.builder.build_phi(ptr_ty, "autoviv.phi").unwrap();
        phi.add_incoming(&[(&existing, before_block), (&fresh, alloc_block_end)]);
        Ok(phi.as_basic_value().into_pointer_value())
    }

    fn lower_field_path_assignment(
        &self,
        name: &str,
        field_path: &[String],
        value: &crate::ast::Expr,
        info: &NodeInfo,
    ) -> Result<(), Diagnostic> {
        let (slot, ty) = self
            .lookup_variable(name)
            .ok_or_else(|| self.err(format!("assignment to undeclared variable '{name}'"), info))?;

        let (ptr, struct_name) = match ty {
            Type::Struct { name: n, .. } => (slot, n),
            Type::Reference { target, .. } => {
                let Type::Struct { name: n, .. } = *target else {
                    return Err(self.err(format!("'{name}' is not a struct"), info));
                };
                let loaded = self
                    .builder
                    .build_load(self.context.ptr_type(AddressSpace::default()), slot, "")
                    .unwrap()
                    .into_pointer_value();
                (loaded, n)
            }
            other => return Err(self.err(format!("'{other}' is not a struct"), info)),
        };

        self.walk_field_path_and_store(ptr, struct_name, field_path, value, info)
    }

    fn lower_if(
        &self,
        condition: &crate::ast::Expr,
        then_branch: &[Stmt],
        else_branch: Option<&[Stmt]>,
    ) -> Result<(), Diagnostic> {
        let current_fn = self.builder.get_insert_block().unwrap().get_parent().unwrap();
        let cond_val = self.lower_expr(condition)?;
        let cond_bool = self.truthify(cond_val)?;

        let then_block = self.context.append_basic_block(current_fn, "if.then");
        let else_block = self.context.append_basic_block(current_fn, "if.else");
        let end_block = self.context.append_basic_block(current_fn, "if.end");
        self.builder.build_conditional_branch(cond_bool, then_block, else_block).unwrap();

        self.builder.position_at_end(then_block);
        self.enter_scope();
        for s in then_branch {
            self.lower_stmt(s)?;
        }
        self.exit_scope();
        if self.builder.get_insert_block().and_then(|b| b.get_terminator()).is_none() {
            self.builder.build_unconditional_branch(end_block).unwrap();
        }

        self.builder.position_at_end(else_block);
        self.enter_scope();
        if let Some(stmts) = else_branch {
            for s in stmts {
                self.lower_stmt(s)?;
            }
        }
        self.exit_scope();
        if self.builder.get_insert_block().and_then(|b| b.get_terminator()).is_none() {
            self.builder.build_unconditional_branch(end_block).unwrap();
        }

        self.builder.position_at_end(end_block);
        Ok(())
    }

    fn lower_while(&self, condition: &crate::ast::Expr, body: &[Stmt]) -> Result<(), Diagnostic> {
        let current_fn = self.builder.get_insert_block().unwrap().get_parent().unwrap();
        let cond_block = self.context.append_basic_block(current_fn, "while.cond");
        let body_block = self.context.append_basic_block(current_fn, "while.body");
        let end_block = self.context.append_basic_block(current_fn, "while.end");

        self.builder.build_unconditional_branch(cond_block).unwrap();

        self.builder.position_at_end(cond_block);
        let cond_val = self.lower_expr(condition)?;
        let cond_bool = self.truthify(cond_val)?;
        self.builder.build_conditional_branch(cond_bool, body_block, end_block).unwrap();

        self.builder.position_at_end(body_block);
        self.enter_scope();
        self.push_loop_end(end_block);
        for s in body {
            self.lower_stmt(s)?;
        }
        self.pop_loop_end();
        self.exit_scope();
        if self.builder.get_insert_block().and_then(|b| b.get_terminator()).is_none() {
            self.builder.build_unconditional_branch(cond_block).unwrap();
        }

        self.builder.position_at_end(end_block);
        Ok(())
    }

    fn lower_break(&self, info: &NodeInfo) -> Result<(), Diagnostic> {
        let target = self
            .current_loop_end()
            .ok_or_else(|| self.err("'break' used outside of a loop", info))?;
        self.builder.build_unconditional_branch(target).unwrap();
        Ok(())
    }

    fn lower_return(&self, value: Option<&crate::ast::Expr>) -> Result<(), Diagnostic> {
        match value {
            Some(expr) => {
                let val = self.lower_expr(expr)?;
                self.builder.build_return(Some(&val)).unwrap();
            }
            None => {
                self.builder.build_return(None).unwrap();
            }
        }
        Ok(())
    }

    /// Format-string dispatch by value type (`spec.md` §4.5's `Print`
    /// rule): `%lld`/`%f`/`%s`, booleans selecting between the two cached
    /// `true`/`false` string globals, and a sized array dispatching to
    /// the `array_to_str_int`/`array_to_str_float` runtime printer that
    /// renders `[e1, e2, ...]`.
    fn lower_print(&self, value: &crate::ast::Expr) -> Result<(), Diagnostic> {
        let ty = self.infer_expr_type(value)?;

        if let Type::Array { element, size: Some(n) } = &ty {
            let (array_ptr, _, _) = self.array_base(value)?;
            let count = self.context.i64_type().const_int(*n as u64, false);
            let printer = if matches!(element.as_ref(), Type::Float) {
                self.runtime.array_to_str_float
            } else {
                self.runtime.array_to_str_int
            };
            let rendered = self
                .builder
                .build_call(printer, &[array_ptr.into(), count.into()], "")
                .unwrap()
                .try_as_basic_value()
                .left()
                .unwrap()
                .into_pointer_value();
            self.track_alloc(rendered);
            return self.printf_one("%s\n", rendered.into());
        }

        let value_val = self.lower_expr(value)?;
        match ty {
            Type::Int => self.printf_one("%lld\n", value_val),
            Type::Float => self.printf_one("%f\n", value_val),
            Type::Bool => {
                let true_ptr = self.bool_literal_ptr(true);
                let false_ptr = self.bool_literal_ptr(false);
                let rendered = self
                    .builder
                    .build_select(value_val.into_int_value(), true_ptr, false_ptr, "")
                    .unwrap();
                self.printf_one("%s\n", rendered)
            }
            _ => self.printf_one("%s\n", value_val),
        }
    }

    fn printf_one(&self, fmt: &str, arg: BasicValueEnum<'ctx>) -> Result<(), Diagnostic> {
        let fmt_ptr = self.build_string_literal(fmt);
        self.builder.build_call(self.runtime.printf, &[fmt_ptr.into(), arg.into()], "").unwrap();
        Ok(())
    }
}
