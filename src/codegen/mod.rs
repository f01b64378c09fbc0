//! # Code Generator
//!
//! The largest stage: lowers the AST (plus whatever the resolver imported)
//! into one LLVM IR module, in the two phases `spec.md` §4.5 describes —
//! declare everything first, generate bodies second — mirroring
//! `why_lib::codegen::CodegenContext`'s shape: one long-lived context
//! owning the `Context`/`Module`/`Builder` plus scoped variable/function
//! tables, with every AST node lowered through a method on that context
//! rather than a free function taking it as a parameter.

mod alloc_ledger;
mod expressions;
mod runtime;
mod statements;
mod structs;

pub use alloc_ledger::AllocLedger;
pub use runtime::RuntimeDecls;
pub use structs::{StructInfo, StructTable};

use std::cell::RefCell;
use std::collections::HashMap;

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::values::{FunctionValue, PointerValue};
use inkwell::AddressSpace;

use crate::ast::{Program, Stmt, TypeAnnotation};
use crate::diagnostics::Diagnostic;
use crate::resolver::Export;
use crate::types::Type;

#[derive(Default)]
struct Scope<'ctx> {
    variables: HashMap<String, (PointerValue<'ctx>, Type)>,
}

pub struct FunctionInfo<'ctx> {
    pub value: FunctionValue<'ctx>,
    pub params: Vec<(String, Type)>,
    pub return_type: Type,
}

pub struct CodegenContext<'ctx> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,
    pub struct_table: StructTable<'ctx>,
    pub runtime: RuntimeDecls<'ctx>,
    pub ledger: AllocLedger<'ctx>,

    globals: RefCell<HashMap<String, (PointerValue<'ctx>, Type)>>,
    functions: RefCell<HashMap<String, FunctionInfo<'ctx>>>,
    scopes: RefCell<Vec<Scope<'ctx>>>,
    loop_ends: RefCell<Vec<BasicBlock<'ctx>>>,
    true_str: RefCell<Option<PointerValue<'ctx>>>,
    false_str: RefCell<Option<PointerValue<'ctx>>>,
    /// Set while lowering `main`'s own statement sequence. Allocations
    /// made while this is `false` (i.e. inside a user function body) are
    /// the documented leak `spec.md` §5 calls out: the ledger only has
    /// reach into `main`'s synthesized body.
    ledger_active: RefCell<bool>,
}

impl<'ctx> CodegenContext<'ctx> {
    fn new(context: &'ctx Context, module_name: &str, struct_defs: &[Stmt]) -> Self {
        let module = context.create_module(module_name);
        let runtime = RuntimeDecls::declare(context, &module);
        let ledger = AllocLedger::declare(context, &module);
        let struct_table = StructTable::new(context, struct_defs);

        Self {
            context,
            module,
            builder: context.create_builder(),
            struct_table,
            runtime,
            ledger,
            globals: RefCell::new(HashMap::new()),
            functions: RefCell::new(HashMap::new()),
            scopes: RefCell::new(vec![]),
            loop_ends: RefCell::new(vec![]),
            true_str: RefCell::new(None),
            false_str: RefCell::new(None),
            ledger_active: RefCell::new(false),
        }
    }

    /// Registers `ptr` with the allocation ledger, but only while
    /// currently lowering `main`'s top-level statement sequence.
    fn track_alloc(&self, ptr: PointerValue<'ctx>) {
        if *self.ledger_active.borrow() {
            self.ledger.push(self, ptr);
        }
    }

    fn enter_scope(&self) {
        self.scopes.borrow_mut().push(Scope::default());
    }

    fn exit_scope(&self) {
        self.scopes.borrow_mut().pop();
    }

    fn declare_local(&self, name: &str, ptr: PointerValue<'ctx>, ty: Type) {
        if let Some(scope) = self.scopes.borrow_mut().last_mut() {
            scope.variables.insert(name.to_string(), (ptr, ty));
        }
    }

    fn declare_global(&self, name: &str, ptr: PointerValue<'ctx>, ty: Type) {
        self.globals.borrow_mut().insert(name.to_string(), (ptr, ty));
    }

    /// Locals shadow globals (`spec.md` §4.5's reassignment lowering note).
    fn lookup_variable(&self, name: &str) -> Option<(PointerValue<'ctx>, Type)> {
        for scope in self.scopes.borrow().iter().rev() {
            if let Some(found) = scope.variables.get(name) {
                return Some(found.clone());
            }
        }
        self.globals.borrow().get(name).cloned()
    }

    fn declare_function(&self, name: &str, info: FunctionInfo<'ctx>) {
        self.functions.borrow_mut().insert(name.to_string(), info);
    }

    fn find_function_value(&self, name: &str) -> Option<FunctionValue<'ctx>> {
        self.functions.borrow().get(name).map(|f| f.value)
    }

    fn find_function_return_type(&self, name: &str) -> Option<Type> {
        self.functions.borrow().get(name).map(|f| f.return_type.clone())
    }

    fn find_function_param_types(&self, name: &str) -> Option<Vec<Type>> {
        self.functions
            .borrow()
            .get(name)
            .map(|f| f.params.iter().map(|(_, t)| t.clone()).collect())
    }

    fn push_loop_end(&self, block: BasicBlock<'ctx>) {
        self.loop_ends.borrow_mut().push(block);
    }

    fn pop_loop_end(&self) {
        self.loop_ends.borrow_mut().pop();
    }

    fn current_loop_end(&self) -> Option<BasicBlock<'ctx>> {
        self.loop_ends.borrow().last().copied()
    }

    /// Cached `"true"`/`"false"` globals for boolean-to-string printing.
    fn bool_literal_ptr(&self, value: bool) -> PointerValue<'ctx> {
        let cell = if value { &self.true_str } else { &self.false_str };
        if let Some(existing) = *cell.borrow() {
            return existing;
        }
        let text = if value { "true" } else { "false" };
        let global = self.builder.build_global_string_ptr(text, "").unwrap();
        let ptr = global.as_pointer_value();
        *cell.borrow_mut() = Some(ptr);
        ptr
    }

    fn resolve_type(&self, annotation: &TypeAnnotation) -> Result<Type, Diagnostic> {
        self.struct_table.resolve_annotation(annotation)
    }

    /// Runs a global's initializer expression and stores it into the
    /// global storage `declare_global_stmt` already allocated, in
    /// textual order inside `main` (`spec.md` §3's "Lifecycles").
    fn lower_global_initializer(&self, stmt: &Stmt) -> Result<(), Diagnostic> {
        let Stmt::Assignment { id, value, info, .. } = stmt else {
            unreachable!("lower_global_initializer only ever receives Stmt::Assignment")
        };
        let (ptr, declared_ty) = self.globals.borrow().get(id).cloned().ok_or_else(|| {
            Diagnostic::codegen_at(format!("global '{id}' was not declared"), info.span.clone(), info.source_line.clone())
        })?;
        let value_ty = self.infer_expr_type(value)?;
        let value_val = self.lower_expr(value)?;
        let coerced = self.coerce_value(value_val, &value_ty, &declared_ty);
        self.builder.build_store(ptr, coerced).unwrap();
        Ok(())
    }
}

/// Runs the full pipeline's code-generation stage: builds the struct
/// table, declares globals/functions (local and imported), synthesizes
/// `main`, then generates every function body.
pub fn generate<'ctx>(
    context: &'ctx Context,
    module_name: &str,
    program: &Program,
    imported: &[(String, Export)],
) -> Result<Module<'ctx>, Diagnostic> {
    let ctx = build_context(context, module_name, program, imported);
    match generate_inner(&ctx, program, imported) {
        Ok(()) => Ok(ctx.module),
        Err(diagnostic) => Err(diagnostic),
    }
}

/// The debug-IR entry point's code-generation half (`spec.md` §7): always
/// returns whatever IR was produced before the first error, alongside
/// that error if one occurred, instead of discarding the partially built
/// module the way [`generate`] does.
pub fn generate_debug<'ctx>(
    context: &'ctx Context,
    module_name: &str,
    program: &Program,
    imported: &[(String, Export)],
) -> (Module<'ctx>, Option<Diagnostic>) {
    let ctx = build_context(context, module_name, program, imported);
    let diagnostic = generate_inner(&ctx, program, imported).err();
    (ctx.module, diagnostic)
}

fn build_context<'ctx>(
    context: &'ctx Context,
    module_name: &str,
    program: &Program,
    imported: &[(String, Export)],
) -> CodegenContext<'ctx> {
    let mut struct_defs: Vec<Stmt> = program.struct_definitions().cloned().collect();
    for (_, export) in imported {
        if let Export::Struct(stmt) = export {
            struct_defs.push(stmt.clone());
        }
    }
    CodegenContext::new(context, module_name, &struct_defs)
}

fn generate_inner<'ctx>(
    ctx: &CodegenContext<'ctx>,
    program: &Program,
    imported: &[(String, Export)],
) -> Result<(), Diagnostic> {
    ctx.struct_table.build_all()?;

    ctx.enter_scope(); // a throwaway top scope; globals are tracked separately

    // Phase A.2 — declare every global `Assignment`.
    let mut global_stmts: Vec<&Stmt> = vec![];
    for stmt in &program.statements {
        if let Stmt::Assignment { is_global: true, .. } = stmt {
            global_stmts.push(stmt);
        }
    }
    for (_, export) in imported {
        if let Export::Global(stmt) = export {
            declare_global_stmt(ctx, stmt)?;
        }
    }
    for stmt in &global_stmts {
        declare_global_stmt(ctx, stmt)?;
    }

    // Phase A.3 — declare every function (local + imported).
    let mut function_stmts: Vec<&Stmt> = program.functions().collect();
    let imported_functions: Vec<Stmt> = imported
        .iter()
        .filter_map(|(_, export)| match export {
            Export::Function(stmt) => Some(stmt.clone()),
            _ => None,
        })
        .collect();
    for stmt in &imported_functions {
        declare_function_stmt(ctx, stmt)?;
    }
    for stmt in &function_stmts {
        declare_function_stmt(ctx, stmt)?;
    }

    // Phase A.4/A.5 — synthesize `main`.
    synthesize_main(ctx, program)?;

    // Phase B — generate every function body, in a fresh local scope.
    function_stmts.extend(imported_functions.iter());
    for stmt in &function_stmts {
        generate_function_body(ctx, stmt)?;
    }

    ctx.exit_scope();
    Ok(())
}

fn declare_global_stmt<'ctx>(ctx: &CodegenContext<'ctx>, stmt: &Stmt) -> Result<(), Diagnostic> {
    let Stmt::Assignment {
        id,
        declared_type,
        value,
        info,
        ..
    } = stmt
    else {
        unreachable!("declare_global_stmt only ever receives Stmt::Assignment")
    };

    if ctx.globals.borrow().contains_key(id) {
        return Err(Diagnostic::codegen_at(
            format!("duplicate global '{id}'"),
            info.span.clone(),
            info.source_line.clone(),
        ));
    }

    let declared_ty = match declared_type {
        Some(annotation) => ctx.resolve_type(annotation)?,
        None => ctx.infer_expr_type(value)?,
    };

    let llvm_ty = ctx.struct_table.llvm_basic_type(&declared_ty);
    let global = ctx.module.add_global(llvm_ty, None, id);
    global.set_initializer(&zero_value(ctx, &declared_ty));

    ctx.declare_global(id, global.as_pointer_value(), declared_ty);
    Ok(())
}

fn zero_value<'ctx>(ctx: &CodegenContext<'ctx>, ty: &Type) -> inkwell::values::BasicValueEnum<'ctx> {
    use inkwell::values::BasicValueEnum;
    match ty {
        Type::Int => BasicValueEnum::IntValue(ctx.context.i64_type().const_zero()),
        Type::Float => BasicValueEnum::FloatValue(ctx.context.f64_type().const_zero()),
        Type::Bool => BasicValueEnum::IntValue(ctx.context.bool_type().const_zero()),
        Type::Array {
            element,
            size: Some(n),
        } => {
            let elem_llvm = ctx.struct_table.llvm_basic_type(element);
            let zero_elem = zero_value(ctx, element);
            let arr_ty = elem_llvm.array_type(*n as u32);
            let elems: Vec<_> = (0..*n).map(|_| zero_elem).collect();
            match zero_elem {
                BasicValueEnum::IntValue(_) => {
                    arr_ty.const_array(&elems.iter().map(|e| e.into_int_value()).collect::<Vec<_>>()).into()
                }
                BasicValueEnum::FloatValue(_) => {
                    arr_ty.const_array(&elems.iter().map(|e| e.into_float_value()).collect::<Vec<_>>()).into()
                }
                _ => arr_ty.const_zero().into(),
            }
        }
        Type::Struct { .. } => ctx
            .struct_table
            .llvm_basic_type(ty)
            .into_struct_type()
            .const_zero()
            .into(),
        _ => BasicValueEnum::PointerValue(ctx.context.ptr_type(AddressSpace::default()).const_null()),
    }
}

fn declare_function_stmt<'ctx>(ctx: &CodegenContext<'ctx>, stmt: &Stmt) -> Result<(), Diagnostic> {
    let Stmt::Function {
        name,
        params,
        return_type,
        ..
    } = stmt
    else {
        unreachable!("declare_function_stmt only ever receives Stmt::Function")
    };

    if ctx.find_function_value(name).is_some() {
        return Ok(()); // already declared (diamond import or re-declaration)
    }

    let mut param_types = vec![];
    let mut llvm_param_types = vec![];
    for (_, annotation) in params {
        let ty = ctx.resolve_type(annotation)?;
        llvm_param_types.push(metadata_type(ctx, &ty));
        param_types.push(ty);
    }

    let return_ty = ctx.resolve_type(return_type)?;
    let fn_type = if matches!(return_ty, Type::Void) {
        ctx.context.void_type().fn_type(&llvm_param_types, false)
    } else {
        build_fn_type(ctx, &return_ty, &llvm_param_types)
    };

    let function = ctx.module.add_function(name, fn_type, None);
    ctx.declare_function(
        name,
        FunctionInfo {
            value: function,
            params: params
                .iter()
                .zip(param_types)
                .map(|((n, _), t)| (n.clone(), t))
                .collect(),
            return_type: return_ty,
        },
    );
    Ok(())
}

fn metadata_type<'ctx>(ctx: &CodegenContext<'ctx>, ty: &Type) -> inkwell::types::BasicMetadataTypeEnum<'ctx> {
    ctx.struct_table.llvm_basic_type(ty).into()
}

fn build_fn_type<'ctx>(
    ctx: &CodegenContext<'ctx>,
    return_type: &Type,
    params: &[inkwell::types::BasicMetadataTypeEnum<'ctx>],
) -> inkwell::types::FunctionType<'ctx> {
    use inkwell::types::BasicTypeEnum;
    match ctx.struct_table.llvm_basic_type(return_type) {
        BasicTypeEnum::IntType(t) => t.fn_type(params, false),
        BasicTypeEnum::FloatType(t) => t.fn_type(params, false),
        BasicTypeEnum::PointerType(t) => t.fn_type(params, false),
        BasicTypeEnum::StructType(t) => t.fn_type(params, false),
        BasicTypeEnum::ArrayType(t) => t.fn_type(params, false),
        BasicTypeEnum::VectorType(t) => t.fn_type(params, false),
        BasicTypeEnum::ScalableVectorType(t) => t.fn_type(params, false),
    }
}

/// Synthesizes `main`'s body as the top-level statement sequence in
/// textual order, mixing global initializations with any top-level
/// control/print statements, then emits the allocation-ledger cleanup
/// and `return 0` (`spec.md` §4.5 Phase A steps 4-5).
fn synthesize_main<'ctx>(ctx: &CodegenContext<'ctx>, program: &Program) -> Result<(), Diagnostic> {
    let i32_ty = ctx.context.i32_type();
    let main_fn = ctx.module.add_function("main", i32_ty.fn_type(&[], false), None);
    let entry = ctx.context.append_basic_block(main_fn, "entry");
    ctx.builder.position_at_end(entry);

    ctx.enter_scope();
    *ctx.ledger_active.borrow_mut() = true;
    for stmt in &program.statements {
        match stmt {
            // Global declarations were already given storage in Phase A;
            // here we only run their initializers, in textual order.
            Stmt::Assignment { is_global: true, .. } => ctx.lower_global_initializer(stmt)?,
            Stmt::Function { .. } | Stmt::StructDefinition { .. } | Stmt::Use { .. } => {}
            other => ctx.lower_stmt(other)?,
        }
    }
    *ctx.ledger_active.borrow_mut() = false;
    ctx.exit_scope();

    ctx.ledger.emit_cleanup(ctx, &ctx.runtime);
    ctx.builder.build_return(Some(&i32_ty.const_zero())).unwrap();
    Ok(())
}

fn generate_function_body<'ctx>(ctx: &CodegenContext<'ctx>, stmt: &Stmt) -> Result<(), Diagnostic> {
    let Stmt::Function {
        name, params, body, ..
    } = stmt
    else {
        unreachable!("generate_function_body only ever receives Stmt::Function")
    };

    let function = ctx
        .find_function_value(name)
        .expect("declared in Phase A");
    let return_type = ctx.find_function_return_type(name).expect("declared in Phase A");

    let entry = ctx.context.append_basic_block(function, "entry");
    ctx.builder.position_at_end(entry);
    ctx.enter_scope();

    let param_types = ctx.find_function_param_types(name).expect("declared in Phase A");
    for (i, ((param_name, _), param_type)) in params.iter().zip(param_types).enumerate() {
        let llvm_param = function.get_nth_param(i as u32).expect("param count matches");
        let alloca = ctx
            .builder
            .build_alloca(ctx.struct_table.llvm_basic_type(&param_type), param_name)
            .unwrap();
        ctx.builder.build_store(alloca, llvm_param).unwrap();
        ctx.declare_local(param_name, alloca, param_type);
    }

    for s in body {
        ctx.lower_stmt(s)?;
    }

    // Missing return at the end of a non-void function emits a
    // zero-value return (`spec.md` §4.5's `Return` lowering note).
    if ctx
        .builder
        .get_insert_block()
        .and_then(|b| b.get_terminator())
        .is_none()
    {
        match return_type {
            Type::Void => {
                ctx.builder.build_return(None).unwrap();
            }
            other => {
                let zero = zero_value(ctx, &other);
                ctx.builder.build_return(Some(&zero)).unwrap();
            }
        }
    }

    ctx.exit_scope();
    Ok(())
}
