//! External runtime symbols the generated module links against.
//!
//! None of these are defined by this crate (`spec.md` §1's "explicitly out
//! of scope": the C runtime, the linker, and Noxy's small `casting_functions`
//! shim are external collaborators) — this module only declares their
//! signatures so the builder can emit `call` instructions against them.

use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::values::FunctionValue;
use inkwell::AddressSpace;

/// Handles to every external function the code generator may call.
pub struct RuntimeDecls<'ctx> {
    pub printf: FunctionValue<'ctx>,
    pub sprintf: FunctionValue<'ctx>,
    pub malloc: FunctionValue<'ctx>,
    pub realloc: FunctionValue<'ctx>,
    pub free: FunctionValue<'ctx>,
    pub strlen: FunctionValue<'ctx>,
    pub strcpy: FunctionValue<'ctx>,
    pub strcat: FunctionValue<'ctx>,
    pub strcmp: FunctionValue<'ctx>,
    pub fmod: FunctionValue<'ctx>,
    pub to_str_int: FunctionValue<'ctx>,
    pub to_str_float: FunctionValue<'ctx>,
    pub array_to_str_int: FunctionValue<'ctx>,
    pub array_to_str_float: FunctionValue<'ctx>,
    pub to_int: FunctionValue<'ctx>,
    pub to_float: FunctionValue<'ctx>,
    pub char_to_str: FunctionValue<'ctx>,
    /// Windows-only console UTF-8 setup; declared unconditionally (an
    /// unused `declare` costs nothing) so `main` can call them without a
    /// target-specific code path in the generator itself.
    pub wprintf: FunctionValue<'ctx>,
    pub set_mode: FunctionValue<'ctx>,
    pub set_console_output_cp: FunctionValue<'ctx>,
}

impl<'ctx> RuntimeDecls<'ctx> {
    pub fn declare(context: &'ctx Context, module: &Module<'ctx>) -> Self {
        let i8_ptr = context.ptr_type(AddressSpace::default());
        let i64_ty = context.i64_type();
        let i32_ty = context.i32_type();
        let f64_ty = context.f64_type();

        let printf = module.add_function(
            "printf",
            i32_ty.fn_type(&[i8_ptr.into()], true),
            None,
        );
        let sprintf = module.add_function(
            "sprintf",
            i32_ty.fn_type(&[i8_ptr.into(), i8_ptr.into()], true),
            None,
        );
        let malloc = module.add_function("malloc", i8_ptr.fn_type(&[i64_ty.into()], false), None);
        let realloc = module.add_function(
            "realloc",
            i8_ptr.fn_type(&[i8_ptr.into(), i64_ty.into()], false),
            None,
        );
        let free = module.add_function(
            "free",
            context.void_type().fn_type(&[i8_ptr.into()], false),
            None,
        );
        let strlen = module.add_function("strlen", i64_ty.fn_type(&[i8_ptr.into()], false), None);
        let strcpy = module.add_function(
            "strcpy",
            i8_ptr.fn_type(&[i8_ptr.into(), i8_ptr.into()], false),
            None,
        );
        let strcat = module.add_function(
            "strcat",
            i8_ptr.fn_type(&[i8_ptr.into(), i8_ptr.into()], false),
            None,
        );
        let strcmp = module.add_function(
            "strcmp",
            i32_ty.fn_type(&[i8_ptr.into(), i8_ptr.into()], false),
            None,
        );
        let fmod = module.add_function(
            "fmod",
            f64_ty.fn_type(&[f64_ty.into(), f64_ty.into()], false),
            None,
        );

        let to_str_int = module.add_function(
            "to_str_int",
            i8_ptr.fn_type(&[i64_ty.into()], false),
            None,
        );
        let to_str_float = module.add_function(
            "to_str_float",
            i8_ptr.fn_type(&[f64_ty.into()], false),
            None,
        );
        let array_to_str_int = module.add_function(
            "array_to_str_int",
            i8_ptr.fn_type(&[i8_ptr.into(), i64_ty.into()], false),
            None,
        );
        let array_to_str_float = module.add_function(
            "array_to_str_float",
            i8_ptr.fn_type(&[i8_ptr.into(), i64_ty.into()], false),
            None,
        );
        let to_int = module.add_function("to_int", i64_ty.fn_type(&[i8_ptr.into()], false), None);
        let to_float = module.add_function("to_float", f64_ty.fn_type(&[i8_ptr.into()], false), None);
        let char_to_str = module.add_function(
            "char_to_str",
            i8_ptr.fn_type(&[context.i8_type().into()], false),
            None,
        );

        let wprintf = module.add_function(
            "wprintf",
            i32_ty.fn_type(&[i8_ptr.into()], true),
            None,
        );
        let set_mode =
            module.add_function("_setmode", i32_ty.fn_type(&[i32_ty.into(), i32_ty.into()], false), None);
        let set_console_output_cp = module.add_function(
            "SetConsoleOutputCP",
            i32_ty.fn_type(&[i32_ty.into()], false),
            None,
        );

        Self {
            printf,
            sprintf,
            malloc,
            realloc,
            free,
            strlen,
            strcpy,
            strcat,
            strcmp,
            fmod,
            to_str_int,
            to_str_float,
            array_to_str_int,
            array_to_str_float,
            to_int,
            to_float,
            char_to_str,
            wprintf,
            set_mode,
            set_console_output_cp,
        }
    }
}
