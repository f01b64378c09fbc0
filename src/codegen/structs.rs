//! # Struct Table
//!
//! Builds every `StructDefinition` (local + imported) into a named LLVM
//! struct type, in dependency order, before any function body is lowered
//! (`spec.md` §4.5 Phase A step 1).
//!
//! `why_lib`'s code generator represents every pointer as an opaque `ptr`
//! (`ctx.context.ptr_type(Default::default())`, see `codegen/util.rs`)
//! rather than a typed pointer to a concrete pointee. Under that scheme a
//! `Reference` field never needs the pointee's LLVM type to exist yet, so
//! the "opaque/void-pointer placeholder for a back edge, bitcast at every
//! access site" machinery `spec.md` describes (written against an
//! implementation with typed pointers) collapses: every `Reference` field
//! is just `ptr`, full stop, whether or not its target struct has been
//! built. What the `UNSEEN -> PROCESSING -> DONE` state machine still
//! guards against is the one cycle that *is* illegal — a non-reference
//! field whose type is its own (in)direct container, which would require
//! infinite size and is rejected as a code-generation error rather than
//! silently placeholder'd.

use std::cell::RefCell;
use std::collections::HashMap;

use inkwell::context::Context;
use inkwell::types::StructType;
use inkwell::AddressSpace;

use crate::ast::{Stmt, TypeAnnotation};
use crate::diagnostics::Diagnostic;
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildState {
    Unseen,
    Processing,
    Done,
}

/// One struct's LLVM type plus the auxiliary `(field -> index)` /
/// `(field -> Type)` maps `spec.md` §3 requires.
#[derive(Debug, Clone)]
pub struct StructInfo<'ctx> {
    pub llvm_type: StructType<'ctx>,
    pub semantic: Type,
    pub field_index: HashMap<String, usize>,
    pub field_types: HashMap<String, Type>,
}

pub struct StructTable<'ctx> {
    context: &'ctx Context,
    defs: HashMap<String, (Vec<(String, TypeAnnotation)>, usize)>,
    order_hint: Vec<String>,
    info: RefCell<HashMap<String, StructInfo<'ctx>>>,
    state: RefCell<HashMap<String, BuildState>>,
}

impl<'ctx> StructTable<'ctx> {
    /// Collects every struct definition in the program (local + already
    /// resolved imports, both represented as `Stmt::StructDefinition`) and
    /// pre-declares an opaque named struct type for each, so field lookups
    /// and forward references never need a second pass to find a name.
    pub fn new(context: &'ctx Context, definitions: &[Stmt]) -> Self {
        let mut defs = HashMap::new();
        let mut order_hint = vec![];

        for (i, def) in definitions.iter().enumerate() {
            if let Stmt::StructDefinition { name, fields, .. } = def {
                defs.insert(name.clone(), (fields.clone(), i));
                order_hint.push(name.clone());
                context.opaque_struct_type(name);
            }
        }

        Self {
            context,
            defs,
            order_hint,
            info: RefCell::new(HashMap::new()),
            state: RefCell::new(HashMap::new()),
        }
    }

    /// Builds every struct's body in dependency order (value-typed fields
    /// force their field type to be built first; reference fields never
    /// force anything, since they lower to opaque `ptr`).
    pub fn build_all(&self) -> Result<(), Diagnostic> {
        let names = self.order_hint.clone();
        for name in names {
            self.ensure_built(&name)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<StructInfo<'ctx>> {
        self.info.borrow().get(name).cloned()
    }

    pub fn llvm_type(&self, name: &str) -> Option<StructType<'ctx>> {
        self.info.borrow().get(name).map(|i| i.llvm_type)
    }

    fn ensure_built(&self, name: &str) -> Result<(), Diagnostic> {
        match self.state.borrow().get(name).copied() {
            Some(BuildState::Done) => return Ok(()),
            Some(BuildState::Processing) => {
                return Err(Diagnostic::codegen(
                    format!(
                        "struct '{name}' has an illegal value cycle (a non-reference field whose type recursively contains '{name}')"
                    ),
                    None,
                    "",
                ));
            }
            _ => {}
        }

        self.state
            .borrow_mut()
            .insert(name.to_string(), BuildState::Processing);

        let Some((fields, _)) = self.defs.get(name).cloned() else {
            return Err(Diagnostic::codegen(
                format!("struct '{name}' was referenced but never defined"),
                None,
                "",
            ));
        };

        let mut field_index = HashMap::new();
        let mut field_types = HashMap::new();
        let mut llvm_fields = vec![];

        for (i, (field_name, annotation)) in fields.iter().enumerate() {
            let field_type = self.resolve_annotation(annotation)?;

            // Only a *value* struct field forces its target to be built
            // first; `Reference{Struct}` lowers to `ptr` regardless of
            // build state.
            if let Type::Struct { name: inner, .. } = &field_type {
                if !matches!(annotation, TypeAnnotation::Reference(_)) {
                    self.ensure_built(inner)?;
                }
            }
            if let Type::Array {
                element,
                size: Some(_),
            } = &field_type
            {
                if let Type::Struct { name: inner, .. } = element.as_ref() {
                    self.ensure_built(inner)?;
                }
            }

            field_index.insert(field_name.clone(), i);
            field_types.insert(field_name.clone(), field_type.clone());
            llvm_fields.push(self.llvm_basic_type(&field_type));
        }

        let llvm_type = self
            .context
            .get_struct_type(name)
            .unwrap_or_else(|| self.context.opaque_struct_type(name));
        llvm_type.set_body(&llvm_fields, false);

        let semantic = Type::Struct {
            name: name.to_string(),
            fields: fields
                .iter()
                .map(|(n, a)| (n.clone(), self.resolve_annotation(a).unwrap_or(Type::Void)))
                .collect(),
        };

        self.info.borrow_mut().insert(
            name.to_string(),
            StructInfo {
                llvm_type,
                semantic,
                field_index,
                field_types,
            },
        );
        self.state
            .borrow_mut()
            .insert(name.to_string(), BuildState::Done);
        Ok(())
    }

    /// Resolves a syntactic [`TypeAnnotation`] into a semantic [`Type`],
    /// looking up struct names against this table.
    pub fn resolve_annotation(&self, annotation: &TypeAnnotation) -> Result<Type, Diagnostic> {
        Ok(match annotation {
            TypeAnnotation::Int => Type::Int,
            TypeAnnotation::Float => Type::Float,
            TypeAnnotation::String => Type::String,
            TypeAnnotation::Bool => Type::Bool,
            TypeAnnotation::Void => Type::Void,
            TypeAnnotation::Name(name) => {
                if self.defs.contains_key(name) {
                    Type::Struct {
                        name: name.clone(),
                        fields: vec![],
                    }
                } else {
                    return Err(Diagnostic::codegen(
                        format!("unknown type name '{name}'"),
                        None,
                        "",
                    ));
                }
            }
            TypeAnnotation::Array(inner, size) => Type::Array {
                element: Box::new(self.resolve_annotation(inner)?),
                size: *size,
            },
            TypeAnnotation::Reference(inner) => Type::Reference {
                target: Box::new(self.resolve_annotation(inner)?),
                mutable: true,
            },
        })
    }

    /// Lowers a semantic [`Type`] to its LLVM representation, per
    /// `spec.md` §4.5's type lowering table. Struct field types are
    /// looked up from the table built so far; calling this before
    /// [`Self::build_all`] for a struct not yet processed returns its
    /// still-opaque (empty-body) named type, which is only safe for
    /// pointer-shaped uses (references), never for by-value embedding.
    pub fn llvm_basic_type(&self, ty: &Type) -> inkwell::types::BasicTypeEnum<'ctx> {
        use inkwell::types::BasicTypeEnum;
        match ty {
            Type::Int => BasicTypeEnum::IntType(self.context.i64_type()),
            Type::Float => BasicTypeEnum::FloatType(self.context.f64_type()),
            Type::Bool => BasicTypeEnum::IntType(self.context.bool_type()),
            Type::String => {
                BasicTypeEnum::PointerType(self.context.ptr_type(AddressSpace::default()))
            }
            Type::Null | Type::Void => {
                BasicTypeEnum::PointerType(self.context.ptr_type(AddressSpace::default()))
            }
            Type::Array {
                element,
                size: Some(n),
            } => BasicTypeEnum::ArrayType(self.llvm_basic_type(element).array_type(*n as u32)),
            Type::Array { size: None, .. } => {
                BasicTypeEnum::PointerType(self.context.ptr_type(AddressSpace::default()))
            }
            Type::Reference { .. } => {
                BasicTypeEnum::PointerType(self.context.ptr_type(AddressSpace::default()))
            }
            Type::Function { .. } => {
                BasicTypeEnum::PointerType(self.context.ptr_type(AddressSpace::default()))
            }
            Type::Struct { name, .. } => {
                let llvm_struct = self
                    .context
                    .get_struct_type(name)
                    .unwrap_or_else(|| self.context.opaque_struct_type(name));
                BasicTypeEnum::StructType(llvm_struct)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeInfo;

    fn struct_def(name: &str, fields: &[(&str, TypeAnnotation)]) -> Stmt {
        Stmt::StructDefinition {
            name: name.to_string(),
            fields: fields.iter().map(|(n, t)| (n.to_string(), t.clone())).collect(),
            info: NodeInfo::dummy(),
        }
    }

    #[test]
    fn value_field_forces_dependency_built_first() {
        let context = Context::create();
        let defs = vec![
            struct_def("Wrapper", &[("inner", TypeAnnotation::Name("Point".into()))]),
            struct_def(
                "Point",
                &[("x", TypeAnnotation::Int), ("y", TypeAnnotation::Int)],
            ),
        ];
        let table = StructTable::new(&context, &defs);
        table.build_all().unwrap();
        assert!(table.get("Point").is_some());
        assert!(table.get("Wrapper").is_some());
    }

    #[test]
    fn self_reference_field_does_not_force_a_cycle_error() {
        let context = Context::create();
        let defs = vec![struct_def(
            "Node",
            &[
                ("value", TypeAnnotation::Int),
                ("next", TypeAnnotation::Reference(Box::new(TypeAnnotation::Name("Node".into())))),
            ],
        )];
        let table = StructTable::new(&context, &defs);
        assert!(table.build_all().is_ok());
    }

    #[test]
    fn illegal_value_cycle_is_a_codegen_error() {
        let context = Context::create();
        let defs = vec![
            struct_def("A", &[("b", TypeAnnotation::Name("B".into()))]),
            struct_def("B", &[("a", TypeAnnotation::Name("A".into()))]),
        ];
        let table = StructTable::new(&context, &defs);
        assert!(table.build_all().is_err());
    }
}
