//! The closed type sum shared by the checker and the code generator.
//!
//! Mirrors the role of `why_lib::typechecker::Type`: a canonical semantic
//! type representation built from the parser's syntactic type annotations,
//! used for inference, validation and LLVM type lowering.

use std::collections::BTreeMap;

/// A semantic Noxy type. Two struct types compare equal iff their names
/// match (`spec.md` §3) — the field map is carried for lowering but is not
/// part of struct equality.
#[derive(Debug, Clone)]
pub enum Type {
    Int,
    Float,
    String,
    Bool,
    Void,
    Null,
    /// `size: None` means heap/dynamic (an unsized array).
    Array {
        element: Box<Type>,
        size: Option<usize>,
    },
    Function {
        params: Vec<Type>,
        return_type: Box<Type>,
    },
    /// Field order is declaration order and defines the physical layout.
    Struct {
        name: String,
        fields: Vec<(String, Type)>,
    },
    Reference {
        target: Box<Type>,
        mutable: bool,
    },
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int, Self::Int)
            | (Self::Float, Self::Float)
            | (Self::String, Self::String)
            | (Self::Bool, Self::Bool)
            | (Self::Void, Self::Void)
            | (Self::Null, Self::Null) => true,
            (
                Self::Array { element: le, size: ls },
                Self::Array { element: re, size: rs },
            ) => le == re && ls == rs,
            (
                Self::Function { params: lp, return_type: lr },
                Self::Function { params: rp, return_type: rr },
            ) => lp == rp && lr == rr,
            // struct equality is by name only, per spec.md §3
            (Self::Struct { name: ln, .. }, Self::Struct { name: rn, .. }) => ln == rn,
            (
                Self::Reference { target: lt, mutable: lm },
                Self::Reference { target: rt, mutable: rm },
            ) => lt == rt && lm == rm,
            _ => false,
        }
    }
}

impl Eq for Type {}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn struct_field_index(&self, field: &str) -> Option<usize> {
        match self {
            Type::Struct { fields, .. } => fields.iter().position(|(name, _)| name == field),
            _ => None,
        }
    }

    pub fn struct_field_type(&self, field: &str) -> Option<&Type> {
        match self {
            Type::Struct { fields, .. } => {
                fields.iter().find(|(name, _)| name == field).map(|(_, ty)| ty)
            }
            _ => None,
        }
    }

    /// Field-name -> index map, built once and shared for the lifetime of
    /// the struct table (`spec.md` §3's "auxiliary map").
    pub fn field_index_map(&self) -> BTreeMap<String, usize> {
        match self {
            Type::Struct { fields, .. } => fields
                .iter()
                .enumerate()
                .map(|(i, (name, _))| (name.clone(), i))
                .collect(),
            _ => BTreeMap::new(),
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "string"),
            Type::Bool => write!(f, "bool"),
            Type::Void => write!(f, "void"),
            Type::Null => write!(f, "null"),
            Type::Array { element, size: Some(n) } => write!(f, "{element}[{n}]"),
            Type::Array { element, size: None } => write!(f, "{element}[]"),
            Type::Function { params, return_type } => {
                let params = params.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ");
                write!(f, "func({params}) -> {return_type}")
            }
            Type::Struct { name, .. } => write!(f, "{name}"),
            Type::Reference { target, .. } => write!(f, "ref {target}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structs_compare_equal_by_name_only() {
        let a = Type::Struct {
            name: "Point".into(),
            fields: vec![("x".into(), Type::Int)],
        };
        let b = Type::Struct {
            name: "Point".into(),
            fields: vec![("x".into(), Type::Int), ("y".into(), Type::Int)],
        };
        assert_eq!(a, b);
    }

    #[test]
    fn field_index_map_preserves_declaration_order() {
        let s = Type::Struct {
            name: "P".into(),
            fields: vec![("x".into(), Type::Int), ("y".into(), Type::Int)],
        };
        let map = s.field_index_map();
        assert_eq!(map["x"], 0);
        assert_eq!(map["y"], 1);
    }
}
