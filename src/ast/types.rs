use std::fmt::Display;

use super::resolvable::DeclId;
use super::source::SourceOrigin;
use super::Visibility;

/// Memory behaviour of a type's values: heap-allocated values must be
/// freed by their owning scope, static values never are.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MemEffect {
    Alloc,
    Static,
}

/// LLVM-level representation of a native primitive. The semantic core
/// never talks to LLVM itself; this is the value-level description handed
/// to the IR emitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum NativeType {
    I1,
    I8,
    I32,
    I64,
    F64,
    Ptr,
}

impl NativeType {
    pub fn llvm_name(&self) -> &'static str {
        match self {
            NativeType::I1 => "i1",
            NativeType::I8 => "i8",
            NativeType::I32 => "i32",
            NativeType::I64 => "i64",
            NativeType::F64 => "double",
            NativeType::Ptr => "ptr",
        }
    }
}

/// A named reference to a type declaration. `resolved_id` is filled by
/// the type resolver; until then the reference is name-only.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TypeRef {
    pub name: String,
    pub resolved_id: Option<DeclId>,
    pub origin: SourceOrigin,
}

impl TypeRef {
    pub fn named(name: impl ToString, origin: SourceOrigin) -> TypeRef {
        TypeRef {
            name: name.to_string(),
            resolved_id: None,
            origin,
        }
    }

    pub fn resolved(name: impl ToString, id: DeclId) -> TypeRef {
        TypeRef {
            name: name.to_string(),
            resolved_id: Some(id),
            origin: SourceOrigin::Synth,
        }
    }
}

/// A named, typed struct field. Fields are resolvable: the id assigner
/// gives each one a stable `<module>::typestruct::<struct>::<field>` id so
/// qualified references can target it.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub id: Option<DeclId>,
    pub origin: SourceOrigin,
}

impl Field {
    pub fn new(name: impl ToString, ty: Type, origin: SourceOrigin) -> Field {
        Field {
            name: name.to_string(),
            ty,
            id: None,
            origin,
        }
    }
}

/// Semantic type term. Everything type-shaped in the tree is one of
/// these, including the explicit `Invalid` marker that replaces
/// unresolvable references so later passes still have a well-formed type
/// to look at.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Type {
    Ref(TypeRef),
    Fn {
        params: Vec<Type>,
        ret: Box<Type>,
    },
    Tuple(Vec<Type>),
    Struct(Vec<Field>),
    Unit,
    NativePrimitive(NativeType),
    NativeStruct(Vec<Field>),
    Union(Vec<Type>),
    Intersection(Vec<Type>),
    Application {
        base: Box<Type>,
        args: Vec<Type>,
    },
    Scheme {
        vars: Vec<String>,
        body: Box<Type>,
    },
    /// Marker for a reference that failed to resolve; keeps the original
    /// around for error reporting.
    Invalid(Box<Type>),
}

impl Type {
    pub fn reference(name: impl ToString, origin: SourceOrigin) -> Type {
        Type::Ref(TypeRef::named(name, origin))
    }

    pub fn function(params: Vec<Type>, ret: Type) -> Type {
        Type::Fn {
            params,
            ret: Box::new(ret),
        }
    }

    /// Arity of a function type; zero for everything else.
    pub fn arity(&self) -> usize {
        match self {
            Type::Fn { params, .. } => params.len(),
            _ => 0,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Type::Invalid(_))
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Ref(type_ref) => write!(f, "{}", type_ref.name),
            Type::Fn { params, ret } => {
                let params = params
                    .iter()
                    .map(|p| format!("{p}"))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                write!(f, "{params} -> {ret}")
            }
            Type::Tuple(elements) => {
                let elements = elements
                    .iter()
                    .map(|e| format!("{e}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "({elements})")
            }
            Type::Struct(fields) | Type::NativeStruct(fields) => {
                let fields = fields
                    .iter()
                    .map(|field| format!("{}: {}", field.name, field.ty))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{ {fields} }}")
            }
            Type::Unit => write!(f, "Unit"),
            Type::NativePrimitive(native) => write!(f, "@{}", native.llvm_name()),
            Type::Union(members) => {
                let members = members
                    .iter()
                    .map(|m| format!("{m}"))
                    .collect::<Vec<_>>()
                    .join(" | ");
                write!(f, "{members}")
            }
            Type::Intersection(members) => {
                let members = members
                    .iter()
                    .map(|m| format!("{m}"))
                    .collect::<Vec<_>>()
                    .join(" & ");
                write!(f, "{members}")
            }
            Type::Application { base, args } => {
                let args = args
                    .iter()
                    .map(|a| format!("{a}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                write!(f, "{base} {args}")
            }
            Type::Scheme { vars, body } => {
                write!(f, "[{}] => {body}", vars.join(", "))
            }
            Type::Invalid(original) => write!(f, "<invalid {original}>"),
        }
    }
}

/// An opaque or native-backed type declaration. `spec` is `None` for
/// opaque types and a `NativePrimitive`/`NativeStruct` for native-backed
/// ones; `mem_effect` declares whether values may live on the heap.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TypeDef {
    pub name: String,
    pub visibility: Visibility,
    pub spec: Option<Type>,
    pub mem_effect: Option<MemEffect>,
    pub id: Option<DeclId>,
    pub origin: SourceOrigin,
}

/// A name for another type. `referenced` is the raw parsed reference;
/// `type_spec` is the canonical form computed by the type resolver after
/// following the alias chain.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TypeAlias {
    pub name: String,
    pub visibility: Visibility,
    pub referenced: Type,
    pub type_spec: Option<Type>,
    pub id: Option<DeclId>,
    pub origin: SourceOrigin,
}

/// A named record type with ordered fields.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TypeStruct {
    pub name: String,
    pub visibility: Visibility,
    pub fields: Vec<Field>,
    pub id: Option<DeclId>,
    pub origin: SourceOrigin,
}

impl TypeStruct {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
}
