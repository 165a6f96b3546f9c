use std::collections::HashMap;
use std::fmt::Display;

use super::binding::Binding;
use super::term::FnParam;
use super::types::{Field, Type, TypeAlias, TypeDef, TypeStruct};

/// Stable identifier of a declaration, assigned by the id assigner and
/// never reused. Path-shaped: `<module>::<class>::<name>[::…]`.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct DeclId(pub String);

impl DeclId {
    pub fn new(id: impl ToString) -> DeclId {
        DeclId(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DeclId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeclId {
    fn from(value: &str) -> Self {
        DeclId(value.to_string())
    }
}

/// Anything the reference resolver can target: a binding, a bound
/// parameter, or a struct field (the target of a qualified reference).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum IndexedDecl {
    Binding(Binding),
    Param(FnParam),
    Field(Field),
}

impl IndexedDecl {
    pub fn name(&self) -> &str {
        match self {
            IndexedDecl::Binding(binding) => &binding.name,
            IndexedDecl::Param(param) => &param.name,
            IndexedDecl::Field(field) => &field.name,
        }
    }

    pub fn id(&self) -> Option<&DeclId> {
        match self {
            IndexedDecl::Binding(binding) => binding.id.as_ref(),
            IndexedDecl::Param(param) => param.id.as_ref(),
            IndexedDecl::Field(field) => field.id.as_ref(),
        }
    }

    /// The declaration's effective type, as far as it is known.
    pub fn ty(&self) -> Option<&Type> {
        match self {
            IndexedDecl::Binding(binding) => binding.type_spec.as_ref(),
            IndexedDecl::Param(param) => param.ty(),
            IndexedDecl::Field(field) => Some(&field.ty),
        }
    }

    pub fn as_binding(&self) -> Option<&Binding> {
        match self {
            IndexedDecl::Binding(binding) => Some(binding),
            _ => None,
        }
    }

    pub fn as_param(&self) -> Option<&FnParam> {
        match self {
            IndexedDecl::Param(param) => Some(param),
            _ => None,
        }
    }
}

/// A type-level declaration the type resolver can target.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TypeDecl {
    Def(TypeDef),
    Alias(TypeAlias),
    Struct(TypeStruct),
}

impl TypeDecl {
    pub fn name(&self) -> &str {
        match self {
            TypeDecl::Def(def) => &def.name,
            TypeDecl::Alias(alias) => &alias.name,
            TypeDecl::Struct(ts) => &ts.name,
        }
    }

    pub fn id(&self) -> Option<&DeclId> {
        match self {
            TypeDecl::Def(def) => def.id.as_ref(),
            TypeDecl::Alias(alias) => alias.id.as_ref(),
            TypeDecl::Struct(ts) => ts.id.as_ref(),
        }
    }
}

/// Id-to-declaration lookup tables shared by every phase. Two tables:
/// value-level resolvables (bindings, params) and type-level resolvables.
/// Updates are monotonic inserts or replace-by-id; the indexer phase
/// rebuilds the value table wholesale after the expression rewriter has
/// introduced new lambdas.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResolvablesIndex {
    resolvables: HashMap<DeclId, IndexedDecl>,
    type_resolvables: HashMap<DeclId, TypeDecl>,
}

impl ResolvablesIndex {
    /// Insert or replace a declaration by its id. Declarations without an
    /// id are ignored; the id assigner runs before anything is indexed.
    pub fn update(&mut self, decl: IndexedDecl) {
        if let Some(id) = decl.id().cloned() {
            self.resolvables.insert(id, decl);
        }
    }

    pub fn update_all(&mut self, params: &[FnParam]) {
        for param in params {
            self.update(IndexedDecl::Param(param.clone()));
        }
    }

    pub fn update_type(&mut self, decl: TypeDecl) {
        if let Some(id) = decl.id().cloned() {
            self.type_resolvables.insert(id, decl);
        }
    }

    pub fn lookup(&self, id: &DeclId) -> Option<&IndexedDecl> {
        self.resolvables.get(id)
    }

    pub fn lookup_type(&self, id: &DeclId) -> Option<&TypeDecl> {
        self.type_resolvables.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &DeclId> {
        self.resolvables.keys()
    }

    pub fn type_ids(&self) -> impl Iterator<Item = &DeclId> {
        self.type_resolvables.keys()
    }

    pub fn len(&self) -> usize {
        self.resolvables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvables.is_empty() && self.type_resolvables.is_empty()
    }
}
