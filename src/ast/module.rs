use super::binding::Binding;
use super::resolvable::{DeclId, ResolvablesIndex};
use super::source::SourceOrigin;
use super::types::{TypeAlias, TypeDef, TypeStruct};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Visibility {
    Public,
    Private,
}

/// Parser-produced placeholder for a member it could not parse at all.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParsingMemberError {
    pub message: String,
    pub origin: SourceOrigin,
}

/// Parser-produced placeholder for a malformed identifier.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParsingIdError {
    pub name: String,
    pub message: String,
    pub origin: SourceOrigin,
}

/// Replaces the second and later members of a duplicate-name group,
/// pointing back at the surviving original.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DuplicateMember {
    pub member: Member,
    pub original_name: String,
    pub original_origin: SourceOrigin,
}

/// Replaces a declaration rejected as a whole (e.g. duplicate parameter
/// names), preserving the original for reporting.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InvalidMember {
    pub member: Member,
    pub reason: String,
}

/// A top-level declaration, or an error marker standing in for one.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Member {
    Binding(Binding),
    TypeDef(TypeDef),
    TypeAlias(TypeAlias),
    TypeStruct(TypeStruct),
    ParsingMemberError(ParsingMemberError),
    ParsingIdError(ParsingIdError),
    DuplicateMember(Box<DuplicateMember>),
    InvalidMember(Box<InvalidMember>),
}

impl Member {
    /// The declared name, when the member has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Member::Binding(binding) => Some(&binding.name),
            Member::TypeDef(def) => Some(&def.name),
            Member::TypeAlias(alias) => Some(&alias.name),
            Member::TypeStruct(ts) => Some(&ts.name),
            Member::ParsingIdError(err) => Some(&err.name),
            Member::ParsingMemberError(_) => None,
            Member::DuplicateMember(dup) => dup.member.name(),
            Member::InvalidMember(invalid) => invalid.member.name(),
        }
    }

    pub fn id(&self) -> Option<&DeclId> {
        match self {
            Member::Binding(binding) => binding.id.as_ref(),
            Member::TypeDef(def) => def.id.as_ref(),
            Member::TypeAlias(alias) => alias.id.as_ref(),
            Member::TypeStruct(ts) => ts.id.as_ref(),
            _ => None,
        }
    }

    pub fn origin(&self) -> SourceOrigin {
        match self {
            Member::Binding(binding) => binding.origin,
            Member::TypeDef(def) => def.origin,
            Member::TypeAlias(alias) => alias.origin,
            Member::TypeStruct(ts) => ts.origin,
            Member::ParsingMemberError(err) => err.origin,
            Member::ParsingIdError(err) => err.origin,
            Member::DuplicateMember(dup) => dup.member.origin(),
            Member::InvalidMember(invalid) => invalid.member.origin(),
        }
    }

    pub fn is_error_marker(&self) -> bool {
        matches!(
            self,
            Member::ParsingMemberError(_)
                | Member::ParsingIdError(_)
                | Member::DuplicateMember(_)
                | Member::InvalidMember(_)
        )
    }
}

/// Top-level container handed over by the parser: a named, ordered list
/// of members plus the resolvables index maintained by the semantic
/// phases.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Module {
    pub name: String,
    pub visibility: Visibility,
    pub members: Vec<Member>,
    pub resolvables: ResolvablesIndex,
}

impl Module {
    pub fn new(name: impl ToString, visibility: Visibility, members: Vec<Member>) -> Module {
        Module {
            name: name.to_string(),
            visibility,
            members,
            resolvables: ResolvablesIndex::default(),
        }
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.members.iter().filter_map(|member| match member {
            Member::Binding(binding) => Some(binding),
            _ => None,
        })
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings().find(|binding| binding.name == name)
    }
}
