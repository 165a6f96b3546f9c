use super::resolvable::DeclId;
use super::source::SourceOrigin;
use super::types::{MemEffect, Type, TypeRef};

/// A formal parameter of a function, operator or lambda.
///
/// `type_asc` is the parsed ascription (the language requires one on user
/// parameters); `type_spec` is filled in by the type checker. `consuming`
/// is true when the parameter was declared with the move sigil: calling
/// into it transfers ownership of the argument.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FnParam {
    pub name: String,
    pub type_asc: Option<Type>,
    pub type_spec: Option<Type>,
    pub id: Option<DeclId>,
    pub consuming: bool,
    pub origin: SourceOrigin,
}

impl FnParam {
    pub fn new(name: impl ToString, type_asc: Type, origin: SourceOrigin) -> FnParam {
        FnParam {
            name: name.to_string(),
            type_asc: Some(type_asc),
            type_spec: None,
            id: None,
            consuming: false,
            origin,
        }
    }

    pub fn consuming(name: impl ToString, type_asc: Type, origin: SourceOrigin) -> FnParam {
        FnParam {
            consuming: true,
            ..FnParam::new(name, type_asc, origin)
        }
    }

    /// The effective type of the parameter: the checked spec when present,
    /// otherwise the ascription.
    pub fn ty(&self) -> Option<&Type> {
        self.type_spec.as_ref().or(self.type_asc.as_ref())
    }
}

/// A reference to a value-level name, optionally qualified by a single
/// receiver (`point.x`). Resolution fills `candidate_ids` with every
/// declaration the name may target and `resolved_id` once a single winner
/// is known.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Ref {
    pub name: String,
    pub qualifier: Option<String>,
    pub resolved_id: Option<DeclId>,
    pub candidate_ids: Vec<DeclId>,
    pub origin: SourceOrigin,
}

impl Ref {
    pub fn named(name: impl ToString, origin: SourceOrigin) -> Ref {
        Ref {
            name: name.to_string(),
            qualifier: None,
            resolved_id: None,
            candidate_ids: vec![],
            origin,
        }
    }

    pub fn qualified(qualifier: impl ToString, name: impl ToString, origin: SourceOrigin) -> Ref {
        Ref {
            qualifier: Some(qualifier.to_string()),
            ..Ref::named(name, origin)
        }
    }

    pub fn resolved(name: impl ToString, id: DeclId) -> Ref {
        let id_clone = id.clone();
        Ref {
            name: name.to_string(),
            qualifier: None,
            resolved_id: Some(id),
            candidate_ids: vec![id_clone],
            origin: SourceOrigin::Synth,
        }
    }
}

/// A single curried application. `fun` is restricted to `Ref`, `App` or
/// `Lambda`; the restriction is dynamic, the expression rewriter emits a
/// term error for anything else in function position.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct App {
    pub fun: Term,
    pub arg: Term,
    pub origin: SourceOrigin,
}

/// Metadata attached to a lambda after analysis.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LambdaMeta {
    pub captures: Vec<String>,
    pub is_tail_recursive: bool,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Lambda {
    pub params: Vec<FnParam>,
    pub body: Term,
    pub meta: LambdaMeta,
    pub origin: SourceOrigin,
}

impl Lambda {
    pub fn new(params: Vec<FnParam>, body: Term, origin: SourceOrigin) -> Lambda {
        Lambda {
            params,
            body,
            meta: LambdaMeta::default(),
            origin,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Cond {
    pub cond: Term,
    pub if_true: Term,
    pub if_false: Term,
    pub origin: SourceOrigin,
}

/// Body marker for functions implemented by the backend rather than in
/// MML source. `mem_effect` declares whether calling the function
/// allocates.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NativeImpl {
    pub mem_effect: Option<MemEffect>,
    pub origin: SourceOrigin,
}

/// Body of a synthesized constructor: materializes a value of the struct
/// type from the constructor's parameters, in declaration order.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DataConstructor {
    pub type_ref: TypeRef,
    pub origin: SourceOrigin,
}

/// A flat, not-yet-rewritten sequence of terms as the parser produced it.
/// The expression rewriter collapses every `Expr` into a single nested
/// term; none survive it.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Expr {
    pub terms: Vec<Term>,
    pub origin: SourceOrigin,
}

impl Expr {
    pub fn new(terms: Vec<Term>, origin: SourceOrigin) -> Expr {
        Expr { terms, origin }
    }

    pub fn single(term: Term) -> Expr {
        let origin = term.origin();
        Expr {
            terms: vec![term],
            origin,
        }
    }
}

/// Marker replacing a subexpression the rewriter could not make sense of.
/// The original terms are preserved for reporting; downstream phases walk
/// past it without re-reporting.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TermError {
    pub terms: Vec<Term>,
    pub reason: String,
    pub origin: SourceOrigin,
}

/// Expression node. Applications are curried: each `App` takes exactly
/// one argument, so `f a b` is `App(App(f, a), b)`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Term {
    LiteralInt { value: i64, origin: SourceOrigin },
    LiteralFloat { value: f64, origin: SourceOrigin },
    LiteralBool { value: bool, origin: SourceOrigin },
    LiteralString { value: String, origin: SourceOrigin },
    LiteralUnit { origin: SourceOrigin },
    Ref(Ref),
    App(Box<App>),
    Lambda(Box<Lambda>),
    Cond(Box<Cond>),
    Group(Box<Term>),
    Tuple { elements: Vec<Term>, origin: SourceOrigin },
    NativeImpl(NativeImpl),
    DataConstructor(DataConstructor),
    Hole { origin: SourceOrigin },
    Placeholder { origin: SourceOrigin },
    Expr(Expr),
    TermError(Box<TermError>),
}

impl Term {
    pub fn origin(&self) -> SourceOrigin {
        match self {
            Term::LiteralInt { origin, .. }
            | Term::LiteralFloat { origin, .. }
            | Term::LiteralBool { origin, .. }
            | Term::LiteralString { origin, .. }
            | Term::LiteralUnit { origin }
            | Term::Tuple { origin, .. }
            | Term::Hole { origin }
            | Term::Placeholder { origin } => *origin,
            Term::Ref(reference) => reference.origin,
            Term::App(app) => app.origin,
            Term::Lambda(lambda) => lambda.origin,
            Term::Cond(cond) => cond.origin,
            Term::Group(inner) => inner.origin(),
            Term::NativeImpl(native) => native.origin,
            Term::DataConstructor(ctor) => ctor.origin,
            Term::Expr(expr) => expr.origin,
            Term::TermError(err) => err.origin,
        }
    }

    pub fn app(fun: Term, arg: Term) -> Term {
        let origin = fun.origin().merge(&arg.origin());
        Term::App(Box::new(App { fun, arg, origin }))
    }

    pub fn lambda(params: Vec<FnParam>, body: Term) -> Term {
        let origin = body.origin();
        Term::Lambda(Box::new(Lambda::new(params, body, origin)))
    }

    pub fn reference(name: impl ToString, origin: SourceOrigin) -> Term {
        Term::Ref(Ref::named(name, origin))
    }

    /// True for nodes the rewriter treats as complete atoms on their own:
    /// literals, holes and placeholders.
    pub fn is_atom(&self) -> bool {
        matches!(
            self,
            Term::LiteralInt { .. }
                | Term::LiteralFloat { .. }
                | Term::LiteralBool { .. }
                | Term::LiteralString { .. }
                | Term::LiteralUnit { .. }
                | Term::Hole { .. }
                | Term::Placeholder { .. }
        )
    }

    /// Peel a curried application spine: `((f a) b)` yields `(f, [a, b])`.
    /// A non-application term yields itself with no arguments.
    pub fn app_spine(&self) -> (&Term, Vec<&Term>) {
        let mut args = vec![];
        let mut head = self;
        while let Term::App(app) = head {
            args.push(&app.arg);
            head = &app.fun;
        }
        args.reverse();
        (head, args)
    }

    /// The base `Ref` of an application spine, if the spine bottoms out in
    /// one.
    pub fn spine_head_ref(&self) -> Option<&Ref> {
        match self.app_spine().0 {
            Term::Ref(reference) => Some(reference),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_spine() {
        let f = Term::reference("f", SourceOrigin::Synth);
        let a = Term::LiteralInt {
            value: 1,
            origin: SourceOrigin::Synth,
        };
        let b = Term::LiteralInt {
            value: 2,
            origin: SourceOrigin::Synth,
        };
        let spine = Term::app(Term::app(f, a), b);

        let (head, args) = spine.app_spine();
        assert!(matches!(head, Term::Ref(r) if r.name == "f"));
        assert_eq!(args.len(), 2);
        assert!(matches!(args[0], Term::LiteralInt { value: 1, .. }));
        assert!(matches!(args[1], Term::LiteralInt { value: 2, .. }));
    }

    #[test]
    fn test_spine_head_of_non_app() {
        let lit = Term::LiteralBool {
            value: true,
            origin: SourceOrigin::Synth,
        };
        assert!(lit.spine_head_ref().is_none());
        let (head, args) = lit.app_spine();
        assert!(args.is_empty());
        assert!(matches!(head, Term::LiteralBool { .. }));
    }
}
