//! Resolves every type reference in the module, computes alias chains,
//! and rewrites undefined references into explicit `Invalid` markers.
//!
//! Four passes: (1) build the name -> declaration map; (2) resolve
//! references inside the type declarations themselves, twice, so alias
//! chains settle regardless of declaration order; (3) walk member bodies
//! and ascriptions strictly, marking and reporting what cannot resolve;
//! (4) compute each alias's canonical spec by following its chain.
//!
//! Aliases of native-backed typedefs compute to a `TypeRef` of the
//! typedef, never to the native representation, so source-level type
//! names survive into diagnostics and codegen.

use std::collections::{HashMap, HashSet};

use crate::ast::{DeclId, Member, SourceOrigin, Type, TypeDecl, TypeRef};

use super::error::{SemanticError, SemanticErrorKind};
use super::state::SemanticPhaseState;
use super::Phase;

const PHASE: &str = "types";

type TypeMap = HashMap<String, Vec<DeclId>>;

/// A reference that failed strict resolution.
struct Unresolved {
    name: String,
    origin: SourceOrigin,
    ambiguous: bool,
}

/// Lenient resolution: fill in ids where a unique target exists, leave
/// everything else untouched.
fn resolve_lenient(ty: &mut Type, map: &TypeMap) {
    match ty {
        Type::Ref(type_ref) => {
            if type_ref.resolved_id.is_none() {
                if let Some([id]) = map.get(&type_ref.name).map(Vec::as_slice) {
                    type_ref.resolved_id = Some(id.clone());
                }
            }
        }
        Type::Fn { params, ret } => {
            for p in params {
                resolve_lenient(p, map);
            }
            resolve_lenient(ret, map);
        }
        Type::Tuple(elements) | Type::Union(elements) | Type::Intersection(elements) => {
            for e in elements {
                resolve_lenient(e, map);
            }
        }
        Type::Struct(fields) | Type::NativeStruct(fields) => {
            for field in fields {
                resolve_lenient(&mut field.ty, map);
            }
        }
        Type::Application { base, args } => {
            resolve_lenient(base, map);
            for a in args {
                resolve_lenient(a, map);
            }
        }
        Type::Scheme { body, .. } => resolve_lenient(body, map),
        Type::Unit | Type::NativePrimitive(_) | Type::Invalid(_) => {}
    }
}

/// Strict resolution: like lenient, but references without a unique
/// target are replaced by `Invalid` markers and reported.
fn resolve_strict(ty: &mut Type, map: &TypeMap, missing: &mut Vec<Unresolved>) {
    match ty {
        Type::Ref(type_ref) => {
            if type_ref.resolved_id.is_some() {
                return;
            }
            match map.get(&type_ref.name).map(Vec::as_slice) {
                Some([id]) => type_ref.resolved_id = Some(id.clone()),
                Some(_) => {
                    missing.push(Unresolved {
                        name: type_ref.name.clone(),
                        origin: type_ref.origin,
                        ambiguous: true,
                    });
                    *ty = Type::Invalid(Box::new(ty.clone()));
                }
                None => {
                    missing.push(Unresolved {
                        name: type_ref.name.clone(),
                        origin: type_ref.origin,
                        ambiguous: false,
                    });
                    *ty = Type::Invalid(Box::new(ty.clone()));
                }
            }
        }
        Type::Fn { params, ret } => {
            for p in params {
                resolve_strict(p, map, missing);
            }
            resolve_strict(ret, map, missing);
        }
        Type::Tuple(elements) | Type::Union(elements) | Type::Intersection(elements) => {
            for e in elements {
                resolve_strict(e, map, missing);
            }
        }
        Type::Struct(fields) | Type::NativeStruct(fields) => {
            for field in fields {
                resolve_strict(&mut field.ty, map, missing);
            }
        }
        Type::Application { base, args } => {
            resolve_strict(base, map, missing);
            for a in args {
                resolve_strict(a, map, missing);
            }
        }
        Type::Scheme { body, .. } => resolve_strict(body, map, missing),
        Type::Unit | Type::NativePrimitive(_) | Type::Invalid(_) => {}
    }
}

/// Strictly resolve every type ascription appearing in a term.
fn resolve_in_term(term: &mut crate::ast::Term, map: &TypeMap, missing: &mut Vec<Unresolved>) {
    use crate::ast::Term;
    match term {
        Term::Lambda(lambda) => {
            for param in &mut lambda.params {
                if let Some(asc) = &mut param.type_asc {
                    resolve_strict(asc, map, missing);
                }
            }
            resolve_in_term(&mut lambda.body, map, missing);
        }
        Term::App(app) => {
            resolve_in_term(&mut app.fun, map, missing);
            resolve_in_term(&mut app.arg, map, missing);
        }
        Term::Cond(cond) => {
            resolve_in_term(&mut cond.cond, map, missing);
            resolve_in_term(&mut cond.if_true, map, missing);
            resolve_in_term(&mut cond.if_false, map, missing);
        }
        Term::Group(inner) => resolve_in_term(inner, map, missing),
        Term::Tuple { elements, .. } => {
            for e in elements {
                resolve_in_term(e, map, missing);
            }
        }
        Term::Expr(expr) => {
            for t in &mut expr.terms {
                resolve_in_term(t, map, missing);
            }
        }
        _ => {}
    }
}

/// Follow an alias's resolved reference chain to its canonical spec.
/// Typedefs and structs yield a `TypeRef` to themselves; alias-of-alias
/// follows through; structural types resolve structurally.
fn compute_alias_spec(
    referenced: &Type,
    by_id: &HashMap<DeclId, Member>,
    visiting: &mut HashSet<DeclId>,
) -> Option<Type> {
    match referenced {
        Type::Ref(TypeRef {
            resolved_id: Some(id),
            ..
        }) => {
            if !visiting.insert(id.clone()) {
                // alias cycle
                return None;
            }
            let spec = match by_id.get(id) {
                Some(Member::TypeDef(def)) => Some(Type::Ref(TypeRef {
                    name: def.name.clone(),
                    resolved_id: def.id.clone(),
                    origin: SourceOrigin::Synth,
                })),
                Some(Member::TypeStruct(ts)) => Some(Type::Ref(TypeRef {
                    name: ts.name.clone(),
                    resolved_id: ts.id.clone(),
                    origin: SourceOrigin::Synth,
                })),
                Some(Member::TypeAlias(alias)) => match &alias.type_spec {
                    Some(spec) => Some(spec.clone()),
                    None => compute_alias_spec(&alias.referenced, by_id, visiting),
                },
                _ => None,
            };
            visiting.remove(id);
            spec
        }
        Type::Ref(_) | Type::Invalid(_) => None,
        structural => Some(structural.clone()),
    }
}

pub struct TypeResolver;

impl Phase for TypeResolver {
    fn name(&self) -> &'static str {
        PHASE
    }

    fn run(&self, mut state: SemanticPhaseState) -> SemanticPhaseState {
        // pass 1: name -> ids
        let mut map: TypeMap = HashMap::new();
        for member in &state.module.members {
            let (name, id) = match member {
                Member::TypeDef(def) => (&def.name, &def.id),
                Member::TypeAlias(alias) => (&alias.name, &alias.id),
                Member::TypeStruct(ts) => (&ts.name, &ts.id),
                _ => continue,
            };
            if let Some(id) = id {
                map.entry(name.clone()).or_default().push(id.clone());
            }
        }

        // pass 2: settle references inside the type declarations, twice,
        // so chains resolve independent of declaration order
        for _ in 0..2 {
            for member in &mut state.module.members {
                match member {
                    Member::TypeDef(def) => {
                        if let Some(spec) = &mut def.spec {
                            resolve_lenient(spec, &map);
                        }
                    }
                    Member::TypeAlias(alias) => resolve_lenient(&mut alias.referenced, &map),
                    Member::TypeStruct(ts) => {
                        for field in &mut ts.fields {
                            resolve_lenient(&mut field.ty, &map);
                        }
                    }
                    _ => {}
                }
            }
        }

        // pass 3: strict resolution over declarations, ascriptions and
        // bodies; everything that cannot resolve becomes Invalid
        let mut reported = vec![];
        for member in &mut state.module.members {
            let member_name = member.name().unwrap_or("<unnamed>").to_string();
            let mut missing = vec![];
            match member {
                Member::TypeDef(def) => {
                    if let Some(spec) = &mut def.spec {
                        resolve_strict(spec, &map, &mut missing);
                    }
                }
                Member::TypeAlias(alias) => resolve_strict(&mut alias.referenced, &map, &mut missing),
                Member::TypeStruct(ts) => {
                    for field in &mut ts.fields {
                        resolve_strict(&mut field.ty, &map, &mut missing);
                    }
                }
                Member::Binding(binding) => {
                    if let Some(asc) = &mut binding.type_asc {
                        resolve_strict(asc, &map, &mut missing);
                    }
                    for term in &mut binding.body.terms {
                        resolve_in_term(term, &map, &mut missing);
                    }
                }
                _ => {}
            }
            for unresolved in missing {
                let kind = if unresolved.ambiguous {
                    SemanticErrorKind::AmbiguousTypeRef {
                        name: unresolved.name,
                        member: member_name.clone(),
                    }
                } else {
                    SemanticErrorKind::UndefinedTypeRef {
                        name: unresolved.name,
                        member: member_name.clone(),
                    }
                };
                reported.push(SemanticError::new(kind, PHASE, unresolved.origin));
            }
        }
        state.errors.append(&mut reported);

        // pass 4: canonical alias specs
        let by_id: HashMap<DeclId, Member> = state
            .module
            .members
            .iter()
            .filter_map(|m| m.id().cloned().map(|id| (id, m.clone())))
            .collect();

        for member in &mut state.module.members {
            let Member::TypeAlias(alias) = member else {
                continue;
            };
            let mut visiting = HashSet::new();
            if let Some(id) = &alias.id {
                visiting.insert(id.clone());
            }
            alias.type_spec = compute_alias_spec(&alias.referenced, &by_id, &mut visiting);
        }

        // the index holds clones of the type declarations; refresh them
        let type_members = state
            .module
            .members
            .iter()
            .filter_map(|m| match m {
                Member::TypeDef(def) => Some(TypeDecl::Def(def.clone())),
                Member::TypeAlias(alias) => Some(TypeDecl::Alias(alias.clone())),
                Member::TypeStruct(ts) => Some(TypeDecl::Struct(ts.clone())),
                _ => None,
            })
            .collect::<Vec<_>>();
        for decl in type_members {
            state.resolvables_mut().update_type(decl);
        }

        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Module, TypeAlias, Visibility};
    use crate::semantic::state::{CompilerConfig, SemanticPhaseState};
    use crate::semantic::{IdAssigner, Phase, StdlibInjection};

    fn resolve(members: Vec<Member>) -> SemanticPhaseState {
        let module = Module::new("m", Visibility::Public, members);
        let state = SemanticPhaseState::new(module, CompilerConfig::default());
        let state = StdlibInjection.run(state);
        let state = IdAssigner.run(state);
        TypeResolver.run(state)
    }

    fn alias(name: &str, target: &str) -> Member {
        Member::TypeAlias(TypeAlias {
            name: name.into(),
            visibility: Visibility::Public,
            referenced: Type::reference(target, SourceOrigin::Synth),
            type_spec: None,
            id: None,
            origin: SourceOrigin::Synth,
        })
    }

    fn find_alias<'a>(state: &'a SemanticPhaseState, name: &str) -> &'a TypeAlias {
        state
            .module
            .members
            .iter()
            .find_map(|m| match m {
                Member::TypeAlias(a) if a.name == name => Some(a),
                _ => None,
            })
            .expect("alias not found")
    }

    #[test]
    fn test_alias_of_native_typedef_stays_symbolic() {
        let state = resolve(vec![alias("Text", "String")]);

        let text = find_alias(&state, "Text");
        // canonical spec is a TypeRef to the typedef, not the native ptr
        match &text.type_spec {
            Some(Type::Ref(type_ref)) => {
                assert_eq!(type_ref.name, "String");
                assert!(type_ref.resolved_id.is_some());
            }
            other => panic!("expected TypeRef spec, got {other:?}"),
        }
        assert!(state.errors.is_empty());
    }

    #[test]
    fn test_alias_chain_any_order() {
        // B -> A declared before A -> String
        let state = resolve(vec![alias("B", "A"), alias("A", "String")]);

        let b = find_alias(&state, "B");
        match &b.type_spec {
            Some(Type::Ref(type_ref)) => assert_eq!(type_ref.name, "String"),
            other => panic!("expected TypeRef spec, got {other:?}"),
        }
    }

    #[test]
    fn test_undefined_type_ref_reported_and_marked() {
        let state = resolve(vec![alias("Bad", "Missing")]);

        assert!(state
            .errors
            .iter()
            .any(|e| matches!(&e.kind, SemanticErrorKind::UndefinedTypeRef { name, .. } if name == "Missing")));

        let bad = find_alias(&state, "Bad");
        assert!(bad.referenced.is_invalid());
        assert!(bad.type_spec.is_none());
    }

    #[test]
    fn test_alias_cycle_does_not_hang() {
        let state = resolve(vec![alias("X", "Y"), alias("Y", "X")]);
        assert!(find_alias(&state, "X").type_spec.is_none());
        assert!(find_alias(&state, "Y").type_spec.is_none());
    }

    #[test]
    fn test_fixed_point_stability() {
        let state = resolve(vec![alias("B", "A"), alias("A", "String")]);
        let again = TypeResolver.run(state.clone());
        assert_eq!(state.module, again.module);
        assert_eq!(state.errors, again.errors);
    }
}
