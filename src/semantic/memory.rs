//! Synthesizes `__free_T` / `__clone_T` for every user struct with heap
//! fields, and marks heap-typed constructor parameters as consuming so
//! the ownership analyzer enforces transfer at construction sites.
//!
//! `__free_T` takes its argument by move and frees each heap field in
//! declaration order through a chain of discard-bindings; `__clone_T`
//! borrows its argument and rebuilds the value through `__mk_T`, cloning
//! heap fields and copying the rest.

use std::collections::HashSet;

use crate::ast::{
    Binding, BindingMeta, BindingOrigin, DeclId, Expr, Field, FnParam, Lambda, Member, Ref,
    ResolvablesIndex, SourceOrigin, Term, Type, TypeRef, TypeStruct, Visibility,
};

use super::constructors::constructor_name;
use super::ids::IdGen;
use super::indexer::rebuild_index;
use super::state::SemanticPhaseState;
use super::typechecker::{heap_type_name, is_heap_type};
use super::Phase;

const PHASE: &str = "memory";

pub(crate) fn free_name(type_name: &str) -> String {
    format!("__free_{type_name}")
}

pub(crate) fn clone_name(type_name: &str) -> String {
    format!("__clone_{type_name}")
}

/// Resolve the id of `__free_T`/`__clone_T` for a field type: stdlib for
/// heap natives, module-level for generated struct functions.
struct MemFnIds<'a> {
    module: &'a str,
    generated_structs: &'a HashSet<String>,
}

impl<'a> MemFnIds<'a> {
    fn id_of(&self, fn_name: &str, type_name: &str) -> DeclId {
        if self.generated_structs.contains(type_name) {
            DeclId::new(format!("{}::bnd::{fn_name}", self.module))
        } else {
            DeclId::new(format!("stdlib::bnd::{fn_name}"))
        }
    }

    fn free_ref(&self, type_name: &str) -> Term {
        let name = free_name(type_name);
        let id = self.id_of(&name, type_name);
        Term::Ref(Ref::resolved(name, id))
    }

    fn clone_ref(&self, type_name: &str) -> Term {
        let name = clone_name(type_name);
        let id = self.id_of(&name, type_name);
        Term::Ref(Ref::resolved(name, id))
    }
}

fn field_ref(receiver: &str, field: &Field) -> Term {
    Term::Ref(Ref {
        name: field.name.clone(),
        qualifier: Some(receiver.to_string()),
        resolved_id: field.id.clone(),
        candidate_ids: field.id.clone().into_iter().collect(),
        origin: SourceOrigin::Synth,
    })
}

fn typed_param(
    name: &str,
    ty: Type,
    consuming: bool,
    owner: &str,
    gen: &mut IdGen,
) -> FnParam {
    FnParam {
        name: name.to_string(),
        type_asc: Some(ty.clone()),
        type_spec: Some(ty),
        id: Some(gen.nested("bnd", owner, name)),
        consuming,
        origin: SourceOrigin::Synth,
    }
}

fn struct_type(ts: &TypeStruct) -> Type {
    Type::Ref(TypeRef {
        name: ts.name.clone(),
        resolved_id: ts.id.clone(),
        origin: SourceOrigin::Synth,
    })
}

/// `__free_T(~s: T): Unit`: a chain of `let _ = __free_Fi s.fi;`
/// discard-bindings ending in unit.
fn free_binding(
    ts: &TypeStruct,
    heap_fields: &[(&Field, String)],
    ids: &MemFnIds,
    gen: &mut IdGen,
) -> Binding {
    let name = free_name(&ts.name);

    let mut body = Term::LiteralUnit {
        origin: SourceOrigin::Synth,
    };
    for (field, field_type) in heap_fields.iter().rev() {
        let free_call = Term::app(ids.free_ref(field_type), field_ref("s", *field));
        let discard = typed_param("_", Type::Unit, false, &name, gen);
        body = Term::app(Term::lambda(vec![discard], body), free_call);
    }

    let param = typed_param("s", struct_type(ts), true, &name, gen);

    let mut meta = BindingMeta::function(&name, 1);
    meta.origin = BindingOrigin::Destructor;
    meta.generated_for = Some(ts.name.clone());

    Binding {
        name: name.clone(),
        visibility: Visibility::Public,
        meta,
        type_asc: Some(Type::Unit),
        type_spec: Some(Type::function(vec![struct_type(ts)], Type::Unit)),
        body: Expr::single(Term::Lambda(Box::new(Lambda::new(
            vec![param],
            body,
            SourceOrigin::Synth,
        )))),
        id: Some(DeclId::new(format!("{}::bnd::{name}", gen_module(gen)))),
        origin: SourceOrigin::Synth,
    }
}

/// `__clone_T(s: T): T = __mk_T (c1 s.f1) (c2 s.f2) …` with `ci` the
/// field's clone for heap fields and identity otherwise.
fn clone_binding(
    ts: &TypeStruct,
    index: &ResolvablesIndex,
    ids: &MemFnIds,
    gen: &mut IdGen,
) -> Binding {
    let name = clone_name(&ts.name);
    let ctor = Term::Ref(Ref::resolved(
        constructor_name(&ts.name),
        DeclId::new(format!("{}::bnd::{}", gen_module(gen), constructor_name(&ts.name))),
    ));

    let mut body = ctor;
    for field in &ts.fields {
        let arg = match heap_field_type(field, index) {
            Some(field_type) => Term::app(ids.clone_ref(&field_type), field_ref("s", field)),
            None => field_ref("s", field),
        };
        body = Term::app(body, arg);
    }

    let param = typed_param("s", struct_type(ts), false, &name, gen);

    let mut meta = BindingMeta::function(&name, 1);
    meta.generated_for = Some(ts.name.clone());

    Binding {
        name: name.clone(),
        visibility: Visibility::Public,
        meta,
        type_asc: Some(struct_type(ts)),
        type_spec: Some(Type::function(vec![struct_type(ts)], struct_type(ts))),
        body: Expr::single(Term::Lambda(Box::new(Lambda::new(
            vec![param],
            body,
            SourceOrigin::Synth,
        )))),
        id: Some(DeclId::new(format!("{}::bnd::{name}", gen_module(gen)))),
        origin: SourceOrigin::Synth,
    }
}

fn gen_module(gen: &IdGen) -> String {
    gen.module_name().to_string()
}

fn heap_field_type(field: &Field, index: &ResolvablesIndex) -> Option<String> {
    if is_heap_type(&field.ty, index) {
        heap_type_name(&field.ty, index)
    } else {
        None
    }
}

pub struct MemoryFunctionGenerator;

impl Phase for MemoryFunctionGenerator {
    fn name(&self) -> &'static str {
        PHASE
    }

    fn run(&self, mut state: SemanticPhaseState) -> SemanticPhaseState {
        let index = state.resolvables().clone();

        // structs that get generated memory functions, so field frees can
        // target them by deterministic id
        let generated_structs: HashSet<String> = state
            .module
            .members
            .iter()
            .filter_map(|m| match m {
                Member::TypeStruct(ts)
                    if ts.fields.iter().any(|f| is_heap_type(&f.ty, &index)) =>
                {
                    Some(ts.name.clone())
                }
                _ => None,
            })
            .collect();

        let ids = MemFnIds {
            module: &state.module.name,
            generated_structs: &generated_structs,
        };
        let mut gen = IdGen::new(&state.module.name);

        let mut members = Vec::with_capacity(state.module.members.len());
        for member in std::mem::take(&mut state.module.members) {
            let generated = match &member {
                Member::TypeStruct(ts) if generated_structs.contains(&ts.name) => {
                    let heap_fields = ts
                        .fields
                        .iter()
                        .filter_map(|f| heap_field_type(f, &index).map(|t| (f, t)))
                        .collect::<Vec<_>>();
                    Some((
                        free_binding(ts, &heap_fields, &ids, &mut gen),
                        clone_binding(ts, &index, &ids, &mut gen),
                    ))
                }
                _ => None,
            };

            // heap-typed constructor parameters take ownership
            let member = match member {
                Member::Binding(mut binding)
                    if binding.meta.origin == BindingOrigin::Constructor =>
                {
                    if let Some(lambda) = binding.lambda_mut() {
                        for param in &mut lambda.params {
                            let heap = param
                                .ty()
                                .map(|ty| is_heap_type(ty, &index))
                                .unwrap_or(false);
                            if heap {
                                param.consuming = true;
                            }
                        }
                    }
                    Member::Binding(binding)
                }
                other => other,
            };

            members.push(member);
            if let Some((free, clone)) = generated {
                members.push(Member::Binding(free));
                members.push(Member::Binding(clone));
            }
        }
        state.module.members = members;

        rebuild_index(&mut state.module);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Module;
    use crate::semantic::state::{CompilerConfig, SemanticPhaseState};
    use crate::semantic::{
        ConstructorGenerator, ExpressionRewriter, IdAssigner, ReferenceResolver,
        ResolvablesIndexer, StdlibInjection, TypeChecker, TypeResolver,
    };

    fn named_struct(name: &str, fields: Vec<(&str, &str)>) -> Member {
        Member::TypeStruct(TypeStruct {
            name: name.into(),
            visibility: Visibility::Public,
            fields: fields
                .into_iter()
                .map(|(fname, ftype)| {
                    Field::new(
                        fname,
                        Type::reference(ftype, SourceOrigin::Synth),
                        SourceOrigin::Synth,
                    )
                })
                .collect(),
            id: None,
            origin: SourceOrigin::Synth,
        })
    }

    fn run(members: Vec<Member>) -> SemanticPhaseState {
        let module = Module::new("m", Visibility::Public, members);
        let state = SemanticPhaseState::new(module, CompilerConfig::default());
        let state = StdlibInjection.run(state);
        let state = IdAssigner.run(state);
        let state = TypeResolver.run(state);
        let state = ConstructorGenerator.run(state);
        let state = ReferenceResolver.run(state);
        let state = ExpressionRewriter.run(state);
        let state = ResolvablesIndexer.run(state);
        let state = TypeChecker.run(state);
        MemoryFunctionGenerator.run(state)
    }

    #[test]
    fn test_struct_with_heap_field_gets_memory_functions() {
        let state = run(vec![named_struct("S", vec![("s", "String"), ("n", "Int")])]);

        let free = state.module.binding("__free_S").expect("missing __free_S");
        assert_eq!(free.meta.origin, BindingOrigin::Destructor);
        assert_eq!(free.meta.generated_for.as_deref(), Some("S"));
        assert!(free.params()[0].consuming);

        let clone = state
            .module
            .binding("__clone_S")
            .expect("missing __clone_S");
        assert!(!clone.params()[0].consuming);
        assert_eq!(clone.meta.generated_for.as_deref(), Some("S"));
    }

    #[test]
    fn test_static_struct_gets_none() {
        let state = run(vec![named_struct("P", vec![("x", "Int"), ("y", "Int")])]);
        assert!(state.module.binding("__free_P").is_none());
        assert!(state.module.binding("__clone_P").is_none());
    }

    #[test]
    fn test_free_body_frees_each_heap_field() {
        let state = run(vec![named_struct(
            "S",
            vec![("a", "String"), ("n", "Int"), ("b", "Buffer")],
        )]);

        let free = state.module.binding("__free_S").unwrap();
        let lambda = free.lambda().unwrap();

        // outermost discard-binding frees the first heap field
        let Term::App(outer) = &lambda.body else {
            panic!("expected discard chain");
        };
        let call_head = outer.arg.spine_head_ref().expect("free call");
        assert_eq!(call_head.name, "__free_String");
        assert_eq!(
            call_head.resolved_id,
            Some(DeclId::new("stdlib::bnd::__free_String"))
        );

        // and the chain continues with the Buffer field
        let Term::Lambda(continuation) = &outer.fun else {
            panic!("expected discard lambda");
        };
        let Term::App(inner) = &continuation.body else {
            panic!("expected second free");
        };
        assert_eq!(
            inner.arg.spine_head_ref().unwrap().name,
            "__free_Buffer"
        );
    }

    #[test]
    fn test_clone_body_goes_through_constructor() {
        let state = run(vec![named_struct("S", vec![("a", "String"), ("n", "Int")])]);

        let clone = state.module.binding("__clone_S").unwrap();
        let lambda = clone.lambda().unwrap();
        let (head, args) = lambda.body.app_spine();
        assert!(matches!(head, Term::Ref(r) if r.name == "__mk_S"));
        assert_eq!(args.len(), 2);
        // heap field cloned, static field passed through
        assert_eq!(args[0].spine_head_ref().unwrap().name, "__clone_String");
        assert!(matches!(args[1], Term::Ref(r) if r.qualifier.as_deref() == Some("s")));
    }

    #[test]
    fn test_constructor_heap_params_become_consuming() {
        let state = run(vec![named_struct("S", vec![("a", "String"), ("n", "Int")])]);

        let ctor = state.module.binding("__mk_S").unwrap();
        let params = ctor.params();
        assert!(params[0].consuming, "heap param must consume");
        assert!(!params[1].consuming, "static param must not consume");
    }

    #[test]
    fn test_nested_struct_heap_propagation() {
        // Outer contains Inner which contains a String: both get
        // memory functions, and Outer's free targets __free_Inner
        let state = run(vec![
            named_struct("Inner", vec![("s", "String")]),
            named_struct("Outer", vec![("i", "Inner")]),
        ]);

        assert!(state.module.binding("__free_Inner").is_some());
        let outer_free = state.module.binding("__free_Outer").expect("no __free_Outer");
        let lambda = outer_free.lambda().unwrap();
        let Term::App(outer) = &lambda.body else {
            panic!("expected discard chain");
        };
        let call_head = outer.arg.spine_head_ref().unwrap();
        assert_eq!(call_head.name, "__free_Inner");
        assert_eq!(
            call_head.resolved_id,
            Some(DeclId::new("m::bnd::__free_Inner"))
        );
    }

    #[test]
    fn test_generated_functions_are_indexed() {
        let state = run(vec![named_struct("S", vec![("a", "String")])]);
        assert!(state
            .resolvables()
            .lookup(&DeclId::new("m::bnd::__free_S"))
            .is_some());
        assert!(state
            .resolvables()
            .lookup(&DeclId::new("m::bnd::__clone_S"))
            .is_some());
    }
}
