//! Synthesizes a `__mk_T` binding for every struct-like type: one curried
//! lambda parameter per field, in declaration order, returning a
//! `DataConstructor` typed by the struct itself. The binding lands in the
//! member list right after its type declaration.

use crate::ast::{
    Binding, BindingMeta, BindingOrigin, DataConstructor, DeclId, Expr, Field, FnParam,
    IndexedDecl, Lambda, Member, SourceOrigin, Term, Type, TypeRef, Visibility,
};

use super::ids::IdGen;
use super::state::SemanticPhaseState;
use super::Phase;

const PHASE: &str = "constructors";

pub(crate) fn constructor_name(type_name: &str) -> String {
    format!("__mk_{type_name}")
}

fn constructor_binding(
    type_name: &str,
    type_id: Option<&DeclId>,
    fields: &[Field],
    gen: &mut IdGen,
) -> Binding {
    let name = constructor_name(type_name);

    let params = fields
        .iter()
        .map(|field| FnParam {
            name: field.name.clone(),
            type_asc: Some(field.ty.clone()),
            type_spec: None,
            id: Some(gen.nested("bnd", &name, &field.name)),
            consuming: false,
            origin: SourceOrigin::Synth,
        })
        .collect::<Vec<_>>();

    let result_ref = TypeRef {
        name: type_name.to_string(),
        resolved_id: type_id.cloned(),
        origin: SourceOrigin::Synth,
    };

    let body = Term::Lambda(Box::new(Lambda::new(
        params,
        Term::DataConstructor(DataConstructor {
            type_ref: result_ref.clone(),
            origin: SourceOrigin::Synth,
        }),
        SourceOrigin::Synth,
    )));

    let mut meta = BindingMeta::function(&name, fields.len());
    meta.origin = BindingOrigin::Constructor;
    meta.generated_for = Some(type_name.to_string());

    let param_types = fields.iter().map(|f| f.ty.clone()).collect::<Vec<_>>();

    Binding {
        name: name.clone(),
        visibility: Visibility::Public,
        meta,
        type_asc: Some(Type::Ref(result_ref.clone())),
        type_spec: Some(Type::function(param_types, Type::Ref(result_ref))),
        body: Expr::single(body),
        id: Some(gen.top_level("bnd", &name)),
        origin: SourceOrigin::Synth,
    }
}

pub struct ConstructorGenerator;

impl Phase for ConstructorGenerator {
    fn name(&self) -> &'static str {
        PHASE
    }

    fn run(&self, mut state: SemanticPhaseState) -> SemanticPhaseState {
        let mut gen = IdGen::new(&state.module.name);
        let mut members = Vec::with_capacity(state.module.members.len());

        for member in std::mem::take(&mut state.module.members) {
            let generated = match &member {
                Member::TypeStruct(ts) => Some(constructor_binding(
                    &ts.name,
                    ts.id.as_ref(),
                    &ts.fields,
                    &mut gen,
                )),
                Member::TypeDef(def) => match &def.spec {
                    Some(Type::NativeStruct(fields)) if !fields.is_empty() => Some(
                        constructor_binding(&def.name, def.id.as_ref(), fields, &mut gen),
                    ),
                    _ => None,
                },
                _ => None,
            };

            members.push(member);
            if let Some(binding) = generated {
                state
                    .resolvables_mut()
                    .update(IndexedDecl::Binding(binding.clone()));
                if let Some(lambda) = binding.lambda() {
                    state.resolvables_mut().update_all(&lambda.params);
                }
                members.push(Member::Binding(binding));
            }
        }

        state.module.members = members;
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Module, TypeStruct};
    use crate::semantic::state::{CompilerConfig, SemanticPhaseState};
    use crate::semantic::{IdAssigner, StdlibInjection, TypeResolver};

    fn point_struct() -> Member {
        Member::TypeStruct(TypeStruct {
            name: "Point".into(),
            visibility: Visibility::Public,
            fields: vec![
                Field::new(
                    "x",
                    Type::reference("Int", SourceOrigin::Synth),
                    SourceOrigin::Synth,
                ),
                Field::new(
                    "y",
                    Type::reference("Int", SourceOrigin::Synth),
                    SourceOrigin::Synth,
                ),
            ],
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
        ConstructorGenerator.run(state)
    }

    #[test]
    fn test_constructor_is_generated_after_struct() {
        let state = run(vec![point_struct()]);

        let struct_pos = state
            .module
            .members
            .iter()
            .position(|m| matches!(m, Member::TypeStruct(_)))
            .unwrap();
        let Member::Binding(ctor) = &state.module.members[struct_pos + 1] else {
            panic!("expected constructor right after the struct");
        };

        assert_eq!(ctor.name, "__mk_Point");
        assert_eq!(ctor.meta.origin, BindingOrigin::Constructor);
        assert_eq!(ctor.meta.arity, 2);
        assert_eq!(ctor.meta.generated_for.as_deref(), Some("Point"));
        assert_eq!(ctor.id, Some(DeclId::new("m::bnd::__mk_Point")));
    }

    #[test]
    fn test_constructor_params_follow_field_order() {
        let state = run(vec![point_struct()]);
        let ctor = state.module.binding("__mk_Point").unwrap();

        let params = ctor.params();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "x");
        assert_eq!(params[1].name, "y");
        assert!(params.iter().all(|p| p.id.is_some()));
        assert!(params.iter().all(|p| !p.consuming));
    }

    #[test]
    fn test_constructor_body_is_data_constructor() {
        let state = run(vec![point_struct()]);
        let ctor = state.module.binding("__mk_Point").unwrap();

        let lambda = ctor.lambda().expect("constructor body must be a lambda");
        assert!(matches!(
            &lambda.body,
            Term::DataConstructor(dc) if dc.type_ref.name == "Point" && dc.type_ref.resolved_id.is_some()
        ));
    }

    #[test]
    fn test_constructor_is_indexed() {
        let state = run(vec![point_struct()]);
        assert!(state
            .resolvables()
            .lookup(&DeclId::new("m::bnd::__mk_Point"))
            .is_some());
    }

    #[test]
    fn test_no_constructor_for_opaque_typedef() {
        let state = run(vec![]);
        assert!(state
            .module
            .bindings()
            .all(|b| !b.name.starts_with("__mk_") || b.meta.generated_for.is_some()));
        // stdlib typedefs are native primitives, none gets a constructor
        assert!(state.module.binding("__mk_Int").is_none());
        assert!(state.module.binding("__mk_String").is_none());
    }
}
