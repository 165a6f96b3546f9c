//! Assigns stable, path-derived identifiers to every declaration that
//! still lacks one, then rebuilds the resolvables index so lookups see
//! the assigned ids.
//!
//! Scheme:
//! - top level: `<module>::<class>::<name>` with
//!   `class ∈ {bnd, typedef, typestruct, typealias}`
//! - struct fields: `<module>::typestruct::<struct>::<field>`
//! - nested params: `<module>::<ownerClass>::<owner>::<param>::<8-hex>`
//!
//! The 8-hex suffix disambiguates sibling lambdas that reuse a parameter
//! name; it is a truncated SHA-256 over the path plus a per-run counter,
//! unique per nested scope and stable within a run.

use sha2::{Digest, Sha256};

use crate::ast::{Binding, DeclId, Member, Term};

use super::indexer::rebuild_index;
use super::state::SemanticPhaseState;
use super::Phase;

const PHASE: &str = "ids";

/// Mangle an operator name into a symbol-safe identifier component.
/// Alphanumeric names mangle to themselves.
pub(crate) fn mangle(name: &str) -> String {
    if name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return name.to_string();
    }

    let mangled = name
        .chars()
        .map(|c| match c {
            '+' => "plus",
            '-' => "minus",
            '*' => "mul",
            '/' => "div",
            '^' => "pow",
            '=' => "eq",
            '!' => "bang",
            '<' => "lt",
            '>' => "gt",
            '~' => "tilde",
            _ => "sym",
        })
        .collect::<Vec<_>>()
        .join("_");
    format!("__op_{mangled}")
}

/// Generator of path-derived ids for one module.
pub(crate) struct IdGen {
    module: String,
    counter: u64,
}

impl IdGen {
    pub(crate) fn new(module: impl ToString) -> IdGen {
        IdGen {
            module: module.to_string(),
            counter: 0,
        }
    }

    pub(crate) fn module_name(&self) -> &str {
        &self.module
    }

    pub(crate) fn top_level(&self, class: &str, name: &str) -> DeclId {
        DeclId::new(format!("{}::{class}::{name}", self.module))
    }

    pub(crate) fn field(&self, struct_name: &str, field_name: &str) -> DeclId {
        DeclId::new(format!(
            "{}::typestruct::{struct_name}::{field_name}",
            self.module
        ))
    }

    /// Nested param id with the disambiguating 8-hex suffix.
    pub(crate) fn nested(&mut self, owner_class: &str, owner: &str, name: &str) -> DeclId {
        self.counter += 1;
        let mut hasher = Sha256::new();
        hasher.update(self.module.as_bytes());
        hasher.update(owner_class.as_bytes());
        hasher.update(owner.as_bytes());
        hasher.update(name.as_bytes());
        hasher.update(self.counter.to_le_bytes());
        let digest = hasher.finalize();
        let suffix = digest[..4]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>();

        DeclId::new(format!(
            "{}::{owner_class}::{owner}::{name}::{suffix}",
            self.module
        ))
    }
}

/// Walk a term assigning ids to every lambda parameter that lacks one.
pub(crate) fn assign_param_ids(term: &mut Term, owner_class: &str, owner: &str, gen: &mut IdGen) {
    match term {
        Term::Lambda(lambda) => {
            for param in &mut lambda.params {
                if param.id.is_none() {
                    param.id = Some(gen.nested(owner_class, owner, &param.name));
                }
            }
            assign_param_ids(&mut lambda.body, owner_class, owner, gen);
        }
        Term::App(app) => {
            assign_param_ids(&mut app.fun, owner_class, owner, gen);
            assign_param_ids(&mut app.arg, owner_class, owner, gen);
        }
        Term::Cond(cond) => {
            assign_param_ids(&mut cond.cond, owner_class, owner, gen);
            assign_param_ids(&mut cond.if_true, owner_class, owner, gen);
            assign_param_ids(&mut cond.if_false, owner_class, owner, gen);
        }
        Term::Group(inner) => assign_param_ids(inner, owner_class, owner, gen),
        Term::Tuple { elements, .. } => {
            for element in elements {
                assign_param_ids(element, owner_class, owner, gen);
            }
        }
        Term::Expr(expr) => {
            for t in &mut expr.terms {
                assign_param_ids(t, owner_class, owner, gen);
            }
        }
        _ => {}
    }
}

fn assign_binding_ids(binding: &mut Binding, gen: &mut IdGen) {
    let id_component = binding
        .meta
        .mangled_name
        .get_or_insert_with(|| mangle(&binding.name))
        .clone();

    if binding.id.is_none() {
        binding.id = Some(gen.top_level("bnd", &id_component));
    }

    for term in &mut binding.body.terms {
        assign_param_ids(term, "bnd", &id_component, gen);
    }
}

pub struct IdAssigner;

impl Phase for IdAssigner {
    fn name(&self) -> &'static str {
        PHASE
    }

    fn run(&self, mut state: SemanticPhaseState) -> SemanticPhaseState {
        let mut gen = IdGen::new(&state.module.name);

        for member in &mut state.module.members {
            match member {
                Member::Binding(binding) => assign_binding_ids(binding, &mut gen),
                Member::TypeDef(def) => {
                    if def.id.is_none() {
                        def.id = Some(gen.top_level("typedef", &def.name));
                    }
                }
                Member::TypeAlias(alias) => {
                    if alias.id.is_none() {
                        alias.id = Some(gen.top_level("typealias", &alias.name));
                    }
                }
                Member::TypeStruct(ts) => {
                    if ts.id.is_none() {
                        ts.id = Some(gen.top_level("typestruct", &ts.name));
                    }
                    for field in &mut ts.fields {
                        if field.id.is_none() {
                            field.id = Some(gen.field(&ts.name, &field.name));
                        }
                    }
                }
                _ => {}
            }
        }

        rebuild_index(&mut state.module);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        Binding, BindingMeta, Expr, Field, FnParam, Module, SourceOrigin, Type, TypeStruct,
        Visibility,
    };
    use crate::semantic::state::CompilerConfig;

    #[test]
    fn test_mangle() {
        assert_eq!(mangle("add"), "add");
        assert_eq!(mangle("+"), "__op_plus");
        assert_eq!(mangle("<="), "__op_lt_eq");
        assert_eq!(mangle("!="), "__op_bang_eq");
    }

    fn run(members: Vec<Member>) -> SemanticPhaseState {
        IdAssigner.run(SemanticPhaseState::new(
            Module::new("mod", Visibility::Public, members),
            CompilerConfig::default(),
        ))
    }

    #[test]
    fn test_top_level_binding_id() {
        let binding = Binding {
            name: "f".into(),
            visibility: Visibility::Public,
            meta: BindingMeta::function("f", 1),
            type_asc: None,
            type_spec: None,
            body: Expr::single(Term::lambda(
                vec![FnParam::new(
                    "x",
                    Type::reference("Int", SourceOrigin::Synth),
                    SourceOrigin::Synth,
                )],
                Term::reference("x", SourceOrigin::Synth),
            )),
            id: None,
            origin: SourceOrigin::Synth,
        };

        let state = run(vec![Member::Binding(binding)]);

        let binding = state.module.binding("f").unwrap();
        assert_eq!(binding.id, Some(DeclId::new("mod::bnd::f")));

        let param = &binding.params()[0];
        let id = param.id.as_ref().unwrap().as_str();
        assert!(id.starts_with("mod::bnd::f::x::"), "unexpected id {id}");
        // 8-hex suffix
        let suffix = id.rsplit("::").next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sibling_lambdas_get_distinct_param_ids() {
        let lambda = |body| {
            Term::lambda(
                vec![FnParam::new(
                    "x",
                    Type::reference("Int", SourceOrigin::Synth),
                    SourceOrigin::Synth,
                )],
                body,
            )
        };
        let binding = Binding {
            name: "f".into(),
            visibility: Visibility::Public,
            meta: BindingMeta::function("f", 1),
            type_asc: None,
            type_spec: None,
            body: Expr::new(
                vec![
                    lambda(Term::reference("x", SourceOrigin::Synth)),
                    lambda(Term::reference("x", SourceOrigin::Synth)),
                ],
                SourceOrigin::Synth,
            ),
            id: None,
            origin: SourceOrigin::Synth,
        };

        let state = run(vec![Member::Binding(binding)]);
        let binding = state.module.binding("f").unwrap();

        let ids = binding
            .body
            .terms
            .iter()
            .filter_map(|t| match t {
                Term::Lambda(l) => l.params[0].id.clone(),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_struct_and_field_ids() {
        let ts = TypeStruct {
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
        };

        let state = run(vec![Member::TypeStruct(ts)]);

        let Member::TypeStruct(ts) = &state.module.members[0] else {
            panic!("expected struct");
        };
        assert_eq!(ts.id, Some(DeclId::new("mod::typestruct::Point")));
        assert_eq!(
            ts.fields[0].id,
            Some(DeclId::new("mod::typestruct::Point::x"))
        );
    }

    #[test]
    fn test_existing_ids_are_kept() {
        let mut binding = Binding {
            name: "g".into(),
            visibility: Visibility::Public,
            meta: BindingMeta::value("g"),
            type_asc: None,
            type_spec: None,
            body: Expr::single(Term::LiteralInt {
                value: 0,
                origin: SourceOrigin::Synth,
            }),
            id: None,
            origin: SourceOrigin::Synth,
        };
        binding.id = Some(DeclId::new("stdlib::bnd::g"));

        let state = run(vec![Member::Binding(binding)]);
        assert_eq!(
            state.module.binding("g").unwrap().id,
            Some(DeclId::new("stdlib::bnd::g"))
        );
    }
}
