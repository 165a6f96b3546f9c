//! End-to-end runs of the whole semantic pipeline over parse-shaped
//! modules: the scenarios a compiler driver actually produces, from
//! arithmetic precedence through ownership rewriting to entry-point
//! validation.

use mml_lib::ast::{
    Binding, BindingMeta, DeclId, Expr, Field, FnParam, Member, Module, SourceOrigin, Term, Type,
    TypeStruct, Visibility,
};
use mml_lib::semantic::{
    run_pipeline, CompileMode, CompilerConfig, SemanticErrorKind, SemanticPhaseState,
};

fn lit(value: i64) -> Term {
    Term::LiteralInt {
        value,
        origin: SourceOrigin::Synth,
    }
}

fn string_lit(value: &str) -> Term {
    Term::LiteralString {
        value: value.into(),
        origin: SourceOrigin::Synth,
    }
}

fn reference(name: &str) -> Term {
    Term::reference(name, SourceOrigin::Synth)
}

fn int_type() -> Type {
    Type::reference("Int", SourceOrigin::Synth)
}

fn function(name: &str, params: Vec<FnParam>, ret: Option<Type>, body: Vec<Term>) -> Member {
    let arity = params.len();
    Member::Binding(Binding {
        name: name.into(),
        visibility: Visibility::Public,
        meta: BindingMeta::function(name, arity),
        type_asc: ret,
        type_spec: None,
        body: Expr::single(Term::lambda(
            params,
            Term::Expr(Expr::new(body, SourceOrigin::Synth)),
        )),
        id: None,
        origin: SourceOrigin::Synth,
    })
}

fn let_form(name: &str, value: Vec<Term>, body: Vec<Term>) -> Term {
    Term::app(
        Term::lambda(
            vec![FnParam {
                name: name.into(),
                type_asc: None,
                type_spec: None,
                id: None,
                consuming: false,
                origin: SourceOrigin::Synth,
            }],
            Term::Expr(Expr::new(body, SourceOrigin::Synth)),
        ),
        Term::Expr(Expr::new(value, SourceOrigin::Synth)),
    )
}

fn binary(members: Vec<Member>) -> SemanticPhaseState {
    run_pipeline(
        Module::new("main", Visibility::Public, members),
        CompilerConfig {
            mode: CompileMode::Binary,
            no_tco: false,
        },
    )
}

fn library(members: Vec<Member>) -> SemanticPhaseState {
    run_pipeline(
        Module::new("lib", Visibility::Public, members),
        CompilerConfig {
            mode: CompileMode::Library,
            no_tco: false,
        },
    )
}

fn body_of(state: &SemanticPhaseState, name: &str) -> Term {
    state
        .module
        .binding(name)
        .unwrap_or_else(|| panic!("no binding '{name}'"))
        .lambda()
        .unwrap_or_else(|| panic!("binding '{name}' is not a function"))
        .body
        .clone()
}

fn count_calls(term: &Term, target: &str) -> usize {
    fn walk(term: &Term, target: &str, count: &mut usize) {
        match term {
            Term::App(app) => {
                if matches!(&app.fun, Term::Ref(r) if r.name == target) {
                    *count += 1;
                }
                walk(&app.fun, target, count);
                walk(&app.arg, target, count);
            }
            Term::Lambda(lambda) => walk(&lambda.body, target, count),
            Term::Cond(cond) => {
                walk(&cond.cond, target, count);
                walk(&cond.if_true, target, count);
                walk(&cond.if_false, target, count);
            }
            Term::Group(inner) => walk(inner, target, count),
            Term::Tuple { elements, .. } => elements.iter().for_each(|e| walk(e, target, count)),
            Term::Expr(expr) => expr.terms.iter().for_each(|t| walk(t, target, count)),
            _ => {}
        }
    }
    let mut count = 0;
    walk(term, target, &mut count);
    count
}

#[test]
fn arithmetic_precedence_end_to_end() {
    // main(): Int = 1 + 2 * 3
    let state = binary(vec![function(
        "main",
        vec![],
        Some(int_type()),
        vec![lit(1), reference("+"), lit(2), reference("*"), lit(3)],
    )]);

    assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);

    let body = body_of(&state, "main");
    let (head, args) = body.app_spine();
    assert!(matches!(head, Term::Ref(r) if r.name == "+"));
    assert!(matches!(args[0], Term::LiteralInt { value: 1, .. }));
    let (inner_head, inner_args) = args[1].app_spine();
    assert!(matches!(inner_head, Term::Ref(r) if r.name == "*"));
    assert!(matches!(inner_args[0], Term::LiteralInt { value: 2, .. }));
    assert!(matches!(inner_args[1], Term::LiteralInt { value: 3, .. }));

    // typed as a zero-parameter Int function
    let main = state.module.binding("main").unwrap();
    let Some(Type::Fn { params, ret }) = &main.type_spec else {
        panic!("main has no function type");
    };
    assert!(params.is_empty());
    assert!(matches!(&**ret, Type::Ref(r) if r.name == "Int"));
}

#[test]
fn partial_application_eta_expands() {
    // add(a: Int, b: Int): Int = a + b
    // inc = add 1
    let add = function(
        "add",
        vec![
            FnParam::new("a", int_type(), SourceOrigin::Synth),
            FnParam::new("b", int_type(), SourceOrigin::Synth),
        ],
        Some(int_type()),
        vec![reference("a"), reference("+"), reference("b")],
    );
    let inc = function("inc", vec![], None, vec![reference("add"), lit(1)]);

    let state = library(vec![add, inc]);
    assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);

    let body = body_of(&state, "inc");
    let Term::Lambda(lambda) = &body else {
        panic!("expected eta-expanded lambda, got {body:?}");
    };
    assert_eq!(lambda.params.len(), 1);
    assert!(lambda.params[0].name.starts_with("$p"));
    assert!(lambda.params[0].type_spec.is_some());

    let (head, args) = lambda.body.app_spine();
    assert!(matches!(head, Term::Ref(r) if r.name == "add"));
    assert_eq!(args.len(), 2);
}

#[test]
fn use_after_move_is_detected() {
    // struct S { s: String }
    // main(): Unit = let x = to_string 1; let p = S x; println x
    let s = Member::TypeStruct(TypeStruct {
        name: "S".into(),
        visibility: Visibility::Public,
        fields: vec![Field::new(
            "s",
            Type::reference("String", SourceOrigin::Synth),
            SourceOrigin::Synth,
        )],
        id: None,
        origin: SourceOrigin::Synth,
    });
    let main = function(
        "main",
        vec![],
        Some(Type::Unit),
        vec![let_form(
            "x",
            vec![reference("to_string"), lit(1)],
            vec![let_form(
                "p",
                vec![reference("__mk_S"), reference("x")],
                vec![reference("println"), reference("x")],
            )],
        )],
    );

    let state = binary(vec![s, main]);

    assert!(
        state
            .errors
            .iter()
            .any(|e| matches!(&e.kind, SemanticErrorKind::UseAfterMove { name, .. } if name == "x")),
        "expected UseAfterMove, got {:?}",
        state.errors
    );
}

#[test]
fn automatic_free_insertion() {
    // main(): Unit = let s = to_string 42; println s
    let state = binary(vec![function(
        "main",
        vec![],
        Some(Type::Unit),
        vec![let_form(
            "s",
            vec![reference("to_string"), lit(42)],
            vec![reference("println"), reference("s")],
        )],
    )]);

    assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);
    let body = body_of(&state, "main");
    assert_eq!(count_calls(&body, "__free_String"), 1);
    assert_eq!(count_calls(&body, "println"), 1);
}

#[test]
fn conditional_allocation_promotion() {
    // get(b: Bool): String = if b then to_string 1 else "static" end
    let cond = Term::Cond(Box::new(mml_lib::ast::Cond {
        cond: reference("b"),
        if_true: Term::Expr(Expr::new(
            vec![reference("to_string"), lit(1)],
            SourceOrigin::Synth,
        )),
        if_false: string_lit("static"),
        origin: SourceOrigin::Synth,
    }));
    let state = library(vec![function(
        "get",
        vec![FnParam::new(
            "b",
            Type::reference("Bool", SourceOrigin::Synth),
            SourceOrigin::Synth,
        )],
        Some(Type::reference("String", SourceOrigin::Synth)),
        vec![cond],
    )]);

    assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);
    let body = body_of(&state, "get");
    let Term::Cond(cond) = &body else {
        panic!("expected conditional body");
    };
    assert_eq!(count_calls(&cond.if_false, "__clone_String"), 1);
    assert_eq!(count_calls(&cond.if_true, "__clone_String"), 0);
}

#[test]
fn entry_point_validation_rejects_parameters() {
    // main(x: Int): Int = x
    let state = binary(vec![function(
        "main",
        vec![FnParam::new("x", int_type(), SourceOrigin::Synth)],
        Some(int_type()),
        vec![reference("x")],
    )]);

    assert!(
        state
            .errors
            .iter()
            .any(|e| matches!(&e.kind, SemanticErrorKind::InvalidEntryPoint { reason }
                if reason.contains("no parameters"))),
        "expected InvalidEntryPoint, got {:?}",
        state.errors
    );
}

#[test]
fn tail_recursion_detection() {
    // loop(n: Int): Int = if n == 0 then 0 else loop (n - 1) end
    let cond = Term::Cond(Box::new(mml_lib::ast::Cond {
        cond: Term::Expr(Expr::new(
            vec![reference("n"), reference("=="), lit(0)],
            SourceOrigin::Synth,
        )),
        if_true: lit(0),
        if_false: Term::Expr(Expr::new(
            vec![
                reference("loop"),
                Term::Group(Box::new(Term::Expr(Expr::new(
                    vec![reference("n"), reference("-"), lit(1)],
                    SourceOrigin::Synth,
                )))),
            ],
            SourceOrigin::Synth,
        )),
        origin: SourceOrigin::Synth,
    }));
    let state = library(vec![function(
        "loop",
        vec![FnParam::new("n", int_type(), SourceOrigin::Synth)],
        Some(int_type()),
        vec![cond],
    )]);

    assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);
    let lambda = state.module.binding("loop").unwrap().lambda().unwrap();
    assert!(lambda.meta.is_tail_recursive);
}

#[test]
fn undefined_references_are_reported_but_do_not_abort() {
    // broken(): Int = nope 1;  main(): Int = 0
    let broken = function(
        "broken",
        vec![],
        Some(int_type()),
        vec![reference("nope"), lit(1)],
    );
    let main = function("main", vec![], Some(int_type()), vec![lit(0)]);

    let state = binary(vec![broken, main]);

    assert!(state
        .errors
        .iter()
        .any(|e| matches!(&e.kind, SemanticErrorKind::UndefinedRef { name, .. } if name == "nope")));
    // all phases still ran: main is typed and the pipeline reached the
    // validator without tripping over the broken sibling
    assert!(state.module.binding("main").unwrap().type_spec.is_some());
    assert_eq!(state.metrics.phases_run(), 14);
}

#[test]
fn every_resolved_ref_is_in_the_index() {
    // property 7: the index is closed under Ref.resolved_id
    let add = function(
        "add",
        vec![
            FnParam::new("a", int_type(), SourceOrigin::Synth),
            FnParam::new("b", int_type(), SourceOrigin::Synth),
        ],
        Some(int_type()),
        vec![reference("a"), reference("+"), reference("b")],
    );
    let main = function(
        "main",
        vec![],
        Some(int_type()),
        vec![let_form(
            "x",
            vec![reference("add"), lit(1), lit(2)],
            vec![reference("x"), reference("+"), lit(3)],
        )],
    );
    let state = binary(vec![add, main]);
    assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);

    fn collect_resolved(term: &Term, ids: &mut Vec<DeclId>) {
        match term {
            Term::Ref(reference) => {
                if let Some(id) = &reference.resolved_id {
                    ids.push(id.clone());
                }
            }
            Term::App(app) => {
                collect_resolved(&app.fun, ids);
                collect_resolved(&app.arg, ids);
            }
            Term::Lambda(lambda) => collect_resolved(&lambda.body, ids),
            Term::Cond(cond) => {
                collect_resolved(&cond.cond, ids);
                collect_resolved(&cond.if_true, ids);
                collect_resolved(&cond.if_false, ids);
            }
            Term::Group(inner) => collect_resolved(inner, ids),
            Term::Tuple { elements, .. } => {
                elements.iter().for_each(|e| collect_resolved(e, ids))
            }
            Term::Expr(expr) => expr.terms.iter().for_each(|t| collect_resolved(t, ids)),
            _ => {}
        }
    }

    let mut ids = vec![];
    for binding in state.module.bindings() {
        for term in &binding.body.terms {
            collect_resolved(term, &mut ids);
        }
    }
    assert!(!ids.is_empty());
    for id in ids {
        assert!(
            state.resolvables().lookup(&id).is_some(),
            "dangling id {id} not present in the resolvables index"
        );
    }
}

#[test]
fn module_survives_serialization() {
    // the resolved AST is the LSP contract surface
    let state = binary(vec![function(
        "main",
        vec![],
        Some(int_type()),
        vec![lit(1), reference("+"), lit(2)],
    )]);
    assert!(state.errors.is_empty());

    let json = serde_json::to_string(&state.module).expect("serialize");
    let roundtripped: Module = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(state.module, roundtripped);
}

#[test]
fn parser_error_members_surface_as_errors() {
    let state = binary(vec![
        Member::ParsingMemberError(mml_lib::ast::ParsingMemberError {
            message: "unexpected token 'fnn'".into(),
            origin: SourceOrigin::loc(
                mml_lib::ast::SrcPoint::new(1, 0, 0),
                mml_lib::ast::SrcPoint::new(1, 3, 3),
            ),
        }),
        function("main", vec![], Some(int_type()), vec![lit(0)]),
    ]);

    assert!(state
        .errors
        .iter()
        .any(|e| matches!(&e.kind, SemanticErrorKind::MemberErrorFound { .. })));
    // the healthy sibling still made it through the whole pipeline
    assert!(state.module.binding("main").unwrap().type_spec.is_some());
}

#[test]
fn struct_pipeline_generates_constructor_and_memory_functions() {
    let s = Member::TypeStruct(TypeStruct {
        name: "User".into(),
        visibility: Visibility::Public,
        fields: vec![
            Field::new(
                "name",
                Type::reference("String", SourceOrigin::Synth),
                SourceOrigin::Synth,
            ),
            Field::new("age", int_type(), SourceOrigin::Synth),
        ],
        id: None,
        origin: SourceOrigin::Synth,
    });
    let state = library(vec![s]);
    assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);

    let ctor = state.module.binding("__mk_User").expect("constructor");
    assert_eq!(ctor.meta.arity, 2);
    // the heap field's parameter consumes after the memory pass
    assert!(ctor.params()[0].consuming);
    assert!(!ctor.params()[1].consuming);

    assert!(state.module.binding("__free_User").is_some());
    assert!(state.module.binding("__clone_User").is_some());

    // all three are reachable through the index by their stable ids
    for name in ["__mk_User", "__free_User", "__clone_User"] {
        let id = DeclId::new(format!("lib::bnd::{name}"));
        assert!(state.resolvables().lookup(&id).is_some(), "missing {name}");
    }
}
