//! Seeds the module with the built-in surface every MML program sees:
//! operators, base types, native functions and the memory functions of
//! the heap-native types. Stdlib declarations arrive with their ids
//! pre-assigned under the `stdlib::` namespace.

use once_cell::sync::Lazy;

use crate::ast::{
    Associativity, Binding, BindingMeta, BindingOrigin, DeclId, Expr, Fixity, FnParam, IndexedDecl,
    Member, MemEffect, NativeImpl, NativeType, SourceOrigin, Term, Type, TypeDecl, TypeDef,
    TypeRef, Visibility,
};

use super::state::SemanticPhaseState;
use super::Phase;

struct OperatorSpec {
    name: &'static str,
    mangled: &'static str,
    fixity: Fixity,
    precedence: u32,
    associativity: Associativity,
    /// Operand type names, in order, plus the result type name.
    signature: (&'static [&'static str], &'static str),
}

static OPERATORS: Lazy<Vec<OperatorSpec>> = Lazy::new(|| {
    use Associativity::{Left, Right};
    use Fixity::{Infix, Prefix};

    let bin = |name, mangled, precedence, associativity, operands, result| OperatorSpec {
        name,
        mangled,
        fixity: Infix,
        precedence,
        associativity,
        signature: (operands, result),
    };
    let prefix = |name, mangled, operands, result| OperatorSpec {
        name,
        mangled,
        fixity: Prefix,
        precedence: 95,
        associativity: Right,
        signature: (operands, result),
    };

    const INT2: &[&str] = &["Int", "Int"];
    const BOOL2: &[&str] = &["Bool", "Bool"];
    const INT1: &[&str] = &["Int"];
    const BOOL1: &[&str] = &["Bool"];

    vec![
        bin("^", "__op_pow", 90, Right, INT2, "Int"),
        bin("*", "__op_mul", 80, Left, INT2, "Int"),
        bin("/", "__op_div", 80, Left, INT2, "Int"),
        bin("+", "__op_add", 60, Left, INT2, "Int"),
        bin("-", "__op_sub", 60, Left, INT2, "Int"),
        bin("==", "__op_eq", 50, Left, INT2, "Bool"),
        bin("!=", "__op_neq", 50, Left, INT2, "Bool"),
        bin("<", "__op_lt", 50, Left, INT2, "Bool"),
        bin(">", "__op_gt", 50, Left, INT2, "Bool"),
        bin("<=", "__op_lte", 50, Left, INT2, "Bool"),
        bin(">=", "__op_gte", 50, Left, INT2, "Bool"),
        bin("and", "__op_and", 40, Left, BOOL2, "Bool"),
        bin("or", "__op_or", 30, Left, BOOL2, "Bool"),
        prefix("-", "__prefix_minus", INT1, "Int"),
        prefix("+", "__prefix_plus", INT1, "Int"),
        prefix("not", "__prefix_not", BOOL1, "Bool"),
    ]
});

struct BaseTypeSpec {
    name: &'static str,
    native: Option<NativeType>,
    mem_effect: MemEffect,
}

static BASE_TYPES: Lazy<Vec<BaseTypeSpec>> = Lazy::new(|| {
    let stat = |name, native| BaseTypeSpec {
        name,
        native: Some(native),
        mem_effect: MemEffect::Static,
    };
    let heap = |name| BaseTypeSpec {
        name,
        native: Some(NativeType::Ptr),
        mem_effect: MemEffect::Alloc,
    };

    vec![
        stat("Int", NativeType::I64),
        stat("Bool", NativeType::I1),
        stat("Float", NativeType::F64),
        stat("Char", NativeType::I32),
        BaseTypeSpec {
            name: "Unit",
            native: None,
            mem_effect: MemEffect::Static,
        },
        heap("String"),
        heap("Buffer"),
        heap("IntArray"),
        heap("StringArray"),
    ]
});

/// Heap-native types that need stdlib `__free_T` / `__clone_T`.
const HEAP_NATIVES: &[&str] = &["String", "Buffer", "IntArray", "StringArray"];

struct NativeFnSpec {
    name: &'static str,
    params: &'static [(&'static str, &'static str)],
    result: &'static str,
    allocates: bool,
}

static NATIVE_FNS: Lazy<Vec<NativeFnSpec>> = Lazy::new(|| {
    vec![
        NativeFnSpec {
            name: "println",
            params: &[("s", "String")],
            result: "Unit",
            allocates: false,
        },
        NativeFnSpec {
            name: "print",
            params: &[("s", "String")],
            result: "Unit",
            allocates: false,
        },
        NativeFnSpec {
            name: "to_string",
            params: &[("n", "Int")],
            result: "String",
            allocates: true,
        },
        NativeFnSpec {
            name: "concat",
            params: &[("a", "String"), ("b", "String")],
            result: "String",
            allocates: true,
        },
        NativeFnSpec {
            name: "readln",
            params: &[("u", "Unit")],
            result: "String",
            allocates: true,
        },
    ]
});

pub fn typedef_id(name: &str) -> DeclId {
    DeclId::new(format!("stdlib::typedef::{name}"))
}

pub fn binding_id(mangled: &str) -> DeclId {
    DeclId::new(format!("stdlib::bnd::{mangled}"))
}

/// A resolved reference to a stdlib base type.
pub fn base_type(name: &str) -> Type {
    Type::Ref(TypeRef::resolved(name, typedef_id(name)))
}

fn stdlib_type(name: &str) -> Type {
    if name == "Unit" {
        Type::Unit
    } else {
        base_type(name)
    }
}

fn native_body(params: &[FnParam], allocates: bool) -> Expr {
    let native = Term::NativeImpl(NativeImpl {
        mem_effect: allocates.then_some(MemEffect::Alloc),
        origin: SourceOrigin::Synth,
    });
    Expr::single(Term::Lambda(Box::new(crate::ast::Lambda::new(
        params.to_vec(),
        native,
        SourceOrigin::Synth,
    ))))
}

fn stdlib_param(owner: &str, name: &str, ty: Type, consuming: bool) -> FnParam {
    FnParam {
        name: name.to_string(),
        type_asc: Some(ty),
        type_spec: None,
        id: Some(DeclId::new(format!("stdlib::bnd::{owner}::{name}"))),
        consuming,
        origin: SourceOrigin::Synth,
    }
}

fn operator_binding(spec: &OperatorSpec) -> Binding {
    let (operands, result) = spec.signature;
    let params = operands
        .iter()
        .enumerate()
        .map(|(i, ty)| {
            let name = ["a", "b"][i];
            stdlib_param(spec.mangled, name, stdlib_type(ty), false)
        })
        .collect::<Vec<_>>();

    let mut meta = BindingMeta::operator(
        spec.name,
        operands.len(),
        spec.fixity,
        spec.precedence,
        spec.associativity,
    );
    meta.mangled_name = Some(spec.mangled.to_string());

    let param_types = params.iter().filter_map(|p| p.type_asc.clone()).collect();

    Binding {
        name: spec.name.to_string(),
        visibility: Visibility::Public,
        meta,
        type_asc: Some(stdlib_type(result)),
        type_spec: Some(Type::function(param_types, stdlib_type(result))),
        body: native_body(&params, false),
        id: Some(binding_id(spec.mangled)),
        origin: SourceOrigin::Synth,
    }
}

fn native_fn_binding(spec: &NativeFnSpec) -> Binding {
    let params = spec
        .params
        .iter()
        .map(|(name, ty)| stdlib_param(spec.name, name, stdlib_type(ty), false))
        .collect::<Vec<_>>();

    let param_types = params.iter().filter_map(|p| p.type_asc.clone()).collect();

    Binding {
        name: spec.name.to_string(),
        visibility: Visibility::Public,
        meta: BindingMeta::function(spec.name, params.len()),
        type_asc: Some(stdlib_type(spec.result)),
        type_spec: Some(Type::function(param_types, stdlib_type(spec.result))),
        body: native_body(&params, spec.allocates),
        id: Some(binding_id(spec.name)),
        origin: SourceOrigin::Synth,
    }
}

/// `__free_T` for a heap-native type: consuming parameter, native body.
fn native_free_binding(type_name: &str) -> Binding {
    let name = format!("__free_{type_name}");
    let params = vec![stdlib_param(&name, "s", base_type(type_name), true)];

    let mut meta = BindingMeta::function(&name, 1);
    meta.origin = BindingOrigin::Destructor;
    meta.generated_for = Some(type_name.to_string());

    Binding {
        name: name.clone(),
        visibility: Visibility::Public,
        meta,
        type_asc: Some(Type::Unit),
        type_spec: Some(Type::function(vec![base_type(type_name)], Type::Unit)),
        body: native_body(&params, false),
        id: Some(binding_id(&name)),
        origin: SourceOrigin::Synth,
    }
}

/// `__clone_T` for a heap-native type: borrowing parameter, allocates.
fn native_clone_binding(type_name: &str) -> Binding {
    let name = format!("__clone_{type_name}");
    let params = vec![stdlib_param(&name, "s", base_type(type_name), false)];

    let mut meta = BindingMeta::function(&name, 1);
    meta.generated_for = Some(type_name.to_string());

    Binding {
        name: name.clone(),
        visibility: Visibility::Public,
        meta,
        type_asc: Some(base_type(type_name)),
        type_spec: Some(Type::function(
            vec![base_type(type_name)],
            base_type(type_name),
        )),
        body: native_body(&params, true),
        id: Some(binding_id(&name)),
        origin: SourceOrigin::Synth,
    }
}

fn base_typedef(spec: &BaseTypeSpec) -> TypeDef {
    TypeDef {
        name: spec.name.to_string(),
        visibility: Visibility::Public,
        spec: match spec.name {
            "Unit" => Some(Type::Unit),
            _ => spec.native.map(Type::NativePrimitive),
        },
        mem_effect: Some(spec.mem_effect),
        id: Some(typedef_id(spec.name)),
        origin: SourceOrigin::Synth,
    }
}

/// Every stdlib member, in injection order: types first, then operators,
/// native functions and memory functions.
pub fn stdlib_members() -> Vec<Member> {
    let mut members = vec![];

    for spec in BASE_TYPES.iter() {
        members.push(Member::TypeDef(base_typedef(spec)));
    }
    for spec in OPERATORS.iter() {
        members.push(Member::Binding(operator_binding(spec)));
    }
    for spec in NATIVE_FNS.iter() {
        members.push(Member::Binding(native_fn_binding(spec)));
    }
    for type_name in HEAP_NATIVES {
        members.push(Member::Binding(native_free_binding(type_name)));
        members.push(Member::Binding(native_clone_binding(type_name)));
    }

    members
}

pub struct StdlibInjection;

impl Phase for StdlibInjection {
    fn name(&self) -> &'static str {
        "stdlib"
    }

    fn run(&self, mut state: SemanticPhaseState) -> SemanticPhaseState {
        let injected = stdlib_members();

        for member in &injected {
            match member {
                Member::Binding(binding) => {
                    state
                        .resolvables_mut()
                        .update(IndexedDecl::Binding(binding.clone()));
                    if let Some(lambda) = binding.lambda() {
                        state.resolvables_mut().update_all(&lambda.params);
                    }
                }
                Member::TypeDef(def) => {
                    state.resolvables_mut().update_type(TypeDecl::Def(def.clone()));
                }
                _ => {}
            }
        }

        let mut members = injected;
        members.append(&mut state.module.members);
        state.module.members = members;

        state
    }
}
