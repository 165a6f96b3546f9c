//! Alias-chain resolution and the type-compatibility relation used by
//! body checking. Types compare after aliases are chased: native
//! primitives by LLVM representation, named types by declaration,
//! function types structurally.

use crate::ast::{MemEffect, NativeType, ResolvablesIndex, Type, TypeDecl, TypeRef};

/// Follow alias chains until a non-alias type is reached. Typedef and
/// struct references stay symbolic.
pub(crate) fn chase(ty: &Type, index: &ResolvablesIndex) -> Type {
    let mut current = ty.clone();
    for _ in 0..16 {
        let id = match &current {
            Type::Ref(TypeRef {
                resolved_id: Some(id),
                ..
            }) => id.clone(),
            _ => return current,
        };
        match index.lookup_type(&id) {
            Some(TypeDecl::Alias(alias)) => {
                let Some(next) = alias.type_spec.clone() else {
                    return current;
                };
                current = next;
            }
            _ => return current,
        }
    }
    current
}

/// The LLVM representation behind a type, when it bottoms out at a
/// native-backed typedef.
pub(crate) fn native_rep(ty: &Type, index: &ResolvablesIndex) -> Option<NativeType> {
    match chase(ty, index) {
        Type::NativePrimitive(native) => Some(native),
        Type::Ref(TypeRef {
            resolved_id: Some(id),
            ..
        }) => match index.lookup_type(&id) {
            Some(TypeDecl::Def(def)) => match &def.spec {
                Some(Type::NativePrimitive(native)) => Some(*native),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}

fn is_unit(ty: &Type) -> bool {
    match ty {
        Type::Unit => true,
        Type::Ref(type_ref) => type_ref.name == "Unit",
        _ => false,
    }
}

/// Compatibility of an expected type with an actual one. Symmetric in
/// practice; `Invalid` markers are compatible with everything so one
/// resolution failure does not cascade.
pub(crate) fn compatible(expected: &Type, actual: &Type, index: &ResolvablesIndex) -> bool {
    let expected = chase(expected, index);
    let actual = chase(actual, index);

    if expected.is_invalid() || actual.is_invalid() {
        return true;
    }
    if is_unit(&expected) && is_unit(&actual) {
        return true;
    }

    match (&expected, &actual) {
        (Type::Ref(e), Type::Ref(a)) => match (&e.resolved_id, &a.resolved_id) {
            (Some(ei), Some(ai)) => ei == ai,
            _ => e.name == a.name,
        },
        (Type::Ref(_), Type::NativePrimitive(native))
        | (Type::NativePrimitive(native), Type::Ref(_)) => {
            let named = if matches!(expected, Type::Ref(_)) {
                &expected
            } else {
                &actual
            };
            native_rep(named, index) == Some(*native)
        }
        (Type::NativePrimitive(e), Type::NativePrimitive(a)) => e == a,
        (
            Type::Fn {
                params: ep,
                ret: er,
            },
            Type::Fn {
                params: ap,
                ret: ar,
            },
        ) => {
            ep.len() == ap.len()
                && ep
                    .iter()
                    .zip(ap.iter())
                    .all(|(e, a)| compatible(e, a, index))
                && compatible(er, ar, index)
        }
        (Type::Tuple(es), Type::Tuple(actuals)) => {
            es.len() == actuals.len()
                && es
                    .iter()
                    .zip(actuals.iter())
                    .all(|(e, a)| compatible(e, a, index))
        }
        (Type::Struct(ef), Type::Struct(af))
        | (Type::NativeStruct(ef), Type::NativeStruct(af)) => {
            ef.len() == af.len()
                && ef.iter().zip(af.iter()).all(|(e, a)| {
                    e.name == a.name && compatible(&e.ty, &a.ty, index)
                })
        }
        _ => false,
    }
}

/// Whether values of this type live on the heap: the type (or anything
/// behind its alias chain) is declared `MemEffect::Alloc`, or it is a
/// struct with at least one heap field.
pub(crate) fn is_heap_type(ty: &Type, index: &ResolvablesIndex) -> bool {
    heap_check(ty, index, 0)
}

fn heap_check(ty: &Type, index: &ResolvablesIndex, depth: usize) -> bool {
    if depth > 16 {
        return false;
    }
    match chase(ty, index) {
        Type::Ref(TypeRef {
            resolved_id: Some(id),
            ..
        }) => match index.lookup_type(&id) {
            Some(TypeDecl::Def(def)) => def.mem_effect == Some(MemEffect::Alloc),
            Some(TypeDecl::Struct(ts)) => ts
                .fields
                .iter()
                .any(|f| heap_check(&f.ty, index, depth + 1)),
            _ => false,
        },
        Type::Struct(fields) | Type::NativeStruct(fields) => fields
            .iter()
            .any(|f| heap_check(&f.ty, index, depth + 1)),
        _ => false,
    }
}

/// The source-level name of a named type, used to locate its generated
/// memory functions (`__free_<name>`, `__clone_<name>`).
pub(crate) fn heap_type_name(ty: &Type, index: &ResolvablesIndex) -> Option<String> {
    match chase(ty, index) {
        Type::Ref(type_ref) => Some(type_ref.name),
        _ => None,
    }
}
