//! Body checking against ascriptions. Two passes per module: parameter
//! ascriptions are lowered into the checked parameter types, then every
//! body is walked bottom-up, propagating computed types and validating
//! applications, conditionals and return ascriptions.
//!
//! Native-implemented bindings declare their types without a checkable
//! body and are trusted. Bindings that already carry a full `type_spec`
//! (stdlib, generated constructors) only take part in ascription
//! lowering.

mod compat;

pub(crate) use self::compat::{chase, compatible, heap_type_name, is_heap_type, native_rep};

use std::collections::HashMap;

use crate::ast::{Binding, DeclId, Member, ResolvablesIndex, SourceOrigin, Term, Type};

use super::error::{SemanticError, SemanticErrorKind};
use super::indexer::rebuild_index;
use super::state::SemanticPhaseState;
use super::stdlib::base_type;
use super::Phase;

const PHASE: &str = "typecheck";

struct Checker<'a> {
    index: &'a ResolvablesIndex,
    /// Types computed for bindings already checked this phase; ascription
    /// composition covers the rest (forward references).
    computed: &'a HashMap<DeclId, Type>,
    scope: Vec<(DeclId, Type)>,
    member: String,
    /// The binding being checked, so recursive references type against
    /// its own ascriptions.
    current_id: Option<DeclId>,
    current_type: Option<Type>,
    errors: Vec<SemanticError>,
}

/// Compose a binding's type from its ascriptions when the checked
/// `type_spec` is not available yet (forward references).
fn ascribed_type(binding: &Binding) -> Option<Type> {
    if let Some(spec) = &binding.type_spec {
        return Some(spec.clone());
    }
    match binding.lambda() {
        Some(lambda) => {
            let params = lambda
                .params
                .iter()
                .map(|p| p.ty().cloned())
                .collect::<Option<Vec<_>>>()?;
            Some(Type::function(params, binding.type_asc.clone()?))
        }
        None => binding.type_asc.clone(),
    }
}

impl<'a> Checker<'a> {
    fn error(&mut self, kind: SemanticErrorKind, origin: SourceOrigin) {
        self.errors.push(SemanticError::new(kind, PHASE, origin));
    }

    fn ref_type(&mut self, reference: &crate::ast::Ref) -> Option<Type> {
        let id = reference.resolved_id.clone()?;

        if Some(&id) == self.current_id.as_ref() {
            return self.current_type.clone();
        }
        if let Some((_, ty)) = self.scope.iter().rev().find(|(sid, _)| *sid == id) {
            return Some(ty.clone());
        }
        if let Some(ty) = self.computed.get(&id) {
            return Some(ty.clone());
        }

        match self.index.lookup(&id) {
            Some(crate::ast::IndexedDecl::Binding(binding)) => ascribed_type(binding),
            Some(decl) => decl.ty().cloned(),
            None => None,
        }
    }

    fn check_lambda(&mut self, lambda: &mut crate::ast::Lambda) -> Option<Type> {
        for param in &mut lambda.params {
            if param.type_spec.is_none() {
                param.type_spec = param.type_asc.clone();
            }
        }

        let frame_base = self.scope.len();
        for param in &lambda.params {
            if let (Some(id), Some(ty)) = (param.id.clone(), param.ty().cloned()) {
                self.scope.push((id, ty));
            }
        }
        let body_t = self.check_term(&mut lambda.body, None);
        self.scope.truncate(frame_base);

        let params = lambda
            .params
            .iter()
            .map(|p| p.ty().cloned())
            .collect::<Option<Vec<_>>>()?;
        Some(Type::function(params, body_t?))
    }

    fn apply(
        &mut self,
        fun_t: Option<Type>,
        arg_t: Option<Type>,
        arg_is_unit: bool,
        origin: SourceOrigin,
    ) -> Option<Type> {
        let fun_t = fun_t?;
        match chase(&fun_t, self.index) {
            Type::Fn { params, ret } => {
                if params.is_empty() {
                    if arg_is_unit {
                        return Some(*ret);
                    }
                    self.error(
                        SemanticErrorKind::InvalidApplication {
                            fn_type: Some(fun_t),
                            arg_type: arg_t,
                        },
                        origin,
                    );
                    return None;
                }
                if let Some(actual) = &arg_t {
                    if !compatible(&params[0], actual, self.index) {
                        self.error(
                            SemanticErrorKind::TypeMismatch {
                                expected: params[0].clone(),
                                actual: actual.clone(),
                            },
                            origin,
                        );
                    }
                }
                if params.len() == 1 {
                    Some(*ret)
                } else {
                    Some(Type::Fn {
                        params: params[1..].to_vec(),
                        ret,
                    })
                }
            }
            Type::Invalid(_) => None,
            other => {
                self.error(
                    SemanticErrorKind::InvalidApplication {
                        fn_type: Some(other),
                        arg_type: arg_t,
                    },
                    origin,
                );
                None
            }
        }
    }

    fn check_term(&mut self, term: &mut Term, expected: Option<&Type>) -> Option<Type> {
        match term {
            Term::LiteralInt { .. } => Some(base_type("Int")),
            Term::LiteralFloat { .. } => Some(base_type("Float")),
            Term::LiteralBool { .. } => Some(base_type("Bool")),
            Term::LiteralString { .. } => Some(base_type("String")),
            Term::LiteralUnit { .. } => Some(Type::Unit),
            Term::Ref(reference) => {
                let origin = reference.origin;
                let name = reference.name.clone();
                match self.ref_type(reference) {
                    Some(ty) => Some(ty),
                    None => {
                        if reference.resolved_id.is_some() {
                            self.error(
                                SemanticErrorKind::UnresolvableType { node: name },
                                origin,
                            );
                        }
                        None
                    }
                }
            }
            Term::App(app) => {
                let origin = app.origin;
                let arg_is_unit = matches!(app.arg, Term::LiteralUnit { .. });

                if let Term::Lambda(_) = &app.fun {
                    // let-form: the bound parameter's type flows in from
                    // the argument when it carries no ascription
                    let declared = match &app.fun {
                        Term::Lambda(lambda) => {
                            lambda.params.first().and_then(|p| p.ty().cloned())
                        }
                        _ => None,
                    };
                    let arg_t = self.check_term(&mut app.arg, declared.as_ref());
                    if let Term::Lambda(lambda) = &mut app.fun {
                        if let Some(param) = lambda.params.first_mut() {
                            if param.ty().is_none() {
                                param.type_spec = arg_t.clone();
                            }
                        }
                    }
                    let fun_t = self.check_term(&mut app.fun, None);
                    self.apply(fun_t, arg_t, arg_is_unit, origin)
                } else {
                    let fun_t = self.check_term(&mut app.fun, None);
                    let expected_arg = match fun_t.as_ref().map(|t| chase(t, self.index)) {
                        Some(Type::Fn { params, .. }) => params.first().cloned(),
                        _ => None,
                    };
                    let arg_t = self.check_term(&mut app.arg, expected_arg.as_ref());
                    self.apply(fun_t, arg_t, arg_is_unit, origin)
                }
            }
            Term::Lambda(lambda) => self.check_lambda(lambda),
            Term::Cond(cond) => {
                let cond_origin = cond.cond.origin();
                let bool_t = base_type("Bool");
                let cond_t = self.check_term(&mut cond.cond, Some(&bool_t));
                if let Some(ct) = &cond_t {
                    if !compatible(&bool_t, ct, self.index) {
                        self.error(
                            SemanticErrorKind::TypeMismatch {
                                expected: bool_t.clone(),
                                actual: ct.clone(),
                            },
                            cond_origin,
                        );
                    }
                }

                let true_t = self.check_term(&mut cond.if_true, expected);
                let false_t = self.check_term(&mut cond.if_false, expected);
                match (true_t, false_t) {
                    (Some(tt), Some(ft)) => {
                        if compatible(&tt, &ft, self.index) {
                            Some(tt)
                        } else {
                            self.error(
                                SemanticErrorKind::ConditionalBranchTypeMismatch {
                                    true_type: tt,
                                    false_type: ft,
                                },
                                cond.origin,
                            );
                            None
                        }
                    }
                    (Some(t), None) | (None, Some(t)) => Some(t),
                    (None, None) => {
                        self.error(
                            SemanticErrorKind::ConditionalBranchTypeUnknown,
                            cond.origin,
                        );
                        None
                    }
                }
            }
            Term::Group(inner) => self.check_term(inner, expected),
            Term::Tuple { elements, .. } => {
                let types = elements
                    .iter_mut()
                    .map(|e| self.check_term(e, None))
                    .collect::<Option<Vec<_>>>();
                types.map(Type::Tuple)
            }
            Term::NativeImpl(_) => None,
            Term::DataConstructor(ctor) => Some(Type::Ref(ctor.type_ref.clone())),
            Term::Hole { origin } | Term::Placeholder { origin } => match expected {
                Some(ty) => Some(ty.clone()),
                None => {
                    self.error(
                        SemanticErrorKind::UntypedHoleInBinding {
                            binding: self.member.clone(),
                        },
                        *origin,
                    );
                    None
                }
            },
            Term::Expr(expr) => match expr.terms.first_mut() {
                Some(first) => self.check_term(first, expected),
                None => None,
            },
            Term::TermError(err) => {
                // marker left by the rewriter: secondary, the primary was
                // already reported there
                let cause = SemanticError::new(
                    SemanticErrorKind::InvalidExpression {
                        reason: err.reason.clone(),
                    },
                    "rewrite",
                    err.origin,
                );
                self.errors.push(
                    SemanticError::new(
                        SemanticErrorKind::UnresolvableType {
                            node: self.member.clone(),
                        },
                        PHASE,
                        err.origin,
                    )
                    .caused_by(cause),
                );
                None
            }
        }
    }
}

/// Lower parameter ascriptions everywhere in a term.
fn lower_ascriptions(term: &mut Term) {
    match term {
        Term::Lambda(lambda) => {
            for param in &mut lambda.params {
                if param.type_spec.is_none() {
                    param.type_spec = param.type_asc.clone();
                }
            }
            lower_ascriptions(&mut lambda.body);
        }
        Term::App(app) => {
            lower_ascriptions(&mut app.fun);
            lower_ascriptions(&mut app.arg);
        }
        Term::Cond(cond) => {
            lower_ascriptions(&mut cond.cond);
            lower_ascriptions(&mut cond.if_true);
            lower_ascriptions(&mut cond.if_false);
        }
        Term::Group(inner) => lower_ascriptions(inner),
        Term::Tuple { elements, .. } => elements.iter_mut().for_each(lower_ascriptions),
        Term::Expr(expr) => expr.terms.iter_mut().for_each(lower_ascriptions),
        _ => {}
    }
}

pub struct TypeChecker;

impl Phase for TypeChecker {
    fn name(&self) -> &'static str {
        PHASE
    }

    fn run(&self, mut state: SemanticPhaseState) -> SemanticPhaseState {
        let mut errors = vec![];

        // phase 1: ascription lowering and missing-ascription reporting
        for member in &mut state.module.members {
            let Member::Binding(binding) = member else {
                continue;
            };
            let is_operator = binding.meta.is_operator();
            let decl = binding.name.clone();

            if let Some(lambda) = binding.lambda_mut() {
                for param in &mut lambda.params {
                    if param.type_asc.is_none() && param.type_spec.is_none() {
                        let kind = if is_operator {
                            SemanticErrorKind::MissingOperatorParameterType {
                                param: param.name.clone(),
                                op: decl.clone(),
                            }
                        } else {
                            SemanticErrorKind::MissingParameterType {
                                param: param.name.clone(),
                                decl: decl.clone(),
                            }
                        };
                        errors.push(SemanticError::new(kind, PHASE, param.origin));
                    }
                }
            }
            for term in &mut binding.body.terms {
                lower_ascriptions(term);
            }
        }

        // phase 2: body checking, declaration order
        let index = state.resolvables().clone();
        let mut computed: HashMap<DeclId, Type> = HashMap::new();
        for member in &mut state.module.members {
            let Member::Binding(binding) = member else {
                continue;
            };

            // stdlib and generated bindings arrive fully typed
            if binding.type_spec.is_some() {
                continue;
            }

            let mut checker = Checker {
                index: &index,
                computed: &computed,
                scope: vec![],
                member: binding.name.clone(),
                current_id: binding.id.clone(),
                current_type: ascribed_type(binding),
                errors: vec![],
            };

            let type_asc = binding.type_asc.clone();
            let is_native = binding.is_native();
            let origin = binding.origin;

            let computed_type = match binding.lambda_mut() {
                Some(lambda) => {
                    let frame_base = checker.scope.len();
                    for param in &lambda.params {
                        if let (Some(id), Some(ty)) = (param.id.clone(), param.ty().cloned()) {
                            checker.scope.push((id, ty));
                        }
                    }
                    let body_t = if is_native {
                        None
                    } else {
                        checker.check_term(&mut lambda.body, type_asc.as_ref())
                    };
                    checker.scope.truncate(frame_base);

                    let ret = match (&type_asc, body_t) {
                        (Some(asc), Some(body_t)) => {
                            if !compatible(asc, &body_t, &index) {
                                checker.errors.push(SemanticError::new(
                                    SemanticErrorKind::TypeMismatch {
                                        expected: asc.clone(),
                                        actual: body_t,
                                    },
                                    PHASE,
                                    lambda.body.origin(),
                                ));
                            }
                            Some(asc.clone())
                        }
                        (Some(asc), None) => Some(asc.clone()),
                        (None, Some(body_t)) => Some(body_t),
                        (None, None) => {
                            checker.errors.push(SemanticError::new(
                                SemanticErrorKind::UnresolvableType {
                                    node: checker.member.clone(),
                                },
                                PHASE,
                                origin,
                            ));
                            None
                        }
                    };

                    let params = lambda
                        .params
                        .iter()
                        .map(|p| p.ty().cloned())
                        .collect::<Option<Vec<_>>>();
                    match (params, ret) {
                        (Some(params), Some(ret)) => Some(Type::function(params, ret)),
                        _ => None,
                    }
                }
                None => {
                    let body_t = match binding.body.terms.first_mut() {
                        Some(term) => checker.check_term(term, type_asc.as_ref()),
                        None => None,
                    };
                    match (&type_asc, body_t) {
                        (Some(asc), Some(body_t)) => {
                            if !compatible(asc, &body_t, &index) {
                                checker.errors.push(SemanticError::new(
                                    SemanticErrorKind::TypeMismatch {
                                        expected: asc.clone(),
                                        actual: body_t,
                                    },
                                    PHASE,
                                    origin,
                                ));
                            }
                            Some(asc.clone())
                        }
                        (Some(asc), None) => Some(asc.clone()),
                        (None, Some(body_t)) => Some(body_t),
                        (None, None) => {
                            checker.errors.push(SemanticError::new(
                                SemanticErrorKind::UnresolvableType {
                                    node: checker.member.clone(),
                                },
                                PHASE,
                                origin,
                            ));
                            None
                        }
                    }
                }
            };

            errors.append(&mut checker.errors);
            binding.type_spec = computed_type;
            if let (Some(id), Some(ty)) = (&binding.id, &binding.type_spec) {
                computed.insert(id.clone(), ty.clone());
            }
        }

        state.errors.append(&mut errors);
        rebuild_index(&mut state.module);
        state
    }
}

/// Post-checking type query used by later phases: computes the type of
/// an already-checked term without reporting anything. `locals` supplies
/// the types of parameters in scope at the query site.
pub(crate) fn shallow_term_type(
    term: &Term,
    index: &ResolvablesIndex,
    locals: &HashMap<DeclId, Type>,
) -> Option<Type> {
    match term {
        Term::LiteralInt { .. } => Some(base_type("Int")),
        Term::LiteralFloat { .. } => Some(base_type("Float")),
        Term::LiteralBool { .. } => Some(base_type("Bool")),
        Term::LiteralString { .. } => Some(base_type("String")),
        Term::LiteralUnit { .. } => Some(Type::Unit),
        Term::Ref(reference) => {
            let id = reference.resolved_id.as_ref()?;
            if let Some(ty) = locals.get(id) {
                return Some(ty.clone());
            }
            match index.lookup(id)? {
                crate::ast::IndexedDecl::Binding(binding) => ascribed_type(binding),
                decl => decl.ty().cloned(),
            }
        }
        Term::App(app) => {
            let fun_t = shallow_term_type(&app.fun, index, locals)?;
            match chase(&fun_t, index) {
                Type::Fn { params, ret } => {
                    if params.len() <= 1 {
                        Some(*ret)
                    } else {
                        Some(Type::Fn {
                            params: params[1..].to_vec(),
                            ret,
                        })
                    }
                }
                _ => None,
            }
        }
        Term::Lambda(lambda) => {
            let mut inner = locals.clone();
            for param in &lambda.params {
                if let (Some(id), Some(ty)) = (param.id.clone(), param.ty().cloned()) {
                    inner.insert(id, ty);
                }
            }
            let params = lambda
                .params
                .iter()
                .map(|p| p.ty().cloned())
                .collect::<Option<Vec<_>>>()?;
            Some(Type::function(
                params,
                shallow_term_type(&lambda.body, index, &inner)?,
            ))
        }
        Term::Cond(cond) => shallow_term_type(&cond.if_true, index, locals)
            .or_else(|| shallow_term_type(&cond.if_false, index, locals)),
        Term::Group(inner) => shallow_term_type(inner, index, locals),
        Term::Tuple { elements, .. } => {
            let types = elements
                .iter()
                .map(|e| shallow_term_type(e, index, locals))
                .collect::<Option<Vec<_>>>()?;
            Some(Type::Tuple(types))
        }
        Term::DataConstructor(ctor) => Some(Type::Ref(ctor.type_ref.clone())),
        _ => None,
    }
}
