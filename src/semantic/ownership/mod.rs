//! Ownership-and-lifetime analysis: tracks owned, moved, borrowed and
//! literal states for every binding in a function body, inserts the free
//! calls that balance each allocation, lifts allocating temporaries into
//! their own bindings, and promotes static values to owned ones where a
//! caller expects ownership.
//!
//! Let bindings are `App(Lambda, arg)` chains; a let whose value ends the
//! scope still owned is rewritten CPS-style so the free runs on every
//! exit path:
//!
//! ```text
//! before: let x = <alloc>; <body>
//! after:  let x = <alloc>; let __r = <body>; let _ = __free_T x; __r
//! ```
//!
//! Top-level bindings are borrow-only: using them never invalidates
//! them, and owning a copy of one takes an explicit clone in source.

mod scope;

pub use self::scope::OwnershipState;
pub(crate) use self::scope::{OwnershipEntry, OwnershipScope};

use std::collections::HashMap;

use crate::ast::{
    App, Binding, BindingOrigin, DeclId, FnParam, Lambda, Member, MemEffect, Ref,
    ResolvablesIndex, SourceOrigin, Term, Type,
};

use super::error::{SemanticError, SemanticErrorKind};
use super::ids::IdGen;
use super::memory::{clone_name, free_name};
use super::state::SemanticPhaseState;
use super::typechecker::{heap_type_name, is_heap_type, shallow_term_type};
use super::Phase;

const PHASE: &str = "ownership";

struct Analyzer<'a> {
    index: &'a ResolvablesIndex,
    /// Module binding ids by name, for locating `__free_T`/`__clone_T`.
    binding_ids: &'a HashMap<String, DeclId>,
    gen: &'a mut IdGen,
    owner: String,
    scope: OwnershipScope,
    /// Parameter types in scope, for shallow type queries.
    locals: HashMap<DeclId, Type>,
    errors: Vec<SemanticError>,
}

/// An allocating argument lifted into its own binding so its free runs
/// after the enclosing call returns.
struct Lifted {
    param: FnParam,
    expr: Term,
    type_name: String,
}

impl<'a> Analyzer<'a> {
    fn error(&mut self, kind: SemanticErrorKind, origin: SourceOrigin) {
        self.errors.push(SemanticError::new(kind, PHASE, origin));
    }

    fn shallow_type(&self, term: &Term) -> Option<Type> {
        shallow_term_type(term, self.index, &self.locals)
    }

    fn mem_fn_ref(&self, fn_name: &str) -> Option<Term> {
        let id = self.binding_ids.get(fn_name)?;
        Some(Term::Ref(Ref::resolved(fn_name, id.clone())))
    }

    fn free_ref_for(&self, ty: &Type) -> Option<Term> {
        let name = heap_type_name(ty, self.index)?;
        self.mem_fn_ref(&free_name(&name))
    }

    fn clone_ref_for(&self, ty: &Type) -> Option<Term> {
        let name = heap_type_name(ty, self.index)?;
        self.mem_fn_ref(&clone_name(&name))
    }

    /// Whether evaluating this term produces a fresh heap value, and of
    /// which type. Bottoming out at an allocating native, a constructor
    /// or a clone counts; so does a conditional both of whose branches
    /// allocate.
    fn allocates(&self, term: &Term) -> Option<Type> {
        match term {
            Term::App(_) => {
                let head = term.spine_head_ref()?;
                let binding = self
                    .index
                    .lookup(head.resolved_id.as_ref()?)?
                    .as_binding()?;
                let produces = binding.native_mem_effect() == Some(MemEffect::Alloc)
                    || binding.meta.origin == BindingOrigin::Constructor
                    || (binding.meta.generated_for.is_some()
                        && binding.name.starts_with("__clone_"));
                if !produces {
                    return None;
                }
                let ty = self.shallow_type(term)?;
                if matches!(ty, Type::Fn { .. }) {
                    // partially applied; nothing allocated yet
                    return None;
                }
                is_heap_type(&ty, self.index).then_some(ty)
            }
            Term::Cond(cond) => {
                let true_t = self.allocates(&cond.if_true)?;
                self.allocates(&cond.if_false)?;
                Some(true_t)
            }
            Term::Group(inner) => self.allocates(inner),
            _ => None,
        }
    }

    /// Heap-typed static literal (string literals live in static storage).
    fn is_static_heap_value(&self, term: &Term) -> bool {
        match term {
            Term::LiteralString { .. } => true,
            Term::Group(inner) => self.is_static_heap_value(inner),
            _ => false,
        }
    }

    /// Transition a consuming argument. Only bare references to tracked
    /// names change state; globals are borrow-only and never invalidated,
    /// complex arguments carry their own fresh ownership into the call.
    fn move_out(&mut self, arg: &Term) {
        let Term::Ref(reference) = arg else {
            return;
        };
        let Some(id) = &reference.resolved_id else {
            return;
        };
        let Some(entry) = self.scope.get(id).cloned() else {
            return;
        };

        match entry.state {
            OwnershipState::Owned => {
                self.scope.set_state(
                    id,
                    OwnershipState::Moved {
                        at: reference.origin,
                    },
                );
            }
            OwnershipState::Borrowed => {
                self.error(
                    SemanticErrorKind::MoveOfBorrowed {
                        name: entry.name.clone(),
                    },
                    reference.origin,
                );
            }
            // the use itself was already reported by the reference walk
            OwnershipState::Moved { .. } => {}
            OwnershipState::Literal => {}
        }
    }

    /// Use-check for a bare reference: anything moved is gone.
    fn check_use(&mut self, reference: &Ref) {
        let Some(id) = &reference.resolved_id else {
            return;
        };
        let Some(entry) = self.scope.get(id) else {
            return;
        };
        if let OwnershipState::Moved { at } = entry.state {
            let kind = if entry.is_param {
                SemanticErrorKind::ConsumingParamNotLastUse {
                    param: entry.name.clone(),
                    name: entry.name.clone(),
                }
            } else {
                SemanticErrorKind::UseAfterMove {
                    name: entry.name.clone(),
                    moved_at: at,
                }
            };
            self.error(kind, reference.origin);
        }
    }

    /// `let __r = body; let _ = <free_call>; __r`, the CPS shape that
    /// runs a free on every exit path of `body`.
    fn sequence_free_after(&mut self, body: Term, free_call: Term) -> Term {
        let body_type = self.shallow_type(&body);

        let result_name = "__r";
        let result_id = self.gen.nested("bnd", &self.owner, result_name);
        let result_param = FnParam {
            name: result_name.into(),
            type_asc: body_type.clone(),
            type_spec: body_type.clone(),
            id: Some(result_id.clone()),
            consuming: false,
            origin: SourceOrigin::Synth,
        };
        if let Some(ty) = body_type {
            self.locals.insert(result_id.clone(), ty);
        }

        let discard_id = self.gen.nested("bnd", &self.owner, "_");
        let discard_param = FnParam {
            name: "_".into(),
            type_asc: Some(Type::Unit),
            type_spec: Some(Type::Unit),
            id: Some(discard_id),
            consuming: false,
            origin: SourceOrigin::Synth,
        };

        let synth_lambda = |params: Vec<FnParam>, body: Term| {
            Term::Lambda(Box::new(Lambda::new(params, body, SourceOrigin::Synth)))
        };
        let continue_with_result = Term::app(
            synth_lambda(
                vec![discard_param],
                Term::Ref(Ref::resolved(result_name, result_id)),
            ),
            free_call,
        );
        Term::app(synth_lambda(vec![result_param], continue_with_result), body)
    }

    /// Whether the terminal position of a term is a bare reference to the
    /// given id; returning it moves ownership out of the scope.
    fn terminal_returns(&self, term: &Term, id: &DeclId) -> bool {
        match term {
            Term::Ref(reference) => reference.resolved_id.as_ref() == Some(id),
            Term::Cond(cond) => {
                self.terminal_returns(&cond.if_true, id) || self.terminal_returns(&cond.if_false, id)
            }
            Term::App(app) => match &app.fun {
                // a let-form's terminal is its continuation body
                Term::Lambda(lambda) if lambda.params.len() == 1 => {
                    self.terminal_returns(&lambda.body, id)
                }
                _ => false,
            },
            Term::Group(inner) => self.terminal_returns(inner, id),
            _ => false,
        }
    }

    /// Let-form: `App(Lambda([p], body), arg)`.
    fn analyze_let(&mut self, mut app: App) -> Term {
        let arg = self.analyze(app.arg);

        let Term::Lambda(mut lambda) = app.fun else {
            unreachable!("analyze_let called on a non-let application");
        };
        let param = &mut lambda.params[0];
        let param_ty = param.ty().cloned().or_else(|| self.shallow_type(&arg));
        let heap = param_ty
            .as_ref()
            .map(|ty| is_heap_type(ty, self.index))
            .unwrap_or(false);

        let state = if !heap {
            OwnershipState::Literal
        } else if self.allocates(&arg).is_some() {
            OwnershipState::Owned
        } else if self.is_static_heap_value(&arg) {
            OwnershipState::Literal
        } else {
            OwnershipState::Borrowed
        };

        self.scope.push_frame();
        let param_id = param.id.clone();
        if let Some(id) = &param_id {
            self.scope.insert(
                id.clone(),
                OwnershipEntry {
                    name: param.name.clone(),
                    state,
                    ty: param_ty.clone(),
                    heap,
                    is_param: false,
                },
            );
            if let Some(ty) = &param_ty {
                self.locals.insert(id.clone(), ty.clone());
            }
        }

        let mut body = self.analyze(lambda.body);

        // free the binding on scope exit when it is still owned and not
        // returned (returning moves ownership to the caller)
        if let Some(id) = &param_id {
            let still_owned = matches!(
                self.scope.get(id).map(|e| &e.state),
                Some(OwnershipState::Owned)
            );
            if still_owned && heap && !self.terminal_returns(&body, id) {
                let free_ref = param_ty.as_ref().and_then(|ty| self.free_ref_for(ty));
                if let Some(free_ref) = free_ref {
                    let free_call = Term::app(
                        free_ref,
                        Term::Ref(Ref::resolved(&lambda.params[0].name, id.clone())),
                    );
                    body = self.sequence_free_after(body, free_call);
                }
            }
        }
        self.scope.pop_frame();

        lambda.body = body;
        app.fun = Term::Lambda(lambda);
        app.arg = arg;
        Term::App(Box::new(app))
    }

    /// A full application spine: move-check consuming positions and lift
    /// allocating temporaries so their frees run after the call.
    fn analyze_call(&mut self, term: Term) -> Term {
        let (head, args) = {
            let (head, args) = term.app_spine();
            (head.clone(), args.into_iter().cloned().collect::<Vec<_>>())
        };

        let callee_params: Vec<FnParam> = head
            .spine_head_ref()
            .and_then(|r| r.resolved_id.as_ref())
            .and_then(|id| self.index.lookup(id))
            .and_then(|decl| decl.as_binding())
            .map(|b| b.params().to_vec())
            .unwrap_or_default();

        let head = match head {
            Term::Ref(reference) => {
                self.check_use(&reference);
                Term::Ref(reference)
            }
            other => self.analyze(other),
        };

        let mut rebuilt_args = vec![];
        let mut lifted: Vec<Lifted> = vec![];

        for (position, arg) in args.into_iter().enumerate() {
            let arg = self.analyze(arg);
            let consuming = callee_params
                .get(position)
                .map(|p| p.consuming)
                .unwrap_or(false);

            if consuming {
                self.move_out(&arg);
                rebuilt_args.push(arg);
                continue;
            }

            // allocating temporaries in borrow positions get their own
            // binding; evaluation order stays left-to-right
            if let Some(ty) = self.allocates(&arg) {
                if let Some(type_name) = heap_type_name(&ty, self.index) {
                    let tmp_name = format!("__tmp{}", lifted.len());
                    let tmp_id = self.gen.nested("bnd", &self.owner, &tmp_name);
                    let param = FnParam {
                        name: tmp_name.clone(),
                        type_asc: Some(ty.clone()),
                        type_spec: Some(ty.clone()),
                        id: Some(tmp_id.clone()),
                        consuming: false,
                        origin: SourceOrigin::Synth,
                    };
                    self.locals.insert(tmp_id.clone(), ty.clone());
                    rebuilt_args.push(Term::Ref(Ref::resolved(&tmp_name, tmp_id)));
                    lifted.push(Lifted {
                        param,
                        expr: arg,
                        type_name,
                    });
                    continue;
                }
            }

            rebuilt_args.push(arg);
        }

        let mut call = head;
        for arg in rebuilt_args {
            call = Term::app(call, arg);
        }

        if lifted.is_empty() {
            return call;
        }

        // let __tmp0 = e0; …; let __r = call; free __tmpN; …; free __tmp0; __r
        let mut freed = call;
        for lift in lifted.iter() {
            if let Some(free_ref) = self.mem_fn_ref(&free_name(&lift.type_name)) {
                let free_call = Term::app(
                    free_ref,
                    Term::Ref(Ref::resolved(
                        &lift.param.name,
                        lift.param.id.clone().expect("lifted param id"),
                    )),
                );
                freed = self.sequence_free_after(freed, free_call);
            }
        }

        let mut wrapped = freed;
        for lift in lifted.into_iter().rev() {
            wrapped = Term::app(
                Term::Lambda(Box::new(Lambda::new(
                    vec![lift.param],
                    wrapped,
                    SourceOrigin::Synth,
                ))),
                lift.expr,
            );
        }
        wrapped
    }

    /// Normalize conditional ownership: when one branch produces an owned
    /// heap value and the other a static or borrowed one, clone the
    /// non-owned branch so the conditional always yields owned.
    fn normalize_cond_branches(
        &mut self,
        if_true: Term,
        if_false: Term,
        origin: SourceOrigin,
    ) -> (Term, Term) {
        let result_type = self
            .shallow_type(&if_true)
            .or_else(|| self.shallow_type(&if_false));
        let Some(result_type) = result_type else {
            return (if_true, if_false);
        };
        if !is_heap_type(&result_type, self.index) {
            return (if_true, if_false);
        }

        let true_owned = self.allocates(&if_true).is_some();
        let false_owned = self.allocates(&if_false).is_some();
        if true_owned == false_owned {
            return (if_true, if_false);
        }

        let clone_ref = self.clone_ref_for(&result_type);
        let wrap = |this: &mut Self, branch: Term| -> (Term, bool) {
            if this.is_static_heap_value(&branch) || matches!(branch, Term::Ref(_)) {
                if let Some(clone_ref) = this.clone_ref_for(&result_type) {
                    return (Term::app(clone_ref, branch), true);
                }
            }
            (branch, false)
        };

        if clone_ref.is_none() {
            self.error(SemanticErrorKind::ConditionalOwnershipMismatch, origin);
            return (if_true, if_false);
        }

        if true_owned {
            let (if_false, ok) = wrap(self, if_false);
            if !ok {
                self.error(SemanticErrorKind::ConditionalOwnershipMismatch, origin);
            }
            (if_true, if_false)
        } else {
            let (if_true, ok) = wrap(self, if_true);
            if !ok {
                self.error(SemanticErrorKind::ConditionalOwnershipMismatch, origin);
            }
            (if_true, if_false)
        }
    }

    fn analyze(&mut self, term: Term) -> Term {
        match term {
            Term::Ref(reference) => {
                self.check_use(&reference);
                Term::Ref(reference)
            }
            Term::App(app) => {
                let is_let = matches!(&app.fun, Term::Lambda(lambda) if lambda.params.len() == 1);
                if is_let {
                    self.analyze_let(*app)
                } else {
                    self.analyze_call(Term::App(app))
                }
            }
            Term::Cond(mut cond) => {
                cond.cond = self.analyze(cond.cond);

                let before = self.scope.clone();
                cond.if_true = self.analyze(cond.if_true);
                let after_true = std::mem::replace(&mut self.scope, before.clone());
                cond.if_false = self.analyze(cond.if_false);
                let after_false = std::mem::replace(&mut self.scope, before);
                OwnershipScope::merge_branches(&mut self.scope, after_true, after_false);

                let (if_true, if_false) =
                    self.normalize_cond_branches(cond.if_true, cond.if_false, cond.origin);
                cond.if_true = if_true;
                cond.if_false = if_false;
                Term::Cond(cond)
            }
            Term::Lambda(mut lambda) => {
                self.scope.push_frame();
                for param in &lambda.params {
                    self.seed_param(param, false);
                }
                lambda.body = self.analyze(lambda.body);
                self.scope.pop_frame();
                Term::Lambda(lambda)
            }
            Term::Group(inner) => self.analyze(*inner),
            Term::Tuple { elements, origin } => Term::Tuple {
                elements: elements.into_iter().map(|e| self.analyze(e)).collect(),
                origin,
            },
            Term::Expr(mut expr) => {
                expr.terms = expr.terms.into_iter().map(|t| self.analyze(t)).collect();
                Term::Expr(expr)
            }
            other => other,
        }
    }

    fn seed_param(&mut self, param: &FnParam, is_fn_param: bool) {
        let Some(id) = param.id.clone() else {
            return;
        };
        let ty = param.ty().cloned();
        let heap = ty
            .as_ref()
            .map(|t| is_heap_type(t, self.index))
            .unwrap_or(false);
        let state = if !heap {
            OwnershipState::Literal
        } else if param.consuming {
            OwnershipState::Owned
        } else {
            OwnershipState::Borrowed
        };
        self.scope.insert(
            id.clone(),
            OwnershipEntry {
                name: param.name.clone(),
                state,
                ty: ty.clone(),
                heap,
                is_param: is_fn_param,
            },
        );
        if let Some(ty) = ty {
            self.locals.insert(id, ty);
        }
    }

    /// Wrap static terminal values of a heap-returning function in clones
    /// so callers always receive owned values. Runs before the main
    /// analysis; terminal references to borrowed parameters and globals
    /// are cloned, owned locals move out instead.
    fn promote_terminals(&mut self, term: Term, fn_params: &[FnParam]) -> Term {
        match term {
            literal @ Term::LiteralString { .. } => {
                match self.clone_ref_for(&crate::semantic::stdlib::base_type("String")) {
                    Some(clone_ref) => Term::app(clone_ref, literal),
                    None => literal,
                }
            }
            Term::Ref(reference) => {
                let borrows = reference
                    .resolved_id
                    .as_ref()
                    .map(|id| {
                        let non_consuming_param = fn_params
                            .iter()
                            .any(|p| p.id.as_ref() == Some(id) && !p.consuming);
                        let global = self
                            .index
                            .lookup(id)
                            .map(|d| d.as_binding().is_some())
                            .unwrap_or(false);
                        non_consuming_param || global
                    })
                    .unwrap_or(false);

                if borrows {
                    let ty = self
                        .locals
                        .get(reference.resolved_id.as_ref().unwrap())
                        .cloned()
                        .or_else(|| self.shallow_type(&Term::Ref(reference.clone())));
                    if let Some(clone_ref) = ty.as_ref().and_then(|t| self.clone_ref_for(t)) {
                        return Term::app(clone_ref, Term::Ref(reference));
                    }
                }
                Term::Ref(reference)
            }
            Term::Cond(mut cond) => {
                cond.if_true = self.promote_terminals(cond.if_true, fn_params);
                cond.if_false = self.promote_terminals(cond.if_false, fn_params);
                Term::Cond(cond)
            }
            Term::App(mut app) => {
                if let Term::Lambda(lambda) = &mut app.fun {
                    if lambda.params.len() == 1 {
                        let body = std::mem::replace(
                            &mut lambda.body,
                            Term::LiteralUnit {
                                origin: SourceOrigin::Synth,
                            },
                        );
                        lambda.body = self.promote_terminals(body, fn_params);
                    }
                }
                Term::App(app)
            }
            Term::Group(inner) => self.promote_terminals(*inner, fn_params),
            other => other,
        }
    }
}

fn analyzable(binding: &Binding) -> bool {
    binding.lambda().is_some()
        && !binding.is_native()
        && binding.meta.generated_for.is_none()
        && binding.meta.origin != BindingOrigin::Constructor
}

pub struct OwnershipAnalyzer;

impl Phase for OwnershipAnalyzer {
    fn name(&self) -> &'static str {
        PHASE
    }

    fn run(&self, mut state: SemanticPhaseState) -> SemanticPhaseState {
        let index = state.resolvables().clone();
        let binding_ids: HashMap<String, DeclId> = state
            .module
            .bindings()
            .filter_map(|b| b.id.clone().map(|id| (b.name.clone(), id)))
            .collect();
        let mut gen = IdGen::new(&state.module.name);
        let mut errors = vec![];

        for member in &mut state.module.members {
            let Member::Binding(binding) = member else {
                continue;
            };
            if !analyzable(binding) {
                continue;
            }

            let owner = binding
                .meta
                .mangled_name
                .clone()
                .unwrap_or_else(|| binding.name.clone());
            let return_type = binding.type_asc.clone();

            let mut analyzer = Analyzer {
                index: &index,
                binding_ids: &binding_ids,
                gen: &mut gen,
                owner,
                scope: OwnershipScope::new(),
                locals: HashMap::new(),
                errors: vec![],
            };

            let Some(lambda) = binding.lambda_mut() else {
                continue;
            };
            let params = lambda.params.clone();
            for param in &params {
                analyzer.seed_param(param, true);
            }

            let mut body = std::mem::replace(
                &mut lambda.body,
                Term::LiteralUnit {
                    origin: SourceOrigin::Synth,
                },
            );

            // callers of a heap-returning function always receive owned
            // values
            let ret_heap = return_type
                .as_ref()
                .map(|ty| is_heap_type(ty, &index))
                .unwrap_or(false);
            if ret_heap {
                body = analyzer.promote_terminals(body, &params);
            }

            body = analyzer.analyze(body);

            // consuming parameters the body neither moved nor returned
            // are freed on exit
            for param in &params {
                let Some(id) = &param.id else { continue };
                let still_owned = matches!(
                    analyzer.scope.get(id).map(|e| &e.state),
                    Some(OwnershipState::Owned)
                );
                if still_owned
                    && param.consuming
                    && !analyzer.terminal_returns(&body, id)
                {
                    if let Some(free_ref) =
                        param.ty().cloned().and_then(|ty| analyzer.free_ref_for(&ty))
                    {
                        let free_call = Term::app(
                            free_ref,
                            Term::Ref(Ref::resolved(&param.name, id.clone())),
                        );
                        body = analyzer.sequence_free_after(body, free_call);
                    }
                }
            }

            lambda.body = body;
            errors.append(&mut analyzer.errors);
        }

        state.errors.append(&mut errors);
        // the rewrites above introduce fresh bindings (__r, __tmpN);
        // re-index so every resolved reference stays resolvable
        super::indexer::rebuild_index(&mut state.module);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        BindingMeta, Expr, Field, Module, TypeStruct, Visibility,
    };
    use crate::semantic::state::{CompilerConfig, SemanticPhaseState};
    use crate::semantic::{
        ConstructorGenerator, ExpressionRewriter, IdAssigner, MemoryFunctionGenerator,
        ReferenceResolver, ResolvablesIndexer, StdlibInjection, TypeChecker, TypeResolver,
    };

    fn lit(value: i64) -> Term {
        Term::LiteralInt {
            value,
            origin: SourceOrigin::Synth,
        }
    }

    fn function(name: &str, params: Vec<FnParam>, ret: Option<&str>, body: Vec<Term>) -> Member {
        let arity = params.len();
        Member::Binding(Binding {
            name: name.into(),
            visibility: Visibility::Public,
            meta: BindingMeta::function(name, arity),
            type_asc: ret.map(|r| {
                if r == "Unit" {
                    Type::Unit
                } else {
                    Type::reference(r, SourceOrigin::Synth)
                }
            }),
            type_spec: None,
            body: Expr::single(Term::lambda(
                params,
                Term::Expr(Expr::new(body, SourceOrigin::Synth)),
            )),
            id: None,
            origin: SourceOrigin::Synth,
        })
    }

    fn untyped_param(name: &str) -> FnParam {
        FnParam {
            name: name.into(),
            type_asc: None,
            type_spec: None,
            id: None,
            consuming: false,
            origin: SourceOrigin::Synth,
        }
    }

    fn let_form(name: &str, value: Vec<Term>, body: Vec<Term>) -> Term {
        Term::app(
            Term::lambda(
                vec![untyped_param(name)],
                Term::Expr(Expr::new(body, SourceOrigin::Synth)),
            ),
            Term::Expr(Expr::new(value, SourceOrigin::Synth)),
        )
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
        let state = MemoryFunctionGenerator.run(state);
        OwnershipAnalyzer.run(state)
    }

    fn body_of(state: &SemanticPhaseState, name: &str) -> Term {
        state
            .module
            .binding(name)
            .unwrap()
            .lambda()
            .unwrap()
            .body
            .clone()
    }

    /// Number of applications whose innermost function position is a
    /// reference with the given name.
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
                Term::Tuple { elements, .. } => {
                    elements.iter().for_each(|e| walk(e, target, count))
                }
                Term::Expr(expr) => expr.terms.iter().for_each(|e| walk(e, target, count)),
                _ => {}
            }
        }
        let mut count = 0;
        walk(term, target, &mut count);
        count
    }

    #[test]
    fn test_automatic_free_after_let() {
        // main(): Unit = let s = to_string 42; println s
        let state = run(vec![function(
            "main",
            vec![],
            Some("Unit"),
            vec![let_form(
                "s",
                vec![Term::reference("to_string", SourceOrigin::Synth), lit(42)],
                vec![
                    Term::reference("println", SourceOrigin::Synth),
                    Term::reference("s", SourceOrigin::Synth),
                ],
            )],
        )]);

        assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);
        let body = body_of(&state, "main");
        assert_eq!(count_calls(&body, "__free_String"), 1);
        assert_eq!(count_calls(&body, "println"), 1);
    }

    #[test]
    fn test_no_free_for_borrowed_or_literal() {
        // f(s: String): Unit = println s   -- s is borrowed
        let s_param = FnParam::new(
            "s",
            Type::reference("String", SourceOrigin::Synth),
            SourceOrigin::Synth,
        );
        let state = run(vec![function(
            "f",
            vec![s_param],
            Some("Unit"),
            vec![
                Term::reference("println", SourceOrigin::Synth),
                Term::reference("s", SourceOrigin::Synth),
            ],
        )]);

        assert!(state.errors.is_empty());
        assert_eq!(count_calls(&body_of(&state, "f"), "__free_String"), 0);
    }

    #[test]
    fn test_use_after_move_through_consuming_constructor() {
        // struct S { s: String }
        // f(): Unit = let x = to_string 1; let p = S x; println x
        let s_struct = Member::TypeStruct(TypeStruct {
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
        let f = function(
            "f",
            vec![],
            Some("Unit"),
            vec![let_form(
                "x",
                vec![Term::reference("to_string", SourceOrigin::Synth), lit(1)],
                vec![let_form(
                    "p",
                    vec![
                        Term::reference("__mk_S", SourceOrigin::Synth),
                        Term::reference("x", SourceOrigin::Synth),
                    ],
                    vec![
                        Term::reference("println", SourceOrigin::Synth),
                        Term::reference("x", SourceOrigin::Synth),
                    ],
                )],
            )],
        );

        let state = run(vec![s_struct, f]);

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
    fn test_conditional_allocation_promotes_static_branch() {
        // get(b: Bool): String = if b then to_string 1 else "static"
        let b_param = FnParam::new(
            "b",
            Type::reference("Bool", SourceOrigin::Synth),
            SourceOrigin::Synth,
        );
        let cond = Term::Cond(Box::new(crate::ast::Cond {
            cond: Term::reference("b", SourceOrigin::Synth),
            if_true: Term::Expr(Expr::new(
                vec![Term::reference("to_string", SourceOrigin::Synth), lit(1)],
                SourceOrigin::Synth,
            )),
            if_false: Term::LiteralString {
                value: "static".into(),
                origin: SourceOrigin::Synth,
            },
            origin: SourceOrigin::Synth,
        }));
        let state = run(vec![function(
            "get",
            vec![b_param],
            Some("String"),
            vec![cond],
        )]);

        assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);
        let body = body_of(&state, "get");
        let Term::Cond(cond) = &body else {
            panic!("expected conditional body, got {body:?}");
        };
        // the static branch now clones
        assert_eq!(count_calls(&cond.if_false, "__clone_String"), 1);
        assert_eq!(count_calls(&cond.if_true, "__clone_String"), 0);
    }

    #[test]
    fn test_allocating_argument_lifted_to_temporary() {
        // f(): Unit = println (to_string 7)
        let state = run(vec![function(
            "f",
            vec![],
            Some("Unit"),
            vec![
                Term::reference("println", SourceOrigin::Synth),
                Term::Group(Box::new(Term::Expr(Expr::new(
                    vec![Term::reference("to_string", SourceOrigin::Synth), lit(7)],
                    SourceOrigin::Synth,
                )))),
            ],
        )]);

        assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);
        let body = body_of(&state, "f");
        // the temporary is bound, used, and freed exactly once
        assert_eq!(count_calls(&body, "__free_String"), 1);
        let mut found_tmp = false;
        fn find_tmp(term: &Term, found: &mut bool) {
            match term {
                Term::Lambda(lambda) => {
                    if lambda.params.iter().any(|p| p.name.starts_with("__tmp")) {
                        *found = true;
                    }
                    find_tmp(&lambda.body, found);
                }
                Term::App(app) => {
                    find_tmp(&app.fun, found);
                    find_tmp(&app.arg, found);
                }
                _ => {}
            }
        }
        find_tmp(&body, &mut found_tmp);
        assert!(found_tmp, "expected a lifted __tmp binding in {body:?}");
    }

    #[test]
    fn test_globals_are_borrow_only() {
        // g = "hello"; f(): Unit = println g; println g  -- no moves, no frees
        let g = Member::Binding(Binding {
            name: "g".into(),
            visibility: Visibility::Public,
            meta: BindingMeta::value("g"),
            type_asc: Some(Type::reference("String", SourceOrigin::Synth)),
            type_spec: None,
            body: Expr::single(Term::LiteralString {
                value: "hello".into(),
                origin: SourceOrigin::Synth,
            }),
            id: None,
            origin: SourceOrigin::Synth,
        });
        let f = function(
            "f",
            vec![],
            Some("Unit"),
            vec![let_form(
                "ignored",
                vec![
                    Term::reference("println", SourceOrigin::Synth),
                    Term::reference("g", SourceOrigin::Synth),
                ],
                vec![
                    Term::reference("println", SourceOrigin::Synth),
                    Term::reference("g", SourceOrigin::Synth),
                ],
            )],
        );
        let state = run(vec![g, f]);

        assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);
        assert_eq!(count_calls(&body_of(&state, "f"), "__free_String"), 0);
    }

    #[test]
    fn test_returning_owned_local_suppresses_free() {
        // make(): String = let s = to_string 3; s
        let state = run(vec![function(
            "make",
            vec![],
            Some("String"),
            vec![let_form(
                "s",
                vec![Term::reference("to_string", SourceOrigin::Synth), lit(3)],
                vec![Term::reference("s", SourceOrigin::Synth)],
            )],
        )]);

        assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);
        assert_eq!(count_calls(&body_of(&state, "make"), "__free_String"), 0);
    }

    #[test]
    fn test_heap_literal_return_is_cloned() {
        // greet(): String = "hi"
        let state = run(vec![function(
            "greet",
            vec![],
            Some("String"),
            vec![Term::LiteralString {
                value: "hi".into(),
                origin: SourceOrigin::Synth,
            }],
        )]);

        assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);
        assert_eq!(count_calls(&body_of(&state, "greet"), "__clone_String"), 1);
    }

    #[test]
    fn test_move_of_borrowed_param_rejected() {
        // struct S { s: String }; f(x: String): Unit = let p = S x; ()
        let s_struct = Member::TypeStruct(TypeStruct {
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
        let x_param = FnParam::new(
            "x",
            Type::reference("String", SourceOrigin::Synth),
            SourceOrigin::Synth,
        );
        let f = function(
            "f",
            vec![x_param],
            Some("Unit"),
            vec![let_form(
                "p",
                vec![
                    Term::reference("__mk_S", SourceOrigin::Synth),
                    Term::reference("x", SourceOrigin::Synth),
                ],
                vec![Term::LiteralUnit {
                    origin: SourceOrigin::Synth,
                }],
            )],
        );
        let state = run(vec![s_struct, f]);

        assert!(
            state
                .errors
                .iter()
                .any(|e| matches!(&e.kind, SemanticErrorKind::MoveOfBorrowed { name } if name == "x")),
            "expected MoveOfBorrowed, got {:?}",
            state.errors
        );
    }
}
