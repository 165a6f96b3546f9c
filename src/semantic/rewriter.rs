//! Collapses flat `Expr` term sequences into nested `App`/`Lambda`/`Cond`
//! trees: precedence climbing with function application as juxtaposition.
//!
//! `f a b` becomes `((f a) b)`; `1 + 2 * 3` becomes
//! `(+ 1 (* 2 3))` spelled as curried `App`s. Under-applied functions are
//! eta-expanded into synthetic lambdas that saturate the original call,
//! unless a still-missing parameter is consuming, which is an error.
//!
//! The rewriter threads a per-module map of already-rewritten bindings so
//! later bindings resolve against the rewritten form of earlier ones.

use std::collections::HashMap;

use crate::ast::{
    Associativity, Binding, DeclId, Expr, FnParam, Lambda, Member, Ref, ResolvablesIndex,
    SourceOrigin, Term, TermError, Type,
};

use super::error::{SemanticError, SemanticErrorKind};
use super::ids::IdGen;
use super::state::SemanticPhaseState;
use super::Phase;

const PHASE: &str = "rewrite";

/// Everything the climber needs to know about one operator candidate.
struct OpView {
    id: DeclId,
    precedence: u32,
    associativity: Associativity,
}

/// Callable view of a reference head: declared arity plus the declared
/// parameters (name, type, consuming) needed for eta-expansion.
struct HeadView {
    arity: usize,
    params: Vec<(String, Option<Type>, bool)>,
}

struct Rewriter<'a> {
    index: &'a ResolvablesIndex,
    rewritten: &'a HashMap<String, Binding>,
    gen: &'a mut IdGen,
    /// Name of the binding being rewritten, for owner segments of
    /// synthesized parameter ids.
    owner: String,
    errors: Vec<SemanticError>,
}

impl<'a> Rewriter<'a> {
    fn binding_for(&self, id: &DeclId) -> Option<&Binding> {
        let indexed = self.index.lookup(id)?.as_binding()?;
        // same-name bindings exist (binary vs prefix '-'); only take the
        // rewritten copy when it is the same declaration
        match self.rewritten.get(&indexed.name) {
            Some(binding) if binding.id.as_ref() == Some(id) => Some(binding),
            _ => Some(indexed),
        }
    }

    fn candidate_op<F>(&self, reference: &Ref, wanted: F) -> Option<OpView>
    where
        F: Fn(&crate::ast::BindingMeta) -> bool,
    {
        let ids = if reference.resolved_id.is_some() {
            std::slice::from_ref(reference.resolved_id.as_ref().unwrap())
        } else {
            reference.candidate_ids.as_slice()
        };

        for id in ids {
            if let Some(binding) = self.binding_for(id) {
                if wanted(&binding.meta) {
                    return Some(OpView {
                        id: id.clone(),
                        precedence: binding.meta.precedence.unwrap_or(0),
                        associativity: binding
                            .meta
                            .associativity
                            .unwrap_or(Associativity::Left),
                    });
                }
            }
        }
        None
    }

    fn binary_op(&self, term: &Term) -> Option<(Ref, OpView)> {
        let Term::Ref(reference) = term else {
            return None;
        };
        self.candidate_op(reference, |meta| meta.is_binary_operator())
            .map(|view| (reference.clone(), view))
    }

    fn prefix_op(&self, term: &Term) -> Option<(Ref, OpView)> {
        let Term::Ref(reference) = term else {
            return None;
        };
        self.candidate_op(reference, |meta| meta.is_prefix_operator())
            .map(|view| (reference.clone(), view))
    }

    fn postfix_op(&self, term: &Term) -> Option<(Ref, OpView)> {
        let Term::Ref(reference) = term else {
            return None;
        };
        self.candidate_op(reference, |meta| meta.is_postfix_operator())
            .map(|view| (reference.clone(), view))
    }

    fn is_any_operator(&self, term: &Term) -> bool {
        self.binary_op(term).is_some()
            || self.prefix_op(term).is_some()
            || self.postfix_op(term).is_some()
    }

    /// Callable view of a head reference. Bindings carry arity in their
    /// meta; parameters of function type derive it from the type.
    fn head_view(&self, reference: &Ref) -> Option<HeadView> {
        let id = reference
            .resolved_id
            .as_ref()
            .or_else(|| match reference.candidate_ids.as_slice() {
                [single] => Some(single),
                _ => None,
            })?;

        match self.index.lookup(id)? {
            crate::ast::IndexedDecl::Binding(indexed) => {
                let binding = self.binding_for(id).unwrap_or(indexed);
                let params = binding
                    .params()
                    .iter()
                    .map(|p| (p.name.clone(), p.ty().cloned(), p.consuming))
                    .collect();
                Some(HeadView {
                    arity: binding.meta.arity,
                    params,
                })
            }
            decl => {
                let ty = decl.ty()?;
                let Type::Fn { params, .. } = ty else {
                    return Some(HeadView {
                        arity: 0,
                        params: vec![],
                    });
                };
                Some(HeadView {
                    arity: params.len(),
                    params: params
                        .iter()
                        .enumerate()
                        .map(|(i, ty)| (format!("arg{i}"), Some(ty.clone()), false))
                        .collect(),
                })
            }
        }
    }

    fn error(&mut self, kind: SemanticErrorKind, origin: SourceOrigin) {
        self.errors.push(SemanticError::new(kind, PHASE, origin));
    }

    /// Resolve the winning operator candidate into the reference used in
    /// function position.
    fn op_ref(&self, reference: &Ref, view: &OpView) -> Term {
        Term::Ref(Ref {
            name: reference.name.clone(),
            qualifier: None,
            resolved_id: Some(view.id.clone()),
            candidate_ids: vec![view.id.clone()],
            origin: reference.origin,
        })
    }

    /// Rewrite an arbitrary (possibly already-structured) term.
    fn rewrite_term(&mut self, term: Term) -> Term {
        match term {
            Term::Expr(expr) => self.rewrite_expr(expr),
            Term::Lambda(mut lambda) => {
                lambda.body = self.rewrite_term(lambda.body);
                Term::Lambda(lambda)
            }
            Term::App(mut app) => {
                app.fun = self.rewrite_term(app.fun);
                app.arg = self.rewrite_term(app.arg);
                Term::App(app)
            }
            Term::Cond(mut cond) => {
                cond.cond = self.rewrite_term(cond.cond);
                cond.if_true = self.rewrite_term(cond.if_true);
                cond.if_false = self.rewrite_term(cond.if_false);
                Term::Cond(cond)
            }
            Term::Group(inner) => self.rewrite_term(*inner),
            Term::Tuple { elements, origin } => Term::Tuple {
                elements: elements
                    .into_iter()
                    .map(|e| self.rewrite_term(e))
                    .collect(),
                origin,
            },
            other => other,
        }
    }

    /// Collapse one flat term sequence.
    fn rewrite_expr(&mut self, expr: Expr) -> Term {
        let Expr { terms, origin } = expr;

        if terms.is_empty() {
            self.error(
                SemanticErrorKind::InvalidExpression {
                    reason: "empty expression".into(),
                },
                origin,
            );
            return Term::TermError(Box::new(TermError {
                terms: vec![],
                reason: "empty expression".into(),
                origin,
            }));
        }

        let mut pos = 0;
        let result = self.climb(&terms, &mut pos, 0);

        if pos < terms.len() {
            let reason = match &terms[pos] {
                Term::Group(_) => "group follows a complete expression without an operator",
                _ => "term follows a complete expression",
            };
            self.error(
                SemanticErrorKind::DanglingTerms {
                    reason: reason.into(),
                },
                terms[pos].origin(),
            );
            return Term::TermError(Box::new(TermError {
                terms,
                reason: reason.into(),
                origin,
            }));
        }

        result
    }

    fn climb(&mut self, terms: &[Term], pos: &mut usize, min_prec: u32) -> Term {
        let mut lhs = self.parse_primary(terms, pos);

        while *pos < terms.len() {
            if let Some((reference, view)) = self.binary_op(&terms[*pos]) {
                if view.precedence < min_prec {
                    break;
                }
                *pos += 1;
                let next_min = match view.associativity {
                    Associativity::Right => view.precedence,
                    Associativity::Left => view.precedence + 1,
                };
                let rhs = self.climb(terms, pos, next_min);
                let op = self.op_ref(&reference, &view);
                lhs = Term::app(Term::app(op, lhs), rhs);
                continue;
            }

            if let Some((reference, view)) = self.postfix_op(&terms[*pos]) {
                if view.precedence < min_prec {
                    break;
                }
                *pos += 1;
                let op = self.op_ref(&reference, &view);
                lhs = Term::app(op, lhs);
                continue;
            }

            break;
        }

        lhs
    }

    fn parse_primary(&mut self, terms: &[Term], pos: &mut usize) -> Term {
        let term = terms[*pos].clone();
        *pos += 1;

        // prefix operator at the head of an operand
        if let Some((reference, view)) = self.prefix_op(&term) {
            let operand = if *pos < terms.len() {
                self.climb(terms, pos, view.precedence)
            } else {
                self.error(
                    SemanticErrorKind::InvalidExpression {
                        reason: format!("prefix operator '{}' lacks an operand", reference.name),
                    },
                    reference.origin,
                );
                return Term::TermError(Box::new(TermError {
                    terms: vec![term],
                    reason: "prefix operator lacks an operand".into(),
                    origin: reference.origin,
                }));
            };
            return Term::app(self.op_ref(&reference, &view), operand);
        }

        // a lone binary/postfix operator cannot open an expression
        if self.is_any_operator(&term) {
            let origin = term.origin();
            self.error(
                SemanticErrorKind::InvalidExpression {
                    reason: "expression starts with an infix operator".into(),
                },
                origin,
            );
            return Term::TermError(Box::new(TermError {
                terms: vec![term],
                reason: "expression starts with an infix operator".into(),
                origin,
            }));
        }

        match term {
            Term::Ref(reference) => self.apply_head(Term::Ref(reference), terms, pos),
            Term::Lambda(_) | Term::App(_) => {
                let head = self.rewrite_term(term);
                self.apply_head(head, terms, pos)
            }
            Term::Group(inner) => self.rewrite_term(*inner),
            Term::Expr(expr) => self.rewrite_expr(expr),
            Term::Cond(_) | Term::Tuple { .. } => self.rewrite_term(term),
            atom => atom,
        }
    }

    /// Greedily consume following non-operator terms as curried
    /// arguments, then eta-expand under-application.
    fn apply_head(&mut self, head: Term, terms: &[Term], pos: &mut usize) -> Term {
        let head_ref = match &head {
            Term::Ref(reference) => Some(reference.clone()),
            _ => None,
        };
        let view = head_ref.as_ref().and_then(|r| self.head_view(r));

        let mut applied = head;
        let mut consumed = 0usize;

        while *pos < terms.len() && !self.is_any_operator(&terms[*pos]) {
            // a value head takes no juxtaposed arguments, except the
            // explicit () of a zero-arity call
            if let Some(HeadView { arity: 0, .. }) = &view {
                if !matches!(terms[*pos], Term::LiteralUnit { .. }) || consumed > 0 {
                    break;
                }
            }
            let arg = self.parse_argument(terms, pos);
            applied = Term::app(applied, arg);
            consumed += 1;
        }

        let Some(view) = view else {
            return applied;
        };

        // partial application: wrap in a lambda that saturates the call,
        // unless the next term is an operator that takes the partial
        // application as its operand
        if consumed > 0 && consumed < view.arity {
            let followed_by_op = *pos < terms.len()
                && (self.binary_op(&terms[*pos]).is_some()
                    || self.postfix_op(&terms[*pos]).is_some());
            if followed_by_op {
                return applied;
            }
            return self.eta_expand(applied, &view, consumed);
        }

        applied
    }

    fn eta_expand(&mut self, applied: Term, view: &HeadView, consumed: usize) -> Term {
        let missing = &view.params[consumed..];

        if let Some((name, _, _)) = missing.iter().find(|(_, _, consuming)| *consuming) {
            self.error(
                SemanticErrorKind::PartialApplicationWithConsuming {
                    param: name.clone(),
                },
                applied.origin(),
            );
            return applied;
        }

        let mut params = vec![];
        let mut body = applied;
        for (i, (_, ty, _)) in missing.iter().enumerate() {
            let name = format!("$p{i}");
            let id = self.gen.nested("bnd", &self.owner, &name);
            params.push(FnParam {
                name: name.clone(),
                type_asc: ty.clone(),
                type_spec: None,
                id: Some(id.clone()),
                consuming: false,
                origin: SourceOrigin::Synth,
            });
            body = Term::app(body, Term::Ref(Ref::resolved(name, id)));
        }

        Term::Lambda(Box::new(Lambda::new(params, body, SourceOrigin::Synth)))
    }

    /// Arguments are atoms: references stay bare (function values), and
    /// structured terms are rewritten recursively.
    fn parse_argument(&mut self, terms: &[Term], pos: &mut usize) -> Term {
        let term = terms[*pos].clone();
        *pos += 1;
        match term {
            Term::Group(inner) => self.rewrite_term(*inner),
            Term::Expr(expr) => self.rewrite_expr(expr),
            Term::Lambda(_) | Term::App(_) | Term::Cond(_) | Term::Tuple { .. } => {
                self.rewrite_term(term)
            }
            atom => atom,
        }
    }
}

pub struct ExpressionRewriter;

impl Phase for ExpressionRewriter {
    fn name(&self) -> &'static str {
        PHASE
    }

    fn run(&self, mut state: SemanticPhaseState) -> SemanticPhaseState {
        let index = state.resolvables().clone();
        let mut gen = IdGen::new(&state.module.name);
        let mut rewritten: HashMap<String, Binding> = HashMap::new();
        let mut errors = vec![];

        for member in &mut state.module.members {
            let Member::Binding(binding) = member else {
                continue;
            };

            let owner = binding
                .meta
                .mangled_name
                .clone()
                .unwrap_or_else(|| binding.name.clone());
            let mut rewriter = Rewriter {
                index: &index,
                rewritten: &rewritten,
                gen: &mut gen,
                owner,
                errors: vec![],
            };

            let body = std::mem::replace(
                &mut binding.body,
                Expr::new(vec![], SourceOrigin::Synth),
            );
            let origin = body.origin;
            let result = rewriter.rewrite_expr(body);
            binding.body = Expr {
                terms: vec![result],
                origin,
            };

            errors.append(&mut rewriter.errors);
            rewritten.insert(binding.name.clone(), binding.clone());
        }

        state.errors.append(&mut errors);
        state
    }
}
