//! Marks self-recursive calls in terminal position so the IR emitter can
//! lower them as loops. A position is terminal when it is the body's last
//! expression, a branch of a conditional in terminal position, or the
//! continuation of a let binding in terminal position.

use crate::ast::{Binding, DeclId, Member, Term};

use super::state::SemanticPhaseState;
use super::Phase;

const PHASE: &str = "tailcall";

fn has_terminal_self_call(term: &Term, self_id: &DeclId) -> bool {
    match term {
        Term::App(app) => match &app.fun {
            // a let-form's terminal position is its continuation
            Term::Lambda(lambda) if lambda.params.len() == 1 => {
                has_terminal_self_call(&lambda.body, self_id)
            }
            _ => term
                .spine_head_ref()
                .and_then(|r| r.resolved_id.as_ref())
                .map(|id| id == self_id)
                .unwrap_or(false),
        },
        Term::Cond(cond) => {
            has_terminal_self_call(&cond.if_true, self_id)
                || has_terminal_self_call(&cond.if_false, self_id)
        }
        Term::Group(inner) => has_terminal_self_call(inner, self_id),
        Term::Expr(expr) => expr
            .terms
            .last()
            .map(|t| has_terminal_self_call(t, self_id))
            .unwrap_or(false),
        _ => false,
    }
}

fn detect(binding: &mut Binding) {
    let Some(id) = binding.id.clone() else {
        return;
    };
    let Some(lambda) = binding.lambda_mut() else {
        return;
    };
    if has_terminal_self_call(&lambda.body, &id) {
        lambda.meta.is_tail_recursive = true;
    }
}

pub struct TailCallDetector;

impl Phase for TailCallDetector {
    fn name(&self) -> &'static str {
        PHASE
    }

    fn run(&self, mut state: SemanticPhaseState) -> SemanticPhaseState {
        if state.config.no_tco {
            return state;
        }

        for member in &mut state.module.members {
            if let Member::Binding(binding) = member {
                detect(binding);
            }
        }
        state
    }
}
