//! Surfaces parser-produced error placeholders into the semantic error
//! stream: malformed members, malformed identifiers, and invalid
//! expressions embedded inside otherwise well-formed bodies. The tree
//! itself is left untouched; the markers stay in place so later phases
//! can step around them.

use crate::ast::{Member, Term};

use super::error::{SemanticError, SemanticErrorKind};
use super::state::SemanticPhaseState;
use super::Phase;

pub struct ErrorNodeCheck;

const PHASE: &str = "error-nodes";

fn collect_invalid_expressions(term: &Term, found: &mut Vec<SemanticError>) {
    match term {
        Term::TermError(err) => found.push(SemanticError::new(
            SemanticErrorKind::InvalidExpressionFound {
                reason: err.reason.clone(),
            },
            PHASE,
            err.origin,
        )),
        Term::App(app) => {
            collect_invalid_expressions(&app.fun, found);
            collect_invalid_expressions(&app.arg, found);
        }
        Term::Lambda(lambda) => collect_invalid_expressions(&lambda.body, found),
        Term::Cond(cond) => {
            collect_invalid_expressions(&cond.cond, found);
            collect_invalid_expressions(&cond.if_true, found);
            collect_invalid_expressions(&cond.if_false, found);
        }
        Term::Group(inner) => collect_invalid_expressions(inner, found),
        Term::Tuple { elements, .. } => {
            for element in elements {
                collect_invalid_expressions(element, found);
            }
        }
        Term::Expr(expr) => {
            for t in &expr.terms {
                collect_invalid_expressions(t, found);
            }
        }
        _ => {}
    }
}

impl Phase for ErrorNodeCheck {
    fn name(&self) -> &'static str {
        PHASE
    }

    fn run(&self, mut state: SemanticPhaseState) -> SemanticPhaseState {
        let mut found = vec![];

        for member in &state.module.members {
            match member {
                Member::ParsingMemberError(err) => {
                    found.push(SemanticError::new(
                        SemanticErrorKind::MemberErrorFound {
                            message: err.message.clone(),
                        },
                        PHASE,
                        err.origin,
                    ));
                }
                Member::ParsingIdError(err) => {
                    found.push(SemanticError::new(
                        SemanticErrorKind::ParsingIdErrorFound {
                            name: err.name.clone(),
                            message: err.message.clone(),
                        },
                        PHASE,
                        err.origin,
                    ));
                }
                Member::Binding(binding) => {
                    for term in &binding.body.terms {
                        collect_invalid_expressions(term, &mut found);
                    }
                }
                _ => {}
            }
        }

        state.errors.append(&mut found);
        state
    }

    fn blocks_downstream(&self, state: &SemanticPhaseState) -> bool {
        // Only when nothing but parser wreckage is left: a module whose
        // every member is an error marker gives later phases nothing to
        // work on. With the stdlib injected this never fires; it guards
        // direct uses of the phase on raw parser output.
        let members = &state.module.members;
        let has_parser_error = members.iter().any(|m| {
            matches!(m, Member::ParsingMemberError(_) | Member::ParsingIdError(_))
        });
        has_parser_error && members.iter().all(|m| m.is_error_marker())
    }
}
