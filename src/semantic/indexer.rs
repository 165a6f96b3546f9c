//! Rebuilds the resolvables index from the tree. Runs as its own phase
//! after the expression rewriter (which synthesizes lambdas and
//! parameters the earlier index build never saw) and as a library
//! routine for the id assigner.

use crate::ast::{IndexedDecl, Member, Module, ResolvablesIndex, Term, TypeDecl};

use super::state::SemanticPhaseState;
use super::Phase;

const PHASE: &str = "indexer";

fn index_params(term: &Term, index: &mut ResolvablesIndex) {
    match term {
        Term::Lambda(lambda) => {
            index.update_all(&lambda.params);
            index_params(&lambda.body, index);
        }
        Term::App(app) => {
            index_params(&app.fun, index);
            index_params(&app.arg, index);
        }
        Term::Cond(cond) => {
            index_params(&cond.cond, index);
            index_params(&cond.if_true, index);
            index_params(&cond.if_false, index);
        }
        Term::Group(inner) => index_params(inner, index),
        Term::Tuple { elements, .. } => {
            for element in elements {
                index_params(element, index);
            }
        }
        Term::Expr(expr) => {
            for t in &expr.terms {
                index_params(t, index);
            }
        }
        Term::TermError(err) => {
            for t in &err.terms {
                index_params(t, index);
            }
        }
        _ => {}
    }
}

/// Rebuild the module's index in full: every top-level declaration,
/// every struct field, and every parameter of every (nested) lambda.
pub(crate) fn rebuild_index(module: &mut Module) {
    let mut index = ResolvablesIndex::default();

    for member in &module.members {
        match member {
            Member::Binding(binding) => {
                index.update(IndexedDecl::Binding(binding.clone()));
                for term in &binding.body.terms {
                    index_params(term, &mut index);
                }
            }
            Member::TypeDef(def) => index.update_type(TypeDecl::Def(def.clone())),
            Member::TypeAlias(alias) => index.update_type(TypeDecl::Alias(alias.clone())),
            Member::TypeStruct(ts) => {
                index.update_type(TypeDecl::Struct(ts.clone()));
                for field in &ts.fields {
                    index.update(IndexedDecl::Field(field.clone()));
                }
            }
            _ => {}
        }
    }

    module.resolvables = index;
}

pub struct ResolvablesIndexer;

impl Phase for ResolvablesIndexer {
    fn name(&self) -> &'static str {
        PHASE
    }

    fn run(&self, mut state: SemanticPhaseState) -> SemanticPhaseState {
        rebuild_index(&mut state.module);
        state
    }
}
