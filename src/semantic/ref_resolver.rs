//! Resolves value-level references. Candidates are collected by scope:
//! enclosing lambda parameters innermost-first (let-bound names included,
//! since lets are `App(Lambda, arg)` chains), then top-level declarations
//! of the module, stdlib included. A unique candidate becomes
//! `resolved_id`; several stay as `candidate_ids` for the expression
//! rewriter to disambiguate positionally (binary vs. prefix `-`).

use std::collections::HashMap;

use crate::ast::{
    Binding, DeclId, Member, Ref, ResolvablesIndex, Term, Type, TypeDecl, TypeRef,
};

use super::error::{SemanticError, SemanticErrorKind};
use super::state::SemanticPhaseState;
use super::Phase;

const PHASE: &str = "refs";

/// One lexical frame: parameter name -> (id, declared type).
type Frame = Vec<(String, DeclId, Option<Type>)>;

struct Resolver<'a> {
    top_level: &'a HashMap<String, Vec<DeclId>>,
    index: &'a ResolvablesIndex,
    scopes: Vec<Frame>,
    member: String,
    /// Id a non-recursive binding must not resolve to (itself).
    excluded: Option<DeclId>,
    errors: Vec<SemanticError>,
}

impl<'a> Resolver<'a> {
    fn lookup_param(&self, name: &str) -> Option<(DeclId, Option<Type>)> {
        for frame in self.scopes.iter().rev() {
            if let Some((_, id, ty)) = frame.iter().rev().find(|(n, _, _)| n == name) {
                return Some((id.clone(), ty.clone()));
            }
        }
        None
    }

    fn top_level_candidates(&self, name: &str) -> Vec<DeclId> {
        self.top_level
            .get(name)
            .map(|ids| {
                ids.iter()
                    .filter(|id| Some(*id) != self.excluded.as_ref())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn undefined(&mut self, name: String, origin: crate::ast::SourceOrigin) {
        self.errors.push(SemanticError::new(
            SemanticErrorKind::UndefinedRef {
                name,
                member: self.member.clone(),
            },
            PHASE,
            origin,
        ));
    }

    /// Chase a type to the struct declaration behind it, through aliases.
    fn struct_behind(&self, ty: &Type) -> Option<crate::ast::TypeStruct> {
        let mut current = ty.clone();
        for _ in 0..16 {
            match current {
                Type::Ref(TypeRef {
                    resolved_id: Some(id),
                    ..
                }) => match self.index.lookup_type(&id)? {
                    TypeDecl::Struct(ts) => return Some(ts.clone()),
                    TypeDecl::Alias(alias) => {
                        current = alias.type_spec.clone().or(Some(alias.referenced.clone()))?;
                    }
                    TypeDecl::Def(_) => return None,
                },
                _ => return None,
            }
        }
        None
    }

    fn resolve_qualified(&mut self, reference: &mut Ref) {
        let qualifier = reference.qualifier.clone().unwrap_or_default();

        // the qualifier resolves like any unqualified name
        let qualifier_type = if let Some((_, ty)) = self.lookup_param(&qualifier) {
            ty
        } else {
            match self.top_level_candidates(&qualifier).as_slice() {
                [id] => self
                    .index
                    .lookup(id)
                    .and_then(|decl| decl.ty().cloned()),
                _ => None,
            }
        };

        let field = qualifier_type
            .as_ref()
            .and_then(|ty| self.struct_behind(ty))
            .and_then(|ts| ts.field(&reference.name).cloned());

        match field.and_then(|f| f.id) {
            Some(id) => {
                reference.candidate_ids = vec![id.clone()];
                reference.resolved_id = Some(id);
            }
            None => {
                self.undefined(
                    format!("{qualifier}.{}", reference.name),
                    reference.origin,
                );
            }
        }
    }

    fn resolve_ref(&mut self, reference: &mut Ref) {
        if reference.resolved_id.is_some() {
            return;
        }
        if reference.qualifier.is_some() {
            return self.resolve_qualified(reference);
        }

        if let Some((id, _)) = self.lookup_param(&reference.name) {
            reference.candidate_ids = vec![id.clone()];
            reference.resolved_id = Some(id);
            return;
        }

        match self.top_level_candidates(&reference.name).as_slice() {
            [] => self.undefined(reference.name.clone(), reference.origin),
            [id] => {
                reference.candidate_ids = vec![id.clone()];
                reference.resolved_id = Some(id.clone());
            }
            many => {
                reference.candidate_ids = many.to_vec();
            }
        }
    }

    fn resolve_term(&mut self, term: &mut Term) {
        match term {
            Term::Ref(reference) => self.resolve_ref(reference),
            Term::Lambda(lambda) => {
                let frame = lambda
                    .params
                    .iter()
                    .filter_map(|p| {
                        p.id.clone()
                            .map(|id| (p.name.clone(), id, p.ty().cloned()))
                    })
                    .collect();
                self.scopes.push(frame);
                self.resolve_term(&mut lambda.body);
                self.scopes.pop();
            }
            Term::App(app) => {
                self.resolve_term(&mut app.arg);
                self.resolve_term(&mut app.fun);
            }
            Term::Cond(cond) => {
                self.resolve_term(&mut cond.cond);
                self.resolve_term(&mut cond.if_true);
                self.resolve_term(&mut cond.if_false);
            }
            Term::Group(inner) => self.resolve_term(inner),
            Term::Tuple { elements, .. } => {
                for element in elements {
                    self.resolve_term(element);
                }
            }
            Term::Expr(expr) => {
                for t in &mut expr.terms {
                    self.resolve_term(t);
                }
            }
            _ => {}
        }
    }
}

fn resolve_binding(
    binding: &mut Binding,
    top_level: &HashMap<String, Vec<DeclId>>,
    index: &ResolvablesIndex,
) -> Vec<SemanticError> {
    // a binding may reference itself only when it is function-shaped
    let excluded = if binding.lambda().is_some() {
        None
    } else {
        binding.id.clone()
    };

    let mut resolver = Resolver {
        top_level,
        index,
        scopes: vec![],
        member: binding.name.clone(),
        excluded,
        errors: vec![],
    };

    for term in &mut binding.body.terms {
        resolver.resolve_term(term);
    }
    resolver.errors
}

pub struct ReferenceResolver;

impl Phase for ReferenceResolver {
    fn name(&self) -> &'static str {
        PHASE
    }

    fn run(&self, mut state: SemanticPhaseState) -> SemanticPhaseState {
        let mut top_level: HashMap<String, Vec<DeclId>> = HashMap::new();
        for member in &state.module.members {
            if let Member::Binding(binding) = member {
                if let Some(id) = &binding.id {
                    top_level
                        .entry(binding.name.clone())
                        .or_default()
                        .push(id.clone());
                }
            }
        }

        let index = state.resolvables().clone();
        let mut errors = vec![];
        for member in &mut state.module.members {
            if let Member::Binding(binding) = member {
                errors.append(&mut resolve_binding(binding, &top_level, &index));
            }
        }

        state.errors.append(&mut errors);
        state
    }
}
