//! Detects same-name members and duplicate parameters. Duplicates after
//! the first are replaced by `DuplicateMember` markers; declarations with
//! duplicate parameter names are replaced wholesale by `InvalidMember`.

use std::collections::{HashMap, HashSet};

use crate::ast::{BindingOrigin, DuplicateMember, InvalidMember, Member, SourceOrigin};

use super::error::{SemanticError, SemanticErrorKind};
use super::state::SemanticPhaseState;
use super::Phase;

const PHASE: &str = "duplicates";

/// Grouping key: bindings of different operator kinds may legitimately
/// share a name (binary `-` and prefix `-`).
#[derive(PartialEq, Eq, Hash, Clone, Copy)]
enum NameKind {
    BinOp,
    UnaryOp,
    Other,
}

fn kind_of(member: &Member) -> NameKind {
    match member {
        Member::Binding(binding) if binding.meta.is_binary_operator() => NameKind::BinOp,
        Member::Binding(binding)
            if binding.meta.is_prefix_operator() || binding.meta.is_postfix_operator() =>
        {
            NameKind::UnaryOp
        }
        _ => NameKind::Other,
    }
}

fn duplicate_param(member: &Member) -> Option<(String, String)> {
    let Member::Binding(binding) = member else {
        return None;
    };
    let mut seen = HashSet::new();
    for param in binding.params() {
        if !seen.insert(param.name.clone()) {
            return Some((param.name.clone(), binding.name.clone()));
        }
    }
    None
}

pub struct DuplicateNameCheck;

impl Phase for DuplicateNameCheck {
    fn name(&self) -> &'static str {
        PHASE
    }

    fn run(&self, mut state: SemanticPhaseState) -> SemanticPhaseState {
        // first occurrence per (name, kind): name -> origin of the original
        let mut firsts: HashMap<(String, NameKind), SourceOrigin> = HashMap::new();
        let mut counts: HashMap<(String, NameKind), usize> = HashMap::new();
        // names seen as functions resp. operators, for the clash report
        let mut function_names = HashSet::new();
        let mut operator_names = HashSet::new();

        for member in &state.module.members {
            let Some(name) = member.name() else { continue };
            if member.is_error_marker() {
                continue;
            }
            *counts.entry((name.to_string(), kind_of(member))).or_insert(0) += 1;

            if let Member::Binding(binding) = member {
                match binding.meta.origin {
                    BindingOrigin::Function => {
                        function_names.insert(name.to_string());
                    }
                    BindingOrigin::Operator => {
                        operator_names.insert(name.to_string());
                    }
                    _ => {}
                }
            }
        }

        for ((name, _), count) in counts.iter().filter(|(_, count)| **count > 1) {
            state.push_error(SemanticError::new(
                SemanticErrorKind::DuplicateName {
                    name: name.clone(),
                    count: *count,
                },
                PHASE,
                SourceOrigin::Synth,
            ));
        }

        for name in function_names.intersection(&operator_names) {
            state.push_error(SemanticError::new(
                SemanticErrorKind::FunctionOperatorNameClash { name: name.clone() },
                PHASE,
                SourceOrigin::Synth,
            ));
        }

        let mut param_errors = vec![];
        let members = std::mem::take(&mut state.module.members);
        state.module.members = members
            .into_iter()
            .map(|member| {
                if member.is_error_marker() {
                    return member;
                }

                // whole-declaration rejection on duplicate parameter names
                if let Some((param, decl)) = duplicate_param(&member) {
                    param_errors.push(SemanticError::new(
                        SemanticErrorKind::DuplicateParamName {
                            param,
                            decl: decl.clone(),
                        },
                        PHASE,
                        member.origin(),
                    ));
                    return Member::InvalidMember(Box::new(InvalidMember {
                        member,
                        reason: format!("duplicate parameter names in '{decl}'"),
                    }));
                }

                let Some(name) = member.name().map(str::to_string) else {
                    return member;
                };
                let key = (name.clone(), kind_of(&member));
                match firsts.get(&key) {
                    None => {
                        firsts.insert(key, member.origin());
                        member
                    }
                    Some(original_origin) => Member::DuplicateMember(Box::new(DuplicateMember {
                        member,
                        original_name: name,
                        original_origin: *original_origin,
                    })),
                }
            })
            .collect();

        state.errors.append(&mut param_errors);
        state
    }
}
