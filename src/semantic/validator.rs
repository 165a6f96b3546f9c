//! Mode-specific checks before IR emission: the last gate of the
//! pipeline. A binary needs a parameterless `main` returning unit or the
//! 64-bit integer; libraries and the introspection modes pass through.

use crate::ast::{BindingOrigin, NativeType, Type};

use super::error::{SemanticError, SemanticErrorKind};
use super::state::{CompileMode, SemanticPhaseState};
use super::typechecker::native_rep;
use super::Phase;

const PHASE: &str = "validate";

pub struct PreCodegenValidator;

impl PreCodegenValidator {
    fn check_binary(&self, state: &SemanticPhaseState) -> Option<SemanticError> {
        let Some(main) = state.module.binding("main") else {
            return Some(SemanticError::new(
                SemanticErrorKind::InvalidEntryPoint {
                    reason: "binary mode requires a 'main' function".into(),
                },
                PHASE,
                crate::ast::SourceOrigin::Synth,
            ));
        };

        if main.meta.origin != BindingOrigin::Function {
            return Some(SemanticError::new(
                SemanticErrorKind::InvalidEntryPoint {
                    reason: "'main' must be a function".into(),
                },
                PHASE,
                main.origin,
            ));
        }

        if main.meta.arity != 0 {
            return Some(SemanticError::new(
                SemanticErrorKind::InvalidEntryPoint {
                    reason: "main must have no parameters".into(),
                },
                PHASE,
                main.origin,
            ));
        }

        let return_type = match &main.type_spec {
            Some(Type::Fn { ret, .. }) => Some(ret.as_ref()),
            other => other.as_ref(),
        };
        let allowed = match return_type {
            Some(Type::Unit) => true,
            Some(ty) => {
                matches!(ty, Type::Ref(r) if r.name == "Unit")
                    || native_rep(ty, state.resolvables()) == Some(NativeType::I64)
            }
            None => false,
        };
        if !allowed {
            return Some(SemanticError::new(
                SemanticErrorKind::InvalidEntryPoint {
                    reason: "main must return Unit or a 64-bit integer".into(),
                },
                PHASE,
                main.origin,
            ));
        }

        None
    }
}

impl Phase for PreCodegenValidator {
    fn name(&self) -> &'static str {
        PHASE
    }

    fn run(&self, mut state: SemanticPhaseState) -> SemanticPhaseState {
        let error = match state.config.mode {
            CompileMode::Binary => self.check_binary(&state),
            CompileMode::Library | CompileMode::Ast | CompileMode::Ir => None,
        };
        if let Some(error) = error {
            state.push_error(error);
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        Binding, BindingMeta, Expr, FnParam, Member, Module, SourceOrigin, Term, Visibility,
    };
    use crate::semantic::state::CompilerConfig;
    use crate::semantic::{
        IdAssigner, ResolvablesIndexer, StdlibInjection, TypeChecker, TypeResolver,
    };

    fn main_fn(params: Vec<FnParam>, ret: Option<Type>) -> Member {
        let arity = params.len();
        Member::Binding(Binding {
            name: "main".into(),
            visibility: Visibility::Public,
            meta: BindingMeta::function("main", arity),
            type_asc: ret,
            type_spec: None,
            body: Expr::single(Term::lambda(
                params,
                Term::LiteralInt {
                    value: 0,
                    origin: SourceOrigin::Synth,
                },
            )),
            id: None,
            origin: SourceOrigin::Synth,
        })
    }

    fn run_mode(members: Vec<Member>, mode: CompileMode) -> SemanticPhaseState {
        let module = Module::new("m", Visibility::Public, members);
        let config = CompilerConfig {
            mode,
            ..CompilerConfig::default()
        };
        let state = crate::semantic::state::SemanticPhaseState::new(module, config);
        let state = StdlibInjection.run(state);
        let state = IdAssigner.run(state);
        let state = TypeResolver.run(state);
        let state = ResolvablesIndexer.run(state);
        let state = TypeChecker.run(state);
        PreCodegenValidator.run(state)
    }

    fn entry_point_errors(state: &SemanticPhaseState) -> Vec<&SemanticError> {
        state
            .errors
            .iter()
            .filter(|e| matches!(e.kind, SemanticErrorKind::InvalidEntryPoint { .. }))
            .collect()
    }

    #[test]
    fn test_int_returning_main_passes() {
        let state = run_mode(
            vec![main_fn(
                vec![],
                Some(Type::reference("Int", SourceOrigin::Synth)),
            )],
            CompileMode::Binary,
        );
        assert!(entry_point_errors(&state).is_empty(), "{:?}", state.errors);
    }

    #[test]
    fn test_main_with_parameters_is_rejected() {
        let state = run_mode(
            vec![main_fn(
                vec![FnParam::new(
                    "x",
                    Type::reference("Int", SourceOrigin::Synth),
                    SourceOrigin::Synth,
                )],
                Some(Type::reference("Int", SourceOrigin::Synth)),
            )],
            CompileMode::Binary,
        );

        let errors = entry_point_errors(&state);
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0].kind,
            SemanticErrorKind::InvalidEntryPoint { reason } if reason.contains("no parameters")
        ));
    }

    #[test]
    fn test_missing_main_is_rejected_in_binary_mode() {
        let state = run_mode(vec![], CompileMode::Binary);
        assert_eq!(entry_point_errors(&state).len(), 1);
    }

    #[test]
    fn test_library_mode_has_no_entry_point_constraint() {
        let state = run_mode(vec![], CompileMode::Library);
        assert!(entry_point_errors(&state).is_empty());
    }

    #[test]
    fn test_bool_returning_main_is_rejected() {
        let state = run_mode(
            vec![main_fn(
                vec![],
                Some(Type::reference("Bool", SourceOrigin::Synth)),
            )],
            CompileMode::Binary,
        );
        assert_eq!(entry_point_errors(&state).len(), 1);
    }
}
