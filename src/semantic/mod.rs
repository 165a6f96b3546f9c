//! The semantic pipeline: every transformation between the parsed AST
//! and IR emission.
//!
//! A compilation is a sequential composition of phases, each a pure
//! `SemanticPhaseState -> SemanticPhaseState` function. Phases never
//! panic and never short-circuit; they accumulate errors into the state
//! and substitute error-marker nodes for subtrees they cannot make sense
//! of, so every downstream phase always has a well-formed tree to walk.

pub mod error;
pub mod state;

mod constructors;
mod duplicates;
mod error_nodes;
mod ids;
mod indexer;
mod memory;
mod ownership;
mod ref_resolver;
mod rewriter;
mod stdlib;
mod tailcall;
mod type_resolver;
pub mod typechecker;
mod validator;

use std::time::Instant;

use log::debug;

use crate::ast::Module;

pub use self::constructors::ConstructorGenerator;
pub use self::duplicates::DuplicateNameCheck;
pub use self::error::{SemanticError, SemanticErrorKind};
pub use self::error_nodes::ErrorNodeCheck;
pub use self::ids::IdAssigner;
pub use self::indexer::ResolvablesIndexer;
pub use self::memory::MemoryFunctionGenerator;
pub use self::ownership::{OwnershipAnalyzer, OwnershipState};
pub use self::ref_resolver::ReferenceResolver;
pub use self::rewriter::ExpressionRewriter;
pub use self::state::{CompileMode, CompilerConfig, PhaseMetrics, PhaseStat, SemanticPhaseState};
pub use self::stdlib::StdlibInjection;
pub use self::tailcall::TailCallDetector;
pub use self::type_resolver::TypeResolver;
pub use self::typechecker::TypeChecker;
pub use self::validator::PreCodegenValidator;

/// A single semantic phase. Implementations transform the state, never
/// panic on malformed input, and report problems through the state's
/// error vector.
pub trait Phase {
    fn name(&self) -> &'static str;

    fn run(&self, state: SemanticPhaseState) -> SemanticPhaseState;

    /// Whether, after this phase ran, downstream phases cannot proceed
    /// meaningfully. Almost never: error accumulation is the norm.
    fn blocks_downstream(&self, _state: &SemanticPhaseState) -> bool {
        false
    }
}

/// The full pipeline in dependency order.
pub fn phases() -> Vec<Box<dyn Phase>> {
    vec![
        Box::new(StdlibInjection),
        Box::new(ErrorNodeCheck),
        Box::new(DuplicateNameCheck),
        Box::new(IdAssigner),
        Box::new(TypeResolver),
        Box::new(ConstructorGenerator),
        Box::new(ReferenceResolver),
        Box::new(ExpressionRewriter),
        Box::new(ResolvablesIndexer),
        Box::new(TypeChecker),
        Box::new(MemoryFunctionGenerator),
        Box::new(OwnershipAnalyzer),
        Box::new(TailCallDetector),
        Box::new(PreCodegenValidator),
    ]
}

/// Run the whole pipeline over a freshly parsed module.
pub fn run_pipeline(module: Module, config: CompilerConfig) -> SemanticPhaseState {
    let mut state = SemanticPhaseState::new(module, config);

    for phase in phases() {
        let started = Instant::now();
        let errors_before = state.errors.len();

        state = phase.run(state);

        let stat = PhaseStat {
            phase: phase.name(),
            duration: started.elapsed(),
            members: state.module.members.len(),
            errors_added: state.errors.len() - errors_before,
        };
        debug!(
            "phase {} finished: {} members, {} new errors",
            stat.phase, stat.members, stat.errors_added
        );
        state.metrics.record(stat);

        if phase.blocks_downstream(&state) {
            debug!("phase {} blocked downstream phases", phase.name());
            break;
        }
    }

    state
}
