//! # MinnieML semantic core
//!
//! The middle of the MML compiler: everything between the parse tree and
//! LLVM IR emission. The parser hands over a [`ast::Module`]; the
//! pipeline in [`semantic`] resolves names and types, rewrites flat
//! expressions into application trees, generates constructors and memory
//! functions, analyzes ownership and inserts the balancing free calls,
//! detects tail recursion and validates the entry point. The result, a
//! [`semantic::SemanticPhaseState`] with the transformed module, the
//! accumulated errors and the populated resolvables index, goes to the
//! IR emitter.
//!
//! ```
//! use mml_lib::ast::{Module, Visibility};
//! use mml_lib::semantic::{run_pipeline, CompilerConfig, CompileMode};
//!
//! let module = Module::new("demo", Visibility::Public, vec![]);
//! let config = CompilerConfig { mode: CompileMode::Library, no_tco: false };
//! let state = run_pipeline(module, config);
//! assert!(state.errors.is_empty());
//! ```

pub mod ast;
pub mod formatter;
pub mod semantic;
