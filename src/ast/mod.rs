//! The MML data model: modules, members, terms, types and the
//! resolvables index. Every semantic phase consumes and produces this
//! representation; the parser builds the initial tree and the IR emitter
//! consumes the final one.

mod binding;
mod module;
mod resolvable;
mod source;
mod term;
mod types;

pub use self::binding::*;
pub use self::module::*;
pub use self::resolvable::*;
pub use self::source::*;
pub use self::term::*;
pub use self::types::*;
