//! Query construction: derived method names, literal SQL, criteria and the
//! per-repository method registry.
//!
//! # Invariants
//! - Everything here is pure: SQL text and bind values are produced, never
//!   executed. Execution lives in `crate::repo`.

pub mod args;
pub mod criteria;
pub mod derive;
pub mod literal;
pub mod registry;
pub mod sql;

pub use args::{Arg, Args};
pub use criteria::Specification;
pub use registry::{
    LockKind, Modifying, QueryDeclaration, QueryHints, QueryRegistry, ResultShape,
};
