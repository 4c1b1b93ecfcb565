//! Repository layer: session, query execution and entity repositories.
//!
//! # Responsibility
//! - Execute query methods declared in `crate::query` against a session.
//! - Map result rows into entities, projections and scalars.
//!
//! # Invariants
//! - Every statement runs through a `Session`, so the identity map and the
//!   statement counter see all database traffic.
//! - Repository APIs return semantic errors (`NotFound`, `TooManyRows`) in
//!   addition to database errors.

pub mod crud;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod mapping;
pub mod member_custom;
pub mod member_query_repo;
pub mod member_repo;
pub mod member_spec;
pub mod session;

use crate::model::item::Item;
use crate::model::team::Team;

pub use crud::{CrudRepository, SpecificationExecutor, SqliteCrudRepository};
pub use error::{ConfigError, RepoError, RepoResult};
pub use executor::QueryExecutor;
pub use mapping::Projection;
pub use member_custom::{MemberRepositoryCustom, MemberRepositoryCustomImpl};
pub use member_query_repo::MemberQueryRepository;
pub use member_repo::{member_queries, MemberRepository};
pub use session::Session;

pub type TeamRepository<'s> = SqliteCrudRepository<'s, Team>;
pub type ItemRepository<'s> = SqliteCrudRepository<'s, Item>;
