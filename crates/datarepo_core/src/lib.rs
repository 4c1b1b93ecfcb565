//! Query repository facade over SQLite.
//!
//! Entities are mapped through static schemas; repositories expose derived
//! and literal query methods, paging, projections, specifications and
//! fetch/lock/read-only hints on top of a session with an identity map.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod page;
pub mod query;
pub mod repo;

pub use config::{Settings, SettingsError};
pub use db::{open_db, open_db_in_memory, open_db_with, DbError};
pub use logging::{default_log_level, init_logging, init_logging_from, logging_status};
pub use model::dto::{MemberDto, MemberProjection, MemberSummary, UsernameOnly};
pub use model::item::Item;
pub use model::member::Member;
pub use model::schema::{Entity, Relation};
pub use model::team::Team;
pub use page::{Direction, Order, Page, PageRequest, Sort};
pub use query::{Arg, Args, LockKind, Specification};
pub use repo::{
    ConfigError, CrudRepository, ItemRepository, MemberQueryRepository, MemberRepository,
    MemberRepositoryCustom, Projection, RepoError, RepoResult, Session, SpecificationExecutor,
    TeamRepository,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
