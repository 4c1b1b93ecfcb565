//! Member repository: CRUD plus declared query methods.
//!
//! # Responsibility
//! - Declare every member query method once, in a process-wide registry.
//! - Expose each method as a typed function over the query executor.
//!
//! # Invariants
//! - The registry is built on first use; invalid declarations fail
//!   `MemberRepository::try_new` before any query runs.
//! - `find_all` loads every member together with its team.

use super::crud::{CrudRepository, SpecificationExecutor, SqliteCrudRepository};
use super::executor::QueryExecutor;
use super::mapping::Projection;
use super::member_custom::{MemberRepositoryCustom, MemberRepositoryCustomImpl};
use super::session::Session;
use crate::model::dto::{MemberDto, MemberProjection};
use crate::model::member::{Member, MEMBER_SCHEMA};
use crate::page::{Page, PageRequest, Sort};
use crate::query::args::{Arg, Args};
use crate::query::criteria::Specification;
use crate::query::registry::{LockKind, Modifying, QueryDeclaration, QueryRegistry, ResultShape};
use crate::repo::error::{ConfigError, RepoResult};
use once_cell::sync::OnceCell;
use rusqlite::types::Value;

static MEMBER_QUERIES: OnceCell<QueryRegistry> = OnceCell::new();

const MEMBER_WITH_TEAM_NAME: &str = "SELECT m.member_id AS id, m.username, t.name AS teamName \
     FROM member m LEFT JOIN team t ON t.team_id = m.team_id";

/// Member query methods shared by every repository instance.
pub fn member_queries() -> Result<&'static QueryRegistry, ConfigError> {
    MEMBER_QUERIES.get_or_try_init(|| {
        QueryRegistry::builder(&MEMBER_SCHEMA)
            .register(QueryDeclaration::derived(
                "findByUsernameAndAgeGreaterThan",
                ResultShape::EntityList,
            ))
            .register(QueryDeclaration::derived(
                "findTop3HelloBy",
                ResultShape::EntityList,
            ))
            .register(QueryDeclaration::literal(
                "findByUsername",
                "SELECT m.* FROM member m WHERE m.username = :username",
                ResultShape::EntityList,
            ))
            .register(QueryDeclaration::literal(
                "findUser",
                "SELECT m.* FROM member m WHERE m.username = :username AND m.age = :age",
                ResultShape::EntityList,
            ))
            .register(QueryDeclaration::literal(
                "findUsernameList",
                "SELECT m.username FROM member m",
                ResultShape::ScalarList,
            ))
            .register(QueryDeclaration::literal(
                "findMemberDto",
                "SELECT m.member_id AS id, m.username, t.name AS team_name \
                 FROM member m JOIN team t ON t.team_id = m.team_id",
                ResultShape::ProjectionList,
            ))
            .register(QueryDeclaration::literal(
                "findByNames",
                "SELECT m.* FROM member m WHERE m.username IN (:names)",
                ResultShape::EntityList,
            ))
            .register(QueryDeclaration::derived(
                "findListByUsername",
                ResultShape::EntityList,
            ))
            .register(QueryDeclaration::derived(
                "findMemberByUsername",
                ResultShape::EntityOptional,
            ))
            .register(QueryDeclaration::derived(
                "findOptionalByUsername",
                ResultShape::EntityOptional,
            ))
            .register(QueryDeclaration::derived("getByUsername", ResultShape::EntityOne))
            .register(QueryDeclaration::derived("findByAge", ResultShape::EntityPage))
            .register(
                QueryDeclaration::literal(
                    "findByAgeQuery",
                    "SELECT m.* FROM member m LEFT JOIN team t ON t.team_id = m.team_id \
                     WHERE m.age = :age",
                    ResultShape::EntityPage,
                )
                .count_query("SELECT COUNT(m.username) FROM member m WHERE m.age = :age"),
            )
            .register(
                QueryDeclaration::literal(
                    "bulkAgePlus",
                    "UPDATE member SET age = age + 1 WHERE age >= :age",
                    ResultShape::AffectedRows,
                )
                .modifying(Modifying {
                    flush_automatically: true,
                    clear_automatically: true,
                }),
            )
            .register(
                QueryDeclaration::literal(
                    "findMemberFetchJoin",
                    "SELECT m.* FROM member m LEFT JOIN team t ON t.team_id = m.team_id",
                    ResultShape::EntityList,
                )
                .fetch("team"),
            )
            .register(QueryDeclaration::derived("findAll", ResultShape::EntityList).fetch("team"))
            .register(
                QueryDeclaration::literal(
                    "findMemberEntityGraph",
                    "SELECT m.* FROM member m",
                    ResultShape::EntityList,
                )
                .fetch("team"),
            )
            .register(
                QueryDeclaration::derived("findEntityGraphByUsername", ResultShape::EntityList)
                    .fetch("team"),
            )
            .register(
                QueryDeclaration::derived("findReadOnlyByUsername", ResultShape::EntityOptional)
                    .read_only(),
            )
            .register(
                QueryDeclaration::derived("findLockByUsername", ResultShape::EntityList)
                    .lock(LockKind::PessimisticWrite),
            )
            .register(QueryDeclaration::derived(
                "findProjectionsByUsername",
                ResultShape::ProjectionList,
            ))
            .register(
                QueryDeclaration::literal(
                    "findByNativeQuery",
                    "SELECT * FROM member WHERE username = ?",
                    ResultShape::EntityOptional,
                )
                .native(),
            )
            .register(
                QueryDeclaration::literal(
                    "findByNativeProjection",
                    MEMBER_WITH_TEAM_NAME,
                    ResultShape::ProjectionPage,
                )
                .native()
                .count_query("SELECT COUNT(*) FROM member"),
            )
            .register(QueryDeclaration::derived("countByAge", ResultShape::Count))
            .register(QueryDeclaration::derived(
                "existsByUsername",
                ResultShape::Exists,
            ))
            .register(QueryDeclaration::derived(
                "deleteByUsername",
                ResultShape::AffectedRows,
            ))
            .build()
    })
}

pub struct MemberRepository<'s> {
    crud: SqliteCrudRepository<'s, Member>,
    queries: QueryExecutor<'s>,
    custom: MemberRepositoryCustomImpl<'s>,
}

impl<'s> MemberRepository<'s> {
    /// Builds the repository, compiling the member registry on first use.
    pub fn try_new(session: &'s Session<'s>) -> RepoResult<Self> {
        Ok(Self {
            crud: SqliteCrudRepository::new(session),
            queries: QueryExecutor::new(session, member_queries()?),
            custom: MemberRepositoryCustomImpl::new(session),
        })
    }

    pub fn session(&self) -> &'s Session<'s> {
        self.queries.session()
    }

    pub fn find_by_username_and_age_greater_than(
        &self,
        username: &str,
        age: i32,
    ) -> RepoResult<Vec<Member>> {
        self.queries.list(
            "findByUsernameAndAgeGreaterThan",
            &Args::new().text(username).value(age),
        )
    }

    /// Up to three members in store order.
    pub fn find_top3_hello_by(&self) -> RepoResult<Vec<Member>> {
        self.queries.list("findTop3HelloBy", &Args::new())
    }

    pub fn find_by_username(&self, username: &str) -> RepoResult<Vec<Member>> {
        self.queries.list(
            "findByUsername",
            &Args::new().bind("username", Arg::text(username)),
        )
    }

    pub fn find_user(&self, username: &str, age: i32) -> RepoResult<Vec<Member>> {
        self.queries.list(
            "findUser",
            &Args::new()
                .bind("username", Arg::text(username))
                .bind("age", Arg::value(age)),
        )
    }

    pub fn find_username_list(&self) -> RepoResult<Vec<String>> {
        self.queries.scalars("findUsernameList", &Args::new())
    }

    /// Members that belong to a team, as flat DTOs.
    pub fn find_member_dto(&self) -> RepoResult<Vec<MemberDto>> {
        self.queries.projections("findMemberDto", &Args::new())
    }

    pub fn find_by_names(&self, names: &[&str]) -> RepoResult<Vec<Member>> {
        self.queries.list(
            "findByNames",
            &Args::new().bind(
                "names",
                Arg::list(names.iter().map(|name| name.to_string())),
            ),
        )
    }

    pub fn find_list_by_username(&self, username: &str) -> RepoResult<Vec<Member>> {
        self.queries
            .list("findListByUsername", &Args::new().text(username))
    }

    /// `None` when no member has `username`.
    pub fn find_member_by_username(&self, username: &str) -> RepoResult<Option<Member>> {
        self.queries
            .optional("findMemberByUsername", &Args::new().text(username))
    }

    pub fn find_optional_by_username(&self, username: &str) -> RepoResult<Option<Member>> {
        self.queries
            .optional("findOptionalByUsername", &Args::new().text(username))
    }

    /// Exactly one member named `username`.
    ///
    /// # Errors
    /// `NotFound` for no match, `TooManyRows` for duplicates.
    pub fn get_by_username(&self, username: &str) -> RepoResult<Member> {
        self.queries.one("getByUsername", &Args::new().text(username))
    }

    pub fn find_by_age(&self, age: i32, request: &PageRequest) -> RepoResult<Page<Member>> {
        self.queries
            .page("findByAge", &Args::new().value(age), request)
    }

    /// Same as [`MemberRepository::find_by_age`] through a literal query with
    /// a dedicated count query.
    pub fn find_by_age_query(&self, age: i32, request: &PageRequest) -> RepoResult<Page<Member>> {
        self.queries.page(
            "findByAgeQuery",
            &Args::new().bind("age", Arg::value(age)),
            request,
        )
    }

    /// Adds one year to every member aged `age` or older. Clears the session.
    pub fn bulk_age_plus(&self, age: i32) -> RepoResult<usize> {
        self.queries
            .update("bulkAgePlus", &Args::new().bind("age", Arg::value(age)))
    }

    pub fn find_member_fetch_join(&self) -> RepoResult<Vec<Member>> {
        self.queries.list("findMemberFetchJoin", &Args::new())
    }

    pub fn find_member_entity_graph(&self) -> RepoResult<Vec<Member>> {
        self.queries.list("findMemberEntityGraph", &Args::new())
    }

    pub fn find_entity_graph_by_username(&self, username: &str) -> RepoResult<Vec<Member>> {
        self.queries
            .list("findEntityGraphByUsername", &Args::new().text(username))
    }

    /// Loaded member is never written back by flush.
    pub fn find_read_only_by_username(&self, username: &str) -> RepoResult<Option<Member>> {
        self.queries
            .optional("findReadOnlyByUsername", &Args::new().text(username))
    }

    /// Must run inside [`Session::transaction`].
    pub fn find_lock_by_username(&self, username: &str) -> RepoResult<Vec<Member>> {
        self.queries
            .list("findLockByUsername", &Args::new().text(username))
    }

    /// Dynamic projection: only `P::FIELDS` are selected.
    pub fn find_projections_by_username<P: Projection>(
        &self,
        username: &str,
    ) -> RepoResult<Vec<P>> {
        self.queries
            .projections("findProjectionsByUsername", &Args::new().text(username))
    }

    pub fn find_by_native_query(&self, username: &str) -> RepoResult<Option<Member>> {
        self.queries
            .optional("findByNativeQuery", &Args::new().text(username))
    }

    pub fn find_by_native_projection(
        &self,
        request: &PageRequest,
    ) -> RepoResult<Page<MemberProjection>> {
        self.queries
            .projection_page("findByNativeProjection", &Args::new(), request)
    }

    pub fn count_by_age(&self, age: i32) -> RepoResult<i64> {
        self.queries.count("countByAge", &Args::new().value(age))
    }

    pub fn exists_by_username(&self, username: &str) -> RepoResult<bool> {
        self.queries
            .exists("existsByUsername", &Args::new().text(username))
    }

    /// Deletes members named `username`; returns the number deleted.
    pub fn delete_by_username(&self, username: &str) -> RepoResult<usize> {
        self.queries
            .update("deleteByUsername", &Args::new().text(username))
    }
}

impl CrudRepository<Member> for MemberRepository<'_> {
    fn save(&self, entity: &mut Member) -> RepoResult<()> {
        self.crud.save(entity)
    }

    fn find_by_id(&self, id: impl Into<Value>) -> RepoResult<Option<Member>> {
        self.crud.find_by_id(id)
    }

    fn exists_by_id(&self, id: impl Into<Value>) -> RepoResult<bool> {
        self.crud.exists_by_id(id)
    }

    fn find_all(&self) -> RepoResult<Vec<Member>> {
        self.queries.list("findAll", &Args::new())
    }

    fn find_all_sorted(&self, sort: &Sort) -> RepoResult<Vec<Member>> {
        self.crud.find_all_sorted(sort)
    }

    fn find_all_paged(&self, request: &PageRequest) -> RepoResult<Page<Member>> {
        self.crud.find_all_paged(request)
    }

    fn count(&self) -> RepoResult<i64> {
        self.crud.count()
    }

    fn delete(&self, entity: &Member) -> RepoResult<()> {
        self.crud.delete(entity)
    }

    fn delete_by_id(&self, id: impl Into<Value>) -> RepoResult<()> {
        self.crud.delete_by_id(id)
    }

    fn delete_all(&self) -> RepoResult<()> {
        self.crud.delete_all()
    }
}

impl SpecificationExecutor<Member> for MemberRepository<'_> {
    fn find_all_matching(&self, spec: &Specification<Member>) -> RepoResult<Vec<Member>> {
        self.crud.find_all_matching(spec)
    }

    fn find_one_matching(&self, spec: &Specification<Member>) -> RepoResult<Option<Member>> {
        self.crud.find_one_matching(spec)
    }

    fn count_matching(&self, spec: &Specification<Member>) -> RepoResult<i64> {
        self.crud.count_matching(spec)
    }

    fn find_page_matching(
        &self,
        spec: &Specification<Member>,
        request: &PageRequest,
    ) -> RepoResult<Page<Member>> {
        self.crud.find_page_matching(spec, request)
    }
}

impl MemberRepositoryCustom for MemberRepository<'_> {
    fn find_member_custom(&self) -> RepoResult<Vec<Member>> {
        self.custom.find_member_custom()
    }
}
