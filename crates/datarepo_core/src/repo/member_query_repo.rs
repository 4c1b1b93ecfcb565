//! Screen-oriented member queries kept apart from `MemberRepository`.

use super::session::Session;
use crate::model::member::Member;
use crate::repo::error::RepoResult;

pub struct MemberQueryRepository<'s> {
    session: &'s Session<'s>,
}

impl<'s> MemberQueryRepository<'s> {
    pub fn new(session: &'s Session<'s>) -> Self {
        Self { session }
    }

    /// Every member in key order, teams not loaded.
    pub fn find_all_members(&self) -> RepoResult<Vec<Member>> {
        self.session.query_entities(
            "SELECT member_id, username, age, team_id FROM member ORDER BY member_id",
            &[],
        )
    }
}
