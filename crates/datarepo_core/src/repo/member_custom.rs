//! Hand-written member queries outside the registry.

use super::session::Session;
use crate::model::member::Member;
use crate::repo::error::RepoResult;

/// Member queries implemented directly against the session.
pub trait MemberRepositoryCustom {
    fn find_member_custom(&self) -> RepoResult<Vec<Member>>;
}

pub struct MemberRepositoryCustomImpl<'s> {
    session: &'s Session<'s>,
}

impl<'s> MemberRepositoryCustomImpl<'s> {
    pub fn new(session: &'s Session<'s>) -> Self {
        Self { session }
    }
}

impl MemberRepositoryCustom for MemberRepositoryCustomImpl<'_> {
    fn find_member_custom(&self) -> RepoResult<Vec<Member>> {
        self.session
            .query_entities("SELECT m.* FROM member m ORDER BY m.member_id", &[])
    }
}
