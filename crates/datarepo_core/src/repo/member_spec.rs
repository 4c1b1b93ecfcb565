//! Reusable member specifications.

use crate::model::member::Member;
use crate::query::criteria::Specification;

/// Members of the team named `name`; blank names restrict nothing.
pub fn team_name(name: &str) -> Specification<Member> {
    if name.trim().is_empty() {
        return Specification::all();
    }
    Specification::eq("team.name", name.to_string())
}

/// Members whose username equals `name`.
pub fn username(name: &str) -> Specification<Member> {
    Specification::eq("username", name.to_string())
}

/// Members at least `age` years old.
pub fn age_at_least(age: i32) -> Specification<Member> {
    Specification::ge("age", age)
}
