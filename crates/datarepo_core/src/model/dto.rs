//! Projection shapes populated from a subset of columns.
//!
//! Field names follow the camelCase property names; column aliases such as
//! `team_name` or `teamName` both map onto `team_name` here.

use crate::repo::mapping::Projection;
use serde::Deserialize;

/// Member row joined with its team name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDto {
    pub id: i64,
    pub username: String,
    pub team_name: Option<String>,
}

impl MemberDto {
    pub fn new(id: i64, username: impl Into<String>, team_name: Option<String>) -> Self {
        Self {
            id,
            username: username.into(),
            team_name,
        }
    }
}

impl Projection for MemberDto {
    const FIELDS: &'static [&'static str] = &["id", "username", "teamName"];
}

/// Closed projection exposing only `username`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UsernameOnly {
    pub username: String,
}

impl Projection for UsernameOnly {
    const FIELDS: &'static [&'static str] = &["username"];
}

/// Closed projection over the member's own scalar columns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MemberSummary {
    pub username: String,
    pub age: i32,
}

impl Projection for MemberSummary {
    const FIELDS: &'static [&'static str] = &["username", "age"];
}

/// Native-query projection keyed by column aliases.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberProjection {
    pub id: i64,
    pub username: String,
    pub team_name: Option<String>,
}

impl Projection for MemberProjection {
    const FIELDS: &'static [&'static str] = &["id", "username", "teamName"];
}
