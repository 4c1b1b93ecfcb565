use datarepo_core::db::{open_db, open_db_in_memory};
use datarepo_core::{
    CrudRepository, Member, MemberRepository, RepoError, Session, Team, TeamRepository,
};
use rusqlite::{Connection, ErrorCode, TransactionBehavior};
use std::time::Duration;

fn seed(session: &Session<'_>) {
    let teams = TeamRepository::new(session);
    let members = MemberRepository::try_new(session).unwrap();
    let mut team_a = Team::new("teamA");
    let mut team_b = Team::new("teamB");
    teams.save(&mut team_a).unwrap();
    teams.save(&mut team_b).unwrap();
    for index in 0..6 {
        let team = if index % 2 == 0 { &team_a } else { &team_b };
        let mut member = Member::with_team(format!("member{index}"), 10 + index, team);
        members.save(&mut member).unwrap();
    }
    members.save(&mut Member::with_age("loner", 50)).unwrap();
    session.clear();
}

fn team_name(member: &Member) -> Option<&str> {
    member.team().map(|team| team.name.as_str())
}

#[test]
fn entity_graph_loads_teams_in_one_extra_statement() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    seed(&session);
    let members = MemberRepository::try_new(&session).unwrap();

    session.reset_statement_count();
    let loaded = members.find_member_entity_graph().unwrap();
    assert_eq!(loaded.len(), 7);
    assert_eq!(session.statement_count(), 2);
    for member in &loaded {
        if member.username == "loner" {
            assert!(member.team.is_absent());
        } else {
            assert!(member.team.is_loaded(), "{} has no team", member.username);
        }
    }
}

#[test]
fn fetch_join_and_find_all_load_teams() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    seed(&session);
    let members = MemberRepository::try_new(&session).unwrap();

    let joined = members.find_member_fetch_join().unwrap();
    let member0 = joined.iter().find(|m| m.username == "member0").unwrap();
    assert_eq!(team_name(member0), Some("teamA"));

    session.clear();
    let all = members.find_all().unwrap();
    let member1 = all.iter().find(|m| m.username == "member1").unwrap();
    assert_eq!(team_name(member1), Some("teamB"));

    let by_name = members.find_entity_graph_by_username("member2").unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(team_name(&by_name[0]), Some("teamA"));
}

#[test]
fn plain_queries_leave_teams_unloaded() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    seed(&session);
    let members = MemberRepository::try_new(&session).unwrap();

    let found = members.get_by_username("member0").unwrap();
    assert!(found.team().is_none());
    assert!(!found.team.is_absent());

    let mut found = vec![found];
    session.load_references(&mut found, "team").unwrap();
    assert_eq!(team_name(&found[0]), Some("teamA"));
}

#[test]
fn shared_references_are_queried_once_per_key() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let teams = TeamRepository::new(&session);
    let mut team_a = Team::new("teamA");
    let mut team_b = Team::new("teamB");
    teams.save(&mut team_a).unwrap();
    teams.save(&mut team_b).unwrap();
    let mut crowd: Vec<Member> = (0..1200)
        .map(|index| {
            let team = if index % 2 == 0 { &team_a } else { &team_b };
            Member::with_team(format!("member{index}"), 20, team)
        })
        .collect();
    session.clear();

    session.reset_statement_count();
    session.load_references(&mut crowd, "team").unwrap();
    assert_eq!(session.statement_count(), 1);
    assert_eq!(team_name(&crowd[0]), Some("teamA"));
    assert_eq!(team_name(&crowd[1199]), Some("teamB"));
}

#[test]
fn read_only_results_are_not_flushed() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    seed(&session);
    let members = MemberRepository::try_new(&session).unwrap();

    assert!(members.find_read_only_by_username("nobody").unwrap().is_none());
    let mut member = members
        .find_read_only_by_username("member0")
        .unwrap()
        .unwrap();
    member.username = "member-renamed".to_string();
    members.save(&mut member).unwrap();
    assert_eq!(session.flush().unwrap(), 0);

    session.clear();
    assert!(members.exists_by_username("member0").unwrap());
    assert!(!members.exists_by_username("member-renamed").unwrap());
}

#[test]
fn writable_results_are_flushed() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    seed(&session);
    let members = MemberRepository::try_new(&session).unwrap();

    let mut member = members.find_member_by_username("member0").unwrap().unwrap();
    member.username = "member-renamed".to_string();
    members.save(&mut member).unwrap();
    assert_eq!(session.flush().unwrap(), 1);
    assert!(members.exists_by_username("member-renamed").unwrap());
}

#[test]
fn lock_requires_a_transaction() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    seed(&session);
    let members = MemberRepository::try_new(&session).unwrap();

    let err = members.find_lock_by_username("member0").unwrap_err();
    assert!(matches!(err, RepoError::TransactionRequired { .. }));

    let locked = session
        .transaction(|_| members.find_lock_by_username("member0"))
        .unwrap();
    assert_eq!(locked.len(), 1);
    assert!(!session.is_in_transaction());
}

/// Whether `other` can take the write lock right now. Rolls back at once.
fn can_reserve(other: &mut Connection) -> bool {
    match other.transaction_with_behavior(TransactionBehavior::Immediate) {
        Ok(tx) => {
            tx.rollback().unwrap();
            true
        }
        Err(err) => {
            assert_eq!(err.sqlite_error_code(), Some(ErrorCode::DatabaseBusy));
            false
        }
    }
}

#[test]
fn pessimistic_write_blocks_other_writers_until_commit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lock.db");
    let conn = open_db(&path).unwrap();
    let mut other = open_db(&path).unwrap();
    other.busy_timeout(Duration::ZERO).unwrap();

    let session = Session::new(&conn);
    seed(&session);
    let members = MemberRepository::try_new(&session).unwrap();

    session
        .transaction(|_| {
            let plain = members.find_list_by_username("member0")?;
            assert_eq!(plain.len(), 1);
            assert!(can_reserve(&mut other), "a plain read must not reserve");
            Ok(())
        })
        .unwrap();

    session
        .transaction(|_| {
            let locked = members.find_lock_by_username("member0")?;
            assert_eq!(locked.len(), 1);
            assert!(!can_reserve(&mut other), "lock must be held in the transaction");
            Ok(())
        })
        .unwrap();

    assert!(can_reserve(&mut other));
    let updated = other
        .execute("UPDATE member SET age = age + 1 WHERE username = 'member0'", [])
        .unwrap();
    assert_eq!(updated, 1);
}
