use datarepo_core::db::open_db_in_memory;
use datarepo_core::{
    CrudRepository, Direction, Member, MemberQueryRepository, MemberRepository,
    MemberRepositoryCustom, PageRequest, RepoError, Session, Sort, Team, TeamRepository,
};

#[test]
fn saved_member_reads_back_field_for_field() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let teams = TeamRepository::new(&session);
    let members = MemberRepository::try_new(&session).unwrap();

    let mut team = Team::new("teamA");
    teams.save(&mut team).unwrap();
    let mut member = Member::with_team("memberA", 10, &team);
    members.save(&mut member).unwrap();
    assert!(member.id.is_some());

    session.clear();
    let found = members.find_by_id(member.id.unwrap()).unwrap().unwrap();
    assert_eq!(found, member);
    assert_eq!(found.username, "memberA");
    assert_eq!(found.age, 10);
    assert!(found.team().is_none(), "team is not loaded by find_by_id");
}

#[test]
fn find_by_id_prefers_the_managed_state() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let members = MemberRepository::try_new(&session).unwrap();

    let mut member = Member::with_age("member1", 10);
    members.save(&mut member).unwrap();
    session.reset_statement_count();

    let found = members.find_by_id(member.id.unwrap()).unwrap().unwrap();
    assert_eq!(found, member);
    assert_eq!(session.statement_count(), 0);
    assert!(members.exists_by_id(member.id.unwrap()).unwrap());
    assert!(!members.exists_by_id(999_i64).unwrap());
}

#[test]
fn staged_changes_are_written_on_flush() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let members = MemberRepository::try_new(&session).unwrap();

    let mut member = Member::with_age("member1", 10);
    members.save(&mut member).unwrap();

    member.username = "renamed".to_string();
    members.save(&mut member).unwrap();
    let stored: String = conn
        .query_row("SELECT username FROM member", [], |row| row.get(0))
        .unwrap();
    assert_eq!(stored, "member1", "save of a managed entity only stages");

    assert_eq!(session.flush().unwrap(), 1);
    let stored: String = conn
        .query_row("SELECT username FROM member", [], |row| row.get(0))
        .unwrap();
    assert_eq!(stored, "renamed");
}

#[test]
fn queries_flush_pending_changes_first() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let members = MemberRepository::try_new(&session).unwrap();

    let mut member = Member::with_age("member1", 10);
    members.save(&mut member).unwrap();
    member.age = 30;
    members.save(&mut member).unwrap();

    let found = members.find_by_username_and_age_greater_than("member1", 20).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].age, 30);
}

#[test]
fn change_team_updates_the_reference() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let teams = TeamRepository::new(&session);
    let members = MemberRepository::try_new(&session).unwrap();

    let mut team_a = Team::new("teamA");
    let mut team_b = Team::new("teamB");
    teams.save(&mut team_a).unwrap();
    teams.save(&mut team_b).unwrap();

    let mut member = Member::with_team("member1", 10, &team_a);
    members.save(&mut member).unwrap();
    member.change_team(&team_b);
    members.save(&mut member).unwrap();
    session.flush().unwrap();

    let team_id: i64 = conn
        .query_row("SELECT team_id FROM member", [], |row| row.get(0))
        .unwrap();
    assert_eq!(Some(team_id), team_b.id);
}

#[test]
fn member_with_unsaved_team_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let members = MemberRepository::try_new(&session).unwrap();

    let mut member = Member::with_team("member1", 10, &Team::new("unsaved"));
    let err = members.save(&mut member).unwrap_err();
    assert!(matches!(err, RepoError::TransientReference { .. }));
    assert_eq!(members.count().unwrap(), 0);
}

#[test]
fn basic_crud_counts_and_deletes() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let members = MemberRepository::try_new(&session).unwrap();

    let mut batch = vec![Member::with_age("member1", 10), Member::with_age("member2", 20)];
    members.save_all(&mut batch).unwrap();
    assert_eq!(members.count().unwrap(), 2);

    members.delete(&batch[0]).unwrap();
    assert!(!session.contains(&batch[0]));
    assert_eq!(members.count().unwrap(), 1);

    members.delete_by_id(batch[1].id.unwrap()).unwrap();
    assert_eq!(members.count().unwrap(), 0);

    let mut again = vec![Member::with_age("member3", 30), Member::with_age("member4", 40)];
    members.save_all(&mut again).unwrap();
    members.delete_all().unwrap();
    assert_eq!(members.count().unwrap(), 0);
    assert_eq!(session.managed_count(), 0);
}

#[test]
fn find_all_sorted_and_paged() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let members = MemberRepository::try_new(&session).unwrap();
    for (name, age) in [("b", 20), ("a", 30), ("c", 10)] {
        members.save(&mut Member::with_age(name, age)).unwrap();
    }

    let by_age = members
        .find_all_sorted(&Sort::by(Direction::Asc, &["age"]))
        .unwrap();
    let names: Vec<_> = by_age.iter().map(|member| member.username.as_str()).collect();
    assert_eq!(names, vec!["c", "b", "a"]);

    let request = PageRequest::of(1, 2, Sort::by(Direction::Asc, &["username"])).unwrap();
    let page = members.find_all_paged(&request).unwrap();
    assert_eq!(page.total_elements(), 3);
    assert_eq!(page.total_pages(), 2);
    assert_eq!(page.content()[0].username, "c");
    assert!(page.is_last());
}

#[test]
fn transaction_commits_staged_changes_and_clears() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let members = MemberRepository::try_new(&session).unwrap();

    session
        .transaction(|_| {
            let mut member = Member::with_age("member1", 10);
            members.save(&mut member)?;
            member.age = 11;
            members.save(&mut member)?;
            Ok(())
        })
        .unwrap();

    assert_eq!(session.managed_count(), 0);
    let age: i64 = conn
        .query_row("SELECT age FROM member", [], |row| row.get(0))
        .unwrap();
    assert_eq!(age, 11);
}

#[test]
fn custom_and_query_repositories_list_members() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let members = MemberRepository::try_new(&session).unwrap();
    members.save(&mut Member::with_age("member1", 10)).unwrap();
    members.save(&mut Member::with_age("member2", 20)).unwrap();

    let custom = members.find_member_custom().unwrap();
    assert_eq!(custom.len(), 2);

    let query_repo = MemberQueryRepository::new(&session);
    let all = query_repo.find_all_members().unwrap();
    let names: Vec<_> = all.iter().map(|member| member.username.as_str()).collect();
    assert_eq!(names, vec!["member1", "member2"]);
}
