use datarepo_core::db::open_db_in_memory;
use datarepo_core::repo::member_spec;
use datarepo_core::{
    CrudRepository, Direction, Member, MemberRepository, PageRequest, RepoError, Session, Sort,
    Specification, SpecificationExecutor, Team, TeamRepository,
};

fn seed(session: &Session<'_>) {
    let teams = TeamRepository::new(session);
    let members = MemberRepository::try_new(session).unwrap();
    let mut team_a = Team::new("teamA");
    let mut team_b = Team::new("teamB");
    teams.save(&mut team_a).unwrap();
    teams.save(&mut team_b).unwrap();
    members.save(&mut Member::with_team("m1", 10, &team_a)).unwrap();
    members.save(&mut Member::with_team("m2", 20, &team_a)).unwrap();
    members.save(&mut Member::with_team("m1", 30, &team_b)).unwrap();
    members.save(&mut Member::with_age("m4", 40)).unwrap();
}

#[test]
fn team_name_and_username_combine() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    seed(&session);
    let members = MemberRepository::try_new(&session).unwrap();

    let spec = member_spec::username("m1").and(member_spec::team_name("teamA"));
    let found = members.find_all_matching(&spec).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].username, "m1");
    assert_eq!(found[0].age, 10);

    let found = members.find_one_matching(&spec).unwrap();
    assert_eq!(found.map(|m| m.age), Some(10));
}

#[test]
fn blank_team_name_matches_everything() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    seed(&session);
    let members = MemberRepository::try_new(&session).unwrap();

    let spec = member_spec::team_name(" ");
    assert!(spec.is_unrestricted());
    assert_eq!(members.count_matching(&spec).unwrap(), 4);
    assert_eq!(
        members
            .count_matching(&member_spec::team_name("teamA"))
            .unwrap(),
        2
    );
}

#[test]
fn or_and_not_compose() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    seed(&session);
    let members = MemberRepository::try_new(&session).unwrap();

    let spec = member_spec::team_name("teamB").or(member_spec::age_at_least(40));
    assert_eq!(members.count_matching(&spec).unwrap(), 2);

    let spec = !member_spec::username("m1");
    assert_eq!(members.count_matching(&spec).unwrap(), 2);

    let spec = Specification::<Member>::is_null("team");
    assert_eq!(members.count_matching(&spec).unwrap(), 1);
}

#[test]
fn find_one_matching_rejects_many() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    seed(&session);
    let members = MemberRepository::try_new(&session).unwrap();

    let err = members
        .find_one_matching(&member_spec::username("m1"))
        .unwrap_err();
    assert!(matches!(err, RepoError::TooManyRows { actual: 2, .. }));
}

#[test]
fn page_of_matching_members() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    seed(&session);
    let members = MemberRepository::try_new(&session).unwrap();

    let request = PageRequest::of(0, 2, Sort::by(Direction::Desc, &["age"])).unwrap();
    let page = members
        .find_page_matching(&member_spec::age_at_least(20), &request)
        .unwrap();
    let ages: Vec<_> = page.content().iter().map(|m| m.age).collect();
    assert_eq!(ages, vec![40, 30]);
    assert_eq!(page.total_elements(), 3);
    assert!(page.has_next());
}
