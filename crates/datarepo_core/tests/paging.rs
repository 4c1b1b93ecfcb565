use datarepo_core::db::open_db_in_memory;
use datarepo_core::{
    CrudRepository, Direction, Member, MemberRepository, PageRequest, Session, Sort,
};

fn seed_same_age(members: &MemberRepository<'_>) {
    for (name, age) in [
        ("member1", 10),
        ("member2", 10),
        ("member3", 10),
        ("member4", 10),
        ("member5", 10),
        ("other", 30),
    ] {
        members.save(&mut Member::with_age(name, age)).unwrap();
    }
}

fn first_page_by_username_desc() -> PageRequest {
    PageRequest::of(0, 3, Sort::by(Direction::Desc, &["username"])).unwrap()
}

#[test]
fn derived_page_has_content_and_totals() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let members = MemberRepository::try_new(&session).unwrap();
    seed_same_age(&members);

    let page = members
        .find_by_age(10, &first_page_by_username_desc())
        .unwrap();
    let names: Vec<_> = page.content().iter().map(|m| m.username.as_str()).collect();
    assert_eq!(names, vec!["member5", "member4", "member3"]);
    assert_eq!(page.number(), 0);
    assert_eq!(page.total_elements(), 5);
    assert_eq!(page.total_pages(), 2);
    assert!(page.is_first());
    assert!(page.has_next());
}

#[test]
fn literal_page_uses_the_declared_count_query() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let members = MemberRepository::try_new(&session).unwrap();
    seed_same_age(&members);

    let page = members
        .find_by_age_query(10, &first_page_by_username_desc())
        .unwrap();
    let names: Vec<_> = page.content().iter().map(|m| m.username.as_str()).collect();
    assert_eq!(names, vec!["member5", "member4", "member3"]);
    assert_eq!(page.total_elements(), 5);
    assert_eq!(page.total_pages(), 2);

    let second = members.find_by_age_query(10, &page.request().next()).unwrap();
    assert_eq!(second.number(), 1);
    assert_eq!(second.number_of_elements(), 2);
    assert!(second.is_last());
    assert!(second.has_previous());

    let back = members
        .find_by_age_query(10, &second.request().previous_or_first())
        .unwrap();
    assert_eq!(back, page);
}

#[test]
fn short_page_skips_the_count_query() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let members = MemberRepository::try_new(&session).unwrap();
    seed_same_age(&members);

    session.reset_statement_count();
    let request = PageRequest::of(0, 10, Sort::unsorted()).unwrap();
    let page = members.find_by_age(10, &request).unwrap();
    assert_eq!(page.total_elements(), 5);
    assert_eq!(session.statement_count(), 1);
}

#[test]
fn page_past_the_end_still_reports_the_total() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let members = MemberRepository::try_new(&session).unwrap();
    seed_same_age(&members);

    let request = PageRequest::of(5, 3, Sort::unsorted()).unwrap();
    let page = members.find_by_age(10, &request).unwrap();
    assert!(!page.has_content());
    assert_eq!(page.total_elements(), 5);
    assert_eq!(page.total_pages(), 2);
}

#[test]
fn page_maps_content_and_keeps_metadata() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let members = MemberRepository::try_new(&session).unwrap();
    seed_same_age(&members);

    let page = members
        .find_by_age(10, &first_page_by_username_desc())
        .unwrap()
        .map(|member| member.username);
    assert_eq!(page.content(), ["member5", "member4", "member3"]);
    assert_eq!(page.total_elements(), 5);
}

#[test]
fn sorting_by_unknown_property_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let members = MemberRepository::try_new(&session).unwrap();
    seed_same_age(&members);

    let request = PageRequest::of(0, 3, Sort::by(Direction::Asc, &["nickname"])).unwrap();
    assert!(members.find_by_age(10, &request).is_err());
    assert!(members.find_by_age_query(10, &request).is_err());
}
