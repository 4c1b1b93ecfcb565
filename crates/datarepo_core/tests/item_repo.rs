use datarepo_core::db::open_db_in_memory;
use datarepo_core::{CrudRepository, Item, ItemRepository, RepoError, Session};

#[test]
fn assigned_key_is_saved_and_found() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let items = ItemRepository::new(&session);

    let mut item = Item::new();
    items.save(&mut item).unwrap();
    assert_eq!(item.id.len(), 36);

    session.clear();
    let found = items.find_by_id(item.id.clone()).unwrap();
    assert_eq!(found, Some(item));
}

#[test]
fn saving_an_existing_key_does_not_duplicate() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let items = ItemRepository::new(&session);

    let mut item = Item::with_id("A");
    items.save(&mut item).unwrap();
    session.clear();
    items.save(&mut Item::with_id("A")).unwrap();

    assert_eq!(items.count().unwrap(), 1);
    assert!(items.exists_by_id("A".to_string()).unwrap());
}

#[test]
fn blank_key_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let items = ItemRepository::new(&session);

    let err = items.save(&mut Item::with_id("")).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
    assert_eq!(items.count().unwrap(), 0);
}

#[test]
fn delete_by_key() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    let items = ItemRepository::new(&session);

    items.save(&mut Item::with_id("A")).unwrap();
    items.save(&mut Item::with_id("B")).unwrap();
    items.delete_by_id("A".to_string()).unwrap();

    let remaining: Vec<_> = items.find_all().unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(remaining, vec!["B".to_string()]);
}
